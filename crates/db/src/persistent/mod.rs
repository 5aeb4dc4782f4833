//! SQLite backed persistence.

pub mod config;
pub mod constants;
pub mod errors;
mod models;
pub mod sqlite;
mod types;
