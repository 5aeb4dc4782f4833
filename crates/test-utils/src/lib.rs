//! This crate provides fixtures and mock chain backends for tests across the workspace.

pub mod chains;
pub mod deposit;
pub mod keys;
pub mod prelude;
