//! Persistence for deposits and the status of the withdrawals they request.
//!
//! The [`DepositStore`](deposits::DepositStore) trait is the only interface the rest of the node
//! uses. [`persistent::sqlite::SqliteDb`] is the production implementation, while
//! [`inmemory::InMemoryDepositStore`] backs fast tests.

pub mod deposits;
pub mod errors;
pub mod inmemory;
pub mod persistent;
