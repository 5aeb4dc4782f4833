//! Defaults of the SQLite deposit store.

use std::time::Duration;

/// Attempts made for an operation that keeps hitting a busy database.
pub const DEFAULT_MAX_RETRY_COUNT: usize = 5;

/// Pause between two attempts.
pub const DEFAULT_BACKOFF_PERIOD: Duration = Duration::from_secs(1);

/// Database file of a node that configures none.
pub const DEFAULT_DB_PATH: &str = "tss-bridge.db";
