//! Configuration of the SQLite deposit store.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::constants::{DEFAULT_BACKOFF_PERIOD, DEFAULT_DB_PATH, DEFAULT_MAX_RETRY_COUNT};

/// Where the deposit store lives and how hard it tries when the file is busy.
///
/// Only `path` is required in TOML:
///
/// ```toml
/// [db]
/// path = "data/signer.db"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Database file, created with its schema on first start.
    pub path: PathBuf,

    /// Attempts per operation before the error reaches the caller.
    pub max_retry_count: usize,

    /// Pause between attempts.
    pub backoff_period: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}

impl DbConfig {
    /// The store at `path` with the default retry policy.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            backoff_period: DEFAULT_BACKOFF_PERIOD,
        }
    }
}
