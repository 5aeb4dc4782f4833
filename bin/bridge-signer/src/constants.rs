use std::time::Duration;

pub(crate) const DEFAULT_THREAD_COUNT: u8 = 4;

pub(crate) const DEFAULT_THREAD_STACK_SIZE: usize = 16 * 1024 * 1024;

pub(crate) const DEFAULT_KEYGEN_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) const DEFAULT_API_ADDR: &str = "127.0.0.1:8545";

pub(crate) const KEYGEN_LINGER: Duration = Duration::from_secs(5);
