//! Wall-clock schedule of periodic sessions.

use std::{collections::BTreeMap, time::Duration};

use chrono::Utc;
use tokio::time::Instant;

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// The monotonic instant matching the unix time `at_ms`. Past times map to now.
pub fn instant_at(at_ms: u64) -> Instant {
    let now = now_ms();
    Instant::now() + Duration::from_millis(at_ms.saturating_sub(now))
}

/// Fixed-period rounds starting at an agreed unix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Start of round 0, in unix milliseconds.
    pub first_start_ms: u64,

    /// Length of a round.
    pub period: Duration,
}

impl Schedule {
    /// The first round starting at or after `now_ms`, and its start.
    ///
    /// A node started late joins at the next round boundary instead of running the rounds it
    /// missed.
    pub fn catch_up(&self, now_ms: u64) -> (u64, u64) {
        let period = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX).max(1);
        if now_ms <= self.first_start_ms {
            return (0, self.first_start_ms);
        }

        let elapsed = now_ms - self.first_start_ms;
        let counter = elapsed.div_ceil(period);
        (counter, self.first_start_ms + counter * period)
    }
}

/// The `(counter, start)` pair reported by a strict majority of the `answers` still ahead of
/// `now_ms`.
pub fn majority_start(
    answers: impl IntoIterator<Item = (u64, u64)>,
    now_ms: u64,
) -> Option<(u64, u64)> {
    let mut votes = BTreeMap::<(u64, u64), usize>::new();
    let mut total = 0;
    for answer in answers.into_iter().filter(|(_, start)| *start > now_ms) {
        *votes.entry(answer).or_default() += 1;
        total += 1;
    }

    votes
        .into_iter()
        .find(|(_, count)| count * 2 > total)
        .map(|(answer, _)| answer)
}
