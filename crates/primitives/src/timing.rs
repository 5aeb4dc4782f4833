//! Phase durations of a signing session.
//!
//! Every node derives the same schedule from these values, so they must agree across the party
//! set.

use std::time::Duration;

/// Slack granted to signature distribution after the value is expected to be available.
pub const DISTRIBUTION_GRACE: Duration = Duration::from_secs(1);

/// Phase durations of a signing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Duration of a single reliable broadcast relay round.
    pub round_timeout: Duration,

    /// Window in which the leader collects acceptances after the proposal broadcast ends.
    pub acceptance_window: Duration,

    /// Upper bound on a single threshold signing round.
    pub sign: Duration,

    /// Upper bound on finalization.
    pub finalize: Duration,

    /// Pause between consecutive signing rounds of a multi-input bitcoin withdrawal.
    pub bitcoin_sign_round_delay: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            round_timeout: Duration::from_secs(1),
            acceptance_window: Duration::from_secs(2),
            sign: Duration::from_secs(10),
            finalize: Duration::from_secs(5),
            bitcoin_sign_round_delay: Duration::from_millis(500),
        }
    }
}

impl SessionTimings {
    /// How long a reliable broadcast tolerating `f` faulty parties runs.
    pub fn broadcast(&self, f: usize) -> Duration {
        self.round_timeout * (f as u32 + 1)
    }

    /// Proposal broadcast, acceptance window and signer announcement broadcast.
    pub fn consensus(&self, f: usize) -> Duration {
        self.broadcast(f) * 2 + self.acceptance_window
    }

    /// How long a party that signed waits for the distributed signatures.
    pub fn distribution_for_signer(&self, f: usize) -> Duration {
        self.broadcast(f) + DISTRIBUTION_GRACE
    }

    /// How long a party that did not sign waits for the distributed signatures of `rounds`
    /// signing rounds, measured from the end of consensus.
    pub fn distribution_for_observer(&self, f: usize, rounds: usize) -> Duration {
        self.signing_phase(rounds) + self.broadcast(f) + DISTRIBUTION_GRACE
    }

    /// Total duration of `rounds` sequential signing rounds including the pauses between them.
    pub fn signing_phase(&self, rounds: usize) -> Duration {
        let rounds = rounds.max(1) as u32;
        self.sign * rounds + self.bitcoin_sign_round_delay * (rounds - 1)
    }

    /// Length of a single-round signing session.
    pub fn signing_session(&self, f: usize) -> Duration {
        self.consensus(f) + self.sign + self.distribution_for_signer(f) + self.finalize
    }

    /// Length of a signing session with `rounds` signing rounds.
    pub fn signing_session_with_rounds(&self, f: usize, rounds: usize) -> Duration {
        let extra = rounds.max(1) as u32 - 1;
        self.signing_session(f) + (self.sign + self.bitcoin_sign_round_delay) * extra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let t = SessionTimings::default();

        // four parties with a signer set of three tolerate one fault
        assert_eq!(t.broadcast(1), Duration::from_secs(2));
        assert_eq!(t.consensus(1), Duration::from_secs(6));
        assert_eq!(t.signing_session(1), Duration::from_secs(6 + 10 + 3 + 5));
    }

    #[test]
    fn multi_round_sessions_are_extended() {
        let t = SessionTimings::default();
        let single = t.signing_session(1);
        let triple = t.signing_session_with_rounds(1, 3);

        assert_eq!(triple - single, (t.sign + t.bitcoin_sign_round_delay) * 2);
        assert_eq!(
            t.signing_phase(3),
            Duration::from_secs(30) + Duration::from_secs(1)
        );
        assert_eq!(t.signing_session_with_rounds(1, 0), single);
    }

    #[test]
    fn observers_wait_for_every_round() {
        let t = SessionTimings::default();
        assert_eq!(
            t.distribution_for_observer(1, 1),
            t.sign + t.distribution_for_signer(1)
        );
    }
}
