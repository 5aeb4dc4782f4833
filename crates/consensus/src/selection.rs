//! Deterministic signer selection.

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tss_bridge_primitives::{party::Address, session::SessionId};

/// Picks the signer set of a round: the leader plus `threshold - 1` acceptors, drawn with a
/// ChaCha8 stream seeded by `sha256(session_id)`.
///
/// If fewer acceptors are available every one of them is kept. The result is sorted.
pub fn select_signers(
    session_id: &SessionId,
    leader: &Address,
    acceptors: &[Address],
    threshold: usize,
) -> Vec<Address> {
    let mut candidates: Vec<Address> = acceptors.iter().filter(|a| *a != leader).cloned().collect();
    candidates.sort();
    candidates.dedup();

    let seed: [u8; 32] = Sha256::digest(session_id.to_string().as_bytes()).into();
    let mut rng = ChaCha8Rng::from_seed(seed);
    candidates.shuffle(&mut rng);
    candidates.truncate(threshold.saturating_sub(1));

    candidates.push(leader.clone());
    candidates.sort();
    candidates
}

#[cfg(test)]
mod tests {
    use tss_bridge_primitives::chain::ChainId;
    use tss_bridge_test_utils::prelude::*;

    use super::*;

    #[test]
    fn selection_is_deterministic() {
        let (accounts, _) = generate_parties(5);
        let addresses: Vec<_> = accounts.iter().map(|a| a.address().clone()).collect();
        let leader = &addresses[0];
        let acceptors = &addresses[1..];
        let id = SessionId::sign(&ChainId::from("1"), 9);

        let a = select_signers(&id, leader, acceptors, 3);
        let mut shuffled = acceptors.to_vec();
        shuffled.reverse();
        let b = select_signers(&id, leader, &shuffled, 3);

        assert_eq!(a, b, "order of votes must not matter");
        assert_eq!(a.len(), 3);
        assert!(a.contains(leader));
    }

    #[test]
    fn short_acceptor_sets_are_kept_whole() {
        let (accounts, _) = generate_parties(3);
        let addresses: Vec<_> = accounts.iter().map(|a| a.address().clone()).collect();
        let id = SessionId::keygen(0);

        let signers = select_signers(&id, &addresses[0], &addresses[1..2], 3);
        assert_eq!(signers.len(), 2);

        // the leader voting for itself does not count twice
        let signers = select_signers(&id, &addresses[0], &addresses, 2);
        assert_eq!(signers.len(), 2);
        assert!(signers.contains(&addresses[0]));
    }
}
