//! Deterministic leader election.

use sha2::{Digest, Sha256};
use tss_bridge_primitives::{
    party::{Address, PartySet},
    session::SessionId,
};

/// The leader of `session_id`: the party at `sha256(session_id) mod n` in party order, reading
/// the first eight bytes of the hash as a big-endian integer.
pub fn leader(session_id: &SessionId, parties: &PartySet) -> Option<Address> {
    if parties.is_empty() {
        return None;
    }

    let hash = Sha256::digest(session_id.to_string().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);
    let index = u64::from_be_bytes(prefix) % parties.len() as u64;

    parties.nth(index as usize).map(|p| p.address.clone())
}
