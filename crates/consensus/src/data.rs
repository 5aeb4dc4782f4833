//! What a round signs.

use std::fmt::Debug;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use crate::errors::ConsensusError;

/// Data agreed on by consensus and signed by the chosen signers.
///
/// The payload encoding must be identical on every honest node, since signature chains of the
/// broadcast cover it.
pub trait SigningData:
    BorshSerialize + BorshDeserialize + Clone + Debug + PartialEq + Send + Sync + 'static
{
    /// Digests to sign, one signing round each.
    fn digests(&self) -> Vec<[u8; 32]>;

    /// Encodes the data for the wire.
    fn to_payload(&self) -> Result<Vec<u8>, ConsensusError> {
        borsh::to_vec(self).map_err(|e| ConsensusError::malformed("signing data", e))
    }

    /// Decodes data received from the wire.
    fn from_payload(payload: &[u8]) -> Result<Self, ConsensusError> {
        borsh::from_slice(payload).map_err(|e| ConsensusError::malformed("signing data", e))
    }

    /// Identifies the data in votes and logs.
    fn hash_string(&self) -> String {
        match self.to_payload() {
            Ok(payload) => hex::encode(Sha256::digest(payload)),
            Err(_) => String::new(),
        }
    }
}
