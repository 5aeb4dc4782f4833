//! Key shares produced by key generation and consumed by signing.

use std::path::Path;

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;
use tss_bridge_primitives::party::Address;

use crate::{backend::BackendKind, errors::TssError};

/// The local party's share of the group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// Backend the share belongs to.
    pub backend: BackendKind,

    /// The party holding this share.
    pub address: Address,

    /// Every party holding a share, in party order.
    pub parties: Vec<Address>,

    /// Number of signers a signing round requires.
    pub threshold: usize,

    /// The group public key signatures verify against.
    pub public_key: PublicKey,

    /// Backend-specific secret material.
    #[serde(with = "hex::serde")]
    pub secret: Vec<u8>,
}

impl KeyShare {
    /// Reads a share written by [`Self::save`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TssError> {
        let bytes = fs::read(path.as_ref()).await?;
        let share: Self = serde_json::from_slice(&bytes)?;
        share.validate()?;
        Ok(share)
    }

    /// Writes the share as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), TssError> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path.as_ref(), json).await?;
        info!(path = %path.as_ref().display(), public_key = %self.public_key, "key share saved");
        Ok(())
    }

    /// Checks that the share is internally consistent.
    pub fn validate(&self) -> Result<(), TssError> {
        if !self.parties.contains(&self.address) {
            return Err(TssError::InvalidShare(format!(
                "{} is not among the share holders",
                self.address
            )));
        }
        if self.threshold == 0 || self.threshold > self.parties.len() {
            return Err(TssError::InvalidShare(format!(
                "threshold {} out of range for {} parties",
                self.threshold,
                self.parties.len()
            )));
        }
        if !self.parties.windows(2).all(|w| w[0] < w[1]) {
            return Err(TssError::InvalidShare("parties are not sorted".to_string()));
        }

        Ok(())
    }
}
