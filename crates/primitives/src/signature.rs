//! Recoverable ECDSA signatures produced by the signing group.

use borsh::{BorshDeserialize, BorshSerialize};
use secp256k1::{
    ecdsa::{self, RecoverableSignature, RecoveryId},
    Message, PublicKey, SECP256K1,
};
use serde::{Deserialize, Serialize};

use crate::{constants::EVM_RECOVERY_OFFSET, errors::ParseError};

/// An ECDSA signature with its recovery id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct SignatureData {
    /// The `r` scalar.
    #[serde(with = "hex::serde")]
    pub r: [u8; 32],

    /// The `s` scalar.
    #[serde(with = "hex::serde")]
    pub s: [u8; 32],

    /// Recovery id in `0..=3`.
    pub v: u8,
}

impl SignatureData {
    /// Splits a recoverable signature.
    pub fn from_recoverable(sig: &RecoverableSignature) -> Self {
        let (recid, compact) = sig.serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);

        Self {
            r,
            s,
            // recovery ids are always in 0..=3
            v: recid.to_i32() as u8,
        }
    }

    /// Reassembles the recoverable signature.
    pub fn to_recoverable(&self) -> Result<RecoverableSignature, ParseError> {
        let recid = RecoveryId::from_i32(i32::from(self.v))
            .map_err(|e| ParseError::InvalidSignature(e.to_string()))?;
        RecoverableSignature::from_compact(&self.compact(), recid)
            .map_err(|e| ParseError::InvalidSignature(e.to_string()))
    }

    /// The non-recoverable signature, normalized to low-S.
    pub fn to_ecdsa(&self) -> Result<ecdsa::Signature, ParseError> {
        let mut sig = ecdsa::Signature::from_compact(&self.compact())
            .map_err(|e| ParseError::InvalidSignature(e.to_string()))?;
        sig.normalize_s();
        Ok(sig)
    }

    /// The 64-byte `r || s` encoding.
    pub fn compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    /// Recovers the public key that produced this signature over `digest`.
    pub fn recover(&self, digest: [u8; 32]) -> Result<PublicKey, ParseError> {
        let sig = self.to_recoverable()?;
        SECP256K1
            .recover_ecdsa(&Message::from_digest(digest), &sig)
            .map_err(|e| ParseError::InvalidSignature(e.to_string()))
    }

    /// Whether this is a valid signature of `public_key` over `digest`.
    pub fn verify(&self, digest: [u8; 32], public_key: &PublicKey) -> bool {
        self.recover(digest).is_ok_and(|pk| pk == *public_key)
    }

    /// `0x`-prefixed `r || s || v` hex with `v` offset for EVM recovery.
    pub fn to_evm_hex(&self) -> String {
        let mut bytes = self.compact().to_vec();
        bytes.push(self.v + EVM_RECOVERY_OFFSET);
        format!("0x{}", hex::encode(bytes))
    }

    /// Plain `r || s || v` hex, used for non-EVM destinations.
    pub fn to_hex(&self) -> String {
        let mut bytes = self.compact().to_vec();
        bytes.push(self.v);
        hex::encode(bytes)
    }
}
