//! A threshold backend for development networks.
//!
//! Every share carries the complete group key. The protocol only makes sure that all selected
//! signers are present and agree on the digest before each of them signs with the full key, so
//! that signer selection, message routing and timing behave as with a real backend. Key
//! generation sums a random contribution from every party. None of this is secure.

use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use secp256k1::{rand::thread_rng, Message, PublicKey, Scalar, SecretKey, SECP256K1};
use tracing::warn;
use tss_bridge_primitives::{party::Address, signature::SignatureData};

use crate::{
    backend::{
        BackendKind, KeygenMachine, OutMessage, SigningMachine, StateMachine, ThresholdBackend,
    },
    errors::TssError,
    share::KeyShare,
};

#[derive(Debug, BorshSerialize, BorshDeserialize)]
enum DealerMessage {
    Ready { digest: [u8; 32] },
    Contribution { secret: [u8; 32] },
}

fn encode(msg: &DealerMessage) -> Result<Vec<u8>, TssError> {
    borsh::to_vec(msg).map_err(|e| TssError::Backend(e.to_string()))
}

fn decode(wire: &[u8]) -> Result<DealerMessage, TssError> {
    borsh::from_slice(wire).map_err(|e| TssError::Backend(e.to_string()))
}

/// The development backend.
#[derive(Debug, Default)]
pub struct DealerBackend;

impl DealerBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        warn!("⚠️ using the dealer threshold backend, every share holds the full group key");
        Self
    }
}

impl ThresholdBackend for DealerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dealer
    }

    fn signing(
        &self,
        share: &KeyShare,
        signers: &[Address],
        digest: [u8; 32],
    ) -> Result<SigningMachine, TssError> {
        if share.backend != BackendKind::Dealer {
            return Err(TssError::InvalidShare(format!(
                "{:?} share used with the dealer backend",
                share.backend
            )));
        }
        if !signers.contains(&share.address) {
            return Err(TssError::NotParticipant(share.address.clone()));
        }

        let key = SecretKey::from_slice(&share.secret)
            .map_err(|e| TssError::InvalidShare(e.to_string()))?;
        if key.public_key(SECP256K1) != share.public_key {
            return Err(TssError::InvalidShare(
                "secret does not match the group key".to_string(),
            ));
        }

        let waiting = signers
            .iter()
            .filter(|s| *s != &share.address)
            .cloned()
            .collect();

        Ok(Box::new(DealerSigning {
            key,
            digest,
            waiting,
            done: false,
        }))
    }

    fn keygen(
        &self,
        me: &Address,
        parties: &[Address],
        threshold: usize,
    ) -> Result<KeygenMachine, TssError> {
        if !parties.contains(me) {
            return Err(TssError::NotParticipant(me.clone()));
        }
        if threshold == 0 || threshold > parties.len() {
            return Err(TssError::TooFewParticipants {
                required: threshold.max(1),
                actual: parties.len(),
            });
        }

        let mut sorted = parties.to_vec();
        sorted.sort();
        sorted.dedup();

        Ok(Box::new(DealerKeygen {
            me: me.clone(),
            parties: sorted,
            threshold,
            own: SECP256K1.generate_keypair(&mut thread_rng()).0,
            contributions: BTreeMap::new(),
            result: None,
        }))
    }
}

#[derive(Debug)]
struct DealerSigning {
    key: SecretKey,
    digest: [u8; 32],
    waiting: BTreeSet<Address>,
    done: bool,
}

impl StateMachine for DealerSigning {
    type Output = SignatureData;

    fn start(&mut self) -> Result<Vec<OutMessage>, TssError> {
        let ready = encode(&DealerMessage::Ready {
            digest: self.digest,
        })?;
        Ok(vec![OutMessage::broadcast(ready)])
    }

    fn handle(
        &mut self,
        from: &Address,
        wire: &[u8],
        _broadcast: bool,
    ) -> Result<Vec<OutMessage>, TssError> {
        match decode(wire)? {
            DealerMessage::Ready { digest } if digest == self.digest => {
                self.waiting.remove(from);
                Ok(Vec::new())
            }
            DealerMessage::Ready { .. } => Err(TssError::Backend(format!(
                "{from} is signing a different digest"
            ))),
            DealerMessage::Contribution { .. } => Err(TssError::Backend(format!(
                "{from} sent a key generation message"
            ))),
        }
    }

    fn output(&mut self) -> Option<SignatureData> {
        if self.done || !self.waiting.is_empty() {
            return None;
        }

        self.done = true;
        let sig =
            SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(self.digest), &self.key);
        Some(SignatureData::from_recoverable(&sig))
    }
}

#[derive(Debug)]
struct DealerKeygen {
    me: Address,
    parties: Vec<Address>,
    threshold: usize,
    own: SecretKey,
    contributions: BTreeMap<Address, SecretKey>,
    result: Option<KeyShare>,
}

impl DealerKeygen {
    fn try_complete(&mut self) -> Result<(), TssError> {
        if self.contributions.len() < self.parties.len() || self.result.is_some() {
            return Ok(());
        }

        let mut parts = self.contributions.values();
        let first = parts
            .next()
            .copied()
            .ok_or_else(|| TssError::Backend("no contributions".to_string()))?;
        let key = parts.try_fold(first, |acc, part| {
            acc.add_tweak(&Scalar::from(*part))
                .map_err(|e| TssError::Backend(e.to_string()))
        })?;

        self.result = Some(KeyShare {
            backend: BackendKind::Dealer,
            address: self.me.clone(),
            parties: self.parties.clone(),
            threshold: self.threshold,
            public_key: PublicKey::from_secret_key(SECP256K1, &key),
            secret: key.secret_bytes().to_vec(),
        });

        Ok(())
    }
}

impl StateMachine for DealerKeygen {
    type Output = KeyShare;

    fn start(&mut self) -> Result<Vec<OutMessage>, TssError> {
        self.contributions.insert(self.me.clone(), self.own);
        self.try_complete()?;

        let msg = encode(&DealerMessage::Contribution {
            secret: self.own.secret_bytes(),
        })?;
        Ok(vec![OutMessage::broadcast(msg)])
    }

    fn handle(
        &mut self,
        from: &Address,
        wire: &[u8],
        _broadcast: bool,
    ) -> Result<Vec<OutMessage>, TssError> {
        let DealerMessage::Contribution { secret } = decode(wire)? else {
            return Err(TssError::Backend(format!("{from} sent a signing message")));
        };
        if !self.parties.contains(from) {
            return Err(TssError::Backend(format!("{from} is not a key holder")));
        }

        let part = SecretKey::from_slice(&secret).map_err(|e| TssError::Backend(e.to_string()))?;
        self.contributions.entry(from.clone()).or_insert(part);
        self.try_complete()?;
        Ok(Vec::new())
    }

    fn output(&mut self) -> Option<KeyShare> {
        self.result.take()
    }
}
