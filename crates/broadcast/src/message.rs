//! Round messages and their signature chains.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use tss_bridge_primitives::{
    party::{verify_digest, Account, Address, PartySet},
    session::SessionId,
};

use crate::errors::InvalidMessage;

/// One link of a signature chain.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChainSignature {
    /// The party that signed.
    pub signer: Address,

    /// Compact ECDSA signature over [`signing_digest`].
    pub signature: [u8; 64],
}

/// A value relayed in a given round together with the chain of parties that vouched for it.
///
/// `value` may be `None`, which is a legitimate value meaning "nothing".
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RoundMessage {
    /// The session the broadcast belongs to.
    pub session_id: SessionId,

    /// Relay round, starting at 0 for the proposer's message.
    pub round: u32,

    /// The broadcast value.
    pub value: Option<Vec<u8>>,

    /// `round + 1` signatures, the proposer's first.
    pub signatures: Vec<ChainSignature>,
}

/// Digest signed by the `index`-th signer of a chain: the session, the value and every
/// signature that precedes it.
pub fn signing_digest(
    session_id: &SessionId,
    value: &Option<Vec<u8>>,
    preceding: &[ChainSignature],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(session_id.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(value_hash(value));
    for link in preceding {
        hasher.update(link.signer.party_key());
        hasher.update(link.signature);
    }

    hasher.finalize().into()
}

/// Hash identifying a value. The absent value hashes the empty string.
pub fn value_hash(value: &Option<Vec<u8>>) -> [u8; 32] {
    match value {
        Some(bytes) => Sha256::digest(bytes).into(),
        None => Sha256::digest([]).into(),
    }
}

impl RoundMessage {
    /// The proposer's round 0 message.
    pub fn initial(account: &Account, session_id: SessionId, value: Option<Vec<u8>>) -> Self {
        let mut msg = Self {
            session_id,
            round: 0,
            value,
            signatures: Vec::with_capacity(1),
        };
        msg.append_signature(account);
        msg
    }

    /// The next round's message, carrying the local party's signature.
    pub fn relay(&self, account: &Account) -> Self {
        let mut next = Self {
            session_id: self.session_id.clone(),
            round: self.round + 1,
            value: self.value.clone(),
            signatures: self.signatures.clone(),
        };
        next.append_signature(account);
        next
    }

    fn append_signature(&mut self, account: &Account) {
        let digest = signing_digest(&self.session_id, &self.value, &self.signatures);
        self.signatures.push(ChainSignature {
            signer: account.address().clone(),
            signature: account.sign_digest(digest),
        });
    }

    /// Whether `address` already signed this message.
    pub fn signed_by(&self, address: &Address) -> bool {
        self.signatures.iter().any(|link| &link.signer == address)
    }

    /// Checks the signature chain of a message received from `sender`.
    pub fn verify_chain(
        &self,
        parties: &PartySet,
        proposer: &Address,
        sender: &Address,
    ) -> Result<(), InvalidMessage> {
        let expected = self.round as usize + 1;
        if self.signatures.len() != expected {
            return Err(InvalidMessage::ChainLength {
                expected,
                actual: self.signatures.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for (idx, link) in self.signatures.iter().enumerate() {
            let party = parties
                .get(&link.signer)
                .ok_or_else(|| InvalidMessage::UnknownSigner(link.signer.clone()))?;

            if !seen.insert(&link.signer) {
                return Err(InvalidMessage::DuplicateSigner(link.signer.clone()));
            }

            let digest = signing_digest(&self.session_id, &self.value, &self.signatures[..idx]);
            if !verify_digest(&party.public_key, digest, &link.signature) {
                return Err(InvalidMessage::BadSignature(link.signer.clone()));
            }
        }

        // the length check guarantees both ends exist
        if let Some(first) = self.signatures.first() {
            if &first.signer != proposer {
                return Err(InvalidMessage::WrongProposer(first.signer.clone()));
            }
        }
        if let Some(last) = self.signatures.last() {
            if &last.signer != sender {
                return Err(InvalidMessage::WrongSender {
                    sender: sender.clone(),
                    last: last.signer.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tss_bridge_test_utils::prelude::*;

    use super::*;

    #[test]
    fn relayed_chains_verify() {
        let (accounts, parties) = generate_parties(4);
        let session = SessionId::keygen(1);
        let proposer = accounts[0].address();

        let m0 = RoundMessage::initial(&accounts[0], session.clone(), Some(vec![1, 2, 3]));
        assert!(m0.verify_chain(&parties, proposer, proposer).is_ok());

        let m1 = m0.relay(&accounts[2]);
        assert_eq!(m1.round, 1);
        assert!(m1.signed_by(accounts[2].address()));
        assert!(m1
            .verify_chain(&parties, proposer, accounts[2].address())
            .is_ok());

        assert_eq!(
            m1.verify_chain(&parties, proposer, accounts[1].address()),
            Err(InvalidMessage::WrongSender {
                sender: accounts[1].address().clone(),
                last: accounts[2].address().clone(),
            })
        );
        assert_eq!(
            m1.verify_chain(&parties, accounts[1].address(), accounts[2].address()),
            Err(InvalidMessage::WrongProposer(proposer.clone()))
        );
    }

    #[test]
    fn tampered_chains_are_rejected() {
        let (accounts, parties) = generate_parties(4);
        let stranger = generate_account();
        let session = SessionId::keygen(1);
        let proposer = accounts[0].address();
        let m0 = RoundMessage::initial(&accounts[0], session.clone(), None);

        let mut swapped = m0.relay(&accounts[1]);
        swapped.value = Some(vec![9]);
        assert_eq!(
            swapped.verify_chain(&parties, proposer, accounts[1].address()),
            Err(InvalidMessage::BadSignature(proposer.clone()))
        );

        let mut short = m0.relay(&accounts[1]);
        short.round = 2;
        assert!(matches!(
            short.verify_chain(&parties, proposer, accounts[1].address()),
            Err(InvalidMessage::ChainLength { expected: 3, actual: 2 })
        ));

        let outsider = m0.relay(&stranger);
        assert_eq!(
            outsider.verify_chain(&parties, proposer, stranger.address()),
            Err(InvalidMessage::UnknownSigner(stranger.address().clone()))
        );

        let twice = m0.relay(&accounts[0]);
        assert_eq!(
            twice.verify_chain(&parties, proposer, proposer),
            Err(InvalidMessage::DuplicateSigner(proposer.clone()))
        );

        let mut other_session = m0.clone();
        other_session.session_id = SessionId::keygen(2);
        assert!(other_session
            .verify_chain(&parties, proposer, proposer)
            .is_err());
    }

    #[test]
    fn absent_value_hashes_the_empty_string() {
        assert_eq!(value_hash(&None), value_hash(&Some(Vec::new())));
        assert_ne!(value_hash(&None), value_hash(&Some(vec![0])));
    }
}
