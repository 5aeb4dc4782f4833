//! Party identities: addresses, public keys and the fixed party set of a signing epoch.

use std::{collections::BTreeMap, fmt, io, str::FromStr};

use bech32::{Bech32, Hrp};
use bitcoin::hashes::{hash160, Hash};
use borsh::{BorshDeserialize, BorshSerialize};
use secp256k1::{ecdsa, Message, PublicKey, SecretKey, SECP256K1};
use serde::{Deserialize, Serialize};

use crate::{constants::ADDRESS_HRP, errors::ParseError};

/// Length of the hash committed to by a party address.
pub const ADDRESS_KEY_LEN: usize = 20;

/// Address of a party, derived from its compressed public key.
///
/// Addresses are ordered by the 20-byte key they encode, not by their textual form. This is the
/// party ordering used everywhere a deterministic order over the party set is required.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    key: [u8; ADDRESS_KEY_LEN],
    encoded: String,
}

impl Address {
    /// Derives the address of the given public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        let key = hash160::Hash::hash(&pk.serialize()).to_byte_array();
        Self::from_key(key)
    }

    fn from_key(key: [u8; ADDRESS_KEY_LEN]) -> Self {
        let hrp = Hrp::parse_unchecked(ADDRESS_HRP);
        let encoded = bech32::encode::<Bech32>(hrp, &key)
            .expect("a 20-byte payload must always fit in a bech32 string");
        Self { key, encoded }
    }

    /// The integer key this address orders by, as big-endian bytes.
    pub fn party_key(&self) -> &[u8; ADDRESS_KEY_LEN] {
        &self.key
    }

    /// The bech32 form of the address.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encoded)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| ParseError::InvalidAddress(format!("{s}: {e}")))?;

        if hrp != Hrp::parse_unchecked(ADDRESS_HRP) {
            return Err(ParseError::InvalidAddress(format!(
                "{s}: expected prefix {ADDRESS_HRP}"
            )));
        }

        let key: [u8; ADDRESS_KEY_LEN] = data.try_into().map_err(|data: Vec<u8>| {
            ParseError::InvalidAddress(format!("{s}: payload has {} bytes", data.len()))
        })?;

        Ok(Self::from_key(key))
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.encoded
    }
}

impl BorshSerialize for Address {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        BorshSerialize::serialize(&self.encoded, writer)
    }
}

impl BorshDeserialize for Address {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let encoded = String::deserialize_reader(reader)?;
        encoded
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// A member of the signing group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    /// The party's address.
    pub address: Address,

    /// The party's identity key, used to sign broadcast messages.
    pub public_key: PublicKey,
}

impl Party {
    /// Creates a party from its public key.
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            address: Address::from_public_key(&public_key),
            public_key,
        }
    }
}

/// The identity of the local node.
#[derive(Clone)]
pub struct Account {
    secret_key: SecretKey,
    party: Party,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.party.address)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Creates an account from the node's identity secret key.
    pub fn new(secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key(SECP256K1);
        Self {
            secret_key,
            party: Party::new(public_key),
        }
    }

    /// The node's address.
    pub fn address(&self) -> &Address {
        &self.party.address
    }

    /// The node's identity public key.
    pub fn public_key(&self) -> PublicKey {
        self.party.public_key
    }

    /// The node as a party.
    pub fn party(&self) -> &Party {
        &self.party
    }

    /// Signs a 32-byte digest with the identity key, returning the compact encoding.
    pub fn sign_digest(&self, digest: [u8; 32]) -> [u8; 64] {
        let msg = Message::from_digest(digest);
        SECP256K1
            .sign_ecdsa(&msg, &self.secret_key)
            .serialize_compact()
    }
}

/// Verifies a compact identity signature over a digest.
pub fn verify_digest(public_key: &PublicKey, digest: [u8; 32], signature: &[u8; 64]) -> bool {
    let Ok(sig) = ecdsa::Signature::from_compact(signature) else {
        return false;
    };

    SECP256K1
        .verify_ecdsa(&Message::from_digest(digest), &sig, public_key)
        .is_ok()
}

/// The fixed set of parties that participate in an epoch.
///
/// Parties are kept sorted by their [`Address`] so that every node derives the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartySet {
    parties: BTreeMap<Address, Party>,
}

impl PartySet {
    /// Builds a party set. Returns `None` if two entries share an address.
    pub fn new(parties: impl IntoIterator<Item = Party>) -> Option<Self> {
        let mut map = BTreeMap::new();
        for party in parties {
            if map.insert(party.address.clone(), party).is_some() {
                return None;
            }
        }

        Some(Self { parties: map })
    }

    /// Number of parties.
    pub fn len(&self) -> usize {
        self.parties.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    /// Whether the address belongs to a party.
    pub fn contains(&self, address: &Address) -> bool {
        self.parties.contains_key(address)
    }

    /// Looks a party up by address.
    pub fn get(&self, address: &Address) -> Option<&Party> {
        self.parties.get(address)
    }

    /// Parties in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Party> {
        self.parties.values()
    }

    /// Addresses in sorted order.
    pub fn addresses(&self) -> Vec<Address> {
        self.parties.keys().cloned().collect()
    }

    /// Addresses of every party except `me`, in sorted order.
    pub fn others(&self, me: &Address) -> Vec<Address> {
        self.parties.keys().filter(|a| *a != me).cloned().collect()
    }

    /// The party at the given index in sorted order.
    pub fn nth(&self, index: usize) -> Option<&Party> {
        self.parties.values().nth(index)
    }
}

#[cfg(test)]
mod tests {
    use secp256k1::rand::thread_rng;

    use super::*;

    fn random_party() -> (SecretKey, Party) {
        let (sk, pk) = SECP256K1.generate_keypair(&mut thread_rng());
        (sk, Party::new(pk))
    }

    #[test]
    fn address_roundtrips_through_text_and_borsh() {
        let (_, party) = random_party();
        let text = party.address.to_string();
        assert!(text.starts_with("bridge1"), "must use the bridge prefix");

        let parsed: Address = text.parse().expect("must parse");
        assert_eq!(parsed, party.address);

        let bytes = borsh::to_vec(&party.address).expect("must serialize");
        let decoded: Address = borsh::from_slice(&bytes).expect("must deserialize");
        assert_eq!(decoded, party.address);
    }

    #[test]
    fn address_rejects_foreign_prefix() {
        let other = bech32::encode::<Bech32>(Hrp::parse_unchecked("bc"), &[7u8; 20])
            .expect("must encode");
        assert!(matches!(
            other.parse::<Address>(),
            Err(ParseError::InvalidAddress(_))
        ));
    }

    #[test]
    fn addresses_order_by_key() {
        let mut addrs: Vec<Address> = (0..16).map(|_| random_party().1.address).collect();
        addrs.sort();

        for pair in addrs.windows(2) {
            assert!(
                pair[0].party_key() < pair[1].party_key(),
                "must be sorted by party key"
            );
        }
    }

    #[test]
    fn party_set_rejects_duplicates() {
        let (_, a) = random_party();
        assert!(PartySet::new([a.clone(), a]).is_none());
    }

    #[test]
    fn party_set_is_sorted_and_excludes_self() {
        let parties: Vec<Party> = (0..5).map(|_| random_party().1).collect();
        let set = PartySet::new(parties.clone()).expect("must build");

        let mut expected: Vec<Address> = parties.iter().map(|p| p.address.clone()).collect();
        expected.sort();
        assert_eq!(set.addresses(), expected);

        let me = &expected[2];
        let others = set.others(me);
        assert_eq!(others.len(), 4);
        assert!(!others.contains(me));
    }

    #[test]
    fn account_signatures_verify() {
        let (sk, _) = random_party();
        let account = Account::new(sk);
        let digest = [42u8; 32];
        let sig = account.sign_digest(digest);

        assert!(verify_digest(&account.public_key(), digest, &sig));
        assert!(!verify_digest(&account.public_key(), [43u8; 32], &sig));
    }
}
