//! P2P configuration.

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, time::Duration};

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use tss_bridge_primitives::party::{Address, Party, PartySet};

/// Default timeout of a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

/// Paths of the node's TLS material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain presented to peers, PEM or DER.
    pub cert: PathBuf,

    /// Private key of the certificate, PEM or PKCS#8 DER.
    pub key: PathBuf,

    /// CA that signed every party's certificate, PEM or DER.
    pub ca: PathBuf,
}

/// A remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// The party's address. Must match the one derived from `public_key`.
    pub address: Address,

    /// The party's identity key.
    pub public_key: PublicKey,

    /// Where the party listens.
    pub addr: SocketAddr,

    /// Name the party's certificate is issued for.
    pub server_name: String,

    /// SHA-256 of the DER encoding of the party's leaf certificate.
    #[serde(with = "hex::serde")]
    pub cert_fingerprint: [u8; 32],
}

impl PeerConfig {
    /// The configured party.
    pub fn party(&self) -> Party {
        Party::new(self.public_key)
    }

    /// Whether the configured address is the one derived from the public key.
    pub fn is_consistent(&self) -> bool {
        Address::from_public_key(&self.public_key) == self.address
    }
}

/// Configuration of the P2P surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Address the server binds to.
    pub listen_addr: SocketAddr,

    /// Timeout of a single outbound request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Maximum number of concurrent inbound connections.
    #[serde(default)]
    pub connection_limit: Option<usize>,

    /// Every other party of the signing group.
    pub peers: Vec<PeerConfig>,
}

impl P2pConfig {
    /// The full party set, including the local party.
    pub fn party_set(&self, me: &Party) -> Option<PartySet> {
        PartySet::new(
            self.peers
                .iter()
                .map(PeerConfig::party)
                .chain(std::iter::once(me.clone())),
        )
    }

    /// Maps certificate fingerprints to the address of the party presenting them.
    pub fn fingerprints(&self) -> HashMap<[u8; 32], Address> {
        self.peers
            .iter()
            .map(|p| (p.cert_fingerprint, p.address.clone()))
            .collect()
    }
}
