use std::{path::PathBuf, time::Duration};

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tss_bridge_chains::{bitcoind::BitcoindConfig, evm::EvmConfig, zano::ZanoConfig};
use tss_bridge_db::persistent::config::DbConfig;
use tss_bridge_p2p::config::{P2pConfig, TlsConfig};
use tss_bridge_primitives::{
    chain::{ChainId, ChainType},
    timing::SessionTimings,
};
use tss_bridge_tss::backend::BackendKind;

use crate::constants::{DEFAULT_API_ADDR, DEFAULT_KEYGEN_TIMEOUT};

/// The configuration of a signer node.
///
/// Everything under `[tss]` and the party list must be identical on every node of the signing
/// group, or the nodes will not agree on session boundaries and leaders. The remaining values
/// are local to the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Number of runtime worker threads.
    pub num_threads: Option<u8>,

    /// Stack size of runtime worker threads.
    pub thread_stack_size: Option<usize>,

    /// The node's identity key.
    pub account: AccountConfig,

    /// The node's TLS material.
    pub tls: TlsConfig,

    /// The P2P surface and the other parties.
    pub p2p: P2pConfig,

    /// Threshold signing parameters.
    pub tss: TssConfig,

    /// The deposit store.
    pub db: DbConfig,

    /// The JSON-RPC API.
    #[serde(default)]
    pub api: ApiConfig,

    /// The bridge module.
    pub core: CoreConfig,

    /// Chains deposits are read from and withdrawals are signed for.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AccountConfig {
    /// File holding the hex encoded secp256k1 secret key of the node.
    pub key_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TssConfig {
    /// The threshold protocol.
    pub backend: BackendKind,

    /// Allows backends whose shares hold the whole group key. Development networks only.
    #[serde(default)]
    pub allow_insecure_backend: bool,

    /// Size of the signer set of a signing round.
    pub threshold: usize,

    /// Where the key share is read from, and written to by key generation.
    pub share_path: PathBuf,

    /// Start of the first signing session of every chain.
    pub start_time: DateTime<Utc>,

    /// Start of key generation.
    pub keygen_start_time: Option<DateTime<Utc>>,

    /// How long key generation may take.
    #[serde(default = "default_keygen_timeout")]
    pub keygen_timeout: Duration,

    /// Phase durations. Defaults apply to missing values.
    #[serde(default)]
    pub timings: TimingsConfig,
}

impl TssConfig {
    /// Refuses insecure backends unless they were explicitly allowed.
    pub(crate) fn check_backend(&self) -> anyhow::Result<()> {
        if self.backend.is_insecure() && !self.allow_insecure_backend {
            bail!(
                "the {:?} backend gives every party the whole group key; set \
                 tss.allow_insecure_backend = true to run it on a development network",
                self.backend
            );
        }

        Ok(())
    }
}

fn default_keygen_timeout() -> Duration {
    DEFAULT_KEYGEN_TIMEOUT
}

/// Overrides of [`SessionTimings`], in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TimingsConfig {
    pub round_timeout_ms: Option<u64>,
    pub acceptance_window_ms: Option<u64>,
    pub sign_ms: Option<u64>,
    pub finalize_ms: Option<u64>,
    pub bitcoin_sign_round_delay_ms: Option<u64>,
}

impl TimingsConfig {
    pub(crate) fn timings(&self) -> SessionTimings {
        let defaults = SessionTimings::default();
        let or = |ms: Option<u64>, default: Duration| ms.map_or(default, Duration::from_millis);

        SessionTimings {
            round_timeout: or(self.round_timeout_ms, defaults.round_timeout),
            acceptance_window: or(self.acceptance_window_ms, defaults.acceptance_window),
            sign: or(self.sign_ms, defaults.sign),
            finalize: or(self.finalize_ms, defaults.finalize),
            bitcoin_sign_round_delay: or(
                self.bitcoin_sign_round_delay_ms,
                defaults.bitcoin_sign_round_delay,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ApiConfig {
    /// Address the JSON-RPC server binds to.
    pub listen_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_API_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CoreConfig {
    /// JSON-RPC endpoint of the bridge module.
    pub url: String,
}

/// A chain and the backend serving it.
///
/// Exactly the section matching `family` is used: `evm` for EVM chains, `bitcoin` for bitcoin,
/// `zano` for Zano. TON and Solana are withdrawal-only and need none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChainConfig {
    pub chain_id: ChainId,

    pub family: ChainType,

    pub evm: Option<EvmConfig>,

    pub bitcoin: Option<BitcoindConfig>,

    pub zano: Option<ZanoConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        num_threads = 8

        [account]
        key_file = "signer.key"

        [tls]
        cert = "tls/signer.pem"
        key = "tls/signer.key"
        ca = "tls/ca.pem"

        [p2p]
        listen_addr = "0.0.0.0:5678"
        peers = []

        [tss]
        backend = "dealer"
        allow_insecure_backend = true
        threshold = 3
        share_path = "share.json"
        start_time = "2025-01-01T00:00:00Z"
        keygen_timeout = { secs = 60, nanos = 0 }

        [tss.timings]
        sign_ms = 15000

        [db]
        path = "signer.db"

        [core]
        url = "http://localhost:26657"

        [[chains]]
        chain_id = "1"
        family = "evm"

        [chains.evm]
        url = "http://localhost:8545"
        bridge_contract = "0x00000000000000000000000000000000000000bb"
        confirmations = 12

        [[chains]]
        chain_id = "ton"
        family = "ton"

        [[chains]]
        chain_id = "zano"
        family = "zano"

        [chains.zano]
        url = "http://localhost:11211/json_rpc"
    "#;

    #[test]
    fn test_config_serde_toml() {
        let config = toml::from_str::<Config>(CONFIG);
        assert!(
            config.is_ok(),
            "must be able to deserialize config from toml but got: {}",
            config.unwrap_err()
        );

        let config = config.unwrap();
        assert_eq!(config.num_threads, Some(8));
        assert_eq!(config.tss.threshold, 3);
        assert_eq!(config.tss.keygen_timeout, Duration::from_secs(60));
        assert!(config.tss.keygen_start_time.is_none());
        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.chains.len(), 3);
        assert_eq!(config.chains[1].family, ChainType::Ton);
        assert!(config.chains[1].evm.is_none());

        let serialized = toml::to_string(&config).expect("must serialize");
        let reparsed = toml::from_str::<Config>(&serialized).expect("must reparse");
        assert_eq!(reparsed.tss, config.tss);
        assert_eq!(reparsed.chains.len(), config.chains.len());
    }

    #[test]
    fn insecure_backend_needs_an_explicit_opt_in() {
        let mut config = toml::from_str::<Config>(CONFIG).expect("must parse");
        assert!(config.tss.check_backend().is_ok());

        config.tss.allow_insecure_backend = false;
        let err = config
            .tss
            .check_backend()
            .expect_err("the dealer backend must be refused by default");
        assert!(err.to_string().contains("allow_insecure_backend"));

        let without = CONFIG.replace("allow_insecure_backend = true", "");
        let config = toml::from_str::<Config>(&without).expect("must parse");
        assert!(!config.tss.allow_insecure_backend);
        assert!(config.tss.check_backend().is_err());
    }

    #[test]
    fn timing_overrides_keep_the_other_defaults() {
        let config = toml::from_str::<Config>(CONFIG).expect("must parse");
        let timings = config.tss.timings.timings();
        let defaults = SessionTimings::default();

        assert_eq!(timings.sign, Duration::from_secs(15));
        assert_eq!(timings.round_timeout, defaults.round_timeout);
        assert_eq!(timings.finalize, defaults.finalize);
    }
}
