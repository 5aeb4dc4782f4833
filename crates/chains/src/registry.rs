//! The chain clients of a node, by chain id.

use std::{collections::HashMap, sync::Arc};

use tss_bridge_primitives::chain::{ChainId, ChainType};

use crate::client::{ChainClient, UtxoClient, ZanoClient};

/// Every configured chain client.
///
/// Family specific clients are also reachable as plain [`ChainClient`]s, which is all the deposit
/// fetcher needs.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    clients: HashMap<ChainId, Arc<dyn ChainClient>>,
    utxo: HashMap<ChainId, Arc<dyn UtxoClient>>,
    zano: HashMap<ChainId, Arc<dyn ZanoClient>>,
}

impl ChainRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client with no family specific capabilities.
    pub fn register<C: ChainClient + 'static>(&mut self, client: Arc<C>) {
        self.clients.insert(client.chain_id().clone(), client);
    }

    /// Adds a bitcoin-family client.
    pub fn register_utxo<C: UtxoClient + 'static>(&mut self, client: Arc<C>) {
        let chain_id = client.chain_id().clone();
        self.utxo.insert(chain_id.clone(), client.clone());
        self.clients.insert(chain_id, client);
    }

    /// Adds a Zano client.
    pub fn register_zano<C: ZanoClient + 'static>(&mut self, client: Arc<C>) {
        let chain_id = client.chain_id().clone();
        self.zano.insert(chain_id.clone(), client.clone());
        self.clients.insert(chain_id, client);
    }

    /// The client of `chain_id`.
    pub fn get(&self, chain_id: &ChainId) -> Option<Arc<dyn ChainClient>> {
        self.clients.get(chain_id).cloned()
    }

    /// The bitcoin-family client of `chain_id`.
    pub fn utxo(&self, chain_id: &ChainId) -> Option<Arc<dyn UtxoClient>> {
        self.utxo.get(chain_id).cloned()
    }

    /// The Zano client of `chain_id`.
    pub fn zano(&self, chain_id: &ChainId) -> Option<Arc<dyn ZanoClient>> {
        self.zano.get(chain_id).cloned()
    }

    /// Every chain and its family, sorted by chain id.
    pub fn chains(&self) -> Vec<(ChainId, ChainType)> {
        let mut chains: Vec<_> = self
            .clients
            .iter()
            .map(|(id, client)| (id.clone(), client.chain_type()))
            .collect();
        chains.sort_by(|a, b| a.0.cmp(&b.0));
        chains
    }
}
