//! The one-shot key generation session.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep_until;
use tracing::info;
use tss_bridge_p2p::{manager::SessionManager, transport::Transport, wire::SessionInfo};
use tss_bridge_primitives::{
    party::PartySet,
    session::{SessionId, SessionState},
};
use tss_bridge_tss::{backend::ThresholdBackend, KeyShare, KeygenParty};

use crate::{errors::SessionError, schedule::instant_at};

/// Generates the group key with every party of the set, starting at an agreed time.
#[derive(Debug)]
pub struct KeygenSession<T> {
    manager: SessionManager,
    transport: Arc<T>,
    backend: Arc<dyn ThresholdBackend>,
    parties: Arc<PartySet>,
    threshold: usize,
    start_ms: u64,
    timeout: Duration,
}

impl<T: Transport> KeygenSession<T> {
    /// Creates a session producing shares for signer sets of `threshold` parties.
    pub fn new(
        manager: SessionManager,
        transport: Arc<T>,
        backend: Arc<dyn ThresholdBackend>,
        parties: Arc<PartySet>,
        threshold: usize,
        start_ms: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            manager,
            transport,
            backend,
            parties,
            threshold,
            start_ms,
            timeout,
        }
    }

    /// Runs key generation and returns the local share.
    pub async fn run(self) -> Result<KeyShare, SessionError> {
        let session_id = SessionId::keygen(0);
        let (handle, inbox) = self
            .manager
            .register(SessionInfo {
                session_id: session_id.clone(),
                state: SessionState::AwaitingStart,
                next_start_ms: self.start_ms,
            })
            .await?;
        info!(session = %session_id, start_ms = self.start_ms, "key generation scheduled");

        let start = instant_at(self.start_ms);
        sleep_until(start).await;
        handle.set_state(SessionState::Signing, self.start_ms);

        let share = KeygenParty::new(
            self.backend,
            self.parties.addresses(),
            self.threshold,
            session_id,
            self.transport,
        )
        .run(inbox, start + self.timeout)
        .await?;

        handle.set_state(SessionState::Done, self.start_ms);
        Ok(share)
    }
}

#[cfg(test)]
mod tests {
    use tss_bridge_p2p::memory::MemoryNetwork;
    use tss_bridge_test_utils::prelude::*;
    use tss_bridge_tss::backend::BackendKind;

    use super::*;
    use crate::schedule::now_ms;

    #[tokio::test]
    async fn every_party_ends_with_the_same_group_key() {
        let (accounts, parties) = generate_parties(3);
        let parties = Arc::new(parties);
        let network = MemoryNetwork::new();
        let start_ms = now_ms() + 200;

        let sessions: Vec<_> = accounts
            .iter()
            .map(|account| {
                let (manager, _) = SessionManager::new(account.address().clone());
                network.register(account.address().clone(), Arc::new(manager.clone()));
                KeygenSession::new(
                    manager,
                    Arc::new(network.transport(account.address().clone())),
                    BackendKind::Dealer.build(),
                    parties.clone(),
                    2,
                    start_ms,
                    Duration::from_secs(5),
                )
            })
            .collect();

        let handles: Vec<_> = sessions
            .into_iter()
            .map(|session| tokio::spawn(session.run()))
            .collect();

        let mut keys = Vec::new();
        for handle in handles {
            let share = handle.await.expect("task must not panic").expect("keygen must succeed");
            assert_eq!(share.threshold, 2);
            keys.push(share.public_key);
        }
        keys.dedup();
        assert_eq!(keys.len(), 1);
    }
}
