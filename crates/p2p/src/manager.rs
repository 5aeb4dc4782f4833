//! Routing of inbound messages to the sessions they are addressed to.
//!
//! The [`SessionManager`] is a single task owning the registry of live sessions, so inbound
//! messages are routed one at a time and in arrival order. A session registers under its current
//! [`SessionId`] and renames itself when it advances to the next round. Messages from peers that
//! already advanced are held back until the local session catches up.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};
use tss_bridge_primitives::{
    party::Address,
    session::{SessionId, SessionKind, SessionState},
};

use crate::{
    transport::MessageHandler,
    wire::{PartyStatus, RpcError, SessionInfo, SubmitRequest},
};

/// How far ahead of a local session a peer's session may be for its messages to be held back.
pub const MAX_COUNTER_LEAD: u64 = 2;

/// Messages held back per session that is not live yet.
pub const MAX_EARLY_MESSAGES: usize = 1024;

/// Messages delivered to a session.
pub type Inbox = mpsc::UnboundedReceiver<SubmitRequest>;

/// Errors returned to sessions by the manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A session with the same identifier is live.
    #[error("session {0} is already registered")]
    Duplicate(SessionId),

    /// The manager task is gone.
    #[error("session manager stopped")]
    Stopped,
}

#[derive(Debug)]
enum Command {
    Register {
        info: watch::Receiver<SessionInfo>,
        inbox: mpsc::UnboundedSender<SubmitRequest>,
        reply: oneshot::Sender<Result<(), ManagerError>>,
    },
    Rename {
        from: SessionId,
        to: SessionId,
    },
    Deregister {
        id: SessionId,
    },
    Route {
        request: SubmitRequest,
        reply: oneshot::Sender<Result<(), RpcError>>,
    },
    Info {
        kind: SessionKind,
        scope: String,
        reply: oneshot::Sender<Option<SessionInfo>>,
    },
}

#[derive(Debug)]
struct Entry {
    inbox: mpsc::UnboundedSender<SubmitRequest>,
    info: watch::Receiver<SessionInfo>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<SessionId, Entry>,
    early: HashMap<SessionId, Vec<SubmitRequest>>,
}

impl Registry {
    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Register { info, inbox, reply } => {
                let _ = reply.send(self.register(info, inbox));
            }
            Command::Rename { from, to } => self.rename(&from, to),
            Command::Deregister { id } => {
                self.sessions.remove(&id);
            }
            Command::Route { request, reply } => {
                let _ = reply.send(self.route(request));
            }
            Command::Info { kind, scope, reply } => {
                let _ = reply.send(self.info(kind, &scope));
            }
        }
    }

    fn live_counter(&self, kind: SessionKind, scope: &str) -> Option<u64> {
        self.sessions
            .keys()
            .find(|id| id.kind() == kind && id.scope() == scope)
            .map(SessionId::counter)
    }

    fn register(
        &mut self,
        info: watch::Receiver<SessionInfo>,
        inbox: mpsc::UnboundedSender<SubmitRequest>,
    ) -> Result<(), ManagerError> {
        let id = info.borrow().session_id.clone();
        if self.sessions.contains_key(&id) {
            return Err(ManagerError::Duplicate(id));
        }

        debug!(session = %id, "session registered");
        self.sessions.insert(id.clone(), Entry { inbox, info });
        self.flush_early(&id);
        Ok(())
    }

    fn rename(&mut self, from: &SessionId, to: SessionId) {
        let Some(entry) = self.sessions.remove(from) else {
            warn!(%from, %to, "rename of an unknown session");
            return;
        };

        trace!(%from, %to, "session renamed");
        self.sessions.insert(to.clone(), entry);
        self.early.retain(|id, _| {
            id.kind() != to.kind() || id.scope() != to.scope() || id.counter() >= to.counter()
        });
        self.flush_early(&to);
    }

    fn flush_early(&mut self, id: &SessionId) {
        let (Some(held), Some(entry)) = (self.early.remove(id), self.sessions.get(id)) else {
            return;
        };

        debug!(session = %id, count = held.len(), "delivering held back messages");
        for request in held {
            let _ = entry.inbox.send(request);
        }
    }

    fn route(&mut self, request: SubmitRequest) -> Result<(), RpcError> {
        let id = request.session_id.clone();

        if let Some(entry) = self.sessions.get(&id) {
            if entry.inbox.send(request).is_ok() {
                return Ok(());
            }

            self.sessions.remove(&id);
            return Err(RpcError::not_found(format!("session {id} has ended")));
        }

        match self.live_counter(id.kind(), id.scope()) {
            Some(live) if id.counter() > live && id.counter() - live <= MAX_COUNTER_LEAD => {
                let held = self.early.entry(id.clone()).or_default();
                if held.len() >= MAX_EARLY_MESSAGES {
                    return Err(RpcError::internal(format!("backlog of {id} is full")));
                }

                trace!(session = %id, %live, "holding back message for a future session");
                held.push(request);
                Ok(())
            }
            _ => Err(RpcError::not_found(format!("no session {id}"))),
        }
    }

    fn info(&self, kind: SessionKind, scope: &str) -> Option<SessionInfo> {
        self.sessions
            .iter()
            .find(|(id, _)| id.kind() == kind && id.scope() == scope)
            .map(|(_, entry)| entry.info.borrow().clone())
    }
}

/// Owns the registry of live sessions and routes inbound messages to them.
#[derive(Debug, Clone)]
pub struct SessionManager {
    address: Address,
    ready: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionManager {
    /// Spawns the manager task.
    pub fn new(address: Address) -> (Self, JoinHandle<()>) {
        let (commands, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut registry = Registry::default();
            while let Some(cmd) = rx.recv().await {
                registry.apply(cmd);
            }
        });

        let manager = Self {
            address,
            ready: Arc::new(AtomicBool::new(false)),
            commands,
        };

        (manager, task)
    }

    /// Marks the local party as ready, or not, in status replies.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Registers a session under `info.session_id`.
    pub async fn register(
        &self,
        info: SessionInfo,
    ) -> Result<(SessionHandle, Inbox), ManagerError> {
        let id = info.session_id.clone();
        let (info_tx, info_rx) = watch::channel(info);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();

        self.commands
            .send(Command::Register {
                info: info_rx,
                inbox: inbox_tx,
                reply,
            })
            .map_err(|_| ManagerError::Stopped)?;
        response.await.map_err(|_| ManagerError::Stopped)??;

        let handle = SessionHandle {
            id,
            info: info_tx,
            commands: self.commands.clone(),
        };

        Ok((handle, inbox_rx))
    }
}

#[async_trait]
impl MessageHandler for SessionManager {
    async fn handle_submit(&self, request: SubmitRequest) -> Result<(), RpcError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Route { request, reply })
            .map_err(|_| RpcError::internal(ManagerError::Stopped.to_string()))?;

        response
            .await
            .map_err(|_| RpcError::internal(ManagerError::Stopped.to_string()))?
    }

    async fn status(&self) -> PartyStatus {
        PartyStatus {
            address: self.address.clone(),
            ready: self.ready.load(Ordering::Relaxed),
        }
    }

    async fn session_info(&self, kind: SessionKind, scope: &str) -> Result<SessionInfo, RpcError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Info {
                kind,
                scope: scope.to_string(),
                reply,
            })
            .map_err(|_| RpcError::internal(ManagerError::Stopped.to_string()))?;

        response
            .await
            .map_err(|_| RpcError::internal(ManagerError::Stopped.to_string()))?
            .ok_or_else(|| RpcError::not_found(format!("no {kind:?} session for {scope:?}")))
    }
}

/// A session's registration. Dropping it removes the session from the manager.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    info: watch::Sender<SessionInfo>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// The identifier the session is currently registered under.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Moves the session to a new identifier, awaiting its start. Messages held back for `to`
    /// are delivered.
    pub fn rename(&mut self, to: SessionId) {
        let from = std::mem::replace(&mut self.id, to.clone());
        self.info.send_modify(|info| {
            info.session_id = to.clone();
            info.state = SessionState::AwaitingStart;
        });
        let _ = self.commands.send(Command::Rename { from, to });
    }

    /// Publishes the session's phase and the start of its next round.
    pub fn set_state(&self, state: SessionState, next_start_ms: u64) {
        self.info.send_modify(|info| {
            info.state = state;
            info.next_start_ms = next_start_ms;
        });
    }

    /// The session's current public state.
    pub fn info(&self) -> SessionInfo {
        self.info.borrow().clone()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Deregister {
            id: self.id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use tss_bridge_primitives::chain::ChainId;
    use tss_bridge_test_utils::prelude::*;

    use super::*;
    use crate::wire::{ErrorCode, RequestType};

    fn info(id: SessionId) -> SessionInfo {
        SessionInfo {
            session_id: id,
            state: SessionState::AwaitingStart,
            next_start_ms: 0,
        }
    }

    fn msg(sender: &Address, id: &SessionId, payload: u8) -> SubmitRequest {
        SubmitRequest::new(sender.clone(), id.clone(), RequestType::Proposal, vec![payload])
    }

    #[tokio::test]
    async fn routes_by_session_id() {
        let peer = generate_account();
        let (manager, _task) = SessionManager::new(generate_account().address().clone());

        let chain = ChainId::from("1");
        let id = SessionId::sign(&chain, 5);
        let (_handle, mut inbox) = manager
            .register(info(id.clone()))
            .await
            .expect("must register");

        manager
            .handle_submit(msg(peer.address(), &id, 1))
            .await
            .expect("must route to live session");
        assert_eq!(inbox.recv().await.map(|m| m.payload), Some(vec![1]));

        let stale = manager
            .handle_submit(msg(peer.address(), &id.with_counter(4), 2))
            .await
            .expect_err("stale sessions must not be found");
        assert_eq!(stale.code, ErrorCode::NotFound);

        let other_chain = SessionId::sign(&ChainId::from("2"), 6);
        let err = manager
            .handle_submit(msg(peer.address(), &other_chain, 3))
            .await
            .expect_err("unknown scopes must not be found");
        assert_eq!(err.code, ErrorCode::NotFound);

        assert!(matches!(
            manager.register(info(id)).await,
            Err(ManagerError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn messages_for_the_next_round_wait_for_the_rename() {
        let peer = generate_account();
        let (manager, _task) = SessionManager::new(generate_account().address().clone());

        let id = SessionId::keygen(0);
        let (mut handle, mut inbox) = manager
            .register(info(id.clone()))
            .await
            .expect("must register");

        manager
            .handle_submit(msg(peer.address(), &id.next(), 7))
            .await
            .expect("a peer one round ahead must be held back");
        manager
            .handle_submit(msg(peer.address(), &id.with_counter(10), 8))
            .await
            .expect_err("a peer far ahead must be rejected");
        assert!(inbox.try_recv().is_err());

        handle.set_state(SessionState::Done, 0);
        handle.rename(id.next());
        assert_eq!(inbox.recv().await.map(|m| m.payload), Some(vec![7]));

        let info = manager
            .session_info(SessionKind::Keygen, "")
            .await
            .expect("must find the renamed session");
        assert_eq!(info.session_id, id.next());
        assert_eq!(info.state, SessionState::AwaitingStart);
    }

    #[tokio::test]
    async fn dropping_the_handle_deregisters() {
        let peer = generate_account();
        let (manager, _task) = SessionManager::new(generate_account().address().clone());
        assert!(!manager.status().await.ready);
        manager.set_ready(true);
        assert!(manager.status().await.ready);

        let id = SessionId::deposit_distribution();
        let (handle, _inbox) = manager
            .register(info(id.clone()))
            .await
            .expect("must register");
        handle.set_state(SessionState::Distributing, 42);

        let info = manager
            .session_info(SessionKind::DepositDistribution, "")
            .await
            .expect("must be live");
        assert_eq!(info.state, SessionState::Distributing);
        assert_eq!(info.next_start_ms, 42);

        drop(handle);
        let err = manager
            .handle_submit(msg(peer.address(), &id, 0))
            .await
            .expect_err("must be gone");
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
