//! The seams between sessions and the network.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::future::join_all;
use tss_bridge_primitives::{
    party::Address,
    session::{SessionId, SessionKind},
};

use crate::{
    errors::TransportError,
    wire::{PartyStatus, RequestType, RpcError, SessionInfo, SubmitRequest},
};

/// Sends session messages to other parties.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Address of the local party. Every outbound request carries it as the sender.
    fn local_address(&self) -> &Address;

    /// Delivers `request` to `to`. Returns once the peer has accepted or rejected it.
    async fn send(&self, to: &Address, request: SubmitRequest) -> Result<(), TransportError>;

    /// Asks `peer` about its session of the given kind and scope.
    async fn session_info(
        &self,
        peer: &Address,
        kind: SessionKind,
        scope: &str,
    ) -> Result<SessionInfo, TransportError>;

    /// Delivers `request` to every party in `to` concurrently.
    async fn broadcast(
        &self,
        to: &[Address],
        request: SubmitRequest,
    ) -> Vec<(Address, Result<(), TransportError>)> {
        let sends = to.iter().map(|peer| {
            let request = request.clone();
            async move { (peer.clone(), self.send(peer, request).await) }
        });

        join_all(sends).await
    }

    /// Builds a request originating from the local party.
    fn request(
        &self,
        session_id: SessionId,
        request_type: RequestType,
        payload: Vec<u8>,
    ) -> SubmitRequest {
        SubmitRequest::new(
            self.local_address().clone(),
            session_id,
            request_type,
            payload,
        )
    }
}

/// Handles authenticated inbound requests.
#[async_trait]
pub trait MessageHandler: Debug + Send + Sync + 'static {
    /// Routes a message to the session it is addressed to.
    async fn handle_submit(&self, request: SubmitRequest) -> Result<(), RpcError>;

    /// Readiness of the local party.
    async fn status(&self) -> PartyStatus;

    /// Current state of the session of the given kind and scope.
    async fn session_info(&self, kind: SessionKind, scope: &str) -> Result<SessionInfo, RpcError>;
}
