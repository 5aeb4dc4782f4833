//! An in-process network connecting handlers directly, for tests and local simulations.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tss_bridge_primitives::{party::Address, session::SessionKind};

use crate::{
    errors::TransportError,
    transport::{MessageHandler, Transport},
    wire::{RpcError, SessionInfo, SubmitRequest},
};

/// Rewrites a request on its way to the given recipient, or drops it by returning `None`.
type Interceptor = Arc<dyn Fn(&Address, SubmitRequest) -> Option<SubmitRequest> + Send + Sync>;

#[derive(Default)]
struct Inner {
    handlers: HashMap<Address, Arc<dyn MessageHandler>>,
    offline: HashSet<Address>,
    interceptors: HashMap<Address, Interceptor>,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("handlers", &self.handlers)
            .field("offline", &self.offline)
            .field("intercepted", &self.interceptors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A set of parties that reach each other without sockets.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the handler of `address`, replacing any previous one.
    pub fn register(&self, address: Address, handler: Arc<dyn MessageHandler>) {
        self.inner.write().handlers.insert(address, handler);
    }

    /// A transport sending on behalf of `me`.
    pub fn transport(&self, me: Address) -> MemoryTransport {
        MemoryTransport {
            me,
            network: self.clone(),
        }
    }

    /// Cuts `address` off. Messages from and to it fail until [`Self::reconnect`].
    pub fn disconnect(&self, address: &Address) {
        self.inner.write().offline.insert(address.clone());
    }

    /// Reverts [`Self::disconnect`].
    pub fn reconnect(&self, address: &Address) {
        self.inner.write().offline.remove(address);
    }

    /// Passes everything `from` submits through `interceptor`, which may rewrite a request or
    /// drop it. Dropped requests fail like requests to an offline party.
    pub fn intercept(
        &self,
        from: Address,
        interceptor: impl Fn(&Address, SubmitRequest) -> Option<SubmitRequest> + Send + Sync + 'static,
    ) {
        self.inner
            .write()
            .interceptors
            .insert(from, Arc::new(interceptor));
    }

    /// Removes the interceptor of `from`.
    pub fn clear_interceptor(&self, from: &Address) {
        self.inner.write().interceptors.remove(from);
    }

    fn intercepted(
        &self,
        from: &Address,
        to: &Address,
        request: SubmitRequest,
    ) -> Result<SubmitRequest, TransportError> {
        let interceptor = self.inner.read().interceptors.get(from).cloned();
        match interceptor {
            Some(interceptor) => interceptor(to, request).ok_or(TransportError::Timeout),
            None => Ok(request),
        }
    }

    fn handler(
        &self,
        from: &Address,
        to: &Address,
    ) -> Result<Arc<dyn MessageHandler>, TransportError> {
        let inner = self.inner.read();
        if inner.offline.contains(from) || inner.offline.contains(to) {
            return Err(TransportError::Timeout);
        }

        inner
            .handlers
            .get(to)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))
    }
}

/// The [`Transport`] of one party on a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    me: Address,
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_address(&self) -> &Address {
        &self.me
    }

    async fn send(&self, to: &Address, request: SubmitRequest) -> Result<(), TransportError> {
        if request.sender != self.me {
            return Err(TransportError::Rejected(RpcError::invalid_argument(
                "sender does not match the authenticated peer",
            )));
        }

        let handler = self.network.handler(&self.me, to)?;
        let request = self.network.intercepted(&self.me, to, request)?;
        handler
            .handle_submit(request)
            .await
            .map_err(TransportError::Rejected)
    }

    async fn session_info(
        &self,
        peer: &Address,
        kind: SessionKind,
        scope: &str,
    ) -> Result<SessionInfo, TransportError> {
        let handler = self.network.handler(&self.me, peer)?;
        handler
            .session_info(kind, scope)
            .await
            .map_err(TransportError::Rejected)
    }
}
