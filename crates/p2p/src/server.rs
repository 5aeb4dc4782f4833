//! The QUIC server accepting messages from other parties.
//!
//! This handles networking and peer authentication, but leaves what to do with a message to a
//! [`MessageHandler`].

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use quinn::{
    crypto::rustls::QuicServerConfig, rustls::pki_types::CertificateDer, Connection,
    ConnectionError, Endpoint, Incoming, ReadExactError, RecvStream, SendStream,
    ServerConfig as QuinnServerConfig,
};
use tracing::{debug, info, info_span, warn, Instrument};
use tss_bridge_primitives::party::Address;

use crate::{
    errors::EndpointError,
    tls::fingerprint,
    transport::MessageHandler,
    wire::{decode_len, encode_frame, ClientMessage, LengthUint, RpcError, ServerMessage},
};

/// What the server listens on and whom it serves.
#[derive(Debug)]
pub struct ServerConfig {
    /// Local UDP address.
    pub addr: SocketAddr,

    /// Connections beyond this many are refused. Unlimited when unset.
    pub connection_limit: Option<usize>,

    /// Server certificate and the CA client certificates must chain to.
    pub tls_config: quinn::rustls::ServerConfig,

    /// Maps leaf certificate fingerprints to the party presenting them.
    pub peers: HashMap<[u8; 32], Address>,
}

/// A bound server that has not started accepting connections yet.
#[derive(Debug)]
pub struct Server {
    endpoint: Endpoint,
    connection_limit: Option<usize>,
    peers: Arc<HashMap<[u8; 32], Address>>,
}

impl Server {
    /// Binds the endpoint described by `c`.
    pub fn bind(c: ServerConfig) -> Result<Self, EndpointError> {
        let quic_server_config =
            QuinnServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(c.tls_config)?));
        let endpoint = Endpoint::server(quic_server_config, c.addr)?;

        Ok(Self {
            endpoint,
            connection_limit: c.connection_limit,
            peers: Arc::new(c.peers),
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, EndpointError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accepts connections until the endpoint is closed.
    pub async fn run<H: MessageHandler>(self, handler: Arc<H>) {
        info!(addr = ?self.endpoint.local_addr().ok(), "p2p server listening");

        while let Some(incoming) = self.endpoint.accept().await {
            let remote = incoming.remote_address();
            let full = self
                .connection_limit
                .is_some_and(|limit| self.endpoint.open_connections() >= limit);
            if full {
                debug!(%remote, "connection limit reached, refusing");
                incoming.refuse();
                continue;
            }

            let serve = serve_connection(incoming, handler.clone(), self.peers.clone());
            tokio::spawn(serve.instrument(info_span!("peer", %remote)));
        }
    }
}

/// Identifies the party behind an established connection.
fn peer_address(conn: &Connection, peers: &HashMap<[u8; 32], Address>) -> Option<Address> {
    let identity = conn.peer_identity()?;
    let certs = identity.downcast::<Vec<CertificateDer<'static>>>().ok()?;
    let leaf = certs.first()?;

    peers.get(&fingerprint(leaf)).cloned()
}

/// Serves every stream a peer opens on one connection. Each stream carries one request.
async fn serve_connection<H: MessageHandler>(
    incoming: Incoming,
    handler: Arc<H>,
    peers: Arc<HashMap<[u8; 32], Address>>,
) {
    let conn = match incoming.await {
        Ok(conn) => conn,
        Err(e) => {
            debug!("handshake failed: {e}");
            return;
        }
    };

    let peer = peer_address(&conn, &peers);
    match &peer {
        Some(address) => debug!(%address, "peer authenticated"),
        None => warn!("connection from a certificate that belongs to no configured party"),
    }

    loop {
        let (tx, rx) = match conn.accept_bi().await {
            Ok(streams) => streams,
            Err(ConnectionError::ApplicationClosed(_) | ConnectionError::LocallyClosed) => return,
            Err(e) => {
                debug!("connection lost: {e}");
                return;
            }
        };

        let cid = conn.stable_id();
        tokio::spawn(
            serve_stream(tx, rx, handler.clone(), peer.clone())
                .instrument(info_span!("request", cid)),
        );
    }
}

async fn serve_stream<H: MessageHandler>(
    mut tx: SendStream,
    rx: RecvStream,
    handler: Arc<H>,
    peer: Option<Address>,
) {
    let response = match read_request(rx).await {
        Ok(Ok(request)) => respond(request, handler.as_ref(), peer).await,
        Ok(Err(rejection)) => ServerMessage::Error(rejection),
        Err(e) => {
            debug!("request stream ended early: {e}");
            return;
        }
    };

    let frame = match encode_frame(&response) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("could not encode response: {e}");
            return;
        }
    };
    if let Err(e) = tx.write_all(&frame).await {
        debug!("could not send response: {e}");
        return;
    }
    // the peer may already have dropped the stream
    let _ = tx.finish();
}

/// Reads one length-prefixed request. Malformed frames yield the error to answer with.
async fn read_request(
    mut rx: RecvStream,
) -> Result<Result<ClientMessage, RpcError>, ReadExactError> {
    let mut prefix = [0; size_of::<LengthUint>()];
    rx.read_exact(&mut prefix).await?;
    let len = match decode_len(prefix) {
        Ok(len) => len,
        Err(e) => return Ok(Err(RpcError::invalid_argument(e.to_string()))),
    };

    let mut body = vec![0; len];
    rx.read_exact(&mut body).await?;

    Ok(borsh::from_slice::<ClientMessage>(&body)
        .map_err(|e| RpcError::invalid_argument(format!("malformed message: {e}"))))
}

async fn respond<H: MessageHandler>(
    request: ClientMessage,
    handler: &H,
    peer: Option<Address>,
) -> ServerMessage {
    let reply = match request {
        ClientMessage::Status => return ServerMessage::Status(handler.status().await),
        ClientMessage::SessionInfo { kind, scope } => handler
            .session_info(kind, &scope)
            .await
            .map(ServerMessage::SessionInfo),
        ClientMessage::Submit(request) => match peer {
            None => Err(RpcError::invalid_argument("unknown peer")),
            Some(address) if address != request.sender => {
                warn!(%address, sender = %request.sender, "sender does not match the peer");
                Err(RpcError::invalid_argument(
                    "sender does not match the authenticated peer",
                ))
            }
            Some(_) => handler
                .handle_submit(request)
                .await
                .map(|()| ServerMessage::Empty),
        },
    };

    reply.unwrap_or_else(ServerMessage::Error)
}
