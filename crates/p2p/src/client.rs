//! The QUIC client side of the P2P surface.

use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use quinn::{crypto::rustls::QuicClientConfig, ClientConfig, Connection, Endpoint};
use tokio::{sync::Mutex, time::timeout};
use tracing::{debug, trace};
use tss_bridge_primitives::{party::Address, session::SessionKind};

use crate::{
    errors::{EndpointError, TransportError},
    transport::Transport,
    wire::{
        decode_len, encode_frame, ClientMessage, LengthUint, PartyStatus, ServerMessage,
        SessionInfo, SubmitRequest,
    },
};

/// Where to reach a party.
#[derive(Debug, Clone)]
pub struct PeerEndpoint {
    /// The party's address.
    pub address: Address,

    /// The party's listening socket.
    pub addr: SocketAddr,

    /// The name its certificate is issued for.
    pub server_name: String,
}

/// Configuration of the client.
#[derive(Debug, Clone)]
pub struct Config {
    /// The local party.
    pub me: Address,

    /// Local socket to bind to. Defaults to an ephemeral port on all interfaces.
    pub local_addr: Option<SocketAddr>,

    /// The TLS configuration presenting the local certificate.
    pub tls_config: quinn::rustls::ClientConfig,

    /// Timeout of each step of a request.
    pub timeout: Duration,

    /// Every other party.
    pub peers: Vec<PeerEndpoint>,
}

#[derive(Debug)]
struct Peer {
    endpoint: PeerEndpoint,

    /// Cached connection. Holding the lock for a whole request keeps requests to a peer in
    /// submission order.
    conn: Mutex<Option<Connection>>,
}

/// Sends requests to other parties over QUIC, one lazily established connection per party.
#[derive(Debug, Clone)]
pub struct QuicTransport {
    me: Address,
    endpoint: Endpoint,
    client_config: ClientConfig,
    timeout: Duration,
    peers: Arc<HashMap<Address, Peer>>,
}

impl QuicTransport {
    /// Binds the client endpoint. No connection is made until the first request.
    pub fn new(config: Config) -> Result<Self, EndpointError> {
        let endpoint = Endpoint::client(
            config
                .local_addr
                .unwrap_or((Ipv4Addr::UNSPECIFIED, 0).into()),
        )?;
        let client_config =
            ClientConfig::new(Arc::new(QuicClientConfig::try_from(config.tls_config)?));

        let peers = config
            .peers
            .into_iter()
            .map(|endpoint| {
                (
                    endpoint.address.clone(),
                    Peer {
                        endpoint,
                        conn: Mutex::new(None),
                    },
                )
            })
            .collect();

        Ok(Self {
            me: config.me,
            endpoint,
            client_config,
            timeout: config.timeout,
            peers: Arc::new(peers),
        })
    }

    /// Asks `peer` whether it is ready.
    pub async fn status(&self, peer: &Address) -> Result<PartyStatus, TransportError> {
        match self.call(peer, ClientMessage::Status).await? {
            ServerMessage::Status(status) => Ok(status),
            ServerMessage::Error(e) => Err(TransportError::Rejected(e)),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }

    async fn call(
        &self,
        to: &Address,
        msg: ClientMessage,
    ) -> Result<ServerMessage, TransportError> {
        let peer = self
            .peers
            .get(to)
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;

        let mut cached = peer.conn.lock().await;
        let conn = match cached.as_ref() {
            Some(conn) if conn.close_reason().is_none() => conn.clone(),
            _ => {
                debug!(peer = %to, addr = %peer.endpoint.addr, "connecting");
                let connecting = self.endpoint.connect_with(
                    self.client_config.clone(),
                    peer.endpoint.addr,
                    &peer.endpoint.server_name,
                )?;
                let conn = timeout(self.timeout, connecting)
                    .await
                    .map_err(|_| TransportError::Timeout)??;
                *cached = Some(conn.clone());
                conn
            }
        };

        let res = make_req(&conn, &msg, self.timeout).await;
        if matches!(res, Err(TransportError::Connection(_))) {
            trace!(peer = %to, "dropping broken connection");
            *cached = None;
        }

        res
    }
}

#[async_trait]
impl Transport for QuicTransport {
    fn local_address(&self) -> &Address {
        &self.me
    }

    async fn send(&self, to: &Address, request: SubmitRequest) -> Result<(), TransportError> {
        match self.call(to, ClientMessage::Submit(request)).await? {
            ServerMessage::Empty => Ok(()),
            ServerMessage::Error(e) => Err(TransportError::Rejected(e)),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }

    async fn session_info(
        &self,
        peer: &Address,
        kind: SessionKind,
        scope: &str,
    ) -> Result<SessionInfo, TransportError> {
        let msg = ClientMessage::SessionInfo {
            kind,
            scope: scope.to_string(),
        };
        match self.call(peer, msg).await? {
            ServerMessage::SessionInfo(info) => Ok(info),
            ServerMessage::Error(e) => Err(TransportError::Rejected(e)),
            _ => Err(TransportError::UnexpectedResponse),
        }
    }
}

async fn make_req(
    conn: &Connection,
    msg: &ClientMessage,
    timeout_dur: Duration,
) -> Result<ServerMessage, TransportError> {
    let (mut tx, mut rx) = conn.open_bi().await?;
    timeout(timeout_dur, tx.write_all(&encode_frame(msg)?))
        .await
        .map_err(|_| TransportError::Timeout)??;

    let len_to_read = {
        let mut buf = [0; size_of::<LengthUint>()];
        timeout(timeout_dur, rx.read_exact(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)??;
        decode_len(buf)?
    };

    let mut buf = vec![0; len_to_read];
    timeout(timeout_dur, rx.read_exact(&mut buf))
        .await
        .map_err(|_| TransportError::Timeout)??;

    Ok(borsh::from_slice(&buf)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex as SyncMutex;
    use tss_bridge_primitives::session::{SessionId, SessionState};
    use tss_bridge_test_utils::prelude::*;

    use super::*;
    use crate::{
        server::{Server, ServerConfig},
        tls::{self, fingerprint, test_pki},
        transport::MessageHandler,
        wire::{RequestType, RpcError},
    };

    #[derive(Debug)]
    struct Recorder {
        me: Address,
        seen: SyncMutex<Vec<SubmitRequest>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_submit(&self, request: SubmitRequest) -> Result<(), RpcError> {
            self.seen.lock().push(request);
            Ok(())
        }

        async fn status(&self) -> PartyStatus {
            PartyStatus {
                address: self.me.clone(),
                ready: true,
            }
        }

        async fn session_info(
            &self,
            kind: SessionKind,
            _scope: &str,
        ) -> Result<SessionInfo, RpcError> {
            match kind {
                SessionKind::Keygen => Ok(SessionInfo {
                    session_id: SessionId::keygen(1),
                    state: SessionState::Consensus,
                    next_start_ms: 0,
                }),
                _ => Err(RpcError::not_found("no such session")),
            }
        }
    }

    #[tokio::test]
    async fn requests_are_authenticated_by_certificate() {
        let (accounts, _) = generate_parties(3);
        let identities = test_pki::generate(3);
        let server_account = &accounts[0];

        // the third identity holds a valid certificate but is not a configured party
        let peers: HashMap<_, _> = [(
            fingerprint(&identities[1].certs[0]),
            accounts[1].address().clone(),
        )]
        .into_iter()
        .collect();

        let server = Server::bind(ServerConfig {
            addr: "127.0.0.1:0".parse().expect("valid socket addr"),
            connection_limit: None,
            tls_config: tls::server_config(&identities[0]).expect("must build tls config"),
            peers,
        })
        .expect("must bind");
        let addr = server.local_addr().expect("must be bound");
        let handler = Arc::new(Recorder {
            me: server_account.address().clone(),
            seen: SyncMutex::new(Vec::new()),
        });
        tokio::spawn(server.run(handler.clone()));

        let client = |idx: usize| {
            QuicTransport::new(Config {
                me: accounts[idx].address().clone(),
                local_addr: Some("127.0.0.1:0".parse().expect("valid socket addr")),
                tls_config: tls::client_config(&identities[idx]).expect("must build tls config"),
                timeout: Duration::from_secs(5),
                peers: vec![PeerEndpoint {
                    address: server_account.address().clone(),
                    addr,
                    server_name: "localhost".to_string(),
                }],
            })
            .expect("must bind client")
        };

        let known = client(1);
        let session_id = SessionId::keygen(1);
        let request = known.request(session_id.clone(), RequestType::Keygen, vec![7]);
        known
            .send(server_account.address(), request.clone())
            .await
            .expect("configured party must be accepted");
        assert_eq!(handler.seen.lock().as_slice(), &[request]);

        let status = known
            .status(server_account.address())
            .await
            .expect("must answer status");
        assert!(status.ready);

        let info = known
            .session_info(server_account.address(), SessionKind::Keygen, "")
            .await
            .expect("must answer session info");
        assert_eq!(info.session_id, session_id);

        let missing = known
            .session_info(server_account.address(), SessionKind::Sign, "1")
            .await;
        assert!(matches!(missing, Err(TransportError::Rejected(_))));

        // a configured party may not speak for another one
        let forged = SubmitRequest::new(
            accounts[2].address().clone(),
            session_id.clone(),
            RequestType::Keygen,
            vec![],
        );
        let res = known.send(server_account.address(), forged).await;
        assert!(matches!(res, Err(TransportError::Rejected(_))));

        let stranger = client(2);
        let request = stranger.request(session_id, RequestType::Keygen, vec![]);
        let res = stranger.send(server_account.address(), request).await;
        assert!(matches!(res, Err(TransportError::Rejected(_))));

        assert_eq!(handler.seen.lock().len(), 1);

        let request = known.request(SessionId::keygen(1), RequestType::Keygen, vec![]);
        let res = known.send(accounts[2].address(), request).await;
        assert!(matches!(res, Err(TransportError::UnknownPeer(_))));
    }
}
