//! Point-to-point messaging between the parties of the signing group.
//!
//! Every message is a unary [`SubmitRequest`](wire::SubmitRequest) tagged with the session it
//! belongs to. Outbound messages go through a [`Transport`](transport::Transport); inbound ones
//! are authenticated by the [`server`] and routed to the owning session by the
//! [`SessionManager`](manager::SessionManager).
//!
//! Two transports exist: QUIC with mutual TLS for real deployments ([`client`], [`server`]) and
//! an in-process network for tests ([`memory`]).

pub mod client;
pub mod config;
pub mod errors;
pub mod manager;
pub mod memory;
pub mod server;
pub mod tls;
pub mod transport;
pub mod wire;

pub use quinn::rustls;
