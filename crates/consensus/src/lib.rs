//! Agreement on what to sign and who signs it.
//!
//! Each signing session round runs one [`ConsensusParty`](party::ConsensusParty): a leader
//! derived from the session id proposes [`SigningData`](data::SigningData) formed by a
//! chain-specific [`Mechanism`](mechanism::Mechanism), the other parties vote on it, and the
//! leader announces a deterministic signer subset of the parties that accepted. After signing,
//! the [`SignatureDistributor`](distributor::SignatureDistributor) hands the signatures to the
//! parties that did not sign.

pub mod context;
pub mod data;
pub mod distributor;
pub mod errors;
pub mod leader;
pub mod mechanism;
pub mod messages;
pub mod party;
pub mod selection;

pub use context::RoundContext;
pub use data::SigningData;
pub use distributor::SignatureDistributor;
pub use errors::ConsensusError;
pub use mechanism::Mechanism;
pub use messages::{ConsensusInbox, ConsensusRoutes};
pub use party::{ConsensusOutcome, ConsensusParty};
