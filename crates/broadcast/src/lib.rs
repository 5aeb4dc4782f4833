//! Dolev–Strong reliable broadcast.
//!
//! A proposer disseminates a single value to the party set. Every correct party either delivers
//! the same value or delivers nothing, as long as at most `f` parties are faulty. Values travel
//! with a chain of signatures that grows by one hop per relay round; a value is delivered only
//! if it is the only value seen and a chain of `f + 1` signatures was observed.

pub mod errors;
pub mod message;
pub mod protocol;

pub use errors::BroadcastError;
pub use message::RoundMessage;
pub use protocol::ReliableBroadcast;
