//! A single-decree Paxos implementation: a fixed cluster of nodes, each playing acceptor,
//! proposer and learner at once, electing one value ("council president") out of whatever
//! candidates are proposed, tolerant of message delay, reordering and a minority of crashes.

pub mod acceptor;
pub mod config;
pub mod error;
pub mod learner;
pub mod message;
pub mod node;
pub mod proposal_number;
pub mod proposer;
pub mod transport;

pub use error::{PaxosError, Result};
pub use node::Node;
