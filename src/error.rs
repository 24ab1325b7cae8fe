//! The error kinds that can cross a module boundary in this crate.
//!
//! Role logic itself never returns errors: a rejected PREPARE or ACCEPT_REQUEST is a
//! protocol-level no-op, not a failure. The kinds below are for the surfaces around the
//! protocol — configuration, transport, the wire codec, and interactive input.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaxosError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport failed to start: {0}")]
    TransportStart(String),

    #[error("peer '{peer}' unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("unknown peer '{0}'")]
    UnknownPeer(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("malformed proposal number '{0}'")]
    MalformedProposalNumber(String),

    #[error("'{0}' is not a known candidate")]
    UnknownCandidate(String),
}

pub type Result<T> = std::result::Result<T, PaxosError>;
