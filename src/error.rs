//! Error types.
//!
//! Routing itself is fire-and-forget and never surfaces errors to senders;
//! the types here cover the synchronous surfaces: registration replies,
//! call deadlines, and transport connect attempts.

use crate::atom::Atom;
use thiserror::Error;

/// Errors returned by synchronous registrar operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrarError {
    /// The requested name is already registered to another process.
    #[error("name is taken")]
    NameTaken,
    /// A peer for that node name is already registered.
    #[error("peer is already registered")]
    PeerAlreadyKnown,
    /// The registrar has been finalized and serves no further requests.
    #[error("registrar is shut down")]
    Closed,
}

/// Errors returned by a synchronous call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// No matching reply arrived before the deadline.
    #[error("timeout")]
    Timeout,
    /// The calling process was cancelled while awaiting the reply.
    #[error("stopped")]
    Stopped,
}

/// Term decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes were not a valid encoded term.
    #[error("failed to decode term: {0}")]
    Deserialize(#[from] postcard::Error),
}

/// Errors produced by a connect attempt to a remote node.
///
/// These never reach a sender: the connect task logs them and the route
/// retry proceeds regardless.
#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    /// The node has no transport configured.
    #[error("no transport configured for {0}")]
    NoTransport(Atom),
    /// The transport failed to establish the link.
    #[error("connection to {node} failed: {reason}")]
    Failed {
        /// The remote node name.
        node: Atom,
        /// Transport-level failure description.
        reason: String,
    },
}
