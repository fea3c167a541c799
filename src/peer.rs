//! Remote-node endpoint handle.
//!
//! A [`Peer`] is the local side of an established link to a remote node,
//! reduced to the one thing the router needs: an outbound sink that accepts
//! wire frames. A frame is a list of terms; the consuming task owns the
//! receiving half and is responsible for encoding and transport.

use crate::term::Term;
use tokio::sync::mpsc;

/// Outbound handle to a remote node.
#[derive(Debug, Clone)]
pub struct Peer {
    sink: mpsc::Sender<Vec<Term>>,
}

impl Peer {
    /// Wraps an existing outbound sink.
    pub fn new(sink: mpsc::Sender<Vec<Term>>) -> Self {
        Self { sink }
    }

    /// Creates a peer together with the receiving half of its sink.
    ///
    /// The transport (or a test) consumes the receiver; the peer handle is
    /// what gets registered with the registrar.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<Term>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { sink: tx }, rx)
    }

    /// Pushes a wire frame onto the sink.
    ///
    /// A frame pushed after the consuming task has gone away is dropped.
    pub async fn push(&self, frame: Vec<Term>) {
        if self.sink.send(frame).await.is_err() {
            tracing::debug!("peer sink closed, frame dropped");
        }
    }
}
