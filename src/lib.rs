//! # Axon, a distributed process runtime
//!
//! Axon brings actor-style processes with remote-node transparency to Rust:
//! lightweight isolated units that own a mailbox and a life cycle, exchange
//! asynchronous messages addressed by pid or registered name, and are
//! supervised as restartable hierarchies.
//!
//! # Overview
//!
//! - **Processes**: tokio tasks with a bounded mailbox of `(sender, payload)`
//!   pairs and a hierarchical cancellation scope
//! - **Registrar**: one coordinator task owning the name, process, and peer
//!   maps; every registration and every route passes through it
//! - **Routing**: destinations are terms: a pid delivers directly, a
//!   `(name, node)` tuple and a plain name resolve through registries, and
//!   remote destinations are forwarded over peer links with on-demand
//!   connection and a bounded retry
//! - **Supervision**: one-for-one, one-for-all, rest-for-one and
//!   simple-one-for-one restart strategies with intensity/period rate
//!   limiting
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use axon::prelude::*;
//! use axon::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Behavior for Echo {
//!     async fn run(&self, process: Arc<Process>, _args: Vec<Term>) -> Atom {
//!         loop {
//!             match process.recv().await {
//!                 Signal::Message { from, message } => process.send(from, message).await,
//!                 Signal::Stop { reason, .. } => return reason,
//!                 Signal::Shutdown => return atom!("shutdown"),
//!             }
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let node = Node::new("demo@localhost");
//!     let echo = node.spawn_named("echo", Echo, vec![]).await.unwrap();
//!     node.registrar()
//!         .route(Pid::nil(), Term::atom("echo"), tuple!(atom!("ping")))
//!         .await;
//!     let _ = echo;
//! }
//! ```
//!
//! # Ordering
//!
//! Messages from one sender to one local destination arrive in send order.
//! On remote paths the same holds only while no connect retry intervenes: a
//! retried message can be reordered behind later traffic from the same
//! sender.

#![deny(missing_docs)]

pub mod atom;
pub mod core;
pub mod error;
pub mod monitor;
pub mod node;
pub mod peer;
pub mod process;
pub mod registrar;
pub mod supervisor;
pub mod term;

pub use crate::atom::Atom;
pub use crate::core::{Pid, Ref};
pub use crate::error::{CallError, ConnectError, DecodeError, RegistrarError};
pub use crate::monitor::{Monitor, Monitors};
pub use crate::node::{Connector, Isolated, Node, NodeBuilder, NodeHandle};
pub use crate::peer::Peer;
pub use crate::process::{
    Behavior, Process, ProcessInfo, ProcessView, Signal, SpawnOptions, DEFAULT_MAILBOX_CAPACITY,
};
pub use crate::registrar::{Registrar, REG_SEND};
pub use crate::term::{Term, Tuple};

// Re-exported so behavior impls do not need their own dependency on the
// attribute macro crate.
pub use async_trait::async_trait;

/// Commonly needed imports.
///
/// ```
/// use axon::prelude::*;
/// ```
pub mod prelude {
    pub use crate::atom::Atom;
    pub use crate::core::{Pid, Ref};
    pub use crate::error::{CallError, ConnectError, RegistrarError};
    pub use crate::node::{Connector, Node, NodeHandle};
    pub use crate::peer::Peer;
    pub use crate::process::{Behavior, Process, Signal, SpawnOptions};
    pub use crate::registrar::Registrar;
    pub use crate::supervisor::{
        ChildSpec, Restart, Strategy, Supervisor, SupervisorBehavior, SupervisorFlags,
        SupervisorSpec,
    };
    pub use crate::term::{Term, Tuple};
    pub use crate::{atom, tuple};
}
