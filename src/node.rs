//! Node identity and the spawn surface.
//!
//! A [`Node`] owns the root cancellation scope, the registrar coordinator
//! task, the link/monitor table, and the transport connector. The cloneable
//! [`NodeHandle`] is what every process carries; it is the only way into
//! the registrar from user code.
//!
//! The node boot sequence (listening sockets, handshakes, discovery) lives
//! outside this crate: transports implement [`Connector`] and register
//! peers with the registrar once a link is up.

use crate::atom::Atom;
use crate::core::Ref;
use crate::error::{ConnectError, RegistrarError};
use crate::monitor::{Monitor, Monitors};
use crate::process::{Behavior, Process, SpawnOptions};
use crate::registrar::Registrar;
use crate::term::Term;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default deadline for synchronous calls, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 5;

/// Establishes links to remote nodes on demand.
///
/// The router invokes this from a background task whenever it holds a
/// message for a node with no registered peer. A successful implementation
/// registers a [`crate::peer::Peer`] with the registrar before returning;
/// failures are logged by the caller and the pending route retries either
/// way.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Attempts to bring up a link to `node`.
    async fn connect(&self, registrar: &Registrar, node: Atom) -> Result<(), ConnectError>;
}

/// The connector for nodes without distribution: every attempt fails.
pub struct Isolated;

#[async_trait]
impl Connector for Isolated {
    async fn connect(&self, _registrar: &Registrar, node: Atom) -> Result<(), ConnectError> {
        Err(ConnectError::NoTransport(node))
    }
}

struct NodeInner {
    name: Atom,
    creation: u8,
    context: CancellationToken,
    registrar: Registrar,
    monitor: Arc<dyn Monitor>,
    connector: Arc<dyn Connector>,
    call_timeout: u64,
}

/// A cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

impl NodeHandle {
    /// The node's full name.
    pub fn name(&self) -> Atom {
        self.inner.name
    }

    /// The creation byte of this node incarnation.
    pub fn creation(&self) -> u8 {
        self.inner.creation
    }

    /// The root cancellation scope; cancelling it tears the node down.
    pub fn context(&self) -> &CancellationToken {
        &self.inner.context
    }

    /// The registrar handle.
    pub fn registrar(&self) -> &Registrar {
        &self.inner.registrar
    }

    /// The link/monitor table.
    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.inner.monitor
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        self.inner.connector.clone()
    }

    /// Default call timeout in seconds.
    pub fn call_timeout(&self) -> u64 {
        self.inner.call_timeout
    }

    /// Mints a reference unique within this node instance.
    pub fn make_ref(&self) -> Ref {
        self.inner.registrar.make_ref()
    }

    /// Spawns an anonymous process with default options.
    pub async fn spawn(
        &self,
        behavior: impl Behavior,
        args: Vec<Term>,
    ) -> Result<Arc<Process>, RegistrarError> {
        self.spawn_opts(None, SpawnOptions::new(), Arc::new(behavior), args)
            .await
    }

    /// Spawns a process registered under `name`.
    pub async fn spawn_named(
        &self,
        name: &str,
        behavior: impl Behavior,
        args: Vec<Term>,
    ) -> Result<Arc<Process>, RegistrarError> {
        self.spawn_opts(Some(name), SpawnOptions::new(), Arc::new(behavior), args)
            .await
    }

    /// Spawns a process with explicit options.
    ///
    /// The process is registered before its loop starts; when the loop
    /// returns, the process is unregistered and its exit reason fans out
    /// through the monitor table.
    pub async fn spawn_opts(
        &self,
        name: Option<&str>,
        opts: SpawnOptions,
        behavior: Arc<dyn Behavior>,
        args: Vec<Term>,
    ) -> Result<Arc<Process>, RegistrarError> {
        let process = self
            .registrar()
            .register_process(self, name, behavior, opts)
            .await?;
        let node = self.clone();
        let running = process.clone();
        tokio::spawn(async move {
            let reason = running.behavior().run(running.clone(), args).await;
            tracing::debug!(node = %node.name(), pid = %running.pid(), reason = %reason, "process exited");
            node.registrar().unregister_process(running.pid()).await;
            node.monitor().process_down(running.pid(), reason).await;
            running.kill();
        });
        Ok(process)
    }

    /// Cancels the node; the registrar kills every process and stops.
    pub fn shutdown(&self) {
        self.inner.context.cancel();
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.inner.name)
            .field("creation", &self.inner.creation)
            .finish()
    }
}

/// A local runtime node.
///
/// ```no_run
/// use axon::node::Node;
///
/// # async fn demo() {
/// let node = Node::new("demo@localhost");
/// # let _ = node;
/// # }
/// ```
pub struct Node {
    handle: NodeHandle,
}

impl Node {
    /// Starts a node with default options: creation 1, no transport.
    ///
    /// Must run inside a tokio runtime; the registrar coordinator is
    /// spawned immediately.
    pub fn new(name: &str) -> Self {
        Self::builder(name).start()
    }

    /// Starts configuring a node.
    pub fn builder(name: &str) -> NodeBuilder {
        NodeBuilder {
            name: name.to_owned(),
            creation: 1,
            connector: None,
            call_timeout: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }

    /// A cloneable handle to this node.
    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }
}

impl std::ops::Deref for Node {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.handle
    }
}

/// Builder for [`Node`].
pub struct NodeBuilder {
    name: String,
    creation: u8,
    connector: Option<Arc<dyn Connector>>,
    call_timeout: u64,
}

impl NodeBuilder {
    /// Sets the creation byte distinguishing this incarnation.
    pub fn creation(mut self, creation: u8) -> Self {
        self.creation = creation;
        self
    }

    /// Installs the transport connector.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Overrides the default call timeout in seconds.
    pub fn call_timeout(mut self, secs: u64) -> Self {
        self.call_timeout = secs;
        self
    }

    /// Starts the node and its registrar coordinator.
    pub fn start(self) -> Node {
        let name = Atom::new(&self.name);
        let (registrar, inbox) = Registrar::channel(name, self.creation);
        let monitor: Arc<dyn Monitor> = Arc::new(Monitors::new(registrar.clone()));
        let connector = self.connector.unwrap_or_else(|| Arc::new(Isolated));
        let handle = NodeHandle {
            inner: Arc::new(NodeInner {
                name,
                creation: self.creation,
                context: CancellationToken::new(),
                registrar,
                monitor,
                connector,
                call_timeout: self.call_timeout,
            }),
        };
        tokio::spawn(crate::registrar::run(inbox, handle.clone()));
        tracing::debug!(node = %name, creation = self.creation, "node started");
        Node { handle }
    }
}
