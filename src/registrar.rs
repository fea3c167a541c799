//! The registrar: single-writer coordinator and message router.
//!
//! The registrar owns the three authoritative maps of a node (registered
//! names, live processes, connected peers), and every mutation or route
//! passes through one coordinator task consuming typed request channels.
//! That single writer is what keeps the cross-map invariants (every named
//! pid is a live local process, one peer per node name) without any locking
//! on the maps themselves.
//!
//! Routing is fire-and-forget. A destination with no local process or no
//! known name is dropped with a log entry. A destination on a node with no
//! registered peer triggers a background connect attempt and the request is
//! re-enqueued with an incremented retry counter; after three attempts the
//! message is dropped. A retried message can therefore be reordered behind
//! later messages from the same sender: FIFO holds per sender and
//! destination only on the local, retry-free path.
//!
//! Mailbox delivery awaits mailbox capacity, so the coordinator is stalled
//! by a full mailbox; size mailboxes for the expected burst.

use crate::atom::Atom;
use crate::core::{Pid, Ref};
use crate::error::RegistrarError;
use crate::node::NodeHandle;
use crate::peer::Peer;
use crate::process::{Behavior, Process, ProcessView, SpawnOptions};
use crate::term::{Term, Tuple};
use crate::tuple;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Control tag for a registered send, as used by the distribution protocol.
pub const REG_SEND: i64 = 6;

/// First local id handed out by the pid allocator.
const PID_BASE: u32 = 1000;

const REGISTRATION_QUEUE: usize = 10;
const ROUTE_QUEUE: usize = 100;
const COMMAND_QUEUE: usize = 100;

struct RegisterProcess {
    process: Arc<Process>,
    reply: oneshot::Sender<Result<(), RegistrarError>>,
}

struct RegisterName {
    name: String,
    pid: Pid,
    reply: oneshot::Sender<Result<(), RegistrarError>>,
}

struct RegisterPeer {
    name: Atom,
    peer: Peer,
    reply: oneshot::Sender<Result<(), RegistrarError>>,
}

struct RouteByPid {
    from: Pid,
    to: Pid,
    message: Term,
    retries: u8,
}

struct RouteByName {
    from: Pid,
    name: String,
    message: Term,
}

struct RouteByTuple {
    from: Pid,
    destination: Tuple,
    message: Term,
    retries: u8,
}

struct RouteRaw {
    node: Atom,
    message: Term,
    retries: u8,
}

enum Command {
    ProcessByPid {
        pid: Pid,
        reply: oneshot::Sender<Option<ProcessView>>,
    },
    ProcessByName {
        name: String,
        reply: oneshot::Sender<Option<ProcessView>>,
    },
}

#[derive(Clone)]
struct Channels {
    register_process: mpsc::Sender<RegisterProcess>,
    unregister_process: mpsc::Sender<Pid>,
    register_name: mpsc::Sender<RegisterName>,
    unregister_name: mpsc::Sender<String>,
    register_peer: mpsc::Sender<RegisterPeer>,
    unregister_peer: mpsc::Sender<Atom>,
    route_by_pid: mpsc::Sender<RouteByPid>,
    route_by_name: mpsc::Sender<RouteByName>,
    route_by_tuple: mpsc::Sender<RouteByTuple>,
    route_raw: mpsc::Sender<RouteRaw>,
    commands: mpsc::Sender<Command>,
}

pub(crate) struct RegistrarInbox {
    register_process: mpsc::Receiver<RegisterProcess>,
    unregister_process: mpsc::Receiver<Pid>,
    register_name: mpsc::Receiver<RegisterName>,
    unregister_name: mpsc::Receiver<String>,
    register_peer: mpsc::Receiver<RegisterPeer>,
    unregister_peer: mpsc::Receiver<Atom>,
    route_by_pid: mpsc::Receiver<RouteByPid>,
    route_by_name: mpsc::Receiver<RouteByName>,
    route_by_tuple: mpsc::Receiver<RouteByTuple>,
    route_raw: mpsc::Receiver<RouteRaw>,
    commands: mpsc::Receiver<Command>,
}

/// Handle to a node's registrar.
///
/// Cloneable; all operations enqueue on the coordinator task. Synchronous
/// operations block on a per-request reply channel.
#[derive(Clone)]
pub struct Registrar {
    node_name: Atom,
    creation: u8,
    next_pid: Arc<AtomicU32>,
    next_ref: Arc<AtomicU64>,
    channels: Channels,
}

impl Registrar {
    pub(crate) fn channel(node_name: Atom, creation: u8) -> (Self, RegistrarInbox) {
        let (register_process_tx, register_process) = mpsc::channel(REGISTRATION_QUEUE);
        let (unregister_process_tx, unregister_process) = mpsc::channel(REGISTRATION_QUEUE);
        let (register_name_tx, register_name) = mpsc::channel(REGISTRATION_QUEUE);
        let (unregister_name_tx, unregister_name) = mpsc::channel(REGISTRATION_QUEUE);
        let (register_peer_tx, register_peer) = mpsc::channel(REGISTRATION_QUEUE);
        let (unregister_peer_tx, unregister_peer) = mpsc::channel(REGISTRATION_QUEUE);
        let (route_by_pid_tx, route_by_pid) = mpsc::channel(ROUTE_QUEUE);
        let (route_by_name_tx, route_by_name) = mpsc::channel(ROUTE_QUEUE);
        let (route_by_tuple_tx, route_by_tuple) = mpsc::channel(ROUTE_QUEUE);
        let (route_raw_tx, route_raw) = mpsc::channel(ROUTE_QUEUE);
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);

        let registrar = Self {
            node_name,
            creation,
            next_pid: Arc::new(AtomicU32::new(PID_BASE)),
            next_ref: Arc::new(AtomicU64::new(0)),
            channels: Channels {
                register_process: register_process_tx,
                unregister_process: unregister_process_tx,
                register_name: register_name_tx,
                unregister_name: unregister_name_tx,
                register_peer: register_peer_tx,
                unregister_peer: unregister_peer_tx,
                route_by_pid: route_by_pid_tx,
                route_by_name: route_by_name_tx,
                route_by_tuple: route_by_tuple_tx,
                route_raw: route_raw_tx,
                commands: commands_tx,
            },
        };
        let inbox = RegistrarInbox {
            register_process,
            unregister_process,
            register_name,
            unregister_name,
            register_peer,
            unregister_peer,
            route_by_pid,
            route_by_name,
            route_by_tuple,
            route_raw,
            commands,
        };
        (registrar, inbox)
    }

    /// The name of the node this registrar serves.
    pub fn node_name(&self) -> Atom {
        self.node_name
    }

    /// Allocates a fresh local pid. Ids are strictly increasing for the
    /// lifetime of the node incarnation.
    pub(crate) fn allocate_pid(&self) -> Pid {
        let id = self.next_pid.fetch_add(1, Ordering::Relaxed) + 1;
        Pid::new(self.node_name, id, self.creation)
    }

    /// Mints a reference unique within this node instance.
    pub fn make_ref(&self) -> Ref {
        Ref::new(self.node_name, self.next_ref.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Constructs and registers a process.
    ///
    /// The mailbox and cancellation scope are allocated up front; the
    /// coordinator then inserts the process (and its name, when given)
    /// atomically. Fails with [`RegistrarError::NameTaken`] when the name
    /// is already registered.
    pub async fn register_process(
        &self,
        node: &NodeHandle,
        name: Option<&str>,
        behavior: Arc<dyn Behavior>,
        opts: SpawnOptions,
    ) -> Result<Arc<Process>, RegistrarError> {
        let pid = self.allocate_pid();
        let process = Process::new(pid, name.map(str::to_owned), node.clone(), behavior, opts);
        let (reply, confirmed) = oneshot::channel();
        self.channels
            .register_process
            .send(RegisterProcess {
                process: process.clone(),
                reply,
            })
            .await
            .map_err(|_| RegistrarError::Closed)?;
        confirmed.await.map_err(|_| RegistrarError::Closed)??;
        Ok(process)
    }

    /// Removes a process and any names still pointing at it. Fire-and-forget.
    pub async fn unregister_process(&self, pid: Pid) {
        let _ = self.channels.unregister_process.send(pid).await;
    }

    /// Associates a name with a pid.
    pub async fn register_name(&self, name: &str, pid: Pid) -> Result<(), RegistrarError> {
        let (reply, confirmed) = oneshot::channel();
        self.channels
            .register_name
            .send(RegisterName {
                name: name.to_owned(),
                pid,
                reply,
            })
            .await
            .map_err(|_| RegistrarError::Closed)?;
        confirmed.await.map_err(|_| RegistrarError::Closed)?
    }

    /// Removes a name association. Fire-and-forget.
    pub async fn unregister_name(&self, name: &str) {
        let _ = self.channels.unregister_name.send(name.to_owned()).await;
    }

    /// Registers a peer link for a remote node.
    pub async fn register_peer(
        &self,
        name: impl Into<Atom>,
        peer: Peer,
    ) -> Result<(), RegistrarError> {
        let (reply, confirmed) = oneshot::channel();
        self.channels
            .register_peer
            .send(RegisterPeer {
                name: name.into(),
                peer,
                reply,
            })
            .await
            .map_err(|_| RegistrarError::Closed)?;
        confirmed.await.map_err(|_| RegistrarError::Closed)?
    }

    /// Removes a peer link, notifying node monitors. Fire-and-forget.
    pub async fn unregister_peer(&self, name: impl Into<Atom>) {
        let _ = self.channels.unregister_peer.send(name.into()).await;
    }

    /// Looks up a process by pid, returning a snapshot.
    pub async fn get_process_by_pid(&self, pid: Pid) -> Option<ProcessView> {
        let (reply, view) = oneshot::channel();
        if self
            .channels
            .commands
            .send(Command::ProcessByPid { pid, reply })
            .await
            .is_err()
        {
            return None;
        }
        view.await.unwrap_or(None)
    }

    /// Looks up a process by registered name, returning a snapshot.
    pub async fn get_process_by_name(&self, name: &str) -> Option<ProcessView> {
        let (reply, view) = oneshot::channel();
        if self
            .channels
            .commands
            .send(Command::ProcessByName {
                name: name.to_owned(),
                reply,
            })
            .await
            .is_err()
        {
            return None;
        }
        view.await.unwrap_or(None)
    }

    /// Routes a message to a destination.
    ///
    /// The destination shape selects the path: a pid routes directly, a
    /// two-element `(name, node)` tuple routes through the named-process
    /// table of the target node, a string or atom routes through the local
    /// name table. Anything else is dropped with a log entry. Delivery is
    /// best-effort and asynchronous.
    pub async fn route(&self, from: Pid, to: Term, message: Term) {
        match classify(from, to, message) {
            RouteRequest::ByPid(request) => {
                let _ = self.channels.route_by_pid.send(request).await;
            }
            RouteRequest::ByName(request) => {
                let _ = self.channels.route_by_name.send(request).await;
            }
            RouteRequest::ByTuple(request) => {
                let _ = self.channels.route_by_tuple.send(request).await;
            }
            RouteRequest::Unroutable(destination) => {
                tracing::debug!(node = %self.node_name, %destination, "unroutable destination, message dropped");
            }
        }
    }

    /// Forwards a preformed wire term to a remote node unchanged.
    pub async fn route_raw(&self, node: impl Into<Atom>, message: Term) {
        let _ = self
            .channels
            .route_raw
            .send(RouteRaw {
                node: node.into(),
                message,
                retries: 0,
            })
            .await;
    }

    /// Non-blocking re-entry used by the coordinator itself when a name or
    /// tuple route resolves to a further destination. Dropping on a full
    /// queue here keeps the coordinator from deadlocking on its own input.
    fn requeue(&self, from: Pid, to: Term, message: Term) {
        let full = match classify(from, to, message) {
            RouteRequest::ByPid(request) => self.channels.route_by_pid.try_send(request).is_err(),
            RouteRequest::ByName(request) => self.channels.route_by_name.try_send(request).is_err(),
            RouteRequest::ByTuple(request) => {
                self.channels.route_by_tuple.try_send(request).is_err()
            }
            RouteRequest::Unroutable(destination) => {
                tracing::debug!(node = %self.node_name, %destination, "unroutable destination, message dropped");
                false
            }
        };
        if full {
            tracing::warn!(node = %self.node_name, "router queue full, message dropped");
        }
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("node", &self.node_name)
            .finish()
    }
}

enum RouteRequest {
    ByPid(RouteByPid),
    ByName(RouteByName),
    ByTuple(RouteByTuple),
    Unroutable(Term),
}

fn classify(from: Pid, to: Term, message: Term) -> RouteRequest {
    match to {
        Term::Pid(to) => RouteRequest::ByPid(RouteByPid {
            from,
            to,
            message,
            retries: 0,
        }),
        Term::Tuple(destination) if destination.len() == 2 => {
            RouteRequest::ByTuple(RouteByTuple {
                from,
                destination,
                message,
                retries: 0,
            })
        }
        Term::Atom(name) => RouteRequest::ByName(RouteByName {
            from,
            name: name.as_str(),
            message,
        }),
        Term::Str(name) => RouteRequest::ByName(RouteByName {
            from,
            name,
            message,
        }),
        other => RouteRequest::Unroutable(other),
    }
}

/// The coordinator task. Consumes requests in arrival order until the node's
/// cancellation scope fires, then kills every registered process and stops.
pub(crate) async fn run(mut inbox: RegistrarInbox, node: NodeHandle) {
    let mut names: HashMap<String, Pid> = HashMap::new();
    let mut processes: HashMap<Pid, Arc<Process>> = HashMap::new();
    let mut peers: HashMap<Atom, Peer> = HashMap::new();

    loop {
        tokio::select! {
            _ = node.context().cancelled() => {
                tracing::debug!(node = %node.name(), processes = processes.len(), "finalizing registrar");
                for process in processes.values() {
                    process.kill();
                }
                return;
            }
            Some(request) = inbox.register_process.recv() => {
                register_process(request, &mut names, &mut processes, &node);
            }
            Some(pid) = inbox.unregister_process.recv() => {
                unregister_process(pid, &mut names, &mut processes, &node);
            }
            Some(request) = inbox.register_name.recv() => {
                register_name(request, &mut names, &node);
            }
            Some(name) = inbox.unregister_name.recv() => {
                tracing::debug!(node = %node.name(), name, "unregistering name");
                names.remove(&name);
            }
            Some(request) = inbox.register_peer.recv() => {
                register_peer(request, &mut peers, &node);
            }
            Some(name) = inbox.unregister_peer.recv() => {
                unregister_peer(name, &mut peers, &node);
            }
            Some(request) = inbox.route_by_pid.recv() => {
                route_by_pid(request, &processes, &peers, &node).await;
            }
            Some(request) = inbox.route_by_name.recv() => {
                route_by_name(request, &names, &node);
            }
            Some(request) = inbox.route_by_tuple.recv() => {
                route_by_tuple(request, &peers, &node).await;
            }
            Some(request) = inbox.route_raw.recv() => {
                route_raw(request, &peers, &node).await;
            }
            Some(command) = inbox.commands.recv() => {
                handle_command(command, &names, &processes);
            }
            else => return,
        }
    }
}

fn register_process(
    request: RegisterProcess,
    names: &mut HashMap<String, Pid>,
    processes: &mut HashMap<Pid, Arc<Process>>,
    node: &NodeHandle,
) {
    let process = request.process;
    if let Some(name) = process.name() {
        if names.contains_key(name) {
            let _ = request.reply.send(Err(RegistrarError::NameTaken));
            return;
        }
        names.insert(name.to_owned(), process.pid());
    }
    tracing::debug!(node = %node.name(), pid = %process.pid(), name = ?process.name(), "registering process");
    processes.insert(process.pid(), process);
    let _ = request.reply.send(Ok(()));
}

fn unregister_process(
    pid: Pid,
    names: &mut HashMap<String, Pid>,
    processes: &mut HashMap<Pid, Arc<Process>>,
    node: &NodeHandle,
) {
    if let Some(process) = processes.remove(&pid) {
        tracing::debug!(node = %node.name(), pid = %pid, "unregistering process");
        if let Some(name) = process.name() {
            names.remove(name);
        }
        // Sweep aliases registered for this pid through register_name.
        names.retain(|_, registered| *registered != pid);
    }
}

fn register_name(request: RegisterName, names: &mut HashMap<String, Pid>, node: &NodeHandle) {
    tracing::debug!(node = %node.name(), name = %request.name, pid = %request.pid, "registering name");
    if names.contains_key(&request.name) {
        let _ = request.reply.send(Err(RegistrarError::NameTaken));
        return;
    }
    names.insert(request.name, request.pid);
    let _ = request.reply.send(Ok(()));
}

fn register_peer(request: RegisterPeer, peers: &mut HashMap<Atom, Peer>, node: &NodeHandle) {
    tracing::debug!(node = %node.name(), peer = %request.name, "registering peer");
    if peers.contains_key(&request.name) {
        let _ = request.reply.send(Err(RegistrarError::PeerAlreadyKnown));
        return;
    }
    peers.insert(request.name, request.peer);
    let _ = request.reply.send(Ok(()));
}

fn unregister_peer(name: Atom, peers: &mut HashMap<Atom, Peer>, node: &NodeHandle) {
    if peers.remove(&name).is_some() {
        tracing::debug!(node = %node.name(), peer = %name, "unregistering peer");
        let monitor = node.monitor().clone();
        tokio::spawn(async move {
            monitor.node_down(name).await;
        });
    }
}

async fn route_by_pid(
    request: RouteByPid,
    processes: &HashMap<Pid, Arc<Process>>,
    peers: &HashMap<Atom, Peer>,
    node: &NodeHandle,
) {
    if request.retries > 2 {
        tracing::debug!(node = %node.name(), to = %request.to, "delivery attempts exhausted, message dropped");
        return;
    }
    if request.to.node() == node.name() {
        match processes.get(&request.to) {
            Some(process) => process.deliver(request.from, request.message).await,
            None => {
                tracing::debug!(node = %node.name(), to = %request.to, "unknown local pid, message dropped");
            }
        }
        return;
    }
    match peers.get(&request.to.node()) {
        Some(peer) => {
            let control = tuple!(REG_SEND, request.from, Atom::new(""), request.to);
            peer.push(vec![control, request.message]).await;
        }
        None => {
            let target = request.to.node();
            connect_and_requeue(node, target, Retry::ByPid(request));
        }
    }
}

fn route_by_name(request: RouteByName, names: &HashMap<String, Pid>, node: &NodeHandle) {
    match names.get(&request.name) {
        Some(pid) => {
            node.registrar()
                .requeue(request.from, Term::Pid(*pid), request.message);
        }
        None => {
            tracing::debug!(node = %node.name(), name = %request.name, "unknown name, message dropped");
        }
    }
}

async fn route_by_tuple(request: RouteByTuple, peers: &HashMap<Atom, Peer>, node: &NodeHandle) {
    if request.retries > 2 {
        tracing::debug!(node = %node.name(), "delivery attempts exhausted, message dropped");
        return;
    }
    let Some(target_node) = request.destination.element(1).and_then(Term::as_atom) else {
        tracing::debug!(node = %node.name(), "malformed routing tuple, message dropped");
        return;
    };
    let Some(target_name) = request.destination.element(0).cloned() else {
        return;
    };
    if target_node == node.name() {
        node.registrar()
            .requeue(request.from, target_name, request.message);
        return;
    }
    match peers.get(&target_node) {
        Some(peer) => {
            let control = tuple!(REG_SEND, request.from, Atom::new(""), target_name);
            peer.push(vec![control, request.message]).await;
        }
        None => {
            connect_and_requeue(node, target_node, Retry::ByTuple(request));
        }
    }
}

async fn route_raw(request: RouteRaw, peers: &HashMap<Atom, Peer>, node: &NodeHandle) {
    if request.retries > 2 {
        tracing::debug!(node = %node.name(), peer = %request.node, "delivery attempts exhausted, message dropped");
        return;
    }
    match peers.get(&request.node) {
        Some(peer) => peer.push(vec![request.message]).await,
        None => {
            let target = request.node;
            connect_and_requeue(node, target, Retry::Raw(request));
        }
    }
}

enum Retry {
    ByPid(RouteByPid),
    ByTuple(RouteByTuple),
    Raw(RouteRaw),
}

/// Spawns a best-effort connect attempt and re-enqueues the request with an
/// incremented retry counter once the attempt has finished, successful or
/// not. Keeps connection latency off the coordinator.
fn connect_and_requeue(node: &NodeHandle, target: Atom, retry: Retry) {
    let registrar = node.registrar().clone();
    let connector = node.connector();
    tokio::spawn(async move {
        if let Err(error) = connector.connect(&registrar, target).await {
            tracing::debug!(node = %registrar.node_name, peer = %target, %error, "connect attempt failed");
        }
        match retry {
            Retry::ByPid(mut request) => {
                request.retries += 1;
                let _ = registrar.channels.route_by_pid.send(request).await;
            }
            Retry::ByTuple(mut request) => {
                request.retries += 1;
                let _ = registrar.channels.route_by_tuple.send(request).await;
            }
            Retry::Raw(mut request) => {
                request.retries += 1;
                let _ = registrar.channels.route_raw.send(request).await;
            }
        }
    });
}

fn handle_command(
    command: Command,
    names: &HashMap<String, Pid>,
    processes: &HashMap<Pid, Arc<Process>>,
) {
    match command {
        Command::ProcessByPid { pid, reply } => {
            let _ = reply.send(processes.get(&pid).map(|process| process.view()));
        }
        Command::ProcessByName { name, reply } => {
            let view = names
                .get(&name)
                .and_then(|pid| processes.get(pid))
                .map(|process| process.view());
            let _ = reply.send(view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::{atom, tuple};
    use crate::node::{Connector, Node, NodeHandle};
    use crate::process::Signal;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::timeout;

    /// A behavior that parks until cancelled; used when the test itself
    /// drives the mailbox.
    struct Idle;

    #[async_trait]
    impl Behavior for Idle {
        async fn run(&self, process: Arc<Process>, _args: Vec<Term>) -> Atom {
            process.cancel_token().cancelled().await;
            atom!("shutdown")
        }
    }

    async fn register(
        node: &NodeHandle,
        name: Option<&str>,
        opts: SpawnOptions,
    ) -> Arc<Process> {
        node.registrar()
            .register_process(node, name, Arc::new(Idle), opts)
            .await
            .expect("registration failed")
    }

    async fn expect_message(process: &Process) -> (Pid, Term) {
        match timeout(Duration::from_secs(5), process.recv()).await {
            Ok(Signal::Message { from, message }) => (from, message),
            other => panic!("expected a mailbox message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn local_send_by_pid() {
        let node = Node::new("reg1@localhost").handle();
        let process = register(&node, None, SpawnOptions::new().mailbox_capacity(10)).await;

        node.registrar()
            .route(Pid::nil(), Term::Pid(process.pid()), tuple!(atom!("ping")))
            .await;

        let (from, message) = expect_message(&process).await;
        assert!(from.is_nil());
        assert_eq!(message, tuple!(atom!("ping")));
    }

    #[tokio::test]
    async fn local_send_by_name() {
        let node = Node::new("reg2@localhost").handle();
        let process = register(&node, Some("echo"), SpawnOptions::new()).await;

        node.registrar()
            .route(Pid::nil(), Term::atom("echo"), Term::Int(1))
            .await;
        node.registrar()
            .route(Pid::nil(), Term::str("echo"), Term::Int(2))
            .await;

        assert_eq!(expect_message(&process).await.1, Term::Int(1));
        assert_eq!(expect_message(&process).await.1, Term::Int(2));
    }

    #[tokio::test]
    async fn name_collision_is_reported() {
        let node = Node::new("reg3@localhost").handle();
        let first = register(&node, None, SpawnOptions::new()).await;
        let second = register(&node, None, SpawnOptions::new()).await;

        assert_eq!(node.registrar().register_name("svc", first.pid()).await, Ok(()));
        assert_eq!(
            node.registrar().register_name("svc", second.pid()).await,
            Err(RegistrarError::NameTaken)
        );

        let view = node.registrar().get_process_by_name("svc").await.unwrap();
        assert_eq!(view.pid, first.pid());
    }

    #[tokio::test]
    async fn named_registration_collision() {
        let node = Node::new("reg4@localhost").handle();
        let _first = register(&node, Some("svc"), SpawnOptions::new()).await;

        let second = node
            .registrar()
            .register_process(&node, Some("svc"), Arc::new(Idle), SpawnOptions::new())
            .await;
        assert_eq!(second.unwrap_err(), RegistrarError::NameTaken);
    }

    #[tokio::test]
    async fn name_can_be_reused_after_unregister() {
        let node = Node::new("reg5@localhost").handle();
        let first = register(&node, None, SpawnOptions::new()).await;
        let second = register(&node, None, SpawnOptions::new()).await;

        node.registrar().register_name("svc", first.pid()).await.unwrap();
        node.registrar().unregister_name("svc").await;
        node.registrar().register_name("svc", second.pid()).await.unwrap();

        let view = node.registrar().get_process_by_name("svc").await.unwrap();
        assert_eq!(view.pid, second.pid());
    }

    #[tokio::test]
    async fn unregister_sweeps_all_names() {
        let node = Node::new("reg6@localhost").handle();
        let process = register(&node, Some("primary"), SpawnOptions::new()).await;
        node.registrar()
            .register_name("alias", process.pid())
            .await
            .unwrap();

        node.registrar().unregister_process(process.pid()).await;

        // Both the primary name and the alias must be gone.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let primary = node.registrar().get_process_by_name("primary").await;
            let alias = node.registrar().get_process_by_name("alias").await;
            if primary.is_none() && alias.is_none() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "names not swept");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // And both names are free for re-registration.
        let replacement = register(&node, Some("primary"), SpawnOptions::new()).await;
        node.registrar()
            .register_name("alias", replacement.pid())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pid_allocation_is_strictly_increasing() {
        let node = Node::new("reg7@localhost").handle();
        let mut last = node.registrar().allocate_pid().id();
        for _ in 0..100 {
            let next = node.registrar().allocate_pid().id();
            assert!(next > last);
            last = next;
        }
        assert!(last > 1000);
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let node = Node::new("reg8@localhost").handle();
        let process = register(&node, Some("stable"), SpawnOptions::new()).await;

        let mut view = node.registrar().get_process_by_name("stable").await.unwrap();
        assert_eq!(view.pid, process.pid());
        view.name = Some("scribbled".to_owned());
        view.message_count = 999;

        let fresh = node.registrar().get_process_by_name("stable").await.unwrap();
        assert_eq!(fresh.name.as_deref(), Some("stable"));
        assert_eq!(fresh.message_count, 0);
    }

    #[tokio::test]
    async fn unroutable_destination_is_ignored() {
        let node = Node::new("reg9@localhost").handle();
        let process = register(&node, Some("after"), SpawnOptions::new()).await;

        node.registrar()
            .route(Pid::nil(), Term::Int(7), Term::atom("lost"))
            .await;
        node.registrar()
            .route(Pid::nil(), Term::atom("nobody-here"), Term::atom("lost"))
            .await;
        // A three-element tuple is not a routable (name, node) destination.
        node.registrar()
            .route(
                Pid::nil(),
                Term::tuple(vec![Term::atom("a"), Term::atom("b"), Term::atom("c")]),
                Term::atom("lost"),
            )
            .await;

        // The coordinator survived all three drops.
        node.registrar()
            .route(Pid::nil(), Term::atom("after"), Term::atom("kept"))
            .await;
        assert_eq!(expect_message(&process).await.1, Term::atom("kept"));
    }

    #[tokio::test]
    async fn fifo_per_sender_and_destination() {
        let node = Node::new("reg10@localhost").handle();
        let process = register(&node, None, SpawnOptions::new()).await;

        for n in 0..20i64 {
            node.registrar()
                .route(Pid::nil(), Term::Pid(process.pid()), Term::Int(n))
                .await;
        }
        for n in 0..20i64 {
            assert_eq!(expect_message(&process).await.1, Term::Int(n));
        }
    }

    /// Fails on the first attempt and registers the peer on the second,
    /// leaving a window where the peer is still unknown after one retry.
    struct FlakyConnector {
        peer: Peer,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self, registrar: &Registrar, node: Atom) -> Result<(), ConnectError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt == 2 {
                registrar
                    .register_peer(node, self.peer.clone())
                    .await
                    .map_err(|error| ConnectError::Failed {
                        node,
                        reason: error.to_string(),
                    })?;
                Ok(())
            } else {
                Err(ConnectError::Failed {
                    node,
                    reason: "connection refused".to_owned(),
                })
            }
        }
    }

    #[tokio::test]
    async fn remote_route_retries_until_connected() {
        let (peer, mut frames) = Peer::channel(8);
        let attempts = Arc::new(AtomicUsize::new(0));
        let node = Node::builder("reg11@localhost")
            .connector(FlakyConnector {
                peer,
                attempts: attempts.clone(),
            })
            .start()
            .handle();

        let remote = Pid::from_parts(atom!("n2@localhost"), 5000, 1, 1);
        node.registrar()
            .route(Pid::nil(), Term::Pid(remote), tuple!(atom!("hello")))
            .await;

        let frame = timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("no frame before deadline")
            .expect("peer sink closed");
        assert_eq!(frame.len(), 2);
        let control = frame[0].as_tuple().expect("control element is a tuple");
        assert_eq!(control.element(0).unwrap().as_int(), Some(REG_SEND));
        assert!(control.element(1).unwrap().as_pid().unwrap().is_nil());
        assert_eq!(control.element(2).unwrap().as_atom(), Some(Atom::new("")));
        assert_eq!(control.element(3).unwrap().as_pid(), Some(remote));
        assert_eq!(frame[1], tuple!(atom!("hello")));

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // Exactly one frame: the message is not re-sent after delivery.
        assert!(timeout(Duration::from_millis(200), frames.recv()).await.is_err());
    }

    #[tokio::test]
    async fn remote_route_by_tuple_uses_registered_name_frame() {
        let (peer, mut frames) = Peer::channel(8);
        let node = Node::new("reg12@localhost").handle();
        node.registrar().register_peer("n2@localhost", peer).await.unwrap();

        node.registrar()
            .route(
                Pid::nil(),
                tuple!(atom!("worker"), atom!("n2@localhost")),
                Term::Int(9),
            )
            .await;

        let frame = timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        let control = frame[0].as_tuple().unwrap();
        assert_eq!(control.element(0).unwrap().as_int(), Some(REG_SEND));
        assert_eq!(control.element(3).unwrap().as_atom(), Some(atom!("worker")));
        assert_eq!(frame[1], Term::Int(9));
    }

    #[tokio::test]
    async fn route_tuple_to_local_node_resolves_locally() {
        let node = Node::new("reg13@localhost").handle();
        let process = register(&node, Some("local-worker"), SpawnOptions::new()).await;

        node.registrar()
            .route(
                Pid::nil(),
                tuple!(atom!("local-worker"), atom!("reg13@localhost")),
                Term::Int(3),
            )
            .await;
        assert_eq!(expect_message(&process).await.1, Term::Int(3));
    }

    #[tokio::test]
    async fn exhausted_retries_are_dropped() {
        let (peer, mut frames) = Peer::channel(8);
        let node = Node::new("reg14@localhost").handle();
        node.registrar().register_peer("n2@localhost", peer).await.unwrap();

        let remote = Pid::from_parts(atom!("n2@localhost"), 5000, 1, 1);
        node.registrar()
            .channels
            .route_by_pid
            .send(RouteByPid {
                from: Pid::nil(),
                to: remote,
                message: Term::atom("late"),
                retries: 3,
            })
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(200), frames.recv()).await.is_err());
    }

    #[tokio::test]
    async fn route_raw_forwards_frame_unchanged() {
        let (peer, mut frames) = Peer::channel(8);
        let node = Node::new("reg15@localhost").handle();
        node.registrar().register_peer("n2@localhost", peer).await.unwrap();

        let payload = tuple!(atom!("ctl"), Term::Int(42));
        node.registrar().route_raw("n2@localhost", payload.clone()).await;

        let frame = timeout(Duration::from_secs(5), frames.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, vec![payload]);
    }

    #[tokio::test]
    async fn duplicate_peer_is_rejected() {
        let node = Node::new("reg16@localhost").handle();
        let (peer, _frames) = Peer::channel(8);
        node.registrar()
            .register_peer("n2@localhost", peer.clone())
            .await
            .unwrap();
        assert_eq!(
            node.registrar().register_peer("n2@localhost", peer).await,
            Err(RegistrarError::PeerAlreadyKnown)
        );
    }

    #[tokio::test]
    async fn node_shutdown_kills_registered_processes() {
        let node = Node::new("reg17@localhost").handle();
        let process = register(&node, None, SpawnOptions::new()).await;
        assert!(process.is_alive());

        node.shutdown();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while process.is_alive() {
            assert!(tokio::time::Instant::now() < deadline, "process not killed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
