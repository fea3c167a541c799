//! Process handles and process-side operations.
//!
//! A [`Process`] is a lightweight isolated unit owning a bounded mailbox, a
//! cancellation scope, and a user-supplied [`Behavior`] that drives its
//! message loop. All sends go through the node's registrar, so a destination
//! can be a pid, a locally registered name, or a `(name, node)` tuple for a
//! process on another node.
//!
//! The mailbox carries `(sender, payload)` pairs. Alongside it every process
//! owns a small reply channel (capacity 2) used exclusively to complete
//! synchronous calls, and a stop channel for graceful shutdown requests.

use crate::atom::Atom;
use crate::core::{Pid, Ref};
use crate::error::CallError;
use crate::node::NodeHandle;
use crate::term::Term;
use crate::{atom, tuple};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Mailbox capacity used when spawn options do not override it.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

const REPLY_CAPACITY: usize = 2;
const STOP_CAPACITY: usize = 2;

/// A process message loop.
///
/// The returned atom is the exit reason; `normal` for a loop that simply
/// finished, `shutdown` when it was asked (or cancelled) to stop.
#[async_trait]
pub trait Behavior: Send + Sync + 'static {
    /// Runs the process until it terminates.
    async fn run(&self, process: Arc<Process>, args: Vec<Term>) -> Atom;
}

/// Options for spawning a process.
#[derive(Default)]
pub struct SpawnOptions {
    mailbox_capacity: Option<usize>,
    group_leader: Option<Arc<Process>>,
    pub(crate) parent: Option<Arc<Process>>,
}

impl SpawnOptions {
    /// Default options: default mailbox size, no group leader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the mailbox capacity.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    /// Sets the group leader whose environment the process inherits.
    pub fn group_leader(mut self, leader: Arc<Process>) -> Self {
        self.group_leader = Some(leader);
        self
    }

    /// Scopes the process's cancellation under `parent` instead of the
    /// node, so killing the parent cancels this process too.
    pub fn parent(mut self, parent: Arc<Process>) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// One wake-up of a process loop.
#[derive(Debug)]
pub enum Signal {
    /// A mailbox message.
    Message {
        /// The sending process.
        from: Pid,
        /// The payload.
        message: Term,
    },
    /// A graceful stop request.
    Stop {
        /// Who asked.
        from: Pid,
        /// The requested exit reason.
        reason: Atom,
    },
    /// The process's cancellation scope fired; exit with reason `shutdown`.
    Shutdown,
}

/// A running process.
pub struct Process {
    pid: Pid,
    name: Option<String>,
    node: NodeHandle,
    behavior: Arc<dyn Behavior>,
    cancel: CancellationToken,
    mailbox_tx: mpsc::Sender<(Pid, Term)>,
    mailbox_rx: Mutex<mpsc::Receiver<(Pid, Term)>>,
    reply_tx: mpsc::Sender<(Ref, Term)>,
    reply_rx: Mutex<mpsc::Receiver<(Ref, Term)>>,
    stop_tx: mpsc::Sender<(Pid, Atom)>,
    stop_rx: Mutex<mpsc::Receiver<(Pid, Atom)>>,
    group_leader: Option<Arc<Process>>,
    env: RwLock<HashMap<String, Term>>,
    state: RwLock<Option<Term>>,
    trap_exit: AtomicBool,
    message_count: AtomicU64,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        name: Option<String>,
        node: NodeHandle,
        behavior: Arc<dyn Behavior>,
        opts: SpawnOptions,
    ) -> Arc<Self> {
        let capacity = opts
            .mailbox_capacity
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_MAILBOX_CAPACITY);
        let cancel = match &opts.parent {
            Some(parent) => parent.cancel.child_token(),
            None => node.context().child_token(),
        };
        let (mailbox_tx, mailbox_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_CAPACITY);
        let (stop_tx, stop_rx) = mpsc::channel(STOP_CAPACITY);
        Arc::new(Self {
            pid,
            name,
            node,
            behavior,
            cancel,
            mailbox_tx,
            mailbox_rx: Mutex::new(mailbox_rx),
            reply_tx,
            reply_rx: Mutex::new(reply_rx),
            stop_tx,
            stop_rx: Mutex::new(stop_rx),
            group_leader: opts.group_leader,
            env: RwLock::new(HashMap::new()),
            state: RwLock::new(None),
            trap_exit: AtomicBool::new(false),
            message_count: AtomicU64::new(0),
        })
    }

    /// This process's pid.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The registered name, if the process was spawned with one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The node this process runs on.
    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    pub(crate) fn behavior(&self) -> Arc<dyn Behavior> {
        self.behavior.clone()
    }

    /// The group leader this process inherits its environment from.
    pub fn group_leader(&self) -> Option<&Arc<Process>> {
        self.group_leader.as_ref()
    }

    /// This process's cancellation scope.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns `false` once the process has been cancelled.
    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancels the process and all processes spawned under it.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// Requests a graceful stop with the given reason.
    ///
    /// At most two stop requests are held; further ones are dropped until
    /// the loop drains the channel.
    pub fn stop(&self, from: Pid, reason: Atom) {
        if self.stop_tx.try_send((from, reason)).is_err() {
            tracing::debug!(pid = %self.pid, "stop request dropped, channel full");
        }
    }

    /// Awaits the next wake-up: a message, a stop request, or cancellation.
    pub async fn recv(&self) -> Signal {
        let mut mailbox = self.mailbox_rx.lock().await;
        let mut stop = self.stop_rx.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Signal::Shutdown,
            request = stop.recv() => match request {
                Some((from, reason)) => Signal::Stop { from, reason },
                None => Signal::Shutdown,
            },
            message = mailbox.recv() => match message {
                Some((from, message)) => {
                    self.message_count.fetch_add(1, Ordering::Relaxed);
                    Signal::Message { from, message }
                }
                None => Signal::Shutdown,
            },
        }
    }

    /// Enqueues a message into this process's own mailbox.
    pub(crate) async fn deliver(&self, from: Pid, message: Term) {
        let _ = self.mailbox_tx.send((from, message)).await;
    }

    /// Sends a message. The destination can be a pid, a registered local
    /// name, or a `(name, node)` tuple.
    pub async fn send(&self, to: impl Into<Term>, message: Term) {
        self.node.registrar().route(self.pid, to.into(), message).await;
    }

    /// Sends a message wrapped as `($gen_cast, message)`.
    pub async fn cast(&self, to: impl Into<Term>, message: Term) {
        self.send(to, tuple!(atom!("$gen_cast"), message)).await;
    }

    /// Makes a synchronous request with the node's default timeout.
    pub async fn call(&self, to: impl Into<Term>, message: Term) -> Result<Term, CallError> {
        let timeout = self.node.call_timeout();
        self.call_with_timeout(to, message, timeout).await
    }

    /// Makes a synchronous request in the `$gen_call` fashion.
    ///
    /// The request is tagged with a fresh reference; replies carrying any
    /// other reference are discarded while waiting. Fails with
    /// [`CallError::Timeout`] when the deadline passes and with
    /// [`CallError::Stopped`] when the calling process is cancelled.
    pub async fn call_with_timeout(
        &self,
        to: impl Into<Term>,
        message: Term,
        timeout_secs: u64,
    ) -> Result<Term, CallError> {
        let reference = self.node.make_ref();
        let from = tuple!(self.pid, reference);
        self.send(to, tuple!(atom!("$gen_call"), from, message)).await;

        let deadline = tokio::time::sleep(Duration::from_secs(timeout_secs));
        tokio::pin!(deadline);
        let mut replies = self.reply_rx.lock().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CallError::Stopped),
                _ = &mut deadline => return Err(CallError::Timeout),
                reply = replies.recv() => match reply {
                    Some((tag, value)) if tag == reference => return Ok(value),
                    Some(_) => continue,
                    None => return Err(CallError::Stopped),
                },
            }
        }
    }

    /// Completes a call made by `to`: delivers `value` on its reply channel
    /// paired with the call's reference.
    pub async fn reply(&self, to: Pid, reference: Ref, value: Term) {
        if let Some(view) = self.node.registrar().get_process_by_pid(to).await {
            view.send_reply(reference, value);
        }
    }

    /// Calls `module:function(args)` on the RPC server of a remote node.
    pub async fn call_rpc(
        &self,
        node: &str,
        module: &str,
        function: &str,
        args: Vec<Term>,
    ) -> Result<Term, CallError> {
        let timeout = self.node.call_timeout();
        self.call_rpc_with_timeout(timeout, node, module, function, args)
            .await
    }

    /// [`Process::call_rpc`] with an explicit timeout in seconds.
    pub async fn call_rpc_with_timeout(
        &self,
        timeout_secs: u64,
        node: &str,
        module: &str,
        function: &str,
        args: Vec<Term>,
    ) -> Result<Term, CallError> {
        tracing::debug!(node = %self.node.name(), remote = node, module, function, "rpc call");
        let message = tuple!(
            atom!("call"),
            Atom::new(module),
            Atom::new(function),
            Term::List(args)
        );
        let to = tuple!(atom!("rex"), Atom::new(node));
        self.call_with_timeout(to, message, timeout_secs).await
    }

    /// Fire-and-forget variant of [`Process::call_rpc`].
    pub async fn cast_rpc(&self, node: &str, module: &str, function: &str, args: Vec<Term>) {
        tracing::debug!(node = %self.node.name(), remote = node, module, function, "rpc cast");
        let message = tuple!(
            atom!("cast"),
            Atom::new(module),
            Atom::new(function),
            Term::List(args)
        );
        let to = tuple!(atom!("rex"), Atom::new(node));
        self.cast(to, message).await;
    }

    /// Starts monitoring another process; `(DOWN, ref, process, pid, reason)`
    /// is delivered when it terminates.
    pub async fn monitor_process(&self, to: Pid) -> Ref {
        self.node.monitor().monitor_process(self.pid, to).await
    }

    /// Removes a monitor established by [`Process::monitor_process`].
    pub async fn demonitor_process(&self, reference: Ref) {
        self.node.monitor().demonitor_process(reference).await;
    }

    /// Links this process with another for mutual failure propagation.
    pub async fn link(&self, with: Pid) {
        self.node.monitor().link(self.pid, with).await;
    }

    /// Removes a link.
    pub async fn unlink(&self, with: Pid) {
        self.node.monitor().unlink(self.pid, with).await;
    }

    /// Subscribes to `(nodedown, node)` notifications for a remote node.
    pub async fn monitor_node(&self, node: impl Into<Atom>) -> Ref {
        self.node.monitor().monitor_node(self.pid, node.into()).await
    }

    /// Removes a node monitor.
    pub async fn demonitor_node(&self, reference: Ref) {
        self.node.monitor().demonitor_node(reference).await;
    }

    /// Sets an environment variable on this process.
    pub fn set_env(&self, name: impl Into<String>, value: Term) {
        self.env.write().insert(name.into(), value);
    }

    /// Looks up an environment variable, consulting the group-leader chain
    /// when this process has no binding of its own.
    pub fn get_env(&self, name: &str) -> Option<Term> {
        if let Some(value) = self.env.read().get(name) {
            return Some(value.clone());
        }
        self.group_leader.as_ref().and_then(|leader| leader.get_env(name))
    }

    /// Returns the full environment, with this process's own bindings
    /// overriding inherited ones.
    pub fn list_env(&self) -> HashMap<String, Term> {
        let mut env = self
            .group_leader
            .as_ref()
            .map(|leader| leader.list_env())
            .unwrap_or_default();
        for (key, value) in self.env.read().iter() {
            env.insert(key.clone(), value.clone());
        }
        env
    }

    /// Sets the trap-exit flag, returning the previous value.
    ///
    /// A trapping process receives `(EXIT, pid, reason)` messages when
    /// linked processes die instead of being killed alongside them.
    pub fn set_trap_exit(&self, trap: bool) -> bool {
        self.trap_exit.swap(trap, Ordering::SeqCst)
    }

    /// Returns whether this process traps exits.
    pub fn traps_exits(&self) -> bool {
        self.trap_exit.load(Ordering::SeqCst)
    }

    /// Stores a behavior-owned state term.
    pub fn set_state(&self, state: Term) {
        *self.state.write() = Some(state);
    }

    /// Reads the behavior-owned state term.
    pub fn state(&self) -> Option<Term> {
        self.state.read().clone()
    }

    /// Number of messages this process has taken from its mailbox.
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// A point-in-time summary of this process.
    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            name: self.name.clone(),
            message_count: self.message_count(),
            trap_exit: self.traps_exits(),
            group_leader: self.group_leader.as_ref().map(|leader| leader.pid()),
        }
    }

    pub(crate) fn view(&self) -> ProcessView {
        ProcessView {
            pid: self.pid,
            name: self.name.clone(),
            trap_exit: self.traps_exits(),
            message_count: self.message_count(),
            mailbox: self.mailbox_tx.clone(),
            reply: self.reply_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A snapshot of a process taken by the registrar.
///
/// The scalar fields are copies frozen at lookup time; mutating them has no
/// effect on the live process. The channel ends and the kill token are
/// shared with the process, which is what makes delivering replies and exit
/// signals through a snapshot possible.
#[derive(Debug, Clone)]
pub struct ProcessView {
    /// The process address.
    pub pid: Pid,
    /// Registered name at snapshot time.
    pub name: Option<String>,
    /// Trap-exit flag at snapshot time.
    pub trap_exit: bool,
    /// Mailbox counter at snapshot time.
    pub message_count: u64,
    mailbox: mpsc::Sender<(Pid, Term)>,
    reply: mpsc::Sender<(Ref, Term)>,
    cancel: CancellationToken,
}

impl ProcessView {
    /// Delivers a message into the process's mailbox.
    pub async fn deliver(&self, from: Pid, message: Term) {
        let _ = self.mailbox.send((from, message)).await;
    }

    /// Pushes a call reply; dropped if both reply slots are occupied.
    pub fn send_reply(&self, reference: Ref, value: Term) {
        if self.reply.try_send((reference, value)).is_err() {
            tracing::debug!(pid = %self.pid, "reply dropped, reply channel full");
        }
    }

    /// Cancels the process.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// Returns `false` once the process has been cancelled.
    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// A point-in-time summary of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    /// Registered name, if any.
    pub name: Option<String>,
    /// Messages taken from the mailbox so far.
    pub message_count: u64,
    /// Whether the process traps exits.
    pub trap_exit: bool,
    /// Pid of the group leader, if one is set.
    pub group_leader: Option<Pid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeHandle};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Idle;

    #[async_trait]
    impl Behavior for Idle {
        async fn run(&self, process: Arc<Process>, _args: Vec<Term>) -> Atom {
            process.cancel_token().cancelled().await;
            atom!("shutdown")
        }
    }

    /// Answers `$gen_call` requests with `(ok, payload)`.
    struct Responder;

    #[async_trait]
    impl Behavior for Responder {
        async fn run(&self, process: Arc<Process>, _args: Vec<Term>) -> Atom {
            loop {
                match process.recv().await {
                    Signal::Message { message, .. } => {
                        let Some(request) = message.as_tuple() else { continue };
                        if request.element(0).and_then(Term::as_atom) != Some(atom!("$gen_call")) {
                            continue;
                        }
                        let from = request.element(1).and_then(Term::as_tuple).unwrap();
                        let caller = from.element(0).and_then(Term::as_pid).unwrap();
                        let reference = from.element(1).and_then(Term::as_reference).unwrap();
                        let payload = request.element(2).cloned().unwrap();
                        process
                            .reply(caller, reference, tuple!(atom!("ok"), payload))
                            .await;
                    }
                    Signal::Stop { reason, .. } => return reason,
                    Signal::Shutdown => return atom!("shutdown"),
                }
            }
        }
    }

    async fn register(node: &NodeHandle, opts: SpawnOptions) -> Arc<Process> {
        node.registrar()
            .register_process(node, None, Arc::new(Idle), opts)
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
    async fn call_round_trip() {
        let node = Node::new("proc1@localhost").handle();
        let _responder = node.spawn_named("responder", Responder, vec![]).await.unwrap();
        let caller = register(&node, SpawnOptions::new()).await;

        let reply = caller.call("responder", tuple!(atom!("sum"), 2i64)).await;
        assert_eq!(reply, Ok(tuple!(atom!("ok"), tuple!(atom!("sum"), 2i64))));
    }

    #[tokio::test]
    async fn call_times_out_without_a_reply() {
        let node = Node::new("proc2@localhost").handle();
        let caller = register(&node, SpawnOptions::new()).await;

        let reply = caller
            .call_with_timeout("nobody-registered", Term::Int(1), 1)
            .await;
        assert_eq!(reply, Err(CallError::Timeout));
    }

    #[tokio::test]
    async fn call_fails_when_caller_is_cancelled() {
        let node = Node::new("proc3@localhost").handle();
        let caller = register(&node, SpawnOptions::new()).await;

        let killer = caller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            killer.kill();
        });

        let reply = caller
            .call_with_timeout("nobody-registered", Term::Int(1), 30)
            .await;
        assert_eq!(reply, Err(CallError::Stopped));
    }

    #[tokio::test]
    async fn stale_replies_are_discarded() {
        let node = Node::new("proc4@localhost").handle();
        let caller = register(&node, SpawnOptions::new()).await;

        // A reply for a reference nobody is waiting on.
        let stale = node.make_ref();
        let view = node
            .registrar()
            .get_process_by_pid(caller.pid())
            .await
            .unwrap();
        view.send_reply(stale, Term::atom("stale"));

        let _responder = node.spawn_named("responder", Responder, vec![]).await.unwrap();
        let reply = caller.call("responder", Term::Int(7)).await;
        assert_eq!(reply, Ok(tuple!(atom!("ok"), Term::Int(7))));
    }

    #[tokio::test]
    async fn cast_wraps_the_payload() {
        let node = Node::new("proc5@localhost").handle();
        let target = register(&node, SpawnOptions::new()).await;
        let caller = register(&node, SpawnOptions::new()).await;

        caller.cast(Term::Pid(target.pid()), Term::Int(5)).await;

        let (from, message) = expect_message(&target).await;
        assert_eq!(from, caller.pid());
        assert_eq!(message, tuple!(atom!("$gen_cast"), Term::Int(5)));
    }

    #[tokio::test]
    async fn rpc_call_reaches_the_rex_server() {
        let node = Node::new("proc6@localhost").handle();
        let _rex = node.spawn_named("rex", Responder, vec![]).await.unwrap();
        let caller = register(&node, SpawnOptions::new()).await;

        let reply = caller
            .call_rpc("proc6@localhost", "lists", "reverse", vec![Term::Int(1)])
            .await
            .unwrap();
        assert_eq!(
            reply,
            tuple!(
                atom!("ok"),
                tuple!(
                    atom!("call"),
                    atom!("lists"),
                    atom!("reverse"),
                    Term::List(vec![Term::Int(1)])
                )
            )
        );
    }

    #[tokio::test]
    async fn rpc_cast_is_tagged_and_wrapped() {
        let node = Node::new("proc7@localhost").handle();
        let rex = node
            .registrar()
            .register_process(&node, Some("rex"), Arc::new(Idle), SpawnOptions::new())
            .await
            .unwrap();
        let caller = register(&node, SpawnOptions::new()).await;

        caller.cast_rpc("proc7@localhost", "io", "format", vec![]).await;

        let (_, message) = expect_message(&rex).await;
        assert_eq!(
            message,
            tuple!(
                atom!("$gen_cast"),
                tuple!(atom!("cast"), atom!("io"), atom!("format"), Term::List(vec![]))
            )
        );
    }

    #[tokio::test]
    async fn environment_is_inherited_through_the_group_leader() {
        let node = Node::new("proc8@localhost").handle();
        let leader = register(&node, SpawnOptions::new()).await;
        leader.set_env("region", Term::str("east"));
        leader.set_env("tier", Term::str("base"));

        let child = register(&node, SpawnOptions::new().group_leader(leader.clone())).await;
        child.set_env("tier", Term::str("override"));

        assert_eq!(child.get_env("region"), Some(Term::str("east")));
        assert_eq!(child.get_env("tier"), Some(Term::str("override")));
        assert_eq!(child.get_env("missing"), None);

        let env = child.list_env();
        assert_eq!(env.get("region"), Some(&Term::str("east")));
        assert_eq!(env.get("tier"), Some(&Term::str("override")));

        // The leader's own view is untouched by the override.
        assert_eq!(leader.get_env("tier"), Some(Term::str("base")));
    }

    #[tokio::test]
    async fn trap_exit_flag_toggles() {
        let node = Node::new("proc9@localhost").handle();
        let process = register(&node, SpawnOptions::new()).await;

        assert!(!process.traps_exits());
        assert!(!process.set_trap_exit(true));
        assert!(process.traps_exits());
        assert!(process.set_trap_exit(false));
    }

    #[tokio::test]
    async fn info_reflects_mailbox_activity() {
        let node = Node::new("proc10@localhost").handle();
        let leader = register(&node, SpawnOptions::new()).await;
        let process = register(&node, SpawnOptions::new().group_leader(leader.clone())).await;

        node.registrar()
            .route(Pid::nil(), Term::Pid(process.pid()), Term::Int(1))
            .await;
        expect_message(&process).await;

        let info = process.info();
        assert_eq!(info.message_count, 1);
        assert_eq!(info.group_leader, Some(leader.pid()));
        assert!(!info.trap_exit);
        assert_eq!(info.name, None);
    }

    #[tokio::test]
    async fn state_slot_round_trips() {
        let node = Node::new("proc11@localhost").handle();
        let process = register(&node, SpawnOptions::new()).await;

        assert_eq!(process.state(), None);
        process.set_state(tuple!(atom!("counter"), 3i64));
        assert_eq!(process.state(), Some(tuple!(atom!("counter"), 3i64)));
    }

    #[tokio::test]
    async fn killing_a_parent_cancels_its_descendants() {
        let node = Node::new("proc13@localhost").handle();
        let parent = register(&node, SpawnOptions::new()).await;
        let child = register(&node, SpawnOptions::new().parent(parent.clone())).await;
        let grandchild = register(&node, SpawnOptions::new().parent(child.clone())).await;

        parent.kill();

        assert!(!child.is_alive());
        assert!(!grandchild.is_alive());
    }

    #[tokio::test]
    async fn stop_request_wakes_the_loop() {
        let node = Node::new("proc12@localhost").handle();
        let process = register(&node, SpawnOptions::new()).await;

        process.stop(Pid::nil(), atom!("shutdown"));
        match timeout(Duration::from_secs(5), process.recv()).await {
            Ok(Signal::Stop { from, reason }) => {
                assert!(from.is_nil());
                assert_eq!(reason, atom!("shutdown"));
            }
            other => panic!("expected a stop signal, got {:?}", other),
        }
    }
}
