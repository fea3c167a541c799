//! Supervision trees.
//!
//! A supervisor is an ordinary process behavior whose loop watches linked
//! children and restarts them according to a declarative strategy. The
//! [`SupervisorBehavior`] callback returns the child specs and flags; the
//! engine here owns everything else: spawning and linking children,
//! reconciling exit notifications, mass-terminating siblings where the
//! strategy demands it, and rate-limiting restarts.
//!
//! Restarting after a mass termination is driven by a `$restart` sentinel
//! the supervisor posts to itself once the last awaited sibling has gone
//! down, so the loop has a single receive site.

use crate::atom::Atom;
use crate::core::Pid;
use crate::error::RegistrarError;
use crate::process::{Behavior, Process, Signal, SpawnOptions};
use crate::term::{Term, Tuple};
use crate::{atom, tuple};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default restart budget within the rate-limit window.
pub const DEFAULT_RESTART_INTENSITY: u32 = 10;
/// Default rate-limit window in seconds.
pub const DEFAULT_RESTART_PERIOD_SECS: u64 = 10;

/// How the supervisor reacts when a child terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Only the terminated child is restarted.
    #[default]
    OneForOne,
    /// All other children are terminated, then every child is restarted.
    OneForAll,
    /// Children after the terminated one (in spec order) are terminated,
    /// then the terminated child and those siblings are restarted.
    RestForOne,
    /// All children are dynamically added instances of one spec, managed
    /// through [`start_child`] and [`terminate_child`].
    SimpleOneForOne,
}

/// When a terminated child is eligible for restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Restart {
    /// Always restarted.
    #[default]
    Permanent,
    /// Restarted only after an abnormal exit (anything but `normal` or
    /// `shutdown`).
    Transient,
    /// Never restarted.
    Temporary,
}

/// Strategy plus restart rate limit.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorFlags {
    /// The restart strategy.
    pub strategy: Strategy,
    /// Maximum restarts tolerated within [`SupervisorFlags::period`].
    pub intensity: u32,
    /// The sliding window for restart counting.
    pub period: Duration,
}

impl SupervisorFlags {
    /// Flags with the default intensity and period.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            intensity: DEFAULT_RESTART_INTENSITY,
            period: Duration::from_secs(DEFAULT_RESTART_PERIOD_SECS),
        }
    }

    /// Sets the restart budget.
    pub fn intensity(mut self, intensity: u32) -> Self {
        self.intensity = intensity;
        self
    }

    /// Sets the rate-limit window.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

impl Default for SupervisorFlags {
    fn default() -> Self {
        Self::new(Strategy::OneForOne)
    }
}

/// Specification of one supervised child.
pub struct ChildSpec {
    name: Option<String>,
    behavior: Arc<dyn Behavior>,
    args: Vec<Term>,
    restart: Restart,
    disabled: bool,
}

impl ChildSpec {
    /// A spec for the given behavior, anonymous and permanent by default.
    pub fn new(behavior: impl Behavior) -> Self {
        Self::from_arc(Arc::new(behavior))
    }

    /// A spec reusing an already shared behavior object.
    pub fn from_arc(behavior: Arc<dyn Behavior>) -> Self {
        Self {
            name: None,
            behavior,
            args: Vec::new(),
            restart: Restart::default(),
            disabled: false,
        }
    }

    /// Registers the child under a local name.
    ///
    /// Must be left unset for [`Strategy::SimpleOneForOne`] children, whose
    /// instances are anonymous.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Arguments handed to the behavior on every (re)start.
    pub fn args(mut self, args: Vec<Term>) -> Self {
        self.args = args;
        self
    }

    /// Sets the restart class.
    pub fn restart(mut self, restart: Restart) -> Self {
        self.restart = restart;
        self
    }
}

impl std::fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildSpec")
            .field("name", &self.name)
            .field("restart", &self.restart)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Everything a supervisor needs to run: flags plus ordered child specs.
pub struct SupervisorSpec {
    /// Strategy and rate limit.
    pub flags: SupervisorFlags,
    /// Child specs in start order.
    pub children: Vec<ChildSpec>,
}

impl SupervisorSpec {
    /// Bundles flags and children.
    pub fn new(flags: SupervisorFlags, children: Vec<ChildSpec>) -> Self {
        Self { flags, children }
    }
}

/// User callback producing the supervisor's spec.
pub trait SupervisorBehavior: Send + Sync + 'static {
    /// Builds the spec from the supervisor's spawn arguments.
    fn init(&self, args: &[Term]) -> SupervisorSpec;
}

/// The supervisor process behavior.
///
/// Spawn it like any other behavior:
///
/// ```ignore
/// let sup = node.spawn(Supervisor::new(MyTree), vec![]).await?;
/// ```
pub struct Supervisor {
    behavior: Arc<dyn SupervisorBehavior>,
}

impl Supervisor {
    /// Wraps a [`SupervisorBehavior`].
    pub fn new(behavior: impl SupervisorBehavior) -> Self {
        Self {
            behavior: Arc::new(behavior),
        }
    }
}

/// Asks a [`Strategy::SimpleOneForOne`] supervisor to start another child
/// instance with the given arguments.
pub async fn start_child(from: &Process, supervisor: Pid, args: Vec<Term>) {
    from.send(supervisor, tuple!(atom!("$start_child"), Term::List(args)))
        .await;
}

/// Asks a [`Strategy::SimpleOneForOne`] supervisor to stop a child instance.
pub async fn terminate_child(from: &Process, supervisor: Pid, child: Pid) {
    from.send(supervisor, tuple!(atom!("$terminate_child"), child))
        .await;
}

#[async_trait]
impl Behavior for Supervisor {
    async fn run(&self, process: Arc<Process>, args: Vec<Term>) -> Atom {
        let spec = self.behavior.init(&args);
        process.set_trap_exit(true);
        let child_count = spec.children.len();
        let mut running = Running {
            process: process.clone(),
            flags: spec.flags,
            specs: spec.children,
            children: vec![None; child_count],
            instances: Vec::new(),
            pending: Vec::new(),
            window: RestartWindow::new(spec.flags.intensity, spec.flags.period),
        };
        running.start_children().await;

        loop {
            match process.recv().await {
                Signal::Shutdown => {
                    running.terminate_all();
                    return atom!("shutdown");
                }
                Signal::Stop { reason, .. } => {
                    running.terminate_all();
                    return reason;
                }
                Signal::Message { message, .. } => {
                    if !running.handle(message).await {
                        return atom!("shutdown");
                    }
                }
            }
        }
    }
}

struct Running {
    process: Arc<Process>,
    flags: SupervisorFlags,
    specs: Vec<ChildSpec>,
    /// Static child slots, parallel to `specs`.
    children: Vec<Option<Arc<Process>>>,
    /// Dynamic instances under simple-one-for-one.
    instances: Vec<Arc<Process>>,
    /// Pids whose termination we are awaiting before the next restart.
    pending: Vec<Pid>,
    window: RestartWindow,
}

impl Running {
    /// Handles one mailbox message. Returns `false` when the supervisor
    /// must give up because the restart rate limit was exceeded.
    async fn handle(&mut self, message: Term) -> bool {
        match message {
            Term::Tuple(t) if tag(&t) == Some(atom!("EXIT")) => {
                let terminated = t.element(1).and_then(Term::as_pid);
                let reason = t.element(2).and_then(Term::as_atom);
                match (terminated, reason) {
                    (Some(terminated), Some(reason)) => self.on_exit(terminated, reason).await,
                    _ => {
                        tracing::debug!(sup = %self.process.pid(), "malformed exit notification ignored");
                        true
                    }
                }
            }
            Term::Tuple(t) if tag(&t) == Some(atom!("$start_child")) => {
                self.on_start_child(&t).await;
                true
            }
            Term::Tuple(t) if tag(&t) == Some(atom!("$terminate_child")) => {
                self.on_terminate_child(&t);
                true
            }
            Term::Atom(a) if a == atom!("$restart") => {
                self.start_children().await;
                true
            }
            other => {
                tracing::debug!(sup = %self.process.pid(), message = %other, "unexpected supervisor message");
                true
            }
        }
    }

    async fn on_exit(&mut self, terminated: Pid, reason: Atom) -> bool {
        tracing::debug!(sup = %self.process.pid(), child = %terminated, %reason, "child terminated");

        if self.flags.strategy == Strategy::SimpleOneForOne {
            self.instances.retain(|child| child.pid() != terminated);
            return true;
        }

        let index = self
            .children
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|child| child.pid() == terminated));

        if !self.pending.is_empty() {
            if let Some(index) = index {
                self.children[index] = None;
            }
            self.pending.retain(|pid| *pid != terminated);
            if self.pending.is_empty() {
                // Last awaited sibling is down; resume via the single
                // receive site.
                self.post_restart().await;
            }
            return true;
        }

        let Some(index) = index else {
            // Not one of our children (already replaced, or never ours).
            return true;
        };

        if self.window.exhausted() {
            tracing::warn!(
                sup = %self.process.pid(),
                intensity = self.flags.intensity,
                period_secs = self.flags.period.as_secs(),
                "restart intensity exceeded, giving up"
            );
            self.terminate_all();
            return false;
        }

        self.specs[index].disabled = disable_after_exit(self.specs[index].restart, reason);
        self.children[index] = None;

        match self.flags.strategy {
            Strategy::OneForOne => self.post_restart().await,
            Strategy::OneForAll => self.stop_siblings(0, index).await,
            Strategy::RestForOne => self.stop_siblings(index + 1, index).await,
            Strategy::SimpleOneForOne => {}
        }
        true
    }

    /// Stops every live child from `start` onward (except `skip`) and
    /// remembers their pids; the restart is posted once all of them have
    /// reported their exit.
    async fn stop_siblings(&mut self, start: usize, skip: usize) {
        for index in start..self.children.len() {
            if index == skip {
                continue;
            }
            if let Some(child) = &self.children[index] {
                child.stop(self.process.pid(), atom!("shutdown"));
                self.pending.push(child.pid());
            }
        }
        if self.pending.is_empty() {
            self.post_restart().await;
        }
    }

    async fn post_restart(&self) {
        self.process
            .deliver(Pid::nil(), Term::Atom(atom!("$restart")))
            .await;
    }

    /// Spawns every enabled child whose slot is empty, in spec order.
    async fn start_children(&mut self) {
        if self.flags.strategy == Strategy::SimpleOneForOne {
            return;
        }
        for index in 0..self.specs.len() {
            if self.children[index].is_some() || self.specs[index].disabled {
                continue;
            }
            let name = self.specs[index].name.clone();
            let behavior = self.specs[index].behavior.clone();
            let args = self.specs[index].args.clone();
            match self.spawn_child(name.as_deref(), behavior, args).await {
                Ok(child) => self.children[index] = Some(child),
                Err(error) => {
                    tracing::warn!(sup = %self.process.pid(), child = index, %error, "child failed to start");
                }
            }
        }
    }

    async fn spawn_child(
        &self,
        name: Option<&str>,
        behavior: Arc<dyn Behavior>,
        args: Vec<Term>,
    ) -> Result<Arc<Process>, RegistrarError> {
        // Children inherit the supervisor's group leader; a top-level
        // supervisor is itself the leader. The leader pointer only ever
        // points upward, so no cycle can form.
        let leader = self
            .process
            .group_leader()
            .cloned()
            .unwrap_or_else(|| self.process.clone());
        let opts = SpawnOptions::new().group_leader(leader);
        let child = self
            .process
            .node()
            .spawn_opts(name, opts, behavior, args)
            .await?;
        self.process.link(child.pid()).await;
        Ok(child)
    }

    async fn on_start_child(&mut self, request: &Tuple) {
        if self.flags.strategy != Strategy::SimpleOneForOne {
            tracing::debug!(sup = %self.process.pid(), "dynamic children require the simple-one-for-one strategy");
            return;
        }
        let Some(spec) = self.specs.first() else {
            tracing::warn!(sup = %self.process.pid(), "no child spec to instantiate");
            return;
        };
        let args = match request.element(1) {
            Some(Term::List(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => spec.args.clone(),
        };
        match self.spawn_child(None, spec.behavior.clone(), args).await {
            Ok(child) => self.instances.push(child),
            Err(error) => {
                tracing::warn!(sup = %self.process.pid(), %error, "child instance failed to start");
            }
        }
    }

    fn on_terminate_child(&mut self, request: &Tuple) {
        let Some(pid) = request.element(1).and_then(Term::as_pid) else {
            return;
        };
        if let Some(child) = self.instances.iter().find(|child| child.pid() == pid) {
            child.stop(self.process.pid(), atom!("shutdown"));
        }
        // The instance is removed when its exit notification arrives.
    }

    fn terminate_all(&self) {
        for child in self.children.iter().flatten() {
            child.kill();
        }
        for child in &self.instances {
            child.kill();
        }
    }
}

fn tag(t: &Tuple) -> Option<Atom> {
    t.element(0).and_then(Term::as_atom)
}

/// Whether a child that exited with `reason` must be excluded from the next
/// restart cycle.
fn disable_after_exit(restart: Restart, reason: Atom) -> bool {
    match restart {
        Restart::Temporary => true,
        Restart::Transient => reason == atom!("normal") || reason == atom!("shutdown"),
        Restart::Permanent => false,
    }
}

/// Sliding-window restart counter.
struct RestartWindow {
    intensity: u32,
    period: Duration,
    restarts: VecDeque<Instant>,
}

impl RestartWindow {
    fn new(intensity: u32, period: Duration) -> Self {
        Self {
            intensity,
            period,
            restarts: VecDeque::new(),
        }
    }

    /// Records one restart and reports whether the budget is now exceeded.
    fn exhausted(&mut self) -> bool {
        let now = Instant::now();
        self.restarts.push_back(now);
        while self
            .restarts
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.period)
        {
            self.restarts.pop_front();
        }
        self.restarts.len() > self.intensity as usize
    }
}
