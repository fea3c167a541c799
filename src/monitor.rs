//! Links, monitors, and death notification.
//!
//! The runtime consumes this surface through the [`Monitor`] trait: the
//! registrar reports peer loss via [`Monitor::node_down`], the spawn driver
//! reports behavior-loop termination via [`Monitor::process_down`], and
//! processes establish links and monitors through their own wrappers.
//!
//! [`Monitors`] is the default table. Notifications are ordinary messages
//! routed through the registrar:
//!
//! - linked processes that trap exits receive `(EXIT, pid, reason)`;
//!   non-trapping linked processes are killed unless the reason is `normal`
//! - monitor holders receive `(DOWN, ref, process, pid, reason)`
//! - node-monitor holders receive `(nodedown, node)`

use crate::atom::Atom;
use crate::core::{Pid, Ref};
use crate::registrar::Registrar;
use crate::term::Term;
use crate::{atom, tuple};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// The death-notification contract consumed by the runtime.
#[async_trait]
pub trait Monitor: Send + Sync + 'static {
    /// Starts watching `to` on behalf of `from`.
    async fn monitor_process(&self, from: Pid, to: Pid) -> Ref;
    /// Removes a process monitor.
    async fn demonitor_process(&self, reference: Ref);
    /// Establishes a bidirectional link between two processes.
    async fn link(&self, a: Pid, b: Pid);
    /// Removes a link.
    async fn unlink(&self, a: Pid, b: Pid);
    /// Subscribes `from` to loss of the given node.
    async fn monitor_node(&self, from: Pid, node: Atom) -> Ref;
    /// Removes a node monitor.
    async fn demonitor_node(&self, reference: Ref);
    /// Invoked by the registrar when a peer link is torn down.
    async fn node_down(&self, node: Atom);
    /// Invoked by the spawn driver when a process loop has returned.
    async fn process_down(&self, pid: Pid, reason: Atom);
}

#[derive(Default)]
struct Tables {
    links: HashMap<Pid, HashSet<Pid>>,
    monitors: HashMap<Ref, (Pid, Pid)>,
    watched_by: HashMap<Pid, HashSet<Ref>>,
    node_monitors: HashMap<Ref, (Pid, Atom)>,
}

/// The default link/monitor table.
pub struct Monitors {
    registrar: Registrar,
    tables: Mutex<Tables>,
}

impl Monitors {
    /// Creates a table delivering notifications through the given registrar.
    pub fn new(registrar: Registrar) -> Self {
        Self {
            registrar,
            tables: Mutex::new(Tables::default()),
        }
    }
}

#[async_trait]
impl Monitor for Monitors {
    async fn monitor_process(&self, from: Pid, to: Pid) -> Ref {
        let reference = self.registrar.make_ref();
        let mut tables = self.tables.lock();
        tables.monitors.insert(reference, (from, to));
        tables.watched_by.entry(to).or_default().insert(reference);
        reference
    }

    async fn demonitor_process(&self, reference: Ref) {
        let mut tables = self.tables.lock();
        if let Some((_, to)) = tables.monitors.remove(&reference) {
            if let Some(refs) = tables.watched_by.get_mut(&to) {
                refs.remove(&reference);
                if refs.is_empty() {
                    tables.watched_by.remove(&to);
                }
            }
        }
    }

    async fn link(&self, a: Pid, b: Pid) {
        let mut tables = self.tables.lock();
        tables.links.entry(a).or_default().insert(b);
        tables.links.entry(b).or_default().insert(a);
    }

    async fn unlink(&self, a: Pid, b: Pid) {
        let mut tables = self.tables.lock();
        if let Some(set) = tables.links.get_mut(&a) {
            set.remove(&b);
        }
        if let Some(set) = tables.links.get_mut(&b) {
            set.remove(&a);
        }
    }

    async fn monitor_node(&self, from: Pid, node: Atom) -> Ref {
        let reference = self.registrar.make_ref();
        self.tables.lock().node_monitors.insert(reference, (from, node));
        reference
    }

    async fn demonitor_node(&self, reference: Ref) {
        self.tables.lock().node_monitors.remove(&reference);
    }

    async fn node_down(&self, node: Atom) {
        let watchers: Vec<Pid> = {
            let tables = self.tables.lock();
            tables
                .node_monitors
                .values()
                .filter(|(_, watched)| *watched == node)
                .map(|(watcher, _)| *watcher)
                .collect()
        };
        for watcher in watchers {
            self.registrar
                .route(Pid::nil(), Term::Pid(watcher), tuple!(atom!("nodedown"), node))
                .await;
        }
    }

    async fn process_down(&self, pid: Pid, reason: Atom) {
        let (linked, watchers) = {
            let mut tables = self.tables.lock();
            let linked: Vec<Pid> = tables
                .links
                .remove(&pid)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default();
            for other in &linked {
                if let Some(set) = tables.links.get_mut(other) {
                    set.remove(&pid);
                }
            }
            let watchers: Vec<(Ref, Pid)> = tables
                .watched_by
                .remove(&pid)
                .map(|refs| {
                    refs.into_iter()
                        .filter_map(|r| tables.monitors.remove(&r).map(|(from, _)| (r, from)))
                        .collect()
                })
                .unwrap_or_default();
            (linked, watchers)
        };

        let normal = atom!("normal");
        for other in linked {
            match self.registrar.get_process_by_pid(other).await {
                Some(view) if view.trap_exit => {
                    self.registrar
                        .route(pid, Term::Pid(other), tuple!(atom!("EXIT"), pid, reason))
                        .await;
                }
                Some(view) => {
                    if reason != normal {
                        tracing::debug!(pid = %other, linked = %pid, reason = %reason, "exit propagated over link");
                        view.kill();
                    }
                }
                None => {}
            }
        }

        for (reference, watcher) in watchers {
            self.registrar
                .route(
                    pid,
                    Term::Pid(watcher),
                    tuple!(atom!("DOWN"), reference, atom!("process"), pid, reason),
                )
                .await;
        }
    }
}
