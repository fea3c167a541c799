//! Unique reference type.
//!
//! A [`Ref`] is an opaque correlation token, unique within one node
//! instance. Synchronous calls tag their request with a fresh reference and
//! match the reply against it; monitors are identified by the reference
//! returned when they were established.

use crate::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A per-node unique correlation token.
///
/// Mint references through `NodeHandle::make_ref`; two references produced
/// by the same node instance never compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    node: Atom,
    id: u64,
}

impl Ref {
    pub(crate) fn new(node: Atom, id: u64) -> Self {
        Self { node, id }
    }

    /// The node that minted this reference.
    #[inline]
    pub fn node(&self) -> Atom {
        self.node
    }

    /// The counter value behind this reference.
    #[inline]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref<{}.{}>", self.node, self.id)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#Ref<{}.{}>", self.node, self.id)
    }
}
