//! Process identifier type.
//!
//! A [`Pid`] is the globally unique address of a process. It carries four
//! components: the owning node's name (as an [`Atom`]), a per-node id drawn
//! from a monotonically increasing counter, a serial, and a one-byte
//! creation number that distinguishes incarnations of the same node after a
//! restart. Equality is structural over all four fields, so a pid minted
//! before a node restart never matches one minted after it.

use crate::atom::Atom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A process address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid {
    node: Atom,
    id: u32,
    serial: u32,
    creation: u8,
}

impl Pid {
    /// Builds a pid for a freshly allocated local id.
    ///
    /// The serial is fixed at 1; only the id component advances between
    /// allocations within one node incarnation.
    pub(crate) fn new(node: Atom, id: u32, creation: u8) -> Self {
        Self {
            node,
            id,
            serial: 1,
            creation,
        }
    }

    /// Builds a pid from all four components.
    ///
    /// Mainly useful for tests and for reconstructing remote pids received
    /// over a peer link.
    pub fn from_parts(node: Atom, id: u32, serial: u32, creation: u8) -> Self {
        Self {
            node,
            id,
            serial,
            creation,
        }
    }

    /// The nil pid: an anonymous sender address that belongs to no node.
    pub fn nil() -> Self {
        Self {
            node: Atom::new(""),
            id: 0,
            serial: 0,
            creation: 0,
        }
    }

    /// Returns `true` if this is the nil pid.
    pub fn is_nil(&self) -> bool {
        self.id == 0 && self.serial == 0 && self.node.is_empty()
    }

    /// The name of the node owning this process.
    #[inline]
    pub fn node(&self) -> Atom {
        self.node
    }

    /// The id component, unique within one node incarnation.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// The serial component.
    #[inline]
    pub const fn serial(&self) -> u32 {
        self.serial
    }

    /// The creation byte of the owning node incarnation.
    #[inline]
    pub const fn creation(&self) -> u8 {
        self.creation
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid<{}.{}.{}>", self.node, self.id, self.serial)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}.{}.{}>", self.node, self.id, self.serial)
    }
}
