//! Interned symbolic constants.
//!
//! An [`Atom`] is an immutable symbol compared by identity: two atoms built
//! from the same string are the same atom. The string data lives in a global
//! table and the atom itself is a `Copy` index into it, so equality checks
//! and hashing never touch the string.
//!
//! # Example
//!
//! ```
//! use axon::atom;
//!
//! let a = atom!("ping");
//! let b = atom!("ping");
//! assert_eq!(a, b);
//! assert_eq!(a.as_str(), "ping");
//! ```

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// An interned symbol.
///
/// Atoms are cheap to copy and compare; the backing string is resolved
/// through the global table only on [`Atom::as_str`] and formatting.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(u32);

static TABLE: OnceLock<Table> = OnceLock::new();

struct Table {
    ids: DashMap<String, u32>,
    symbols: RwLock<Vec<String>>,
}

impl Table {
    fn intern(&self, text: &str) -> Atom {
        if let Some(id) = self.ids.get(text) {
            return Atom(*id);
        }
        let mut symbols = self.symbols.write();
        // Re-check under the write lock: another thread may have won the race.
        if let Some(id) = self.ids.get(text) {
            return Atom(*id);
        }
        let id = symbols.len() as u32;
        symbols.push(text.to_owned());
        self.ids.insert(text.to_owned(), id);
        Atom(id)
    }

    fn resolve(&self, atom: Atom) -> String {
        self.symbols.read()[atom.0 as usize].clone()
    }
}

fn table() -> &'static Table {
    TABLE.get_or_init(|| Table {
        ids: DashMap::new(),
        symbols: RwLock::new(Vec::new()),
    })
}

impl Atom {
    /// Interns a string, returning its atom.
    pub fn new(text: &str) -> Self {
        table().intern(text)
    }

    /// Returns the symbol text of this atom.
    pub fn as_str(&self) -> String {
        table().resolve(*self)
    }

    /// Returns `true` if this atom is the empty symbol.
    pub fn is_empty(&self) -> bool {
        *self == Atom::new("")
    }
}

impl From<&str> for Atom {
    fn from(text: &str) -> Self {
        Atom::new(text)
    }
}

impl From<String> for Atom {
    fn from(text: String) -> Self {
        Atom::new(&text)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl Serialize for Atom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Atom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Atom::new(&text))
    }
}

/// Builds an [`Atom`] from a string literal or format string.
///
/// ```
/// use axon::atom;
///
/// let plain = atom!("rex");
/// let keyed = atom!("worker_{}", 3);
/// assert_eq!(keyed.as_str(), "worker_3");
/// ```
#[macro_export]
macro_rules! atom {
    ($($arg:tt)*) => {
        $crate::atom::Atom::new(&format!($($arg)*))
    };
}
