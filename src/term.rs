//! The dynamic term model.
//!
//! Everything that flows through a mailbox or over a peer link is a
//! [`Term`]: atoms, integers, binaries, strings, tuples, lists, maps,
//! pids and references. The whole universe serializes with `serde`, so a
//! transport can encode frames with any compact codec (`postcard` in the
//! test suite).
//!
//! Message destinations are also terms; the router dispatches on their
//! shape (pid, two-element tuple, or name).

use crate::atom::Atom;
use crate::core::{Pid, Ref};
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// An interned symbol.
    Atom(Atom),
    /// A signed integer.
    Int(i64),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// A UTF-8 string.
    Str(String),
    /// A fixed-arity heterogeneous sequence.
    Tuple(Tuple),
    /// An ordered list of terms.
    List(Vec<Term>),
    /// Key/value pairs.
    Map(Vec<(Term, Term)>),
    /// A process address.
    Pid(Pid),
    /// A correlation token.
    Ref(Ref),
}

impl Term {
    /// Builds an atom term.
    pub fn atom(text: &str) -> Self {
        Term::Atom(Atom::new(text))
    }

    /// Builds a string term.
    pub fn str(text: impl Into<String>) -> Self {
        Term::Str(text.into())
    }

    /// Builds a tuple term from its elements.
    pub fn tuple(items: Vec<Term>) -> Self {
        Term::Tuple(Tuple::new(items))
    }

    /// Builds a list term.
    pub fn list(items: Vec<Term>) -> Self {
        Term::List(items)
    }

    /// Reads this term as an atom.
    ///
    /// Strings are accepted and interned, so `"n2@host"` and
    /// `atom!("n2@host")` resolve to the same symbol.
    pub fn as_atom(&self) -> Option<Atom> {
        match self {
            Term::Atom(a) => Some(*a),
            Term::Str(s) => Some(Atom::new(s)),
            _ => None,
        }
    }

    /// Reads this term as a pid.
    pub fn as_pid(&self) -> Option<Pid> {
        match self {
            Term::Pid(pid) => Some(*pid),
            _ => None,
        }
    }

    /// Reads this term as a reference.
    pub fn as_reference(&self) -> Option<Ref> {
        match self {
            Term::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Reads this term as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Reads this term as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Reads this term as a tuple.
    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Term::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Encodes this term with the compact binary codec used on peer links.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for well-formed
    /// terms.
    pub fn encode(&self) -> Vec<u8> {
        postcard::to_allocvec(self).expect("term serialization failed")
    }

    /// Decodes a term produced by [`Term::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        postcard::from_bytes(bytes).map_err(DecodeError::from)
    }
}

/// A fixed-arity ordered sequence with positional access.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tuple(Vec<Term>);

impl Tuple {
    /// Builds a tuple from its elements.
    pub fn new(items: Vec<Term>) -> Self {
        Self(items)
    }

    /// Returns the element at `index`, 0-based.
    pub fn element(&self, index: usize) -> Option<&Term> {
        self.0.get(index)
    }

    /// The arity of this tuple.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the zero-arity tuple.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.0.iter()
    }

    /// Consumes the tuple, returning its elements.
    pub fn into_vec(self) -> Vec<Term> {
        self.0
    }
}

impl From<Atom> for Term {
    fn from(a: Atom) -> Self {
        Term::Atom(a)
    }
}

impl From<Pid> for Term {
    fn from(pid: Pid) -> Self {
        Term::Pid(pid)
    }
}

impl From<Ref> for Term {
    fn from(r: Ref) -> Self {
        Term::Ref(r)
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Int(n)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Str(s.to_owned())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Str(s)
    }
}

impl From<Tuple> for Term {
    fn from(t: Tuple) -> Self {
        Term::Tuple(t)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::List(items)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Atom(a) => write!(f, "{}", a),
            Term::Int(n) => write!(f, "{}", n),
            Term::Binary(b) => write!(f, "<<{} bytes>>", b.len()),
            Term::Str(s) => write!(f, "{:?}", s),
            Term::Tuple(t) => {
                f.write_str("{")?;
                for (i, item) in t.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("}")
            }
            Term::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Term::Map(pairs) => write!(f, "#{{{} pairs}}", pairs.len()),
            Term::Pid(pid) => write!(f, "{}", pid),
            Term::Ref(r) => write!(f, "{}", r),
        }
    }
}

/// Builds a [`Term::Tuple`] from values convertible into [`Term`].
///
/// ```
/// use axon::{atom, tuple};
/// use axon::term::Term;
///
/// let t = tuple!(atom!("ping"), 1i64);
/// assert!(matches!(t, Term::Tuple(ref inner) if inner.len() == 2));
/// ```
#[macro_export]
macro_rules! tuple {
    () => {
        $crate::term::Term::Tuple($crate::term::Tuple::default())
    };
    ($($item:expr),+ $(,)?) => {
        $crate::term::Term::Tuple($crate::term::Tuple::new(
            vec![$($crate::term::Term::from($item)),+],
        ))
    };
}
