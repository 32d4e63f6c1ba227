//! Dataflow facts - the abstract domain
//!
//! A fact is either the distinguished `Zero` fact (the tautology every
//! IFDS instance needs as the source of unconditional flow) or a marked
//! abstract location. Facts are immutable and hash/equal structurally.
//!
//! The domain must be finite per method: fact constructors truncate
//! access paths to the configured structural bound instead of failing,
//! per the engine's propagation-error policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::shared::models::AccessPath;

/// Kind of contamination attached to an access path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mark {
    Taint,
    Nullness,
    Other(String),
}

impl Mark {
    /// Parse the mark names used in rule configurations
    pub fn parse(name: &str) -> Mark {
        match name {
            "TAINT" => Mark::Taint,
            "NULLNESS" => Mark::Nullness,
            other => Mark::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Taint => write!(f, "TAINT"),
            Mark::Nullness => write!(f, "NULLNESS"),
            Mark::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Marked abstract location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaintFact {
    pub path: AccessPath,
    pub marks: BTreeSet<Mark>,
}

/// Element of the abstract domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Fact {
    /// The always-holding tautology
    Zero,

    /// A marked abstract location
    Taint(TaintFact),
}

impl Fact {
    pub fn zero() -> Fact {
        Fact::Zero
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Fact::Zero)
    }

    /// Construct a marked fact, truncating the path to `depth` selectors
    pub fn tainted(path: AccessPath, marks: BTreeSet<Mark>, depth: usize) -> Fact {
        Fact::Taint(TaintFact {
            path: path.truncated(depth),
            marks,
        })
    }

    /// Single-mark convenience constructor
    pub fn marked(path: AccessPath, mark: Mark, depth: usize) -> Fact {
        Fact::tainted(path, BTreeSet::from([mark]), depth)
    }

    /// The access path of a non-zero fact
    pub fn path(&self) -> Option<&AccessPath> {
        match self {
            Fact::Zero => None,
            Fact::Taint(t) => Some(&t.path),
        }
    }

    /// Whether a non-zero fact carries `mark`
    pub fn has_mark(&self, mark: &Mark) -> bool {
        match self {
            Fact::Zero => false,
            Fact::Taint(t) => t.marks.contains(mark),
        }
    }

    /// Same marks on a different path (path is truncated)
    pub fn with_path(&self, path: AccessPath, depth: usize) -> Fact {
        match self {
            Fact::Zero => Fact::Zero,
            Fact::Taint(t) => Fact::tainted(path, t.marks.clone(), depth),
        }
    }

    /// Remove `mark`; a fact with no remaining marks vanishes (`None`)
    pub fn without_mark(&self, mark: &Mark) -> Option<Fact> {
        match self {
            Fact::Zero => Some(Fact::Zero),
            Fact::Taint(t) => {
                let mut marks = t.marks.clone();
                marks.remove(mark);
                if marks.is_empty() {
                    None
                } else {
                    Some(Fact::Taint(TaintFact {
                        path: t.path.clone(),
                        marks,
                    }))
                }
            }
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Zero => write!(f, "ZERO"),
            Fact::Taint(t) => {
                let marks: Vec<String> = t.marks.iter().map(|m| m.to_string()).collect();
                write!(f, "{}[{}]", t.path, marks.join(","))
            }
        }
    }
}
