//! Vertices, path edges, and edge provenance
//!
//! A path edge `(from → to)` within one method reads: "if `from` holds
//! at the method entry where it was observed, `to` holds at its
//! statement along some intraprocedural subpath". Each edge carries the
//! set of [`Reason`]s it was added for; reasons form a DAG rooted at
//! `Initial`/`External` vertices and are the backbone of witness-trace
//! reconstruction.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::fact::Fact;
use crate::shared::models::{MethodId, StatementId};

/// A (statement, fact) pair; identity is structural
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vertex {
    pub stmt: StatementId,
    pub fact: Fact,
}

impl Vertex {
    pub fn new(stmt: StatementId, fact: Fact) -> Self {
        Self { stmt, fact }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.stmt, self.fact)
    }
}

/// Path edge; both endpoints share the same enclosing method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: Vertex,
    pub to: Vertex,
}

impl Edge {
    pub fn new(from: Vertex, to: Vertex) -> Self {
        Self { from, to }
    }

    /// The self-loop `(v → v)` used to seed starts
    pub fn loop_at(v: Vertex) -> Self {
        Self {
            from: v.clone(),
            to: v,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Why an edge was added
///
/// Reasons reference previously propagated edges by value, which keeps
/// the reason DAG acyclic up to vertex identity: an edge never appears
/// as its own transitive reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reason {
    /// Seeded as a start fact
    Initial,

    /// Received from another unit's summary
    External,

    /// Derived from a sequent flow function applied to `pred`
    Sequent(Edge),

    /// Derived by entering a callee
    CallToStart(Edge),

    /// Derived by applying a callee's start-to-exit summary at a call site
    ThroughSummary { pred: Edge, summary: Edge },
}

impl Reason {
    /// Whether this reason terminates a backward trace walk
    pub fn is_terminal(&self) -> bool {
        matches!(self, Reason::Initial | Reason::External)
    }
}

/// A finding: a vertex at a sink statement plus rule provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Analyzer that reported the finding
    pub analysis: String,

    /// Configuration rule that matched (the sink's method matcher)
    pub rule: String,

    /// CWE tag from the sink rule, when configured
    pub cwe: Option<String>,

    pub method: MethodId,

    pub sink: Vertex,
}
