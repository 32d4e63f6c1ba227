//! IFDS ports - the contracts between the solver and analysis plugins
//!
//! An analysis plugs into the engine through two traits:
//! [`FlowFunctionSpace`] supplies the four flow-function families plus
//! the start-fact oracle, and [`Analyzer`] packages a flow space with
//! sink detection (`summary_facts`) and post-quiescence detection
//! (`summary_facts_post`).
//!
//! Required flow-function properties: each family is deterministic and
//! idempotent on the same input, `Zero` propagates to at least `{Zero}`
//! in every family, and adding input facts never removes outputs for
//! previously seen inputs (monotonicity).

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

use super::domain::{Edge, Fact, Reason, Vertex, Vulnerability};
use crate::shared::models::{ApplicationGraph, Method, MethodId, Statement};

/// The four flow-function families of the tabulation algorithm
pub trait FlowFunctionSpace: Send + Sync {
    /// Facts that may hold at a method entry; must contain `Zero`
    fn start_facts(&self, stmt: &Statement) -> Vec<Fact>;

    /// Transfer across a single intraprocedural CFG edge
    fn sequent(&self, curr: &Statement, next: &Statement, fact: &Fact) -> Vec<Fact>;

    /// Translate caller facts into callee start facts (actuals → formals)
    fn call_to_start(&self, call: &Statement, callee: &Method, fact: &Fact) -> Vec<Fact>;

    /// Facts that bypass the callee entirely
    fn call_to_return(&self, call: &Statement, ret: &Statement, fact: &Fact) -> Vec<Fact>;

    /// Translate callee exit facts back into the caller (formals → actuals)
    fn exit_to_return(
        &self,
        call: &Statement,
        ret: &Statement,
        exit: &Statement,
        fact: &Fact,
    ) -> Vec<Fact>;
}

/// Identity space: every family maps `f ↦ {f}`
///
/// The tautology instance, useful for reachability-only analyses and as
/// the simplest conforming implementation.
pub struct IdentityFlowSpace;

impl FlowFunctionSpace for IdentityFlowSpace {
    fn start_facts(&self, _stmt: &Statement) -> Vec<Fact> {
        vec![Fact::Zero]
    }

    fn sequent(&self, _curr: &Statement, _next: &Statement, fact: &Fact) -> Vec<Fact> {
        vec![fact.clone()]
    }

    fn call_to_start(&self, _call: &Statement, _callee: &Method, fact: &Fact) -> Vec<Fact> {
        vec![fact.clone()]
    }

    fn call_to_return(&self, _call: &Statement, _ret: &Statement, fact: &Fact) -> Vec<Fact> {
        vec![fact.clone()]
    }

    fn exit_to_return(
        &self,
        _call: &Statement,
        _ret: &Statement,
        _exit: &Statement,
        fact: &Fact,
    ) -> Vec<Fact> {
        vec![fact.clone()]
    }
}

/// Reachability-only analyzer over [`IdentityFlowSpace`]
///
/// Never reports findings; every reachable statement ends up holding
/// exactly the facts it was seeded with.
pub struct IdentityAnalyzer {
    space: IdentityFlowSpace,
}

impl IdentityAnalyzer {
    pub fn new() -> Self {
        Self {
            space: IdentityFlowSpace,
        }
    }
}

impl Default for IdentityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for IdentityAnalyzer {
    fn id(&self) -> &str {
        "identity"
    }

    fn flow_space(&self) -> &dyn FlowFunctionSpace {
        &self.space
    }

    fn summary_facts(&self, _graph: &dyn ApplicationGraph, _edge: &Edge) -> Vec<SummaryFact> {
        Vec::new()
    }
}

/// Fact reported per newly added edge or after quiescence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryFact {
    /// Inject an additional path edge (treated as external)
    Edge(Edge),

    /// Report a finding
    Vulnerability(Vulnerability),
}

/// Final solver state handed to `summary_facts_post` and to the witness
/// reconstructor after the runner has quiesced
#[derive(Debug, Default, Clone)]
pub struct Aggregate {
    pub path_edges: FxHashSet<Edge>,

    /// Per method: start vertex → known exit vertices
    pub summary_edges: FxHashMap<MethodId, FxHashMap<Vertex, FxHashSet<Vertex>>>,

    pub reasons: FxHashMap<Edge, BTreeSet<Reason>>,
}

impl Aggregate {
    /// Merge another runner's state into this one
    pub fn absorb(&mut self, other: Aggregate) {
        self.path_edges.extend(other.path_edges);
        for (method, summaries) in other.summary_edges {
            let into = self.summary_edges.entry(method).or_default();
            for (start, exits) in summaries {
                into.entry(start).or_default().extend(exits);
            }
        }
        for (edge, reasons) in other.reasons {
            self.reasons.entry(edge).or_default().extend(reasons);
        }
    }
}

/// Analysis plugin contract
pub trait Analyzer: Send + Sync {
    /// Stable analyzer identifier carried into findings
    fn id(&self) -> &str;

    fn flow_space(&self) -> &dyn FlowFunctionSpace;

    /// When false (backward analyzers), automatic summary-edge
    /// publication and cross-unit requests are suppressed
    fn save_summary_and_cross_unit(&self) -> bool {
        true
    }

    /// Called once per newly added edge; may report vulnerabilities
    fn summary_facts(&self, graph: &dyn ApplicationGraph, edge: &Edge) -> Vec<SummaryFact>;

    /// Called once per runner after quiescence with the full edge set
    fn summary_facts_post(
        &self,
        _graph: &dyn ApplicationGraph,
        _aggregate: &Aggregate,
    ) -> Vec<SummaryFact> {
        Vec::new()
    }
}
