//! Forward taint analyzer
//!
//! Packages the taint flow space with sink detection: every newly added
//! path edge whose vertex sits at a call matching a sink rule, with the
//! rule's mark on an access path covering the watched position, becomes
//! a vulnerability.

use std::sync::Arc;

use super::flow::{position_path, TaintFlowSpace};
use crate::config::CompiledRules;
use crate::features::ifds::domain::{Edge, Fact, Vulnerability};
use crate::features::ifds::ports::{Analyzer, FlowFunctionSpace, SummaryFact};
use crate::shared::models::{ApplicationGraph, Statement};

pub const TAINT_FORWARD: &str = "taint-forward";

/// Does `fact` contaminate the watched access path?
///
/// Either the watched path itself is marked, a field under it is
/// marked, or the whole object containing it is marked.
pub(crate) fn fact_covers(fact: &Fact, watched: &crate::shared::models::AccessPath) -> bool {
    match fact.path() {
        Some(path) => path.starts_with(watched) || watched.starts_with(path),
        None => false,
    }
}

/// Sink rules applied to one statement/fact pair
pub(crate) fn match_sinks<'a>(
    rules: &'a CompiledRules,
    stmt: &Statement,
    fact: &Fact,
) -> Vec<&'a crate::config::CompiledPositionRule> {
    let Some(signature) = stmt.invoked_signature() else {
        return Vec::new();
    };
    rules
        .sinks
        .iter()
        .filter(|rule| rule.matches(signature))
        .filter(|rule| {
            position_path(stmt, rule.position)
                .is_some_and(|watched| fact.has_mark(&rule.mark) && fact_covers(fact, watched))
        })
        .collect()
}

pub struct TaintAnalyzer {
    space: TaintFlowSpace,
    rules: Arc<CompiledRules>,
}

impl TaintAnalyzer {
    pub fn new(rules: Arc<CompiledRules>, depth: usize) -> Self {
        Self {
            space: TaintFlowSpace::new(rules.clone(), depth),
            rules,
        }
    }

    /// Replace the flow space (used to seed start-method formals)
    pub fn with_space(mut self, space: TaintFlowSpace) -> Self {
        self.space = space;
        self
    }
}

impl Analyzer for TaintAnalyzer {
    fn id(&self) -> &str {
        TAINT_FORWARD
    }

    fn flow_space(&self) -> &dyn FlowFunctionSpace {
        &self.space
    }

    fn summary_facts(&self, graph: &dyn ApplicationGraph, edge: &Edge) -> Vec<SummaryFact> {
        let stmt = graph.statement(edge.to.stmt);
        match_sinks(&self.rules, stmt, &edge.to.fact)
            .into_iter()
            .map(|rule| {
                SummaryFact::Vulnerability(Vulnerability {
                    analysis: TAINT_FORWARD.to_string(),
                    rule: rule.matcher_text.clone(),
                    cwe: rule.cwe.clone(),
                    method: stmt.method,
                    sink: edge.to.clone(),
                })
            })
            .collect()
    }
}
