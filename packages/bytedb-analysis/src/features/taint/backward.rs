//! Backward taint analyzer
//!
//! Runs over the reversed application graph inside a bidi pair. Where
//! the forward space introduces taint at sources, the backward space
//! introduces *demand* at sinks and walks it against the data flow:
//! an assignment moves demand from its left-hand side to its
//! right-hand side, and a resolved call routes demand on its result
//! into the callee as returned-value demand (a `Root::Return` marker
//! resolved at the callee's Return statement). When demand reaches a
//! configured source call the sink is source-reachable; the summary
//! edges the backward half discovers are injected into the forward
//! half to seed additional facts (NPE and alias analyses are
//! configurations of this).
//!
//! Backward analyzers suppress automatic summary publication and
//! cross-unit requests.

use std::sync::Arc;

use super::flow::position_path;
use crate::config::CompiledRules;
use crate::features::ifds::domain::{Edge, Fact, Vulnerability};
use crate::features::ifds::ports::{Analyzer, FlowFunctionSpace, SummaryFact};
use crate::shared::models::{
    AccessPath, ApplicationGraph, Method, Root, RValue, Statement, StatementKind,
};

pub const TAINT_BACKWARD: &str = "taint-backward";

pub struct BackwardTaintFlowSpace {
    rules: Arc<CompiledRules>,
    depth: usize,
}

impl BackwardTaintFlowSpace {
    pub fn new(rules: Arc<CompiledRules>, depth: usize) -> Self {
        Self { rules, depth }
    }

    /// Demand transfer against one statement (which, on the reversed
    /// graph, executes after the facts we are propagating)
    fn transfer(&self, stmt: &Statement, fact: &Fact) -> Vec<Fact> {
        match &stmt.kind {
            StatementKind::Assign { lhs, rhs } => {
                let Fact::Taint(t) = fact else {
                    return vec![Fact::Zero];
                };
                let mut out = Vec::new();
                if let RValue::Use(source) = rhs {
                    if let Some(rebased) = t.path.rebased(lhs, source) {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
                if !t.path.starts_with(lhs) {
                    out.push(fact.clone());
                }
                out
            }
            StatementKind::Call { .. } => {
                let Some(signature) = stmt.invoked_signature() else {
                    return vec![fact.clone()];
                };

                if fact.is_zero() {
                    let mut out = vec![Fact::Zero];
                    // demand springs from Zero at configured sinks
                    for rule in &self.rules.sinks {
                        if !rule.matches(signature) {
                            continue;
                        }
                        if let Some(target) = position_path(stmt, rule.position) {
                            out.push(Fact::marked(target.clone(), rule.mark.clone(), self.depth));
                        }
                    }
                    return out;
                }

                let Fact::Taint(t) = fact else {
                    return vec![fact.clone()];
                };
                let mut out = Vec::new();
                // reversed pass-through: demand at `to` moves to `from`
                for rule in &self.rules.pass_through {
                    if !t.marks.contains(&rule.mark) || !rule.matches(signature) {
                        continue;
                    }
                    let (Some(from), Some(to)) =
                        (position_path(stmt, rule.from), position_path(stmt, rule.to))
                    else {
                        continue;
                    };
                    if let Some(rebased) = t.path.rebased(to, from) {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
                // a sanitizer discharges the demand
                let discharged = self.rules.sanitizers.iter().any(|rule| {
                    rule.matches(signature)
                        && position_path(stmt, rule.position)
                            .is_some_and(|p| t.path.starts_with(p))
                        && t.marks.contains(&rule.mark)
                });
                // the result is freshly defined by this call; demand
                // under it resolves through the callee, never by bypassing
                let defined_here = stmt
                    .call_result()
                    .is_some_and(|result| t.path.starts_with(result));
                if !discharged && !defined_here {
                    out.push(fact.clone());
                }
                out
            }
            StatementKind::Return { value } => {
                let Fact::Taint(t) = fact else {
                    return vec![Fact::Zero];
                };
                if !matches!(t.path.root, Root::Return) {
                    return vec![fact.clone()];
                }
                // returned-value demand resolves against the concrete
                // return expression
                match value {
                    Some(value) => match t.path.rebased(&AccessPath::returned(), value) {
                        Some(path) => vec![fact.with_path(path, self.depth)],
                        None => Vec::new(),
                    },
                    // a void return never satisfies it
                    None => Vec::new(),
                }
            }
            StatementKind::Nop => vec![fact.clone()],
        }
    }
}

impl FlowFunctionSpace for BackwardTaintFlowSpace {
    fn start_facts(&self, _stmt: &Statement) -> Vec<Fact> {
        vec![Fact::Zero]
    }

    fn sequent(&self, curr: &Statement, _next: &Statement, fact: &Fact) -> Vec<Fact> {
        self.transfer(curr, fact)
    }

    fn call_to_start(&self, call: &Statement, _callee: &Method, fact: &Fact) -> Vec<Fact> {
        // reversed direction: demand on the call result enters the
        // callee as returned-value demand (the marker is resolved at the
        // callee's Return statement); demand reaching the actuals enters
        // through the formals for by-reference flow
        let Fact::Taint(t) = fact else {
            return vec![Fact::Zero];
        };
        let mut out = Vec::new();
        if let Some(result) = call.call_result() {
            if let Some(rebased) = t.path.rebased(result, &AccessPath::returned()) {
                out.push(fact.with_path(rebased, self.depth));
            }
        }
        for (index, actual) in call.call_args().iter().enumerate() {
            if let Some(rebased) = t.path.rebased(actual, &AccessPath::arg(index as u32)) {
                out.push(fact.with_path(rebased, self.depth));
            }
        }
        if let Some(receiver) = call.call_receiver() {
            if let Some(rebased) = t.path.rebased(receiver, &AccessPath::this()) {
                out.push(fact.with_path(rebased, self.depth));
            }
        }
        if matches!(t.path.root, Root::Static { .. }) {
            out.push(fact.clone());
        }
        out
    }

    fn call_to_return(&self, call: &Statement, _ret: &Statement, fact: &Fact) -> Vec<Fact> {
        self.transfer(call, fact)
    }

    fn exit_to_return(
        &self,
        call: &Statement,
        _ret: &Statement,
        exit: &Statement,
        fact: &Fact,
    ) -> Vec<Fact> {
        let Fact::Taint(t) = fact else {
            return vec![Fact::Zero];
        };

        // Returned-value demand normally resolves when the sequent
        // transfer walks the callee's Return statement. A callee whose
        // entry is its Return has no sequent step, so the marker can
        // still be live here; resolve it against the exit statement
        // before mapping formals back.
        let fact = if matches!(t.path.root, Root::Return) {
            let StatementKind::Return { value: Some(value) } = &exit.kind else {
                return Vec::new();
            };
            match t.path.rebased(&AccessPath::returned(), value) {
                Some(path) => fact.with_path(path, self.depth),
                None => return Vec::new(),
            }
        } else {
            fact.clone()
        };
        let Fact::Taint(t) = &fact else {
            return vec![Fact::Zero];
        };

        let mut out = Vec::new();
        match &t.path.root {
            Root::Arg(index) => {
                if let Some(actual) = call.call_args().get(*index as usize) {
                    if let Some(rebased) = t.path.rebased(&AccessPath::arg(*index), actual) {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
            }
            Root::This => {
                if let Some(receiver) = call.call_receiver() {
                    if let Some(rebased) = t.path.rebased(&AccessPath::this(), receiver) {
                        out.push(fact.with_path(rebased, self.depth));
                    }
                }
            }
            Root::Static { .. } => out.push(fact.clone()),
            Root::Local(_) | Root::Return => {}
        }
        out
    }
}

pub struct BackwardTaintAnalyzer {
    space: BackwardTaintFlowSpace,
    rules: Arc<CompiledRules>,
}

impl BackwardTaintAnalyzer {
    pub fn new(rules: Arc<CompiledRules>, depth: usize) -> Self {
        Self {
            space: BackwardTaintFlowSpace::new(rules.clone(), depth),
            rules,
        }
    }
}

impl Analyzer for BackwardTaintAnalyzer {
    fn id(&self) -> &str {
        TAINT_BACKWARD
    }

    fn flow_space(&self) -> &dyn FlowFunctionSpace {
        &self.space
    }

    fn save_summary_and_cross_unit(&self) -> bool {
        false
    }

    /// Demand meeting a source call means the sink is source-reachable
    fn summary_facts(&self, graph: &dyn ApplicationGraph, edge: &Edge) -> Vec<SummaryFact> {
        let stmt = graph.statement(edge.to.stmt);
        let Some(signature) = stmt.invoked_signature() else {
            return Vec::new();
        };
        self.rules
            .sources
            .iter()
            .filter(|rule| rule.matches(signature))
            .filter_map(|rule| {
                let produced = position_path(stmt, rule.position)?;
                let hit = edge.to.fact.has_mark(&rule.mark)
                    && edge
                        .to
                        .fact
                        .path()
                        .is_some_and(|p| p.starts_with(produced) || produced.starts_with(p));
                hit.then(|| {
                    SummaryFact::Vulnerability(Vulnerability {
                        analysis: TAINT_BACKWARD.to_string(),
                        rule: rule.matcher_text.clone(),
                        cwe: rule.cwe.clone(),
                        method: stmt.method,
                        sink: edge.to.clone(),
                    })
                })
            })
            .collect()
    }
}
