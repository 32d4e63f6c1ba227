/*
 * IFDS Tabulation Solver
 *
 * Worklist-based path-edge propagation with summary-edge caching, after
 * Reps, Horwitz, Sagiv (1995), extended for dynamically discovered
 * supergraphs following Naeem, Lhoták, Rodriguez (2010).
 *
 * One solver instance owns the state of one runner:
 * - path edges, deduplicated; the worklist holds each edge at most once
 *   in its lifetime
 * - summary edges per method, the only interprocedural knowledge kept
 * - a reverse index from callee start vertices to the caller edges that
 *   triggered entry
 * - per-edge Reasons, the backbone of witness reconstruction
 *
 * The solver is single-threaded and synchronous; everything that must
 * cross a runner boundary (topic subscription, summary publication,
 * cross-unit fact requests, findings) is requested through the
 * SolverEffects trait so the runner decides how to ship it.
 */

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::features::ifds::domain::{Edge, Reason, Vertex, Vulnerability};
use crate::features::ifds::ports::{Aggregate, Analyzer, SummaryFact};
use crate::shared::models::{ApplicationGraph, MethodId, StatementId, Unit, UnitResolver};

/// Side effects the solver requests from its runner
pub trait SolverEffects {
    /// Subscribe to path-edge events for a method (once per method)
    fn subscribe(&mut self, method: MethodId);

    /// A path edge ending at a method exit was added
    fn summary_edge(&mut self, method: MethodId, edge: &Edge);

    /// The analyzer marked an edge as a sink
    fn vulnerability(&mut self, vulnerability: &Vulnerability);

    /// A call site entered a callee owned by another unit
    fn cross_unit_call(&mut self, caller: &Vertex, callee_start: &Vertex, callee: MethodId);
}

/// Effects sink that records everything; used by tests and by the
/// post-quiescence pass where no further shipping is wanted
#[derive(Debug, Default)]
pub struct RecordingEffects {
    pub subscriptions: Vec<MethodId>,
    pub summaries: Vec<(MethodId, Edge)>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub cross_unit_calls: Vec<(Vertex, Vertex, MethodId)>,
}

impl SolverEffects for RecordingEffects {
    fn subscribe(&mut self, method: MethodId) {
        self.subscriptions.push(method);
    }

    fn summary_edge(&mut self, method: MethodId, edge: &Edge) {
        self.summaries.push((method, edge.clone()));
    }

    fn vulnerability(&mut self, vulnerability: &Vulnerability) {
        self.vulnerabilities.push(vulnerability.clone());
    }

    fn cross_unit_call(&mut self, caller: &Vertex, callee_start: &Vertex, callee: MethodId) {
        self.cross_unit_calls
            .push((caller.clone(), callee_start.clone(), callee));
    }
}

/// Solver counters, reported per runner
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    /// Worklist iterations
    pub iterations: usize,

    /// Path edges in the final state
    pub path_edges: usize,

    /// Summary edges discovered
    pub summary_edges: usize,

    /// Times a cached summary was applied instead of re-entering a callee
    pub summary_reuses: usize,
}

pub struct IfdsSolver {
    graph: Arc<dyn ApplicationGraph>,
    analyzer: Arc<dyn Analyzer>,

    /// Unit this solver's runner owns
    unit: Unit,
    resolver: UnitResolver,

    path_edges: FxHashSet<Edge>,
    summary_edges: FxHashMap<MethodId, FxHashMap<Vertex, FxHashSet<Vertex>>>,
    call_sites_of: FxHashMap<Vertex, FxHashSet<Edge>>,
    reasons: FxHashMap<Edge, BTreeSet<Reason>>,
    worklist: VecDeque<Edge>,
    visited_methods: FxHashSet<MethodId>,
    exit_cache: FxHashMap<MethodId, FxHashSet<StatementId>>,

    stats: SolverStats,
}

impl IfdsSolver {
    pub fn new(
        graph: Arc<dyn ApplicationGraph>,
        analyzer: Arc<dyn Analyzer>,
        unit: Unit,
        resolver: UnitResolver,
    ) -> Self {
        Self {
            graph,
            analyzer,
            unit,
            resolver,
            path_edges: FxHashSet::default(),
            summary_edges: FxHashMap::default(),
            call_sites_of: FxHashMap::default(),
            reasons: FxHashMap::default(),
            worklist: VecDeque::new(),
            visited_methods: FxHashSet::default(),
            exit_cache: FxHashMap::default(),
            stats: SolverStats::default(),
        }
    }

    /// Seed start facts at every entry statement of `method`
    pub fn seed(&mut self, method: MethodId, fx: &mut dyn SolverEffects) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let analyzer = Arc::clone(&self.analyzer);
        let space = analyzer.flow_space();

        for entry in graph.entry_points(method) {
            let stmt = graph.statement(entry);
            for fact in space.start_facts(stmt) {
                let vertex = Vertex::new(entry, fact);
                self.propagate(Edge::loop_at(vertex), Reason::Initial, fx)?;
            }
        }
        Ok(())
    }

    /// An edge received from another unit or the bidi peer
    pub fn handle_external_edge(&mut self, edge: Edge, fx: &mut dyn SolverEffects) -> Result<()> {
        self.propagate(edge, Reason::External, fx)
    }

    /// Whether the worklist still has edges to process
    pub fn has_pending(&self) -> bool {
        !self.worklist.is_empty()
    }

    /// Process one worklist item. Returns false when the worklist is empty.
    pub fn step(&mut self, fx: &mut dyn SolverEffects) -> Result<bool> {
        let Some(edge) = self.worklist.pop_front() else {
            return Ok(false);
        };
        self.stats.iterations += 1;
        self.process_edge(edge, fx)?;
        Ok(true)
    }

    /// Drain the worklist to a fixed point. Intra-unit convenience used
    /// by tests and by single-unit runs; the runner normally interleaves
    /// `step` with event handling.
    pub fn run_to_fixpoint(&mut self, fx: &mut dyn SolverEffects) -> Result<()> {
        while self.step(fx)? {}
        Ok(())
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn path_edges(&self) -> &FxHashSet<Edge> {
        &self.path_edges
    }

    /// Dissolve into the final state handed to `summary_facts_post` and
    /// the witness reconstructor
    pub fn into_aggregate(mut self) -> (Aggregate, SolverStats) {
        self.stats.path_edges = self.path_edges.len();
        self.stats.summary_edges = self
            .summary_edges
            .values()
            .flat_map(|m| m.values())
            .map(|s| s.len())
            .sum();
        (
            Aggregate {
                path_edges: self.path_edges,
                summary_edges: self.summary_edges,
                reasons: self.reasons,
            },
            self.stats,
        )
    }

    /// Propagate(edge, reason): append the reason, then insert the edge
    /// into the path-edge set and worklist unless already present. New
    /// edges at method exits induce a summary event; the analyzer gets a
    /// chance to mark any new edge as a sink.
    pub fn propagate(
        &mut self,
        edge: Edge,
        reason: Reason,
        fx: &mut dyn SolverEffects,
    ) -> Result<()> {
        let graph = Arc::clone(&self.graph);

        let from_method = graph.method_of(edge.from.stmt);
        let to_method = graph.method_of(edge.to.stmt);
        if from_method != to_method {
            return Err(EngineError::internal(format!(
                "cross-method path edge {} ({} vs {})",
                edge, from_method, to_method
            )));
        }

        self.reasons.entry(edge.clone()).or_default().insert(reason);

        if !self.path_edges.insert(edge.clone()) {
            return Ok(());
        }
        self.worklist.push_back(edge.clone());

        if self.is_exit(to_method, edge.to.stmt) {
            fx.summary_edge(to_method, &edge);
        }

        let analyzer = Arc::clone(&self.analyzer);
        for fact in analyzer.summary_facts(graph.as_ref(), &edge) {
            match fact {
                SummaryFact::Vulnerability(v) => fx.vulnerability(&v),
                SummaryFact::Edge(e) => self.propagate(e, Reason::External, fx)?,
            }
        }
        Ok(())
    }

    fn process_edge(&mut self, edge: Edge, fx: &mut dyn SolverEffects) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let stmt_id = edge.to.stmt;
        let method = graph.method_of(stmt_id);

        if self.visited_methods.insert(method) {
            fx.subscribe(method);
        }

        let callees = graph.callees(stmt_id);
        if !callees.is_empty() {
            self.process_call(&edge, &callees, fx)?;
        } else {
            if self.is_exit(method, stmt_id) {
                self.process_exit(&edge, fx)?;
            }
            // Exit statements may still have exceptional successors, so
            // the sequent transfer applies to them as well.
            self.process_sequent(&edge, fx)?;
        }
        Ok(())
    }

    fn process_sequent(&mut self, edge: &Edge, fx: &mut dyn SolverEffects) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let analyzer = Arc::clone(&self.analyzer);
        let space = analyzer.flow_space();
        let stmt = graph.statement(edge.to.stmt);

        for next_id in graph.successors(edge.to.stmt) {
            let next = graph.statement(next_id);
            for fact in space.sequent(stmt, next, &edge.to.fact) {
                self.propagate(
                    Edge::new(edge.from.clone(), Vertex::new(next_id, fact)),
                    Reason::Sequent(edge.clone()),
                    fx,
                )?;
            }
        }
        Ok(())
    }

    fn process_call(
        &mut self,
        edge: &Edge,
        callees: &[MethodId],
        fx: &mut dyn SolverEffects,
    ) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let analyzer = Arc::clone(&self.analyzer);
        let space = analyzer.flow_space();

        let call_stmt_id = edge.to.stmt;
        let call_stmt = graph.statement(call_stmt_id);
        let return_sites = graph.successors(call_stmt_id);

        // Facts that bypass the callee
        for ret_id in &return_sites {
            let ret_stmt = graph.statement(*ret_id);
            for fact in space.call_to_return(call_stmt, ret_stmt, &edge.to.fact) {
                self.propagate(
                    Edge::new(edge.from.clone(), Vertex::new(*ret_id, fact)),
                    Reason::Sequent(edge.clone()),
                    fx,
                )?;
            }
        }

        for &callee_id in callees {
            let callee = graph.method(callee_id);
            let callee_unit = self.resolver.resolve(callee);
            let same_unit = callee_unit == self.unit;

            for entry_id in graph.entry_points(callee_id) {
                for start_fact in space.call_to_start(call_stmt, callee, &edge.to.fact) {
                    let start = Vertex::new(entry_id, start_fact);

                    self.call_sites_of
                        .entry(start.clone())
                        .or_default()
                        .insert(edge.clone());

                    if !same_unit {
                        if analyzer.save_summary_and_cross_unit() {
                            if self.visited_methods.insert(callee_id) {
                                fx.subscribe(callee_id);
                            }
                            fx.cross_unit_call(&edge.to, &start, callee_id);
                        }
                        continue;
                    }

                    self.propagate(
                        Edge::loop_at(start.clone()),
                        Reason::CallToStart(edge.clone()),
                        fx,
                    )?;

                    // Re-use summaries already cached for this start vertex
                    let known_exits: Vec<Vertex> = self
                        .summary_edges
                        .get(&callee_id)
                        .and_then(|per_start| per_start.get(&start))
                        .map(|exits| exits.iter().cloned().collect())
                        .unwrap_or_default();

                    for exit_vertex in known_exits {
                        self.stats.summary_reuses += 1;
                        let summary = Edge::new(start.clone(), exit_vertex.clone());
                        let exit_stmt = graph.statement(exit_vertex.stmt);
                        for ret_id in &return_sites {
                            let ret_stmt = graph.statement(*ret_id);
                            for fact in
                                space.exit_to_return(call_stmt, ret_stmt, exit_stmt, &exit_vertex.fact)
                            {
                                self.propagate(
                                    Edge::new(edge.from.clone(), Vertex::new(*ret_id, fact)),
                                    Reason::ThroughSummary {
                                        pred: edge.clone(),
                                        summary: summary.clone(),
                                    },
                                    fx,
                                )?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn process_exit(&mut self, edge: &Edge, fx: &mut dyn SolverEffects) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let analyzer = Arc::clone(&self.analyzer);
        let space = analyzer.flow_space();

        let method = graph.method_of(edge.to.stmt);
        let exit_stmt = graph.statement(edge.to.stmt);

        self.summary_edges
            .entry(method)
            .or_default()
            .entry(edge.from.clone())
            .or_default()
            .insert(edge.to.clone());

        let summary = edge.clone();
        let callers: Vec<Edge> = self
            .call_sites_of
            .get(&edge.from)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default();

        debug!(%summary, callers = callers.len(), "summary edge recorded");

        for caller in callers {
            let call_stmt_id = caller.to.stmt;
            let call_stmt = graph.statement(call_stmt_id);
            for ret_id in graph.successors(call_stmt_id) {
                let ret_stmt = graph.statement(ret_id);
                for fact in space.exit_to_return(call_stmt, ret_stmt, exit_stmt, &edge.to.fact) {
                    self.propagate(
                        Edge::new(caller.from.clone(), Vertex::new(ret_id, fact)),
                        Reason::ThroughSummary {
                            pred: caller.clone(),
                            summary: summary.clone(),
                        },
                        fx,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn is_exit(&mut self, method: MethodId, stmt: StatementId) -> bool {
        let graph = Arc::clone(&self.graph);
        self.exit_cache
            .entry(method)
            .or_insert_with(|| graph.exit_points(method).into_iter().collect())
            .contains(&stmt)
    }
}
