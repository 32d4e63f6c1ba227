//! Analysis application layer
//!
//! Wires a graph, an analyzer (plus optional backward analyzer), and
//! the engine configuration into one run: the unit manager executes to
//! quiescence or deadline, findings are sorted by the stable key
//! `(method id, sink statement id, fact hash)` so repeated runs emit
//! identical reports, and witness traces are reconstructed from the
//! aggregated reason maps - in parallel, one finding at a time.

use rayon::prelude::*;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use super::domain::Vulnerability;
use super::infrastructure::{Outcome, SolverStats, TraceBuilder, TraceGraph, UnitManager};
use super::ports::{Aggregate, Analyzer};
use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::shared::models::{ApplicationGraph, MethodId};

/// A vulnerability together with its reconstructed witness
#[derive(Debug, Clone)]
pub struct Finding {
    pub vulnerability: Vulnerability,
    pub trace: TraceGraph,
}

/// Everything a run produced
pub struct AnalysisResult {
    pub outcome: Outcome,
    pub findings: Vec<Finding>,
    pub stats: SolverStats,
    pub events_dropped: bool,
    pub duration: Duration,
    pub diagnostic: Option<String>,

    /// Final merged solver state, kept while witnesses may be wanted
    pub aggregate: Aggregate,
}

/// Stable sort key for deterministic output
fn stable_key(v: &Vulnerability) -> (MethodId, crate::shared::models::StatementId, u64) {
    let mut hasher = FxHasher::default();
    v.sink.fact.hash(&mut hasher);
    (v.method, v.sink.stmt, hasher.finish())
}

/// Resolve class-name prefixes (semicolon-separated on the CLI) to
/// start methods, in deterministic order
pub fn resolve_start_methods(graph: &dyn ApplicationGraph, prefixes: &[String]) -> Vec<MethodId> {
    let mut methods: Vec<MethodId> = graph
        .methods()
        .into_iter()
        .filter(|id| {
            let class = &graph.method(*id).class_name;
            prefixes.iter().any(|p| class.starts_with(p.as_str()))
        })
        .collect();
    methods.sort();
    methods
}

/// Run one analysis to completion and harvest sorted findings
pub fn run_analysis(
    graph: Arc<dyn ApplicationGraph>,
    analyzer: Arc<dyn Analyzer>,
    backward: Option<Arc<dyn Analyzer>>,
    start_methods: &[MethodId],
    config: &EngineConfig,
) -> Result<AnalysisResult> {
    let mut manager = UnitManager::new(graph.clone(), analyzer, config.clone());
    if let Some(backward) = backward {
        manager = manager.with_backward(backward);
    }
    let run = manager.run(start_methods)?;

    let mut vulnerabilities = run.vulnerabilities;
    vulnerabilities.sort_by_key(stable_key);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_workers())
        .build()
        .map_err(|e| EngineError::internal(format!("trace pool: {}", e)))?;

    let builder = TraceBuilder::new(&run.aggregate);
    let findings: Vec<Finding> = pool.install(|| {
        vulnerabilities
            .par_iter()
            .map(|v| Finding {
                vulnerability: v.clone(),
                trace: builder.build(&v.sink),
            })
            .collect()
    });

    Ok(AnalysisResult {
        outcome: run.outcome,
        findings,
        stats: run.stats,
        events_dropped: run.events_dropped,
        duration: run.duration,
        diagnostic: run.diagnostic,
        aggregate: run.aggregate,
    })
}
