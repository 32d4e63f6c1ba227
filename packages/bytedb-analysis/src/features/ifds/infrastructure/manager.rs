/*
 * Unit manager
 *
 * Resolves start methods to units, spawns one runner (or one bidi pair)
 * per unit, routes cross-runner events, detects global quiescence,
 * enforces the deadline, and harvests results.
 *
 * Quiescence is polling-based: every runner exposes a
 * worklist-emptiness flag, and every event in a channel is counted in a
 * shared in-flight counter. The run is done when all runners are
 * simultaneously idle, nothing is in flight, and the router queue is
 * empty - confirmed on two consecutive polls so a runner that just
 * dequeued an event cannot be mistaken for idle.
 *
 * The deadline and quiescence may race; both paths funnel into the same
 * cooperative cancel flag, so cancelling an already-quiescent runner is
 * harmless and the outcome is decided exactly once.
 */

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::bidi::BidiRunner;
use super::runner::{RouterChannel, RoutedEvent, RunnerOutput, UnitRunner};
use super::solver::SolverStats;
use super::summary_store::{EventChannel, SummaryStore};
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::features::ifds::domain::Vulnerability;
use crate::features::ifds::ports::{Aggregate, Analyzer};
use crate::shared::models::{ApplicationGraph, MethodId, ReversedGraph, Unit};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Global quiescence was reached
    Complete,

    /// The deadline fired first; results are what was known by then
    Partial,

    /// An internal invariant was violated
    Aborted,
}

/// Harvested result of one analysis run
pub struct AnalysisRun {
    pub outcome: Outcome,
    pub aggregate: Aggregate,
    pub vulnerabilities: Vec<Vulnerability>,
    pub stats: SolverStats,
    pub events_dropped: bool,
    pub duration: Duration,

    /// Diagnostic for aborted runs
    pub diagnostic: Option<String>,
}

pub struct UnitManager {
    graph: Arc<dyn ApplicationGraph>,
    analyzer: Arc<dyn Analyzer>,
    backward_analyzer: Option<Arc<dyn Analyzer>>,
    config: EngineConfig,
}

impl UnitManager {
    pub fn new(
        graph: Arc<dyn ApplicationGraph>,
        analyzer: Arc<dyn Analyzer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            analyzer,
            backward_analyzer: None,
            config,
        }
    }

    /// Attach a backward analyzer; every unit then gets a bidi pair
    /// instead of a single forward runner
    pub fn with_backward(mut self, backward: Arc<dyn Analyzer>) -> Self {
        self.backward_analyzer = Some(backward);
        self
    }

    /// Run the analysis over the given start methods
    pub fn run(&self, start_methods: &[MethodId]) -> Result<AnalysisRun> {
        self.config.validate()?;
        let started = Instant::now();

        if start_methods.is_empty() {
            return Ok(AnalysisRun {
                outcome: Outcome::Complete,
                aggregate: Aggregate::default(),
                vulnerabilities: Vec::new(),
                stats: SolverStats::default(),
                events_dropped: false,
                duration: started.elapsed(),
                diagnostic: None,
            });
        }

        // deterministic unit partition of the start methods
        let mut units: BTreeMap<Unit, Vec<MethodId>> = BTreeMap::new();
        let mut sorted_starts = start_methods.to_vec();
        sorted_starts.sort();
        sorted_starts.dedup();
        for method in sorted_starts {
            let unit = self
                .config
                .unit_resolver
                .resolve(self.graph.method(method));
            units.entry(unit).or_default().push(method);
        }

        let store = Arc::new(SummaryStore::new(self.config.replay_capacity));
        let cancel = Arc::new(AtomicBool::new(false));
        let fatal = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let (router_tx, router_rx) = channel::<RoutedEvent>();
        let router = RouterChannel::new(router_tx, in_flight.clone());

        let reversed: Option<Arc<dyn ApplicationGraph>> = self
            .backward_analyzer
            .as_ref()
            .map(|_| Arc::new(ReversedGraph::new(self.graph.clone())) as Arc<dyn ApplicationGraph>);

        let mut handles: Vec<JoinHandle<RunnerOutput>> = Vec::new();
        let mut idle_flags = Vec::new();
        let mut routing: FxHashMap<Unit, EventChannel> = FxHashMap::default();

        info!(units = units.len(), "starting runners");
        for (unit, methods) in units {
            let (forward, forward_inbox) = UnitRunner::new(
                unit.clone(),
                self.graph.clone(),
                self.analyzer.clone(),
                self.config.unit_resolver,
                store.clone(),
                router.clone(),
                methods.clone(),
                cancel.clone(),
                fatal.clone(),
                in_flight.clone(),
            );
            routing.insert(unit.clone(), forward_inbox.clone());

            match (&self.backward_analyzer, &reversed) {
                (Some(backward_analyzer), Some(reversed_graph)) => {
                    let (backward, backward_inbox) = UnitRunner::new(
                        unit.clone(),
                        reversed_graph.clone(),
                        backward_analyzer.clone(),
                        self.config.unit_resolver,
                        store.clone(),
                        router.clone(),
                        methods,
                        cancel.clone(),
                        fatal.clone(),
                        in_flight.clone(),
                    );
                    let pair = BidiRunner::new(forward, forward_inbox, backward, backward_inbox);
                    idle_flags.extend(pair.idle_flags());
                    handles.extend(pair.spawn());
                }
                _ => {
                    idle_flags.push(forward.idle_flag());
                    handles.push(
                        thread::Builder::new()
                            .name(format!("runner-{}", forward.unit()))
                            .spawn(move || forward.run())
                            .expect("spawn runner thread"),
                    );
                }
            }
        }

        // supervision: route, watch for quiescence/deadline/abort
        let deadline = started + Duration::from_secs(self.config.deadline_secs);
        let mut outcome = Outcome::Complete;
        let mut stable_polls = 0u32;
        let mut polls = 0u64;

        loop {
            let mut routed_any = false;
            while let Ok(routed) = router_rx.try_recv() {
                routed_any = true;
                match routing.get(&routed.target) {
                    Some(inbox) => {
                        inbox.send(routed.event);
                    }
                    None => {
                        warn!(target = %routed.target, "dropping event for absent runner");
                    }
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }

            if fatal.load(Ordering::Acquire) {
                outcome = Outcome::Aborted;
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    deadline_secs = self.config.deadline_secs,
                    "deadline reached; cancelling runners"
                );
                outcome = Outcome::Partial;
                break;
            }

            let all_idle = idle_flags.iter().all(|f| f.load(Ordering::Acquire));
            if all_idle && in_flight.load(Ordering::SeqCst) == 0 && !routed_any {
                stable_polls += 1;
                if stable_polls >= 2 {
                    break;
                }
            } else {
                stable_polls = 0;
            }

            polls += 1;
            if polls % 1024 == 0 {
                let queued: usize = store.queue_depths().iter().map(|(_, d)| d).sum();
                debug!(
                    in_flight = in_flight.load(Ordering::SeqCst),
                    idle = idle_flags
                        .iter()
                        .filter(|f| f.load(Ordering::Acquire))
                        .count(),
                    queued,
                    "progress"
                );
            }
            thread::sleep(Duration::from_millis(1));
        }

        cancel.store(true, Ordering::Release);

        let mut aggregate = Aggregate::default();
        let mut stats = SolverStats::default();
        let mut diagnostic = None;
        for handle in handles {
            let output = handle.join().expect("runner thread panicked");
            if let Some(err) = output.error {
                if diagnostic.is_none() {
                    diagnostic = Some(err.to_string());
                }
                if err.is_fatal() {
                    outcome = Outcome::Aborted;
                }
            }
            stats.iterations += output.stats.iterations;
            stats.path_edges += output.stats.path_edges;
            stats.summary_edges += output.stats.summary_edges;
            stats.summary_reuses += output.stats.summary_reuses;
            aggregate.absorb(output.aggregate);
        }

        info!(
            ?outcome,
            path_edges = stats.path_edges,
            summary_edges = stats.summary_edges,
            duration_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );

        Ok(AnalysisRun {
            outcome,
            aggregate,
            vulnerabilities: store.vulnerabilities(),
            stats,
            events_dropped: store.events_dropped(),
            duration: started.elapsed(),
            diagnostic,
        })
    }
}
