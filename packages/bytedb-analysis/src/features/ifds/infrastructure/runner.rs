/*
 * Unit runner
 *
 * One runner per unit, one OS thread per runner. The loop interleaves
 * three duties:
 * - drain the inbox (events from topics, the manager's router, and the
 *   bidi peer) into the solver
 * - process one worklist edge, then yield to keep the pool fair
 * - when both are empty, raise the idle flag and park briefly on the
 *   inbox so external events wake it promptly
 *
 * Cancellation is cooperative: the shared flag is checked at every
 * dequeue and before every external publish. Fatal solver errors raise
 * the shared fatal flag so the manager aborts the whole run.
 */

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::solver::{IfdsSolver, SolverEffects, SolverStats};
use super::summary_store::{Event, EventChannel, SummaryStore};
use crate::errors::{EngineError, Result};
use crate::features::ifds::domain::{Edge, Reason, Vertex, Vulnerability};
use crate::features::ifds::ports::{Aggregate, Analyzer, SummaryFact};
use crate::shared::models::{ApplicationGraph, MethodId, Unit, UnitResolver};

/// Event plus the unit whose runner must receive it
pub struct RoutedEvent {
    pub target: Unit,
    pub event: Event,
}

/// Sender half of the manager's routing channel, with the same
/// in-flight accounting as runner inboxes
#[derive(Clone)]
pub struct RouterChannel {
    sender: Sender<RoutedEvent>,
    in_flight: Arc<AtomicUsize>,
}

impl RouterChannel {
    pub fn new(sender: Sender<RoutedEvent>, in_flight: Arc<AtomicUsize>) -> Self {
        Self { sender, in_flight }
    }

    pub fn send(&self, routed: RoutedEvent) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.sender.send(routed) {
            Ok(()) => true,
            Err(_) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }
}

/// Final state a runner hands back to the manager
pub struct RunnerOutput {
    pub unit: Unit,
    pub aggregate: Aggregate,
    pub stats: SolverStats,
    pub error: Option<EngineError>,
}

struct RunnerEffects<'a> {
    unit: &'a Unit,
    resolver: UnitResolver,
    graph: &'a dyn ApplicationGraph,
    store: &'a SummaryStore,
    inbox_channel: &'a EventChannel,
    router: &'a RouterChannel,
    peer: Option<&'a EventChannel>,
    save: bool,
    cancel: &'a AtomicBool,
}

impl SolverEffects for RunnerEffects<'_> {
    fn subscribe(&mut self, method: MethodId) {
        self.store.subscribe(method, self.inbox_channel.clone());
    }

    fn summary_edge(&mut self, method: MethodId, edge: &Edge) {
        // checkpoint before every external publish
        if self.cancel.load(Ordering::Acquire) {
            return;
        }
        if self.save {
            self.store.publish(
                method,
                Event::SummaryEdge {
                    method,
                    edge: edge.clone(),
                },
            );
        }
        if let Some(peer) = self.peer {
            peer.send(Event::EdgeForOtherRunner { edge: edge.clone() });
        }
    }

    fn vulnerability(&mut self, vulnerability: &Vulnerability) {
        self.store.add_vulnerability(vulnerability.clone());
    }

    fn cross_unit_call(&mut self, caller: &Vertex, callee_start: &Vertex, callee: MethodId) {
        if self.cancel.load(Ordering::Acquire) {
            return;
        }
        let target = self.resolver.resolve(self.graph.method(callee));
        debug!(unit = %self.unit, %target, "cross-unit call");
        self.router.send(RoutedEvent {
            target,
            event: Event::CrossUnitCall {
                caller: caller.clone(),
                callee_start: callee_start.clone(),
                callee,
            },
        });
    }
}

pub struct UnitRunner {
    unit: Unit,
    graph: Arc<dyn ApplicationGraph>,
    analyzer: Arc<dyn Analyzer>,
    resolver: UnitResolver,
    store: Arc<SummaryStore>,
    solver: IfdsSolver,

    inbox: Receiver<Event>,
    inbox_channel: EventChannel,
    router: RouterChannel,
    peer: Option<EventChannel>,

    start_methods: Vec<MethodId>,

    cancel: Arc<AtomicBool>,
    fatal: Arc<AtomicBool>,
    idle: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl UnitRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        unit: Unit,
        graph: Arc<dyn ApplicationGraph>,
        analyzer: Arc<dyn Analyzer>,
        resolver: UnitResolver,
        store: Arc<SummaryStore>,
        router: RouterChannel,
        start_methods: Vec<MethodId>,
        cancel: Arc<AtomicBool>,
        fatal: Arc<AtomicBool>,
        in_flight: Arc<AtomicUsize>,
    ) -> (Self, EventChannel) {
        let (tx, rx) = channel();
        let inbox_channel = EventChannel::new(tx, in_flight.clone());
        let solver = IfdsSolver::new(
            graph.clone(),
            analyzer.clone(),
            unit.clone(),
            resolver,
        );
        let runner = Self {
            unit,
            graph,
            analyzer,
            resolver,
            store,
            solver,
            inbox: rx,
            inbox_channel: inbox_channel.clone(),
            router,
            peer: None,
            start_methods,
            cancel,
            fatal,
            idle: Arc::new(AtomicBool::new(false)),
            in_flight,
        };
        (runner, inbox_channel)
    }

    /// Couple this runner with its bidi peer: every summary edge is also
    /// injected into the peer's inbox as `EdgeForOtherRunner`
    pub fn set_peer(&mut self, peer: EventChannel) {
        self.peer = Some(peer);
    }

    /// Worklist-emptiness flag observed by the manager
    pub fn idle_flag(&self) -> Arc<AtomicBool> {
        self.idle.clone()
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Run to cancellation, then hand back the final state
    pub fn run(mut self) -> RunnerOutput {
        let error = self.event_loop().err();
        if let Some(err) = &error {
            warn!(unit = %self.unit, %err, "runner stopped on error");
            if err.is_fatal() {
                self.fatal.store(true, Ordering::Release);
            }
        }
        self.idle.store(true, Ordering::Release);
        self.drain_inbox_discard();

        let analyzer = self.analyzer.clone();
        let (aggregate, stats) = self.solver.into_aggregate();

        // post-quiescence detections over the full edge set
        for fact in analyzer.summary_facts_post(self.graph.as_ref(), &aggregate) {
            if let SummaryFact::Vulnerability(v) = fact {
                self.store.add_vulnerability(v);
            }
        }

        RunnerOutput {
            unit: self.unit,
            aggregate,
            stats,
            error,
        }
    }

    fn event_loop(&mut self) -> Result<()> {
        let starts = self.start_methods.clone();
        for method in starts {
            self.with_effects(|solver, fx| solver.seed(method, fx))?;
        }

        while !self.cancel.load(Ordering::Acquire) {
            while let Ok(event) = self.inbox.try_recv() {
                self.idle.store(false, Ordering::Release);
                let outcome = self.handle_event(event);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                outcome?;
            }

            let stepped = self.with_effects(|solver, fx| solver.step(fx))?;
            if stepped {
                self.idle.store(false, Ordering::Release);
                // explicit yield after each edge keeps the pool fair
                thread::yield_now();
                continue;
            }

            self.idle.store(true, Ordering::Release);
            match self.inbox.recv_timeout(Duration::from_millis(5)) {
                Ok(event) => {
                    self.idle.store(false, Ordering::Release);
                    let outcome = self.handle_event(event);
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    outcome?;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::SummaryEdge { method, edge } => {
                // only summary-shaped edges of the subscribed method enter
                let entries = self.graph.entry_points(method);
                if entries.contains(&edge.from.stmt) {
                    self.with_effects(|solver, fx| solver.handle_external_edge(edge, fx))?;
                }
            }
            Event::EdgeForOtherRunner { edge } => {
                self.with_effects(|solver, fx| solver.handle_external_edge(edge, fx))?;
            }
            Event::CrossUnitCall { callee_start, .. } => {
                self.with_effects(|solver, fx| {
                    solver.propagate(Edge::loop_at(callee_start), Reason::External, fx)
                })?;
            }
            Event::Vulnerability(v) => self.store.add_vulnerability(v),
        }
        Ok(())
    }

    fn with_effects<R>(
        &mut self,
        f: impl FnOnce(&mut IfdsSolver, &mut RunnerEffects<'_>) -> R,
    ) -> R {
        let mut fx = RunnerEffects {
            unit: &self.unit,
            resolver: self.resolver,
            graph: self.graph.as_ref(),
            store: &*self.store,
            inbox_channel: &self.inbox_channel,
            router: &self.router,
            peer: self.peer.as_ref(),
            save: self.analyzer.save_summary_and_cross_unit(),
            cancel: &*self.cancel,
        };
        f(&mut self.solver, &mut fx)
    }

    fn drain_inbox_discard(&mut self) {
        while self.inbox.try_recv().is_ok() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
