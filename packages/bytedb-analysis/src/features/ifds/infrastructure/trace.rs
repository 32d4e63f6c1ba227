/*
 * Witness-trace reconstruction
 *
 * Given a sink vertex, walk the Reason DAG backward and produce a trace
 * graph: source vertices, a directed edge relation, and the method-entry
 * vertices from which the sink is reachable.
 *
 * Reasons reference edges by value identity, and ThroughSummary reasons
 * can re-enter an edge through a different tail vertex, so the walk
 * carries a visited set keyed on (edge, current-tail-vertex) and stops
 * when a pair is revisited.
 */

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::features::ifds::domain::{Edge, Reason, Vertex};
use crate::features::ifds::ports::Aggregate;

/// Witness for one finding, reconstructed from edge provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceGraph {
    /// Vertices where the witnessed facts were first introduced
    pub sources: Vec<Vertex>,

    /// Directed edge relation over vertices, sink-reachable
    pub edges: Vec<(Vertex, Vertex)>,

    /// Method-entry vertices from which the sink is reachable
    pub entry_points: Vec<Vertex>,
}

/// Reconstructs trace graphs from the aggregated reason maps
pub struct TraceBuilder<'a> {
    reasons: &'a FxHashMap<Edge, BTreeSet<Reason>>,

    /// Reverse index: head vertex -> edges ending there
    edges_by_head: FxHashMap<&'a Vertex, Vec<&'a Edge>>,
}

impl<'a> TraceBuilder<'a> {
    pub fn new(aggregate: &'a Aggregate) -> Self {
        let mut edges_by_head: FxHashMap<&'a Vertex, Vec<&'a Edge>> = FxHashMap::default();
        for edge in aggregate.reasons.keys() {
            edges_by_head.entry(&edge.to).or_default().push(edge);
        }
        // deterministic traversal order
        for edges in edges_by_head.values_mut() {
            edges.sort();
        }
        Self {
            reasons: &aggregate.reasons,
            edges_by_head,
        }
    }

    /// Build the trace graph witnessing `sink`
    pub fn build(&self, sink: &Vertex) -> TraceGraph {
        let mut sources: FxHashSet<Vertex> = FxHashSet::default();
        let mut edges: FxHashSet<(Vertex, Vertex)> = FxHashSet::default();
        let mut visited: FxHashSet<(Edge, Vertex)> = FxHashSet::default();

        let mut stack: Vec<(Edge, Vertex)> = self
            .edges_by_head
            .get(sink)
            .into_iter()
            .flatten()
            .map(|e| ((*e).clone(), sink.clone()))
            .collect();

        while let Some((edge, last)) = stack.pop() {
            if !visited.insert((edge.clone(), last.clone())) {
                continue;
            }
            let Some(reasons) = self.reasons.get(&edge) else {
                continue;
            };
            for reason in reasons {
                match reason {
                    Reason::Initial | Reason::External => {
                        sources.insert(edge.from.clone());
                    }
                    Reason::Sequent(pred) => {
                        if pred.to.fact == edge.to.fact {
                            // same fact: the step is invisible in the witness
                            stack.push((pred.clone(), last.clone()));
                        } else {
                            edges.insert((pred.to.clone(), last.clone()));
                            stack.push((pred.clone(), pred.to.clone()));
                        }
                    }
                    Reason::CallToStart(pred) => {
                        edges.insert((pred.to.clone(), last.clone()));
                        stack.push((pred.clone(), pred.to.clone()));
                    }
                    Reason::ThroughSummary { pred, summary } => {
                        edges.insert((summary.to.clone(), last.clone()));
                        edges.insert((pred.to.clone(), summary.from.clone()));
                        stack.push((summary.clone(), summary.to.clone()));
                        stack.push((pred.clone(), pred.to.clone()));
                    }
                }
            }
        }

        TraceGraph {
            sources: sorted(sources),
            edges: {
                let mut out: Vec<(Vertex, Vertex)> = edges.into_iter().collect();
                out.sort();
                out
            },
            entry_points: sorted(self.entry_points(sink)),
        }
    }

    /// Second pass: walk reasons until Initial/External-terminal edges;
    /// their from vertices are the entry points
    fn entry_points(&self, sink: &Vertex) -> FxHashSet<Vertex> {
        let mut entry_points: FxHashSet<Vertex> = FxHashSet::default();
        let mut visited: FxHashSet<&Edge> = FxHashSet::default();

        let mut stack: Vec<&Edge> = self
            .edges_by_head
            .get(sink)
            .into_iter()
            .flatten()
            .copied()
            .collect();

        while let Some(edge) = stack.pop() {
            if !visited.insert(edge) {
                continue;
            }
            let Some(reasons) = self.reasons.get(edge) else {
                continue;
            };
            for reason in reasons {
                match reason {
                    Reason::Initial | Reason::External => {
                        entry_points.insert(edge.from.clone());
                    }
                    Reason::Sequent(pred) | Reason::CallToStart(pred) => stack.push(pred),
                    Reason::ThroughSummary { pred, summary } => {
                        stack.push(pred);
                        stack.push(summary);
                    }
                }
            }
        }
        entry_points
    }
}

fn sorted(set: FxHashSet<Vertex>) -> Vec<Vertex> {
    let mut out: Vec<Vertex> = set.into_iter().collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ifds::domain::{Fact, Mark};
    use crate::shared::models::{AccessPath, StatementId};

    fn zero(stmt: u32) -> Vertex {
        Vertex::new(StatementId(stmt), Fact::Zero)
    }

    fn tainted(stmt: u32, local: &str) -> Vertex {
        Vertex::new(
            StatementId(stmt),
            Fact::marked(AccessPath::local(local), Mark::Taint, 5),
        )
    }

    fn aggregate_of(entries: Vec<(Edge, Vec<Reason>)>) -> Aggregate {
        let mut aggregate = Aggregate::default();
        for (edge, reasons) in entries {
            aggregate.path_edges.insert(edge.clone());
            aggregate
                .reasons
                .entry(edge)
                .or_default()
                .extend(reasons);
        }
        aggregate
    }

    /// s0: x = source(); s1: sink(x)
    #[test]
    fn test_straight_line_witness() {
        let seed = Edge::loop_at(zero(0));
        let gen = Edge::new(zero(0), tainted(1, "x"));

        let aggregate = aggregate_of(vec![
            (seed.clone(), vec![Reason::Initial]),
            (gen.clone(), vec![Reason::Sequent(seed.clone())]),
        ]);

        let sink = tainted(1, "x");
        let trace = TraceBuilder::new(&aggregate).build(&sink);

        assert_eq!(trace.sources, vec![zero(0)]);
        assert_eq!(trace.edges, vec![(zero(0), tainted(1, "x"))]);
        assert_eq!(trace.entry_points, vec![zero(0)]);
    }

    /// Fact-preserving sequent steps leave no edge in the witness
    #[test]
    fn test_invisible_steps_collapse() {
        let seed = Edge::loop_at(zero(0));
        let gen = Edge::new(zero(0), tainted(1, "x"));
        let carry = Edge::new(zero(0), tainted(2, "x"));

        let aggregate = aggregate_of(vec![
            (seed.clone(), vec![Reason::Initial]),
            (gen.clone(), vec![Reason::Sequent(seed.clone())]),
            (carry.clone(), vec![Reason::Sequent(gen.clone())]),
        ]);

        let sink = tainted(2, "x");
        let trace = TraceBuilder::new(&aggregate).build(&sink);

        // carry has the same fact as gen, so only the fact-introducing
        // step appears, re-targeted at the sink
        assert_eq!(trace.edges, vec![(zero(0), tainted(2, "x"))]);
        assert_eq!(trace.sources, vec![zero(0)]);
    }

    /// ThroughSummary links both the summary body and the call prefix
    #[test]
    fn test_summary_witness() {
        // caller: s0 seed, s1 call, s2 return site
        // callee: s3 entry, s4 exit
        let seed = Edge::loop_at(zero(0));
        let at_call = Edge::new(zero(0), tainted(1, "a"));
        let callee_seed = Edge::loop_at(tainted(3, "p"));
        let summary = Edge::new(tainted(3, "p"), tainted(4, "r"));
        let resumed = Edge::new(zero(0), tainted(2, "b"));

        let aggregate = aggregate_of(vec![
            (seed.clone(), vec![Reason::Initial]),
            (at_call.clone(), vec![Reason::Sequent(seed.clone())]),
            (callee_seed.clone(), vec![Reason::CallToStart(at_call.clone())]),
            (summary.clone(), vec![Reason::Sequent(callee_seed.clone())]),
            (
                resumed.clone(),
                vec![Reason::ThroughSummary {
                    pred: at_call.clone(),
                    summary: summary.clone(),
                }],
            ),
        ]);

        let sink = tainted(2, "b");
        let trace = TraceBuilder::new(&aggregate).build(&sink);

        // callee exit linked to the sink, call site linked into the callee
        assert!(trace.edges.contains(&(tainted(4, "r"), tainted(2, "b"))));
        assert!(trace.edges.contains(&(tainted(1, "a"), tainted(3, "p"))));
        assert_eq!(trace.sources, vec![zero(0)]);
        assert_eq!(trace.entry_points, vec![zero(0)]);
    }

    /// A cyclic reason structure (recursion) terminates via the
    /// (edge, tail) visited set
    #[test]
    fn test_cycle_terminates() {
        let seed = Edge::loop_at(tainted(0, "x"));
        let forward = Edge::new(tainted(0, "x"), tainted(1, "x"));
        let back = Edge::new(tainted(0, "x"), tainted(0, "x"));

        let mut aggregate = aggregate_of(vec![
            (seed.clone(), vec![Reason::Initial, Reason::Sequent(forward.clone())]),
            (forward.clone(), vec![Reason::Sequent(seed.clone())]),
        ]);
        aggregate
            .reasons
            .entry(back)
            .or_default()
            .insert(Reason::Sequent(forward.clone()));

        let sink = tainted(1, "x");
        let trace = TraceBuilder::new(&aggregate).build(&sink);
        assert_eq!(trace.sources, vec![tainted(0, "x")]);
    }

    #[test]
    fn test_external_reason_is_a_source_and_entry() {
        let external = Edge::new(tainted(3, "p"), tainted(4, "r"));
        let aggregate = aggregate_of(vec![(external.clone(), vec![Reason::External])]);

        let trace = TraceBuilder::new(&aggregate).build(&tainted(4, "r"));
        assert_eq!(trace.sources, vec![tainted(3, "p")]);
        assert_eq!(trace.entry_points, vec![tainted(3, "p")]);
    }
}
