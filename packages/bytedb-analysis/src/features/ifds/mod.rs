// Interprocedural dataflow engine (IFDS/IDE tabulation)
//
// Layers:
// - domain: facts, vertices, path edges, reasons
// - ports: flow-function space and analyzer contracts
// - infrastructure: solver, summary store, runners, manager, traces
// - application: run orchestration and deterministic harvesting

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;
