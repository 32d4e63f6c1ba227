//! IFDS infrastructure: solver, event bus, runners, manager, traces

pub mod bidi;
pub mod manager;
pub mod runner;
pub mod solver;
pub mod summary_store;
pub mod trace;

pub use bidi::BidiRunner;
pub use manager::{AnalysisRun, Outcome, UnitManager};
pub use runner::{RouterChannel, RoutedEvent, RunnerOutput, UnitRunner};
pub use solver::{IfdsSolver, RecordingEffects, SolverEffects, SolverStats};
pub use summary_store::{Event, EventChannel, SummaryStore};
pub use trace::{TraceBuilder, TraceGraph};
