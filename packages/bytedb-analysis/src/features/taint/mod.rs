// Taint instantiation of the dataflow engine: rule-driven flow
// functions, sink detection, and the backward (demand) variant used by
// bidi pairs.

mod analyzer;
mod backward;
mod flow;

pub use analyzer::{TaintAnalyzer, TAINT_FORWARD};
pub use backward::{BackwardTaintAnalyzer, BackwardTaintFlowSpace, TAINT_BACKWARD};
pub use flow::TaintFlowSpace;
