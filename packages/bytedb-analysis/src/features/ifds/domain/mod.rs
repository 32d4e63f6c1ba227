//! IFDS domain model: facts, vertices, path edges, reasons

mod fact;
mod vertex;

pub use fact::{Fact, Mark, TaintFact};
pub use vertex::{Edge, Reason, Vertex, Vulnerability};
