//! Shared models

mod access_path;
mod graph;
mod method;
mod statement;
mod unit;

pub use access_path::{AccessPath, Root};
pub use graph::{ApplicationGraph, GraphBuilder, InMemoryGraph, ReversedGraph};
pub use method::{Method, MethodId};
pub use statement::{RValue, Statement, StatementId, StatementKind};
pub use unit::{Unit, UnitResolver};
