//! External adapters: report emission and the graph-file database

pub mod database;
pub mod report;

pub use database::FileDatabase;
pub use report::{to_sarif, Report, SarifReport};
