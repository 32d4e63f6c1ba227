/*
 * bytedb-analysis - interprocedural dataflow engine
 *
 * The IFDS/IDE tabulation core of the bytedb platform (Reps-Horwitz-
 * Sagiv with the Naeem-Lhoták-Rodriguez extension for dynamically
 * discovered supergraphs), with taint-style analyses layered on top.
 *
 * Feature-First Hexagonal Architecture:
 * - shared/      : Common models (Statement, Method, graph, units)
 * - features/    : Vertical slices (ifds engine, taint instantiation)
 * - config/      : Engine settings + taint rule documents
 * - adapters/    : Report emission, graph-file database
 */

/// Shared models and utilities
pub mod shared;

/// Feature modules
pub mod features;

/// Configuration system
pub mod config;

/// External adapters
pub mod adapters;

/// Error types
pub mod errors;

// Re-exports for the public API
pub use errors::{EngineError, Result};
pub use features::ifds::application::{run_analysis, AnalysisResult, Finding};
pub use features::ifds::infrastructure::Outcome;
