//! Error types for bytedb-analysis
//!
//! Provides unified error handling across the crate, following the
//! taxonomy of the analysis engine: configuration errors reject a run
//! before it starts, resolution errors skip the offending rule,
//! propagation errors drop a single edge, budget errors mark the run
//! partial, and internal invariant violations abort.

use thiserror::Error;

/// Main error type for analysis operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unparseable or inconsistent configuration; rejected before analysis
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown class/method referenced by a rule; the rule is skipped
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A flow function misbehaved on a single edge; the edge is dropped
    #[error("Propagation error: {0}")]
    Propagation(String),

    /// The analysis deadline was reached; results are partial
    #[error("Analysis deadline of {0} seconds reached")]
    Budget(u64),

    /// Broken engine invariant; the run aborts with a diagnostic
    #[error("Internal invariant violation: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        EngineError::Resolution(msg.into())
    }

    /// Create a propagation error
    pub fn propagation(msg: impl Into<String>) -> Self {
        EngineError::Propagation(msg.into())
    }

    /// Create an internal invariant error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Whether this error aborts the whole run (as opposed to being
    /// absorbed at the edge or rule it originated from)
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Internal(_) | EngineError::Config(_))
    }
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, EngineError>;
