//! Configuration system
//!
//! Two documents drive a run: the engine configuration (deadline, domain
//! bound, partitioning) and the taint rule set (sources, sinks,
//! pass-throughs, sanitizers). The analysis configuration file the CLI
//! consumes carries both: an optional `engine` section plus the rule
//! lists at top level. User rules are appended to the embedded defaults
//! by structural merge.

mod engine;
mod rules;

pub use engine::EngineConfig;
pub use rules::{
    CompiledPassThroughRule, CompiledPositionRule, CompiledRules, PassThroughRule, Position,
    PositionRule, TaintRules,
};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{EngineError, Result};

/// The document behind `--analysis-conf`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    pub engine: EngineConfig,

    #[serde(flatten)]
    pub rules: TaintRules,
}

impl AnalysisConfig {
    pub fn from_json(text: &str) -> Result<AnalysisConfig> {
        let config: AnalysisConfig = serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("unparseable analysis config: {}", e)))?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<AnalysisConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Defaults plus this document's rules, compiled
    pub fn effective_rules(&self) -> CompiledRules {
        TaintRules::default_rules()
            .merged_with(self.rules.clone())
            .compile()
    }
}
