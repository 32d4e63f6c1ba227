//! Engine configuration
//!
//! Runtime knobs of the solver and manager. Everything has a default;
//! values are validated before a run starts so misconfiguration is a
//! rejection, never a mid-analysis surprise.

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::shared::models::UnitResolver;

fn default_deadline_secs() -> u64 {
    100
}

fn default_access_path_depth() -> usize {
    5
}

fn default_replay_capacity() -> usize {
    65_536
}

/// Solver/manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Hard deadline; on expiry runners are cancelled and the result is
    /// marked partial
    pub deadline_secs: u64,

    /// Structural bound on access-path selectors; deeper paths are
    /// truncated to keep the domain finite per method
    pub max_access_path_depth: usize,

    /// Cap on a topic's replay buffer; overflow downgrades to
    /// drop-newest and flags the result
    pub replay_capacity: usize,

    /// Partition strategy mapping methods to runner units
    pub unit_resolver: UnitResolver,

    /// Worker-thread hint for auxiliary parallelism (trace building);
    /// defaults to the machine's logical CPU count
    pub workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            max_access_path_depth: default_access_path_depth(),
            replay_capacity: default_replay_capacity(),
            unit_resolver: UnitResolver::default(),
            workers: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.deadline_secs == 0 {
            return Err(EngineError::config("deadlineSecs must be positive"));
        }
        if self.max_access_path_depth == 0 {
            return Err(EngineError::config("maxAccessPathDepth must be at least 1"));
        }
        if self.replay_capacity == 0 {
            return Err(EngineError::config("replayCapacity must be positive"));
        }
        if let Some(0) = self.workers {
            return Err(EngineError::config("workers must be positive when set"));
        }
        Ok(())
    }

    /// Effective worker count for auxiliary parallelism
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }
}
