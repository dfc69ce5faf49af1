//! Run configuration
//!
//! Optional YAML file; every field has a default. CLI flags override file
//! values (see `main.rs`).
//!
//! ```yaml
//! sleep_interval_secs: 0.5
//! start_paused: false
//! start_learning: true
//! severity: status
//! learning_samples: 40
//! testing_samples: 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SteerError;
use crate::log::Severity;
use crate::state::{is_valid_sleep, DEFAULT_SLEEP_SECS, MAX_SLEEP_SECS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Pause between passes, in seconds
    pub sleep_interval_secs: f64,
    /// Start with the loop paused (press SPACE to go)
    pub start_paused: bool,
    /// Start in the learning phase
    pub start_learning: bool,
    /// Initial log severity threshold
    pub severity: Severity,
    /// Samples consumed by the learning phase
    pub learning_samples: usize,
    /// Samples scored by the testing phase
    pub testing_samples: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sleep_interval_secs: DEFAULT_SLEEP_SECS,
            start_paused: false,
            start_learning: true,
            severity: Severity::Info,
            learning_samples: 20,
            testing_samples: 10,
        }
    }
}

impl RunConfig {
    /// Read, parse and validate a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SteerError> {
        let yaml = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_yaml::from_str(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SteerError> {
        if !is_valid_sleep(self.sleep_interval_secs) {
            return Err(SteerError::InvalidConfig {
                field: "sleep_interval_secs",
                reason: format!(
                    "expected a value between 0 and {}, got {}",
                    MAX_SLEEP_SECS, self.sleep_interval_secs
                ),
            });
        }
        if self.learning_samples == 0 {
            return Err(SteerError::InvalidConfig {
                field: "learning_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.testing_samples == 0 {
            return Err(SteerError::InvalidConfig {
                field: "testing_samples",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
