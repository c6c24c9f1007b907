//! Runtime configuration, read from YAML.
//!
//! ```yaml
//! timing:
//!   prefer-engine: true
//!   engine-startup-timeout-ms: 250
//!   spin-threshold-us: 1000
//! latency:
//!   target-ms: 15
//!   history: 256
//!   max-burst: 32
//! defaults:
//!   bpm: 96
//!   time-signature: 3/4
//! ```
//!
//! Every key is optional; missing keys take the values shown above (and
//! `max-burst` is unbounded unless given).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MaestroError;
use crate::notation::GlobalDefaults;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TimingConfig {
    /// Try the dedicated clock thread before native timers
    pub prefer_engine: bool,
    pub engine_startup_timeout_ms: u64,
    /// How close to a deadline the clock thread stops sleeping and spins
    pub spin_threshold_us: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            prefer_engine: true,
            engine_startup_timeout_ms: 250,
            spin_threshold_us: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LatencyConfig {
    pub target_ms: f64,
    /// Samples kept for rolling statistics
    pub history: usize,
    /// Late events dispatched at once per scheduled score; the rest are
    /// spread 1 ms apart. `None` leaves bursts unbounded.
    pub max_burst: Option<usize>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            target_ms: 15.0,
            history: 256,
            max_burst: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MaestroConfig {
    pub timing: TimingConfig,
    pub latency: LatencyConfig,
    pub defaults: GlobalDefaults,
}

impl MaestroConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, MaestroError> {
        let config: MaestroConfig =
            serde_yaml::from_str(content).map_err(|e| MaestroError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MaestroError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), MaestroError> {
        if self.latency.history == 0 {
            return Err(MaestroError::Config(
                "latency.history must be at least 1".to_string(),
            ));
        }
        if self.latency.target_ms.is_nan() || self.latency.target_ms <= 0.0 {
            return Err(MaestroError::Config(
                "latency.target-ms must be positive".to_string(),
            ));
        }
        self.defaults.validate()?;
        Ok(())
    }
}
