// src/config.rs

//! Configuration for the zoomer pipeline.
//!
//! `ZoomerConfig` can be deserialized from a JSON document. Every field has a
//! default, so a partial document (or an empty `{}`) is valid. Values are
//! checked by `validate()` before a `Zoomer` accepts them; nothing is
//! re-validated inside the control loop.

use crate::error::{Result, ZoomerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the scheduler, the refinement budget and the render workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomerConfig {
    /// Target frames per second.
    pub frame_rate: f64,
    /// Wall-clock slice, in milliseconds, spent in one UPDATE step before
    /// yielding back to the driver.
    pub update_slice_ms: u64,
    /// UPDATE budget in milliseconds once the view has been stationary for
    /// longer than `wake_timeout_ms`.
    pub update_idle_burst_ms: u64,
    /// Milliseconds without movement before the idle burst applies.
    pub wake_timeout_ms: u64,
    /// Smoothing constant for every running average (`avg += coef * (x - avg)`).
    pub coef: f64,
    /// Render frames inline on the control loop instead of on workers.
    pub disable_workers: bool,
    /// Number of render worker threads.
    pub num_workers: usize,
    /// Upper bound on frames kept in the free pool.
    pub max_pooled_frames: usize,
}

impl Default for ZoomerConfig {
    fn default() -> Self {
        ZoomerConfig {
            frame_rate: 20.0,
            update_slice_ms: 5,
            update_idle_burst_ms: 500,
            wake_timeout_ms: 500,
            coef: 0.10,
            disable_workers: false,
            num_workers: 2,
            max_pooled_frames: 4,
        }
    }
}

impl ZoomerConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ZoomerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Rejects values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(ZoomerError::InvalidConfig(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.update_slice_ms == 0 {
            return Err(ZoomerError::InvalidConfig(
                "update_slice_ms must be at least 1".to_string(),
            ));
        }
        if !(self.coef > 0.0 && self.coef <= 1.0) {
            return Err(ZoomerError::InvalidConfig(format!(
                "coef must be in (0, 1], got {}",
                self.coef
            )));
        }
        if !self.disable_workers && self.num_workers == 0 {
            return Err(ZoomerError::InvalidConfig(
                "num_workers must be at least 1 unless workers are disabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Duration of one frame at the target rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    pub fn update_slice(&self) -> Duration {
        Duration::from_millis(self.update_slice_ms)
    }

    pub fn update_idle_burst(&self) -> Duration {
        Duration::from_millis(self.update_idle_burst_ms)
    }

    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }
}
