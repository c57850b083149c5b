//! Pipeline configuration — validated ranges, loadable from YAML.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Hard ceiling on generated pattern length.
pub const MAX_PATTERN_LENGTH: usize = 64;

/// Smoothing coefficient for tempo estimation.
pub const TEMPO_SMOOTHING: f64 = 0.1;

/// Onset threshold as a multiple of the running RMS.
pub const ONSET_THRESHOLD_FACTOR: f32 = 1.5;

/// Minimum time between detected onsets, in milliseconds.
pub const MIN_ONSET_INTERVAL_MS: f64 = 200.0;

/// Tunable pipeline parameters. Fixed constants (pattern length ceiling,
/// tempo smoothing, onset thresholds) live as module constants above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of voice slots, fixed at construction. Range [1, 1024].
    #[serde(default = "PipelineConfig::default_max_polyphony")]
    pub max_polyphony: usize,
    /// Scheduling lookahead in milliseconds. Range [10, 2000].
    #[serde(default = "PipelineConfig::default_lookahead_ms")]
    pub lookahead_ms: u32,
    /// SPSC event queue capacity. Powers of two avoid wasted slots.
    #[serde(default = "PipelineConfig::default_queue_capacity")]
    pub queue_capacity: usize,
    /// Seed for pattern randomization.
    #[serde(default)]
    pub seed: u64,
}

impl PipelineConfig {
    fn default_max_polyphony() -> usize {
        256
    }

    fn default_lookahead_ms() -> u32 {
        200
    }

    fn default_queue_capacity() -> usize {
        2048
    }

    /// Parse a config from YAML text. Missing fields take defaults;
    /// the result is validated before being returned.
    pub fn from_yaml_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=1024).contains(&self.max_polyphony) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_polyphony must be in [1, 1024], got {}",
                self.max_polyphony
            )));
        }
        if !(10..=2000).contains(&self.lookahead_ms) {
            return Err(PipelineError::InvalidConfig(format!(
                "lookahead_ms must be in [10, 2000], got {}",
                self.lookahead_ms
            )));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_polyphony: Self::default_max_polyphony(),
            lookahead_ms: Self::default_lookahead_ms(),
            queue_capacity: Self::default_queue_capacity(),
            seed: 0,
        }
    }
}
