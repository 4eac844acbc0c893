//! Engine configuration
//!
//! Thresholds and retention limits for the analysis engine. Every field has a
//! default, so a partial JSON document only overrides what it names.

use crate::error::ComputeError;
use crate::temporal::DEFAULT_GAZE_WINDOW;
use serde::{Deserialize, Serialize};

/// Continuous look-away time (seconds) that raises a gaze alert
pub const DEFAULT_GAZE_AWAY_THRESHOLD_SECS: f64 = 4.0;
/// Confusion score above which the subject is flagged as confused
pub const DEFAULT_CONFUSION_THRESHOLD: f64 = 0.6;
/// Smile score above which an attentive subject reads as engaged
pub const DEFAULT_SMILE_THRESHOLD: f64 = 0.6;
/// Subject records kept before the least recently seen one is evicted
pub const DEFAULT_MAX_SUBJECTS: usize = 10_000;
/// Seconds without a frame after which a subject record is dropped
pub const DEFAULT_IDLE_TTL_SECS: u64 = 3600;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Gaze events retained per subject
    pub gaze_window: usize,
    pub gaze_away_threshold_secs: f64,
    pub confusion_threshold: f64,
    pub smile_threshold: f64,
    /// Upper bound on tracked subjects (`None` = unbounded)
    pub max_subjects: Option<usize>,
    /// Idle expiry for subject records (`None` = never expire)
    pub idle_ttl_secs: Option<u64>,
    /// Drop a subject's record as soon as its connection closes
    pub forget_on_disconnect: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gaze_window: DEFAULT_GAZE_WINDOW,
            gaze_away_threshold_secs: DEFAULT_GAZE_AWAY_THRESHOLD_SECS,
            confusion_threshold: DEFAULT_CONFUSION_THRESHOLD,
            smile_threshold: DEFAULT_SMILE_THRESHOLD,
            max_subjects: Some(DEFAULT_MAX_SUBJECTS),
            idle_ttl_secs: Some(DEFAULT_IDLE_TTL_SECS),
            forget_on_disconnect: false,
        }
    }
}

impl EngineConfig {
    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.gaze_window == 0 {
            return Err(ComputeError::ConfigError(
                "gaze_window must be at least 1".to_string(),
            ));
        }
        if !self.gaze_away_threshold_secs.is_finite() || self.gaze_away_threshold_secs < 0.0 {
            return Err(ComputeError::ConfigError(format!(
                "gaze_away_threshold_secs must be a non-negative number, got {}",
                self.gaze_away_threshold_secs
            )));
        }
        for (name, value) in [
            ("confusion_threshold", self.confusion_threshold),
            ("smile_threshold", self.smile_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ComputeError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_subjects == Some(0) {
            return Err(ComputeError::ConfigError(
                "max_subjects must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
