use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::rest::AdaptiveRestCalculation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Completed,
    Skipped,
}

impl TimerPhase {
    /// Completed and Skipped only leave via reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimerPhase::Completed | TimerPhase::Skipped)
    }
}

/// The owned state of one rest interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: TimerPhase,
    pub elapsed_seconds: u64,
    pub recommendation: Option<AdaptiveRestCalculation>,
}

/// Read-only view handed to the UI at tick cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub timer_id: Uuid,
    pub phase: TimerPhase,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    /// 0.0 .. 1.0
    pub progress: f64,
    pub recommendation: Option<AdaptiveRestCalculation>,
}

/// Caller-supplied timer behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerOptions {
    /// Seconds from start at which an alert fires. Empty means no alerts.
    #[serde(default = "default_checkpoints")]
    pub alert_checkpoints: BTreeSet<u32>,
    #[serde(default = "default_true")]
    pub auto_complete_on_threshold: bool,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Used when no recommendation could be computed.
    #[serde(default = "default_fallback_rest_seconds")]
    pub fallback_rest_seconds: u32,
}

fn default_checkpoints() -> BTreeSet<u32> {
    [30, 60].into_iter().collect()
}
fn default_true() -> bool {
    true
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_fallback_rest_seconds() -> u32 {
    90
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            alert_checkpoints: default_checkpoints(),
            auto_complete_on_threshold: true,
            tick_interval_ms: default_tick_interval_ms(),
            fallback_rest_seconds: default_fallback_rest_seconds(),
        }
    }
}

impl TimerOptions {
    pub fn with_checkpoints(mut self, checkpoints: impl IntoIterator<Item = u32>) -> Self {
        self.alert_checkpoints = checkpoints.into_iter().collect();
        self
    }

    pub fn with_auto_complete(mut self, enabled: bool) -> Self {
        self.auto_complete_on_threshold = enabled;
        self
    }

    /// # Errors
    /// Rejects zero checkpoints, a zero tick interval and a zero fallback.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.alert_checkpoints.contains(&0) {
            return Err(ValidationError::InvalidCheckpoint);
        }
        if self.tick_interval_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "timer.tick_interval_ms".into(),
                message: "must be positive".into(),
            });
        }
        if self.fallback_rest_seconds == 0 {
            return Err(ValidationError::InvalidValue {
                field: "timer.fallback_rest_seconds".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}
