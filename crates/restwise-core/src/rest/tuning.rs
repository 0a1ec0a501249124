//! Tunable coefficients for the rest engine.
//!
//! Only the shape of each adjustment is fixed by the engine (monotonic,
//! bounded, confidence-weighted). The numbers live here so they can be tuned
//! from `config.toml` without touching the algorithm.

use serde::{Deserialize, Serialize};

use super::catalogue::DifficultyClass;
use crate::error::ValidationError;

/// Base rest in seconds for each difficulty class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseRest {
    #[serde(default = "default_compound")]
    pub compound: u32,
    #[serde(default = "default_accessory")]
    pub accessory: u32,
    #[serde(default = "default_isolation")]
    pub isolation: u32,
}

impl BaseRest {
    pub fn for_class(&self, class: DifficultyClass) -> u32 {
        match class {
            DifficultyClass::Compound => self.compound,
            DifficultyClass::Accessory => self.accessory,
            DifficultyClass::Isolation => self.isolation,
        }
    }
}

impl Default for BaseRest {
    fn default() -> Self {
        Self {
            compound: default_compound(),
            accessory: default_accessory(),
            isolation: default_isolation(),
        }
    }
}

/// Confidence levels reported with a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceLevels {
    /// Floor of the confidence when a history profile was used.
    #[serde(default = "default_confidence_with_history")]
    pub with_history: f64,
    /// No profile exists for this user/exercise yet.
    #[serde(default = "default_confidence_no_history")]
    pub no_history: f64,
    /// History service could not be reached.
    #[serde(default = "default_confidence_degraded")]
    pub degraded: f64,
    /// Subtracted when the set carried no RPE.
    #[serde(default = "default_missing_rpe_penalty")]
    pub missing_rpe_penalty: f64,
}

impl Default for ConfidenceLevels {
    fn default() -> Self {
        Self {
            with_history: default_confidence_with_history(),
            no_history: default_confidence_no_history(),
            degraded: default_confidence_degraded(),
            missing_rpe_penalty: default_missing_rpe_penalty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestTuning {
    #[serde(default = "default_floor")]
    pub floor_seconds: u32,
    #[serde(default = "default_ceiling")]
    pub ceiling_seconds: u32,
    /// RPE at which no adjustment is applied.
    #[serde(default = "default_rpe_neutral")]
    pub rpe_neutral: u8,
    #[serde(default = "default_seconds_per_rpe")]
    pub seconds_per_rpe_point: u32,
    #[serde(default = "default_seconds_per_set")]
    pub fatigue_seconds_per_set: u32,
    #[serde(default = "default_fatigue_cap")]
    pub fatigue_cap_seconds: u32,
    /// Upper bound on how far history may pull the recommendation (0..1).
    #[serde(default = "default_max_influence")]
    pub personalization_max_influence: f64,
    /// Sample count at which personalization reaches half its weight.
    #[serde(default = "default_half_saturation")]
    pub personalization_half_saturation: u32,
    /// Seconds added at a fully positive fatigue trend (scaled by weight).
    #[serde(default = "default_trend_seconds")]
    pub fatigue_trend_seconds: u32,
    #[serde(default)]
    pub base: BaseRest,
    #[serde(default)]
    pub confidence: ConfidenceLevels,
}

fn default_compound() -> u32 {
    120
}
fn default_accessory() -> u32 {
    90
}
fn default_isolation() -> u32 {
    60
}
fn default_floor() -> u32 {
    15
}
fn default_ceiling() -> u32 {
    300
}
fn default_rpe_neutral() -> u8 {
    6
}
fn default_seconds_per_rpe() -> u32 {
    12
}
fn default_seconds_per_set() -> u32 {
    10
}
fn default_fatigue_cap() -> u32 {
    60
}
fn default_max_influence() -> f64 {
    0.5
}
fn default_half_saturation() -> u32 {
    10
}
fn default_trend_seconds() -> u32 {
    20
}
fn default_confidence_with_history() -> f64 {
    0.5
}
fn default_confidence_no_history() -> f64 {
    0.4
}
fn default_confidence_degraded() -> f64 {
    0.25
}
fn default_missing_rpe_penalty() -> f64 {
    0.1
}

impl Default for RestTuning {
    fn default() -> Self {
        Self {
            base: BaseRest::default(),
            floor_seconds: default_floor(),
            ceiling_seconds: default_ceiling(),
            rpe_neutral: default_rpe_neutral(),
            seconds_per_rpe_point: default_seconds_per_rpe(),
            fatigue_seconds_per_set: default_seconds_per_set(),
            fatigue_cap_seconds: default_fatigue_cap(),
            personalization_max_influence: default_max_influence(),
            personalization_half_saturation: default_half_saturation(),
            fatigue_trend_seconds: default_trend_seconds(),
            confidence: ConfidenceLevels::default(),
        }
    }
}

impl RestTuning {
    /// # Errors
    /// Returns the first inconsistent parameter.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.floor_seconds == 0 {
            return Err(invalid("rest.floor_seconds", "must be positive"));
        }
        if self.floor_seconds > self.ceiling_seconds {
            return Err(invalid(
                "rest.floor_seconds",
                "must not exceed rest.ceiling_seconds",
            ));
        }
        if !(1..=10).contains(&self.rpe_neutral) {
            return Err(invalid("rest.rpe_neutral", "must be within 1-10"));
        }
        if !(0.0..=1.0).contains(&self.personalization_max_influence) {
            return Err(invalid(
                "rest.personalization_max_influence",
                "must be within 0-1",
            ));
        }
        let levels = [
            ("rest.confidence.with_history", self.confidence.with_history),
            ("rest.confidence.no_history", self.confidence.no_history),
            ("rest.confidence.degraded", self.confidence.degraded),
            (
                "rest.confidence.missing_rpe_penalty",
                self.confidence.missing_rpe_penalty,
            ),
        ];
        for (field, value) in levels {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within 0-1"));
            }
        }
        Ok(())
    }

    /// Clamp a raw total into `[floor, ceiling]`.
    pub fn clamp(&self, raw_seconds: i64) -> u32 {
        raw_seconds.clamp(self.floor_seconds as i64, self.ceiling_seconds as i64) as u32
    }
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
