use serde::{Deserialize, Serialize};

/// Why the recommendation moved away from the base rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Perceived effort of the set.
    Rpe,
    /// Accumulated fatigue from earlier sets of the same exercise.
    Fatigue,
    /// Shift toward the user's observed recovery.
    Personalization,
    /// Correction applied by the floor/ceiling clamp.
    Bounds,
}

impl AdjustmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Rpe => "rpe",
            AdjustmentReason::Fatigue => "fatigue",
            AdjustmentReason::Personalization => "personalization",
            AdjustmentReason::Bounds => "bounds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub reason: AdjustmentReason,
    pub delta_seconds: i32,
}

/// A recommended rest duration together with the factors that produced it.
///
/// `recommended_rest_seconds == base_rest_seconds + sum(adjustments)`, the
/// clamp itself being recorded as a `Bounds` adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRestCalculation {
    pub recommended_rest_seconds: u32,
    pub base_rest_seconds: u32,
    pub adjustments: Vec<Adjustment>,
    /// 0.0 .. 1.0
    pub confidence: f64,
}

impl AdaptiveRestCalculation {
    /// Fixed-duration recommendation used when the engine could not produce one.
    pub fn fallback(rest_seconds: u32) -> Self {
        let rest_seconds = rest_seconds.max(1);
        Self {
            recommended_rest_seconds: rest_seconds,
            base_rest_seconds: rest_seconds,
            adjustments: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn adjustment(&self, reason: AdjustmentReason) -> Option<&Adjustment> {
        self.adjustments.iter().find(|a| a.reason == reason)
    }

    pub fn total_delta(&self) -> i64 {
        self.adjustments.iter().map(|a| a.delta_seconds as i64).sum()
    }
}
