use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Performance data for a single completed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceInput {
    /// 1-based position of the set within the exercise.
    pub set_number: u32,
    pub reps_completed: u32,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// RPE on the 1-10 scale.
    #[serde(default)]
    pub perceived_effort: Option<u8>,
}

impl PerformanceInput {
    pub fn new(set_number: u32, reps_completed: u32) -> Self {
        Self {
            set_number,
            reps_completed,
            weight_kg: None,
            perceived_effort: None,
        }
    }

    pub fn with_weight(mut self, weight_kg: f64) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_effort(mut self, rpe: u8) -> Self {
        self.perceived_effort = Some(rpe);
        self
    }

    /// Reject inputs the engine cannot reason about.
    ///
    /// # Errors
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.set_number == 0 {
            return Err(ValidationError::NonPositiveSetNumber);
        }
        if let Some(rpe) = self.perceived_effort {
            if !(1..=10).contains(&rpe) {
                return Err(ValidationError::EffortOutOfRange(rpe));
            }
        }
        if let Some(weight) = self.weight_kg {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ValidationError::InvalidWeight(weight));
            }
        }
        Ok(())
    }
}

/// Who is resting, after which exercise, and how the set went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestContext {
    pub user_id: String,
    pub exercise_id: String,
    pub input: PerformanceInput,
}

impl RestContext {
    pub fn new(
        user_id: impl Into<String>,
        exercise_id: impl Into<String>,
        input: PerformanceInput,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            exercise_id: exercise_id.into(),
            input,
        }
    }

    /// The parts of the context whose change requires a new recommendation.
    pub fn key(&self) -> ContextKey {
        ContextKey {
            user_id: self.user_id.clone(),
            exercise_id: self.exercise_id.clone(),
            set_number: self.input.set_number,
            perceived_effort: self.input.perceived_effort,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub user_id: String,
    pub exercise_id: String,
    pub set_number: u32,
    pub perceived_effort: Option<u8>,
}
