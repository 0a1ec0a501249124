//! Adaptive rest engine.
//!
//! Turns a set's performance data plus the user's history into a recommended
//! rest duration with an explanation of every adjustment.

mod calculation;
mod catalogue;
mod engine;
mod history;
mod input;
mod tuning;

pub use calculation::{AdaptiveRestCalculation, Adjustment, AdjustmentReason};
pub use catalogue::{DifficultyClass, ExerciseCatalogue, StaticCatalogue};
pub use engine::RestEngine;
pub use history::{
    HistoricalProfile, HistoryProvider, InMemoryHistory, ObservedRecovery, RecoveryStat, SetRecord,
};
pub use input::{ContextKey, PerformanceInput, RestContext};
pub use tuning::{BaseRest, ConfidenceLevels, RestTuning};
