use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::TimerSnapshot;

/// Every state change of a rest timer produces an Event.
/// The CLI prints them as JSON lines; UIs subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A new recommendation replaced the previous one.
    RecommendationApplied {
        timer_id: Uuid,
        exercise_id: String,
        set_number: u32,
        recommended_rest_secs: u32,
        confidence: f64,
        /// True when the engine failed and the fixed default was installed.
        fallback: bool,
        at: DateTime<Utc>,
    },
    TimerStarted {
        timer_id: Uuid,
        recommended_rest_secs: u32,
        at: DateTime<Utc>,
    },
    TimerPaused {
        timer_id: Uuid,
        elapsed_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        timer_id: Uuid,
        elapsed_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimeAdded {
        timer_id: Uuid,
        delta_secs: u32,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    AlertFired {
        timer_id: Uuid,
        checkpoint_secs: u32,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Recommendation reached while auto-complete is off.
    ThresholdReached {
        timer_id: Uuid,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        timer_id: Uuid,
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    TimerSkipped {
        timer_id: Uuid,
        elapsed_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        timer_id: Uuid,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        snapshot: TimerSnapshot,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Completion or skip: the rest interval is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::TimerCompleted { .. } | Event::TimerSkipped { .. })
    }
}
