//! Rest timer state machine.
//!
//! The timer is driven by a monotonic clock and has no internal thread - the
//! caller (or [`TimerController`](super::TimerController)'s ticker) is
//! responsible for calling `tick()` periodically. Elapsed time is always
//! `now - anchor`, so missed ticks never cause drift.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused -> (Completed | Skipped)
//! Running -> Completed        (elapsed reaches the recommendation)
//! any     -> Idle             (reset)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut timer = RestTimer::new(Arc::new(SystemClock::new()), TimerOptions::default());
//! timer.set_recommendation(calculation);
//! timer.start();
//! // In a loop:
//! for event in timer.tick() { /* alerts, completion */ }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::MonotonicClock;
use super::state::{TimerOptions, TimerPhase, TimerSnapshot, TimerState};
use crate::events::Event;
use crate::rest::AdaptiveRestCalculation;

/// Caller callbacks. Both default to no-ops.
///
/// Callbacks are invoked by the controller with no timer lock held, so they
/// may call back into it.
pub trait TimerListener: Send {
    /// An alert checkpoint was reached.
    fn on_alert(&mut self, _checkpoint_secs: u32) {}

    /// The interval ended, by completion or skip. Called at most once per interval.
    fn on_complete(&mut self, _phase: TimerPhase) {}
}

/// A pending listener callback, derived from the event that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Alert(u32),
    Complete(TimerPhase),
}

impl Notification {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::AlertFired {
                checkpoint_secs, ..
            } => Some(Self::Alert(*checkpoint_secs)),
            Event::TimerCompleted { .. } => Some(Self::Complete(TimerPhase::Completed)),
            Event::TimerSkipped { .. } => Some(Self::Complete(TimerPhase::Skipped)),
            _ => None,
        }
    }

    pub fn deliver(self, listener: &mut dyn TimerListener) {
        match self {
            Self::Alert(checkpoint_secs) => listener.on_alert(checkpoint_secs),
            Self::Complete(phase) => listener.on_complete(phase),
        }
    }
}

/// Core rest timer.
pub struct RestTimer {
    id: Uuid,
    clock: Arc<dyn MonotonicClock>,
    options: TimerOptions,
    phase: TimerPhase,
    recommendation: Option<AdaptiveRestCalculation>,
    /// Clock reading (ms) that corresponds to elapsed == 0 while running.
    /// May lie in the future after `add_time`.
    anchor_ms: Option<i64>,
    /// Signed elapsed time frozen while not running.
    frozen_elapsed_ms: i64,
    fired_checkpoints: BTreeSet<u32>,
    threshold_reported: bool,
    completion_fired: bool,
}

impl std::fmt::Debug for RestTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTimer")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("elapsed_ms", &self.elapsed_ms())
            .field("fired_checkpoints", &self.fired_checkpoints)
            .finish_non_exhaustive()
    }
}

impl RestTimer {
    /// Create an idle timer with no recommendation yet.
    pub fn new(clock: Arc<dyn MonotonicClock>, options: TimerOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            clock,
            options,
            phase: TimerPhase::Idle,
            recommendation: None,
            anchor_ms: None,
            frozen_elapsed_ms: 0,
            fired_checkpoints: BTreeSet::new(),
            threshold_reported: false,
            completion_fired: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn options(&self) -> &TimerOptions {
        &self.options
    }

    pub fn recommendation(&self) -> Option<&AdaptiveRestCalculation> {
        self.recommendation.as_ref()
    }

    /// Target in seconds: the recommendation, or the fallback when there is none.
    pub fn target_secs(&self) -> u32 {
        self.recommendation
            .as_ref()
            .map(|r| r.recommended_rest_seconds)
            .unwrap_or(self.options.fallback_rest_seconds)
            .max(1)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.raw_elapsed_ms().max(0) as u64
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_ms() / 1000
    }

    /// Rounded up, so a fresh 90s timer shows 90 until a full second passes.
    pub fn remaining_secs(&self) -> u64 {
        let target_ms = self.target_secs() as i64 * 1000;
        let left = (target_ms - self.raw_elapsed_ms()).max(0) as u64;
        left.div_ceil(1000)
    }

    /// 0.0 .. 1.0
    pub fn progress(&self) -> f64 {
        (self.elapsed_secs() as f64 / self.target_secs() as f64).min(1.0)
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            phase: self.phase,
            elapsed_seconds: self.elapsed_secs(),
            recommendation: self.recommendation.clone(),
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            timer_id: self.id,
            phase: self.phase,
            elapsed_seconds: self.elapsed_secs(),
            remaining_seconds: self.remaining_secs(),
            progress: self.progress(),
            recommendation: self.recommendation.clone(),
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot_event(&self) -> Event {
        Event::StateSnapshot {
            snapshot: self.snapshot(),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the recommendation. Elapsed time is untouched; a later
    /// calculation supersedes rather than merges.
    pub fn set_recommendation(&mut self, calculation: AdaptiveRestCalculation) {
        debug!(
            timer_id = %self.id,
            recommended = calculation.recommended_rest_seconds,
            confidence = calculation.confidence,
            "recommendation set"
        );
        self.recommendation = Some(calculation);
    }

    pub fn start(&mut self) -> Option<Event> {
        if self.phase != TimerPhase::Idle {
            return None;
        }
        if self.recommendation.is_none() {
            warn!(
                timer_id = %self.id,
                fallback = self.options.fallback_rest_seconds,
                "starting without a recommendation, using fallback"
            );
            self.recommendation = Some(AdaptiveRestCalculation::fallback(
                self.options.fallback_rest_seconds,
            ));
        }
        self.anchor_ms = Some(self.now_ms());
        self.frozen_elapsed_ms = 0;
        self.phase = TimerPhase::Running;
        info!(timer_id = %self.id, target = self.target_secs(), "rest timer started");
        Some(Event::TimerStarted {
            timer_id: self.id,
            recommended_rest_secs: self.target_secs(),
            at: Utc::now(),
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.phase != TimerPhase::Running {
            return None;
        }
        self.freeze();
        self.phase = TimerPhase::Paused;
        debug!(timer_id = %self.id, elapsed_ms = self.frozen_elapsed_ms, "paused");
        Some(Event::TimerPaused {
            timer_id: self.id,
            elapsed_secs: self.elapsed_secs(),
            remaining_secs: self.remaining_secs(),
            at: Utc::now(),
        })
    }

    pub fn resume(&mut self) -> Option<Event> {
        if self.phase != TimerPhase::Paused {
            return None;
        }
        self.anchor_ms = Some(self.now_ms() - self.frozen_elapsed_ms);
        self.phase = TimerPhase::Running;
        debug!(timer_id = %self.id, elapsed_ms = self.frozen_elapsed_ms, "resumed");
        Some(Event::TimerResumed {
            timer_id: self.id,
            elapsed_secs: self.elapsed_secs(),
            remaining_secs: self.remaining_secs(),
            at: Utc::now(),
        })
    }

    /// End the interval early. Counts as completion.
    pub fn skip(&mut self) -> Option<Event> {
        if !matches!(self.phase, TimerPhase::Running | TimerPhase::Paused) {
            return None;
        }
        if self.phase == TimerPhase::Running {
            self.freeze();
        }
        self.phase = TimerPhase::Skipped;
        info!(timer_id = %self.id, elapsed = self.elapsed_secs(), "rest skipped");
        self.fire_completion();
        Some(Event::TimerSkipped {
            timer_id: self.id,
            elapsed_secs: self.elapsed_secs(),
            remaining_secs: self.remaining_secs(),
            at: Utc::now(),
        })
    }

    /// Back to `Idle` from any phase. The recommendation is kept.
    pub fn reset(&mut self) -> Option<Event> {
        self.phase = TimerPhase::Idle;
        self.anchor_ms = None;
        self.frozen_elapsed_ms = 0;
        self.fired_checkpoints.clear();
        self.threshold_reported = false;
        self.completion_fired = false;
        debug!(timer_id = %self.id, "reset");
        Some(Event::TimerReset {
            timer_id: self.id,
            at: Utc::now(),
        })
    }

    /// Extend the runway by shifting elapsed time back. The recommendation
    /// itself is unchanged and elapsed never reads below zero.
    pub fn add_time(&mut self, delta_secs: u32) -> Option<Event> {
        let delta_ms = delta_secs as i64 * 1000;
        match self.phase {
            TimerPhase::Running => {
                let anchor = self.anchor_ms?;
                self.anchor_ms = Some(anchor + delta_ms);
            }
            TimerPhase::Paused => {
                self.frozen_elapsed_ms -= delta_ms;
            }
            _ => return None,
        }
        debug!(timer_id = %self.id, delta_secs, remaining = self.remaining_secs(), "time added");
        Some(Event::TimeAdded {
            timer_id: self.id,
            delta_secs,
            remaining_secs: self.remaining_secs(),
            at: Utc::now(),
        })
    }

    /// Call periodically. Returns alert and completion events, in that order.
    pub fn tick(&mut self) -> Vec<Event> {
        if self.phase != TimerPhase::Running {
            return Vec::new();
        }
        let elapsed_ms = self.elapsed_ms();
        let mut events = self.evaluate_checkpoints(elapsed_ms);

        let target_ms = self.target_secs() as u64 * 1000;
        if elapsed_ms >= target_ms {
            if self.options.auto_complete_on_threshold {
                self.freeze();
                self.phase = TimerPhase::Completed;
                info!(timer_id = %self.id, elapsed = self.elapsed_secs(), "rest completed");
                if self.fire_completion() {
                    events.push(Event::TimerCompleted {
                        timer_id: self.id,
                        elapsed_secs: self.elapsed_secs(),
                        at: Utc::now(),
                    });
                }
            } else if !self.threshold_reported {
                self.threshold_reported = true;
                events.push(Event::ThresholdReached {
                    timer_id: self.id,
                    elapsed_secs: self.elapsed_secs(),
                    at: Utc::now(),
                });
            }
        }
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn now_ms(&self) -> i64 {
        i64::try_from(self.clock.now().as_millis()).unwrap_or(i64::MAX)
    }

    fn raw_elapsed_ms(&self) -> i64 {
        match (self.phase, self.anchor_ms) {
            (TimerPhase::Running, Some(anchor)) => self.now_ms() - anchor,
            _ => self.frozen_elapsed_ms,
        }
    }

    fn freeze(&mut self) {
        self.frozen_elapsed_ms = self.raw_elapsed_ms();
        self.anchor_ms = None;
    }

    /// A checkpoint fires once per interval, on the first tick at or past
    /// it. Checkpoints overshot by more than two tick intervals (suspended
    /// app, missed ticks) are marked fired without an alert.
    fn evaluate_checkpoints(&mut self, elapsed_ms: u64) -> Vec<Event> {
        let grace_ms = self.options.tick_interval_ms.saturating_mul(2);
        let due: Vec<u32> = self
            .options
            .alert_checkpoints
            .iter()
            .copied()
            .filter(|cp| (*cp as u64) * 1000 <= elapsed_ms && !self.fired_checkpoints.contains(cp))
            .collect();

        let mut events = Vec::new();
        for checkpoint in due {
            self.fired_checkpoints.insert(checkpoint);
            let overshoot = elapsed_ms - checkpoint as u64 * 1000;
            if overshoot > grace_ms {
                debug!(timer_id = %self.id, checkpoint, overshoot, "stale checkpoint dropped");
                continue;
            }
            events.push(Event::AlertFired {
                timer_id: self.id,
                checkpoint_secs: checkpoint,
                elapsed_secs: elapsed_ms / 1000,
                at: Utc::now(),
            });
        }
        events
    }

    /// Returns false if completion already fired for this interval.
    fn fire_completion(&mut self) -> bool {
        if self.completion_fired {
            return false;
        }
        self.completion_fired = true;
        true
    }
}
