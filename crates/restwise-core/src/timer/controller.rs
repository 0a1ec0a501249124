//! Async façade over [`RestTimer`].
//!
//! The controller owns exactly one rest interval. It asks the rest engine for
//! a recommendation whenever the tracked set changes (last request wins),
//! drives the countdown from a tokio ticker, and forwards every event to an
//! optional subscriber channel.
//!
//! Listener callbacks are queued while the timer is locked and delivered
//! after the lock is released, so a callback may call back into the
//! controller (snapshot, reset, skip) without deadlocking.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::clock::MonotonicClock;
use super::engine::{Notification, RestTimer, TimerListener};
use super::state::{TimerOptions, TimerSnapshot, TimerState};
use crate::error::CoreError;
use crate::events::Event;
use crate::rest::{AdaptiveRestCalculation, ContextKey, RestContext, RestEngine};

/// Result of [`TimerController::activate`].
#[derive(Debug)]
pub enum ActivationOutcome {
    /// A fresh recommendation was installed.
    Applied(AdaptiveRestCalculation),
    /// The context matches the recommendation already installed.
    Unchanged,
    /// A newer activation was issued while this one was computing.
    Superseded,
    /// The engine failed; the fixed default was installed instead.
    Fallback {
        calculation: AdaptiveRestCalculation,
        error: CoreError,
    },
}

/// Generation counter for last-request-wins activation.
#[derive(Debug, Default)]
struct ActivationTracker {
    issued: u64,
    pending: Option<u64>,
    applied: Option<ContextKey>,
}

impl ActivationTracker {
    fn is_current(&self, key: &ContextKey) -> bool {
        self.pending.is_none() && self.applied.as_ref() == Some(key)
    }

    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.pending = Some(self.issued);
        self.issued
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.issued == generation
    }

    fn settle(&mut self, applied: Option<ContextKey>) {
        self.pending = None;
        self.applied = applied;
    }
}

struct Shared {
    timer: RestTimer,
    activation: ActivationTracker,
    sink: Option<mpsc::UnboundedSender<Event>>,
}

impl Shared {
    fn emit(&self, event: &Event) {
        if let Some(sink) = &self.sink {
            // A dropped receiver only means nobody is listening any more.
            let _ = sink.send(event.clone());
        }
    }

}

#[derive(Default)]
struct Dispatch {
    /// Taken out while a drain is delivering to it.
    listener: Option<Box<dyn TimerListener>>,
    queue: VecDeque<Notification>,
    draining: bool,
}

struct Inner {
    shared: Mutex<Shared>,
    dispatch: Mutex<Dispatch>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_recovering(&self.shared)
    }

    /// Forward `events` and queue their callbacks. Lock order is
    /// `shared` then `dispatch`, so callbacks keep the order of the events.
    fn publish(&self, shared: &Shared, events: &[Event]) {
        let mut dispatch: Option<MutexGuard<'_, Dispatch>> = None;
        for event in events {
            shared.emit(event);
            if let Some(notification) = Notification::from_event(event) {
                dispatch
                    .get_or_insert_with(|| lock_recovering(&self.dispatch))
                    .queue
                    .push_back(notification);
            }
        }
    }

    /// Deliver queued callbacks with no lock held. Only one caller drains at
    /// a time; re-entrant and concurrent callers leave their notifications to
    /// the active drain.
    fn drain(&self) {
        loop {
            let (mut listener, batch) = {
                let mut dispatch = lock_recovering(&self.dispatch);
                if dispatch.draining || dispatch.queue.is_empty() {
                    return;
                }
                let Some(listener) = dispatch.listener.take() else {
                    dispatch.queue.clear();
                    return;
                };
                dispatch.draining = true;
                (listener, std::mem::take(&mut dispatch.queue))
            };

            for notification in batch {
                let delivered =
                    catch_unwind(AssertUnwindSafe(|| notification.deliver(&mut *listener)));
                if delivered.is_err() {
                    warn!(?notification, "timer listener panicked");
                }
            }

            let mut dispatch = lock_recovering(&self.dispatch);
            dispatch.draining = false;
            // A listener installed during the drain replaces this one.
            if dispatch.listener.is_none() {
                dispatch.listener = Some(listener);
            }
        }
    }

    fn command(&self, apply: impl FnOnce(&mut RestTimer) -> Option<Event>) -> Option<Event> {
        let event = {
            let mut shared = self.lock();
            let event = apply(&mut shared.timer);
            self.publish(&shared, event.as_slice());
            event
        };
        self.drain();
        event
    }

    fn tick(&self) -> Vec<Event> {
        let events = {
            let mut shared = self.lock();
            let events = shared.timer.tick();
            self.publish(&shared, &events);
            events
        };
        self.drain();
        events
    }
}

/// Owns one rest interval: recommendation, countdown and tick source.
pub struct TimerController {
    inner: Arc<Inner>,
    engine: RestEngine,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerController {
    pub fn new(engine: RestEngine, clock: Arc<dyn MonotonicClock>, options: TimerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    timer: RestTimer::new(clock, options),
                    activation: ActivationTracker::default(),
                    sink: None,
                }),
                dispatch: Mutex::new(Dispatch::default()),
            }),
            engine,
            ticker: Mutex::new(None),
        }
    }

    /// Receive every event this controller produces from now on.
    /// A second call replaces the previous subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().sink = Some(tx);
        rx
    }

    /// Install the callback target, replacing any previous one.
    pub fn set_listener(&self, listener: Box<dyn TimerListener>) {
        lock_recovering(&self.inner.dispatch).listener = Some(listener);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.lock().timer.state()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.lock().timer.snapshot()
    }

    pub fn snapshot_event(&self) -> Event {
        let shared = self.lock();
        let event = shared.timer.snapshot_event();
        shared.emit(&event);
        event
    }

    // ── Recommendation ───────────────────────────────────────────────

    /// Recompute the recommendation for `context`.
    ///
    /// Idempotent for an unchanged context. When calls overlap, only the most
    /// recently issued one is applied; earlier results are discarded. Engine
    /// failures never leave the timer without a duration: the fallback is
    /// installed and the error handed back for user-facing messaging.
    pub async fn activate(&self, context: RestContext) -> ActivationOutcome {
        let key = context.key();
        let generation = {
            let mut shared = self.lock();
            if shared.activation.is_current(&key) {
                return ActivationOutcome::Unchanged;
            }
            shared.activation.issue()
        };
        debug!(generation, exercise_id = %context.exercise_id, set = context.input.set_number, "activation issued");

        let result = self
            .engine
            .calculate(&context.user_id, &context.exercise_id, &context.input)
            .await;

        let mut shared = self.lock();
        if !shared.activation.is_latest(generation) {
            debug!(generation, "activation superseded, result discarded");
            return ActivationOutcome::Superseded;
        }

        let (calculation, fallback, outcome_error) = match result {
            Ok(calculation) => {
                shared.activation.settle(Some(key));
                (calculation, false, None)
            }
            Err(error) => {
                let fallback_secs = shared.timer.options().fallback_rest_seconds;
                warn!(error = %error, fallback_secs, "rest engine failed, using fallback duration");
                shared.activation.settle(None);
                (AdaptiveRestCalculation::fallback(fallback_secs), true, Some(error))
            }
        };

        shared.timer.set_recommendation(calculation.clone());
        shared.emit(&Event::RecommendationApplied {
            timer_id: shared.timer.id(),
            exercise_id: context.exercise_id.clone(),
            set_number: context.input.set_number,
            recommended_rest_secs: calculation.recommended_rest_seconds,
            confidence: calculation.confidence,
            fallback,
            at: Utc::now(),
        });

        match outcome_error {
            None => ActivationOutcome::Applied(calculation),
            Some(error) => ActivationOutcome::Fallback { calculation, error },
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&self) -> Option<Event> {
        self.inner.command(RestTimer::start)
    }

    pub fn pause(&self) -> Option<Event> {
        self.inner.command(RestTimer::pause)
    }

    pub fn resume(&self) -> Option<Event> {
        self.inner.command(RestTimer::resume)
    }

    pub fn skip(&self) -> Option<Event> {
        self.inner.command(RestTimer::skip)
    }

    pub fn reset(&self) -> Option<Event> {
        self.inner.command(RestTimer::reset)
    }

    pub fn add_time(&self, delta_secs: u32) -> Option<Event> {
        self.inner.command(|timer| timer.add_time(delta_secs))
    }

    /// Evaluate checkpoints and completion once. The ticker calls this.
    pub fn tick(&self) -> Vec<Event> {
        self.inner.tick()
    }

    // ── Tick source ──────────────────────────────────────────────────

    /// Start ticking at the configured cadence. Replaces a running ticker.
    /// Must be called from within a tokio runtime.
    pub fn spawn_ticker(&self) {
        let period = Duration::from_millis(self.lock().timer.options().tick_interval_ms.max(1));
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_ticker(weak, period));
        if let Some(previous) = self.ticker_slot().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_ticker(&self) {
        if let Some(handle) = self.ticker_slot().take() {
            handle.abort();
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the tick source and return to `Idle`. No callbacks fire afterwards
    /// until the timer is started again.
    pub fn deactivate(&self) -> Option<Event> {
        self.stop_ticker();
        self.reset()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.lock()
    }

    fn ticker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        lock_recovering(&self.ticker)
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Exits on its own once the controller is gone.
async fn run_ticker(inner: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let Some(strong) = inner.upgrade() else {
            debug!("timer controller dropped, ticker exiting");
            return;
        };
        strong.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{InMemoryHistory, PerformanceInput, StaticCatalogue};
    use crate::timer::clock::ManualClock;
    use crate::timer::state::TimerPhase;

    fn controller(clock: ManualClock) -> TimerController {
        let engine = RestEngine::new(
            Arc::new(StaticCatalogue::builtin()),
            Arc::new(InMemoryHistory::new()),
        );
        TimerController::new(engine, Arc::new(clock), TimerOptions::default())
    }

    fn squat(set: u32, rpe: u8) -> RestContext {
        RestContext::new("u1", "back-squat", PerformanceInput::new(set, 5).with_effort(rpe))
    }

    #[tokio::test]
    async fn activation_installs_recommendation() {
        let ctl = controller(ManualClock::new());
        let outcome = ctl.activate(squat(1, 8)).await;
        let ActivationOutcome::Applied(calc) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(ctl.state().recommendation, Some(calc));
    }

    #[tokio::test]
    async fn same_context_is_unchanged() {
        let ctl = controller(ManualClock::new());
        ctl.activate(squat(1, 8)).await;
        assert!(matches!(ctl.activate(squat(1, 8)).await, ActivationOutcome::Unchanged));
        assert!(matches!(ctl.activate(squat(2, 8)).await, ActivationOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn unknown_exercise_falls_back() {
        let ctl = controller(ManualClock::new());
        let ctx = RestContext::new("u1", "moon-jump", PerformanceInput::new(1, 5));
        let outcome = ctl.activate(ctx).await;
        let ActivationOutcome::Fallback { calculation, error } = outcome else {
            panic!("expected Fallback, got {outcome:?}");
        };
        assert_eq!(error.kind(), crate::error::ErrorKind::NotFound);
        assert_eq!(calculation.recommended_rest_seconds, 90);
        assert_eq!(calculation.confidence, 0.0);

        assert!(ctl.start().is_some());
        assert_eq!(ctl.state().phase, TimerPhase::Running);
    }

    #[tokio::test]
    async fn events_reach_subscriber() {
        let clock = ManualClock::new();
        let ctl = controller(clock.clone());
        let mut rx = ctl.subscribe();
        ctl.activate(squat(1, 6)).await;
        ctl.start();
        clock.advance_secs(500);
        ctl.tick();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds, vec!["RecommendationApplied", "TimerStarted", "TimerCompleted"]);
    }

    #[tokio::test]
    async fn snapshot_event_is_forwarded() {
        let clock = ManualClock::new();
        let ctl = controller(clock.clone());
        ctl.activate(squat(1, 8)).await;
        ctl.start();
        clock.advance_secs(44);
        let mut rx = ctl.subscribe();

        let Event::StateSnapshot { snapshot, .. } = ctl.snapshot_event() else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.elapsed_seconds, 44);
        assert_eq!(snapshot.remaining_seconds, 100);
        assert!(matches!(rx.try_recv(), Ok(Event::StateSnapshot { .. })));
    }

    struct Panicker;

    impl TimerListener for Panicker {
        fn on_alert(&mut self, _: u32) {
            panic!("alert handler blew up");
        }

        fn on_complete(&mut self, _: TimerPhase) {
            panic!("completion handler blew up");
        }
    }

    #[tokio::test]
    async fn panicking_listener_does_not_break_timer() {
        let clock = ManualClock::new();
        let ctl = TimerController::new(
            RestEngine::new(
                Arc::new(StaticCatalogue::builtin()),
                Arc::new(InMemoryHistory::new()),
            ),
            Arc::new(clock.clone()),
            TimerOptions::default().with_checkpoints([10]),
        );
        ctl.set_listener(Box::new(Panicker));
        ctl.activate(squat(1, 8)).await;
        ctl.start();

        clock.advance_secs(10);
        assert_eq!(ctl.tick().len(), 1);
        clock.advance_secs(200);
        assert_eq!(ctl.tick().len(), 1);
        assert_eq!(ctl.state().phase, TimerPhase::Completed);

        // still delivered to after a panic
        ctl.reset();
        ctl.start();
        clock.advance_secs(200);
        assert_eq!(ctl.tick().len(), 1);
    }

    /// Skips the rest from inside its own alert callback.
    struct SkipOnAlert {
        ctl: Weak<TimerController>,
        completions: Arc<Mutex<Vec<TimerPhase>>>,
    }

    impl TimerListener for SkipOnAlert {
        fn on_alert(&mut self, _: u32) {
            if let Some(ctl) = self.ctl.upgrade() {
                assert_eq!(ctl.snapshot().phase, TimerPhase::Running);
                ctl.skip();
            }
        }

        fn on_complete(&mut self, phase: TimerPhase) {
            self.completions.lock().unwrap().push(phase);
        }
    }

    #[tokio::test]
    async fn listener_may_call_back_into_controller() {
        let clock = ManualClock::new();
        let ctl = Arc::new(TimerController::new(
            RestEngine::new(
                Arc::new(StaticCatalogue::builtin()),
                Arc::new(InMemoryHistory::new()),
            ),
            Arc::new(clock.clone()),
            TimerOptions::default().with_checkpoints([30]),
        ));
        let completions = Arc::new(Mutex::new(Vec::new()));
        ctl.set_listener(Box::new(SkipOnAlert {
            ctl: Arc::downgrade(&ctl),
            completions: Arc::clone(&completions),
        }));
        ctl.activate(squat(1, 8)).await;
        ctl.start();

        clock.advance_secs(30);
        let events = ctl.tick();
        assert!(matches!(events.as_slice(), [Event::AlertFired { .. }]));
        assert_eq!(ctl.state().phase, TimerPhase::Skipped);
        assert_eq!(*completions.lock().unwrap(), vec![TimerPhase::Skipped]);
    }

    #[tokio::test]
    async fn deactivate_stops_ticker() {
        let ctl = controller(ManualClock::new());
        ctl.spawn_ticker();
        assert!(ctl.is_ticking());
        ctl.deactivate();
        assert!(!ctl.is_ticking());
        assert_eq!(ctl.state().phase, TimerPhase::Idle);
    }
}
