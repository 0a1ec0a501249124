//! # Restwise Core Library
//!
//! Adaptive rest between strength-training sets. The library computes a
//! personalized rest duration from the set just performed and the user's
//! history, then runs a drift-free countdown against it.
//!
//! ## Architecture
//!
//! - **Rest Engine**: Stateless, async calculation of an
//!   [`AdaptiveRestCalculation`] from a [`PerformanceInput`]. History and the
//!   exercise catalogue are collaborators behind traits.
//! - **Timer**: A monotonic-clock state machine ([`RestTimer`]) that requires
//!   the caller to periodically invoke `tick()`, wrapped by a
//!   [`TimerController`] that owns recommendation refresh and the tick task.
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`RestEngine`]: Rest recommendation
//! - [`TimerController`]: One live rest interval
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod rest;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, ErrorKind, ValidationError};
pub use events::Event;
pub use rest::{
    AdaptiveRestCalculation, Adjustment, AdjustmentReason, DifficultyClass, ExerciseCatalogue,
    HistoricalProfile, HistoryProvider, InMemoryHistory, PerformanceInput, RestContext,
    RestEngine, RestTuning, SetRecord, StaticCatalogue,
};
pub use storage::Config;
pub use timer::{
    ActivationOutcome, ManualClock, MonotonicClock, Notification, RestTimer, SystemClock,
    TimerController, TimerListener, TimerOptions, TimerPhase, TimerSnapshot, TimerState,
};
