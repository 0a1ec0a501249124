mod clock;
mod controller;
mod engine;
mod state;

pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use controller::{ActivationOutcome, TimerController};
pub use engine::{Notification, RestTimer, TimerListener};
pub use state::{TimerOptions, TimerPhase, TimerSnapshot, TimerState};
