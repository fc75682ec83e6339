//! Time sources and the callback scheduler.
//!
//! The gateway never reads the wall clock directly; it asks the scheduler,
//! whose [`Clock`] is injected. Tests drive a hand-cranked clock and call
//! [`Scheduler::wake_up`] after moving it.

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use scheduler::{ScheduledCallback, Scheduler};
