//! Discrete-event core.
//!
//! This module holds the simulation clock and the event scheduler that
//! every other component runs on top of. A scheduler is an ordinary value
//! owned by a `Simulation`; there is no process-wide singleton, so tests
//! can run many independent simulations side by side.

pub mod scheduler;
pub mod time;

pub use scheduler::{EventHandler, EventId, RunSummary, Scheduler, SchedulerError, StopReason};
pub use time::SimTime;
