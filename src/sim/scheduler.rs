//! Event queue with deterministic ordering.
//!
//! Events are ordered by:
//! 1. Time (earlier first)
//! 2. Sequence number (FIFO for events scheduled at the same time)
//!
//! The queue is a `BTreeMap` keyed by [`EventId`], so cancelling an event
//! is a plain removal and never leaves tombstones behind.

use std::collections::BTreeMap;

use super::time::SimTime;

/// Handle to a scheduled event. Doubles as its ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    /// When this event should be processed.
    pub time: SimTime,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

/// Contract violations. These indicate a defect in the calling component,
/// not a runtime condition of the simulated network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("cannot schedule at {requested}: clock is already at {now}")]
    InPast { requested: SimTime, now: SimTime },
    #[error("scheduler has been destroyed")]
    Destroyed,
}

/// Why [`Scheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The next pending event was at or after the stop time.
    StopTimeReached,
    /// Nothing left to execute.
    QueueExhausted,
    /// The scheduler was destroyed before or during the run.
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub events_executed: u64,
    pub final_time: SimTime,
    pub reason: StopReason,
}

/// Receives every dispatched event together with the scheduler, so it can
/// schedule follow-up work.
pub trait EventHandler<E> {
    fn handle(&mut self, scheduler: &mut Scheduler<E>, event: E);
}

impl<E, F> EventHandler<E> for F
where
    F: FnMut(&mut Scheduler<E>, E),
{
    fn handle(&mut self, scheduler: &mut Scheduler<E>, event: E) {
        self(scheduler, event)
    }
}

/// Single-threaded discrete-event scheduler.
///
/// Every handler runs to completion before the next event is popped, so
/// handlers never need locks. There is no wall-clock coupling.
#[derive(Debug)]
pub struct Scheduler<E> {
    now: SimTime,
    next_sequence: u64,
    queue: BTreeMap<EventId, E>,
    cancelled: u64,
    destroyed: bool,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            next_sequence: 0,
            queue: BTreeMap::new(),
            cancelled: 0,
            destroyed: false,
        }
    }

    /// Current simulation clock.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of events waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of events removed through [`Scheduler::cancel`].
    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Schedule `event` to run `delay` after the current clock.
    pub fn schedule(&mut self, delay: SimTime, event: E) -> Result<EventId, SchedulerError> {
        let time = self.now.checked_add(delay).unwrap_or(SimTime::MAX);
        self.schedule_at(time, event)
    }

    /// Schedule `event` at the current clock, after everything already
    /// queued for this instant.
    pub fn schedule_now(&mut self, event: E) -> Result<EventId, SchedulerError> {
        self.schedule_at(self.now, event)
    }

    /// Schedule `event` at an absolute time, which must not be in the past.
    pub fn schedule_at(&mut self, time: SimTime, event: E) -> Result<EventId, SchedulerError> {
        if self.destroyed {
            return Err(SchedulerError::Destroyed);
        }
        if time < self.now {
            return Err(SchedulerError::InPast { requested: time, now: self.now });
        }
        let id = EventId { time, sequence: self.next_sequence };
        self.next_sequence += 1;
        self.queue.insert(id, event);
        Ok(id)
    }

    /// Remove a pending event. Returns false if it already ran or was
    /// cancelled before.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let removed = self.queue.remove(&id).is_some();
        if removed {
            self.cancelled += 1;
        }
        removed
    }

    /// True while `id` is still waiting in the queue.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.queue.contains_key(&id)
    }

    /// Pop the earliest event if it is strictly before `stop_time`,
    /// advancing the clock to its timestamp.
    pub fn pop_before(&mut self, stop_time: SimTime) -> Option<(EventId, E)> {
        let (&id, _) = self.queue.first_key_value()?;
        if id.time >= stop_time {
            return None;
        }
        let (id, event) = self.queue.pop_first()?;
        debug_assert!(id.time >= self.now, "event queue went back in time");
        self.now = id.time;
        Some((id, event))
    }

    /// Dispatch events until the queue is empty or the next event is at or
    /// after `stop_time`. In the latter case the clock ends at `stop_time`.
    pub fn run<H>(&mut self, stop_time: SimTime, handler: &mut H) -> RunSummary
    where
        H: EventHandler<E> + ?Sized,
    {
        let mut executed = 0;
        let reason = loop {
            if self.destroyed {
                break StopReason::Destroyed;
            }
            match self.pop_before(stop_time) {
                Some((_, event)) => {
                    handler.handle(self, event);
                    executed += 1;
                }
                None if self.queue.is_empty() => break StopReason::QueueExhausted,
                None => {
                    self.now = self.now.max(stop_time);
                    break StopReason::StopTimeReached;
                }
            }
        };

        log::debug!("Scheduler stopped at {} after {} events ({:?})", self.now, executed, reason);
        RunSummary { events_executed: executed, final_time: self.now, reason }
    }

    /// Discard all pending events without running them. Any later attempt
    /// to schedule fails with [`SchedulerError::Destroyed`].
    pub fn destroy(&mut self) {
        let discarded = self.queue.len();
        self.queue.clear();
        self.destroyed = true;
        log::debug!("Scheduler destroyed, {} pending events discarded", discarded);
    }
}
