//! A small discrete-event engine.
//!
//! Events are dispatched in timestamp order, ties in the order they were
//! scheduled. The engine knows nothing about networks: a [`Handler`] receives
//! each event together with the [`Scheduler`] so it can queue follow-ups.

pub mod time;

pub use time::SimTime;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

struct Scheduled<E> {
    at: SimTime,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so the earliest event has to compare greatest
impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Scheduler<E> {
    queue: BinaryHeap<Scheduled<E>>,
    now: SimTime,
    next_seq: u64,
}

impl<E> Scheduler<E> {
    fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            now: SimTime::ZERO,
            next_seq: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Events in the past are clamped to the current time.
    pub fn schedule_at(&mut self, at: SimTime, event: E) {
        let at = at.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { at, seq, event });
    }

    pub fn schedule_in(&mut self, delay: SimTime, event: E) {
        self.schedule_at(self.now + delay, event);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn pop_until(&mut self, stop_at: SimTime) -> Option<(SimTime, E)> {
        if self.queue.peek()?.at > stop_at {
            return None;
        }
        let next = self.queue.pop()?;
        self.now = next.at;
        Some((next.at, next.event))
    }
}

pub trait Handler<E> {
    fn handle(&mut self, event: E, scheduler: &mut Scheduler<E>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub events_processed: u64,
    pub final_time: SimTime,
}

pub struct Simulator<E> {
    scheduler: Scheduler<E>,
    stop_at: SimTime,
}

impl<E> Simulator<E> {
    pub fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            stop_at: SimTime::MAX,
        }
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn schedule_at(&mut self, at: SimTime, event: E) {
        self.scheduler.schedule_at(at, event);
    }

    /// Global stop: nothing scheduled after `at` is dispatched.
    pub fn stop_at(&mut self, at: SimTime) {
        self.stop_at = at;
    }

    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn run<H: Handler<E>>(&mut self, handler: &mut H) -> RunSummary {
        let mut events_processed = 0u64;

        while let Some((_, event)) = self.scheduler.pop_until(self.stop_at) {
            handler.handle(event, &mut self.scheduler);
            events_processed += 1;
        }

        if self.stop_at != SimTime::MAX {
            self.scheduler.now = self.scheduler.now.max(self.stop_at);
        }

        debug!(
            "Event loop finished at {}s after {} events ({} left unprocessed)",
            self.scheduler.now,
            events_processed,
            self.scheduler.pending()
        );

        RunSummary {
            events_processed,
            final_time: self.scheduler.now,
        }
    }

    /// Drops every pending event and rewinds the clock.
    pub fn destroy(&mut self) {
        self.scheduler.queue.clear();
        self.scheduler.now = SimTime::ZERO;
        self.scheduler.next_seq = 0;
        self.stop_at = SimTime::MAX;
    }
}

impl<E> Default for Simulator<E> {
    fn default() -> Self {
        Self::new()
    }
}
