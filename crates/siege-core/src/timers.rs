//! Cancellable timer handles
//!
//! Every asynchronous effect in the engine (movement-independent attack
//! triggers, blink toggles, scheduled events, clock ticks, delayed
//! directives) is a timer owned by exactly one `TimerRegistry`. Owners
//! drain due timers once per frame and clear the registry on teardown,
//! so no timer can outlive its owner.

use crate::time::Millis;

/// Cancellation token for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Get the raw handle value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cadence {
    Once,
    Every(Millis),
}

#[derive(Debug, Clone)]
struct Timer<T> {
    handle: TimerHandle,
    due: Millis,
    cadence: Cadence,
    payload: T,
}

/// An owned set of pending timers
///
/// Due timers are returned in `(due time, scheduling order)` order, so
/// timers scheduled for the same instant fire in the order they were added.
#[derive(Debug, Clone)]
pub struct TimerRegistry<T> {
    timers: Vec<Timer<T>>,
    next_handle: u64,
}

impl<T: Clone> TimerRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_handle: 1,
        }
    }

    fn allocate(&mut self) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Schedule a one-shot timer at an absolute time
    pub fn schedule_once(&mut self, due: Millis, payload: T) -> TimerHandle {
        let handle = self.allocate();
        self.timers.push(Timer {
            handle,
            due,
            cadence: Cadence::Once,
            payload,
        });
        handle
    }

    /// Schedule a recurring timer, first firing at `first_due`
    ///
    /// A non-positive period is treated as one millisecond.
    pub fn schedule_every(&mut self, first_due: Millis, period: Millis, payload: T) -> TimerHandle {
        let handle = self.allocate();
        self.timers.push(Timer {
            handle,
            due: first_due,
            cadence: Cadence::Every(period.max(1.0)),
            payload,
        });
        handle
    }

    /// Cancel a timer; cancelling an unknown or already fired handle is a no-op
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.handle != handle);
        self.timers.len() != before
    }

    /// Cancel every timer whose payload matches, returning how many were removed
    pub fn cancel_where(&mut self, mut matches: impl FnMut(&T) -> bool) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| !matches(&t.payload));
        before - self.timers.len()
    }

    /// Check whether a handle is still pending
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.timers.iter().any(|t| t.handle == handle)
    }

    /// Remove and return every timer due at or before `now`
    ///
    /// Recurring timers fire at most once per call and are re-armed one
    /// period after their due time (or after `now` if they fell behind).
    pub fn drain_due(&mut self, now: Millis) -> Vec<(TimerHandle, T)> {
        let mut due: Vec<(Millis, TimerHandle, T)> = Vec::new();

        self.timers.retain_mut(|timer| {
            if timer.due > now {
                return true;
            }
            due.push((timer.due, timer.handle, timer.payload.clone()));
            match timer.cadence {
                Cadence::Once => false,
                Cadence::Every(period) => {
                    let next = timer.due + period;
                    timer.due = if next > now { next } else { now + period };
                    true
                }
            }
        });

        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        due.into_iter().map(|(_, handle, payload)| (handle, payload)).collect()
    }

    /// Shift every pending timer later by `delta`
    pub fn postpone(&mut self, delta: Millis) {
        for timer in &mut self.timers {
            timer.due += delta;
        }
    }

    /// Earliest pending due time
    pub fn next_due(&self) -> Option<Millis> {
        self.timers.iter().map(|t| t.due).min_by(|a, b| a.total_cmp(b))
    }

    /// Cancel everything, returning how many timers were pending
    pub fn clear(&mut self) -> usize {
        let count = self.timers.len();
        self.timers.clear();
        count
    }

    /// Number of pending timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Check if no timers are pending
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<T: Clone> Default for TimerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
