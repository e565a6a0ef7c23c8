//! Timeline scheduler
//!
//! Turns a sorted action log into virtual-time callbacks. Event `i` sits
//! at virtual time `i × unit`; events sharing a timestamp form a slot and
//! are dispatched together at the position of the slot's first member.
//! The timeline only decides *when* events are due; applying them is the
//! session's job.

use serde::{Deserialize, Serialize};
use siege_core::{
    sort_events, DomainEvent, Millis, Speed, TimelineConfig, TimerRegistry, VirtualClock,
};
use std::ops::Range;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineState {
    /// Nothing scheduled
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimelineTimer {
    /// Dispatch events starting at this index up to the end of their slot
    Slot(usize),
    /// Publish virtual time
    ClockTick,
}

/// Result of polling the timeline for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelinePoll {
    /// Event index ranges that became due, in order
    pub due: Vec<Range<usize>>,
    /// Virtual time published by a clock tick this frame
    pub published: Option<Millis>,
    /// Playback reached the end and the timeline reset itself
    pub finished: bool,
}

/// Virtual-clock driven event scheduler
#[derive(Debug, Clone)]
pub struct Timeline {
    events: Vec<DomainEvent>,
    /// Exclusive end of the slot each event belongs to
    slot_end: Vec<usize>,
    state: TimelineState,
    clock: VirtualClock,
    timers: TimerRegistry<TimelineTimer>,
    /// First event not yet dispatched
    cursor: usize,
    published: Millis,
    unit: Millis,
    tick: Millis,
}

impl Timeline {
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            events: Vec::new(),
            slot_end: Vec::new(),
            state: TimelineState::Idle,
            clock: VirtualClock::default(),
            timers: TimerRegistry::new(),
            cursor: 0,
            published: 0.0,
            unit: config.unit_interval_ms,
            tick: config.clock_tick_ms,
        }
    }

    pub fn state(&self) -> TimelineState {
        self.state
    }

    pub fn speed(&self) -> Speed {
        self.clock.speed()
    }

    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Index of the first event not yet dispatched
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Virtual length of the loaded log
    pub fn total_duration(&self) -> Millis {
        self.clock.total()
    }

    /// Last virtual time published by the clock tick
    pub fn published_time(&self) -> Millis {
        self.published
    }

    /// Current virtual time
    pub fn virtual_time(&self, now: Millis) -> Millis {
        self.clock.now(now)
    }

    /// Number of scheduled callbacks (slots and clock tick)
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    fn load(&mut self, mut events: Vec<DomainEvent>) {
        sort_events(&mut events);
        let mut slot_end = vec![0; events.len()];
        let mut start = 0;
        while start < events.len() {
            let stamp = events[start].timestamp;
            let end = events[start..]
                .iter()
                .position(|e| e.timestamp != stamp)
                .map_or(events.len(), |offset| start + offset);
            slot_end[start..end].fill(end);
            start = end;
        }
        self.clock.set_total(events.len() as f64 * self.unit);
        self.events = events;
        self.slot_end = slot_end;
    }

    /// Start playback so that virtual time equals `start_offset` now
    ///
    /// Events before `start_index` are treated as already dispatched.
    /// Returns false (and changes nothing) for an empty log.
    pub fn play(
        &mut self,
        events: Vec<DomainEvent>,
        start_index: usize,
        start_offset: Millis,
        now: Millis,
    ) -> bool {
        if events.is_empty() {
            tracing::debug!("play requested with an empty log");
            return false;
        }
        self.timers.clear();
        self.load(events);
        self.cursor = start_index.min(self.events.len());
        self.clock.start(now, start_offset);
        self.published = self.clock.now(now);
        self.state = TimelineState::Playing;
        self.schedule_from(now);
        tracing::info!(
            events = self.events.len(),
            start_index = self.cursor,
            speed = %self.speed(),
            "timeline playing"
        );
        true
    }

    /// Schedule every slot from the cursor on, plus the clock tick
    fn schedule_from(&mut self, now: Millis) {
        let virtual_now = self.clock.now(now);
        let multiplier = self.speed().multiplier();

        let mut index = self.cursor;
        while index < self.events.len() {
            let delay = (index as f64 * self.unit - virtual_now).max(0.0) / multiplier;
            self.timers.schedule_once(now + delay, TimelineTimer::Slot(index));
            index = self.slot_end[index];
        }
        self.timers
            .schedule_every(now + self.tick, self.tick, TimelineTimer::ClockTick);
    }

    /// Collect what became due by `now`
    pub fn poll(&mut self, now: Millis) -> TimelinePoll {
        let mut poll = TimelinePoll::default();
        if self.state != TimelineState::Playing {
            return poll;
        }

        for (_, timer) in self.timers.drain_due(now) {
            match timer {
                TimelineTimer::Slot(start) => {
                    let end = self.slot_end.get(start).copied().unwrap_or(start);
                    if start < end {
                        poll.due.push(start..end);
                        self.cursor = self.cursor.max(end);
                    }
                }
                TimelineTimer::ClockTick => {
                    self.published = self.clock.now(now);
                    poll.published = Some(self.published);
                    if self.published >= self.clock.total() {
                        poll.finished = true;
                    }
                }
            }
        }

        if poll.finished {
            tracing::info!(events = self.events.len(), "timeline finished");
            self.reset();
        }
        poll
    }

    /// Freeze playback, returning the virtual time it froze at
    pub fn pause(&mut self, now: Millis) -> Option<Millis> {
        if self.state != TimelineState::Playing {
            return None;
        }
        self.timers.clear();
        self.published = self.clock.pause(now);
        self.state = TimelineState::Paused;
        tracing::debug!(virtual_time = self.published, "timeline paused");
        Some(self.published)
    }

    /// Continue from the pause point with the first undispatched event
    pub fn resume(&mut self, now: Millis) -> bool {
        if self.state != TimelineState::Paused {
            return false;
        }
        self.clock.resume(now);
        self.state = TimelineState::Playing;
        self.schedule_from(now);
        tracing::debug!(cursor = self.cursor, "timeline resumed");
        true
    }

    /// Jump to virtual time `target`
    ///
    /// Returns the prefix of events whose cadence position is at or before
    /// `target` (extended to the end of its slot), which the caller should
    /// reconstruct. Playback continues from there if it was running. A
    /// no-op when nothing is loaded.
    pub fn seek(&mut self, target: Millis, now: Millis) -> Option<Range<usize>> {
        if self.state == TimelineState::Idle || self.events.is_empty() {
            return None;
        }
        let target = target.clamp(0.0, self.clock.total());
        let covered = ((target / self.unit).floor() as usize + 1).min(self.events.len());
        let end = self.slot_end[covered - 1];

        self.timers.clear();
        self.cursor = end;
        self.clock.seek(now, target);
        self.published = target;
        if self.state == TimelineState::Playing {
            self.schedule_from(now);
        }
        tracing::debug!(target, dispatched = end, "timeline seek");
        Some(0..end)
    }

    /// Change speed without a jump in virtual time
    pub fn set_speed(&mut self, speed: Speed, now: Millis) {
        self.clock.set_speed(now, speed);
        if self.state == TimelineState::Playing {
            self.timers.clear();
            self.schedule_from(now);
        }
    }

    /// Step to the next speed in the cycle
    pub fn cycle_speed(&mut self, now: Millis) -> Speed {
        let next = self.speed().next();
        self.set_speed(next, now);
        next
    }

    /// Cancel everything and return to idle at normal speed
    pub fn reset(&mut self) {
        self.timers.clear();
        self.clock.reset();
        self.state = TimelineState::Idle;
        self.cursor = 0;
        self.published = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use siege_core::{ActorId, EventKind};

    /// Events at the given second offsets
    fn log(seconds: &[i64]) -> Vec<DomainEvent> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        seconds
            .iter()
            .enumerate()
            .map(|(i, s)| {
                DomainEvent::new(
                    ActorId::new(i as u64 + 1),
                    "u",
                    Some("Web"),
                    EventKind::AccessTarget,
                    t0 + Duration::seconds(*s),
                )
            })
            .collect()
    }

    fn timeline() -> Timeline {
        Timeline::new(&TimelineConfig::default())
    }

    #[test]
    fn test_empty_play_is_noop() {
        let mut tl = timeline();
        assert!(!tl.play(Vec::new(), 0, 0.0, 0.0));
        assert_eq!(tl.state(), TimelineState::Idle);
        assert_eq!(tl.pending(), 0);
    }

    #[test]
    fn test_events_due_at_unit_cadence() {
        let mut tl = timeline();
        tl.play(log(&[0, 10, 20]), 0, 0.0, 1_000.0);

        assert_eq!(tl.poll(1_000.0).due, vec![0..1]);
        assert!(tl.poll(1_999.0).due.is_empty());
        assert_eq!(tl.poll(2_000.0).due, vec![1..2]);
        assert_eq!(tl.poll(3_000.0).due, vec![2..3]);
        assert_eq!(tl.cursor(), 3);

        let last = tl.poll(4_000.0);
        assert!(last.finished);
        assert_eq!(tl.state(), TimelineState::Idle);
        assert_eq!(tl.events().len(), 3);
    }

    #[test]
    fn test_same_timestamp_forms_one_slot() {
        let mut tl = timeline();
        tl.play(log(&[0, 5, 5, 5, 9]), 0, 0.0, 0.0);
        assert_eq!(tl.poll(0.0).due, vec![0..1]);
        assert_eq!(tl.poll(1_000.0).due, vec![1..4]);
        assert!(tl.poll(3_500.0).due.is_empty());
        assert_eq!(tl.poll(4_000.0).due, vec![4..5]);
    }

    #[test]
    fn test_play_from_offset() {
        let mut tl = timeline();
        tl.play(log(&[0, 1, 2, 3]), 2, 2_000.0, 0.0);
        assert_eq!(tl.virtual_time(0.0), 2_000.0);
        assert_eq!(tl.poll(0.0).due, vec![2..3]);
        assert_eq!(tl.poll(1_000.0).due, vec![3..4]);
    }

    #[test]
    fn test_clock_tick_publishes() {
        let mut tl = timeline();
        tl.play(log(&[0, 1, 2]), 0, 0.0, 0.0);
        let poll = tl.poll(250.0);
        assert_eq!(poll.published, Some(250.0));
        assert_eq!(tl.published_time(), 250.0);
    }

    #[test]
    fn test_pause_resume_uses_cursor() {
        let mut tl = timeline();
        tl.play(log(&[0, 1, 2]), 0, 0.0, 0.0);
        tl.poll(0.0);
        assert_eq!(tl.pause(500.0), Some(500.0));
        assert_eq!(tl.pause(600.0), None);
        assert!(tl.poll(10_000.0).due.is_empty());
        assert_eq!(tl.virtual_time(10_000.0), 500.0);

        assert!(tl.resume(10_000.0));
        assert!(!tl.resume(10_000.0));
        assert!(tl.poll(10_499.0).due.is_empty());
        assert_eq!(tl.poll(10_500.0).due, vec![1..2]);
    }

    #[test]
    fn test_seek_covers_prefix() {
        let mut tl = timeline();
        assert_eq!(tl.seek(1_000.0, 0.0), None);

        tl.play(log(&[0, 1, 1, 2, 3]), 0, 0.0, 0.0);
        // 1500 covers indices 0 and 1; 1 shares a slot with 2
        assert_eq!(tl.seek(1_500.0, 100.0), Some(0..3));
        assert_eq!(tl.cursor(), 3);
        assert_eq!(tl.virtual_time(100.0), 1_500.0);
        assert_eq!(tl.poll(1_600.0).due, vec![3..4]);

        assert_eq!(tl.seek(0.0, 2_000.0), Some(0..1));
        assert_eq!(tl.seek(1e9, 2_000.0), Some(0..5));
    }

    #[test]
    fn test_speed_change_reschedules() {
        let mut tl = timeline();
        tl.play(log(&[0, 1, 2, 3]), 0, 0.0, 0.0);
        tl.poll(1_000.0);

        let before = tl.virtual_time(1_500.0);
        tl.set_speed(Speed::Double, 1_500.0);
        assert!((tl.virtual_time(1_500.0) - before).abs() < 1e-9);

        // index 2 at virtual 2000: 500 virtual ms away, 250 wall ms at 2x
        assert!(tl.poll(1_749.0).due.is_empty());
        assert_eq!(tl.poll(1_750.0).due, vec![2..3]);
        assert_eq!(tl.cycle_speed(1_750.0), Speed::Rapid);
    }

    #[test]
    fn test_reset_restores_normal_speed() {
        let mut tl = timeline();
        tl.play(log(&[0, 1]), 0, 0.0, 0.0);
        tl.set_speed(Speed::Triple, 0.0);
        tl.reset();
        assert_eq!(tl.speed(), Speed::Normal);
        assert_eq!(tl.state(), TimelineState::Idle);
        assert_eq!(tl.pending(), 0);
    }
}
