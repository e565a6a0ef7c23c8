//! Replay session
//!
//! Ties a [`Timeline`] to a [`Stage`]: the timeline decides when each slot
//! of the log is due, the stage applies it. Also owns the action feed and
//! the log filter.

use crate::feed::{ActionFeed, FeedConfig};
use crate::log::LogSource;
use crate::query::{summarize, LogQuery, LogSummary};
use crate::timeline::{Timeline, TimelineState};
use crate::Result;
use siege_core::{
    sort_events, DomainEvent, DroppedEvent, EventSource, Millis, Reconciler, Scene, Speed, Stage,
};

/// What happened during one replay frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub virtual_time: Millis,
    /// Actor/target outcomes executed this frame
    pub applied: usize,
    pub dropped: Vec<DroppedEvent>,
    /// Playback reached the end; the session has reset
    pub finished: bool,
}

/// Replay of a historical action log onto a stage
#[derive(Debug)]
pub struct ReplaySession<S: Scene> {
    stage: Stage<S>,
    timeline: Timeline,
    reconciler: Reconciler,
    feed: ActionFeed,
    log: Vec<DomainEvent>,
    filtered: Vec<DomainEvent>,
    unit: Millis,
    /// Wall time at which playback was paused
    paused_at: Option<Millis>,
}

impl<S: Scene> ReplaySession<S> {
    pub fn new(stage: Stage<S>, feed: FeedConfig) -> Self {
        let config = stage.config();
        let timeline = Timeline::new(&config.timeline);
        let reconciler = Reconciler::new(EventSource::Replay, &config.effects);
        let unit = config.timeline.unit_interval_ms;
        Self {
            stage,
            timeline,
            reconciler,
            feed: ActionFeed::new(feed),
            log: Vec::new(),
            filtered: Vec::new(),
            unit,
            paused_at: None,
        }
    }

    pub fn stage(&self) -> &Stage<S> {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage<S> {
        &mut self.stage
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn feed(&self) -> &ActionFeed {
        &self.feed
    }

    pub fn state(&self) -> TimelineState {
        self.timeline.state()
    }

    pub fn speed(&self) -> Speed {
        self.timeline.speed()
    }

    /// Events that will be replayed
    pub fn events(&self) -> &[DomainEvent] {
        &self.filtered
    }

    /// Fetch the log, replacing any loaded one; playback is reset
    pub fn load_log(&mut self, source: &mut dyn LogSource) -> Result<LogSummary> {
        let mut events = source.fetch_log()?;
        sort_events(&mut events);
        self.reset();
        self.filtered = events.clone();
        self.log = events;
        tracing::info!(events = self.log.len(), "action log loaded");
        Ok(self.summary())
    }

    /// Narrow the replay to events matching `query`; playback is reset
    pub fn filter(&mut self, query: &LogQuery) -> Result<LogSummary> {
        query.validate()?;
        self.reset();
        self.filtered = query.apply(&self.log);
        tracing::debug!(total = self.log.len(), selected = self.filtered.len(), "log filtered");
        Ok(self.summary())
    }

    pub fn summary(&self) -> LogSummary {
        summarize(&self.filtered, self.unit)
    }

    /// Start from the beginning, or resume if paused
    pub fn play(&mut self, now: Millis) -> bool {
        match self.timeline.state() {
            TimelineState::Playing => false,
            TimelineState::Paused => self.resume(now),
            TimelineState::Idle => {
                self.stage.reset();
                self.feed.clear();
                let speed = self.timeline.speed().multiplier();
                self.stage.set_speed(speed, now);
                self.timeline.play(self.filtered.clone(), 0, 0.0, now)
            }
        }
    }

    /// Freeze playback and the stage
    pub fn pause(&mut self, now: Millis) -> bool {
        if self.timeline.pause(now).is_none() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// Continue after a pause; stage timers are shifted by the paused time
    pub fn resume(&mut self, now: Millis) -> bool {
        if !self.timeline.resume(now) {
            return false;
        }
        if let Some(paused_at) = self.paused_at.take() {
            self.stage.postpone((now - paused_at).max(0.0));
        }
        true
    }

    /// Jump to virtual time `target`, rebuilding the stage and feed
    pub fn seek(&mut self, target: Millis, now: Millis) -> bool {
        let Some(range) = self.timeline.seek(target, now) else {
            tracing::debug!(target, "seek ignored; nothing is playing");
            return false;
        };
        let prefix = &self.timeline.events()[range];
        self.stage.reconstruct(prefix);
        self.feed.rebuild(prefix);
        let speed = self.timeline.speed().multiplier();
        self.stage.set_speed(speed, now);
        if self.paused_at.is_some() {
            self.paused_at = Some(now);
        }
        true
    }

    /// Change playback speed for the timeline and every actor
    pub fn set_speed(&mut self, speed: Speed, now: Millis) {
        self.timeline.set_speed(speed, now);
        // the stage is frozen at the pause instant; resume shifts it from there
        let stage_now = self.paused_at.unwrap_or(now);
        self.stage.set_speed(speed.multiplier(), stage_now);
    }

    /// Step to the next speed
    pub fn cycle_speed(&mut self, now: Millis) -> Speed {
        let next = self.timeline.speed().next();
        self.set_speed(next, now);
        next
    }

    /// Stop playback and clear the stage
    pub fn reset(&mut self) {
        self.timeline.reset();
        self.stage.reset();
        self.stage.set_speed(Speed::Normal.multiplier(), 0.0);
        self.feed.clear();
        self.paused_at = None;
    }

    /// Advance one render frame
    pub fn frame(&mut self, now: Millis) -> FrameReport {
        let mut report = FrameReport::default();
        if self.timeline.state() == TimelineState::Paused {
            report.virtual_time = self.timeline.virtual_time(now);
            return report;
        }

        let poll = self.timeline.poll(now);
        for range in poll.due {
            let slot = &self.timeline.events()[range];
            for event in slot {
                self.feed.push(event);
            }
            let outcome = self.stage.apply_batch(&self.reconciler, slot, now);
            report.applied += outcome.applied;
            report.dropped.extend(outcome.dropped);
        }

        self.stage.frame(now);

        if poll.finished {
            self.stage.reset();
            self.stage.set_speed(Speed::Normal.multiplier(), now);
            self.feed.clear();
            report.finished = true;
        }
        report.virtual_time = self.timeline.virtual_time(now);
        report
    }

    /// Tear down and hand the stage back
    pub fn into_stage(mut self) -> Stage<S> {
        self.reset();
        self.stage
    }
}
