//! Log filtering and summaries

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siege_core::{ActorId, DomainEvent, EventKind, Millis};
use std::collections::HashMap;

/// Criteria for selecting log entries; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
    pub actor: Option<ActorId>,
    pub kind: Option<EventKind>,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: restrict to an inclusive time range
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Builder: restrict to one actor
    pub fn for_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Builder: restrict to one kind of action
    pub fn of_kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn validate(&self) -> Result<()> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Err(Error::InvalidRange(start, end)),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, event: &DomainEvent) -> bool {
        if let Some(start) = self.start {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if event.timestamp > end {
                return false;
            }
        }
        if let Some(actor) = self.actor {
            if event.actor_id != actor {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        true
    }

    /// Matching events, order preserved
    pub fn apply(&self, events: &[DomainEvent]) -> Vec<DomainEvent> {
        events.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

/// Overview of a (filtered) log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub total: usize,
    pub by_kind: HashMap<EventKind, usize>,
    /// Distinct actor names in order of first appearance
    pub actors: Vec<String>,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    /// Virtual length of the replay
    pub replay_duration_ms: Millis,
}

impl LogSummary {
    pub fn count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Summarize events replayed at `unit_interval_ms` per event
pub fn summarize(events: &[DomainEvent], unit_interval_ms: Millis) -> LogSummary {
    let mut summary = LogSummary {
        total: events.len(),
        replay_duration_ms: events.len() as f64 * unit_interval_ms,
        ..LogSummary::default()
    };

    for event in events {
        *summary.by_kind.entry(event.kind).or_insert(0) += 1;
        if !summary.actors.iter().any(|name| *name == event.actor_name) {
            summary.actors.push(event.actor_name.clone());
        }
        summary.first = Some(summary.first.map_or(event.timestamp, |t| t.min(event.timestamp)));
        summary.last = Some(summary.last.map_or(event.timestamp, |t| t.max(event.timestamp)));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn log() -> Vec<DomainEvent> {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        vec![
            DomainEvent::new(ActorId::new(1), "alice", Some("Web"), EventKind::AccessTarget, t0),
            DomainEvent::new(
                ActorId::new(2),
                "bob",
                Some("Web"),
                EventKind::AccessTarget,
                t0 + Duration::hours(1),
            ),
            DomainEvent::new(
                ActorId::new(1),
                "alice",
                Some("Web"),
                EventKind::CorrectSubmission,
                t0 + Duration::hours(2),
            ),
            DomainEvent::new(
                ActorId::new(2),
                "bob",
                Some("Crypto"),
                EventKind::IncorrectSubmission,
                t0 + Duration::hours(3),
            ),
        ]
    }

    #[test]
    fn test_inclusive_range() {
        let events = log();
        let query = LogQuery::new().between(events[1].timestamp, events[2].timestamp);
        let selected = query.apply(&events);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], events[1]);
    }

    #[test]
    fn test_actor_and_kind_filters() {
        let events = log();
        assert_eq!(LogQuery::new().for_actor(ActorId::new(2)).apply(&events).len(), 2);
        assert_eq!(
            LogQuery::new().of_kind(EventKind::AccessTarget).apply(&events).len(),
            2
        );
    }

    #[test]
    fn test_reversed_range_rejected() {
        let events = log();
        let query = LogQuery::new().between(events[3].timestamp, events[0].timestamp);
        assert!(matches!(query.validate(), Err(Error::InvalidRange(_, _))));
    }

    #[test]
    fn test_summary() {
        let events = log();
        let summary = summarize(&events, 1000.0);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.count(EventKind::AccessTarget), 2);
        assert_eq!(summary.count(EventKind::UnlockAid), 0);
        assert_eq!(summary.actors, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(summary.replay_duration_ms, 4000.0);
        assert_eq!(summary.first, Some(events[0].timestamp));
        assert_eq!(summary.last, Some(events[3].timestamp));
    }
}
