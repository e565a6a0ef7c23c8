//! Action feed shown next to the replay
//!
//! Keeps the most recent actions, newest first, formatted for display.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use siege_core::{DomainEvent, EventKind};
use std::collections::VecDeque;

/// Feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum number of entries kept
    pub capacity: usize,
    /// Offset applied when formatting timestamps
    pub utc_offset_minutes: i32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            utc_offset_minutes: 7 * 60,
        }
    }
}

/// One formatted feed line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub actor_name: String,
    pub initials: String,
    pub message: String,
    /// Display timestamp in the configured offset
    pub timestamp: String,
    pub at: DateTime<Utc>,
}

/// Bounded, newest-first list of recent actions
#[derive(Debug, Clone)]
pub struct ActionFeed {
    entries: VecDeque<FeedEntry>,
    config: FeedConfig,
    offset: FixedOffset,
}

impl ActionFeed {
    pub fn new(config: FeedConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or_else(|| {
            tracing::warn!(minutes = config.utc_offset_minutes, "invalid feed offset; using UTC");
            Utc.fix()
        });
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            offset,
        }
    }

    /// Add an action at the top, evicting the oldest beyond capacity
    pub fn push(&mut self, event: &DomainEvent) {
        if self.config.capacity == 0 {
            return;
        }
        let entry = self.format(event);
        self.entries.push_front(entry);
        self.entries.truncate(self.config.capacity);
    }

    /// Replace the feed with the tail of `events`
    pub fn rebuild(&mut self, events: &[DomainEvent]) {
        self.entries.clear();
        let skip = events.len().saturating_sub(self.config.capacity);
        for event in &events[skip..] {
            self.push(event);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.entries.iter()
    }

    fn format(&self, event: &DomainEvent) -> FeedEntry {
        let actor_name = display_name(event);
        let mut message = event.kind.describe().to_string();
        if matches!(
            event.kind,
            EventKind::CorrectSubmission | EventKind::IncorrectSubmission
        ) {
            if let Some(topic) = event.target_label() {
                message.push_str(&format!(" of topic \"{}\"", topic));
            }
        }
        FeedEntry {
            initials: initials(&actor_name),
            actor_name,
            message,
            timestamp: event
                .timestamp
                .with_timezone(&self.offset)
                .format("%d/%m/%Y %H:%M:%S")
                .to_string(),
            at: event.timestamp,
        }
    }
}

impl Default for ActionFeed {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}

fn display_name(event: &DomainEvent) -> String {
    let name = event.actor_name.trim();
    if name.is_empty() {
        format!("User {}", event.actor_id.raw())
    } else {
        name.to_string()
    }
}

/// Up to two uppercase initials
fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use siege_core::ActorId;

    fn event(id: u64, name: &str, kind: EventKind, minutes: i64) -> DomainEvent {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        DomainEvent::new(ActorId::new(id), name, Some("Web"), kind, t0 + Duration::minutes(minutes))
    }

    #[test]
    fn test_format_entry() {
        let mut feed = ActionFeed::default();
        feed.push(&event(1, "ada lovelace", EventKind::CorrectSubmission, 0));

        let entry = feed.entries().next().unwrap();
        assert_eq!(entry.actor_name, "ada lovelace");
        assert_eq!(entry.initials, "AL");
        assert_eq!(entry.message, "submitted a correct flag of topic \"Web\"");
        // 20:00 UTC is 03:00 the next day at +07:00
        assert_eq!(entry.timestamp, "02/06/2024 03:00:00");
    }

    #[test]
    fn test_name_fallback() {
        let mut feed = ActionFeed::default();
        feed.push(&event(42, "  ", EventKind::AccessTarget, 0));
        let entry = feed.entries().next().unwrap();
        assert_eq!(entry.actor_name, "User 42");
        assert_eq!(entry.initials, "U4");
        assert_eq!(entry.message, "accessed a challenge");
    }

    #[test]
    fn test_capacity_and_rebuild() {
        let mut feed = ActionFeed::new(FeedConfig {
            capacity: 3,
            ..FeedConfig::default()
        });
        let events: Vec<DomainEvent> = (0..5)
            .map(|i| event(i, "x", EventKind::AccessTarget, i as i64))
            .collect();
        for e in &events {
            feed.push(e);
        }
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.entries().next().unwrap().at, events[4].timestamp);

        feed.rebuild(&events[..2]);
        let order: Vec<_> = feed.entries().map(|e| e.at).collect();
        assert_eq!(order, vec![events[1].timestamp, events[0].timestamp]);

        feed.clear();
        assert!(feed.is_empty());
    }
}
