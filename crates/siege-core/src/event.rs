//! Domain events shared by the live and replay channels

use crate::identity::ActorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// What a contestant did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EventKind {
    /// Opened a challenge
    AccessTarget,
    /// Started working on a challenge
    StartTarget,
    /// Stopped working on a challenge
    StopTarget,
    /// Submitted a correct answer
    CorrectSubmission,
    /// Submitted an incorrect answer
    IncorrectSubmission,
    /// Unlocked a hint
    UnlockAid,
}

impl EventKind {
    /// Wire code of this kind
    pub fn code(&self) -> u8 {
        match self {
            EventKind::AccessTarget => 1,
            EventKind::StartTarget => 2,
            EventKind::StopTarget => 3,
            EventKind::CorrectSubmission => 4,
            EventKind::IncorrectSubmission => 5,
            EventKind::UnlockAid => 6,
        }
    }

    /// Submissions settle an actor's interaction with a target
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::CorrectSubmission | EventKind::IncorrectSubmission
        )
    }

    /// Human readable verb phrase
    pub fn describe(&self) -> &'static str {
        match self {
            EventKind::AccessTarget => "accessed a challenge",
            EventKind::StartTarget => "started a challenge",
            EventKind::StopTarget => "stopped a challenge",
            EventKind::CorrectSubmission => "submitted a correct flag",
            EventKind::IncorrectSubmission => "submitted an incorrect flag",
            EventKind::UnlockAid => "unlocked a hint",
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(EventKind::AccessTarget),
            2 => Ok(EventKind::StartTarget),
            3 => Ok(EventKind::StopTarget),
            4 => Ok(EventKind::CorrectSubmission),
            5 => Ok(EventKind::IncorrectSubmission),
            6 => Ok(EventKind::UnlockAid),
            other => Err(format!("unknown action type {}", other)),
        }
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::AccessTarget => "access-target",
            EventKind::StartTarget => "start-target",
            EventKind::StopTarget => "stop-target",
            EventKind::CorrectSubmission => "correct-submission",
            EventKind::IncorrectSubmission => "incorrect-submission",
            EventKind::UnlockAid => "unlock-aid",
        };
        f.write_str(name)
    }
}

/// Check whether a label means "no target"
pub fn is_sentinel_label(label: &str) -> bool {
    let trimmed = label.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
}

/// A timestamped record of a contestant action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "userId")]
    pub actor_id: ActorId,
    #[serde(rename = "userName", default, deserialize_with = "null_as_empty")]
    pub actor_name: String,
    #[serde(rename = "topicName", default)]
    pub target_label: Option<String>,
    #[serde(rename = "actionType")]
    pub kind: EventKind,
    #[serde(rename = "actionDate", with = "iso_date")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "actionDetail", default, deserialize_with = "null_as_empty")]
    pub detail: String,
}

impl DomainEvent {
    /// Create a new event
    pub fn new(
        actor_id: ActorId,
        actor_name: impl Into<String>,
        target_label: Option<&str>,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            actor_id,
            actor_name: actor_name.into(),
            target_label: target_label.map(str::to_string),
            kind,
            timestamp,
            detail: String::new(),
        }
    }

    /// Builder: set detail text
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// The referenced target label, or `None` for sentinel labels
    pub fn target_label(&self) -> Option<&str> {
        self.target_label
            .as_deref()
            .filter(|label| !is_sentinel_label(label))
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Stable sort by timestamp; equal timestamps keep arrival order
pub fn sort_events(events: &mut [DomainEvent]) {
    events.sort_by_key(|e| e.timestamp);
}

/// Events decoded from a JSON payload
#[derive(Debug, Clone, Default)]
pub struct DecodedBatch {
    pub events: Vec<DomainEvent>,
    /// Records that were dropped as invalid input
    pub rejected: usize,
}

/// Decode a single event object or an array of them
///
/// Invalid records are logged and skipped rather than failing the batch.
pub fn decode_batch(payload: serde_json::Value) -> DecodedBatch {
    let records = match payload {
        serde_json::Value::Array(items) => items,
        obj @ serde_json::Value::Object(_) => vec![obj],
        other => {
            tracing::warn!(payload = %other, "event payload is neither object nor array");
            return DecodedBatch {
                events: Vec::new(),
                rejected: 1,
            };
        }
    };

    let mut batch = DecodedBatch::default();
    for record in records {
        match serde_json::from_value::<DomainEvent>(record) {
            Ok(event) => batch.events.push(event),
            Err(err) => {
                tracing::warn!(error = %err, "dropping invalid event record");
                batch.rejected += 1;
            }
        }
    }
    batch
}

/// ISO-8601 timestamps with or without an offset; naive values are UTC
pub mod iso_date {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    /// Parse a timestamp string
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_wire_record() {
        let json = r#"{
            "userId": 7,
            "userName": "alice",
            "topicName": "Web",
            "actionType": 4,
            "actionDate": "2024-05-01T10:00:00",
            "actionDetail": "flag{x}"
        }"#;
        let event: DomainEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.actor_id, ActorId::new(7));
        assert_eq!(event.kind, EventKind::CorrectSubmission);
        assert_eq!(event.target_label(), Some("Web"));
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(event.detail, "flag{x}");

        let sparse = r#"{"userId": 8, "userName": null, "topicName": null, "actionType": 1,
            "actionDate": "2024-05-01 10:00:00", "actionDetail": null}"#;
        let event: DomainEvent = serde_json::from_str(sparse).unwrap();
        assert_eq!(event.actor_name, "");
        assert_eq!(event.target_label(), None);
    }

    #[test]
    fn test_offset_timestamps_normalize() {
        let parsed = iso_date::parse("2024-05-01T17:00:00+07:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert!(iso_date::parse("yesterday").is_none());
    }

    #[test]
    fn test_sentinel_labels() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for label in ["", "  ", "null", "NULL", "None"] {
            let event =
                DomainEvent::new(ActorId::new(1), "a", Some(label), EventKind::AccessTarget, ts);
            assert_eq!(event.target_label(), None, "label {:?}", label);
        }
        let event = DomainEvent::new(ActorId::new(1), "a", None, EventKind::AccessTarget, ts);
        assert_eq!(event.target_label(), None);
    }

    #[test]
    fn test_decode_batch_drops_invalid() {
        let payload = serde_json::json!([
            {"userId": 1, "topicName": "Web", "actionType": 1, "actionDate": "2024-01-01T00:00:00Z"},
            {"topicName": "Web", "actionType": 1, "actionDate": "2024-01-01T00:00:00Z"},
            {"userId": 2, "topicName": "Web", "actionType": 9, "actionDate": "2024-01-01T00:00:00Z"}
        ]);
        let batch = decode_batch(payload);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.rejected, 2);

        let single = decode_batch(serde_json::json!(
            {"userId": 3, "actionType": 6, "actionDate": "2024-01-01T00:00:00Z"}
        ));
        assert_eq!(single.events.len(), 1);
        assert_eq!(single.events[0].target_label(), None);
    }

    #[test]
    fn test_sort_is_stable() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        let mut events = vec![
            DomainEvent::new(ActorId::new(1), "a", Some("B"), EventKind::AccessTarget, t1),
            DomainEvent::new(ActorId::new(2), "b", Some("A"), EventKind::AccessTarget, t0),
            DomainEvent::new(ActorId::new(3), "c", Some("A"), EventKind::AccessTarget, t0),
        ];
        sort_events(&mut events);
        let ids: Vec<u64> = events.iter().map(|e| e.actor_id.raw()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
