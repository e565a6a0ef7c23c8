//! Historical action log sources

use crate::{Error, Result};
use serde::Deserialize;
use siege_core::{decode_batch, sort_events, DomainEvent};
use std::path::Path;

/// Provider of the historical action log
pub trait LogSource {
    fn fetch_log(&mut self) -> Result<Vec<DomainEvent>>;
}

impl LogSource for Vec<DomainEvent> {
    fn fetch_log(&mut self) -> Result<Vec<DomainEvent>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Log source backed by a JSON document
///
/// Accepts either a bare array of events or a `{ success, data }` envelope.
#[derive(Debug, Clone)]
pub struct JsonLogSource {
    raw: String,
}

impl JsonLogSource {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Read the document from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }
}

impl LogSource for JsonLogSource {
    fn fetch_log(&mut self) -> Result<Vec<DomainEvent>> {
        parse_log(&self.raw)
    }
}

/// Parse and sort a JSON action log
pub fn parse_log(raw: &str) -> Result<Vec<DomainEvent>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let is_envelope = matches!(
        &value,
        serde_json::Value::Object(map) if map.contains_key("data") || map.contains_key("success")
    );
    let payload = if is_envelope {
        let envelope: Envelope = serde_json::from_value(value)?;
        if !envelope.success {
            return Err(Error::InvalidLog(
                envelope
                    .message
                    .unwrap_or_else(|| "log source reported failure".into()),
            ));
        }
        envelope.data
    } else {
        value
    };

    let batch = decode_batch(payload);
    if batch.rejected > 0 {
        tracing::warn!(rejected = batch.rejected, "skipped invalid log records");
    }
    let mut events = batch.events;
    sort_events(&mut events);
    tracing::debug!(events = events.len(), "action log parsed");
    Ok(events)
}
