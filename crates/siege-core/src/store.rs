//! Key-value persistence collaborator
//!
//! The shell provides a string store (browser local storage, a file, ...).
//! Values are JSON; corrupt entries are logged and ignored.

use crate::identity::TargetId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key under which the target layout is cached
pub const LAYOUT_KEY: &str = "challengePositions";
/// Key of the local actor's last position
pub const LOCAL_POSITION_KEY: &str = "characterPosition";
/// Key of the local actor's last animation
pub const LOCAL_ANIMATION_KEY: &str = "characterAnimation";

/// String key-value storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Read and decode a JSON value, ignoring corrupt entries
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "ignoring corrupt stored value");
            None
        }
    }
}

/// Encode and write a JSON value
pub fn save_json<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => store.set(key, raw),
        Err(err) => tracing::warn!(key, error = %err, "failed to encode value for storage"),
    }
}

/// A target position as persisted and as pushed by the live channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedPosition {
    pub id: TargetId,
    pub x: f64,
    pub y: f64,
}

/// Cached target layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutCache {
    /// Generation time, epoch milliseconds
    pub timestamp: i64,
    pub positions: Vec<PlacedPosition>,
}

impl LayoutCache {
    /// Position cached for a target
    pub fn position_of(&self, id: TargetId) -> Option<&PlacedPosition> {
        self.positions.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_through_store() {
        let mut store = MemoryStore::new();
        let cache = LayoutCache {
            timestamp: 1_700_000_000_000,
            positions: vec![PlacedPosition {
                id: TargetId::new(4),
                x: 10.0,
                y: -20.0,
            }],
        };
        save_json(&mut store, LAYOUT_KEY, &cache);

        let loaded: LayoutCache = load_json(&store, LAYOUT_KEY).unwrap();
        assert_eq!(loaded, cache);
        assert!(loaded.position_of(TargetId::new(4)).is_some());
        assert!(loaded.position_of(TargetId::new(5)).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_ignored() {
        let mut store = MemoryStore::new();
        store.set(LAYOUT_KEY, "{not json".to_string());
        assert!(load_json::<LayoutCache>(&store, LAYOUT_KEY).is_none());

        store.remove(LAYOUT_KEY);
        assert!(store.is_empty());
    }
}
