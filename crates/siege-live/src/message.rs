//! Push channel messages
//!
//! Every message travels in a `{ "event": <name>, "data": <payload> }`
//! envelope. The channel itself is supplied by the shell (socket.io,
//! WebSocket, ...) through [`PushChannel`].

use crate::Result;
use serde::{Deserialize, Serialize};
use siege_core::store::PlacedPosition;
use siege_core::{ActorId, AnimationState, Position};
use std::collections::VecDeque;
use std::convert::Infallible;

/// Another contestant present on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub id: ActorId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    /// Position as sent on join
    #[serde(default)]
    pub position: Option<Position>,
    /// Flat coordinates as sent in the roster
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub animation: Option<String>,
}

impl Presence {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(id),
            name: Some(name.into()),
            team: None,
            position: None,
            x: None,
            y: None,
            animation: None,
        }
    }

    /// Builder: set the join position
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Where the contestant is, from either coordinate form
    pub fn location(&self) -> Option<Position> {
        self.position.or(match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            _ => None,
        })
    }

    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("User {}", self.id.raw()),
        }
    }

    pub fn animation_state(&self) -> Option<AnimationState> {
        parse_animation(self.animation.as_deref())
    }
}

/// A remote position update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: ActorId,
    pub position: Position,
    #[serde(default)]
    pub animation: Option<String>,
}

impl PositionUpdate {
    pub fn animation_state(&self) -> Option<AnimationState> {
        parse_animation(self.animation.as_deref())
    }
}

/// Inbound push messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum LiveMessage {
    /// Everyone currently on the map
    #[serde(rename = "all-characters")]
    Roster { characters: Vec<Presence> },

    #[serde(rename = "add-character-to-map")]
    Join(Presence),

    #[serde(rename = "remove-character-from-map")]
    Leave { id: ActorId },

    #[serde(rename = "update-character-position")]
    Moved(PositionUpdate),

    #[serde(rename = "update-challenge-positions")]
    LayoutUpdate {
        #[serde(default)]
        positions: Vec<PlacedPosition>,
    },

    /// One action event or an array of them, decoded later so that
    /// individual bad records are dropped instead of the whole message
    #[serde(rename = "challenge-selected")]
    ChallengeSelected(serde_json::Value),
}

impl LiveMessage {
    /// Wire name of the message
    pub fn name(&self) -> &'static str {
        match self {
            LiveMessage::Roster { .. } => "all-characters",
            LiveMessage::Join(_) => "add-character-to-map",
            LiveMessage::Leave { .. } => "remove-character-from-map",
            LiveMessage::Moved(_) => "update-character-position",
            LiveMessage::LayoutUpdate { .. } => "update-challenge-positions",
            LiveMessage::ChallengeSelected(_) => "challenge-selected",
        }
    }
}

/// Decode one inbound envelope
pub fn decode(raw: &str) -> Result<LiveMessage> {
    Ok(serde_json::from_str(raw)?)
}

/// The local actor's position, as reported to the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    #[serde(rename = "userId")]
    pub user_id: ActorId,
    pub position: Position,
    pub animation: AnimationState,
}

/// Outbound push messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundMessage {
    /// Ask the server for a fresh roster
    #[serde(rename = "request-all-characters")]
    RequestRoster,

    #[serde(rename = "update-character-position")]
    Position(PositionReport),
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn parse_animation(raw: Option<&str>) -> Option<AnimationState> {
    let raw = raw?;
    match raw.parse() {
        Ok(state) => Some(state),
        Err(_) => {
            tracing::warn!(animation = raw, "unknown animation state");
            None
        }
    }
}

/// Bidirectional push channel
///
/// Implemented by the shell for its transport. Receiving is non-blocking.
pub trait PushChannel {
    /// Error type for this channel
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one encoded message
    fn send(&mut self, payload: &str) -> std::result::Result<(), Self::Error>;

    /// Receive one message (non-blocking)
    ///
    /// Returns `Ok(None)` if nothing is waiting.
    fn recv(&mut self) -> std::result::Result<Option<String>, Self::Error>;

    /// Check if the channel is currently connected
    fn is_connected(&self) -> bool;
}

/// In-memory channel for tests and local tooling
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    inbound: VecDeque<String>,
    sent: Vec<String>,
    connected: bool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            connected: true,
        }
    }

    /// Queue a message as if the server had pushed it
    pub fn deliver(&mut self, raw: impl Into<String>) {
        self.inbound.push_back(raw.into());
    }

    /// Messages sent so far
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PushChannel for MemoryChannel {
    type Error = Infallible;

    fn send(&mut self, payload: &str) -> std::result::Result<(), Infallible> {
        if self.connected {
            self.sent.push(payload.to_string());
        }
        Ok(())
    }

    fn recv(&mut self) -> std::result::Result<Option<String>, Infallible> {
        Ok(self.inbound.pop_front())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
