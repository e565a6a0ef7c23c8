//! Siege Live - Real-time presence on the siege map
//!
//! This crate connects a `siege-core` stage to a push channel:
//!
//! - **Messages**: the push envelope codec and the [`PushChannel`] trait
//! - **Inbox**: bounded queue of received messages, applied once per frame
//! - **Interpolation**: smooths remote actors towards pushed positions
//! - **LiveSession**: presence, live action events, click-to-move and
//!   local position reporting
//!
//! # Frame flow
//!
//! ```text
//!  channel ──recv──▶ Inbox ──frame──▶ handle ──▶ Stage
//!                                       │
//!                     Interpolator ◀────┘
//!                                              Stage ──▶ PositionReport ──send──▶ channel
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use siege_core::{ActorId, EngineConfig, Stage};
//! use siege_live::{LiveConfig, LiveSession};
//!
//! let stage = Stage::new(scene, EngineConfig::default())?;
//! let mut live = LiveSession::new(stage, browser_store, LiveConfig::default())?;
//! live.initialize_targets(&mut challenges);
//! live.spawn_local(ActorId::new(user.id), &user.name);
//! live.request_roster(&mut socket)?;
//!
//! // once per render frame
//! let report = live.pump(&mut socket, now_ms)?;
//! ```

mod error;
mod inbox;
mod interpolation;
mod message;
mod session;

pub use error::{Error, Result};
pub use inbox::{Inbox, InboxEntry};
pub use interpolation::{FollowGoal, Interpolator};
pub use message::{
    decode, LiveMessage, MemoryChannel, OutboundMessage, PositionReport, PositionUpdate, Presence,
    PushChannel,
};
pub use session::{LiveConfig, LiveFrameReport, LiveSession};
