//! Siege Replay - Timeline playback of historical action logs
//!
//! This crate builds on `siege-core`'s stage to replay a recorded log:
//!
//! - **Timeline**: virtual-clock scheduler with pause, resume, seek and speed
//! - **ReplaySession**: drives a `Stage` from the timeline, one frame at a time
//! - **LogQuery / LogSummary**: date-range and actor filtering of the log
//! - **ActionFeed**: the most recent actions, formatted for display
//!
//! # Example
//!
//! ```rust,ignore
//! use siege_core::{EngineConfig, MemoryStore, Stage};
//! use siege_replay::{FeedConfig, JsonLogSource, ReplaySession};
//!
//! let mut stage = Stage::new(scene, EngineConfig::default())?;
//! stage.initialize_targets(&mut challenges, &mut MemoryStore::new());
//!
//! let mut session = ReplaySession::new(stage, FeedConfig::default());
//! session.load_log(&mut JsonLogSource::from_path("actions.json")?)?;
//! session.play(now_ms);
//!
//! // once per render frame
//! let report = session.frame(now_ms);
//! ```

mod error;
mod feed;
mod log;
mod query;
mod session;
mod timeline;

pub use error::{Error, Result};
pub use feed::{ActionFeed, FeedConfig, FeedEntry};
pub use log::{parse_log, JsonLogSource, LogSource};
pub use query::{summarize, LogQuery, LogSummary};
pub use session::{FrameReport, ReplaySession};
pub use timeline::{Timeline, TimelinePoll, TimelineState};
