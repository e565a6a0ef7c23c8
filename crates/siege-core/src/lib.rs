//! Siege Core - Timeline-independent actor synchronization
//!
//! This crate provides the shared machinery behind the siege map, used by
//! both the replay and the live channel:
//! - Identities, geometry and virtual time (`ActorId`, `Position`, `VirtualClock`)
//! - Owned, cancellable timers (`TimerRegistry`)
//! - Domain events and their wire decoding (`DomainEvent`, `EventKind`)
//! - The target registry with a stable, cached layout (`TargetRegistry`)
//! - Animated actors and the actor pool (`Actor`, `ActorPool`)
//! - Pure event reconciliation into directives (`Reconciler`, `Directive`)
//! - The `Stage`, which executes directives against a `Scene`
//!
//! ## Collaborators
//!
//! Rendering and persistence are supplied by the embedding shell through
//! the [`Scene`] and [`KeyValueStore`] traits. [`RecordingScene`] and
//! [`MemoryStore`] are headless implementations for tests and tooling.
//!
//! ## Driving the stage
//!
//! The shell calls [`Stage::frame`] once per render frame with the current
//! wall-clock time in milliseconds. Every time-dependent operation takes
//! that time explicitly; nothing reads a clock behind the caller's back.

pub mod actor;
mod config;
pub mod directive;
mod error;
pub mod event;
mod geometry;
mod identity;
mod pool;
mod reconcile;
mod recording;
mod rng;
pub mod scene;
mod stage;
pub mod store;
pub mod target;
pub mod time;
pub mod timers;

pub use actor::{Actor, ActorSnapshot, ActorTimer, AnimationState, AttackOptions, AttackToken};
pub use config::{EffectConfig, EngineConfig, LayoutConfig, MotionConfig, TimelineConfig};
pub use directive::Directive;
pub use error::{Error, Result};
pub use event::{decode_batch, is_sentinel_label, sort_events, DecodedBatch, DomainEvent, EventKind};
pub use geometry::Position;
pub use identity::{ActorId, TargetId};
pub use pool::ActorPool;
pub use reconcile::{BatchPlan, DropReason, DroppedEvent, EventSource, PlannedStep, Reconciler};
pub use recording::{NodeState, RecordingScene, SceneOp};
pub use rng::GameRng;
pub use scene::{EffectKind, NodeId, NodeKind, Scene, SceneError, Tint};
pub use stage::{BatchOutcome, Stage, StageSnapshot};
pub use store::{KeyValueStore, LayoutCache, MemoryStore, PlacedPosition};
pub use target::{Target, TargetDescriptor, TargetRegistry, TargetSnapshot, TargetSource};
pub use time::{Millis, Speed, VirtualClock};
pub use timers::{TimerHandle, TimerRegistry};
