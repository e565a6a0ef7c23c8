//! Scene-graph collaborator
//!
//! The engine never draws anything itself. It drives an opaque scene through
//! the [`Scene`] trait; the embedding shell implements it on top of whatever
//! renderer it uses. [`crate::RecordingScene`] is a headless implementation.

use crate::actor::AnimationState;
use crate::geometry::Position;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Handle of a node created in the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// What a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Actor,
    Target,
}

/// One-shot visual effects played at a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Success,
    Failure,
}

impl EffectKind {
    /// Tint used when the effect cannot be played
    pub fn fallback_tint(&self) -> Tint {
        match self {
            EffectKind::Success => Tint::SUCCESS,
            EffectKind::Failure => Tint::FAILURE,
        }
    }
}

/// RGB color multiplied into a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tint(pub u32);

impl Tint {
    pub const WHITE: Tint = Tint(0xFFFFFF);
    pub const SUCCESS: Tint = Tint(0x00FF00);
    pub const FAILURE: Tint = Tint(0xFF0000);
    /// A target someone is actively working on
    pub const ACTIVE: Tint = Tint(0xFFFF00);
    /// A target whose hint was unlocked
    pub const AID: Tint = Tint(0x00BFFF);
}

impl Default for Tint {
    fn default() -> Self {
        Tint::WHITE
    }
}

/// Scene collaborator failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("Scene unavailable: {0}")]
    Unavailable(String),

    #[error("Effect {0:?} could not be loaded: {1}")]
    EffectLoad(EffectKind, String),

    #[error("Effect {0:?} could not be spawned: {1}")]
    EffectSpawn(EffectKind, String),
}

/// Rendering operations the engine needs
pub trait Scene {
    /// Prepare the scene; failure aborts engine construction
    fn init(&mut self) -> Result<(), SceneError>;

    /// Load the resources for an effect
    fn load_effect(&mut self, effect: EffectKind) -> Result<(), SceneError>;

    /// Create a node with a hover label at a position
    fn create_node(&mut self, kind: NodeKind, label: &str, position: Position) -> NodeId;

    fn set_position(&mut self, node: NodeId, position: Position);

    fn set_tint(&mut self, node: NodeId, tint: Tint);

    fn set_alpha(&mut self, node: NodeId, alpha: f64);

    /// Mirror horizontally when `left` is true
    fn set_facing(&mut self, node: NodeId, left: bool);

    fn set_label_visible(&mut self, node: NodeId, visible: bool);

    /// Start an animation at the given playback rate
    fn play_animation(&mut self, node: NodeId, state: AnimationState, rate: f64);

    /// Change playback rate without restarting the animation
    fn set_animation_rate(&mut self, node: NodeId, rate: f64);

    /// Play a one-shot effect
    fn spawn_effect(&mut self, effect: EffectKind, position: Position) -> Result<(), SceneError>;

    fn destroy_node(&mut self, node: NodeId);
}
