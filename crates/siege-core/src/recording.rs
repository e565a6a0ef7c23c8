//! Headless scene that records every operation
//!
//! Used by tests and by shells that want to inspect what the engine would
//! draw without a renderer.

use crate::actor::AnimationState;
use crate::geometry::Position;
use crate::scene::{EffectKind, NodeId, NodeKind, Scene, SceneError, Tint};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A recorded scene call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneOp {
    Init,
    LoadEffect(EffectKind),
    CreateNode(NodeId, NodeKind, String),
    SetPosition(NodeId, Position),
    SetTint(NodeId, Tint),
    SetAlpha(NodeId, f64),
    SetFacing(NodeId, bool),
    SetLabelVisible(NodeId, bool),
    PlayAnimation(NodeId, AnimationState),
    SetAnimationRate(NodeId, f64),
    SpawnEffect(EffectKind, Position),
    DestroyNode(NodeId),
}

/// Last known state of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub kind: NodeKind,
    pub label: String,
    pub position: Position,
    pub tint: Tint,
    pub alpha: f64,
    pub facing_left: bool,
    pub label_visible: bool,
    pub animation: Option<AnimationState>,
    pub animation_rate: f64,
}

/// In-memory [`Scene`] implementation
#[derive(Debug, Default)]
pub struct RecordingScene {
    ops: Vec<SceneOp>,
    nodes: IndexMap<NodeId, NodeState>,
    next_node: u64,
    fail_init: bool,
    failing_effects: Vec<EffectKind>,
}

impl RecordingScene {
    /// Create a working scene
    pub fn new() -> Self {
        Self::default()
    }

    /// A scene whose `init` fails
    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    /// Builder: make one effect fail to load and spawn
    pub fn with_failing_effect(mut self, effect: EffectKind) -> Self {
        self.failing_effects.push(effect);
        self
    }

    /// Every recorded operation in call order
    pub fn ops(&self) -> &[SceneOp] {
        &self.ops
    }

    /// Forget recorded operations (node state is kept)
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Current state of a live node
    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    /// Number of live nodes of a kind
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.values().filter(|n| n.kind == kind).count()
    }

    /// How many times an effect was actually played
    pub fn effects_spawned(&self, effect: EffectKind) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, SceneOp::SpawnEffect(e, _) if *e == effect))
            .count()
    }

    fn with_node(&mut self, id: NodeId, f: impl FnOnce(&mut NodeState)) {
        if let Some(node) = self.nodes.get_mut(&id) {
            f(node);
        }
    }
}

impl Scene for RecordingScene {
    fn init(&mut self) -> Result<(), SceneError> {
        if self.fail_init {
            return Err(SceneError::Unavailable("renderer not available".into()));
        }
        self.ops.push(SceneOp::Init);
        Ok(())
    }

    fn load_effect(&mut self, effect: EffectKind) -> Result<(), SceneError> {
        if self.failing_effects.contains(&effect) {
            return Err(SceneError::EffectLoad(effect, "missing spritesheet".into()));
        }
        self.ops.push(SceneOp::LoadEffect(effect));
        Ok(())
    }

    fn create_node(&mut self, kind: NodeKind, label: &str, position: Position) -> NodeId {
        self.next_node += 1;
        let id = NodeId(self.next_node);
        self.nodes.insert(
            id,
            NodeState {
                kind,
                label: label.to_string(),
                position,
                tint: Tint::WHITE,
                alpha: 1.0,
                facing_left: false,
                label_visible: false,
                animation: None,
                animation_rate: 0.0,
            },
        );
        self.ops.push(SceneOp::CreateNode(id, kind, label.to_string()));
        id
    }

    fn set_position(&mut self, node: NodeId, position: Position) {
        self.with_node(node, |n| n.position = position);
        self.ops.push(SceneOp::SetPosition(node, position));
    }

    fn set_tint(&mut self, node: NodeId, tint: Tint) {
        self.with_node(node, |n| n.tint = tint);
        self.ops.push(SceneOp::SetTint(node, tint));
    }

    fn set_alpha(&mut self, node: NodeId, alpha: f64) {
        self.with_node(node, |n| n.alpha = alpha);
        self.ops.push(SceneOp::SetAlpha(node, alpha));
    }

    fn set_facing(&mut self, node: NodeId, left: bool) {
        self.with_node(node, |n| n.facing_left = left);
        self.ops.push(SceneOp::SetFacing(node, left));
    }

    fn set_label_visible(&mut self, node: NodeId, visible: bool) {
        self.with_node(node, |n| n.label_visible = visible);
        self.ops.push(SceneOp::SetLabelVisible(node, visible));
    }

    fn play_animation(&mut self, node: NodeId, state: AnimationState, rate: f64) {
        self.with_node(node, |n| {
            n.animation = Some(state);
            n.animation_rate = rate;
        });
        self.ops.push(SceneOp::PlayAnimation(node, state));
    }

    fn set_animation_rate(&mut self, node: NodeId, rate: f64) {
        self.with_node(node, |n| n.animation_rate = rate);
        self.ops.push(SceneOp::SetAnimationRate(node, rate));
    }

    fn spawn_effect(&mut self, effect: EffectKind, position: Position) -> Result<(), SceneError> {
        if self.failing_effects.contains(&effect) {
            return Err(SceneError::EffectSpawn(effect, "effect not loaded".into()));
        }
        self.ops.push(SceneOp::SpawnEffect(effect, position));
        Ok(())
    }

    fn destroy_node(&mut self, node: NodeId) {
        self.nodes.shift_remove(&node);
        self.ops.push(SceneOp::DestroyNode(node));
    }
}
