//! Target registry
//!
//! Owns the challenge stations placed on the map. Positions are generated
//! once per layout by bounded rejection sampling and cached in the
//! key-value store so that every session sees the same map until the cache
//! expires or the set of targets changes.

use crate::config::{EffectConfig, LayoutConfig};
use crate::error::Result;
use crate::event::is_sentinel_label;
use crate::geometry::Position;
use crate::identity::TargetId;
use crate::rng::GameRng;
use crate::scene::{NodeId, NodeKind, Scene, Tint};
use crate::store::{load_json, save_json, KeyValueStore, LayoutCache, PlacedPosition, LAYOUT_KEY};
use crate::time::Millis;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Alpha used for the dimmed half of a blink
const BLINK_ALPHA: f64 = 0.5;

/// A target as delivered by the target source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub id: TargetId,
    #[serde(rename = "topicName", alias = "label")]
    pub label: String,
}

impl TargetDescriptor {
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id: TargetId::new(id),
            label: label.into(),
        }
    }
}

/// Provider of the current set of targets
pub trait TargetSource {
    fn fetch_targets(&mut self) -> Result<Vec<TargetDescriptor>>;
}

impl TargetSource for Vec<TargetDescriptor> {
    fn fetch_targets(&mut self) -> Result<Vec<TargetDescriptor>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Shake {
    until: Millis,
}

/// A placed challenge station
#[derive(Debug, Clone)]
pub struct Target {
    id: TargetId,
    label: String,
    position: Position,
    node: NodeId,
    tint: Tint,
    alpha: f64,
    shake: Option<Shake>,
}

impl Target {
    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Resting position (shake jitter is not included)
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn tint(&self) -> Tint {
        self.tint
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn is_shaking(&self) -> bool {
        self.shake.is_some()
    }

    pub fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            id: self.id,
            label: self.label.clone(),
            position: self.position,
            tint: self.tint,
            alpha: self.alpha,
            shaking: self.is_shaking(),
        }
    }
}

/// Observable state of a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub label: String,
    pub position: Position,
    pub tint: Tint,
    pub alpha: f64,
    pub shaking: bool,
}

/// Result of layout generation
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedLayout {
    pub positions: Vec<Position>,
    /// How many targets were placed without honoring the separation
    pub fallbacks: usize,
}

/// Place `count` points inside the canvas, keeping them `padding` apart
///
/// Each point gets `attempts` samples; if none is far enough from the
/// points already placed, the last sample is used anyway.
pub fn generate_layout(count: usize, rng: &mut GameRng, config: &LayoutConfig) -> GeneratedLayout {
    let half_w = config.width / 2.0;
    let half_h = config.height / 2.0;
    let mut positions: Vec<Position> = Vec::with_capacity(count);
    let mut fallbacks = 0;

    for _ in 0..count {
        let mut candidate = Position::ORIGIN;
        let mut accepted = false;
        for _ in 0..config.attempts.max(1) {
            candidate = Position::new(
                rng.range_f64(-half_w, half_w),
                rng.range_f64(-half_h, half_h),
            );
            if positions
                .iter()
                .all(|placed| placed.distance_to(candidate) > config.padding)
            {
                accepted = true;
                break;
            }
        }
        if !accepted {
            fallbacks += 1;
        }
        positions.push(candidate);
    }

    if fallbacks > 0 {
        tracing::warn!(count, fallbacks, "layout placed targets without full separation");
    }

    GeneratedLayout {
        positions,
        fallbacks,
    }
}

/// Registry of all targets on the map
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: IndexMap<TargetId, Target>,
    layout: LayoutConfig,
    effects: EffectConfig,
}

impl TargetRegistry {
    /// Create an empty registry
    pub fn new(layout: LayoutConfig, effects: EffectConfig) -> Self {
        Self {
            targets: IndexMap::new(),
            layout,
            effects,
        }
    }

    /// Fetch targets and place them, reusing the cached layout when valid
    ///
    /// A failing source is logged and treated as empty. Any previously
    /// placed targets are removed from the scene first.
    pub fn initialize(
        &mut self,
        source: &mut dyn TargetSource,
        store: &mut dyn KeyValueStore,
        scene: &mut dyn Scene,
        rng: &mut GameRng,
        now_epoch_ms: i64,
    ) -> Vec<TargetSnapshot> {
        self.clear(scene);

        let descriptors = match source.fetch_targets() {
            Ok(descriptors) => descriptors,
            Err(err) => {
                tracing::warn!(error = %err, "target source failed; continuing with no targets");
                Vec::new()
            }
        };

        let positions = match self.cached_positions(&descriptors, store, now_epoch_ms) {
            Some(positions) => {
                tracing::debug!(count = positions.len(), "reusing cached target layout");
                positions
            }
            None => {
                let generated = generate_layout(descriptors.len(), rng, &self.layout);
                let cache = LayoutCache {
                    timestamp: now_epoch_ms,
                    positions: descriptors
                        .iter()
                        .zip(&generated.positions)
                        .map(|(d, p)| PlacedPosition {
                            id: d.id,
                            x: p.x,
                            y: p.y,
                        })
                        .collect(),
                };
                save_json(store, LAYOUT_KEY, &cache);
                tracing::debug!(count = descriptors.len(), "generated new target layout");
                generated.positions
            }
        };

        for (descriptor, position) in descriptors.into_iter().zip(positions) {
            let node = scene.create_node(NodeKind::Target, &descriptor.label, position);
            self.targets.insert(
                descriptor.id,
                Target {
                    id: descriptor.id,
                    label: descriptor.label,
                    position,
                    node,
                    tint: Tint::WHITE,
                    alpha: 1.0,
                    shake: None,
                },
            );
        }

        self.snapshots()
    }

    fn cached_positions(
        &self,
        descriptors: &[TargetDescriptor],
        store: &dyn KeyValueStore,
        now_epoch_ms: i64,
    ) -> Option<Vec<Position>> {
        let cache: LayoutCache = load_json(store, LAYOUT_KEY)?;
        if now_epoch_ms - cache.timestamp > self.layout.freshness_ms {
            tracing::debug!("cached target layout expired");
            return None;
        }
        if cache.positions.len() != descriptors.len() {
            tracing::debug!(
                cached = cache.positions.len(),
                current = descriptors.len(),
                "target count changed; regenerating layout"
            );
            return None;
        }
        descriptors
            .iter()
            .map(|d| cache.position_of(d.id).map(|p| Position::new(p.x, p.y)))
            .collect()
    }

    /// Case-insensitive lookup by label
    pub fn find_by_label(&self, label: &str) -> Option<&Target> {
        if is_sentinel_label(label) {
            tracing::warn!(label, "lookup with empty target label");
            return None;
        }
        let wanted = label.to_lowercase();
        self.targets
            .values()
            .find(|t| t.label.to_lowercase() == wanted)
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Move targets to server-assigned positions; unknown ids are ignored
    pub fn apply_layout_update(
        &mut self,
        positions: &[PlacedPosition],
        scene: &mut dyn Scene,
    ) -> usize {
        let mut applied = 0;
        for placed in positions {
            match self.targets.get_mut(&placed.id) {
                Some(target) => {
                    target.position = Position::new(placed.x, placed.y);
                    target.shake = None;
                    scene.set_position(target.node, target.position);
                    applied += 1;
                }
                None => tracing::debug!(target = %placed.id, "layout update for unknown target"),
            }
        }
        applied
    }

    pub fn highlight(&mut self, id: TargetId, tint: Tint, scene: &mut dyn Scene) {
        if let Some(target) = self.targets.get_mut(&id) {
            target.tint = tint;
            scene.set_tint(target.node, tint);
        }
    }

    pub fn set_alpha(&mut self, id: TargetId, alpha: f64, scene: &mut dyn Scene) {
        if let Some(target) = self.targets.get_mut(&id) {
            target.alpha = alpha;
            scene.set_alpha(target.node, alpha);
        }
    }

    /// Flip between full and dimmed alpha
    pub fn toggle_alpha(&mut self, id: TargetId, scene: &mut dyn Scene) {
        if let Some(alpha) = self.targets.get(&id).map(|t| t.alpha) {
            let next = if alpha < 1.0 { 1.0 } else { BLINK_ALPHA };
            self.set_alpha(id, next, scene);
        }
    }

    /// Begin (or restart) the decaying shake
    pub fn start_shake(&mut self, id: TargetId, now: Millis) {
        if let Some(target) = self.targets.get_mut(&id) {
            target.shake = Some(Shake {
                until: now + self.effects.shake_duration_ms,
            });
        }
    }

    /// Stop shaking and return to the resting position
    pub fn stop_shake(&mut self, id: TargetId, scene: &mut dyn Scene) {
        if let Some(target) = self.targets.get_mut(&id) {
            if target.shake.take().is_some() {
                scene.set_position(target.node, target.position);
            }
        }
    }

    /// Stop every shake, returning how many targets were shaking
    pub fn stop_all_shakes(&mut self, scene: &mut dyn Scene) -> usize {
        let mut stopped = 0;
        for target in self.targets.values_mut() {
            if target.shake.take().is_some() {
                scene.set_position(target.node, target.position);
                stopped += 1;
            }
        }
        stopped
    }

    /// Clear tint, alpha and shake
    pub fn release(&mut self, id: TargetId, scene: &mut dyn Scene) {
        self.stop_shake(id, scene);
        if let Some(target) = self.targets.get_mut(&id) {
            if target.tint != Tint::WHITE {
                target.tint = Tint::WHITE;
                scene.set_tint(target.node, Tint::WHITE);
            }
            if target.alpha != 1.0 {
                target.alpha = 1.0;
                scene.set_alpha(target.node, 1.0);
            }
        }
    }

    /// Release every target
    pub fn reset_effects(&mut self, scene: &mut dyn Scene) {
        let ids: Vec<TargetId> = self.targets.keys().copied().collect();
        for id in ids {
            self.release(id, scene);
        }
    }

    /// Advance shake effects by one frame
    pub fn frame(&mut self, scene: &mut dyn Scene, rng: &mut GameRng, now: Millis) {
        let duration = self.effects.shake_duration_ms;
        let intensity = self.effects.shake_intensity;
        for target in self.targets.values_mut() {
            let Some(shake) = target.shake else {
                continue;
            };
            if now >= shake.until || duration <= 0.0 {
                target.shake = None;
                scene.set_position(target.node, target.position);
                continue;
            }
            let amplitude = intensity * ((shake.until - now) / duration).min(1.0);
            let jittered = target
                .position
                .offset(rng.jitter(amplitude), rng.jitter(amplitude));
            scene.set_position(target.node, jittered);
        }
    }

    /// Show or hide the hover label of the target owning `node`
    pub fn set_hovered(&mut self, node: NodeId, hovered: bool, scene: &mut dyn Scene) -> bool {
        if self.targets.values().any(|t| t.node == node) {
            scene.set_label_visible(node, hovered);
            true
        } else {
            false
        }
    }

    /// Remove every target from the scene
    pub fn clear(&mut self, scene: &mut dyn Scene) {
        for (_, target) in self.targets.drain(..) {
            scene.destroy_node(target.node);
        }
    }

    pub fn snapshots(&self) -> Vec<TargetSnapshot> {
        self.targets.values().map(Target::snapshot).collect()
    }
}
