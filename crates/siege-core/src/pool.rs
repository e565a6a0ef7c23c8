//! Actor pool keyed by actor identity

use crate::actor::{Actor, ActorSnapshot};
use crate::config::EngineConfig;
use crate::geometry::Position;
use crate::identity::ActorId;
use crate::scene::Scene;
use crate::time::Millis;
use indexmap::IndexMap;

/// Owns every actor on the map, in creation order
#[derive(Debug, Clone)]
pub struct ActorPool {
    actors: IndexMap<ActorId, Actor>,
    speed: f64,
}

impl ActorPool {
    pub fn new() -> Self {
        Self {
            actors: IndexMap::new(),
            speed: 1.0,
        }
    }

    /// Speed given to newly created actors
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Return the actor for `id`, creating it if absent
    ///
    /// Name and position only apply on creation.
    pub fn get_or_create(
        &mut self,
        id: ActorId,
        name: &str,
        position: Position,
        config: &EngineConfig,
        scene: &mut dyn Scene,
    ) -> &mut Actor {
        let speed = self.speed;
        self.actors
            .entry(id)
            .or_insert_with(|| Actor::create(id, name, position, speed, config, scene))
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Destroy and forget an actor
    pub fn remove(&mut self, id: ActorId, scene: &mut dyn Scene) -> bool {
        match self.actors.shift_remove(&id) {
            Some(actor) => {
                actor.destroy(scene);
                true
            }
            None => false,
        }
    }

    /// Destroy every actor
    pub fn reset_all(&mut self, scene: &mut dyn Scene) -> usize {
        let count = self.actors.len();
        for (_, actor) in self.actors.drain(..) {
            actor.destroy(scene);
        }
        count
    }

    /// Apply a speed to every actor and to actors created later
    pub fn set_speed_all(&mut self, speed: f64, now: Millis, scene: &mut dyn Scene) {
        self.speed = speed;
        for actor in self.actors.values_mut() {
            actor.set_speed(speed, now, scene);
        }
    }

    pub fn ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    pub fn snapshots(&self) -> Vec<ActorSnapshot> {
        self.actors.values().map(Actor::snapshot).collect()
    }
}

impl Default for ActorPool {
    fn default() -> Self {
        Self::new()
    }
}
