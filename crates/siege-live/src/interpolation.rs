//! Position smoothing for remote actors
//!
//! Positions pushed by other clients arrive at the sender's report rate.
//! Rather than teleporting, each remote actor closes a fixed fraction of the
//! remaining distance every frame until it settles.

use indexmap::IndexMap;
use siege_core::{ActorId, AnimationState, MotionConfig, Position, Scene, Stage};

/// Where a remote actor is heading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowGoal {
    pub position: Position,
    /// Animation to show once settled
    pub settled: AnimationState,
}

/// Per-actor follow targets
#[derive(Debug)]
pub struct Interpolator {
    goals: IndexMap<ActorId, FollowGoal>,
    /// Fraction of the remaining distance covered per frame
    amount: f64,
    settle_radius: f64,
}

impl Interpolator {
    pub fn new(amount: f64, settle_radius: f64) -> Self {
        Self {
            goals: IndexMap::new(),
            amount,
            settle_radius,
        }
    }

    pub fn from_motion(motion: &MotionConfig) -> Self {
        Self::new(motion.follow_lerp, motion.settle_radius)
    }

    /// Replace the goal of an actor
    ///
    /// A reported `run` animation settles to idle; anything else is kept
    /// once the actor arrives.
    pub fn push_goal(
        &mut self,
        id: ActorId,
        position: Position,
        announced: Option<AnimationState>,
    ) {
        let settled = match announced {
            Some(AnimationState::Run) | None => AnimationState::Idle,
            Some(state) => state,
        };
        self.goals.insert(id, FollowGoal { position, settled });
    }

    pub fn goal(&self, id: ActorId) -> Option<&FollowGoal> {
        self.goals.get(&id)
    }

    pub fn is_following(&self, id: ActorId) -> bool {
        self.goals.contains_key(&id)
    }

    pub fn remove(&mut self, id: ActorId) -> bool {
        self.goals.shift_remove(&id).is_some()
    }

    /// Step every followed actor once
    ///
    /// Returns the number of actors still moving.
    pub fn advance<S: Scene>(&mut self, stage: &mut Stage<S>) -> usize {
        let amount = self.amount;
        let settle_radius = self.settle_radius;
        self.goals.retain(|id, goal| {
            let Some(remaining) = stage.glide_actor(*id, goal.position, amount) else {
                return false;
            };
            if remaining > settle_radius {
                stage.set_actor_animation(*id, AnimationState::Run);
                true
            } else {
                stage.set_actor_animation(*id, goal.settled);
                false
            }
        });
        self.goals.len()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn reset(&mut self) {
        self.goals.clear();
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::from_motion(&MotionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siege_core::{EngineConfig, RecordingScene};

    fn stage_with_actor() -> Stage<RecordingScene> {
        let mut stage =
            Stage::with_seed(RecordingScene::new(), EngineConfig::default(), 3).unwrap();
        stage.spawn_actor(ActorId::new(2), "bob", Position::ORIGIN);
        stage
    }

    #[test]
    fn test_lerp_per_frame() {
        let mut stage = stage_with_actor();
        let mut follow = Interpolator::default();
        follow.push_goal(ActorId::new(2), Position::new(100.0, 0.0), None);

        assert_eq!(follow.advance(&mut stage), 1);
        let actor = stage.actors().get(ActorId::new(2)).unwrap();
        assert!((actor.position().x - 10.0).abs() < 1e-9);
        assert_eq!(actor.animation(), AnimationState::Run);
    }

    #[test]
    fn test_settles_to_announced_animation() {
        let mut stage = stage_with_actor();
        let mut follow = Interpolator::default();
        follow.push_goal(ActorId::new(2), Position::new(30.0, 40.0), Some(AnimationState::Attack4));

        let mut frames = 0;
        while follow.advance(&mut stage) > 0 {
            frames += 1;
            assert!(frames < 100, "never settled");
        }
        let actor = stage.actors().get(ActorId::new(2)).unwrap();
        assert!(actor.position().distance_to(Position::new(30.0, 40.0)) <= 1.0);
        assert_eq!(actor.animation(), AnimationState::Attack4);
        assert!(!follow.is_following(ActorId::new(2)));
    }

    #[test]
    fn test_run_settles_to_idle_and_unknown_dropped() {
        let mut stage = stage_with_actor();
        let mut follow = Interpolator::default();
        follow.push_goal(ActorId::new(2), Position::new(0.5, 0.0), Some(AnimationState::Run));
        follow.push_goal(ActorId::new(9), Position::new(50.0, 0.0), None);

        assert_eq!(follow.advance(&mut stage), 0);
        assert_eq!(
            stage.actors().get(ActorId::new(2)).unwrap().animation(),
            AnimationState::Idle
        );
        assert!(follow.is_empty());
    }
}
