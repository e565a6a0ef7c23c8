//! The stage: shared scene state driven by both event channels
//!
//! A `Stage` owns the scene, the target registry, the actor pool and the
//! delayed directives. The embedding shell calls [`Stage::frame`] once per
//! render frame; replay and live sessions feed it events through
//! [`Stage::apply_batch`].

use crate::actor::{ActorSnapshot, ActorTimer, AnimationState};
use crate::config::EngineConfig;
use crate::directive::Directive;
use crate::error::Result;
use crate::event::DomainEvent;
use crate::geometry::Position;
use crate::identity::{ActorId, TargetId};
use crate::pool::ActorPool;
use crate::reconcile::{DroppedEvent, Reconciler};
use crate::rng::GameRng;
use crate::scene::{EffectKind, NodeId, Scene};
use crate::store::KeyValueStore;
use crate::target::{TargetRegistry, TargetSnapshot, TargetSource};
use crate::time::Millis;
use crate::timers::TimerRegistry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Result of applying a batch of events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Actor/target outcomes that were executed
    pub applied: usize,
    pub dropped: Vec<DroppedEvent>,
}

impl BatchOutcome {
    pub fn merge(&mut self, other: BatchOutcome) {
        self.applied += other.applied;
        self.dropped.extend(other.dropped);
    }
}

/// Observable state of the whole stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub actors: Vec<ActorSnapshot>,
    pub targets: Vec<TargetSnapshot>,
    /// Delayed directive lists not yet run
    pub pending: usize,
}

/// Scene state shared by the replay and live channels
#[derive(Debug)]
pub struct Stage<S: Scene> {
    scene: S,
    config: EngineConfig,
    targets: TargetRegistry,
    actors: ActorPool,
    /// Delayed directive lists, keyed by the actor that owns them
    pending: TimerRegistry<(ActorId, Vec<Directive>)>,
    unavailable_effects: Vec<EffectKind>,
    rng: GameRng,
}

impl<S: Scene> Stage<S> {
    /// Initialize the scene and load effects
    ///
    /// Scene initialization failure is the only error; an effect that fails
    /// to load is replaced by a color tint.
    pub fn new(scene: S, config: EngineConfig) -> Result<Self> {
        Self::with_rng(scene, config, GameRng::from_clock())
    }

    /// Like [`Stage::new`] with a fixed seed for layout and jitter
    pub fn with_seed(scene: S, config: EngineConfig, seed: u64) -> Result<Self> {
        Self::with_rng(scene, config, GameRng::new(seed))
    }

    fn with_rng(mut scene: S, config: EngineConfig, rng: GameRng) -> Result<Self> {
        config.validate()?;
        scene.init()?;

        let mut unavailable_effects = Vec::new();
        for effect in [EffectKind::Success, EffectKind::Failure] {
            if let Err(err) = scene.load_effect(effect) {
                tracing::warn!(?effect, error = %err, "effect unavailable; using tint fallback");
                unavailable_effects.push(effect);
            }
        }

        tracing::info!("stage initialized");
        Ok(Self {
            scene,
            targets: TargetRegistry::new(config.layout.clone(), config.effects.clone()),
            actors: ActorPool::new(),
            pending: TimerRegistry::new(),
            unavailable_effects,
            rng,
            config,
        })
    }

    /// Place targets using the current wall-clock time for cache freshness
    pub fn initialize_targets(
        &mut self,
        source: &mut dyn TargetSource,
        store: &mut dyn KeyValueStore,
    ) -> Vec<TargetSnapshot> {
        self.initialize_targets_at(source, store, chrono::Utc::now().timestamp_millis())
    }

    pub fn initialize_targets_at(
        &mut self,
        source: &mut dyn TargetSource,
        store: &mut dyn KeyValueStore,
        now_epoch_ms: i64,
    ) -> Vec<TargetSnapshot> {
        self.targets
            .initialize(source, store, &mut self.scene, &mut self.rng, now_epoch_ms)
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> (&mut TargetRegistry, &mut S) {
        (&mut self.targets, &mut self.scene)
    }

    pub fn actors(&self) -> &ActorPool {
        &self.actors
    }

    pub fn effect_available(&self, effect: EffectKind) -> bool {
        !self.unavailable_effects.contains(&effect)
    }

    /// Reconcile and execute a batch of simultaneous events
    pub fn apply_batch(
        &mut self,
        reconciler: &Reconciler,
        events: &[DomainEvent],
        now: Millis,
    ) -> BatchOutcome {
        let actors = &self.actors;
        let plan = reconciler.plan_batch(events, &self.targets, |id| actors.contains(id));

        let mut outcome = BatchOutcome {
            applied: 0,
            dropped: plan.dropped,
        };
        for step in plan.steps {
            if reconciler.creates_actors() {
                self.actors.get_or_create(
                    step.actor,
                    &step.actor_name,
                    self.config.motion.spawn_point,
                    &self.config,
                    &mut self.scene,
                );
            }
            self.execute(step.directives, now);
            outcome.applied += 1;
        }
        outcome
    }

    /// Reconcile and execute a single event
    pub fn apply_event(
        &mut self,
        reconciler: &Reconciler,
        event: &DomainEvent,
        now: Millis,
    ) -> BatchOutcome {
        self.apply_batch(reconciler, std::slice::from_ref(event), now)
    }

    /// Execute directives, running released continuations immediately after
    /// the directive that released them
    pub fn execute(&mut self, directives: Vec<Directive>, now: Millis) {
        let mut queue: VecDeque<Directive> = directives.into();
        while let Some(directive) = queue.pop_front() {
            let released = self.run(directive, now);
            for follow_up in released.into_iter().rev() {
                queue.push_front(follow_up);
            }
        }
    }

    fn run(&mut self, directive: Directive, now: Millis) -> Vec<Directive> {
        tracing::trace!(directive = directive.name(), "executing");
        match directive {
            Directive::SpawnEffect { target, effect } => {
                self.spawn_effect(target, effect);
                Vec::new()
            }
            Directive::Highlight { target, tint } => {
                self.targets.highlight(target, tint, &mut self.scene);
                Vec::new()
            }
            Directive::ReleaseTarget { target } => {
                self.targets.release(target, &mut self.scene);
                Vec::new()
            }
            Directive::After {
                actor,
                delay_ms,
                then,
            } => {
                self.pending.schedule_once(now + delay_ms, (actor, then));
                Vec::new()
            }
            Directive::MoveTo { actor, target, then } => {
                self.cancel_pending_for(actor);
                let Some(a) = self.actors.get_mut(actor) else {
                    return missing_actor(actor, "move_to");
                };
                a.move_to(self.targets.get(target), then, &mut self.scene);
                a.take_outbox()
            }
            Directive::Attack {
                actor,
                target,
                options,
                then,
            } => {
                self.cancel_pending_for(actor);
                let Some(a) = self.actors.get_mut(actor) else {
                    return missing_actor(actor, "attack");
                };
                a.perform_attack(self.targets.get(target), options, then, now, &mut self.scene);
                a.take_outbox()
            }
            Directive::StopAttack { actor } => {
                let Some(a) = self.actors.get_mut(actor) else {
                    return missing_actor(actor, "stop_attack");
                };
                a.stop_attack(&mut self.scene);
                a.take_outbox()
            }
            Directive::StartBlink { actor, target } => {
                let Some(a) = self.actors.get_mut(actor) else {
                    return missing_actor(actor, "start_blink");
                };
                if let Some(previous) = a.start_blink(target, now) {
                    self.targets.set_alpha(previous, 1.0, &mut self.scene);
                }
                Vec::new()
            }
            Directive::StopBlink { actor } => {
                let Some(a) = self.actors.get_mut(actor) else {
                    return missing_actor(actor, "stop_blink");
                };
                if let Some(target) = a.stop_blink() {
                    self.targets.set_alpha(target, 1.0, &mut self.scene);
                }
                Vec::new()
            }
            Directive::SetAnimation { actor, state } => {
                let Some(a) = self.actors.get_mut(actor) else {
                    return missing_actor(actor, "set_animation");
                };
                a.update_animation_state(state, &mut self.scene);
                Vec::new()
            }
        }
    }

    /// Drop delayed directives a new command supersedes
    fn cancel_pending_for(&mut self, actor: ActorId) {
        let cancelled = self.pending.cancel_where(|(owner, _)| *owner == actor);
        if cancelled > 0 {
            tracing::debug!(%actor, cancelled, "superseded delayed directives");
        }
    }

    fn spawn_effect(&mut self, target: TargetId, effect: EffectKind) {
        let Some(position) = self.targets.get(target).map(|t| t.position()) else {
            tracing::warn!(%target, ?effect, "effect for unknown target");
            return;
        };
        let played = self.effect_available(effect)
            && match self.scene.spawn_effect(effect, position) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(%target, error = %err, "effect failed; using tint fallback");
                    false
                }
            };
        if !played {
            self.targets
                .highlight(target, effect.fallback_tint(), &mut self.scene);
        }
    }

    /// Advance one render frame
    ///
    /// Runs delayed directives, actor timers, movement and target shake, in
    /// that order.
    pub fn frame(&mut self, now: Millis) {
        for (_, (_, directives)) in self.pending.drain_due(now) {
            self.execute(directives, now);
        }

        for id in self.actors.ids() {
            let fired = match self.actors.get_mut(id) {
                Some(actor) => actor.advance_timers(now),
                None => continue,
            };
            for timer in fired {
                match timer {
                    ActorTimer::Shake(target) => self.targets.start_shake(target, now),
                    ActorTimer::Blink(target) => self.targets.toggle_alpha(target, &mut self.scene),
                }
            }
        }

        for id in self.actors.ids() {
            let released = match self.actors.get_mut(id) {
                Some(actor) => {
                    actor.tick_motion(&mut self.scene);
                    actor.take_outbox()
                }
                None => continue,
            };
            if !released.is_empty() {
                self.execute(released, now);
            }
        }

        self.targets.frame(&mut self.scene, &mut self.rng, now);
    }

    /// Broadcast a playback speed to every actor
    pub fn set_speed(&mut self, speed: f64, now: Millis) {
        self.actors.set_speed_all(speed, now, &mut self.scene);
    }

    /// Create an actor if absent; returns true when it was created
    pub fn spawn_actor(&mut self, id: ActorId, name: &str, position: Position) -> bool {
        if self.actors.contains(id) {
            return false;
        }
        self.actors
            .get_or_create(id, name, position, &self.config, &mut self.scene);
        true
    }

    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        self.cancel_pending_for(id);
        self.actors.remove(id, &mut self.scene)
    }

    /// Teleport an actor
    pub fn place_actor(&mut self, id: ActorId, position: Position) -> bool {
        match self.actors.get_mut(id) {
            Some(actor) => {
                actor.place(position, &mut self.scene);
                true
            }
            None => false,
        }
    }

    /// Lerp an actor towards `goal`; `None` when the actor is unknown
    pub fn glide_actor(&mut self, id: ActorId, goal: Position, amount: f64) -> Option<f64> {
        let actor = self.actors.get_mut(id)?;
        Some(actor.glide_towards(goal, amount, &mut self.scene))
    }

    pub fn set_actor_animation(&mut self, id: ActorId, state: AnimationState) -> bool {
        match self.actors.get_mut(id) {
            Some(actor) => {
                actor.update_animation_state(state, &mut self.scene);
                true
            }
            None => false,
        }
    }

    /// Rebuild positional state from a prefix of the log
    ///
    /// Clears everything, then creates each actor that references a known
    /// target and places it at the last such target. No effects, attacks
    /// or continuations are replayed.
    pub fn reconstruct(&mut self, events: &[DomainEvent]) -> usize {
        self.reset();

        let mut last_seen: IndexMap<ActorId, (&str, TargetId)> = IndexMap::new();
        for event in events {
            let Some(target) = event
                .target_label()
                .and_then(|label| self.targets.find_by_label(label))
            else {
                continue;
            };
            last_seen.insert(event.actor_id, (event.actor_name.as_str(), target.id()));
        }

        for (id, (name, target)) in &last_seen {
            let Some(position) = self.targets.get(*target).map(|t| t.position()) else {
                continue;
            };
            let actor = self.actors.get_or_create(
                *id,
                name,
                self.config.motion.spawn_point,
                &self.config,
                &mut self.scene,
            );
            actor.place(position, &mut self.scene);
        }

        tracing::debug!(events = events.len(), actors = last_seen.len(), "stage reconstructed");
        last_seen.len()
    }

    /// Destroy all actors, drop delayed directives and release targets
    pub fn reset(&mut self) {
        self.pending.clear();
        self.actors.reset_all(&mut self.scene);
        self.targets.reset_effects(&mut self.scene);
    }

    /// Shift every pending timer later, e.g. after a pause
    pub fn postpone(&mut self, delta: Millis) {
        self.pending.postpone(delta);
        for actor in self.actors.iter_mut() {
            actor.postpone_timers(delta);
        }
    }

    /// Show or hide the hover label of an actor or target node
    pub fn set_hovered(&mut self, node: NodeId, hovered: bool) -> bool {
        if self.targets.set_hovered(node, hovered, &mut self.scene) {
            return true;
        }
        if self.actors.iter().any(|a| a.node() == node) {
            self.scene.set_label_visible(node, hovered);
            return true;
        }
        false
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            actors: self.actors.snapshots(),
            targets: self.targets.snapshots(),
            pending: self.pending.len(),
        }
    }

    /// Tear everything down and hand the scene back
    pub fn into_scene(mut self) -> S {
        self.reset();
        self.targets.clear(&mut self.scene);
        self.scene
    }
}

fn missing_actor(actor: ActorId, directive: &str) -> Vec<Directive> {
    tracing::warn!(%actor, directive, "directive for unknown actor");
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectConfig;
    use crate::error::Error;
    use crate::event::EventKind;
    use crate::reconcile::{DropReason, EventSource};
    use crate::recording::RecordingScene;
    use crate::scene::{NodeKind, Tint};
    use crate::store::MemoryStore;
    use crate::target::TargetDescriptor;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    const FRAME: Millis = 16.0;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn stage_with(scene: RecordingScene) -> Stage<RecordingScene> {
        let mut stage = Stage::with_seed(scene, EngineConfig::default(), 42).unwrap();
        stage.initialize_targets_at(
            &mut vec![TargetDescriptor::new(1, "Web"), TargetDescriptor::new(2, "Crypto")],
            &mut MemoryStore::new(),
            0,
        );
        stage
    }

    fn event(actor: u64, label: &str, kind: EventKind, secs: i64) -> DomainEvent {
        DomainEvent::new(
            ActorId::new(actor),
            format!("user{}", actor),
            Some(label),
            kind,
            t0() + Duration::seconds(secs),
        )
    }

    /// Run frames until `until`, returning the time reached
    fn run(stage: &mut Stage<RecordingScene>, from: Millis, until: Millis) -> Millis {
        let mut now = from;
        while now < until {
            now += FRAME;
            stage.frame(now);
        }
        now
    }

    #[test]
    fn test_scene_init_failure_propagates() {
        let result = Stage::with_seed(RecordingScene::failing_init(), EngineConfig::default(), 1);
        assert!(matches!(result, Err(Error::SceneInit(_))));
    }

    #[test]
    fn test_access_then_correct_spawns_success_once() {
        let mut stage = stage_with(RecordingScene::new());
        let replay = Reconciler::new(EventSource::Replay, &EffectConfig::default());

        let outcome = stage.apply_event(&replay, &event(1, "Web", EventKind::AccessTarget, 0), 0.0);
        assert_eq!(outcome.applied, 1);
        let now = run(&mut stage, 0.0, 3_000.0);
        let actor = stage.actors().get(ActorId::new(1)).unwrap();
        assert_eq!(actor.snapshot().attacking, Some(TargetId::new(1)));

        stage.apply_event(&replay, &event(1, "Web", EventKind::CorrectSubmission, 1), now);
        run(&mut stage, now, now + 200.0);

        let actor = stage.actors().get(ActorId::new(1)).unwrap();
        assert_eq!(actor.animation(), AnimationState::Idle);
        assert!(!actor.is_attacking());
        assert_eq!(stage.scene().effects_spawned(EffectKind::Success), 1);
        assert!(!stage.targets().get(TargetId::new(1)).unwrap().is_shaking());
    }

    #[test]
    fn test_unavailable_effect_falls_back_to_tint() {
        let scene = RecordingScene::new().with_failing_effect(EffectKind::Failure);
        let mut stage = stage_with(scene);
        assert!(!stage.effect_available(EffectKind::Failure));
        let replay = Reconciler::new(EventSource::Replay, &EffectConfig::default());

        stage.apply_event(&replay, &event(1, "Crypto", EventKind::IncorrectSubmission, 0), 0.0);
        run(&mut stage, 0.0, 3_000.0);

        let target = stage.targets().get(TargetId::new(2)).unwrap();
        assert_eq!(target.tint(), Tint::FAILURE);
        assert_eq!(stage.scene().effects_spawned(EffectKind::Failure), 0);
        let actor = stage.actors().get(ActorId::new(1)).unwrap();
        assert_eq!(actor.animation(), AnimationState::Attack2);
    }

    #[test]
    fn test_live_delayed_retry() {
        let mut stage = stage_with(RecordingScene::new());
        let live = Reconciler::new(EventSource::Live, &EffectConfig::default());

        let incorrect = event(5, "Web", EventKind::IncorrectSubmission, 0);
        let dropped = stage.apply_event(&live, &incorrect, 0.0);
        assert_eq!(dropped.applied, 0);
        assert_eq!(dropped.dropped[0].reason, DropReason::UnknownActor);

        let web = stage.targets().get(TargetId::new(1)).unwrap().position();
        stage.spawn_actor(ActorId::new(5), "eve", web);
        stage.apply_event(&live, &event(5, "Web", EventKind::IncorrectSubmission, 0), 0.0);
        run(&mut stage, 0.0, 100.0);
        assert_eq!(stage.pending_len(), 1);
        assert!(!stage.actors().get(ActorId::new(5)).unwrap().is_attacking());

        run(&mut stage, 100.0, 3_200.0);
        assert_eq!(stage.pending_len(), 0);
        assert!(stage.actors().get(ActorId::new(5)).unwrap().is_attacking());
    }

    #[test]
    fn test_new_command_cancels_delayed_retry() {
        let mut stage = stage_with(RecordingScene::new());
        let live = Reconciler::new(EventSource::Live, &EffectConfig::default());
        let web = stage.targets().get(TargetId::new(1)).unwrap().position();
        stage.spawn_actor(ActorId::new(5), "eve", web);

        stage.apply_event(&live, &event(5, "Web", EventKind::IncorrectSubmission, 0), 0.0);
        let now = run(&mut stage, 0.0, 500.0);
        assert_eq!(stage.pending_len(), 1);

        stage.apply_event(&live, &event(5, "Crypto", EventKind::StartTarget, 1), now);
        assert_eq!(stage.pending_len(), 0);

        let mut t = now;
        while t < 6_000.0 {
            t += FRAME;
            stage.frame(t);
            let actor = stage.actors().get(ActorId::new(5)).unwrap();
            assert_ne!(actor.snapshot().attacking, Some(TargetId::new(1)));
        }
        let actor = stage.actors().get(ActorId::new(5)).unwrap();
        assert_eq!(actor.snapshot().blinking, Some(TargetId::new(2)));
        assert!(!stage.targets().get(TargetId::new(1)).unwrap().is_shaking());
    }

    #[test]
    fn test_start_and_stop_blink() {
        let mut stage = stage_with(RecordingScene::new());
        let replay = Reconciler::new(EventSource::Replay, &EffectConfig::default());

        stage.apply_event(&replay, &event(1, "Web", EventKind::StartTarget, 0), 0.0);
        let now = run(&mut stage, 0.0, 3_000.0);
        let web = stage.targets().get(TargetId::new(1)).unwrap();
        assert_eq!(web.tint(), Tint::ACTIVE);
        assert_eq!(
            stage.actors().get(ActorId::new(1)).unwrap().snapshot().blinking,
            Some(TargetId::new(1))
        );

        stage.apply_event(&replay, &event(1, "Web", EventKind::StopTarget, 3), now);
        run(&mut stage, now, now + 100.0);
        let web = stage.targets().get(TargetId::new(1)).unwrap();
        assert_eq!(web.tint(), Tint::WHITE);
        assert_eq!(web.alpha(), 1.0);
        let actor = stage.actors().get(ActorId::new(1)).unwrap();
        assert_eq!(actor.snapshot().blinking, None);
        assert_eq!(actor.animation(), AnimationState::Idle);
    }

    #[test]
    fn test_missing_actor_directive_is_skipped() {
        let mut stage = stage_with(RecordingScene::new());
        stage.execute(
            vec![
                Directive::StopAttack {
                    actor: ActorId::new(99),
                },
                Directive::Highlight {
                    target: TargetId::new(1),
                    tint: Tint::AID,
                },
            ],
            0.0,
        );
        assert_eq!(stage.targets().get(TargetId::new(1)).unwrap().tint(), Tint::AID);
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let mut stage = stage_with(RecordingScene::new());
        let log = vec![
            event(1, "Web", EventKind::AccessTarget, 0),
            event(2, "Crypto", EventKind::AccessTarget, 1),
            event(1, "Crypto", EventKind::CorrectSubmission, 2),
            event(2, "Pwn", EventKind::AccessTarget, 3),
        ];

        assert_eq!(stage.reconstruct(&log), 2);
        let first = stage.snapshot();
        run(&mut stage, 0.0, 500.0);
        stage.reconstruct(&log);
        assert_eq!(stage.snapshot(), first);

        let crypto = stage.targets().get(TargetId::new(2)).unwrap().position();
        for actor in stage.actors().iter() {
            assert_eq!(actor.position(), crypto);
            assert_eq!(actor.animation(), AnimationState::Idle);
        }
        assert_eq!(stage.scene().count(NodeKind::Actor), 2);
    }

    #[test]
    fn test_postpone_delays_pending() {
        let mut stage = stage_with(RecordingScene::new());
        stage.execute(
            vec![Directive::After {
                actor: ActorId::new(1),
                delay_ms: 100.0,
                then: vec![Directive::Highlight {
                    target: TargetId::new(2),
                    tint: Tint::AID,
                }],
            }],
            0.0,
        );
        stage.postpone(1_000.0);
        stage.frame(500.0);
        assert_eq!(stage.targets().get(TargetId::new(2)).unwrap().tint(), Tint::WHITE);
        stage.frame(1_100.0);
        assert_eq!(stage.targets().get(TargetId::new(2)).unwrap().tint(), Tint::AID);
    }

    #[test]
    fn test_reset_and_hover() {
        let mut stage = stage_with(RecordingScene::new());
        stage.spawn_actor(ActorId::new(1), "alice", Position::ORIGIN);
        assert!(!stage.spawn_actor(ActorId::new(1), "alice", Position::ORIGIN));

        let node = stage.actors().get(ActorId::new(1)).unwrap().node();
        assert!(stage.set_hovered(node, true));
        assert!(stage.scene().node(node).unwrap().label_visible);

        stage.reset();
        assert!(stage.actors().is_empty());
        assert!(!stage.set_hovered(node, false));
        assert_eq!(stage.targets().len(), 2);
    }
}
