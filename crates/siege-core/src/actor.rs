//! Actors: animated contestants on the map
//!
//! An actor owns its motion, its attack and its blink, each of which is
//! superseded atomically by a newer one. Continuations attached to motion
//! and attacks are released into the actor's outbox exactly once; the stage
//! drains the outbox and executes them.

use crate::config::EngineConfig;
use crate::directive::Directive;
use crate::geometry::Position;
use crate::identity::{ActorId, TargetId};
use crate::scene::{NodeId, NodeKind, Scene};
use crate::target::Target;
use crate::time::Millis;
use crate::timers::{TimerHandle, TimerRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sprite animation an actor can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AnimationState {
    #[default]
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "run")]
    Run,
    #[serde(rename = "attack_1")]
    Attack1,
    #[serde(rename = "attack_2")]
    Attack2,
    #[serde(rename = "attack_3")]
    Attack3,
    #[serde(rename = "attack_4")]
    Attack4,
    #[serde(rename = "attack_5")]
    Attack5,
    #[serde(rename = "attack_6")]
    Attack6,
}

impl AnimationState {
    pub const ALL: [AnimationState; 8] = [
        AnimationState::Idle,
        AnimationState::Run,
        AnimationState::Attack1,
        AnimationState::Attack2,
        AnimationState::Attack3,
        AnimationState::Attack4,
        AnimationState::Attack5,
        AnimationState::Attack6,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationState::Idle => "idle",
            AnimationState::Run => "run",
            AnimationState::Attack1 => "attack_1",
            AnimationState::Attack2 => "attack_2",
            AnimationState::Attack3 => "attack_3",
            AnimationState::Attack4 => "attack_4",
            AnimationState::Attack5 => "attack_5",
            AnimationState::Attack6 => "attack_6",
        }
    }

    pub fn is_attack(&self) -> bool {
        !matches!(self, AnimationState::Idle | AnimationState::Run)
    }
}

impl fmt::Display for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == wanted || state.as_str().replace('_', "") == wanted)
            .ok_or_else(|| format!("unknown animation '{}'", s))
    }
}

/// How an attack is played
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackOptions {
    /// Periodically shake the target while attacking
    pub shake: bool,
    pub variant: AnimationState,
}

impl AttackOptions {
    /// Default variant with target shaking
    pub fn shake() -> Self {
        Self {
            shake: true,
            ..Self::default()
        }
    }
}

impl Default for AttackOptions {
    fn default() -> Self {
        Self {
            shake: false,
            variant: AnimationState::Attack2,
        }
    }
}

/// Token identifying one attack; stale tokens stop nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttackToken(u64);

/// Payload of an actor-owned timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorTimer {
    /// Shake the attacked target
    Shake(TargetId),
    /// Toggle the started target's alpha
    Blink(TargetId),
}

#[derive(Debug, Clone)]
struct Motion {
    target: TargetId,
    destination: Position,
    on_arrive: Vec<Directive>,
}

#[derive(Debug, Clone)]
struct Attack {
    generation: u64,
    target: TargetId,
    shake_timer: Option<TimerHandle>,
    on_complete: Vec<Directive>,
}

#[derive(Debug, Clone, Copy)]
struct Blink {
    target: TargetId,
    timer: TimerHandle,
}

#[derive(Debug, Clone, Copy)]
struct Tuning {
    base_speed: f64,
    arrive_radius: f64,
    animation_rate: f64,
    shake_interval_ms: Millis,
    blink_interval_ms: Millis,
}

/// One animated contestant
#[derive(Debug, Clone)]
pub struct Actor {
    id: ActorId,
    name: String,
    node: NodeId,
    position: Position,
    facing_left: bool,
    animation: AnimationState,
    speed: f64,
    active_target: Option<TargetId>,
    motion: Option<Motion>,
    attack: Option<Attack>,
    blink: Option<Blink>,
    attack_generation: u64,
    timers: TimerRegistry<ActorTimer>,
    outbox: Vec<Directive>,
    tuning: Tuning,
}

impl Actor {
    /// Create an idle actor and its scene node
    pub fn create(
        id: ActorId,
        name: impl Into<String>,
        position: Position,
        speed: f64,
        config: &EngineConfig,
        scene: &mut dyn Scene,
    ) -> Self {
        let name = name.into();
        let tuning = Tuning {
            base_speed: config.motion.base_speed,
            arrive_radius: config.motion.arrive_radius,
            animation_rate: config.motion.animation_rate,
            shake_interval_ms: config.effects.shake_interval_ms,
            blink_interval_ms: config.effects.blink_interval_ms,
        };
        let node = scene.create_node(NodeKind::Actor, &name, position);
        scene.play_animation(node, AnimationState::Idle, tuning.animation_rate * speed);
        tracing::debug!(actor = %id, name = %name, %position, "actor created");

        Self {
            id,
            name,
            node,
            position,
            facing_left: false,
            animation: AnimationState::Idle,
            speed,
            active_target: None,
            motion: None,
            attack: None,
            blink: None,
            attack_generation: 0,
            timers: TimerRegistry::new(),
            outbox: Vec::new(),
            tuning,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn animation(&self) -> AnimationState {
        self.animation
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn active_target(&self) -> Option<TargetId> {
        self.active_target
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_some()
    }

    pub fn is_attacking(&self) -> bool {
        self.attack.is_some()
    }

    /// Head for a target, replacing any motion already in progress
    ///
    /// The previous motion's continuation is discarded. Leaving a different
    /// target releases it (stopping an attack on it first). Returns false
    /// and changes nothing when the target is missing.
    pub fn move_to(
        &mut self,
        target: Option<&Target>,
        on_arrive: Vec<Directive>,
        scene: &mut dyn Scene,
    ) -> bool {
        let Some(target) = target else {
            tracing::warn!(actor = %self.id, "move_to without a valid target");
            return false;
        };

        if let Some(previous) = self.motion.take() {
            if !previous.on_arrive.is_empty() {
                tracing::debug!(actor = %self.id, target = %previous.target, "motion superseded");
            }
        }

        if let Some(previous) = self.active_target.filter(|prev| *prev != target.id()) {
            if self.attack.as_ref().is_some_and(|a| a.target == previous) {
                self.stop_attack(scene);
            } else {
                self.outbox.push(Directive::ReleaseTarget { target: previous });
            }
        }

        let destination = target.position();
        self.active_target = Some(target.id());
        self.face_towards(destination, scene);
        self.update_animation_state(AnimationState::Run, scene);
        self.motion = Some(Motion {
            target: target.id(),
            destination,
            on_arrive,
        });
        true
    }

    /// Advance motion by one frame; returns true on the frame of arrival
    pub fn tick_motion(&mut self, scene: &mut dyn Scene) -> bool {
        let Some(motion) = &self.motion else {
            return false;
        };
        let destination = motion.destination;
        let distance = self.position.distance_to(destination);

        if distance > self.tuning.arrive_radius {
            let step = (self.tuning.base_speed * self.speed).min(distance);
            self.position = self.position.step_towards(destination, step);
            self.face_towards(destination, scene);
            scene.set_position(self.node, self.position);
            return false;
        }

        if let Some(motion) = self.motion.take() {
            self.update_animation_state(AnimationState::Idle, scene);
            self.outbox.extend(motion.on_arrive);
        }
        true
    }

    fn face_towards(&mut self, destination: Position, scene: &mut dyn Scene) {
        let dx = destination.x - self.position.x;
        if dx == 0.0 {
            return;
        }
        let left = dx < 0.0;
        if left != self.facing_left {
            self.facing_left = left;
            scene.set_facing(self.node, left);
        }
    }

    /// Start attacking a target, stopping any attack already running
    pub fn perform_attack(
        &mut self,
        target: Option<&Target>,
        options: AttackOptions,
        on_complete: Vec<Directive>,
        now: Millis,
        scene: &mut dyn Scene,
    ) -> Option<AttackToken> {
        let Some(target) = target else {
            tracing::warn!(actor = %self.id, "attack without a valid target");
            return None;
        };

        self.stop_attack(scene);

        self.attack_generation += 1;
        let shake_timer = options.shake.then(|| {
            let period = self.shake_period();
            self.timers
                .schedule_every(now + period, period, ActorTimer::Shake(target.id()))
        });
        self.attack = Some(Attack {
            generation: self.attack_generation,
            target: target.id(),
            shake_timer,
            on_complete,
        });
        self.active_target = Some(target.id());
        self.update_animation_state(options.variant, scene);
        Some(AttackToken(self.attack_generation))
    }

    /// Stop the current attack; a no-op when none is running
    pub fn stop_attack(&mut self, scene: &mut dyn Scene) -> bool {
        let Some(attack) = self.attack.take() else {
            return false;
        };
        if let Some(timer) = attack.shake_timer {
            self.timers.cancel(timer);
        }
        self.outbox.push(Directive::ReleaseTarget {
            target: attack.target,
        });
        self.outbox.extend(attack.on_complete);
        self.update_animation_state(AnimationState::Idle, scene);
        true
    }

    /// Stop the attack identified by `token`; stale tokens do nothing
    pub fn stop(&mut self, token: AttackToken, scene: &mut dyn Scene) -> bool {
        match &self.attack {
            Some(attack) if attack.generation == token.0 => self.stop_attack(scene),
            _ => false,
        }
    }

    fn shake_period(&self) -> Millis {
        self.tuning.shake_interval_ms / self.speed.max(f64::EPSILON)
    }

    /// Rescale animation rate, movement step and the shake trigger
    pub fn set_speed(&mut self, speed: f64, now: Millis, scene: &mut dyn Scene) {
        if speed <= 0.0 || !speed.is_finite() {
            tracing::warn!(actor = %self.id, speed, "ignoring invalid speed");
            return;
        }
        self.speed = speed;
        scene.set_animation_rate(self.node, self.tuning.animation_rate * speed);

        let period = self.shake_period();
        if let Some(attack) = &mut self.attack {
            if let Some(timer) = attack.shake_timer.take() {
                self.timers.cancel(timer);
                attack.shake_timer = Some(self.timers.schedule_every(
                    now + period,
                    period,
                    ActorTimer::Shake(attack.target),
                ));
            }
        }
    }

    /// Switch animation; re-requesting the current state does nothing
    pub fn update_animation_state(&mut self, state: AnimationState, scene: &mut dyn Scene) {
        if self.animation == state {
            return;
        }
        self.animation = state;
        scene.play_animation(self.node, state, self.tuning.animation_rate * self.speed);
    }

    /// Teleport without animation
    pub fn place(&mut self, position: Position, scene: &mut dyn Scene) {
        self.position = position;
        scene.set_position(self.node, position);
    }

    /// Move a fraction of the way towards `goal`, facing it
    ///
    /// Used to smooth positions pushed by other clients. Returns the
    /// remaining distance.
    pub fn glide_towards(&mut self, goal: Position, amount: f64, scene: &mut dyn Scene) -> f64 {
        self.face_towards(goal, scene);
        self.position = self.position.lerp(goal, amount);
        scene.set_position(self.node, self.position);
        self.position.distance_to(goal)
    }

    /// Toggle a target's alpha periodically, replacing any running blink
    pub fn start_blink(&mut self, target: TargetId, now: Millis) -> Option<TargetId> {
        let previous = self.stop_blink();
        let period = self.tuning.blink_interval_ms;
        let timer = self
            .timers
            .schedule_every(now + period, period, ActorTimer::Blink(target));
        self.blink = Some(Blink { target, timer });
        previous
    }

    /// Stop blinking; returns the target whose alpha needs restoring
    pub fn stop_blink(&mut self) -> Option<TargetId> {
        let blink = self.blink.take()?;
        self.timers.cancel(blink.timer);
        Some(blink.target)
    }

    /// Fire due actor timers
    pub fn advance_timers(&mut self, now: Millis) -> Vec<ActorTimer> {
        self.timers
            .drain_due(now)
            .into_iter()
            .map(|(_, timer)| timer)
            .collect()
    }

    /// Shift pending timers (used while playback was paused)
    pub fn postpone_timers(&mut self, delta: Millis) {
        self.timers.postpone(delta);
    }

    /// Take released continuations
    pub fn take_outbox(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Tear down the actor; pending continuations are dropped
    pub fn destroy(mut self, scene: &mut dyn Scene) {
        self.timers.clear();
        self.motion = None;
        self.attack = None;
        self.blink = None;
        self.outbox.clear();
        scene.destroy_node(self.node);
        tracing::debug!(actor = %self.id, "actor destroyed");
    }

    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            name: self.name.clone(),
            position: self.position,
            facing_left: self.facing_left,
            animation: self.animation,
            speed: self.speed,
            active_target: self.active_target,
            moving_to: self.motion.as_ref().map(|m| m.target),
            attacking: self.attack.as_ref().map(|a| a.target),
            blinking: self.blink.map(|b| b.target),
        }
    }
}

/// Observable state of an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub name: String,
    pub position: Position,
    pub facing_left: bool,
    pub animation: AnimationState,
    pub speed: f64,
    pub active_target: Option<TargetId>,
    pub moving_to: Option<TargetId>,
    pub attacking: Option<TargetId>,
    pub blinking: Option<TargetId>,
}
