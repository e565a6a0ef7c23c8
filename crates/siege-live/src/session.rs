//! Live session
//!
//! Owns the stage for the live map: other contestants join, move and leave
//! through push messages, action events are reconciled as they arrive, and
//! the local contestant's position is persisted and reported back.

use crate::inbox::Inbox;
use crate::interpolation::Interpolator;
use crate::message::{decode, LiveMessage, OutboundMessage, PositionReport, Presence, PushChannel};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use siege_core::store::{load_json, save_json, LOCAL_ANIMATION_KEY, LOCAL_POSITION_KEY};
use siege_core::{
    decode_batch, sort_events, ActorId, AnimationState, Directive, DroppedEvent, EventSource,
    GameRng, KeyValueStore, Millis, NodeId, Position, Reconciler, Scene, Stage, TargetSnapshot,
    TargetSource,
};
use std::path::Path;

/// Live session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Minimum time between two position reports
    pub report_interval_ms: Millis,
    pub inbox_capacity: usize,
    /// The local actor spawns in `[-w, w) x [-h, h)` when nothing is stored
    pub spawn_half_width: f64,
    pub spawn_half_height: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 100.0,
            inbox_capacity: 256,
            spawn_half_width: 300.0,
            spawn_half_height: 200.0,
        }
    }
}

impl LiveConfig {
    /// Parse from RON; missing fields take their defaults
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: LiveConfig = ron::from_str(source)
            .map_err(|err| Error::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| Error::InvalidConfig(err.to_string()))?;
        Self::from_ron_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.report_interval_ms.is_nan() || self.report_interval_ms < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "report_interval_ms must be non-negative, got {}",
                self.report_interval_ms
            )));
        }
        if self.inbox_capacity == 0 {
            return Err(Error::InvalidConfig("inbox_capacity must be at least 1".into()));
        }
        for (name, value) in [
            ("spawn_half_width", self.spawn_half_width),
            ("spawn_half_height", self.spawn_half_height),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }
}

/// What happened during one live frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveFrameReport {
    /// Messages taken from the inbox
    pub handled: usize,
    /// Actor/target outcomes executed
    pub applied: usize,
    pub dropped: Vec<DroppedEvent>,
    /// Position report due for the channel
    pub outgoing: Option<PositionReport>,
}

/// The live map
#[derive(Debug)]
pub struct LiveSession<S: Scene, K: KeyValueStore> {
    stage: Stage<S>,
    store: K,
    config: LiveConfig,
    reconciler: Reconciler,
    inbox: Inbox,
    follow: Interpolator,
    local: Option<ActorId>,
    rng: GameRng,
    last_report_at: Option<Millis>,
    /// Last persisted position and animation of the local actor
    reported: Option<(Position, AnimationState)>,
    /// Reports are only produced while the channel is up
    connected: bool,
}

impl<S: Scene, K: KeyValueStore> LiveSession<S, K> {
    pub fn new(stage: Stage<S>, store: K, config: LiveConfig) -> Result<Self> {
        config.validate()?;
        let reconciler = Reconciler::new(EventSource::Live, &stage.config().effects);
        let follow = Interpolator::from_motion(&stage.config().motion);
        Ok(Self {
            inbox: Inbox::new(config.inbox_capacity),
            stage,
            store,
            config,
            reconciler,
            follow,
            local: None,
            rng: GameRng::from_clock(),
            last_report_at: None,
            reported: None,
            connected: true,
        })
    }

    /// Builder: fixed seed for the local spawn point
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = GameRng::new(seed);
        self
    }

    pub fn stage(&self) -> &Stage<S> {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage<S> {
        &mut self.stage
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn local_id(&self) -> Option<ActorId> {
        self.local
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Record channel connectivity for shells that drive [`LiveSession::frame`]
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a remote actor is still gliding towards a pushed position
    pub fn is_following(&self, id: ActorId) -> bool {
        self.follow.is_following(id)
    }

    /// Place targets, reusing the layout cached in the session's store
    pub fn initialize_targets(&mut self, source: &mut dyn TargetSource) -> Vec<TargetSnapshot> {
        self.stage.initialize_targets(source, &mut self.store)
    }

    /// Create the local actor at its stored position, or at a random point
    pub fn spawn_local(&mut self, id: ActorId, name: &str) -> Position {
        if let Some(actor) = self.stage.actors().get(id) {
            self.local = Some(id);
            return actor.position();
        }

        let stored: Option<Position> = load_json(&self.store, LOCAL_POSITION_KEY);
        let position = stored.unwrap_or_else(|| {
            Position::new(
                self.rng
                    .range_f64(-self.config.spawn_half_width, self.config.spawn_half_width)
                    .floor(),
                self.rng
                    .range_f64(-self.config.spawn_half_height, self.config.spawn_half_height)
                    .floor(),
            )
        });
        let stored_animation = self
            .store
            .get(LOCAL_ANIMATION_KEY)
            .and_then(|raw| raw.parse::<AnimationState>().ok());
        self.reported = stored.zip(stored_animation);

        self.stage.spawn_actor(id, name, position);
        self.local = Some(id);
        tracing::info!(actor = %id, %position, restored = stored.is_some(), "local actor spawned");
        position
    }

    /// Decode and queue a raw push message
    pub fn receive(&mut self, raw: &str, now: Millis) -> Result<()> {
        let message = decode(raw)?;
        self.enqueue(message, now)
    }

    pub fn enqueue(&mut self, message: LiveMessage, now: Millis) -> Result<()> {
        tracing::trace!(event = message.name(), "message queued");
        self.inbox.push(now, message)
    }

    /// Walk the local actor to a target, as when the target is clicked
    pub fn select_target(&mut self, label: &str, now: Millis) -> bool {
        let Some(actor) = self.local else {
            tracing::warn!(label, "target selected before the local actor spawned");
            return false;
        };
        let Some(target) = self.stage.targets().find_by_label(label).map(|t| t.id()) else {
            tracing::warn!(label, "selected unknown target");
            return false;
        };
        self.stage.execute(
            vec![Directive::MoveTo {
                actor,
                target,
                then: Vec::new(),
            }],
            now,
        );
        true
    }

    /// Show or hide the hover label of a node
    pub fn set_hovered(&mut self, node: NodeId, hovered: bool) -> bool {
        self.stage.set_hovered(node, hovered)
    }

    /// Advance one render frame
    ///
    /// Applies queued messages, smooths remote actors, advances the stage
    /// and decides whether the local position is due for a report.
    pub fn frame(&mut self, now: Millis) -> LiveFrameReport {
        let mut report = LiveFrameReport::default();

        let queued: Vec<_> = self.inbox.drain().collect();
        for entry in queued {
            report.handled += 1;
            self.handle(entry.message, now, &mut report);
        }

        self.follow.advance(&mut self.stage);
        self.stage.frame(now);
        report.outgoing = self.position_report(now);
        report
    }

    /// Exchange messages with a channel and advance one frame
    ///
    /// Reads until the channel is drained or the inbox is full, then sends
    /// the position report, if any. No report is produced while the channel
    /// is down, so the current position goes out once it reconnects.
    pub fn pump<C: PushChannel>(
        &mut self,
        channel: &mut C,
        now: Millis,
    ) -> Result<LiveFrameReport> {
        while !self.inbox.is_full() {
            let raw = match channel.recv() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(err) => return Err(Error::Channel(err.to_string())),
            };
            if let Err(err) = self.receive(&raw, now) {
                tracing::warn!(error = %err, "dropping undecodable message");
            }
        }

        self.connected = channel.is_connected();
        let report = self.frame(now);
        if let Some(outgoing) = &report.outgoing {
            let payload = OutboundMessage::Position(outgoing.clone()).encode()?;
            if let Err(err) = channel.send(&payload) {
                // forget the baseline so the next due frame resends
                self.reported = None;
                return Err(Error::Channel(err.to_string()));
            }
        }
        Ok(report)
    }

    /// Ask the server for everyone currently on the map
    pub fn request_roster<C: PushChannel>(&self, channel: &mut C) -> Result<()> {
        let payload = OutboundMessage::RequestRoster.encode()?;
        channel
            .send(&payload)
            .map_err(|err| Error::Channel(err.to_string()))
    }

    fn handle(&mut self, message: LiveMessage, now: Millis, report: &mut LiveFrameReport) {
        match message {
            LiveMessage::Roster { characters } => {
                for presence in &characters {
                    self.join(presence);
                }
            }
            LiveMessage::Join(presence) => {
                self.join(&presence);
            }
            LiveMessage::Leave { id } => {
                if Some(id) == self.local {
                    tracing::debug!(actor = %id, "ignoring leave for the local actor");
                    return;
                }
                self.follow.remove(id);
                if self.stage.remove_actor(id) {
                    tracing::debug!(actor = %id, "actor left");
                }
            }
            LiveMessage::Moved(update) => {
                if Some(update.id) == self.local || !self.stage.actors().contains(update.id) {
                    return;
                }
                let announced = update.animation_state();
                self.follow.push_goal(update.id, update.position, announced);
                if let Some(state) = announced {
                    self.stage.set_actor_animation(update.id, state);
                }
            }
            LiveMessage::LayoutUpdate { positions } => {
                let (targets, scene) = self.stage.targets_mut();
                let applied = targets.apply_layout_update(&positions, scene);
                tracing::debug!(applied, received = positions.len(), "target layout updated");
            }
            LiveMessage::ChallengeSelected(payload) => {
                if payload.is_null() {
                    tracing::warn!("challenge-selected without events");
                    return;
                }
                let mut events = decode_batch(payload).events;
                sort_events(&mut events);
                let (targets, scene) = self.stage.targets_mut();
                targets.stop_all_shakes(scene);
                let outcome = self.stage.apply_batch(&self.reconciler, &events, now);
                report.applied += outcome.applied;
                report.dropped.extend(outcome.dropped);
            }
        }
    }

    fn join(&mut self, presence: &Presence) -> bool {
        if Some(presence.id) == self.local || self.stage.actors().contains(presence.id) {
            return false;
        }
        let position = presence
            .location()
            .unwrap_or(self.stage.config().motion.spawn_point);
        self.stage
            .spawn_actor(presence.id, &presence.display_name(), position);
        if let Some(state) = presence.animation_state() {
            self.stage.set_actor_animation(presence.id, state);
        }
        tracing::debug!(actor = %presence.id, team = ?presence.team, "actor joined");
        true
    }

    fn position_report(&mut self, now: Millis) -> Option<PositionReport> {
        if !self.connected {
            return None;
        }
        let id = self.local?;
        let actor = self.stage.actors().get(id)?;
        if let Some(last) = self.last_report_at {
            if now - last < self.config.report_interval_ms {
                return None;
            }
        }
        self.last_report_at = Some(now);

        let current = (actor.position(), actor.animation());
        if self.reported == Some(current) {
            return None;
        }
        save_json(&mut self.store, LOCAL_POSITION_KEY, &current.0);
        self.store
            .set(LOCAL_ANIMATION_KEY, current.1.as_str().to_string());
        self.reported = Some(current);

        Some(PositionReport {
            user_id: id,
            position: current.0,
            animation: current.1,
        })
    }

    /// Tear down the stage and hand back the scene and store
    pub fn shutdown(mut self) -> (S, K) {
        self.inbox.clear();
        self.follow.reset();
        tracing::info!("live session shut down");
        (self.stage.into_scene(), self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MemoryChannel;
    use siege_core::{
        DropReason, EngineConfig, MemoryStore, RecordingScene, TargetDescriptor, TargetId,
    };

    const FRAME: Millis = 16.0;

    fn session_with(store: MemoryStore) -> LiveSession<RecordingScene, MemoryStore> {
        let stage = Stage::with_seed(RecordingScene::new(), EngineConfig::default(), 5).unwrap();
        let mut session = LiveSession::new(stage, store, LiveConfig::default())
            .unwrap()
            .with_seed(9);
        session.initialize_targets(&mut vec![
            TargetDescriptor::new(1, "Web"),
            TargetDescriptor::new(2, "Crypto"),
        ]);
        session
    }

    fn session() -> LiveSession<RecordingScene, MemoryStore> {
        session_with(MemoryStore::new())
    }

    fn far_away_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.set(LOCAL_POSITION_KEY, r#"{"x": 5000.0, "y": 5000.0}"#.into());
        store
    }

    fn join(id: u64) -> String {
        format!(r#"{{"event": "add-character-to-map", "data": {{"id": {id}, "name": "player {id}", "x": 0, "y": 0}}}}"#)
    }

    #[test]
    fn test_config_validation() {
        assert!(LiveConfig::default().validate().is_ok());
        let config = LiveConfig::from_ron_str("(report_interval_ms: 250.0)").unwrap();
        assert_eq!(config.report_interval_ms, 250.0);
        assert_eq!(config.inbox_capacity, 256);
        assert!(matches!(
            LiveConfig::from_ron_str("(inbox_capacity: 0)"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_spawn_local_from_store_or_random() {
        let mut restored = session_with(far_away_store());
        let position = restored.spawn_local(ActorId::new(1), "me");
        assert_eq!(position, Position::new(5000.0, 5000.0));

        let mut fresh = session();
        let position = fresh.spawn_local(ActorId::new(1), "me");
        assert!(position.x >= -300.0 && position.x < 300.0);
        assert!(position.y >= -200.0 && position.y < 200.0);
        assert_eq!(position.x.fract(), 0.0);
        assert_eq!(fresh.local_id(), Some(ActorId::new(1)));
    }

    #[test]
    fn test_roster_skips_self_and_duplicates() {
        let mut s = session();
        s.spawn_local(ActorId::new(1), "me");
        s.receive(
            r#"{"event": "all-characters", "data": {"characters": [
                {"id": 1, "name": "me"},
                {"id": 2, "name": "bob", "x": 10, "y": 10},
                {"id": 2, "name": "bob again"},
                {"id": 3, "name": "carol", "animation": "attack_1"}
            ]}}"#,
            0.0,
        )
        .unwrap();
        let report = s.frame(FRAME);

        assert_eq!(report.handled, 1);
        assert_eq!(s.stage().actors().len(), 3);
        assert_eq!(s.stage().actors().get(ActorId::new(2)).unwrap().name(), "bob");
        assert_eq!(
            s.stage().actors().get(ActorId::new(3)).unwrap().animation(),
            AnimationState::Attack1
        );
    }

    #[test]
    fn test_leave_removes_remote_only() {
        let mut s = session();
        s.spawn_local(ActorId::new(1), "me");
        s.receive(&join(2), 0.0).unwrap();
        s.frame(FRAME);

        s.receive(r#"{"event": "remove-character-from-map", "data": {"id": 2}}"#, 0.0)
            .unwrap();
        s.receive(r#"{"event": "remove-character-from-map", "data": {"id": 1}}"#, 0.0)
            .unwrap();
        s.frame(2.0 * FRAME);

        assert!(!s.stage().actors().contains(ActorId::new(2)));
        assert!(s.stage().actors().contains(ActorId::new(1)));
    }

    #[test]
    fn test_remote_position_smoothed() {
        let mut s = session();
        s.receive(&join(2), 0.0).unwrap();
        s.frame(FRAME);
        s.receive(
            r#"{"event": "update-character-position", "data": {"id": 2, "position": {"x": 100, "y": 0}, "animation": "run"}}"#,
            FRAME,
        )
        .unwrap();
        s.frame(2.0 * FRAME);

        let bob = s.stage().actors().get(ActorId::new(2)).unwrap();
        assert!((bob.position().x - 10.0).abs() < 1e-9);
        assert_eq!(bob.animation(), AnimationState::Run);

        let mut now = 2.0 * FRAME;
        for _ in 0..60 {
            now += FRAME;
            s.frame(now);
        }
        let bob = s.stage().actors().get(ActorId::new(2)).unwrap();
        assert!(bob.position().distance_to(Position::new(100.0, 0.0)) <= 1.0);
        assert_eq!(bob.animation(), AnimationState::Idle);
        assert!(!s.is_following(ActorId::new(2)));
    }

    #[test]
    fn test_layout_update() {
        let mut s = session();
        s.receive(
            r#"{"event": "update-challenge-positions", "data": {"positions": [
                {"id": 1, "x": 5, "y": 6},
                {"id": 99, "x": 0, "y": 0}
            ]}}"#,
            0.0,
        )
        .unwrap();
        s.frame(FRAME);
        let web = s.stage().targets().get(TargetId::new(1)).unwrap();
        assert_eq!(web.position(), Position::new(5.0, 6.0));
    }

    #[test]
    fn test_challenge_selected_requires_joined_actor() {
        let mut s = session();
        s.receive(&join(2), 0.0).unwrap();
        s.receive(
            r#"{"event": "challenge-selected", "data": [
                {"userId": 2, "userName": "player 2", "topicName": "Web", "actionType": 1, "actionDate": "2024-05-01T10:00:00Z"},
                {"userId": 9, "userName": "ghost", "topicName": "Web", "actionType": 1, "actionDate": "2024-05-01T10:00:00Z"}
            ]}"#,
            0.0,
        )
        .unwrap();
        let report = s.frame(FRAME);

        assert_eq!(report.applied, 1);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].reason, DropReason::UnknownActor);
        assert!(!s.stage().actors().contains(ActorId::new(9)));

        let bob = s.stage().actors().get(ActorId::new(2)).unwrap();
        assert_eq!(bob.active_target(), Some(TargetId::new(1)));
    }

    #[test]
    fn test_select_target() {
        let mut s = session_with(far_away_store());
        assert!(!s.select_target("Web", 0.0));

        s.spawn_local(ActorId::new(1), "me");
        assert!(!s.select_target("Forensics", 0.0));
        assert!(s.select_target("web", 0.0));

        s.frame(FRAME);
        let me = s.stage().actors().get(ActorId::new(1)).unwrap();
        assert!(me.is_moving());
        assert_eq!(me.animation(), AnimationState::Run);
    }

    #[test]
    fn test_position_report_throttled_and_persisted() {
        let mut s = session_with(far_away_store());
        s.spawn_local(ActorId::new(1), "me");

        // stored animation is missing, so the first frame reports
        let first = s.frame(0.0).outgoing.unwrap();
        assert_eq!(first.position, Position::new(5000.0, 5000.0));
        assert_eq!(first.animation, AnimationState::Idle);
        assert_eq!(s.store().get(LOCAL_ANIMATION_KEY).as_deref(), Some("idle"));

        assert!(s.frame(50.0).outgoing.is_none());
        // due but unchanged
        assert!(s.frame(100.0).outgoing.is_none());

        s.select_target("Web", 100.0);
        assert!(s.frame(116.0).outgoing.is_none());
        let moved = s.frame(200.0).outgoing.unwrap();
        assert_eq!(moved.animation, AnimationState::Run);
        assert_ne!(moved.position, first.position);

        let stored: Position = load_json(s.store(), LOCAL_POSITION_KEY).unwrap();
        assert!(stored.distance_to(moved.position) < 1e-6);
    }

    #[test]
    fn test_pump_with_channel() {
        let mut s = session_with(far_away_store());
        s.spawn_local(ActorId::new(1), "me");
        let mut channel = MemoryChannel::new();
        s.request_roster(&mut channel).unwrap();

        channel.deliver(join(2));
        channel.deliver("garbage");
        let report = s.pump(&mut channel, 0.0).unwrap();

        assert_eq!(report.handled, 1);
        assert!(s.stage().actors().contains(ActorId::new(2)));
        assert_eq!(channel.sent().len(), 2);
        assert!(channel.sent()[1].starts_with(r#"{"event":"update-character-position""#));

        // nothing is reported while disconnected
        channel.set_connected(false);
        s.select_target("Crypto", 0.0);
        let report = s.pump(&mut channel, 150.0).unwrap();
        assert!(report.outgoing.is_none());
        assert_eq!(channel.sent().len(), 2);

        channel.set_connected(true);
        let report = s.pump(&mut channel, 300.0).unwrap();
        assert_eq!(report.outgoing.unwrap().animation, AnimationState::Run);
        assert_eq!(channel.sent().len(), 3);
    }

    #[test]
    fn test_spawn_position_sent_after_reconnect() {
        let mut s = session_with(far_away_store());
        s.spawn_local(ActorId::new(1), "me");
        let mut channel = MemoryChannel::new();

        channel.set_connected(false);
        assert!(s.pump(&mut channel, 0.0).unwrap().outgoing.is_none());
        assert!(!s.is_connected());
        assert!(s.store().get(LOCAL_ANIMATION_KEY).is_none());

        channel.set_connected(true);
        let report = s.pump(&mut channel, 150.0).unwrap();
        assert_eq!(report.outgoing.unwrap().position, Position::new(5000.0, 5000.0));
        assert_eq!(channel.sent().len(), 1);
        assert_eq!(s.store().get(LOCAL_ANIMATION_KEY).as_deref(), Some("idle"));
    }

    #[test]
    fn test_action_batch_clears_shakes() {
        let mut s = session();
        s.receive(&join(2), 0.0).unwrap();
        s.frame(FRAME);
        let web = TargetId::new(1);
        let (targets, _) = s.stage_mut().targets_mut();
        targets.start_shake(web, FRAME);

        s.receive(
            r#"{"event": "challenge-selected", "data": {"userId": 2, "topicName": "Crypto", "actionType": 6, "actionDate": "2024-05-01T10:00:00Z"}}"#,
            2.0 * FRAME,
        )
        .unwrap();
        let report = s.frame(2.0 * FRAME);
        assert_eq!(report.applied, 1);
        assert!(!s.stage().targets().get(web).unwrap().is_shaking());
    }

    #[test]
    fn test_inbox_overflow() {
        let stage = Stage::with_seed(RecordingScene::new(), EngineConfig::default(), 5).unwrap();
        let config = LiveConfig {
            inbox_capacity: 1,
            ..LiveConfig::default()
        };
        let mut s = LiveSession::new(stage, MemoryStore::new(), config).unwrap();
        s.receive(&join(2), 0.0).unwrap();
        assert!(matches!(s.receive(&join(3), 0.0), Err(Error::InboxFull)));
        assert_eq!(s.inbox_len(), 1);
    }

    #[test]
    fn test_shutdown_clears_scene() {
        let mut s = session();
        s.receive(&join(2), 0.0).unwrap();
        s.frame(FRAME);
        let (scene, _store) = s.shutdown();
        assert_eq!(scene.count(siege_core::NodeKind::Actor), 0);
    }
}
