//! Event reconciliation
//!
//! Maps domain events onto directives. The mapping is pure: it reads the
//! target registry to resolve labels but never mutates anything, so live
//! and replay events produce identical directives for identical input.

use crate::actor::{AnimationState, AttackOptions};
use crate::config::EffectConfig;
use crate::directive::Directive;
use crate::event::{DomainEvent, EventKind};
use crate::identity::{ActorId, TargetId};
use crate::scene::{EffectKind, Tint};
use crate::target::TargetRegistry;
use crate::time::Millis;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where events come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// Push channel; actors must already be present
    Live,
    /// Historical log; actors are created on demand
    Replay,
}

/// Why an event was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// The event names no target
    NoTarget,
    /// No target has the event's label
    UnknownTarget,
    /// The actor is not on the map
    UnknownActor,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::NoTarget => "no target",
            DropReason::UnknownTarget => "unknown target",
            DropReason::UnknownActor => "unknown actor",
        };
        f.write_str(text)
    }
}

/// An event that was skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedEvent {
    pub actor: ActorId,
    pub label: Option<String>,
    pub kind: EventKind,
    pub reason: DropReason,
}

impl DroppedEvent {
    fn new(event: &DomainEvent, reason: DropReason) -> Self {
        tracing::warn!(
            actor = %event.actor_id,
            label = ?event.target_label,
            kind = %event.kind,
            %reason,
            "dropping event"
        );
        Self {
            actor: event.actor_id,
            label: event.target_label.clone(),
            kind: event.kind,
            reason,
        }
    }
}

/// The resolved outcome of one actor/target pair in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub actor: ActorId,
    pub actor_name: String,
    pub target: TargetId,
    pub kind: EventKind,
    pub directives: Vec<Directive>,
}

/// Output of batch reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    pub steps: Vec<PlannedStep>,
    pub dropped: Vec<DroppedEvent>,
}

/// Maps events to directives for one event source
#[derive(Debug, Clone)]
pub struct Reconciler {
    source: EventSource,
    retry_delay_ms: Millis,
}

impl Reconciler {
    pub fn new(source: EventSource, effects: &EffectConfig) -> Self {
        Self {
            source,
            retry_delay_ms: effects.retry_delay(source),
        }
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    /// Whether missing actors are created for this source
    pub fn creates_actors(&self) -> bool {
        self.source == EventSource::Replay
    }

    /// Directives for a single resolved event
    pub fn plan(&self, kind: EventKind, actor: ActorId, target: TargetId) -> Vec<Directive> {
        let attack = || Directive::Attack {
            actor,
            target,
            options: AttackOptions::shake(),
            then: Vec::new(),
        };

        let on_arrive = match kind {
            EventKind::AccessTarget => vec![attack()],
            EventKind::StartTarget => vec![
                Directive::Highlight {
                    target,
                    tint: Tint::ACTIVE,
                },
                Directive::SetAnimation {
                    actor,
                    state: AnimationState::Attack1,
                },
                Directive::StartBlink { actor, target },
            ],
            EventKind::StopTarget => vec![
                Directive::StopBlink { actor },
                Directive::ReleaseTarget { target },
                Directive::SetAnimation {
                    actor,
                    state: AnimationState::Idle,
                },
            ],
            EventKind::CorrectSubmission => vec![
                Directive::StopAttack { actor },
                Directive::SpawnEffect {
                    target,
                    effect: EffectKind::Success,
                },
            ],
            EventKind::IncorrectSubmission => {
                let retry = if self.retry_delay_ms > 0.0 {
                    Directive::After {
                        actor,
                        delay_ms: self.retry_delay_ms,
                        then: vec![attack()],
                    }
                } else {
                    attack()
                };
                vec![
                    Directive::StopAttack { actor },
                    Directive::SpawnEffect {
                        target,
                        effect: EffectKind::Failure,
                    },
                    retry,
                ]
            }
            EventKind::UnlockAid => vec![Directive::Highlight {
                target,
                tint: Tint::AID,
            }],
        };

        vec![Directive::MoveTo {
            actor,
            target,
            then: on_arrive,
        }]
    }

    /// Reconcile a batch of simultaneous events
    ///
    /// Events for the same actor and target collapse to one outcome: the
    /// last submission if there is one, otherwise the last event. Pairs are
    /// emitted in the order they first appear. `actor_known` is consulted
    /// for sources that do not create actors.
    pub fn plan_batch(
        &self,
        events: &[DomainEvent],
        targets: &TargetRegistry,
        actor_known: impl Fn(ActorId) -> bool,
    ) -> BatchPlan {
        let mut plan = BatchPlan::default();
        let mut groups: IndexMap<(ActorId, TargetId), Vec<&DomainEvent>> = IndexMap::new();

        for event in events {
            let Some(label) = event.target_label() else {
                plan.dropped.push(DroppedEvent::new(event, DropReason::NoTarget));
                continue;
            };
            let Some(target) = targets.find_by_label(label) else {
                plan.dropped.push(DroppedEvent::new(event, DropReason::UnknownTarget));
                continue;
            };
            if !self.creates_actors() && !actor_known(event.actor_id) {
                plan.dropped.push(DroppedEvent::new(event, DropReason::UnknownActor));
                continue;
            }
            groups
                .entry((event.actor_id, target.id()))
                .or_default()
                .push(event);
        }

        for ((actor, target), group) in groups {
            let chosen = group
                .iter()
                .rev()
                .find(|e| e.kind.is_terminal())
                .or_else(|| group.last())
                .copied();
            let Some(event) = chosen else {
                continue;
            };
            if group.len() > 1 {
                tracing::debug!(
                    %actor,
                    %target,
                    merged = group.len(),
                    kind = %event.kind,
                    "collapsed simultaneous events"
                );
            }
            plan.steps.push(PlannedStep {
                actor,
                actor_name: event.actor_name.clone(),
                target,
                kind: event.kind,
                directives: self.plan(event.kind, actor, target),
            });
        }

        plan
    }
}
