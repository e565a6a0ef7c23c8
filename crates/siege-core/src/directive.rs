//! Directives produced by the reconciler
//!
//! A directive is a single operation on the stage. Movement and attacks
//! carry continuations (`then`), which run exactly once when the actor
//! arrives or the attack completes.

use crate::actor::{AnimationState, AttackOptions};
use crate::identity::{ActorId, TargetId};
use crate::scene::{EffectKind, Tint};
use crate::time::Millis;
use serde::{Deserialize, Serialize};

/// An operation to be executed by the stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    /// Walk to a target, then run `then` on arrival
    MoveTo {
        actor: ActorId,
        target: TargetId,
        then: Vec<Directive>,
    },

    /// Start attacking a target, then run `then` when the attack stops
    Attack {
        actor: ActorId,
        target: TargetId,
        options: AttackOptions,
        then: Vec<Directive>,
    },

    /// Stop the actor's current attack
    StopAttack { actor: ActorId },

    /// Play a one-shot effect at a target
    SpawnEffect { target: TargetId, effect: EffectKind },

    /// Tint a target
    Highlight { target: TargetId, tint: Tint },

    /// Start toggling a target's alpha on behalf of an actor
    StartBlink { actor: ActorId, target: TargetId },

    /// Stop the actor's blink
    StopBlink { actor: ActorId },

    /// Reset a target's tint, alpha and shake
    ReleaseTarget { target: TargetId },

    /// Switch an actor's animation
    SetAnimation {
        actor: ActorId,
        state: AnimationState,
    },

    /// Run `then` after a delay, on behalf of an actor
    ///
    /// The delay is owned by the actor: a later move or attack cancels it.
    After {
        actor: ActorId,
        delay_ms: Millis,
        then: Vec<Directive>,
    },
}

impl Directive {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Directive::MoveTo { .. } => "move_to",
            Directive::Attack { .. } => "attack",
            Directive::StopAttack { .. } => "stop_attack",
            Directive::SpawnEffect { .. } => "spawn_effect",
            Directive::Highlight { .. } => "highlight",
            Directive::StartBlink { .. } => "start_blink",
            Directive::StopBlink { .. } => "stop_blink",
            Directive::ReleaseTarget { .. } => "release_target",
            Directive::SetAnimation { .. } => "set_animation",
            Directive::After { .. } => "after",
        }
    }

    /// Nested continuation, if any
    pub fn continuation(&self) -> &[Directive] {
        match self {
            Directive::MoveTo { then, .. }
            | Directive::Attack { then, .. }
            | Directive::After { then, .. } => then,
            _ => &[],
        }
    }

    /// Visit every directive in a list, depth first, continuations included
    pub fn walk<'a>(directives: &'a [Directive], visit: &mut impl FnMut(&'a Directive)) {
        for directive in directives {
            visit(directive);
            Self::walk(directive.continuation(), visit);
        }
    }

    /// Count directives, continuations included, that satisfy a predicate
    pub fn count_where(directives: &[Directive], predicate: impl Fn(&Directive) -> bool) -> usize {
        let mut count = 0;
        Self::walk(directives, &mut |d| {
            if predicate(d) {
                count += 1;
            }
        });
        count
    }
}
