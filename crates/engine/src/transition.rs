//! TransitionEngine: legality and effect of moving an entry along an edge.

use std::fmt;

use formflow_interchange::Id;

use crate::condition;
use crate::types::{FormVersion, Transition, ValueMap};

/// What applying a transition does to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Terminal: the entry is frozen.
    Complete,
    MoveTo(Id),
    /// Save progress without moving.
    Stay,
}

impl TransitionEffect {
    pub fn of(transition: &Transition) -> TransitionEffect {
        if transition.to_complete {
            TransitionEffect::Complete
        } else if let Some(to) = transition.to_stage_id {
            TransitionEffect::MoveTo(to)
        } else {
            TransitionEffect::Stay
        }
    }

    /// `(current_stage_id, is_complete)` after the effect.
    pub fn apply(self, current_stage_id: Id) -> (Id, bool) {
        match self {
            TransitionEffect::Complete => (current_stage_id, true),
            TransitionEffect::MoveTo(to) => (to, false),
            TransitionEffect::Stay => (current_stage_id, false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    AlreadyComplete,
    /// No transition with this id in the entry's form version.
    NotFound { transition_id: Id },
    /// The transition does not leave the entry's current stage.
    WrongOrigin {
        transition_id: Id,
        from_stage_id: Id,
        current_stage_id: Id,
    },
    /// The transition's guard is false for the merged values.
    GuardFailed { transition_id: Id },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::AlreadyComplete => write!(f, "entry is already complete"),
            TransitionError::NotFound { transition_id } => {
                write!(f, "transition {} not found", transition_id)
            }
            TransitionError::WrongOrigin {
                transition_id,
                from_stage_id,
                current_stage_id,
            } => write!(
                f,
                "transition {} starts at stage {}, entry is at stage {}",
                transition_id, from_stage_id, current_stage_id
            ),
            TransitionError::GuardFailed { transition_id } => {
                write!(f, "condition of transition {} is not met", transition_id)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Check that `transition_id` may be taken from `current_stage_id` and
/// return the transition with its effect.
pub fn resolve_transition<'f>(
    form: &'f FormVersion,
    current_stage_id: Id,
    is_complete: bool,
    transition_id: Id,
    values: &ValueMap,
) -> Result<(&'f Transition, TransitionEffect), TransitionError> {
    if is_complete {
        return Err(TransitionError::AlreadyComplete);
    }
    let transition = form
        .get_transition(transition_id)
        .ok_or(TransitionError::NotFound { transition_id })?;
    if transition.from_stage_id != current_stage_id {
        return Err(TransitionError::WrongOrigin {
            transition_id,
            from_stage_id: transition.from_stage_id,
            current_stage_id,
        });
    }
    if !condition::evaluate(transition.guard.as_ref(), values) {
        return Err(TransitionError::GuardFailed { transition_id });
    }
    Ok((transition, TransitionEffect::of(transition)))
}
