use crate::ring::PedInterval;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logic invariants the state machine must never break. Reaching one of these
/// is a bug in the controller, not an operator mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("ring {ring}: pedestrian interval {interval:?} has no running timer")]
    PedIntervalWithoutTimer { ring: usize, interval: PedInterval },

    #[error("ring {ring}: pedestrian timer running with no pedestrian interval")]
    PedTimerWithoutInterval { ring: usize },

    #[error("ring {ring}: phase {phase} is outside the ring")]
    PhaseOutsideRing { ring: usize, phase: u8 },

    #[error("ring {ring}: next-phase resolver found no applicable barrier case")]
    NextPhaseUnresolved { ring: usize },
}

/// What to do when an invariant breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantPolicy {
    /// Fail fast; used by tests and verification builds.
    Panic,
    /// Log, count, and fall back to "no next phase, head for red rest".
    Degrade,
}

impl Default for InvariantPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Degrade
        }
    }
}
