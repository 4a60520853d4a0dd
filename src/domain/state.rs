use serde::{Deserialize, Serialize};
use std::fmt;

/// Game loop controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopState {
    /// Constructed, loop not started
    Idle,
    /// Waiting for the next change notification, nothing in flight
    AwaitingChange,
    /// Handling a notification or a freshly fetched snapshot
    Evaluating,
    /// A decision task is thinking
    AwaitingDecision,
    /// A chosen move is being written to the store
    Submitting,
    /// Loop exited
    Terminated,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "IDLE",
            LoopState::AwaitingChange => "AWAITING_CHANGE",
            LoopState::Evaluating => "EVALUATING",
            LoopState::AwaitingDecision => "AWAITING_DECISION",
            LoopState::Submitting => "SUBMITTING",
            LoopState::Terminated => "TERMINATED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: LoopState) -> bool {
        use LoopState::*;

        match (self, target) {
            // Startup evaluates the initial snapshot
            (Idle, Evaluating) => true,
            (Idle, Terminated) => true,

            (AwaitingChange, Evaluating) => true,

            // Resting states after an evaluation
            (Evaluating, AwaitingChange) => true,
            (Evaluating, AwaitingDecision) => true,
            (Evaluating, Submitting) => true,

            // Notifications keep arriving while a decision is in flight
            (AwaitingDecision, Evaluating) => true,
            (AwaitingDecision, Submitting) => true,
            (AwaitingDecision, AwaitingChange) => true,

            (Submitting, Evaluating) => true,
            (Submitting, AwaitingChange) => true,

            (Terminated, _) => false,
            (_, Terminated) => true,

            _ => false,
        }
    }

    /// Is a decision task alive in this state?
    pub fn has_decision_in_flight(&self) -> bool {
        matches!(self, LoopState::AwaitingDecision | LoopState::Submitting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Terminated)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
