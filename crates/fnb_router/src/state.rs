//! Per-transaction state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// Lifecycle of one transaction inside the router.
///
/// `Pending -> Running -> {Completed | Rejected | Failed}`. Terminal states
/// accept no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    #[default]
    Pending,
    Running,
    Completed,
    Rejected,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Completed | FlowState::Rejected | FlowState::Failed
        )
    }

    pub fn can_transition_to(&self, next: FlowState) -> bool {
        matches!(
            (self, next),
            (FlowState::Pending, FlowState::Running)
                | (
                    FlowState::Running,
                    FlowState::Completed | FlowState::Rejected | FlowState::Failed
                )
        )
    }

    /// Move to `next`, refusing illegal transitions.
    pub fn advance(&mut self, next: FlowState) -> Result<(), RouterError> {
        if !self.can_transition_to(next) {
            return Err(RouterError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::Pending => "pending",
            FlowState::Running => "running",
            FlowState::Completed => "completed",
            FlowState::Rejected => "rejected",
            FlowState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowOutcome {
    Completed,
    Rejected,
    Failed,
}

impl From<FlowOutcome> for FlowState {
    fn from(outcome: FlowOutcome) -> Self {
        match outcome {
            FlowOutcome::Completed => FlowState::Completed,
            FlowOutcome::Rejected => FlowState::Rejected,
            FlowOutcome::Failed => FlowState::Failed,
        }
    }
}

impl fmt::Display for FlowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        FlowState::from(*self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_lifecycle() {
        let mut state = FlowState::default();
        assert_eq!(state, FlowState::Pending);

        state.advance(FlowState::Running).unwrap();
        state.advance(FlowState::Rejected).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_are_refused() {
        let mut state = FlowState::Pending;
        assert_eq!(
            state.advance(FlowState::Completed),
            Err(RouterError::InvalidTransition {
                from: FlowState::Pending,
                to: FlowState::Completed
            })
        );

        state.advance(FlowState::Running).unwrap();
        state.advance(FlowState::Failed).unwrap();
        assert!(state.advance(FlowState::Running).is_err());
        assert!(state.advance(FlowState::Completed).is_err());
        assert_eq!(state, FlowState::Failed);
    }

    #[test]
    fn test_outcome_maps_to_terminal_state() {
        for outcome in [FlowOutcome::Completed, FlowOutcome::Rejected, FlowOutcome::Failed] {
            assert!(FlowState::from(outcome).is_terminal());
        }
        assert_eq!(
            serde_json::to_string(&FlowOutcome::Rejected).unwrap(),
            "\"REJECTED\""
        );
    }
}
