// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle state machines
//!
//! A lifecycle is a Mealy machine: `(State, Input) → (State, Output)`.
//! Transitions are plain functions of the current state, so callers own
//! the state value and decide where it is stored and how it is locked.
//!
//! The only lifecycle in the hub today is the connection of a
//! cloud-to-cloud subscription, see [`subscription_lifecycle`].

pub mod subscription_lifecycle;

pub use subscription_lifecycle::{ConnectionInput, ConnectionState};

pub type TransitionResult<S> = Result<S, TransitionError>;

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("input {input} is not accepted in state {from}")]
    InvalidTransition { from: String, input: String },

    /// Terminal states accept no input.
    #[error("state {0} is terminal")]
    Terminal(String),
}

pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn accepts(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(inputs: &[ConnectionInput]) -> TransitionResult<ConnectionState> {
        inputs
            .iter()
            .try_fold(ConnectionState::default(), |state, input| {
                state.transition(input).map(|(next, ())| next)
            })
    }

    #[test]
    fn test_reconnect_after_close() {
        use ConnectionInput::*;
        let state = drive(&[BeginConnect, Established, Closed, BeginConnect]).unwrap();
        assert_eq!(state, ConnectionState::Connecting);
        assert!(!state.accepts(&BeginConnect));
    }

    #[test]
    fn test_removed_rejects_everything() {
        use ConnectionInput::*;
        let err = drive(&[BeginConnect, Remove, Closed]).unwrap_err();
        assert_eq!(err, TransitionError::Terminal("removed".to_string()));
    }
}
