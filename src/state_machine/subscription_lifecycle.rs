// Copyright (c) 2025 - Cowboy AI, Inc.
//! Subscription Connection Lifecycle
//!
//! Connection state of one cloud-to-cloud subscription:
//!
//! ```text
//!                 BeginConnect          Established
//! Disconnected ───────────────▶ Connecting ─────────▶ Connected
//!      ▲                           │                     │
//!      └──────── Failed ───────────┘                     │
//!      └──────── Closed ─────────────────────────────────┘
//!
//! any ── Remove ──▶ Removed (terminal)
//! ```
//!
//! At most one live connection exists per subscription: `BeginConnect` is
//! only accepted from `Disconnected`.

use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Removed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Removed => write!(f, "removed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInput {
    BeginConnect,
    Established,
    Failed,
    Closed,
    Remove,
}

impl StateMachine for ConnectionState {
    type Input = ConnectionInput;
    type Output = ();

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use ConnectionInput::*;
        use ConnectionState::*;

        let next = match (self, input) {
            (Removed, _) => return Err(TransitionError::Terminal(Removed.to_string())),
            (_, Remove) => Removed,
            (Disconnected, BeginConnect) => Connecting,
            (Connecting, Established) => Connected,
            (Connecting, Failed) => Disconnected,
            (Connected | Connecting, Closed) => Disconnected,
            (Disconnected, Closed) => Disconnected,
            (from, input) => {
                return Err(TransitionError::InvalidTransition {
                    from: from.to_string(),
                    input: format!("{input:?}"),
                })
            }
        };
        Ok((next, ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConnectionState::Disconnected, ConnectionInput::BeginConnect => Some(ConnectionState::Connecting))]
    #[test_case(ConnectionState::Connecting, ConnectionInput::Established => Some(ConnectionState::Connected))]
    #[test_case(ConnectionState::Connecting, ConnectionInput::Failed => Some(ConnectionState::Disconnected))]
    #[test_case(ConnectionState::Connected, ConnectionInput::Closed => Some(ConnectionState::Disconnected))]
    #[test_case(ConnectionState::Connected, ConnectionInput::Remove => Some(ConnectionState::Removed))]
    #[test_case(ConnectionState::Connecting, ConnectionInput::BeginConnect => None ; "already connecting")]
    #[test_case(ConnectionState::Connected, ConnectionInput::BeginConnect => None ; "already connected")]
    #[test_case(ConnectionState::Removed, ConnectionInput::BeginConnect => None ; "removed is terminal")]
    fn test_transitions(from: ConnectionState, input: ConnectionInput) -> Option<ConnectionState> {
        from.transition(&input).ok().map(|(next, _)| next)
    }
}
