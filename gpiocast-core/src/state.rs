// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Lifecycle state machines with typed state transitions.
//!
//! Subscriber client: Created → Connected → Subscribed → Unsubscribed →
//! Disconnected → Destroyed. Broadcast service: Initialized → Running →
//! Stopped. Invalid transitions result in StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Subscriber client lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientState {
    /// Local state only; nothing mapped.
    Created,

    /// Event store mapped read-only and validated.
    Connected,

    /// Registered with the service; listener thread running.
    Subscribed,

    /// Listener stopped; the mapping and cursor are kept for a resubscribe.
    Unsubscribed,

    /// Detached from the service; the mapping may be reused by `connect`.
    Disconnected,

    /// Terminal.
    Destroyed,
}

impl ClientState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Connected => "Connected",
            Self::Subscribed => "Subscribed",
            Self::Unsubscribed => "Unsubscribed",
            Self::Disconnected => "Disconnected",
            Self::Destroyed => "Destroyed",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: ClientState) -> bool {
        matches!(
            (self, target),
            // From Created
            (Self::Created, Self::Connected) |
            (Self::Created, Self::Destroyed) |
            // From Connected
            (Self::Connected, Self::Subscribed) |
            (Self::Connected, Self::Disconnected) |
            (Self::Connected, Self::Destroyed) |
            // From Subscribed
            (Self::Subscribed, Self::Unsubscribed) |
            (Self::Subscribed, Self::Disconnected) |
            // From Unsubscribed
            (Self::Unsubscribed, Self::Subscribed) |
            (Self::Unsubscribed, Self::Disconnected) |
            (Self::Unsubscribed, Self::Destroyed) |
            // From Disconnected
            (Self::Disconnected, Self::Connected) |
            (Self::Disconnected, Self::Destroyed)
        )
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Broadcast service lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    /// Store created, threads not started.
    Initialized,
    Running,
    Stopped,
}

impl ServiceState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        }
    }

    pub fn can_transition_to(&self, target: ServiceState) -> bool {
        matches!(
            (self, target),
            (Self::Initialized, Self::Running)
                | (Self::Initialized, Self::Stopped)
                | (Self::Running, Self::Stopped)
        )
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for a subscriber client.
/// Enforces valid state transitions.
#[derive(Debug)]
pub struct ClientStateMachine {
    current_state: ClientState,
    last_transition: Instant,
    transition_count: u64,
}

impl ClientStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: ClientState::Created,
            last_transition: Instant::now(),
            transition_count: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ClientState {
        self.current_state
    }

    /// Get total number of transitions.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    /// Returns Ok(()) if successful, or StateTransitionError if invalid.
    pub fn transition_to(&mut self, target: ClientState) -> Result<(), StateTransitionError> {
        if self.current_state == target {
            return Err(StateTransitionError::AlreadyInState {
                component: "client",
                state: target.name(),
            });
        }
        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                component: "client",
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.current_state.name(),
            to = target.name(),
            held_ms = self.last_transition.elapsed().as_millis() as u64,
            "Client state transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Check that `target` is reachable without moving there yet.
    pub fn check(&self, target: ClientState) -> Result<(), StateTransitionError> {
        if self.current_state.can_transition_to(target) {
            Ok(())
        } else {
            Err(StateTransitionError::InvalidTransition {
                component: "client",
                from: self.current_state.name(),
                to: target.name(),
            })
        }
    }

    /// True while the store mapping is usable for reads.
    pub fn is_mapped(&self) -> bool {
        matches!(
            self.current_state,
            ClientState::Connected | ClientState::Subscribed | ClientState::Unsubscribed
        )
    }
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = ClientStateMachine::new();
        assert_eq!(sm.state(), ClientState::Created);
        assert_eq!(sm.transition_count(), 0);
        assert!(!sm.is_mapped());
    }

    #[test]
    fn test_valid_transitions() {
        let mut sm = ClientStateMachine::new();

        // Created → Connected
        assert!(sm.transition_to(ClientState::Connected).is_ok());
        assert!(sm.is_mapped());

        // Connected → Subscribed
        assert!(sm.transition_to(ClientState::Subscribed).is_ok());

        // Subscribed → Unsubscribed → Subscribed (resubscribe)
        assert!(sm.transition_to(ClientState::Unsubscribed).is_ok());
        assert!(sm.transition_to(ClientState::Subscribed).is_ok());

        // Subscribed → Disconnected → Connected
        assert!(sm.transition_to(ClientState::Disconnected).is_ok());
        assert!(!sm.is_mapped());
        assert!(sm.transition_to(ClientState::Connected).is_ok());

        assert!(sm.transition_to(ClientState::Destroyed).is_ok());
        assert_eq!(sm.transition_count(), 7);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = ClientStateMachine::new();

        // Created → Subscribed (must connect first)
        assert!(sm.transition_to(ClientState::Subscribed).is_err());
        assert_eq!(sm.state(), ClientState::Created);

        // Subscribed → Destroyed (must unsubscribe first)
        sm.transition_to(ClientState::Connected).unwrap();
        sm.transition_to(ClientState::Subscribed).unwrap();
        assert!(matches!(
            sm.transition_to(ClientState::Destroyed),
            Err(StateTransitionError::InvalidTransition { .. })
        ));

        // Destroyed is terminal
        sm.transition_to(ClientState::Unsubscribed).unwrap();
        sm.transition_to(ClientState::Destroyed).unwrap();
        assert!(sm.transition_to(ClientState::Connected).is_err());
    }

    #[test]
    fn test_already_in_state() {
        let mut sm = ClientStateMachine::new();
        sm.transition_to(ClientState::Connected).unwrap();
        assert!(matches!(
            sm.transition_to(ClientState::Connected),
            Err(StateTransitionError::AlreadyInState { .. })
        ));
    }

    #[test]
    fn test_service_transitions() {
        assert!(ServiceState::Initialized.can_transition_to(ServiceState::Running));
        assert!(ServiceState::Running.can_transition_to(ServiceState::Stopped));
        assert!(!ServiceState::Running.can_transition_to(ServiceState::Running));
        assert!(!ServiceState::Stopped.can_transition_to(ServiceState::Running));
    }
}
