//! Lifecycle states, events and the transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Created but not started.
    Uninitialized,
    /// Registering with the remote store.
    Registering,
    /// Registered, waiting for an administrator to approve the worker.
    WaitingApproval,
    /// Approved, connecting to the execution engine.
    Connecting,
    /// Connected and accepting messages.
    Ready,
    /// Shutdown in progress.
    Stopping,
    /// Shutdown complete.
    Stopped,
    /// A lifecycle phase failed; see the error slot.
    Error,
}

impl State {
    /// Every state, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Uninitialized,
        Self::Registering,
        Self::WaitingApproval,
        Self::Connecting,
        Self::Ready,
        Self::Stopping,
        Self::Stopped,
        Self::Error,
    ];

    /// Whether no event can leave this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Registering => "registering",
            Self::WaitingApproval => "waiting_approval",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event driving a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Start,
    Registered,
    WaitApproval,
    Approved,
    Connected,
    Stop,
    Error,
    Recover,
}

impl Event {
    /// Every event, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Start,
        Self::Registered,
        Self::WaitApproval,
        Self::Approved,
        Self::Connected,
        Self::Stop,
        Self::Error,
        Self::Recover,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Registered => "registered",
            Self::WaitApproval => "wait_approval",
            Self::Approved => "approved",
            Self::Connected => "connected",
            Self::Stop => "stop",
            Self::Error => "error",
            Self::Recover => "recover",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table: `(from, event, to)`.
///
/// Any `(state, event)` pair missing here is invalid. `Stopping -> Stopped`
/// is deliberately absent; it happens through
/// [`StateMachine::complete_stop`](crate::StateMachine::complete_stop).
pub const TRANSITIONS: &[(State, Event, State)] = &[
    (State::Uninitialized, Event::Start, State::Registering),
    (State::Registering, Event::Registered, State::Connecting),
    (State::Registering, Event::WaitApproval, State::WaitingApproval),
    (State::Registering, Event::Error, State::Error),
    (State::WaitingApproval, Event::Approved, State::Connecting),
    (State::WaitingApproval, Event::Error, State::Error),
    (State::WaitingApproval, Event::Stop, State::Stopping),
    (State::Connecting, Event::Connected, State::Ready),
    (State::Connecting, Event::Error, State::Error),
    (State::Ready, Event::Stop, State::Stopping),
    (State::Ready, Event::Error, State::Error),
    (State::Error, Event::Recover, State::Registering),
    (State::Error, Event::Stop, State::Stopping),
];

/// Look up the target state for `event` fired in `from`.
#[must_use]
pub fn next_state(from: State, event: Event) -> Option<State> {
    TRANSITIONS
        .iter()
        .find(|(f, e, _)| *f == from && *e == event)
        .map(|(_, _, to)| *to)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_table_has_no_duplicate_keys() {
        let mut seen = HashSet::new();
        for (from, event, _) in TRANSITIONS {
            assert!(seen.insert((*from, *event)), "duplicate entry for {from}/{event}");
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_events() {
        for state in State::ALL.into_iter().filter(|s| s.is_terminal()) {
            for event in Event::ALL {
                assert_eq!(next_state(state, event), None);
            }
        }
    }

    #[test]
    fn test_recover_reenters_registering() {
        assert_eq!(
            next_state(State::Error, Event::Recover),
            Some(State::Registering)
        );
        assert_eq!(next_state(State::Ready, Event::Recover), None);
    }

    #[test]
    fn test_stop_not_accepted_mid_handshake() {
        assert_eq!(next_state(State::Registering, Event::Stop), None);
        assert_eq!(next_state(State::Connecting, Event::Stop), None);
        assert_eq!(next_state(State::Uninitialized, Event::Stop), None);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&State::WaitingApproval).unwrap();
        assert_eq!(json, "\"waiting_approval\"");
        assert_eq!(State::WaitingApproval.to_string(), "waiting_approval");
    }
}
