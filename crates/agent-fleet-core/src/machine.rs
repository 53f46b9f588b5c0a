//! Synchronous lifecycle state machine.
//!
//! `StateMachine` performs no I/O. It validates events against
//! [`TRANSITIONS`](crate::state::TRANSITIONS), keeps the previous state,
//! an error slot and a bounded history of successful transitions.

use chrono::Utc;

use crate::{
    Event, FsmError, LifecycleError, State, TransitionHistory, TransitionRecord,
    history::DEFAULT_HISTORY_CAPACITY, state::next_state,
};

/// Worker lifecycle state machine.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: State,
    previous: Option<State>,
    error: Option<LifecycleError>,
    history: TransitionHistory,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl StateMachine {
    /// Create a machine in `Uninitialized` keeping `history_capacity` records.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: State::Uninitialized,
            previous: None,
            error: None,
            history: TransitionHistory::new(history_capacity),
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn previous_state(&self) -> Option<State> {
        self.previous
    }

    #[must_use]
    pub const fn error(&self) -> Option<&LifecycleError> {
        self.error.as_ref()
    }

    /// Whether `event` has a table entry for the current state.
    #[must_use]
    pub fn can_transition(&self, event: Event) -> bool {
        next_state(self.state, event).is_some()
    }

    /// Fire `event`, returning the new state.
    ///
    /// `Recover` clears the error slot; every other event leaves it as is.
    ///
    /// # Errors
    /// Returns [`FsmError::InvalidTransition`] when the table has no entry for
    /// the current state and `event`. The state is left unchanged.
    pub fn transition(&mut self, event: Event) -> Result<State, FsmError> {
        let from = self.state;
        let to = next_state(from, event).ok_or(FsmError::InvalidTransition { from, event })?;

        self.history.push(TransitionRecord {
            from,
            to,
            event,
            timestamp: Utc::now(),
            error: self.error.clone(),
        });
        if event == Event::Recover {
            self.error = None;
        }
        self.previous = Some(from);
        self.state = to;
        Ok(to)
    }

    /// Finish shutdown: `Stopping -> Stopped`.
    ///
    /// This is not an event and is not recorded in the history.
    ///
    /// # Errors
    /// Returns [`FsmError::StateMismatch`] unless the machine is `Stopping`.
    pub fn complete_stop(&mut self) -> Result<(), FsmError> {
        self.assert_state(State::Stopping)?;
        self.previous = Some(State::Stopping);
        self.state = State::Stopped;
        Ok(())
    }

    /// # Errors
    /// Returns [`FsmError::StateMismatch`] if the current state is not `expected`.
    pub fn assert_state(&self, expected: State) -> Result<(), FsmError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(FsmError::StateMismatch {
                expected,
                actual: self.state,
            })
        }
    }

    /// Attach an error without transitioning.
    pub fn set_error(&mut self, error: LifecycleError) {
        self.error = Some(error);
    }

    /// Clear the error slot, returning what it held.
    pub fn clear_error(&mut self) -> Option<LifecycleError> {
        self.error.take()
    }

    /// Retained transitions, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.snapshot()
    }

    #[must_use]
    pub fn last_transition(&self) -> Option<&TransitionRecord> {
        self.history.last()
    }
}
