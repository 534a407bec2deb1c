//! C2 — Engine Lifecycle State. 5-state machine with rollback on action
//! failure, serialized through one reentrant-in-spirit lock (`parking_lot`'s
//! `Mutex` is non-reentrant, so `execute_in_state`/`transition_to` take the
//! lock exactly once per call, never nesting — matching how every other
//! component here calls into C2 from outside any lock it already holds).

use parking_lot::Mutex;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninit,
    Initializing,
    Initialized,
    Closing,
    Closed,
}

impl EngineState {
    fn label(self) -> &'static str {
        match self {
            EngineState::Uninit => "UNINIT",
            EngineState::Initializing => "INITIALIZING",
            EngineState::Initialized => "INITIALIZED",
            EngineState::Closing => "CLOSING",
            EngineState::Closed => "CLOSED",
        }
    }

    fn is_legal_transition(self, target: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, target),
            (Uninit, Initializing)
                | (Initializing, Initialized)
                | (Initializing, Closed)
                | (Initialized, Closing)
                | (Closing, Closed)
                | (Closed, Initializing)
        )
    }
}

pub struct LifecycleState {
    state: Mutex<EngineState>,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleState {
    #[must_use]
    pub fn new() -> Self {
        LifecycleState {
            state: Mutex::new(EngineState::Uninit),
        }
    }

    #[must_use]
    pub fn get_state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Validate `from -> target`; if valid, set state, run `action`, and
    /// roll back to the previous state on action failure (the original
    /// error propagates unchanged).
    pub fn transition_to<T, E>(
        &self,
        target: EngineState,
        action: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<EngineError>,
    {
        let mut guard = self.state.lock();
        let previous = *guard;
        if !previous.is_legal_transition(target) {
            return Err(EngineError::WrongState {
                expected: target.label(),
                actual: previous.label(),
            }
            .into());
        }
        *guard = target;
        match action() {
            Ok(v) => Ok(v),
            Err(e) => {
                *guard = previous;
                Err(e)
            }
        }
    }

    /// Acquire the lock, assert `state == required`, run `action` under the
    /// lock, release.
    pub fn execute_in_state<T, E>(
        &self,
        required: EngineState,
        action: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<EngineError>,
    {
        let guard = self.state.lock();
        if *guard != required {
            return Err(EngineError::WrongState {
                expected: required.label(),
                actual: guard.label(),
            }
            .into());
        }
        action()
    }

    /// Atomic compare-and-set. Returns `false` on state mismatch or an
    /// illegal transition — never fails.
    pub fn compare_and_set(&self, expected: EngineState, target: EngineState) -> bool {
        let mut guard = self.state.lock();
        if *guard != expected || !guard.is_legal_transition(target) {
            return false;
        }
        *guard = target;
        true
    }

    pub fn check_state_any(&self, allowed: &[EngineState]) -> Result<(), EngineError> {
        let guard = self.state.lock();
        if allowed.contains(&guard) {
            Ok(())
        } else {
            Err(EngineError::WrongState {
                expected: "one of the allowed states",
                actual: guard.label(),
            })
        }
    }
}
