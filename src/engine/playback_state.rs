//! C7 — Playback State Machine. STOPPED/PLAYING/PAUSED/FINISHED, with
//! SEEKING realized purely as a transient notification pair the facade (C9)
//! emits around a seek — never a value this machine can hold or return.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Stopped,
    Playing,
    Paused,
    Finished,
}

/// The value carried by `on_state_changed` notifications (§6). A strict
/// superset of `PlaybackPhase`: SEEKING exists only here, as a transient
/// pair of notifications the facade emits around a seek — `get_phase`
/// never returns it, and the state machine never stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackNotification {
    Stopped,
    Playing,
    Paused,
    Finished,
    Seeking,
}

impl From<PlaybackPhase> for PlaybackNotification {
    fn from(p: PlaybackPhase) -> Self {
        match p {
            PlaybackPhase::Stopped => PlaybackNotification::Stopped,
            PlaybackPhase::Playing => PlaybackNotification::Playing,
            PlaybackPhase::Paused => PlaybackNotification::Paused,
            PlaybackPhase::Finished => PlaybackNotification::Finished,
        }
    }
}

impl PlaybackPhase {
    fn is_legal_transition(self, target: PlaybackPhase) -> bool {
        use PlaybackPhase::*;
        matches!(
            (self, target),
            (Stopped, Playing)
                | (Playing, Paused)
                | (Playing, Stopped)
                | (Playing, Finished)
                | (Paused, Playing)
                | (Paused, Stopped)
                | (Finished, Playing)
                | (Finished, Stopped)
        )
    }
}

pub struct PlaybackStateMachine {
    phase: Mutex<PlaybackPhase>,
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateMachine {
    #[must_use]
    pub fn new() -> Self {
        PlaybackStateMachine {
            phase: Mutex::new(PlaybackPhase::Stopped),
        }
    }

    #[must_use]
    pub fn get_phase(&self) -> PlaybackPhase {
        *self.phase.lock()
    }

    /// Valid from any non-STOPPED state, including FINISHED.
    pub fn transition_to_stopped(&self) -> Option<PlaybackPhase> {
        let mut guard = self.phase.lock();
        if *guard == PlaybackPhase::Stopped {
            return None;
        }
        let old = *guard;
        *guard = PlaybackPhase::Stopped;
        Some(old)
    }

    /// A natural end of playback: PLAYING -> FINISHED, held until the next
    /// stop or restart (§4.6). `None` if the channel already reported this
    /// (phase is no longer PLAYING), so a caller can gate a one-shot
    /// completion callback on an actual transition having happened.
    pub fn transition_to_finished(&self) -> Option<PlaybackPhase> {
        let mut guard = self.phase.lock();
        if *guard != PlaybackPhase::Playing {
            return None;
        }
        let old = *guard;
        *guard = PlaybackPhase::Finished;
        Some(old)
    }

    /// Seeking is only legal from PLAYING or PAUSED.
    #[must_use]
    pub fn validate_seek_allowed(&self) -> bool {
        matches!(*self.phase.lock(), PlaybackPhase::Playing | PlaybackPhase::Paused)
    }

    /// Force PLAYING/PAUSED to STOPPED; leave STOPPED/FINISHED unchanged.
    /// Returns the old phase when a transition happened.
    pub fn handle_channel_invalid(&self) -> Option<PlaybackPhase> {
        let mut guard = self.phase.lock();
        match *guard {
            PlaybackPhase::Playing | PlaybackPhase::Paused => {
                let old = *guard;
                *guard = PlaybackPhase::Stopped;
                Some(old)
            }
            PlaybackPhase::Stopped | PlaybackPhase::Finished => None,
        }
    }

    /// Validates both identity (current == expected) and transition legality.
    pub fn compare_and_set(&self, expected: PlaybackPhase, next: PlaybackPhase) -> bool {
        let mut guard = self.phase.lock();
        if *guard != expected || !guard.is_legal_transition(next) {
            return false;
        }
        *guard = next;
        true
    }
}
