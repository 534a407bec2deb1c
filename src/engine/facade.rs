//! C9 — Audio Engine Facade. Orchestrates C3–C8: enforces operation order,
//! the single-playback rule, maps native errors, closes cleanly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{EngineApiError, EngineError, PlaybackError};
use crate::metadata::AudioMetadata;
use crate::native::{self, NativeSystem};

use super::audio_loader::AudioLoader;
use super::handle::AudioHandle;
use super::lifecycle::{EngineState, LifecycleState};
use super::listener::{ListenerManager, PlaybackController, PlaybackListener};
use super::playback_manager::{PlaybackHandle, PlaybackManager, END_FRAME_UNBOUNDED};
use super::playback_state::{PlaybackNotification, PlaybackPhase, PlaybackStateMachine};

pub struct AudioEngine {
    lifecycle: Arc<LifecycleState>,
    native: Arc<dyn NativeSystem>,
    loader: AudioLoader,
    playback: Arc<PlaybackManager>,
    state_machine: Arc<PlaybackStateMachine>,
    listeners: ListenerManager,
    operation_lock: Mutex<()>,
}

fn native_init_code(e: crate::native::NativeError) -> i32 {
    match e {
        crate::native::NativeError::Generic(code) => code,
        _ => -1,
    }
}

impl AudioEngine {
    /// Resolves the native backend via C1, runs C2's UNINIT→INITIALIZING→
    /// INITIALIZED sequence, and returns a ready-to-use facade.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineApiError> {
        Self::with_native(native::load_native_system(config)?, config)
    }

    /// Same as [`Self::new`] but takes an already-resolved backend, skipping
    /// C1. Lets an embedder (or a test) supply its own [`NativeSystem`]
    /// instead of the one `native::loader` would pick.
    pub fn with_native(native: Arc<dyn NativeSystem>, config: &EngineConfig) -> Result<Self, EngineApiError> {
        let lifecycle = Arc::new(LifecycleState::new());
        lifecycle.transition_to::<_, EngineApiError>(EngineState::Initializing, || {
            native
                .initialize()
                .map_err(|e| EngineError::NativeInitFailed { code: native_init_code(e) }.into())
        })?;
        lifecycle.transition_to::<_, EngineApiError>(EngineState::Initialized, || Ok(()))?;

        let state_machine = Arc::new(PlaybackStateMachine::new());
        let listeners = ListenerManager::new(
            state_machine.clone(),
            Duration::from_millis(config.progress_interval_ms.max(1)),
        );

        Ok(AudioEngine {
            loader: AudioLoader::new(native.clone(), lifecycle.clone()),
            playback: Arc::new(PlaybackManager::new(native.clone())),
            native,
            lifecycle,
            state_machine,
            listeners,
            operation_lock: Mutex::new(()),
        })
    }

    fn require_initialized(&self) -> Result<(), EngineApiError> {
        self.lifecycle
            .check_state_any(&[EngineState::Initialized])
            .map_err(Into::into)
    }

    /// Loading a new audio while a previous one is active stops the prior
    /// first (emitting a STOPPED state change), then delegates to C5 (§5
    /// ordering guarantees).
    pub fn load_audio(&self, path: &Path) -> Result<AudioHandle, EngineApiError> {
        self.require_initialized()?;
        let _guard = self.operation_lock.lock();
        if self.playback.has_active_playback() {
            self.force_stop_current();
        }
        self.loader.load_audio(path)
    }

    pub fn get_metadata(&self, audio: AudioHandle) -> Result<AudioMetadata, EngineApiError> {
        self.require_initialized()?;
        if !self.loader.is_valid(audio) {
            return Err(EngineApiError::InvalidAudioHandle);
        }
        self.loader.get_current_metadata()
    }

    pub fn play(&self, audio: AudioHandle) -> Result<PlaybackHandle, EngineApiError> {
        self.play_inner(audio, 0, END_FRAME_UNBOUNDED, false)
    }

    pub fn play_range(&self, audio: AudioHandle, start: u64, end: u64) -> Result<PlaybackHandle, EngineApiError> {
        if end < start {
            return Err(PlaybackError::InvalidRange.into());
        }
        self.play_inner(audio, start, end, true)
    }

    fn play_inner(
        &self,
        audio: AudioHandle,
        start: u64,
        end: u64,
        is_range: bool,
    ) -> Result<PlaybackHandle, EngineApiError> {
        self.require_initialized()?;
        let _guard = self.operation_lock.lock();

        if !self.loader.is_valid(audio) {
            return Err(EngineApiError::InvalidAudioHandle);
        }

        if self.playback.has_active_playback() {
            if is_range {
                self.force_stop_current();
            } else {
                return Err(PlaybackError::ConcurrentOperation.into());
            }
        }

        let sound = self.loader.current_sound().ok_or(EngineApiError::InvalidAudioHandle)?;
        let handle = if is_range {
            self.playback
                .play_range(sound, audio, start, end, true)
                .map_err(EngineApiError::Playback)?
        } else {
            self.playback.play(sound, audio).map_err(EngineApiError::Playback)?
        };

        let old_phase = self.state_machine.get_phase();
        if self.state_machine.compare_and_set(old_phase, PlaybackPhase::Playing) {
            self.listeners
                .notify_state_changed(handle, PlaybackNotification::Playing, old_phase.into());
        }

        let metadata = self.loader.get_current_metadata().ok();
        let total_frames = metadata.as_ref().map_or(0, |m| {
            if is_range {
                end.min(m.frame_count).saturating_sub(start)
            } else {
                m.frame_count
            }
        });
        let source_rate = metadata.as_ref().map_or(0, |m| m.sample_rate);

        let controller: Arc<dyn PlaybackController> = self.playback.clone();
        self.listeners.start_monitoring(handle, total_frames, source_rate, controller);

        Ok(handle)
    }

    /// Stops whatever is currently playing and notifies STOPPED, without
    /// requiring the caller to hold a handle to it (used when a range play
    /// interrupts a full play per §4.7).
    fn force_stop_current(&self) {
        if let Some(prev) = self.playback.current_playback() {
            self.playback.stop();
            self.listeners.stop_monitoring();
            if let Some(old) = self.state_machine.transition_to_stopped() {
                self.listeners
                    .notify_state_changed(prev, PlaybackNotification::Stopped, old.into());
            }
        }
    }

    fn validate_current(&self, playback: PlaybackHandle) -> Result<(), EngineApiError> {
        match self.playback.current_playback() {
            Some(cur) if cur == playback => Ok(()),
            Some(_) => Err(PlaybackError::NotCurrent.into()),
            None => Err(PlaybackError::NotActive.into()),
        }
    }

    pub fn pause(&self, playback: PlaybackHandle) -> Result<(), EngineApiError> {
        self.require_initialized()?;
        let _guard = self.operation_lock.lock();
        self.validate_current(playback)?;
        self.playback.pause();
        let old = self.state_machine.get_phase();
        if self.state_machine.compare_and_set(old, PlaybackPhase::Paused) {
            self.listeners
                .notify_state_changed(playback, PlaybackNotification::Paused, old.into());
        }
        Ok(())
    }

    pub fn resume(&self, playback: PlaybackHandle) -> Result<(), EngineApiError> {
        self.require_initialized()?;
        let _guard = self.operation_lock.lock();
        self.validate_current(playback)?;
        self.playback.resume();
        let old = self.state_machine.get_phase();
        if self.state_machine.compare_and_set(old, PlaybackPhase::Playing) {
            self.listeners
                .notify_state_changed(playback, PlaybackNotification::Playing, old.into());
        }
        Ok(())
    }

    pub fn stop(&self, playback: PlaybackHandle) -> Result<(), EngineApiError> {
        self.require_initialized()?;
        let _guard = self.operation_lock.lock();
        self.validate_current(playback)?;
        self.playback.stop();
        self.listeners.stop_monitoring();
        if let Some(old) = self.state_machine.transition_to_stopped() {
            self.listeners
                .notify_state_changed(playback, PlaybackNotification::Stopped, old.into());
        }
        Ok(())
    }

    /// Reads the current paused flag, then emits a SEEKING transition pair
    /// around the seek so listeners can bracket it: `old -> SEEKING ->
    /// old`. SEEKING is never stored; `get_state` cannot observe it.
    pub fn seek(&self, playback: PlaybackHandle, frame: i64) -> Result<(), EngineApiError> {
        self.require_initialized()?;
        let _guard = self.operation_lock.lock();
        self.validate_current(playback)?;
        if frame < 0 {
            return Err(PlaybackError::InvalidRange.into());
        }
        if !self.state_machine.validate_seek_allowed() {
            return Err(PlaybackError::NotActive.into());
        }

        let settled: PlaybackNotification = self.state_machine.get_phase().into();
        self.listeners
            .notify_state_changed(playback, PlaybackNotification::Seeking, settled);

        self.playback.seek(frame as u64);

        self.listeners
            .notify_state_changed(playback, settled, PlaybackNotification::Seeking);
        Ok(())
    }

    /// Queries native is-playing/is-paused; maps a lost channel to STOPPED
    /// and opportunistically reaps the handle without firing listener
    /// callbacks (only the timer thread emits FINISHED/complete).
    pub fn get_state(&self, playback: PlaybackHandle) -> PlaybackPhase {
        if self.playback.current_playback() != Some(playback) {
            return self.state_machine.get_phase();
        }
        match self.playback.query_channel_state() {
            None => {
                self.state_machine.handle_channel_invalid();
                PlaybackPhase::Stopped
            }
            Some(_) => self.state_machine.get_phase(),
        }
    }

    #[must_use]
    pub fn get_position(&self, _playback: PlaybackHandle) -> u64 {
        self.playback.get_position()
    }

    #[must_use]
    pub fn is_playing(&self, playback: PlaybackHandle) -> bool {
        self.get_state(playback) == PlaybackPhase::Playing
    }

    #[must_use]
    pub fn is_paused(&self, playback: PlaybackHandle) -> bool {
        self.get_state(playback) == PlaybackPhase::Paused
    }

    #[must_use]
    pub fn is_stopped(&self, playback: PlaybackHandle) -> bool {
        matches!(self.get_state(playback), PlaybackPhase::Stopped | PlaybackPhase::Finished)
    }

    pub fn add_playback_listener(&self, listener: Arc<dyn PlaybackListener>) {
        self.listeners.add_listener(listener);
    }

    pub fn remove_playback_listener(&self, listener: &Arc<dyn PlaybackListener>) {
        self.listeners.remove_listener(listener);
    }

    /// Idempotent. INITIALIZED→CLOSING stops the channel, shuts down C8,
    /// releases the current sound, shuts down C3, then CLOSING→CLOSED.
    /// Calling during INITIALIZING transitions straight to CLOSED.
    pub fn close(&self) {
        match self.lifecycle.get_state() {
            EngineState::Initialized => {
                if self
                    .lifecycle
                    .transition_to::<_, EngineApiError>(EngineState::Closing, || Ok(()))
                    .is_err()
                {
                    return;
                }
                self.playback.stop();
                self.listeners.shutdown();
                self.loader.release_all();
                self.native.shutdown();
                let _ = self
                    .lifecycle
                    .transition_to::<_, EngineApiError>(EngineState::Closed, || Ok(()));
            }
            EngineState::Initializing => {
                self.lifecycle
                    .compare_and_set(EngineState::Initializing, EngineState::Closed);
            }
            EngineState::Uninit | EngineState::Closing | EngineState::Closed => {}
        }
    }
}
