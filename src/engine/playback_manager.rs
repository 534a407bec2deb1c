//! C6 — Playback Manager. Thin wrapper over native channel ops; single
//! channel at a time, serialized under a playback lock.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{map_native_playback_error, PlaybackError};
use crate::native::{NativeChannelHandle, NativeError, NativeSoundHandle, NativeSystem};

use super::handle::AudioHandle;

/// No natural end: play to EOF.
pub const END_FRAME_UNBOUNDED: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle {
    pub(crate) id: u64,
    pub(crate) audio: AudioHandle,
    pub(crate) start_frame: u64,
    pub(crate) end_frame: u64,
}

impl PlaybackHandle {
    #[must_use]
    pub fn audio(&self) -> AudioHandle {
        self.audio
    }

    #[must_use]
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    #[must_use]
    pub fn end_frame(&self) -> Option<u64> {
        (self.end_frame != END_FRAME_UNBOUNDED).then_some(self.end_frame)
    }
}

struct CurrentChannel {
    handle: PlaybackHandle,
    channel: NativeChannelHandle,
}

pub struct PlaybackManager {
    native: Arc<dyn NativeSystem>,
    lock: Mutex<()>,
    current: parking_lot::RwLock<Option<CurrentChannel>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl PlaybackManager {
    #[must_use]
    pub fn new(native: Arc<dyn NativeSystem>) -> Self {
        PlaybackManager {
            native,
            lock: Mutex::new(()),
            current: parking_lot::RwLock::new(None),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    fn cleanup_locked(&self) {
        *self.current.write() = None;
    }

    pub fn play(&self, sound: NativeSoundHandle, audio: AudioHandle) -> Result<PlaybackHandle, PlaybackError> {
        self.play_range(sound, audio, 0, END_FRAME_UNBOUNDED, false)
    }

    pub fn play_range(
        &self,
        sound: NativeSoundHandle,
        audio: AudioHandle,
        start: u64,
        end: u64,
        needs_positioning: bool,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let _guard = self.lock.lock();

        if self.current.read().is_some() {
            self.cleanup_locked();
        }

        let channel = self
            .native
            .play_sound(sound, true)
            .map_err(map_native_playback_error)?;

        if needs_positioning && start > 0 {
            if let Err(e) = self.native.channel_set_position(channel, start) {
                let _ = self.native.channel_stop(channel);
                return Err(map_native_playback_error(e));
            }
        }

        if let Err(e) = self.native.channel_set_paused(channel, false) {
            let _ = self.native.channel_stop(channel);
            return Err(map_native_playback_error(e));
        }

        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        let handle = PlaybackHandle {
            id,
            audio,
            start_frame: start,
            end_frame: end,
        };
        *self.current.write() = Some(CurrentChannel { handle, channel });
        Ok(handle)
    }

    pub fn pause(&self) {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let Some(channel) = channel else { return };
        if self.native.channel_set_paused(channel, true) == Err(NativeError::InvalidHandle) {
            self.cleanup_locked();
        }
    }

    pub fn resume(&self) {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let Some(channel) = channel else { return };
        if self.native.channel_set_paused(channel, false) == Err(NativeError::InvalidHandle) {
            self.cleanup_locked();
        }
    }

    pub fn stop(&self) {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        if let Some(channel) = channel {
            let _ = self.native.channel_stop(channel);
        }
        self.cleanup_locked();
    }

    pub fn seek(&self, frame: u64) {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let Some(channel) = channel else { return };
        match self.native.channel_set_position(channel, frame) {
            Ok(()) | Err(NativeError::InvalidPosition) => {}
            Err(NativeError::InvalidHandle) => self.cleanup_locked(),
            Err(_) => {}
        }
    }

    #[must_use]
    pub fn get_position(&self) -> u64 {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let Some(channel) = channel else { return 0 };
        match self.native.channel_get_position(channel) {
            Ok(pos) => pos,
            Err(NativeError::InvalidHandle) => {
                self.cleanup_locked();
                0
            }
            Err(e) => {
                tracing::warn!(?e, "channel_get_position failed");
                0
            }
        }
    }

    #[must_use]
    pub fn check_playback_finished(&self) -> bool {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let Some(channel) = channel else { return true };
        match self.native.channel_is_playing(channel) {
            Ok(true) => false,
            Ok(false) => {
                self.cleanup_locked();
                true
            }
            Err(_) => {
                self.cleanup_locked();
                true
            }
        }
    }

    #[must_use]
    pub fn has_active_playback(&self) -> bool {
        self.current.read().is_some()
    }

    #[must_use]
    pub fn current_playback(&self) -> Option<PlaybackHandle> {
        self.current.read().as_ref().map(|c| c.handle)
    }

    /// `(is_playing, is_paused)` for C9's `get_state`. `None` when there is
    /// no current channel, or the native channel turned out to be gone
    /// (the caller is then expected to reap the handle).
    pub fn query_channel_state(&self) -> Option<(bool, bool)> {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let channel = channel?;
        let playing = self.native.channel_is_playing(channel);
        let paused = self.native.channel_get_paused(channel);
        match (playing, paused) {
            (Ok(p), Ok(ps)) => Some((p, ps)),
            (Err(NativeError::InvalidHandle), _) | (_, Err(NativeError::InvalidHandle)) => {
                self.cleanup_locked();
                None
            }
            _ => None,
        }
    }

    /// Raw decoded position for C8's progress timer, distinct from
    /// `get_position`: returns `None` when the channel is gone OR has
    /// naturally run off the end (an unbounded full play has no end_frame
    /// for the timer to compare against, so this is the only signal that
    /// tells it playback is over), so the timer can tell "no position" from
    /// "position zero".
    pub fn poll_decoded_position(&self) -> Option<u64> {
        let _guard = self.lock.lock();
        let channel = self.current.read().as_ref().map(|c| c.channel);
        let channel = channel?;
        match self.native.channel_is_playing(channel) {
            Ok(true) => {}
            Ok(false) => {
                self.cleanup_locked();
                return None;
            }
            Err(NativeError::InvalidHandle) => {
                self.cleanup_locked();
                return None;
            }
            Err(_) => return None,
        }
        match self.native.channel_get_position(channel) {
            Ok(pos) => Some(pos),
            Err(NativeError::InvalidHandle) => {
                self.cleanup_locked();
                None
            }
            Err(_) => None,
        }
    }
}

impl super::listener::PlaybackController for PlaybackManager {
    fn decoded_position(&self) -> Option<u64> {
        self.poll_decoded_position()
    }

    fn mark_inactive(&self) {
        let _guard = self.lock.lock();
        self.cleanup_locked();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::FakeNativeSystem;
    use std::path::Path;

    fn manager() -> (PlaybackManager, NativeSoundHandle, AudioHandle) {
        let native: Arc<dyn NativeSystem> = Arc::new(FakeNativeSystem::new());
        native.initialize().unwrap();
        // No sound registered in the fake; these tests exercise manager
        // bookkeeping with a handle that was never created (covers
        // INVALID_HANDLE recovery paths, not live audio).
        let sound = NativeSoundHandle(0);
        let audio = AudioHandle { id: 1, generation: 1 };
        (PlaybackManager::new(native), sound, audio)
    }

    fn write_wav(path: &Path, frames: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 200) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Manager paired with an actually playable sound, registered through
    /// the same `create_sound` path `AudioLoader` uses.
    fn manager_with_sound() -> (PlaybackManager, Arc<FakeNativeSystem>, NativeSoundHandle, AudioHandle, tempfile::TempDir) {
        let fake = Arc::new(FakeNativeSystem::new());
        fake.initialize().unwrap();
        let native: Arc<dyn NativeSystem> = fake.clone();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.wav");
        write_wav(&file, 1_000);
        let sound = native
            .create_sound(&file, crate::native::SoundCreateFlags { accurate_time: true })
            .unwrap();
        let audio = AudioHandle { id: 1, generation: 1 };
        (PlaybackManager::new(native), fake, sound, audio, dir)
    }

    #[test]
    fn play_without_prior_sound_surfaces_native_error() {
        let (mgr, sound, audio) = manager();
        let result = mgr.play(sound, audio);
        assert!(result.is_err());
        assert!(!mgr.has_active_playback());
    }

    #[test]
    fn stop_with_no_current_channel_is_a_no_op() {
        let (mgr, _sound, _audio) = manager();
        mgr.stop();
        assert!(!mgr.has_active_playback());
    }

    #[test]
    fn get_position_with_no_channel_is_zero() {
        let (mgr, _sound, _audio) = manager();
        assert_eq!(mgr.get_position(), 0);
    }

    #[test]
    fn check_playback_finished_with_no_channel_is_true() {
        let (mgr, _sound, _audio) = manager();
        assert!(mgr.check_playback_finished());
    }

    #[test]
    fn play_then_pause_then_resume_round_trips_paused_flag() {
        let (mgr, _fake, sound, audio, _dir) = manager_with_sound();
        mgr.play(sound, audio).unwrap();
        assert_eq!(mgr.query_channel_state(), Some((true, false)));
        mgr.pause();
        assert_eq!(mgr.query_channel_state(), Some((true, true)));
        mgr.resume();
        assert_eq!(mgr.query_channel_state(), Some((true, false)));
        assert!(mgr.has_active_playback());
    }

    #[test]
    fn seek_past_end_is_silently_clamped() {
        let (mgr, _fake, sound, audio, _dir) = manager_with_sound();
        mgr.play(sound, audio).unwrap();
        mgr.seek(10_000);
        assert!(mgr.has_active_playback());
        assert_eq!(mgr.get_position(), 1_000);
    }

    #[test]
    fn query_channel_state_reflects_play_and_pause() {
        let (mgr, _fake, sound, audio, _dir) = manager_with_sound();
        mgr.play(sound, audio).unwrap();
        assert_eq!(mgr.query_channel_state(), Some((true, false)));
        mgr.pause();
        assert_eq!(mgr.query_channel_state(), Some((true, true)));
    }

    #[test]
    fn stop_clears_current_and_invalidates_further_queries() {
        let (mgr, _fake, sound, audio, _dir) = manager_with_sound();
        mgr.play(sound, audio).unwrap();
        mgr.stop();
        assert!(!mgr.has_active_playback());
        assert_eq!(mgr.query_channel_state(), None);
    }

    #[test]
    fn check_playback_finished_follows_the_fake_cursor() {
        let (mgr, fake, sound, audio, _dir) = manager_with_sound();
        mgr.play(sound, audio).unwrap();
        assert!(!mgr.check_playback_finished());
        fake.finish_for_test();
        assert!(mgr.check_playback_finished());
        assert!(!mgr.has_active_playback());
    }

    #[test]
    fn poll_decoded_position_goes_none_once_finished() {
        let (mgr, fake, sound, audio, _dir) = manager_with_sound();
        mgr.play(sound, audio).unwrap();
        assert_eq!(mgr.poll_decoded_position(), Some(0));
        fake.finish_for_test();
        assert_eq!(mgr.poll_decoded_position(), None);
        assert!(!mgr.has_active_playback());
    }
}
