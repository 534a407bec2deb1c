//! In-memory `NativeSystem` stand-in for facade/orchestration tests — handle
//! invalidation, the single-playback rule, state transitions, listener
//! fan-out, seek bracketing — none of which has any business depending on a
//! real `cpal` output device. Reuses the real `symphonia` decode path
//! (`native::decode`) so loaded metadata matches what `MixerSystem` would
//! report; channel playback is driven by the test moving the cursor
//! directly rather than a real-time audio callback.
//!
//! Not wired into `native::loader`'s `LibraryType` selection: this is test
//! support, not a backend an embedder can configure.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::contract::{
    NativeChannelHandle, NativeError, NativeResult, NativeSoundFormat, NativeSoundHandle,
    NativeSystem, SoundCreateFlags,
};
use super::decode;

struct FakeSound {
    format: NativeSoundFormat,
}

struct FakeChannel {
    id: u64,
    sound_id: u64,
    cursor: AtomicU64,
    playing: AtomicBool,
    paused: AtomicBool,
}

pub struct FakeNativeSystem {
    initialized: AtomicBool,
    sounds: Mutex<HashMap<u64, Arc<FakeSound>>>,
    next_sound_id: AtomicU64,
    next_channel_id: AtomicU64,
    channel: RwLock<Option<Arc<FakeChannel>>>,
}

impl FakeNativeSystem {
    #[must_use]
    pub fn new() -> Self {
        FakeNativeSystem {
            initialized: AtomicBool::new(false),
            sounds: Mutex::new(HashMap::new()),
            next_sound_id: AtomicU64::new(1),
            next_channel_id: AtomicU64::new(1),
            channel: RwLock::new(None),
        }
    }

    /// Move the current channel's cursor directly, standing in for the
    /// passage of time a real audio callback would drive. No-op if nothing
    /// is current.
    pub fn set_position_for_test(&self, frame: u64) {
        if let Some(channel) = self.channel.read().as_ref() {
            channel.cursor.store(frame, Ordering::Release);
        }
    }

    /// Force the current channel to report not-playing, as if it had run
    /// off the end of the sound on its own.
    pub fn finish_for_test(&self) {
        if let Some(channel) = self.channel.read().as_ref() {
            channel.playing.store(false, Ordering::Release);
        }
    }
}

impl Default for FakeNativeSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn map_decode_error(e: decode::DecodeError) -> NativeError {
    match e {
        decode::DecodeError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            NativeError::FileNotFound
        }
        decode::DecodeError::Io(_) => NativeError::Generic(-10),
        decode::DecodeError::UnsupportedFormat(_) | decode::DecodeError::UnsupportedCodec(_) => {
            NativeError::Format
        }
        decode::DecodeError::Decode(_) => NativeError::FileBad,
    }
}

impl NativeSystem for FakeNativeSystem {
    fn initialize(&self) -> NativeResult<()> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(NativeError::Generic(-2));
        }
        Ok(())
    }

    fn update(&self) {}

    fn shutdown(&self) {
        self.initialized.store(false, Ordering::Release);
        *self.channel.write() = None;
    }

    fn version_info(&self) -> String {
        "fake-backend/1.0".to_string()
    }

    fn buffer_info(&self) -> String {
        "256x4".to_string()
    }

    fn format_info(&self) -> String {
        "48000Hz 1ch".to_string()
    }

    fn create_sound(&self, path: &Path, _flags: SoundCreateFlags) -> NativeResult<NativeSoundHandle> {
        let decoded = decode::decode_file(path).map_err(map_decode_error)?;
        let frame_count = decoded.frame_count();
        let format = NativeSoundFormat {
            sample_rate: decoded.sample_rate,
            channels: decoded.channels,
            bits_per_sample: decoded.bits_per_sample,
            format_tag: decode::normalize_format_tag(&decoded.format_tag).to_string(),
            frame_count,
        };
        let id = self.next_sound_id.fetch_add(1, Ordering::Relaxed);
        self.sounds.lock().insert(id, Arc::new(FakeSound { format }));
        Ok(NativeSoundHandle(id))
    }

    fn release_sound(&self, sound: NativeSoundHandle) {
        self.sounds.lock().remove(&sound.0);
    }

    fn sound_format(&self, sound: NativeSoundHandle) -> NativeResult<NativeSoundFormat> {
        self.sounds
            .lock()
            .get(&sound.0)
            .map(|s| s.format.clone())
            .ok_or(NativeError::InvalidHandle)
    }

    fn play_sound(&self, sound: NativeSoundHandle, paused: bool) -> NativeResult<NativeChannelHandle> {
        if !self.sounds.lock().contains_key(&sound.0) {
            return Err(NativeError::InvalidHandle);
        }
        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(FakeChannel {
            id,
            sound_id: sound.0,
            cursor: AtomicU64::new(0),
            playing: AtomicBool::new(true),
            paused: AtomicBool::new(paused),
        });
        *self.channel.write() = Some(channel);
        Ok(NativeChannelHandle { id, generation: id })
    }

    fn channel_stop(&self, channel: NativeChannelHandle) -> NativeResult<()> {
        let mut guard = self.channel.write();
        match guard.as_ref() {
            Some(c) if c.id == channel.id => {
                *guard = None;
                Ok(())
            }
            _ => Err(NativeError::InvalidHandle),
        }
    }

    fn channel_set_paused(&self, channel: NativeChannelHandle, paused: bool) -> NativeResult<()> {
        let guard = self.channel.read();
        match guard.as_ref() {
            Some(c) if c.id == channel.id => {
                c.paused.store(paused, Ordering::Release);
                Ok(())
            }
            _ => Err(NativeError::InvalidHandle),
        }
    }

    fn channel_get_paused(&self, channel: NativeChannelHandle) -> NativeResult<bool> {
        let guard = self.channel.read();
        match guard.as_ref() {
            Some(c) if c.id == channel.id => Ok(c.paused.load(Ordering::Acquire)),
            _ => Err(NativeError::InvalidHandle),
        }
    }

    fn channel_set_position(&self, channel: NativeChannelHandle, pcm_frame: u64) -> NativeResult<()> {
        let guard = self.channel.read();
        match guard.as_ref() {
            Some(c) if c.id == channel.id => {
                let max = self
                    .sounds
                    .lock()
                    .get(&c.sound_id)
                    .map(|s| s.format.frame_count)
                    .unwrap_or(0);
                let clamped = pcm_frame.min(max);
                c.cursor.store(clamped, Ordering::Release);
                if pcm_frame > max {
                    Err(NativeError::InvalidPosition)
                } else {
                    Ok(())
                }
            }
            _ => Err(NativeError::InvalidHandle),
        }
    }

    fn channel_get_position(&self, channel: NativeChannelHandle) -> NativeResult<u64> {
        let guard = self.channel.read();
        match guard.as_ref() {
            Some(c) if c.id == channel.id => Ok(c.cursor.load(Ordering::Acquire)),
            _ => Err(NativeError::InvalidHandle),
        }
    }

    fn channel_is_playing(&self, channel: NativeChannelHandle) -> NativeResult<bool> {
        let guard = self.channel.read();
        match guard.as_ref() {
            Some(c) if c.id == channel.id => Ok(c.playing.load(Ordering::Acquire)),
            _ => Err(NativeError::InvalidHandle),
        }
    }
}
