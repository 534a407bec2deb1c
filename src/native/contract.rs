//! The opaque system/sound/channel contract the spec describes in §6:
//! `System_Create/Init/Update/Release/SetDSPBufferSize/GetDSPBufferSize/
//! SetSoftwareFormat/GetSoftwareFormat/GetVersion/CreateSound/PlaySound,
//! Sound_Release/GetFormat/GetDefaults/GetLength/Lock/Unlock,
//! Channel_Stop/SetPaused/GetPaused/SetPosition/GetPosition/IsPlaying`.
//!
//! `MixerSystem` (native/backend.rs) is the one implementation of this
//! contract this workspace ships; see SPEC_FULL.md §2 for why there is no
//! FFI binding to an actual shared object here.

use thiserror::Error;

/// Non-OK native result codes the spec calls out as needing mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("native: invalid handle")]
    InvalidHandle,
    #[error("native: channel stolen")]
    ChannelStolen,
    #[error("native: invalid position")]
    InvalidPosition,
    #[error("native: file not found")]
    FileNotFound,
    #[error("native: unrecognized format")]
    Format,
    #[error("native: file corrupted")]
    FileBad,
    #[error("native: out of memory")]
    Memory,
    #[error("native: generic failure (code {0})")]
    Generic(i32),
}

pub type NativeResult<T> = Result<T, NativeError>;

/// Handle to a created native sound. Opaque; carries no data a caller should
/// interpret beyond identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSoundHandle(pub(crate) u64);

/// Handle to a native channel returned by `play_sound`. Carries a generation
/// so the backend can detect a channel that has since been stolen/replaced
/// (mapped to `NativeError::InvalidHandle`/`ChannelStolen`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeChannelHandle {
    pub(crate) id: u64,
    pub(crate) generation: u64,
}

/// Sound creation flags. The spec's C5 step 5 calls for "accurate time".
#[derive(Debug, Clone, Copy, Default)]
pub struct SoundCreateFlags {
    pub accurate_time: bool,
}

/// Format facts read back off a created sound (C5's `get_current_metadata`).
#[derive(Debug, Clone)]
pub struct NativeSoundFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u32,
    pub format_tag: String,
    pub frame_count: u64,
}

/// The native system/mixer contract (C3 lifecycle + sound/channel ops used
/// by C5/C6). One system owns at most one current channel at a time, per
/// the spec's single-playback Non-goal.
pub trait NativeSystem: Send + Sync {
    /// Idempotent-guarded: fails if already initialized.
    fn initialize(&self) -> NativeResult<()>;
    /// Safe to call in any state; no-op if not initialized.
    fn update(&self);
    /// Idempotent.
    fn shutdown(&self);

    fn version_info(&self) -> String;
    fn buffer_info(&self) -> String;
    fn format_info(&self) -> String;

    fn create_sound(
        &self,
        path: &std::path::Path,
        flags: SoundCreateFlags,
    ) -> NativeResult<NativeSoundHandle>;
    fn release_sound(&self, sound: NativeSoundHandle);
    fn sound_format(&self, sound: NativeSoundHandle) -> NativeResult<NativeSoundFormat>;

    /// Create a channel playing `sound` from frame 0 to its natural end,
    /// created paused iff `paused`. Range playback is realized above this
    /// layer: the caller seeks to a start position with
    /// `channel_set_position` and polls position to detect an end frame,
    /// matching how the spec's C6/C8 split this responsibility.
    fn play_sound(&self, sound: NativeSoundHandle, paused: bool) -> NativeResult<NativeChannelHandle>;

    fn channel_stop(&self, channel: NativeChannelHandle) -> NativeResult<()>;
    fn channel_set_paused(&self, channel: NativeChannelHandle, paused: bool) -> NativeResult<()>;
    fn channel_get_paused(&self, channel: NativeChannelHandle) -> NativeResult<bool>;
    fn channel_set_position(&self, channel: NativeChannelHandle, pcm_frame: u64) -> NativeResult<()>;
    fn channel_get_position(&self, channel: NativeChannelHandle) -> NativeResult<u64>;
    fn channel_is_playing(&self, channel: NativeChannelHandle) -> NativeResult<bool>;
}

/// DSP buffer shape the spec pins: 256 frames x 4 buffers.
pub const DSP_BUFFER_LENGTH: u32 = 256;
pub const DSP_NUM_BUFFERS: u32 = 4;
/// Software mix format the spec pins for the playback system.
pub const SOFTWARE_SAMPLE_RATE: u32 = 48_000;
pub const SOFTWARE_CHANNELS: u16 = 1;
