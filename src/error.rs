//! Error taxonomy (§7). One `thiserror` enum per kind named in the spec,
//! plus a single native-code mapping function every component routes
//! through (§9's "centralize the table").

use thiserror::Error;

use crate::native::NativeError;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("file not found: {0}")]
    FileNotFound(std::path::PathBuf),
    #[error("unsupported audio format")]
    Unsupported,
    #[error("corrupted audio file")]
    Corrupted,
    #[error("out of memory decoding audio")]
    OutOfMemory,
    #[error("path invalid: {reason}")]
    PathInvalid { reason: String },
    #[error("load failed (native code {code})")]
    LoadFailed { code: i32 },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid engine state: expected {expected}, was {actual}")]
    WrongState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("engine already initialized")]
    AlreadyInitialized,
    #[error("engine already closed")]
    AlreadyClosed,
    #[error("native system failed to initialize (code {code})")]
    NativeInitFailed { code: i32 },
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("playback handle is not active")]
    NotActive,
    #[error("playback handle is not the current playback")]
    NotCurrent,
    #[error("invalid range: start must be >= 0 and end >= start")]
    InvalidRange,
    #[error("channel lost")]
    ChannelLost,
    #[error("another playback is already active")]
    ConcurrentOperation,
    #[error("playback failed (native code {code})")]
    PlaybackFailed { code: i32 },
}

/// Top-level error returned by the facade (C9), aggregating the kinds above
/// plus the audio-handle validity errors that don't fit any one kind.
#[derive(Error, Debug)]
pub enum EngineApiError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Loader(#[from] crate::native::LoaderError),
    #[error("audio handle is not valid or not the currently loaded audio")]
    InvalidAudioHandle,
}

/// Native-code -> error-kind mapping for load operations (§9's "centralize
/// native-code -> error-kind mapping in one place").
pub fn map_native_load_error(e: NativeError) -> LoadError {
    match e {
        NativeError::FileNotFound => LoadError::FileNotFound(std::path::PathBuf::new()),
        NativeError::Format => LoadError::Unsupported,
        NativeError::FileBad => LoadError::Corrupted,
        NativeError::Memory => LoadError::OutOfMemory,
        NativeError::Generic(code) => LoadError::LoadFailed { code },
        NativeError::InvalidHandle | NativeError::ChannelStolen | NativeError::InvalidPosition => {
            LoadError::LoadFailed { code: -1 }
        }
    }
}

/// Native-code -> error-kind mapping for playback operations.
pub fn map_native_playback_error(e: NativeError) -> PlaybackError {
    match e {
        NativeError::InvalidHandle | NativeError::ChannelStolen => PlaybackError::ChannelLost,
        NativeError::Generic(code) => PlaybackError::PlaybackFailed { code },
        NativeError::InvalidPosition => PlaybackError::PlaybackFailed { code: -2 },
        NativeError::FileNotFound | NativeError::Format | NativeError::FileBad | NativeError::Memory => {
            PlaybackError::PlaybackFailed { code: -3 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handle_maps_to_channel_lost() {
        assert!(matches!(
            map_native_playback_error(NativeError::InvalidHandle),
            PlaybackError::ChannelLost
        ));
        assert!(matches!(
            map_native_playback_error(NativeError::ChannelStolen),
            PlaybackError::ChannelLost
        ));
    }

    #[test]
    fn native_format_maps_to_unsupported_load_error() {
        assert!(matches!(
            map_native_load_error(NativeError::Format),
            LoadError::Unsupported
        ));
    }
}
