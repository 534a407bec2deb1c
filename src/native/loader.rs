//! C1 — Native Library Loader. Resolves PACKAGED/UNPACKAGED and
//! STANDARD/LOGGING per the recognized configuration (§6) and hands back a
//! boxed `NativeSystem`. See SPEC_FULL.md §2 for why "loading" here means
//! selecting an in-process backend variant rather than `dlopen`.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{EngineConfig, LibraryType, LoadingMode};

use super::backend::MixerSystem;
use super::contract::{
    NativeChannelHandle, NativeResult, NativeSoundFormat, NativeSoundHandle, NativeSystem,
    SoundCreateFlags,
};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("library_path is required in Unpackaged loading mode")]
    MissingLibraryPath,
    #[error("library path does not exist: {0}")]
    LibraryPathNotFound(std::path::PathBuf),
    #[error("library path is not readable: {0}")]
    LibraryPathNotReadable(std::path::PathBuf),
}

/// Resolve `config` into a ready-to-initialize native system.
pub fn load_native_system(config: &EngineConfig) -> Result<Arc<dyn NativeSystem>, LoaderError> {
    if config.loading_mode == LoadingMode::Unpackaged {
        let path = config
            .library_path
            .as_ref()
            .ok_or(LoaderError::MissingLibraryPath)?;
        if !path.exists() {
            return Err(LoaderError::LibraryPathNotFound(path.clone()));
        }
        std::fs::metadata(path).map_err(|_| LoaderError::LibraryPathNotReadable(path.clone()))?;
    }

    let base = MixerSystem::new();
    let system: Arc<dyn NativeSystem> = match config.library_type {
        LibraryType::Standard => Arc::new(base),
        LibraryType::Logging => Arc::new(LoggingSystem::new(base)),
    };

    tracing::info!(
        loading_mode = ?config.loading_mode,
        library_type = ?config.library_type,
        "native system loaded"
    );
    Ok(system)
}

/// Decorator that traces every native call. Selected when
/// `LibraryType::Logging` is configured.
struct LoggingSystem<S> {
    inner: S,
}

impl<S> LoggingSystem<S> {
    fn new(inner: S) -> Self {
        LoggingSystem { inner }
    }
}

impl<S: NativeSystem> NativeSystem for LoggingSystem<S> {
    fn initialize(&self) -> NativeResult<()> {
        tracing::trace!("native call: initialize");
        let r = self.inner.initialize();
        tracing::trace!(?r, "native call: initialize returned");
        r
    }

    fn update(&self) {
        self.inner.update();
    }

    fn shutdown(&self) {
        tracing::trace!("native call: shutdown");
        self.inner.shutdown();
    }

    fn version_info(&self) -> String {
        self.inner.version_info()
    }

    fn buffer_info(&self) -> String {
        self.inner.buffer_info()
    }

    fn format_info(&self) -> String {
        self.inner.format_info()
    }

    fn create_sound(
        &self,
        path: &std::path::Path,
        flags: SoundCreateFlags,
    ) -> NativeResult<NativeSoundHandle> {
        tracing::trace!(path = %path.display(), "native call: create_sound");
        let r = self.inner.create_sound(path, flags);
        tracing::trace!(?r, "native call: create_sound returned");
        r
    }

    fn release_sound(&self, sound: NativeSoundHandle) {
        tracing::trace!(?sound, "native call: release_sound");
        self.inner.release_sound(sound);
    }

    fn sound_format(&self, sound: NativeSoundHandle) -> NativeResult<NativeSoundFormat> {
        self.inner.sound_format(sound)
    }

    fn play_sound(&self, sound: NativeSoundHandle, paused: bool) -> NativeResult<NativeChannelHandle> {
        tracing::trace!(?sound, paused, "native call: play_sound");
        let r = self.inner.play_sound(sound, paused);
        tracing::trace!(?r, "native call: play_sound returned");
        r
    }

    fn channel_stop(&self, channel: NativeChannelHandle) -> NativeResult<()> {
        tracing::trace!(?channel, "native call: channel_stop");
        self.inner.channel_stop(channel)
    }

    fn channel_set_paused(&self, channel: NativeChannelHandle, paused: bool) -> NativeResult<()> {
        tracing::trace!(?channel, paused, "native call: channel_set_paused");
        self.inner.channel_set_paused(channel, paused)
    }

    fn channel_get_paused(&self, channel: NativeChannelHandle) -> NativeResult<bool> {
        self.inner.channel_get_paused(channel)
    }

    fn channel_set_position(&self, channel: NativeChannelHandle, pcm_frame: u64) -> NativeResult<()> {
        tracing::trace!(?channel, pcm_frame, "native call: channel_set_position");
        self.inner.channel_set_position(channel, pcm_frame)
    }

    fn channel_get_position(&self, channel: NativeChannelHandle) -> NativeResult<u64> {
        self.inner.channel_get_position(channel)
    }

    fn channel_is_playing(&self, channel: NativeChannelHandle) -> NativeResult<bool> {
        self.inner.channel_is_playing(channel)
    }
}
