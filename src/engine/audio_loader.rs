//! C5 — Audio Loading Manager. Loads/normalizes a file, extracts metadata,
//! enforces the single-audio invariant, safely swaps the current sound.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;

use crate::error::{map_native_load_error, EngineApiError, EngineError, LoadError};
use crate::metadata::AudioMetadata;
use crate::native::{NativeSystem, SoundCreateFlags};

use super::handle::{AudioHandle, HandleTable};
use super::lifecycle::{EngineState, LifecycleState};

pub struct AudioLoader {
    native: Arc<dyn NativeSystem>,
    lifecycle: Arc<LifecycleState>,
    handles: HandleTable,
    loading_lock: Mutex<()>,
    metadata: RwLock<Option<AudioMetadata>>,
}

fn canonicalize_for_load(path: &Path) -> Result<PathBuf, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }
    let canonical = path.canonicalize().map_err(|_| LoadError::PathInvalid {
        reason: "path resolution failed".into(),
    })?;
    if canonical.is_dir() {
        return Err(LoadError::PathInvalid {
            reason: "is a directory".into(),
        });
    }
    std::fs::File::open(&canonical).map_err(|_| LoadError::PathInvalid {
        reason: "not readable".into(),
    })?;
    Ok(canonical)
}

impl AudioLoader {
    #[must_use]
    pub fn new(native: Arc<dyn NativeSystem>, lifecycle: Arc<LifecycleState>) -> Self {
        AudioLoader {
            native,
            lifecycle,
            handles: HandleTable::new(),
            loading_lock: Mutex::new(()),
            metadata: RwLock::new(None),
        }
    }

    pub fn load_audio(&self, path: &Path) -> Result<AudioHandle, EngineApiError> {
        let _guard = self.loading_lock.lock();

        let canonical = canonicalize_for_load(path)?;

        if self.handles.current_path().as_deref() == Some(canonical.as_path()) {
            if let Some(existing) = self.handles.current_handle() {
                return Ok(existing);
            }
        }

        self.lifecycle.check_state_any(&[EngineState::Initialized])?;

        let new_sound = self
            .native
            .create_sound(&canonical, SoundCreateFlags { accurate_time: true })
            .map_err(map_native_load_error)?;

        // Read the new sound's format, and only once that succeeds release
        // the prior one and mint the new handle — a failure here must leave
        // the prior sound (and its handle) as the current one, per the
        // creation-failure invariant.
        let format = match self.native.sound_format(new_sound) {
            Ok(format) => format,
            Err(err) => {
                self.native.release_sound(new_sound);
                return Err(map_native_load_error(err));
            }
        };
        let meta = AudioMetadata::new(
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            format.format_tag.clone(),
            format.frame_count,
        );

        if let Some(old_sound) = self.handles.current_sound() {
            self.native.release_sound(old_sound);
        }

        let handle = self.handles.create_handle(new_sound, &canonical);
        *self.metadata.write() = Some(meta);

        tracing::debug!(path = %canonical.display(), id = handle.id, generation = handle.generation, "audio loaded");
        Ok(handle)
    }

    /// Cached metadata for the currently loaded audio, under the lock.
    pub fn get_current_metadata(&self) -> Result<AudioMetadata, EngineApiError> {
        self.metadata
            .read()
            .clone()
            .ok_or(EngineApiError::InvalidAudioHandle)
    }

    pub fn release_all(&self) {
        let _guard = self.loading_lock.lock();
        if let Some(sound) = self.handles.current_sound() {
            self.native.release_sound(sound);
        }
        self.handles.clear();
        *self.metadata.write() = None;
    }

    #[must_use]
    pub fn is_valid(&self, h: AudioHandle) -> bool {
        self.handles.is_valid(h)
    }

    #[must_use]
    pub fn current_sound(&self) -> Option<crate::native::NativeSoundHandle> {
        self.handles.current_sound()
    }

    #[must_use]
    pub fn current_handle(&self) -> Option<AudioHandle> {
        self.handles.current_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::FakeNativeSystem;

    fn loader() -> (AudioLoader, tempfile::TempDir) {
        let lifecycle = Arc::new(LifecycleState::new());
        lifecycle
            .transition_to::<_, EngineError>(EngineState::Initializing, || Ok(()))
            .unwrap();
        lifecycle
            .transition_to::<_, EngineError>(EngineState::Initialized, || Ok(()))
            .unwrap();
        let native: Arc<dyn NativeSystem> = Arc::new(FakeNativeSystem::new());
        native.initialize().unwrap();
        let dir = tempfile::tempdir().unwrap();
        (AudioLoader::new(native, lifecycle), dir)
    }

    fn write_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..4_410_i16 {
            writer.write_sample(i % 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let (loader, dir) = loader();
        let missing = dir.path().join("nope.wav");
        let err = loader.load_audio(&missing).unwrap_err();
        assert!(matches!(err, EngineApiError::Load(LoadError::FileNotFound(_))));
    }

    #[test]
    fn directory_path_is_path_invalid() {
        let (loader, dir) = loader();
        let err = loader.load_audio(dir.path()).unwrap_err();
        assert!(matches!(err, EngineApiError::Load(LoadError::PathInvalid { .. })));
    }

    #[test]
    fn loading_same_file_twice_returns_same_handle() {
        let (loader, dir) = loader();
        let file = dir.path().join("a.wav");
        write_wav(&file);
        let h1 = loader.load_audio(&file).unwrap();
        let h2 = loader.load_audio(&file).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn loading_a_new_file_invalidates_the_old_handle() {
        let (loader, dir) = loader();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a);
        write_wav(&b);
        let h1 = loader.load_audio(&a).unwrap();
        assert!(loader.is_valid(h1));
        let h2 = loader.load_audio(&b).unwrap();
        assert!(!loader.is_valid(h1));
        assert!(loader.is_valid(h2));
    }

    #[test]
    fn metadata_matches_known_wav() {
        let (loader, dir) = loader();
        let file = dir.path().join("a.wav");
        write_wav(&file);
        loader.load_audio(&file).unwrap();
        let meta = loader.get_current_metadata().unwrap();
        assert_eq!(meta.sample_rate, 44_100);
        assert_eq!(meta.channel_count, 1);
        assert_eq!(meta.frame_count, 4_410);
    }
}
