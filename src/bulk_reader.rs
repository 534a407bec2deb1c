//! C10 — Bulk Sample Reader. Decodes a file fully into a normalized buffer,
//! caches per canonical path, serves random-range reads for waveform
//! rendering. Runs on its own small `tokio` runtime, independent of C3-C8's
//! playback system (§5: "C10 must NOT share the playback system").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Runtime;

use crate::error::LoadError;
use crate::metadata::AudioData;
use crate::native::backend::MixerSystem;
use crate::native::decode::{decode_file, DecodeError};
use crate::native::NativeSystem;

/// Minimal init flags the spec calls for on C10's private native system:
/// 32 channels, no mixing work ever actually routed through it.
const BULK_READER_CHANNELS: u16 = 32;

struct CachedAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

pub struct BulkSampleReader {
    runtime: Runtime,
    cache: Arc<Mutex<HashMap<PathBuf, Arc<CachedAudio>>>>,
    /// Own native system instance, kept only for lifecycle parity with C3
    /// (§9: "two independent native systems ... must not share handles").
    /// Bulk decode itself goes through `native::decode` directly: the
    /// System/Sound/Channel contract has no bulk-PCM-read operation to
    /// reuse here.
    _native: Arc<dyn NativeSystem>,
}

impl BulkSampleReader {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("bulk-reader")
            .enable_all()
            .build()?;

        let native: Arc<dyn NativeSystem> = Arc::new(MixerSystem::new());
        if let Err(e) = native.initialize() {
            tracing::warn!(?e, "bulk reader's private native system failed to initialize");
        }
        tracing::debug!(channels = BULK_READER_CHANNELS, "bulk sample reader ready");

        Ok(BulkSampleReader {
            runtime,
            cache: Arc::new(Mutex::new(HashMap::new())),
            _native: native,
        })
    }

    /// Decode-and-cache `path` if not already cached, then serve
    /// `[start_frame, start_frame + frame_count)`, clamped at EOF.
    pub fn read_range(
        &self,
        path: &Path,
        start_frame: u64,
        frame_count: u64,
    ) -> tokio::task::JoinHandle<Result<AudioData, LoadError>> {
        let path = path.to_path_buf();
        let cache = self.cache.clone();
        self.runtime.spawn_blocking(move || {
            let cached = fetch_or_decode(&cache, &path)?;
            Ok(slice_range(&cached, start_frame, frame_count))
        })
    }
}

fn fetch_or_decode(
    cache: &Mutex<HashMap<PathBuf, Arc<CachedAudio>>>,
    path: &Path,
) -> Result<Arc<CachedAudio>, LoadError> {
    let mut guard = cache.lock();
    if let Some(existing) = guard.get(path) {
        return Ok(existing.clone());
    }
    let decoded = decode_file(path).map_err(|e| map_decode_error(e, path))?;
    let entry = Arc::new(CachedAudio {
        samples: decoded.samples,
        sample_rate: decoded.sample_rate,
        channels: decoded.channels,
    });
    guard.insert(path.to_path_buf(), entry.clone());
    Ok(entry)
}

fn slice_range(audio: &CachedAudio, start_frame: u64, frame_count: u64) -> AudioData {
    let channels = audio.channels.max(1) as u64;
    let total_frames = audio.samples.len() as u64 / channels;
    let start = start_frame.min(total_frames);
    let available = total_frames - start;
    let take = frame_count.min(available);

    let start_idx = (start * channels) as usize;
    let end_idx = ((start + take) * channels) as usize;
    let samples: Vec<f64> = audio.samples[start_idx..end_idx]
        .iter()
        .map(|&s| s as f64)
        .collect();

    AudioData {
        samples,
        sample_rate: audio.sample_rate,
        channel_count: audio.channels,
        start_frame: start,
        frame_count: take,
    }
}

fn map_decode_error(e: DecodeError, path: &Path) -> LoadError {
    match e {
        DecodeError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            LoadError::FileNotFound(path.to_path_buf())
        }
        DecodeError::Io(_) => LoadError::PathInvalid {
            reason: "i/o error while decoding".into(),
        },
        DecodeError::UnsupportedFormat(_) | DecodeError::UnsupportedCodec(_) => LoadError::Unsupported,
        DecodeError::Decode(_) => LoadError::Corrupted,
    }
}
