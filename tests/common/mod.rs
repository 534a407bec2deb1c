//! Shared scaffolding for the integration suite: a WAV fixture writer and a
//! recording `PlaybackListener`, both built on the in-memory
//! `FakeNativeSystem` so none of this touches a real audio device.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use audio_engine::native::{FakeNativeSystem, NativeSystem};
use audio_engine::{AudioEngine, EngineConfig, PlaybackHandle, PlaybackListener, PlaybackNotification};

pub fn write_wav(path: &Path, frames: u32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i % 200) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// An engine backed by the fake, plus the same fake handle so the test can
/// drive playback position/completion directly.
pub fn engine_with_fake(interval_ms: u64) -> (AudioEngine, Arc<FakeNativeSystem>) {
    let fake = Arc::new(FakeNativeSystem::new());
    let native: Arc<dyn NativeSystem> = fake.clone();
    let config = EngineConfig {
        progress_interval_ms: interval_ms,
        ..EngineConfig::default()
    };
    let engine = AudioEngine::with_native(native, &config).unwrap();
    (engine, fake)
}

#[derive(Default)]
pub struct RecordingListener {
    pub progress_calls: AtomicU64,
    pub complete_calls: AtomicU64,
    pub last_position: AtomicU64,
    pub state_changes: Mutex<Vec<(PlaybackNotification, PlaybackNotification)>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackListener for RecordingListener {
    fn on_progress(&self, _playback: PlaybackHandle, position_frames: u64, _total_frames: u64) {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        self.last_position.store(position_frames, Ordering::SeqCst);
    }

    fn on_state_changed(
        &self,
        _playback: PlaybackHandle,
        new_state: PlaybackNotification,
        old_state: PlaybackNotification,
    ) {
        self.state_changes.lock().unwrap().push((new_state, old_state));
    }

    fn on_playback_complete(&self, _playback: PlaybackHandle) {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `predicate` until it's true or `timeout` elapses. The progress timer
/// runs on its own thread, so anything that waits on a listener callback
/// needs to poll rather than assume a single fixed sleep landed after it.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if predicate() {
            return true;
        }
        if start.elapsed() >= timeout {
            return predicate();
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
