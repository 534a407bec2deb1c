//! In-process realization of `NativeSystem` (C3) on top of `cpal` (output
//! callback/mixer) and `native::decode` (symphonia decode). See
//! SPEC_FULL.md §2 for why this stands in for an externally loaded shared
//! object.
//!
//! `cpal::Stream` is not `Send` on most backends, so it cannot live inside a
//! struct this trait requires to be `Send + Sync`. Instead `initialize`
//! spawns a dedicated thread that builds the device/stream, starts it, and
//! then simply blocks until told to shut down; all state the rest of the
//! system touches lives in `Shared`, which is plain atomics and locks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::{Mutex, RwLock};

use super::contract::{
    NativeChannelHandle, NativeError, NativeResult, NativeSoundFormat, NativeSoundHandle,
    NativeSystem, SoundCreateFlags, DSP_BUFFER_LENGTH, DSP_NUM_BUFFERS, SOFTWARE_CHANNELS,
    SOFTWARE_SAMPLE_RATE,
};
use super::decode::{self, normalize_format_tag, DecodedAudio};

struct DecodedSound {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u32,
    format_tag: String,
    frame_count: u64,
}

impl From<DecodedAudio> for DecodedSound {
    fn from(a: DecodedAudio) -> Self {
        let frame_count = a.frame_count();
        DecodedSound {
            samples: a.samples,
            sample_rate: a.sample_rate,
            channels: a.channels,
            bits_per_sample: a.bits_per_sample,
            format_tag: normalize_format_tag(&a.format_tag).to_string(),
            frame_count,
        }
    }
}

struct ChannelSlot {
    id: u64,
    sound: Arc<DecodedSound>,
    /// Source-domain frame position, stored as `f64::to_bits` for atomic access.
    cursor_bits: AtomicU64,
    playing: AtomicBool,
    paused: AtomicBool,
    finished: AtomicBool,
}

/// State shared between the control-plane (trait methods, called from any
/// thread) and the cpal audio callback.
struct Shared {
    slot: RwLock<Option<Arc<ChannelSlot>>>,
    sounds: Mutex<HashMap<u64, Arc<DecodedSound>>>,
    next_sound_id: AtomicU64,
    next_channel_id: AtomicU64,
    device_channels: AtomicU16,
    output_rate: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        Shared {
            slot: RwLock::new(None),
            sounds: Mutex::new(HashMap::new()),
            next_sound_id: AtomicU64::new(1),
            next_channel_id: AtomicU64::new(1),
            device_channels: AtomicU16::new(0),
            output_rate: AtomicU32::new(0),
        }
    }
}

struct Running {
    shared: Arc<Shared>,
    shutdown_tx: crossbeam_channel::Sender<()>,
    audio_thread: Option<JoinHandle<()>>,
}

/// FMOD-shaped mixer system backed by `cpal` + `symphonia`.
pub struct MixerSystem {
    state: Mutex<Option<Running>>,
}

impl Default for MixerSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MixerSystem {
    #[must_use]
    pub fn new() -> Self {
        MixerSystem {
            state: Mutex::new(None),
        }
    }

    fn with_shared<T>(&self, f: impl FnOnce(&Arc<Shared>) -> NativeResult<T>) -> NativeResult<T> {
        let guard = self.state.lock();
        match guard.as_ref() {
            Some(running) => f(&running.shared),
            None => Err(NativeError::Generic(-1)),
        }
    }

    fn slot_for(shared: &Shared, handle: NativeChannelHandle) -> NativeResult<Arc<ChannelSlot>> {
        let guard = shared.slot.read();
        match guard.as_ref() {
            Some(slot) if slot.id == handle.id => Ok(Arc::clone(slot)),
            _ => Err(NativeError::InvalidHandle),
        }
    }
}

impl NativeSystem for MixerSystem {
    fn initialize(&self) -> NativeResult<()> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Err(NativeError::Generic(-2));
        }

        let shared = Arc::new(Shared::new());
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<NativeResult<()>>(1);

        let thread_shared = Arc::clone(&shared);
        let audio_thread = std::thread::Builder::new()
            .name("mixer-audio".into())
            .spawn(move || run_audio_thread(thread_shared, shutdown_rx, ready_tx))
            .expect("failed to spawn mixer audio thread");

        match ready_rx.recv() {
            Ok(Ok(())) => {
                *state = Some(Running {
                    shared,
                    shutdown_tx,
                    audio_thread: Some(audio_thread),
                });
                tracing::info!("mixer system initialized");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = audio_thread.join();
                Err(NativeError::Generic(-3))
            }
        }
    }

    fn update(&self) {
        // The cpal callback runs independently; nothing to pump here.
    }

    fn shutdown(&self) {
        let running = self.state.lock().take();
        if let Some(mut running) = running {
            let _ = running.shutdown_tx.send(());
            if let Some(handle) = running.audio_thread.take() {
                let _ = handle.join();
            }
            tracing::info!("mixer system shut down");
        }
    }

    fn version_info(&self) -> String {
        self.with_shared(|_| Ok("mixer-backend/cpal+symphonia 1.0".to_string()))
            .unwrap_or_default()
    }

    fn buffer_info(&self) -> String {
        self.with_shared(|_| Ok(format!("{DSP_BUFFER_LENGTH}x{DSP_NUM_BUFFERS}")))
            .unwrap_or_default()
    }

    fn format_info(&self) -> String {
        self.with_shared(|shared| {
            Ok(format!(
                "{}Hz {}ch",
                shared.output_rate.load(Ordering::Acquire),
                shared.device_channels.load(Ordering::Acquire)
            ))
        })
        .unwrap_or_default()
    }

    fn create_sound(
        &self,
        path: &Path,
        _flags: SoundCreateFlags,
    ) -> NativeResult<NativeSoundHandle> {
        self.with_shared(|shared| {
            let decoded = decode::decode_file(path).map_err(map_decode_error)?;
            let sound: DecodedSound = decoded.into();
            let id = shared.next_sound_id.fetch_add(1, Ordering::Relaxed);
            shared.sounds.lock().insert(id, Arc::new(sound));
            Ok(NativeSoundHandle(id))
        })
    }

    fn release_sound(&self, sound: NativeSoundHandle) {
        let _ = self.with_shared(|shared| {
            shared.sounds.lock().remove(&sound.0);
            Ok(())
        });
    }

    fn sound_format(&self, sound: NativeSoundHandle) -> NativeResult<NativeSoundFormat> {
        self.with_shared(|shared| {
            let sounds = shared.sounds.lock();
            let s = sounds.get(&sound.0).ok_or(NativeError::InvalidHandle)?;
            Ok(NativeSoundFormat {
                sample_rate: s.sample_rate,
                channels: s.channels,
                bits_per_sample: s.bits_per_sample,
                format_tag: s.format_tag.clone(),
                frame_count: s.frame_count,
            })
        })
    }

    fn play_sound(&self, sound: NativeSoundHandle, paused: bool) -> NativeResult<NativeChannelHandle> {
        self.with_shared(|shared| {
            let sound_ref = shared
                .sounds
                .lock()
                .get(&sound.0)
                .cloned()
                .ok_or(NativeError::InvalidHandle)?;

            let id = shared.next_channel_id.fetch_add(1, Ordering::Relaxed);
            let slot = Arc::new(ChannelSlot {
                id,
                sound: sound_ref,
                cursor_bits: AtomicU64::new(0.0_f64.to_bits()),
                playing: AtomicBool::new(!paused),
                paused: AtomicBool::new(paused),
                finished: AtomicBool::new(false),
            });
            *shared.slot.write() = Some(slot);
            Ok(NativeChannelHandle { id, generation: id })
        })
    }

    fn channel_stop(&self, channel: NativeChannelHandle) -> NativeResult<()> {
        self.with_shared(|shared| {
            let mut guard = shared.slot.write();
            match guard.as_ref() {
                Some(slot) if slot.id == channel.id => {
                    slot.playing.store(false, Ordering::Release);
                    *guard = None;
                    Ok(())
                }
                _ => Err(NativeError::InvalidHandle),
            }
        })
    }

    fn channel_set_paused(&self, channel: NativeChannelHandle, paused: bool) -> NativeResult<()> {
        self.with_shared(|shared| {
            let slot = Self::slot_for(shared, channel)?;
            slot.paused.store(paused, Ordering::Release);
            Ok(())
        })
    }

    fn channel_get_paused(&self, channel: NativeChannelHandle) -> NativeResult<bool> {
        self.with_shared(|shared| {
            let slot = Self::slot_for(shared, channel)?;
            Ok(slot.paused.load(Ordering::Acquire))
        })
    }

    fn channel_set_position(&self, channel: NativeChannelHandle, pcm_frame: u64) -> NativeResult<()> {
        self.with_shared(|shared| {
            let slot = Self::slot_for(shared, channel)?;
            let max = slot.sound.frame_count;
            let clamped = pcm_frame.min(max);
            slot.cursor_bits
                .store((clamped as f64).to_bits(), Ordering::Release);
            slot.finished.store(false, Ordering::Release);
            if pcm_frame > max {
                Err(NativeError::InvalidPosition)
            } else {
                Ok(())
            }
        })
    }

    fn channel_get_position(&self, channel: NativeChannelHandle) -> NativeResult<u64> {
        self.with_shared(|shared| {
            let slot = Self::slot_for(shared, channel)?;
            let cursor = f64::from_bits(slot.cursor_bits.load(Ordering::Acquire));
            Ok(cursor as u64)
        })
    }

    fn channel_is_playing(&self, channel: NativeChannelHandle) -> NativeResult<bool> {
        self.with_shared(|shared| {
            let slot = Self::slot_for(shared, channel)?;
            Ok(!slot.finished.load(Ordering::Acquire))
        })
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

/// Owns the cpal device/stream for the lifetime of the mixer. Runs entirely
/// on its own thread since `cpal::Stream` is not `Send`.
fn run_audio_thread(
    shared: Arc<Shared>,
    shutdown_rx: crossbeam_channel::Receiver<()>,
    ready_tx: crossbeam_channel::Sender<NativeResult<()>>,
) {
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err(NativeError::Generic(-4)));
            return;
        }
    };

    let config = match pick_config(&device) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let stream_config: StreamConfig = config.clone().into();
    shared
        .device_channels
        .store(stream_config.channels, Ordering::Release);
    shared
        .output_rate
        .store(stream_config.sample_rate.0, Ordering::Release);

    let sample_format = config.sample_format();
    let build = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, Arc::clone(&shared)),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, Arc::clone(&shared)),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, Arc::clone(&shared)),
        _other => Err(NativeError::Generic(-5)),
    };

    let stream = match build {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        tracing::error!("failed to start mixer stream: {e}");
        let _ = ready_tx.send(Err(NativeError::Generic(-6)));
        return;
    }

    let _ = ready_tx.send(Ok(()));
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn pick_config(device: &cpal::Device) -> NativeResult<cpal::SupportedStreamConfig> {
    if let Ok(mut configs) = device.supported_output_configs() {
        if let Some(matching) = configs.find(|c| {
            c.channels() == SOFTWARE_CHANNELS
                && c.min_sample_rate().0 <= SOFTWARE_SAMPLE_RATE
                && c.max_sample_rate().0 >= SOFTWARE_SAMPLE_RATE
        }) {
            return Ok(matching.with_sample_rate(cpal::SampleRate(SOFTWARE_SAMPLE_RATE)));
        }
    }

    device
        .default_output_config()
        .map_err(|_| NativeError::Generic(-7))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    shared: Arc<Shared>,
) -> NativeResult<cpal::Stream> {
    let device_channels = config.channels as usize;
    let output_rate = config.sample_rate.0;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mix_into(data, device_channels, output_rate, &shared);
            },
            |err| tracing::error!("mixer stream error: {err}"),
            None,
        )
        .map_err(|_| NativeError::Generic(-8))
}

/// Real-time mix: downmix the current channel's source to mono, resample to
/// `output_rate` via linear interpolation, and replicate across every
/// device channel. Mono/48kHz normalization, not an effect.
fn mix_into<T: cpal::SizedSample + cpal::FromSample<f32>>(
    output: &mut [T],
    device_channels: usize,
    output_rate: u32,
    shared: &Shared,
) {
    let silence = T::from_sample(0.0f32);

    if device_channels == 0 {
        return;
    }

    let guard = match shared.slot.try_read() {
        Some(g) => g,
        None => {
            fill_silence(output, silence);
            return;
        }
    };

    let slot = match guard.as_ref() {
        Some(s) if s.playing.load(Ordering::Acquire) && !s.paused.load(Ordering::Acquire) => s,
        _ => {
            fill_silence(output, silence);
            return;
        }
    };

    let sound = &slot.sound;
    let src_channels = sound.channels as usize;
    if src_channels == 0 || sound.sample_rate == 0 || output_rate == 0 {
        fill_silence(output, silence);
        return;
    }

    let ratio = sound.sample_rate as f64 / output_rate as f64;
    let frame_count = sound.frame_count;
    let mut cursor = f64::from_bits(slot.cursor_bits.load(Ordering::Acquire));

    for frame in output.chunks_mut(device_channels) {
        if slot.finished.load(Ordering::Acquire) || cursor >= frame_count as f64 {
            slot.finished.store(true, Ordering::Release);
            for s in frame.iter_mut() {
                *s = silence;
            }
            continue;
        }

        let idx0 = cursor.floor() as u64;
        let frac = cursor - idx0 as f64;
        let idx1 = (idx0 + 1).min(frame_count.saturating_sub(1));

        let v0 = mono_frame(&sound.samples, idx0, src_channels);
        let v1 = mono_frame(&sound.samples, idx1, src_channels);
        let mono_val = (v0 as f64 * (1.0 - frac) + v1 as f64 * frac) as f32;

        for s in frame.iter_mut() {
            *s = T::from_sample(mono_val);
        }

        cursor += ratio;
    }

    slot.cursor_bits.store(cursor.to_bits(), Ordering::Release);
}

fn mono_frame(samples: &[f32], frame_idx: u64, channels: usize) -> f32 {
    let base = frame_idx as usize * channels;
    if base + channels > samples.len() {
        return 0.0;
    }
    let sum: f32 = samples[base..base + channels].iter().sum();
    sum / channels as f32
}

fn fill_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(output: &mut [T], silence: T) {
    for s in output.iter_mut() {
        *s = silence;
    }
}
