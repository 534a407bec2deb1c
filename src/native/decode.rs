//! Full-file decode via `symphonia`, shared by the mixer backend (C3/C6) and
//! the bulk sample reader (C10). Each caller decides what to do with the
//! interleaved samples; this module only turns bytes into PCM.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Decoded audio, interleaved `f32` PCM normalized to `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u32,
    /// Container/codec tag as reported by the probe, e.g. "wav", "mp3".
    pub format_tag: String,
    /// Frame count as reported by the container header, when known. May be
    /// `None` for streams without an accurate length (falls back to the
    /// number of frames actually decoded).
    pub declared_frame_count: Option<u64>,
}

impl DecodedAudio {
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u64
    }
}

/// Errors surfaced while decoding a file. These are mapped onto
/// `crate::error::LoadError` at the C5/C10 boundary; see `error::map_decode_error`.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Decode an audio file into interleaved `f32` PCM, with optional progress
/// reporting as a percentage (only when the container declares a frame count).
pub fn decode_file_with_progress<F>(
    path: &Path,
    mut on_progress: F,
) -> Result<DecodedAudio, DecodeError>
where
    F: FnMut(u8),
{
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let format_tag = probed
        .format
        .tracks()
        .first()
        .and_then(|t| symphonia::default::get_codecs().get_codec(t.codec_params.codec))
        .map(|d| d.short_name.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let mut format = probed.format;

    let track = format
        .default_track()
        .or_else(|| {
            format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        })
        .ok_or_else(|| DecodeError::UnsupportedFormat("no audio tracks found".into()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("unknown sample rate".into()))?;

    let channels = track
        .codec_params
        .channels
        .map(|ch| ch.count() as u16)
        .ok_or_else(|| DecodeError::UnsupportedFormat("unknown channel layout".into()))?;

    if channels == 0 {
        return Err(DecodeError::UnsupportedFormat("zero channels".into()));
    }

    let bits_per_sample = track.codec_params.bits_per_sample.unwrap_or(0);
    let declared_frame_count = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedCodec(e.to_string()))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut frames_decoded: u64 = 0;
    let mut last_pct: u8 = 0;

    loop {
        let packet = match format.next_packet() {
            Ok(pkt) => pkt,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::Decode(e.to_string())),
        };

        let spec = *audio_buf.spec();
        // Use frames() (actual decoded count), not capacity(), to avoid
        // reading zero-padded silence between packets.
        let frames = audio_buf.frames() as u64;
        let needed_samples = frames as usize * spec.channels.count();

        let buf = match &mut sample_buf {
            Some(existing) if existing.capacity() >= needed_samples => existing,
            _ => {
                sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
                sample_buf
                    .as_mut()
                    .expect("sample_buf was just assigned Some")
            }
        };
        buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(buf.samples());

        frames_decoded += frames;

        if let Some(total) = declared_frame_count {
            if total > 0 {
                // u128 to avoid overflow on extremely long files.
                let pct = ((frames_decoded as u128 * 100) / total as u128).min(100) as u8;
                if pct != last_pct {
                    on_progress(pct);
                    last_pct = pct;
                }
            }
        }
    }

    if samples.is_empty() {
        return Err(DecodeError::Decode("no audio samples decoded".into()));
    }

    let audio = DecodedAudio {
        samples,
        sample_rate,
        channels,
        bits_per_sample,
        format_tag,
        declared_frame_count,
    };
    tracing::debug!(
        path = %path.display(),
        sample_rate,
        channels,
        frames = audio.frame_count(),
        "decoded audio file"
    );
    Ok(audio)
}

/// Decode an audio file into interleaved `f32` PCM, discarding progress.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    decode_file_with_progress(path, |_| {})
}

/// Map a short codec/container name reported by symphonia onto one of the
/// format tags the spec's data model recognizes.
#[must_use]
pub fn normalize_format_tag(short_name: &str) -> &'static str {
    let lower = short_name.to_ascii_lowercase();
    if lower.contains("wav") || lower.contains("pcm") {
        "WAV"
    } else if lower.contains("aiff") || lower.contains("aif") {
        "AIFF"
    } else if lower.contains("mp3") || lower.contains("mpeg") {
        "MP3"
    } else if lower.contains("vorbis") || lower.contains("ogg") {
        "OGG"
    } else if lower.contains("flac") {
        "FLAC"
    } else if lower.contains("opus") {
        "Opus"
    } else if lower.contains("raw") {
        "RAW"
    } else {
        "Unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn write_test_wav(path: &std::path::Path, sample_rate: u32, duration_secs: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        let n = (sample_rate as f32 * duration_secs) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let s = (2.0 * PI * 440.0 * t).sin() * 0.5;
            writer
                .write_sample((s * i16::MAX as f32) as i16)
                .expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn decodes_basic_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 44_100, 0.5);

        let decoded = decode_file(&path).expect("decode");
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.channels, 1);
        assert!((decoded.frame_count() as f64 / 44_100.0 - 0.5).abs() < 0.05);
        for &s in &decoded.samples {
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn normalizes_format_tags() {
        assert_eq!(normalize_format_tag("PCM"), "WAV");
        assert_eq!(normalize_format_tag("MP3"), "MP3");
        assert_eq!(normalize_format_tag("FLAC"), "FLAC");
        assert_eq!(normalize_format_tag("Vorbis"), "OGG");
        assert_eq!(normalize_format_tag("whatever"), "Unknown");
    }
}
