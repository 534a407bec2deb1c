//! Value types shared across components (§3): `AudioMetadata` (C5) and
//! `AudioData` (C10's bulk read result).

/// Metadata extracted once at load time (C5::get_current_metadata).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u32,
    pub format_tag: String,
    pub frame_count: u64,
    pub duration_seconds: f64,
}

impl AudioMetadata {
    /// Build metadata the way C5 does: duration from `frames / frequency`,
    /// never from a milliseconds accessor, for precision.
    #[must_use]
    pub fn new(sample_rate: u32, channel_count: u16, bits_per_sample: u32, format_tag: String, frame_count: u64) -> Self {
        let duration_seconds = if sample_rate == 0 {
            0.0
        } else {
            frame_count as f64 / sample_rate as f64
        };
        AudioMetadata {
            sample_rate,
            channel_count,
            bits_per_sample,
            format_tag,
            frame_count,
            duration_seconds,
        }
    }
}

/// A bulk range read served by C10, interleaved and normalized to `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub start_frame: u64,
    /// Actual frame count returned; may be less than requested at EOF.
    pub frame_count: u64,
}

impl AudioData {
    /// Invariant 4 (§8): `len(samples) == channel_count * frame_count`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.samples.len() as u64 == self.channel_count as u64 * self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_frames_over_rate() {
        let m = AudioMetadata::new(44_100, 1, 16, "WAV".into(), 1_993_624);
        assert!((m.duration_seconds - 1_993_624.0 / 44_100.0).abs() < f64::EPSILON * 10.0);
    }

    #[test]
    fn zero_sample_rate_yields_zero_duration() {
        let m = AudioMetadata::new(0, 1, 16, "WAV".into(), 1_000);
        assert_eq!(m.duration_seconds, 0.0);
    }

    #[test]
    fn well_formed_checks_sample_count() {
        let ok = AudioData {
            samples: vec![0.0; 20],
            sample_rate: 48_000,
            channel_count: 2,
            start_frame: 0,
            frame_count: 10,
        };
        assert!(ok.is_well_formed());

        let bad = AudioData {
            samples: vec![0.0; 19],
            ..ok
        };
        assert!(!bad.is_well_formed());
    }
}
