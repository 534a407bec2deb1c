//! Audio-annotation backend engine: native decoder/mixer ownership,
//! generation-based handle safety, a two-tier state machine, latency
//! compensated progress events, and bulk sample reads for waveform
//! rendering. See `SPEC_FULL.md` for the full component breakdown.
//!
//! The JSON-RPC transport, session translation, and UI front end are
//! someone else's crate; this one is consumed by embedding [`AudioEngine`]
//! and [`BulkSampleReader`] directly.

pub mod bulk_reader;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod native;

pub use bulk_reader::BulkSampleReader;
pub use config::EngineConfig;
pub use engine::{AudioEngine, AudioHandle, EngineState, PlaybackHandle, PlaybackListener, PlaybackNotification, PlaybackPhase};
pub use error::EngineApiError;
pub use metadata::{AudioData, AudioMetadata};
