//! Recognized configuration surface (§6). The engine never loads this from
//! disk or environment itself — that stays the embedder's job — but the
//! struct is `serde`-shaped so an external loader can deserialize it
//! directly into what `native::loader` expects.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the native backend is resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LoadingMode {
    /// Loaded by name from the OS library path.
    #[default]
    Packaged,
    /// Loaded from a filesystem path (`library_path`).
    Unpackaged,
}

/// Which backend variant to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LibraryType {
    #[default]
    Standard,
    /// Traces every native call at `tracing::trace!`.
    Logging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub loading_mode: LoadingMode,
    pub library_type: LibraryType,
    /// Required (and validated to exist) when `loading_mode == Unpackaged`.
    pub library_path: Option<PathBuf>,
    /// Progress timer period for C8's monitor, in milliseconds.
    pub progress_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            loading_mode: LoadingMode::Packaged,
            library_type: LibraryType::Standard,
            library_path: None,
            progress_interval_ms: 100,
        }
    }
}
