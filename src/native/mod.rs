//! Native decoder/mixer contract (C1/C3) — see SPEC_FULL.md §2.

pub mod backend;
pub mod contract;
pub mod decode;
pub mod fake;
pub mod loader;

pub use contract::{
    NativeChannelHandle, NativeError, NativeResult, NativeSoundFormat, NativeSoundHandle,
    NativeSystem, SoundCreateFlags,
};
pub use fake::FakeNativeSystem;
pub use loader::{load_native_system, LoaderError};
