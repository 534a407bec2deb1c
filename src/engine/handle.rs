//! C4 — Handle Lifecycle Manager. Generation counter plus a single "current"
//! audio handle; atomic invalidation of all previously minted handles on
//! reload.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::native::NativeSoundHandle;

/// Opaque identity of a loaded audio resource (§3). A plain value type: two
/// handles are the same identity iff their `(id, generation)` pair matches,
/// which is also exactly `is_valid`'s definition once compared against the
/// table's current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioHandle {
    pub(crate) id: u64,
    pub(crate) generation: u64,
}

struct CurrentEntry {
    handle: AudioHandle,
    sound: NativeSoundHandle,
    path: PathBuf,
}

pub struct HandleTable {
    next_id: AtomicU64,
    generation: AtomicU64,
    current: RwLock<Option<CurrentEntry>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        HandleTable {
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    /// Bump the generation counter, mint a new id, store as the sole current
    /// handle. Any handle from a prior generation is invalid from this point.
    pub fn create_handle(&self, sound: NativeSoundHandle, path: &Path) -> AudioHandle {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let handle = AudioHandle { id, generation };
        *self.current.write() = Some(CurrentEntry {
            handle,
            sound,
            path: path.to_path_buf(),
        });
        handle
    }

    /// `h.generation == current_generation AND h == current_handle`.
    #[must_use]
    pub fn is_valid(&self, h: AudioHandle) -> bool {
        let guard = self.current.read();
        matches!(&*guard, Some(entry) if entry.handle == h)
    }

    /// Identical to `is_valid` for a value-typed handle: there is no
    /// separate aliasing identity to compare beyond `(id, generation)`.
    #[must_use]
    pub fn is_current(&self, h: AudioHandle) -> bool {
        self.is_valid(h)
    }

    /// Set current handle to "none". Does not touch the generation counter.
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    #[must_use]
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn current_sound(&self) -> Option<NativeSoundHandle> {
        self.current.read().as_ref().map(|e| e.sound)
    }

    #[must_use]
    pub fn current_handle(&self) -> Option<AudioHandle> {
        self.current.read().as_ref().map(|e| e.handle)
    }

    #[must_use]
    pub fn current_path(&self) -> Option<PathBuf> {
        self.current.read().as_ref().map(|e| e.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snd(id: u64) -> NativeSoundHandle {
        NativeSoundHandle(id)
    }

    #[test]
    fn fresh_handle_is_valid_and_prior_is_not() {
        let table = HandleTable::new();
        let h1 = table.create_handle(snd(1), Path::new("a.wav"));
        assert!(table.is_valid(h1));
        let h2 = table.create_handle(snd(2), Path::new("b.wav"));
        assert!(!table.is_valid(h1));
        assert!(table.is_valid(h2));
    }

    #[test]
    fn generation_is_strictly_increasing() {
        let table = HandleTable::new();
        let h1 = table.create_handle(snd(1), Path::new("a.wav"));
        let h2 = table.create_handle(snd(2), Path::new("a.wav"));
        assert!(h2.generation > h1.generation);
    }

    #[test]
    fn clear_invalidates_without_touching_generation() {
        let table = HandleTable::new();
        let h1 = table.create_handle(snd(1), Path::new("a.wav"));
        let gen_before = table.current_generation();
        table.clear();
        assert!(!table.is_valid(h1));
        assert_eq!(table.current_generation(), gen_before);
        assert!(table.current_handle().is_none());
    }
}
