//! The remaining universal invariants not already covered by a named
//! scenario: listener isolation, idempotent same-file loads, safe repeated
//! close, and state-machine legality surfaced through the facade.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use audio_engine::error::{EngineApiError, PlaybackError};
use audio_engine::{PlaybackHandle, PlaybackListener, PlaybackNotification};

use common::{engine_with_fake, write_wav};

struct PanickingListener;

impl PlaybackListener for PanickingListener {
    fn on_state_changed(&self, _playback: PlaybackHandle, _new: PlaybackNotification, _old: PlaybackNotification) {
        panic!("a deliberately misbehaving listener");
    }
}

struct CountingListener {
    state_changes: AtomicU64,
}

impl PlaybackListener for CountingListener {
    fn on_state_changed(&self, _playback: PlaybackHandle, _new: PlaybackNotification, _old: PlaybackNotification) {
        self.state_changes.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn loading_the_same_file_twice_is_idempotent() {
    let (engine, _fake) = engine_with_fake(100);
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    write_wav(&a, 1_000, 48_000);

    let h1 = engine.load_audio(&a).unwrap();
    let h2 = engine.load_audio(&a).unwrap();
    assert_eq!(h1, h2);
}

#[test]
fn a_panicking_listener_does_not_stop_other_listeners_from_observing_state_changes() {
    let (engine, _fake) = engine_with_fake(100);
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    write_wav(&a, 1_000, 48_000);
    let handle = engine.load_audio(&a).unwrap();

    let counting = Arc::new(CountingListener { state_changes: AtomicU64::new(0) });
    engine.add_playback_listener(Arc::new(PanickingListener));
    engine.add_playback_listener(counting.clone() as Arc<dyn PlaybackListener>);

    let playback = engine.play(handle).unwrap();
    engine.pause(playback).unwrap();
    engine.stop(playback).unwrap();

    // play -> Playing, pause -> Paused, stop -> Stopped: three notifications,
    // each one surviving the panicking listener ahead of it in the list.
    assert_eq!(counting.state_changes.load(Ordering::SeqCst), 3);
}

#[test]
fn close_is_idempotent_and_invalidates_further_operations() {
    let (engine, _fake) = engine_with_fake(100);
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    write_wav(&a, 1_000, 48_000);
    let handle = engine.load_audio(&a).unwrap();
    let playback = engine.play(handle).unwrap();

    engine.close();
    engine.close(); // must not panic or double-release

    assert!(matches!(engine.load_audio(&a), Err(EngineApiError::Engine(_))));
    assert!(matches!(engine.pause(playback), Err(EngineApiError::Engine(_))));
}

#[test]
fn pausing_a_playback_that_is_not_current_is_rejected() {
    let (engine, _fake) = engine_with_fake(100);
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    write_wav(&a, 1_000, 48_000);
    let handle = engine.load_audio(&a).unwrap();

    let playback = engine.play(handle).unwrap();
    engine.stop(playback).unwrap();

    assert!(matches!(engine.pause(playback), Err(EngineApiError::Playback(PlaybackError::NotActive))));
}
