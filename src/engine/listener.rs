//! C8 — Listener Manager. Copy-on-write subscriber list, a single daemon
//! progress-timer thread, latency-compensated position reporting, and
//! exception isolation per subscriber.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};

use crate::native::contract::{DSP_BUFFER_LENGTH, DSP_NUM_BUFFERS, SOFTWARE_SAMPLE_RATE};

use super::playback_manager::PlaybackHandle;
use super::playback_state::{PlaybackNotification, PlaybackPhase, PlaybackStateMachine};

/// Collaborator-facing event sink (§6). All four callbacks are optional;
/// default bodies do nothing.
pub trait PlaybackListener: Send + Sync {
    fn on_progress(&self, _playback: PlaybackHandle, _position_frames: u64, _total_frames: u64) {}
    fn on_state_changed(
        &self,
        _playback: PlaybackHandle,
        _new_state: PlaybackNotification,
        _old_state: PlaybackNotification,
    ) {
    }
    fn on_playback_complete(&self, _playback: PlaybackHandle) {}
    fn on_playback_error(&self, _playback: Option<PlaybackHandle>, _message: &str) {}
}

/// The subset of C6 the progress timer needs: raw decoded position, and a
/// way to mark the channel gone without issuing a native stop (it's already
/// gone or finished naturally).
pub trait PlaybackController: Send + Sync {
    fn decoded_position(&self) -> Option<u64>;
    fn mark_inactive(&self);
}

struct Monitor {
    stop_tx: Sender<()>,
    join: std::thread::JoinHandle<()>,
}

struct MonitorParams {
    playback: PlaybackHandle,
    total_frames: u64,
    source_rate: u32,
}

pub struct ListenerManager {
    subscribers: Arc<RwLock<Arc<Vec<Arc<dyn PlaybackListener>>>>>,
    monitor: Mutex<Option<Monitor>>,
    state: Arc<PlaybackStateMachine>,
    shutdown: AtomicBool,
    interval: Duration,
}

impl ListenerManager {
    #[must_use]
    pub fn new(state: Arc<PlaybackStateMachine>, interval: Duration) -> Self {
        ListenerManager {
            subscribers: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            monitor: Mutex::new(None),
            state,
            shutdown: AtomicBool::new(false),
            interval,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn PlaybackListener>) {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("add_listener called after shutdown; ignored");
            return;
        }
        let mut guard = self.subscribers.write();
        let mut next = (**guard).clone();
        next.push(listener);
        *guard = Arc::new(next);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PlaybackListener>) {
        let mut guard = self.subscribers.write();
        let next: Vec<_> = (**guard)
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        *guard = Arc::new(next);
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn PlaybackListener>>> {
        self.subscribers.read().clone()
    }

    fn for_each_listener(&self, name: &str, f: impl Fn(&Arc<dyn PlaybackListener>)) {
        for listener in self.snapshot().iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(listener)));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "listener panicked".to_string());
                tracing::warn!(callback = name, %message, "playback listener panicked; isolated");
            }
        }
    }

    pub fn notify_state_changed(&self, h: PlaybackHandle, new: PlaybackNotification, old: PlaybackNotification) {
        self.for_each_listener("on_state_changed", |l| l.on_state_changed(h, new, old));
    }

    pub fn notify_playback_complete(&self, h: PlaybackHandle) {
        let Some(old) = self.state.transition_to_finished() else {
            return;
        };
        self.notify_state_changed(h, PlaybackNotification::Finished, old.into());
        self.for_each_listener("on_playback_complete", |l| l.on_playback_complete(h));
    }

    pub fn notify_error(&self, h: Option<PlaybackHandle>, message: &str) {
        self.for_each_listener("on_playback_error", |l| l.on_playback_error(h, message));
    }

    /// Stops any existing timer, records the new handle/total, and (if
    /// subscribers exist) schedules `update_progress` at a fixed interval,
    /// ticking immediately at t=0.
    pub fn start_monitoring(
        &self,
        playback: PlaybackHandle,
        total_frames: u64,
        source_rate: u32,
        controller: Arc<dyn PlaybackController>,
    ) {
        self.stop_monitoring();

        if self.snapshot().is_empty() {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let params = MonitorParams {
            playback,
            total_frames,
            source_rate,
        };
        let manager = self.clone_for_thread();
        let interval = self.interval;

        let join = std::thread::Builder::new()
            .name("progress-timer".into())
            .spawn(move || {
                manager.update_progress(&params, &controller);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            manager.update_progress(&params, &controller);
                            if !manager.still_relevant() {
                                break;
                            }
                        }
                        _ => break,
                    }
                }
            })
            .expect("spawn progress-timer thread");

        *self.monitor.lock() = Some(Monitor { stop_tx, join });
    }

    /// Cheap self-handle for the spawned thread: `ListenerManager` itself
    /// isn't `Clone`-able wholesale (the monitor slot must stay singular),
    /// so the thread gets a thin view sharing the same subscriber list and
    /// state machine — subscribers added/removed mid-playback stay visible.
    fn clone_for_thread(&self) -> ThreadView {
        ThreadView {
            subscribers: self.subscribers.clone(),
            state: self.state.clone(),
        }
    }

    /// Cancels the timer: signal then join with a brief wait, forcing
    /// detachment if the thread doesn't exit promptly.
    pub fn stop_monitoring(&self) {
        if let Some(monitor) = self.monitor.lock().take() {
            let _ = monitor.stop_tx.send(());
            if monitor.join.is_finished() {
                let _ = monitor.join.join();
            } else {
                std::thread::spawn(move || {
                    let _ = monitor.join.join();
                });
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.stop_monitoring();
        *self.subscribers.write() = Arc::new(Vec::new());
    }
}

/// A read-only view handed to the progress-timer thread so it can fan out
/// notifications without reaching back through the full `ListenerManager`
/// (which would need to re-enter `self.monitor`, already held by the thread
/// that spawned it).
struct ThreadView {
    subscribers: Arc<RwLock<Arc<Vec<Arc<dyn PlaybackListener>>>>>,
    state: Arc<PlaybackStateMachine>,
}

impl ThreadView {
    fn snapshot(&self) -> Arc<Vec<Arc<dyn PlaybackListener>>> {
        self.subscribers.read().clone()
    }

    /// Natural stop condition independent of the stop channel: once the
    /// playback state machine has left PLAYING/PAUSED, nothing further to
    /// report (either `handle_stopped` already ran, or an external stop/seek
    /// moved the state out from under us).
    fn still_relevant(&self) -> bool {
        matches!(self.state.get_phase(), PlaybackPhase::Playing | PlaybackPhase::Paused)
    }

    fn for_each_listener(&self, name: &str, f: impl Fn(&Arc<dyn PlaybackListener>)) {
        for listener in self.snapshot().iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(listener)));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "listener panicked".to_string());
                tracing::warn!(callback = name, %message, "playback listener panicked; isolated");
            }
        }
    }

    /// A natural end of playback: PLAYING -> FINISHED (held, not STOPPED —
    /// `get_state`/`is_stopped` must be able to tell this apart from a user
    /// `stop()` per §3/§4.6). Gated on `transition_to_finished` actually
    /// firing, so a second tick that finds the channel already gone (e.g.
    /// the very next timer tick after a t=0 `play_range(h, n, n)`) observes
    /// the phase already FINISHED and does not fire `on_playback_complete`
    /// twice.
    fn handle_stopped(&self, h: PlaybackHandle, controller: &Arc<dyn PlaybackController>) {
        controller.mark_inactive();
        let Some(old) = self.state.transition_to_finished() else {
            return;
        };
        let old: PlaybackNotification = old.into();
        self.for_each_listener("on_state_changed", |l| {
            l.on_state_changed(h, PlaybackNotification::Finished, old);
        });
        self.for_each_listener("on_playback_complete", |l| l.on_playback_complete(h));
    }

    /// One timer tick: latency-compensated position report, with completion
    /// detection on channel loss or reaching `end_frame`.
    fn update_progress(&self, params: &MonitorParams, controller: &Arc<dyn PlaybackController>) {
        let Some(decoded) = controller.decoded_position() else {
            self.handle_stopped(params.playback, controller);
            return;
        };

        let hearing = compensate_latency(
            decoded,
            params.playback.start_frame(),
            params.source_rate,
            SOFTWARE_SAMPLE_RATE,
            DSP_BUFFER_LENGTH,
            DSP_NUM_BUFFERS,
        );

        self.for_each_listener("on_progress", |l| {
            l.on_progress(params.playback, hearing, params.total_frames);
        });

        if let Some(end) = params.playback.end_frame() {
            if hearing >= end {
                self.handle_stopped(params.playback, controller);
            }
        }
    }
}

/// GLOSSARY: hearing position = decoded position minus the buffer lead.
///
/// `lead_out = buffer_length * max(0, num_buffers - 1) + buffer_length / 2`,
/// converted into source-frame units when `source_rate != output_rate`, then
/// clamped to `rel = max(0, decoded - start_frame)` before subtracting.
/// Falls back to the uncompensated decoded position if any rate/size input
/// is zero.
#[must_use]
pub fn compensate_latency(
    decoded: u64,
    start_frame: u64,
    source_rate: u32,
    output_rate: u32,
    buffer_length: u32,
    num_buffers: u32,
) -> u64 {
    if buffer_length == 0 || num_buffers == 0 || output_rate == 0 || source_rate == 0 {
        return decoded;
    }
    let lead_out = buffer_length as u64 * num_buffers.saturating_sub(1) as u64 + buffer_length as u64 / 2;
    let lead_src = if source_rate != output_rate {
        ((lead_out as f64) * source_rate as f64 / output_rate as f64).round() as u64
    } else {
        lead_out
    };
    let rel = decoded.saturating_sub(start_frame);
    let lead_src = lead_src.min(rel);
    start_frame + (rel - lead_src)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_lag_matches_formula() {
        let decoded = 100_000;
        let hearing = compensate_latency(decoded, 0, 48_000, 48_000, 256, 4);
        let expected_lag = 256 * 3 + 128;
        assert_eq!(hearing, decoded - expected_lag);
    }

    #[test]
    fn zero_rate_returns_uncompensated() {
        assert_eq!(compensate_latency(500, 0, 0, 48_000, 256, 4), 500);
    }

    #[test]
    fn lag_clamped_to_relative_position() {
        // decoded is close to start_frame, so the raw lead would go negative.
        let hearing = compensate_latency(1_005, 1_000, 48_000, 48_000, 256, 4);
        assert_eq!(hearing, 1_000);
    }

    #[test]
    fn differing_rates_scale_the_lead() {
        let decoded = 200_000;
        let hearing = compensate_latency(decoded, 0, 44_100, 48_000, 256, 4);
        let lead_out = 256 * 3 + 128;
        let lead_src = ((lead_out as f64) * 44_100.0 / 48_000.0).round() as u64;
        assert_eq!(hearing, decoded - lead_src);
    }
}
