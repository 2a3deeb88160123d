//! Named-track audio cues for the show.
//!
//! The router keeps the registry of symbolic track names and enforces the
//! one-track-at-a-time rule; actual sound output sits behind [`AudioSink`]
//! so playback is fire-and-forget and tests can observe cues without a sound
//! device.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::{debug, warn};

/// Track played while the wheel spins.
pub const TRACK_WHEEL: &str = "wheel";
/// Track played when the countdown starts.
pub const TRACK_TIMER_START: &str = "timer_start";
/// Warning cue at ten seconds remaining.
pub const TRACK_TIMER_WARNING: &str = "timer_prefinished";
/// Cue when the countdown reaches zero.
pub const TRACK_TIMER_FINISHED: &str = "timer_finished";

/// Output device behind the router.
///
/// Implementations must not block: cues are fired from state-handling paths.
pub trait AudioSink: Send + Sync {
    /// Begin playing `path` at `volume` (already clamped to `[0, 1]`).
    fn start(&self, track: &str, path: &Path, volume: f64);
    /// Stop whatever is playing, if anything.
    fn stop(&self);
    /// Adjust the volume of the current playback.
    fn set_volume(&self, volume: f64);
}

/// Sink that only logs the cues. Used when no audio device is wired up.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start(&self, track: &str, path: &Path, volume: f64) {
        debug!(track, path = %path.display(), volume, "audio start");
    }

    fn stop(&self) {
        debug!("audio stop");
    }

    fn set_volume(&self, volume: f64) {
        debug!(volume, "audio volume");
    }
}

/// Registry and playback gate for the named show cues.
pub struct AudioRouter {
    tracks: Mutex<IndexMap<String, PathBuf>>,
    sink: Box<dyn AudioSink>,
    playing: Mutex<Option<String>>,
    volume: Mutex<f64>,
}

impl AudioRouter {
    /// Build a router over `tracks` with the given output sink.
    pub fn new(tracks: IndexMap<String, PathBuf>, sink: Box<dyn AudioSink>) -> Self {
        Self {
            tracks: Mutex::new(tracks),
            sink,
            playing: Mutex::new(None),
            volume: Mutex::new(1.0),
        }
    }

    /// Build a router that logs cues instead of producing sound.
    pub fn with_null_sink(tracks: IndexMap<String, PathBuf>) -> Self {
        Self::new(tracks, Box::new(NullSink))
    }

    /// Play `name` at `volume` (clamped to `[0, 1]`), stopping any current
    /// track first. Unknown names are logged and ignored so a missing asset
    /// never interrupts the show.
    pub fn play(&self, name: &str, volume: f64) {
        let path = {
            let tracks = lock(&self.tracks);
            match tracks.get(name) {
                Some(path) => path.clone(),
                None => {
                    warn!(track = name, "unknown audio track requested");
                    return;
                }
            }
        };
        let volume = volume.clamp(0.0, 1.0);

        let mut playing = lock(&self.playing);
        if playing.is_some() {
            self.sink.stop();
        }
        *lock(&self.volume) = volume;
        self.sink.start(name, &path, volume);
        *playing = Some(name.to_owned());
    }

    /// Stop the current track, if any.
    pub fn stop(&self) {
        let mut playing = lock(&self.playing);
        if playing.take().is_some() {
            self.sink.stop();
        }
    }

    /// Whether a track is currently playing.
    pub fn is_playing(&self) -> bool {
        lock(&self.playing).is_some()
    }

    /// Name of the current track, if any.
    pub fn now_playing(&self) -> Option<String> {
        lock(&self.playing).clone()
    }

    /// Adjust the volume, applying it to the current playback.
    pub fn set_volume(&self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        *lock(&self.volume) = volume;
        if self.is_playing() {
            self.sink.set_volume(volume);
        }
    }

    /// Last volume set, in `[0, 1]`.
    pub fn volume(&self) -> f64 {
        *lock(&self.volume)
    }

    /// Add or replace a track registration.
    pub fn register_track(&self, name: impl Into<String>, path: impl Into<PathBuf>) {
        lock(&self.tracks).insert(name.into(), path.into());
    }

    /// Registered track names in registration order.
    pub fn track_names(&self) -> Vec<String> {
        lock(&self.tracks).keys().cloned().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
