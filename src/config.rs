//! Application-level configuration loading, including the built-in audio
//! track registry.

use std::time::Duration;
use std::{env, fs, io::ErrorKind, path::{Path, PathBuf}};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the control room looks for the JSON
/// configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CRYSTAL_OWL_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    poll_interval: Duration,
    spin_duration: Duration,
    spin_cooldown: Duration,
    spin_turns: u32,
    round_seconds: u32,
    timer_tick: Duration,
    timer_expiry_hold: Duration,
    tracks: IndexMap<String, PathBuf>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        data_dir = %config.data_dir.display(),
                        tracks = config.tracks.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Directory holding the shared document and the photo store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// How often a context re-reads the slot to catch writes it was not
    /// notified about.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Length of the wheel animation.
    pub fn spin_duration(&self) -> Duration {
        self.spin_duration
    }

    /// Minimum gap between two spin initiations.
    pub fn spin_cooldown(&self) -> Duration {
        self.spin_cooldown
    }

    /// Whole rotations before the wheel settles on the chosen segment.
    pub fn spin_turns(&self) -> u32 {
        self.spin_turns
    }

    /// Countdown length the host starts by default.
    pub fn round_seconds(&self) -> u32 {
        self.round_seconds
    }

    /// Countdown tick period. One second for the show; tests shorten it.
    pub fn timer_tick(&self) -> Duration {
        self.timer_tick
    }

    /// How long an expired countdown shows `0` before deactivating.
    pub fn timer_expiry_hold(&self) -> Duration {
        self.timer_expiry_hold
    }

    /// Audio track registry (symbolic name to asset path).
    pub fn tracks(&self) -> IndexMap<String, PathBuf> {
        self.tracks.clone()
    }

    /// Use `dir` for the shared document and the photo store.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Override the slot poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the wheel animation length.
    pub fn with_spin_duration(mut self, duration: Duration) -> Self {
        self.spin_duration = duration;
        self
    }

    /// Override the gap enforced between spin initiations.
    pub fn with_spin_cooldown(mut self, cooldown: Duration) -> Self {
        self.spin_cooldown = cooldown;
        self
    }

    /// Override the countdown tick period.
    pub fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer_tick = tick;
        self
    }

    /// Override how long an expired countdown keeps showing zero.
    pub fn with_timer_expiry_hold(mut self, hold: Duration) -> Self {
        self.timer_expiry_hold = hold;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            poll_interval: Duration::from_millis(250),
            spin_duration: Duration::from_secs(5),
            spin_cooldown: Duration::from_secs(6),
            spin_turns: 4,
            round_seconds: 60,
            timer_tick: Duration::from_secs(1),
            timer_expiry_hold: Duration::from_secs(2),
            tracks: default_tracks(),
        }
    }
}

/// JSON representation of the configuration file located at
/// [`DEFAULT_CONFIG_PATH`]. Every field is optional; omitted fields keep
/// their defaults.
#[derive(Debug, Deserialize)]
struct RawConfig {
    data_dir: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    spin_duration_ms: Option<u64>,
    spin_cooldown_ms: Option<u64>,
    spin_turns: Option<u32>,
    round_seconds: Option<u32>,
    timer_tick_ms: Option<u64>,
    timer_expiry_hold_ms: Option<u64>,
    tracks: Option<IndexMap<String, PathBuf>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: value.data_dir.unwrap_or(defaults.data_dir),
            poll_interval: value
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            spin_duration: value
                .spin_duration_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.spin_duration),
            spin_cooldown: value
                .spin_cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.spin_cooldown),
            spin_turns: value.spin_turns.unwrap_or(defaults.spin_turns),
            round_seconds: value.round_seconds.unwrap_or(defaults.round_seconds),
            timer_tick: value
                .timer_tick_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timer_tick),
            timer_expiry_hold: value
                .timer_expiry_hold_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timer_expiry_hold),
            tracks: value.tracks.unwrap_or(defaults.tracks),
        }
    }
}

/// Resolve the configuration path taking the environment override into
/// account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in cue set shipped with the binary.
fn default_tracks() -> IndexMap<String, PathBuf> {
    let names = [
        "wheel",
        "chto_nasha_zizhn_voice",
        "chto_nasha_zjizn",
        "fanfaryt",
        "gong1",
        "gong2",
        "pause1",
        "pause2",
        "pause3",
        "pause4",
        "predstavlenie_igrokov",
        "timer_finished",
        "timer_prefinished",
        "timer_start",
        "yashik",
        "yes1",
        "yes2",
        "yes3",
        "yes4",
        "znatoki_error",
    ];
    names
        .into_iter()
        .map(|name| (name.to_owned(), PathBuf::from(format!("sounds/{name}.mp3"))))
        .collect()
}
