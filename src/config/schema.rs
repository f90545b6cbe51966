use std::path::PathBuf;

use serde::Deserialize;

/// Top-level engine settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/reprise/config.toml` or `~/.config/reprise/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `REPRISE__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub player: PlayerSettings,
    pub probe: ProbeSettings,
    pub playback: PlaybackSettings,
    pub library: LibrarySettings,
    pub state: StateSettings,
    pub log: LogSettings,
}

/// How the external player process is launched and reached.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Executable to launch. Looked up on `PATH` when not absolute.
    pub program: String,
    /// Extra arguments appended after the built-in startup flags.
    pub extra_args: Vec<String>,
    /// Directory for control sockets. Defaults to `<tmp>/reprise/mpv`.
    pub socket_dir: Option<PathBuf>,
    /// How long to keep retrying the control socket (milliseconds).
    pub connect_timeout_ms: u64,
    /// How long to wait after SIGINT before killing the process (milliseconds).
    pub shutdown_grace_ms: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            program: "mpv".to_string(),
            extra_args: Vec::new(),
            socket_dir: None,
            connect_timeout_ms: 5_000,
            shutdown_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Which metadata source the probe pool uses.
    pub backend: ProbeBackend,
    /// Executable used by the `ffprobe` backend.
    pub ffprobe_path: String,
    /// Per-file deadline (milliseconds).
    pub timeout_ms: u64,
    /// Worker count. 0 means twice the available parallelism.
    pub workers: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            backend: ProbeBackend::Ffprobe,
            ffprobe_path: "ffprobe".to_string(),
            timeout_ms: 15_000,
            workers: 0,
        }
    }
}

impl ProbeSettings {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(4)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeBackend {
    Ffprobe,
    /// Read tags in-process instead of spawning a tool.
    #[serde(alias = "lofty", alias = "tag")]
    Tags,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Whether shuffle starts enabled when no saved state exists.
    pub shuffle: bool,
    /// Repeat mode used when no saved state exists.
    pub repeat: RepeatSetting,
    /// Initial volume, 0..=100.
    pub volume: f64,
    /// Tracks finishing sooner than this after starting count as fast failures.
    pub min_play_ms: u64,
    /// Consecutive fast failures tolerated before auto-advance stops.
    pub max_fast_failures: u32,
    /// Bound of the property announcement queue.
    pub notify_capacity: usize,
    /// Period of the position/bitrate poll (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            shuffle: false,
            repeat: RepeatSetting::None,
            volume: 100.0,
            min_play_ms: 250,
            max_fast_failures: 3,
            notify_capacity: 8,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatSetting {
    #[serde(alias = "off", alias = "no-repeat", alias = "no_loop", alias = "no-loop")]
    None,
    #[serde(
        alias = "loop-all",
        alias = "loop_all",
        alias = "repeat-all",
        alias = "playlist"
    )]
    All,
    #[serde(
        alias = "one",
        alias = "loop-one",
        alias = "loop_one",
        alias = "repeat-one",
        alias = "track"
    )]
    Single,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks when expanding directories.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            extensions: ["mp3", "flac", "wav", "ogg", "opus", "m4a"]
                .into_iter()
                .map(String::from)
                .collect(),
            follow_links: true,
            include_hidden: false,
            recursive: true,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Snapshot file. Defaults to `$XDG_DATA_HOME/reprise/state.json`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub filter: String,
    /// Include module targets in log lines.
    pub with_target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_target: false,
        }
    }
}
