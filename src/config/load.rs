use std::{env, path::PathBuf};

use super::schema::{Settings, StateSettings};

/// Configuration loading helpers.
///
/// `Settings::load` tries environment variables first (prefix `REPRISE__`), then an
/// optional config file and falls back to struct defaults.
impl Settings {
    /// Load settings from environment and optional config file.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("REPRISE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.player.program.trim().is_empty() {
            return Err("player.program must not be empty".to_string());
        }
        if self.player.connect_timeout_ms == 0 {
            return Err("player.connect_timeout_ms must be >= 1".to_string());
        }
        if self.probe.timeout_ms == 0 {
            return Err("probe.timeout_ms must be >= 1".to_string());
        }
        if self.playback.notify_capacity == 0 {
            return Err("playback.notify_capacity must be >= 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.playback.volume) {
            return Err("playback.volume must be within 0..=100".to_string());
        }
        Ok(())
    }
}

impl StateSettings {
    /// The configured snapshot path, or the XDG data default.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(default_state_path)
    }
}

/// Resolve the config path from `REPRISE_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("REPRISE_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/reprise/config.toml`
/// or `~/.config/reprise/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    xdg_dir("XDG_CONFIG_HOME", ".config").map(|d| d.join("reprise").join("config.toml"))
}

/// `$XDG_DATA_HOME/reprise/state.json` or `~/.local/share/reprise/state.json`.
pub fn default_state_path() -> Option<PathBuf> {
    xdg_dir("XDG_DATA_HOME", ".local/share").map(|d| d.join("reprise").join("state.json"))
}

fn xdg_dir(var: &str, home_fallback: &str) -> Option<PathBuf> {
    if let Some(xdg) = env::var_os(var) {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(home_fallback))
    }
}
