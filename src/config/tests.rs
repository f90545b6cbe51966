use super::load::{default_config_path, default_state_path, resolve_config_path};
use super::schema::*;
use std::sync::{Mutex, OnceLock};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct EnvGuard {
    key: &'static str,
    old: Option<std::ffi::OsString>,
}

impl EnvGuard {
    fn set(key: &'static str, val: &str) -> Self {
        let old = std::env::var_os(key);
        unsafe {
            std::env::set_var(key, val);
        }
        Self { key, old }
    }

    fn remove(key: &'static str) -> Self {
        let old = std::env::var_os(key);
        unsafe {
            std::env::remove_var(key);
        }
        Self { key, old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match self.old.take() {
            Some(v) => unsafe {
                std::env::set_var(self.key, v);
            },
            None => unsafe {
                std::env::remove_var(self.key);
            },
        }
    }
}

#[test]
fn resolve_config_path_prefers_reprise_config_path() {
    let _lock = env_lock();
    let _g1 = EnvGuard::set("REPRISE_CONFIG_PATH", "/tmp/reprise-test-config.toml");
    assert_eq!(
        resolve_config_path().unwrap(),
        std::path::PathBuf::from("/tmp/reprise-test-config.toml")
    );
}

#[test]
fn default_config_path_prefers_xdg_config_home() {
    let _lock = env_lock();
    let _g1 = EnvGuard::set("XDG_CONFIG_HOME", "/tmp/xdg-config-home");
    let _g2 = EnvGuard::set("HOME", "/tmp/home-should-not-win");

    let p = default_config_path().unwrap();
    assert_eq!(
        p,
        std::path::PathBuf::from("/tmp/xdg-config-home")
            .join("reprise")
            .join("config.toml")
    );
}

#[test]
fn default_config_path_falls_back_to_home_dot_config() {
    let _lock = env_lock();
    let _g1 = EnvGuard::remove("XDG_CONFIG_HOME");
    let _g2 = EnvGuard::set("HOME", "/tmp/home-dir");

    let p = default_config_path().unwrap();
    assert_eq!(
        p,
        std::path::PathBuf::from("/tmp/home-dir")
            .join(".config")
            .join("reprise")
            .join("config.toml")
    );
}

#[test]
fn state_path_uses_xdg_data_home_unless_configured() {
    let _lock = env_lock();
    let _g1 = EnvGuard::set("XDG_DATA_HOME", "/tmp/xdg-data");

    assert_eq!(
        default_state_path().unwrap(),
        std::path::PathBuf::from("/tmp/xdg-data/reprise/state.json")
    );

    let configured = StateSettings {
        path: Some("/srv/state.json".into()),
    };
    assert_eq!(
        configured.resolved_path().unwrap(),
        std::path::PathBuf::from("/srv/state.json")
    );
}

#[test]
fn defaults_match_documented_constants() {
    let s = Settings::default();
    assert_eq!(s.player.program, "mpv");
    assert_eq!(s.player.connect_timeout_ms, 5_000);
    assert_eq!(s.probe.timeout_ms, 15_000);
    assert_eq!(s.probe.backend, ProbeBackend::Ffprobe);
    assert_eq!(s.playback.min_play_ms, 250);
    assert_eq!(s.playback.max_fast_failures, 3);
    assert_eq!(s.playback.repeat, RepeatSetting::None);
    assert!(s.validate().is_ok());
}

#[test]
fn worker_count_defaults_to_twice_parallelism() {
    let auto = ProbeSettings::default();
    assert!(auto.worker_count() >= 2);
    assert_eq!(auto.worker_count() % 2, 0);

    let fixed = ProbeSettings {
        workers: 3,
        ..ProbeSettings::default()
    };
    assert_eq!(fixed.worker_count(), 3);
}

#[test]
fn settings_load_from_config_file_and_parse_repeat_aliases() {
    let _lock = env_lock();

    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        r#"
[player]
program = "/usr/local/bin/mpv"
extra_args = ["--audio-device=null"]
connect_timeout_ms = 1500

[probe]
backend = "lofty"
timeout_ms = 2000
workers = 6

[playback]
shuffle = true
repeat = "repeat-one"
volume = 40.0
min_play_ms = 500

[library]
extensions = ["mp3"]
recursive = false
include_hidden = true

[state]
path = "/tmp/reprise-state.json"

[log]
filter = "reprise=debug"
"#,
    )
    .unwrap();

    let _g1 = EnvGuard::set("REPRISE_CONFIG_PATH", cfg_path.to_str().unwrap());
    let _g2 = EnvGuard::remove("REPRISE__PLAYER__CONNECT_TIMEOUT_MS");

    let s = Settings::load().unwrap();
    assert_eq!(s.player.program, "/usr/local/bin/mpv");
    assert_eq!(s.player.extra_args, vec!["--audio-device=null".to_string()]);
    assert_eq!(s.player.connect_timeout_ms, 1500);
    assert_eq!(s.player.shutdown_grace_ms, 2_000);
    assert_eq!(s.probe.backend, ProbeBackend::Tags);
    assert_eq!(s.probe.timeout_ms, 2000);
    assert_eq!(s.probe.worker_count(), 6);
    assert!(s.playback.shuffle);
    assert_eq!(s.playback.repeat, RepeatSetting::Single);
    assert_eq!(s.playback.volume, 40.0);
    assert_eq!(s.playback.min_play_ms, 500);
    assert_eq!(s.playback.max_fast_failures, 3);
    assert_eq!(s.library.extensions, vec!["mp3".to_string()]);
    assert!(!s.library.recursive);
    assert!(s.library.include_hidden);
    assert_eq!(
        s.state.path.as_deref(),
        Some(std::path::Path::new("/tmp/reprise-state.json"))
    );
    assert_eq!(s.log.filter, "reprise=debug");
}

#[test]
fn settings_env_overrides_config_file() {
    let _lock = env_lock();

    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("config.toml");
    std::fs::write(
        &cfg_path,
        r#"
[player]
connect_timeout_ms = 250
"#,
    )
    .unwrap();

    let _g1 = EnvGuard::set("REPRISE_CONFIG_PATH", cfg_path.to_str().unwrap());
    let _g2 = EnvGuard::set("REPRISE__PLAYER__CONNECT_TIMEOUT_MS", "9000");

    let s = Settings::load().unwrap();
    assert_eq!(s.player.connect_timeout_ms, 9000);
}

#[test]
fn validate_rejects_out_of_range_values() {
    let mut s = Settings::default();
    s.playback.volume = 140.0;
    assert!(s.validate().is_err());

    let mut s = Settings::default();
    s.player.connect_timeout_ms = 0;
    assert!(s.validate().is_err());

    let mut s = Settings::default();
    s.playback.notify_capacity = 0;
    assert!(s.validate().is_err());
}
