use std::path::PathBuf;
use std::time::Duration;

use super::*;
use crate::codec::CodecRegistry;
use crate::config::{RepeatSetting, Settings};
use crate::state::RepeatMode;

fn parsed(line: &str) -> Command {
    parse_command(line).unwrap().unwrap()
}

#[test]
fn blank_lines_are_ignored() {
    assert_eq!(parse_command("").unwrap(), None);
    assert_eq!(parse_command("   \t ").unwrap(), None);
}

#[test]
fn simple_verbs() {
    assert_eq!(parsed("next"), Command::Next);
    assert_eq!(parsed("prev"), Command::Prev);
    assert_eq!(parsed("  pause "), Command::Pause);
    assert_eq!(parsed("resume"), Command::Resume);
    assert_eq!(parsed("toggle"), Command::Toggle);
    assert_eq!(parsed("save"), Command::Save);
    assert_eq!(parsed("quit"), Command::Quit);
    assert_eq!(parsed("q"), Command::Quit);
}

#[test]
fn play_takes_a_one_based_track_number() {
    assert_eq!(
        parsed("play main 3"),
        Command::Play {
            playlist: "main".to_string(),
            number: 3
        }
    );
    assert!(parse_command("play main 0").is_err());
    assert!(parse_command("play main").is_err());
    assert!(parse_command("play main x").is_err());
    assert!(parse_command("play").is_err());
}

#[test]
fn seek_and_volume_take_numbers() {
    assert_eq!(parsed("seek 12.5"), Command::Seek(Duration::from_millis(12_500)));
    assert!(parse_command("seek -1").is_err());
    assert!(parse_command("seek soon").is_err());
    assert!(parse_command("seek 1e30").is_err());
    assert!(parse_command("seek inf").is_err());

    assert_eq!(parsed("vol 40"), Command::Volume(40.0));
    assert!(parse_command("vol NaN").is_err());
    assert!(parse_command("vol").is_err());
}

#[test]
fn switches_need_on_or_off() {
    assert_eq!(parsed("mute on"), Command::Mute(true));
    assert_eq!(parsed("shuffle off"), Command::Shuffle(false));
    assert!(parse_command("mute yes").is_err());
    assert!(parse_command("shuffle").is_err());
}

#[test]
fn repeat_modes() {
    assert_eq!(parsed("repeat none"), Command::Repeat(Some(RepeatMode::None)));
    assert_eq!(parsed("repeat all"), Command::Repeat(Some(RepeatMode::All)));
    assert_eq!(parsed("repeat single"), Command::Repeat(Some(RepeatMode::Single)));
    assert_eq!(parsed("repeat cycle"), Command::Repeat(None));
    assert!(parse_command("repeat twice").is_err());
}

#[test]
fn add_collects_every_path() {
    assert_eq!(
        parsed("add mix /music/a.flac /music/albums"),
        Command::Add {
            playlist: "mix".to_string(),
            paths: vec![PathBuf::from("/music/a.flac"), PathBuf::from("/music/albums")],
        }
    );
    assert!(parse_command("add mix").is_err());
}

#[test]
fn open_and_probe() {
    assert_eq!(parsed("open /lists/x.m3u"), Command::Open(PathBuf::from("/lists/x.m3u")));
    assert_eq!(
        parsed("probe main"),
        Command::Probe {
            playlist: "main".to_string(),
            force: false
        }
    );
    assert_eq!(
        parsed("probe main force"),
        Command::Probe {
            playlist: "main".to_string(),
            force: true
        }
    );
    assert!(parse_command("probe main now").is_err());
}

#[test]
fn unknown_verbs_and_extra_words_are_rejected() {
    let err = parse_command("dance").unwrap_err();
    assert!(err.contains("dance"), "{err}");
    assert!(parse_command("next please").is_err());
    assert!(parse_command("quit now").is_err());
}

#[test]
fn fresh_state_is_seeded_from_settings() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.state.path = Some(dir.path().join("missing.json"));
    settings.playback.repeat = RepeatSetting::All;
    settings.playback.volume = 35.0;

    let state = load_state(&settings, &CodecRegistry::new());
    assert!(state.playlists().is_empty());
    assert_eq!(state.repeat_mode(), RepeatMode::All);
    assert_eq!(state.volume(), 35.0);
}

#[test]
fn saved_state_wins_over_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut saved = crate::state::PlaybackState::new();
    saved.set_volume(12.0);
    saved.set_repeat_mode(RepeatMode::Single);
    saved.save_state(&path).unwrap();
    saved.wait_until_saved();

    let mut settings = Settings::default();
    settings.state.path = Some(path);
    settings.playback.volume = 90.0;

    let state = load_state(&settings, &CodecRegistry::new());
    assert_eq!(state.volume(), 12.0);
    assert_eq!(state.repeat_mode(), RepeatMode::Single);
}

#[test]
fn unreadable_state_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut settings = Settings::default();
    settings.state.path = Some(path);
    settings.playback.volume = 70.0;

    let state = load_state(&settings, &CodecRegistry::new());
    assert_eq!(state.volume(), 70.0);
}

#[test]
fn without_codecs_saved_playlists_are_skipped_but_settings_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"playlist_names":[{"Name":"mix","Path":"/lists/mix.m3u"}],"volume":20.0,"muted":true}"#,
    )
    .unwrap();

    let registry = codec_registry();
    assert!(registry.supported_extensions().is_empty());

    let mut settings = Settings::default();
    settings.state.path = Some(path);
    let state = load_state(&settings, &registry);
    assert!(state.playlist("mix").is_none());
    assert_eq!(state.volume(), 20.0);
    assert!(state.is_muted());
}
