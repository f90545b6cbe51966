use super::*;
use crate::config::LibrarySettings;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| title_from_path(p)).collect()
}

#[test]
fn is_audio_file_matches_configured_extensions_case_insensitive() {
    let settings = LibrarySettings::default();
    assert!(is_audio_file(Path::new("/tmp/a.mp3"), &settings));
    assert!(is_audio_file(Path::new("/tmp/a.MP3"), &settings));
    assert!(is_audio_file(Path::new("/tmp/a.flac"), &settings));
    assert!(is_audio_file(Path::new("/tmp/a.opus"), &settings));
    assert!(!is_audio_file(Path::new("/tmp/a.txt"), &settings));
    assert!(!is_audio_file(Path::new("/tmp/a"), &settings));

    let dotted = LibrarySettings {
        extensions: vec![".WAV".into()],
        ..LibrarySettings::default()
    };
    assert!(is_audio_file(Path::new("/tmp/a.wav"), &dotted));
}

#[test]
fn title_is_the_file_stem() {
    assert_eq!(title_from_path(Path::new("/music/01 - Intro.flac")), "01 - Intro");
    assert_eq!(title_from_path(Path::new("noext")), "noext");
}

#[test]
fn directories_expand_sorted_and_files_keep_order() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b.MP3"), b"x").unwrap();
    fs::write(dir.path().join("a.ogg"), b"x").unwrap();
    fs::write(dir.path().join("c.txt"), b"x").unwrap();

    let loose = dir.path().join("z.flac");
    fs::write(&loose, b"x").unwrap();
    let other = tempdir().unwrap();
    let sub = other.path().join("one.wav");
    fs::write(&sub, b"x").unwrap();

    let settings = LibrarySettings::default();
    let found = collect_audio_files(
        &[sub.clone(), dir.path().to_path_buf(), PathBuf::from("/nope/readme.md")],
        &settings,
    );
    assert_eq!(names(&found), vec!["one", "a", "b", "z"]);
}

#[test]
fn respects_include_hidden_false() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(".hidden.mp3"), b"x").unwrap();
    fs::write(dir.path().join("visible.mp3"), b"x").unwrap();
    let hidden_dir = dir.path().join(".cache");
    fs::create_dir_all(&hidden_dir).unwrap();
    fs::write(hidden_dir.join("inside.mp3"), b"x").unwrap();

    let found = collect_audio_files(&[dir.path().to_path_buf()], &LibrarySettings::default());
    assert_eq!(names(&found), vec!["visible"]);

    let settings = LibrarySettings {
        include_hidden: true,
        ..LibrarySettings::default()
    };
    assert_eq!(collect_audio_files(&[dir.path().to_path_buf()], &settings).len(), 3);
}

#[test]
fn respects_recursive_false() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("root.mp3"), b"x").unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join("child.mp3"), b"x").unwrap();

    let settings = LibrarySettings {
        recursive: false,
        ..LibrarySettings::default()
    };
    let found = collect_audio_files(&[dir.path().to_path_buf()], &settings);
    assert_eq!(names(&found), vec!["root"]);
}

#[test]
fn respects_max_depth() {
    let dir = tempdir().unwrap();
    let d1 = dir.path().join("d1");
    let d2 = d1.join("d2");
    fs::create_dir_all(&d2).unwrap();
    fs::write(dir.path().join("root.mp3"), b"x").unwrap();
    fs::write(d1.join("one.mp3"), b"x").unwrap();
    fs::write(d2.join("two.mp3"), b"x").unwrap();

    // WalkDir depth counts root as 0, children as 1, grandchildren as 2...
    let settings = LibrarySettings {
        max_depth: Some(2),
        ..LibrarySettings::default()
    };
    let found = names(&collect_audio_files(&[dir.path().to_path_buf()], &settings));
    assert!(found.contains(&"root".to_string()));
    assert!(found.contains(&"one".to_string()));
    assert!(!found.contains(&"two".to_string()));
}
