use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::codec::tests::{MemoryCodec, memory_registry, parsed};
use crate::error::{ProbeError, TransportError};
use crate::mailbox::{Inbox, mailbox};
use crate::probe::{ProbeReport, Prober};
use crate::transport::{Completion, PlayTime};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Play(PathBuf, Option<PathBuf>),
    QueueNext(PathBuf),
    ClearNext,
    Seek(Duration),
    SetPlay(bool),
    Volume(f64),
    Mute(bool),
}

/// Records every command and completes it successfully.
#[derive(Clone, Default)]
struct RecordingTransport {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingTransport {
    fn record(&self, call: Call, done: Completion) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(call);
        done(Ok(()));
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn play_track(&self, path: &Path, next: Option<&Path>, done: Completion) -> Result<(), TransportError> {
        self.record(Call::Play(path.to_path_buf(), next.map(Path::to_path_buf)), done)
    }

    fn queue_next(&self, next: Option<&Path>, done: Completion) -> Result<(), TransportError> {
        match next {
            Some(next) => self.record(Call::QueueNext(next.to_path_buf()), done),
            None => self.record(Call::ClearNext, done),
        }
    }

    fn seek(&self, position: Duration, done: Completion) -> Result<(), TransportError> {
        self.record(Call::Seek(position), done)
    }

    fn set_play(&self, playing: bool, done: Completion) -> Result<(), TransportError> {
        self.record(Call::SetPlay(playing), done)
    }

    fn set_volume(&self, percent: f64, done: Completion) -> Result<(), TransportError> {
        self.record(Call::Volume(percent), done)
    }

    fn set_mute(&self, muted: bool, done: Completion) -> Result<(), TransportError> {
        self.record(Call::Mute(muted), done)
    }

    fn play_time(&self) -> PlayTime {
        PlayTime {
            position: Duration::from_secs(3),
            remaining: Duration::from_secs(7),
            bitrate: 192_000.0,
        }
    }
}

struct ArtistProber;

impl Prober for ArtistProber {
    fn probe(&self, _path: &Path) -> Result<ProbeReport, ProbeError> {
        Ok(ProbeReport {
            artist: Some("Probed".into()),
            ..ProbeReport::default()
        })
    }
}

type TestPlayer = Player<RecordingTransport>;

struct Harness {
    player: TestPlayer,
    inbox: Inbox<TestPlayer>,
    calls: Arc<Mutex<Vec<Call>>>,
    codec: Arc<MemoryCodec>,
}

impl Harness {
    fn new(files: &[&str], min_play: Duration) -> Self {
        let mut state = PlaybackState::new();
        state.create_playlist("main", "/lists/main.mem");
        state.add_tracks("main", 0, true, files.iter().map(PathBuf::from).collect());

        let transport = RecordingTransport::default();
        let calls = transport.calls.clone();
        let codec = MemoryCodec::with([parsed("other", &["/m/x.mp3", "/m/y.mp3"])]);
        let (mb, inbox) = mailbox::<TestPlayer>();
        let probes = ProbePool::new(Arc::new(ArtistProber), mb.clone(), 2);
        let options = PlayerOptions {
            min_play,
            max_fast_failures: 3,
            library: Default::default(),
            state_path: None,
        };
        let player = Player::new(state, transport, mb, probes, memory_registry(codec.clone()), options);
        Self {
            player,
            inbox,
            calls,
            codec,
        }
    }

    fn abc() -> Self {
        Self::new(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"], Duration::ZERO)
    }

    /// Commands sent since the last call.
    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn current_index(&self) -> Option<usize> {
        self.player.state().now_playing().map(|s| s.index)
    }

    fn eof(&mut self) {
        self.player
            .on_transport_event(TransportEvent::FileEnded(EndReason::Eof));
    }
}

fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}

#[test]
fn play_loads_the_track_with_its_successor() {
    let mut h = Harness::abc();
    assert!(h.player.play_track("main", 0));
    assert_eq!(
        h.take_calls(),
        vec![
            Call::Play(p("/m/a.mp3"), Some(p("/m/b.mp3"))),
            Call::SetPlay(true),
        ]
    );
    assert_eq!(h.player.status(), PlaybackStatus::Playing);
}

#[test]
fn unknown_playlist_or_index_is_refused() {
    let mut h = Harness::abc();
    assert!(!h.player.play_track("nope", 0));
    assert!(!h.player.play_track("main", 3));
    assert!(h.take_calls().is_empty());
    assert_eq!(h.player.status(), PlaybackStatus::Stopped);
}

#[test]
fn natural_end_hands_off_gaplessly() {
    let mut h = Harness::abc();
    h.player.play_track("main", 0);
    h.take_calls();

    h.eof();
    // The player already moved to b; only the track after it is queued.
    assert_eq!(h.take_calls(), vec![Call::QueueNext(p("/m/c.mp3"))]);
    assert_eq!(h.current_index(), Some(1));

    h.eof();
    // Nothing after c without repeat: nothing to queue.
    assert!(h.take_calls().is_empty());
    assert_eq!(h.current_index(), Some(2));
    assert_eq!(h.player.status(), PlaybackStatus::Playing);

    h.eof();
    assert_eq!(h.take_calls(), vec![Call::SetPlay(false)]);
    assert_eq!(h.player.status(), PlaybackStatus::Stopped);
}

#[test]
fn repeat_all_wraps_the_preload() {
    let mut h = Harness::abc();
    h.player.set_repeat(RepeatMode::All);
    h.player.play_track("main", 2);
    assert_eq!(
        h.take_calls()[0],
        Call::Play(p("/m/c.mp3"), Some(p("/m/a.mp3")))
    );

    h.eof();
    assert_eq!(h.take_calls(), vec![Call::QueueNext(p("/m/b.mp3"))]);
    assert_eq!(h.current_index(), Some(0));
}

#[test]
fn changing_repeat_replaces_the_preload() {
    let mut h = Harness::abc();
    h.player.play_track("main", 0);
    h.take_calls();

    h.player.set_repeat(RepeatMode::Single);
    assert_eq!(h.take_calls(), vec![Call::QueueNext(p("/m/a.mp3"))]);

    h.eof();
    assert_eq!(h.take_calls(), vec![Call::QueueNext(p("/m/a.mp3"))]);
    assert_eq!(h.current_index(), Some(0));
}

#[test]
fn stale_preload_falls_back_to_a_full_load() {
    let mut h = Harness::abc();
    h.player.play_track("main", 0);
    h.take_calls();

    // Bypass the player so the transport still has b preloaded.
    h.player.state_mut().set_repeat_mode(RepeatMode::Single);
    h.eof();
    assert_eq!(
        h.take_calls(),
        vec![Call::Play(p("/m/a.mp3"), Some(p("/m/a.mp3")))]
    );
}

#[test]
fn rapid_failures_stop_auto_advance() {
    let files: Vec<String> = (0..6).map(|i| format!("/m/{i}.mp3")).collect();
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    // Every finish counts as fast.
    let mut h = Harness::new(&refs, Duration::from_secs(3600));
    h.player.play_track("main", 0);
    h.take_calls();

    let fail = TransportEvent::FileEnded(EndReason::Failed("unsupported".into()));
    for expected in 1..=3 {
        h.player.on_transport_event(fail.clone());
        assert_eq!(h.current_index(), Some(expected));
    }
    let advances = h
        .take_calls()
        .iter()
        .filter(|c| matches!(c, Call::QueueNext(_) | Call::Play(..)))
        .count();
    assert_eq!(advances, 3);

    h.player.on_transport_event(fail);
    assert_eq!(h.take_calls(), vec![Call::SetPlay(false)]);
    assert_eq!(h.current_index(), Some(3));
    assert_eq!(h.player.status(), PlaybackStatus::Stopped);

    // A user skip starts over.
    assert!(h.player.next());
    assert_eq!(h.current_index(), Some(4));
    h.take_calls();
    h.player.on_transport_event(TransportEvent::FileEnded(EndReason::Eof));
    assert_eq!(h.current_index(), Some(5));
}

#[test]
fn skipping_past_the_end_does_nothing_without_repeat() {
    let mut h = Harness::abc();
    h.player.play_track("main", 2);
    h.take_calls();
    assert!(!h.player.next());
    assert!(h.take_calls().is_empty());
    assert!(h.player.previous());
    assert_eq!(h.current_index(), Some(1));
}

#[test]
fn skip_without_a_playing_playlist_is_ignored() {
    let mut h = Harness::abc();
    assert!(!h.player.next());
    assert!(!h.player.previous());
    h.eof();
    assert!(h.take_calls().is_empty());
}

#[test]
fn resume_with_nothing_loaded_starts_the_cursor_track() {
    let mut h = Harness::abc();
    h.player.state_mut().set_playing_playlist(Some("main"));
    h.player.set_play(true);
    assert_eq!(
        h.take_calls()[0],
        Call::Play(p("/m/a.mp3"), Some(p("/m/b.mp3")))
    );

    h.player.toggle_pause();
    assert_eq!(h.take_calls(), vec![Call::SetPlay(false)]);
}

#[test]
fn seek_is_ignored_while_stopped() {
    let mut h = Harness::abc();
    h.player.seek(Duration::from_secs(10));
    assert!(h.take_calls().is_empty());

    h.player.play_track("main", 0);
    h.take_calls();
    h.player.seek(Duration::from_secs(10));
    assert_eq!(h.take_calls(), vec![Call::Seek(Duration::from_secs(10))]);
}

#[derive(Default)]
struct Recorded {
    log: Vec<String>,
}

struct RecordingEvents(Rc<RefCell<Recorded>>);

impl PlayerEvents for RecordingEvents {
    fn on_pause_update(&mut self, paused: bool) {
        self.0.borrow_mut().log.push(format!("pause {paused}"));
    }

    fn on_bitrate_change(&mut self, bitrate: f64) {
        self.0.borrow_mut().log.push(format!("bitrate {bitrate}"));
    }

    fn on_position_change(&mut self, time: PlayTime) {
        self.0
            .borrow_mut()
            .log
            .push(format!("position {}", time.position.as_secs()));
    }

    fn on_song_finish(&mut self, error: Option<&str>) {
        self.0
            .borrow_mut()
            .log
            .push(format!("finish {}", error.unwrap_or("ok")));
    }

    fn on_track_change(&mut self, track: Option<&TrackInfo>) {
        let title = track.map_or("none".to_string(), |t| t.title.clone());
        self.0.borrow_mut().log.push(format!("track {title}"));
    }

    fn on_transport_lost(&mut self) {
        self.0.borrow_mut().log.push("lost".to_string());
    }
}

#[test]
fn events_reach_the_listener() {
    let rec = Rc::new(RefCell::new(Recorded::default()));
    let h = Harness::new(&["/m/one.mp3"], Duration::ZERO);
    let mut player = h.player.with_events(RecordingEvents(rec.clone()));

    player.poll();
    player.play_track("main", 0);
    player.on_transport_event(TransportEvent::PauseChanged(true));
    player.on_transport_event(TransportEvent::BitrateChanged(128000.0));
    player.poll();
    player.on_transport_event(TransportEvent::FileEnded(EndReason::Eof));
    player.on_transport_event(TransportEvent::Disconnected);

    assert_eq!(
        rec.borrow().log,
        vec![
            "track one",
            "pause true",
            "bitrate 128000",
            "position 3",
            "finish ok",
            "track none",
            "lost",
        ]
    );
    assert!(player.transport_lost());
}

#[test]
fn announcements_go_through_the_notify_queue() {
    let (tx, rx) = mpsc::channel();
    let h = Harness::abc();
    let mut player = h
        .player
        .with_notifier(PropertyQueue::spawn(16, move |prop| tx.send(prop).unwrap()));

    player.set_volume(150.0);
    player.set_mute(true);
    player.set_shuffle(true);
    player.set_repeat(RepeatMode::All);
    player.shutdown();

    let got: Vec<PlayerProperty> = rx.try_iter().collect();
    assert_eq!(
        got,
        vec![
            PlayerProperty::Volume(100.0),
            PlayerProperty::Muted(true),
            PlayerProperty::Shuffle(true),
            PlayerProperty::Repeat(RepeatMode::All),
        ]
    );
    assert_eq!(
        h.calls.lock().unwrap().as_slice(),
        &[Call::Volume(100.0), Call::Mute(true)]
    );
}

#[test]
fn sync_output_pushes_stored_volume_and_mute() {
    let mut h = Harness::abc();
    h.player.state_mut().set_volume(35.0);
    h.player.state_mut().set_muted(true);
    h.player.sync_output();
    assert_eq!(h.take_calls(), vec![Call::Volume(35.0), Call::Mute(true)]);
}

#[test]
fn added_files_are_probed_and_merged_on_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("new.flac"), b"").unwrap();
    fs::write(dir.path().join("notes.txt"), b"").unwrap();

    let mut h = Harness::abc();
    let range = h
        .player
        .add_files("main", 0, true, &[dir.path().to_path_buf()])
        .unwrap();
    assert_eq!(range, 0..1);
    assert_eq!(h.player.state().playlist("main").unwrap().len(), 4);

    assert!(h.player.probes().wait_idle(Duration::from_secs(5)));
    // Only the new file needed probing.
    let ran = h.inbox.run_pending(&mut h.player);
    assert_eq!(ran, 1);

    let path = dir.path().join("new.flac");
    assert_eq!(h.player.state().info_for_path(&path).artist, "Probed");
    assert_eq!(h.player.state().info_for_path(&path).title, "new");
}

#[test]
fn adding_to_the_playing_playlist_updates_the_preload() {
    let dir = tempfile::tempdir().unwrap();
    let added = dir.path().join("inserted.mp3");
    fs::write(&added, b"").unwrap();

    let mut h = Harness::abc();
    h.player.play_track("main", 0);
    h.take_calls();

    h.player.add_files("main", 0, false, &[added.clone()]);
    assert_eq!(h.take_calls(), vec![Call::QueueNext(added)]);
    assert_eq!(h.current_index(), Some(0));
}

#[test]
fn removing_tracks_keeps_the_current_one_and_refreshes_the_preload() {
    let mut h = Harness::abc();
    h.player.play_track("main", 0);
    h.take_calls();

    assert_eq!(h.player.remove_tracks("main", &[1]), 1);
    assert_eq!(h.take_calls(), vec![Call::QueueNext(p("/m/c.mp3"))]);
    assert_eq!(h.player.remove_tracks("main", &[9]), 0);
}

#[test]
fn losing_the_successor_clears_the_preloaded_entry() {
    let mut h = Harness::abc();
    h.player.set_repeat(RepeatMode::All);
    h.player.play_track("main", 2);
    h.take_calls();

    // c is last: the wrapped preload of a must not survive the switch.
    h.player.set_repeat(RepeatMode::None);
    assert_eq!(h.take_calls(), vec![Call::ClearNext]);

    h.eof();
    assert_eq!(h.take_calls(), vec![Call::SetPlay(false)]);
    assert_eq!(h.player.status(), PlaybackStatus::Stopped);
}

#[test]
fn removing_every_later_track_clears_the_preloaded_entry() {
    let mut h = Harness::abc();
    h.player.play_track("main", 1);
    h.take_calls();

    assert_eq!(h.player.remove_tracks("main", &[2]), 1);
    assert_eq!(h.take_calls(), vec![Call::ClearNext]);

    h.eof();
    assert_eq!(h.take_calls(), vec![Call::SetPlay(false)]);
}

impl Harness {
    /// Run posted tasks until `done` holds.
    fn run_until(&mut self, done: impl Fn(&TestPlayer) -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !done(&self.player) {
            assert!(std::time::Instant::now() < deadline, "timed out");
            let _ = self.inbox.run_once(&mut self.player, Duration::from_millis(50));
        }
    }
}

#[test]
fn opened_playlists_are_adopted_on_the_loop() {
    let mut h = Harness::abc();
    h.player.open_playlist(Path::new("/lists/other.mem"));
    h.run_until(|p| p.state().playlist("other").is_some());
    assert_eq!(h.player.state().playlist("other").unwrap().len(), 2);

    // Opening the same file again gets a distinct name.
    h.player.open_playlist(Path::new("/lists/other.mem"));
    h.run_until(|p| p.state().playlist("other~1").is_some());

    assert!(h.player.probes().wait_idle(Duration::from_secs(5)));
    h.inbox.run_pending(&mut h.player);
    let info = h.player.state().info_for_path(Path::new("/m/x.mp3"));
    assert_eq!(info.artist, "Probed");
}

#[test]
fn unreadable_playlist_is_not_adopted() {
    let mut h = Harness::abc();
    h.player.open_playlist(Path::new("/lists/missing.mem"));
    let _ = h.inbox.run_once(&mut h.player, Duration::from_millis(300));
    assert_eq!(h.player.state().playlists().len(), 1);
}

#[test]
fn save_all_writes_changed_playlists() {
    let mut h = Harness::abc();
    h.player.save_all();
    h.player.state().wait_until_saved();
    let writes = h.codec.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].name, "main");
    assert_eq!(writes[0].tracks.len(), 3);
}

#[test]
fn probed_metadata_for_the_current_track_is_announced() {
    let rec = Rc::new(RefCell::new(Recorded::default()));
    let h = Harness::new(&["/m/one.mp3"], Duration::ZERO);
    let inbox = h.inbox;
    let mut player = h.player.with_events(RecordingEvents(rec.clone()));
    player.play_track("main", 0);

    assert_eq!(player.probe_playlist("main", true), 1);
    assert!(player.probes().wait_idle(Duration::from_secs(5)));
    inbox.run_pending(&mut player);

    assert_eq!(rec.borrow().log, vec!["track one", "track one"]);
    assert_eq!(player.state().info_for_path(Path::new("/m/one.mp3")).artist, "Probed");
}
