//! The engine controller.
//!
//! [`Player`] lives on the consumer loop. It owns the playback state and the
//! transport, turns user requests into transport commands and decides what
//! plays next when a file ends. Background work (probing, playlist parsing,
//! transport events) reaches it as tasks posted through its mailbox.

mod events;
mod guard;

pub use events::{NoEvents, PlaybackStatus, PlayerEvents, PlayerProperty};
pub use guard::FinishGuard;

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::codec::CodecLookup;
use crate::config::{LibrarySettings, Settings};
use crate::library::collect_audio_files;
use crate::mailbox::Mailbox;
use crate::notify::PropertyQueue;
use crate::probe::{ProbeJob, ProbePool};
use crate::state::{PlaybackState, RepeatMode, TrackInfo};
use crate::transport::{EndReason, Transport, TransportEvent, log_failure};

/// Tunables the player takes from the settings.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub min_play: Duration,
    pub max_fast_failures: u32,
    pub library: LibrarySettings,
    /// Where the state snapshot is saved. `None` disables saving.
    pub state_path: Option<PathBuf>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PlayerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_play: Duration::from_millis(settings.playback.min_play_ms),
            max_fast_failures: settings.playback.max_fast_failures,
            library: settings.library.clone(),
            state_path: settings.state.resolved_path(),
        }
    }
}

pub struct Player<T: Transport + 'static> {
    state: PlaybackState,
    transport: T,
    mailbox: Mailbox<Player<T>>,
    probes: ProbePool<Player<T>>,
    codecs: Arc<dyn CodecLookup>,
    options: PlayerOptions,
    guard: FinishGuard,
    /// File handed to the transport as the gapless successor.
    preloaded: Option<PathBuf>,
    /// Whether a track is loaded on the transport.
    active: bool,
    paused: bool,
    transport_lost: bool,
    events: Box<dyn PlayerEvents>,
    notifier: Option<PropertyQueue<PlayerProperty>>,
}

impl<T: Transport + 'static> Player<T> {
    pub fn new(
        state: PlaybackState,
        transport: T,
        mailbox: Mailbox<Player<T>>,
        probes: ProbePool<Player<T>>,
        codecs: Arc<dyn CodecLookup>,
        options: PlayerOptions,
    ) -> Self {
        Self {
            guard: FinishGuard::new(options.min_play, options.max_fast_failures),
            state,
            transport,
            mailbox,
            probes,
            codecs,
            options,
            preloaded: None,
            active: false,
            // The transport starts paused.
            paused: true,
            transport_lost: false,
            events: Box::new(NoEvents),
            notifier: None,
        }
    }

    pub fn with_events(mut self, events: impl PlayerEvents + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn with_notifier(mut self, notifier: PropertyQueue<PlayerProperty>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PlaybackState {
        &mut self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mailbox(&self) -> &Mailbox<Player<T>> {
        &self.mailbox
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn transport_lost(&self) -> bool {
        self.transport_lost
    }

    pub fn status(&self) -> PlaybackStatus {
        match (self.active, self.paused) {
            (false, _) => PlaybackStatus::Stopped,
            (true, true) => PlaybackStatus::Paused,
            (true, false) => PlaybackStatus::Playing,
        }
    }

    fn publish(&self, property: PlayerProperty) {
        if let Some(notifier) = &self.notifier
            && let Some(evicted) = notifier.push(property)
        {
            debug!(?evicted, "announcement dropped");
        }
    }

    fn announce_track(&mut self, info: Option<TrackInfo>) {
        self.events.on_track_change(info.as_ref());
        self.publish(PlayerProperty::Track(info));
        self.publish(PlayerProperty::Status(self.status()));
    }

    fn save_state(&mut self) {
        let Some(path) = self.options.state_path.clone() else {
            return;
        };
        if let Err(e) = self.state.save_state(&path) {
            warn!(error = %e, "failed to serialise state");
        }
    }

    fn peek_path(&self) -> Option<PathBuf> {
        self.state.playing_playlist()?;
        self.state.peek().map(|s| s.track.path().to_path_buf())
    }

    // ---- playback ----------------------------------------------------------

    /// Hand `path` to the transport with the next track preloaded behind it.
    fn start(&mut self, path: PathBuf) {
        let hint = self.peek_path();
        if let Err(e) = self
            .transport
            .play_track(&path, hint.as_deref(), log_failure("loadfile"))
        {
            warn!(path = %path.display(), error = %e, "failed to start track");
            return;
        }
        if self.paused
            && let Err(e) = self.transport.set_play(true, log_failure("unpause"))
        {
            warn!(error = %e, "failed to unpause");
        }
        debug!(path = %path.display(), next = ?hint, "playing");

        self.preloaded = hint;
        self.active = true;
        self.paused = false;
        self.guard.started(Instant::now());

        let info = self.state.info_for_path(&path);
        self.announce_track(Some(info));
        self.save_state();
    }

    /// Nothing left to play.
    fn stop_playback(&mut self) {
        if self.active {
            // The transport may already have moved on to a preloaded file.
            if let Err(e) = self.transport.set_play(false, log_failure("pause")) {
                debug!(error = %e, "failed to pause after the last track");
            }
        }
        self.preloaded = None;
        self.active = false;
        self.paused = true;
        info!("playback stopped");
        self.announce_track(None);
        self.save_state();
    }

    /// The successor may have changed; re-preload if so.
    fn refresh_preload(&mut self) {
        if !self.active {
            return;
        }
        let hint = self.peek_path();
        if hint == self.preloaded {
            return;
        }
        // A vanished successor still has to be dropped from the player's list.
        if let Err(e) = self.transport.queue_next(hint.as_deref(), log_failure("preload next")) {
            warn!(error = %e, "failed to update preloaded track");
            return;
        }
        debug!(next = ?hint, "preload updated");
        self.preloaded = hint;
    }

    /// Start `index` of `playlist`, making it the playing playlist.
    /// Returns `false` for an unknown playlist or index.
    pub fn play_track(&mut self, playlist: &str, index: usize) -> bool {
        let Some(len) = self.state.playlist(playlist).map(|p| p.len()) else {
            warn!(playlist, "no such playlist");
            return false;
        };
        if index >= len {
            warn!(playlist, index, len, "track index out of range");
            return false;
        }
        if self.state.playing_playlist_name() != Some(playlist) {
            self.state.set_playing_playlist(Some(playlist));
        }
        let track = self.state.play(index);
        self.guard.reset();
        self.start(track.path().to_path_buf());
        true
    }

    pub fn next(&mut self) -> bool {
        self.skip(true)
    }

    pub fn previous(&mut self) -> bool {
        self.skip(false)
    }

    fn skip(&mut self, forward: bool) -> bool {
        if self.state.playing_playlist().is_none() {
            debug!("nothing to skip in");
            return false;
        }
        let selection = if forward {
            self.state.next()
        } else {
            self.state.previous()
        };
        let Some(selection) = selection else {
            debug!(forward, "at the end of the queue");
            return false;
        };
        self.guard.reset();
        self.start(selection.track.path().to_path_buf());
        true
    }

    /// Resume or pause. Resuming with nothing loaded starts the track under
    /// the cursor.
    pub fn set_play(&mut self, playing: bool) {
        if playing
            && !self.active
            && let Some(selection) = self.state.now_playing()
        {
            self.guard.reset();
            self.start(selection.track.path().to_path_buf());
            return;
        }
        if let Err(e) = self.transport.set_play(playing, log_failure("set pause")) {
            warn!(error = %e, "failed to change pause state");
        }
    }

    pub fn toggle_pause(&mut self) {
        self.set_play(self.paused || !self.active);
    }

    pub fn seek(&mut self, position: Duration) {
        if !self.active {
            return;
        }
        if let Err(e) = self.transport.seek(position, log_failure("seek")) {
            warn!(error = %e, "failed to seek");
        }
    }

    pub fn set_shuffle(&mut self, on: bool) {
        if self.state.is_shuffling() == on {
            return;
        }
        self.state.set_shuffling(on);
        self.refresh_preload();
        self.publish(PlayerProperty::Shuffle(on));
        self.save_state();
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        if self.state.repeat_mode() == mode {
            return;
        }
        self.state.set_repeat_mode(mode);
        self.refresh_preload();
        self.publish(PlayerProperty::Repeat(mode));
        self.save_state();
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        let mode = self.state.repeat_mode().cycle();
        self.set_repeat(mode);
        mode
    }

    pub fn set_volume(&mut self, percent: f64) {
        self.state.set_volume(percent);
        let volume = self.state.volume();
        if let Err(e) = self.transport.set_volume(volume, log_failure("set volume")) {
            warn!(error = %e, "failed to set volume");
        }
        self.publish(PlayerProperty::Volume(volume));
        self.save_state();
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.state.set_muted(muted);
        if let Err(e) = self.transport.set_mute(muted, log_failure("set mute")) {
            warn!(error = %e, "failed to set mute");
        }
        self.publish(PlayerProperty::Muted(muted));
        self.save_state();
    }

    /// Push the stored volume and mute flag to the transport.
    pub fn sync_output(&mut self) {
        let volume = self.state.volume();
        let muted = self.state.is_muted();
        let sent = self
            .transport
            .set_volume(volume, log_failure("set volume"))
            .and_then(|()| self.transport.set_mute(muted, log_failure("set mute")));
        if let Err(e) = sent {
            warn!(error = %e, "failed to apply output settings");
        }
    }

    /// Timer tick: read the playback clock.
    pub fn poll(&mut self) {
        if !self.active {
            return;
        }
        let time = self.transport.play_time();
        self.events.on_position_change(time);
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PauseChanged(paused) => {
                self.paused = paused;
                self.events.on_pause_update(paused);
                self.publish(PlayerProperty::Status(self.status()));
            }
            TransportEvent::BitrateChanged(bitrate) => self.events.on_bitrate_change(bitrate),
            TransportEvent::FileStarted => debug!("file started"),
            TransportEvent::FileEnded(EndReason::Eof) => self.on_song_finish(None),
            TransportEvent::FileEnded(EndReason::Failed(error)) => {
                warn!(%error, "track failed to play");
                self.on_song_finish(Some(&error));
            }
            TransportEvent::FileEnded(EndReason::Stopped) => debug!("file replaced"),
            TransportEvent::Idle => debug!("player idle"),
            TransportEvent::Disconnected => {
                warn!("lost the player process");
                self.transport_lost = true;
                self.active = false;
                self.preloaded = None;
                self.events.on_transport_lost();
                self.publish(PlayerProperty::Status(PlaybackStatus::Stopped));
            }
        }
    }

    /// A track ended on its own. Advance unless tracks keep failing.
    pub fn on_song_finish(&mut self, error: Option<&str>) {
        self.events.on_song_finish(error);
        if self.state.playing_playlist().is_none() {
            return;
        }
        if !self.guard.finished(Instant::now()) {
            warn!(
                failures = self.guard.fast_failures(),
                "tracks keep ending immediately; not advancing"
            );
            self.stop_playback();
            return;
        }

        let Some(selection) = self.state.auto_next() else {
            self.stop_playback();
            return;
        };
        let path = selection.track.path().to_path_buf();

        if self.preloaded.as_deref() == Some(path.as_path()) {
            // Already playing gaplessly; line up the one after it.
            let hint = self.peek_path();
            if let Some(next) = hint.as_deref()
                && let Err(e) = self.transport.queue_next(Some(next), log_failure("queue next"))
            {
                warn!(error = %e, "failed to queue next track");
            }
            debug!(path = %path.display(), next = ?hint, "gapless hand-off");
            self.preloaded = hint;
            self.active = true;
            self.guard.started(Instant::now());
            let info = self.state.info_for_path(&path);
            self.announce_track(Some(info));
            self.save_state();
        } else {
            self.start(path);
        }
    }

    // ---- library -----------------------------------------------------------

    /// Expand `paths` (directories included) and splice the audio files into
    /// `playlist` next to `index`. New tracks are probed in the background.
    pub fn add_files(
        &mut self,
        playlist: &str,
        index: usize,
        before: bool,
        paths: &[PathBuf],
    ) -> Option<Range<usize>> {
        let files = collect_audio_files(paths, &self.options.library);
        if files.is_empty() {
            debug!(playlist, "no audio files to add");
            return None;
        }
        let range = self.state.add_tracks(playlist, index, before, files)?;
        info!(playlist, added = range.len(), "tracks added");

        let infos: Vec<TrackInfo> = self
            .state
            .playlist(playlist)
            .map(|p| p.tracks()[range.clone()].iter().map(|t| self.state.track_info(t)).collect())
            .unwrap_or_default();
        self.submit_probes(infos, false);

        if self.state.playing_playlist_name() == Some(playlist) {
            self.refresh_preload();
        }
        self.save_state();
        Some(range)
    }

    pub fn remove_tracks(&mut self, playlist: &str, indices: &[usize]) -> usize {
        let removed = self.state.remove_tracks(playlist, indices).len();
        if removed > 0 && self.state.playing_playlist_name() == Some(playlist) {
            self.refresh_preload();
        }
        if removed > 0 {
            self.save_state();
        }
        removed
    }

    /// Parse a playlist file in the background, then adopt it here.
    pub fn open_playlist(&self, path: &Path) {
        let path = path.to_path_buf();
        let codecs = self.codecs.clone();
        let mailbox = self.mailbox.clone();
        let spawned = thread::Builder::new()
            .name("reprise-open".to_string())
            .spawn(move || match codecs.parse_file(&path) {
                Ok(parsed) => {
                    mailbox.post(move |player: &mut Player<T>| {
                        let name = player.state.add_playlist_unique(parsed).name().to_string();
                        info!(playlist = %name, "playlist opened");
                        player.probe_playlist(&name, false);
                        player.save_state();
                    });
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to open playlist"),
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start playlist loader");
        }
    }

    /// Probe every file of a playlist. Returns how many probes were queued.
    pub fn probe_playlist(&mut self, playlist: &str, force: bool) -> usize {
        let Some(p) = self.state.playlist(playlist) else {
            warn!(playlist, "no such playlist");
            return 0;
        };
        let infos: Vec<TrackInfo> = p.tracks().iter().map(|t| self.state.track_info(t)).collect();
        self.submit_probes(infos, force)
    }

    fn submit_probes(&self, infos: Vec<TrackInfo>, force: bool) -> usize {
        let mut seen = HashSet::new();
        let jobs: Vec<ProbeJob<Player<T>>> = infos
            .into_iter()
            .filter(|info| seen.insert(info.path.clone()))
            .map(|info| ProbeJob::new(info, force, |player: &mut Player<T>, info| player.on_probed(info)))
            .collect();
        self.probes.submit(jobs)
    }

    fn on_probed(&mut self, info: TrackInfo) {
        if !self.state.update_metadata(&info) {
            return;
        }
        let current = self.state.now_playing();
        if self.active && current.is_some_and(|s| s.track.path() == info.path.as_path()) {
            self.announce_track(Some(info));
        }
    }

    pub fn probes(&self) -> &ProbePool<Player<T>> {
        &self.probes
    }

    /// Save the state snapshot and every changed playlist.
    pub fn save_all(&mut self) {
        let path = self.options.state_path.clone();
        self.state.save_all(path.as_deref(), self.codecs.clone());
    }

    /// Flush everything before exit.
    pub fn shutdown(&mut self) {
        self.save_all();
        if let Some(mut notifier) = self.notifier.take() {
            notifier.close();
        }
        self.state.wait_until_saved();
        debug!("player shut down");
    }
}

#[cfg(test)]
mod tests;
