//! Playback state: playlists, the shared metadata store, the play queue and
//! the shuffle/repeat/volume settings, plus their persisted snapshot.
//!
//! All of it is owned by the consumer loop. Background work (probing, file
//! writes) only ever sees copies.

mod metadata;
mod playlist;
mod queue;
mod repeat;
mod snapshot;
mod track;

pub use metadata::{Metadata, MetadataStore};
pub use playlist::Playlist;
pub use queue::PlayQueue;
pub use repeat::RepeatMode;
pub use snapshot::{PlaylistEntry, Snapshot};
pub use track::{Track, TrackId, TrackInfo};

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use tracing::{debug, info, warn};

use crate::codec::{CodecLookup, ParsedPlaylist};
use crate::error::{CodecError, StateError};

use snapshot::{SaveTracker, SnapshotWriter};

/// A navigation result: where the cursor is (or would be) and what is there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Position in the play queue.
    pub position: usize,
    /// Index in the playing playlist.
    pub index: usize,
    pub track: Track,
}

type Observer = Box<dyn FnMut(&PlaybackState)>;

pub struct PlaybackState {
    metadata: MetadataStore,
    playlists: Vec<Playlist>,
    playing: Option<String>,
    queue: PlayQueue,
    shuffle: bool,
    repeat: RepeatMode,
    volume: f64,
    muted: bool,
    next_id: u64,
    unsaved: bool,
    observers: Vec<Observer>,
    saves: SaveTracker,
    writer: SnapshotWriter,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackState")
            .field("playlists", &self.playlists.len())
            .field("metadata", &self.metadata.len())
            .field("playing", &self.playing)
            .field("queue", &self.queue)
            .field("shuffle", &self.shuffle)
            .field("repeat", &self.repeat)
            .field("unsaved", &self.unsaved)
            .finish()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            metadata: MetadataStore::new(),
            playlists: Vec::new(),
            playing: None,
            queue: PlayQueue::default(),
            shuffle: false,
            repeat: RepeatMode::None,
            volume: 100.0,
            muted: false,
            next_id: 0,
            unsaved: false,
            observers: Vec::new(),
            saves: SaveTracker::default(),
            writer: SnapshotWriter::default(),
        }
    }

    fn new_track(&mut self, path: PathBuf) -> Track {
        self.next_id += 1;
        Track::new(TrackId(self.next_id), path)
    }

    /// Register a callback run after every state change. Callbacks run in
    /// registration order, after the state has been marked unsaved.
    pub fn on_update(&mut self, f: impl FnMut(&PlaybackState) + 'static) {
        self.observers.push(Box::new(f));
    }

    pub fn mark_changed(&mut self) {
        self.unsaved = true;
        let mut observers = std::mem::take(&mut self.observers);
        for f in observers.iter_mut() {
            f(self);
        }
        self.observers = observers;
    }

    pub fn is_unsaved(&self) -> bool {
        self.unsaved
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    // ---- playlists ---------------------------------------------------------

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn playlist_names(&self) -> impl Iterator<Item = &str> {
        self.playlists.iter().map(|p| p.name())
    }

    pub fn playlist(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.name() == name)
    }

    fn playlist_pos(&self, name: &str) -> Option<usize> {
        self.playlists.iter().position(|p| p.name() == name)
    }

    pub fn playlist_from_path(&self, path: &Path) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.path() == path)
    }

    /// `base`, or `base~N` with the smallest N that is not taken.
    pub fn unique_name(&self, base: &str) -> String {
        if self.playlist(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}~{n}"))
            .find(|candidate| self.playlist(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Declare a new, empty playlist. Returns `false` if the name is taken.
    pub fn create_playlist(&mut self, name: &str, path: impl Into<PathBuf>) -> bool {
        if self.playlist(name).is_some() {
            warn!(playlist = name, "playlist already exists");
            return false;
        }
        let playlist = Playlist::new(name.to_string(), path.into(), Vec::new());
        playlist.set_unsaved();
        self.playlists.push(playlist);
        self.mark_changed();
        true
    }

    /// Adopt a parsed playlist. Name collisions are refused.
    pub fn add_playlist(&mut self, parsed: ParsedPlaylist) -> Option<&Playlist> {
        if self.playlist(&parsed.name).is_some() {
            warn!(playlist = %parsed.name, "refusing to add duplicate playlist");
            return None;
        }
        let ix = self.insert_playlist(parsed);
        self.mark_changed();
        self.playlists.get(ix)
    }

    /// Adopt a parsed playlist, renaming it `name~N` on collision.
    pub fn add_playlist_unique(&mut self, mut parsed: ParsedPlaylist) -> &Playlist {
        parsed.name = self.unique_name(&parsed.name);
        let ix = self.insert_playlist(parsed);
        self.mark_changed();
        &self.playlists[ix]
    }

    fn insert_playlist(&mut self, parsed: ParsedPlaylist) -> usize {
        let mut tracks = Vec::with_capacity(parsed.tracks.len());
        for info in &parsed.tracks {
            self.metadata.reference(&info.path, Some(info));
            let track = self.new_track(info.path.clone());
            tracks.push(track);
        }
        self.playlists
            .push(Playlist::new(parsed.name, parsed.path, tracks));
        self.playlists.len() - 1
    }

    pub fn rename_playlist(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.playlist(old).is_some();
        }
        if self.playlist(new).is_some() {
            warn!(from = old, to = new, "rename target already exists");
            return false;
        }
        let Some(pos) = self.playlist_pos(old) else {
            return false;
        };
        self.playlists[pos].set_name(new.to_string());
        self.playlists[pos].set_unsaved();
        if self.playing.as_deref() == Some(old) {
            self.playing = Some(new.to_string());
        }
        self.mark_changed();
        true
    }

    /// Remove a playlist, releasing every slot's metadata reference.
    pub fn delete_playlist(&mut self, name: &str) -> bool {
        let Some(pos) = self.playlist_pos(name) else {
            return false;
        };
        if self.is_playing(name) {
            self.playing = None;
            self.queue.clear();
        }
        let playlist = self.playlists.remove(pos);
        for track in playlist.tracks() {
            self.metadata.release(track.path());
        }
        self.mark_changed();
        true
    }

    /// Splice `paths` into a playlist next to `index`. Returns the range the
    /// new slots occupy, or `None` for an unknown playlist.
    pub fn add_tracks(
        &mut self,
        name: &str,
        index: usize,
        before: bool,
        paths: Vec<PathBuf>,
    ) -> Option<Range<usize>> {
        let pos = self.playlist_pos(name)?;
        if paths.is_empty() {
            return Some(self.playlists[pos].insert(index, before, Vec::new()));
        }
        let current = self.current_track_id();
        let mut tracks = Vec::with_capacity(paths.len());
        for path in paths {
            self.metadata.reference(&path, None);
            tracks.push(self.new_track(path));
        }
        let range = self.playlists[pos].insert(index, before, tracks);
        if self.is_playing(name) {
            self.rebuild_queue(current);
        }
        self.mark_changed();
        Some(range)
    }

    /// Remove the slots at `indices` from a playlist.
    pub fn remove_tracks(&mut self, name: &str, indices: &[usize]) -> Vec<Track> {
        let Some(pos) = self.playlist_pos(name) else {
            return Vec::new();
        };
        let current = self.current_track_id();
        let removed = self.playlists[pos].remove(indices);
        for track in &removed {
            self.metadata.release(track.path());
        }
        if !removed.is_empty() {
            if self.is_playing(name) {
                self.rebuild_queue(current);
            }
            self.mark_changed();
        }
        removed
    }

    // ---- queue -------------------------------------------------------------

    fn is_playing(&self, name: &str) -> bool {
        self.playing.as_deref() == Some(name)
    }

    pub fn playing_playlist(&self) -> Option<&Playlist> {
        self.playing.as_deref().and_then(|n| self.playlist(n))
    }

    pub fn playing_playlist_name(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    /// Make `name` the playing playlist (or none), resetting the queue.
    pub fn set_playing_playlist(&mut self, name: Option<&str>) -> bool {
        match name {
            None => {
                self.playing = None;
                self.queue.clear();
            }
            Some(name) => {
                let Some(len) = self.playlist(name).map(Playlist::len) else {
                    warn!(playlist = name, "cannot play unknown playlist");
                    return false;
                };
                self.playing = Some(name.to_string());
                self.queue = PlayQueue::identity(len);
                if self.shuffle {
                    self.queue.randomize();
                }
            }
        }
        self.mark_changed();
        true
    }

    /// Regenerate the queue from scratch (identity, or a fresh permutation
    /// when shuffling), cursor at the start.
    pub fn refresh_queue(&mut self) {
        let len = self.playing_playlist().map_or(0, Playlist::len);
        self.queue = PlayQueue::identity(len);
        if self.shuffle {
            self.queue.randomize();
        }
    }

    /// Rebuild the queue after the playing playlist changed length. Shuffle is
    /// preserved and the cursor follows the current track when it survived.
    pub fn reload_play_queue(&mut self) {
        let current = self.current_track_id();
        self.rebuild_queue(current);
    }

    fn current_track_id(&self) -> Option<TrackId> {
        let index = self.queue.current()?;
        self.playing_playlist()?.get(index).map(Track::id)
    }

    fn rebuild_queue(&mut self, current: Option<TrackId>) {
        let old_cursor = self.queue.cursor();
        let Some(playlist) = self.playing_playlist() else {
            self.queue.clear();
            return;
        };
        let len = playlist.len();
        let new_index = current.and_then(|id| playlist.index_of(id));

        self.queue.reset(len);
        if self.shuffle {
            self.queue.randomize();
        }
        match new_index.and_then(|ix| self.queue.position_of(ix)) {
            Some(pos) => self.queue.set_cursor(pos),
            None if len > 0 => self.queue.set_cursor(old_cursor.min(len - 1)),
            None => {}
        }
        debug_assert!(self.queue.is_permutation());
    }

    fn selection_at(&self, position: usize) -> Selection {
        let Some(playlist) = self.playing_playlist() else {
            panic!("BUG: queue access with no playing playlist");
        };
        let index = match self.queue.get(position) {
            Some(ix) => ix,
            None => panic!(
                "BUG: queue position {position} out of bounds ({} entries)",
                self.queue.len()
            ),
        };
        let Some(track) = playlist.get(index) else {
            panic!(
                "BUG: queue points at index {index} of a {}-track playlist",
                playlist.len()
            );
        };
        Selection {
            position,
            index,
            track: track.clone(),
        }
    }

    /// The track under the cursor, if anything is queued.
    pub fn now_playing(&self) -> Option<Selection> {
        self.playing_playlist()?;
        if self.queue.is_empty() {
            return None;
        }
        Some(self.selection_at(self.queue.cursor()))
    }

    /// Point the cursor at playlist index `index` of the playing playlist.
    ///
    /// Panics when no playlist is playing or the index is out of range.
    pub fn play(&mut self, index: usize) -> Track {
        let Some(len) = self.playing_playlist().map(Playlist::len) else {
            panic!("BUG: play({index}) with no playing playlist");
        };
        assert!(index < len, "BUG: play({index}) out of bounds ({len} tracks)");
        let Some(position) = self.queue.position_of(index) else {
            panic!("BUG: index {index} missing from the play queue");
        };
        self.queue.set_cursor(position);
        self.mark_changed();
        self.selection_at(position).track
    }

    fn peek_from(&self, forward: bool, force: bool) -> Option<Selection> {
        assert!(
            self.playing_playlist().is_some(),
            "BUG: queue navigation with no playing playlist"
        );
        if self.queue.is_empty() {
            return None;
        }
        if !force && self.repeat == RepeatMode::Single {
            return self.now_playing();
        }
        let (position, wrapped) = self.queue.step(forward);
        if wrapped && self.repeat == RepeatMode::None {
            return None;
        }
        Some(self.selection_at(position))
    }

    fn advance(&mut self, forward: bool, force: bool) -> Option<Selection> {
        let selection = self.peek_from(forward, force)?;
        self.queue.set_cursor(selection.position);
        self.mark_changed();
        Some(selection)
    }

    /// User-initiated skip forward.
    pub fn next(&mut self) -> Option<Selection> {
        self.advance(true, true)
    }

    /// User-initiated skip backward.
    pub fn previous(&mut self) -> Option<Selection> {
        self.advance(false, true)
    }

    /// Advance after the current track ended on its own.
    pub fn auto_next(&mut self) -> Option<Selection> {
        self.advance(true, false)
    }

    /// What [`auto_next`](Self::auto_next) would select, without moving.
    pub fn peek(&self) -> Option<Selection> {
        self.peek_from(true, false)
    }

    // ---- settings ----------------------------------------------------------

    pub fn is_shuffling(&self) -> bool {
        self.shuffle
    }

    pub fn set_shuffling(&mut self, on: bool) {
        if self.shuffle == on {
            return;
        }
        self.shuffle = on;
        if self.playing.is_some() {
            if on {
                self.queue.shuffle();
            } else {
                self.queue.unshuffle();
            }
            debug_assert!(self.queue.is_permutation());
        }
        self.mark_changed();
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        if self.repeat != mode {
            self.repeat = mode;
            self.mark_changed();
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 100.0);
        if self.volume != volume {
            self.volume = volume;
            self.mark_changed();
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            self.muted = muted;
            self.mark_changed();
        }
    }

    // ---- metadata ----------------------------------------------------------

    /// Stored metadata for a track, or a placeholder named after the file.
    pub fn track_info(&self, track: &Track) -> TrackInfo {
        self.info_for_path(track.path())
    }

    pub fn info_for_path(&self, path: &Path) -> TrackInfo {
        match self.metadata.get(path) {
            Some(m) => m.to_info(path),
            None => TrackInfo::placeholder(path),
        }
    }

    /// Apply fresh metadata. Dropped (returns `false`) when no slot refers
    /// to the file any more.
    pub fn update_metadata(&mut self, info: &TrackInfo) -> bool {
        if !self.metadata.update(&info.path, info) {
            debug!(path = %info.path.display(), "dropping metadata for unreferenced file");
            return false;
        }
        self.mark_changed();
        true
    }

    // ---- persistence -------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            playlist_names: self
                .playlists
                .iter()
                .map(|p| PlaylistEntry {
                    name: p.name().to_string(),
                    path: p.path().to_path_buf(),
                })
                .collect(),
            metadata: self
                .metadata
                .iter()
                .map(|(path, m)| (path.clone(), m.clone()))
                .collect(),
            playing_playlist: self.playing.clone(),
            playing_song_index: self.now_playing().map(|s| s.index),
            shuffling: self.shuffle,
            repeating: self.repeat,
            volume: self.volume,
            muted: self.muted,
        }
    }

    /// Rebuild state from a snapshot, parsing every playlist file through
    /// `codecs`. Playlists that fail to parse are skipped and logged.
    pub fn from_snapshot(snapshot: Snapshot, codecs: &dyn CodecLookup) -> Self {
        let mut state = Self::new();
        state.metadata = MetadataStore::from_records(snapshot.metadata);
        state.shuffle = snapshot.shuffling;
        state.repeat = snapshot.repeating;
        state.volume = snapshot.volume.clamp(0.0, 100.0);
        state.muted = snapshot.muted;

        let parsed: Vec<Result<ParsedPlaylist, CodecError>> = thread::scope(|s| {
            let handles: Vec<_> = snapshot
                .playlist_names
                .iter()
                .map(|entry| s.spawn(move || codecs.parse_file(&entry.path)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        for (entry, result) in snapshot.playlist_names.iter().zip(parsed) {
            match result {
                Ok(mut playlist) => {
                    playlist.name = entry.name.clone();
                    playlist.path = entry.path.clone();
                    if state.playlist(&playlist.name).is_some() {
                        warn!(playlist = %playlist.name, "duplicate playlist in snapshot");
                        continue;
                    }
                    state.insert_playlist(playlist);
                }
                Err(e) => {
                    warn!(playlist = %entry.name, path = %entry.path.display(), error = %e, "skipping playlist");
                }
            }
        }

        let pruned = state.metadata.prune_unreferenced();
        if pruned > 0 {
            debug!(pruned, "dropped unreferenced metadata");
        }

        if let Some(name) = snapshot.playing_playlist.as_deref()
            && state.playlist(name).is_some()
        {
            state.playing = Some(name.to_string());
            state.refresh_queue();
            let index = snapshot.playing_song_index.unwrap_or(0);
            if let Some(pos) = state.queue.position_of(index) {
                state.queue.set_cursor(pos);
            }
        }

        state.unsaved = false;
        state
    }

    pub fn read_from_file(path: &Path, codecs: &dyn CodecLookup) -> Result<Self, StateError> {
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        Ok(Self::from_snapshot(snapshot, codecs))
    }

    /// Persist the snapshot if anything changed. Serialisation happens here;
    /// the write happens on a background thread, after any earlier write and
    /// never over a newer one.
    pub fn save_state(&mut self, path: &Path) -> Result<(), StateError> {
        if !self.unsaved {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;
        self.unsaved = false;

        let path = path.to_path_buf();
        let generation = self.writer.next_generation();
        let writer = self.writer.clone();
        let saves = self.saves.clone();
        saves.begin();
        thread::spawn(move || {
            match writer.write(generation, &path, &bytes) {
                Ok(true) => debug!(path = %path.display(), generation, "state saved"),
                Ok(false) => debug!(generation, "newer state already saved"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to save state"),
            }
            saves.finish();
        });
        Ok(())
    }

    /// Write a playlist through its codec in the background. `done` runs on
    /// the writer thread; it is called right away when nothing changed.
    pub fn save_playlist(
        &self,
        name: &str,
        codecs: Arc<dyn CodecLookup>,
        done: impl FnOnce(Result<(), CodecError>) + Send + 'static,
    ) {
        let Some(playlist) = self.playlist(name) else {
            return;
        };
        if !playlist.is_unsaved() {
            done(Ok(()));
            return;
        }
        let parsed = ParsedPlaylist {
            name: playlist.name().to_string(),
            path: playlist.path().to_path_buf(),
            tracks: playlist.tracks().iter().map(|t| self.track_info(t)).collect(),
        };
        let flag = playlist.unsaved_flag();
        let saves = self.saves.clone();
        saves.begin();
        thread::spawn(move || {
            let result = codecs.write_file(&parsed);
            if result.is_ok() {
                flag.store(false, Ordering::Release);
            }
            done(result);
            saves.finish();
        });
    }

    /// Save the state snapshot and every unsaved playlist.
    pub fn save_all(&mut self, path: Option<&Path>, codecs: Arc<dyn CodecLookup>) {
        if let Some(path) = path
            && let Err(e) = self.save_state(path)
        {
            warn!(error = %e, "failed to serialise state");
        }
        let names: Vec<String> = self.playlist_names().map(str::to_string).collect();
        for name in names {
            let label = name.clone();
            self.save_playlist(&name, codecs.clone(), move |result| match result {
                Ok(()) => debug!(playlist = %label, "playlist saved"),
                Err(e) => warn!(playlist = %label, error = %e, "failed to save playlist"),
            });
        }
        info!("save requested");
    }

    /// Block until every background save has finished.
    pub fn wait_until_saved(&self) {
        self.saves.wait();
    }
}
