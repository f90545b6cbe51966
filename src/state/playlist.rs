use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::track::Track;

/// A named, ordered list of tracks backed by a playlist file.
///
/// Reference counting against the metadata store is done by
/// [`PlaybackState`](super::PlaybackState); the splice helpers here only move
/// slots around.
#[derive(Debug)]
pub struct Playlist {
    name: String,
    path: PathBuf,
    tracks: Vec<Track>,
    // Cleared by the background writer once a save lands.
    unsaved: Arc<AtomicBool>,
}

impl Playlist {
    pub(crate) fn new(name: String, path: PathBuf, tracks: Vec<Track>) -> Self {
        Self {
            name,
            path,
            tracks,
            unsaved: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn is_unsaved(&self) -> bool {
        self.unsaved.load(Ordering::Acquire)
    }

    pub fn set_unsaved(&self) {
        self.unsaved.store(true, Ordering::Release);
    }

    pub(crate) fn unsaved_flag(&self) -> Arc<AtomicBool> {
        self.unsaved.clone()
    }

    /// Splice `tracks` in next to `index` (before it, or after it when
    /// `before` is false). The index is clamped to the list. Returns the
    /// range the new slots occupy.
    pub(crate) fn insert(&mut self, index: usize, before: bool, tracks: Vec<Track>) -> Range<usize> {
        let mut at = if before { index } else { index.saturating_add(1) };
        at = at.min(self.tracks.len());
        let count = tracks.len();
        self.tracks.splice(at..at, tracks);
        if count > 0 {
            self.set_unsaved();
        }
        at..at + count
    }

    /// Remove the slots at `indices` (duplicates and out-of-range indices are
    /// ignored). Removal runs from the highest index down so earlier removals
    /// never shift later ones. Returns the removed tracks, highest index first.
    pub(crate) fn remove(&mut self, indices: &[usize]) -> Vec<Track> {
        let mut indices: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.tracks.len())
            .collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();

        let removed: Vec<Track> = indices.into_iter().map(|i| self.tracks.remove(i)).collect();
        if !removed.is_empty() {
            self.set_unsaved();
        }
        removed
    }

    /// Position of the slot with the given id.
    pub fn index_of(&self, id: super::TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == id)
    }
}
