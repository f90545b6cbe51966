//! Persisted form of the playback state and the background writer.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use super::repeat::RepeatMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Path")]
    pub path: PathBuf,
}

/// Everything needed to restore a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub playlist_names: Vec<PlaylistEntry>,
    #[serde(default)]
    pub metadata: BTreeMap<PathBuf, Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playing_playlist: Option<String>,
    /// Playlist index (not queue position) of the current track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playing_song_index: Option<usize>,
    #[serde(default)]
    pub shuffling: bool,
    #[serde(default)]
    pub repeating: RepeatMode,
    #[serde(default = "full_volume")]
    pub volume: f64,
    #[serde(default)]
    pub muted: bool,
}

fn full_volume() -> f64 {
    100.0
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            playlist_names: Vec::new(),
            metadata: BTreeMap::new(),
            playing_playlist: None,
            playing_song_index: None,
            shuffling: false,
            repeating: RepeatMode::None,
            volume: full_volume(),
            muted: false,
        }
    }
}

/// Counts background saves so shutdown can wait for them.
#[derive(Debug, Clone, Default)]
pub(crate) struct SaveTracker {
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl SaveTracker {
    pub fn begin(&self) {
        let (lock, _) = &*self.pending;
        let mut n = lock.lock().unwrap_or_else(|e| e.into_inner());
        *n += 1;
    }

    pub fn finish(&self) {
        let (lock, cvar) = &*self.pending;
        let mut n = lock.lock().unwrap_or_else(|e| e.into_inner());
        *n = n.saturating_sub(1);
        if *n == 0 {
            cvar.notify_all();
        }
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.pending;
        let mut n = lock.lock().unwrap_or_else(|e| e.into_inner());
        while *n > 0 {
            n = cvar.wait(n).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Write through a sibling temp file and rename, so a crash mid-write never
/// leaves a truncated snapshot behind.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// Serialises snapshot writes. Each save claims a generation on the owning
/// thread; writers then run one at a time and skip any generation older than
/// the one already on disk.
#[derive(Debug, Clone, Default)]
pub(crate) struct SnapshotWriter {
    issued: Arc<AtomicU64>,
    written: Arc<Mutex<u64>>,
}

impl SnapshotWriter {
    pub fn next_generation(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// `Ok(false)` when a newer snapshot already landed.
    pub fn write(&self, generation: u64, path: &Path, bytes: &[u8]) -> io::Result<bool> {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        if *written >= generation {
            return Ok(false);
        }
        write_atomic(path, bytes)?;
        *written = generation;
        Ok(true)
    }
}
