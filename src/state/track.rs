//! Track identity and descriptive metadata.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::library::title_from_path;
use crate::probe::ProbeReport;

/// Stable identity of one playlist slot.
///
/// Two slots holding the same file have different ids, so the engine never
/// needs pointer identity to tell them apart.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub(crate) u64);

impl TrackId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A playlist entry: slot id plus the file it refers to.
///
/// Descriptive data lives in the shared metadata store, keyed by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    id: TrackId,
    path: PathBuf,
}

impl Track {
    pub(crate) fn new(id: TrackId, path: PathBuf) -> Self {
        Self { id, path }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Everything known about an audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub number: u32,
    pub length: Duration,
    /// Bits per second.
    pub bitrate: u32,
    pub path: PathBuf,
}

impl TrackInfo {
    /// Metadata for a file nothing is known about yet: the title is derived
    /// from the file name.
    pub fn placeholder(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            title: title_from_path(&path),
            path,
            ..Self::default()
        }
    }

    /// Whether probing this file again would be wasted work.
    pub fn is_probed(&self) -> bool {
        (self.bitrate > 0 && !self.length.is_zero())
            || (!self.title.is_empty() && !self.artist.is_empty() && !self.album.is_empty())
    }

    /// Merge probe results: values the probe found replace the old ones,
    /// anything it could not determine keeps its previous value.
    pub fn apply_probe(&mut self, report: ProbeReport) {
        fn non_empty(value: Option<String>, old: &mut String) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *old = v;
            }
        }

        non_empty(report.title, &mut self.title);
        non_empty(report.artist, &mut self.artist);
        non_empty(report.album, &mut self.album);
        if let Some(n) = report.number.filter(|n| *n > 0) {
            self.number = n;
        }
        if let Some(len) = report.length.filter(|l| !l.is_zero()) {
            self.length = len;
        }
        if let Some(rate) = report.bitrate.filter(|r| *r > 0) {
            self.bitrate = rate;
        }
    }
}
