//! Reference-counted metadata shared by every playlist slot pointing at the
//! same file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::track::TrackInfo;

/// One stored record. The reference count is runtime-only and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "Album")]
    pub album: String,
    #[serde(rename = "Number")]
    pub number: u32,
    #[serde(rename = "Length", with = "nanos")]
    pub length: Duration,
    #[serde(rename = "Bitrate")]
    pub bitrate: u32,
    #[serde(skip)]
    refs: u32,
}

impl Metadata {
    fn from_info(info: &TrackInfo) -> Self {
        Self {
            title: info.title.clone(),
            artist: info.artist.clone(),
            album: info.album.clone(),
            number: info.number,
            length: info.length,
            bitrate: info.bitrate,
            refs: 0,
        }
    }

    pub fn to_info(&self, path: &Path) -> TrackInfo {
        TrackInfo {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            number: self.number,
            length: self.length,
            bitrate: self.bitrate,
            path: path.to_path_buf(),
        }
    }

    pub fn refs(&self) -> u32 {
        self.refs
    }
}

/// Lengths are stored as integer nanoseconds.
mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        // Older snapshots may carry negative "unknown" lengths.
        let n = i64::deserialize(d)?;
        Ok(Duration::from_nanos(n.max(0) as u64))
    }
}

/// Path-keyed store. A record exists exactly while some playlist slot holds
/// its path (loading is the one transient exception, see
/// [`MetadataStore::prune_unreferenced`]).
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: HashMap<PathBuf, Metadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with persisted records; they start unreferenced.
    pub(crate) fn from_records(records: impl IntoIterator<Item = (PathBuf, Metadata)>) -> Self {
        let records = records
            .into_iter()
            .map(|(path, mut m)| {
                m.refs = 0;
                (path, m)
            })
            .collect();
        Self { records }
    }

    /// Take one reference on `path`, creating the record from `seed` (or a
    /// placeholder) when it does not exist yet.
    pub fn reference(&mut self, path: &Path, seed: Option<&TrackInfo>) {
        let record = self.records.entry(path.to_path_buf()).or_insert_with(|| {
            match seed {
                Some(info) => Metadata::from_info(info),
                None => Metadata::from_info(&TrackInfo::placeholder(path)),
            }
        });
        record.refs += 1;
    }

    /// Drop one reference. Returns `true` when this evicted the record.
    pub fn release(&mut self, path: &Path) -> bool {
        let Some(record) = self.records.get_mut(path) else {
            tracing::warn!(path = %path.display(), "released metadata that is not stored");
            return false;
        };
        record.refs = record.refs.saturating_sub(1);
        if record.refs == 0 {
            self.records.remove(path);
            return true;
        }
        false
    }

    /// Replace the descriptive fields of an existing record. Results for
    /// files no longer referenced are dropped and `false` is returned.
    pub fn update(&mut self, path: &Path, info: &TrackInfo) -> bool {
        match self.records.get_mut(path) {
            Some(record) => {
                let refs = record.refs;
                *record = Metadata {
                    refs,
                    ..Metadata::from_info(info)
                };
                true
            }
            None => false,
        }
    }

    pub fn get(&self, path: &Path) -> Option<&Metadata> {
        self.records.get(path)
    }

    pub fn refs(&self, path: &Path) -> u32 {
        self.records.get(path).map_or(0, |m| m.refs)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove records nobody referenced after loading.
    pub fn prune_unreferenced(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, m| m.refs > 0);
        before - self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Metadata)> {
        self.records.iter()
    }
}
