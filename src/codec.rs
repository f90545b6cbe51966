//! Playlist file codecs.
//!
//! Concrete formats live outside the engine; they are registered by file
//! extension on a [`CodecRegistry`] owned by whoever builds the engine and
//! handed around as `Arc<dyn CodecLookup>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::CodecError;
use crate::state::TrackInfo;

/// A playlist as read from or written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPlaylist {
    pub name: String,
    pub path: PathBuf,
    pub tracks: Vec<TrackInfo>,
}

/// One playlist file format.
pub trait PlaylistCodec: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedPlaylist, CodecError>;
    fn write(&self, playlist: &ParsedPlaylist) -> Result<(), CodecError>;
}

/// Extension-based codec lookup.
pub trait CodecLookup: Send + Sync {
    /// Codec for a lowercase extension without the dot.
    fn codec_for(&self, extension: &str) -> Option<Arc<dyn PlaylistCodec>>;

    fn parse_file(&self, path: &Path) -> Result<ParsedPlaylist, CodecError> {
        self.codec_for_path(path)?.parse(path)
    }

    fn write_file(&self, playlist: &ParsedPlaylist) -> Result<(), CodecError> {
        self.codec_for_path(&playlist.path)?.write(playlist)
    }

    fn codec_for_path(&self, path: &Path) -> Result<Arc<dyn PlaylistCodec>, CodecError> {
        extension_of(path)
            .and_then(|ext| self.codec_for(&ext))
            .ok_or_else(|| CodecError::UnknownFormat(path.to_path_buf()))
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn PlaylistCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `codec` for `extension` (case-insensitive, leading dot
    /// optional). A later registration for the same extension wins.
    pub fn register(&mut self, extension: &str, codec: Arc<dyn PlaylistCodec>) {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        if self.codecs.insert(ext.clone(), codec).is_some() {
            tracing::debug!(extension = %ext, "replaced playlist codec");
        }
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.codecs.keys().cloned().collect();
        exts.sort();
        exts
    }

    pub fn supports(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.codecs.contains_key(&ext))
    }
}

impl CodecLookup for CodecRegistry {
    fn codec_for(&self, extension: &str) -> Option<Arc<dyn PlaylistCodec>> {
        self.codecs.get(extension).cloned()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("extensions", &self.supported_extensions())
            .finish()
    }
}
