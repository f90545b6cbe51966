//! Turning user-supplied paths into audio files.
//!
//! Directories are expanded with `walkdir` according to [`LibrarySettings`];
//! plain files are kept when their extension looks like audio.

mod scan;

pub use scan::{collect_audio_files, is_audio_file, title_from_path};

#[cfg(test)]
mod tests;
