use std::path::Path;

use lofty::prelude::{Accessor, AudioFile, TaggedFileExt};

use crate::error::ProbeError;

use super::{ProbeReport, Prober};

/// Reads tags and audio properties in-process with `lofty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagReader;

fn non_empty(v: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Prober for TagReader {
    fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let tagged = lofty::read_from_path(path).map_err(|e| ProbeError::Tags(e.to_string()))?;

        let props = tagged.properties();
        let mut report = ProbeReport {
            length: Some(props.duration()).filter(|d| !d.is_zero()),
            bitrate: props.audio_bitrate().map(|kbps| kbps.saturating_mul(1000)),
            ..ProbeReport::default()
        };

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            report.title = non_empty(tag.title());
            report.artist = non_empty(tag.artist());
            report.album = non_empty(tag.album());
            report.number = tag.track();
        }

        Ok(report)
    }
}
