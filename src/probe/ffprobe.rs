use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ProbeError;

use super::{ProbeReport, Prober, run_with_timeout};

/// Probes files with the `ffprobe` command line tool.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: PathBuf,
    timeout: Duration,
}

impl Ffprobe {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-loglevel",
            "fatal",
            "-print_format",
            "json",
            // Only the container header is needed, not the stream data.
            "-read_intervals",
            "%+1us",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "a:0",
        ])
        .arg(path);
        cmd
    }
}

impl Prober for Ffprobe {
    fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let output = run_with_timeout(self.command(path), self.timeout)?;
        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_report(&output.stdout)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Section,
    #[serde(default)]
    streams: Vec<Section>,
}

#[derive(Debug, Default, Deserialize)]
struct Section {
    #[serde(default, deserialize_with = "lenient")]
    duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    bit_rate: Option<u64>,
    #[serde(default)]
    tags: HashMap<String, Value>,
}

/// ffprobe prints most numbers as strings; accept either form.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + serde::de::DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(v @ Value::Number(_)) => serde_json::from_value(v).ok(),
        _ => None,
    })
}

impl Section {
    fn tag(&self, key: &str) -> Option<String> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(_, v)| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .map(|s| s.trim().replace('\n', "↵"))
            .filter(|s| !s.is_empty())
    }
}

/// Parse ffprobe's JSON output. Tags are looked up case-insensitively in the
/// container first, then in the audio stream.
pub fn parse_report(json: &[u8]) -> Result<ProbeReport, ProbeError> {
    let out: ProbeOutput = serde_json::from_slice(json)?;

    let tag = |key: &str| {
        out.format
            .tag(key)
            .or_else(|| out.streams.iter().find_map(|s| s.tag(key)))
    };

    let duration = out
        .format
        .duration
        .or_else(|| out.streams.iter().find_map(|s| s.duration))
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);
    let bitrate = out
        .format
        .bit_rate
        .or_else(|| out.streams.iter().find_map(|s| s.bit_rate))
        .map(|b| u32::try_from(b).unwrap_or(u32::MAX));

    Ok(ProbeReport {
        title: tag("title"),
        artist: tag("artist").or_else(|| tag("album_artist")),
        album: tag("album"),
        // "3/12" means track 3 of 12.
        number: tag("track").and_then(|t| t.split('/').next()?.trim().parse().ok()),
        length: duration,
        bitrate,
    })
}
