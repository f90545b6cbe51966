//! Metadata probing.
//!
//! A [`Prober`] reads duration, bitrate and tags from one file. The
//! [`ProbePool`] runs probers on a small set of worker threads that exist only
//! while there is work, and hands results back to the consumer loop through
//! its mailbox.

mod ffprobe;
mod pool;
mod tags;

pub use ffprobe::{Ffprobe, parse_report};
pub use pool::{ProbeJob, ProbePool};
pub use tags::TagReader;

use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{ProbeBackend, ProbeSettings};
use crate::error::ProbeError;

/// What a probe found. `None` means "could not tell".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub number: Option<u32>,
    pub length: Option<Duration>,
    /// Bits per second.
    pub bitrate: Option<u32>,
}

pub trait Prober: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError>;
}

/// Build the prober selected in the settings.
pub fn from_settings(settings: &ProbeSettings) -> Arc<dyn Prober> {
    match settings.backend {
        ProbeBackend::Ffprobe => Arc::new(Ffprobe::new(
            &settings.ffprobe_path,
            Duration::from_millis(settings.timeout_ms),
        )),
        ProbeBackend::Tags => Arc::new(TagReader),
    }
}

/// Run `cmd` to completion, killing it if it outlives `timeout`.
///
/// Output pipes are drained on helper threads so a chatty child cannot
/// deadlock against a full pipe.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Output, ProbeError> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ProbeError::Spawn)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().map_err(ProbeError::Spawn)? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProbeError::Timeout(timeout));
            }
            None => thread::sleep(Duration::from_millis(5)),
        }
    };

    let collect = |h: Option<thread::JoinHandle<Vec<u8>>>| {
        h.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}
