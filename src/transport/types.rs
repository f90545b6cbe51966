//! Values exchanged between the session and the rest of the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::warn;

use crate::error::CommandError;

/// Something the player reported, in the order it was received.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PauseChanged(bool),
    /// Bits per second.
    BitrateChanged(f64),
    FileStarted,
    FileEnded(EndReason),
    /// Nothing is loaded any more.
    Idle,
    /// The control channel closed without being asked to.
    Disconnected,
}

/// Why a file stopped playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end naturally.
    Eof,
    /// Replaced, stopped, quit or redirected by a command.
    Stopped,
    /// Could not be played.
    Failed(String),
}

impl EndReason {
    pub(crate) fn from_wire(reason: &str, file_error: Option<&str>) -> Self {
        match reason {
            "eof" => Self::Eof,
            "error" => Self::Failed(file_error.unwrap_or("unknown error").to_string()),
            _ => Self::Stopped,
        }
    }
}

/// Properties observed on the player, tagged with fixed ids so change
/// notifications can be routed without string compares.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Observed {
    Pause,
    AudioBitrate,
    TimePos,
    TimeRemaining,
}

impl Observed {
    /// Id for notifications that carry no tag; routed by name instead.
    pub const UNTAGGED: u64 = 0;

    pub const ALL: [Observed; 4] = [
        Observed::Pause,
        Observed::AudioBitrate,
        Observed::TimePos,
        Observed::TimeRemaining,
    ];

    pub fn id(self) -> u64 {
        match self {
            Observed::Pause => 1,
            Observed::AudioBitrate => 2,
            Observed::TimePos => 3,
            Observed::TimeRemaining => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Observed::Pause => "pause",
            Observed::AudioBitrate => "audio-bitrate",
            Observed::TimePos => "time-pos",
            Observed::TimeRemaining => "time-remaining",
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.name() == name)
    }
}

/// Playback clock written by the listener thread and read by anyone.
///
/// Each value is an `f64` stored as raw bits so reads never take a lock.
#[derive(Debug, Default)]
pub struct PlayState {
    position: AtomicU64,
    remaining: AtomicU64,
    bitrate: AtomicU64,
}

fn load(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

fn store(cell: &AtomicU64, value: f64) {
    let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
    cell.store(value.to_bits(), Ordering::Relaxed);
}

impl PlayState {
    pub fn set_position(&self, secs: f64) {
        store(&self.position, secs);
    }

    pub fn set_remaining(&self, secs: f64) {
        store(&self.remaining, secs);
    }

    pub fn set_bitrate(&self, bps: f64) {
        store(&self.bitrate, bps);
    }

    pub fn snapshot(&self) -> PlayTime {
        PlayTime {
            position: Duration::try_from_secs_f64(load(&self.position)).unwrap_or_default(),
            remaining: Duration::try_from_secs_f64(load(&self.remaining)).unwrap_or_default(),
            bitrate: load(&self.bitrate),
        }
    }
}

/// A copied reading of [`PlayState`].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PlayTime {
    pub position: Duration,
    pub remaining: Duration,
    /// Bits per second, 0 when unknown.
    pub bitrate: f64,
}

impl PlayTime {
    pub fn total(&self) -> Duration {
        self.position + self.remaining
    }
}

/// Runs once with the outcome of a command.
pub type Completion = Box<dyn FnOnce(Result<(), CommandError>) + Send + 'static>;

/// Completion that only logs a failure.
pub fn log_failure(what: impl Into<String>) -> Completion {
    let what = what.into();
    Box::new(move |result| {
        if let Err(e) = result {
            warn!(command = %what, error = %e, "player command failed");
        }
    })
}

/// Completion that ignores the outcome.
pub fn ignore() -> Completion {
    Box::new(|_| {})
}
