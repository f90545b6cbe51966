//! Control of the external player process.
//!
//! A [`Session`] owns one `mpv` subprocess and the Unix socket used to drive
//! it. Commands are written from any thread and completed asynchronously by
//! the listener thread, which also turns property changes and file events
//! into [`TransportEvent`]s.

mod ipc;
mod session;
mod types;

pub use session::{LaunchSpec, Session};
pub use types::{
    Completion, EndReason, Observed, PlayState, PlayTime, TransportEvent, ignore, log_failure,
};

use std::path::Path;
use std::time::Duration;

use crate::error::TransportError;

/// Playback commands the engine issues.
///
/// Every method returns `Err` only when the command could not be sent at
/// all; the player's answer arrives through `done`.
pub trait Transport {
    /// Replace whatever is loaded with `path`, preloading `next` behind it.
    fn play_track(
        &self,
        path: &Path,
        next: Option<&Path>,
        done: Completion,
    ) -> Result<(), TransportError>;

    /// Replace whatever is lined up after the current file with `next`.
    /// `None` only drops the stale entry.
    fn queue_next(&self, next: Option<&Path>, done: Completion) -> Result<(), TransportError>;

    fn seek(&self, position: Duration, done: Completion) -> Result<(), TransportError>;

    fn set_play(&self, playing: bool, done: Completion) -> Result<(), TransportError>;

    /// 0 to 100.
    fn set_volume(&self, percent: f64, done: Completion) -> Result<(), TransportError>;

    fn set_mute(&self, muted: bool, done: Completion) -> Result<(), TransportError>;

    fn play_time(&self) -> PlayTime;
}
