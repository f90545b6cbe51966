//! Error types shared across the engine.
//!
//! Each subsystem gets its own enum so callers can match on what actually
//! went wrong. Invariant violations are not represented here: they panic.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Fatal errors while bringing up a transport session, plus failures to
/// construct an individual command.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The player executable could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The directory for the control socket could not be prepared.
    #[error("failed to prepare socket directory {path}: {source}")]
    SocketDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing accepted connections on the control socket before the deadline.
    #[error("could not connect to {path} within {timeout:?}")]
    Connect { path: PathBuf, timeout: Duration },

    /// The player process went away while we were still connecting.
    #[error("player exited during startup ({0})")]
    Exited(ExitStatus),

    /// An event subscription or property observation was refused.
    #[error("session setup failed on `{what}`: {reason}")]
    Setup { what: String, reason: String },

    /// The session has been stopped; no further commands are accepted.
    #[error("session is closed")]
    Closed,

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of an individual command, delivered through its completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The player answered with something other than `success`.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The channel closed before a reply arrived.
    #[error("channel closed before reply")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run probe tool: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe tool exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("malformed probe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read tags: {0}")]
    Tags(String),
}

/// Errors raised by playlist codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No codec is registered for the file's extension.
    #[error("unsupported playlist format: {0}")]
    UnknownFormat(PathBuf),

    #[error("playlist I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed playlist {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Errors while reading or writing the persisted state snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
