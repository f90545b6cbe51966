//! reprise: a playlist-driven music player that drives an external `mpv`
//! process over its JSON IPC socket.

pub mod codec;
pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod mailbox;
pub mod notify;
pub mod player;
pub mod probe;
pub mod runtime;
pub mod state;
pub mod transport;
