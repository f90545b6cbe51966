use crate::state::{RepeatMode, TrackInfo};
use crate::transport::PlayTime;

/// Callbacks for whatever presents playback to the user. All of them run on
/// the consumer loop and do nothing by default.
pub trait PlayerEvents {
    fn on_pause_update(&mut self, _paused: bool) {}

    /// Bits per second.
    fn on_bitrate_change(&mut self, _bitrate: f64) {}

    fn on_position_change(&mut self, _time: PlayTime) {}

    /// A track ended on its own, with the player's error if it failed.
    fn on_song_finish(&mut self, _error: Option<&str>) {}

    /// `None` once playback has stopped.
    fn on_track_change(&mut self, _track: Option<&TrackInfo>) {}

    fn on_transport_lost(&mut self) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl PlayerEvents for NoEvents {}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
        }
    }
}

/// A property change announced to outside observers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerProperty {
    Status(PlaybackStatus),
    Track(Option<TrackInfo>),
    Volume(f64),
    Muted(bool),
    Shuffle(bool),
    Repeat(RepeatMode),
}
