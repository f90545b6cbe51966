use serde::{Deserialize, Serialize};

use crate::config::RepeatSetting;

/// What happens at the end of the queue or of the current track.
///
/// Persisted as the integers 0, 1 and 2.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RepeatMode {
    /// Stop at the queue boundary.
    #[default]
    None,
    /// Wrap around to the other end of the queue.
    All,
    /// Replay the current track when it ends naturally.
    Single,
}

impl RepeatMode {
    /// None → All → Single → None.
    pub fn cycle(self) -> Self {
        match self {
            Self::None => Self::All,
            Self::All => Self::Single,
            Self::Single => Self::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::All => "all",
            Self::Single => "single",
        }
    }
}

impl From<RepeatMode> for u8 {
    fn from(mode: RepeatMode) -> Self {
        match mode {
            RepeatMode::None => 0,
            RepeatMode::All => 1,
            RepeatMode::Single => 2,
        }
    }
}

impl TryFrom<u8> for RepeatMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::All),
            2 => Ok(Self::Single),
            other => Err(format!("invalid repeat mode {other}")),
        }
    }
}

impl From<RepeatSetting> for RepeatMode {
    fn from(setting: RepeatSetting) -> Self {
        match setting {
            RepeatSetting::None => Self::None,
            RepeatSetting::All => Self::All,
            RepeatSetting::Single => Self::Single,
        }
    }
}
