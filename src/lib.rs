//! Apple TV now-playing reader and Discord presence mapper
//!
//! This crate reads the current state of the Apple TV app (show or movie,
//! episode metadata, playback position) and turns it into a Discord Rich
//! Presence payload.

use std::time::SystemTime;

pub mod config;
pub mod observer;
pub mod presence;
pub mod session;
pub mod signal;
pub mod transport;
pub mod tray;
pub mod util;

pub use presence::{map, PresencePayload, PresenceTimestamps};

/// Playback state reported by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    Playing,
    Paused,
    /// Stopped, fast forwarding, rewinding, or anything we don't recognize
    #[default]
    Other,
}

/// One point-in-time read of the player.
///
/// Every field the player exposes may be missing. Apple TV+ titles, for
/// instance, report nothing at all.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    /// Episode or movie name
    pub title: Option<String>,

    /// Show name, only set for TV episodes
    pub series_name: Option<String>,

    pub season_number: Option<i64>,
    pub episode_number: Option<i64>,

    pub player_state: PlayerState,

    /// Total media length in seconds
    pub duration_secs: Option<f64>,

    /// Current playback offset in seconds
    pub position_secs: Option<f64>,

    /// Wall-clock time the snapshot was taken
    pub observed_at: SystemTime,
}

impl PlayerSnapshot {
    /// Snapshot with nothing playing, taken at `observed_at`
    pub fn empty(observed_at: SystemTime) -> Self {
        Self {
            title: None,
            series_name: None,
            season_number: None,
            episode_number: None,
            player_state: PlayerState::Other,
            duration_secs: None,
            position_secs: None,
            observed_at,
        }
    }

    /// Title, if present and non-empty
    pub fn title(&self) -> Option<&str> {
        non_empty(self.title.as_deref())
    }

    /// Series name, if present and non-empty
    pub fn series_name(&self) -> Option<&str> {
        non_empty(self.series_name.as_deref())
    }

    /// Whether this snapshot is for a TV episode rather than a movie
    pub fn is_episode(&self) -> bool {
        self.series_name().is_some()
    }
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self::empty(SystemTime::now())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}
