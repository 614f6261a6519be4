//! Presence mapping
//!
//! Turns a [`PlayerSnapshot`] into the payload shown in Discord. Pure and
//! total: every input, including a snapshot with nothing set, maps to a
//! payload.

use std::time::{Duration, SystemTime};

use crate::{PlayerSnapshot, PlayerState};

pub const IDLE_DETAILS: &str = "Stopped";
pub const IDLE_STATE: &str = "Nothing is currently playing";
pub const MOVIE_STATE: &str = "Watching a Movie";

pub const DEFAULT_LARGE_IMAGE_KEY: &str = "tv";
pub const DEFAULT_LARGE_TEXT: &str = "There's nothing here!";
pub const DEFAULT_SMALL_TEXT: &str = "Currently stopped";

/// Start and end of the playback bar Discord renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTimestamps {
    pub start: SystemTime,
    pub end: SystemTime,
}

/// Presence to push to Discord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresencePayload {
    /// Primary line
    pub details: String,
    /// Secondary line
    pub state: String,
    pub large_image_key: String,
    pub large_text: String,
    pub small_text: String,
    /// Only set while playing
    pub timestamps: Option<PresenceTimestamps>,
}

impl PresencePayload {
    /// The fixed payload shown when nothing is playing
    pub fn idle() -> Self {
        Self {
            details: IDLE_DETAILS.to_string(),
            state: IDLE_STATE.to_string(),
            large_image_key: DEFAULT_LARGE_IMAGE_KEY.to_string(),
            large_text: DEFAULT_LARGE_TEXT.to_string(),
            small_text: DEFAULT_SMALL_TEXT.to_string(),
            timestamps: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::idle()
    }
}

impl Default for PresencePayload {
    fn default() -> Self {
        Self::idle()
    }
}

/// Map a player snapshot to a presence payload.
pub fn map(snapshot: &PlayerSnapshot) -> PresencePayload {
    let mut payload = PresencePayload::idle();

    // Apple TV+ content reports no title and nothing else worth showing
    let Some(title) = snapshot.title() else {
        return payload;
    };

    match snapshot.player_state {
        PlayerState::Playing => {
            match snapshot.series_name() {
                Some(series) => {
                    payload.details = series.to_string();
                    payload.state = title.to_string();
                    if let Some(text) =
                        episode_text(snapshot.season_number, snapshot.episode_number)
                    {
                        payload.large_text = text;
                    }
                }
                None => {
                    payload.details = title.to_string();
                    payload.state = MOVIE_STATE.to_string();
                }
            }
            payload.timestamps = playback_timestamps(snapshot);
        }
        PlayerState::Paused => match snapshot.series_name() {
            Some(series) => {
                payload.details = format!("Paused - {series}");
                payload.state = title.to_string();
            }
            None => {
                payload.details = format!("Paused - {title}");
                payload.state = MOVIE_STATE.to_string();
            }
        },
        // Unknown states show the idle payload
        PlayerState::Other => {}
    }

    payload
}

/// "Season 1 Episode 7", or whichever half is known.
fn episode_text(season: Option<i64>, episode: Option<i64>) -> Option<String> {
    match (season, episode) {
        (Some(s), Some(e)) => Some(format!("Season {s} Episode {e}")),
        (Some(s), None) => Some(format!("Season {s}")),
        (None, Some(e)) => Some(format!("Episode {e}")),
        (None, None) => None,
    }
}

/// Start/end of the playback bar, anchored at the observation time.
///
/// Position is clamped to `[0, duration]`, so `start <= observed_at <= end`
/// and `end - start == duration` always hold. A bar that can't be
/// represented as `SystemTime` is dropped rather than shortened.
fn playback_timestamps(snapshot: &PlayerSnapshot) -> Option<PresenceTimestamps> {
    let duration = whole_seconds(snapshot.duration_secs)?;
    let position = whole_seconds(snapshot.position_secs)
        .unwrap_or(0)
        .min(duration);
    let remaining = duration - position;

    let now = snapshot.observed_at;
    let start = now.checked_sub(Duration::from_secs(position))?;
    let end = now.checked_add(Duration::from_secs(remaining))?;

    Some(PresenceTimestamps { start, end })
}

/// Round to whole seconds; NaN and infinities count as absent, negatives as 0.
fn whole_seconds(value: Option<f64>) -> Option<u64> {
    let value = value.filter(|v| v.is_finite())?;
    // `as` saturates, so huge values can't wrap
    Some(value.max(0.0).round() as u64)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::time::UNIX_EPOCH;

    fn player_state() -> impl Strategy<Value = PlayerState> {
        prop_oneof![
            Just(PlayerState::Playing),
            Just(PlayerState::Paused),
            Just(PlayerState::Other),
        ]
    }

    fn snapshot() -> impl Strategy<Value = PlayerSnapshot> {
        (
            proptest::option::of(".{0,20}"),
            proptest::option::of(".{0,20}"),
            proptest::option::of(any::<i64>()),
            proptest::option::of(any::<i64>()),
            player_state(),
            proptest::option::of(any::<f64>()),
            proptest::option::of(any::<f64>()),
            1_000_000u64..4_000_000_000u64,
        )
            .prop_map(
                |(title, series_name, season, episode, state, duration, position, secs)| {
                    PlayerSnapshot {
                        title,
                        series_name,
                        season_number: season,
                        episode_number: episode,
                        player_state: state,
                        duration_secs: duration,
                        position_secs: position,
                        observed_at: UNIX_EPOCH + Duration::from_secs(secs),
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_map_is_total_and_idempotent(s in snapshot()) {
            prop_assert_eq!(map(&s), map(&s));
        }

        #[test]
        fn prop_timestamps_only_while_playing(s in snapshot()) {
            let payload = map(&s);
            if payload.timestamps.is_some() {
                prop_assert_eq!(s.player_state, PlayerState::Playing);
            }
        }

        #[test]
        fn prop_timestamps_bracket_observation(s in snapshot()) {
            if let Some(ts) = map(&s).timestamps {
                prop_assert!(ts.start <= s.observed_at);
                prop_assert!(s.observed_at <= ts.end);
            }
        }

        #[test]
        fn prop_bar_length_is_duration(
            duration in 1.0f64..100_000.0,
            fraction in 0.0f64..=1.0,
            secs in 1_000_000u64..4_000_000_000u64,
        ) {
            let s = PlayerSnapshot {
                title: Some("Inception".to_string()),
                player_state: PlayerState::Playing,
                duration_secs: Some(duration),
                position_secs: Some(duration * fraction),
                ..PlayerSnapshot::empty(UNIX_EPOCH + Duration::from_secs(secs))
            };
            let ts = map(&s).timestamps.unwrap();
            let length = ts.end.duration_since(ts.start).unwrap().as_secs_f64();
            prop_assert!((length - duration).abs() <= 1.0);
        }

        #[test]
        fn prop_missing_title_is_idle(mut s in snapshot()) {
            s.title = None;
            prop_assert!(map(&s).is_idle());
        }

        #[test]
        fn prop_episode_text_needs_series(s in snapshot()) {
            let payload = map(&s);
            if !s.is_episode() {
                prop_assert_eq!(payload.large_text, DEFAULT_LARGE_TEXT);
            }
        }
    }
}
