//! Presence transport
//!
//! Pushes [`PresencePayload`]s to Discord over its local IPC socket using
//! `discord-rich-presence`. Connection happens once: there is no reconnect.

use anyhow::{anyhow, Result};
use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use log::{debug, info, warn};
use std::sync::mpsc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::presence::PresencePayload;

/// Sink for presence updates
pub trait PresenceTransport {
    /// Replace the current presence. Fire-and-forget: callers log failures
    /// and move on.
    fn set_presence(&mut self, payload: &PresencePayload) -> Result<()>;

    /// Remove the presence entirely
    fn clear(&mut self) -> Result<()>;

    /// Close the connection
    fn close(&mut self) -> Result<()>;
}

/// Connected Discord IPC client
pub struct DiscordTransport {
    client: DiscordIpcClient,
}

impl DiscordTransport {
    /// Connect to the local Discord client. Single attempt.
    pub fn connect(app_id: &str) -> Result<Self> {
        let mut client = DiscordIpcClient::new(app_id);
        client
            .connect()
            .map_err(|e| anyhow!("Failed to connect to Discord: {e}"))?;
        Ok(Self { client })
    }
}

impl PresenceTransport for DiscordTransport {
    fn set_presence(&mut self, payload: &PresencePayload) -> Result<()> {
        self.client
            .set_activity(to_activity(payload))
            .map_err(|e| anyhow!("Failed to set Discord activity: {e}"))
    }

    fn clear(&mut self) -> Result<()> {
        self.client
            .clear_activity()
            .map_err(|e| anyhow!("Failed to clear Discord activity: {e}"))
    }

    fn close(&mut self) -> Result<()> {
        self.client
            .close()
            .map_err(|e| anyhow!("Failed to close Discord connection: {e}"))
    }
}

/// Connect on a background thread.
///
/// The returned receiver yields exactly one value: the connected transport
/// or the reason it couldn't connect.
pub fn connect_in_background(app_id: &str) -> mpsc::Receiver<Result<DiscordTransport>> {
    let (tx, rx) = mpsc::sync_channel(1);
    let app_id = app_id.to_string();

    thread::spawn(move || {
        info!("🔗 Connecting to Discord...");
        let result = DiscordTransport::connect(&app_id);
        match &result {
            Ok(_) => info!("✅ Connected to Discord!"),
            Err(e) => warn!("{e}"),
        }
        if tx.send(result).is_err() {
            debug!("Nobody waiting for the Discord connection");
        }
    });

    rx
}

/// Build the Discord activity for a payload. Timestamps are attached only
/// when the payload has a progress bar.
pub fn to_activity(payload: &PresencePayload) -> activity::Activity<'_> {
    let assets = activity::Assets::new()
        .large_image(&payload.large_image_key)
        .large_text(&payload.large_text)
        .small_text(&payload.small_text);

    let activity = activity::Activity::new()
        .details(&payload.details)
        .state(&payload.state)
        .assets(assets);

    match payload.timestamps {
        Some(ts) => activity.timestamps(
            activity::Timestamps::new()
                .start(unix_seconds(ts.start))
                .end(unix_seconds(ts.end)),
        ),
        None => activity,
    }
}

/// Unix time in whole seconds, which is what Discord's activity timestamps
/// take over IPC. Instants before the epoch clamp to 0.
pub fn unix_seconds(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayerSnapshot, PlayerState};
    use std::time::Duration;

    fn snapshot(player_state: PlayerState) -> PlayerSnapshot {
        PlayerSnapshot {
            title: Some("Chikhai Bardo".to_string()),
            series_name: Some("Severance".to_string()),
            season_number: Some(1),
            episode_number: Some(7),
            player_state,
            duration_secs: Some(3000.0),
            position_secs: Some(600.0),
            observed_at: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        }
    }

    #[test]
    fn test_activity_for_playing_episode() {
        let payload = crate::map(&snapshot(PlayerState::Playing));
        let json = serde_json::to_value(to_activity(&payload)).unwrap();

        assert_eq!(json["details"], "Severance");
        assert_eq!(json["state"], "Chikhai Bardo");
        assert_eq!(json["assets"]["large_image"], "tv");
        assert_eq!(json["assets"]["large_text"], "Season 1 Episode 7");
        assert_eq!(json["assets"]["small_text"], payload.small_text.as_str());
        assert_eq!(json["timestamps"]["start"], 1_699_999_400_i64);
        assert_eq!(json["timestamps"]["end"], 1_700_002_400_i64);
    }

    #[test]
    fn test_activity_without_bar_has_no_timestamps() {
        let paused = crate::map(&snapshot(PlayerState::Paused));
        let json = serde_json::to_value(to_activity(&paused)).unwrap();
        assert_eq!(json["details"], "Paused - Severance");
        assert!(json.get("timestamps").is_none());

        let idle = serde_json::to_value(to_activity(&PresencePayload::idle())).unwrap();
        assert_eq!(idle["assets"]["large_image"], "tv");
        assert!(idle.get("timestamps").is_none());
    }

    #[test]
    fn test_unix_seconds() {
        assert_eq!(unix_seconds(UNIX_EPOCH), 0);
        assert_eq!(
            unix_seconds(UNIX_EPOCH + Duration::from_millis(1_700_000_000_999)),
            1_700_000_000
        );
    }

    #[test]
    fn test_unix_seconds_before_epoch() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(unix_seconds(before), 0);
    }

    #[test]
    fn test_timestamp_span_survives_conversion() {
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let start = now - Duration::from_secs(600);
        let end = now + Duration::from_secs(2400);
        assert_eq!(unix_seconds(end) - unix_seconds(start), 3000);
    }
}
