//! Runtime configuration
//!
//! Read from `<config dir>/tv-presence/config.json` when present (on macOS
//! that's `~/Library/Application Support/tv-presence/config.json`). Every
//! field is optional; missing ones take the defaults below. A couple of
//! fields can also be overridden through the environment.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::util::DEFAULT_COMMAND_TIMEOUT;

/// Discord application that owns the "tv" art asset
pub const DEFAULT_DISCORD_APP_ID: &str = "896880510381457452";

/// Apple TV's bundle identifier
pub const DEFAULT_BUNDLE_ID: &str = "com.apple.TV";

pub const ENV_APP_ID: &str = "TV_PRESENCE_APP_ID";
pub const ENV_BUNDLE_ID: &str = "TV_PRESENCE_BUNDLE_ID";

const CONFIG_DIR_NAME: &str = "tv-presence";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discord application (client) id
    pub discord_app_id: String,

    /// Bundle id of the player to observe
    pub bundle_id: String,

    /// How often the MediaRemote feed is polled for player changes
    pub signal_poll_ms: u64,

    /// Periodic resync interval, 0 disables it.
    pub refresh_interval_secs: u64,

    /// Deadline for each osascript run
    pub command_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_app_id: DEFAULT_DISCORD_APP_ID.to_string(),
            bundle_id: DEFAULT_BUNDLE_ID.to_string(),
            signal_poll_ms: 500,
            refresh_interval_secs: 0,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {path:?}"))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(app_id) = non_empty(ENV_APP_ID) {
            self.discord_app_id = app_id.trim().to_string();
        }
        if let Some(bundle_id) = non_empty(ENV_BUNDLE_ID) {
            self.bundle_id = bundle_id.trim().to_string();
        }
    }

    pub fn signal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.signal_poll_ms.max(100))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

/// Location of the config file for this user
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
