//! Player observer
//!
//! Reads the player's now-playing properties through its AppleScript
//! dictionary. The script is run with `osascript` and prints one line of
//! fields separated by the ASCII unit separator (0x1F), which can't appear
//! in titles.
//!
//! Fields, in order: player state, name, show, season number, episode
//! number, duration, player position. Any of them may be empty or
//! `missing value`; Apple TV+ titles in particular report almost nothing.

use anyhow::{bail, Context, Result};
use log::debug;
use std::process::Command;
use std::time::{Duration, SystemTime};

use crate::util;
use crate::{PlayerSnapshot, PlayerState};

const FIELD_SEPARATOR: char = '\u{1f}';
const NOT_RUNNING: &str = "not running";
const MISSING_VALUE: &str = "missing value";

/// Source of player snapshots
pub trait PlayerObserver {
    /// Take a fresh snapshot. Nothing playing is a valid snapshot, not an error.
    fn snapshot(&self) -> Result<PlayerSnapshot>;
}

/// Observer backed by the player's AppleScript dictionary
#[derive(Debug, Clone)]
pub struct ScriptingObserver {
    bundle_id: String,
    script: String,
    timeout: Duration,
}

impl ScriptingObserver {
    pub fn new(bundle_id: &str, timeout: Duration) -> Result<Self> {
        let script = build_script(bundle_id)?;
        Ok(Self {
            bundle_id: bundle_id.to_string(),
            script,
            timeout,
        })
    }

    fn run_script(&self) -> Result<String> {
        let output = util::run_command_with_timeout(
            Command::new("osascript").args(["-e", &self.script]),
            self.timeout,
        )
        .context("Failed to run osascript")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("osascript failed ({}): {}", output.status, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PlayerObserver for ScriptingObserver {
    fn snapshot(&self) -> Result<PlayerSnapshot> {
        let raw = self.run_script()?;
        let snapshot = parse_snapshot(&raw, SystemTime::now());
        debug!(
            "{}: state={:?} title={:?} show={:?}",
            self.bundle_id, snapshot.player_state, snapshot.title, snapshot.series_name
        );
        Ok(snapshot)
    }
}

/// Build the AppleScript that reads the player state.
///
/// The running check comes first so the script never launches the player.
pub fn build_script(bundle_id: &str) -> Result<String> {
    // The id is spliced into the script source
    let unsafe_char = |c: char| c == '"' || c == '\\' || c.is_whitespace();
    if bundle_id.is_empty() || bundle_id.contains(unsafe_char) {
        bail!("Invalid bundle identifier: {bundle_id:?}");
    }

    Ok(format!(
        r#"set sep to character id 31
if application id "{bundle_id}" is not running then return "{NOT_RUNNING}"
tell application id "{bundle_id}"
	set ps to ""
	set pp to ""
	set nm to ""
	set sh to ""
	set sn to ""
	set en to ""
	set du to ""
	try
		set ps to (player state as text)
	end try
	try
		set pp to (player position as text)
	end try
	try
		set t to current track
		try
			set nm to (name of t as text)
		end try
		try
			set sh to (show of t as text)
		end try
		try
			set sn to (season number of t as text)
		end try
		try
			set en to (episode number of t as text)
		end try
		try
			set du to (duration of t as text)
		end try
	end try
end tell
return ps & sep & nm & sep & sh & sep & sn & sep & en & sep & du & sep & pp"#
    ))
}

/// Parse the script output into a snapshot taken at `observed_at`.
pub fn parse_snapshot(raw: &str, observed_at: SystemTime) -> PlayerSnapshot {
    let raw = raw.trim_end_matches(['\r', '\n']);
    if raw.trim() == NOT_RUNNING {
        return PlayerSnapshot::empty(observed_at);
    }

    let mut fields = raw.split(FIELD_SEPARATOR);
    let mut next = || fields.next().unwrap_or("");

    let player_state = parse_player_state(next());
    let title = parse_text(next());
    let series_name = parse_text(next());
    let season_number = parse_index(next());
    let episode_number = parse_index(next());
    let duration_secs = parse_number(next());
    let position_secs = parse_number(next());

    PlayerSnapshot {
        title,
        series_name,
        season_number,
        episode_number,
        player_state,
        duration_secs,
        position_secs,
        observed_at,
    }
}

/// Map the script's player state text to [`PlayerState`].
///
/// Without the app's dictionary loaded, AppleScript prints the raw
/// four-char codes (`kPSP`, `kPSp`), so accept those too.
pub fn parse_player_state(s: &str) -> PlayerState {
    let s = s.trim();
    match s {
        "kPSP" => return PlayerState::Playing,
        "kPSp" => return PlayerState::Paused,
        _ => {}
    }
    match s.to_lowercase().as_str() {
        "playing" => PlayerState::Playing,
        "paused" => PlayerState::Paused,
        _ => PlayerState::Other,
    }
}

fn parse_text(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s == MISSING_VALUE {
        None
    } else {
        Some(s.to_string())
    }
}

/// Seconds as printed by AppleScript, which follows the user's locale
/// for the decimal separator.
fn parse_number(s: &str) -> Option<f64> {
    let s = parse_text(s)?;
    s.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Season and episode numbers; the player reports 0 when unset.
fn parse_index(s: &str) -> Option<i64> {
    parse_text(s)?.parse::<i64>().ok().filter(|n| *n > 0)
}
