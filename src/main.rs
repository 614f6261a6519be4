//! TV Presence debug tool
//!
//! Reads the Apple TV app once and prints the snapshot and the presence
//! it maps to, without talking to Discord.

use anyhow::Result;
use tv_presence::config::{self, Config};
use tv_presence::observer::{PlayerObserver, ScriptingObserver};
use tv_presence::transport::unix_seconds;
use tv_presence::util::truncate;
use tv_presence::{map, PlayerSnapshot, PresencePayload};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    println!("📺 TV Presence - debug");
    println!("======================\n");

    let config = Config::load()?;
    match config::config_path() {
        Some(path) if path.exists() => println!("⚙️  Config: {}", path.display()),
        _ => println!("⚙️  Config: defaults"),
    }
    println!("   Bundle: {}", config.bundle_id);
    println!("   Discord app: {}\n", config.discord_app_id);

    let observer = ScriptingObserver::new(&config.bundle_id, config.command_timeout())?;

    let snapshot = match observer.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("❌ Error reading player state: {e:#}");
            return Err(e);
        }
    };

    print_snapshot(&snapshot);
    println!();
    print_payload(&map(&snapshot));

    Ok(())
}

fn print_snapshot(snapshot: &PlayerSnapshot) {
    println!("┌─────────────────────────────────────┐");
    println!("│ 📺 Player Snapshot                  │");
    println!("├─────────────────────────────────────┤");
    println!("│ State:         {:20} │", format!("{:?}", snapshot.player_state));
    println!("│ Title:         {:20} │", field(snapshot.title.as_deref()));
    println!("│ Show:          {:20} │", field(snapshot.series_name.as_deref()));
    if let Some(season) = snapshot.season_number {
        println!("│ Season:        {season:20} │");
    }
    if let Some(episode) = snapshot.episode_number {
        println!("│ Episode:       {episode:20} │");
    }
    if let Some(duration) = snapshot.duration_secs {
        println!("│ Duration:      {duration:>19.1}s │");
    }
    if let Some(position) = snapshot.position_secs {
        println!("│ Position:      {position:>19.1}s │");
    }
    println!("└─────────────────────────────────────┘");
}

fn print_payload(payload: &PresencePayload) {
    println!("📝 For Discord Rich Presence:");
    println!("   Details:     {}", payload.details);
    println!("   State:       {}", payload.state);
    println!("   Large image: {}", payload.large_image_key);
    println!("   Large text:  {}", payload.large_text);
    println!("   Small text:  {}", payload.small_text);
    match payload.timestamps {
        Some(ts) => println!(
            "   Timestamps:  {} → {}",
            unix_seconds(ts.start),
            unix_seconds(ts.end)
        ),
        None => println!("   Timestamps:  (none)"),
    }
}

fn field(value: Option<&str>) -> String {
    value.map_or_else(|| "(none)".to_string(), |v| truncate(v, 20))
}
