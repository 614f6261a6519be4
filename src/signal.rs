//! Player change signals
//!
//! A signal is a named, payload-free trigger: "something about the player
//! changed, go look". Subscribers get a handler call per signal on a
//! delivery thread owned by the [`Subscription`].
//!
//! The player announces changes under `<bundle id>.playerInfo`. We pick
//! those up from the MediaRemote now-playing feed (via `mediaremote-rs`),
//! filtered to the player's bundle.

use anyhow::{bail, Result};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const PLAYER_INFO_SUFFIX: &str = ".playerInfo";

/// How often delivery threads check for cancellation
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Called once per signal, with no payload
pub type SignalHandler = Box<dyn FnMut() + Send + 'static>;

/// Something that can deliver named signals
pub trait SignalSource {
    fn subscribe(&self, name: &str, handler: SignalHandler) -> Result<Subscription>;
}

/// Live subscription. Delivery stops on [`Subscription::cancel`] or drop.
#[derive(Debug)]
pub struct Subscription {
    name: String,
    stop: Arc<AtomicBool>,
}

impl Subscription {
    fn new(name: &str) -> (Self, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        let subscription = Self {
            name: name.to_string(),
            stop: Arc::clone(&stop),
        };
        (subscription, stop)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// `com.apple.TV` -> `com.apple.TV.playerInfo`
pub fn player_info_signal_name(bundle_id: &str) -> String {
    format!("{bundle_id}{PLAYER_INFO_SUFFIX}")
}

/// `com.apple.TV.playerInfo` -> `com.apple.TV`
pub fn bundle_id_from_signal_name(name: &str) -> Option<&str> {
    name.strip_suffix(PLAYER_INFO_SUFFIX)
        .filter(|bundle_id| !bundle_id.is_empty())
}

/// Sleep for `duration`, waking early if `stop` is set.
/// Returns `false` if stopped.
fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(STOP_CHECK_INTERVAL.min(deadline - now));
    }
}

/// Fires on a fixed period, whatever the name
#[derive(Debug, Clone, Copy)]
pub struct IntervalSignals {
    period: Duration,
}

impl IntervalSignals {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl SignalSource for IntervalSignals {
    fn subscribe(&self, name: &str, mut handler: SignalHandler) -> Result<Subscription> {
        if self.period.is_zero() {
            bail!("Interval for {name} must be non-zero");
        }
        let (subscription, stop) = Subscription::new(name);
        let period = self.period;
        let name = name.to_string();

        thread::spawn(move || {
            while sleep_unless_stopped(&stop, period) {
                handler();
            }
            debug!("Interval subscription {name} stopped");
        });

        Ok(subscription)
    }
}

/// Position jump (beyond wall-clock progress) that counts as a seek
const SEEK_TOLERANCE_SECS: f64 = 2.0;

/// Last update seen from the observed player
#[derive(Debug, Clone)]
struct Seen {
    title: String,
    playing: bool,
    elapsed: Option<f64>,
    at: Instant,
}

/// Decides which now-playing updates count as a player-info change.
///
/// Fires when the player's title or playing flag changes while it is the
/// now-playing app, when its reported position jumps away from where
/// playback should be (a seek), and once when some other app (or nothing)
/// takes over.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    bundle_id: String,
    last: Option<Seen>,
}

impl ChangeFilter {
    pub fn new(bundle_id: &str) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            last: None,
        }
    }

    /// Feed one now-playing update received at `at`; returns whether to fire.
    pub fn observe(
        &mut self,
        bundle_id: &str,
        title: &str,
        playing: bool,
        elapsed: Option<f64>,
        at: Instant,
    ) -> bool {
        if bundle_id != self.bundle_id {
            return self.last.take().is_some();
        }
        let fire = match &self.last {
            Some(prev) if prev.title == title && prev.playing == playing => {
                is_seek(prev, elapsed, at)
            }
            _ => true,
        };
        self.last = Some(Seen {
            title: title.to_string(),
            playing,
            elapsed,
            at,
        });
        fire
    }
}

/// A feed that doesn't extrapolate repeats the same elapsed value while
/// playing, so an unchanged position is never a seek.
fn is_seek(prev: &Seen, elapsed: Option<f64>, at: Instant) -> bool {
    let (Some(before), Some(now)) = (prev.elapsed, elapsed) else {
        return false;
    };
    if (now - before).abs() < 0.001 {
        return false;
    }
    let wall = if prev.playing {
        at.saturating_duration_since(prev.at).as_secs_f64()
    } else {
        0.0
    };
    (now - (before + wall)).abs() > SEEK_TOLERANCE_SECS
}

/// Player-info signals derived from the MediaRemote now-playing feed
#[derive(Debug, Clone, Copy)]
pub struct NowPlayingSignals {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    poll_interval: Duration,
}

impl NowPlayingSignals {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl SignalSource for NowPlayingSignals {
    #[cfg(target_os = "macos")]
    fn subscribe(&self, name: &str, mut handler: SignalHandler) -> Result<Subscription> {
        use std::sync::mpsc::RecvTimeoutError;

        let Some(bundle_id) = bundle_id_from_signal_name(name) else {
            bail!("Not a player info signal: {name}");
        };
        let mut filter = ChangeFilter::new(bundle_id);
        let (subscription, stop) = Subscription::new(name);
        let receiver = mediaremote_rs::subscribe(self.poll_interval);
        let name = name.to_string();

        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match receiver.recv_timeout(STOP_CHECK_INTERVAL) {
                    Ok(info) => {
                        let changed = filter.observe(
                            &info.bundle_identifier,
                            &info.title,
                            info.playing,
                            info.elapsed_time,
                            Instant::now(),
                        );
                        if changed {
                            debug!("{name}: {} playing={}", info.bundle_identifier, info.playing);
                            handler();
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("MediaRemote feed closed");
                        break;
                    }
                }
            }
            debug!("Subscription {name} stopped");
        });

        Ok(subscription)
    }

    /// MediaRemote only exists on macOS
    #[cfg(not(target_os = "macos"))]
    fn subscribe(&self, name: &str, _handler: SignalHandler) -> Result<Subscription> {
        bail!("Cannot subscribe to {name}: MediaRemote is only available on macOS")
    }
}
