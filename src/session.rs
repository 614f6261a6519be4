//! Presence session
//!
//! Owns the observer and the transport and turns every trigger into one
//! observe → map → push round. Runs on a single thread; triggers arrive
//! through a channel and are handled in order.

use anyhow::Result;
use log::{debug, info, warn};
use std::sync::mpsc::Receiver;

use crate::observer::PlayerObserver;
use crate::presence::{self, PresencePayload};
use crate::transport::PresenceTransport;

/// Events delivered to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The player reported a change; take a fresh snapshot
    PlayerInfoChanged,
    /// Clear the presence and stop
    Shutdown,
}

pub struct PresenceSession<O, T> {
    observer: O,
    transport: T,
}

impl<O: PlayerObserver, T: PresenceTransport> PresenceSession<O, T> {
    pub fn new(observer: O, transport: T) -> Self {
        Self {
            observer,
            transport,
        }
    }

    /// Observe the player, map the snapshot and push the result.
    ///
    /// Failures are logged and returned; nothing is retried. When the
    /// observer fails nothing is pushed, so the last presence stays up.
    pub fn refresh(&mut self) -> Result<PresencePayload> {
        let snapshot = match self.observer.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Error reading player state: {e:#}");
                return Err(e.context("Failed to observe player"));
            }
        };

        let payload = presence::map(&snapshot);

        if let Err(e) = self.transport.set_presence(&payload) {
            warn!("Discord update error: {e:#}");
            return Err(e.context("Failed to push presence"));
        }

        debug!("Updated presence: {} / {}", payload.details, payload.state);
        Ok(payload)
    }

    /// Run until [`SessionEvent::Shutdown`] or until every sender is gone.
    ///
    /// Starts with one refresh, since being connected is itself a trigger.
    /// `on_update` sees every payload that was pushed successfully.
    pub fn run(mut self, events: &Receiver<SessionEvent>, mut on_update: impl FnMut(&PresencePayload)) {
        if let Ok(payload) = self.refresh() {
            on_update(&payload);
        }

        loop {
            match events.recv() {
                Ok(SessionEvent::PlayerInfoChanged) => {
                    // One refresh covers everything already queued
                    if drain_pending(events) {
                        break;
                    }
                    if let Ok(payload) = self.refresh() {
                        on_update(&payload);
                    }
                }
                Ok(SessionEvent::Shutdown) => break,
                Err(_) => {
                    debug!("Event channel closed");
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Clear the presence and close the transport
    pub fn shutdown(mut self) {
        info!("Presence session shutting down...");
        if let Err(e) = self.transport.clear() {
            debug!("Failed to clear presence: {e:#}");
        }
        if let Err(e) = self.transport.close() {
            debug!("Failed to close transport: {e:#}");
        }
    }
}

/// Empty the queue without blocking. Returns whether a
/// [`SessionEvent::Shutdown`] was among the drained events.
pub fn drain_pending(events: &Receiver<SessionEvent>) -> bool {
    events
        .try_iter()
        .filter(|event| *event == SessionEvent::Shutdown)
        .count()
        > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayerSnapshot, PlayerState};
    use anyhow::bail;
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Set(PresencePayload),
        Clear,
        Close,
    }

    /// Hands out queued results, then empty snapshots
    struct FakeObserver {
        results: Mutex<VecDeque<Result<PlayerSnapshot>>>,
    }

    impl FakeObserver {
        fn new(results: Vec<Result<PlayerSnapshot>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
            }
        }
    }

    impl PlayerObserver for FakeObserver {
        fn snapshot(&self) -> Result<PlayerSnapshot> {
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PlayerSnapshot::empty(at(0))))
        }
    }

    #[derive(Default, Clone)]
    struct RecordingTransport {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_pushes: bool,
    }

    impl RecordingTransport {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PresenceTransport for RecordingTransport {
        fn set_presence(&mut self, payload: &PresencePayload) -> Result<()> {
            if self.fail_pushes {
                bail!("pipe closed");
            }
            self.calls.lock().unwrap().push(Call::Set(payload.clone()));
            Ok(())
        }

        fn clear(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Clear);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Close);
            Ok(())
        }
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn playing_episode() -> PlayerSnapshot {
        PlayerSnapshot {
            title: Some("Chikhai Bardo".to_string()),
            series_name: Some("Severance".to_string()),
            season_number: Some(1),
            episode_number: Some(7),
            player_state: PlayerState::Playing,
            duration_secs: Some(3000.0),
            position_secs: Some(600.0),
            observed_at: at(1_700_000_000),
        }
    }

    #[test]
    fn test_refresh_pushes_mapped_payload() {
        let transport = RecordingTransport::default();
        let mut session = PresenceSession::new(
            FakeObserver::new(vec![Ok(playing_episode())]),
            transport.clone(),
        );

        let payload = session.refresh().unwrap();
        assert_eq!(payload, presence::map(&playing_episode()));
        assert_eq!(transport.calls(), vec![Call::Set(payload)]);
    }

    #[test]
    fn test_observer_failure_skips_push() {
        let transport = RecordingTransport::default();
        let mut session = PresenceSession::new(
            FakeObserver::new(vec![Err(anyhow::anyhow!("osascript timed out"))]),
            transport.clone(),
        );

        let err = session.refresh().unwrap_err();
        assert!(format!("{err:#}").contains("osascript timed out"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_push_failure_is_reported() {
        let transport = RecordingTransport {
            fail_pushes: true,
            ..RecordingTransport::default()
        };
        let mut session = PresenceSession::new(
            FakeObserver::new(vec![Ok(playing_episode())]),
            transport,
        );
        assert!(session.refresh().is_err());
    }

    #[test]
    fn test_nothing_playing_pushes_idle() {
        let transport = RecordingTransport::default();
        let mut session = PresenceSession::new(FakeObserver::new(vec![]), transport.clone());
        assert!(session.refresh().unwrap().is_idle());
    }

    #[test]
    fn test_run_refreshes_on_connect_and_shutdown_clears() {
        let transport = RecordingTransport::default();
        let session = PresenceSession::new(
            FakeObserver::new(vec![Ok(playing_episode())]),
            transport.clone(),
        );
        let (tx, rx) = mpsc::channel();
        tx.send(SessionEvent::Shutdown).unwrap();

        let mut updates = Vec::new();
        session.run(&rx, |p| updates.push(p.clone()));

        let expected = presence::map(&playing_episode());
        assert_eq!(updates, vec![expected.clone()]);
        assert_eq!(
            transport.calls(),
            vec![Call::Set(expected), Call::Clear, Call::Close]
        );
    }

    #[test]
    fn test_run_coalesces_queued_changes() {
        let transport = RecordingTransport::default();
        let paused = PlayerSnapshot {
            player_state: PlayerState::Paused,
            ..playing_episode()
        };
        let session = PresenceSession::new(
            FakeObserver::new(vec![Ok(playing_episode()), Ok(paused.clone())]),
            transport.clone(),
        );
        let (tx, rx) = mpsc::channel();
        for _ in 0..3 {
            tx.send(SessionEvent::PlayerInfoChanged).unwrap();
        }
        drop(tx);

        let mut updates = Vec::new();
        session.run(&rx, |p| updates.push(p.details.clone()));

        assert_eq!(updates, vec!["Severance", "Paused - Severance"]);
        assert_eq!(transport.calls().len(), 4); // two pushes, clear, close
    }

    #[test]
    fn test_drain_pending_finds_shutdown_behind_changes() {
        let (tx, rx) = mpsc::channel();
        for _ in 0..5 {
            tx.send(SessionEvent::PlayerInfoChanged).unwrap();
        }
        tx.send(SessionEvent::Shutdown).unwrap();
        tx.send(SessionEvent::PlayerInfoChanged).unwrap();

        assert!(drain_pending(&rx));
        assert!(rx.try_recv().is_err());
        assert!(!drain_pending(&rx));
    }

    #[test]
    fn test_drain_pending_without_shutdown() {
        let (tx, rx) = mpsc::channel();
        tx.send(SessionEvent::PlayerInfoChanged).unwrap();
        tx.send(SessionEvent::PlayerInfoChanged).unwrap();

        assert!(!drain_pending(&rx));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_run_skips_failed_observations() {
        let transport = RecordingTransport::default();
        let session = PresenceSession::new(
            FakeObserver::new(vec![
                Ok(playing_episode()),
                Err(anyhow::anyhow!("no player")),
            ]),
            transport.clone(),
        );
        let (tx, rx) = mpsc::channel();
        tx.send(SessionEvent::PlayerInfoChanged).unwrap();
        drop(tx);

        let mut count = 0;
        session.run(&rx, |_| count += 1);

        assert_eq!(count, 1);
        assert_eq!(
            transport.calls(),
            vec![
                Call::Set(presence::map(&playing_episode())),
                Call::Clear,
                Call::Close,
            ]
        );
    }

    #[test]
    fn test_run_on_another_thread() {
        let transport = RecordingTransport::default();
        let session = PresenceSession::new(FakeObserver::new(vec![]), transport.clone());
        let (tx, rx) = mpsc::channel();

        let worker = std::thread::spawn(move || session.run(&rx, |_| {}));
        tx.send(SessionEvent::PlayerInfoChanged).unwrap();
        tx.send(SessionEvent::Shutdown).unwrap();
        worker.join().unwrap();

        assert_eq!(transport.calls().last(), Some(&Call::Close));
    }
}
