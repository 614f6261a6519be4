//! TV Presence - menu bar application
//!
//! Mirrors what's playing in the Apple TV app into Discord Rich Presence.
//! Runs as a menu bar item without a window.
//!
//! Architecture:
//! - Main thread: winit event loop for the tray icon and its menu
//! - Worker thread: waits for Discord, then runs the presence session
//! - Signal threads: turn player changes into session events

use log::{error, info, warn};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tray_icon::menu::MenuEvent;
use tv_presence::config::Config;
use tv_presence::observer::ScriptingObserver;
use tv_presence::session::{self, PresenceSession, SessionEvent};
use tv_presence::signal::{player_info_signal_name, IntervalSignals, NowPlayingSignals, SignalSource, Subscription};
use tv_presence::transport;
use tv_presence::tray::{self, TrayHandle};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::window::WindowId;

/// How often the worker checks for Quit while waiting on Discord
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Events delivered to the main thread
#[derive(Debug, Clone)]
enum UserEvent {
    /// New status line from the worker
    StatusUpdate(String),
    /// Menu event from the tray
    MenuEvent(MenuEvent),
}

struct App {
    tray: TrayHandle,
    session_tx: mpsc::Sender<SessionEvent>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, _event: WindowEvent) {}

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::StatusUpdate(status) => {
                self.tray.set_status(&status);
            }
            UserEvent::MenuEvent(menu_event) => {
                if menu_event.id.0 == tray::MENU_ID_QUIT {
                    info!("Quit requested, shutting down...");
                    let _ = self.session_tx.send(SessionEvent::Shutdown);
                    // Let the worker clear the presence before we go
                    if let Some(worker) = self.worker.take() {
                        let _ = worker.join();
                    }
                    event_loop.exit();
                }
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    info!("📺 TV Presence starting...");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return;
        }
    };

    let observer = match ScriptingObserver::new(&config.bundle_id, config.command_timeout()) {
        Ok(observer) => observer,
        Err(e) => {
            error!("{e:#}");
            return;
        }
    };

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let proxy = event_loop.create_proxy();

    let menu_proxy = event_loop.create_proxy();
    MenuEvent::set_event_handler(Some(move |event| {
        let _ = menu_proxy.send_event(UserEvent::MenuEvent(event));
    }));

    let tray = TrayHandle::new().expect("Failed to create tray icon");
    info!("✅ Menu bar item ready");

    let (session_tx, session_rx) = mpsc::channel::<SessionEvent>();
    let _subscriptions = subscribe_to_player(&config, &session_tx);

    let worker = {
        let app_id = config.discord_app_id.clone();
        thread::spawn(move || run_worker(&app_id, observer, &session_rx, &proxy))
    };

    let mut app = App {
        tray,
        session_tx,
        worker: Some(worker),
    };

    info!("🔄 Running event loop...");
    let _ = event_loop.run_app(&mut app);
}

/// Subscribe to player change signals. Subscriptions stop when dropped.
fn subscribe_to_player(config: &Config, session_tx: &mpsc::Sender<SessionEvent>) -> Vec<Subscription> {
    let signal_name = player_info_signal_name(&config.bundle_id);
    let mut sources: Vec<Box<dyn SignalSource>> =
        vec![Box::new(NowPlayingSignals::new(config.signal_poll_interval()))];
    if let Some(period) = config.refresh_interval() {
        sources.push(Box::new(IntervalSignals::new(period)));
    }

    let mut subscriptions = Vec::new();
    for source in sources {
        let tx = session_tx.clone();
        let handler = Box::new(move || {
            let _ = tx.send(SessionEvent::PlayerInfoChanged);
        });
        match source.subscribe(&signal_name, handler) {
            Ok(subscription) => {
                info!("👂 Listening for {}", subscription.name());
                subscriptions.push(subscription);
            }
            Err(e) => warn!("{e:#}"),
        }
    }
    subscriptions
}

/// Wait for Discord once, then run the presence session until Quit
fn run_worker(
    app_id: &str,
    observer: ScriptingObserver,
    session_rx: &mpsc::Receiver<SessionEvent>,
    proxy: &EventLoopProxy<UserEvent>,
) {
    let connected = transport::connect_in_background(app_id);

    let discord = loop {
        match connected.recv_timeout(CONNECT_POLL_INTERVAL) {
            Ok(Ok(discord)) => break discord,
            Ok(Err(e)) => {
                error!("Giving up on Discord: {e:#}");
                let _ = proxy.send_event(UserEvent::StatusUpdate(tray::DISCONNECTED_STATUS.to_string()));
                return;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Quit while still connecting
                if session::drain_pending(session_rx) {
                    return;
                }
            }
        }
    };

    // Changes seen before the connection are covered by the initial refresh
    if session::drain_pending(session_rx) {
        return;
    }

    let session = PresenceSession::new(observer, discord);
    session.run(session_rx, |payload| {
        let _ = proxy.send_event(UserEvent::StatusUpdate(tray::status_text(payload)));
    });
    info!("Worker stopped");
}
