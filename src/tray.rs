//! Menu bar status item
//!
//! A tray icon with a disabled status line mirroring the last pushed
//! presence, and a Quit item. Built on `tray-icon`; menu events are
//! delivered through `MenuEvent`'s global handler, which the binary
//! forwards into its event loop.

use anyhow::{Context, Result};
use tray_icon::{
    menu::{Menu, MenuItem, PredefinedMenuItem},
    Icon, TrayIcon, TrayIconBuilder,
};

use crate::presence::PresencePayload;
use crate::util::truncate;

pub const MENU_ID_STATUS: &str = "status";
pub const MENU_ID_QUIT: &str = "quit";

pub const TOOLTIP: &str = "TV Presence";
pub const WAITING_STATUS: &str = "Waiting for Discord...";
pub const DISCONNECTED_STATUS: &str = "Discord not available";

/// Longest status line shown in the menu
const MAX_STATUS_CHARS: usize = 48;

/// Tray icon and the menu items we update later
pub struct TrayHandle {
    _tray_icon: TrayIcon,
    status_item: MenuItem,
}

impl TrayHandle {
    /// Create the tray icon and its menu. Must run on the main thread.
    pub fn new() -> Result<Self> {
        let icon = load_icon()?;

        let status_item = MenuItem::with_id(MENU_ID_STATUS, WAITING_STATUS, false, None);
        let quit_item = MenuItem::with_id(MENU_ID_QUIT, "Quit", true, None);

        let menu = Menu::new();
        menu.append(&status_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&quit_item)?;

        let tray_icon = TrayIconBuilder::new()
            .with_icon(icon)
            .with_icon_as_template(true)
            .with_menu(Box::new(menu))
            .with_tooltip(TOOLTIP)
            .build()
            .context("Failed to create tray icon")?;

        Ok(Self {
            _tray_icon: tray_icon,
            status_item,
        })
    }

    /// Update the status line shown in the menu
    pub fn set_status(&self, status: &str) {
        self.status_item.set_text(status);
    }
}

/// Status line for a pushed presence
pub fn status_text(payload: &PresencePayload) -> String {
    let text = if payload.is_idle() {
        payload.state.clone()
    } else {
        format!("{} - {}", payload.details, payload.state)
    };
    truncate(&text, MAX_STATUS_CHARS)
}

/// Load the embedded menu bar icon
fn load_icon() -> Result<Icon> {
    let icon_bytes = include_bytes!("../assets/tray_icon.png");

    let image = image::load_from_memory(icon_bytes)
        .context("Failed to load tray icon image")?
        .into_rgba8();

    let (width, height) = image.dimensions();
    let rgba = image.into_raw();

    Icon::from_rgba(rgba, width, height).context("Failed to create icon from RGBA data")
}
