//! Event Wiring
//!
//! Drains the session's device events and the components' actions on one
//! task, in arrival order, and turns them into router calls, session calls
//! and system commands:
//!
//! - `TouchStart` is mapped to a grid cell and dispatched through the router
//! - `Rotate` follows its knob binding (volume or page stepping)
//! - `ButtonDown` follows its button binding; `ButtonUp` is only logged
//! - actions from touched components run against [`SystemControl`]
//!
//! Failed system commands raise a notification on the current page when
//! one is configured there.

use std::fmt;
use std::sync::Arc;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::Point;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::component::{Action, Notice};
use crate::config::{DeckConfig, KnobAction};
use crate::device::DeviceEvent;
use crate::error::Result;
use crate::router::SharedRouter;
use crate::session::DeviceSession;
use crate::system::{parse_track, parse_volume, CommandOutput, MediaCommand, SystemControl};

/// Configuration shared with the wiring, swapped on reload
pub type SharedConfig = Arc<RwLock<DeckConfig>>;

// ============================================================================
// Dispatcher
// ============================================================================

/// Applies device events and component actions
#[derive(Clone)]
pub struct EventDispatcher {
    router: SharedRouter,
    session: Arc<DeviceSession>,
    system: Arc<dyn SystemControl>,
    config: SharedConfig,
}

impl EventDispatcher {
    /// Create a dispatcher over the running pieces
    #[must_use]
    pub fn new(
        router: SharedRouter,
        session: Arc<DeviceSession>,
        system: Arc<dyn SystemControl>,
        config: SharedConfig,
    ) -> Self {
        Self {
            router,
            session,
            system,
            config,
        }
    }

    /// Handle one device event
    pub async fn handle_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::TouchStart { x, y } => {
                let handled = self.router.lock().handle_touch_at(Point::new(x, y));
                if !handled {
                    tracing::trace!(x, y, "Touch not claimed");
                }
            }
            DeviceEvent::Rotate { id, delta } => self.handle_rotate(&id, delta).await,
            DeviceEvent::ButtonDown { id } => self.handle_button(&id).await,
            DeviceEvent::ButtonUp { id } => tracing::trace!(button = %id, "Button released"),
            DeviceEvent::Connected | DeviceEvent::Disconnected | DeviceEvent::Raw(_) => {}
        }
    }

    async fn handle_rotate(&self, id: &str, delta: i32) {
        let binding = self.config.read().knobs.iter().find(|k| k.id == id).cloned();
        let Some(binding) = binding else {
            tracing::debug!(knob = id, delta, "Unbound knob");
            return;
        };
        match binding.action {
            KnobAction::Volume => self.adjust_volume(delta.saturating_mul(binding.step)).await,
            KnobAction::Page => {
                self.step_page(delta).await;
            }
        }
    }

    async fn handle_button(&self, id: &str) {
        let current = self.router.lock().current_page();
        let action = {
            let config = self.config.read();
            // A page-specific binding wins over one that applies everywhere
            config
                .buttons
                .iter()
                .filter(|b| b.id == id && b.page.map_or(true, |p| p == current))
                .max_by_key(|b| b.page.is_some())
                .and_then(|b| Action::from_control(b.action, b.command.as_deref()))
        };
        match action {
            Some(action) => self.handle_action(action).await,
            None => tracing::debug!(button = id, page = current, "Unbound button"),
        }
    }

    /// Run one action
    pub async fn handle_action(&self, action: Action) {
        tracing::debug!(?action, "Dispatching action");
        match action {
            Action::Launch(command) => {
                let result = self.system.launch(&command).await;
                self.report("Launch failed", &command, result);
            }
            Action::SwitchPage(page) => {
                self.switch_page(page).await;
            }
            Action::Media(command) => self.media(command).await,
            Action::Workspace(workspace) => {
                let result = self.system.switch_workspace(workspace).await;
                self.report("Workspace switch failed", &workspace.to_string(), result);
            }
            Action::ToggleMute => {
                let result = self.system.toggle_mute().await;
                if self.report("Mute failed", "", result) {
                    self.refresh_volume().await;
                }
            }
            Action::Haptic(pattern) => {
                if let Err(e) = self.session.vibrate(pattern).await {
                    tracing::debug!(error = %e, "Haptic feedback failed");
                }
            }
        }
    }

    /// Make `page` current and push its LED colors.
    ///
    /// Returns false if `page` was already current.
    pub async fn switch_page(&self, page: u32) -> bool {
        let previous = {
            let mut router = self.router.lock();
            let previous = router.current_page();
            if !router.switch_page(page) {
                return false;
            }
            previous
        };
        self.push_leds(Some(previous), page).await;
        true
    }

    /// Step through configured pages by `delta`, wrapping at both ends
    pub async fn step_page(&self, delta: i32) -> bool {
        let pages = self.config.read().page_numbers();
        let current = self.router.lock().current_page();
        let Some(target) = wrap_page(&pages, current, delta) else {
            return false;
        };
        self.switch_page(target).await
    }

    /// Push LED colors for `page`, turning off those only `previous` lit
    pub async fn push_leds(&self, previous: Option<u32>, page: u32) {
        let (next, stale) = {
            let config = self.config.read();
            let next = config.led_colors(page);
            let stale: Vec<String> = previous
                .map(|p| config.led_colors(p))
                .unwrap_or_default()
                .into_iter()
                .map(|(id, _)| id)
                .filter(|id| !next.iter().any(|(n, _)| n == id))
                .collect();
            (next, stale)
        };

        for id in stale {
            self.session.set_button_color(&id, Rgb888::BLACK).await;
        }
        for (id, color) in next {
            if !self.session.set_button_color(&id, color).await {
                tracing::warn!(button = %id, page, "LED not updated");
            }
        }
    }

    async fn adjust_volume(&self, delta: i32) {
        let result = self.system.set_volume_delta(delta).await;
        if self.report("Volume change failed", "", result) {
            self.refresh_volume().await;
        }
    }

    async fn refresh_volume(&self) {
        let level = match self.system.volume().await {
            Ok(output) if output.success => parse_volume(&output.stdout),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read volume");
                None
            }
        };
        let overlay = self.router.lock().volume_overlay();
        if let Some(overlay) = overlay {
            overlay.show_temporarily(level);
        }
    }

    async fn media(&self, command: MediaCommand) {
        let result = self.system.media(command).await;
        if !self.report("Media control failed", &command.to_string(), result) {
            return;
        }

        let track = match self.system.now_playing().await {
            Ok(output) if output.success => parse_track(&output.stdout),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read now playing");
                None
            }
        };
        let overlay = self.router.lock().media_overlay();
        if let Some(overlay) = overlay {
            overlay.show_temporarily(track);
        }
    }

    /// Log a failed command and surface it as a notification.
    ///
    /// Returns whether the command succeeded.
    fn report(&self, title: &str, detail: &str, result: Result<CommandOutput>) -> bool {
        let body = match result {
            Ok(output) if output.success => return true,
            Ok(_) => detail.to_string(),
            Err(e) => e.to_string(),
        };
        tracing::warn!(title, detail = %body, "System command failed");

        let overlay = self.router.lock().notification_overlay();
        if let Some(overlay) = overlay {
            overlay.show_notification(Notice::new(title, body));
        }
        false
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Page reached by stepping `delta` from `current` through `pages`
fn wrap_page(pages: &[u32], current: u32, delta: i32) -> Option<u32> {
    if pages.is_empty() || delta == 0 {
        return None;
    }
    let index = pages.iter().position(|&p| p == current).unwrap_or(0);
    let len = pages.len() as i64;
    let next = (index as i64 + i64::from(delta)).rem_euclid(len);
    pages.get(usize::try_from(next).ok()?).copied()
}

// ============================================================================
// Wiring task
// ============================================================================

/// Handle to the task feeding a dispatcher
#[derive(Debug)]
pub struct EventWiring {
    handle: JoinHandle<()>,
}

impl EventWiring {
    /// Spawn the task. It ends once both channels close.
    pub fn spawn(
        dispatcher: EventDispatcher,
        mut events: mpsc::UnboundedReceiver<DeviceEvent>,
        mut actions: mpsc::UnboundedReceiver<Action>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut events_open = true;
            let mut actions_open = true;
            while events_open || actions_open {
                tokio::select! {
                    event = events.recv(), if events_open => match event {
                        Some(event) => dispatcher.handle_event(event).await,
                        None => {
                            tracing::debug!("Device event stream closed");
                            events_open = false;
                        }
                    },
                    action = actions.recv(), if actions_open => match action {
                        Some(action) => dispatcher.handle_action(action).await,
                        None => actions_open = false,
                    },
                }
            }
        });
        Self { handle }
    }

    /// Whether the task has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for EventWiring {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
