//! Runtime Orchestration
//!
//! Brings the pieces up in order and owns them while the daemon runs:
//!
//! ```text
//!   build pages ──▶ instance lock ──▶ connect ──▶ router ──▶ render loop
//!                        │                                      │
//!                    contended                             event wiring
//!                        ▼                                      │
//!                    Conceded                         page 1 LEDs pushed
//! ```
//!
//! Pages are built before the lock is taken so a bad configuration fails
//! without touching the device. A contended lock ends startup before
//! discovery. An interrupt during startup hands back whatever was already
//! acquired so shutdown can clear and release it.

use std::future::Future;
use std::sync::Arc;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use parking_lot::RwLock;

use crate::component::{ActionSink, ComponentContext};
use crate::config::{ConfigError, DeckConfig};
use crate::device::{DeviceDiscovery, DeviceEvent};
use crate::error::{DeckError, Result};
use crate::geometry::GridGeometry;
use crate::lock::{InstanceLock, LockOutcome};
use crate::render::{RenderLoop, RenderSignal};
use crate::router::{build_pages, DisplayRouter, SharedRouter};
use crate::session::DeviceSession;
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome, Teardown};
use crate::system::SystemControl;
use crate::wiring::{EventDispatcher, EventWiring, SharedConfig};

/// How startup ended
#[derive(Debug)]
pub enum Startup {
    /// The device is connected and the display is live
    Running(DeckRuntime),
    /// Another live instance kept the lock; the device was never touched
    Conceded {
        /// The holder's process id
        pid: i32,
    },
    /// Startup was interrupted; the parts acquired so far still need
    /// tearing down
    Interrupted(Teardown),
}

/// A running deck
#[derive(Debug)]
pub struct DeckRuntime {
    config: SharedConfig,
    session: Arc<DeviceSession>,
    router: SharedRouter,
    signal: RenderSignal,
    ctx: ComponentContext,
    dispatcher: EventDispatcher,
    render: RenderLoop,
    wiring: EventWiring,
    lock: InstanceLock,
}

impl DeckRuntime {
    /// Start the deck.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::Config`] if a page cannot be built, a lock error
    /// if the record cannot be written, or the discovery error if no device
    /// connects. The lock is released before a connect error is returned.
    pub async fn start(
        config: DeckConfig,
        discovery: Arc<dyn DeviceDiscovery>,
        system: Arc<dyn SystemControl>,
    ) -> Result<Startup> {
        Self::start_until(config, discovery, system, std::future::pending()).await
    }

    /// Start the deck, giving up when `interrupt` completes.
    ///
    /// The lock wait, the connect (including the readiness wait) and the
    /// first LED push race `interrupt`. If it wins, startup returns
    /// [`Startup::Interrupted`] with the lock, session and any spawned tasks
    /// for the caller to shut down.
    ///
    /// # Errors
    ///
    /// Same as [`DeckRuntime::start`].
    pub async fn start_until<F>(
        config: DeckConfig,
        discovery: Arc<dyn DeviceDiscovery>,
        system: Arc<dyn SystemControl>,
        interrupt: F,
    ) -> Result<Startup>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let signal = RenderSignal::new();
        let (sink, actions) = ActionSink::channel();
        let ctx = ComponentContext {
            sink,
            signal: signal.clone(),
            overlays: config.overlays,
        };
        let pages = build_pages(&config, &ctx)?;

        let acquired = tokio::select! {
            acquired = InstanceLock::acquire(&config.lock) => acquired?,
            () = &mut interrupt => {
                tracing::info!("Startup interrupted while waiting for the lock");
                return Ok(Startup::Interrupted(Teardown::default()));
            }
        };
        let lock = match acquired {
            LockOutcome::Acquired(lock) => lock,
            LockOutcome::Contended { pid } => return Ok(Startup::Conceded { pid }),
        };

        let session = Arc::new(DeviceSession::new(discovery, config.session.clone()));
        session.track_buttons(config.buttons.iter().map(|b| b.id.clone()));
        let events = session.take_events();
        let connected = tokio::select! {
            connected = session.connect() => connected,
            () = &mut interrupt => {
                tracing::info!(state = %session.state(), "Startup interrupted while connecting");
                return Ok(Startup::Interrupted(Teardown {
                    session: Some(session),
                    lock: Some(lock),
                    ..Teardown::default()
                }));
            }
        };
        if let Err(e) = connected {
            lock.release().await;
            return Err(e);
        }
        let Some(device) = session.geometry() else {
            lock.release().await;
            return Err(DeckError::NotConnected);
        };

        let geometry = GridGeometry::from_device(&device);
        if geometry.columns() != config.device.columns || geometry.rows() != config.device.rows {
            tracing::warn!(
                device_columns = geometry.columns(),
                device_rows = geometry.rows(),
                config_columns = config.device.columns,
                config_rows = config.device.rows,
                "Device grid differs from the configured one"
            );
        }

        let mut router = DisplayRouter::new(geometry, signal.clone());
        router.rebuild(pages);
        let router = router.shared();

        let render = RenderLoop::spawn(
            Arc::clone(&router),
            Arc::clone(&session),
            config.render_interval,
            signal.clone(),
        );

        let shared: SharedConfig = Arc::new(RwLock::new(config));
        let dispatcher = EventDispatcher::new(
            Arc::clone(&router),
            Arc::clone(&session),
            system,
            Arc::clone(&shared),
        );
        let events = events.unwrap_or_else(|| {
            tracing::warn!("Session events already taken, touch and knobs disabled");
            tokio::sync::mpsc::unbounded_channel::<DeviceEvent>().1
        });
        let wiring = EventWiring::spawn(dispatcher.clone(), events, actions);

        let runtime = Self {
            config: shared,
            session,
            router,
            signal,
            ctx,
            dispatcher,
            render,
            wiring,
            lock,
        };

        let current = runtime.router.lock().current_page();
        tokio::select! {
            () = runtime.dispatcher.push_leds(None, current) => {}
            () = &mut interrupt => {
                tracing::info!("Startup interrupted while pushing LEDs");
                return Ok(Startup::Interrupted(runtime.into_teardown()));
            }
        }

        tracing::info!(page = current, "Deck running");
        Ok(Startup::Running(runtime))
    }

    /// Apply a new configuration.
    ///
    /// Nothing changes unless the whole configuration validates and every
    /// page builds. Session and lock settings take effect on restart.
    ///
    /// # Errors
    ///
    /// Returns the validation or build error; the running pages are kept.
    pub async fn reload(&mut self, config: DeckConfig) -> std::result::Result<(), ConfigError> {
        config.validate()?;
        let ctx = ComponentContext {
            overlays: config.overlays,
            ..self.ctx.clone()
        };
        let pages = build_pages(&config, &ctx)?;

        let current = self.router.lock().current_page();
        let (previous_leds, interval_changed, needs_restart) = {
            let old = self.config.read();
            (
                old.led_colors(current),
                old.render_interval != config.render_interval,
                old.session != config.session || old.lock != config.lock,
            )
        };
        if needs_restart {
            tracing::info!("Session and lock settings changed, they apply after a restart");
        }

        self.router.lock().rebuild(pages);
        self.session
            .track_buttons(config.buttons.iter().map(|b| b.id.clone()));
        let render_interval = config.render_interval;
        *self.config.write() = config;
        self.ctx = ctx;

        if interval_changed {
            self.render.stop();
            self.render = RenderLoop::spawn(
                Arc::clone(&self.router),
                Arc::clone(&self.session),
                render_interval,
                self.signal.clone(),
            );
        }

        let next = self.config.read().led_colors(current);
        for (id, _) in previous_leds {
            if !next.iter().any(|(n, _)| *n == id) {
                self.session.set_button_color(&id, Rgb888::BLACK).await;
            }
        }
        self.dispatcher.push_leds(None, current).await;

        tracing::info!(page = current, "Configuration reloaded");
        Ok(())
    }

    /// Shared router
    #[must_use]
    pub fn router(&self) -> &SharedRouter {
        &self.router
    }

    /// Device session
    #[must_use]
    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    /// Render loop
    #[must_use]
    pub fn render_loop(&self) -> &RenderLoop {
        &self.render
    }

    /// Event dispatcher, for driving actions directly
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Snapshot of the active configuration
    #[must_use]
    pub fn config(&self) -> DeckConfig {
        self.config.read().clone()
    }

    /// Whether the event wiring is still running
    #[must_use]
    pub fn is_wired(&self) -> bool {
        !self.wiring.is_finished()
    }

    /// Hand every owned part to shutdown
    #[must_use]
    pub fn into_teardown(self) -> Teardown {
        Teardown {
            render: Some(self.render),
            wiring: Some(self.wiring),
            router: Some(self.router),
            session: Some(self.session),
            lock: Some(self.lock),
        }
    }

    /// Shut down through `coordinator`, running `cleanup` first
    pub async fn shutdown<F>(self, coordinator: &ShutdownCoordinator, cleanup: F) -> ShutdownOutcome
    where
        F: std::future::Future<Output = ()>,
    {
        coordinator.run(cleanup, self.into_teardown()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::device::{DeviceCall, DeviceGeometry, VirtualDeck, VirtualDiscovery};
    use crate::session::{SessionConfig, SessionState};
    use crate::system::RecordingControl;
    use embedded_graphics::prelude::Size;
    use std::time::Duration;
    use tempfile::TempDir;

    const CONFIG: &str = r##"
[device]
columns = 4
rows = 2
width = 480
height = 180

[[pages]]
number = 1
components = [
  { name = "hello", type = "label", position = { col = 1, row = 0 }, options = { text = "hi" } },
]

[[buttons]]
id = "0"
action = "mute"
led = "#ff0000"
"##;

    fn config(dir: &TempDir, text: &str) -> DeckConfig {
        let mut config = parse_config(text).unwrap();
        config.lock.path = dir.path().join("deck.lock");
        config.session = SessionConfig::for_testing();
        config
    }

    fn deck() -> Arc<VirtualDeck> {
        Arc::new(VirtualDeck::new(DeviceGeometry {
            key_size: 90,
            columns: 4,
            rows: 2,
            center: Size::new(480, 180),
        }))
    }

    async fn start(deck: &Arc<VirtualDeck>, config: DeckConfig) -> DeckRuntime {
        let startup = DeckRuntime::start(
            config,
            Arc::new(VirtualDiscovery::new(Arc::clone(deck))),
            Arc::new(RecordingControl::new()),
        )
        .await
        .unwrap();
        match startup {
            Startup::Running(runtime) => runtime,
            Startup::Conceded { pid } => panic!("unexpectedly conceded to {pid}"),
            Startup::Interrupted(_) => panic!("startup unexpectedly interrupted"),
        }
    }

    #[tokio::test]
    async fn test_start_connects_renders_and_lights_leds() {
        let dir = TempDir::new().unwrap();
        let deck = deck();
        let runtime = start(&deck, config(&dir, CONFIG)).await;

        assert_eq!(runtime.session().state(), SessionState::Ready);
        assert!(runtime.is_wired());
        assert!(deck.calls().contains(&DeviceCall::SetButtonColor {
            id: "0".into(),
            color: Rgb888::RED
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(runtime.render_loop().frames() >= 1);
        assert!(dir.path().join("deck.lock").exists());
    }

    #[tokio::test]
    async fn test_connect_failure_releases_lock() {
        let dir = TempDir::new().unwrap();
        let result = DeckRuntime::start(
            config(&dir, CONFIG),
            Arc::new(VirtualDiscovery::empty()),
            Arc::new(RecordingControl::new()),
        )
        .await;

        assert!(matches!(result, Err(DeckError::DeviceNotFound(_))));
        assert!(!dir.path().join("deck.lock").exists());
    }

    #[tokio::test]
    async fn test_bad_page_fails_before_discovery() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, CONFIG);
        config.pages[0].components[0].options.insert("bogus".into(), 1.into());
        let discovery = Arc::new(VirtualDiscovery::new(deck()));

        let result = DeckRuntime::start(
            config,
            Arc::clone(&discovery) as Arc<dyn DeviceDiscovery>,
            Arc::new(RecordingControl::new()),
        )
        .await;

        assert!(matches!(result, Err(DeckError::Config(_))));
        assert_eq!(discovery.attempts(), 0);
    }

    #[tokio::test]
    async fn test_reload_replaces_pages_and_keeps_them_on_error() {
        let dir = TempDir::new().unwrap();
        let deck = deck();
        let mut runtime = start(&deck, config(&dir, CONFIG)).await;

        let replacement = config(
            &dir,
            r##"
[device]
columns = 4
rows = 2
width = 480
height = 180

[[pages]]
number = 1
components = [
  { name = "bye", type = "label", position = { col = 2, row = 1 }, options = { text = "bye" } },
]
"##,
        );
        runtime.reload(replacement).await.unwrap();
        assert!(runtime.router().lock().find("bye").is_some());
        assert!(runtime.router().lock().find("hello").is_none());
        // The dropped binding's LED is switched off
        let last_led = deck
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::SetButtonColor { .. }))
            .last();
        assert_eq!(
            last_led,
            Some(DeviceCall::SetButtonColor {
                id: "0".into(),
                color: Rgb888::BLACK
            })
        );

        let mut broken = runtime.config();
        broken.render_interval = Duration::ZERO;
        assert!(runtime.reload(broken).await.is_err());
        assert!(runtime.router().lock().find("bye").is_some());
    }

    /// An interrupt during the readiness wait still clears the device,
    /// closes it and releases the lock through the coordinator.
    #[tokio::test]
    async fn test_interrupt_during_readiness_hands_back_session_and_lock() {
        let dir = TempDir::new().unwrap();
        let deck = deck();
        deck.set_led_delay(Some(Duration::from_secs(3600)));
        let mut config = config(&dir, CONFIG);
        config.session = config.session.with_ready_attempts(10_000);

        let startup = DeckRuntime::start_until(
            config,
            Arc::new(VirtualDiscovery::new(Arc::clone(&deck))),
            Arc::new(RecordingControl::new()),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        let Startup::Interrupted(teardown) = startup else {
            panic!("expected startup to be interrupted");
        };
        let session = Arc::clone(teardown.session.as_ref().unwrap());
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(teardown.lock.is_some());
        assert!(teardown.render.is_none());

        deck.set_led_delay(None);
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let outcome = coordinator.run(async {}, teardown).await;

        assert_eq!(outcome, ShutdownOutcome::Completed);
        assert_eq!(session.state(), SessionState::Disconnected);
        let calls = deck.calls();
        // The configured button is cleared even though it was never lit
        assert!(calls.contains(&DeviceCall::SetButtonColor {
            id: "0".into(),
            color: Rgb888::BLACK
        }));
        assert_eq!(calls.last(), Some(&DeviceCall::Close));
        assert!(!dir.path().join("deck.lock").exists());
    }

    #[tokio::test]
    async fn test_interrupt_while_waiting_for_lock_owns_nothing() {
        let dir = TempDir::new().unwrap();
        let deck = deck();
        let mut config = config(&dir, CONFIG);
        config.lock.wait = Duration::from_secs(30);
        std::fs::write(&config.lock.path, "1 1700000000\n").unwrap();
        let discovery = Arc::new(VirtualDiscovery::new(Arc::clone(&deck)));

        let startup = DeckRuntime::start_until(
            config,
            Arc::clone(&discovery) as Arc<dyn DeviceDiscovery>,
            Arc::new(RecordingControl::new()),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        let Startup::Interrupted(teardown) = startup else {
            panic!("expected startup to be interrupted");
        };
        assert!(teardown.session.is_none() && teardown.lock.is_none());
        assert_eq!(discovery.attempts(), 0);
        assert!(deck.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_clears_device_and_lock() {
        let dir = TempDir::new().unwrap();
        let deck = deck();
        let runtime = start(&deck, config(&dir, CONFIG)).await;
        let session = Arc::clone(runtime.session());

        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let outcome = runtime.shutdown(&coordinator, async {}).await;

        assert_eq!(outcome, ShutdownOutcome::Completed);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(deck.calls().last(), Some(&DeviceCall::Close));
        assert!(!dir.path().join("deck.lock").exists());
    }
}
