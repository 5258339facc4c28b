//! Device Session Manager
//!
//! Owns the one hardware handle for the lifetime of the process: discovery,
//! the readiness wait after (re)connect, LED updates with retry, and the
//! best-effort clear-and-close on disconnect. Nothing else in the crate
//! holds the handle; the router and the wiring go through the session.
//!
//! # Lifecycle
//!
//! ```text
//!   Disconnected ──connect()──▶ Connecting ──probe ok / probes exhausted──▶ Ready
//!        ▲                                                                   │
//!        └──────────────────────── Disconnecting ◀──────disconnect()─────────┘
//! ```
//!
//! Readiness is confirmed by setting the probe button's LED. A handle that
//! was just released by another process can refuse calls for a while, so the
//! probe retries on a fixed interval and a grace period follows the first
//! success. If no probe ever succeeds the session still goes `Ready`; later
//! LED and draw calls carry their own retries.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::device::{
    DeckDevice, DeviceDiscovery, DeviceEvent, DeviceGeometry, DisplayRegion, HapticPattern,
};
use crate::error::{DeckError, Result};
use crate::frame::Frame;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handle
    Disconnected,
    /// Discovering and probing
    Connecting,
    /// Handle open and usable
    Ready,
    /// Clearing and closing
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Ready => write!(f, "ready"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Timing for readiness probing, LED retries and close
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Button whose LED is set to probe readiness (default: "0")
    pub probe_button: String,
    /// Readiness probes before giving up (default: 30)
    pub ready_attempts: u32,
    /// Spacing between probes (default: 1 second)
    pub ready_interval: Duration,
    /// Timeout for one probe (default: 500ms)
    pub ready_probe_timeout: Duration,
    /// Wait after the first successful probe (default: 2 seconds)
    pub ready_grace: Duration,
    /// LED attempts per update (default: 3)
    pub led_retries: u32,
    /// Timeout for one LED attempt (default: 3 seconds)
    pub led_timeout: Duration,
    /// Wait between LED attempts (default: 2 seconds)
    pub led_backoff: Duration,
    /// Timeout for pushing one frame (default: 2 seconds)
    pub draw_timeout: Duration,
    /// Bound on closing the handle (default: 2 seconds)
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            probe_button: "0".into(),
            ready_attempts: 30,
            ready_interval: Duration::from_secs(1),
            ready_probe_timeout: Duration::from_millis(500),
            ready_grace: Duration::from_secs(2),
            led_retries: 3,
            led_timeout: Duration::from_secs(3),
            led_backoff: Duration::from_secs(2),
            draw_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of readiness probes
    #[must_use]
    pub fn with_ready_attempts(mut self, attempts: u32) -> Self {
        self.ready_attempts = attempts;
        self
    }

    /// Set the grace period after readiness
    #[must_use]
    pub fn with_ready_grace(mut self, grace: Duration) -> Self {
        self.ready_grace = grace;
        self
    }

    /// Set LED attempts per update
    #[must_use]
    pub fn with_led_retries(mut self, retries: u32) -> Self {
        self.led_retries = retries;
        self
    }

    /// Set the frame push timeout
    #[must_use]
    pub fn with_draw_timeout(mut self, timeout: Duration) -> Self {
        self.draw_timeout = timeout;
        self
    }

    /// Set the close timeout
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Create a config suitable for testing (shorter intervals)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            probe_button: "0".into(),
            ready_attempts: 3,
            ready_interval: Duration::from_millis(10),
            ready_probe_timeout: Duration::from_millis(5),
            ready_grace: Duration::from_millis(10),
            led_retries: 3,
            led_timeout: Duration::from_millis(50),
            led_backoff: Duration::from_millis(20),
            draw_timeout: Duration::from_millis(50),
            close_timeout: Duration::from_millis(50),
        }
    }
}

/// Owner of the hardware handle
pub struct DeviceSession {
    discovery: Arc<dyn DeviceDiscovery>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    device: Mutex<Option<Arc<dyn DeckDevice>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<DeviceEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DeviceEvent>>>,
    touched_leds: Mutex<BTreeSet<String>>,
    probe_confirmed: AtomicBool,
}

impl DeviceSession {
    /// Create a disconnected session
    #[must_use]
    pub fn new(discovery: Arc<dyn DeviceDiscovery>, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            discovery,
            config,
            state: Mutex::new(SessionState::Disconnected),
            device: Mutex::new(None),
            forwarder: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            touched_leds: Mutex::new(BTreeSet::new()),
            probe_confirmed: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the last connect saw a successful readiness probe
    #[must_use]
    pub fn probe_confirmed(&self) -> bool {
        self.probe_confirmed.load(Ordering::SeqCst)
    }

    /// Session timing
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Geometry of the open handle
    #[must_use]
    pub fn geometry(&self) -> Option<DeviceGeometry> {
        self.device().map(|d| d.geometry())
    }

    /// Take the device event stream. Survives reconnects; only the first
    /// caller gets it.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DeviceEvent>> {
        self.events_rx.lock().take()
    }

    /// Add button ids to the set cleared on disconnect.
    ///
    /// Every id the session writes is tracked already; this covers buttons
    /// the configuration knows about but has not lit yet.
    pub fn track_buttons<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.touched_leds.lock().extend(ids.into_iter().map(Into::into));
    }

    /// Button ids that disconnect will turn off
    #[must_use]
    pub fn tracked_buttons(&self) -> Vec<String> {
        self.touched_leds.lock().iter().cloned().collect()
    }

    fn device(&self) -> Option<Arc<dyn DeckDevice>> {
        self.device.lock().clone()
    }

    fn set_state(&self, next: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Session state changed");
        }
    }

    /// Discover the device, install event forwarding and wait for readiness.
    ///
    /// An existing handle is disconnected first.
    ///
    /// # Errors
    ///
    /// Returns the discovery error when no device can be opened. The session
    /// is left `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        if self.device().is_some() {
            tracing::info!("Reconnecting, closing the current handle first");
            self.disconnect().await;
        }

        self.set_state(SessionState::Connecting);
        self.probe_confirmed.store(false, Ordering::SeqCst);

        let device = match self.discovery.discover().await {
            Ok(device) => device,
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                tracing::error!(
                    error = %e,
                    hints = ?e.remediation(),
                    "Failed to connect to the control surface"
                );
                return Err(e);
            }
        };

        let geometry = device.geometry();
        tracing::info!(
            columns = geometry.columns,
            rows = geometry.rows,
            key_size = geometry.key_size,
            "Device discovered"
        );

        self.install_forwarder(device.as_ref());
        *self.device.lock() = Some(Arc::clone(&device));

        if self.wait_until_ready(device.as_ref()).await {
            self.probe_confirmed.store(true, Ordering::SeqCst);
        } else {
            tracing::warn!(
                attempts = self.config.ready_attempts,
                "Device readiness never confirmed, continuing anyway"
            );
        }

        self.set_state(SessionState::Ready);
        Ok(())
    }

    fn install_forwarder(&self, device: &dyn DeckDevice) {
        let Some(mut rx) = device.subscribe() else {
            tracing::warn!("Device handle delivers no events");
            return;
        };
        let tx = self.events_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match &event {
                    DeviceEvent::Connected => tracing::info!("Device connected"),
                    DeviceEvent::Disconnected => tracing::warn!("Device disconnected"),
                    DeviceEvent::Raw(bytes) => {
                        tracing::trace!(len = bytes.len(), "Raw device report");
                        continue;
                    }
                    _ => {}
                }
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.forwarder.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn wait_until_ready(&self, device: &dyn DeckDevice) -> bool {
        let cfg = &self.config;
        self.track_buttons([cfg.probe_button.as_str()]);
        for attempt in 1..=cfg.ready_attempts {
            let probe = device.set_button_color(&cfg.probe_button, Rgb888::BLACK);
            match timeout(cfg.ready_probe_timeout, probe).await {
                Ok(Ok(())) => {
                    tracing::info!(attempt, "Device ready");
                    sleep(cfg.ready_grace).await;
                    return true;
                }
                Ok(Err(e)) => tracing::debug!(attempt, error = %e, "Readiness probe failed"),
                Err(_) => tracing::debug!(attempt, "Readiness probe timed out"),
            }
            if attempt < cfg.ready_attempts {
                sleep(cfg.ready_interval).await;
            }
        }
        false
    }

    /// Set a button LED using the configured retry count.
    ///
    /// Returns false if every attempt failed; never errors.
    pub async fn set_button_color(&self, id: &str, color: Rgb888) -> bool {
        self.set_button_color_with_retries(id, color, self.config.led_retries)
            .await
    }

    /// Set a button LED with up to `max_retries` attempts.
    ///
    /// Each attempt runs under the LED timeout; failed attempts wait the
    /// backoff before the next one.
    pub async fn set_button_color_with_retries(
        &self,
        id: &str,
        color: Rgb888,
        max_retries: u32,
    ) -> bool {
        let Some(device) = self.device() else {
            tracing::warn!(button = id, "LED update skipped, session not connected");
            return false;
        };
        let cfg = &self.config;

        // A write that errors or times out may still reach the hardware
        self.track_buttons([id]);

        for attempt in 1..=max_retries {
            match timeout(cfg.led_timeout, device.set_button_color(id, color)).await {
                Ok(Ok(())) => {
                    if color == Rgb888::BLACK {
                        self.touched_leds.lock().remove(id);
                    }
                    return true;
                }
                Ok(Err(e)) => tracing::warn!(button = id, attempt, error = %e, "LED update failed"),
                Err(_) => tracing::warn!(
                    button = id,
                    attempt,
                    timeout_ms = cfg.led_timeout.as_millis() as u64,
                    "LED update timed out"
                ),
            }
            if attempt < max_retries {
                sleep(cfg.led_backoff).await;
            }
        }

        tracing::error!(button = id, attempts = max_retries, "Giving up on LED update");
        false
    }

    /// Push a frame onto a display region
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::NotConnected`] without a handle,
    /// [`DeckError::Timeout`] if the push outlives the draw timeout, or the
    /// device's draw error.
    pub async fn draw(&self, region: DisplayRegion, frame: &Frame) -> Result<()> {
        let device = self.device().ok_or(DeckError::NotConnected)?;
        let limit = self.config.draw_timeout;
        timeout(limit, device.draw_screen(region, frame))
            .await
            .map_err(|_| DeckError::Timeout {
                operation: "draw_screen",
                timeout: limit,
            })?
    }

    /// Run the vibration motor
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::NotConnected`] without a handle, or the device's
    /// error.
    pub async fn vibrate(&self, pattern: HapticPattern) -> Result<()> {
        let device = self.device().ok_or(DeckError::NotConnected)?;
        device.vibrate(pattern).await
    }

    /// Clear LEDs and screens, stop forwarding events and close the handle.
    ///
    /// Every step is best effort: the device may already be gone, and a
    /// close that hangs is abandoned after the close timeout.
    pub async fn disconnect(&self) {
        let Some(device) = self.device.lock().take() else {
            self.set_state(SessionState::Disconnected);
            return;
        };
        self.set_state(SessionState::Disconnecting);
        let cfg = &self.config;

        // Ids stay tracked so a reconnect clears them again
        for id in &self.tracked_buttons() {
            match timeout(cfg.led_timeout, device.set_button_color(id, Rgb888::BLACK)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(button = %id, error = %e, "LED clear failed"),
                Err(_) => tracing::debug!(button = %id, "LED clear timed out"),
            }
        }

        // Transports clip the frame to the region's real size
        let black = Frame::new(device.geometry().center);
        for region in DisplayRegion::ALL {
            match timeout(cfg.draw_timeout, device.draw_screen(region, &black)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(%region, error = %e, "Screen clear failed"),
                Err(_) => tracing::debug!(%region, "Screen clear timed out"),
            }
        }

        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }

        match timeout(cfg.close_timeout, device.close()).await {
            Ok(Ok(())) => tracing::info!("Device closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Device close failed"),
            Err(_) => tracing::warn!(
                timeout_ms = cfg.close_timeout.as_millis() as u64,
                "Device close timed out, continuing"
            ),
        }

        self.set_state(SessionState::Disconnected);
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, VirtualDeck, VirtualDiscovery};
    use embedded_graphics::prelude::Size;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn deck() -> Arc<VirtualDeck> {
        Arc::new(VirtualDeck::new(DeviceGeometry {
            key_size: 90,
            columns: 4,
            rows: 2,
            center: Size::new(480, 180),
        }))
    }

    fn session(deck: &Arc<VirtualDeck>, config: SessionConfig) -> DeviceSession {
        DeviceSession::new(Arc::new(VirtualDiscovery::new(Arc::clone(deck))), config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_probes_then_waits_grace() {
        let deck = deck();
        let session = session(&deck, SessionConfig::default());
        let started = Instant::now();

        session.connect().await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.probe_confirmed());
        assert_eq!(
            deck.calls(),
            vec![DeviceCall::SetButtonColor {
                id: "0".into(),
                color: Rgb888::BLACK
            }]
        );
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_probe_until_device_answers() {
        let deck = deck();
        deck.fail_next_led_calls(3);
        let session = session(&deck, SessionConfig::default().with_ready_grace(Duration::ZERO));
        let started = Instant::now();

        session.connect().await.unwrap();

        assert!(session.probe_confirmed());
        assert_eq!(deck.led_call_count(), 4);
        // Three failed probes, one interval after each
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_readiness_is_not_fatal() {
        let deck = deck();
        deck.set_led_delay(Some(Duration::from_secs(10)));
        let session = session(&deck, SessionConfig::default().with_ready_attempts(5));

        session.connect().await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.probe_confirmed());
        assert_eq!(deck.led_call_count(), 5);
    }

    #[tokio::test]
    async fn test_connect_without_device_fails() {
        let session = DeviceSession::new(Arc::new(VirtualDiscovery::empty()), SessionConfig::for_testing());
        let result = session.connect().await;
        assert!(matches!(result, Err(DeckError::DeviceNotFound(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_closes_previous_handle() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.connect().await.unwrap();
        session.connect().await.unwrap();

        let closes = deck.calls().iter().filter(|c| **c == DeviceCall::Close).count();
        assert_eq!(closes, 1);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_led_retries_exhausted_returns_false() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.connect().await.unwrap();
        let before = deck.led_call_count();

        deck.fail_next_led_calls(u32::MAX);
        let started = Instant::now();
        assert!(!session.set_button_color("3", Rgb888::RED).await);

        assert_eq!(deck.led_call_count() - before, 3);
        // Backoff between attempts, none after the last
        let backoff = SessionConfig::for_testing().led_backoff;
        assert!(started.elapsed() >= backoff * 2);
        assert!(started.elapsed() < backoff * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_led_timeout_counts_as_failure() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.connect().await.unwrap();

        deck.set_led_delay(Some(Duration::from_secs(60)));
        assert!(!session.set_button_color_with_retries("1", Rgb888::GREEN, 2).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_led_recovers_after_transient_failure() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.connect().await.unwrap();

        deck.fail_next_led_calls(2);
        assert!(session.set_button_color("2", Rgb888::BLUE).await);
    }

    #[tokio::test]
    async fn test_calls_without_handle() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        assert!(!session.set_button_color("1", Rgb888::RED).await);
        assert!(matches!(
            session.draw(DisplayRegion::Center, &Frame::new(Size::new(1, 1))).await,
            Err(DeckError::NotConnected)
        ));
        assert_eq!(deck.led_call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_lit_leds_and_screens() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.connect().await.unwrap();
        assert!(session.set_button_color("5", Rgb888::RED).await);

        session.disconnect().await;

        let calls = deck.calls();
        assert!(calls.contains(&DeviceCall::SetButtonColor {
            id: "5".into(),
            color: Rgb888::BLACK
        }));
        for region in DisplayRegion::ALL {
            assert!(calls.contains(&DeviceCall::Draw { region }));
            assert_eq!(deck.last_frame(region).unwrap().count_color(Rgb888::BLACK), 480 * 180);
        }
        assert_eq!(calls.last(), Some(&DeviceCall::Close));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_draw_times_out() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        assert_ok!(session.connect().await);
        let frame = Frame::new(Size::new(480, 180));

        deck.hang_next_draws(1);
        let err = assert_err!(session.draw(DisplayRegion::Center, &frame).await);
        assert!(matches!(
            err,
            DeckError::Timeout {
                operation: "draw_screen",
                ..
            }
        ));

        assert_ok!(session.draw(DisplayRegion::Center, &frame).await);
        assert_eq!(deck.draw_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_led_whose_update_timed_out() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        assert_ok!(session.connect().await);

        deck.set_led_delay(Some(Duration::from_secs(60)));
        assert!(!session.set_button_color("5", Rgb888::RED).await);
        deck.set_led_delay(None);

        session.disconnect().await;

        let clears: Vec<String> = deck
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::SetButtonColor { id, color } if color == Rgb888::BLACK => Some(id),
                _ => None,
            })
            .collect();
        assert!(clears.contains(&"5".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_tracked_and_probe_buttons() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.track_buttons(["7", "8"]);
        assert_ok!(session.connect().await);
        assert_eq!(session.tracked_buttons(), vec!["0", "7", "8"]);
        let before = deck.calls().len();

        session.disconnect().await;

        let leds: Vec<DeviceCall> = deck.calls()[before..]
            .iter()
            .filter(|c| matches!(c, DeviceCall::SetButtonColor { .. }))
            .cloned()
            .collect();
        let black = |id: &str| DeviceCall::SetButtonColor {
            id: id.into(),
            color: Rgb888::BLACK,
        };
        assert_eq!(leds, vec![black("0"), black("7"), black("8")]);
        // Still tracked for the next connection
        assert_eq!(session.tracked_buttons().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_survives_failing_clears_and_hanging_close() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.connect().await.unwrap();
        session.set_button_color("5", Rgb888::RED).await;

        deck.fail_next_led_calls(u32::MAX);
        deck.set_fail_draws(true);
        deck.set_close_delay(Some(Duration::from_secs(3600)));
        let started = Instant::now();

        session.disconnect().await;

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_disconnect_without_handle_is_noop() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        session.disconnect().await;
        assert!(deck.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_forwarded_across_reconnects() {
        let deck = deck();
        let session = session(&deck, SessionConfig::for_testing());
        let mut events = session.take_events().unwrap();
        assert!(session.take_events().is_none());

        session.connect().await.unwrap();
        deck.inject(DeviceEvent::Raw(vec![1, 2, 3]));
        deck.inject(DeviceEvent::ButtonDown { id: "1".into() });
        assert_eq!(events.recv().await, Some(DeviceEvent::ButtonDown { id: "1".into() }));

        session.connect().await.unwrap();
        deck.inject(DeviceEvent::TouchStart { x: 70, y: 10 });
        assert_eq!(events.recv().await, Some(DeviceEvent::TouchStart { x: 70, y: 10 }));
    }
}
