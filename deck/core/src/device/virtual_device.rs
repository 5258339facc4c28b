//! Virtual Device
//!
//! A device handle with no hardware behind it. Every call is recorded so
//! tests can assert on what the session pushed, and failure modes (busy LED
//! controller, hanging close, failing draws) can be switched on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use embedded_graphics::pixelcolor::Rgb888;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{DeckDevice, DeviceDiscovery, DeviceEvent, DeviceGeometry, DisplayRegion, HapticPattern};
use crate::error::{DeckError, Result};
use crate::frame::Frame;

/// One recorded call against a [`VirtualDeck`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    /// `draw_screen` was called for a region
    Draw {
        /// Target region
        region: DisplayRegion,
    },
    /// `set_button_color` was called (recorded even when it fails)
    SetButtonColor {
        /// Button id
        id: String,
        /// Requested color
        color: Rgb888,
    },
    /// `vibrate` was called
    Vibrate(HapticPattern),
    /// `close` was called
    Close,
}

/// In-memory device handle
pub struct VirtualDeck {
    geometry: DeviceGeometry,
    calls: Mutex<Vec<DeviceCall>>,
    frames: Mutex<HashMap<DisplayRegion, Frame>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>,
    failing_led_calls: AtomicU32,
    led_delay: Mutex<Option<Duration>>,
    close_delay: Mutex<Option<Duration>>,
    fail_draws: AtomicBool,
    hanging_draws: AtomicU32,
}

impl VirtualDeck {
    /// Create a virtual device with the given geometry
    #[must_use]
    pub fn new(geometry: DeviceGeometry) -> Self {
        Self {
            geometry,
            calls: Mutex::new(Vec::new()),
            frames: Mutex::new(HashMap::new()),
            events_tx: Mutex::new(None),
            failing_led_calls: AtomicU32::new(0),
            led_delay: Mutex::new(None),
            close_delay: Mutex::new(None),
            fail_draws: AtomicBool::new(false),
            hanging_draws: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` LED calls with a device error
    pub fn fail_next_led_calls(&self, count: u32) {
        self.failing_led_calls.store(count, Ordering::SeqCst);
    }

    /// Make every LED call take `delay` before completing
    pub fn set_led_delay(&self, delay: Option<Duration>) {
        *self.led_delay.lock() = delay;
    }

    /// Make `close` take `delay` before completing
    pub fn set_close_delay(&self, delay: Option<Duration>) {
        *self.close_delay.lock() = delay;
    }

    /// Make every draw fail
    pub fn set_fail_draws(&self, fail: bool) {
        self.fail_draws.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` draws never complete
    pub fn hang_next_draws(&self, count: u32) {
        self.hanging_draws.store(count, Ordering::SeqCst);
    }

    /// Emit an event as if it came from the hardware.
    ///
    /// Returns false when nobody is subscribed.
    pub fn inject(&self, event: DeviceEvent) -> bool {
        self.events_tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Every call recorded so far
    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    /// Number of `draw_screen` calls so far
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, DeviceCall::Draw { .. }))
            .count()
    }

    /// Number of `set_button_color` calls so far
    #[must_use]
    pub fn led_call_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, DeviceCall::SetButtonColor { .. }))
            .count()
    }

    /// The last frame pushed to a region
    #[must_use]
    pub fn last_frame(&self, region: DisplayRegion) -> Option<Frame> {
        self.frames.lock().get(&region).cloned()
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl DeckDevice for VirtualDeck {
    fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<DeviceEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events_tx.lock() = Some(tx);
        Some(rx)
    }

    async fn draw_screen(&self, region: DisplayRegion, frame: &Frame) -> Result<()> {
        self.record(DeviceCall::Draw { region });
        let hang = self
            .hanging_draws
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hang {
            std::future::pending::<()>().await;
        }
        if self.fail_draws.load(Ordering::SeqCst) {
            return Err(DeckError::Device(format!("draw on {region} rejected")));
        }
        self.frames.lock().insert(region, frame.clone());
        Ok(())
    }

    async fn set_button_color(&self, id: &str, color: Rgb888) -> Result<()> {
        self.record(DeviceCall::SetButtonColor {
            id: id.to_string(),
            color,
        });

        let delay = *self.led_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failing_led_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DeckError::Device("LED controller busy".into()));
        }
        Ok(())
    }

    async fn vibrate(&self, pattern: HapticPattern) -> Result<()> {
        self.record(DeviceCall::Vibrate(pattern));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(DeviceCall::Close);
        let delay = *self.close_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.events_tx.lock().take();
        Ok(())
    }
}

impl std::fmt::Debug for VirtualDeck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDeck")
            .field("geometry", &self.geometry)
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

/// Discovery that hands out one shared [`VirtualDeck`]
#[derive(Debug, Clone)]
pub struct VirtualDiscovery {
    deck: Option<Arc<VirtualDeck>>,
    attempts: Arc<AtomicUsize>,
}

impl VirtualDiscovery {
    /// Discovery that always finds `deck`
    #[must_use]
    pub fn new(deck: Arc<VirtualDeck>) -> Self {
        Self {
            deck: Some(deck),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Discovery that never finds anything
    #[must_use]
    pub fn empty() -> Self {
        Self {
            deck: None,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times `discover` ran
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDiscovery for VirtualDiscovery {
    async fn discover(&self) -> Result<Arc<dyn DeckDevice>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.deck {
            Some(deck) => Ok(Arc::clone(deck) as Arc<dyn DeckDevice>),
            None => Err(DeckError::DeviceNotFound(
                "no virtual device configured".into(),
            )),
        }
    }
}
