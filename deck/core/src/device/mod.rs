//! Device Abstraction
//!
//! The hardware transport (USB discovery, protocol framing, draw primitives)
//! lives outside this crate. Everything here is the seam the session manager
//! consumes: a [`DeviceDiscovery`] that produces a [`DeckDevice`] handle, the
//! events a handle emits, and the geometry it reports.
//!
//! [`VirtualDeck`] is an in-memory implementation used by tests and by the
//! daemon's headless mode.

mod virtual_device;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::Size;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::frame::Frame;

pub use virtual_device::{DeviceCall, VirtualDeck, VirtualDiscovery};

/// Named screen regions on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayRegion {
    /// Narrow strip left of the touch grid
    Left,
    /// The touch grid screen
    Center,
    /// Narrow strip right of the touch grid
    Right,
}

impl DisplayRegion {
    /// Every region, in clear order
    pub const ALL: [DisplayRegion; 3] = [Self::Left, Self::Center, Self::Right];
}

impl fmt::Display for DisplayRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Center => write!(f, "center"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Vibration patterns the device motor supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticPattern {
    /// Single short pulse (touch feedback)
    Short,
    /// Single long pulse
    Long,
    /// Two short pulses
    Double,
}

/// Pixel geometry reported by a device handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceGeometry {
    /// Edge length of one square key cell in pixels
    pub key_size: u32,
    /// Number of grid columns
    pub columns: u16,
    /// Number of grid rows
    pub rows: u16,
    /// Native size of the center display
    pub center: Size,
}

/// Events emitted by a device handle, in hardware order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The handle finished opening
    Connected,
    /// The device went away
    Disconnected,
    /// A touch began at center-display pixel coordinates
    TouchStart {
        /// Horizontal pixel
        x: i32,
        /// Vertical pixel
        y: i32,
    },
    /// A knob turned
    Rotate {
        /// Knob identifier
        id: String,
        /// Detents turned, negative is counter-clockwise
        delta: i32,
    },
    /// A physical button was pressed
    ButtonDown {
        /// Button identifier (numeric ids are rendered as decimal)
        id: String,
    },
    /// A physical button was released
    ButtonUp {
        /// Button identifier
        id: String,
    },
    /// Unparsed report, debug logging only
    Raw(Vec<u8>),
}

/// An open handle to one physical device
///
/// Implementations are owned exclusively by the session manager; nothing
/// else in the crate holds one.
#[async_trait]
pub trait DeckDevice: Send + Sync {
    /// Geometry of the connected device
    fn geometry(&self) -> DeviceGeometry;

    /// Open the event stream. A new call replaces the previous stream;
    /// `None` means the handle cannot deliver events.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<DeviceEvent>>;

    /// Push a finished frame onto one display region
    async fn draw_screen(&self, region: DisplayRegion, frame: &Frame) -> Result<()>;

    /// Set a button's LED color
    async fn set_button_color(&self, id: &str, color: Rgb888) -> Result<()>;

    /// Run the vibration motor
    async fn vibrate(&self, pattern: HapticPattern) -> Result<()>;

    /// Release the handle
    async fn close(&self) -> Result<()>;
}

/// Finds and opens a device
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// Open the first matching device
    async fn discover(&self) -> Result<Arc<dyn DeckDevice>>;
}
