//! Deck Core - Session and Display Routing for a Touch/Knob Control Surface
//!
//! This crate owns a small physical control surface (a grid of touch cells,
//! rotary knobs and LED-backed buttons) for the lifetime of a background
//! process: it keeps the one hardware connection alive across restarts,
//! routes touches through a paged, layered grid of components, and runs the
//! transient volume/media/notification overlays without leaking timers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          deck-daemon                             │
//! │        CLI · logging · signals (INT/TERM shutdown, HUP reload)   │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                         DECK CORE                                │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                       DeckRuntime                          │  │
//! │  │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │  │
//! │  │  │ InstanceLock │  │DeviceSession │  │  DisplayRouter   │  │  │
//! │  │  │ (cross-proc) │  │ (one handle) │  │ pages · stacks   │  │  │
//! │  │  └──────────────┘  └──────┬───────┘  └────────┬─────────┘  │  │
//! │  │                    events │  frames ▲         │ touches    │  │
//! │  │                    ┌──────▼─────────┴──┐  ┌───▼─────────┐  │  │
//! │  │                    │   EventWiring     │  │ RenderLoop  │  │  │
//! │  │                    │ knobs · buttons   │  │ tick/signal │  │  │
//! │  │                    └───────────────────┘  └─────────────┘  │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`DeckRuntime`]: starts and owns everything below
//! - [`DeviceSession`]: the only holder of the hardware handle
//! - [`DisplayRouter`]: paged grid, topmost-first touch dispatch
//! - [`Overlay`]: show-temporarily / auto-hide / FIFO queue primitive
//! - [`InstanceLock`]: liveness-checked cross-process lock record
//! - [`ShutdownCoordinator`]: idempotent, deadline-bounded teardown
//!
//! # Module Overview
//!
//! - [`component`]: the visual component kinds and their options
//! - [`config`]: TOML configuration, env overrides, validation
//! - [`device`]: the device seam and the in-memory [`VirtualDeck`]
//! - [`geometry`]: cell rectangles and touch-to-cell mapping
//! - [`system`]: shell-level audio, media, workspace and launch control

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod component;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod lock;
pub mod overlay;
pub mod render;
pub mod router;
pub mod runtime;
pub mod session;
pub mod shutdown;
pub mod system;
pub mod wiring;

// Re-exports for convenience
pub use component::{Action, ActionSink, Component, ComponentContext, Notice, VisualComponent};
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource, DeckConfig,
};
pub use device::{
    DeckDevice, DeviceDiscovery, DeviceEvent, DeviceGeometry, DisplayRegion, HapticPattern,
    VirtualDeck, VirtualDiscovery,
};
pub use error::{DeckError, Result};
pub use frame::Frame;
pub use geometry::{Cell, GridGeometry};
pub use lock::{InstanceLock, LockConfig, LockOutcome};
pub use overlay::{Overlay, OverlayConfig};
pub use render::{RenderLoop, RenderSignal};
pub use router::{DisplayRouter, SharedRouter};
pub use runtime::{DeckRuntime, Startup};
pub use session::{DeviceSession, SessionConfig, SessionState};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome};
pub use system::{ShellControl, SystemControl};
pub use wiring::{EventDispatcher, EventWiring};
