//! Visual Components
//!
//! Everything the router draws into a grid cell and routes touches to.
//! Components are a closed set of kinds, each with its own options struct,
//! built from a [`ComponentDescriptor`] by [`Component::from_descriptor`].
//!
//! # Layering
//!
//! ```text
//!   cell (1,0) on page 1, topmost first
//!   ┌──────────────────────────┐
//!   │ notification overlay     │  <- visible: claims the touch (dismiss)
//!   ├──────────────────────────┤
//!   │ volume overlay           │  <- hidden: declines
//!   ├──────────────────────────┤
//!   │ button "terminal"        │  <- only reached if everything above declined
//!   └──────────────────────────┘
//! ```
//!
//! `draw` never fails on missing data; overlays without a payload render a
//! placeholder. Side effects of a touch leave the component as an [`Action`]
//! on the [`ActionSink`], so `handle_touch` stays synchronous.

mod button;
mod label;
mod media;
mod notification;
mod volume;

use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::config::{
    ComponentDescriptor, ComponentKind, ConfigError, ControlAction, OverlayTimings,
};
use crate::device::HapticPattern;
use crate::geometry::Cell;
use crate::overlay::Overlay;
use crate::render::RenderSignal;
use crate::system::{MediaCommand, TrackInfo, VolumeLevel};

pub use button::{Button, ButtonOptions};
pub use label::{Label, LabelOptions};
pub use media::{MediaOptions, MediaOverlay};
pub use notification::{Notice, NotificationOptions, NotificationOverlay};
pub use volume::{VolumeOptions, VolumeOverlay};

// =============================================================================
// Actions
// =============================================================================

/// A side effect requested by a component or binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a shell command
    Launch(String),
    /// Make a page current
    SwitchPage(u32),
    /// Media player control
    Media(MediaCommand),
    /// Switch window-manager workspace
    Workspace(u32),
    /// Toggle audio mute
    ToggleMute,
    /// Vibrate the device
    Haptic(HapticPattern),
}

impl Action {
    /// The action a configured control performs. `Launch` without a
    /// command has nothing to run.
    #[must_use]
    pub fn from_control(action: ControlAction, command: Option<&str>) -> Option<Self> {
        let action = match action {
            ControlAction::Launch => Self::Launch(command?.to_string()),
            ControlAction::Page(n) => Self::SwitchPage(n),
            ControlAction::Workspace(n) => Self::Workspace(n),
            ControlAction::Mute => Self::ToggleMute,
            ControlAction::Media(command) => Self::Media(command),
        };
        Some(action)
    }
}

/// Sending half of the action channel handed to components
#[derive(Debug, Clone)]
pub struct ActionSink {
    tx: mpsc::UnboundedSender<Action>,
}

impl ActionSink {
    /// Create a sink and the receiver the event wiring drains
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an action. Dropped with a debug log once the wiring is gone.
    pub fn emit(&self, action: Action) {
        if let Err(e) = self.tx.send(action) {
            tracing::debug!(action = ?e.0, "Action dropped, no receiver");
        }
    }
}

// =============================================================================
// Component Contract
// =============================================================================

/// The contract every drawable cell implements
pub trait VisualComponent {
    /// Descriptor name, for lookups and diagnostics
    fn name(&self) -> &str;

    /// Grid cell, or `None` for components spanning the whole grid
    fn position(&self) -> Option<Cell>;

    /// Render into `area`. Pure: no side effects beyond drawing.
    fn draw<D>(&self, target: &mut D, area: Rectangle) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>;

    /// Claim a touch at `cell`.
    ///
    /// Returns true only if this component sits at `cell` and acted on the
    /// touch; false lets dispatch continue to the layer below.
    fn handle_touch(&mut self, _cell: Cell) -> bool {
        false
    }
}

/// Whether a component at `position` sits under a touch at `cell`
fn occupies(position: Option<Cell>, cell: Cell) -> bool {
    position.map_or(true, |p| p == cell)
}

/// Shared handles components are built with
#[derive(Debug, Clone)]
pub struct ComponentContext {
    /// Where touch side effects go
    pub sink: ActionSink,
    /// Raised by overlays when they change
    pub signal: RenderSignal,
    /// Overlay timeouts
    pub overlays: OverlayTimings,
}

// =============================================================================
// Registry
// =============================================================================

/// A component of one of the known kinds
#[derive(Debug)]
pub enum Component {
    /// Touch button
    Button(Button),
    /// Static text
    Label(Label),
    /// Volume overlay
    Volume(VolumeOverlay),
    /// Now-playing overlay
    Media(MediaOverlay),
    /// Notification overlay
    Notification(NotificationOverlay),
}

fn options<T: DeserializeOwned>(descriptor: &ComponentDescriptor) -> Result<T, ConfigError> {
    toml::Value::Table(descriptor.options.clone())
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Component {
            name: descriptor.name.clone(),
            reason: e.message().to_string(),
        })
}

fn require_position(descriptor: &ComponentDescriptor) -> Result<Cell, ConfigError> {
    descriptor.position.ok_or_else(|| ConfigError::Component {
        name: descriptor.name.clone(),
        reason: format!("a {} needs a position", descriptor.kind),
    })
}

impl Component {
    /// Build a component from its descriptor
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Component`] when the options don't fit the
    /// kind or something the kind needs is missing.
    pub fn from_descriptor(
        descriptor: &ComponentDescriptor,
        ctx: &ComponentContext,
    ) -> Result<Self, ConfigError> {
        let name = descriptor.name.clone();
        let component = match descriptor.kind {
            ComponentKind::Button => Self::Button(Button::new(
                name,
                require_position(descriptor)?,
                options(descriptor)?,
                descriptor.command.clone(),
                ctx.sink.clone(),
            )?),
            ComponentKind::Label => Self::Label(Label::new(
                name,
                require_position(descriptor)?,
                options(descriptor)?,
            )),
            ComponentKind::Volume => Self::Volume(VolumeOverlay::new(
                name,
                descriptor.position,
                options(descriptor)?,
                Overlay::new(ctx.overlays.volume_config(), ctx.signal.clone()),
            )),
            ComponentKind::Media => Self::Media(MediaOverlay::new(
                name,
                descriptor.position,
                options(descriptor)?,
                Overlay::new(ctx.overlays.media_config(), ctx.signal.clone()),
                ctx.sink.clone(),
            )),
            ComponentKind::Notification => Self::Notification(NotificationOverlay::new(
                name,
                descriptor.position,
                options(descriptor)?,
                Overlay::new(ctx.overlays.notification_config(), ctx.signal.clone()),
            )),
        };
        Ok(component)
    }

    /// Check a descriptor without building anything
    ///
    /// # Errors
    ///
    /// The same errors [`Self::from_descriptor`] would return.
    pub fn check_descriptor(descriptor: &ComponentDescriptor) -> Result<(), ConfigError> {
        match descriptor.kind {
            ComponentKind::Button => {
                require_position(descriptor)?;
                let opts: ButtonOptions = options(descriptor)?;
                button::check_command(&descriptor.name, &opts, descriptor.command.as_deref())
            }
            ComponentKind::Label => {
                require_position(descriptor)?;
                options::<LabelOptions>(descriptor).map(drop)
            }
            ComponentKind::Volume => options::<VolumeOptions>(descriptor).map(drop),
            ComponentKind::Media => options::<MediaOptions>(descriptor).map(drop),
            ComponentKind::Notification => options::<NotificationOptions>(descriptor).map(drop),
        }
    }

    /// Which kind this is
    #[must_use]
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Button(_) => ComponentKind::Button,
            Self::Label(_) => ComponentKind::Label,
            Self::Volume(_) => ComponentKind::Volume,
            Self::Media(_) => ComponentKind::Media,
            Self::Notification(_) => ComponentKind::Notification,
        }
    }

    /// Cancel overlay timers. Safe to repeat.
    pub fn cleanup(&self) {
        match self {
            Self::Volume(v) => v.overlay().cleanup(),
            Self::Media(m) => m.overlay().cleanup(),
            Self::Notification(n) => n.overlay().cleanup(),
            Self::Button(_) | Self::Label(_) => {}
        }
    }

    /// The volume overlay handle, if this is one
    #[must_use]
    pub fn volume_overlay(&self) -> Option<&Overlay<VolumeLevel>> {
        match self {
            Self::Volume(v) => Some(v.overlay()),
            _ => None,
        }
    }

    /// The media overlay handle, if this is one
    #[must_use]
    pub fn media_overlay(&self) -> Option<&Overlay<TrackInfo>> {
        match self {
            Self::Media(m) => Some(m.overlay()),
            _ => None,
        }
    }

    /// The notification overlay handle, if this is one
    #[must_use]
    pub fn notification_overlay(&self) -> Option<&Overlay<Notice>> {
        match self {
            Self::Notification(n) => Some(n.overlay()),
            _ => None,
        }
    }
}

impl VisualComponent for Component {
    fn name(&self) -> &str {
        match self {
            Self::Button(c) => c.name(),
            Self::Label(c) => c.name(),
            Self::Volume(c) => c.name(),
            Self::Media(c) => c.name(),
            Self::Notification(c) => c.name(),
        }
    }

    fn position(&self) -> Option<Cell> {
        match self {
            Self::Button(c) => c.position(),
            Self::Label(c) => c.position(),
            Self::Volume(c) => c.position(),
            Self::Media(c) => c.position(),
            Self::Notification(c) => c.position(),
        }
    }

    fn draw<D>(&self, target: &mut D, area: Rectangle) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        match self {
            Self::Button(c) => c.draw(target, area),
            Self::Label(c) => c.draw(target, area),
            Self::Volume(c) => c.draw(target, area),
            Self::Media(c) => c.draw(target, area),
            Self::Notification(c) => c.draw(target, area),
        }
    }

    fn handle_touch(&mut self, cell: Cell) -> bool {
        match self {
            Self::Button(c) => c.handle_touch(cell),
            Self::Label(c) => c.handle_touch(cell),
            Self::Volume(c) => c.handle_touch(cell),
            Self::Media(c) => c.handle_touch(cell),
            Self::Notification(c) => c.handle_touch(cell),
        }
    }
}

// =============================================================================
// Drawing Helpers
// =============================================================================

fn centered() -> TextStyle {
    TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Middle)
        .build()
}

/// Shorten `text` to `max_chars`, marking the cut with `..`
fn fit_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 2 {
        return text.chars().take(max_chars).collect();
    }
    let mut fitted: String = text.chars().take(max_chars - 2).collect();
    fitted.push_str("..");
    fitted
}

/// Draw one line of text centered on `center`, cut to `max_width` pixels
fn draw_centered<D>(
    target: &mut D,
    text: &str,
    center: Point,
    font: &'static MonoFont<'static>,
    color: Rgb888,
    max_width: u32,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let glyph = font.character_size.width + font.character_spacing;
    let max_chars = (max_width / glyph.max(1)) as usize;
    let fitted = fit_text(text, max_chars);
    Text::with_text_style(&fitted, center, MonoTextStyle::new(font, color), centered())
        .draw(target)?;
    Ok(())
}
