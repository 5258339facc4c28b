//! Touch Button
//!
//! A labelled cell bound to a [`ControlAction`]. A touch on its own cell
//! emits a short haptic pulse followed by the bound action.

use embedded_graphics::mono_font::ascii::FONT_9X15;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle, RoundedRectangle};
use serde::Deserialize;

use super::{draw_centered, Action, ActionSink, VisualComponent};
use crate::config::{ConfigError, ControlAction, HexColor};
use crate::device::HapticPattern;
use crate::geometry::Cell;

/// Options for `type = "button"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ButtonOptions {
    /// Text drawn in the cell
    pub label: String,
    /// Bound action; a button without one declines touches
    #[serde(default)]
    pub action: Option<ControlAction>,
    /// Fill color
    #[serde(default = "default_background")]
    pub background: HexColor,
    /// Label color
    #[serde(default = "default_foreground")]
    pub foreground: HexColor,
}

fn default_background() -> HexColor {
    HexColor(Rgb888::new(0x30, 0x30, 0x40))
}

fn default_foreground() -> HexColor {
    HexColor(Rgb888::WHITE)
}

/// `launch` needs a command to run
pub(super) fn check_command(
    name: &str,
    options: &ButtonOptions,
    command: Option<&str>,
) -> Result<(), ConfigError> {
    if options.action == Some(ControlAction::Launch) && command.is_none() {
        return Err(ConfigError::Component {
            name: name.to_string(),
            reason: "action `launch` needs a command".into(),
        });
    }
    Ok(())
}

/// Touch button
#[derive(Debug)]
pub struct Button {
    name: String,
    cell: Cell,
    options: ButtonOptions,
    command: Option<String>,
    sink: ActionSink,
}

impl Button {
    /// Create a button at `cell`
    ///
    /// # Errors
    ///
    /// Returns an error when a `launch` button has no command.
    pub fn new(
        name: String,
        cell: Cell,
        options: ButtonOptions,
        command: Option<String>,
        sink: ActionSink,
    ) -> Result<Self, ConfigError> {
        check_command(&name, &options, command.as_deref())?;
        Ok(Self {
            name,
            cell,
            options,
            command,
            sink,
        })
    }

    /// The label text
    #[must_use]
    pub fn label(&self) -> &str {
        &self.options.label
    }

    fn action(&self) -> Option<Action> {
        Action::from_control(self.options.action?, self.command.as_deref())
    }
}

impl VisualComponent for Button {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Option<Cell> {
        Some(self.cell)
    }

    fn draw<D>(&self, target: &mut D, area: Rectangle) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let inner = area.offset(-4);
        RoundedRectangle::with_equal_corners(inner, Size::new_equal(8))
            .into_styled(PrimitiveStyle::with_fill(self.options.background.0))
            .draw(target)?;
        draw_centered(
            target,
            &self.options.label,
            inner.center(),
            &FONT_9X15,
            self.options.foreground.0,
            inner.size.width,
        )
    }

    fn handle_touch(&mut self, cell: Cell) -> bool {
        if cell != self.cell {
            return false;
        }
        let Some(action) = self.action() else {
            tracing::trace!(button = %self.name, "Button has no action");
            return false;
        };

        tracing::debug!(button = %self.name, ?action, "Button pressed");
        self.sink.emit(Action::Haptic(HapticPattern::Short));
        self.sink.emit(action);
        true
    }
}
