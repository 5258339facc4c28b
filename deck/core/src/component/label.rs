//! Static text cell. Never claims a touch.

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use serde::Deserialize;

use super::{draw_centered, VisualComponent};
use crate::config::HexColor;
use crate::geometry::Cell;

/// Options for `type = "label"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelOptions {
    /// Text to draw
    pub text: String,
    /// Text color
    #[serde(default = "default_color")]
    pub color: HexColor,
    /// Optional cell fill
    #[serde(default)]
    pub background: Option<HexColor>,
}

fn default_color() -> HexColor {
    HexColor(Rgb888::new(0xc0, 0xc0, 0xc0))
}

/// Static text
#[derive(Debug)]
pub struct Label {
    name: String,
    cell: Cell,
    options: LabelOptions,
}

impl Label {
    /// Create a label at `cell`
    #[must_use]
    pub fn new(name: String, cell: Cell, options: LabelOptions) -> Self {
        Self {
            name,
            cell,
            options,
        }
    }
}

impl VisualComponent for Label {
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
        if let Some(background) = self.options.background {
            area.into_styled(PrimitiveStyle::with_fill(background.0))
                .draw(target)?;
        }
        draw_centered(
            target,
            &self.options.text,
            area.center(),
            &FONT_6X10,
            self.options.color.0,
            area.size.width,
        )
    }
}
