//! Volume Overlay
//!
//! Level bar and percentage shown for a moment after the volume knob turns.
//! Tapping it while visible dismisses it.

use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, PrimitiveStyleBuilder, Rectangle};
use serde::Deserialize;

use super::{draw_centered, occupies, VisualComponent};
use crate::config::HexColor;
use crate::geometry::Cell;
use crate::overlay::Overlay;
use crate::system::VolumeLevel;

const PANEL: Rgb888 = Rgb888::new(0x10, 0x10, 0x18);
const MUTED: Rgb888 = Rgb888::new(0xd0, 0x40, 0x40);

/// Options for `type = "volume"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeOptions {
    /// Bar color
    #[serde(default = "default_color")]
    pub color: HexColor,
}

fn default_color() -> HexColor {
    HexColor(Rgb888::new(0x40, 0xc0, 0x60))
}

/// Volume overlay
#[derive(Debug)]
pub struct VolumeOverlay {
    name: String,
    position: Option<Cell>,
    options: VolumeOptions,
    overlay: Overlay<VolumeLevel>,
}

impl VolumeOverlay {
    /// Create a hidden volume overlay
    #[must_use]
    pub fn new(
        name: String,
        position: Option<Cell>,
        options: VolumeOptions,
        overlay: Overlay<VolumeLevel>,
    ) -> Self {
        Self {
            name,
            position,
            options,
            overlay,
        }
    }

    /// Shared overlay state
    #[must_use]
    pub fn overlay(&self) -> &Overlay<VolumeLevel> {
        &self.overlay
    }
}

impl VisualComponent for VolumeOverlay {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Option<Cell> {
        self.position
    }

    fn draw<D>(&self, target: &mut D, area: Rectangle) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        if !self.overlay.is_visible() {
            return Ok(());
        }
        area.into_styled(PrimitiveStyle::with_fill(PANEL))
            .draw(target)?;

        let width = area.size.width;
        let text_center = area.top_left + Point::new((width / 2) as i32, (area.size.height / 3) as i32);

        let Some(level) = self.overlay.payload() else {
            return draw_centered(target, "--", area.center(), &FONT_9X15, Rgb888::WHITE, width);
        };

        let (text, color) = if level.muted {
            ("MUTE".to_string(), MUTED)
        } else {
            (format!("{}%", level.percent), self.options.color.0)
        };
        draw_centered(target, &text, text_center, &FONT_9X15, Rgb888::WHITE, width)?;

        // Bar in the lower third, outlined, filled up to the level
        let margin = 6;
        let bar_width = width.saturating_sub(2 * margin);
        let bar = Rectangle::new(
            area.top_left + Point::new(margin as i32, (area.size.height * 2 / 3) as i32 - 5),
            Size::new(bar_width, 10),
        );
        bar.into_styled(
            PrimitiveStyleBuilder::new()
                .stroke_color(Rgb888::new(0x60, 0x60, 0x60))
                .stroke_width(1)
                .build(),
        )
        .draw(target)?;

        let filled = bar_width * u32::from(level.percent.min(100)) / 100;
        if filled > 0 {
            Rectangle::new(bar.top_left, Size::new(filled, bar.size.height))
                .into_styled(PrimitiveStyle::with_fill(color))
                .draw(target)?;
        }

        if area.size.height >= 60 && !level.muted {
            let caption = area.top_left + Point::new((width / 2) as i32, area.size.height as i32 - 8);
            draw_centered(target, "volume", caption, &FONT_6X10, Rgb888::new(0x80, 0x80, 0x80), width)?;
        }
        Ok(())
    }

    fn handle_touch(&mut self, cell: Cell) -> bool {
        if !self.overlay.is_visible() || !occupies(self.position, cell) {
            return false;
        }
        self.overlay.hide();
        true
    }
}
