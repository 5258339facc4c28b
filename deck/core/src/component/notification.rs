//! Notification Overlay
//!
//! Title and body panel with a FIFO queue: notifications raised while one is
//! showing wait their turn. Tapping dismisses the current one; the next
//! comes up after the debounce.

use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, PrimitiveStyleBuilder, Rectangle};
use serde::Deserialize;

use super::{draw_centered, occupies, VisualComponent};
use crate::config::HexColor;
use crate::geometry::Cell;
use crate::overlay::Overlay;

/// A notification payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Headline
    pub title: String,
    /// Detail line, may be empty
    pub body: String,
}

impl Notice {
    /// Create a notice
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Options for `type = "notification"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationOptions {
    /// Border color
    #[serde(default = "default_color")]
    pub color: HexColor,
}

fn default_color() -> HexColor {
    HexColor(Rgb888::new(0xf0, 0xa0, 0x20))
}

/// Queued notification overlay
#[derive(Debug)]
pub struct NotificationOverlay {
    name: String,
    position: Option<Cell>,
    options: NotificationOptions,
    overlay: Overlay<Notice>,
}

impl NotificationOverlay {
    /// Create a hidden notification overlay
    #[must_use]
    pub fn new(
        name: String,
        position: Option<Cell>,
        options: NotificationOptions,
        overlay: Overlay<Notice>,
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
    pub fn overlay(&self) -> &Overlay<Notice> {
        &self.overlay
    }
}

impl VisualComponent for NotificationOverlay {
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
        area.into_styled(
            PrimitiveStyleBuilder::new()
                .fill_color(Rgb888::new(0x20, 0x18, 0x10))
                .stroke_color(self.options.color.0)
                .stroke_width(2)
                .build(),
        )
        .draw(target)?;

        let Some(notice) = self.overlay.payload() else {
            return Ok(());
        };

        let width = area.size.width.saturating_sub(8);
        let column = area.top_left.x + (area.size.width / 2) as i32;
        let top = area.top_left.y;
        let height = area.size.height as i32;

        draw_centered(target, &notice.title, Point::new(column, top + height / 3), &FONT_9X15, self.options.color.0, width)?;
        if !notice.body.is_empty() {
            draw_centered(
                target,
                &notice.body,
                Point::new(column, top + height * 2 / 3),
                &FONT_6X10,
                Rgb888::WHITE,
                width,
            )?;
        }

        let queued = self.overlay.queued();
        if queued > 0 {
            // Pending count badge in the top right corner
            let badge = Rectangle::new(
                Point::new(area.top_left.x + area.size.width as i32 - 16, top + 4),
                Size::new(12, 12),
            );
            badge
                .into_styled(PrimitiveStyle::with_fill(self.options.color.0))
                .draw(target)?;
            let count = if queued > 9 { "+".to_string() } else { queued.to_string() };
            draw_centered(target, &count, badge.center(), &FONT_6X10, Rgb888::BLACK, 12)?;
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
