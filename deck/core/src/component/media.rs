//! Media Overlay
//!
//! Now-playing panel shown after a media action. Tapping it while visible
//! toggles playback and keeps it up for another timeout.

use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle, Triangle};
use serde::Deserialize;

use super::{draw_centered, occupies, Action, ActionSink, VisualComponent};
use crate::config::HexColor;
use crate::geometry::Cell;
use crate::overlay::Overlay;
use crate::system::{MediaCommand, TrackInfo};

/// Options for `type = "media"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaOptions {
    /// Panel color
    #[serde(default = "default_color")]
    pub color: HexColor,
}

fn default_color() -> HexColor {
    HexColor(Rgb888::new(0x18, 0x18, 0x30))
}

/// Now-playing overlay
#[derive(Debug)]
pub struct MediaOverlay {
    name: String,
    position: Option<Cell>,
    options: MediaOptions,
    overlay: Overlay<TrackInfo>,
    sink: ActionSink,
}

impl MediaOverlay {
    /// Create a hidden media overlay
    #[must_use]
    pub fn new(
        name: String,
        position: Option<Cell>,
        options: MediaOptions,
        overlay: Overlay<TrackInfo>,
        sink: ActionSink,
    ) -> Self {
        Self {
            name,
            position,
            options,
            overlay,
            sink,
        }
    }

    /// Shared overlay state
    #[must_use]
    pub fn overlay(&self) -> &Overlay<TrackInfo> {
        &self.overlay
    }
}

impl VisualComponent for MediaOverlay {
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
        area.into_styled(PrimitiveStyle::with_fill(self.options.color.0))
            .draw(target)?;

        let width = area.size.width;
        let Some(track) = self.overlay.payload() else {
            return draw_centered(target, "Nothing playing", area.center(), &FONT_6X10, Rgb888::WHITE, width);
        };

        let column = area.top_left.x + (width / 2) as i32;
        let top = area.top_left.y;
        let height = area.size.height as i32;

        draw_centered(target, &track.title, Point::new(column, top + height / 4), &FONT_9X15, Rgb888::WHITE, width)?;
        draw_centered(
            target,
            &track.artist,
            Point::new(column, top + height / 2),
            &FONT_6X10,
            Rgb888::new(0xa0, 0xa0, 0xa0),
            width,
        )?;

        // Status glyph: play triangle or pause bars
        let glyph = Point::new(column, top + height * 3 / 4);
        let style = PrimitiveStyle::with_fill(Rgb888::WHITE);
        if track.playing {
            Rectangle::new(glyph + Point::new(-6, -6), Size::new(4, 12))
                .into_styled(style)
                .draw(target)?;
            Rectangle::new(glyph + Point::new(2, -6), Size::new(4, 12))
                .into_styled(style)
                .draw(target)?;
        } else {
            Triangle::new(
                glyph + Point::new(-5, -6),
                glyph + Point::new(-5, 6),
                glyph + Point::new(6, 0),
            )
            .into_styled(style)
            .draw(target)?;
        }
        Ok(())
    }

    fn handle_touch(&mut self, cell: Cell) -> bool {
        if !self.overlay.is_visible() || !occupies(self.position, cell) {
            return false;
        }
        self.sink.emit(Action::Media(MediaCommand::PlayPause));
        self.overlay.show_temporarily(None);
        true
    }
}
