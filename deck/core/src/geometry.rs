//! Screen and Grid Geometry
//!
//! Maps device pixel geometry to per-cell rectangles. The grid is centered
//! horizontally on a screen that may be wider than `key_size * columns`:
//!
//! ```text
//!  margin          columns * key_size           margin
//! |<---->|<------------------------------------>|<---->|
//!        +---------+---------+---------+--------+
//!        | (0,0)   | (1,0)   | (2,0)   | (3,0)  |
//!        +---------+---------+---------+--------+
//!        | (0,1)   | (1,1)   | (2,1)   | (3,1)  |
//!        +---------+---------+---------+--------+
//! ```

use std::fmt;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use serde::{Deserialize, Serialize};

use crate::device::DeviceGeometry;

/// A grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    /// Column, 0 is leftmost
    pub col: u16,
    /// Row, 0 is topmost
    pub row: u16,
}

impl Cell {
    /// Create a cell coordinate
    #[must_use]
    pub const fn new(col: u16, row: u16) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.col, self.row)
    }
}

/// Grid layout over the center display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    cell_size: u32,
    columns: u16,
    rows: u16,
    screen: Size,
}

impl GridGeometry {
    /// Create a grid from raw dimensions
    #[must_use]
    pub fn new(cell_size: u32, columns: u16, rows: u16, screen: Size) -> Self {
        Self {
            cell_size,
            columns,
            rows,
            screen,
        }
    }

    /// Create a grid from what the device reports
    #[must_use]
    pub fn from_device(geometry: &DeviceGeometry) -> Self {
        Self::new(
            geometry.key_size,
            geometry.columns,
            geometry.rows,
            geometry.center,
        )
    }

    /// Edge length of one cell in pixels
    #[must_use]
    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// Number of columns
    #[must_use]
    pub fn columns(&self) -> u16 {
        self.columns
    }

    /// Number of rows
    #[must_use]
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Full screen size (frame size)
    #[must_use]
    pub fn screen_size(&self) -> Size {
        self.screen
    }

    /// Horizontal offset that centers the grid on the screen
    #[must_use]
    pub fn margin(&self) -> i32 {
        let grid_width = self.cell_size.saturating_mul(u32::from(self.columns));
        let margin = self.screen.width.saturating_sub(grid_width) / 2;
        i32::try_from(margin).unwrap_or(0)
    }

    /// Whether a cell lies inside the grid
    #[must_use]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.col < self.columns && cell.row < self.rows
    }

    /// Pixel rectangle of one cell
    #[must_use]
    pub fn cell_rect(&self, cell: Cell) -> Rectangle {
        let size = self.cell_size_i32();
        Rectangle::new(
            Point::new(
                self.margin()
                    .saturating_add(i32::from(cell.col).saturating_mul(size)),
                i32::from(cell.row).saturating_mul(size),
            ),
            Size::new_equal(self.cell_size),
        )
    }

    /// Pixel rectangle covering the whole grid
    #[must_use]
    pub fn grid_area(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.margin(), 0),
            Size::new(
                self.cell_size.saturating_mul(u32::from(self.columns)),
                self.cell_size.saturating_mul(u32::from(self.rows)),
            ),
        )
    }

    /// Map a touch at screen pixels to a cell.
    ///
    /// Touches in the margins or below the last row map to `None`.
    #[must_use]
    pub fn cell_at(&self, point: Point) -> Option<Cell> {
        let size = self.cell_size_i32();
        if size == 0 {
            return None;
        }
        let x = point.x.saturating_sub(self.margin());
        if x < 0 || point.y < 0 {
            return None;
        }
        let col = u16::try_from(x.div_euclid(size)).ok()?;
        let row = u16::try_from(point.y.div_euclid(size)).ok()?;
        let cell = Cell::new(col, row);
        self.contains(cell).then_some(cell)
    }

    /// Draw the cell separator lines
    pub fn draw_grid<D>(&self, target: &mut D, color: Rgb888) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let style = PrimitiveStyle::with_stroke(color, 1);
        let area = self.grid_area();
        let size = self.cell_size_i32();
        let bottom = area.top_left.y.saturating_add(size.saturating_mul(i32::from(self.rows)));
        let right = area.top_left.x.saturating_add(size.saturating_mul(i32::from(self.columns)));

        for col in 1..self.columns {
            let x = area.top_left.x.saturating_add(i32::from(col).saturating_mul(size));
            Line::new(Point::new(x, area.top_left.y), Point::new(x, bottom - 1))
                .into_styled(style)
                .draw(target)?;
        }
        for row in 1..self.rows {
            let y = area.top_left.y.saturating_add(i32::from(row).saturating_mul(size));
            Line::new(Point::new(area.top_left.x, y), Point::new(right - 1, y))
                .into_styled(style)
                .draw(target)?;
        }
        Ok(())
    }

    fn cell_size_i32(&self) -> i32 {
        i32::try_from(self.cell_size).unwrap_or(i32::MAX)
    }
}
