//! Frame Buffer
//!
//! An owned RGB888 pixel buffer the router renders into before the finished
//! frame is handed to the device for one display region.

use std::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;

/// Owned RGB888 framebuffer implementing [`DrawTarget`]
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    size: Size,
    pixels: Vec<Rgb888>,
}

impl Frame {
    /// Create a black frame of the given size
    #[must_use]
    pub fn new(size: Size) -> Self {
        let len = (size.width as usize) * (size.height as usize);
        Self {
            size,
            pixels: vec![Rgb888::BLACK; len],
        }
    }

    /// Fill every pixel with one color
    pub fn fill(&mut self, color: Rgb888) {
        self.pixels.fill(color);
    }

    /// Read back a pixel, `None` outside the frame
    #[must_use]
    pub fn pixel(&self, point: Point) -> Option<Rgb888> {
        self.index_of(point).map(|idx| self.pixels[idx])
    }

    /// Row-major pixel data
    #[must_use]
    pub fn pixels(&self) -> &[Rgb888] {
        &self.pixels
    }

    /// Packed RGB bytes, three per pixel, row-major
    #[must_use]
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|c| [c.r(), c.g(), c.b()])
            .collect()
    }

    /// Count pixels of an exact color (used by diagnostics and tests)
    #[must_use]
    pub fn count_color(&self, color: Rgb888) -> usize {
        self.pixels.iter().filter(|&&c| c == color).count()
    }

    fn index_of(&self, point: Point) -> Option<usize> {
        let x = usize::try_from(point.x).ok()?;
        let y = usize::try_from(point.y).ok()?;
        let width = self.size.width as usize;
        if x >= width || y >= self.size.height as usize {
            return None;
        }
        Some(y * width + x)
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for Frame {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let Some(idx) = self.index_of(point) {
                self.pixels[idx] = color;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame").field("size", &self.size).finish()
    }
}
