//! `embedded-graphics` surface scoped to one RAM window.
//!
//! Partial refreshes only stream the active window, so drawing is clipped to
//! it: anything that spilled past the edge would sit in the framebuffer
//! without reaching the panel until the next full refresh.

use core::convert::Infallible;

use embedded_graphics_core::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    pixelcolor::BinaryColor,
};

use crate::{FrameBuffer, Window};

/// `BinaryColor::On` is black ink. The controller RAM stores white as `1`;
/// `stream_window` flips the bits on the way out.
const fn ink(color: BinaryColor) -> bool {
    matches!(color, BinaryColor::On)
}

/// Draw target over the pixels of `window`, with `(0, 0)` at its top-left
/// corner.
pub struct Canvas<'a> {
    frame: &'a mut FrameBuffer,
    window: Window,
}

impl FrameBuffer {
    pub fn canvas(&mut self, window: Window) -> Canvas<'_> {
        Canvas {
            frame: self,
            window,
        }
    }
}

impl Canvas<'_> {
    pub const fn window(&self) -> Window {
        self.window
    }

    fn plot(&mut self, point: Point, on: bool) {
        let (Ok(x), Ok(y)) = (u16::try_from(point.x), u16::try_from(point.y)) else {
            return;
        };
        if x >= self.window.width || y >= self.window.height {
            return;
        }
        self.frame.set_pixel(
            usize::from(self.window.x + x),
            usize::from(self.window.y + y),
            on,
        );
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.plot(point, ink(color));
        }
        Ok(())
    }

    /// Windows are byte aligned, so a clear is a plain byte fill.
    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.frame.fill_window(&self.window, ink(color));
        Ok(())
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(u32::from(self.window.width), u32::from(self.window.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawing_is_relative_to_the_window_and_clipped_to_it() {
        let mut frame = FrameBuffer::new();
        let window = Window::new(8, 16, 16, 8).unwrap();
        let mut canvas = frame.canvas(window);

        canvas
            .draw_iter([
                Pixel(Point::new(0, 0), BinaryColor::On),
                Pixel(Point::new(15, 7), BinaryColor::On),
                Pixel(Point::new(16, 0), BinaryColor::On),
                Pixel(Point::new(0, 8), BinaryColor::On),
                Pixel(Point::new(-1, 3), BinaryColor::On),
            ])
            .unwrap();
        assert_eq!(canvas.size(), Size::new(16, 8));

        assert_eq!(frame.pixel(8, 16), Some(true));
        assert_eq!(frame.pixel(23, 23), Some(true));
        assert_eq!(frame.pixel(24, 16), Some(false));
        assert_eq!(frame.pixel(8, 24), Some(false));
        assert_eq!(frame.pixel(7, 19), Some(false));
        assert_eq!(frame.bytes().iter().filter(|byte| **byte != 0).count(), 2);
    }

    #[test]
    fn off_pixels_erase_ink() {
        let mut frame = FrameBuffer::new();
        frame.clear(true);
        let mut canvas = frame.canvas(Window::FULL);

        canvas
            .draw_iter([Pixel(Point::new(3, 4), BinaryColor::Off)])
            .unwrap();

        assert_eq!(frame.pixel(3, 4), Some(false));
        assert_eq!(frame.pixel(4, 4), Some(true));
    }

    #[test]
    fn clear_fills_only_the_window() {
        let mut frame = FrameBuffer::new();
        let window = Window::new(8, 16, 16, 8).unwrap();

        frame.canvas(window).clear(BinaryColor::On).unwrap();

        assert_eq!(frame.pixel(8, 16), Some(true));
        assert_eq!(frame.pixel(23, 23), Some(true));
        assert_eq!(frame.pixel(7, 16), Some(false));
        assert_eq!(frame.pixel(24, 16), Some(false));
        assert_eq!(frame.pixel(8, 24), Some(false));
    }
}
