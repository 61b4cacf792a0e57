//! In-memory image for the SSD1680 panel.

use crate::protocol::{BUFFER_SIZE, HEIGHT, LINE_BYTES, WIDTH, Window};

/// 1bpp framebuffer, one bit per pixel, `1` = black ink.
///
/// Bit 7 of each byte is the leftmost pixel. The controller RAM uses the
/// opposite polarity; the driver inverts while streaming.
#[derive(Clone)]
pub struct FrameBuffer {
    bytes: [u8; BUFFER_SIZE],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Creates a blank (white) framebuffer.
    pub const fn new() -> Self {
        Self {
            bytes: [0u8; BUFFER_SIZE],
        }
    }

    pub fn bytes(&self) -> &[u8; BUFFER_SIZE] {
        &self.bytes
    }

    /// Fills with white (`on = false`) or black (`on = true`).
    pub fn clear(&mut self, on: bool) {
        self.bytes.fill(if on { 0xFF } else { 0x00 });
    }

    /// Blanks every pixel inside `window`.
    pub fn clear_window(&mut self, window: &Window) {
        self.fill_window(window, false);
    }

    /// Sets every pixel inside `window` to white (`on = false`) or black.
    pub fn fill_window(&mut self, window: &Window, on: bool) {
        let value = if on { 0xFF } else { 0x00 };
        for y in window.y..=window.last_row() {
            let start = y as usize * LINE_BYTES + window.first_byte();
            self.bytes[start..start + window.row_bytes()].fill(value);
        }
    }

    /// Returns `true` when the pixel is in bounds.
    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }

        let byte_index = y * LINE_BYTES + (x / 8);
        let bit_mask = 1u8 << (7 - (x % 8));

        if on {
            self.bytes[byte_index] |= bit_mask;
        } else {
            self.bytes[byte_index] &= !bit_mask;
        }

        true
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        if x >= WIDTH || y >= HEIGHT {
            return None;
        }

        let byte_index = y * LINE_BYTES + (x / 8);
        let bit_mask = 1u8 << (7 - (x % 8));
        Some((self.bytes[byte_index] & bit_mask) != 0)
    }

    /// The bytes of gate line `y` that fall inside `window`.
    pub fn window_row(&self, window: &Window, y: u16) -> Option<&[u8]> {
        if y < window.y || y > window.last_row() {
            return None;
        }
        let start = y as usize * LINE_BYTES + window.first_byte();
        self.bytes.get(start..start + window.row_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_bit_mapping_is_msb_first_within_byte() {
        let mut fb = FrameBuffer::new();

        assert!(fb.set_pixel(0, 0, true));
        assert!(fb.set_pixel(7, 0, true));
        assert!(fb.set_pixel(8, 0, true));

        assert_eq!(fb.bytes()[0], 0b1000_0001);
        assert_eq!(fb.bytes()[1], 0b1000_0000);
    }

    #[test]
    fn out_of_bounds_pixel_is_ignored() {
        let mut fb = FrameBuffer::new();

        assert!(!fb.set_pixel(WIDTH, 0, true));
        assert!(!fb.set_pixel(0, HEIGHT, true));
        assert_eq!(fb.pixel(WIDTH, HEIGHT), None);
        assert!(fb.bytes().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn window_rows_slice_only_the_window() {
        let mut fb = FrameBuffer::new();
        let window = Window::new(16, 4, 16, 2).unwrap();
        fb.set_pixel(16, 4, true);
        fb.set_pixel(31, 5, true);
        fb.set_pixel(0, 4, true);

        assert_eq!(fb.window_row(&window, 4), Some(&[0x80, 0x00][..]));
        assert_eq!(fb.window_row(&window, 5), Some(&[0x00, 0x01][..]));
        assert_eq!(fb.window_row(&window, 6), None);
    }

    #[test]
    fn clear_window_leaves_surroundings() {
        let mut fb = FrameBuffer::new();
        fb.clear(true);
        let window = Window::new(8, 8, 8, 8).unwrap();
        fb.clear_window(&window);

        assert_eq!(fb.pixel(8, 8), Some(false));
        assert_eq!(fb.pixel(15, 15), Some(false));
        assert_eq!(fb.pixel(7, 8), Some(true));
        assert_eq!(fb.pixel(8, 16), Some(true));
    }
}
