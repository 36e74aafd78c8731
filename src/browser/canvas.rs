//! Pixel canvas used to render mock pages.
//!
//! Provides the drawing API the mock browser needs for screenshots and
//! recordings:
//! - `fill()` / `draw_rect()` / `draw_outline()` for element boxes
//! - `draw_text()` using font8x8 glyphs
//! - `crop()` for clipped and element screenshots

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;

use super::types::{BoundingBox, BrowserError, BrowserResult};

/// Width and height of one glyph
pub const GLYPH_SIZE: u32 = 8;

/// An RGB framebuffer
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    /// Row-major, 3 bytes per pixel
    buffer: Vec<u8>,
}

impl Canvas {
    /// Create a canvas initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        let buffer = vec![0u8; (width * height * 3) as usize];
        Self {
            width,
            height,
            buffer,
        }
    }

    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut canvas = Self::new(width, height);
        canvas.fill(color);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle, clipped to the canvas
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..y.saturating_add(h).min(self.height) {
            for px in x..x.saturating_add(w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw a one pixel border
    pub fn draw_outline(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        if w == 0 || h == 0 {
            return;
        }
        self.draw_rect(x, y, w, 1, color);
        self.draw_rect(x, y + h - 1, w, 1, color);
        self.draw_rect(x, y, 1, h, color);
        self.draw_rect(x + w - 1, y, 1, h, color);
    }

    /// Draw text using font8x8 glyphs. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += GLYPH_SIZE;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            if py >= self.height {
                break;
            }
            for bit in 0..GLYPH_SIZE {
                let px = x + bit;
                if px >= self.width {
                    break;
                }
                // font8x8 stores LSB as leftmost pixel
                let is_fg = (row >> bit) & 1 == 1;
                self.set_pixel(px, py, if is_fg { fg } else { bg });
            }
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = ((y * self.width + x) * 3) as usize;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    /// Copy out a region. Fractional coordinates are truncated and the
    /// region is clamped to the canvas; an empty region yields a 1x1 canvas.
    pub fn crop(&self, region: &BoundingBox) -> Canvas {
        let x = (region.x.max(0.0) as u32).min(self.width.saturating_sub(1));
        let y = (region.y.max(0.0) as u32).min(self.height.saturating_sub(1));
        let w = (region.width.max(1.0) as u32).min(self.width - x).max(1);
        let h = (region.height.max(1.0) as u32).min(self.height - y).max(1);

        let mut out = Canvas::new(w, h);
        for py in 0..h {
            for px in 0..w {
                out.set_pixel(px, py, self.get_pixel(x + px, y + py));
            }
        }
        out
    }

    pub fn to_image(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| image::Rgb(self.get_pixel(x, y)))
    }

    /// Downscaled copy encoded as PNG, used as a recording frame
    pub fn to_frame(&self, max_width: u32, max_height: u32) -> BrowserResult<Vec<u8>> {
        let rgb = self.to_image();
        let frame: RgbImage = if self.width <= max_width && self.height <= max_height {
            rgb
        } else {
            let scale = f64::min(
                f64::from(max_width) / f64::from(self.width),
                f64::from(max_height) / f64::from(self.height),
            );
            let w = ((f64::from(self.width) * scale) as u32).max(1);
            let h = ((f64::from(self.height) * scale) as u32).max(1);
            image::imageops::thumbnail(&rgb, w, h)
        };
        encode_png(&frame)
    }

    /// Encode the canvas as PNG bytes
    pub fn to_png(&self) -> BrowserResult<Vec<u8>> {
        encode_png(&self.to_image())
    }
}

fn encode_png(image: &RgbImage) -> BrowserResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(BrowserError::from)?;
    Ok(bytes)
}
