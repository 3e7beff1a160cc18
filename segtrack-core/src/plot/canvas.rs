//! Minimal raster drawing on top of `image::RgbImage`.
//!
//! Coordinates are signed so callers can draw partially off-canvas shapes;
//! anything outside the image is clipped.

use super::glyphs;
use image::{Rgb, RgbImage};

pub struct Canvas {
    img: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgb<u8>) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, background),
        }
    }

    pub fn width(&self) -> i64 {
        i64::from(self.img.width())
    }

    pub fn height(&self) -> i64 {
        i64::from(self.img.height())
    }

    pub fn set(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && x < self.width() && y < self.height() {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Bresenham line, thickened with a square brush.
    pub fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, thickness: i64) {
        let (mut x0, mut y0) = from;
        let (x1, y1) = to;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness.max(1) / 2;

        loop {
            for ox in -half..=half {
                for oy in -half..=half {
                    self.set(x0 + ox, y0 + oy, color);
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    pub fn dashed_hline(&mut self, y: i64, x0: i64, x1: i64, dash: i64, gap: i64, color: Rgb<u8>) {
        let period = (dash + gap).max(1);
        for x in x0..=x1 {
            if (x - x0) % period < dash {
                self.set(x, y, color);
            }
        }
    }

    pub fn dashed_vline(&mut self, x: i64, y0: i64, y1: i64, dash: i64, gap: i64, color: Rgb<u8>) {
        let period = (dash + gap).max(1);
        for y in y0..=y1 {
            if (y - y0) % period < dash {
                self.set(x, y, color);
            }
        }
    }

    pub fn filled_circle(&mut self, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
        for y in -radius..=radius {
            for x in -radius..=radius {
                if x * x + y * y <= radius * radius {
                    self.set(cx + x, cy + y, color);
                }
            }
        }
    }

    /// Draw `text` with its top-left corner at (x, y).
    pub fn text(&mut self, x: i64, y: i64, text: &str, scale: i64, color: Rgb<u8>) {
        let mut cursor = x;
        for ch in text.chars() {
            if let Some(rows) = glyphs::glyph(ch) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..glyphs::WIDTH {
                        if bits & (1 << (glyphs::WIDTH - 1 - col)) != 0 {
                            let px = cursor + col as i64 * scale;
                            let py = y + row as i64 * scale;
                            for sx in 0..scale {
                                for sy in 0..scale {
                                    self.set(px + sx, py + sy, color);
                                }
                            }
                        }
                    }
                }
            }
            cursor += glyphs::advance(scale);
        }
    }

    pub fn text_width(text: &str, scale: i64) -> i64 {
        let n = text.chars().count() as i64;
        if n == 0 {
            0
        } else {
            n * glyphs::advance(scale) - scale
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.img
    }
}
