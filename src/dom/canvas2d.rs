//! Intermediate 2D drawing surface.
//!
//! Used in two places: the graphics adapter rasterizes decoded images through
//! it before texture upload, and the HUD compositor paints overlays with it.
//! Rows are stored top-down, channels RGBA, and every draw call blends
//! source-over.

use super::font;
use image::{Rgba, RgbaImage};

#[derive(Debug, Clone)]
pub struct Canvas2d {
    pixels: RgbaImage,
}

impl Canvas2d {
    /// Transparent surface of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Fill an axis-aligned rectangle, clipped to the surface.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (x + width as i32).clamp(0, self.width() as i32) as u32;
        let y1 = (y + height as i32).clamp(0, self.height() as i32) as u32;
        for py in y0..y1 {
            for px in x0..x1 {
                blend(self.pixels.get_pixel_mut(px, py), color);
            }
        }
    }

    /// Outline a rectangle; the stroke lies inside the rectangle bounds.
    pub fn stroke_rect(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        line_width: u32,
        color: Rgba<u8>,
    ) {
        if width == 0 || height == 0 {
            return;
        }
        let lw = line_width.min(width / 2).min(height / 2).max(1);
        self.fill_rect(x, y, width, lw, color);
        self.fill_rect(x, y + (height - lw) as i32, width, lw, color);
        let inner = height.saturating_sub(2 * lw);
        self.fill_rect(x, y + lw as i32, lw, inner, color);
        self.fill_rect(x + (width - lw) as i32, y + lw as i32, lw, inner, color);
    }

    /// Stroke a segment between two points (inclusive) with a square pen.
    pub fn stroke_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, width: u32, color: Rgba<u8>) {
        let half = (width / 2) as i32;
        if y0 == y1 || x0 == x1 {
            let (lx, hx) = (x0.min(x1), x0.max(x1));
            let (ly, hy) = (y0.min(y1), y0.max(y1));
            if y0 == y1 {
                self.fill_rect(lx, ly - half, (hx - lx + 1) as u32, width, color);
            } else {
                self.fill_rect(lx - half, ly, width, (hy - ly + 1) as u32, color);
            }
            return;
        }

        // Bresenham, stamping the pen at each step. Stamps overlap, so this
        // path is only used for opaque colors.
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.fill_rect(x - half, y - half, width, width, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Composite `image` with its top-left corner at (`dx`, `dy`).
    pub fn draw_image(&mut self, image: &RgbaImage, dx: i32, dy: i32) {
        for (sx, sy, src) in image.enumerate_pixels() {
            let (tx, ty) = (dx + sx as i32, dy + sy as i32);
            if tx < 0 || ty < 0 || tx >= self.width() as i32 || ty >= self.height() as i32 {
                continue;
            }
            blend(self.pixels.get_pixel_mut(tx as u32, ty as u32), *src);
        }
    }

    /// Draw `text` with its top-left corner at (`x`, `y`).
    pub fn fill_text(&mut self, x: i32, y: i32, text: &str, scale: u32, color: Rgba<u8>) {
        let scale = scale.max(1);
        for (i, c) in text.chars().enumerate() {
            let ox = x + (i as u32 * font::ADVANCE * scale) as i32;
            for row in 0..font::GLYPH_HEIGHT {
                for col in 0..font::GLYPH_WIDTH {
                    if font::is_set(c, col, row) {
                        self.fill_rect(
                            ox + (col * scale) as i32,
                            y + (row * scale) as i32,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
        }
    }

    pub fn measure_text(&self, text: &str, scale: u32) -> u32 {
        font::text_width(text, scale.max(1))
    }

    /// Raw RGBA bytes, rows top-down
    pub fn get_image_data(&self) -> Vec<u8> {
        self.pixels.as_raw().clone()
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        *dst = src;
        return;
    }
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}
