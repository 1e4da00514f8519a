//! CPU rasterizer implementing [`GpuContext`].
//!
//! Storage follows GL window conventions: row 0 of the color buffer is the
//! bottom of the image. Triangles are clipped against the near plane,
//! depth-tested with a less-than compare and shaded with perspective-correct
//! texture coordinates. Both windings are drawn.

use super::{DrawCall, GpuContext, TextureId, Vertex};
use crate::{Error, Result};

struct Texture {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Texture {
    fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![255; 4],
        }
    }

    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let x = ((u * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1) as usize;
        let y = ((v * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1) as usize;
        let i = (y * self.width as usize + x) * 4;
        let px = &self.data[i..i + 4];
        [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
            px[3] as f32 / 255.0,
        ]
    }
}

/// Vertex after the view-projection transform
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    pos: [f32; 4],
    uv: [f32; 2],
    color: [f32; 4],
}

impl ClipVertex {
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        ClipVertex {
            pos: std::array::from_fn(|i| mix(self.pos[i], other.pos[i])),
            uv: std::array::from_fn(|i| mix(self.uv[i], other.uv[i])),
            color: std::array::from_fn(|i| mix(self.color[i], other.color[i])),
        }
    }

    /// Signed distance to the GL near plane (z = -w); inside when >= 0
    fn near_distance(&self) -> f32 {
        self.pos[2] + self.pos[3]
    }
}

/// Vertex in window space, ready for scan conversion
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    inv_w: f32,
    uv: [f32; 2],
    color: [f32; 4],
}

pub struct SoftwareContext {
    width: u32,
    height: u32,
    color: Vec<u8>,
    depth: Vec<f32>,
    textures: Vec<Texture>,
    white: Texture,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![0; n * 4],
            depth: vec![1.0; n],
            textures: Vec::new(),
            white: Texture::white(),
        }
    }

    fn transform(m: &[[f32; 4]; 4], v: &Vertex) -> ClipVertex {
        let p = [v.position[0], v.position[1], v.position[2], 1.0];
        let pos: [f32; 4] =
            std::array::from_fn(|row| (0..4).map(|col| m[col][row] * p[col]).sum::<f32>());
        ClipVertex {
            pos,
            uv: v.uv,
            color: v.color,
        }
    }

    /// Sutherland-Hodgman against the near plane only.
    fn clip_near(tri: [ClipVertex; 3]) -> Vec<ClipVertex> {
        let mut out = Vec::with_capacity(4);
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            let (da, db) = (a.near_distance(), b.near_distance());
            if da >= 0.0 {
                out.push(a);
            }
            if (da >= 0.0) != (db >= 0.0) {
                out.push(a.lerp(&b, da / (da - db)));
            }
        }
        out
    }

    fn to_screen(&self, v: &ClipVertex) -> Option<ScreenVertex> {
        let w = v.pos[3];
        if w <= f32::EPSILON {
            return None;
        }
        let inv_w = 1.0 / w;
        Some(ScreenVertex {
            x: (v.pos[0] * inv_w + 1.0) * 0.5 * self.width as f32,
            y: (v.pos[1] * inv_w + 1.0) * 0.5 * self.height as f32,
            depth: (v.pos[2] * inv_w + 1.0) * 0.5,
            inv_w,
            uv: v.uv,
            color: v.color,
        })
    }

    fn raster_triangle(&mut self, v: [ScreenVertex; 3], texture: Option<TextureId>) {
        let edge = |a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32| {
            (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
        };
        let area = edge(&v[0], &v[1], v[2].x, v[2].y);
        if area.abs() <= f32::EPSILON {
            return;
        }

        let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let max_x = v
            .iter()
            .map(|p| p.x)
            .fold(f32::NEG_INFINITY, f32::max)
            .ceil()
            .min(self.width as f32) as u32;
        let max_y = v
            .iter()
            .map(|p| p.y)
            .fold(f32::NEG_INFINITY, f32::max)
            .ceil()
            .min(self.height as f32) as u32;

        for py in min_y..max_y {
            for px in min_x..max_x {
                let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
                let b0 = edge(&v[1], &v[2], cx, cy) / area;
                let b1 = edge(&v[2], &v[0], cx, cy) / area;
                let b2 = edge(&v[0], &v[1], cx, cy) / area;
                if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                    continue;
                }

                let depth = b0 * v[0].depth + b1 * v[1].depth + b2 * v[2].depth;
                if !(0.0..=1.0).contains(&depth) {
                    continue;
                }
                let idx = py as usize * self.width as usize + px as usize;
                if depth >= self.depth[idx] {
                    continue;
                }

                let (p0, p1, p2) = (b0 * v[0].inv_w, b1 * v[1].inv_w, b2 * v[2].inv_w);
                let norm = p0 + p1 + p2;
                let persp = |a: f32, b: f32, c: f32| (p0 * a + p1 * b + p2 * c) / norm;
                let u = persp(v[0].uv[0], v[1].uv[0], v[2].uv[0]);
                let t = persp(v[0].uv[1], v[1].uv[1], v[2].uv[1]);

                let texel = match texture.and_then(|id| self.textures.get(id as usize)) {
                    Some(tex) => tex.sample(u, t),
                    None => self.white.sample(u, t),
                };
                let mut rgba = [0.0f32; 4];
                for (c, out) in rgba.iter_mut().enumerate() {
                    *out = texel[c] * persp(v[0].color[c], v[1].color[c], v[2].color[c]);
                }
                // alpha-tested cutout
                if rgba[3] < 0.5 {
                    continue;
                }

                self.depth[idx] = depth;
                let o = idx * 4;
                for c in 0..4 {
                    self.color[o + c] = (rgba[c].clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
        }
    }
}

impl GpuContext for SoftwareContext {
    fn backend_name(&self) -> &'static str {
        "software"
    }

    fn drawing_buffer_width(&self) -> u32 {
        self.width
    }

    fn drawing_buffer_height(&self) -> u32 {
        self.height
    }

    fn create_texture(&mut self) -> TextureId {
        self.textures.push(Texture::white());
        (self.textures.len() - 1) as TextureId
    }

    fn tex_image_2d(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
        if width == 0 || height == 0 || pixels.len() < width as usize * height as usize * 4 {
            return Err(Error::RenderError(format!(
                "invalid {}x{} texture upload of {} bytes",
                width,
                height,
                pixels.len()
            )));
        }
        let slot = self
            .textures
            .get_mut(texture as usize)
            .ok_or_else(|| Error::RenderError(format!("unknown texture {}", texture)))?;
        *slot = Texture {
            width,
            height,
            data: pixels[..width as usize * height as usize * 4].to_vec(),
        };
        Ok(())
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let px: [u8; 4] = std::array::from_fn(|i| (rgba[i].clamp(0.0, 1.0) * 255.0).round() as u8);
        for chunk in self.color.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        self.depth.fill(1.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        if call.vertices.len() % 3 != 0 {
            return Err(Error::RenderError(format!(
                "vertex count {} is not a multiple of 3",
                call.vertices.len()
            )));
        }
        if let Some(id) = call.texture {
            if id as usize >= self.textures.len() {
                return Err(Error::RenderError(format!("unknown texture {}", id)));
            }
        }

        for tri in call.vertices.chunks_exact(3) {
            let clipped = Self::clip_near([
                Self::transform(&call.view_proj, &tri[0]),
                Self::transform(&call.view_proj, &tri[1]),
                Self::transform(&call.view_proj, &tri[2]),
            ]);
            if clipped.len() < 3 {
                continue;
            }
            let screen: Vec<ScreenVertex> = clipped.iter().filter_map(|v| self.to_screen(v)).collect();
            if screen.len() != clipped.len() {
                continue;
            }
            for i in 1..screen.len() - 1 {
                self.raster_triangle([screen[0], screen[i], screen[i + 1]], call.texture);
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<u8>> {
        if x.saturating_add(width) > self.width || y.saturating_add(height) > self.height {
            return Err(Error::CaptureError(format!(
                "read region {}x{}+{}+{} exceeds {}x{} buffer",
                width, height, x, y, self.width, self.height
            )));
        }
        let mut out = Vec::with_capacity(width as usize * height as usize * 4);
        for row in y..y + height {
            let start = (row as usize * self.width as usize + x as usize) * 4;
            out.extend_from_slice(&self.color[start..start + width as usize * 4]);
        }
        Ok(out)
    }
}
