//! Headless graphics contexts.
//!
//! [`GpuContext`] is the raw off-screen context: it accepts only raw pixel
//! arrays for textures and reads pixels back bottom-up, GL style.
//! [`GraphicsContext`] is the adapter the renderer actually talks to; it pins
//! the drawing-buffer size to the surface and converts decoded images into
//! pixel arrays before upload.

pub mod adapter;
pub mod software;
#[cfg(feature = "gpu")]
pub mod wgpu_context;

pub use adapter::{GraphicsContext, TexSource};

use crate::Result;
use bytemuck::{Pod, Zeroable};

pub type TextureId = u32;

/// Interleaved vertex consumed by every context
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    /// Multiplied with the sampled texel
    pub color: [f32; 4],
}

/// One batch of triangles (every three vertices form a triangle)
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub vertices: &'a [Vertex],
    /// Column-major view-projection with GL clip conventions (z in -w..w)
    pub view_proj: [[f32; 4]; 4],
    /// Sampled texture; `None` samples opaque white
    pub texture: Option<TextureId>,
}

/// Raw off-screen context with no window attached.
pub trait GpuContext {
    fn backend_name(&self) -> &'static str;

    fn drawing_buffer_width(&self) -> u32;

    fn drawing_buffer_height(&self) -> u32;

    fn create_texture(&mut self) -> TextureId;

    /// Upload tightly packed RGBA8 rows, first row at v = 0.
    fn tex_image_2d(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> Result<()>;

    /// Clear color and depth.
    fn clear(&mut self, rgba: [f32; 4]);

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    /// Read an RGBA8 region. Rows are returned bottom-up: the first row in the
    /// buffer is the bottom row of the region.
    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<u8>>;
}

/// Creates raw contexts for new sessions.
pub trait ContextFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, width: u32, height: u32) -> Result<Box<dyn GpuContext>>;
}

/// CPU-backed contexts; never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareContextFactory;

impl ContextFactory for SoftwareContextFactory {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create(&self, width: u32, height: u32) -> Result<Box<dyn GpuContext>> {
        Ok(Box::new(software::SoftwareContext::new(width, height)))
    }
}

/// GPU-backed contexts through wgpu with no surface.
#[cfg(feature = "gpu")]
#[derive(Debug, Default, Clone, Copy)]
pub struct WgpuContextFactory;

#[cfg(feature = "gpu")]
impl ContextFactory for WgpuContextFactory {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create(&self, width: u32, height: u32) -> Result<Box<dyn GpuContext>> {
        Ok(Box::new(wgpu_context::WgpuContext::new(width, height)?))
    }
}
