use super::{DrawCall, GpuContext, TextureId};
use crate::dom::{Canvas2d, ImageElement};
use crate::{Error, Result};

/// Texture source accepted by [`GraphicsContext::tex_image_2d`]
pub enum TexSource<'a> {
    /// Tightly packed RGBA8 rows
    Pixels {
        width: u32,
        height: u32,
        data: &'a [u8],
    },
    /// A decoded image element, as handed over by the renderer's loader
    Image(&'a ImageElement),
}

/// The context object the renderer talks to.
///
/// Reports the surface's fixed drawing-buffer size and reconciles texture
/// uploads: the raw context only accepts pixel arrays, so decoded images are
/// drawn onto an intermediate [`Canvas2d`] and their pixels extracted first.
/// Every other call is forwarded untouched.
pub struct GraphicsContext {
    inner: Box<dyn GpuContext>,
    width: u32,
    height: u32,
    uploads: usize,
}

impl GraphicsContext {
    pub fn new(inner: Box<dyn GpuContext>, width: u32, height: u32) -> Self {
        if inner.drawing_buffer_width() != width || inner.drawing_buffer_height() != height {
            log::warn!(
                "{} context is {}x{}, surface is {}x{}",
                inner.backend_name(),
                inner.drawing_buffer_width(),
                inner.drawing_buffer_height(),
                width,
                height
            );
        }
        Self {
            inner,
            width,
            height,
            uploads: 0,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    pub fn drawing_buffer_width(&self) -> u32 {
        self.width
    }

    pub fn drawing_buffer_height(&self) -> u32 {
        self.height
    }

    pub fn create_texture(&mut self) -> TextureId {
        self.inner.create_texture()
    }

    pub fn tex_image_2d(&mut self, texture: TextureId, source: TexSource<'_>) -> Result<()> {
        match source {
            TexSource::Pixels {
                width,
                height,
                data,
            } => {
                let expected = width as usize * height as usize * 4;
                if data.len() != expected {
                    return Err(Error::RenderError(format!(
                        "texture data is {} bytes, expected {} for {}x{}",
                        data.len(),
                        expected,
                        width,
                        height
                    )));
                }
                self.inner.tex_image_2d(texture, width, height, data)?;
            }
            TexSource::Image(element) => {
                let bitmap = element.bitmap().ok_or_else(|| {
                    Error::RenderError(format!(
                        "image element {} uploaded before decoding finished",
                        element.id()
                    ))
                })?;
                let mut canvas = Canvas2d::new(bitmap.width(), bitmap.height());
                canvas.draw_image(&bitmap, 0, 0);
                let data = canvas.get_image_data();
                self.inner
                    .tex_image_2d(texture, canvas.width(), canvas.height(), &data)?;
            }
        }
        self.uploads += 1;
        Ok(())
    }

    /// Number of successful texture uploads
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn clear(&mut self, rgba: [f32; 4]) {
        self.inner.clear(rgba)
    }

    pub fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        self.inner.draw(call)
    }

    pub fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<u8>> {
        self.inner.read_pixels(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::software::SoftwareContext;
    use crate::gl::Vertex;
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn ctx(w: u32, h: u32) -> GraphicsContext {
        GraphicsContext::new(Box::new(SoftwareContext::new(w, h)), w, h)
    }

    fn quad(color: [f32; 4]) -> Vec<Vertex> {
        let v = |x: f32, y: f32, u: f32, t: f32| Vertex {
            position: [x, y, 0.0],
            uv: [u, t],
            color,
        };
        vec![
            v(-1.0, -1.0, 0.0, 1.0),
            v(1.0, -1.0, 1.0, 1.0),
            v(1.0, 1.0, 1.0, 0.0),
            v(-1.0, -1.0, 0.0, 1.0),
            v(1.0, 1.0, 1.0, 0.0),
            v(-1.0, 1.0, 0.0, 0.0),
        ]
    }

    const IDENTITY: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    #[test]
    fn decoded_image_is_rasterized_before_upload() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();

        let mut surface = crate::dom::DisplaySurface::new(4, 4);
        let mut element = match surface.create_element("img").unwrap() {
            crate::dom::Element::Image(el) => el,
            _ => unreachable!(),
        };
        element.set_source(bytes.into_inner());

        let mut gl = ctx(4, 4);
        let tex = gl.create_texture();
        gl.tex_image_2d(tex, TexSource::Image(&element)).unwrap();
        assert_eq!(gl.uploads(), 1);

        gl.clear([0.0, 0.0, 0.0, 1.0]);
        let verts = quad([1.0; 4]);
        gl.draw(&DrawCall {
            vertices: &verts,
            view_proj: IDENTITY,
            texture: Some(tex),
        })
        .unwrap();
        let px = gl.read_pixels(0, 0, 4, 4).unwrap();
        assert_eq!(&px[0..4], &[0, 255, 0, 255]);
    }

    #[test]
    fn undecoded_image_is_rejected() {
        let mut surface = crate::dom::DisplaySurface::new(4, 4);
        let element = match surface.create_element("img").unwrap() {
            crate::dom::Element::Image(el) => el,
            _ => unreachable!(),
        };
        let mut gl = ctx(4, 4);
        let tex = gl.create_texture();
        assert!(matches!(
            gl.tex_image_2d(tex, TexSource::Image(&element)),
            Err(Error::RenderError(_))
        ));
        assert_eq!(gl.uploads(), 0);
    }

    #[test]
    fn short_pixel_array_is_rejected() {
        let mut gl = ctx(4, 4);
        let tex = gl.create_texture();
        let data = [0u8; 12];
        let res = gl.tex_image_2d(
            tex,
            TexSource::Pixels {
                width: 2,
                height: 2,
                data: &data,
            },
        );
        assert!(res.is_err());
    }

    #[test]
    fn reports_surface_dimensions() {
        let gl = ctx(640, 360);
        assert_eq!(gl.drawing_buffer_width(), 640);
        assert_eq!(gl.drawing_buffer_height(), 360);
        assert_eq!(gl.backend_name(), "software");
    }
}
