use super::camera::PerspectiveCamera;
use super::light::Light;
use super::mesh::build_column_mesh;
use crate::assets::{AssetStore, BlockPalette};
use crate::dom::{DisplaySurface, Element, ImageElement};
use crate::gl::{DrawCall, TexSource, TextureId, Vertex};
use crate::world_view::{ChunkColumn, ChunkPos, WorldEvent};
use crate::{BridgeConfig, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

/// Retained-mode scene renderer hosted on a [`DisplaySurface`].
///
/// The capture pipeline only ever constructs it, configures version, lights
/// and camera, and asks it to render.
pub trait SceneRenderer {
    /// Select block naming and textures for a game version.
    fn set_version(&mut self, version: &str, surface: &mut DisplaySurface) -> Result<()>;

    fn add_light(&mut self, light: Light);

    fn camera_mut(&mut self) -> &mut PerspectiveCamera;

    /// Subscribe to chunk load/unload notifications.
    fn listen(&mut self, events: UnboundedReceiver<WorldEvent>);

    /// One render pass into the surface's graphics context.
    fn render(&mut self, surface: &mut DisplaySurface) -> Result<()>;

    /// Columns currently held as meshes
    fn column_count(&self) -> usize;
}

/// Builds a renderer against a surface that already has a context attached.
pub trait RendererFactory: Send + Sync {
    fn create(&self, surface: &mut DisplaySurface, config: &BridgeConfig) -> Result<Box<dyn SceneRenderer>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VoxelViewerFactory;

impl RendererFactory for VoxelViewerFactory {
    fn create(&self, surface: &mut DisplaySurface, config: &BridgeConfig) -> Result<Box<dyn SceneRenderer>> {
        Ok(Box::new(VoxelViewer::new(surface, config)?))
    }
}

enum Atlas {
    None,
    Decoding { element: ImageElement, texture: TextureId },
    Ready(TextureId),
    Failed,
}

struct ColumnMesh {
    column: Arc<ChunkColumn>,
    vertices: Vec<Vertex>,
}

/// Built-in voxel renderer: one mesh per chunk column, one atlas texture.
pub struct VoxelViewer {
    camera: PerspectiveCamera,
    lights: Vec<Light>,
    palette: BlockPalette,
    assets: AssetStore,
    atlas: Atlas,
    columns: HashMap<ChunkPos, ColumnMesh>,
    events: Option<UnboundedReceiver<WorldEvent>>,
    sky: [f32; 4],
    dirty: bool,
}

impl VoxelViewer {
    pub fn new(surface: &mut DisplaySurface, config: &BridgeConfig) -> Result<Self> {
        // Same setup calls a browser-hosted viewer makes against its canvas.
        surface.add_event_listener("resize");
        surface.add_event_listener("webglcontextlost");
        let rect = surface.bounding_client_rect();
        if surface.get_context("webgl2").is_none() {
            return Err(Error::InitializationError("surface has no webgl2 context".into()));
        }
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(Error::InitializationError("surface has zero size".into()));
        }

        let [r, g, b] = config.sky_color;
        Ok(Self {
            camera: PerspectiveCamera::new(
                config.fov_degrees,
                (rect.width / rect.height) as f32,
                config.near,
                config.far,
            ),
            lights: Vec::new(),
            palette: BlockPalette::for_version(crate::assets::LATEST_VERSION),
            assets: AssetStore::new(config.asset_dir.clone()),
            atlas: Atlas::None,
            columns: HashMap::new(),
            events: None,
            sky: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0],
            dirty: false,
        })
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn palette(&self) -> &BlockPalette {
        &self.palette
    }

    /// Whether the atlas texture has been uploaded
    pub fn atlas_ready(&self) -> bool {
        matches!(self.atlas, Atlas::Ready(_))
    }

    fn drain_events(&mut self) {
        let Some(rx) = self.events.as_mut() else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(WorldEvent::Load(column)) => {
                    let vertices = build_column_mesh(&column, &self.palette, &self.lights);
                    self.columns.insert(column.pos, ColumnMesh { column, vertices });
                }
                Ok(WorldEvent::Unload(pos)) => {
                    self.columns.remove(&pos);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("viewer: world view closed its event stream");
                    self.events = None;
                    break;
                }
            }
        }
    }

    fn remesh(&mut self) {
        for mesh in self.columns.values_mut() {
            mesh.vertices = build_column_mesh(&mesh.column, &self.palette, &self.lights);
        }
        self.dirty = false;
    }

    /// Upload the atlas once its element finished decoding.
    fn poll_atlas(&mut self, surface: &mut DisplaySurface) -> Result<Option<TextureId>> {
        if let Atlas::Decoding { element, texture } = &self.atlas {
            if element.complete() {
                let texture = *texture;
                let ctx = surface
                    .get_context("webgl2")
                    .ok_or_else(|| Error::ContextLost("context detached from surface".into()))?;
                let uploaded = ctx.tex_image_2d(texture, TexSource::Image(element));
                match uploaded {
                    Ok(()) => self.atlas = Atlas::Ready(texture),
                    Err(e) => {
                        log::warn!("viewer: atlas unusable, rendering untextured: {}", e);
                        self.atlas = Atlas::Failed;
                    }
                }
            }
        }
        Ok(match self.atlas {
            Atlas::Ready(texture) => Some(texture),
            _ => None,
        })
    }
}

impl SceneRenderer for VoxelViewer {
    fn set_version(&mut self, version: &str, surface: &mut DisplaySurface) -> Result<()> {
        self.palette = BlockPalette::for_version(version);
        let bytes = self.assets.atlas_png(&self.palette)?;
        let mut element = match surface.create_element("img")? {
            Element::Image(el) => el,
            Element::Canvas => {
                return Err(Error::InitializationError("image factory returned a canvas".into()))
            }
        };
        element.set_source(bytes);
        let texture = surface
            .get_context("webgl2")
            .ok_or_else(|| Error::InitializationError("surface has no webgl2 context".into()))?
            .create_texture();
        self.atlas = Atlas::Decoding { element, texture };
        self.dirty = true;
        log::debug!("viewer: using {} block assets", self.palette.version());
        Ok(())
    }

    fn add_light(&mut self, light: Light) {
        self.lights.push(light);
        self.dirty = true;
    }

    fn camera_mut(&mut self) -> &mut PerspectiveCamera {
        &mut self.camera
    }

    fn listen(&mut self, events: UnboundedReceiver<WorldEvent>) {
        self.events = Some(events);
    }

    fn render(&mut self, surface: &mut DisplaySurface) -> Result<()> {
        if self.dirty {
            self.remesh();
        }
        self.drain_events();
        let texture = self.poll_atlas(surface)?;

        let ctx = surface
            .get_context("webgl2")
            .ok_or_else(|| Error::ContextLost("context detached from surface".into()))?;
        ctx.clear(self.sky);
        let view_proj = self.camera.view_proj().to_cols_array_2d();
        for mesh in self.columns.values() {
            if mesh.vertices.is_empty() {
                continue;
            }
            ctx.draw(&DrawCall {
                vertices: &mesh.vertices,
                view_proj,
                texture,
            })?;
        }
        Ok(())
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::block;
    use crate::gl::software::SoftwareContext;
    use crate::gl::GraphicsContext;
    use glam::Vec3;
    use tokio::sync::mpsc::unbounded_channel;

    fn surface(w: u32, h: u32) -> DisplaySurface {
        let mut s = DisplaySurface::new(w, h);
        s.attach_context(GraphicsContext::new(Box::new(SoftwareContext::new(w, h)), w, h));
        s
    }

    fn config(w: u32, h: u32) -> BridgeConfig {
        let mut cfg = BridgeConfig::default();
        cfg.viewport = crate::Viewport { width: w, height: h };
        cfg
    }

    fn center_pixel(s: &mut DisplaySurface) -> [u8; 4] {
        let (w, h) = (s.width(), s.height());
        let ctx = s.get_context("webgl").unwrap();
        let px = ctx.read_pixels(w / 2, h / 2, 1, 1).unwrap();
        [px[0], px[1], px[2], px[3]]
    }

    #[test]
    fn requires_a_context() {
        let mut bare = DisplaySurface::new(8, 8);
        assert!(matches!(
            VoxelViewer::new(&mut bare, &config(8, 8)),
            Err(Error::InitializationError(_))
        ));
    }

    #[test]
    fn empty_world_renders_sky() {
        let mut s = surface(32, 18);
        let mut viewer = VoxelViewer::new(&mut s, &config(32, 18)).unwrap();
        viewer.render(&mut s).unwrap();
        assert_eq!(center_pixel(&mut s), [120, 167, 255, 255]);
        assert_eq!(s.ignored_listeners(), 2);
    }

    #[test]
    fn loaded_column_is_drawn_and_unloaded() {
        let mut s = surface(32, 18);
        let mut viewer = VoxelViewer::new(&mut s, &config(32, 18)).unwrap();
        viewer.set_version("1.16.5", &mut s).unwrap();
        viewer.add_light(Light::ambient([1.0; 3], 1.0));

        let (tx, rx) = unbounded_channel();
        viewer.listen(rx);
        let mut col = ChunkColumn::empty(ChunkPos::new(0, 0), 0, 1);
        for x in 0..16 {
            for z in 0..16 {
                col.set_block(x, 0, z, block::STONE);
            }
        }
        tx.send(WorldEvent::Load(Arc::new(col))).unwrap();

        // looking straight down at the floor from above
        viewer
            .camera_mut()
            .set_pose(Vec3::new(8.0, 5.0, 8.0), 0.0, -std::f32::consts::FRAC_PI_2 + 0.01);
        viewer.render(&mut s).unwrap();
        assert_eq!(viewer.column_count(), 1);
        assert!(viewer.atlas_ready());
        let px = center_pixel(&mut s);
        assert_ne!(px, [120, 167, 255, 255]);
        assert_eq!(px[3], 255);

        tx.send(WorldEvent::Unload(ChunkPos::new(0, 0))).unwrap();
        viewer.render(&mut s).unwrap();
        assert_eq!(viewer.column_count(), 0);
        assert_eq!(center_pixel(&mut s), [120, 167, 255, 255]);
    }
}
