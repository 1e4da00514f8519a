//! Render session lifecycle.
//!
//! A [`RenderSession`] owns everything needed to turn an agent snapshot into
//! a frame: the synthetic surface with its attached context, the hosted
//! renderer and the world view feeding it. It is built in two steps:
//! [`RenderSession::construct`] does the synchronous setup and
//! [`RenderSession::load_world`] waits for the initial chunk window. Only
//! after [`RenderSession::mark_ready`] does it produce frames.

use crate::agent::{AgentSnapshot, Position};
use crate::capture::{CompositedImage, FrameBuffer};
use crate::dom::DisplaySurface;
use crate::gl::{ContextFactory, GraphicsContext};
use crate::hud::HudCompositor;
use crate::scene::{Light, RendererFactory, SceneRenderer};
use crate::world_view::{ChunkSource, WorldView};
use crate::{BridgeConfig, Error, Result};
use glam::Vec3;
use std::future::Future;
use std::sync::Arc;

pub struct RenderSession {
    id: u64,
    config: BridgeConfig,
    surface: DisplaySurface,
    renderer: Option<Box<dyn SceneRenderer>>,
    world_view: WorldView,
    hud: HudCompositor,
    spawn: Position,
    ready: bool,
    degraded: bool,
    frames: u64,
}

impl RenderSession {
    /// Create context, renderer, lights and world view. The session starts
    /// out not ready.
    pub fn construct(
        id: u64,
        config: &BridgeConfig,
        contexts: &dyn ContextFactory,
        renderers: &dyn RendererFactory,
        version: &str,
        spawn: Position,
        world: Arc<dyn ChunkSource>,
    ) -> Result<Self> {
        let (w, h) = (config.viewport.width, config.viewport.height);
        let mut surface = DisplaySurface::new(w, h);
        surface.set_attribute("width", &w.to_string());
        surface.set_attribute("height", &h.to_string());

        let raw = contexts.create(w, h).map_err(|e| match e {
            Error::ContextUnavailable(_) => e,
            other => Error::ContextUnavailable(other.to_string()),
        })?;
        log::info!("session {}: {} context {}x{}", id, raw.backend_name(), w, h);
        surface.attach_context(GraphicsContext::new(raw, w, h));

        let mut renderer = renderers.create(&mut surface, config)?;
        renderer.set_version(version, &mut surface)?;

        let lighting = &config.lighting;
        renderer.add_light(Light::ambient(lighting.ambient_color, lighting.ambient_intensity));
        renderer.add_light(Light::directional(
            lighting.directional_color,
            lighting.directional_intensity,
            lighting.directional_from,
        ));

        let (world_view, events) = WorldView::new(world, config.view_distance, &spawn);
        renderer.listen(events);

        Ok(Self {
            id,
            config: config.clone(),
            surface,
            renderer: Some(renderer),
            world_view,
            hud: HudCompositor::new(config.viewport),
            spawn,
            ready: false,
            degraded: false,
            frames: 0,
        })
    }

    /// Load the chunk window around the spawn position.
    pub async fn load_world(&mut self) -> Result<()> {
        self.load_world_task().await?;
        log::info!(
            "session {}: world view ready, {} columns",
            self.id,
            self.world_view.loaded_count()
        );
        Ok(())
    }

    /// The initial chunk load, detached from the session so the session can
    /// be queried while it runs.
    pub fn load_world_task(&mut self) -> impl Future<Output = Result<()>> + 'static {
        let spawn = self.spawn;
        self.world_view.start_init(&spawn)
    }

    /// Open the session for captures. Has no effect once degraded.
    pub fn mark_ready(&mut self) {
        if !self.degraded {
            self.ready = true;
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn has_context(&self) -> bool {
        self.surface.has_context()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn world_view(&self) -> &WorldView {
        &self.world_view
    }

    /// Re-center, position the camera, render and read the frame back.
    pub fn render_frame(&mut self, snapshot: &AgentSnapshot) -> Result<FrameBuffer> {
        if !self.ready {
            return Err(Error::RenderError(format!("session {} is not ready", self.id)));
        }
        self.world_view.update_position(&snapshot.position);

        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| Error::RenderError(format!("session {} has no renderer", self.id)))?;
        let p = &snapshot.position;
        let eye = Vec3::new(p.x as f32, p.y as f32 + self.config.eye_height, p.z as f32);
        renderer.camera_mut().set_pose(eye, snapshot.yaw, snapshot.pitch);
        renderer.render(&mut self.surface)?;

        let (w, h) = (self.surface.width(), self.surface.height());
        let ctx = self
            .surface
            .get_context("webgl")
            .ok_or_else(|| Error::ContextLost("no context attached".into()))?;
        let pixels = ctx.read_pixels(0, 0, w, h)?;
        self.frames += 1;
        FrameBuffer::from_bottom_up(w, h, pixels)
    }

    /// Full capture: frame, orientation fix, HUD.
    pub fn capture(&mut self, snapshot: &AgentSnapshot) -> Result<CompositedImage> {
        let frame = self.render_frame(snapshot)?;
        Ok(self.hud.compose(frame.into_top_down(), snapshot))
    }

    /// Switch to fallback-only mode and release the renderer and the
    /// graphics context.
    pub fn degrade(&mut self) {
        log::warn!("session {}: degraded to fallback frames", self.id);
        self.ready = false;
        self.degraded = true;
        self.renderer = None;
        drop(self.surface.detach_context());
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        log::debug!("session {}: released after {} frames", self.id, self.frames);
    }
}
