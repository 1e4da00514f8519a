use image::Rgba;
use povbridge::agent::Position;
use povbridge::bridge::SessionPhase;
use povbridge::demo::{FlatWorld, SimulatedAgent};
use povbridge::gl::{ContextFactory, DrawCall, GpuContext, SoftwareContextFactory, TextureId};
use povbridge::scene::VoxelViewerFactory;
use povbridge::{Backend, Bridge, BridgeConfig, DegradedReason};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config() -> BridgeConfig {
    let mut cfg = BridgeConfig::default();
    cfg.view_distance = 1;
    cfg.spawn_delay = Duration::from_millis(20);
    cfg.settle_delay = Duration::from_millis(20);
    cfg
}

fn agent() -> Arc<SimulatedAgent> {
    Arc::new(SimulatedAgent::new("Agent", Arc::new(FlatWorld::default())))
}

#[test]
fn capture_before_ready_is_uniform_fallback() {
    let mut cfg = config();
    cfg.spawn_delay = Duration::from_secs(30);
    let bridge = Bridge::new(cfg, Backend::software()).unwrap();
    bridge.agent_spawned_blocking(agent()).unwrap();

    let outcome = bridge.capture_outcome_blocking().unwrap();
    assert_eq!(outcome.reason(), Some(&DegradedReason::NoSession));
    let img = outcome.image().pixels();
    assert_eq!(img.dimensions(), (640, 360));
    assert!(img.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));

    let status = bridge.status_blocking().unwrap();
    assert_eq!(status.phase, SessionPhase::Bootstrapping);
    assert!(!status.viewer_ready);
    assert!(status.bot_connected);
}

#[test]
fn ready_session_renders_opaque_frames_with_hud() {
    let bridge = Bridge::new(config(), Backend::software()).unwrap();
    let agent = agent();
    agent.set_position(Position::new(10.0, 64.0, 10.0));
    agent.set_vitals(14.0, 18.0);
    agent.select_slot(3);
    bridge.agent_spawned_blocking(agent.clone()).unwrap();
    bridge.wait_ready_blocking(Duration::from_secs(30)).unwrap();

    let outcome = bridge.capture_outcome_blocking().unwrap();
    assert!(!outcome.is_degraded(), "{:?}", outcome.reason());
    let image = outcome.image();
    assert_eq!((image.width(), image.height()), (640, 360));
    assert!(image.is_opaque());

    // sky above the horizon, ground below it
    let px = image.pixels();
    assert_eq!(*px.get_pixel(320, 100), Rgba([120, 167, 255, 255]));
    assert_ne!(*px.get_pixel(320, 300), Rgba([120, 167, 255, 255]));

    let response = bridge.capture_blocking().unwrap();
    assert!(response.success);
    assert!(response.degraded.is_none());
    assert_eq!(response.decode_image().unwrap().dimensions(), (640, 360));
}

#[test]
fn respawn_while_pending_leaves_one_session() {
    let bridge = Bridge::new(config(), Backend::software()).unwrap();
    let first = agent();
    let second = Arc::new(SimulatedAgent::new("Second", Arc::new(FlatWorld::default())));

    bridge.agent_spawned_blocking(first).unwrap();
    bridge.agent_spawned_blocking(second).unwrap();
    let status = bridge.wait_ready_blocking(Duration::from_secs(30)).unwrap();
    assert!(status.has_session && status.has_context);
    assert_eq!(status.phase, SessionPhase::Ready);

    let connection = bridge.connection_blocking().unwrap();
    assert_eq!(connection.username.as_deref(), Some("Second"));
    assert!(!bridge.capture_outcome_blocking().unwrap().is_degraded());
}

#[test]
fn disconnect_returns_to_fallback() {
    let bridge = Bridge::new(config(), Backend::software()).unwrap();
    let agent = agent();
    bridge.agent_spawned_blocking(agent.clone()).unwrap();
    bridge.wait_ready_blocking(Duration::from_secs(30)).unwrap();

    agent.set_connected(false);
    let outcome = bridge.capture_outcome_blocking().unwrap();
    assert_eq!(outcome.reason(), Some(&DegradedReason::NoAgent));
    assert!(bridge.observation_blocking().unwrap().is_none());

    bridge.agent_disconnected_blocking().unwrap();
    let status = bridge.status_blocking().unwrap();
    assert_eq!(status.phase, SessionPhase::Idle);
    assert!(!status.has_session);
}

/// Software contexts that track how many are alive.
#[derive(Default)]
struct CountingContexts {
    live: Arc<AtomicUsize>,
}

struct CountedContext {
    inner: Box<dyn GpuContext>,
    live: Arc<AtomicUsize>,
}

impl Drop for CountedContext {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GpuContext for CountedContext {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn drawing_buffer_width(&self) -> u32 {
        self.inner.drawing_buffer_width()
    }

    fn drawing_buffer_height(&self) -> u32 {
        self.inner.drawing_buffer_height()
    }

    fn create_texture(&mut self) -> TextureId {
        self.inner.create_texture()
    }

    fn tex_image_2d(&mut self, texture: TextureId, width: u32, height: u32, pixels: &[u8]) -> povbridge::Result<()> {
        self.inner.tex_image_2d(texture, width, height, pixels)
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        self.inner.clear(rgba)
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> povbridge::Result<()> {
        self.inner.draw(call)
    }

    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> povbridge::Result<Vec<u8>> {
        self.inner.read_pixels(x, y, width, height)
    }
}

impl ContextFactory for CountingContexts {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn create(&self, width: u32, height: u32) -> povbridge::Result<Box<dyn GpuContext>> {
        let inner = SoftwareContextFactory.create(width, height)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedContext {
            inner,
            live: self.live.clone(),
        }))
    }
}

#[test]
fn supersede_during_settle_releases_prior_context() {
    let mut cfg = config();
    cfg.viewport = povbridge::Viewport { width: 64, height: 36 };
    cfg.spawn_delay = Duration::ZERO;
    cfg.settle_delay = Duration::from_millis(1500);
    let contexts = CountingContexts::default();
    let live = contexts.live.clone();
    let backend = Backend {
        context: Arc::new(contexts),
        renderer: Arc::new(VoxelViewerFactory),
    };
    let bridge = Bridge::new(cfg, backend).unwrap();

    bridge.agent_spawned_blocking(agent()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !bridge.status_blocking().unwrap().has_session {
        assert!(Instant::now() < deadline, "first session never constructed");
        std::thread::sleep(Duration::from_millis(5));
    }
    let status = bridge.status_blocking().unwrap();
    assert!(!status.viewer_ready);
    assert_eq!(live.load(Ordering::SeqCst), 1);

    let second = Arc::new(SimulatedAgent::new("Second", Arc::new(FlatWorld::default())));
    bridge.agent_spawned_blocking(second).unwrap();
    assert!(live.load(Ordering::SeqCst) <= 1);

    let status = bridge.wait_ready_blocking(Duration::from_secs(30)).unwrap();
    assert_eq!(status.phase, SessionPhase::Ready);
    assert_eq!(live.load(Ordering::SeqCst), 1);
    assert_eq!(
        bridge.connection_blocking().unwrap().username.as_deref(),
        Some("Second")
    );

    bridge.agent_disconnected_blocking().unwrap();
    assert_eq!(live.load(Ordering::SeqCst), 0);
}
