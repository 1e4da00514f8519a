use crate::agent::{AgentSource, Observation};
use crate::capture::{CaptureOutcome, CaptureResponse, DegradedReason, FallbackFrame};
use crate::chat::ChatInstruction;
use crate::gl::{ContextFactory, SoftwareContextFactory};
use crate::scene::{RendererFactory, VoxelViewerFactory};
use crate::session::RenderSession;
use crate::{BridgeConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Context and renderer factories used for new sessions.
#[derive(Clone)]
pub struct Backend {
    pub context: Arc<dyn ContextFactory>,
    pub renderer: Arc<dyn RendererFactory>,
}

impl Backend {
    /// CPU rasterizer; works everywhere
    pub fn software() -> Self {
        Self {
            context: Arc::new(SoftwareContextFactory),
            renderer: Arc::new(VoxelViewerFactory),
        }
    }

    /// wgpu with no surface
    #[cfg(feature = "gpu")]
    pub fn gpu() -> Self {
        Self {
            context: Arc::new(crate::gl::WgpuContextFactory),
            renderer: Arc::new(VoxelViewerFactory),
        }
    }

    pub fn name(&self) -> &'static str {
        self.context.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No agent, or agent gone
    Idle,
    /// Waiting for the spawn delay, constructing, or loading the world
    Bootstrapping,
    Ready,
    /// A capture lost the context; only fallback frames from now on
    Degraded,
    /// Bootstrap failed; waits for the next spawn
    Failed,
}

/// Readiness report for remote controllers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerStatus {
    pub viewer_ready: bool,
    pub has_session: bool,
    pub has_renderer: bool,
    pub has_context: bool,
    pub bot_connected: bool,
    pub phase: SessionPhase,
}

/// Connection report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub username: Option<String>,
}

enum Command {
    AgentSpawned(Arc<dyn AgentSource>, oneshot::Sender<()>),
    AgentDisconnected(oneshot::Sender<()>),
    Capture(oneshot::Sender<CaptureOutcome>),
    Status(oneshot::Sender<ViewerStatus>),
    Connection(oneshot::Sender<ConnectionStatus>),
    Observation(oneshot::Sender<Option<Observation>>),
    Chat(oneshot::Sender<Vec<ChatInstruction>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the render worker.
///
/// A dedicated thread owns every render session and runs all bootstrap
/// steps, captures and status queries one at a time on a single-threaded
/// runtime. Handles are cheap to clone and can be used from async code or,
/// through the `_blocking` methods, from plain threads.
#[derive(Clone)]
pub struct Bridge {
    cmd_tx: UnboundedSender<Command>,
    config: Arc<BridgeConfig>,
    fallback: Arc<FallbackFrame>,
}

impl Bridge {
    /// Validate the configuration and start the worker thread.
    pub fn new(config: BridgeConfig, backend: Backend) -> Result<Self> {
        config.validate()?;
        let fallback = Arc::new(FallbackFrame::new(
            config.viewport,
            config.fallback_color,
            config.jpeg_quality,
        )?);
        let (cmd_tx, cmd_rx) = unbounded_channel::<Command>();
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<()>>();

        let worker_config = config.clone();
        let worker_fallback = fallback.clone();
        thread::Builder::new()
            .name("povbridge-render".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = init_tx.send(Err(Error::InitializationError(format!(
                            "render worker runtime: {}",
                            e
                        ))));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, worker_loop(worker_config, worker_fallback, backend, cmd_rx));
                log::debug!("render worker stopped");
            })?;

        init_rx
            .recv()
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;

        Ok(Self {
            cmd_tx,
            config: Arc::new(config),
            fallback,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<oneshot::Receiver<T>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| Error::Other("render worker has stopped".into()))?;
        Ok(rx)
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        self.request(make)?
            .await
            .map_err(|e| Error::Other(format!("request canceled: {}", e)))
    }

    fn call_blocking<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        self.request(make)?
            .blocking_recv()
            .map_err(|e| Error::Other(format!("request canceled: {}", e)))
    }

    /// Agent entered the world: (re)start renderer bootstrap. A bootstrap
    /// still in flight is abandoned and any previous session is dropped.
    pub async fn agent_spawned(&self, agent: Arc<dyn AgentSource>) -> Result<()> {
        self.call(|tx| Command::AgentSpawned(agent, tx)).await
    }

    pub fn agent_spawned_blocking(&self, agent: Arc<dyn AgentSource>) -> Result<()> {
        self.call_blocking(|tx| Command::AgentSpawned(agent, tx))
    }

    /// Connection ended: tear the session down.
    pub async fn agent_disconnected(&self) -> Result<()> {
        self.call(Command::AgentDisconnected).await
    }

    pub fn agent_disconnected_blocking(&self) -> Result<()> {
        self.call_blocking(Command::AgentDisconnected)
    }

    /// Capture one frame. Always yields an image; see [`CaptureOutcome`].
    pub async fn capture_outcome(&self) -> Result<CaptureOutcome> {
        self.call(Command::Capture).await
    }

    pub fn capture_outcome_blocking(&self) -> Result<CaptureOutcome> {
        self.call_blocking(Command::Capture)
    }

    /// Capture and encode for transport.
    pub async fn capture(&self) -> Result<CaptureResponse> {
        let outcome = self.capture_outcome().await?;
        Ok(outcome.into_response(self.config.jpeg_quality, &self.fallback))
    }

    pub fn capture_blocking(&self) -> Result<CaptureResponse> {
        let outcome = self.capture_outcome_blocking()?;
        Ok(outcome.into_response(self.config.jpeg_quality, &self.fallback))
    }

    pub async fn status(&self) -> Result<ViewerStatus> {
        self.call(Command::Status).await
    }

    pub fn status_blocking(&self) -> Result<ViewerStatus> {
        self.call_blocking(Command::Status)
    }

    pub async fn connection(&self) -> Result<ConnectionStatus> {
        self.call(Command::Connection).await
    }

    pub fn connection_blocking(&self) -> Result<ConnectionStatus> {
        self.call_blocking(Command::Connection)
    }

    pub async fn observation(&self) -> Result<Option<Observation>> {
        self.call(Command::Observation).await
    }

    pub fn observation_blocking(&self) -> Result<Option<Observation>> {
        self.call_blocking(Command::Observation)
    }

    /// Chat lines the agent received since the last call.
    pub async fn chat(&self) -> Result<Vec<ChatInstruction>> {
        self.call(Command::Chat).await
    }

    pub fn chat_blocking(&self) -> Result<Vec<ChatInstruction>> {
        self.call_blocking(Command::Chat)
    }

    /// Poll until the session is ready or `timeout` passes.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<ViewerStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status().await?;
            if status.viewer_ready {
                return Ok(status);
            }
            if status.phase == SessionPhase::Failed || Instant::now() >= deadline {
                return Err(Error::InitializationError(format!(
                    "viewer not ready (phase {:?})",
                    status.phase
                )));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub fn wait_ready_blocking(&self, timeout: Duration) -> Result<ViewerStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status_blocking()?;
            if status.viewer_ready {
                return Ok(status);
            }
            if status.phase == SessionPhase::Failed || Instant::now() >= deadline {
                return Err(Error::InitializationError(format!(
                    "viewer not ready (phase {:?})",
                    status.phase
                )));
            }
            thread::sleep(Duration::from_millis(25));
        }
    }

    /// Drop all sessions and stop the worker.
    pub async fn shutdown(self) -> Result<()> {
        self.call(Command::Shutdown).await
    }

    pub fn shutdown_blocking(self) -> Result<()> {
        self.call_blocking(Command::Shutdown)
    }
}

/// Render state owned by the worker thread
struct Host {
    config: BridgeConfig,
    fallback: Arc<FallbackFrame>,
    backend: Backend,
    agent: Option<Arc<dyn AgentSource>>,
    session: Option<RenderSession>,
    bootstrap: Option<JoinHandle<()>>,
    generation: u64,
    phase: SessionPhase,
}

impl Host {
    /// Abort any pending bootstrap and drop the current session.
    fn teardown(&mut self) {
        if let Some(task) = self.bootstrap.take() {
            task.abort();
            log::info!("abandoning pending session bootstrap");
        }
        if let Some(session) = self.session.take() {
            log::info!("discarding render session {}", session.id());
        }
    }

    fn status(&self) -> ViewerStatus {
        let session = self.session.as_ref();
        ViewerStatus {
            viewer_ready: session.map_or(false, RenderSession::is_ready),
            has_session: session.is_some(),
            has_renderer: session.map_or(false, RenderSession::has_renderer),
            has_context: session.map_or(false, RenderSession::has_context),
            bot_connected: self.agent.as_ref().map_or(false, |a| a.is_connected()),
            phase: self.phase,
        }
    }

    fn capture(&mut self) -> CaptureOutcome {
        let frame = self.fallback.clone();
        let fallback = |reason: DegradedReason| frame.outcome(reason);

        let Some(agent) = self.agent.clone() else {
            return fallback(DegradedReason::NoAgent);
        };
        let Some(snapshot) = agent.snapshot().filter(|_| agent.is_connected()) else {
            return fallback(DegradedReason::NoAgent);
        };
        let Some(session) = self.session.as_mut() else {
            return fallback(DegradedReason::NoSession);
        };
        if !session.is_ready() {
            return fallback(DegradedReason::NotReady);
        }

        match std::panic::catch_unwind(AssertUnwindSafe(|| session.capture(&snapshot))) {
            Ok(Ok(image)) => CaptureOutcome::Rendered(image),
            Ok(Err(e)) => {
                log::warn!("capture failed, answering blank: {}", e);
                if e.is_unrecoverable() {
                    session.degrade();
                    self.phase = SessionPhase::Degraded;
                }
                fallback(DegradedReason::Failed(e.to_string()))
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic during capture".to_string());
                log::error!("capture panicked, answering blank: {}", msg);
                fallback(DegradedReason::Failed(msg))
            }
        }
    }
}

async fn worker_loop(
    config: BridgeConfig,
    fallback: Arc<FallbackFrame>,
    backend: Backend,
    mut cmd_rx: UnboundedReceiver<Command>,
) {
    let host = Rc::new(RefCell::new(Host {
        config,
        fallback,
        backend,
        agent: None,
        session: None,
        bootstrap: None,
        generation: 0,
        phase: SessionPhase::Idle,
    }));

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::AgentSpawned(agent, resp) => {
                start_bootstrap(&host, agent);
                let _ = resp.send(());
            }
            Command::AgentDisconnected(resp) => {
                let mut h = host.borrow_mut();
                h.teardown();
                h.agent = None;
                h.phase = SessionPhase::Idle;
                let _ = resp.send(());
            }
            Command::Capture(resp) => {
                let outcome = host.borrow_mut().capture();
                let _ = resp.send(outcome);
            }
            Command::Status(resp) => {
                let _ = resp.send(host.borrow().status());
            }
            Command::Connection(resp) => {
                let h = host.borrow();
                let status = ConnectionStatus {
                    connected: h.agent.as_ref().map_or(false, |a| a.is_connected()),
                    username: h.agent.as_ref().and_then(|a| a.username()),
                };
                let _ = resp.send(status);
            }
            Command::Observation(resp) => {
                let obs = host.borrow().agent.as_ref().and_then(|a| a.observation());
                let _ = resp.send(obs);
            }
            Command::Chat(resp) => {
                let lines = host.borrow().agent.as_ref().map(|a| a.take_chat()).unwrap_or_default();
                let _ = resp.send(lines);
            }
            Command::Shutdown(resp) => {
                let mut h = host.borrow_mut();
                h.teardown();
                h.agent = None;
                h.phase = SessionPhase::Idle;
                let _ = resp.send(());
                break;
            }
        }
    }
}

/// Supersede whatever is running and schedule a fresh bootstrap.
fn start_bootstrap(host: &Rc<RefCell<Host>>, agent: Arc<dyn AgentSource>) {
    let (generation, config, backend) = {
        let mut h = host.borrow_mut();
        h.teardown();
        h.generation += 1;
        h.agent = Some(agent.clone());
        h.phase = SessionPhase::Bootstrapping;
        (h.generation, h.config.clone(), h.backend.clone())
    };
    log::info!(
        "agent spawned, bootstrapping session {} in {:?}",
        generation,
        config.spawn_delay
    );

    let task_host = host.clone();
    let handle = tokio::task::spawn_local(async move {
        tokio::time::sleep(config.spawn_delay).await;
        if let Err(e) = bootstrap(&task_host, generation, &config, &backend, agent).await {
            let mut h = task_host.borrow_mut();
            if h.generation == generation {
                log::error!("session {} bootstrap failed: {}", generation, e);
                h.bootstrap = None;
                h.phase = SessionPhase::Failed;
            }
        }
    });
    host.borrow_mut().bootstrap = Some(handle);
}

/// Construct, load and settle one session. The session is installed in the
/// host as soon as it exists so status reflects it while loading. Every
/// step after an await re-checks `generation`; a superseded run stops there.
async fn bootstrap(
    host: &Rc<RefCell<Host>>,
    generation: u64,
    config: &BridgeConfig,
    backend: &Backend,
    agent: Arc<dyn AgentSource>,
) -> Result<()> {
    let snapshot = agent
        .snapshot()
        .ok_or_else(|| Error::InitializationError("agent has no entity in the world".into()))?;
    let version = agent
        .version()
        .unwrap_or_else(|| crate::assets::LATEST_VERSION.to_string());

    let session = RenderSession::construct(
        generation,
        config,
        backend.context.as_ref(),
        backend.renderer.as_ref(),
        &version,
        snapshot.position,
        agent.world(),
    )?;

    let load = {
        let mut h = host.borrow_mut();
        if h.generation != generation {
            return Ok(());
        }
        h.session.insert(session).load_world_task()
    };
    load.await?;
    if host.borrow().generation != generation {
        return Ok(());
    }
    log::debug!("session {} world loaded, settling {:?}", generation, config.settle_delay);

    tokio::time::sleep(config.settle_delay).await;

    let mut h = host.borrow_mut();
    if h.generation != generation {
        return Ok(());
    }
    let Some(session) = h.session.as_mut() else {
        return Ok(());
    };
    session.mark_ready();
    h.bootstrap = None;
    h.phase = SessionPhase::Ready;
    log::info!("session {} ready", generation);
    Ok(())
}
