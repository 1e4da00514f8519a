use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use povbridge::chat::InstructionQueue;
use povbridge::demo::{FlatWorld, SimulatedAgent};
use povbridge::server::ApiServer;
use povbridge::{Backend, Bridge, BridgeConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Software,
    Gpu,
}

/// Headless first-person capture server
#[derive(Debug, Parser)]
#[command(name = "povbridge", version)]
struct Args {
    /// Port for the HTTP API
    #[arg(long, default_value_t = 3333)]
    port: u16,

    /// Graphics backend
    #[arg(long, value_enum, default_value_t = BackendKind::Software)]
    backend: BackendKind,

    /// Directory holding `<version>/blocks.png` atlases
    #[arg(long)]
    asset_dir: Option<PathBuf>,

    /// JSON configuration file; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render one frame of the demo world to this path and exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Username of the demo agent
    #[arg(long, default_value = "Agent")]
    username: String,
}

fn backend(kind: BackendKind) -> anyhow::Result<Backend> {
    match kind {
        BackendKind::Software => Ok(Backend::software()),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Backend::gpu()),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => bail!("built without the `gpu` feature"),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if args.asset_dir.is_some() {
        config.asset_dir = args.asset_dir.clone();
    }
    let quality = config.jpeg_quality;

    let backend = backend(args.backend)?;
    log::info!("using {} backend", backend.name());
    let bridge = Bridge::new(config, backend)?;

    let agent = Arc::new(SimulatedAgent::new(&args.username, Arc::new(FlatWorld::default())));
    bridge.agent_spawned_blocking(agent.clone())?;

    if let Some(path) = args.snapshot {
        bridge
            .wait_ready_blocking(Duration::from_secs(60))
            .context("viewer never became ready")?;
        let outcome = bridge.capture_outcome_blocking()?;
        if let Some(reason) = outcome.reason() {
            bail!("capture degraded: {}", reason);
        }
        let jpeg = outcome.image().encode_jpeg(quality)?;
        std::fs::write(&path, jpeg).with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
        bridge.shutdown_blocking()?;
        return Ok(());
    }

    let chat = Arc::new(Mutex::new(InstructionQueue::new(Some(args.username.clone()))));
    let api = ApiServer::new(bridge, chat);
    let addr = format!("0.0.0.0:{}", args.port);
    let server = ApiServer::bind(&addr)?;
    log::info!("listening on http://{}", addr);
    api.serve(server);
    Ok(())
}
