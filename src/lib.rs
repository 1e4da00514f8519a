//! povbridge
//!
//! Headless first-person capture for a live voxel game session. The crate
//! hosts a retained-mode scene renderer inside a synthetic display surface,
//! drives it through an off-screen graphics context, reads the frame back,
//! fixes its row order and alpha, and composites a HUD from the agent's
//! current state.
//!
//! # Features
//!
//! - **gpu** (default): `wgpu` context with no window or surface attached
//! - **Software context**: always available CPU rasterizer with the same API
//! - **Graceful degradation**: every capture answers, falling back to a blank
//!   frame while the session is bootstrapping or when a pass fails
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use povbridge::{Backend, Bridge, BridgeConfig};
//! use povbridge::demo::{FlatWorld, SimulatedAgent};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = Bridge::new(BridgeConfig::default(), Backend::software())?;
//! let agent = Arc::new(SimulatedAgent::new("Agent", Arc::new(FlatWorld::default())));
//! bridge.agent_spawned_blocking(agent)?;
//!
//! let response = bridge.capture_blocking()?;
//! assert!(response.success);
//! assert_eq!((response.width, response.height), (640, 360));
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod agent;
pub mod assets;
pub mod bridge;
pub mod capture;
pub mod chat;
pub mod demo;
pub mod dom;
pub mod gl;
pub mod hud;
pub mod scene;
pub mod server;
pub mod session;
pub mod world_view;

pub use agent::{AgentSnapshot, AgentSource, HotbarItem, Observation, Position};
pub use bridge::{Backend, Bridge, ViewerStatus};
pub use capture::{CaptureOutcome, CaptureResponse, CompositedImage, DegradedReason, FrameBuffer};

/// Configuration for the capture pipeline
///
/// Every fixed parameter of the pipeline lives here. The defaults match the
/// wire contract remote controllers expect: a 640x360 JPEG at quality 90,
/// four-chunk view radius, 1.6 unit eye height.
///
/// # Examples
///
/// ```
/// let cfg = povbridge::BridgeConfig::default();
/// assert_eq!(cfg.viewport.width, 640);
/// assert_eq!(cfg.jpeg_quality, 90);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Output frame dimensions (also the synthetic surface size)
    pub viewport: Viewport,
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
    /// Chunk window radius, in chunks
    pub view_distance: u32,
    /// Camera height above the agent's feet
    pub eye_height: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Delay between the agent spawning and renderer bootstrap
    #[serde(with = "millis")]
    pub spawn_delay: Duration,
    /// Delay between renderer construction and the session being marked ready
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Uniform color of the fallback frame
    pub fallback_color: [u8; 3],
    /// Clear color behind the world geometry
    pub sky_color: [u8; 3],
    /// Scene lights added at bootstrap
    pub lighting: LightingConfig,
    /// Optional directory of per-version block atlases
    pub asset_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            jpeg_quality: 90,
            view_distance: 4,
            eye_height: 1.6,
            near: 0.1,
            far: 1000.0,
            fov_degrees: 75.0,
            spawn_delay: Duration::from_millis(2000),
            settle_delay: Duration::from_millis(1500),
            fallback_color: [0, 0, 0],
            sky_color: [120, 167, 255],
            lighting: LightingConfig::default(),
            asset_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let cfg: BridgeConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.as_ref().display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport dimensions must be non-zero".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::ConfigError(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if !(self.near > 0.0 && self.near < self.far) {
            return Err(Error::ConfigError(format!(
                "clip planes must satisfy 0 < near < far, got {}/{}",
                self.near, self.far
            )));
        }
        if self.view_distance == 0 {
            return Err(Error::ConfigError("view_distance must be at least 1".into()));
        }
        Ok(())
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
        }
    }
}

/// Ambient + directional light parameters
///
/// Both lights are fixed so the world stays readable regardless of the
/// in-game time of day.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub directional_color: [f32; 3],
    pub directional_intensity: f32,
    /// Direction the light travels from (points toward the light source)
    pub directional_from: [f32; 3],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient_color: [0.8, 0.8, 0.8],
            ambient_intensity: 0.6,
            directional_color: [1.0, 1.0, 1.0],
            directional_intensity: 0.5,
            directional_from: [1.0, 1.0, 0.5],
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
