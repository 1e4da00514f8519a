//! Agent state as seen from the game-protocol session.
//!
//! The protocol session itself (login, chunk streaming, entity bookkeeping)
//! lives outside this crate. It is consumed through [`AgentSource`], which
//! hands out immutable snapshots taken at call time.

use crate::chat::ChatInstruction;
use crate::world_view::ChunkSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// First window slot of the hotbar in the player inventory window.
pub const HOTBAR_WINDOW_START: u16 = 36;
/// Number of hotbar slots.
pub const HOTBAR_SLOTS: u8 = 9;

/// World-space position of the agent's feet
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One occupied hotbar slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotbarItem {
    pub name: String,
    pub count: u32,
    /// Hotbar index, 0..=8
    pub slot: u8,
}

/// Immutable view of the agent used to drive the camera and the HUD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub position: Position,
    /// Radians
    pub yaw: f32,
    /// Radians
    pub pitch: f32,
    /// 0..=20
    pub health: f32,
    /// 0..=20
    pub food: f32,
    /// Active hotbar index, 0..=8
    pub hotbar_slot: u8,
    pub hotbar: Vec<HotbarItem>,
}

impl AgentSnapshot {
    /// Build the hotbar from full inventory contents, keeping only items that
    /// sit in the hotbar window slots.
    pub fn hotbar_from_inventory(items: &[InventoryItem]) -> Vec<HotbarItem> {
        items
            .iter()
            .filter_map(|item| {
                let idx = item.slot.checked_sub(HOTBAR_WINDOW_START)?;
                (idx < u16::from(HOTBAR_SLOTS)).then(|| HotbarItem {
                    name: item.name.clone(),
                    count: item.count,
                    slot: idx as u8,
                })
            })
            .collect()
    }

    /// The item in hotbar slot `index`, if any
    pub fn hotbar_item(&self, index: u8) -> Option<&HotbarItem> {
        self.hotbar.iter().find(|i| i.slot == index)
    }
}

/// Item in the agent inventory window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub count: u32,
    /// Window slot index
    pub slot: u16,
}

/// Entity near the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Position,
    pub distance: f64,
}

/// Non-visual state snapshot exposed alongside the image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub position: Option<Position>,
    pub yaw: f32,
    pub pitch: f32,
    pub health: f32,
    pub food: f32,
    pub inventory: Vec<InventoryItem>,
    pub entities: Vec<NearbyEntity>,
    pub time: u32,
    pub game_mode: String,
}

/// Entities further away than this are left out of observations.
pub const ENTITY_RADIUS: f64 = 32.0;

impl Observation {
    /// Keep entities within [`ENTITY_RADIUS`] of `origin` and fill in distances.
    pub fn nearby_entities(
        origin: &Position,
        entities: impl IntoIterator<Item = (String, Position)>,
    ) -> Vec<NearbyEntity> {
        entities
            .into_iter()
            .filter_map(|(kind, position)| {
                let distance = origin.distance_to(&position);
                (distance < ENTITY_RADIUS).then_some(NearbyEntity {
                    kind,
                    position,
                    distance,
                })
            })
            .collect()
    }
}

/// Boundary to the external game-protocol session.
///
/// Implementations must be cheap to query; snapshots are taken once per
/// capture and never cached by the bridge.
pub trait AgentSource: Send + Sync {
    /// Whether the agent currently has a live entity in the world
    fn is_connected(&self) -> bool;

    /// Account name, if logged in
    fn username(&self) -> Option<String>;

    /// Protocol/game version identifier used to pick block assets
    fn version(&self) -> Option<String>;

    /// Current agent state, `None` when the entity does not exist
    fn snapshot(&self) -> Option<AgentSnapshot>;

    /// Full observation for remote controllers
    fn observation(&self) -> Option<Observation>;

    /// Streamed world data
    fn world(&self) -> Arc<dyn ChunkSource>;

    /// Chat lines received since the last call, oldest first
    fn take_chat(&self) -> Vec<ChatInstruction> {
        Vec::new()
    }
}
