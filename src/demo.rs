//! In-process stand-ins for the game-protocol session.
//!
//! Used by the binary when no external session is wired in, and by tests.

use crate::agent::{AgentSnapshot, AgentSource, InventoryItem, Observation, Position};
use crate::assets::block;
use crate::chat::{now_millis, ChatInstruction};
use crate::world_view::{ChunkColumn, ChunkPos, ChunkSource, CHUNK_SIZE};
use std::sync::{Arc, Mutex, MutexGuard};

/// Endless flat terrain with a tree in every third column.
#[derive(Debug, Clone, Copy)]
pub struct FlatWorld {
    /// Y of the grass layer; agents stand at `ground + 1`
    pub ground: i32,
    pub trees: bool,
}

impl Default for FlatWorld {
    fn default() -> Self {
        Self {
            ground: 63,
            trees: true,
        }
    }
}

const TRUNK: i32 = 4;

impl ChunkSource for FlatWorld {
    fn column(&self, pos: ChunkPos) -> Option<ChunkColumn> {
        let min_y = self.ground - 3;
        let mut col = ChunkColumn::empty(pos, min_y, 4 + TRUNK as u32 + 2);
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                col.set_block(x, min_y, z, block::BEDROCK);
                col.set_block(x, min_y + 1, z, block::STONE);
                col.set_block(x, min_y + 2, z, block::DIRT);
                col.set_block(x, self.ground, z, block::GRASS);
            }
        }
        if self.trees && (pos.x + pos.z).rem_euclid(3) == 0 {
            let (tx, tz) = (4, 4);
            for dy in 1..=TRUNK {
                col.set_block(tx, self.ground + dy, tz, block::LOG);
            }
            let crown = self.ground + TRUNK;
            for dx in -1..=1 {
                for dz in -1..=1 {
                    if dx != 0 || dz != 0 {
                        col.set_block(tx + dx, crown, tz + dz, block::LEAVES);
                    }
                }
            }
            col.set_block(tx, crown + 1, tz, block::LEAVES);
        }
        Some(col)
    }
}

#[derive(Debug, Clone)]
struct AgentState {
    connected: bool,
    position: Position,
    yaw: f32,
    pitch: f32,
    health: f32,
    food: f32,
    hotbar_slot: u8,
    inventory: Vec<InventoryItem>,
    entities: Vec<(String, Position)>,
    time: u32,
    game_mode: String,
    chat: Vec<ChatInstruction>,
}

/// Scriptable agent standing in a [`ChunkSource`] world.
pub struct SimulatedAgent {
    username: String,
    version: String,
    world: Arc<dyn ChunkSource>,
    state: Mutex<AgentState>,
}

impl SimulatedAgent {
    pub fn new(username: &str, world: Arc<dyn ChunkSource>) -> Self {
        Self {
            username: username.to_string(),
            version: crate::assets::LATEST_VERSION.to_string(),
            world,
            state: Mutex::new(AgentState {
                connected: true,
                position: Position::new(8.5, 64.0, 8.5),
                yaw: 0.0,
                pitch: 0.0,
                health: 20.0,
                food: 20.0,
                hotbar_slot: 0,
                inventory: vec![
                    InventoryItem {
                        name: "minecraft:wooden_pickaxe".into(),
                        count: 1,
                        slot: 36,
                    },
                    InventoryItem {
                        name: "minecraft:oak_log".into(),
                        count: 16,
                        slot: 37,
                    },
                ],
                entities: Vec::new(),
                time: 6000,
                game_mode: "survival".into(),
                chat: Vec::new(),
            }),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_position(&self, position: Position) {
        self.state().position = position;
    }

    pub fn set_look(&self, yaw: f32, pitch: f32) {
        let mut s = self.state();
        s.yaw = yaw;
        s.pitch = pitch;
    }

    pub fn set_vitals(&self, health: f32, food: f32) {
        let mut s = self.state();
        s.health = health;
        s.food = food;
    }

    pub fn select_slot(&self, slot: u8) {
        self.state().hotbar_slot = slot.min(crate::agent::HOTBAR_SLOTS - 1);
    }

    pub fn set_inventory(&self, items: Vec<InventoryItem>) {
        self.state().inventory = items;
    }

    pub fn add_entity(&self, kind: &str, position: Position) {
        self.state().entities.push((kind.to_string(), position));
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Receive a chat line as if `username` typed it in game.
    pub fn say(&self, username: &str, message: &str) {
        self.state().chat.push(ChatInstruction {
            username: username.to_string(),
            message: message.to_string(),
            timestamp: now_millis(),
        });
    }
}

impl AgentSource for SimulatedAgent {
    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn username(&self) -> Option<String> {
        Some(self.username.clone())
    }

    fn version(&self) -> Option<String> {
        Some(self.version.clone())
    }

    fn snapshot(&self) -> Option<AgentSnapshot> {
        let s = self.state();
        if !s.connected {
            return None;
        }
        Some(AgentSnapshot {
            position: s.position,
            yaw: s.yaw,
            pitch: s.pitch,
            health: s.health,
            food: s.food,
            hotbar_slot: s.hotbar_slot,
            hotbar: AgentSnapshot::hotbar_from_inventory(&s.inventory),
        })
    }

    fn observation(&self) -> Option<Observation> {
        let s = self.state();
        if !s.connected {
            return None;
        }
        Some(Observation {
            position: Some(s.position),
            yaw: s.yaw,
            pitch: s.pitch,
            health: s.health,
            food: s.food,
            inventory: s.inventory.clone(),
            entities: Observation::nearby_entities(&s.position, s.entities.clone()),
            time: s.time,
            game_mode: s.game_mode.clone(),
        })
    }

    fn world(&self) -> Arc<dyn ChunkSource> {
        self.world.clone()
    }

    fn take_chat(&self) -> Vec<ChatInstruction> {
        std::mem::take(&mut self.state().chat)
    }
}
