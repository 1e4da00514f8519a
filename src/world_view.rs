//! Streamed chunk window kept centered on the agent.
//!
//! The window is the square of columns within `radius` chunks of the center
//! column. [`WorldView::init`] loads the whole window and waits for it;
//! [`WorldView::update_position`] only schedules work and returns
//! immediately. Loads that finish after their column has left the window are
//! dropped instead of being forwarded to the renderer.

use crate::agent::Position;
use crate::{Error, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Width and depth of a chunk column, in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// Block id for empty space
pub const AIR: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Column containing the world position
    pub fn containing(pos: &Position) -> Self {
        Self {
            x: (pos.x.floor() as i32).div_euclid(CHUNK_SIZE),
            z: (pos.z.floor() as i32).div_euclid(CHUNK_SIZE),
        }
    }

    /// Chebyshev distance in chunks
    pub fn distance(&self, other: &ChunkPos) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }
}

/// One 16-wide column of blocks
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkColumn {
    pub pos: ChunkPos,
    /// World Y of the lowest stored layer
    pub min_y: i32,
    /// Number of stored layers
    pub height: u32,
    /// Block ids indexed `[layer][z][x]`
    pub blocks: Vec<u16>,
}

impl ChunkColumn {
    /// Column filled with air
    pub fn empty(pos: ChunkPos, min_y: i32, height: u32) -> Self {
        Self {
            pos,
            min_y,
            height,
            blocks: vec![AIR; (CHUNK_SIZE * CHUNK_SIZE) as usize * height as usize],
        }
    }

    fn index(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        let layer = y - self.min_y;
        if !(0..CHUNK_SIZE).contains(&x)
            || !(0..CHUNK_SIZE).contains(&z)
            || layer < 0
            || layer >= self.height as i32
        {
            return None;
        }
        Some(((layer * CHUNK_SIZE + z) * CHUNK_SIZE + x) as usize)
    }

    /// Whether `blocks` holds exactly one id per stored block.
    pub fn is_well_formed(&self) -> bool {
        self.blocks.len() == (CHUNK_SIZE * CHUNK_SIZE) as usize * self.height as usize
    }

    /// Block at local `x`/`z` and world `y`; air outside the column
    pub fn block(&self, x: i32, y: i32, z: i32) -> u16 {
        self.index(x, y, z)
            .and_then(|i| self.blocks.get(i).copied())
            .unwrap_or(AIR)
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: u16) {
        if let Some(slot) = self.index(x, y, z).and_then(|i| self.blocks.get_mut(i)) {
            *slot = id;
        }
    }
}

/// World data provider owned by the protocol session.
pub trait ChunkSource: Send + Sync {
    /// The column at `pos`, or `None` if it has not been received
    fn column(&self, pos: ChunkPos) -> Option<ChunkColumn>;
}

/// Change notifications delivered to the renderer
#[derive(Debug, Clone)]
pub enum WorldEvent {
    Load(Arc<ChunkColumn>),
    Unload(ChunkPos),
}

#[derive(Debug, Default)]
struct WindowState {
    wanted: HashSet<ChunkPos>,
    loaded: HashSet<ChunkPos>,
}

pub struct WorldView {
    source: Arc<dyn ChunkSource>,
    radius: i32,
    center: ChunkPos,
    state: Arc<Mutex<WindowState>>,
    events: UnboundedSender<WorldEvent>,
}

impl WorldView {
    /// Create a view and the event stream the renderer listens on.
    pub fn new(
        source: Arc<dyn ChunkSource>,
        radius: u32,
        center: &Position,
    ) -> (Self, UnboundedReceiver<WorldEvent>) {
        let (tx, rx) = unbounded_channel();
        let view = Self {
            source,
            radius: radius as i32,
            center: ChunkPos::containing(center),
            state: Arc::new(Mutex::new(WindowState::default())),
            events: tx,
        };
        (view, rx)
    }

    pub fn center(&self) -> ChunkPos {
        self.center
    }

    pub fn radius(&self) -> u32 {
        self.radius as u32
    }

    /// Columns forwarded to the renderer and still inside the window
    pub fn loaded_count(&self) -> usize {
        lock(&self.state).loaded.len()
    }

    /// Columns in the window around `center`, nearest first
    fn window(&self, center: ChunkPos) -> Vec<ChunkPos> {
        let mut out = Vec::with_capacity(((2 * self.radius + 1) * (2 * self.radius + 1)) as usize);
        for dx in -self.radius..=self.radius {
            for dz in -self.radius..=self.radius {
                out.push(ChunkPos::new(center.x + dx, center.z + dz));
            }
        }
        out.sort_by_key(|p| (p.distance(&center), *p));
        out
    }

    /// Load the full window around `center` and wait for every column.
    pub async fn init(&mut self, center: &Position) -> Result<()> {
        self.start_init(center).await
    }

    /// Re-center on `center` and return the initial load as a future that
    /// does not borrow the view.
    pub fn start_init(&mut self, center: &Position) -> impl Future<Output = Result<()>> + 'static {
        self.center = ChunkPos::containing(center);
        let window = self.window(self.center);
        lock(&self.state).wanted = window.iter().copied().collect();

        let source = self.source.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let center = self.center;
        async move {
            let loads = window.into_iter().map(|pos| {
                let source = source.clone();
                tokio::task::spawn_blocking(move || (pos, source.column(pos)))
            });

            let mut missing = 0usize;
            for joined in join_all(loads).await {
                let (pos, column) =
                    joined.map_err(|e| Error::WorldViewError(format!("chunk load task failed: {}", e)))?;
                match column {
                    Some(column) => {
                        if !forward(&state, &events, pos, column) {
                            return Err(Error::WorldViewError("renderer stopped listening for chunks".into()));
                        }
                    }
                    None => missing += 1,
                }
            }
            log::debug!(
                "world view: initial window around ({}, {}) loaded, {} columns not yet available",
                center.x,
                center.z,
                missing
            );
            Ok(())
        }
    }

    /// Re-center the window on `pos` without waiting for new columns.
    pub fn update_position(&mut self, pos: &Position) {
        let center = ChunkPos::containing(pos);
        if center == self.center {
            return;
        }
        self.center = center;
        let window = self.window(center);
        let wanted: HashSet<ChunkPos> = window.iter().copied().collect();

        let to_load: Vec<ChunkPos> = {
            let mut state = lock(&self.state);
            let stale: Vec<ChunkPos> = state.loaded.difference(&wanted).copied().collect();
            for p in stale {
                state.loaded.remove(&p);
                let _ = self.events.send(WorldEvent::Unload(p));
            }
            state.wanted = wanted;
            window
                .into_iter()
                .filter(|p| !state.loaded.contains(p))
                .collect()
        };
        log::debug!(
            "world view: re-centered on ({}, {}), {} columns scheduled",
            center.x,
            center.z,
            to_load.len()
        );

        for pos in to_load {
            let source = self.source.clone();
            let state = self.state.clone();
            let events = self.events.clone();
            let job = move || {
                if let Some(column) = source.column(pos) {
                    forward(&state, &events, pos, column);
                }
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(job);
                }
                Err(_) => job(),
            }
        }
    }
}

/// Send a finished load if its column is still wanted and not yet delivered.
/// Returns false once the receiver is gone.
fn forward(
    state: &Mutex<WindowState>,
    events: &UnboundedSender<WorldEvent>,
    pos: ChunkPos,
    column: ChunkColumn,
) -> bool {
    if !column.is_well_formed() {
        log::warn!(
            "world view: dropping column ({}, {}) with {} block ids for height {}",
            pos.x,
            pos.z,
            column.blocks.len(),
            column.height
        );
        return !events.is_closed();
    }
    let mut state = lock(state);
    if !state.wanted.contains(&pos) || !state.loaded.insert(pos) {
        return !events.is_closed();
    }
    if events.send(WorldEvent::Load(Arc::new(column))).is_err() {
        state.loaded.remove(&pos);
        return false;
    }
    true
}

fn lock(state: &Mutex<WindowState>) -> std::sync::MutexGuard<'_, WindowState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
