//! Version-dependent block assets.
//!
//! Block ids are stable inside this crate; what changes between game versions
//! is how they are named (the 1.13 "flattening" renamed most blocks) and
//! which texture atlas is used. Unknown versions fall back to the newest
//! naming so a renderer can always be constructed.

use crate::{Error, Result};
use image::{ImageOutputFormat, Luma, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;

/// Edge length of one atlas tile, in pixels.
pub const TILE_SIZE: u32 = 16;
/// Tiles per atlas row and column.
pub const ATLAS_TILES: u32 = 4;

pub mod block {
    pub const AIR: u16 = crate::world_view::AIR;
    pub const STONE: u16 = 1;
    pub const GRASS: u16 = 2;
    pub const DIRT: u16 = 3;
    pub const COBBLESTONE: u16 = 4;
    pub const PLANKS: u16 = 5;
    pub const LOG: u16 = 6;
    pub const LEAVES: u16 = 7;
    pub const SAND: u16 = 8;
    pub const WATER: u16 = 9;
    pub const BEDROCK: u16 = 10;
    pub const GRAVEL: u16 = 11;
}

struct BlockDef {
    legacy: &'static str,
    flattened: &'static str,
    tint: [u8; 3],
    tile: u32,
}

const BLOCKS: [BlockDef; 12] = [
    BlockDef { legacy: "air", flattened: "air", tint: [0, 0, 0], tile: 0 },
    BlockDef { legacy: "stone", flattened: "stone", tint: [125, 125, 125], tile: 1 },
    BlockDef { legacy: "grass", flattened: "grass_block", tint: [95, 159, 53], tile: 2 },
    BlockDef { legacy: "dirt", flattened: "dirt", tint: [134, 96, 67], tile: 3 },
    BlockDef { legacy: "cobblestone", flattened: "cobblestone", tint: [110, 110, 110], tile: 4 },
    BlockDef { legacy: "planks", flattened: "oak_planks", tint: [162, 130, 78], tile: 5 },
    BlockDef { legacy: "log", flattened: "oak_log", tint: [102, 81, 50], tile: 6 },
    BlockDef { legacy: "leaves", flattened: "oak_leaves", tint: [60, 120, 40], tile: 7 },
    BlockDef { legacy: "sand", flattened: "sand", tint: [219, 207, 163], tile: 8 },
    BlockDef { legacy: "water", flattened: "water", tint: [47, 67, 244], tile: 9 },
    BlockDef { legacy: "bedrock", flattened: "bedrock", tint: [60, 60, 60], tile: 10 },
    BlockDef { legacy: "gravel", flattened: "gravel", tint: [136, 126, 126], tile: 11 },
];

/// Newest naming scheme, used for unrecognized versions.
pub const LATEST_VERSION: &str = "1.20.4";

/// Block naming and tinting for one game version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPalette {
    version: String,
    flattened: bool,
}

impl BlockPalette {
    pub fn for_version(version: &str) -> Self {
        match parse_minor(version) {
            Some(minor) => Self {
                version: version.to_string(),
                flattened: minor >= 13,
            },
            None => {
                log::warn!(
                    "unrecognized game version '{}', using {} block assets",
                    version,
                    LATEST_VERSION
                );
                Self {
                    version: LATEST_VERSION.to_string(),
                    flattened: true,
                }
            }
        }
    }

    /// Version whose assets are actually used
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_flattened(&self) -> bool {
        self.flattened
    }

    pub fn name(&self, id: u16) -> Option<&'static str> {
        BLOCKS
            .get(id as usize)
            .map(|b| if self.flattened { b.flattened } else { b.legacy })
    }

    /// Reverse lookup, accepting an optional `minecraft:` namespace
    pub fn id(&self, name: &str) -> Option<u16> {
        let name = name.strip_prefix("minecraft:").unwrap_or(name);
        BLOCKS
            .iter()
            .position(|b| (if self.flattened { b.flattened } else { b.legacy }) == name)
            .map(|i| i as u16)
    }

    /// Base color multiplied into the grayscale atlas tile
    pub fn tint(&self, id: u16) -> [u8; 3] {
        BLOCKS.get(id as usize).map_or([255, 0, 255], |b| b.tint)
    }

    /// Atlas tile index
    pub fn tile(&self, id: u16) -> u32 {
        BLOCKS.get(id as usize).map_or(0, |b| b.tile)
    }

    pub fn is_air(&self, id: u16) -> bool {
        id == block::AIR
    }
}

/// `"1.12.2"` -> `12`; `None` for anything that is not a 1.x version string.
fn parse_minor(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    if parts.next()? != "1" {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Texture coordinates of a tile as (min, max), v growing downward
pub fn tile_uv(tile: u32) -> ([f32; 2], [f32; 2]) {
    let step = 1.0 / ATLAS_TILES as f32;
    let (col, row) = ((tile % ATLAS_TILES) as f32, (tile / ATLAS_TILES) as f32);
    ([col * step, row * step], [(col + 1.0) * step, (row + 1.0) * step])
}

/// Locates atlas images on disk, synthesizing one when none is installed.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    dir: Option<PathBuf>,
}

impl AssetStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Encoded PNG atlas for the palette's version.
    pub fn atlas_png(&self, palette: &BlockPalette) -> Result<Vec<u8>> {
        if let Some(dir) = &self.dir {
            let path = dir.join(palette.version()).join("blocks.png");
            if path.is_file() {
                log::info!("loading block atlas from {}", path.display());
                return std::fs::read(&path)
                    .map_err(|e| Error::InitializationError(format!("{}: {}", path.display(), e)));
            }
            log::debug!("no atlas at {}, synthesizing", path.display());
        }
        encode_png(&synthetic_atlas())
    }
}

/// Deterministic grayscale atlas; blocks get their color from the tint.
pub fn synthetic_atlas() -> RgbaImage {
    let size = TILE_SIZE * ATLAS_TILES;
    RgbaImage::from_fn(size, size, |x, y| {
        let tile = (y / TILE_SIZE) * ATLAS_TILES + x / TILE_SIZE;
        let (lx, ly) = (x % TILE_SIZE, y % TILE_SIZE);
        let Luma([l]) = texel(tile, lx, ly);
        // darker rim so block edges stay visible
        let edge = lx == 0 || ly == 0 || lx == TILE_SIZE - 1 || ly == TILE_SIZE - 1;
        let l = if edge { l.saturating_sub(40) } else { l };
        Rgba([l, l, l, 255])
    })
}

fn texel(tile: u32, x: u32, y: u32) -> Luma<u8> {
    let mut h = tile
        .wrapping_mul(0x9E37_79B9)
        .wrapping_add(x.wrapping_mul(0x85EB_CA6B))
        .wrapping_add(y.wrapping_mul(0xC2B2_AE35));
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    Luma([200 + (h % 56) as u8])
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img.clone()).write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(out.into_inner())
}
