use super::light::{shade, Light};
use crate::assets::{tile_uv, BlockPalette};
use crate::gl::Vertex;
use crate::world_view::{ChunkColumn, CHUNK_SIZE};
use glam::Vec3;

struct Face {
    offset: [i32; 3],
    /// Bottom-left, bottom-right, top-right, top-left as seen from outside
    corners: [[f32; 3]; 4],
}

const FACES: [Face; 6] = [
    Face {
        offset: [1, 0, 0],
        corners: [[1.0, 0.0, 1.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0]],
    },
    Face {
        offset: [-1, 0, 0],
        corners: [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]],
    },
    Face {
        offset: [0, 1, 0],
        corners: [[0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
    },
    Face {
        offset: [0, -1, 0],
        corners: [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
    },
    Face {
        offset: [0, 0, 1],
        corners: [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]],
    },
    Face {
        offset: [0, 0, -1],
        corners: [[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
    },
];

/// Triangulate one column in world space.
///
/// Faces between two solid blocks of the same column are skipped; faces on
/// the column boundary are always emitted.
pub fn build_column_mesh(column: &ChunkColumn, palette: &BlockPalette, lights: &[Light]) -> Vec<Vertex> {
    let base_x = column.pos.x * CHUNK_SIZE;
    let base_z = column.pos.z * CHUNK_SIZE;
    let face_light: Vec<Vec3> = FACES
        .iter()
        .map(|f| shade(lights, Vec3::new(f.offset[0] as f32, f.offset[1] as f32, f.offset[2] as f32)))
        .collect();

    let mut out = Vec::new();
    for layer in 0..column.height as i32 {
        let y = column.min_y + layer;
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let id = column.block(x, y, z);
                if palette.is_air(id) {
                    continue;
                }
                let tint = palette.tint(id);
                let (uv_min, uv_max) = tile_uv(palette.tile(id));
                let uvs = [
                    [uv_min[0], uv_max[1]],
                    [uv_max[0], uv_max[1]],
                    [uv_max[0], uv_min[1]],
                    [uv_min[0], uv_min[1]],
                ];

                for (face, light) in FACES.iter().zip(&face_light) {
                    let (nx, ny, nz) = (x + face.offset[0], y + face.offset[1], z + face.offset[2]);
                    let inside = (0..CHUNK_SIZE).contains(&nx) && (0..CHUNK_SIZE).contains(&nz);
                    if inside && !palette.is_air(column.block(nx, ny, nz)) {
                        continue;
                    }
                    let color = [
                        tint[0] as f32 / 255.0 * light.x,
                        tint[1] as f32 / 255.0 * light.y,
                        tint[2] as f32 / 255.0 * light.z,
                        1.0,
                    ];
                    let corner = |i: usize| Vertex {
                        position: [
                            (base_x + x) as f32 + face.corners[i][0],
                            y as f32 + face.corners[i][1],
                            (base_z + z) as f32 + face.corners[i][2],
                        ],
                        uv: uvs[i],
                        color,
                    };
                    out.extend([corner(0), corner(1), corner(2), corner(0), corner(2), corner(3)]);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::block;
    use crate::world_view::ChunkPos;

    fn lights() -> Vec<Light> {
        vec![
            Light::ambient([0.8; 3], 0.6),
            Light::directional([1.0; 3], 0.5, [0.0, 1.0, 0.0]),
        ]
    }

    #[test]
    fn lone_block_has_six_faces() {
        let mut col = ChunkColumn::empty(ChunkPos::new(0, 0), 0, 4);
        col.set_block(5, 1, 5, block::STONE);
        let mesh = build_column_mesh(&col, &BlockPalette::for_version("1.20.4"), &lights());
        assert_eq!(mesh.len(), 36);
    }

    #[test]
    fn shared_face_inside_column_is_culled() {
        let mut col = ChunkColumn::empty(ChunkPos::new(2, -1), 0, 4);
        col.set_block(5, 1, 5, block::STONE);
        col.set_block(5, 2, 5, block::DIRT);
        let mesh = build_column_mesh(&col, &BlockPalette::for_version("1.20.4"), &lights());
        assert_eq!(mesh.len(), 60);
        // world-space placement
        assert!(mesh.iter().all(|v| v.position[0] >= 37.0 && v.position[0] <= 38.0));
        assert!(mesh.iter().all(|v| v.position[2] >= -11.0 && v.position[2] <= -10.0));
    }

    #[test]
    fn boundary_faces_are_kept() {
        let mut col = ChunkColumn::empty(ChunkPos::new(0, 0), 0, 1);
        col.set_block(0, 0, 0, block::STONE);
        col.set_block(1, 0, 0, block::STONE);
        let mesh = build_column_mesh(&col, &BlockPalette::for_version("1.20.4"), &lights());
        assert_eq!(mesh.len(), 10 * 6);
    }

    #[test]
    fn top_faces_are_brighter_than_bottom() {
        let mut col = ChunkColumn::empty(ChunkPos::new(0, 0), 0, 3);
        col.set_block(3, 1, 3, block::STONE);
        let mesh = build_column_mesh(&col, &BlockPalette::for_version("1.20.4"), &lights());
        // face order: +X, -X, +Y, -Y, ...
        let top = mesh[12].color[0];
        let bottom = mesh[18].color[0];
        assert!(top > bottom);
    }
}
