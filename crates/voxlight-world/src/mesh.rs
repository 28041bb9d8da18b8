//! Per-chunk triangle meshes handed to the rendering and physics collaborators.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use voxlight_core::constants::MAX_LIGHT;
use voxlight_core::coords::{ChunkPos, LocalPos};
use voxlight_core::types::{BlockSide, BlockType};

use crate::light::{sunlight_of, torchlight_of};

/// Columns in the texture atlas, one per face direction.
pub const ATLAS_COLUMNS: usize = 6;

/// Two triangles over the four face corners.
pub const FACE_INDICES: [u16; 6] = [0, 1, 2, 1, 3, 2];

/// One mesh vertex as uploaded to the GPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshVertex {
    /// Chunk-local position
    pub position: Vec3,
    /// Outward face normal
    pub normal: Vec3,
    /// Red is torchlight, green is sunlight, both in `[0, 1]`
    pub color: [f32; 4],
    /// Atlas texture coordinate
    pub uv: Vec2,
}

/// A growable triangle list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

impl ChunkMesh {
    /// Create an empty mesh
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Drop all geometry, keeping the allocations.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of emitted quads.
    pub fn face_count(&self) -> usize {
        self.indices.len() / FACE_INDICES.len()
    }

    /// Emit the quad for face `side` of `cell`, lit by the packed `light` byte of
    /// the cell it faces.
    ///
    /// Returns false when the 16-bit index space is exhausted.
    pub fn push_face(
        &mut self,
        cell: LocalPos,
        side: BlockSide,
        block_type: BlockType,
        light: u8,
    ) -> bool {
        let Ok(base) = u16::try_from(self.vertices.len()) else {
            return false;
        };
        if base.checked_add(3).is_none() {
            return false;
        }

        let origin = cell.to_ivec3().as_vec3();
        let normal = side.normal();
        let color = light_color(light);

        for (offset, corner_uv) in face_corners(side) {
            self.vertices.push(MeshVertex {
                position: origin + Vec3::from_array(offset),
                normal,
                color,
                uv: texture_coord(side, block_type, Vec2::from_array(corner_uv)),
            });
        }
        self.indices.extend(FACE_INDICES.iter().map(|i| base + i));
        true
    }
}

/// Corner offsets and their unit UVs for each face, in vertex order.
pub const fn face_corners(side: BlockSide) -> [([f32; 3], [f32; 2]); 4] {
    match side {
        BlockSide::Top => [
            ([0.0, 1.0, 0.0], [0.0, 0.0]),
            ([0.0, 1.0, 1.0], [0.0, 1.0]),
            ([1.0, 1.0, 0.0], [1.0, 0.0]),
            ([1.0, 1.0, 1.0], [1.0, 1.0]),
        ],
        BlockSide::Bottom => [
            ([0.0, 0.0, 0.0], [0.0, 0.0]),
            ([1.0, 0.0, 0.0], [1.0, 0.0]),
            ([0.0, 0.0, 1.0], [0.0, 1.0]),
            ([1.0, 0.0, 1.0], [1.0, 1.0]),
        ],
        BlockSide::Left => [
            ([0.0, 0.0, 1.0], [0.0, 1.0]),
            ([0.0, 1.0, 1.0], [0.0, 0.0]),
            ([0.0, 0.0, 0.0], [1.0, 1.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0]),
        ],
        BlockSide::Right => [
            ([1.0, 0.0, 0.0], [0.0, 1.0]),
            ([1.0, 1.0, 0.0], [0.0, 0.0]),
            ([1.0, 0.0, 1.0], [1.0, 1.0]),
            ([1.0, 1.0, 1.0], [1.0, 0.0]),
        ],
        BlockSide::Front => [
            ([0.0, 0.0, 0.0], [0.0, 1.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0]),
            ([1.0, 0.0, 0.0], [1.0, 1.0]),
            ([1.0, 1.0, 0.0], [1.0, 0.0]),
        ],
        BlockSide::Back => [
            ([1.0, 0.0, 1.0], [0.0, 1.0]),
            ([1.0, 1.0, 1.0], [0.0, 0.0]),
            ([0.0, 0.0, 1.0], [1.0, 1.0]),
            ([0.0, 1.0, 1.0], [1.0, 0.0]),
        ],
    }
}

/// Atlas UV for `corner` (unit square) of `side` on a block of `block_type`.
///
/// The atlas has one column per face and one row per textured block type.
/// Untextured types map to the first row.
pub fn texture_coord(side: BlockSide, block_type: BlockType, corner: Vec2) -> Vec2 {
    let quad = Vec2::new(
        1.0 / ATLAS_COLUMNS as f32,
        1.0 / BlockType::TEXTURED_COUNT as f32,
    );
    let row = block_type.texture_row().unwrap_or(0) as f32;
    Vec2::new(
        quad.x * (side.index() as f32 + corner.x),
        quad.y * (row + corner.y),
    )
}

/// Vertex color for a packed light byte.
pub fn light_color(light: u8) -> [f32; 4] {
    let max = f32::from(MAX_LIGHT);
    [
        f32::from(torchlight_of(light)) / max,
        f32::from(sunlight_of(light)) / max,
        0.0,
        1.0,
    ]
}

bitflags! {
    /// Which meshes of a chunk should register with the collision system.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionMode: u8 {
        /// Register the opaque terrain mesh.
        const OPAQUE = 0b0000_0001;
        /// Register the water mesh.
        const WATER  = 0b0000_0010;
    }
}

impl CollisionMode {
    /// Collision registration for a mesh pair; empty meshes are skipped.
    pub fn for_meshes(opaque: &ChunkMesh, water: &ChunkMesh) -> Self {
        let mut mode = Self::empty();
        mode.set(Self::OPAQUE, !opaque.is_empty());
        mode.set(Self::WATER, !water.is_empty());
        mode
    }
}

/// Consumer of finished chunk meshes.
///
/// Implemented by the rendering/physics host. Only called from the thread that
/// drives [`crate::World::render_pending`].
pub trait MeshSink {
    /// Replace the visual and collision representation of `chunk`.
    fn upload(
        &mut self,
        chunk: ChunkPos,
        opaque: &ChunkMesh,
        water: &ChunkMesh,
        collision: CollisionMode,
    );

    /// Drop every representation of an unloaded chunk.
    fn remove(&mut self, chunk: ChunkPos);
}
