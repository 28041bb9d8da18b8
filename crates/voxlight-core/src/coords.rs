//! Coordinate systems for the voxel world.
//!
//! Three spaces are used:
//! - [`WorldPos`]: integer block coordinates in the world.
//! - [`ChunkPos`]: chunk indices, i.e. the chunk origin divided by the chunk extent.
//! - [`LocalPos`]: cell coordinates inside one chunk, `0..CHUNK_SIZE` per axis.
//!
//! Conversions from world space always floor (arithmetic shift), never truncate,
//! so negative coordinates land in the correct chunk.

use crate::constants::{CHUNK_BITS, CHUNK_SIZE, SIZE_Y, SIZE_Z};
use crate::types::BlockSide;
use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Position within a chunk (0 to CHUNK_SIZE-1 per axis).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub _pad: u8,
}

impl LocalPos {
    /// Create a new local position
    #[inline]
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        debug_assert!((x as usize) < CHUNK_SIZE);
        debug_assert!((y as usize) < CHUNK_SIZE);
        debug_assert!((z as usize) < CHUNK_SIZE);
        Self { x, y, z, _pad: 0 }
    }

    /// Create a local position from signed coordinates, or `None` when any axis
    /// falls outside the chunk.
    #[inline]
    pub fn try_from_ivec3(v: IVec3) -> Option<Self> {
        let size = CHUNK_SIZE as i32;
        if (0..size).contains(&v.x) && (0..size).contains(&v.y) && (0..size).contains(&v.z) {
            Some(Self::new(v.x as u8, v.y as u8, v.z as u8))
        } else {
            None
        }
    }

    /// Convert to linear index for flat array storage
    #[inline]
    pub const fn to_index(self) -> usize {
        ((self.x as usize * SIZE_Y) + self.y as usize) * SIZE_Z + self.z as usize
    }

    /// Create from linear index
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        let z = (index % SIZE_Z) as u8;
        let y = ((index / SIZE_Z) % SIZE_Y) as u8;
        let x = (index / (SIZE_Y * SIZE_Z)) as u8;
        Self { x, y, z, _pad: 0 }
    }

    /// Iterate every cell of a chunk in x, y, z nested order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE).map(Self::from_index)
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x as i32, self.y as i32, self.z as i32)
    }

    /// Returns true if stepping towards `side` stays inside the chunk.
    #[inline]
    pub const fn has_local_neighbor(self, side: BlockSide) -> bool {
        let last = (CHUNK_SIZE - 1) as u8;
        match side {
            BlockSide::Left => self.x > 0,
            BlockSide::Right => self.x < last,
            BlockSide::Bottom => self.y > 0,
            BlockSide::Top => self.y < last,
            BlockSide::Front => self.z > 0,
            BlockSide::Back => self.z < last,
        }
    }

    /// The adjacent cell towards `side`, wrapped into the neighbouring chunk's
    /// local space when it crosses the boundary.
    #[inline]
    pub fn wrapped_neighbor(self, side: BlockSide) -> Self {
        let mask = (CHUNK_SIZE - 1) as i32;
        let v = self.to_ivec3() + side.offset();
        Self::new((v.x & mask) as u8, (v.y & mask) as u8, (v.z & mask) as u8)
    }
}

/// Chunk position in chunk coordinates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub _pad: i32,
}

impl ChunkPos {
    /// Create a new chunk position
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z, _pad: 0 }
    }

    /// Convert to world position (minimum corner of chunk)
    #[inline]
    pub const fn to_world_pos(self) -> WorldPos {
        WorldPos::new(
            self.x << CHUNK_BITS,
            self.y << CHUNK_BITS,
            self.z << CHUNK_BITS,
        )
    }

    /// World-space origin as a float vector.
    #[inline]
    pub fn origin(self) -> Vec3 {
        self.to_world_pos().to_vec3()
    }

    /// Chunk containing a world-space point.
    #[inline]
    pub fn from_world(position: Vec3) -> Self {
        WorldPos::from(position).chunk_pos()
    }

    /// Chunk whose origin is the given world-space vector.
    ///
    /// Non-aligned origins are floored to the containing chunk.
    #[inline]
    pub fn from_origin(origin: Vec3) -> Self {
        Self::from_world(origin)
    }

    /// The chunk sharing the face `side` with this one.
    #[inline]
    pub fn neighbor(self, side: BlockSide) -> Self {
        Self::from(self.to_ivec3() + side.offset())
    }

    /// Get the six neighboring chunk positions
    pub fn neighbors(self) -> [ChunkPos; 6] {
        BlockSide::ALL.map(|side| self.neighbor(side))
    }

    /// Stable textual identifier, `"{cx}_{cy}_{cz}"`.
    pub fn identifier(self) -> String {
        format!("{}_{}_{}", self.x, self.y, self.z)
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for ChunkPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// World position in block coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldPos {
    /// Create a new world position
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Get the chunk containing this position
    #[inline]
    pub const fn chunk_pos(self) -> ChunkPos {
        ChunkPos::new(
            self.x >> CHUNK_BITS,
            self.y >> CHUNK_BITS,
            self.z >> CHUNK_BITS,
        )
    }

    /// Get the local position within the chunk
    #[inline]
    pub const fn local_pos(self) -> LocalPos {
        let mask = (CHUNK_SIZE - 1) as i32;
        LocalPos::new(
            (self.x & mask) as u8,
            (self.y & mask) as u8,
            (self.z & mask) as u8,
        )
    }

    /// Split into chunk and local position
    #[inline]
    pub const fn split(self) -> (ChunkPos, LocalPos) {
        (self.chunk_pos(), self.local_pos())
    }

    /// Create from chunk and local position
    #[inline]
    pub const fn from_chunk_local(chunk: ChunkPos, local: LocalPos) -> Self {
        Self::new(
            (chunk.x << CHUNK_BITS) + local.x as i32,
            (chunk.y << CHUNK_BITS) + local.y as i32,
            (chunk.z << CHUNK_BITS) + local.z as i32,
        )
    }

    /// The adjacent block towards `side`.
    #[inline]
    pub fn offset(self, side: BlockSide) -> Self {
        Self::from(self.to_ivec3() + side.offset())
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }

    /// Convert to floating point Vec3
    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

impl From<Vec3> for WorldPos {
    fn from(v: Vec3) -> Self {
        Self::new(v.x.floor() as i32, v.y.floor() as i32, v.z.floor() as i32)
    }
}

impl From<IVec3> for WorldPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// A cell addressed by its owning chunk key and local coordinates.
///
/// Carries no reference to the chunk itself; the chunk is re-resolved through the
/// chunk map every time the cell is visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkCell {
    pub chunk: ChunkPos,
    pub local: LocalPos,
}

impl ChunkCell {
    /// Create a new cell reference
    #[inline]
    pub const fn new(chunk: ChunkPos, local: LocalPos) -> Self {
        Self { chunk, local }
    }

    /// The adjacent cell towards `side`, possibly in another chunk.
    #[inline]
    pub fn neighbor(self, side: BlockSide) -> Self {
        if self.local.has_local_neighbor(side) {
            Self::new(self.chunk, self.local.wrapped_neighbor(side))
        } else {
            Self::new(self.chunk.neighbor(side), self.local.wrapped_neighbor(side))
        }
    }

    /// World position of this cell
    #[inline]
    pub const fn world_pos(self) -> WorldPos {
        WorldPos::from_chunk_local(self.chunk, self.local)
    }
}

impl From<WorldPos> for ChunkCell {
    fn from(pos: WorldPos) -> Self {
        let (chunk, local) = pos.split();
        Self::new(chunk, local)
    }
}

/// Floor a world-space point to the origin of the chunk containing it.
#[inline]
pub fn world_to_chunk_origin(position: Vec3) -> IVec3 {
    ChunkPos::from_world(position).to_world_pos().to_ivec3()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_pos_index_roundtrip() {
        for (expected, pos) in LocalPos::all().enumerate() {
            assert_eq!(pos.to_index(), expected);
            assert_eq!(LocalPos::from_index(expected), pos);
        }
    }

    #[test]
    fn local_index_is_x_major() {
        assert_eq!(LocalPos::new(0, 0, 1).to_index(), 1);
        assert_eq!(LocalPos::new(0, 1, 0).to_index(), SIZE_Z);
        assert_eq!(LocalPos::new(1, 0, 0).to_index(), SIZE_Y * SIZE_Z);
    }

    #[test]
    fn world_pos_chunk_local_roundtrip() {
        let world = WorldPos::new(100, -50, 200);
        let (chunk, local) = world.split();
        let recovered = WorldPos::from_chunk_local(chunk, local);
        assert_eq!(world, recovered);
    }

    #[test]
    fn negative_world_pos_chunk() {
        let world = WorldPos::new(-1, -1, -1);
        let chunk = world.chunk_pos();
        assert_eq!(chunk, ChunkPos::new(-1, -1, -1));
        assert_eq!(world.local_pos(), LocalPos::new(15, 15, 15));
    }

    #[test]
    fn chunk_origin_floors_negative_points() {
        assert_eq!(
            world_to_chunk_origin(Vec3::new(-1.0, -1.0, -1.0)),
            IVec3::new(-16, -16, -16)
        );
        assert_eq!(
            world_to_chunk_origin(Vec3::new(-0.25, 15.9, 16.0)),
            IVec3::new(-16, 0, 16)
        );
    }

    #[test]
    fn chunk_origin_as_float() {
        let origin = ChunkPos::new(-2, 0, 3).origin();
        approx::assert_relative_eq!(origin.x, -32.0);
        approx::assert_relative_eq!(origin.z, 48.0);
    }

    #[test]
    fn cell_neighbor_crosses_chunk_boundary() {
        let cell = ChunkCell::new(ChunkPos::new(0, 0, 0), LocalPos::new(0, 5, 15));
        let left = cell.neighbor(BlockSide::Left);
        assert_eq!(left.chunk, ChunkPos::new(-1, 0, 0));
        assert_eq!(left.local, LocalPos::new(15, 5, 15));

        let back = cell.neighbor(BlockSide::Back);
        assert_eq!(back.chunk, ChunkPos::new(0, 0, 1));
        assert_eq!(back.local, LocalPos::new(0, 5, 0));

        let up = cell.neighbor(BlockSide::Top);
        assert_eq!(up.chunk, cell.chunk);
        assert_eq!(up.local, LocalPos::new(0, 6, 15));
    }

    #[test]
    fn cell_neighbor_matches_world_offset() {
        let cell = ChunkCell::new(ChunkPos::new(2, -1, 0), LocalPos::new(15, 0, 7));
        for side in BlockSide::ALL {
            let expected = ChunkCell::from(cell.world_pos().offset(side));
            assert_eq!(cell.neighbor(side), expected);
        }
    }

    #[test]
    fn identifier_uses_chunk_indices() {
        assert_eq!(ChunkPos::new(-1, 0, 12).identifier(), "-1_0_12");
    }

    #[test]
    fn try_from_ivec3_rejects_outside() {
        assert!(LocalPos::try_from_ivec3(IVec3::new(16, 0, 0)).is_none());
        assert!(LocalPos::try_from_ivec3(IVec3::new(0, -1, 0)).is_none());
        assert_eq!(
            LocalPos::try_from_ivec3(IVec3::new(3, 4, 5)),
            Some(LocalPos::new(3, 4, 5))
        );
    }
}
