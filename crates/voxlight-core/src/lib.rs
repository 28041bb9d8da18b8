//! Core types for the Voxlight voxel world.
//!
//! This crate provides the foundational types shared by the world crate:
//! - Block types and face directions
//! - Coordinate systems (world, chunk, local)
//! - Common error types

pub mod coords;
pub mod error;
pub mod types;

pub use coords::{world_to_chunk_origin, ChunkCell, ChunkPos, LocalPos, WorldPos};
pub use error::{Error, Result};
pub use types::{BlockSide, BlockType, VoxelBlock};

/// Engine-wide constants
pub mod constants {
    /// Size of a chunk in blocks per axis
    pub const CHUNK_SIZE: usize = 16;
    /// Chunk extent along X
    pub const SIZE_X: usize = CHUNK_SIZE;
    /// Chunk extent along Y
    pub const SIZE_Y: usize = CHUNK_SIZE;
    /// Chunk extent along Z
    pub const SIZE_Z: usize = CHUNK_SIZE;
    /// Total blocks in a chunk (16^3)
    pub const CHUNK_VOLUME: usize = SIZE_X * SIZE_Y * SIZE_Z;
    /// Bits needed to represent position within a chunk (4 bits for 0-15)
    pub const CHUNK_BITS: u32 = 4;
    /// Brightest value a light nibble can hold
    pub const MAX_LIGHT: u8 = 15;
}
