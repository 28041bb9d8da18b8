//! Core voxel types.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Block type stored in every chunk cell.
///
/// The discriminants are the integers written to persisted chunk files and to
/// network payloads, so they must never be reordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    /// Empty space
    #[default]
    Air = 0,
    /// Stone block
    Stone = 1,
    /// Dirt block
    Dirt = 2,
    /// Sand block
    Sand = 3,
    /// Coal ore block
    Coal = 4,
    /// Torch, a solid block that emits torchlight
    Torch = 5,
    /// Tree trunk block
    Wood = 6,
    /// Tree canopy block
    TreeLeaves = 7,
    /// Water block
    Water = 8,
    /// Sentinel, never stored in a loaded chunk
    None = 9,
}

impl BlockType {
    /// Number of block types that own a row in the texture atlas
    /// (every type except `Air` and `None`).
    pub const TEXTURED_COUNT: usize = 8;

    /// All block types in discriminant order.
    pub const ALL: [Self; 10] = [
        Self::Air,
        Self::Stone,
        Self::Dirt,
        Self::Sand,
        Self::Coal,
        Self::Torch,
        Self::Wood,
        Self::TreeLeaves,
        Self::Water,
        Self::None,
    ];

    /// Returns true for the cells light and meshing treat as see-through.
    #[inline]
    pub const fn is_transparent(self) -> bool {
        matches!(self, Self::Air | Self::Water)
    }

    /// Returns true for opaque blocks.
    #[inline]
    pub const fn is_solid(self) -> bool {
        !self.is_transparent() && !matches!(self, Self::None)
    }

    /// Returns true if this block seeds torchlight.
    #[inline]
    pub const fn is_light_source(self) -> bool {
        matches!(self, Self::Torch)
    }

    /// Returns true if this block produces mesh faces.
    #[inline]
    pub const fn is_visible(self) -> bool {
        !matches!(self, Self::Air | Self::None)
    }

    /// Row of this block type in the texture atlas.
    #[inline]
    pub const fn texture_row(self) -> Option<usize> {
        if self.is_visible() {
            Some(self as usize - 1)
        } else {
            None
        }
    }

    /// Integer value used by persisted files and wire payloads.
    #[inline]
    pub const fn to_i32(self) -> i32 {
        self as i32
    }
}

/// Decodes a stored or transmitted cell value. `None` is rejected since it can
/// never be written into a chunk.
impl TryFrom<i32> for BlockType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .filter(|block| *block != Self::None)
            .ok_or_else(|| Error::InvalidData(format!("unknown block type {value}")))
    }
}

/// One of the six faces of a block.
///
/// The order is also the column order of the texture atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockSide {
    /// Facing +Y
    Top = 0,
    /// Facing -Y
    Bottom = 1,
    /// Facing -X
    Left = 2,
    /// Facing +X
    Right = 3,
    /// Facing -Z
    Front = 4,
    /// Facing +Z
    Back = 5,
}

impl BlockSide {
    /// All six faces in atlas order.
    pub const ALL: [Self; 6] = [
        Self::Top,
        Self::Bottom,
        Self::Left,
        Self::Right,
        Self::Front,
        Self::Back,
    ];

    /// The face pointing the other way.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }

    /// Unit step in block coordinates.
    #[inline]
    pub const fn offset(self) -> IVec3 {
        match self {
            Self::Top => IVec3::new(0, 1, 0),
            Self::Bottom => IVec3::new(0, -1, 0),
            Self::Left => IVec3::new(-1, 0, 0),
            Self::Right => IVec3::new(1, 0, 0),
            Self::Front => IVec3::new(0, 0, -1),
            Self::Back => IVec3::new(0, 0, 1),
        }
    }

    /// Outward face normal.
    #[inline]
    pub fn normal(self) -> Vec3 {
        self.offset().as_vec3()
    }

    /// Column of this face in the texture atlas.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A single chunk cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VoxelBlock {
    /// The block type
    pub block_type: BlockType,
}

impl VoxelBlock {
    /// Air cell
    pub const AIR: Self = Self::new(BlockType::Air);

    /// Create a new cell of the given type
    #[inline]
    pub const fn new(block_type: BlockType) -> Self {
        Self { block_type }
    }
}
