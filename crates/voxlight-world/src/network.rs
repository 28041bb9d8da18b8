//! Wire codec for chunk synchronisation messages.
//!
//! Messages are bincode-encoded with big-endian fixed-width integers, so a
//! payload is a `u32` opcode (the variant index) followed by its fields: origins as
//! three `f32`, block positions as three `i32`, block types as `i32`. Block arrays
//! carry exactly `CHUNK_VOLUME` values in x, y, z nested order with no length
//! prefix. Framing and reliability belong to the transport.

use std::fmt;

use bincode::Options;
use glam::{IVec3, Vec3};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use voxlight_core::constants::CHUNK_VOLUME;
use voxlight_core::types::{BlockType, VoxelBlock};
use voxlight_core::{Error, Result};

/// Identifies a connected peer; assigned by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

/// Full block array of one chunk as wire integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkBlocks(pub Vec<i32>);

impl ChunkBlocks {
    pub fn from_blocks(blocks: &[VoxelBlock]) -> Self {
        Self(blocks.iter().map(|b| b.block_type.to_i32()).collect())
    }

    /// Convert back to cells, rejecting unknown block types.
    pub fn to_blocks(&self) -> Result<Vec<VoxelBlock>> {
        self.0
            .iter()
            .map(|&value| BlockType::try_from(value).map(VoxelBlock::new))
            .collect()
    }
}

impl Serialize for ChunkBlocks {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.len() != CHUNK_VOLUME {
            return Err(serde::ser::Error::custom(format!(
                "chunk payload has {} cells, expected {CHUNK_VOLUME}",
                self.0.len()
            )));
        }
        let mut tuple = serializer.serialize_tuple(CHUNK_VOLUME)?;
        for value in &self.0 {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for ChunkBlocks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BlocksVisitor;

        impl<'de> Visitor<'de> for BlocksVisitor {
            type Value = ChunkBlocks;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{CHUNK_VOLUME} block type integers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<ChunkBlocks, A::Error> {
                let mut values = Vec::with_capacity(CHUNK_VOLUME);
                for index in 0..CHUNK_VOLUME {
                    let value = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index, &self))?;
                    values.push(value);
                }
                Ok(ChunkBlocks(values))
            }
        }

        deserializer.deserialize_tuple(CHUNK_VOLUME, BlocksVisitor)
    }
}

/// Chunk synchronisation messages. Variant order is the wire opcode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// Client asks for a chunk's blocks.
    RequestChunk { origin: [f32; 3] },
    /// Server answers with the full block array.
    SendChunk {
        origin: [f32; 3],
        blocks: ChunkBlocks,
    },
    /// Client asks the server to break a block.
    RequestHit { origin: [f32; 3], block: [i32; 3] },
    /// Client asks the server to place a block.
    RequestAdd {
        origin: [f32; 3],
        block: [i32; 3],
        block_type: i32,
    },
    /// Server tells every client a single cell changed.
    SendChunkUpdate {
        origin: [f32; 3],
        block: [i32; 3],
        block_type: i32,
    },
}

impl NetworkMessage {
    /// World-space chunk origin every message carries.
    pub fn origin(&self) -> Vec3 {
        match self {
            Self::RequestChunk { origin }
            | Self::SendChunk { origin, .. }
            | Self::RequestHit { origin, .. }
            | Self::RequestAdd { origin, .. }
            | Self::SendChunkUpdate { origin, .. } => Vec3::from_array(*origin),
        }
    }

    /// Chunk-local block position for single-cell messages.
    pub fn block(&self) -> Option<IVec3> {
        match self {
            Self::RequestHit { block, .. }
            | Self::RequestAdd { block, .. }
            | Self::SendChunkUpdate { block, .. } => Some(IVec3::from_array(*block)),
            Self::RequestChunk { .. } | Self::SendChunk { .. } => None,
        }
    }
}

/// Who a message produced by the world should go to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// The authoritative server.
    Server,
    /// One peer.
    Peer(PeerId),
    /// Every connected client.
    Broadcast,
}

/// A message waiting for the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub message: NetworkMessage,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

/// Encode a message to its wire bytes.
pub fn encode(message: &NetworkMessage) -> Result<Vec<u8>> {
    options()
        .serialize(message)
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a message from its wire bytes.
pub fn decode(data: &[u8]) -> Result<NetworkMessage> {
    options()
        .deserialize(data)
        .map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlight_core::coords::LocalPos;

    #[test]
    fn request_chunk_layout() {
        let msg = NetworkMessage::RequestChunk {
            origin: [16.0, -32.0, 0.0],
        };
        let bytes = encode(&msg).unwrap();

        assert_eq!(bytes.len(), 4 + 12);
        assert_eq!(&bytes[..4], &0_u32.to_be_bytes());
        assert_eq!(&bytes[4..8], &16.0_f32.to_be_bytes());
        assert_eq!(&bytes[8..12], &(-32.0_f32).to_be_bytes());
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn send_chunk_is_big_endian_xyz_order() {
        let mut blocks = vec![VoxelBlock::AIR; CHUNK_VOLUME];
        blocks[LocalPos::new(0, 0, 1).to_index()] = VoxelBlock::new(BlockType::Stone);
        blocks[LocalPos::new(1, 0, 0).to_index()] = VoxelBlock::new(BlockType::Torch);
        let msg = NetworkMessage::SendChunk {
            origin: [0.0, 0.0, 0.0],
            blocks: ChunkBlocks::from_blocks(&blocks),
        };
        let bytes = encode(&msg).unwrap();

        assert_eq!(bytes.len(), 4 + 12 + CHUNK_VOLUME * 4);
        assert_eq!(&bytes[..4], &1_u32.to_be_bytes());
        let payload = &bytes[16..];
        assert_eq!(&payload[4..8], &1_i32.to_be_bytes());
        assert_eq!(&payload[256 * 4..256 * 4 + 4], &5_i32.to_be_bytes());

        let NetworkMessage::SendChunk { blocks: decoded, .. } = decode(&bytes).unwrap() else {
            panic!("wrong message type");
        };
        assert_eq!(decoded.to_blocks().unwrap(), blocks);
    }

    #[test]
    fn update_carries_block_and_type() {
        let msg = NetworkMessage::SendChunkUpdate {
            origin: [-16.0, 0.0, 48.0],
            block: [3, 4, 5],
            block_type: BlockType::Coal.to_i32(),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(bytes.len(), 4 + 12 + 12 + 4);
        assert_eq!(&bytes[..4], &4_u32.to_be_bytes());
        assert_eq!(&bytes[28..32], &4_i32.to_be_bytes());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.block(), Some(IVec3::new(3, 4, 5)));
        assert_eq!(decoded.origin(), Vec3::new(-16.0, 0.0, 48.0));
    }

    #[test]
    fn short_chunk_payload_is_rejected() {
        let msg = NetworkMessage::SendChunk {
            origin: [0.0; 3],
            blocks: ChunkBlocks(vec![0; 10]),
        };
        assert!(encode(&msg).is_err());

        let full = NetworkMessage::SendChunk {
            origin: [0.0; 3],
            blocks: ChunkBlocks(vec![0; CHUNK_VOLUME]),
        };
        let bytes = encode(&full).unwrap();
        assert!(decode(&bytes[..bytes.len() - 4]).is_err());
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let mut values = vec![0; CHUNK_VOLUME];
        values[7] = 42;
        assert!(matches!(
            ChunkBlocks(values).to_blocks(),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn none_sentinel_is_rejected() {
        let mut values = vec![0; CHUNK_VOLUME];
        values[3] = BlockType::None.to_i32();
        assert!(matches!(
            ChunkBlocks(values).to_blocks(),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&NetworkMessage::RequestHit {
            origin: [0.0; 3],
            block: [1, 2, 3],
        })
        .unwrap();
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }
}
