//! Chunked voxel world for Voxlight: terrain generation, light propagation,
//! tree growth, meshing, persistence and network synchronisation.

pub mod chunk;
pub mod chunk_manager;
pub mod generation;
pub mod layered_noise;
pub mod light;
pub mod mesh;
pub mod network;
pub mod storage;
pub mod streaming;
pub mod tree;
pub mod world;

pub use chunk::{Chunk, ChunkFlags, ChunkSource, LightEdit, LoadOutcome};
pub use chunk_manager::{ChunkHandle, ChunkLookup, ChunkMap, NeighborBorders};
pub use generation::{GeneratedChunk, TerrainConfig, TerrainGenerator};
pub use light::{LightManager, LightStats};
pub use mesh::{ChunkMesh, CollisionMode, MeshSink, MeshVertex};
pub use network::{NetworkMessage, Outgoing, PeerId, Recipient};
pub use storage::ChunkStore;
pub use streaming::WorldWorker;
pub use tree::{TreeGenerator, TreeStats};
pub use world::{
    visible_chunks, NetworkRole, ObserverId, TickReport, World, WorldConfig, WorldSignal,
    WorldStats,
};

/// World seed for procedural generation.
pub type WorldSeed = u64;
