//! Chunk map with spatial indexing and cross-chunk cell lookups.

use std::sync::Arc;

use glam::Vec3;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use voxlight_core::constants::CHUNK_SIZE;
use voxlight_core::coords::{ChunkPos, LocalPos};
use voxlight_core::types::{BlockSide, BlockType};

use crate::chunk::Chunk;

/// Shared handle to one chunk.
pub type ChunkHandle = Arc<Mutex<Chunk>>;

/// Read access to cells of chunks other than the one asking.
///
/// Returns `None` when the chunk is not available; callers fall back or defer.
pub trait ChunkLookup {
    /// Block type and packed light byte of one cell.
    fn cell_at(&self, chunk: ChunkPos, local: LocalPos) -> Option<(BlockType, u8)>;
}

/// All live chunks indexed by position.
///
/// The map lock is never held while a chunk lock is taken: lookups clone the
/// handle, release the map, then lock the chunk.
#[derive(Default)]
pub struct ChunkMap {
    chunks: RwLock<HashMap<ChunkPos, ChunkHandle>>,
}

impl ChunkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a chunk exists at the given position.
    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.chunks.read().contains_key(&pos)
    }

    /// Get the number of live chunks.
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Check if no chunks are live.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Insert or replace a chunk at its position.
    pub fn insert(&self, chunk: Chunk) -> ChunkHandle {
        let pos = chunk.pos();
        let handle = Arc::new(Mutex::new(chunk));
        self.chunks.write().insert(pos, Arc::clone(&handle));
        handle
    }

    /// Remove a chunk at the given position.
    pub fn remove(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.chunks.write().remove(&pos)
    }

    /// Drop every chunk.
    pub fn clear(&self) -> Vec<ChunkPos> {
        self.chunks.write().drain().map(|(pos, _)| pos).collect()
    }

    pub fn get(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.chunks.read().get(&pos).cloned()
    }

    /// The chunk owning a world-space point.
    pub fn get_chunk_by_position(&self, position: Vec3) -> Option<ChunkHandle> {
        self.get(ChunkPos::from_world(position))
    }

    /// Get all live chunk positions.
    pub fn positions(&self) -> Vec<ChunkPos> {
        self.chunks.read().keys().copied().collect()
    }

    /// Snapshot of every handle, for iteration without holding the map lock.
    pub fn handles(&self) -> Vec<(ChunkPos, ChunkHandle)> {
        self.chunks
            .read()
            .iter()
            .map(|(pos, handle)| (*pos, Arc::clone(handle)))
            .collect()
    }

    /// Execute a function with read access to a chunk.
    ///
    /// Returns `None` if the chunk doesn't exist.
    pub fn with_chunk<F, R>(&self, pos: ChunkPos, f: F) -> Option<R>
    where
        F: FnOnce(&Chunk) -> R,
    {
        let handle = self.get(pos)?;
        let chunk = handle.lock();
        Some(f(&chunk))
    }

    /// Execute a function with write access to a chunk.
    ///
    /// Returns `None` if the chunk doesn't exist.
    pub fn with_chunk_mut<F, R>(&self, pos: ChunkPos, f: F) -> Option<R>
    where
        F: FnOnce(&mut Chunk) -> R,
    {
        let handle = self.get(pos)?;
        let mut chunk = handle.lock();
        Some(f(&mut chunk))
    }

    /// Like [`Self::with_chunk_mut`], but treats a chunk still waiting for its
    /// block data as missing.
    pub fn with_loaded_chunk_mut<F, R>(&self, pos: ChunkPos, f: F) -> Option<R>
    where
        F: FnOnce(&mut Chunk) -> R,
    {
        let handle = self.get(pos)?;
        let mut chunk = handle.lock();
        chunk.is_loaded().then(|| f(&mut chunk))
    }
}

impl ChunkLookup for ChunkMap {
    fn cell_at(&self, chunk: ChunkPos, local: LocalPos) -> Option<(BlockType, u8)> {
        let handle = self.get(chunk)?;
        let chunk = handle.lock();
        chunk
            .is_loaded()
            .then(|| (chunk.block_type(local), chunk.light_value(local)))
    }
}

impl std::fmt::Debug for ChunkMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkMap").field("len", &self.len()).finish()
    }
}

const FACE_CELLS: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Copy of the six cell layers that touch a chunk, taken from its neighbours.
///
/// Meshing reads neighbour cells through this snapshot so it never needs a second
/// chunk lock while the meshed chunk is locked.
#[derive(Debug, Clone)]
pub struct NeighborBorders {
    center: ChunkPos,
    faces: [Option<Vec<(BlockType, u8)>>; 6],
}

impl NeighborBorders {
    /// Capture the border layers around `center`, locking each neighbour in turn.
    pub fn capture(map: &ChunkMap, center: ChunkPos) -> Self {
        let faces = BlockSide::ALL.map(|side| {
            map.with_chunk(center.neighbor(side), |chunk| {
                if !chunk.is_loaded() {
                    return None;
                }
                let mut layer = Vec::with_capacity(FACE_CELLS);
                for a in 0..CHUNK_SIZE as u8 {
                    for b in 0..CHUNK_SIZE as u8 {
                        let local = face_cell(side, a, b);
                        layer.push((chunk.block_type(local), chunk.light_value(local)));
                    }
                }
                Some(layer)
            })
            .flatten()
        });

        Self { center, faces }
    }

    /// Number of neighbours that were available at capture time.
    pub fn available(&self) -> usize {
        self.faces.iter().filter(|face| face.is_some()).count()
    }
}

impl ChunkLookup for NeighborBorders {
    fn cell_at(&self, chunk: ChunkPos, local: LocalPos) -> Option<(BlockType, u8)> {
        let side = BlockSide::ALL
            .into_iter()
            .find(|side| self.center.neighbor(*side) == chunk)?;
        let slot = face_slot(side, local)?;
        self.faces[side.index()].as_ref().map(|layer| layer[slot])
    }
}

/// Cell `(a, b)` of the neighbour's layer facing back towards the centre chunk,
/// where `side` points from the centre to that neighbour.
fn face_cell(side: BlockSide, a: u8, b: u8) -> LocalPos {
    let last = (CHUNK_SIZE - 1) as u8;
    match side {
        BlockSide::Right => LocalPos::new(0, a, b),
        BlockSide::Left => LocalPos::new(last, a, b),
        BlockSide::Top => LocalPos::new(a, 0, b),
        BlockSide::Bottom => LocalPos::new(a, last, b),
        BlockSide::Back => LocalPos::new(a, b, 0),
        BlockSide::Front => LocalPos::new(a, b, last),
    }
}

/// Inverse of [`face_cell`]; `None` if `local` is not on that layer.
fn face_slot(side: BlockSide, local: LocalPos) -> Option<usize> {
    let last = (CHUNK_SIZE - 1) as u8;
    let (on_layer, a, b) = match side {
        BlockSide::Right => (local.x == 0, local.y, local.z),
        BlockSide::Left => (local.x == last, local.y, local.z),
        BlockSide::Top => (local.y == 0, local.x, local.z),
        BlockSide::Bottom => (local.y == last, local.x, local.z),
        BlockSide::Back => (local.z == 0, local.x, local.y),
        BlockSide::Front => (local.z == last, local.x, local.y),
    };
    on_layer.then(|| usize::from(a) * CHUNK_SIZE + usize::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        chunk.mark_loaded();
        chunk
    }

    #[test]
    fn insert_and_retrieve() {
        let map = ChunkMap::new();
        let pos = ChunkPos::new(1, 2, 3);
        map.insert(Chunk::new(pos));

        assert!(map.contains(pos));
        assert_eq!(map.len(), 1);
        assert_eq!(map.with_chunk(pos, Chunk::pos), Some(pos));
    }

    #[test]
    fn remove_chunk() {
        let map = ChunkMap::new();
        let pos = ChunkPos::new(1, 2, 3);
        map.insert(Chunk::new(pos));

        assert!(map.remove(pos).is_some());
        assert!(!map.contains(pos));
        assert!(map.is_empty());
        assert!(map.with_chunk(pos, |_| ()).is_none());
    }

    #[test]
    fn lookup_by_world_position_floors() {
        let map = ChunkMap::new();
        map.insert(Chunk::new(ChunkPos::new(-1, -1, -1)));

        assert!(map.get_chunk_by_position(Vec3::splat(-0.5)).is_some());
        assert!(map.get_chunk_by_position(Vec3::splat(0.5)).is_none());
    }

    #[test]
    fn unloaded_chunks_are_not_visible_to_lookups() {
        let map = ChunkMap::new();
        let pos = ChunkPos::new(0, 0, 0);
        map.insert(Chunk::new(pos));
        assert!(map.cell_at(pos, LocalPos::new(0, 0, 0)).is_none());
        assert!(map.with_loaded_chunk_mut(pos, |_| ()).is_none());

        map.with_chunk_mut(pos, Chunk::mark_loaded);
        assert_eq!(
            map.cell_at(pos, LocalPos::new(0, 0, 0)),
            Some((BlockType::Air, 0))
        );
    }

    #[test]
    fn face_slots_invert_face_cells() {
        for side in BlockSide::ALL {
            for a in 0..CHUNK_SIZE as u8 {
                for b in 0..CHUNK_SIZE as u8 {
                    let local = face_cell(side, a, b);
                    assert_eq!(
                        face_slot(side, local),
                        Some(usize::from(a) * CHUNK_SIZE + usize::from(b))
                    );
                }
            }
        }
    }

    #[test]
    fn borders_match_live_lookup() {
        let map = ChunkMap::new();
        let center = ChunkPos::new(0, 0, 0);
        let right = center.neighbor(BlockSide::Right);
        let mut neighbor = loaded(right);
        neighbor.set_voxel(LocalPos::new(0, 3, 4), BlockType::Stone);
        neighbor.set_torchlight(LocalPos::new(0, 5, 6), 9);
        map.insert(neighbor);

        let borders = NeighborBorders::capture(&map, center);
        assert_eq!(borders.available(), 1);

        for local in [LocalPos::new(0, 3, 4), LocalPos::new(0, 5, 6), LocalPos::new(0, 0, 0)] {
            assert_eq!(borders.cell_at(right, local), map.cell_at(right, local));
        }
        assert!(borders
            .cell_at(center.neighbor(BlockSide::Left), LocalPos::new(15, 0, 0))
            .is_none());
        // Only the touching layer is captured.
        assert!(borders.cell_at(right, LocalPos::new(1, 3, 4)).is_none());
    }
}
