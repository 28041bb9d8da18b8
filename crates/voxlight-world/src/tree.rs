//! Tree growth from trunk seeds placed by the terrain generator.
//!
//! Trees grow breadth-first through air cells, crossing chunk boundaries the same
//! way light does: each node names its chunk by key, and growth into a chunk that
//! is not loaded yet waits on a deferred queue.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;
use voxlight_core::coords::ChunkCell;
use voxlight_core::types::{BlockSide, BlockType};

use crate::chunk_manager::ChunkMap;

/// Height at which growth turns from trunk into canopy.
const CANOPY_HEIGHT: u8 = 5;
/// Nodes at this height stop spreading.
const MAX_HEIGHT: u8 = 10;
/// Widest a canopy spreads from the trunk.
const MAX_WIDTH: u8 = 2;

/// One growth step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub cell: ChunkCell,
    pub height: u8,
    pub width: u8,
}

#[derive(Debug, Default)]
struct TreeQueues {
    live: VecDeque<TreeNode>,
    failed: VecDeque<TreeNode>,
}

/// Counters for one [`TreeGenerator::process`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub placed: usize,
    pub deferred: usize,
    pub stale: usize,
}

/// Shared tree growth solver.
#[derive(Debug, Default)]
pub struct TreeGenerator {
    queues: Mutex<TreeQueues>,
}

impl TreeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a tree at `cell` and mark its chunk for re-meshing.
    pub fn add_tree_node(&self, map: &ChunkMap, cell: ChunkCell, height: u8, width: u8) {
        map.with_chunk_mut(cell.chunk, |chunk| chunk.mark_for_geometry_calculation());
        self.queues.lock().live.push_back(TreeNode {
            cell,
            height,
            width,
        });
    }

    /// Grow every queued node.
    pub fn process(&self, map: &ChunkMap) -> TreeStats {
        let mut queues = self.queues.lock();
        let mut stats = TreeStats::default();

        while let Some(node) = queues.live.pop_front() {
            if !map.contains(node.cell.chunk) {
                stats.stale += 1;
                continue;
            }

            let height = node.height.saturating_add(1);
            let mut deferred = false;

            for side in BlockSide::ALL {
                let horizontal = !matches!(side, BlockSide::Top | BlockSide::Bottom);
                if side == BlockSide::Bottom
                    || (height < CANOPY_HEIGHT && side != BlockSide::Top)
                    || (horizontal && node.width > MAX_WIDTH)
                {
                    continue;
                }

                let width = if horizontal {
                    node.width + 1
                } else {
                    node.width
                };
                let target = node.cell.neighbor(side);
                let grown = map.with_loaded_chunk_mut(target.chunk, |chunk| {
                    if chunk.block_type(target.local) != BlockType::Air {
                        return false;
                    }
                    let block = if height > CANOPY_HEIGHT {
                        BlockType::TreeLeaves
                    } else {
                        BlockType::Wood
                    };
                    chunk.set_voxel(target.local, block);
                    chunk.mark_for_save();
                    true
                });

                match grown {
                    Some(true) => {
                        stats.placed += 1;
                        if height < MAX_HEIGHT {
                            queues.live.push_back(TreeNode {
                                cell: target,
                                height,
                                width,
                            });
                        }
                    }
                    Some(false) => {}
                    None => deferred = true,
                }
            }

            if deferred {
                stats.deferred += 1;
                queues.failed.push_back(node);
            }
        }

        if stats != TreeStats::default() {
            trace!(
                placed = stats.placed,
                deferred = stats.deferred,
                stale = stats.stale,
                "Tree queue drained"
            );
        }
        stats
    }

    /// Move every deferred node back onto the live queue.
    pub fn retry_deferred(&self) -> usize {
        let mut queues = self.queues.lock();
        let queues = &mut *queues;
        let moved = queues.failed.len();
        queues.live.extend(queues.failed.drain(..));
        moved
    }

    /// Live and deferred queue lengths.
    pub fn queue_lengths(&self) -> (usize, usize) {
        let queues = self.queues.lock();
        (queues.live.len(), queues.failed.len())
    }

    pub fn clear(&self) {
        *self.queues.lock() = TreeQueues::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use voxlight_core::coords::{ChunkPos, LocalPos};

    fn air_chunk(pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        chunk.mark_loaded();
        chunk
    }

    fn block(map: &ChunkMap, cell: ChunkCell) -> BlockType {
        map.with_chunk(cell.chunk, |chunk| chunk.block_type(cell.local))
            .unwrap()
    }

    #[test]
    fn trunk_then_canopy() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(air_chunk(origin));
        let trees = TreeGenerator::new();

        let base = LocalPos::new(8, 0, 8);
        map.with_chunk_mut(origin, |c| c.set_voxel(base, BlockType::Wood));
        trees.add_tree_node(&map, ChunkCell::new(origin, base), 1, 0);
        let stats = trees.process(&map);
        assert!(stats.placed > 0);

        // Heights 2..=5 are trunk, above is canopy.
        for y in 1..=4 {
            assert_eq!(
                block(&map, ChunkCell::new(origin, LocalPos::new(8, y, 8))),
                BlockType::Wood,
                "y = {y}"
            );
        }
        for y in 5..=9 {
            assert_eq!(
                block(&map, ChunkCell::new(origin, LocalPos::new(8, y, 8))),
                BlockType::TreeLeaves,
                "y = {y}"
            );
        }
        assert_eq!(
            block(&map, ChunkCell::new(origin, LocalPos::new(8, 10, 8))),
            BlockType::Air
        );
        // Nothing sprouts sideways from the low trunk.
        assert_eq!(
            block(&map, ChunkCell::new(origin, LocalPos::new(9, 1, 8))),
            BlockType::Air
        );
        // Canopy spreads no further than three cells from the trunk.
        assert_eq!(
            block(&map, ChunkCell::new(origin, LocalPos::new(12, 6, 8))),
            BlockType::Air
        );
        assert!(map.with_chunk(origin, Chunk::should_save).unwrap());
    }

    #[test]
    fn growth_never_replaces_blocks() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        let mut chunk = air_chunk(origin);
        chunk.set_voxel(LocalPos::new(8, 2, 8), BlockType::Stone);
        map.insert(chunk);
        let trees = TreeGenerator::new();

        trees.add_tree_node(&map, ChunkCell::new(origin, LocalPos::new(8, 0, 8)), 1, 0);
        trees.process(&map);

        assert_eq!(
            block(&map, ChunkCell::new(origin, LocalPos::new(8, 1, 8))),
            BlockType::Wood
        );
        assert_eq!(
            block(&map, ChunkCell::new(origin, LocalPos::new(8, 2, 8))),
            BlockType::Stone
        );
        assert_eq!(
            block(&map, ChunkCell::new(origin, LocalPos::new(8, 3, 8))),
            BlockType::Air
        );
    }

    #[test]
    fn growth_into_missing_chunk_waits() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(air_chunk(origin));
        let trees = TreeGenerator::new();

        trees.add_tree_node(&map, ChunkCell::new(origin, LocalPos::new(4, 13, 4)), 1, 0);
        trees.process(&map);
        assert_eq!(trees.queue_lengths(), (0, 1));

        let above = ChunkPos::new(0, 1, 0);
        map.insert(air_chunk(above));
        assert_eq!(trees.retry_deferred(), 1);
        trees.process(&map);

        assert_eq!(
            block(&map, ChunkCell::new(above, LocalPos::new(4, 0, 4))),
            BlockType::Wood
        );
        assert_eq!(trees.queue_lengths(), (0, 0));
    }
}
