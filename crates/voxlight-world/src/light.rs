//! Breadth-first torchlight propagation and removal across chunk boundaries.
//!
//! Light values are packed into one byte per cell: the low nibble holds
//! torchlight, the high nibble sunlight.
//!
//! Tasks carry a chunk key, never a chunk reference. Every dequeued task
//! re-resolves its chunk through the [`ChunkMap`]; a task whose chunk is gone is
//! dropped, and a task whose neighbour chunk is not loaded yet is parked on a
//! deferred queue until [`LightManager::retry_deferred`] is called.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;
use voxlight_core::constants::MAX_LIGHT;
use voxlight_core::coords::ChunkCell;
use voxlight_core::types::{BlockSide, BlockType};

use crate::chunk_manager::ChunkMap;

/// Torchlight stored in a packed light byte.
#[inline]
pub const fn torchlight_of(light: u8) -> u8 {
    light & 0x0F
}

/// Sunlight stored in a packed light byte.
#[inline]
pub const fn sunlight_of(light: u8) -> u8 {
    (light >> 4) & 0x0F
}

/// Pack sunlight and torchlight into one byte.
#[inline]
pub const fn pack_light(sunlight: u8, torchlight: u8) -> u8 {
    ((sunlight & 0x0F) << 4) | (torchlight & 0x0F)
}

/// Additive task: flood outward from a lit cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightNode {
    pub cell: ChunkCell,
}

/// Subtractive task: clear light that was fed by a cell whose level was `level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightRemovalNode {
    pub cell: ChunkCell,
    pub level: u8,
}

/// Counters for one [`LightManager::process`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightStats {
    pub removed: usize,
    pub propagated: usize,
    pub deferred: usize,
    pub stale: usize,
}

/// Queue lengths, live and deferred.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightQueueLengths {
    pub light: usize,
    pub removal: usize,
    pub deferred_light: usize,
    pub deferred_removal: usize,
}

#[derive(Debug, Default)]
struct LightQueues {
    light: VecDeque<LightNode>,
    removal: VecDeque<LightRemovalNode>,
    failed_light: VecDeque<LightNode>,
    failed_removal: VecDeque<LightRemovalNode>,
}

enum RemovalStep {
    Cleared(u8),
    Repropagate,
    Nothing,
}

/// Shared torchlight solver.
///
/// Lock order is queues first, then one chunk at a time. Callers must not hold a
/// chunk lock when calling into the manager.
#[derive(Debug, Default)]
pub struct LightManager {
    queues: Mutex<LightQueues>,
}

impl LightManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a propagation seed and mark its chunk for re-meshing.
    pub fn add_light_node(&self, map: &ChunkMap, cell: ChunkCell) {
        map.with_chunk_mut(cell.chunk, |chunk| chunk.mark_for_geometry_calculation());
        self.queues.lock().light.push_back(LightNode { cell });
    }

    /// Enqueue a removal seed and mark its chunk for re-meshing.
    pub fn add_light_removal_node(&self, map: &ChunkMap, cell: ChunkCell, level: u8) {
        map.with_chunk_mut(cell.chunk, |chunk| chunk.mark_for_geometry_calculation());
        self.queues
            .lock()
            .removal
            .push_back(LightRemovalNode { cell, level });
    }

    /// Drain the removal queue, then the propagation queue.
    pub fn process(&self, map: &ChunkMap) -> LightStats {
        let mut queues = self.queues.lock();
        let mut stats = LightStats::default();

        while let Some(node) = queues.removal.pop_front() {
            if !map.contains(node.cell.chunk) {
                stats.stale += 1;
                continue;
            }

            let mut deferred = false;
            for side in BlockSide::ALL {
                let neighbor = node.cell.neighbor(side);
                let step = map.with_loaded_chunk_mut(neighbor.chunk, |chunk| {
                    let level = chunk.torchlight(neighbor.local);
                    if level != 0 && level < node.level {
                        chunk.set_torchlight(neighbor.local, 0);
                        RemovalStep::Cleared(level)
                    } else if level >= node.level {
                        RemovalStep::Repropagate
                    } else {
                        RemovalStep::Nothing
                    }
                });

                match step {
                    Some(RemovalStep::Cleared(level)) => {
                        stats.removed += 1;
                        queues.removal.push_back(LightRemovalNode {
                            cell: neighbor,
                            level,
                        });
                    }
                    Some(RemovalStep::Repropagate) => {
                        queues.light.push_back(LightNode { cell: neighbor });
                    }
                    Some(RemovalStep::Nothing) => {}
                    None => deferred = true,
                }
            }

            if deferred {
                stats.deferred += 1;
                queues.failed_removal.push_back(node);
            }
        }

        while let Some(node) = queues.light.pop_front() {
            let Some(level) = map.with_chunk(node.cell.chunk, |chunk| {
                chunk.torchlight(node.cell.local)
            }) else {
                stats.stale += 1;
                continue;
            };

            let mut deferred = false;
            for side in BlockSide::ALL {
                let neighbor = node.cell.neighbor(side);
                let spread = map.with_loaded_chunk_mut(neighbor.chunk, |chunk| {
                    let block = chunk.block_type(neighbor.local);
                    let current = chunk.torchlight(neighbor.local);
                    if !block.is_transparent() || current + 2 > level {
                        return false;
                    }
                    let next = attenuate(level, block);
                    next > current && chunk.set_torchlight(neighbor.local, next)
                });

                match spread {
                    Some(true) => {
                        stats.propagated += 1;
                        queues.light.push_back(LightNode { cell: neighbor });
                    }
                    Some(false) => {}
                    None => deferred = true,
                }
            }

            if deferred {
                stats.deferred += 1;
                queues.failed_light.push_back(node);
            }
        }

        if stats != LightStats::default() {
            trace!(
                removed = stats.removed,
                propagated = stats.propagated,
                deferred = stats.deferred,
                stale = stats.stale,
                "Light queues drained"
            );
        }
        stats
    }

    /// Move every deferred task back onto its live queue.
    ///
    /// Returns the number of tasks moved.
    pub fn retry_deferred(&self) -> usize {
        let mut queues = self.queues.lock();
        let queues = &mut *queues;
        let moved = queues.failed_light.len() + queues.failed_removal.len();
        queues.light.extend(queues.failed_light.drain(..));
        queues.removal.extend(queues.failed_removal.drain(..));
        moved
    }

    pub fn queue_lengths(&self) -> LightQueueLengths {
        let queues = self.queues.lock();
        LightQueueLengths {
            light: queues.light.len(),
            removal: queues.removal.len(),
            deferred_light: queues.failed_light.len(),
            deferred_removal: queues.failed_removal.len(),
        }
    }

    /// Forget every queued task.
    pub fn clear(&self) {
        *self.queues.lock() = LightQueues::default();
    }
}

/// Light one hop away from a cell at `level`; water absorbs twice as much.
#[inline]
fn attenuate(level: u8, into: BlockType) -> u8 {
    let loss = if into == BlockType::Water { 2 } else { 1 };
    level.saturating_sub(loss).min(MAX_LIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use voxlight_core::coords::{ChunkPos, LocalPos};

    fn loaded_air_chunk(pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        chunk.mark_loaded();
        chunk
    }

    fn place(map: &ChunkMap, light: &LightManager, cell: ChunkCell, block: BlockType) {
        let edit = map
            .with_chunk_mut(cell.chunk, |chunk| chunk.set_block_data(cell.local, block))
            .unwrap();
        for seed in edit.propagate {
            light.add_light_node(map, seed);
        }
        if let Some((cell, level)) = edit.removal {
            light.add_light_removal_node(map, cell, level);
        }
        light.process(map);
    }

    fn torch(map: &ChunkMap, cell: ChunkCell) -> u8 {
        map.with_chunk(cell.chunk, |chunk| chunk.torchlight(cell.local))
            .unwrap()
    }

    #[test]
    fn nibble_packing() {
        let packed = pack_light(9, 4);
        assert_eq!(sunlight_of(packed), 9);
        assert_eq!(torchlight_of(packed), 4);
        assert_eq!(pack_light(15, 15), 0xFF);
    }

    #[test]
    fn torch_light_falls_off_by_distance() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(loaded_air_chunk(origin));
        let light = LightManager::new();

        place(
            &map,
            &light,
            ChunkCell::new(origin, LocalPos::new(8, 8, 8)),
            BlockType::Torch,
        );

        for (x, expected) in [(8, 15), (7, 14), (6, 13), (5, 12), (0, 7)] {
            let cell = ChunkCell::new(origin, LocalPos::new(x, 8, 8));
            assert_eq!(torch(&map, cell), expected, "x = {x}");
        }
        let diagonal = ChunkCell::new(origin, LocalPos::new(10, 11, 6));
        assert_eq!(torch(&map, diagonal), 15 - 7);
    }

    #[test]
    fn light_never_increases_along_a_hop() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(loaded_air_chunk(origin));
        let light = LightManager::new();
        place(
            &map,
            &light,
            ChunkCell::new(origin, LocalPos::new(3, 12, 9)),
            BlockType::Torch,
        );

        map.with_chunk(origin, |chunk| {
            for local in LocalPos::all() {
                let level = chunk.torchlight(local);
                assert!(level <= MAX_LIGHT);
                for side in BlockSide::ALL {
                    if local.has_local_neighbor(side) {
                        let other = chunk.torchlight(local.wrapped_neighbor(side));
                        assert!(level.abs_diff(other) <= 1 || level == 0 || other == 0);
                    }
                }
            }
        })
        .unwrap();
    }

    #[test]
    fn removing_torch_clears_light() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(loaded_air_chunk(origin));
        let light = LightManager::new();
        let cell = ChunkCell::new(origin, LocalPos::new(8, 8, 8));

        place(&map, &light, cell, BlockType::Torch);
        place(&map, &light, cell, BlockType::Air);

        map.with_chunk(origin, |chunk| {
            assert!(LocalPos::all().all(|local| chunk.torchlight(local) == 0));
        })
        .unwrap();
    }

    #[test]
    fn independent_source_survives_removal() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(loaded_air_chunk(origin));
        let light = LightManager::new();
        let first = ChunkCell::new(origin, LocalPos::new(4, 8, 8));
        let second = ChunkCell::new(origin, LocalPos::new(12, 8, 8));

        place(&map, &light, first, BlockType::Torch);
        place(&map, &light, second, BlockType::Torch);
        place(&map, &light, first, BlockType::Air);

        assert_eq!(torch(&map, second), 15);
        assert_eq!(torch(&map, ChunkCell::new(origin, LocalPos::new(11, 8, 8))), 14);
        // The old torch position is now lit by the second torch only.
        assert_eq!(torch(&map, first), 15 - 8);
        assert_eq!(torch(&map, ChunkCell::new(origin, LocalPos::new(2, 8, 8))), 15 - 10);
    }

    #[test]
    fn water_absorbs_two_levels() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        let mut chunk = loaded_air_chunk(origin);
        chunk.set_voxel(LocalPos::new(9, 8, 8), BlockType::Water);
        map.insert(chunk);
        let light = LightManager::new();

        place(
            &map,
            &light,
            ChunkCell::new(origin, LocalPos::new(8, 8, 8)),
            BlockType::Torch,
        );

        assert_eq!(torch(&map, ChunkCell::new(origin, LocalPos::new(9, 8, 8))), 13);
        assert_eq!(torch(&map, ChunkCell::new(origin, LocalPos::new(7, 8, 8))), 14);
    }

    #[test]
    fn missing_neighbor_defers_until_retry() {
        let map = ChunkMap::new();
        let origin = ChunkPos::new(0, 0, 0);
        map.insert(loaded_air_chunk(origin));
        let light = LightManager::new();

        place(
            &map,
            &light,
            ChunkCell::new(origin, LocalPos::new(1, 8, 8)),
            BlockType::Torch,
        );
        assert!(light.queue_lengths().deferred_light > 0);

        let left = ChunkPos::new(-1, 0, 0);
        map.insert(loaded_air_chunk(left));
        assert!(light.retry_deferred() > 0);
        light.process(&map);

        assert_eq!(torch(&map, ChunkCell::new(left, LocalPos::new(15, 8, 8))), 13);
        assert_eq!(torch(&map, ChunkCell::new(left, LocalPos::new(14, 8, 8))), 12);
    }

    #[test]
    fn stale_tasks_are_dropped() {
        let map = ChunkMap::new();
        let light = LightManager::new();
        let ghost = ChunkCell::new(ChunkPos::new(5, 5, 5), LocalPos::new(0, 0, 0));
        light.add_light_node(&map, ghost);
        light.add_light_removal_node(&map, ghost, 7);

        let stats = light.process(&map);
        assert_eq!(stats.stale, 2);
        assert_eq!(light.queue_lengths(), LightQueueLengths::default());
    }
}
