//! Procedural terrain generation.

use glam::DVec3;
use rayon::prelude::*;
use voxlight_core::constants::{CHUNK_SIZE, CHUNK_VOLUME};
use voxlight_core::coords::{ChunkPos, LocalPos, WorldPos};
use voxlight_core::types::{BlockType, VoxelBlock};

use crate::layered_noise::LayeredNoise;
use crate::WorldSeed;

/// Smoothness of the sample that rescales the detail layer.
const SCALE_SMOOTHNESS: f64 = 55.33;
/// Smoothness of the sample that picks the detail octave count.
const OCTAVE_SMOOTHNESS: f64 = 111.33;
/// Smoothness of the sample that sets the height amplitude.
const AMPLITUDE_SMOOTHNESS: f64 = 193.33;
/// Base smoothness of the detail layer before rescaling.
const DETAIL_SMOOTHNESS: f64 = 444.33;

const MIN_DETAIL_OCTAVES: u32 = 16;
const MAX_DETAIL_OCTAVES: u32 = 32;

/// Depth below the surface that still uses topsoil strata.
const TOPSOIL_DEPTH: i32 = 10;

const STRATA_SMOOTHNESS: [f64; 3] = [111.13, 222.13, 333.13];
const CAVE_SMOOTHNESS: [f64; 3] = [77.13, 66.13, 55.13];
const CAVE_OCTAVES: u32 = 6;
const CAVE_THRESHOLD: f64 = 0.2;

/// Terrain generator configuration.
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Seed for noise generation.
    pub seed: WorldSeed,
    /// Sea level (Y coordinate). Air below it and above the surface fills with water.
    pub sea_level: i32,
    /// Maximum distance of the surface from sea level.
    pub height_band: f64,
    /// Noise value above which an exposed dirt cell sprouts a tree.
    pub tree_threshold: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sea_level: 0,
            height_band: 100.0,
            tree_threshold: 0.82,
        }
    }
}

/// Block data produced for one chunk.
#[derive(Debug, Clone)]
pub struct GeneratedChunk {
    /// Cells in local index order.
    pub blocks: Vec<VoxelBlock>,
    /// Cells that received a tree trunk and should be grown.
    pub tree_seeds: Vec<LocalPos>,
}

/// Procedural terrain generator using layered noise.
///
/// Every query is a pure function of the seed and the position.
#[derive(Debug, Clone)]
pub struct TerrainGenerator {
    config: TerrainConfig,
    noise: LayeredNoise,
}

impl TerrainGenerator {
    /// Create a new terrain generator with the given configuration.
    pub fn new(config: TerrainConfig) -> Self {
        let noise = LayeredNoise::new(config.seed);
        Self { config, noise }
    }

    /// Create a terrain generator with default configuration.
    pub fn with_seed(seed: WorldSeed) -> Self {
        Self::new(TerrainConfig {
            seed,
            ..Default::default()
        })
    }

    /// Get the terrain configuration.
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Reseed both noise sources.
    pub fn set_seed(&mut self, seed: WorldSeed) {
        self.config.seed = seed;
        self.noise.set_seed(seed);
    }

    /// Surface height of the column at world `(x, z)`.
    pub fn terrain_height(&self, x: f64, z: f64) -> i32 {
        let scale = self
            .noise
            .perlin_unit([x / SCALE_SMOOTHNESS, 0.5, z / SCALE_SMOOTHNESS]);
        let octave_mix = self
            .noise
            .perlin_unit([x / OCTAVE_SMOOTHNESS, 10.5, z / OCTAVE_SMOOTHNESS]);
        let amplitude = self
            .noise
            .perlin_unit([x / AMPLITUDE_SMOOTHNESS, 20.5, z / AMPLITUDE_SMOOTHNESS]);

        let octaves = (f64::from(MIN_DETAIL_OCTAVES) * (1.0 + octave_mix)) as u32;
        let octaves = octaves.clamp(MIN_DETAIL_OCTAVES, MAX_DETAIL_OCTAVES);

        let smoothness = DETAIL_SMOOTHNESS * (0.25 + scale);
        let detail = self
            .noise
            .perlin_octaves([x / smoothness, 30.5, z / smoothness], octaves);

        let height = detail * self.config.height_band * (0.5 + 0.5 * amplitude);
        self.config.sea_level + height.floor() as i32
    }

    /// Block type at `position` for a column whose surface is at `surface_height`.
    pub fn block_type(&self, position: DVec3, surface_height: i32) -> BlockType {
        let height_to_surface = f64::from(surface_height) - position.y;
        if height_to_surface < 0.0 {
            return BlockType::Air;
        }

        let [s1, s2, s3] = STRATA_SMOOTHNESS;
        let result = self.noise.perlin_unit([position.x / s1, position.y / s1, 0.5])
            * self.noise.perlin_unit([0.5, position.y / s2, position.z / s2])
            * self.noise.perlin_unit([position.x / s3, 0.5, position.z / s3]);

        if height_to_surface <= f64::from(TOPSOIL_DEPTH) {
            return if result > 0.2 {
                BlockType::Coal
            } else if result > 0.18 {
                BlockType::Stone
            } else if result > 0.16 {
                BlockType::Sand
            } else {
                BlockType::Dirt
            };
        }

        if result > 0.8 {
            BlockType::Coal
        } else {
            BlockType::Stone
        }
    }

    /// Carve `current` into air where the cave field is open.
    ///
    /// Air and water are never carved.
    pub fn cave_block_type(&self, position: DVec3, current: BlockType) -> BlockType {
        if current.is_transparent() {
            return current;
        }

        let [s1, s2, s3] = CAVE_SMOOTHNESS;
        let result = self
            .noise
            .simplex_unit([position.x / s1, position.y / s1, 0.5], CAVE_OCTAVES)
            * self
                .noise
                .simplex_unit([0.5, position.y / s2, position.z / s2], CAVE_OCTAVES)
            * self
                .noise
                .simplex_unit([position.x / s3, 0.5, position.z / s3], CAVE_OCTAVES);

        if result > CAVE_THRESHOLD {
            BlockType::Air
        } else {
            current
        }
    }

    /// Whether a tree trunk starts at `position`.
    pub fn should_place_tree(&self, position: DVec3) -> bool {
        let sample = self
            .noise
            .simplex_unit([position.x * 0.917, position.y * 0.113, position.z * 0.917], 1);
        sample > self.config.tree_threshold
    }

    /// Generate a chunk's block data at the given position.
    ///
    /// Passes run in a fixed order: terrain fill, water fill, cave carving, tree
    /// placement.
    pub fn generate_chunk(&self, pos: ChunkPos) -> GeneratedChunk {
        let mut blocks = vec![VoxelBlock::AIR; CHUNK_VOLUME];
        let origin = pos.to_world_pos();
        let mut surface = [[0_i32; CHUNK_SIZE]; CHUNK_SIZE];

        for (lx, row) in surface.iter_mut().enumerate() {
            for (lz, height) in row.iter_mut().enumerate() {
                let x = f64::from(origin.x + lx as i32);
                let z = f64::from(origin.z + lz as i32);
                *height = self.terrain_height(x, z);
            }
        }

        for local in LocalPos::all() {
            let world = world_point(pos, local);
            let height = surface[local.x as usize][local.z as usize];
            blocks[local.to_index()] = VoxelBlock::new(self.block_type(world, height));
        }

        for local in LocalPos::all() {
            let world_y = WorldPos::from_chunk_local(pos, local).y;
            let height = surface[local.x as usize][local.z as usize];
            let cell = &mut blocks[local.to_index()];
            if cell.block_type == BlockType::Air
                && world_y < self.config.sea_level
                && world_y > height
            {
                cell.block_type = BlockType::Water;
            }
        }

        for local in LocalPos::all() {
            let cell = &mut blocks[local.to_index()];
            cell.block_type = self.cave_block_type(world_point(pos, local), cell.block_type);
        }

        let mut tree_seeds = Vec::new();
        for local in LocalPos::all() {
            if local.y as usize + 1 >= CHUNK_SIZE {
                continue;
            }
            let world = WorldPos::from_chunk_local(pos, local);
            if world.y != surface[local.x as usize][local.z as usize] {
                continue;
            }
            let above = LocalPos::new(local.x, local.y + 1, local.z);
            if blocks[local.to_index()].block_type == BlockType::Dirt
                && blocks[above.to_index()].block_type == BlockType::Air
                && self.should_place_tree(world.to_vec3().as_dvec3())
            {
                blocks[local.to_index()].block_type = BlockType::Wood;
                tree_seeds.push(local);
            }
        }

        GeneratedChunk { blocks, tree_seeds }
    }

    /// Generate multiple chunks in parallel.
    ///
    /// Returns a vector of (position, block data) pairs.
    pub fn generate_chunks_parallel(&self, positions: &[ChunkPos]) -> Vec<(ChunkPos, GeneratedChunk)> {
        positions
            .par_iter()
            .map(|&pos| (pos, self.generate_chunk(pos)))
            .collect()
    }
}

fn world_point(chunk: ChunkPos, local: LocalPos) -> DVec3 {
    let world = WorldPos::from_chunk_local(chunk, local);
    DVec3::new(f64::from(world.x), f64::from(world.y), f64::from(world.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_deterministic() {
        let gen1 = TerrainGenerator::with_seed(12345);
        let gen2 = TerrainGenerator::with_seed(12345);

        // Same seed should produce same heights
        for x in -40..40 {
            for z in -40..40 {
                let (x, z) = (f64::from(x) * 3.0, f64::from(z) * 3.0);
                assert_eq!(gen1.terrain_height(x, z), gen2.terrain_height(x, z));
            }
        }

        let p = DVec3::new(-17.0, -30.0, 44.0);
        assert_eq!(gen1.block_type(p, 0), gen2.block_type(p, 0));
        assert_eq!(
            gen1.cave_block_type(p, BlockType::Stone),
            gen2.cave_block_type(p, BlockType::Stone)
        );
    }

    #[test]
    fn heights_stay_inside_band() {
        let gen = TerrainGenerator::with_seed(3);
        for x in -30..30 {
            for z in -30..30 {
                let h = gen.terrain_height(f64::from(x) * 17.0, f64::from(z) * 17.0);
                assert!(h.abs() <= 101, "height {h} outside band");
            }
        }
    }

    #[test]
    fn air_above_surface() {
        let gen = TerrainGenerator::with_seed(1);
        assert_eq!(gen.block_type(DVec3::new(0.0, 11.0, 0.0), 10), BlockType::Air);
        assert_ne!(gen.block_type(DVec3::new(0.0, 10.0, 0.0), 10), BlockType::Air);
    }

    #[test]
    fn deep_blocks_are_stone_or_coal() {
        let gen = TerrainGenerator::with_seed(8);
        for y in -60..-20 {
            let block = gen.block_type(DVec3::new(5.0, f64::from(y), -9.0), 0);
            assert!(matches!(block, BlockType::Stone | BlockType::Coal));
        }
    }

    #[test]
    fn caves_never_carve_air_or_water() {
        let gen = TerrainGenerator::with_seed(5);
        for i in -100..100 {
            let p = DVec3::new(f64::from(i) * 1.7, f64::from(i) * 0.9, f64::from(i) * -2.3);
            assert_eq!(gen.cave_block_type(p, BlockType::Air), BlockType::Air);
            assert_eq!(gen.cave_block_type(p, BlockType::Water), BlockType::Water);
            let carved = gen.cave_block_type(p, BlockType::Stone);
            assert!(matches!(carved, BlockType::Stone | BlockType::Air));
        }
    }

    #[test]
    fn chunk_above_terrain_is_empty() {
        let gen = TerrainGenerator::with_seed(42);
        // Y=20 means world Y 320-335, above any surface
        let chunk = gen.generate_chunk(ChunkPos::new(0, 20, 0));
        assert!(chunk.blocks.iter().all(|b| b.block_type == BlockType::Air));
        assert!(chunk.tree_seeds.is_empty());
    }

    #[test]
    fn chunk_far_below_has_no_topsoil_or_water() {
        let gen = TerrainGenerator::with_seed(42);
        // Y=-20 means world Y -320 to -305, below any surface
        let chunk = gen.generate_chunk(ChunkPos::new(0, -20, 0));
        assert!(chunk.blocks.iter().all(|b| matches!(
            b.block_type,
            BlockType::Stone | BlockType::Coal | BlockType::Air
        )));
    }

    #[test]
    fn tree_seeds_are_wood() {
        let gen = TerrainGenerator::new(TerrainConfig {
            seed: 11,
            tree_threshold: 0.0,
            ..Default::default()
        });
        for cy in -7..7 {
            let chunk = gen.generate_chunk(ChunkPos::new(0, cy, 0));
            for seed in &chunk.tree_seeds {
                assert_eq!(chunk.blocks[seed.to_index()].block_type, BlockType::Wood);
            }
        }
    }

    #[test]
    fn parallel_generation_matches_sequential() {
        let gen = TerrainGenerator::with_seed(42);
        let positions = vec![
            ChunkPos::new(0, 0, 0),
            ChunkPos::new(1, 0, 0),
            ChunkPos::new(0, -1, 1),
        ];

        let parallel = gen.generate_chunks_parallel(&positions);
        for (pos, generated) in parallel {
            let sequential = gen.generate_chunk(pos);
            assert_eq!(generated.blocks, sequential.blocks);
            assert_eq!(generated.tree_seeds, sequential.tree_seeds);
        }
    }

    #[test]
    fn reseed_updates_config() {
        let mut gen = TerrainGenerator::with_seed(1);
        gen.set_seed(77);
        assert_eq!(gen.config().seed, 77);
        let fresh = TerrainGenerator::with_seed(77);
        assert_eq!(gen.terrain_height(123.0, -45.0), fresh.terrain_height(123.0, -45.0));
    }
}
