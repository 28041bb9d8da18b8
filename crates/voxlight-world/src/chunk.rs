//! Chunk data structure for voxel world storage.

use bitflags::bitflags;
use voxlight_core::constants::{CHUNK_SIZE, CHUNK_VOLUME, MAX_LIGHT};
use voxlight_core::coords::{ChunkCell, ChunkPos, LocalPos};
use voxlight_core::types::{BlockSide, BlockType, VoxelBlock};

use crate::chunk_manager::ChunkLookup;
use crate::generation::GeneratedChunk;
use crate::light::{pack_light, sunlight_of, torchlight_of};
use crate::mesh::{ChunkMesh, CollisionMode, MeshSink};

bitflags! {
    /// Lifecycle flags of a chunk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChunkFlags: u8 {
        /// Block data is present.
        const LOADED              = 0b0000_0001;
        /// Meshes were rebuilt and wait for upload.
        const SHOULD_RENDER       = 0b0000_0010;
        /// Block data differs from the persisted copy.
        const SHOULD_SAVE         = 0b0000_0100;
        /// Outside every observer's range; removed on the next sweep.
        const MARKED_FOR_DELETION = 0b0000_1000;
    }
}

/// Where a chunk's block data comes from.
#[derive(Debug, Clone)]
pub enum ChunkSource {
    /// Cells read back from disk.
    Saved(Vec<VoxelBlock>),
    /// Cells produced by the terrain generator.
    Generated(GeneratedChunk),
}

/// Work a freshly loaded chunk hands to the light and tree solvers.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub light_seeds: Vec<ChunkCell>,
    pub tree_seeds: Vec<ChunkCell>,
}

/// Light tasks produced by a block edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightEdit {
    /// Cells to flood from.
    pub propagate: Vec<ChunkCell>,
    /// Cell to clear from, with the torchlight it held before the edit.
    pub removal: Option<(ChunkCell, u8)>,
}

/// A single 16³ chunk of blocks with packed light.
///
/// A chunk never calls into the light manager; mutators return the tasks the
/// caller must enqueue once the chunk lock is released.
#[derive(Debug)]
pub struct Chunk {
    pos: ChunkPos,
    blocks: Vec<VoxelBlock>,
    light: Vec<u8>,
    flags: ChunkFlags,
    /// Bumped on every write that can change the mesh.
    revision: u64,
    /// `revision` when the meshes were last built.
    calculated_revision: u64,
    /// Observer distance in chunks.
    distance: i32,
    opaque_mesh: ChunkMesh,
    water_mesh: ChunkMesh,
}

impl Chunk {
    /// Create a new empty (all air, unlit, not loaded) chunk.
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            blocks: vec![VoxelBlock::AIR; CHUNK_VOLUME],
            light: vec![0; CHUNK_VOLUME],
            flags: ChunkFlags::empty(),
            revision: 1,
            calculated_revision: 0,
            distance: 0,
            opaque_mesh: ChunkMesh::new(),
            water_mesh: ChunkMesh::new(),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn identifier(&self) -> String {
        self.pos.identifier()
    }

    pub fn flags(&self) -> ChunkFlags {
        self.flags
    }

    pub fn is_loaded(&self) -> bool {
        self.flags.contains(ChunkFlags::LOADED)
    }

    pub fn should_render(&self) -> bool {
        self.flags.contains(ChunkFlags::SHOULD_RENDER)
    }

    pub fn should_save(&self) -> bool {
        self.flags.contains(ChunkFlags::SHOULD_SAVE)
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.flags.contains(ChunkFlags::MARKED_FOR_DELETION)
    }

    pub fn mark_loaded(&mut self) {
        self.flags.insert(ChunkFlags::LOADED);
    }

    pub fn mark_for_save(&mut self) {
        self.flags.insert(ChunkFlags::SHOULD_SAVE);
    }

    pub fn clear_save_flag(&mut self) {
        self.flags.remove(ChunkFlags::SHOULD_SAVE);
    }

    /// Flag or unflag the chunk for the next deletion sweep.
    pub fn set_marked_for_deletion(&mut self, marked: bool) {
        self.flags.set(ChunkFlags::MARKED_FOR_DELETION, marked);
    }

    pub fn distance(&self) -> i32 {
        self.distance
    }

    pub fn set_distance(&mut self, distance: i32) {
        self.distance = distance;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when the meshes are older than the block and light data.
    pub fn needs_geometry(&self) -> bool {
        self.revision != self.calculated_revision
    }

    pub fn mark_for_geometry_calculation(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// All cells in local index order.
    pub fn blocks(&self) -> &[VoxelBlock] {
        &self.blocks
    }

    #[inline]
    pub fn block(&self, local: LocalPos) -> VoxelBlock {
        self.blocks[local.to_index()]
    }

    /// Block type of one cell.
    #[inline]
    pub fn block_type(&self, local: LocalPos) -> BlockType {
        self.block(local).block_type
    }

    /// Write one cell without touching light.
    ///
    /// Returns true and marks the chunk for re-meshing only if the type changed.
    pub fn set_voxel(&mut self, local: LocalPos, block_type: BlockType) -> bool {
        let cell = &mut self.blocks[local.to_index()];
        if cell.block_type == block_type {
            return false;
        }
        cell.block_type = block_type;
        self.mark_for_geometry_calculation();
        true
    }

    /// Packed light byte of one cell.
    #[inline]
    pub fn light_value(&self, local: LocalPos) -> u8 {
        self.light[local.to_index()]
    }

    #[inline]
    pub fn sunlight(&self, local: LocalPos) -> u8 {
        sunlight_of(self.light_value(local))
    }

    #[inline]
    pub fn torchlight(&self, local: LocalPos) -> u8 {
        torchlight_of(self.light_value(local))
    }

    /// Set the sunlight nibble of one cell. Values above 15 are clamped.
    pub fn set_sunlight_at(&mut self, local: LocalPos, value: u8) -> bool {
        let current = self.light_value(local);
        self.write_light(local, pack_light(value.min(MAX_LIGHT), torchlight_of(current)))
    }

    /// Set the torchlight nibble of one cell. Values above 15 are clamped.
    pub fn set_torchlight(&mut self, local: LocalPos, value: u8) -> bool {
        let current = self.light_value(local);
        self.write_light(local, pack_light(sunlight_of(current), value.min(MAX_LIGHT)))
    }

    fn write_light(&mut self, local: LocalPos, packed: u8) -> bool {
        let slot = &mut self.light[local.to_index()];
        if *slot == packed {
            return false;
        }
        *slot = packed;
        self.mark_for_geometry_calculation();
        true
    }

    /// Stamp `value` into the top cell of every column.
    pub fn set_sunlight(&mut self, value: u8) {
        let top = (CHUNK_SIZE - 1) as u8;
        for x in 0..CHUNK_SIZE as u8 {
            for z in 0..CHUNK_SIZE as u8 {
                self.set_sunlight_at(LocalPos::new(x, top, z), value);
            }
        }
    }

    /// Place or break a block.
    ///
    /// Placing a torch seeds full torchlight there; any other edit clears the light
    /// the cell used to carry. The six neighbours are always re-seeded.
    pub fn set_block_data(&mut self, local: LocalPos, block_type: BlockType) -> LightEdit {
        let cell = ChunkCell::new(self.pos, local);
        let prior = self.torchlight(local);

        self.blocks[local.to_index()].block_type = block_type;
        self.set_torchlight(local, 0);
        self.mark_for_geometry_calculation();
        self.mark_for_save();

        let mut edit = LightEdit::default();
        if block_type.is_light_source() {
            self.set_torchlight(local, MAX_LIGHT);
            edit.propagate.push(cell);
        } else {
            edit.removal = Some((cell, prior));
        }
        edit.propagate
            .extend(BlockSide::ALL.map(|side| cell.neighbor(side)));
        edit
    }

    /// Seed full torchlight on every torch block.
    ///
    /// Returns the cells to flood from.
    pub fn calculate_light(&mut self) -> Vec<ChunkCell> {
        let mut seeds = Vec::new();
        for local in LocalPos::all() {
            if self.block_type(local).is_light_source() {
                self.set_torchlight(local, MAX_LIGHT);
                seeds.push(ChunkCell::new(self.pos, local));
            }
        }
        seeds
    }

    /// Fill the chunk from saved or generated data and seed its light.
    pub fn load(&mut self, source: ChunkSource) -> LoadOutcome {
        let tree_seeds = match source {
            ChunkSource::Saved(blocks) => {
                self.replace_blocks(blocks);
                Vec::new()
            }
            ChunkSource::Generated(generated) => {
                self.replace_blocks(generated.blocks);
                generated
                    .tree_seeds
                    .into_iter()
                    .map(|local| ChunkCell::new(self.pos, local))
                    .collect()
            }
        };

        let light_seeds = self.calculate_light();
        self.flags
            .insert(ChunkFlags::LOADED | ChunkFlags::SHOULD_SAVE);
        LoadOutcome {
            light_seeds,
            tree_seeds,
        }
    }

    /// Apply the authoritative block array received from a server.
    ///
    /// Returns the light seeds to enqueue.
    pub fn process_server_response(&mut self, blocks: Vec<VoxelBlock>) -> Vec<ChunkCell> {
        self.replace_blocks(blocks);
        let seeds = self.calculate_light();
        self.mark_loaded();
        seeds
    }

    fn replace_blocks(&mut self, mut blocks: Vec<VoxelBlock>) {
        blocks.resize(CHUNK_VOLUME, VoxelBlock::AIR);
        self.blocks = blocks;
        self.light.fill(0);
        self.mark_for_geometry_calculation();
    }

    /// Block and light of the cell next to `local` towards `side`.
    fn neighbor_cell<L: ChunkLookup + ?Sized>(
        &self,
        lookup: &L,
        side: BlockSide,
        local: LocalPos,
    ) -> Option<(BlockType, u8)> {
        let next = local.wrapped_neighbor(side);
        if local.has_local_neighbor(side) {
            Some((self.block_type(next), self.light_value(next)))
        } else {
            lookup.cell_at(self.pos.neighbor(side), next)
        }
    }

    /// Light byte of the neighbouring cell, or this cell's own light when the
    /// neighbouring chunk is missing.
    pub fn neighbor_light_value<L: ChunkLookup + ?Sized>(
        &self,
        lookup: &L,
        side: BlockSide,
        local: LocalPos,
    ) -> u8 {
        self.neighbor_cell(lookup, side, local)
            .map_or_else(|| self.light_value(local), |(_, light)| light)
    }

    /// Block type of the neighbouring cell, or this cell's own type when the
    /// neighbouring chunk is missing.
    pub fn get_block_neighbor<L: ChunkLookup + ?Sized>(
        &self,
        lookup: &L,
        side: BlockSide,
        local: LocalPos,
    ) -> BlockType {
        self.neighbor_cell(lookup, side, local)
            .map_or_else(|| self.block_type(local), |(block, _)| block)
    }

    /// Whether the face of `local` towards `side` is hidden.
    ///
    /// A face shows only against air or water of a different type.
    pub fn block_have_neighbor<L: ChunkLookup + ?Sized>(
        &self,
        lookup: &L,
        side: BlockSide,
        local: LocalPos,
    ) -> bool {
        let current = self.block_type(local);
        let neighbor = self.get_block_neighbor(lookup, side, local);
        !(neighbor.is_transparent() && neighbor != current)
    }

    /// Rebuild both meshes if anything changed since the last build.
    ///
    /// Returns false when the meshes were already current.
    pub fn calculate_geometry<L: ChunkLookup + ?Sized>(&mut self, lookup: &L) -> bool {
        if !self.needs_geometry() {
            return false;
        }

        let mut opaque = std::mem::take(&mut self.opaque_mesh);
        let mut water = std::mem::take(&mut self.water_mesh);
        opaque.clear();
        water.clear();

        for local in LocalPos::all() {
            let block_type = self.block_type(local);
            if !block_type.is_visible() {
                continue;
            }
            let mesh = if block_type == BlockType::Water {
                &mut water
            } else {
                &mut opaque
            };
            for side in BlockSide::ALL {
                if self.block_have_neighbor(lookup, side, local) {
                    continue;
                }
                let light = self.neighbor_light_value(lookup, side, local);
                mesh.push_face(local, side, block_type, light);
            }
        }

        self.opaque_mesh = opaque;
        self.water_mesh = water;
        self.calculated_revision = self.revision;
        self.flags.insert(ChunkFlags::SHOULD_RENDER);
        true
    }

    pub fn opaque_mesh(&self) -> &ChunkMesh {
        &self.opaque_mesh
    }

    pub fn water_mesh(&self) -> &ChunkMesh {
        &self.water_mesh
    }

    /// Hand both meshes to the sink if a rebuild is pending upload.
    pub fn render(&mut self, sink: &mut dyn MeshSink) -> bool {
        if !self.should_render() {
            return false;
        }
        let collision = CollisionMode::for_meshes(&self.opaque_mesh, &self.water_mesh);
        sink.upload(self.pos, &self.opaque_mesh, &self.water_mesh, collision);
        self.flags.remove(ChunkFlags::SHOULD_RENDER);
        true
    }
}
