//! The world: owns every chunk and drives loading, lighting, meshing and saving.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use glam::{IVec3, Vec3};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace_span, warn};
use voxlight_core::constants::MAX_LIGHT;
use voxlight_core::coords::{ChunkCell, ChunkPos, LocalPos, WorldPos};
use voxlight_core::types::{BlockSide, BlockType};
use voxlight_core::Result;

use crate::chunk::{Chunk, ChunkSource};
use crate::chunk_manager::{ChunkHandle, ChunkMap, NeighborBorders};
use crate::generation::TerrainGenerator;
use crate::light::{LightManager, LightQueueLengths, LightStats};
use crate::mesh::MeshSink;
use crate::network::{self, ChunkBlocks, NetworkMessage, Outgoing, PeerId, Recipient};
use crate::storage::ChunkStore;
use crate::tree::{TreeGenerator, TreeStats};
use crate::WorldSeed;

/// Height a freshly placed trunk starts growing from.
const TREE_START_HEIGHT: u8 = 1;

/// Which side of a network session this world plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkRole {
    /// No peers; generates and edits locally.
    #[default]
    Standalone,
    /// Authoritative; answers chunk requests and broadcasts edits.
    Server,
    /// Never generates terrain; requests chunks and edits from the server.
    Client,
}

/// World configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Seed for terrain generation.
    pub seed: WorldSeed,
    /// Chunks within this many face steps of an observer stay loaded.
    pub visible_distance: i32,
    /// Directory holding persisted chunk files.
    pub save_dir: PathBuf,
    pub role: NetworkRole,
    /// Cap on chunk files written per tick.
    pub max_saves_per_tick: usize,
    /// Cap on background meshes uploaded per [`World::render_pending`] call.
    pub max_renders_per_update: usize,
    /// Length of a full day/night cycle.
    pub day_length_secs: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            visible_distance: 5,
            save_dir: PathBuf::from("World"),
            role: NetworkRole::Standalone,
            max_saves_per_tick: 1,
            max_renders_per_update: 1,
            day_length_secs: 600.0,
        }
    }
}

/// Handle returned by [`World::add_observer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Debug)]
struct Observer {
    position: Vec3,
    last_chunk: Option<ChunkPos>,
}

/// Events that make new cells reachable for deferred light and tree tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldSignal {
    ChunkGenerated(ChunkPos),
    BlockAdded(ChunkCell),
    BlockRemoved(ChunkCell),
}

/// Completion notice from background work to the render thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkEvent {
    MeshReady { pos: ChunkPos, urgent: bool },
    Removed(ChunkPos),
}

/// Meshes waiting for the render thread, at most one entry per chunk.
#[derive(Debug, Default)]
struct RenderQueue {
    background: VecDeque<ChunkPos>,
    urgent: Vec<ChunkPos>,
    /// Chunks whose meshes the sink must drop.
    removed: Vec<ChunkPos>,
    /// Chunks the sink currently holds meshes for.
    uploaded: HashSet<ChunkPos>,
}

impl RenderQueue {
    fn push(&mut self, event: ChunkEvent) {
        match event {
            ChunkEvent::MeshReady { pos, urgent: true } => {
                self.background.retain(|queued| *queued != pos);
                if !self.urgent.contains(&pos) {
                    self.urgent.push(pos);
                }
            }
            ChunkEvent::MeshReady { pos, urgent: false } => {
                if !self.urgent.contains(&pos) && !self.background.contains(&pos) {
                    self.background.push_back(pos);
                }
            }
            ChunkEvent::Removed(pos) => {
                self.background.retain(|queued| *queued != pos);
                self.urgent.retain(|queued| *queued != pos);
                if self.uploaded.contains(&pos) && !self.removed.contains(&pos) {
                    self.removed.push(pos);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.background.len() + self.urgent.len() + self.removed.len()
    }
}

/// What one [`World::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: usize,
    pub removed: usize,
    pub meshed: usize,
    pub saved: usize,
    pub light: LightStats,
    pub trees: TreeStats,
}

/// Debug counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub loaded_chunks: usize,
    pub frontier_size: usize,
    pub observers: usize,
    pub light_queue: LightQueueLengths,
    /// Live and deferred tree nodes.
    pub tree_queue: (usize, usize),
    /// Mesh uploads and removals waiting for [`World::render_pending`].
    pub pending_renders: usize,
}

#[derive(Debug, Default)]
struct Daylight {
    override_level: Option<u8>,
    current: Option<u8>,
}

/// Owns the chunk collection and everything that mutates it.
///
/// All methods take `&self`; the world is shared between the thread that renders
/// and a [`crate::WorldWorker`] that runs [`World::tick`].
pub struct World {
    settings: RwLock<WorldConfig>,
    chunks: ChunkMap,
    generator: RwLock<TerrainGenerator>,
    light: LightManager,
    trees: TreeGenerator,
    store: ChunkStore,
    observers: Mutex<HashMap<ObserverId, Observer>>,
    next_observer: AtomicU64,
    frontier: Mutex<HashMap<ChunkPos, i32>>,
    visibility_dirty: AtomicBool,
    maintenance: Mutex<()>,
    render_queue: Mutex<RenderQueue>,
    outbox: Mutex<Vec<Outgoing>>,
    daylight: Mutex<Daylight>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        info!(
            seed = config.seed,
            visible_distance = config.visible_distance,
            role = ?config.role,
            save_dir = %config.save_dir.display(),
            "Creating world"
        );

        Self {
            generator: RwLock::new(TerrainGenerator::with_seed(config.seed)),
            store: ChunkStore::new(config.save_dir.clone()),
            settings: RwLock::new(config),
            chunks: ChunkMap::new(),
            light: LightManager::new(),
            trees: TreeGenerator::new(),
            observers: Mutex::new(HashMap::new()),
            next_observer: AtomicU64::new(0),
            frontier: Mutex::new(HashMap::new()),
            visibility_dirty: AtomicBool::new(true),
            maintenance: Mutex::new(()),
            render_queue: Mutex::new(RenderQueue::default()),
            outbox: Mutex::new(Vec::new()),
            daylight: Mutex::new(Daylight::default()),
        }
    }

    /// Snapshot of the current settings.
    pub fn config(&self) -> WorldConfig {
        self.settings.read().clone()
    }

    pub fn role(&self) -> NetworkRole {
        self.settings.read().role
    }

    pub fn chunks(&self) -> &ChunkMap {
        &self.chunks
    }

    pub fn light_manager(&self) -> &LightManager {
        &self.light
    }

    pub fn tree_generator(&self) -> &TreeGenerator {
        &self.trees
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    // --- observers -------------------------------------------------------

    /// Register a position that keeps nearby chunks loaded.
    pub fn add_observer(&self, position: Vec3) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().insert(
            id,
            Observer {
                position,
                last_chunk: None,
            },
        );
        info!(observer = id.0, ?position, "Observer added");
        id
    }

    /// Move an observer. Returns false for an unknown id.
    pub fn set_observer_position(&self, id: ObserverId, position: Vec3) -> bool {
        match self.observers.lock().get_mut(&id) {
            Some(observer) => {
                observer.position = position;
                true
            }
            None => false,
        }
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let removed = self.observers.lock().remove(&id).is_some();
        if removed {
            self.visibility_dirty.store(true, Ordering::Release);
            info!(observer = id.0, "Observer removed");
        }
        removed
    }

    // --- lookups ---------------------------------------------------------

    /// The chunk owning a world-space point, if it is live.
    pub fn get_chunk_by_position(&self, position: Vec3) -> Option<ChunkHandle> {
        self.chunks.get_chunk_by_position(position)
    }

    /// Whether a chunk is still live.
    pub fn is_chunk_valid(&self, pos: ChunkPos) -> bool {
        self.chunks.contains(pos)
    }

    // --- background maintenance -----------------------------------------

    /// One round of chunk maintenance.
    ///
    /// Recomputes visibility when an observer crossed a chunk boundary, sweeps
    /// chunks that left range, creates newly visible ones, drains the tree and
    /// light queues, rebuilds stale meshes and writes a bounded number of dirty
    /// chunks.
    pub fn tick(&self) -> TickReport {
        let _maintenance = self.maintenance.lock();
        let _span = trace_span!("world_tick").entered();
        let mut report = TickReport::default();

        if self.update_visibility() {
            let frontier = self.frontier.lock().clone();
            report.removed = self.sweep(&frontier);
            report.created = self.create_missing(&frontier);
        }

        report.trees = self.trees.process(&self.chunks);
        report.light = self.light.process(&self.chunks);
        report.meshed = self.rebuild_geometry();

        let max_saves = self.settings.read().max_saves_per_tick;
        report.saved = self.save_dirty(max_saves);
        report
    }

    /// Recompute the visible frontier if any observer changed chunk.
    fn update_visibility(&self) -> bool {
        let mut crossed = false;
        let seeds: Vec<ChunkPos> = {
            let mut observers = self.observers.lock();
            for observer in observers.values_mut() {
                let current = ChunkPos::from_world(observer.position);
                if observer.last_chunk != Some(current) {
                    observer.last_chunk = Some(current);
                    crossed = true;
                }
            }
            observers.values().filter_map(|o| o.last_chunk).collect()
        };

        let dirty = self.visibility_dirty.swap(false, Ordering::AcqRel);
        if !crossed && !dirty {
            return false;
        }

        let distance = self.settings.read().visible_distance;
        let frontier = visible_chunks(seeds, distance);
        debug!(
            frontier = frontier.len(),
            visible_distance = distance,
            "Visibility recomputed"
        );
        *self.frontier.lock() = frontier;
        true
    }

    /// Mark chunks outside `frontier` and erase them, saving dirty ones first.
    fn sweep(&self, frontier: &HashMap<ChunkPos, i32>) -> usize {
        let handles = self.chunks.handles();
        for (pos, handle) in &handles {
            let mut chunk = handle.lock();
            match frontier.get(pos) {
                Some(distance) => {
                    chunk.set_distance(*distance);
                    chunk.set_marked_for_deletion(false);
                }
                None => chunk.set_marked_for_deletion(true),
            }
        }

        let mut removed = 0;
        for (pos, handle) in handles {
            {
                let mut chunk = handle.lock();
                if !chunk.is_marked_for_deletion() {
                    continue;
                }
                self.persist(&mut chunk);
            }
            self.chunks.remove(pos);
            self.notify(ChunkEvent::Removed(pos));
            removed += 1;
        }

        if removed > 0 {
            debug!(removed, "Swept chunks out of range");
        }
        removed
    }

    /// Create every chunk in `frontier` that is not live yet.
    fn create_missing(&self, frontier: &HashMap<ChunkPos, i32>) -> usize {
        let mut missing: Vec<(ChunkPos, i32)> = frontier
            .iter()
            .filter(|(pos, _)| !self.chunks.contains(**pos))
            .map(|(pos, distance)| (*pos, *distance))
            .collect();
        if missing.is_empty() {
            return 0;
        }
        missing.sort_by_key(|(pos, distance)| (*distance, pos.x, pos.y, pos.z));

        if self.role() == NetworkRole::Client {
            for (pos, distance) in &missing {
                let mut chunk = Chunk::new(*pos);
                chunk.set_distance(*distance);
                self.chunks.insert(chunk);
                self.push_outgoing(
                    Recipient::Server,
                    NetworkMessage::RequestChunk {
                        origin: pos.origin().to_array(),
                    },
                );
            }
            debug!(requested = missing.len(), "Requested chunks from server");
            return missing.len();
        }

        let distances: HashMap<ChunkPos, i32> = missing.iter().copied().collect();
        let mut sources = Vec::with_capacity(missing.len());
        let mut to_generate = Vec::new();
        for (pos, _) in &missing {
            match self.store.load(*pos) {
                Ok(Some(blocks)) => sources.push((*pos, ChunkSource::Saved(blocks))),
                Ok(None) => to_generate.push(*pos),
                Err(e) => {
                    warn!(chunk = %pos.identifier(), error = %e, "Unreadable chunk file, generating instead");
                    to_generate.push(*pos);
                }
            }
        }

        let generated = self.generator.read().generate_chunks_parallel(&to_generate);
        sources.extend(
            generated
                .into_iter()
                .map(|(pos, chunk)| (pos, ChunkSource::Generated(chunk))),
        );

        let created = sources.len();
        for (pos, source) in sources {
            let distance = distances.get(&pos).copied().unwrap_or_default();
            self.install_chunk(pos, source, distance);
        }
        info!(
            created,
            generated = to_generate.len(),
            loaded = created - to_generate.len(),
            "Created chunks"
        );
        created
    }

    /// Load a chunk, publish it and queue its light and tree work.
    fn install_chunk(&self, pos: ChunkPos, source: ChunkSource, distance: i32) {
        let mut chunk = Chunk::new(pos);
        chunk.set_distance(distance);
        let outcome = chunk.load(source);
        if let Some(level) = self.daylight.lock().current {
            chunk.set_sunlight(level);
        }
        self.chunks.insert(chunk);

        for seed in outcome.light_seeds {
            self.light.add_light_node(&self.chunks, seed);
        }
        for seed in outcome.tree_seeds {
            self.trees
                .add_tree_node(&self.chunks, seed, TREE_START_HEIGHT, 0);
        }
        self.mark_neighbors_for_geometry(pos);
        self.dispatch(WorldSignal::ChunkGenerated(pos));
    }

    fn mark_neighbors_for_geometry(&self, pos: ChunkPos) {
        for neighbor in pos.neighbors() {
            self.chunks
                .with_chunk_mut(neighbor, Chunk::mark_for_geometry_calculation);
        }
    }

    /// Rebuild every loaded chunk whose mesh is stale.
    fn rebuild_geometry(&self) -> usize {
        let mut meshed = 0;
        for (pos, handle) in self.chunks.handles() {
            let stale = {
                let chunk = handle.lock();
                chunk.is_loaded() && chunk.needs_geometry()
            };
            if stale && self.remesh(pos, &handle) {
                meshed += 1;
                self.notify(ChunkEvent::MeshReady { pos, urgent: false });
            }
        }
        meshed
    }

    fn remesh(&self, pos: ChunkPos, handle: &ChunkHandle) -> bool {
        let borders = NeighborBorders::capture(&self.chunks, pos);
        handle.lock().calculate_geometry(&borders)
    }

    /// Write up to `limit` dirty chunks.
    fn save_dirty(&self, limit: usize) -> usize {
        if self.role() == NetworkRole::Client {
            return 0;
        }
        let mut saved = 0;
        for (_, handle) in self.chunks.handles() {
            if saved >= limit {
                break;
            }
            if self.persist(&mut handle.lock()) {
                saved += 1;
            }
        }
        saved
    }

    /// Save one chunk if it is dirty. Returns whether a write was attempted.
    ///
    /// Failures are logged and the dirty flag is cleared; the next edit marks it
    /// again.
    fn persist(&self, chunk: &mut Chunk) -> bool {
        if self.role() == NetworkRole::Client || !chunk.is_loaded() || !chunk.should_save() {
            return false;
        }
        if let Err(e) = self.store.save(chunk.pos(), chunk.blocks()) {
            warn!(chunk = %chunk.identifier(), error = %e, "Failed to save chunk");
        }
        chunk.clear_save_flag();
        true
    }

    /// Save every dirty chunk regardless of the per-tick cap.
    pub fn save_all(&self) -> usize {
        let mut saved = 0;
        for (_, handle) in self.chunks.handles() {
            if self.persist(&mut handle.lock()) {
                saved += 1;
            }
        }
        info!(saved, "Saved world");
        saved
    }

    /// Retry deferred light and tree work now that new cells are reachable.
    pub fn dispatch(&self, signal: WorldSignal) {
        let light = self.light.retry_deferred();
        let trees = self.trees.retry_deferred();
        if light + trees > 0 {
            debug!(?signal, light, trees, "Retrying deferred tasks");
        }
    }

    // --- rendering -------------------------------------------------------

    /// Upload finished meshes. Call once per frame from the rendering thread.
    ///
    /// Meshes rebuilt by block edits are always uploaded; background rebuilds are
    /// capped by `max_renders_per_update`.
    pub fn render_pending(&self, sink: &mut dyn MeshSink) -> usize {
        let cap = self.settings.read().max_renders_per_update;
        let (removed, urgent) = {
            let mut queue = self.render_queue.lock();
            let removed = std::mem::take(&mut queue.removed);
            for pos in &removed {
                queue.uploaded.remove(pos);
            }
            (removed, std::mem::take(&mut queue.urgent))
        };
        for pos in removed {
            sink.remove(pos);
        }

        let mut rendered = 0;
        for pos in urgent {
            if self.render_chunk(pos, sink) {
                rendered += 1;
            }
        }

        let mut budget = cap;
        while budget > 0 {
            let Some(pos) = self.render_queue.lock().background.pop_front() else {
                break;
            };
            if self.render_chunk(pos, sink) {
                rendered += 1;
                budget -= 1;
            }
        }
        rendered
    }

    fn notify(&self, event: ChunkEvent) {
        self.render_queue.lock().push(event);
    }

    fn render_chunk(&self, pos: ChunkPos, sink: &mut dyn MeshSink) -> bool {
        let uploaded = self
            .chunks
            .with_chunk_mut(pos, |chunk| chunk.render(&mut *sink))
            .unwrap_or(false);
        if uploaded {
            self.render_queue.lock().uploaded.insert(pos);
        }
        uploaded
    }

    // --- block edits -----------------------------------------------------

    /// Break the block at `position`, reported by a hit on chunk `source`.
    pub fn handle_hit(&self, source: ChunkPos, position: Vec3) -> Option<ChunkCell> {
        self.handle_edit(source, position, BlockType::Air)
    }

    /// Place `block_type` at `position`, reported by a hit on chunk `source`.
    pub fn handle_add(
        &self,
        source: ChunkPos,
        position: Vec3,
        block_type: BlockType,
    ) -> Option<ChunkCell> {
        self.handle_edit(source, position, block_type)
    }

    /// Resolve the cell an edit targets, forwarding it to the owning chunk when
    /// the point lies outside `source`.
    fn resolve_edit_cell(source: ChunkPos, position: Vec3) -> ChunkCell {
        let world = WorldPos::from(position);
        let relative = world
            .to_ivec3()
            .wrapping_sub(source.to_world_pos().to_ivec3());
        match LocalPos::try_from_ivec3(relative) {
            Some(local) => ChunkCell::new(source, local),
            None => {
                let cell = ChunkCell::from(world);
                debug!(
                    from = %source.identifier(),
                    to = %cell.chunk.identifier(),
                    "Forwarding edit to owning chunk"
                );
                cell
            }
        }
    }

    fn handle_edit(
        &self,
        source: ChunkPos,
        position: Vec3,
        block_type: BlockType,
    ) -> Option<ChunkCell> {
        let cell = Self::resolve_edit_cell(source, position);
        if !self.chunks.contains(cell.chunk) {
            debug!(chunk = %cell.chunk.identifier(), "Edit target chunk not loaded");
            return None;
        }

        if self.role() == NetworkRole::Client {
            let origin = cell.chunk.origin().to_array();
            let block = cell.local.to_ivec3().to_array();
            let message = if block_type == BlockType::Air {
                NetworkMessage::RequestHit { origin, block }
            } else {
                NetworkMessage::RequestAdd {
                    origin,
                    block,
                    block_type: block_type.to_i32(),
                }
            };
            self.push_outgoing(Recipient::Server, message);
            return Some(cell);
        }

        self.apply_edit(cell, block_type).then_some(cell)
    }

    /// Mutate one cell and bring light and meshes up to date immediately.
    fn apply_edit(&self, cell: ChunkCell, block_type: BlockType) -> bool {
        let Some(edit) = self
            .chunks
            .with_loaded_chunk_mut(cell.chunk, |chunk| chunk.set_block_data(cell.local, block_type))
        else {
            debug!(chunk = %cell.chunk.identifier(), "Edit on unavailable chunk ignored");
            return false;
        };

        for seed in edit.propagate {
            self.light.add_light_node(&self.chunks, seed);
        }
        if let Some((removed, level)) = edit.removal {
            self.light
                .add_light_removal_node(&self.chunks, removed, level);
        }
        self.dispatch(if block_type == BlockType::Air {
            WorldSignal::BlockRemoved(cell)
        } else {
            WorldSignal::BlockAdded(cell)
        });
        self.light.process(&self.chunks);

        for side in BlockSide::ALL {
            if !cell.local.has_local_neighbor(side) {
                self.chunks.with_chunk_mut(
                    cell.chunk.neighbor(side),
                    Chunk::mark_for_geometry_calculation,
                );
            }
        }
        self.remesh_now(cell.chunk);

        if self.role() == NetworkRole::Server {
            self.push_outgoing(
                Recipient::Broadcast,
                NetworkMessage::SendChunkUpdate {
                    origin: cell.chunk.origin().to_array(),
                    block: cell.local.to_ivec3().to_array(),
                    block_type: block_type.to_i32(),
                },
            );
        }
        true
    }

    /// Rebuild the edited chunk and its face neighbours for immediate upload.
    fn remesh_now(&self, center: ChunkPos) {
        let targets = std::iter::once(center).chain(center.neighbors());
        for pos in targets {
            let Some(handle) = self.chunks.get(pos) else {
                continue;
            };
            let stale = {
                let chunk = handle.lock();
                chunk.is_loaded() && chunk.needs_geometry()
            };
            if stale && self.remesh(pos, &handle) {
                self.notify(ChunkEvent::MeshReady { pos, urgent: true });
            }
        }
    }

    // --- network relay ---------------------------------------------------

    fn push_outgoing(&self, recipient: Recipient, message: NetworkMessage) {
        self.outbox.lock().push(Outgoing { recipient, message });
    }

    /// Take every message queued for the transport.
    pub fn drain_outgoing(&self) -> Vec<Outgoing> {
        std::mem::take(&mut *self.outbox.lock())
    }

    /// Decode and handle raw bytes from a peer. Malformed packets are dropped.
    pub fn handle_packet(&self, from: PeerId, data: &[u8]) {
        match network::decode(data) {
            Ok(message) => self.handle_message(from, message),
            Err(e) => warn!(peer = from.0, error = %e, "Dropping malformed packet"),
        }
    }

    /// React to a decoded message according to this world's role.
    pub fn handle_message(&self, from: PeerId, message: NetworkMessage) {
        match (self.role(), message) {
            (NetworkRole::Server, NetworkMessage::RequestChunk { origin }) => {
                let pos = ChunkPos::from_origin(Vec3::from_array(origin));
                let blocks = self
                    .chunks
                    .with_chunk(pos, |chunk| {
                        chunk
                            .is_loaded()
                            .then(|| ChunkBlocks::from_blocks(chunk.blocks()))
                    })
                    .flatten();
                match blocks {
                    Some(blocks) => {
                        self.push_outgoing(
                            Recipient::Peer(from),
                            NetworkMessage::SendChunk { origin, blocks },
                        );
                    }
                    None => debug!(chunk = %pos.identifier(), "Requested chunk not loaded"),
                }
            }
            (NetworkRole::Server, NetworkMessage::RequestHit { origin, block }) => {
                self.apply_remote_edit(origin, block, BlockType::Air.to_i32());
            }
            (
                NetworkRole::Server,
                NetworkMessage::RequestAdd {
                    origin,
                    block,
                    block_type,
                },
            )
            | (
                NetworkRole::Client,
                NetworkMessage::SendChunkUpdate {
                    origin,
                    block,
                    block_type,
                },
            ) => {
                self.apply_remote_edit(origin, block, block_type);
            }
            (NetworkRole::Client, NetworkMessage::SendChunk { origin, blocks }) => {
                self.process_server_response(Vec3::from_array(origin), &blocks);
            }
            (role, message) => {
                debug!(?role, peer = from.0, origin = ?message.origin(), "Ignoring message");
            }
        }
    }

    fn apply_remote_edit(&self, origin: [f32; 3], block: [i32; 3], block_type: i32) {
        let pos = ChunkPos::from_origin(Vec3::from_array(origin));
        let Some(local) = LocalPos::try_from_ivec3(IVec3::from_array(block)) else {
            warn!(?block, "Remote edit outside chunk bounds");
            return;
        };
        let block_type = match BlockType::try_from(block_type) {
            Ok(block_type) => block_type,
            Err(e) => {
                warn!(error = %e, "Remote edit with unknown block type");
                return;
            }
        };
        self.apply_edit(ChunkCell::new(pos, local), block_type);
    }

    /// Apply a chunk's block array sent by the server.
    ///
    /// No-op if the chunk was never requested or has since been unloaded.
    pub fn process_server_response(&self, origin: Vec3, blocks: &ChunkBlocks) -> bool {
        let pos = ChunkPos::from_origin(origin);
        let cells = match blocks.to_blocks() {
            Ok(cells) => cells,
            Err(e) => {
                warn!(chunk = %pos.identifier(), error = %e, "Rejecting chunk payload");
                return false;
            }
        };
        let Some(seeds) = self
            .chunks
            .with_chunk_mut(pos, |chunk| chunk.process_server_response(cells))
        else {
            debug!(chunk = %pos.identifier(), "Chunk payload for unknown chunk ignored");
            return false;
        };

        for seed in seeds {
            self.light.add_light_node(&self.chunks, seed);
        }
        self.mark_neighbors_for_geometry(pos);
        self.dispatch(WorldSignal::ChunkGenerated(pos));
        true
    }

    // --- tunables --------------------------------------------------------

    pub fn set_visible_distance(&self, distance: i32) {
        self.settings.write().visible_distance = distance.max(1);
        self.visibility_dirty.store(true, Ordering::Release);
        info!(distance, "Visible distance changed");
    }

    /// Reseed both terrain noise sources. Only affects chunks generated later.
    pub fn set_seed(&self, seed: WorldSeed) {
        self.settings.write().seed = seed;
        self.generator.write().set_seed(seed);
        info!(seed, "World seed changed");
    }

    /// Delete every persisted chunk file and drop all live chunks.
    ///
    /// Chunks around the observers are regenerated on the next tick.
    pub fn reset_world(&self) -> Result<usize> {
        let _maintenance = self.maintenance.lock();
        let removed = self.store.reset()?;
        for pos in self.chunks.clear() {
            self.notify(ChunkEvent::Removed(pos));
        }
        self.light.clear();
        self.trees.clear();
        self.visibility_dirty.store(true, Ordering::Release);
        info!(removed, "World reset");
        Ok(removed)
    }

    /// Pin sunlight to `level`, or return to the day/night cycle with `None`.
    pub fn set_sunlight_override(&self, level: Option<u8>) {
        self.daylight.lock().override_level = level.map(|l| l.min(MAX_LIGHT));
        if let Some(level) = level {
            self.stamp_sunlight(level);
        }
    }

    /// Mark every chunk for a mesh rebuild.
    pub fn force_remesh(&self) {
        for (_, handle) in self.chunks.handles() {
            handle.lock().mark_for_geometry_calculation();
        }
    }

    /// Advance the day/night pulse. Returns the stamped sunlight level.
    pub fn update_daylight(&self, elapsed_secs: f32) -> u8 {
        let day = self.settings.read().day_length_secs.max(f32::EPSILON);
        let pulse = (elapsed_secs * std::f32::consts::TAU / day).sin() * 0.5 + 0.5;
        let level = (pulse * f32::from(MAX_LIGHT)).round() as u8;
        self.stamp_sunlight(level)
    }

    fn stamp_sunlight(&self, computed: u8) -> u8 {
        let level = {
            let mut daylight = self.daylight.lock();
            let level = daylight.override_level.unwrap_or(computed).min(MAX_LIGHT);
            if daylight.current == Some(level) {
                return level;
            }
            daylight.current = Some(level);
            level
        };
        for (_, handle) in self.chunks.handles() {
            handle.lock().set_sunlight(level);
        }
        level
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            loaded_chunks: self.chunks.len(),
            frontier_size: self.frontier.lock().len(),
            observers: self.observers.lock().len(),
            light_queue: self.light.queue_lengths(),
            tree_queue: self.trees.queue_lengths(),
            pending_renders: self.render_queue.lock().len(),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &*self.settings.read())
            .field("chunks", &self.chunks.len())
            .finish_non_exhaustive()
    }
}

/// Breadth-first set of chunks reachable from `seeds` in fewer than
/// `visible_distance` face steps, with each chunk's step count.
pub fn visible_chunks(
    seeds: impl IntoIterator<Item = ChunkPos>,
    visible_distance: i32,
) -> HashMap<ChunkPos, i32> {
    let mut distances = HashMap::new();
    let mut frontier = VecDeque::new();

    for seed in seeds {
        if distances.insert(seed, 0).is_none() {
            frontier.push_back((seed, 0));
        }
    }

    while let Some((pos, distance)) = frontier.pop_front() {
        let next = distance + 1;
        if next >= visible_distance {
            continue;
        }
        for neighbor in pos.neighbors() {
            if !distances.contains_key(&neighbor) {
                distances.insert(neighbor, next);
                frontier.push_back((neighbor, next));
            }
        }
    }

    distances
}
