//! Voxlight headless simulation
//!
//! Drives a world without a renderer: an observer walks across the terrain while
//! a background worker loads, lights and meshes chunks, and a counting sink stands
//! in for the GPU upload.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p voxlight-sim -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--seed <N>`: World generation seed (default: 42)
//! - `--visible-distance <N>`: Chunk visibility radius in face steps (default: 4)
//! - `--save-dir <PATH>`: Directory for chunk files (default: World)
//! - `--ticks <N>`: Number of simulation ticks (default: 200)
//! - `--reset`: Delete saved chunks before starting
//! - `--loopback`: Run a server and a client world connected in-process
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use voxlight_core::coords::ChunkPos;
use voxlight_core::types::BlockType;
use voxlight_world::mesh::{ChunkMesh, CollisionMode, MeshSink};
use voxlight_world::network::{self, PeerId};
use voxlight_world::{NetworkRole, World, WorldConfig, WorldWorker};

/// Simulated seconds per tick.
const TICK_SECS: f32 = 0.05;
/// Blocks the observer walks per tick.
const WALK_SPEED: f32 = 2.0;
const SERVER_PEER: PeerId = PeerId(0);
const CLIENT_PEER: PeerId = PeerId(1);

#[derive(Debug, Clone)]
struct SimParams {
    seed: u64,
    visible_distance: i32,
    save_dir: PathBuf,
    ticks: u32,
    reset: bool,
    loopback: bool,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            seed: 42,
            visible_distance: 4,
            save_dir: PathBuf::from("World"),
            ticks: 200,
            reset: false,
            loopback: false,
        }
    }
}

impl SimParams {
    /// Parse simulation parameters from command line arguments.
    fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--seed", Some(v)) => {
                    if let Ok(v) = v.parse() {
                        params.seed = v;
                    }
                    i += 1;
                }
                ("--visible-distance", Some(v)) => {
                    if let Ok(v) = v.parse() {
                        params.visible_distance = v;
                    }
                    i += 1;
                }
                ("--save-dir", Some(v)) => {
                    params.save_dir = PathBuf::from(v);
                    i += 1;
                }
                ("--ticks", Some(v)) => {
                    if let Ok(v) = v.parse() {
                        params.ticks = v;
                    }
                    i += 1;
                }
                ("--reset", _) => params.reset = true,
                ("--loopback", _) => params.loopback = true,
                (other, _) => warn!(arg = other, "Ignoring unknown argument"),
            }
            i += 1;
        }

        params
    }

    fn world_config(&self) -> WorldConfig {
        WorldConfig {
            seed: self.seed,
            visible_distance: self.visible_distance,
            save_dir: self.save_dir.clone(),
            ..Default::default()
        }
    }
}

/// Stands in for the renderer; counts what would be uploaded.
#[derive(Debug, Default)]
struct StatsSink {
    uploads: usize,
    removals: usize,
    opaque_faces: usize,
    water_faces: usize,
}

impl MeshSink for StatsSink {
    fn upload(
        &mut self,
        _chunk: ChunkPos,
        opaque: &ChunkMesh,
        water: &ChunkMesh,
        _collision: CollisionMode,
    ) {
        self.uploads += 1;
        self.opaque_faces += opaque.face_count();
        self.water_faces += water.face_count();
    }

    fn remove(&mut self, _chunk: ChunkPos) {
        self.removals += 1;
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let params = SimParams::from_args();
    info!(?params, "Voxlight simulation");

    if params.loopback {
        run_loopback(&params)
    } else {
        run_standalone(&params)
    }
}

/// Observer position after `tick` ticks of walking along +X.
fn walk(tick: u32) -> Vec3 {
    Vec3::new(8.0 + tick as f32 * WALK_SPEED, 24.0, 8.0)
}

fn run_standalone(params: &SimParams) -> anyhow::Result<()> {
    let world = Arc::new(World::new(params.world_config()));
    if params.reset {
        let removed = world.reset_world()?;
        info!(removed, "Deleted saved chunks");
    }

    let mut worker = WorldWorker::spawn(Arc::clone(&world))?;
    let observer = world.add_observer(walk(0));
    let mut sink = StatsSink::default();
    let torch_tick = params.ticks / 2;
    let mut torch = None;

    for tick in 0..params.ticks {
        let position = walk(tick);
        world.set_observer_position(observer, position);
        worker.request_tick();
        if let Some(report) = worker.recv_timeout(Duration::from_secs(5)) {
            debug!(tick, ?report, "Tick finished");
        }

        if tick == torch_tick {
            torch = world.handle_add(ChunkPos::from_world(position), position, BlockType::Torch);
            info!(?torch, "Placed torch");
        } else if tick == torch_tick + 10 {
            if let Some(cell) = torch.take() {
                world.handle_hit(cell.chunk, cell.world_pos().to_vec3());
                info!(?cell, "Removed torch");
            }
        }

        world.update_daylight(tick as f32 * TICK_SECS);
        world.render_pending(&mut sink);
    }

    worker.shutdown();
    while world.render_pending(&mut sink) > 0 {}
    let saved = world.save_all();

    info!(
        uploads = sink.uploads,
        removals = sink.removals,
        opaque_faces = sink.opaque_faces,
        water_faces = sink.water_faces,
        saved,
        stats = ?world.stats(),
        "Simulation finished"
    );
    Ok(())
}

/// Forward every queued message from `from` to `to` through the wire codec.
fn pump(from: &World, from_peer: PeerId, to: &World) -> anyhow::Result<usize> {
    let outgoing = from.drain_outgoing();
    for message in &outgoing {
        let bytes = network::encode(&message.message)?;
        to.handle_packet(from_peer, &bytes);
    }
    Ok(outgoing.len())
}

fn run_loopback(params: &SimParams) -> anyhow::Result<()> {
    let server = World::new(WorldConfig {
        role: NetworkRole::Server,
        ..params.world_config()
    });
    let client = World::new(WorldConfig {
        role: NetworkRole::Client,
        save_dir: params.save_dir.join("client"),
        ..params.world_config()
    });
    if params.reset {
        server.reset_world()?;
    }

    let server_observer = server.add_observer(walk(0));
    let client_observer = client.add_observer(walk(0));
    let mut sink = StatsSink::default();
    let mut messages = 0;

    for tick in 0..params.ticks {
        let position = walk(tick);
        server.set_observer_position(server_observer, position);
        client.set_observer_position(client_observer, position);

        server.tick();
        client.tick();
        messages += pump(&client, CLIENT_PEER, &server)?;
        messages += pump(&server, SERVER_PEER, &client)?;

        if tick == params.ticks / 2 {
            let placed =
                client.handle_add(ChunkPos::from_world(position), position, BlockType::Torch);
            info!(?placed, "Client requested torch");
        }
        client.render_pending(&mut sink);
    }

    let saved = server.save_all();
    info!(
        messages,
        uploads = sink.uploads,
        saved,
        server = ?server.stats(),
        client = ?client.stats(),
        "Loopback finished"
    );
    Ok(())
}

fn print_help() {
    eprintln!(
        "Voxlight headless simulation

USAGE:
    voxlight-sim [OPTIONS]

OPTIONS:
    --seed <N>                World generation seed (default: 42)
    --visible-distance <N>    Chunk visibility radius (default: 4)
    --save-dir <PATH>         Directory for chunk files (default: World)
    --ticks <N>               Number of simulation ticks (default: 200)
    --reset                   Delete saved chunks before starting
    --loopback                Run a server and a client world in-process
    -h, --help                Print this help message

ENVIRONMENT:
    RUST_LOG                  Log filter (e.g. info, voxlight_world=debug)"
    );
}
