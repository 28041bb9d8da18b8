//! JSON chunk persistence.
//!
//! One file per chunk, `chunk_{cx}_{cy}_{cz}.json`, holding a flat object that
//! maps `"{x}_{y}_{z}"` local cell keys to block type integers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use voxlight_core::constants::CHUNK_VOLUME;
use voxlight_core::coords::{ChunkPos, LocalPos};
use voxlight_core::types::{BlockType, VoxelBlock};
use voxlight_core::{Error, Result};

/// Saves and loads chunk block data under one directory.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    save_dir: PathBuf,
}

impl ChunkStore {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// File path for a chunk.
    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.save_dir
            .join(format!("chunk_{}.json", pos.identifier()))
    }

    /// Check if a chunk has a saved file.
    pub fn exists(&self, pos: ChunkPos) -> bool {
        self.chunk_path(pos).is_file()
    }

    /// Write every cell of a chunk.
    pub fn save(&self, pos: ChunkPos, blocks: &[VoxelBlock]) -> Result<()> {
        if blocks.len() != CHUNK_VOLUME {
            return Err(Error::InvalidData(format!(
                "chunk {} has {} cells",
                pos.identifier(),
                blocks.len()
            )));
        }

        let cells: BTreeMap<String, i32> = blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (cell_key(LocalPos::from_index(index)), block.block_type.to_i32()))
            .collect();
        let json =
            serde_json::to_string(&cells).map_err(|e| Error::Serialization(e.to_string()))?;

        fs::create_dir_all(&self.save_dir)?;
        fs::write(self.chunk_path(pos), json)?;
        debug!(chunk = %pos.identifier(), "Saved chunk");
        Ok(())
    }

    /// Read a chunk back.
    ///
    /// Returns `Ok(None)` when no file exists. Cells missing from the file are air;
    /// keys that do not name a cell are ignored.
    pub fn load(&self, pos: ChunkPos) -> Result<Option<Vec<VoxelBlock>>> {
        let path = self.chunk_path(pos);
        if !path.is_file() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let cells: HashMap<String, i32> =
            serde_json::from_str(&json).map_err(|e| Error::Serialization(e.to_string()))?;

        let mut blocks = vec![VoxelBlock::AIR; CHUNK_VOLUME];
        let mut ignored = 0_usize;
        for (key, value) in cells {
            let Some(local) = parse_cell_key(&key) else {
                ignored += 1;
                continue;
            };
            blocks[local.to_index()] = VoxelBlock::new(BlockType::try_from(value)?);
        }
        if ignored > 0 {
            warn!(chunk = %pos.identifier(), ignored, "Ignored unknown keys in chunk file");
        }

        Ok(Some(blocks))
    }

    /// Delete every saved chunk file. Returns how many were removed.
    pub fn reset(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.save_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            let is_chunk_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("chunk_") && name.ends_with(".json"));
            if is_chunk_file {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn cell_key(local: LocalPos) -> String {
    format!("{}_{}_{}", local.x, local.y, local.z)
}

fn parse_cell_key(key: &str) -> Option<LocalPos> {
    let mut parts = key.split('_').map(str::parse::<i32>);
    let (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    LocalPos::try_from_ivec3(glam::IVec3::new(x, y, z))
}
