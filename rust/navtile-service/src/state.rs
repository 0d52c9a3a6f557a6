use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use arc_swap::ArcSwap;
use tracing::info;

use navtile_core::{read_tileset_bytes, NavMeshSearch, NavQuery, QueryOptions};

use crate::errors::AppError;

pub struct LoadedMesh {
    pub search: Arc<NavMeshSearch>,
    /// One session shared by every request; the lock serialises queries.
    pub query: Mutex<NavQuery>,
    pub mesh_hash: String,
    pub loaded_at_unix: u64,
}

impl LoadedMesh {
    pub fn query(&self) -> Result<MutexGuard<'_, NavQuery>, AppError> {
        self.query.lock().map_err(|_| AppError::Internal(anyhow::anyhow!("query session poisoned")))
    }
}

pub struct MeshState {
    pub path: Option<PathBuf>,
    pub options: QueryOptions,
    pub loaded: Option<LoadedMesh>,
}

impl MeshState {
    pub fn unloaded(path: Option<PathBuf>, options: QueryOptions) -> Self {
        Self { path, options, loaded: None }
    }

    /// Reads and indexes the tile set at `path`.
    pub fn load(path: &Path, options: QueryOptions) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
        let mesh_hash = blake3::hash(&bytes).to_hex().to_string();
        let mesh = read_tileset_bytes(&bytes).with_context(|| format!("decoding {:?}", path))?;
        let search = Arc::new(NavMeshSearch::new(mesh).with_context(|| format!("indexing {:?}", path))?);
        let query = Mutex::new(NavQuery::new(search.clone(), options.clone()));
        info!(path = ?path, tiles = search.tile_count(), hash = %mesh_hash, "tile set loaded");
        Ok(Self {
            path: Some(path.to_path_buf()),
            options,
            loaded: Some(LoadedMesh { search, query, mesh_hash, loaded_at_unix: now_unix() }),
        })
    }

    pub fn require(&self) -> Result<&LoadedMesh, AppError> {
        self.loaded.as_ref().ok_or_else(|| AppError::Unavailable("no tile set loaded".into()))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub current: Arc<ArcSwap<MeshState>>,
}

impl AppState {
    pub fn new(state: MeshState) -> Self {
        Self { current: Arc::new(ArcSwap::from_pointee(state)) }
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
