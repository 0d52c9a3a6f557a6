use std::env;
use std::path::PathBuf;

use anyhow::Context;

use navtile_core::options::DEFAULT_MAX_NODES;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Tile-set file served at boot and re-read by `/admin/reload`.
    pub mesh_path: Option<PathBuf>,
    pub max_nodes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = get("NAVTILE_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match get("NAVTILE_PORT") {
            Some(s) => s.parse::<u16>().with_context(|| format!("NAVTILE_PORT={s:?}"))?,
            None => 8080,
        };
        let mesh_path = get("NAVTILE_MESH").filter(|s| !s.is_empty()).map(PathBuf::from);
        let max_nodes = match get("NAVTILE_MAX_NODES") {
            Some(s) => s.parse::<usize>().with_context(|| format!("NAVTILE_MAX_NODES={s:?}"))?,
            None => DEFAULT_MAX_NODES,
        };
        if max_nodes == 0 {
            anyhow::bail!("NAVTILE_MAX_NODES must be positive");
        }

        Ok(Self { host, port, mesh_path, max_nodes })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
