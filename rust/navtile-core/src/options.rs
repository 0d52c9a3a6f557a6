use serde::{Deserialize, Serialize};

use crate::engine::QueryFilter;
use crate::geom::Vec3;

pub const DEFAULT_MAX_NODES: usize = 2048;
pub const DEFAULT_HALF_EXTENTS: Vec3 = [2.0, 4.0, 2.0];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Search node ceiling; also sizes every corridor and point buffer.
    pub max_nodes: usize,
    /// Search box used to snap path endpoints onto the mesh.
    pub half_extents: Vec3,
    pub include_flags: u16,
    pub exclude_flags: u16,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            half_extents: DEFAULT_HALF_EXTENTS,
            include_flags: 0xffff,
            exclude_flags: 0,
        }
    }
}

impl QueryOptions {
    pub fn filter(&self) -> QueryFilter {
        QueryFilter::with_flags(self.include_flags, self.exclude_flags)
    }
}
