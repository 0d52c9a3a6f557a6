//! Search engine over a tile container: runtime links between polygons and
//! tiles, spatial lookups, A* corridor search, string pulling and random
//! sampling.

mod filter;
mod links;
mod locate;
mod path;
mod random;
mod straight;
mod tile;

pub use filter::{QueryFilter, MAX_AREAS};
pub use locate::NearestPoly;
pub use path::{NodePool, H_SCALE};
pub use straight::{StraightPathOptions, StraightPoint, STRAIGHTPATH_END, STRAIGHTPATH_OFFMESH, STRAIGHTPATH_START};
pub use tile::{Link, LINK_EDGE_OFF_MESH};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::geom::{vcross, vsub, Vec3};
use crate::mesh::{NavMesh, PolyRef};
use crate::tile::{Poly, TileFormatError, TileView};

use tile::RuntimeTile;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("tile slot {slot}: {source}")]
    Tile { slot: usize, #[source] source: TileFormatError },
    #[error("invalid polygon reference {0:#x}")]
    InvalidRef(PolyRef),
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
    #[error("no portal between {from:#x} and {to:#x}")]
    NoPortal { from: PolyRef, to: PolyRef },
}

/// Detail flags reported alongside a successful search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStatus {
    /// The result stops short of the requested goal.
    pub partial: bool,
    /// The node pool ran out while searching.
    pub out_of_nodes: bool,
    /// The output buffer could not hold the whole result.
    pub buffer_too_small: bool,
}

/// Read-only search graph built once from a [`NavMesh`]. Shared between
/// queries; per-query scratch state lives in [`NodePool`] and the caller's
/// buffers.
#[derive(Debug)]
pub struct NavMeshSearch {
    mesh: NavMesh,
    tiles: Vec<Option<RuntimeTile>>,
    grid: FxHashMap<(i32, i32), Vec<usize>>,
}

impl NavMeshSearch {
    pub fn new(mesh: NavMesh) -> Result<Self, SearchError> {
        let mut tiles: Vec<Option<RuntimeTile>> = vec![None; mesh.max_tiles()];
        let mut grid: FxHashMap<(i32, i32), Vec<usize>> = FxHashMap::default();
        for (tile_ref, t) in mesh.tiles() {
            let (salt, slot, _) = mesh.decode_poly_ref(tile_ref);
            let view = TileView::parse(t.data()).map_err(|source| SearchError::Tile { slot, source })?;
            let rt = RuntimeTile::decode(&view, slot, salt, tile_ref).map_err(|source| SearchError::Tile { slot, source })?;
            grid.entry((rt.header.x, rt.header.y)).or_default().push(slot);
            tiles[slot] = Some(rt);
        }

        let mut search = NavMeshSearch { mesh, tiles, grid };
        search.connect_all();
        let links: usize = search.resident().map(|t| t.links.iter().map(Vec::len).sum::<usize>()).sum();
        debug!(tiles = search.grid.len(), links, "search graph built");
        Ok(search)
    }

    pub fn mesh(&self) -> &NavMesh { &self.mesh }

    pub fn tile_count(&self) -> usize { self.resident().count() }

    fn resident(&self) -> impl Iterator<Item = &RuntimeTile> + '_ { self.tiles.iter().flatten() }

    pub(crate) fn tile_and_poly(&self, r: PolyRef) -> Result<(&RuntimeTile, usize), SearchError> {
        let (salt, slot, ip) = self.mesh.decode_poly_ref(r);
        match self.tiles.get(slot).and_then(Option::as_ref) {
            Some(t) if t.salt == salt && ip < t.polys.len() => Ok((t, ip)),
            _ => Err(SearchError::InvalidRef(r)),
        }
    }

    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool { self.tile_and_poly(r).is_ok() }

    pub fn poly(&self, r: PolyRef) -> Result<&Poly, SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        Ok(&tile.polys[ip])
    }

    pub fn poly_vertices(&self, r: PolyRef) -> Result<Vec<Vec3>, SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        let (verts, n) = tile.poly_verts(ip);
        Ok(verts[..n].to_vec())
    }

    pub fn links(&self, r: PolyRef) -> Result<&[Link], SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        Ok(&tile.links[ip])
    }

    /// Unnormalised normal from the first three vertices; a negative `y`
    /// means the polygon winds the wrong way up.
    pub fn poly_normal(&self, r: PolyRef) -> Result<Vec3, SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        if tile.polys[ip].vert_count < 3 {
            return Err(SearchError::InvalidParam("polygon has fewer than three vertices"));
        }
        let v0 = tile.vert(ip, 0);
        Ok(vcross(vsub(tile.vert(ip, 1), v0), vsub(tile.vert(ip, 2), v0)))
    }

    /// References of every ground polygon, tile by tile in slot order.
    pub fn ground_polys(&self) -> impl Iterator<Item = PolyRef> + '_ {
        self.resident().flat_map(|t| {
            t.polys.iter().enumerate().filter(|(_, p)| !p.is_off_mesh()).map(move |(ip, _)| t.poly_ref(ip))
        })
    }
}
