//! Runtime copy of one resident tile: decoded records plus the per-polygon
//! link lists the search walks.

use crate::geom::Vec3;
use crate::mesh::PolyRef;
use crate::tile::{BvNode, MeshHeader, OffMeshConnection, Poly, PolyDetail, TileFormatError, TileView, VERTS_PER_POLYGON};

/// Edge value of a link that leaves a ground polygon towards an off-mesh
/// connection polygon.
pub const LINK_EDGE_OFF_MESH: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub target: PolyRef,
    /// Index of the polygon edge the link leaves through.
    pub edge: u8,
    /// Neighbour tile side, or [`crate::tile::SIDE_INSIDE`] for links inside the tile.
    pub side: u8,
    /// Portal sub-range along the edge, quantised to 0..=255.
    pub bmin: u8,
    pub bmax: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeTile {
    pub(crate) slot: usize,
    pub(crate) salt: u32,
    pub(crate) base: PolyRef,
    pub(crate) header: MeshHeader,
    pub(crate) verts: Vec<Vec3>,
    pub(crate) polys: Vec<Poly>,
    pub(crate) links: Vec<Vec<Link>>,
    pub(crate) detail_meshes: Vec<PolyDetail>,
    pub(crate) detail_verts: Vec<Vec3>,
    pub(crate) detail_tris: Vec<[u8; 4]>,
    pub(crate) bv_nodes: Vec<BvNode>,
    pub(crate) off_mesh_cons: Vec<OffMeshConnection>,
}

impl RuntimeTile {
    /// Copies every record out of `view` and checks polygon shapes and all cross-section indices
    /// once, so later lookups can index directly.
    pub(crate) fn decode(view: &TileView<'_>, slot: usize, salt: u32, base: PolyRef) -> Result<Self, TileFormatError> {
        let header = *view.header();
        let verts: Vec<Vec3> = view.verts().collect();
        let polys: Vec<Poly> = view.polys().collect();
        let detail_meshes: Vec<PolyDetail> =
            (0..header.detail_mesh_count.max(0) as usize).filter_map(|i| view.detail_mesh(i)).collect();
        let detail_verts: Vec<Vec3> =
            (0..header.detail_vert_count.max(0) as usize).filter_map(|i| view.detail_vert(i)).collect();
        let detail_tris: Vec<[u8; 4]> =
            (0..header.detail_tri_count.max(0) as usize).filter_map(|i| view.detail_tri(i)).collect();
        let bv_nodes: Vec<BvNode> = (0..header.bv_node_count.max(0) as usize).filter_map(|i| view.bv_node(i)).collect();
        let off_mesh_cons: Vec<OffMeshConnection> = view.off_mesh_cons().collect();

        for (index, p) in polys.iter().enumerate() {
            let n = p.vert_count as usize;
            let shape_ok = if p.is_off_mesh() { n == 2 } else { (3..=VERTS_PER_POLYGON).contains(&n) };
            if !shape_ok || p.verts[..n].iter().any(|&v| v as usize >= verts.len()) {
                return Err(TileFormatError::InvalidIndex { what: "polygon vertex", index });
            }
        }
        if detail_meshes.len() > polys.len() {
            return Err(TileFormatError::InvalidIndex { what: "detail mesh", index: polys.len() });
        }
        for (index, pd) in detail_meshes.iter().enumerate() {
            let tris = pd.tri_base as usize..pd.tri_base as usize + pd.tri_count as usize;
            if tris.end > detail_tris.len() || pd.vert_base as usize + pd.vert_count as usize > detail_verts.len() {
                return Err(TileFormatError::InvalidIndex { what: "detail mesh", index });
            }
            let nv = polys[index].vert_count;
            let bad = detail_tris[tris]
                .iter()
                .flat_map(|t| &t[..3])
                .any(|&k| k >= nv && k - nv >= pd.vert_count);
            if bad {
                return Err(TileFormatError::InvalidIndex { what: "detail triangle", index });
            }
        }
        for (index, con) in off_mesh_cons.iter().enumerate() {
            let ok = polys.get(con.poly as usize).is_some_and(|p| p.is_off_mesh() && p.vert_count == 2);
            if !ok {
                return Err(TileFormatError::InvalidIndex { what: "off-mesh connection", index });
            }
        }

        let links = vec![Vec::new(); polys.len()];
        Ok(RuntimeTile {
            slot,
            salt,
            base,
            header,
            verts,
            polys,
            links,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_nodes,
            off_mesh_cons,
        })
    }

    pub(crate) fn poly_ref(&self, ip: usize) -> PolyRef { self.base | ip as PolyRef }

    pub(crate) fn vert(&self, ip: usize, k: usize) -> Vec3 { self.verts[self.polys[ip].verts[k] as usize] }

    pub(crate) fn poly_verts(&self, ip: usize) -> ([Vec3; VERTS_PER_POLYGON], usize) {
        let n = self.polys[ip].vert_count as usize;
        let mut out = [[0.0; 3]; VERTS_PER_POLYGON];
        for (k, v) in out.iter_mut().enumerate().take(n) {
            *v = self.vert(ip, k);
        }
        (out, n)
    }

    /// Height triangles of a ground polygon: its detail sub-mesh, or a fan over
    /// the polygon when the tile carries no detail data for it.
    pub(crate) fn triangle_count(&self, ip: usize) -> usize {
        match self.detail_meshes.get(ip) {
            Some(pd) => pd.tri_count as usize,
            None => (self.polys[ip].vert_count as usize).saturating_sub(2),
        }
    }

    pub(crate) fn triangle(&self, ip: usize, k: usize) -> [Vec3; 3] {
        let p = &self.polys[ip];
        match self.detail_meshes.get(ip) {
            Some(pd) => {
                let t = self.detail_tris[pd.tri_base as usize + k];
                let v = |i: u8| {
                    if i < p.vert_count {
                        self.verts[p.verts[i as usize] as usize]
                    } else {
                        self.detail_verts[pd.vert_base as usize + (i - p.vert_count) as usize]
                    }
                };
                [v(t[0]), v(t[1]), v(t[2])]
            }
            None => [self.vert(ip, 0), self.vert(ip, k + 1), self.vert(ip, k + 2)],
        }
    }
}
