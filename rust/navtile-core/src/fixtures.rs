//! Synthetic source data for tests: flat grids of unit quads laid out so that
//! neighbouring tiles share their border edges.

use byteorder::{ByteOrder, LittleEndian};

use crate::convert::{convert, ConvertError};
use crate::geom::Vec3;
use crate::mesh::{NavMesh, NavMeshParams};
use crate::source::{OffMeshLink, Payload, SourceDetail, SourceFormat, SourceHeader, SourceMesh, SourceParams, SourcePoly, SourceTile, SOURCE_VERSION};
use crate::tile::builder::{build_tile, AgentParams};
use crate::tile::{BvNode, EXT_LINK, NAVMESH_MAGIC};

/// Quantisation cells per world unit in fixture BV trees.
pub const QUANT: f32 = 4.0;

/// An `nx` by `nz` grid of unit quads at height `height`. Tile `(x, y)` covers
/// `[x*nx, (x+1)*nx] x [y*nz, (y+1)*nz]` on the xz plane. Border edges are
/// marked as portals; every quad gets a centre detail vertex and a fan of four
/// detail triangles.
pub fn quad_grid_tile(x: i32, y: i32, nx: usize, nz: usize, height: f32) -> SourceTile {
    let ox = x as f32 * nx as f32;
    let oz = y as f32 * nz as f32;
    let vid = |i: usize, k: usize| (k * (nx + 1) + i) as u16;

    let mut verts = Vec::with_capacity((nx + 1) * (nz + 1));
    for k in 0..=nz {
        for i in 0..=nx {
            verts.push([ox + i as f32, height, oz + k as f32]);
        }
    }

    let mut polys = Vec::with_capacity(nx * nz);
    let mut detail_meshes = Vec::new();
    let mut detail_verts = Vec::new();
    let mut detail_tris = Vec::new();
    for k in 0..nz {
        for i in 0..nx {
            let pid = |i: usize, k: usize| (k * nx + i + 1) as u16;
            let mut p = SourcePoly { vert_count: 4, area: 0, flags: 1, ..Default::default() };
            p.verts[..4].copy_from_slice(&[vid(i, k), vid(i, k + 1), vid(i + 1, k + 1), vid(i + 1, k)]);
            p.neis[0] = if i > 0 { pid(i - 1, k) } else { EXT_LINK | 4 };
            p.neis[1] = if k + 1 < nz { pid(i, k + 1) } else { EXT_LINK | 2 };
            p.neis[2] = if i + 1 < nx { pid(i + 1, k) } else { EXT_LINK };
            p.neis[3] = if k > 0 { pid(i, k - 1) } else { EXT_LINK | 6 };
            polys.push(p);

            detail_meshes.push(SourceDetail {
                vert_base: detail_verts.len() as u32,
                tri_base: detail_tris.len() as u32,
                vert_count: 1,
                tri_count: 4,
            });
            detail_verts.push([ox + i as f32 + 0.5, height, oz + k as f32 + 0.5]);
            for e in 0..4u16 {
                detail_tris.push([e, (e + 1) % 4, 4, 0]);
            }
        }
    }

    let bmin = [ox, height, oz];
    let bmax = [ox + nx as f32, height, oz + nz as f32];
    let bv_nodes = bv_tree(&polys, &verts, bmin);
    let header = SourceHeader {
        magic: NAVMESH_MAGIC,
        version: SOURCE_VERSION,
        x,
        y,
        user_id: 0,
        poly_count: polys.len() as i32,
        vert_count: verts.len() as i32,
        detail_mesh_count: detail_meshes.len() as i32,
        detail_vert_count: detail_verts.len() as i32,
        detail_tri_count: detail_tris.len() as i32,
        bv_node_count: bv_nodes.len() as i32,
        bmin,
        bmax,
        bv_quant_factor: QUANT,
    };
    SourceTile { header, verts, polys, detail_meshes, detail_verts, detail_tris, bv_nodes }
}

fn bv_tree(polys: &[SourcePoly], verts: &[Vec3], bmin: Vec3) -> Vec<BvNode> {
    let q = |v: f32, o: f32, up: bool| {
        let f = (v - o) * QUANT;
        (if up { f.ceil() } else { f.floor() }).clamp(0.0, 65535.0) as u16
    };
    let mut items: Vec<BvNode> = polys
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut n = BvNode { bmin: [u16::MAX; 3], bmax: [0; 3], i: i as i32 };
            for &vi in &p.verts[..p.vert_count as usize] {
                let v = verts[vi as usize];
                for a in 0..3 {
                    n.bmin[a] = n.bmin[a].min(q(v[a], bmin[a], false));
                    n.bmax[a] = n.bmax[a].max(q(v[a], bmin[a], true));
                }
            }
            n
        })
        .collect();
    let mut nodes = Vec::with_capacity(polys.len() * 2);
    subdivide(&mut items, &mut nodes);
    nodes
}

fn subdivide(items: &mut [BvNode], nodes: &mut Vec<BvNode>) {
    if items.len() == 1 {
        nodes.push(items[0]);
        return;
    }
    if items.is_empty() {
        return;
    }
    let mut node = BvNode { bmin: [u16::MAX; 3], bmax: [0; 3], i: 0 };
    for it in items.iter() {
        for a in 0..3 {
            node.bmin[a] = node.bmin[a].min(it.bmin[a]);
            node.bmax[a] = node.bmax[a].max(it.bmax[a]);
        }
    }
    let at = nodes.len();
    nodes.push(node);
    let axis = if node.bmax[0] - node.bmin[0] >= node.bmax[2] - node.bmin[2] { 0 } else { 2 };
    items.sort_by_key(|n| n.bmin[axis]);
    let mid = items.len() / 2;
    let (left, right) = items.split_at_mut(mid);
    subdivide(left, nodes);
    subdivide(right, nodes);
    // internal nodes store the negated escape offset
    nodes[at].i = -((nodes.len() - at) as i32);
}

pub fn link_between(start: Vec3, end: Vec3, bidirectional: bool) -> OffMeshLink {
    OffMeshLink { start, end, radius: 0.5, link_type: 0, area: 0, bidirectional }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A text asset in the exporter's layout holding `tiles` and `links`.
pub fn text_asset(tiles: &[SourceTile], links: &[OffMeshLink]) -> String {
    let mut s = String::from("%YAML 1.1\n%TAG !u! tag:unity3d.com,2011:\n--- !u!238 &23800000\nNavMeshData:\n  m_NavMeshTiles:\n");
    for t in tiles {
        s.push_str(&format!("  - m_MeshData: {}\n", hex(&t.encode())));
    }
    s.push_str("  m_NavMeshBuildSettings:\n    walkableHeight: 2\n    walkableRadius: 0.5\n    walkableClimb: 0.4166667\n");
    s.push_str(&format!("    cellSize: {}\n", 1.0 / QUANT));
    s.push_str("  m_OffMeshLinks:\n");
    for l in links {
        s.push_str(&format!(
            "  - m_Start: {{x: {}, y: {}, z: {}}}\n    m_End: {{x: {}, y: {}, z: {}}}\n    m_Radius: {}\n    m_LinkType: {}\n    m_Area: {}\n    m_LinkDirection: {}\n",
            l.start[0], l.start[1], l.start[2], l.end[0], l.end[1], l.end[2], l.radius, l.link_type, l.area, l.bidirectional as u32
        ));
    }
    s
}

/// A binary asset: a short preamble, then each tile record prefixed by its length.
pub fn binary_asset(tiles: &[SourceTile]) -> Vec<u8> {
    let mut out = b"NAVASSET".to_vec();
    out.extend_from_slice(&[0u8; 8]);
    for t in tiles {
        let payload = t.encode();
        let mut len = [0u8; 4];
        LittleEndian::write_i32(&mut len, payload.len() as i32);
        out.extend_from_slice(&len);
        out.extend_from_slice(&payload);
    }
    out
}

/// `tx` by `tz` tiles of `n` by `n` quads each, all at `height`.
pub fn grid_source(tx: i32, tz: i32, n: usize, height: f32, links: &[OffMeshLink]) -> SourceMesh {
    let mut payloads = Vec::new();
    for y in 0..tz {
        for x in 0..tx {
            let bytes = quad_grid_tile(x, y, n, n, height).encode();
            payloads.push(Payload { offset: 0, declared_len: bytes.len(), bytes });
        }
    }
    SourceMesh {
        format: SourceFormat::Text,
        params: SourceParams { cell_size: 1.0 / QUANT, ..Default::default() }.with_defaults(),
        payloads,
        off_mesh: links.to_vec(),
    }
}

pub fn grid_navmesh(tx: i32, tz: i32, n: usize, links: &[OffMeshLink]) -> Result<NavMesh, ConvertError> {
    Ok(convert(&grid_source(tx, tz, n, 0.0, links))?.mesh)
}

/// Builds and registers `tiles` as given, with a fixed tile size instead of
/// the vote.
pub fn navmesh_of(tiles: &[SourceTile], links: &[OffMeshLink], tile_size: f32) -> Result<NavMesh, ConvertError> {
    let mut mesh = NavMesh::new(NavMeshParams::for_tile_count(tiles.len()))?;
    for t in tiles {
        let (x, y) = (t.header.x, t.header.y);
        let built = build_tile(t, links, &AgentParams::default()).map_err(|source| ConvertError::Layout { x, y, source })?;
        mesh.add_tile(built.data, None).map_err(|source| ConvertError::Mesh { x, y, source })?;
    }
    mesh.set_tile_size(tile_size);
    Ok(mesh)
}
