//! Re-encodes one decoded source tile, plus the off-mesh connections it owns,
//! into a target tile binary.

use tracing::trace;

use crate::geom::Vec3;
use crate::source::{OffMeshLink, SourceTile};

use super::{
    write_vert, BvNode, MeshHeader, OffMeshConnection, Poly, PolyDetail, Section, TileCounts, TileLayout, EXT_LINK,
    NAVMESH_MAGIC, NAVMESH_VERSION, OFFMESH_CON_BIDIR, POLYFLAGS_JUMP, POLYTYPE_GROUND, POLYTYPE_OFFMESH_CONNECTION,
    SIDE_INSIDE, VERTS_PER_POLYGON,
};

/// Agent dimensions written into every tile header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentParams {
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        AgentParams { walkable_height: 2.0, walkable_radius: 0.5, walkable_climb: 0.4166667 }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("detail mesh {index} has {verts} verts / {tris} tris, limit is 255")]
    DetailOverflow { index: usize, verts: u16, tris: u16 },
    #[error("detail triangle {index} references vertex {value}, limit is 255")]
    DetailIndexOverflow { index: usize, value: u16 },
    #[error("{what} count {count} exceeds 16-bit indices")]
    IndexOverflow { what: &'static str, count: usize },
    #[error("polygon {index} has {vert_count} vertices")]
    InvalidPolygon { index: usize, vert_count: u8 },
    #[error("write past end of section {0}")]
    SectionOverflow(&'static str),
}

const XP: u8 = 1 << 0;
const ZP: u8 = 1 << 1;
const XM: u8 = 1 << 2;
const ZM: u8 = 1 << 3;

/// Side of `pt` relative to the xz extent of `[bmin, bmax]`: 0..=7 starting at
/// +x and turning towards +z, or [`SIDE_INSIDE`].
pub fn classify_off_mesh_point(pt: Vec3, bmin: Vec3, bmax: Vec3) -> u8 {
    let mut outcode = 0;
    if pt[0] >= bmax[0] { outcode |= XP; }
    if pt[2] >= bmax[2] { outcode |= ZP; }
    if pt[0] < bmin[0] { outcode |= XM; }
    if pt[2] < bmin[2] { outcode |= ZM; }
    side_of_outcode(outcode)
}

fn side_of_outcode(outcode: u8) -> u8 {
    match outcode {
        XP => 0,
        c if c == XP | ZP => 1,
        ZP => 2,
        c if c == XM | ZP => 3,
        XM => 4,
        c if c == XM | ZM => 5,
        ZM => 6,
        c if c == XP | ZM => 7,
        _ => SIDE_INSIDE,
    }
}

/// Finished tile binary and what went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTile {
    pub data: Vec<u8>,
    pub x: i32,
    pub y: i32,
    /// Indices into the candidate connection list, in storage order.
    pub stored: Vec<usize>,
    pub max_links: usize,
}

impl BuiltTile {
    pub fn header(&self) -> MeshHeader {
        MeshHeader::read(&self.data)
    }
}

struct Classified {
    stored: Vec<usize>,
    /// Side of each stored connection's end point.
    end_sides: Vec<u8>,
    link_slots: usize,
}

fn classify_links(src: &SourceTile, links: &[OffMeshLink], climb: f32) -> Classified {
    let mut out = Classified { stored: Vec::new(), end_sides: Vec::new(), link_slots: 0 };
    if links.is_empty() {
        return out;
    }

    let heights: Box<dyn Iterator<Item = f32>> = if src.detail_verts.is_empty() {
        Box::new(src.verts.iter().map(|v| v[1]))
    } else {
        Box::new(src.detail_verts.iter().map(|v| v[1]))
    };
    let (hmin, hmax) = heights.fold((f32::MAX, -f32::MAX), |(lo, hi), h| (lo.min(h), hi.max(h)));
    let mut bmin = src.header.bmin;
    let mut bmax = src.header.bmax;
    bmin[1] = hmin - climb;
    bmax[1] = hmax + climb;

    for (i, link) in links.iter().enumerate() {
        let mut start = classify_off_mesh_point(link.start, bmin, bmax);
        let end = classify_off_mesh_point(link.end, bmin, bmax);
        // starts outside the height band cannot touch the mesh
        if start == SIDE_INSIDE && (link.start[1] < bmin[1] || link.start[1] > bmax[1]) {
            start = 0;
        }
        if start == SIDE_INSIDE {
            out.link_slots += 1;
            out.stored.push(i);
            out.end_sides.push(end);
        }
        if end == SIDE_INSIDE {
            out.link_slots += 1;
        }
    }
    out
}

fn slot(buf: &mut [u8], s: Section, i: usize, size: usize) -> Result<&mut [u8], LayoutError> {
    let r = s.record(i, size).ok_or(LayoutError::SectionOverflow(s.name))?;
    buf.get_mut(r).ok_or(LayoutError::SectionOverflow(s.name))
}

fn to_u16(what: &'static str, count: usize) -> Result<u16, LayoutError> {
    u16::try_from(count).map_err(|_| LayoutError::IndexOverflow { what, count })
}

/// Builds the target binary for `src`. Only connections in `links` whose start
/// lies inside the tile are stored; the rest are ignored here.
pub fn build_tile(src: &SourceTile, links: &[OffMeshLink], agent: &AgentParams) -> Result<BuiltTile, LayoutError> {
    let classified = classify_links(src, links, agent.walkable_climb);
    let stored = classified.stored.len();

    let mut edges = 0usize;
    let mut portals = 0usize;
    for (index, p) in src.polys.iter().enumerate() {
        if !(3..=VERTS_PER_POLYGON).contains(&(p.vert_count as usize)) {
            return Err(LayoutError::InvalidPolygon { index, vert_count: p.vert_count });
        }
        edges += p.vert_count as usize;
        portals += p.neis[..p.vert_count as usize].iter().filter(|&&n| n & EXT_LINK != 0).count();
    }

    let total_polys = src.polys.len() + stored;
    let total_verts = src.verts.len() + stored * 2;
    to_u16("polygon", total_polys)?;
    to_u16("vertex", total_verts)?;
    let vert_base = src.verts.len();

    let counts = TileCounts {
        polys: total_polys,
        verts: total_verts,
        // the runtime may add two links per off-mesh endpoint on each side
        max_links: edges + portals * 2 + classified.link_slots * 4,
        detail_meshes: src.detail_meshes.len(),
        detail_verts: src.detail_verts.len(),
        detail_tris: src.detail_tris.len(),
        bv_nodes: src.polys.len() * 2,
        off_mesh_cons: stored,
    };
    let layout = TileLayout::compute(&counts);
    let mut data = vec![0u8; layout.total];

    let header = MeshHeader {
        magic: NAVMESH_MAGIC,
        version: NAVMESH_VERSION,
        x: src.header.x,
        y: src.header.y,
        layer: 0,
        user_id: src.header.user_id,
        poly_count: total_polys as i32,
        vert_count: total_verts as i32,
        max_link_count: counts.max_links as i32,
        detail_mesh_count: counts.detail_meshes as i32,
        detail_vert_count: counts.detail_verts as i32,
        detail_tri_count: counts.detail_tris as i32,
        bv_node_count: counts.bv_nodes as i32,
        off_mesh_con_count: stored as i32,
        off_mesh_base: src.polys.len() as i32,
        walkable_height: agent.walkable_height,
        walkable_radius: agent.walkable_radius,
        walkable_climb: agent.walkable_climb,
        bmin: src.header.bmin,
        bmax: src.header.bmax,
        bv_quant_factor: src.header.bv_quant_factor,
    };
    header.write(slot(&mut data, layout.header, 0, MeshHeader::SIZE)?);

    for (i, v) in src.verts.iter().enumerate() {
        write_vert(slot(&mut data, layout.verts, i, 12)?, *v);
    }
    for (n, &li) in classified.stored.iter().enumerate() {
        let link = &links[li];
        write_vert(slot(&mut data, layout.verts, vert_base + n * 2, 12)?, link.start);
        write_vert(slot(&mut data, layout.verts, vert_base + n * 2 + 1, 12)?, link.end);
    }

    for (i, sp) in src.polys.iter().enumerate() {
        let mut p = Poly { verts: sp.verts, neis: sp.neis, flags: sp.flags as u16, vert_count: sp.vert_count, ..Default::default() };
        p.set_area(sp.area);
        p.set_type(POLYTYPE_GROUND);
        p.write(slot(&mut data, layout.polys, i, Poly::SIZE)?);
    }
    for (n, &li) in classified.stored.iter().enumerate() {
        let mut p = Poly { flags: POLYFLAGS_JUMP, vert_count: 2, ..Default::default() };
        p.verts[0] = (vert_base + n * 2) as u16;
        p.verts[1] = (vert_base + n * 2 + 1) as u16;
        p.set_area((links[li].area & 0x3f) as u8);
        p.set_type(POLYTYPE_OFFMESH_CONNECTION);
        p.write(slot(&mut data, layout.polys, src.polys.len() + n, Poly::SIZE)?);
    }

    for (index, d) in src.detail_meshes.iter().enumerate() {
        if d.vert_count > 255 || d.tri_count > 255 {
            return Err(LayoutError::DetailOverflow { index, verts: d.vert_count, tris: d.tri_count });
        }
        let pd = PolyDetail { vert_base: d.vert_base, tri_base: d.tri_base, vert_count: d.vert_count as u8, tri_count: d.tri_count as u8 };
        pd.write(slot(&mut data, layout.detail_meshes, index, PolyDetail::SIZE)?);
    }
    for (i, v) in src.detail_verts.iter().enumerate() {
        write_vert(slot(&mut data, layout.detail_verts, i, 12)?, *v);
    }
    for (index, t) in src.detail_tris.iter().enumerate() {
        let b = slot(&mut data, layout.detail_tris, index, 4)?;
        for k in 0..4 {
            b[k] = u8::try_from(t[k]).map_err(|_| LayoutError::DetailIndexOverflow { index, value: t[k] })?;
        }
    }

    for (i, node) in src.bv_nodes.iter().take(counts.bv_nodes).enumerate() {
        node.write(slot(&mut data, layout.bv_nodes, i, BvNode::SIZE)?);
    }

    for (n, (&li, &side)) in classified.stored.iter().zip(&classified.end_sides).enumerate() {
        let link = &links[li];
        let con = OffMeshConnection {
            start: link.start,
            end: link.end,
            rad: link.radius,
            poly: (src.polys.len() + n) as u16,
            flags: if link.bidirectional { OFFMESH_CON_BIDIR } else { 0 },
            side,
            user_id: 0,
        };
        con.write(slot(&mut data, layout.off_mesh_cons, n, OffMeshConnection::SIZE)?);
    }

    trace!(x = src.header.x, y = src.header.y, bytes = data.len(), stored, max_links = counts.max_links, "tile built");
    Ok(BuiltTile { data, x: src.header.x, y: src.header.y, stored: classified.stored, max_links: counts.max_links })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{link_between, quad_grid_tile};
    use crate::tile::TileView;

    #[test]
    fn every_outcode_maps_to_one_side() {
        let expected = [
            (0u8, SIDE_INSIDE),
            (XP, 0),
            (XP | ZP, 1),
            (ZP, 2),
            (XM | ZP, 3),
            (XM, 4),
            (XM | ZM, 5),
            (ZM, 6),
            (XP | ZM, 7),
        ];
        for code in 0u8..16 {
            let side = side_of_outcode(code);
            match expected.iter().find(|(c, _)| *c == code) {
                Some(&(_, s)) => assert_eq!(side, s, "outcode {code:#06b}"),
                None => assert_eq!(side, SIDE_INSIDE, "outcode {code:#06b}"),
            }
        }
        assert_eq!(side_of_outcode(XP | XM), SIDE_INSIDE);
        assert_eq!(side_of_outcode(ZP | ZM), SIDE_INSIDE);
    }

    #[test]
    fn classify_uses_half_open_bounds() {
        let bmin = [0.0, 0.0, 0.0];
        let bmax = [10.0, 5.0, 10.0];
        assert_eq!(classify_off_mesh_point([5.0, 0.0, 5.0], bmin, bmax), SIDE_INSIDE);
        assert_eq!(classify_off_mesh_point([0.0, 0.0, 0.0], bmin, bmax), SIDE_INSIDE);
        assert_eq!(classify_off_mesh_point([10.0, 0.0, 5.0], bmin, bmax), 0);
        assert_eq!(classify_off_mesh_point([10.0, 0.0, 10.0], bmin, bmax), 1);
        assert_eq!(classify_off_mesh_point([-0.1, 0.0, 5.0], bmin, bmax), 4);
        assert_eq!(classify_off_mesh_point([11.0, 0.0, -1.0], bmin, bmax), 7);
    }

    #[test]
    fn ten_polygon_tile_without_links() {
        let mut src = quad_grid_tile(0, 0, 5, 2, 0.0);
        while src.verts.len() < 30 {
            src.verts.push([0.0, 0.0, 0.0]);
        }
        let built = build_tile(&src, &[], &AgentParams::default()).unwrap();
        let view = TileView::parse(&built.data).unwrap();
        let h = view.header();
        assert_eq!(h.poly_count, 10);
        assert_eq!(h.vert_count, 30);
        assert_eq!(h.off_mesh_con_count, 0);
        assert_eq!(view.layout().off_mesh_cons.len, 0);
        assert_eq!(h.off_mesh_base, 10);
        assert_eq!(h.bv_node_count, 20);
        assert_eq!(built.data.len(), view.layout().total);
    }

    #[test]
    fn start_inside_is_stored_and_high_start_is_dropped() {
        let src = quad_grid_tile(0, 0, 2, 2, 0.0);
        let inside = link_between([1.0, 0.0, 1.0], [30.0, 0.0, 1.0], true);
        let built = build_tile(&src, &[inside], &AgentParams::default()).unwrap();
        let view = TileView::parse(&built.data).unwrap();
        assert_eq!(built.stored, vec![0]);
        assert_eq!(view.header().off_mesh_con_count, 1);
        assert_eq!(view.header().poly_count as usize, src.polys.len() + 1);
        assert_eq!(view.header().vert_count as usize, src.verts.len() + 2);

        let high = link_between([1.0, 100.0, 1.0], [30.0, 0.0, 1.0], true);
        let built = build_tile(&src, &[high], &AgentParams::default()).unwrap();
        assert!(built.stored.is_empty());
        assert_eq!(built.header().off_mesh_con_count, 0);
    }

    #[test]
    fn off_mesh_records_are_populated() {
        let src = quad_grid_tile(0, 0, 2, 2, 0.0);
        let mut link = link_between([1.0, 0.0, 1.0], [30.0, 0.0, 1.0], false);
        link.area = 0x45;
        link.radius = 0.6;
        let built = build_tile(&src, &[link], &AgentParams::default()).unwrap();
        let view = TileView::parse(&built.data).unwrap();
        let base = src.polys.len();

        let poly = view.poly(base).unwrap();
        assert!(poly.is_off_mesh());
        assert_eq!(poly.vert_count, 2);
        assert_eq!(poly.flags, POLYFLAGS_JUMP);
        assert_eq!(poly.area(), 0x05);
        assert_eq!(poly.neis, [0; VERTS_PER_POLYGON]);
        assert_eq!(view.vert(poly.verts[0] as usize), Some(link.start));
        assert_eq!(view.vert(poly.verts[1] as usize), Some(link.end));

        let con = view.off_mesh_con(0).unwrap();
        assert_eq!(con.poly as usize, base);
        assert_eq!(con.rad, 0.6);
        assert!(!con.is_bidirectional());
        assert_eq!(con.side, 0);
    }

    #[test]
    fn link_slots_reserve_four_per_inside_endpoint() {
        let src = quad_grid_tile(0, 0, 1, 1, 0.0);
        let none = build_tile(&src, &[], &AgentParams::default()).unwrap();
        let both = link_between([0.2, 0.0, 0.2], [0.8, 0.0, 0.8], true);
        let built = build_tile(&src, &[both], &AgentParams::default()).unwrap();
        assert_eq!(built.max_links, none.max_links + 8);
    }

    #[test]
    fn ground_polys_copy_flags_and_neighbours() {
        let mut src = quad_grid_tile(0, 0, 2, 1, 0.0);
        src.polys[1].flags = 0x0001_0003;
        src.polys[1].area = 7;
        let built = build_tile(&src, &[], &AgentParams::default()).unwrap();
        let view = TileView::parse(&built.data).unwrap();
        let p = view.poly(1).unwrap();
        assert_eq!(p.flags, 0x0003);
        assert_eq!(p.area(), 7);
        assert_eq!(p.poly_type(), POLYTYPE_GROUND);
        assert_eq!(p.neis, src.polys[1].neis);
        assert_eq!(view.detail_tri(0).map(|t| t[0] as u16), Some(src.detail_tris[0][0]));
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let src = quad_grid_tile(2, 3, 3, 3, 1.0);
        let link = link_between([7.0, 1.0, 10.0], [8.5, 1.0, 11.5], true);
        let a = build_tile(&src, &[link], &AgentParams::default()).unwrap();
        let b = build_tile(&src, &[link], &AgentParams::default()).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn detail_overflow_is_an_error() {
        let mut src = quad_grid_tile(0, 0, 1, 1, 0.0);
        src.detail_meshes[0].tri_count = 300;
        let err = build_tile(&src, &[], &AgentParams::default()).unwrap_err();
        assert_eq!(err, LayoutError::DetailOverflow { index: 0, verts: src.detail_meshes[0].vert_count, tris: 300 });

        let mut src = quad_grid_tile(0, 0, 1, 1, 0.0);
        src.detail_tris[0][1] = 256;
        assert!(matches!(build_tile(&src, &[], &AgentParams::default()), Err(LayoutError::DetailIndexOverflow { index: 0, value: 256 })));
    }

    #[test]
    fn oversized_polygon_is_rejected() {
        let mut src = quad_grid_tile(0, 0, 1, 1, 0.0);
        src.polys[0].vert_count = 7;
        assert_eq!(build_tile(&src, &[], &AgentParams::default()).unwrap_err(), LayoutError::InvalidPolygon { index: 0, vert_count: 7 });
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        for vert_count in [0u8, 2] {
            let mut src = quad_grid_tile(0, 0, 2, 1, 0.0);
            src.polys[1].vert_count = vert_count;
            assert_eq!(
                build_tile(&src, &[], &AgentParams::default()).unwrap_err(),
                LayoutError::InvalidPolygon { index: 1, vert_count }
            );
        }
    }
}
