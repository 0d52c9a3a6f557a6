use std::ops::Range;

use crate::geom::align4;

use super::{BvNode, MeshHeader, OffMeshConnection, Poly, PolyDetail, LINK_SIZE};

/// One contiguous region of a packed buffer. `len` is the payload length; the
/// next section starts at `offset + align4(len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
}

impl Section {
    pub fn end(&self) -> usize { self.offset + self.len }
    pub fn range(&self) -> Range<usize> { self.offset..self.end() }

    /// Byte range of record `i` of `size` bytes, if it lies inside the section.
    pub fn record(&self, i: usize, size: usize) -> Option<Range<usize>> {
        let start = i.checked_mul(size)?;
        let end = start.checked_add(size)?;
        if end > self.len { return None; }
        Some(self.offset + start..self.offset + end)
    }
}

/// Lays sections out back to back, each padded to 4 bytes.
#[derive(Debug, Default, Clone)]
pub struct SectionTable {
    sections: Vec<Section>,
    cursor: usize,
}

impl SectionTable {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, name: &'static str, count: usize, size: usize) -> Section {
        let section = Section { name, offset: self.cursor, len: count.saturating_mul(size) };
        self.cursor = self.cursor.saturating_add(align4(section.len));
        self.sections.push(section);
        section
    }

    pub fn sections(&self) -> &[Section] { &self.sections }
    pub fn total(&self) -> usize { self.cursor }
}

/// Element counts of a target tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileCounts {
    pub polys: usize,
    pub verts: usize,
    pub max_links: usize,
    pub detail_meshes: usize,
    pub detail_verts: usize,
    pub detail_tris: usize,
    pub bv_nodes: usize,
    pub off_mesh_cons: usize,
}

impl TileCounts {
    pub fn from_header(h: &MeshHeader) -> Option<Self> {
        let n = |v: i32| usize::try_from(v).ok();
        Some(Self {
            polys: n(h.poly_count)?,
            verts: n(h.vert_count)?,
            max_links: n(h.max_link_count)?,
            detail_meshes: n(h.detail_mesh_count)?,
            detail_verts: n(h.detail_vert_count)?,
            detail_tris: n(h.detail_tri_count)?,
            bv_nodes: n(h.bv_node_count)?,
            off_mesh_cons: n(h.off_mesh_con_count)?,
        })
    }
}

/// Section table of a target tile binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub header: Section,
    pub verts: Section,
    pub polys: Section,
    pub links: Section,
    pub detail_meshes: Section,
    pub detail_verts: Section,
    pub detail_tris: Section,
    pub bv_nodes: Section,
    pub off_mesh_cons: Section,
    pub total: usize,
}

impl TileLayout {
    pub fn compute(c: &TileCounts) -> Self {
        let mut t = SectionTable::new();
        let header = t.push("header", 1, MeshHeader::SIZE);
        let verts = t.push("verts", c.verts, 12);
        let polys = t.push("polys", c.polys, Poly::SIZE);
        let links = t.push("links", c.max_links, LINK_SIZE);
        let detail_meshes = t.push("detail_meshes", c.detail_meshes, PolyDetail::SIZE);
        let detail_verts = t.push("detail_verts", c.detail_verts, 12);
        let detail_tris = t.push("detail_tris", c.detail_tris, 4);
        let bv_nodes = t.push("bv_nodes", c.bv_nodes, BvNode::SIZE);
        let off_mesh_cons = t.push("off_mesh_cons", c.off_mesh_cons, OffMeshConnection::SIZE);
        TileLayout {
            header,
            verts,
            polys,
            links,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_nodes,
            off_mesh_cons,
            total: t.total(),
        }
    }

    pub fn sections(&self) -> [Section; 9] {
        [
            self.header,
            self.verts,
            self.polys,
            self.links,
            self.detail_meshes,
            self.detail_verts,
            self.detail_tris,
            self.bv_nodes,
            self.off_mesh_cons,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_aligned_and_contiguous() {
        let c = TileCounts { polys: 3, verts: 5, max_links: 7, detail_meshes: 3, detail_verts: 1, detail_tris: 3, bv_nodes: 6, off_mesh_cons: 1 };
        let l = TileLayout::compute(&c);
        let mut cursor = 0;
        for s in l.sections() {
            assert_eq!(s.offset, cursor, "{}", s.name);
            assert_eq!(s.offset % 4, 0, "{}", s.name);
            cursor = s.offset + align4(s.len);
        }
        assert_eq!(cursor, l.total);
        assert_eq!(l.verts.len, 60);
        assert_eq!(l.links.len, 84);
        assert_eq!(l.detail_tris.len, 12);
    }

    #[test]
    fn record_ranges_are_bounds_checked() {
        let s = Section { name: "polys", offset: 100, len: 64 };
        assert_eq!(s.record(1, 32), Some(132..164));
        assert_eq!(s.record(2, 32), None);
    }
}
