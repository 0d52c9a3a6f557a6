//! Target tile binary: fixed-size little-endian records packed into aligned
//! sections (see [`layout::TileLayout`]).

use byteorder::{ByteOrder, LittleEndian};

use crate::geom::Vec3;

pub mod builder;
pub mod layout;

pub use layout::{Section, SectionTable, TileCounts, TileLayout};

pub const NAVMESH_MAGIC: i32 = (b'D' as i32) << 24 | (b'N' as i32) << 16 | (b'A' as i32) << 8 | b'V' as i32;
pub const NAVMESH_VERSION: i32 = 7;

pub const VERTS_PER_POLYGON: usize = 6;
/// Neighbour entries with this bit set are tile-boundary portals; the low byte
/// holds the side.
pub const EXT_LINK: u16 = 0x8000;
pub const LINK_SIZE: usize = 12;

pub const POLYTYPE_GROUND: u8 = 0;
pub const POLYTYPE_OFFMESH_CONNECTION: u8 = 1;
pub const POLYFLAGS_JUMP: u16 = 0x08;

pub const OFFMESH_CON_BIDIR: u8 = 1;
/// Side value of a point inside the tile.
pub const SIDE_INSIDE: u8 = 0xff;

#[inline]
fn read_vec3(b: &[u8]) -> Vec3 {
    [LittleEndian::read_f32(&b[0..4]), LittleEndian::read_f32(&b[4..8]), LittleEndian::read_f32(&b[8..12])]
}

#[inline]
fn write_vec3(b: &mut [u8], v: Vec3) {
    LittleEndian::write_f32(&mut b[0..4], v[0]);
    LittleEndian::write_f32(&mut b[4..8], v[1]);
    LittleEndian::write_f32(&mut b[8..12], v[2]);
}

pub fn read_vert(b: &[u8]) -> Vec3 { read_vec3(b) }
pub fn write_vert(b: &mut [u8], v: Vec3) { write_vec3(b, v) }

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshHeader {
    pub magic: i32,
    pub version: i32,
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    pub off_mesh_base: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub bv_quant_factor: f32,
}

impl MeshHeader {
    pub const SIZE: usize = 100;

    /// `b` must hold at least [`Self::SIZE`] bytes.
    pub fn read(b: &[u8]) -> Self {
        let i = |o: usize| LittleEndian::read_i32(&b[o..o + 4]);
        let f = |o: usize| LittleEndian::read_f32(&b[o..o + 4]);
        MeshHeader {
            magic: i(0),
            version: i(4),
            x: i(8),
            y: i(12),
            layer: i(16),
            user_id: LittleEndian::read_u32(&b[20..24]),
            poly_count: i(24),
            vert_count: i(28),
            max_link_count: i(32),
            detail_mesh_count: i(36),
            detail_vert_count: i(40),
            detail_tri_count: i(44),
            bv_node_count: i(48),
            off_mesh_con_count: i(52),
            off_mesh_base: i(56),
            walkable_height: f(60),
            walkable_radius: f(64),
            walkable_climb: f(68),
            bmin: read_vec3(&b[72..84]),
            bmax: read_vec3(&b[84..96]),
            bv_quant_factor: f(96),
        }
    }

    pub fn write(&self, b: &mut [u8]) {
        let ints = [
            self.magic,
            self.version,
            self.x,
            self.y,
            self.layer,
        ];
        for (k, v) in ints.iter().enumerate() {
            LittleEndian::write_i32(&mut b[k * 4..k * 4 + 4], *v);
        }
        LittleEndian::write_u32(&mut b[20..24], self.user_id);
        let counts = [
            self.poly_count,
            self.vert_count,
            self.max_link_count,
            self.detail_mesh_count,
            self.detail_vert_count,
            self.detail_tri_count,
            self.bv_node_count,
            self.off_mesh_con_count,
            self.off_mesh_base,
        ];
        for (k, v) in counts.iter().enumerate() {
            let o = 24 + k * 4;
            LittleEndian::write_i32(&mut b[o..o + 4], *v);
        }
        LittleEndian::write_f32(&mut b[60..64], self.walkable_height);
        LittleEndian::write_f32(&mut b[64..68], self.walkable_radius);
        LittleEndian::write_f32(&mut b[68..72], self.walkable_climb);
        write_vec3(&mut b[72..84], self.bmin);
        write_vec3(&mut b[84..96], self.bmax);
        LittleEndian::write_f32(&mut b[96..100], self.bv_quant_factor);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Poly {
    pub first_link: u32,
    pub verts: [u16; VERTS_PER_POLYGON],
    pub neis: [u16; VERTS_PER_POLYGON],
    pub flags: u16,
    pub vert_count: u8,
    pub area_and_type: u8,
}

impl Poly {
    pub const SIZE: usize = 32;

    pub fn area(&self) -> u8 { self.area_and_type & 0x3f }
    pub fn poly_type(&self) -> u8 { self.area_and_type >> 6 }
    pub fn set_area(&mut self, area: u8) { self.area_and_type = (self.area_and_type & 0xc0) | (area & 0x3f); }
    pub fn set_type(&mut self, t: u8) { self.area_and_type = (self.area_and_type & 0x3f) | (t << 6); }
    pub fn is_off_mesh(&self) -> bool { self.poly_type() == POLYTYPE_OFFMESH_CONNECTION }

    pub fn read(b: &[u8]) -> Self {
        let mut p = Poly { first_link: LittleEndian::read_u32(&b[0..4]), ..Default::default() };
        for k in 0..VERTS_PER_POLYGON {
            p.verts[k] = LittleEndian::read_u16(&b[4 + k * 2..6 + k * 2]);
            p.neis[k] = LittleEndian::read_u16(&b[16 + k * 2..18 + k * 2]);
        }
        p.flags = LittleEndian::read_u16(&b[28..30]);
        p.vert_count = b[30];
        p.area_and_type = b[31];
        p
    }

    pub fn write(&self, b: &mut [u8]) {
        LittleEndian::write_u32(&mut b[0..4], self.first_link);
        for k in 0..VERTS_PER_POLYGON {
            LittleEndian::write_u16(&mut b[4 + k * 2..6 + k * 2], self.verts[k]);
            LittleEndian::write_u16(&mut b[16 + k * 2..18 + k * 2], self.neis[k]);
        }
        LittleEndian::write_u16(&mut b[28..30], self.flags);
        b[30] = self.vert_count;
        b[31] = self.area_and_type;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolyDetail {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
}

impl PolyDetail {
    pub const SIZE: usize = 12;

    pub fn read(b: &[u8]) -> Self {
        PolyDetail {
            vert_base: LittleEndian::read_u32(&b[0..4]),
            tri_base: LittleEndian::read_u32(&b[4..8]),
            vert_count: b[8],
            tri_count: b[9],
        }
    }

    pub fn write(&self, b: &mut [u8]) {
        LittleEndian::write_u32(&mut b[0..4], self.vert_base);
        LittleEndian::write_u32(&mut b[4..8], self.tri_base);
        b[8] = self.vert_count;
        b[9] = self.tri_count;
    }
}

/// Quantized bounding-volume node. `i >= 0` is a leaf holding a polygon index,
/// a negative `i` is the escape offset of an internal node. Shared by the
/// source and the target formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BvNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub i: i32,
}

impl BvNode {
    pub const SIZE: usize = 16;

    pub fn read(b: &[u8]) -> Self {
        let u = |o: usize| LittleEndian::read_u16(&b[o..o + 2]);
        BvNode {
            bmin: [u(0), u(2), u(4)],
            bmax: [u(6), u(8), u(10)],
            i: LittleEndian::read_i32(&b[12..16]),
        }
    }

    pub fn write(&self, b: &mut [u8]) {
        for k in 0..3 {
            LittleEndian::write_u16(&mut b[k * 2..k * 2 + 2], self.bmin[k]);
            LittleEndian::write_u16(&mut b[6 + k * 2..8 + k * 2], self.bmax[k]);
        }
        LittleEndian::write_i32(&mut b[12..16], self.i);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OffMeshConnection {
    pub start: Vec3,
    pub end: Vec3,
    pub rad: f32,
    pub poly: u16,
    pub flags: u8,
    pub side: u8,
    pub user_id: u32,
}

impl OffMeshConnection {
    pub const SIZE: usize = 36;

    pub fn is_bidirectional(&self) -> bool { self.flags & OFFMESH_CON_BIDIR != 0 }

    pub fn read(b: &[u8]) -> Self {
        OffMeshConnection {
            start: read_vec3(&b[0..12]),
            end: read_vec3(&b[12..24]),
            rad: LittleEndian::read_f32(&b[24..28]),
            poly: LittleEndian::read_u16(&b[28..30]),
            flags: b[30],
            side: b[31],
            user_id: LittleEndian::read_u32(&b[32..36]),
        }
    }

    pub fn write(&self, b: &mut [u8]) {
        write_vec3(&mut b[0..12], self.start);
        write_vec3(&mut b[12..24], self.end);
        LittleEndian::write_f32(&mut b[24..28], self.rad);
        LittleEndian::write_u16(&mut b[28..30], self.poly);
        b[30] = self.flags;
        b[31] = self.side;
        LittleEndian::write_u32(&mut b[32..36], self.user_id);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TileFormatError {
    #[error("tile data too small: {0} bytes")]
    TooSmall(usize),
    #[error("bad tile magic {0:#010x}")]
    BadMagic(i32),
    #[error("unsupported tile version {0}")]
    UnsupportedVersion(i32),
    #[error("negative count in tile header")]
    NegativeCount,
    #[error("section out of bounds: {0}")]
    OutOfBounds(&'static str),
    #[error("invalid {what} at index {index}")]
    InvalidIndex { what: &'static str, index: usize },
}

/// Read-only, bounds-checked view over a target tile binary.
#[derive(Debug, Clone, Copy)]
pub struct TileView<'a> {
    bytes: &'a [u8],
    header: MeshHeader,
    layout: TileLayout,
}

impl<'a> TileView<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, TileFormatError> {
        if bytes.len() < MeshHeader::SIZE { return Err(TileFormatError::TooSmall(bytes.len())); }
        let header = MeshHeader::read(bytes);
        if header.magic != NAVMESH_MAGIC { return Err(TileFormatError::BadMagic(header.magic)); }
        if header.version != NAVMESH_VERSION { return Err(TileFormatError::UnsupportedVersion(header.version)); }
        let counts = TileCounts::from_header(&header).ok_or(TileFormatError::NegativeCount)?;
        let layout = TileLayout::compute(&counts);
        for s in layout.sections() {
            if s.end() > bytes.len() { return Err(TileFormatError::OutOfBounds(s.name)); }
        }
        Ok(TileView { bytes, header, layout })
    }

    pub fn header(&self) -> &MeshHeader { &self.header }
    pub fn layout(&self) -> &TileLayout { &self.layout }
    pub fn bytes(&self) -> &'a [u8] { self.bytes }

    fn record<T>(&self, s: Section, size: usize, i: usize, read: fn(&[u8]) -> T) -> Option<T> {
        let r = s.record(i, size)?;
        self.bytes.get(r).map(read)
    }

    pub fn vert(&self, i: usize) -> Option<Vec3> { self.record(self.layout.verts, 12, i, read_vec3) }
    pub fn poly(&self, i: usize) -> Option<Poly> { self.record(self.layout.polys, Poly::SIZE, i, Poly::read) }
    pub fn detail_mesh(&self, i: usize) -> Option<PolyDetail> {
        self.record(self.layout.detail_meshes, PolyDetail::SIZE, i, PolyDetail::read)
    }
    pub fn detail_vert(&self, i: usize) -> Option<Vec3> { self.record(self.layout.detail_verts, 12, i, read_vec3) }
    pub fn detail_tri(&self, i: usize) -> Option<[u8; 4]> {
        self.record(self.layout.detail_tris, 4, i, |b| [b[0], b[1], b[2], b[3]])
    }
    pub fn bv_node(&self, i: usize) -> Option<BvNode> { self.record(self.layout.bv_nodes, BvNode::SIZE, i, BvNode::read) }
    pub fn off_mesh_con(&self, i: usize) -> Option<OffMeshConnection> {
        self.record(self.layout.off_mesh_cons, OffMeshConnection::SIZE, i, OffMeshConnection::read)
    }

    pub fn verts(&self) -> impl Iterator<Item = Vec3> + '_ { (0..self.layout.verts.len / 12).filter_map(|i| self.vert(i)) }
    pub fn polys(&self) -> impl Iterator<Item = Poly> + '_ { (0..self.layout.polys.len / Poly::SIZE).filter_map(|i| self.poly(i)) }
    pub fn off_mesh_cons(&self) -> impl Iterator<Item = OffMeshConnection> + '_ {
        (0..self.layout.off_mesh_cons.len / OffMeshConnection::SIZE).filter_map(|i| self.off_mesh_con(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_dnav_big_endian() {
        assert_eq!(NAVMESH_MAGIC.to_be_bytes(), *b"DNAV");
    }

    #[test]
    fn poly_area_and_type_pack() {
        let mut p = Poly::default();
        p.set_area(0x7f);
        p.set_type(POLYTYPE_OFFMESH_CONNECTION);
        assert_eq!(p.area(), 0x3f);
        assert!(p.is_off_mesh());
        assert_eq!(p.area_and_type, 0x7f);
    }

    #[test]
    fn header_field_offsets() {
        let h = MeshHeader {
            magic: NAVMESH_MAGIC,
            version: NAVMESH_VERSION,
            x: -3,
            poly_count: 9,
            off_mesh_base: 4,
            walkable_climb: 0.25,
            bmax: [1.0, 2.0, 3.0],
            bv_quant_factor: 8.0,
            ..Default::default()
        };
        let mut b = [0u8; MeshHeader::SIZE];
        h.write(&mut b);
        assert_eq!(LittleEndian::read_i32(&b[8..12]), -3);
        assert_eq!(LittleEndian::read_i32(&b[24..28]), 9);
        assert_eq!(LittleEndian::read_i32(&b[56..60]), 4);
        assert_eq!(LittleEndian::read_f32(&b[88..92]), 2.0);
        assert_eq!(MeshHeader::read(&b), h);
    }

    #[test]
    fn view_rejects_bad_magic_and_short_buffers() {
        assert_eq!(TileView::parse(&[0u8; 10]).unwrap_err(), TileFormatError::TooSmall(10));
        let mut b = vec![0u8; MeshHeader::SIZE];
        MeshHeader { magic: 7, version: NAVMESH_VERSION, ..Default::default() }.write(&mut b);
        assert_eq!(TileView::parse(&b).unwrap_err(), TileFormatError::BadMagic(7));
        MeshHeader { magic: NAVMESH_MAGIC, version: NAVMESH_VERSION, vert_count: 4, ..Default::default() }.write(&mut b);
        assert_eq!(TileView::parse(&b).unwrap_err(), TileFormatError::OutOfBounds("verts"));
    }
}
