use byteorder::{ByteOrder, LittleEndian};

use crate::geom::Vec3;
use crate::tile::{read_vert, write_vert, BvNode, Section, SectionTable, NAVMESH_MAGIC, VERTS_PER_POLYGON};

use super::DecodeError;

/// Version tag the exporter writes into every tile record.
pub const SOURCE_VERSION: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceHeader {
    pub magic: i32,
    pub version: i32,
    pub x: i32,
    pub y: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub bv_quant_factor: f32,
}

impl SourceHeader {
    pub const SIZE: usize = 72;

    fn read(b: &[u8]) -> Self {
        let i = |o: usize| LittleEndian::read_i32(&b[o..o + 4]);
        let f = |o: usize| LittleEndian::read_f32(&b[o..o + 4]);
        SourceHeader {
            magic: i(0),
            version: i(4),
            x: i(8),
            y: i(12),
            user_id: LittleEndian::read_u32(&b[16..20]),
            poly_count: i(20),
            vert_count: i(24),
            detail_mesh_count: i(28),
            detail_vert_count: i(32),
            detail_tri_count: i(36),
            bv_node_count: i(40),
            bmin: [f(44), f(48), f(52)],
            bmax: [f(56), f(60), f(64)],
            bv_quant_factor: f(68),
        }
    }

    fn write(&self, b: &mut [u8]) {
        let ints = [self.magic, self.version, self.x, self.y];
        for (k, v) in ints.iter().enumerate() {
            LittleEndian::write_i32(&mut b[k * 4..k * 4 + 4], *v);
        }
        LittleEndian::write_u32(&mut b[16..20], self.user_id);
        let counts = [
            self.poly_count,
            self.vert_count,
            self.detail_mesh_count,
            self.detail_vert_count,
            self.detail_tri_count,
            self.bv_node_count,
        ];
        for (k, v) in counts.iter().enumerate() {
            let o = 20 + k * 4;
            LittleEndian::write_i32(&mut b[o..o + 4], *v);
        }
        let floats = [self.bmin[0], self.bmin[1], self.bmin[2], self.bmax[0], self.bmax[1], self.bmax[2], self.bv_quant_factor];
        for (k, v) in floats.iter().enumerate() {
            let o = 44 + k * 4;
            LittleEndian::write_f32(&mut b[o..o + 4], *v);
        }
    }

    fn count(&self, field: &'static str, value: i32) -> Result<usize, DecodeError> {
        usize::try_from(value).map_err(|_| DecodeError::NegativeCount { field, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePoly {
    pub verts: [u16; VERTS_PER_POLYGON],
    pub neis: [u16; VERTS_PER_POLYGON],
    pub flags: u32,
    pub vert_count: u8,
    pub area: u8,
}

impl SourcePoly {
    pub const SIZE: usize = 32;

    fn read(b: &[u8]) -> Self {
        let mut p = SourcePoly::default();
        for k in 0..VERTS_PER_POLYGON {
            p.verts[k] = LittleEndian::read_u16(&b[k * 2..k * 2 + 2]);
            p.neis[k] = LittleEndian::read_u16(&b[12 + k * 2..14 + k * 2]);
        }
        p.flags = LittleEndian::read_u32(&b[24..28]);
        p.vert_count = b[28];
        p.area = b[29];
        p
    }

    fn write(&self, b: &mut [u8]) {
        for k in 0..VERTS_PER_POLYGON {
            LittleEndian::write_u16(&mut b[k * 2..k * 2 + 2], self.verts[k]);
            LittleEndian::write_u16(&mut b[12 + k * 2..14 + k * 2], self.neis[k]);
        }
        LittleEndian::write_u32(&mut b[24..28], self.flags);
        b[28] = self.vert_count;
        b[29] = self.area;
    }
}

/// Detail sub-mesh as exported: 16-bit counts, narrowed by the layout builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceDetail {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u16,
    pub tri_count: u16,
}

impl SourceDetail {
    pub const SIZE: usize = 12;

    fn read(b: &[u8]) -> Self {
        SourceDetail {
            vert_base: LittleEndian::read_u32(&b[0..4]),
            tri_base: LittleEndian::read_u32(&b[4..8]),
            vert_count: LittleEndian::read_u16(&b[8..10]),
            tri_count: LittleEndian::read_u16(&b[10..12]),
        }
    }

    fn write(&self, b: &mut [u8]) {
        LittleEndian::write_u32(&mut b[0..4], self.vert_base);
        LittleEndian::write_u32(&mut b[4..8], self.tri_base);
        LittleEndian::write_u16(&mut b[8..10], self.vert_count);
        LittleEndian::write_u16(&mut b[10..12], self.tri_count);
    }
}

/// Section table of one exported tile record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    pub header: Section,
    pub verts: Section,
    pub polys: Section,
    pub detail_meshes: Section,
    pub detail_verts: Section,
    pub detail_tris: Section,
    pub bv_nodes: Section,
    pub total: usize,
}

impl SourceLayout {
    pub fn compute(h: &SourceHeader) -> Result<Self, DecodeError> {
        Ok(Self::from_counts(
            h.count("polyCount", h.poly_count)?,
            h.count("vertCount", h.vert_count)?,
            h.count("detailMeshCount", h.detail_mesh_count)?,
            h.count("detailVertCount", h.detail_vert_count)?,
            h.count("detailTriCount", h.detail_tri_count)?,
        ))
    }

    pub fn from_counts(polys: usize, verts: usize, detail_meshes: usize, detail_verts: usize, detail_tris: usize) -> Self {
        let mut t = SectionTable::new();
        let header = t.push("header", 1, SourceHeader::SIZE);
        let verts = t.push("verts", verts, 12);
        let polys_s = t.push("polys", polys, SourcePoly::SIZE);
        let detail_meshes = t.push("detail_meshes", detail_meshes, SourceDetail::SIZE);
        let detail_verts = t.push("detail_verts", detail_verts, 12);
        let detail_tris = t.push("detail_tris", detail_tris, 8);
        // the exporter always reserves two nodes per polygon
        let bv_nodes = t.push("bv_nodes", polys * 2, BvNode::SIZE);
        SourceLayout {
            header,
            verts,
            polys: polys_s,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_nodes,
            total: t.total(),
        }
    }

    pub fn sections(&self) -> [Section; 7] {
        [self.header, self.verts, self.polys, self.detail_meshes, self.detail_verts, self.detail_tris, self.bv_nodes]
    }
}

/// One decoded tile record: typed header plus its parallel arrays.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceTile {
    pub header: SourceHeader,
    pub verts: Vec<Vec3>,
    pub polys: Vec<SourcePoly>,
    pub detail_meshes: Vec<SourceDetail>,
    pub detail_verts: Vec<Vec3>,
    pub detail_tris: Vec<[u16; 4]>,
    pub bv_nodes: Vec<BvNode>,
}

fn read_records<T>(payload: &[u8], s: Section, size: usize, read: fn(&[u8]) -> T) -> Vec<T> {
    payload[s.range()].chunks_exact(size).map(read).collect()
}

impl SourceTile {
    /// Walks `payload` section by section. A `declared_len` of 0 skips the
    /// length check (hex payloads carry no length prefix).
    pub fn decode(payload: &[u8], declared_len: usize) -> Result<Self, DecodeError> {
        if payload.len() < SourceHeader::SIZE {
            return Err(DecodeError::Truncated { section: "header", offset: 0, len: payload.len() });
        }
        let header = SourceHeader::read(payload);
        if header.magic != NAVMESH_MAGIC {
            return Err(DecodeError::BadMagic { offset: 0, found: header.magic });
        }
        let layout = SourceLayout::compute(&header)?;
        if declared_len != 0 && layout.total != declared_len {
            return Err(DecodeError::LengthMismatch { declared: declared_len, computed: layout.total });
        }
        for s in layout.sections() {
            if s.end() > payload.len() {
                return Err(DecodeError::Truncated { section: s.name, offset: s.offset, len: payload.len() });
            }
        }

        Ok(SourceTile {
            header,
            verts: read_records(payload, layout.verts, 12, read_vert),
            polys: read_records(payload, layout.polys, SourcePoly::SIZE, SourcePoly::read),
            detail_meshes: read_records(payload, layout.detail_meshes, SourceDetail::SIZE, SourceDetail::read),
            detail_verts: read_records(payload, layout.detail_verts, 12, read_vert),
            detail_tris: read_records(payload, layout.detail_tris, 8, |b| {
                [
                    LittleEndian::read_u16(&b[0..2]),
                    LittleEndian::read_u16(&b[2..4]),
                    LittleEndian::read_u16(&b[4..6]),
                    LittleEndian::read_u16(&b[6..8]),
                ]
            }),
            bv_nodes: read_records(payload, layout.bv_nodes, BvNode::SIZE, BvNode::read),
        })
    }

    /// Exporter-format bytes for this tile. Header counts are taken from the
    /// arrays; the BV section is padded with zeroed nodes up to `2 * polys`.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = self.header;
        header.poly_count = self.polys.len() as i32;
        header.vert_count = self.verts.len() as i32;
        header.detail_mesh_count = self.detail_meshes.len() as i32;
        header.detail_vert_count = self.detail_verts.len() as i32;
        header.detail_tri_count = self.detail_tris.len() as i32;
        header.bv_node_count = self.bv_nodes.len().min(self.polys.len() * 2) as i32;

        let layout = SourceLayout::from_counts(
            self.polys.len(),
            self.verts.len(),
            self.detail_meshes.len(),
            self.detail_verts.len(),
            self.detail_tris.len(),
        );
        let mut out = vec![0u8; layout.total];
        header.write(&mut out[layout.header.range()]);
        for (i, v) in self.verts.iter().enumerate() {
            write_vert(&mut out[layout.verts.offset + i * 12..][..12], *v);
        }
        for (i, p) in self.polys.iter().enumerate() {
            p.write(&mut out[layout.polys.offset + i * SourcePoly::SIZE..][..SourcePoly::SIZE]);
        }
        for (i, d) in self.detail_meshes.iter().enumerate() {
            d.write(&mut out[layout.detail_meshes.offset + i * SourceDetail::SIZE..][..SourceDetail::SIZE]);
        }
        for (i, v) in self.detail_verts.iter().enumerate() {
            write_vert(&mut out[layout.detail_verts.offset + i * 12..][..12], *v);
        }
        for (i, t) in self.detail_tris.iter().enumerate() {
            let b = &mut out[layout.detail_tris.offset + i * 8..][..8];
            for k in 0..4 {
                LittleEndian::write_u16(&mut b[k * 2..k * 2 + 2], t[k]);
            }
        }
        for (i, n) in self.bv_nodes.iter().take(self.polys.len() * 2).enumerate() {
            n.write(&mut out[layout.bv_nodes.offset + i * BvNode::SIZE..][..BvNode::SIZE]);
        }
        out
    }

    /// Larger horizontal extent of the tile bounds, used for tile-size voting.
    pub fn horizontal_size(&self) -> f32 {
        let w = self.header.bmax[0] - self.header.bmin[0];
        let h = self.header.bmax[2] - self.header.bmin[2];
        w.max(h)
    }
}
