use crate::geom::Vec3;

use super::{DecodeError, OffMeshLink, Payload, SourceFormat, SourceMesh, SourceParams};

/// Logical rows of a text asset. Leading blanks are stripped, `\r` is dropped,
/// and a `\` joins the next physical line (its indentation is skipped too).
pub(crate) struct Rows<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Rows<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Rows { buf, pos: 0 }
    }
}

impl Iterator for Rows<'_> {
    /// Offset of the first kept byte, and the row text.
    type Item = (usize, String);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.buf.len() {
                return None;
            }
            let mut row = Vec::new();
            let mut start = None;
            let mut leading = true;
            let mut joined = false;
            while self.pos < self.buf.len() {
                let c = self.buf[self.pos];
                self.pos += 1;
                match c {
                    b'\\' => joined = true,
                    b'\r' => {}
                    b'\n' if joined => {
                        joined = false;
                        leading = true;
                    }
                    b'\n' if start.is_none() => leading = true,
                    b'\n' => break,
                    b' ' | b'\t' if leading => {}
                    _ => {
                        joined = false;
                        leading = false;
                        start.get_or_insert(self.pos - 1);
                        row.push(c);
                    }
                }
            }
            if let Some(offset) = start {
                return Some((offset, String::from_utf8_lossy(&row).into_owned()));
            }
        }
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Two characters per byte; an odd trailing character is ignored.
/// `base` is added to reported offsets.
pub(crate) fn decode_hex(s: &str, base: usize) -> Result<Vec<u8>, DecodeError> {
    let b = s.as_bytes();
    let mut out = Vec::with_capacity(b.len() / 2);
    for (k, pair) in b.chunks_exact(2).enumerate() {
        let digit = |j: usize| {
            hex_val(pair[j]).ok_or(DecodeError::InvalidHex { offset: base + k * 2 + j, ch: pair[j] as char })
        };
        out.push(digit(0)? << 4 | digit(1)?);
    }
    Ok(out)
}

fn bad(field: &'static str, offset: usize, value: &str) -> DecodeError {
    DecodeError::BadScalar { field, offset, value: value.to_string() }
}

/// Leading float of `s`; trailing text after the first blank is ignored.
pub(crate) fn parse_f32(field: &'static str, offset: usize, s: &str) -> Result<f32, DecodeError> {
    let token = s.split_whitespace().next().unwrap_or("");
    token.parse().map_err(|_| bad(field, offset, s))
}

fn parse_u32(field: &'static str, offset: usize, s: &str) -> Result<u32, DecodeError> {
    let token = s.split_whitespace().next().unwrap_or("");
    token.parse().map_err(|_| bad(field, offset, s))
}

/// Parses a flow mapping `{x: 1, y: 2, z: 3}`.
pub(crate) fn parse_vec3(field: &'static str, offset: usize, s: &str) -> Result<Vec3, DecodeError> {
    let inner = s
        .trim()
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .ok_or_else(|| bad(field, offset, s))?;
    let mut v = [0.0f32; 3];
    let mut seen = [false; 3];
    for part in inner.split(',') {
        let (k, val) = part.split_once(':').ok_or_else(|| bad(field, offset, s))?;
        let axis = match k.trim() {
            "x" => 0,
            "y" => 1,
            "z" => 2,
            _ => return Err(bad(field, offset, s)),
        };
        v[axis] = val.trim().parse().map_err(|_| bad(field, offset, s))?;
        seen[axis] = true;
    }
    if seen != [true; 3] {
        return Err(bad(field, offset, s));
    }
    Ok(v)
}

pub(crate) fn parse_text(bytes: &[u8]) -> Result<SourceMesh, DecodeError> {
    let mut params = SourceParams::default();
    let mut payloads = Vec::new();
    let mut off_mesh = Vec::new();
    // fields accumulate until m_LinkDirection; the record is not reset after a push
    let mut link = OffMeshLink::default();

    for (offset, row) in Rows::new(bytes) {
        let field = |prefix: &str| row.strip_prefix(prefix).map(|rest| (rest, offset + prefix.len()));
        if let Some((hex, at)) = field("- m_MeshData: ") {
            let bytes = decode_hex(hex.trim_end(), at)?;
            let declared_len = bytes.len();
            payloads.push(Payload { offset: at, bytes, declared_len });
        } else if let Some((v, at)) = field("tileSize: ") {
            params.tile_size = parse_f32("tileSize", at, v)?;
        } else if let Some((v, at)) = field("walkableHeight: ") {
            params.walkable_height = parse_f32("walkableHeight", at, v)?;
        } else if let Some((v, at)) = field("walkableRadius: ") {
            params.walkable_radius = parse_f32("walkableRadius", at, v)?;
        } else if let Some((v, at)) = field("walkableClimb: ") {
            params.walkable_climb = parse_f32("walkableClimb", at, v)?;
        } else if let Some((v, at)) = field("cellSize: ") {
            params.cell_size = parse_f32("cellSize", at, v)?;
        } else if let Some((v, at)) = field("- m_Start: ") {
            link.start = parse_vec3("m_Start", at, v)?;
        } else if let Some((v, at)) = field("m_End: ") {
            link.end = parse_vec3("m_End", at, v)?;
        } else if let Some((v, at)) = field("m_Radius: ") {
            link.radius = parse_f32("m_Radius", at, v)?;
        } else if let Some((v, at)) = field("m_LinkType: ") {
            link.link_type = parse_u32("m_LinkType", at, v)?;
        } else if let Some((v, at)) = field("m_Area: ") {
            link.area = parse_u32("m_Area", at, v)?;
        } else if let Some((v, at)) = field("m_LinkDirection: ") {
            link.bidirectional = parse_u32("m_LinkDirection", at, v)? != 0;
            off_mesh.push(link);
        }
    }

    Ok(SourceMesh { format: SourceFormat::Text, params: params.with_defaults(), payloads, off_mesh })
}
