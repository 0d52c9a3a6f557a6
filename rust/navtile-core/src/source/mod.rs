//! Decoding of exported navigation-mesh assets: the text (YAML with hex tile
//! payloads) and the binary variant, down to typed per-tile records.

use std::{fs::File, path::Path};

use memmap2::Mmap;
use tracing::debug;

use crate::geom::Vec3;
use crate::mesh::{DEFAULT_CELL_SIZE, DEFAULT_TILE_SIZE};
use crate::tile::builder::AgentParams;

mod binary;
pub mod record;
mod text;

pub use record::{SourceDetail, SourceHeader, SourceLayout, SourcePoly, SourceTile, SOURCE_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("source is empty")]
    Empty,
    #[error("bad tile magic {found:#010x} at offset {offset}")]
    BadMagic { offset: usize, found: i32 },
    #[error("negative {field} ({value}) in tile header")]
    NegativeCount { field: &'static str, value: i32 },
    #[error("negative payload length {value} at offset {offset}")]
    NegativeLength { offset: usize, value: i32 },
    #[error("section {section} truncated at offset {offset} (payload is {len} bytes)")]
    Truncated { section: &'static str, offset: usize, len: usize },
    #[error("declared payload length {declared} does not match computed length {computed}")]
    LengthMismatch { declared: usize, computed: usize },
    #[error("invalid hex digit {ch:?} at offset {offset}")]
    InvalidHex { offset: usize, ch: char },
    #[error("invalid {field} at offset {offset}: {value:?}")]
    BadScalar { field: &'static str, offset: usize, value: String },
}

/// Global scalars of an exported mesh. Zero means "not given".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceParams {
    pub tile_size: f32,
    pub cell_size: f32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
}

impl SourceParams {
    /// Replaces every zero field with its default.
    pub fn with_defaults(self) -> Self {
        let agent = AgentParams::default();
        let or = |v: f32, d: f32| if v == 0.0 { d } else { v };
        SourceParams {
            tile_size: or(self.tile_size, DEFAULT_TILE_SIZE),
            cell_size: or(self.cell_size, DEFAULT_CELL_SIZE),
            walkable_height: or(self.walkable_height, agent.walkable_height),
            walkable_radius: or(self.walkable_radius, agent.walkable_radius),
            walkable_climb: or(self.walkable_climb, agent.walkable_climb),
        }
    }

    pub fn agent(&self) -> AgentParams {
        AgentParams {
            walkable_height: self.walkable_height,
            walkable_radius: self.walkable_radius,
            walkable_climb: self.walkable_climb,
        }
    }
}

/// Off-mesh connection as authored in the source asset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OffMeshLink {
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
    pub link_type: u32,
    pub area: u32,
    pub bidirectional: bool,
}

/// One raw tile record. `declared_len` is 0 when the container format
/// carries no length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub offset: usize,
    pub bytes: Vec<u8>,
    pub declared_len: usize,
}

impl Payload {
    pub fn decode(&self) -> Result<SourceTile, DecodeError> {
        SourceTile::decode(&self.bytes, self.declared_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Text,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMesh {
    pub format: SourceFormat,
    pub params: SourceParams,
    pub payloads: Vec<Payload>,
    pub off_mesh: Vec<OffMeshLink>,
}

impl SourceMesh {
    /// Text assets start with a `%` directive; anything else is scanned as binary.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let first = *bytes.first().ok_or(DecodeError::Empty)?;
        let mesh = if first == b'%' { text::parse_text(bytes)? } else { binary::scan_binary(bytes)? };
        debug!(format = ?mesh.format, tiles = mesh.payloads.len(), off_mesh = mesh.off_mesh.len(), "source parsed");
        Ok(mesh)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(DecodeError::Empty);
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(&mmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn zero_params_take_defaults() {
        let p = SourceParams { walkable_radius: 0.75, ..Default::default() }.with_defaults();
        assert_eq!(p.walkable_radius, 0.75);
        assert_eq!(p.walkable_height, 2.0);
        assert_eq!(p.walkable_climb, 0.4166667);
        assert!((p.cell_size - 1.0 / 6.0).abs() < 1e-7);
        assert!((p.tile_size - 256.0 / 6.0).abs() < 1e-4);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(SourceMesh::parse(&[]), Err(DecodeError::Empty)));
        let tmp = NamedTempFile::new().unwrap();
        assert!(matches!(SourceMesh::open(tmp.path()), Err(DecodeError::Empty)));
    }

    #[test]
    fn open_dispatches_on_first_byte() {
        let tile = crate::fixtures::quad_grid_tile(0, 0, 1, 1, 0.0);
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(crate::fixtures::text_asset(&[tile], &[]).as_bytes()).unwrap();
        let mesh = SourceMesh::open(tmp.path()).unwrap();
        assert_eq!(mesh.format, SourceFormat::Text);
        assert_eq!(mesh.payloads.len(), 1);
    }
}
