use std::{fs::File, path::Path};

use memmap2::Mmap;
use tracing::debug;

use crate::mesh::{MeshError, NavMesh};

use super::header::{TileRecord, TileSetHeader, TILESET_MAGIC, TILESET_VERSION};

#[derive(Debug, thiserror::Error)]
pub enum TileSetError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("file too small for header: {0} bytes")]
    HeaderTooSmall(usize),
    #[error("bad tile-set magic {0:#010x}")]
    BadMagic(i32),
    #[error("unsupported tile-set version {0}")]
    UnsupportedVersion(i32),
    #[error("negative tile count {0}")]
    NegativeCount(i32),
    #[error("tile {index} truncated at offset {offset}")]
    Truncated { index: usize, offset: usize },
    #[error("tile {index} at offset {offset} has ref {tile_ref:#x} and size {size}")]
    InvalidRecord { index: usize, offset: usize, tile_ref: u32, size: i32 },
    #[error("tile {index}: {source}")]
    Mesh { index: usize, #[source] source: MeshError },
}

/// Rebuilds a container from tile-set bytes. Any failure discards everything
/// read so far.
pub fn read_tileset_bytes(bytes: &[u8]) -> Result<NavMesh, TileSetError> {
    if bytes.len() < TileSetHeader::SIZE {
        return Err(TileSetError::HeaderTooSmall(bytes.len()));
    }
    let header = TileSetHeader::read(bytes);
    if header.magic != TILESET_MAGIC {
        return Err(TileSetError::BadMagic(header.magic));
    }
    if header.version != TILESET_VERSION {
        return Err(TileSetError::UnsupportedVersion(header.version));
    }
    let count = usize::try_from(header.num_tiles).map_err(|_| TileSetError::NegativeCount(header.num_tiles))?;
    let mut mesh = NavMesh::new(header.params).map_err(|source| TileSetError::Mesh { index: 0, source })?;

    let mut offset = TileSetHeader::SIZE;
    for index in 0..count {
        let rec_bytes = bytes.get(offset..offset + TileRecord::SIZE).ok_or(TileSetError::Truncated { index, offset })?;
        let rec = TileRecord::read(rec_bytes);
        if rec.tile_ref == 0 || rec.data_size <= 0 {
            return Err(TileSetError::InvalidRecord { index, offset, tile_ref: rec.tile_ref, size: rec.data_size });
        }
        let start = offset + TileRecord::SIZE;
        let data = bytes.get(start..start + rec.data_size as usize).ok_or(TileSetError::Truncated { index, offset: start })?;
        mesh.add_tile(data.to_vec(), Some(rec.tile_ref)).map_err(|source| TileSetError::Mesh { index, source })?;
        offset = start + rec.data_size as usize;
    }
    debug!(tiles = count, bytes = offset, "tile set read");
    Ok(mesh)
}

pub fn load_tileset(path: impl AsRef<Path>) -> Result<NavMesh, TileSetError> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    read_tileset_bytes(&mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    fn header_only(magic: i32, version: i32, tiles: i32) -> Vec<u8> {
        let mut b = vec![0u8; TileSetHeader::SIZE];
        let mut h = TileSetHeader::new(tiles, crate::mesh::NavMeshParams::for_tile_count(2));
        h.magic = magic;
        h.version = version;
        h.write(&mut b);
        b
    }

    #[test]
    fn corrupted_magic_fails_cleanly() {
        let b = header_only(0x1234, TILESET_VERSION, 0);
        assert!(matches!(read_tileset_bytes(&b), Err(TileSetError::BadMagic(0x1234))));
    }

    #[test]
    fn version_must_match_exactly() {
        let b = header_only(TILESET_MAGIC, 2, 0);
        assert!(matches!(read_tileset_bytes(&b), Err(TileSetError::UnsupportedVersion(2))));
    }

    #[test]
    fn short_header_and_missing_records() {
        assert!(matches!(read_tileset_bytes(&[0u8; 12]), Err(TileSetError::HeaderTooSmall(12))));
        let b = header_only(TILESET_MAGIC, TILESET_VERSION, 1);
        assert!(matches!(read_tileset_bytes(&b), Err(TileSetError::Truncated { index: 0, offset: 40 })));
    }

    #[test]
    fn zero_ref_is_rejected() {
        let mut b = header_only(TILESET_MAGIC, TILESET_VERSION, 1);
        let mut rec = [0u8; TileRecord::SIZE];
        LittleEndian::write_i32(&mut rec[4..8], 16);
        b.extend_from_slice(&rec);
        b.extend_from_slice(&[0u8; 16]);
        assert!(matches!(read_tileset_bytes(&b), Err(TileSetError::InvalidRecord { index: 0, tile_ref: 0, .. })));
    }

    #[test]
    fn empty_tile_set_loads() {
        let b = header_only(TILESET_MAGIC, TILESET_VERSION, 0);
        let mesh = read_tileset_bytes(&b).unwrap();
        assert_eq!(mesh.tile_count(), 0);
        assert_eq!(mesh.max_tiles(), 2);
    }
}
