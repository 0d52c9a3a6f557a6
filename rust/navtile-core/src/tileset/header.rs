use byteorder::{ByteOrder, LittleEndian};

use crate::mesh::NavMeshParams;

pub const TILESET_MAGIC: i32 = (b'M' as i32) << 24 | (b'S' as i32) << 16 | (b'E' as i32) << 8 | b'T' as i32;
pub const TILESET_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileSetHeader {
    pub magic: i32,
    pub version: i32,
    pub num_tiles: i32,
    pub params: NavMeshParams,
}

impl TileSetHeader {
    pub const SIZE: usize = 12 + NavMeshParams::SIZE;

    pub fn new(num_tiles: i32, params: NavMeshParams) -> Self {
        TileSetHeader { magic: TILESET_MAGIC, version: TILESET_VERSION, num_tiles, params }
    }

    pub fn read(b: &[u8]) -> Self {
        TileSetHeader {
            magic: LittleEndian::read_i32(&b[0..4]),
            version: LittleEndian::read_i32(&b[4..8]),
            num_tiles: LittleEndian::read_i32(&b[8..12]),
            params: NavMeshParams::read(&b[12..Self::SIZE]),
        }
    }

    pub fn write(&self, b: &mut [u8]) {
        LittleEndian::write_i32(&mut b[0..4], self.magic);
        LittleEndian::write_i32(&mut b[4..8], self.version);
        LittleEndian::write_i32(&mut b[8..12], self.num_tiles);
        self.params.write(&mut b[12..Self::SIZE]);
    }
}

/// Precedes every tile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRecord {
    pub tile_ref: u32,
    pub data_size: i32,
}

impl TileRecord {
    pub const SIZE: usize = 8;

    pub fn read(b: &[u8]) -> Self {
        TileRecord { tile_ref: LittleEndian::read_u32(&b[0..4]), data_size: LittleEndian::read_i32(&b[4..8]) }
    }

    pub fn write(&self, b: &mut [u8]) {
        LittleEndian::write_u32(&mut b[0..4], self.tile_ref);
        LittleEndian::write_i32(&mut b[4..8], self.data_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_40_bytes() {
        assert_eq!(TileSetHeader::SIZE, 40);
        assert_eq!(TILESET_MAGIC.to_be_bytes(), *b"MSET");
        let h = TileSetHeader::new(3, NavMeshParams::for_tile_count(3));
        let mut b = [0u8; TileSetHeader::SIZE];
        h.write(&mut b);
        assert_eq!(TileSetHeader::read(&b), h);
    }
}
