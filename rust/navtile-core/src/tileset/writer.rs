use std::{fs::File, io::Write, path::Path};

use tracing::debug;

use crate::mesh::NavMesh;

use super::header::{TileRecord, TileSetHeader};
use super::reader::TileSetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub tiles: usize,
    pub bytes: usize,
    pub hash: [u8; 32],
}

impl WriteSummary {
    pub fn hash_hex(&self) -> String {
        blake3::Hash::from(self.hash).to_hex().to_string()
    }
}

/// Writes every resident, non-empty tile in slot order.
pub fn write_tileset<W: Write>(mesh: &NavMesh, mut out: W) -> Result<WriteSummary, TileSetError> {
    let tiles: Vec<_> = mesh.tiles().filter(|(_, t)| !t.data().is_empty()).collect();
    let total = TileSetHeader::SIZE + tiles.iter().map(|(_, t)| TileRecord::SIZE + t.data().len()).sum::<usize>();

    let mut buf = vec![0u8; TileSetHeader::SIZE];
    TileSetHeader::new(tiles.len() as i32, *mesh.params()).write(&mut buf);
    buf.reserve(total - buf.len());
    for (tile_ref, tile) in &tiles {
        let mut rec = [0u8; TileRecord::SIZE];
        TileRecord { tile_ref: *tile_ref, data_size: tile.data().len() as i32 }.write(&mut rec);
        buf.extend_from_slice(&rec);
        buf.extend_from_slice(tile.data());
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(&buf);
    let hash = *hasher.finalize().as_bytes();
    out.write_all(&buf)?;
    out.flush()?;
    debug!(tiles = tiles.len(), bytes = buf.len(), "tile set written");
    Ok(WriteSummary { tiles: tiles.len(), bytes: buf.len(), hash })
}

pub fn save_tileset(mesh: &NavMesh, path: impl AsRef<Path>) -> Result<WriteSummary, TileSetError> {
    let file = File::create(path)?;
    write_tileset(mesh, std::io::BufWriter::new(file))
}
