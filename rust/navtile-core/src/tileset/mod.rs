//! Portable multi-tile file: a fixed file header, then one `(ref, size)` record
//! and the raw tile bytes per resident tile.

mod header;
mod reader;
#[cfg(feature = "builder")]
mod writer;

pub use header::{TileRecord, TileSetHeader, TILESET_MAGIC, TILESET_VERSION};
pub use reader::{load_tileset, read_tileset_bytes, TileSetError};
#[cfg(feature = "builder")]
pub use writer::{save_tileset, write_tileset, WriteSummary};
