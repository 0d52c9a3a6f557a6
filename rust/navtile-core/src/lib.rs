pub mod geom;
pub mod source;
pub mod tile;
pub mod mesh;
pub mod tileset;
pub mod convert;
pub mod engine;
pub mod options;
pub mod query;

#[doc(hidden)]
pub mod fixtures;

pub use convert::{convert, Conversion, ConvertError, ConvertReport};
pub use engine::{NavMeshSearch, QueryFilter, SearchError};
pub use mesh::{NavMesh, NavMeshParams, PolyRef, TileRef};
pub use options::QueryOptions;
pub use query::{NavQuery, PathResult, PathStatus, QueryError};
pub use source::{DecodeError, SourceMesh};
pub use tileset::{load_tileset, read_tileset_bytes, TileSetError};
