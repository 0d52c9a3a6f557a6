//! Source mesh to tile container: decodes every payload, builds its tile
//! binary and registers it, voting the tile size along the way.

use tracing::{debug, info, warn};

use crate::mesh::{MeshError, NavMesh, NavMeshParams, TileSizeVote};
use crate::source::{DecodeError, SourceMesh};
use crate::tile::builder::{build_tile, LayoutError};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("payload {index}: {source}")]
    Decode { index: usize, #[source] source: DecodeError },
    #[error("tile ({x}, {y}): {source}")]
    Layout { x: i32, y: i32, #[source] source: LayoutError },
    #[error("tile ({x}, {y}): {source}")]
    Mesh { x: i32, y: i32, #[source] source: MeshError },
    #[error(transparent)]
    Init(#[from] MeshError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConvertReport {
    pub tiles: usize,
    pub off_mesh_stored: usize,
    /// Connections whose start point lies in no tile.
    pub off_mesh_dropped: usize,
    pub tile_size: f32,
    pub votes: i32,
}

#[derive(Debug, Clone)]
pub struct Conversion {
    pub mesh: NavMesh,
    pub report: ConvertReport,
}

pub fn convert(source: &SourceMesh) -> Result<Conversion, ConvertError> {
    let mut mesh = NavMesh::new(NavMeshParams::for_tile_count(source.payloads.len()))?;
    let agent = source.params.agent();
    let mut vote = TileSizeVote::new();
    let mut owned = vec![false; source.off_mesh.len()];

    for (index, payload) in source.payloads.iter().enumerate() {
        let tile = payload.decode().map_err(|source| ConvertError::Decode { index, source })?;
        let (x, y) = (tile.header.x, tile.header.y);
        vote.observe(tile.horizontal_size());

        let built = build_tile(&tile, &source.off_mesh, &agent).map_err(|source| ConvertError::Layout { x, y, source })?;
        for &i in &built.stored {
            owned[i] = true;
        }
        debug!(index, x, y, polys = tile.polys.len(), off_mesh = built.stored.len(), bytes = built.data.len(), "tile converted");
        mesh.add_tile(built.data, None).map_err(|source| ConvertError::Mesh { x, y, source })?;
    }

    let tile_size = vote.finish();
    mesh.set_tile_size(tile_size);

    let off_mesh_stored = owned.iter().filter(|&&o| o).count();
    let report = ConvertReport {
        tiles: mesh.tile_count(),
        off_mesh_stored,
        off_mesh_dropped: owned.len() - off_mesh_stored,
        tile_size,
        votes: vote.votes(),
    };
    if report.off_mesh_dropped > 0 {
        warn!(dropped = report.off_mesh_dropped, "off-mesh connections start outside every tile");
    }
    info!(tiles = report.tiles, tile_size, votes = report.votes, off_mesh = off_mesh_stored, "conversion finished");
    Ok(Conversion { mesh, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{grid_source, link_between};
    use crate::source::Payload;

    #[test]
    fn converts_every_payload() {
        let conv = convert(&grid_source(3, 2, 4, 0.0, &[])).unwrap();
        assert_eq!(conv.report.tiles, 6);
        assert_eq!(conv.mesh.params().max_tiles, 8);
        assert_eq!(conv.report.tile_size, 4.0);
        assert_eq!(conv.mesh.params().tile_width, 4.0);
        assert!(conv.mesh.tile_at(2, 1, 0).is_some());
    }

    #[test]
    fn counts_stored_and_dropped_connections() {
        let links = [
            link_between([1.0, 0.0, 1.0], [5.0, 0.0, 1.0], true),
            link_between([50.0, 0.0, 50.0], [1.0, 0.0, 1.0], false),
        ];
        let conv = convert(&grid_source(2, 1, 4, 0.0, &links)).unwrap();
        assert_eq!(conv.report.off_mesh_stored, 1);
        assert_eq!(conv.report.off_mesh_dropped, 1);
        let h = conv.mesh.tile_at(0, 0, 0).and_then(|t| t.header()).unwrap();
        assert_eq!(h.off_mesh_con_count, 1);
    }

    #[test]
    fn decode_failure_names_payload() {
        let mut src = grid_source(2, 1, 2, 0.0, &[]);
        src.payloads.push(Payload { offset: 0, bytes: vec![0; 8], declared_len: 8 });
        match convert(&src) {
            Err(ConvertError::Decode { index: 2, .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_tile_location_fails() {
        let mut src = grid_source(1, 1, 2, 0.0, &[]);
        src.payloads.push(src.payloads[0].clone());
        assert!(matches!(convert(&src), Err(ConvertError::Mesh { x: 0, y: 0, source: MeshError::Occupied { .. } })));
    }
}
