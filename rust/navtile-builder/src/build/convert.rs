use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use navtile_core::tileset::{save_tileset, WriteSummary};
use navtile_core::{convert, ConvertReport, SourceMesh};

#[derive(Debug, Clone, Copy)]
pub struct BuildSummary {
    pub report: ConvertReport,
    pub written: WriteSummary,
}

/// Decodes `source`, converts every tile and writes the tile set to `output`.
pub fn convert_file(source: &Path, output: &Path) -> Result<BuildSummary> {
    let mesh = SourceMesh::open(source).with_context(|| format!("failed to read {:?}", source))?;
    info!(path = ?source, format = ?mesh.format, payloads = mesh.payloads.len(), off_mesh = mesh.off_mesh.len(), "source loaded");
    if mesh.payloads.is_empty() {
        anyhow::bail!("no tile payloads found in {:?}", source);
    }

    let conv = convert(&mesh).with_context(|| format!("converting {:?}", source))?;
    let report = conv.report;
    info!(tile_size = report.tile_size, votes = report.votes, tiles = report.tiles, "tile size voted");
    if report.off_mesh_dropped > 0 {
        warn!(dropped = report.off_mesh_dropped, stored = report.off_mesh_stored, "connections outside every tile were dropped");
    }

    let written = save_tileset(&conv.mesh, output).with_context(|| format!("writing {:?}", output))?;
    info!(path = ?output, tiles = written.tiles, bytes = written.bytes, hash = %written.hash_hex(), "wrote tile set");
    Ok(BuildSummary { report, written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use navtile_core::fixtures::{link_between, quad_grid_tile, text_asset};
    use navtile_core::load_tileset;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn writes_a_loadable_tile_set() {
        let tiles = [quad_grid_tile(0, 0, 3, 3, 0.0), quad_grid_tile(0, 1, 3, 3, 0.0)];
        let links = [link_between([1.5, 0.0, 1.5], [1.5, 0.0, 4.5], false), link_between([9.0, 0.0, 9.0], [1.0, 0.0, 1.0], true)];
        let mut src = NamedTempFile::new().unwrap();
        src.write_all(text_asset(&tiles, &links).as_bytes()).unwrap();
        let out = NamedTempFile::new().unwrap();

        let summary = convert_file(src.path(), out.path()).unwrap();
        assert_eq!(summary.report.tiles, 2);
        assert_eq!(summary.report.off_mesh_stored, 1);
        assert_eq!(summary.report.off_mesh_dropped, 1);
        assert_eq!(summary.written.bytes as u64, std::fs::metadata(out.path()).unwrap().len());
        assert_eq!(load_tileset(out.path()).unwrap().tile_count(), 2);
    }

    #[test]
    fn missing_source_names_the_path() {
        let out = NamedTempFile::new().unwrap();
        let err = convert_file(Path::new("/nonexistent/mesh.asset"), out.path()).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/mesh.asset"));
    }
}
