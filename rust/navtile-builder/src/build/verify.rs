//! Round-trip check of a written tile set: random start and end points,
//! straight paths between them, and a found/attempted tally.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use navtile_core::geom::vdist;
use navtile_core::{load_tileset, NavMesh, NavMeshSearch, NavQuery, PolyRef, QueryOptions};

/// Distance under which the last path point counts as the requested end.
pub const END_TOLERANCE: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    pub iterations: u32,
    pub max_nodes: usize,
    pub seed: Option<u64>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { iterations: 100, max_nodes: 2048, seed: None }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub attempted: u32,
    pub found: u32,
    /// Sampled polygons whose normal points down.
    pub downward: u32,
}

pub fn verify_file(path: &Path, opts: &VerifyOptions) -> Result<VerifyReport> {
    let mesh = load_tileset(path).with_context(|| format!("reading back {:?}", path))?;
    verify_mesh(mesh, opts)
}

pub fn verify_mesh(mesh: NavMesh, opts: &VerifyOptions) -> Result<VerifyReport> {
    let search = Arc::new(NavMeshSearch::new(mesh).context("building search graph")?);
    let options = QueryOptions { max_nodes: opts.max_nodes, ..Default::default() };
    let capacity = options.max_nodes;
    let mut query = NavQuery::new(search.clone(), options);
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut report = VerifyReport::default();
    for i in 0..opts.iterations {
        let (spoly, spos) = query.find_random_point(&mut rng).with_context(|| format!("iteration {i}: start point"))?;
        let (epoly, epos) = query.find_random_point(&mut rng).with_context(|| format!("iteration {i}: end point"))?;
        let path = query
            .find_straight_path(spos, epos)
            .with_context(|| format!("iteration {i}: straight path {spos:?} -> {epos:?}"))?;
        let count = path.points.len();
        let last = path.points.last().copied().unwrap_or(spos);
        report.attempted += 1;
        if count >= capacity || vdist(last, epos) <= END_TOLERANCE {
            report.found += 1;
        } else {
            debug!(iteration = i, points = count, dist = vdist(last, epos), partial = path.status.partial, "end not reached");
        }

        let sy = facing(&search, spoly)?;
        let ey = facing(&search, epoly)?;
        if sy < 0.0 || ey < 0.0 {
            report.downward += 1;
            warn!(iteration = i, points = count, dist = vdist(last, epos), sy, ey, "polygon normal faces down");
        }
    }
    info!(found = report.found, attempted = report.attempted, downward = report.downward, "verification finished");
    Ok(report)
}

fn facing(search: &NavMeshSearch, poly: PolyRef) -> Result<f32> {
    Ok(search.poly_normal(poly).with_context(|| format!("normal of {poly:#x}"))?[1])
}
