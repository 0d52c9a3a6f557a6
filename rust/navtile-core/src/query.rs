//! Query session over a loaded mesh: endpoint snapping, corridor search,
//! straight and stepped paths, random points.
//!
//! A [`NavQuery`] owns its scratch buffers, sized once from
//! [`QueryOptions::max_nodes`]. Every operation takes `&mut self` and the
//! returned points borrow those buffers, so a session serves one call at a
//! time; share the [`NavMeshSearch`] and give each caller its own session.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::engine::{NavMeshSearch, NodePool, QueryFilter, SearchError, SearchStatus, StraightPathOptions, StraightPoint};
use crate::geom::{vdot, vmad, vsub, Vec3};
use crate::mesh::PolyRef;
use crate::options::QueryOptions;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("no polygon near the {which} point")]
    NoPolygon { which: &'static str },
    #[error("no path found")]
    NoPath,
    #[error("step must be positive and finite")]
    InvalidStep,
    #[error("invalid polygon reference {0:#x}")]
    InvalidRef(PolyRef),
}

impl From<SearchError> for QueryError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::InvalidRef(r) => QueryError::InvalidRef(r),
            _ => QueryError::NoPath,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathStatus {
    /// The goal was unreachable; the path ends at the closest reachable point.
    pub partial: bool,
    /// A corridor or point buffer filled up before the path was complete.
    pub buffer_too_small: bool,
}

impl PathStatus {
    fn merge(&mut self, s: SearchStatus) {
        self.partial |= s.partial;
        self.buffer_too_small |= s.buffer_too_small;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathResult<'a> {
    pub points: &'a [Vec3],
    pub status: PathStatus,
}

struct Corridor {
    start_ref: PolyRef,
    len: usize,
    end: Vec3,
    status: PathStatus,
}

pub struct NavQuery {
    search: Arc<NavMeshSearch>,
    options: QueryOptions,
    filter: QueryFilter,
    pool: NodePool,
    corridor: Vec<PolyRef>,
    steer: Vec<StraightPoint>,
    points: Vec<Vec3>,
}

impl NavQuery {
    pub fn new(search: Arc<NavMeshSearch>, options: QueryOptions) -> Self {
        let n = options.max_nodes.max(1);
        NavQuery {
            filter: options.filter(),
            pool: NodePool::new(n),
            corridor: vec![0; n],
            steer: vec![StraightPoint::default(); n],
            points: vec![[0.0; 3]; n],
            search,
            options,
        }
    }

    pub fn search(&self) -> &Arc<NavMeshSearch> { &self.search }

    pub fn options(&self) -> &QueryOptions { &self.options }

    pub fn filter_mut(&mut self) -> &mut QueryFilter { &mut self.filter }

    /// Polygon nearest to `center` inside the box `half_extents`, and the
    /// closest point on it.
    pub fn find_nearest_point(&self, center: Vec3, half_extents: Vec3) -> Result<(PolyRef, Vec3), QueryError> {
        self.search
            .find_nearest_poly(center, half_extents, &self.filter)
            .map(|n| (n.poly, n.point))
            .ok_or(QueryError::NoPolygon { which: "center" })
    }

    fn locate(&self, pos: Vec3, which: &'static str) -> Result<PolyRef, QueryError> {
        self.search
            .find_nearest_poly(pos, self.options.half_extents, &self.filter)
            .map(|n| n.poly)
            .ok_or(QueryError::NoPolygon { which })
    }

    /// Corridor from `start` to `end` in `self.corridor`. On a partial
    /// corridor the end is clamped onto its last polygon.
    fn plan(&mut self, start: Vec3, end: Vec3) -> Result<Corridor, QueryError> {
        let start_ref = self.locate(start, "start")?;
        let end_ref = self.locate(end, "end")?;
        let (len, found) =
            self.search.find_path(&mut self.pool, start_ref, end_ref, start, end, &self.filter, &mut self.corridor)?;
        if len == 0 {
            return Err(QueryError::NoPath);
        }
        let mut status = PathStatus::default();
        status.merge(found);

        let last = self.corridor[len - 1];
        let end = if last != end_ref { self.search.closest_point_on_poly(last, end)?.0 } else { end };
        Ok(Corridor { start_ref, len, end, status })
    }

    fn pull(&mut self, start: Vec3, c: &Corridor, all_crossings: bool) -> Result<(usize, PathStatus), QueryError> {
        let (n, pulled) = self.search.find_straight_path(
            start,
            c.end,
            &self.corridor[..c.len],
            &mut self.steer,
            StraightPathOptions { all_crossings },
        )?;
        let mut status = c.status;
        status.merge(pulled);
        Ok((n, status))
    }

    /// Corner points of the shortest path from `start` to `end`.
    pub fn find_straight_path(&mut self, start: Vec3, end: Vec3) -> Result<PathResult<'_>, QueryError> {
        let c = self.plan(start, end)?;
        let (n, status) = self.pull(start, &c, false)?;
        for (dst, p) in self.points.iter_mut().zip(&self.steer[..n]) {
            *dst = p.pos;
        }
        debug!(corridor = c.len, points = n, partial = status.partial, "straight path");
        Ok(PathResult { points: &self.points[..n], status })
    }

    /// The path from `start` to `end` resampled every `step` units along
    /// the surface. Each landing point takes the height of the polygon it
    /// lands on.
    pub fn find_follow_path(&mut self, start: Vec3, end: Vec3, step: f32) -> Result<PathResult<'_>, QueryError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(QueryError::InvalidStep);
        }
        let c = self.plan(start, end)?;
        let (nsteer, mut status) = self.pull(start, &c, true)?;

        let cap = self.points.len();
        let mut iter = self.search.closest_point_on_poly(c.start_ref, start)?.0;
        self.points[0] = iter;
        let mut count = 1;
        let mut ns = 1;
        while ns < nsteer && count < cap {
            let delta = vsub(self.steer[ns].pos, iter);
            let len = vdot(delta, delta).sqrt();
            let factor = if len < step { 1.0 } else { step / len };
            let mut target = vmad(iter, delta, factor);
            if let Ok(Some(h)) = self.search.get_poly_height(self.steer[ns - 1].poly, target) {
                target[1] = h;
            }
            iter = target;
            self.points[count] = iter;
            count += 1;
            if factor >= 1.0 {
                ns += 1;
            }
        }
        if ns < nsteer && count == cap {
            status.buffer_too_small = true;
        }
        debug!(corridor = c.len, steer = nsteer, points = count, step, "follow path");
        Ok(PathResult { points: &self.points[..count], status })
    }

    pub fn find_random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(PolyRef, Vec3), QueryError> {
        self.search.find_random_point(&self.filter, rng).ok_or(QueryError::NoPolygon { which: "random" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{grid_navmesh, navmesh_of, quad_grid_tile};
    use crate::geom::vdist;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(tx: i32, tz: i32, n: usize, max_nodes: usize) -> NavQuery {
        let search = NavMeshSearch::new(grid_navmesh(tx, tz, n, &[]).unwrap()).unwrap();
        NavQuery::new(Arc::new(search), QueryOptions { max_nodes, ..Default::default() })
    }

    #[test]
    fn same_polygon_straight_path_has_two_points() {
        let mut q = session(1, 1, 2, 64);
        let r = q.find_straight_path([0.2, 0.0, 0.3], [0.7, 0.0, 0.8]).unwrap();
        assert_eq!(r.points, &[[0.2, 0.0, 0.3], [0.7, 0.0, 0.8]]);
        assert_eq!(r.status, PathStatus::default());
    }

    #[test]
    fn straight_path_crosses_tiles() {
        let mut q = session(3, 1, 2, 64);
        let r = q.find_straight_path([0.5, 0.0, 0.5], [5.5, 0.0, 0.5]).unwrap();
        assert_eq!(r.points.len(), 2);
        assert!(!r.status.partial);
    }

    #[test]
    fn long_step_reaches_the_end() {
        let mut q = session(1, 1, 2, 64);
        let (start, end) = ([0.2, 0.0, 0.3], [0.7, 0.0, 0.8]);
        let r = q.find_follow_path(start, end, 10.0).unwrap();
        assert_eq!(r.points.len(), 2);
        assert_eq!(r.points[0], start);
        assert!(vdist(r.points[1], end) < 1e-5);
    }

    #[test]
    fn follow_path_steps_evenly() {
        let mut q = session(1, 1, 4, 64);
        let r = q.find_follow_path([0.5, 0.0, 0.5], [3.5, 0.0, 0.5], 0.5).unwrap();
        assert!(!r.status.buffer_too_small);
        for w in r.points.windows(2) {
            assert!(vdist(w[0], w[1]) <= 0.5 + 1e-4);
        }
        assert!(vdist(*r.points.last().unwrap(), [3.5, 0.0, 0.5]) < 1e-4);
    }

    #[test]
    fn follow_path_stops_at_capacity() {
        let mut q = session(1, 1, 2, 4);
        let r = q.find_follow_path([0.2, 0.0, 0.5], [1.8, 0.0, 0.5], 0.1).unwrap();
        assert_eq!(r.points.len(), 4);
        assert!(r.status.buffer_too_small);
    }

    #[test]
    fn rejects_bad_steps() {
        let mut q = session(1, 1, 2, 16);
        for step in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert_eq!(q.find_follow_path([0.5, 0.0, 0.5], [1.5, 0.0, 0.5], step).unwrap_err(), QueryError::InvalidStep);
        }
    }

    #[test]
    fn unreachable_end_is_clamped_and_partial() {
        let tiles = [quad_grid_tile(0, 0, 2, 1, 0.0), quad_grid_tile(2, 0, 2, 1, 0.0)];
        let search = NavMeshSearch::new(navmesh_of(&tiles, &[], 2.0).unwrap()).unwrap();
        let mut q = NavQuery::new(Arc::new(search), QueryOptions::default());
        let r = q.find_straight_path([0.5, 0.0, 0.5], [5.0, 0.0, 0.5]).unwrap();
        assert!(r.status.partial);
        let last = *r.points.last().unwrap();
        assert!((last[0] - 2.0).abs() < 1e-5, "{last:?}");
    }

    #[test]
    fn off_mesh_points_have_no_polygon() {
        let mut q = session(1, 1, 2, 16);
        assert_eq!(
            q.find_straight_path([30.0, 0.0, 30.0], [0.5, 0.0, 0.5]).unwrap_err(),
            QueryError::NoPolygon { which: "start" }
        );
        assert_eq!(q.find_nearest_point([40.0, 0.0, 0.5], [1.0, 1.0, 1.0]).unwrap_err(), QueryError::NoPolygon { which: "center" });
        let (r, p) = q.find_nearest_point([0.5, 1.0, 0.5], [1.0, 2.0, 1.0]).unwrap();
        assert!(q.search().is_valid_poly_ref(r));
        assert_eq!(p, [0.5, 0.0, 0.5]);
    }

    #[test]
    fn random_point_is_on_the_mesh() {
        let q = session(2, 2, 2, 16);
        let (r, p) = q.find_random_point(&mut StdRng::seed_from_u64(9)).unwrap();
        let (back, _) = q.find_nearest_point(p, [0.01, 0.1, 0.01]).unwrap();
        assert!(q.search().is_valid_poly_ref(r));
        assert_eq!(q.search().poly_vertices(back).unwrap().len(), 4);
    }
}
