//! Spatial lookups: BV-tree polygon queries, nearest polygon, closest point and
//! surface height.

use crate::geom::{
    closest_height_point_triangle, dist_pt_poly_edges_sqr, dist_pt_seg_sqr_2d, overlap_bounds, overlap_quant_bounds,
    point_in_polygon, vadd, vdist_sqr, vlerp, vmax, vmin, vsub, Vec3,
};
use crate::mesh::PolyRef;
use crate::tile::VERTS_PER_POLYGON;

use super::filter::QueryFilter;
use super::tile::RuntimeTile;
use super::{NavMeshSearch, SearchError};

/// Result of a nearest-polygon search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoly {
    pub poly: PolyRef,
    pub point: Vec3,
    /// Whether the query point lies over the polygon in x/z.
    pub over_poly: bool,
}

/// Squared distance used to rank candidates. Over-polygon hits only count the
/// height beyond the walkable climb.
fn nearest_score(center: Vec3, point: Vec3, over_poly: bool, climb: f32) -> f32 {
    if over_poly {
        let d = (center[1] - point[1]).abs() - climb;
        if d > 0.0 { d * d } else { 0.0 }
    } else {
        vdist_sqr(center, point)
    }
}

impl RuntimeTile {
    /// Ground polygons whose bounds overlap `[qmin, qmax]`. BV hits come back
    /// sorted by polygon index.
    pub(crate) fn query_polys(&self, qmin: Vec3, qmax: Vec3, filter: Option<&QueryFilter>, out: &mut Vec<usize>) {
        let start = out.len();
        let admit = |ip: usize| {
            let p = &self.polys[ip];
            !p.is_off_mesh() && filter.map_or(true, |f| f.passes(p))
        };

        if self.bv_nodes.is_empty() {
            for ip in 0..self.polys.len() {
                if !admit(ip) {
                    continue;
                }
                let (verts, n) = self.poly_verts(ip);
                let (bmin, bmax) = verts[1..n].iter().fold((verts[0], verts[0]), |(lo, hi), &v| (vmin(lo, v), vmax(hi, v)));
                if overlap_bounds(qmin, qmax, bmin, bmax) {
                    out.push(ip);
                }
            }
            return;
        }

        let h = &self.header;
        let q = h.bv_quant_factor;
        let clamp = |v: Vec3, a: usize| v[a].clamp(h.bmin[a], h.bmax[a]) - h.bmin[a];
        let mut bmin = [0u16; 3];
        let mut bmax = [0u16; 3];
        for a in 0..3 {
            bmin[a] = ((q * clamp(qmin, a)) as u16) & 0xfffe;
            bmax[a] = ((q * clamp(qmax, a) + 1.0) as u16) | 1;
        }

        let mut i = 0;
        while i < self.bv_nodes.len() {
            let node = &self.bv_nodes[i];
            let overlap = overlap_quant_bounds(bmin, bmax, node.bmin, node.bmax);
            let leaf = node.i >= 0;
            if leaf && overlap {
                let ip = node.i as usize;
                if ip < self.polys.len() && admit(ip) {
                    out.push(ip);
                }
            }
            if overlap || leaf {
                i += 1;
            } else {
                i += node.i.unsigned_abs() as usize;
            }
        }
        // zero-filled trailing nodes repeat polygon 0
        let mut found = out.split_off(start);
        found.sort_unstable();
        found.dedup();
        out.extend(found);
    }

    /// Surface height under `pos`, `None` when `pos` is outside the polygon.
    pub(crate) fn poly_height(&self, ip: usize, pos: Vec3) -> Option<f32> {
        let p = &self.polys[ip];
        if p.is_off_mesh() {
            let (v0, v1) = (self.vert(ip, 0), self.vert(ip, 1));
            let (_, t) = dist_pt_seg_sqr_2d(pos, v0, v1);
            return Some(v0[1] + (v1[1] - v0[1]) * t);
        }
        let (verts, n) = self.poly_verts(ip);
        if !point_in_polygon(pos, &verts[..n]) {
            return None;
        }
        let count = self.triangle_count(ip);
        for k in 0..count {
            let [a, b, c] = self.triangle(ip, k);
            if let Some(h) = closest_height_point_triangle(pos, a, b, c) {
                return Some(h);
            }
        }
        // on a triangle edge: take the closest edge point
        let mut best = (f32::MAX, pos[1]);
        for k in 0..count {
            let tri = self.triangle(ip, k);
            for e in 0..3 {
                let (va, vb) = (tri[e], tri[(e + 1) % 3]);
                let (d, t) = dist_pt_seg_sqr_2d(pos, va, vb);
                if d < best.0 {
                    best = (d, vlerp(va, vb, t)[1]);
                }
            }
        }
        Some(best.1)
    }

    /// Closest point on the polygon boundary in x/z, or `pos` itself when inside.
    pub(crate) fn closest_point_on_boundary(&self, ip: usize, pos: Vec3) -> Vec3 {
        let (verts, n) = self.poly_verts(ip);
        let mut ed = [0.0f32; VERTS_PER_POLYGON];
        let mut et = [0.0f32; VERTS_PER_POLYGON];
        if dist_pt_poly_edges_sqr(pos, &verts[..n], &mut ed, &mut et) {
            return pos;
        }
        let imin = (0..n).fold(0, |m, k| if ed[k] < ed[m] { k } else { m });
        vlerp(verts[imin], verts[(imin + 1) % n], et[imin])
    }

    pub(crate) fn closest_point(&self, ip: usize, pos: Vec3) -> (Vec3, bool) {
        let p = &self.polys[ip];
        if p.is_off_mesh() {
            let (v0, v1) = (self.vert(ip, 0), self.vert(ip, 1));
            let (_, t) = dist_pt_seg_sqr_2d(pos, v0, v1);
            return (vlerp(v0, v1, t), false);
        }
        if let Some(h) = self.poly_height(ip, pos) {
            return ([pos[0], h, pos[2]], true);
        }
        let mut closest = self.closest_point_on_boundary(ip, pos);
        if let Some(h) = self.poly_height(ip, closest) {
            closest[1] = h;
        }
        (closest, false)
    }

    /// Nearest ground polygon of this tile within `half_extents` of `center`.
    pub(crate) fn nearest_poly(&self, center: Vec3, half_extents: Vec3, filter: Option<&QueryFilter>) -> Option<(usize, Vec3, bool)> {
        let mut polys = Vec::new();
        self.query_polys(vsub(center, half_extents), vadd(center, half_extents), filter, &mut polys);
        let mut best: Option<(usize, Vec3, bool)> = None;
        let mut best_d = f32::MAX;
        for ip in polys {
            let (closest, over) = self.closest_point(ip, center);
            let d = nearest_score(center, closest, over, self.header.walkable_climb);
            if d < best_d {
                best_d = d;
                best = Some((ip, closest, over));
            }
        }
        best
    }
}

impl NavMeshSearch {
    /// Grid cell of `pos` under the container's tile size.
    pub fn tile_location(&self, pos: Vec3) -> (i32, i32) {
        let p = self.mesh.params();
        (
            ((pos[0] - p.orig[0]) / p.tile_width).floor() as i32,
            ((pos[2] - p.orig[2]) / p.tile_height).floor() as i32,
        )
    }

    fn tiles_overlapping(&self, qmin: Vec3, qmax: Vec3) -> Vec<usize> {
        let p = self.mesh.params();
        if !(p.tile_width > 0.0 && p.tile_height > 0.0) {
            return self.resident().map(|t| t.slot).collect();
        }
        let (minx, miny) = self.tile_location(qmin);
        let (maxx, maxy) = self.tile_location(qmax);
        let mut slots: Vec<usize> = self
            .grid
            .iter()
            .filter(|(&(x, y), _)| (minx..=maxx).contains(&x) && (miny..=maxy).contains(&y))
            .flat_map(|(_, at)| at.iter().copied())
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Every ground polygon passing `filter` whose bounds overlap the box
    /// around `center`.
    pub fn query_polygons(&self, center: Vec3, half_extents: Vec3, filter: &QueryFilter) -> Vec<PolyRef> {
        let (qmin, qmax) = (vsub(center, half_extents), vadd(center, half_extents));
        let mut out = Vec::new();
        let mut polys = Vec::new();
        for slot in self.tiles_overlapping(qmin, qmax) {
            let Some(tile) = self.tiles[slot].as_ref() else { continue };
            polys.clear();
            tile.query_polys(qmin, qmax, Some(filter), &mut polys);
            out.extend(polys.iter().map(|&ip| tile.poly_ref(ip)));
        }
        out
    }

    pub fn find_nearest_poly(&self, center: Vec3, half_extents: Vec3, filter: &QueryFilter) -> Option<NearestPoly> {
        let (qmin, qmax) = (vsub(center, half_extents), vadd(center, half_extents));
        let mut best: Option<NearestPoly> = None;
        let mut best_d = f32::MAX;
        let mut polys = Vec::new();
        for slot in self.tiles_overlapping(qmin, qmax) {
            let Some(tile) = self.tiles[slot].as_ref() else { continue };
            polys.clear();
            tile.query_polys(qmin, qmax, Some(filter), &mut polys);
            for &ip in &polys {
                let (point, over_poly) = tile.closest_point(ip, center);
                let d = nearest_score(center, point, over_poly, tile.header.walkable_climb);
                if d < best_d {
                    best_d = d;
                    best = Some(NearestPoly { poly: tile.poly_ref(ip), point, over_poly });
                }
            }
        }
        best
    }

    /// Closest point on the polygon surface; the flag tells whether `pos` was
    /// over the polygon.
    pub fn closest_point_on_poly(&self, r: PolyRef, pos: Vec3) -> Result<(Vec3, bool), SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        Ok(tile.closest_point(ip, pos))
    }

    pub fn closest_point_on_poly_boundary(&self, r: PolyRef, pos: Vec3) -> Result<Vec3, SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        Ok(tile.closest_point_on_boundary(ip, pos))
    }

    /// Surface height of the polygon under `pos`; `Ok(None)` when `pos` lies
    /// outside it.
    pub fn get_poly_height(&self, r: PolyRef, pos: Vec3) -> Result<Option<f32>, SearchError> {
        let (tile, ip) = self.tile_and_poly(r)?;
        Ok(tile.poly_height(ip, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::grid_navmesh;

    fn search(tx: i32, tz: i32, n: usize) -> NavMeshSearch {
        NavMeshSearch::new(grid_navmesh(tx, tz, n, &[]).unwrap()).unwrap()
    }

    #[test]
    fn nearest_poly_over_surface() {
        let s = search(1, 1, 4);
        let hit = s.find_nearest_poly([1.5, 0.3, 2.5], [2.0, 4.0, 2.0], &QueryFilter::default()).unwrap();
        assert!(hit.over_poly);
        assert_eq!(hit.point, [1.5, 0.0, 2.5]);
        let (tile, ip) = s.tile_and_poly(hit.poly).unwrap();
        assert_eq!(tile.closest_point_on_boundary(ip, [1.5, 0.0, 2.5]), [1.5, 0.0, 2.5]);
        let (verts, n) = tile.poly_verts(ip);
        assert!(point_in_polygon([1.5, 0.0, 2.5], &verts[..n]));
    }

    #[test]
    fn nearest_poly_outside_mesh_clamps_to_edge() {
        let s = search(1, 1, 4);
        let hit = s.find_nearest_poly([-1.0, 0.0, 0.5], [2.0, 4.0, 2.0], &QueryFilter::default()).unwrap();
        assert!(!hit.over_poly);
        assert!((hit.point[0] - 0.0).abs() < 1e-5);
        assert!((hit.point[2] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn nothing_in_range() {
        let s = search(1, 1, 4);
        assert!(s.find_nearest_poly([50.0, 0.0, 50.0], [2.0, 4.0, 2.0], &QueryFilter::default()).is_none());
    }

    #[test]
    fn excluded_flags_hide_polygons() {
        let s = search(1, 1, 2);
        let f = QueryFilter::with_flags(0xffff, 0x01);
        assert!(s.find_nearest_poly([1.0, 0.0, 1.0], [2.0, 4.0, 2.0], &f).is_none());
    }

    #[test]
    fn query_spans_tiles_without_duplicates() {
        let s = search(2, 2, 2);
        let mut refs = s.query_polygons([2.0, 0.0, 2.0], [0.5, 1.0, 0.5], &QueryFilter::default());
        assert_eq!(refs.len(), 4);
        refs.sort_unstable();
        refs.dedup();
        assert_eq!(refs.len(), 4);
        assert_eq!(s.query_polygons([2.0, 0.0, 2.0], [9.0, 1.0, 9.0], &QueryFilter::default()).len(), 16);
    }

    #[test]
    fn height_inside_and_outside() {
        let s = search(1, 1, 2);
        let hit = s.find_nearest_poly([0.5, 0.0, 0.5], [0.1, 1.0, 0.1], &QueryFilter::default()).unwrap();
        assert_eq!(s.get_poly_height(hit.poly, [0.25, 5.0, 0.75]).unwrap(), Some(0.0));
        assert_eq!(s.get_poly_height(hit.poly, [1.5, 0.0, 1.5]).unwrap(), None);
        let (p, over) = s.closest_point_on_poly(hit.poly, [1.5, 3.0, 0.5]).unwrap();
        assert!(!over);
        assert!((p[0] - 1.0).abs() < 1e-5 && p[1] == 0.0);
        assert!(s.get_poly_height(0xdead_beef, [0.0; 3]).is_err());
    }
}
