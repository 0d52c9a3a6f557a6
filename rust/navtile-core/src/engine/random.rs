use rand::Rng;

use crate::geom::{random_point_in_convex_poly, tri_area_2d, Vec3};
use crate::mesh::PolyRef;

use super::{NavMeshSearch, QueryFilter};

impl NavMeshSearch {
    /// A random point on the mesh. A tile is picked uniformly, then a
    /// polygon inside it with probability proportional to its area, then a
    /// uniform point inside that polygon. `None` when no polygon passes the
    /// filter in the chosen tile.
    pub fn find_random_point<R: Rng + ?Sized>(&self, filter: &QueryFilter, rng: &mut R) -> Option<(PolyRef, Vec3)> {
        let mut tile = None;
        let mut tile_sum = 0.0f32;
        for t in self.resident() {
            tile_sum += 1.0;
            if rng.random::<f32>() * tile_sum <= 1.0 {
                tile = Some(t);
            }
        }
        let tile = tile?;

        let mut picked = None;
        let mut area_sum = 0.0f32;
        for (ip, p) in tile.polys.iter().enumerate() {
            if p.is_off_mesh() || !filter.passes(p) {
                continue;
            }
            let (verts, n) = tile.poly_verts(ip);
            let area: f32 = (2..n).map(|k| tri_area_2d(verts[0], verts[k - 1], verts[k]).abs() * 0.5).sum();
            area_sum += area;
            if rng.random::<f32>() * area_sum <= area {
                picked = Some(ip);
            }
        }
        let ip = picked?;

        let (verts, n) = tile.poly_verts(ip);
        let s = rng.random::<f32>();
        let t = rng.random::<f32>();
        let mut pt = random_point_in_convex_poly(&verts[..n], s, t);
        match tile.poly_height(ip, pt) {
            Some(h) => pt[1] = h,
            None => pt = tile.closest_point(ip, pt).0,
        }
        Some((tile.poly_ref(ip), pt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{grid_navmesh, navmesh_of, quad_grid_tile};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn points_land_inside_their_polygon() {
        let s = NavMeshSearch::new(grid_navmesh(2, 2, 3, &[]).unwrap()).unwrap();
        let f = QueryFilter::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (r, pt) = s.find_random_point(&f, &mut rng).unwrap();
            let verts = s.poly_vertices(r).unwrap();
            let (lo, hi) = (verts[0], verts[2]);
            assert!(pt[0] >= lo[0] - 1e-4 && pt[0] <= hi[0] + 1e-4, "{pt:?} outside {verts:?}");
            assert!(pt[2] >= lo[2] - 1e-4 && pt[2] <= hi[2] + 1e-4, "{pt:?} outside {verts:?}");
            assert_eq!(pt[1], 0.0);
        }
    }

    #[test]
    fn same_seed_same_point() {
        let s = NavMeshSearch::new(grid_navmesh(2, 1, 2, &[]).unwrap()).unwrap();
        let f = QueryFilter::default();
        let a = s.find_random_point(&f, &mut StdRng::seed_from_u64(42));
        let b = s.find_random_point(&f, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn excluded_polygons_are_never_picked() {
        let mut tile = quad_grid_tile(0, 0, 2, 1, 0.0);
        tile.polys[0].flags = 2;
        let s = NavMeshSearch::new(navmesh_of(&[tile], &[], 2.0).unwrap()).unwrap();
        let f = QueryFilter::with_flags(0xffff, 2);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let (_, pt) = s.find_random_point(&f, &mut rng).unwrap();
            assert!(pt[0] >= 1.0 - 1e-4);
        }
    }

    #[test]
    fn nothing_passes_gives_none() {
        let s = NavMeshSearch::new(grid_navmesh(1, 1, 2, &[]).unwrap()).unwrap();
        let f = QueryFilter::with_flags(0, 0);
        assert_eq!(s.find_random_point(&f, &mut StdRng::seed_from_u64(3)), None);
    }
}
