//! Small vector helpers over `[f32; 3]` used by the layout builder and the
//! search engine. Horizontal ("2D") helpers work in the x/z plane.

pub type Vec3 = [f32; 3];

#[inline]
pub fn vadd(a: Vec3, b: Vec3) -> Vec3 { [a[0] + b[0], a[1] + b[1], a[2] + b[2]] }
#[inline]
pub fn vsub(a: Vec3, b: Vec3) -> Vec3 { [a[0] - b[0], a[1] - b[1], a[2] - b[2]] }
#[inline]
pub fn vscale(a: Vec3, s: f32) -> Vec3 { [a[0] * s, a[1] * s, a[2] * s] }
/// `a + d * s`
#[inline]
pub fn vmad(a: Vec3, d: Vec3, s: f32) -> Vec3 { [a[0] + d[0] * s, a[1] + d[1] * s, a[2] + d[2] * s] }
#[inline]
pub fn vlerp(a: Vec3, b: Vec3, t: f32) -> Vec3 { vmad(a, vsub(b, a), t) }
#[inline]
pub fn vdot(a: Vec3, b: Vec3) -> f32 { a[0] * b[0] + a[1] * b[1] + a[2] * b[2] }
#[inline]
pub fn vcross(a: Vec3, b: Vec3) -> Vec3 {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}
#[inline]
pub fn vlen(a: Vec3) -> f32 { vdot(a, a).sqrt() }
#[inline]
pub fn vdist_sqr(a: Vec3, b: Vec3) -> f32 { let d = vsub(b, a); vdot(d, d) }
#[inline]
pub fn vdist(a: Vec3, b: Vec3) -> f32 { vdist_sqr(a, b).sqrt() }
#[inline]
pub fn vdist_2d_sqr(a: Vec3, b: Vec3) -> f32 {
    let dx = b[0] - a[0];
    let dz = b[2] - a[2];
    dx * dx + dz * dz
}

/// Points closer than 1/16384 are treated as the same point.
#[inline]
pub fn vequal(a: Vec3, b: Vec3) -> bool {
    const THR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);
    vdist_sqr(a, b) < THR
}

pub fn vmin(a: Vec3, b: Vec3) -> Vec3 { [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])] }
pub fn vmax(a: Vec3, b: Vec3) -> Vec3 { [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])] }

/// Twice the signed area of triangle `abc` projected on x/z.
#[inline]
pub fn tri_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let abx = b[0] - a[0];
    let abz = b[2] - a[2];
    let acx = c[0] - a[0];
    let acz = c[2] - a[2];
    acx * abz - abx * acz
}

/// Squared horizontal distance from `pt` to segment `pq`, plus the segment
/// parameter of the closest point.
pub fn dist_pt_seg_sqr_2d(pt: Vec3, p: Vec3, q: Vec3) -> (f32, f32) {
    let pqx = q[0] - p[0];
    let pqz = q[2] - p[2];
    let dx = pt[0] - p[0];
    let dz = pt[2] - p[2];
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 { t /= d; }
    let t = t.clamp(0.0, 1.0);
    let dx = p[0] + t * pqx - pt[0];
    let dz = p[2] + t * pqz - pt[2];
    (dx * dx + dz * dz, t)
}

/// Crossing-number test in x/z.
pub fn point_in_polygon(pt: Vec3, verts: &[Vec3]) -> bool {
    let n = verts.len();
    let mut c = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            c = !c;
        }
        j = i;
    }
    c
}

/// Same crossing test as [`point_in_polygon`], also filling the squared
/// distance and segment parameter for every edge `(j, j + 1)`.
pub fn dist_pt_poly_edges_sqr(pt: Vec3, verts: &[Vec3], ed: &mut [f32], et: &mut [f32]) -> bool {
    let n = verts.len();
    let mut c = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi[2] > pt[2]) != (vj[2] > pt[2]))
            && (pt[0] < (vj[0] - vi[0]) * (pt[2] - vi[2]) / (vj[2] - vi[2]) + vi[0])
        {
            c = !c;
        }
        let (d, t) = dist_pt_seg_sqr_2d(pt, vj, vi);
        ed[j] = d;
        et[j] = t;
        j = i;
    }
    c
}

/// Height of triangle `abc` under `p`, if `p` projects inside it.
pub fn closest_height_point_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPS: f32 = 1e-6;
    let v0 = vsub(c, a);
    let v1 = vsub(b, a);
    let v2 = vsub(p, a);

    let mut denom = v0[0] * v1[2] - v0[2] * v1[0];
    if denom.abs() < EPS { return None; }

    let mut u = v1[2] * v2[0] - v1[0] * v2[2];
    let mut v = v0[0] * v2[2] - v0[2] * v2[0];
    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a[1] + (v0[1] * u + v1[1] * v) / denom)
    } else {
        None
    }
}

#[inline]
fn vperp_xz(a: Vec3, b: Vec3) -> f32 { a[0] * b[2] - a[2] * b[0] }

/// Parameters `(s, t)` of the intersection of lines `ap-aq` and `bp-bq` in x/z,
/// `None` when they are parallel.
pub fn intersect_seg_seg_2d(ap: Vec3, aq: Vec3, bp: Vec3, bq: Vec3) -> Option<(f32, f32)> {
    let u = vsub(aq, ap);
    let v = vsub(bq, bp);
    let w = vsub(ap, bp);
    let d = vperp_xz(u, v);
    if d.abs() < 1e-6 { return None; }
    Some((vperp_xz(v, w) / d, vperp_xz(u, w) / d))
}

pub fn overlap_bounds(amin: Vec3, amax: Vec3, bmin: Vec3, bmax: Vec3) -> bool {
    !(amin[0] > bmax[0] || amax[0] < bmin[0]
        || amin[1] > bmax[1] || amax[1] < bmin[1]
        || amin[2] > bmax[2] || amax[2] < bmin[2])
}

pub fn overlap_quant_bounds(amin: [u16; 3], amax: [u16; 3], bmin: [u16; 3], bmax: [u16; 3]) -> bool {
    !(amin[0] > bmax[0] || amax[0] < bmin[0]
        || amin[1] > bmax[1] || amax[1] < bmin[1]
        || amin[2] > bmax[2] || amax[2] < bmin[2])
}

/// Uniform sample inside a convex polygon from two unit randoms `s` and `t`.
pub fn random_point_in_convex_poly(pts: &[Vec3], s: f32, t: f32) -> Vec3 {
    let n = pts.len();
    let mut areas = [0.0f32; 8];
    let mut areasum = 0.0;
    for i in 2..n {
        areas[i] = tri_area_2d(pts[0], pts[i - 1], pts[i]).abs();
        areasum += areas[i].max(0.001);
    }
    let thr = s * areasum;
    let mut acc = 0.0;
    let mut u = 1.0;
    let mut tri = n - 1;
    for i in 2..n {
        let dacc = areas[i];
        if thr >= acc && thr < acc + dacc {
            u = (thr - acc) / dacc;
            tri = i;
            break;
        }
        acc += dacc;
    }

    let v = t.sqrt();
    let a = 1.0 - v;
    let b = (1.0 - u) * v;
    let c = u * v;
    let pa = pts[0];
    let pb = pts[tri - 1];
    let pc = pts[tri];
    [
        a * pa[0] + b * pb[0] + c * pc[0],
        a * pa[1] + b * pb[1] + c * pc[1],
        a * pa[2] + b * pb[2] + c * pc[2],
    ]
}

#[inline]
pub fn align4(n: usize) -> usize { (n + 3) & !3 }

pub fn next_pow2(v: u32) -> u32 {
    if v <= 1 { return 1; }
    let mut v = v - 1;
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v.wrapping_add(1)
}

/// Floor of log2; 0 for 0.
pub fn ilog2(v: u32) -> u32 { if v == 0 { 0 } else { 31 - v.leading_zeros() } }

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [Vec3; 4] = [[0.0, 0.0, 0.0], [0.0, 0.0, 2.0], [2.0, 0.0, 2.0], [2.0, 0.0, 0.0]];

    #[test]
    fn point_in_square() {
        assert!(point_in_polygon([1.0, 5.0, 1.0], &SQUARE));
        assert!(!point_in_polygon([3.0, 0.0, 1.0], &SQUARE));
        assert!(!point_in_polygon([1.0, 0.0, -0.5], &SQUARE));
    }

    #[test]
    fn height_on_sloped_triangle() {
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 2.0, 2.0];
        let c = [2.0, 0.0, 0.0];
        let h = closest_height_point_triangle([0.5, 9.0, 1.0], a, b, c).unwrap();
        assert!((h - 1.0).abs() < 1e-5);
        assert!(closest_height_point_triangle([3.0, 0.0, 3.0], a, b, c).is_none());
    }

    #[test]
    fn segment_distance_clamps() {
        let (d, t) = dist_pt_seg_sqr_2d([-1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [2.0, 0.0, 0.0]);
        assert_eq!(t, 0.0);
        assert!((d - 1.0).abs() < 1e-6);
        let (d, t) = dist_pt_seg_sqr_2d([1.0, 7.0, 1.0], [0.0, 0.0, 0.0], [2.0, 0.0, 0.0]);
        assert!((t - 0.5).abs() < 1e-6);
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn crossing_lines() {
        let (s, t) = intersect_seg_seg_2d([0.0, 0.0, 1.0], [4.0, 0.0, 1.0], [2.0, 0.0, 0.0], [2.0, 0.0, 2.0]).unwrap();
        assert!((s - 0.5).abs() < 1e-6);
        assert!((t - 0.5).abs() < 1e-6);
        assert!(intersect_seg_seg_2d([0.0; 3], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 1.0]).is_none());
    }

    #[test]
    fn random_points_stay_inside() {
        for i in 0..10 {
            for j in 0..10 {
                let p = random_point_in_convex_poly(&SQUARE, i as f32 / 10.0, j as f32 / 10.0);
                assert!(p[0] >= -1e-5 && p[0] <= 2.0 + 1e-5 && p[2] >= -1e-5 && p[2] <= 2.0 + 1e-5);
            }
        }
    }

    #[test]
    fn pow2_helpers() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(8), 8);
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(8), 3);
        assert_eq!(ilog2(9), 3);
        assert_eq!(align4(5), 8);
        assert_eq!(align4(8), 8);
    }
}
