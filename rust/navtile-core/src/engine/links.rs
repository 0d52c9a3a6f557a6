//! Link construction. Internal links come from the polygon `neis` table,
//! portal links join matching border edges of neighbouring tiles, and off-mesh
//! connections are attached at both ends.

use crate::geom::Vec3;
use crate::mesh::PolyRef;
use crate::tile::{EXT_LINK, SIDE_INSIDE};

use super::tile::{Link, RuntimeTile, LINK_EDGE_OFF_MESH};
use super::NavMeshSearch;

const MAX_PORTALS_PER_EDGE: usize = 4;
const SLAB_TOLERANCE: f32 = 0.01;

/// Grid step towards each of the eight neighbour sides.
const NEIGHBOUR_STEP: [(i32, i32); 8] = [(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)];

pub(crate) fn opposite_side(side: u8) -> u8 { (side + 4) & 7 }

enum Change {
    Link { slot: usize, poly: usize, link: Link },
    Snap { slot: usize, vert: usize, pos: Vec3 },
}

fn slab_coord(v: Vec3, side: u8) -> f32 {
    match side {
        0 | 4 => v[0],
        2 | 6 => v[2],
        _ => 0.0,
    }
}

/// Edge end points as (along-edge, height) pairs, ordered along the edge.
fn slab_end_points(va: Vec3, vb: Vec3, side: u8) -> ([f32; 2], [f32; 2]) {
    let a = if side == 0 || side == 4 { 2 } else { 0 };
    if va[a] < vb[a] {
        ([va[a], va[1]], [vb[a], vb[1]])
    } else {
        ([vb[a], vb[1]], [va[a], va[1]])
    }
}

fn overlap_slabs(amin: [f32; 2], amax: [f32; 2], bmin: [f32; 2], bmax: [f32; 2], px: f32, py: f32) -> bool {
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let dmin = (bd * minx + bk) - (ad * minx + ak);
    let dmax = (bd * maxx + bk) - (ad * maxx + ak);
    if dmin * dmax < 0.0 {
        return true;
    }
    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

fn quantise_portal(t: f32) -> u8 { (t.clamp(0.0, 1.0) * 255.0).round() as u8 }

impl RuntimeTile {
    fn connect_internal(&mut self) {
        for ip in 0..self.polys.len() {
            let poly = self.polys[ip];
            if poly.is_off_mesh() {
                continue;
            }
            for j in 0..poly.vert_count as usize {
                let nei = poly.neis[j];
                if nei == 0 || nei & EXT_LINK != 0 || nei as usize > self.polys.len() {
                    continue;
                }
                let link = Link { target: self.poly_ref(nei as usize - 1), edge: j as u8, side: SIDE_INSIDE, bmin: 0, bmax: 0 };
                self.links[ip].push(link);
            }
        }
    }

    /// Attaches the start of every off-mesh connection to the nearest ground
    /// polygon within its radius, snapping the start vertex onto it.
    fn connect_off_mesh_starts(&mut self) {
        let mut changes = Vec::new();
        for con in &self.off_mesh_cons {
            let ext = [con.rad, self.header.walkable_climb, con.rad];
            let Some((land, nearest, _)) = self.nearest_poly(con.start, ext, None) else { continue };
            if horizontal_dist_sqr(nearest, con.start) > con.rad * con.rad {
                continue;
            }
            let ip = con.poly as usize;
            changes.push(Change::Snap { slot: self.slot, vert: self.polys[ip].verts[0] as usize, pos: nearest });
            let out = Link { target: self.poly_ref(land), edge: 0, side: SIDE_INSIDE, bmin: 0, bmax: 0 };
            changes.push(Change::Link { slot: self.slot, poly: ip, link: out });
            let back = Link { target: self.poly_ref(ip), edge: LINK_EDGE_OFF_MESH, side: SIDE_INSIDE, bmin: 0, bmax: 0 };
            changes.push(Change::Link { slot: self.slot, poly: land, link: back });
        }
        for c in changes {
            self.apply(c);
        }
    }

    fn apply(&mut self, change: Change) {
        match change {
            Change::Link { poly, link, .. } => self.links[poly].push(link),
            Change::Snap { vert, pos, .. } => self.verts[vert] = pos,
        }
    }

    /// Polygons of this tile with a border edge on `side` that lines up with
    /// edge `va`-`vb` of a neighbour, with the shared range along the edge.
    fn connecting_polys(&self, va: Vec3, vb: Vec3, side: u8) -> Vec<(PolyRef, f32, f32)> {
        let (amin, amax) = slab_end_points(va, vb, side);
        let apos = slab_coord(va, side);
        let marker = EXT_LINK | side as u16;
        let mut out = Vec::new();
        for (ip, poly) in self.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                if poly.neis[j] != marker {
                    continue;
                }
                let vc = self.vert(ip, j);
                let vd = self.vert(ip, (j + 1) % nv);
                if (apos - slab_coord(vc, side)).abs() > SLAB_TOLERANCE {
                    continue;
                }
                let (bmin, bmax) = slab_end_points(vc, vd, side);
                if !overlap_slabs(amin, amax, bmin, bmax, SLAB_TOLERANCE, self.header.walkable_climb) {
                    continue;
                }
                if out.len() < MAX_PORTALS_PER_EDGE {
                    out.push((self.poly_ref(ip), amin[0].max(bmin[0]), amax[0].min(bmax[0])));
                }
                break;
            }
        }
        out
    }
}

fn horizontal_dist_sqr(a: Vec3, b: Vec3) -> f32 {
    let dx = a[0] - b[0];
    let dz = a[2] - b[2];
    dx * dx + dz * dz
}

/// Portal links from the border edges of `tile` facing `side` into `target`.
fn plan_portal_links(tile: &RuntimeTile, target: &RuntimeTile, side: u8, changes: &mut Vec<Change>) {
    for (ip, poly) in tile.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            let nei = poly.neis[j];
            if nei & EXT_LINK == 0 || (nei & 0xff) as u8 != side {
                continue;
            }
            let va = tile.vert(ip, j);
            let vb = tile.vert(ip, (j + 1) % nv);
            for (r, lo, hi) in target.connecting_polys(va, vb, opposite_side(side)) {
                let a = if side == 0 || side == 4 { 2 } else { 0 };
                let span = vb[a] - va[a];
                let (mut tmin, mut tmax) = ((lo - va[a]) / span, (hi - va[a]) / span);
                if tmin > tmax {
                    std::mem::swap(&mut tmin, &mut tmax);
                }
                let link = Link { target: r, edge: j as u8, side, bmin: quantise_portal(tmin), bmax: quantise_portal(tmax) };
                changes.push(Change::Link { slot: tile.slot, poly: ip, link });
            }
        }
    }
}

/// Lands the off-mesh connections of `target` whose end lies on `side` of it
/// (seen from `tile`) onto the ground polygons of `tile`. `side` is
/// [`SIDE_INSIDE`] when both are the same tile.
fn plan_off_mesh_ends(tile: &RuntimeTile, target: &RuntimeTile, side: u8, changes: &mut Vec<Change>) {
    let opposite = if side == SIDE_INSIDE { SIDE_INSIDE } else { opposite_side(side) };
    for con in &target.off_mesh_cons {
        if con.side != opposite {
            continue;
        }
        let ip = con.poly as usize;
        // start never landed
        if target.links[ip].is_empty() {
            continue;
        }
        let ext = [con.rad, target.header.walkable_climb, con.rad];
        let Some((land, nearest, _)) = tile.nearest_poly(con.end, ext, None) else { continue };
        if horizontal_dist_sqr(nearest, con.end) > con.rad * con.rad {
            continue;
        }
        changes.push(Change::Snap { slot: target.slot, vert: target.polys[ip].verts[1] as usize, pos: nearest });
        let out = Link { target: tile.poly_ref(land), edge: 1, side: opposite, bmin: 0, bmax: 0 };
        changes.push(Change::Link { slot: target.slot, poly: ip, link: out });
        if con.is_bidirectional() {
            let back = Link { target: target.poly_ref(ip), edge: LINK_EDGE_OFF_MESH, side, bmin: 0, bmax: 0 };
            changes.push(Change::Link { slot: tile.slot, poly: land, link: back });
        }
    }
}

impl NavMeshSearch {
    pub(super) fn connect_all(&mut self) {
        for tile in self.tiles.iter_mut().flatten() {
            tile.connect_internal();
            tile.connect_off_mesh_starts();
        }

        let mut changes = Vec::new();
        for tile in self.tiles.iter().flatten() {
            plan_off_mesh_ends(tile, tile, SIDE_INSIDE, &mut changes);
            let (x, y) = (tile.header.x, tile.header.y);
            for (side, (dx, dy)) in NEIGHBOUR_STEP.iter().enumerate() {
                let Some(slots) = self.grid.get(&(x + dx, y + dy)) else { continue };
                for &slot in slots {
                    let Some(target) = self.tiles[slot].as_ref() else { continue };
                    plan_portal_links(tile, target, side as u8, &mut changes);
                    plan_off_mesh_ends(tile, target, side as u8, &mut changes);
                }
            }
        }
        for change in changes {
            let slot = match change {
                Change::Link { slot, .. } | Change::Snap { slot, .. } => slot,
            };
            if let Some(tile) = self.tiles[slot].as_mut() {
                tile.apply(change);
            }
        }
    }
}
