//! A* corridor search over polygon edge midpoints.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::geom::{vdist, vlerp, Vec3};
use crate::mesh::PolyRef;
use crate::tile::{POLYTYPE_OFFMESH_CONNECTION, SIDE_INSIDE};

use super::filter::QueryFilter;
use super::{NavMeshSearch, SearchError, SearchStatus};

/// Heuristic scale, slightly below 1 so the estimate stays admissible.
pub const H_SCALE: f32 = 0.999;

const NODE_OPEN: u8 = 0x01;
const NODE_CLOSED: u8 = 0x02;

#[derive(Debug, Clone, Copy)]
struct Node {
    pos: Vec3,
    cost: f32,
    total: f32,
    parent: Option<usize>,
    poly: PolyRef,
    flags: u8,
}

#[derive(Clone, Copy, Debug)]
struct HeapNode {
    total: f32,
    seq: u64,
    node: usize,
}

impl PartialEq for HeapNode { fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal } }
impl Eq for HeapNode {}
impl PartialOrd for HeapNode { fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) } }
impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is max-heap; invert ordering for min-heap behavior
        other
            .total
            .partial_cmp(&self.total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Search nodes of one query, keyed by polygon and the tile side it was
/// entered through. Capacity is fixed at construction.
#[derive(Debug, Clone)]
pub struct NodePool {
    nodes: Vec<Node>,
    index: FxHashMap<(PolyRef, u8), usize>,
    capacity: usize,
}

impl NodePool {
    pub fn new(capacity: usize) -> Self {
        NodePool { nodes: Vec::with_capacity(capacity), index: FxHashMap::default(), capacity }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
    }

    fn get_or_insert(&mut self, poly: PolyRef, state: u8) -> Option<usize> {
        if let Some(&i) = self.index.get(&(poly, state)) {
            return Some(i);
        }
        if self.nodes.len() >= self.capacity {
            return None;
        }
        let i = self.nodes.len();
        self.nodes.push(Node { pos: [0.0; 3], cost: 0.0, total: 0.0, parent: None, poly, flags: 0 });
        self.index.insert((poly, state), i);
        Some(i)
    }
}

/// Portal between two linked polygons: `(left, right, from_type, to_type)`.
pub(crate) type Portal = (Vec3, Vec3, u8, u8);

impl NavMeshSearch {
    /// Left and right end of the edge shared by `from` and `to`, clamped to the
    /// link's sub-range on tile borders. Off-mesh connections collapse the
    /// portal to their end point.
    pub(crate) fn portal_points(&self, from: PolyRef, to: PolyRef) -> Result<Portal, SearchError> {
        let (ft, fi) = self.tile_and_poly(from)?;
        let (tt, ti) = self.tile_and_poly(to)?;
        let (fp, tp) = (&ft.polys[fi], &tt.polys[ti]);
        let link = ft.links[fi].iter().find(|l| l.target == to).ok_or(SearchError::NoPortal { from, to })?;

        if fp.is_off_mesh() {
            let v = ft.vert(fi, link.edge as usize);
            return Ok((v, v, POLYTYPE_OFFMESH_CONNECTION, tp.poly_type()));
        }
        if tp.is_off_mesh() {
            let back = tt.links[ti].iter().find(|l| l.target == from).ok_or(SearchError::NoPortal { from, to })?;
            let v = tt.vert(ti, back.edge as usize);
            return Ok((v, v, fp.poly_type(), POLYTYPE_OFFMESH_CONNECTION));
        }

        let nv = fp.vert_count as usize;
        let e = link.edge as usize;
        let (v0, v1) = (ft.vert(fi, e), ft.vert(fi, (e + 1) % nv));
        let (mut left, mut right) = (v0, v1);
        if link.side != SIDE_INSIDE && (link.bmin != 0 || link.bmax != 255) {
            let s = 1.0 / 255.0;
            left = vlerp(v0, v1, link.bmin as f32 * s);
            right = vlerp(v0, v1, link.bmax as f32 * s);
        }
        Ok((left, right, fp.poly_type(), tp.poly_type()))
    }

    fn edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<Vec3, SearchError> {
        let (left, right, _, _) = self.portal_points(from, to)?;
        Ok(vlerp(left, right, 0.5))
    }

    /// Corridor of polygons from `start_ref` to `end_ref`, written into `path`.
    /// When the goal cannot be reached, or the pool runs dry, the corridor to
    /// the node closest to the goal is returned with `partial` set. Returns
    /// the number of polygons written.
    #[allow(clippy::too_many_arguments)]
    pub fn find_path(
        &self,
        pool: &mut NodePool,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: Vec3,
        end_pos: Vec3,
        filter: &QueryFilter,
        path: &mut [PolyRef],
    ) -> Result<(usize, SearchStatus), SearchError> {
        self.tile_and_poly(start_ref)?;
        self.tile_and_poly(end_ref)?;
        if path.is_empty() {
            return Err(SearchError::InvalidParam("path buffer is empty"));
        }
        if pool.capacity() == 0 {
            return Err(SearchError::InvalidParam("node pool has no capacity"));
        }
        if start_ref == end_ref {
            path[0] = start_ref;
            return Ok((1, SearchStatus::default()));
        }

        pool.clear();
        let mut open = BinaryHeap::new();
        let mut seq: u64 = 0;
        let mut status = SearchStatus::default();

        let start = pool.get_or_insert(start_ref, 0).ok_or(SearchError::InvalidParam("node pool has no capacity"))?;
        let h0 = vdist(start_pos, end_pos) * H_SCALE;
        pool.nodes[start] = Node { pos: start_pos, cost: 0.0, total: h0, parent: None, poly: start_ref, flags: NODE_OPEN };
        open.push(HeapNode { total: h0, seq, node: start });

        let mut last_best = start;
        let mut last_best_cost = h0;

        while let Some(entry) = open.pop() {
            let best = pool.nodes[entry.node];
            // Discard stale
            if best.flags & NODE_OPEN == 0 || entry.total > best.total {
                continue;
            }
            pool.nodes[entry.node].flags = (best.flags & !NODE_OPEN) | NODE_CLOSED;
            if best.poly == end_ref {
                last_best = entry.node;
                break;
            }

            let (best_tile, best_ip) = self.tile_and_poly(best.poly)?;
            let best_poly = &best_tile.polys[best_ip];
            let parent_ref = best.parent.map(|p| pool.nodes[p].poly);

            for link in &best_tile.links[best_ip] {
                let nref = link.target;
                if nref == 0 || Some(nref) == parent_ref {
                    continue;
                }
                let Ok((ntile, nip)) = self.tile_and_poly(nref) else { continue };
                let npoly = &ntile.polys[nip];
                if !filter.passes(npoly) {
                    continue;
                }
                let cross_side = if link.side == SIDE_INSIDE { 0 } else { link.side >> 1 };
                let Some(ni) = pool.get_or_insert(nref, cross_side) else {
                    status.out_of_nodes = true;
                    continue;
                };
                if pool.nodes[ni].flags == 0 {
                    pool.nodes[ni].pos = self.edge_mid_point(best.poly, nref)?;
                }
                let npos = pool.nodes[ni].pos;

                let (cost, heuristic) = if nref == end_ref {
                    let cur = filter.cost(best.pos, npos, best_poly);
                    let end = filter.cost(npos, end_pos, npoly);
                    (best.cost + cur + end, 0.0)
                } else {
                    (best.cost + filter.cost(best.pos, npos, best_poly), vdist(npos, end_pos) * H_SCALE)
                };
                let total = cost + heuristic;

                let node = &mut pool.nodes[ni];
                if node.flags & (NODE_OPEN | NODE_CLOSED) != 0 && total >= node.total {
                    continue;
                }
                node.parent = Some(entry.node);
                node.cost = cost;
                node.total = total;
                node.flags = (node.flags & !NODE_CLOSED) | NODE_OPEN;
                seq += 1;
                open.push(HeapNode { total, seq, node: ni });

                if heuristic < last_best_cost {
                    last_best_cost = heuristic;
                    last_best = ni;
                }
            }
        }

        if pool.nodes[last_best].poly != end_ref {
            status.partial = true;
        }

        let mut corridor = Vec::new();
        let mut cur = Some(last_best);
        while let Some(i) = cur {
            corridor.push(pool.nodes[i].poly);
            cur = pool.nodes[i].parent;
        }
        corridor.reverse();
        if corridor.len() > path.len() {
            status.buffer_too_small = true;
        }
        let n = corridor.len().min(path.len());
        path[..n].copy_from_slice(&corridor[..n]);
        Ok((n, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{grid_navmesh, link_between, navmesh_of, quad_grid_tile};

    fn search(tx: i32, tz: i32, n: usize) -> NavMeshSearch {
        NavMeshSearch::new(grid_navmesh(tx, tz, n, &[]).unwrap()).unwrap()
    }

    fn poly_at(s: &NavMeshSearch, p: Vec3) -> PolyRef {
        s.find_nearest_poly(p, [0.1, 1.0, 0.1], &QueryFilter::default()).unwrap().poly
    }

    #[test]
    fn heap_pops_lowest_total_first() {
        let mut heap = BinaryHeap::new();
        heap.push(HeapNode { total: 3.0, seq: 0, node: 0 });
        heap.push(HeapNode { total: 1.0, seq: 1, node: 1 });
        heap.push(HeapNode { total: 1.0, seq: 2, node: 2 });
        heap.push(HeapNode { total: 2.0, seq: 3, node: 3 });
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|h| h.node)).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn same_polygon_is_a_single_step() {
        let s = search(1, 1, 2);
        let r = poly_at(&s, [0.5, 0.0, 0.5]);
        let mut pool = NodePool::new(16);
        let mut path = [0; 8];
        let (n, st) = s.find_path(&mut pool, r, r, [0.2, 0.0, 0.2], [0.8, 0.0, 0.8], &QueryFilter::default(), &mut path).unwrap();
        assert_eq!((n, st), (1, SearchStatus::default()));
        assert_eq!(path[0], r);
    }

    #[test]
    fn corridor_crosses_tiles() {
        let s = search(2, 1, 2);
        let (a, b) = (poly_at(&s, [0.5, 0.0, 0.5]), poly_at(&s, [3.5, 0.0, 0.5]));
        let mut pool = NodePool::new(64);
        let mut path = [0; 16];
        let (n, st) = s.find_path(&mut pool, a, b, [0.5, 0.0, 0.5], [3.5, 0.0, 0.5], &QueryFilter::default(), &mut path).unwrap();
        assert_eq!(n, 4);
        assert!(!st.partial && !st.out_of_nodes && !st.buffer_too_small);
        assert_eq!((path[0], path[3]), (a, b));
        for w in path[..n].windows(2) {
            assert!(s.links(w[0]).unwrap().iter().any(|l| l.target == w[1]));
        }
    }

    #[test]
    fn small_buffer_keeps_the_head() {
        let s = search(1, 1, 6);
        let (a, b) = (poly_at(&s, [0.5, 0.0, 0.5]), poly_at(&s, [5.5, 0.0, 0.5]));
        let mut pool = NodePool::new(64);
        let mut path = [0; 3];
        let (n, st) = s.find_path(&mut pool, a, b, [0.5, 0.0, 0.5], [5.5, 0.0, 0.5], &QueryFilter::default(), &mut path).unwrap();
        assert_eq!(n, 3);
        assert!(st.buffer_too_small);
        assert!(!st.partial);
        assert_eq!(path[0], a);
    }

    #[test]
    fn unreachable_goal_gives_partial_corridor() {
        // tiles (0, 0) and (2, 0) leave a gap
        let tiles = [quad_grid_tile(0, 0, 2, 2, 0.0), quad_grid_tile(2, 0, 2, 2, 0.0)];
        let s = NavMeshSearch::new(navmesh_of(&tiles, &[], 2.0).unwrap()).unwrap();
        let (a, b) = (poly_at(&s, [0.5, 0.0, 0.5]), poly_at(&s, [5.5, 0.0, 0.5]));
        let mut pool = NodePool::new(64);
        let mut path = [0; 16];
        let (n, st) = s.find_path(&mut pool, a, b, [0.5, 0.0, 0.5], [5.5, 0.0, 0.5], &QueryFilter::default(), &mut path).unwrap();
        assert!(st.partial);
        assert_eq!(path[0], a);
        let near_gap = [poly_at(&s, [1.5, 0.0, 0.5]), poly_at(&s, [1.5, 0.0, 1.5])];
        assert!(near_gap.contains(&path[n - 1]));
    }

    #[test]
    fn node_budget_is_reported() {
        let s = search(1, 1, 8);
        let (a, b) = (poly_at(&s, [0.5, 0.0, 0.5]), poly_at(&s, [7.5, 0.0, 7.5]));
        let mut pool = NodePool::new(4);
        let mut path = [0; 64];
        let (n, st) = s.find_path(&mut pool, a, b, [0.5, 0.0, 0.5], [7.5, 0.0, 7.5], &QueryFilter::default(), &mut path).unwrap();
        assert!(st.out_of_nodes);
        assert!(st.partial);
        assert!(n >= 1 && path[0] == a);
    }

    #[test]
    fn off_mesh_connection_bridges_a_ledge() {
        // the right tile sits 5 units higher, so no portal joins the two
        let tiles = [quad_grid_tile(0, 0, 2, 2, 0.0), quad_grid_tile(1, 0, 2, 2, 5.0)];
        let links = [link_between([1.5, 0.0, 0.5], [2.5, 5.0, 0.5], false)];
        let s = NavMeshSearch::new(navmesh_of(&tiles, &links, 2.0).unwrap()).unwrap();
        let (a, b) = (poly_at(&s, [0.5, 0.0, 0.5]), poly_at(&s, [3.5, 5.0, 0.5]));
        let mut pool = NodePool::new(256);
        let mut path = [0; 32];
        let (n, st) = s.find_path(&mut pool, a, b, [0.5, 0.0, 0.5], [3.5, 5.0, 0.5], &QueryFilter::default(), &mut path).unwrap();
        assert!(!st.partial);
        assert_eq!(n, 5);
        assert!(s.poly(path[2]).unwrap().is_off_mesh());
        let (l, r, from, to) = s.portal_points(path[1], path[2]).unwrap();
        assert_eq!(l, r);
        assert_eq!(l, [1.5, 0.0, 0.5]);
        assert_eq!((from, to), (0, POLYTYPE_OFFMESH_CONNECTION));
        let (l, _, from, _) = s.portal_points(path[2], path[3]).unwrap();
        assert_eq!(l, [2.5, 5.0, 0.5]);
        assert_eq!(from, POLYTYPE_OFFMESH_CONNECTION);
    }

    #[test]
    fn invalid_refs_are_errors() {
        let s = search(1, 1, 2);
        let a = poly_at(&s, [0.5, 0.0, 0.5]);
        let mut pool = NodePool::new(8);
        let mut path = [0; 4];
        let err = s.find_path(&mut pool, a, 0x00ff_ffff, [0.0; 3], [0.0; 3], &QueryFilter::default(), &mut path);
        assert!(matches!(err, Err(SearchError::InvalidRef(_))));
        let err = s.find_path(&mut pool, a, a, [0.0; 3], [0.0; 3], &QueryFilter::default(), &mut []);
        assert!(matches!(err, Err(SearchError::InvalidParam(_))));
    }
}
