//! String pulling: turns a polygon corridor into corner points with the
//! funnel algorithm.

use crate::geom::{dist_pt_seg_sqr_2d, intersect_seg_seg_2d, tri_area_2d, vequal, vlerp, Vec3};
use crate::mesh::PolyRef;
use crate::tile::{POLYTYPE_GROUND, POLYTYPE_OFFMESH_CONNECTION};

use super::{NavMeshSearch, SearchError, SearchStatus};

pub const STRAIGHTPATH_START: u8 = 0x01;
pub const STRAIGHTPATH_END: u8 = 0x02;
pub const STRAIGHTPATH_OFFMESH: u8 = 0x04;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StraightPoint {
    pub pos: Vec3,
    pub flags: u8,
    /// Polygon entered at this point, 0 for the end point.
    pub poly: PolyRef,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StraightPathOptions {
    /// Also emit a point at every polygon boundary the path crosses.
    pub all_crossings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Append {
    InProgress,
    Done,
    Full,
}

struct Writer<'a> {
    out: &'a mut [StraightPoint],
    len: usize,
}

impl Writer<'_> {
    fn push(&mut self, pos: Vec3, flags: u8, poly: PolyRef) -> Append {
        if self.len > 0 && vequal(self.out[self.len - 1].pos, pos) {
            // same spot: keep the newer flags and polygon
            let last = &mut self.out[self.len - 1];
            last.flags = flags;
            last.poly = poly;
            return Append::InProgress;
        }
        if self.len >= self.out.len() {
            return Append::Full;
        }
        self.out[self.len] = StraightPoint { pos, flags, poly };
        self.len += 1;
        if self.len >= self.out.len() {
            return Append::Full;
        }
        if flags == STRAIGHTPATH_END {
            return Append::Done;
        }
        Append::InProgress
    }

    fn last_pos(&self) -> Vec3 { self.out[self.len - 1].pos }

    fn finish(&self, mut status: SearchStatus) -> (usize, SearchStatus) {
        status.buffer_too_small |= self.len >= self.out.len();
        (self.len, status)
    }
}

fn corner_flags(poly: PolyRef, poly_type: u8) -> u8 {
    if poly == 0 {
        STRAIGHTPATH_END
    } else if poly_type == POLYTYPE_OFFMESH_CONNECTION {
        STRAIGHTPATH_OFFMESH
    } else {
        0
    }
}

impl NavMeshSearch {
    /// Crossing points of the segment from the writer's last point to
    /// `end_pos` with the portals `path[start..end]`.
    fn append_portals(&self, w: &mut Writer<'_>, start: usize, end: usize, end_pos: Vec3, path: &[PolyRef]) -> Append {
        let start_pos = w.last_pos();
        for i in start..end {
            let Ok((left, right, _, _)) = self.portal_points(path[i], path[i + 1]) else { break };
            if let Some((_, t)) = intersect_seg_seg_2d(start_pos, end_pos, left, right) {
                let pt = vlerp(left, right, t);
                let r = w.push(pt, 0, path[i + 1]);
                if r != Append::InProgress {
                    return r;
                }
            }
        }
        Append::InProgress
    }

    /// Corner points of the corridor `path` from `start_pos` to `end_pos`,
    /// written into `out`. Both ends are first clamped onto the boundary of
    /// the first and last polygon. If a portal along the corridor cannot be
    /// resolved the path stops at the last good polygon with `partial` set.
    pub fn find_straight_path(
        &self,
        start_pos: Vec3,
        end_pos: Vec3,
        path: &[PolyRef],
        out: &mut [StraightPoint],
        options: StraightPathOptions,
    ) -> Result<(usize, SearchStatus), SearchError> {
        if path.is_empty() {
            return Err(SearchError::InvalidParam("corridor is empty"));
        }
        if out.is_empty() {
            return Err(SearchError::InvalidParam("point buffer is empty"));
        }
        let start = self.closest_point_on_poly_boundary(path[0], start_pos)?;
        let mut end = self.closest_point_on_poly_boundary(path[path.len() - 1], end_pos)?;
        let mut w = Writer { out, len: 0 };
        let status = SearchStatus::default();

        if w.push(start, STRAIGHTPATH_START, path[0]) != Append::InProgress {
            return Ok(w.finish(status));
        }

        if path.len() > 1 {
            let mut apex = start;
            let mut portal_left = start;
            let mut portal_right = start;
            let (mut apex_index, mut left_index, mut right_index) = (0usize, 0usize, 0usize);
            let (mut left_type, mut right_type) = (POLYTYPE_GROUND, POLYTYPE_GROUND);
            let (mut left_ref, mut right_ref) = (path[0], path[0]);

            let mut i = 0;
            while i < path.len() {
                let (left, right, to_type);
                if i + 1 < path.len() {
                    match self.portal_points(path[i], path[i + 1]) {
                        Ok((l, r, _, t)) => {
                            left = l;
                            right = r;
                            to_type = t;
                        }
                        Err(_) => {
                            end = self.closest_point_on_poly_boundary(path[i], end_pos)?;
                            let partial = SearchStatus { partial: true, ..status };
                            if options.all_crossings
                                && self.append_portals(&mut w, apex_index, i, end, path) != Append::InProgress
                            {
                                return Ok(w.finish(partial));
                            }
                            w.push(end, 0, path[i]);
                            return Ok(w.finish(partial));
                        }
                    }
                    // starting right on the first portal
                    if i == 0 && dist_pt_seg_sqr_2d(apex, left, right).0 < 0.001 * 0.001 {
                        i += 1;
                        continue;
                    }
                } else {
                    left = end;
                    right = end;
                    to_type = POLYTYPE_GROUND;
                }
                let next_ref = if i + 1 < path.len() { path[i + 1] } else { 0 };

                if tri_area_2d(apex, portal_right, right) <= 0.0 {
                    if vequal(apex, portal_right) || tri_area_2d(apex, portal_left, right) > 0.0 {
                        portal_right = right;
                        right_ref = next_ref;
                        right_type = to_type;
                        right_index = i;
                    } else {
                        if options.all_crossings {
                            let r = self.append_portals(&mut w, apex_index, left_index, portal_left, path);
                            if r != Append::InProgress {
                                return Ok(w.finish(status));
                            }
                        }
                        apex = portal_left;
                        apex_index = left_index;
                        if w.push(apex, corner_flags(left_ref, left_type), left_ref) != Append::InProgress {
                            return Ok(w.finish(status));
                        }
                        portal_left = apex;
                        portal_right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                if tri_area_2d(apex, portal_left, left) >= 0.0 {
                    if vequal(apex, portal_left) || tri_area_2d(apex, portal_right, left) < 0.0 {
                        portal_left = left;
                        left_ref = next_ref;
                        left_type = to_type;
                        left_index = i;
                    } else {
                        if options.all_crossings {
                            let r = self.append_portals(&mut w, apex_index, right_index, portal_right, path);
                            if r != Append::InProgress {
                                return Ok(w.finish(status));
                            }
                        }
                        apex = portal_right;
                        apex_index = right_index;
                        if w.push(apex, corner_flags(right_ref, right_type), right_ref) != Append::InProgress {
                            return Ok(w.finish(status));
                        }
                        portal_left = apex;
                        portal_right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }
                i += 1;
            }

            if options.all_crossings
                && self.append_portals(&mut w, apex_index, path.len() - 1, end, path) != Append::InProgress
            {
                return Ok(w.finish(status));
            }
        }

        w.push(end, STRAIGHTPATH_END, 0);
        Ok(w.finish(status))
    }
}
