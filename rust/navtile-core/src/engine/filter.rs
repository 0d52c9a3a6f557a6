use crate::geom::{vdist, Vec3};
use crate::tile::Poly;

pub const MAX_AREAS: usize = 64;

/// Polygon admission and traversal cost. A polygon passes when it shares a
/// flag with `include_flags` and none with `exclude_flags`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub include_flags: u16,
    pub exclude_flags: u16,
    pub area_cost: [f32; MAX_AREAS],
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter { include_flags: 0xffff, exclude_flags: 0, area_cost: [1.0; MAX_AREAS] }
    }
}

impl QueryFilter {
    pub fn with_flags(include_flags: u16, exclude_flags: u16) -> Self {
        QueryFilter { include_flags, exclude_flags, ..Default::default() }
    }

    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        if let Some(c) = self.area_cost.get_mut(area as usize) {
            *c = cost;
        }
    }

    #[inline]
    pub fn passes(&self, poly: &Poly) -> bool {
        (poly.flags & self.include_flags) != 0 && (poly.flags & self.exclude_flags) == 0
    }

    /// Cost of moving from `a` to `b` across `poly`.
    #[inline]
    pub fn cost(&self, a: Vec3, b: Vec3, poly: &Poly) -> f32 {
        vdist(a, b) * self.area_cost[poly.area() as usize]
    }
}
