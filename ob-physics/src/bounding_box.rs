use glam::DVec3;
use ob_protocol::shared::{Axis, Direction};
use ob_world::shapes::Aabb;

use crate::collision::COLLISION_TOLERANCE;

/// Entity collision box, stored as center + size the way the Bedrock side
/// reports hitboxes. Block boxes stay min/max `Aabb`s; everything that sweeps
/// an entity against the world goes through this type.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox {
    middle: DVec3,
    size: DVec3,
}

impl BoundingBox {
    pub fn new(middle: DVec3, size: DVec3) -> BoundingBox {
        BoundingBox { middle, size }
    }

    /// Box for an entity standing at `bottom_center` with the given dimensions.
    pub fn from_bottom_center(bottom_center: DVec3, width: f64, height: f64) -> BoundingBox {
        BoundingBox {
            middle: bottom_center + DVec3::new(0.0, height / 2.0, 0.0),
            size: DVec3::new(width, height, width),
        }
    }

    pub fn middle(&self) -> DVec3 {
        self.middle
    }

    pub fn size(&self) -> DVec3 {
        self.size
    }

    pub fn min(&self) -> DVec3 {
        self.middle - self.size / 2.0
    }

    pub fn max(&self) -> DVec3 {
        self.middle + self.size / 2.0
    }

    pub fn bottom_center(&self) -> DVec3 {
        DVec3::new(self.middle.x, self.middle.y - self.size.y / 2.0, self.middle.z)
    }

    pub fn translate(&mut self, by: DVec3) {
        self.middle += by;
    }

    /// Grow toward `by`: one face moves, the opposite face stays put.
    pub fn extend(&mut self, by: DVec3) {
        self.middle += by / 2.0;
        self.size += by.abs();
    }

    /// Move every face outward by `delta` (inward when negative).
    pub fn expand(&mut self, delta: f64) {
        self.size += DVec3::splat(2.0 * delta);
    }

    /// Grow or shrink per axis around the middle.
    pub fn resize(&mut self, delta: DVec3) {
        self.size += delta;
    }

    pub fn translated(&self, by: DVec3) -> BoundingBox {
        let mut out = self.clone();
        out.translate(by);
        out
    }

    fn min_on(&self, axis: Axis) -> f64 {
        let min = self.min();
        axis.choose(min.x, min.y, min.z)
    }

    fn max_on(&self, axis: Axis) -> f64 {
        let max = self.max();
        axis.choose(max.x, max.y, max.z)
    }

    /// Strict overlap test, so boxes sharing a face do not intersect.
    pub fn intersects(&self, b: &Aabb) -> bool {
        let min = self.min();
        let max = self.max();
        min.x < b.max.x
            && b.min.x < max.x
            && min.y < b.max.y
            && b.min.y < max.y
            && min.z < b.max.z
            && b.min.z < max.z
    }

    fn overlaps_on(&self, b: &Aabb, axis: Axis) -> bool {
        self.min_on(axis) < b.max_on(axis) && b.min_on(axis) < self.max_on(axis)
    }

    /// Clip `offset` along `axis` so this box stops at `b` instead of passing
    /// through it. Boxes already clipping into each other are left alone.
    pub fn max_offset(&self, b: &Aabb, axis: Axis, mut offset: f64) -> f64 {
        for other in [Axis::X, Axis::Y, Axis::Z] {
            if other != axis && !self.overlaps_on(b, other) {
                return offset;
            }
        }
        if offset > 0.0 {
            let gap = b.min_on(axis) - self.max_on(axis);
            if gap >= -2.0 * COLLISION_TOLERANCE {
                offset = gap.min(offset);
            }
        } else if offset < 0.0 {
            let gap = b.max_on(axis) - self.min_on(axis);
            if gap <= 2.0 * COLLISION_TOLERANCE {
                offset = gap.max(offset);
            }
        }
        offset
    }

    /// Distance to move this box to sit on the given side of `b`.
    pub fn intersection_size(&self, b: &Aabb, side: Direction) -> f64 {
        match side {
            Direction::Down => self.max().y - b.min.y,
            Direction::Up => b.max.y - self.min().y,
            Direction::North => self.max().z - b.min.z,
            Direction::South => b.max.z - self.min().z,
            Direction::West => self.max().x - b.min.x,
            Direction::East => b.max.x - self.min().x,
            Direction::Invalid => 0.0,
        }
    }
}
