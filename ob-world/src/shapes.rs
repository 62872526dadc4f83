use glam::DVec3;
use ob_protocol::shared::{Axis, BlockPos, Direction};
use serde::Deserialize;

pub const FENCE_HEIGHT: f64 = 1.5;
pub const BED_HEIGHT: f64 = 0.5625;
pub const LILY_PAD_HEIGHT: f64 = 0.09375;
pub const HONEY_HEIGHT: f64 = 0.9375;

/// Collision outline of a block state. States without solid collision
/// (fluids, plants, bubble columns, moving pistons) stay `Empty`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    #[default]
    Empty,
    Cube,
    SlabBottom,
    SlabTop,
    Fence,
    Bed,
    LilyPad,
    Honey,
    PistonBase,
    PistonHead,
}

/// Min/max corner box. Local block boxes live in [0, 1] until offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub const fn new(min: DVec3, max: DVec3) -> Aabb {
        Aabb { min, max }
    }

    pub fn offset(self, by: DVec3) -> Aabb {
        Aabb {
            min: self.min + by,
            max: self.max + by,
        }
    }

    /// Grow the box directionally: positive components push the max corner
    /// out, negative components pull the min corner.
    pub fn extend(mut self, by: DVec3) -> Aabb {
        if by.x >= 0.0 {
            self.max.x += by.x;
        } else {
            self.min.x += by.x;
        }
        if by.y >= 0.0 {
            self.max.y += by.y;
        } else {
            self.min.y += by.y;
        }
        if by.z >= 0.0 {
            self.max.z += by.z;
        } else {
            self.min.z += by.z;
        }
        self
    }

    pub fn unit_cube(min: DVec3) -> Aabb {
        Aabb::new(min, min + DVec3::ONE)
    }

    pub fn min_on(&self, axis: Axis) -> f64 {
        axis.choose(self.min.x, self.min.y, self.min.z)
    }

    pub fn max_on(&self, axis: Axis) -> f64 {
        axis.choose(self.max.x, self.max.y, self.max.z)
    }
}

fn local(x0: f64, y0: f64, z0: f64, x1: f64, y1: f64, z1: f64) -> Aabb {
    Aabb::new(DVec3::new(x0, y0, z0), DVec3::new(x1, y1, z1))
}

/// Full 0..1 in the other two axes, [lo, hi] along `axis`.
fn span(axis: Axis, lo: f64, hi: f64) -> Aabb {
    match axis {
        Axis::X => local(lo, 0.0, 0.0, hi, 1.0, 1.0),
        Axis::Y => local(0.0, lo, 0.0, 1.0, hi, 1.0),
        Axis::Z => local(0.0, 0.0, lo, 1.0, 1.0, hi),
    }
}

/// Like `span`, but measured from the back face of a directed block, so
/// `lo = 0` touches the face opposite `facing`.
fn directed_span(facing: Direction, lo: f64, hi: f64) -> Aabb {
    let axis = facing.axis();
    if facing.axis_sign() > 0.0 {
        span(axis, lo, hi)
    } else {
        span(axis, 1.0 - hi, 1.0 - lo)
    }
}

/// Shrink the two cross axes of a directed box to [lo, hi].
fn cross_section(mut b: Aabb, axis: Axis, lo: f64, hi: f64) -> Aabb {
    match axis {
        Axis::X => {
            b.min.y = lo;
            b.min.z = lo;
            b.max.y = hi;
            b.max.z = hi;
        }
        Axis::Y => {
            b.min.x = lo;
            b.min.z = lo;
            b.max.x = hi;
            b.max.z = hi;
        }
        Axis::Z => {
            b.min.x = lo;
            b.min.y = lo;
            b.max.x = hi;
            b.max.y = hi;
        }
    }
    b
}

/// Append the collision boxes of one block in local block space, before any
/// world offset. Piston sweeps need these at fractional positions.
pub fn local_collision_boxes(shape: Shape, facing: Direction, out: &mut Vec<Aabb>) {
    let facing = if facing == Direction::Invalid {
        Direction::Up
    } else {
        facing
    };
    match shape {
        Shape::Empty => {}
        Shape::Cube => out.push(local(0.0, 0.0, 0.0, 1.0, 1.0, 1.0)),
        Shape::SlabBottom => out.push(local(0.0, 0.0, 0.0, 1.0, 0.5, 1.0)),
        Shape::SlabTop => out.push(local(0.0, 0.5, 0.0, 1.0, 1.0, 1.0)),
        // Unconnected post. Arms are state-dependent and not modeled.
        Shape::Fence => out.push(local(0.375, 0.0, 0.375, 0.625, FENCE_HEIGHT, 0.625)),
        Shape::Bed => out.push(local(0.0, 0.0, 0.0, 1.0, BED_HEIGHT, 1.0)),
        Shape::LilyPad => {
            out.push(local(0.0625, 0.0, 0.0625, 0.9375, LILY_PAD_HEIGHT, 0.9375));
        }
        Shape::Honey => {
            out.push(local(0.0625, 0.0, 0.0625, 0.9375, HONEY_HEIGHT, 0.9375));
        }
        Shape::PistonBase => out.push(directed_span(facing, 0.0, 0.75)),
        Shape::PistonHead => {
            out.push(directed_span(facing, 0.75, 1.0));
            let arm = directed_span(facing, 0.0, 0.75);
            out.push(cross_section(arm, facing.axis(), 0.375, 0.625));
        }
    }
}

/// Append the world-space collision boxes of one block to `out`.
pub fn append_collision_boxes(shape: Shape, facing: Direction, pos: BlockPos, out: &mut Vec<Aabb>) {
    let base = pos.min_corner();
    let start = out.len();
    local_collision_boxes(shape, facing, out);
    for b in &mut out[start..] {
        *b = b.offset(base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_fills_the_block() {
        let mut out = Vec::new();
        append_collision_boxes(
            Shape::Cube,
            Direction::Invalid,
            BlockPos::new(2, -3, 4),
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].min, DVec3::new(2.0, -3.0, 4.0));
        assert_eq!(out[0].max, DVec3::new(3.0, -2.0, 5.0));
    }

    #[test]
    fn fence_post_is_tall() {
        let mut out = Vec::new();
        append_collision_boxes(
            Shape::Fence,
            Direction::Invalid,
            BlockPos::new(0, 0, 0),
            &mut out,
        );
        assert_eq!(out[0].max.y, 1.5);
        assert_eq!(out[0].min.x, 0.375);
    }

    #[test]
    fn piston_head_points_along_facing() {
        let mut out = Vec::new();
        append_collision_boxes(
            Shape::PistonHead,
            Direction::West,
            BlockPos::new(0, 0, 0),
            &mut out,
        );
        // Plate sits against the west face, arm runs back east.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].min.x, 0.0);
        assert_eq!(out[0].max.x, 0.25);
        assert_eq!(out[1].min.x, 0.25);
        assert_eq!(out[1].max.x, 1.0);
        assert_eq!(out[1].min.y, 0.375);
        assert_eq!(out[1].max.z, 0.625);
    }

    #[test]
    fn extended_base_leaves_room_for_the_head() {
        let mut out = Vec::new();
        append_collision_boxes(
            Shape::PistonBase,
            Direction::Up,
            BlockPos::new(0, 0, 0),
            &mut out,
        );
        assert_eq!(out[0].min.y, 0.0);
        assert_eq!(out[0].max.y, 0.75);
    }
}
