use glam::DVec3;
use ob_protocol::shared::{Axis, BlockPos};
use ob_world::iter::BlockIter;
use ob_world::palette::{BlockId, BlockPalette, Fluid};
use ob_world::provider::WorldView;
use ob_world::shapes::{self, Aabb};

use crate::bounding_box::BoundingBox;
use crate::piston::Pistons;

pub const COLLISION_TOLERANCE: f64 = 0.00001;
pub const PLAYER_STEP_UP: f64 = 0.6;

/// Surface box fluids present to lava walkers, in local block coordinates.
pub const FLUID_SURFACE: Aabb = Aabb::new(DVec3::new(0.0, 0.0, 0.0), DVec3::new(1.0, 0.5, 1.0));

/// True when the fluid surface of the block at `block_y` sits at or below the
/// bottom of the box, so the box can rest on it.
pub fn fluid_surface_below(block_y: i32, bounding_box: &BoundingBox) -> bool {
    block_y as f64 + 0.5 - bounding_box.min().y <= COLLISION_TOLERANCE
}

fn squared_horizontal_length(v: DVec3) -> f64 {
    v.x * v.x + v.z * v.z
}

/// Everything a sweep can hit: palette-shaped world blocks plus any blocks a
/// piston currently has in transit.
pub struct CollisionWorld<'a> {
    palette: &'a BlockPalette,
    world: &'a dyn WorldView,
    pistons: Option<&'a Pistons>,
}

impl<'a> CollisionWorld<'a> {
    pub fn new(palette: &'a BlockPalette, world: &'a dyn WorldView) -> CollisionWorld<'a> {
        CollisionWorld {
            palette,
            world,
            pistons: None,
        }
    }

    pub fn with_pistons(
        palette: &'a BlockPalette,
        world: &'a dyn WorldView,
        pistons: &'a Pistons,
    ) -> CollisionWorld<'a> {
        CollisionWorld {
            palette,
            world,
            pistons: Some(pistons),
        }
    }

    pub fn palette(&self) -> &BlockPalette {
        self.palette
    }

    pub fn block_at(&self, pos: BlockPos) -> BlockId {
        self.world.block_at(pos)
    }

    /// Region of blocks that could collide with the box.
    pub fn collidable_blocks(&self, bounding_box: &BoundingBox) -> BlockIter {
        let position = bounding_box.bottom_center();
        let size = bounding_box.size();
        // Grow the volume while blocks are in transit under a piston.
        let piston_expand = match self.pistons {
            Some(pistons) if !pistons.is_empty() => 1.0,
            _ => 0.0,
        };

        let min_x = (position.x - (size.x / 2.0 + COLLISION_TOLERANCE + piston_expand)).floor();
        let max_x = (position.x + size.x / 2.0 + COLLISION_TOLERANCE + piston_expand).floor();
        // Y reaches half a block below the feet because fences are 1.5 tall.
        let min_y = (position.y - 0.5 - COLLISION_TOLERANCE - piston_expand / 2.0).floor();
        let max_y = (position.y + size.y + piston_expand).floor();
        let min_z = (position.z - (size.z / 2.0 + COLLISION_TOLERANCE + piston_expand)).floor();
        let max_z = (position.z + size.z / 2.0 + COLLISION_TOLERANCE + piston_expand).floor();

        BlockIter::from_min_max(
            BlockPos::new(min_x as i32, min_y as i32, min_z as i32),
            BlockPos::new(max_x as i32, max_y as i32, max_z as i32),
        )
    }

    /// Clip a proposed movement against the world. The box is not moved; the
    /// caller translates by the returned vector. Step-up resolution runs only
    /// while grounded (or landing this sweep) and a horizontal axis clipped.
    pub fn correct_movement(
        &self,
        movement: DVec3,
        bounding_box: &BoundingBox,
        on_ground: bool,
        step_up: f64,
        allow_step_up: bool,
        walk_on_lava: bool,
    ) -> DVec3 {
        let mut adjusted = movement;
        if movement != DVec3::ZERO {
            adjusted = self.correct_for_collisions(movement, bounding_box, walk_on_lava);
        }

        let vertical_collision = adjusted.y != movement.y;
        let horizontal_collision = adjusted.x != movement.x || adjusted.z != movement.z;
        let falling = movement.y < 0.0;
        let on_ground = on_ground || (vertical_collision && falling);
        if allow_step_up && on_ground && horizontal_collision {
            let horizontal = DVec3::new(movement.x, 0.0, movement.z);
            let mut step_up_movement = self.correct_for_collisions(
                horizontal + DVec3::new(0.0, step_up, 0.0),
                bounding_box,
                walk_on_lava,
            );

            let mut stretched = bounding_box.clone();
            stretched.extend(horizontal);
            let max_step_up = self
                .correct_for_collisions(DVec3::new(0.0, step_up, 0.0), &stretched, walk_on_lava)
                .y;
            if max_step_up < step_up {
                // A block overhead limits how high the step can go.
                let raised = bounding_box.translated(DVec3::new(0.0, max_step_up, 0.0));
                let candidate = self.correct_for_collisions(horizontal, &raised, walk_on_lava);
                if squared_horizontal_length(candidate) > squared_horizontal_length(step_up_movement)
                {
                    step_up_movement = candidate + DVec3::new(0.0, max_step_up, 0.0);
                }
            }

            if squared_horizontal_length(step_up_movement) > squared_horizontal_length(adjusted) {
                let raised = bounding_box.translated(step_up_movement);
                // Settle with the remaining vertical movement.
                let vertical = self
                    .correct_for_collisions(
                        DVec3::new(0.0, movement.y - step_up_movement.y, 0.0),
                        &raised,
                        walk_on_lava,
                    )
                    .y;
                adjusted = step_up_movement + DVec3::new(0.0, vertical, 0.0);
            }
        }
        adjusted
    }

    fn correct_for_collisions(
        &self,
        movement: DVec3,
        bounding_box: &BoundingBox,
        walk_on_lava: bool,
    ) -> DVec3 {
        let mut swept = bounding_box.clone();
        let mut result = movement;

        let mut window = swept.clone();
        window.extend(movement);
        let iter = self.collidable_blocks(&window);

        if result.y.abs() > COLLISION_TOLERANCE {
            result.y = self.collision_offset(&swept, Axis::Y, result.y, &iter, walk_on_lava);
            swept.translate(DVec3::new(0.0, result.y, 0.0));
        }
        let z_first = result.z.abs() > result.x.abs();
        if z_first && result.z.abs() > COLLISION_TOLERANCE {
            result.z = self.collision_offset(&swept, Axis::Z, result.z, &iter, walk_on_lava);
            swept.translate(DVec3::new(0.0, 0.0, result.z));
        }
        if result.x.abs() > COLLISION_TOLERANCE {
            result.x = self.collision_offset(&swept, Axis::X, result.x, &iter, walk_on_lava);
            swept.translate(DVec3::new(result.x, 0.0, 0.0));
        }
        if !z_first && result.z.abs() > COLLISION_TOLERANCE {
            result.z = self.collision_offset(&swept, Axis::Z, result.z, &iter, walk_on_lava);
        }
        result
    }

    fn collision_offset(
        &self,
        bounding_box: &BoundingBox,
        axis: Axis,
        mut offset: f64,
        iter: &BlockIter,
        walk_on_lava: bool,
    ) -> f64 {
        let mut boxes = Vec::new();
        for pos in iter.clone() {
            boxes.clear();
            let id = self.world.block_at(pos);
            self.append_block_boxes(id, pos, bounding_box, walk_on_lava, &mut boxes);
            for b in &boxes {
                offset = bounding_box.max_offset(b, axis, offset);
                if offset.abs() < COLLISION_TOLERANCE {
                    offset = 0.0;
                    break;
                }
            }
            if let Some(pistons) = self.pistons {
                offset = pistons.collision_offset(pos, bounding_box, axis, offset, self.palette);
            }
            if offset.abs() < COLLISION_TOLERANCE {
                return 0.0;
            }
        }
        offset
    }

    /// Collision boxes of one block, with the lava surface substituted for
    /// source lava under a lava walker's feet.
    pub fn append_block_boxes(
        &self,
        id: BlockId,
        pos: BlockPos,
        bounding_box: &BoundingBox,
        walk_on_lava: bool,
        out: &mut Vec<Aabb>,
    ) {
        if walk_on_lava
            && self.palette.lava_level(id) == Some(0)
            && fluid_surface_below(pos.y, bounding_box)
        {
            out.push(FLUID_SURFACE.offset(pos.min_corner()));
            return;
        }
        let state = self.palette.get(id);
        shapes::append_collision_boxes(state.shape, state.facing(), pos, out);
    }

    /// Whether anything overlaps the box. With `fluids_are_solid`, fluid
    /// blocks count as full cubes, which is how hop-out-of-fluid checks treat
    /// them.
    pub fn intersects_anything(&self, bounding_box: &BoundingBox, fluids_are_solid: bool) -> bool {
        let mut boxes = Vec::new();
        for pos in self.collidable_blocks(bounding_box) {
            boxes.clear();
            let id = self.world.block_at(pos);
            if fluids_are_solid && self.palette.fluid(id) != Fluid::Empty {
                boxes.push(Aabb::unit_cube(pos.min_corner()));
            } else {
                let state = self.palette.get(id);
                shapes::append_collision_boxes(state.shape, state.facing(), pos, &mut boxes);
            }
            if boxes.iter().any(|b| bounding_box.intersects(b)) {
                return true;
            }
            if let Some(pistons) = self.pistons {
                if pistons.check_collision(pos, bounding_box, self.palette) {
                    return true;
                }
            }
        }
        false
    }
}
