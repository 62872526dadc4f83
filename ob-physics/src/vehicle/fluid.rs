//! Fluid currents acting on a vehicle. Flow vectors are derived from the
//! height difference toward each horizontal neighbor, matching the client's
//! per-block flow model.

use glam::{DVec3, Vec3};
use ob_protocol::shared::{BlockPos, Direction};
use ob_world::iter::BlockIter;
use ob_world::palette::{BlockId, BlockPalette, Fluid};

use crate::collision::fluid_surface_below;
use crate::context::VehicleContext;

use super::{VehicleState, VehicleTick, MIN_VELOCITY};

/// Fluids taller than this flow over the block edge instead of rising.
const MAX_LOGICAL_FLUID_HEIGHT: f64 = 8.0 / 9.0;

const WATER_FLOW_SPEED: f64 = 0.014;
const LAVA_FLOW_SPEED: f64 = 0.007;

/// Applies fluid pushes to the motion and picks the fluid the movement
/// routines should treat the vehicle as being in. Returns that fluid and
/// how deep the vehicle sits in it.
pub(super) fn update_fluid_movement(
    state: &mut VehicleState,
    walks_on_lava: bool,
    ctx: &VehicleContext,
    tick: &VehicleTick<'_>,
) -> (Fluid, f64) {
    let mut shrunk = state.bounding_box.clone();
    shrunk.expand(-0.001);
    let min = shrunk.min();
    let max = shrunk.max();
    let region = BlockIter::from_min_max(BlockPos::containing(min), BlockPos::containing(max));

    let lava_speed = if tick.world.ultrawarm() {
        LAVA_FLOW_SPEED
    } else {
        LAVA_FLOW_SPEED / 3.0
    };
    let water_height = fluid_push(state, Fluid::Water, WATER_FLOW_SPEED, min.y, &region, ctx, tick);
    let lava_height = fluid_push(state, Fluid::Lava, lava_speed, min.y, &region, ctx, tick);

    if walks_on_lava && lava_height > 0.0 {
        let below_feet = BlockPos::containing(state.bounding_box.bottom_center());
        let above = ctx.block_at(tick.world, below_feet.up());
        if !fluid_surface_below(below_feet.y, &state.bounding_box)
            || tick.palette.fluid(above) == Fluid::Lava
        {
            // Submerged: bob up toward the surface.
            state.motion = state.motion * 0.5 + Vec3::new(0.0, 0.05, 0.0);
        } else {
            state.on_ground = true;
        }
    }

    if water_height > 0.0 {
        return (Fluid::Water, water_height);
    }
    if lava_height > 0.0 {
        return (Fluid::Lava, lava_height);
    }
    (Fluid::Empty, 0.0)
}

/// Flow push for one fluid over the vehicle's block region. Returns how far
/// the fluid reaches above the box bottom, or 0 when the region holds none.
fn fluid_push(
    state: &mut VehicleState,
    fluid: Fluid,
    speed: f64,
    min_y: f64,
    region: &BlockIter,
    ctx: &VehicleContext,
    tick: &VehicleTick<'_>,
) -> f64 {
    let palette = tick.palette;

    let mut total_velocity = DVec3::ZERO;
    let mut max_fluid_height = 0.0f64;
    let mut fluid_blocks = 0;

    for block_pos in region.clone() {
        let block_id = ctx.block_at(tick.world, block_pos);
        if palette.fluid(block_id) != fluid {
            continue;
        }

        let world_fluid_height = palette.fluid_height(fluid, block_id);
        let vehicle_fluid_height = block_pos.y as f64 + world_fluid_height - min_y;
        if vehicle_fluid_height < 0.0 {
            continue;
        }

        let mut flow_blocked = world_fluid_height != 1.0;
        let mut velocity = DVec3::ZERO;
        for direction in Direction::HORIZONTAL {
            let adjacent_pos = block_pos.shift(direction);
            let adjacent_id = ctx.block_at(tick.world, adjacent_pos);
            let adjacent_fluid = palette.fluid(adjacent_id);

            let mut height_diff = 0.0;
            if adjacent_fluid == fluid {
                height_diff = logical_height(palette, fluid, block_id)
                    - logical_height(palette, fluid, adjacent_id);
            } else if adjacent_fluid == Fluid::Empty {
                if !palette.has_collision(adjacent_id) {
                    // Flow spills over the edge when the same fluid sits one
                    // block lower.
                    let below = ctx.block_at(tick.world, adjacent_pos.down());
                    let below_height = logical_height(palette, fluid, below);
                    if below_height != -1.0 {
                        height_diff = logical_height(palette, fluid, block_id)
                            - (below_height - MAX_LOGICAL_FLUID_HEIGHT);
                    }
                } else if !flow_blocked {
                    flow_blocked = is_flow_blocked(palette, fluid, adjacent_id);
                }
            }

            if height_diff != 0.0 {
                velocity += direction.unit_vector() * height_diff;
            }
        }

        if world_fluid_height == 1.0 {
            // A falling column drags straight down once walled in.
            if !flow_blocked {
                let above = block_pos.up();
                for direction in Direction::HORIZONTAL {
                    flow_blocked = is_flow_blocked(
                        palette,
                        fluid,
                        ctx.block_at(tick.world, above.shift(direction)),
                    );
                    if flow_blocked {
                        break;
                    }
                }
            }
            if flow_blocked {
                velocity = java_normalize(velocity) + DVec3::new(0.0, -6.0, 0.0);
            }
        }

        velocity = java_normalize(velocity);

        max_fluid_height = vehicle_fluid_height.max(max_fluid_height);
        if max_fluid_height < 0.4 {
            velocity *= max_fluid_height;
        }

        total_velocity += velocity;
        fluid_blocks += 1;
    }

    if total_velocity != DVec3::ZERO {
        let motion = state.motion;
        let mut push = java_normalize(total_velocity / fluid_blocks as f64) * speed;
        if push.length() < 0.0045
            && motion.x.abs() < MIN_VELOCITY
            && motion.z.abs() < MIN_VELOCITY
        {
            push = java_normalize(push) * 0.0045;
        }
        state.motion = motion + push.as_vec3();
    }

    max_fluid_height
}

fn logical_height(palette: &BlockPalette, fluid: Fluid, id: BlockId) -> f64 {
    palette.fluid_height(fluid, id).min(MAX_LOGICAL_FLUID_HEIGHT)
}

/// Whether a neighboring block stops fluid from flowing that way.
fn is_flow_blocked(palette: &BlockPalette, fluid: Fluid, adjacent_id: BlockId) -> bool {
    if palette.is_ice(adjacent_id) {
        return false;
    }
    if palette.fluid(adjacent_id) == fluid {
        return false;
    }
    palette.is_full_cube(adjacent_id)
}

/// Normalization with the client's short-vector cutoff.
fn java_normalize(v: DVec3) -> DVec3 {
    let length = v.length();
    if length < 1.0e-4 { DVec3::ZERO } else { v / length }
}
