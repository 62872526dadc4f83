//! Boat simulation. Unlike mounts, a boat carries its own rotation,
//! accelerates from discrete stick thresholds, and floats on a per-status
//! table of friction, gravity, and buoyancy.

use glam::{DVec3, Vec3};
use ob_protocol::bedrock::{MoveEntityDelta, UpstreamPacket};
use ob_protocol::java::{DownstreamPacket, MoveVehicle};
use ob_protocol::shared::BlockPos;
use ob_world::palette::Fluid;

use crate::bounding_box::BoundingBox;
use crate::collision::CollisionWorld;
use crate::context::VehicleContext;
use crate::session::RiderState;

use super::{MountProfile, VehicleState, VehicleTick};

pub const BOAT_PROFILE: MountProfile = MountProfile {
    width: 1.375,
    height: 0.5625,
    step_height: 0.0,
    move_speed: 0.1,
    jump_strength: 0.0,
};

/// Bedrock renders boats this far above the Java position. The offset goes
/// into reported Y coordinates only; the simulation stays in Java space.
pub const BOAT_OFFSET: f32 = 0.375;

/// Where the boat sits relative to water, recomputed at the top of every
/// tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    InWater,
    UnderFlowingWater,
    UnderWater,
    OnLand,
    InAir,
}

pub struct BoatVehicle {
    state: VehicleState,
    status: Status,
    old_status: Status,
    /// Highest water surface found under the boat, fed into the buoyancy
    /// term while afloat.
    water_level: f64,
    land_friction: f32,
    /// Vertical movement of the previous tick, bounding the surface search
    /// after a plunge.
    last_yd: f64,
    delta_rotation: f32,
}

impl BoatVehicle {
    pub fn new(state: VehicleState) -> BoatVehicle {
        BoatVehicle {
            state,
            status: Status::InAir,
            old_status: Status::InAir,
            water_level: 0.0,
            land_friction: 0.0,
            last_yd: 0.0,
            delta_rotation: 0.0,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut VehicleState {
        &mut self.state
    }

    /// One simulation tick: reclassify against the water, float, steer, then
    /// move through the world and report.
    pub fn tick(&mut self, tick: &mut VehicleTick<'_>) {
        let mut ctx = VehicleContext::load(tick.world, &self.state.bounding_box);

        self.old_status = self.status;
        self.status = self.get_status(&ctx, tick);
        self.float_boat(&mut ctx, tick);

        let last_rotation = (self.state.pitch, self.state.yaw, self.state.head_yaw);
        self.control_boat(tick.rider);

        let mut motion = self.state.motion;
        let multiplier = super::block_movement_multiplier(&self.state.bounding_box, &ctx, tick);
        if let Some(m) = multiplier {
            motion = (motion.as_dvec3() * m).as_vec3();
        }

        let proposed = motion.as_dvec3();
        let in_bounds = tick
            .border
            .correct_movement(&self.state.bounding_box, proposed);
        let corrected = CollisionWorld::with_pistons(tick.palette, tick.world, tick.pistons)
            .correct_movement(
                in_bounds,
                &self.state.bounding_box,
                self.state.on_ground,
                self.state.profile.step_height,
                true,
                false,
            );

        let move_diff = proposed - corrected;
        self.state.bounding_box.translate(corrected);
        ctx.refresh(tick.world, &self.state.bounding_box);

        let vertical_collision = move_diff.y != 0.0;
        let on_ground = vertical_collision && motion.y < 0.0;

        let mut bounced = false;
        if on_ground {
            let landing_pos = BlockPos::containing(
                self.state.bounding_box.bottom_center() - DVec3::new(0.0, 0.2, 0.0),
            );
            let landing = ctx.block_at(tick.world, landing_pos);
            bounced = super::apply_landing_block(&mut motion, landing, tick.palette);
        }

        if multiplier.is_some() {
            motion = Vec3::ZERO;
        } else {
            if move_diff.x != 0.0 {
                motion.x = 0.0;
            }
            if vertical_collision && !bounced {
                motion.y = 0.0;
            }
            if move_diff.z != 0.0 {
                motion.z = 0.0;
            }
        }

        self.last_yd = f64::from(motion.y);
        self.report_movement(tick, last_rotation, on_ground);
        self.state.motion = motion;

        // Contact effects run twice per tick, like the mount path where both
        // travel and the tick tail apply them.
        super::apply_block_effects(&mut self.state, &ctx, tick);
        super::apply_block_effects(&mut self.state, &ctx, tick);
    }

    /// Applies the per-status friction, gravity, and buoyancy to the motion.
    /// A boat that just pierced the surface is lifted back onto it instead.
    fn float_boat(&mut self, ctx: &mut VehicleContext, tick: &VehicleTick<'_>) {
        if self.old_status == Status::InAir
            && self.status != Status::InAir
            && self.status != Status::OnLand
        {
            self.water_level = self.state.bounding_box.max().y;
            let target_y =
                self.water_level_above(ctx, tick) - self.state.bounding_box.size().y + 0.101;
            let lift = target_y - self.state.bounding_box.min().y;
            let probe = self.state.bounding_box.translated(DVec3::new(0.0, lift, 0.0));
            let scene = CollisionWorld::with_pistons(tick.palette, tick.world, tick.pistons);
            if !scene.intersects_anything(&probe, false) {
                let bottom = self.state.bounding_box.bottom_center();
                self.state.bounding_box = BoundingBox::from_bottom_center(
                    DVec3::new(bottom.x, target_y, bottom.z),
                    self.state.profile.width,
                    self.state.profile.height,
                );
                ctx.refresh(tick.world, &self.state.bounding_box);
                self.state.motion *= Vec3::new(1.0, 0.0, 1.0);
                self.last_yd = 0.0;
            }
            self.status = Status::InWater;
            return;
        }

        let (gravity, friction, buoyancy): (f32, f32, f64) = match self.status {
            Status::InWater => {
                let depth = (self.water_level - self.state.bounding_box.min().y)
                    / self.state.bounding_box.size().y;
                (-0.04, 0.9, depth)
            }
            Status::UnderFlowingWater => (-7.0e-4, 0.9, 0.0),
            Status::UnderWater => (-0.04, 0.45, 0.009999999776482582),
            Status::InAir => (-0.04, 0.9, 0.0),
            Status::OnLand => {
                let friction = self.land_friction;
                self.land_friction /= 2.0;
                (-0.04, friction, 0.0)
            }
        };

        let mut motion = self.state.motion;
        motion = Vec3::new(motion.x * friction, motion.y + gravity, motion.z * friction);
        self.delta_rotation *= friction;
        if buoyancy > 0.0 {
            motion.y = (motion.y + buoyancy as f32 * (0.04 / 0.65)) * 0.75;
        }
        self.state.motion = motion;
    }

    /// Turns stick input into rotation and forward acceleration. Anything
    /// past the 0.35 dead zone counts as a pressed key.
    fn control_boat(&mut self, rider: &mut RiderState) {
        let forward = rider.input.y > 0.35;
        let backward = rider.input.y < -0.35;
        let left = rider.input.x > 0.35;
        let right = rider.input.x < -0.35;

        let mut acceleration = 0.0f32;
        if left {
            self.delta_rotation -= 1.0;
        }
        if right {
            self.delta_rotation += 1.0;
        }
        if right != left && !forward && !backward {
            acceleration += 0.005;
        }
        self.state.yaw += self.delta_rotation;
        self.state.head_yaw = self.state.yaw;
        if forward {
            acceleration += 0.04;
        }
        if backward {
            acceleration -= 0.005;
        }

        let yaw = (self.state.yaw - 90.0).to_radians();
        self.state.motion += Vec3::new((-yaw).sin() * acceleration, 0.0, yaw.cos() * acceleration);

        rider.left_paddle = (right && !left) || forward;
        rider.right_paddle = (left && !right) || forward;
    }

    fn get_status(&mut self, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> Status {
        if let Some(underwater) = self.underwater_status(ctx, tick) {
            self.water_level = self.state.bounding_box.max().y;
            return underwater;
        }
        if self.check_in_water(ctx, tick) {
            return Status::InWater;
        }
        let friction = self.ground_friction(ctx, tick);
        if friction > 0.0 {
            self.land_friction = friction;
            return Status::OnLand;
        }
        Status::InAir
    }

    /// Scans the bottom sliver of the box for water, tracking the highest
    /// surface found.
    fn check_in_water(&mut self, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> bool {
        let min = self.state.bounding_box.min();
        let max = self.state.bounding_box.max();
        let x0 = min.x.floor() as i32;
        let x1 = max.x.ceil() as i32;
        let y0 = min.y.floor() as i32;
        let y1 = (min.y + 0.001).ceil() as i32;
        let z0 = min.z.floor() as i32;
        let z1 = max.z.ceil() as i32;

        let mut found = false;
        self.water_level = f64::MIN;
        for x in x0..x1 {
            for y in y0..y1 {
                for z in z0..z1 {
                    let id = ctx.block_at(tick.world, BlockPos::new(x, y, z));
                    let height = tick.palette.fluid_height(Fluid::Water, id);
                    if height < 0.0 {
                        continue;
                    }
                    let surface = y as f64 + height;
                    self.water_level = self.water_level.max(surface);
                    found |= min.y < surface;
                }
            }
        }
        found
    }

    /// Water strictly above the top of the box submerges the boat. Flowing
    /// water overhead wins over still water.
    fn underwater_status(&self, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> Option<Status> {
        let min = self.state.bounding_box.min();
        let max = self.state.bounding_box.max();
        let limit = max.y + 0.001;
        let x0 = min.x.floor() as i32;
        let x1 = max.x.ceil() as i32;
        let y0 = max.y.floor() as i32;
        let y1 = limit.ceil() as i32;
        let z0 = min.z.floor() as i32;
        let z1 = max.z.ceil() as i32;

        let mut submerged = false;
        for x in x0..x1 {
            for y in y0..y1 {
                for z in z0..z1 {
                    let id = ctx.block_at(tick.world, BlockPos::new(x, y, z));
                    let height = tick.palette.fluid_height(Fluid::Water, id);
                    if height <= 0.0 || limit >= y as f64 + height {
                        continue;
                    }
                    if tick.palette.water_level(id) != Some(0) {
                        return Some(Status::UnderFlowingWater);
                    }
                    submerged = true;
                }
            }
        }
        if submerged {
            Some(Status::UnderWater)
        } else {
            None
        }
    }

    /// Average slipperiness of the blocks touching a thin slab under the
    /// hull. The outermost ring only counts its middle layers, and corners
    /// never count.
    fn ground_friction(&self, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> f32 {
        let min = self.state.bounding_box.min();
        let max = self.state.bounding_box.max();
        let slab = BoundingBox::new(
            DVec3::new(
                (min.x + max.x) / 2.0,
                min.y - 0.0005,
                (min.z + max.z) / 2.0,
            ),
            DVec3::new(max.x - min.x, 0.001, max.z - min.z),
        );

        let x0 = slab.min().x.floor() as i32 - 1;
        let x1 = slab.max().x.ceil() as i32 + 1;
        let y0 = slab.min().y.floor() as i32;
        let y1 = slab.max().y.ceil() as i32;
        let z0 = slab.min().z.floor() as i32 - 1;
        let z1 = slab.max().z.ceil() as i32 + 1;

        let scene = CollisionWorld::with_pistons(tick.palette, tick.world, tick.pistons);
        let mut friction = 0.0f64;
        let mut count = 0u32;
        let mut boxes = Vec::new();
        for x in x0..x1 {
            for z in z0..z1 {
                let edges = (x == x0 || x == x1 - 1) as u32 + (z == z0 || z == z1 - 1) as u32;
                if edges == 2 {
                    continue;
                }
                for y in y0..y1 {
                    if edges > 0 && (y == y0 || y == y1 - 1) {
                        continue;
                    }
                    let pos = BlockPos::new(x, y, z);
                    let id = ctx.block_at(tick.world, pos);
                    if tick.palette.is_lily_pad(id) {
                        continue;
                    }
                    boxes.clear();
                    scene.append_block_boxes(id, pos, &slab, false, &mut boxes);
                    if boxes.iter().any(|b| slab.intersects(b)) {
                        friction += tick.palette.slipperiness(id);
                        count += 1;
                    }
                }
            }
        }
        // 0 / 0 is NaN, which fails the > 0 test in get_status.
        (friction / f64::from(count)) as f32
    }

    /// First Y where the water column above the boat opens up, searched as
    /// far up as the last tick fell.
    fn water_level_above(&self, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> f64 {
        let min = self.state.bounding_box.min();
        let max = self.state.bounding_box.max();
        let x0 = min.x.floor() as i32;
        let x1 = max.x.ceil() as i32;
        let y0 = max.y.floor() as i32;
        let y1 = (max.y - self.last_yd).ceil() as i32;
        let z0 = min.z.floor() as i32;
        let z1 = max.z.ceil() as i32;

        'layers: for y in y0..y1 {
            let mut level = 0.0f64;
            for x in x0..x1 {
                for z in z0..z1 {
                    let id = ctx.block_at(tick.world, BlockPos::new(x, y, z));
                    level = level.max(tick.palette.fluid_height(Fluid::Water, id));
                    if level >= 1.0 {
                        continue 'layers;
                    }
                }
            }
            return y as f64 + level;
        }
        f64::from(y1 + 1)
    }

    /// Send the post-move position both directions. Boats rotate themselves,
    /// so the report compares against the pre-steer rotation instead of the
    /// rider, and the Bedrock Y carries the render offset.
    fn report_movement(
        &mut self,
        tick: &VehicleTick<'_>,
        last_rotation: (f32, f32, f32),
        on_ground: bool,
    ) {
        let state = &mut self.state;
        let position = state.bounding_box.bottom_center();
        let wire = position.as_vec3();

        state.on_ground = on_ground;

        let mut delta = MoveEntityDelta {
            runtime_id: state.runtime_id,
            on_ground,
            ..MoveEntityDelta::default()
        };
        if state.wire_position.x != wire.x {
            delta.x = Some(wire.x);
        }
        if state.wire_position.y != wire.y {
            delta.y = Some(wire.y + BOAT_OFFSET);
        }
        if state.wire_position.z != wire.z {
            delta.z = Some(wire.z);
        }
        state.wire_position = wire;

        if state.pitch != last_rotation.0 {
            delta.pitch = Some(state.pitch);
        }
        if state.yaw != last_rotation.1 {
            delta.yaw = Some(state.yaw);
        }
        if state.head_yaw != last_rotation.2 {
            delta.head_yaw = Some(state.head_yaw);
        }

        if !delta.is_empty() {
            tick.sinks.send_upstream(UpstreamPacket::MoveDelta(delta));
        }

        tick.sinks
            .send_downstream(DownstreamPacket::MoveVehicle(MoveVehicle {
                position,
                yaw: state.yaw - 90.0,
                pitch: state.pitch,
                on_ground,
            }));
    }
}
