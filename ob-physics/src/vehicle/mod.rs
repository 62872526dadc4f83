//! Server-authoritative vehicle simulation, split into the shared movement
//! core here, per-species behavior in `mounts`, fluid currents in `fluid`,
//! and the boat's buoyancy model in `boat`.

pub mod boat;
pub mod fluid;
pub mod mounts;

use glam::{DVec3, Vec2, Vec3};
use ob_protocol::bedrock::{MoveEntityDelta, UpstreamPacket};
use ob_protocol::java::{DownstreamPacket, MoveVehicle};
use ob_protocol::shared::BlockPos;
use ob_world::iter::BlockIter;
use ob_world::palette::{BlockId, BlockPalette, Fluid};
use ob_world::provider::WorldView;

use crate::border::WorldBorder;
use crate::bounding_box::BoundingBox;
use crate::collision::CollisionWorld;
use crate::context::VehicleContext;
use crate::piston::Pistons;
use crate::session::{EffectCache, PacketSinks, RiderState};

use boat::BoatVehicle;
use mounts::{Camel, HappyGhast, Horse, Nautilus, Pig, Strider};

/// Motion components below this snap to zero at the start of a move.
pub(crate) const MIN_VELOCITY: f32 = 0.003;

const CLIMB_SPEED: f32 = 0.15;
const BASE_SLIPPERINESS_CUBED: f32 = 0.6 * 0.6 * 0.6;

/// Everything one vehicle tick borrows from the session.
pub struct VehicleTick<'a> {
    pub rider: &'a mut RiderState,
    pub effects: &'a EffectCache,
    pub border: &'a WorldBorder,
    pub palette: &'a BlockPalette,
    pub world: &'a dyn WorldView,
    pub pistons: &'a Pistons,
    pub sinks: &'a PacketSinks,
}

/// Which movement routine a tick dispatched into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovementMode {
    Water,
    Lava,
    Land,
}

/// Species constants. Speed and jump strength track server attributes, so
/// the connection layer may overwrite them after mounting.
#[derive(Clone, Copy, Debug)]
pub struct MountProfile {
    pub width: f64,
    pub height: f64,
    pub step_height: f64,
    pub move_speed: f32,
    pub jump_strength: f32,
}

/// Shared simulation state for one vehicle.
#[derive(Clone, Debug)]
pub struct VehicleState {
    pub runtime_id: u64,
    pub bounding_box: BoundingBox,
    /// Last position reported to the Bedrock client, kept in f32 like the
    /// wire format so unchanged coordinates compare equal.
    pub wire_position: Vec3,
    pub motion: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
    pub on_ground: bool,
    /// Rearing pose. A rearing horse refuses stick input on the ground.
    pub standing: bool,
    pub allow_stand_sliding: bool,
    /// Strider out of lava. Cold striders move slower.
    pub cold: bool,
    pub profile: MountProfile,
}

impl VehicleState {
    fn new(runtime_id: u64, position: DVec3, profile: MountProfile) -> VehicleState {
        VehicleState {
            runtime_id,
            bounding_box: BoundingBox::from_bottom_center(position, profile.width, profile.height),
            wire_position: position.as_vec3(),
            motion: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            head_yaw: 0.0,
            on_ground: false,
            standing: false,
            allow_stand_sliding: false,
            cold: false,
            profile,
        }
    }

    pub fn position(&self) -> DVec3 {
        self.bounding_box.bottom_center()
    }
}

/// Species hooks plugged into the shared movement core. The defaults
/// describe a plain land mount.
pub trait Mount: Send {
    fn name(&self) -> &'static str;

    /// Shape the raw stick input into a local movement direction, before
    /// normalization and speed. Land mounts have no vertical component.
    fn adjust_input(&self, _state: &VehicleState, _rider: &RiderState, input: Vec2) -> Vec3 {
        Vec3::new(input.x, 0.0, input.y)
    }

    /// Speed fed into the input pipeline for the given movement mode.
    fn vehicle_speed(&self, state: &VehicleState, mode: MovementMode) -> f32 {
        match mode {
            MovementMode::Land => state.profile.move_speed,
            _ => 0.02,
        }
    }

    fn can_climb(&self) -> bool {
        true
    }

    fn walks_on_lava(&self) -> bool {
        false
    }

    fn flies(&self) -> bool {
        false
    }

    /// Runs once per tick before the movement dispatch.
    fn before_travel(
        &mut self,
        _state: &mut VehicleState,
        _rider: &mut RiderState,
        _effects: &EffectCache,
        _jump_multiplier: f32,
    ) {
    }

    fn start_boost(&mut self, _duration: i32) {}

    fn end_tick(&mut self) {}
}

/// A saddled mount driven through the shared land/water/lava routines.
pub struct MountedVehicle {
    state: VehicleState,
    mount: Box<dyn Mount>,
}

impl MountedVehicle {
    fn new(state: VehicleState, mount: Box<dyn Mount>) -> MountedVehicle {
        MountedVehicle { state, mount }
    }

    pub fn name(&self) -> &'static str {
        self.mount.name()
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut VehicleState {
        &mut self.state
    }

    pub fn start_boost(&mut self, duration: i32) {
        self.mount.start_boost(duration);
    }

    /// One simulation tick: fluid currents, then the movement routine for
    /// whichever fluid the vehicle sits in, then contact block effects.
    pub fn tick(&mut self, tick: &mut VehicleTick<'_>) {
        let mut ctx = VehicleContext::load(tick.world, &self.state.bounding_box);

        let jump_multiplier = self.jump_velocity_multiplier(&ctx, tick);
        self.mount
            .before_travel(&mut self.state, tick.rider, tick.effects, jump_multiplier);

        let (fluid, fluid_height) =
            fluid::update_fluid_movement(&mut self.state, self.mount.walks_on_lava(), &ctx, tick);
        match fluid {
            Fluid::Water => self.water_movement(&mut ctx, tick),
            Fluid::Lava => {
                let standing_in = ctx.block_at(
                    tick.world,
                    BlockPos::containing(self.state.bounding_box.bottom_center()),
                );
                if self.mount.walks_on_lava() && tick.palette.fluid(standing_in) == Fluid::Lava {
                    self.land_movement(&mut ctx, tick);
                } else {
                    self.lava_movement(&mut ctx, tick, fluid_height);
                }
            }
            Fluid::Empty => self.land_movement(&mut ctx, tick),
        }

        // Second application; travel already ran one over the moved box.
        apply_block_effects(&mut self.state, &ctx, tick);

        self.mount.end_tick();
    }

    fn water_movement(&mut self, ctx: &mut VehicleContext, tick: &mut VehicleTick<'_>) {
        let gravity = gravity_for(&self.state, self.mount.flies(), tick.effects);
        let original_y = self.state.bounding_box.bottom_center().y;
        let falling = self.state.motion.y <= 0.0;

        let speed = self.mount.vehicle_speed(&self.state, MovementMode::Water);
        let horizontal_collision = self.travel(ctx, tick, speed);
        if horizontal_collision && self.mount.can_climb() && is_climbing(&self.state, ctx, tick) {
            self.state.motion.y = 0.2;
        }

        self.state.motion *= 0.8;
        apply_fluid_gravity(&mut self.state, gravity, falling);

        if horizontal_collision && jumps_out_of_fluid(&self.state, tick, original_y) {
            self.state.motion.y = 0.3;
        }
    }

    fn lava_movement(&mut self, ctx: &mut VehicleContext, tick: &mut VehicleTick<'_>, lava_height: f64) {
        let gravity = gravity_for(&self.state, self.mount.flies(), tick.effects);
        let original_y = self.state.bounding_box.bottom_center().y;
        let falling = self.state.motion.y <= 0.0;

        let speed = self.mount.vehicle_speed(&self.state, MovementMode::Lava);
        let horizontal_collision = self.travel(ctx, tick, speed);

        // Small vehicles swim even in a thin lava layer.
        let swim_height = if self.state.bounding_box.size().y * 0.85 < 0.4 {
            0.0
        } else {
            0.4
        };
        if lava_height <= swim_height {
            self.state.motion *= Vec3::new(0.5, 0.8, 0.5);
            apply_fluid_gravity(&mut self.state, gravity, falling);
        } else {
            self.state.motion *= 0.5;
        }

        self.state.motion.y -= gravity / 4.0;

        if horizontal_collision && jumps_out_of_fluid(&self.state, tick, original_y) {
            self.state.motion.y = 0.3;
        }
    }

    fn land_movement(&mut self, ctx: &mut VehicleContext, tick: &mut VehicleTick<'_>) {
        if self.mount.flies() {
            let speed = self.mount.vehicle_speed(&self.state, MovementMode::Land);
            self.travel(ctx, tick, speed);
            self.state.motion *= 0.91;
            return;
        }

        let gravity = gravity_for(&self.state, false, tick.effects);
        let affecting = velocity_affecting_pos(&self.state, ctx, tick, self.mount.walks_on_lava());
        let slipperiness = tick.palette.slipperiness(ctx.block_at(tick.world, affecting)) as f32;
        let drag = if self.state.on_ground {
            0.91 * slipperiness
        } else {
            0.91
        };
        let speed = self.mount.vehicle_speed(&self.state, MovementMode::Land)
            * if self.state.on_ground {
                BASE_SLIPPERINESS_CUBED / (slipperiness * slipperiness * slipperiness)
            } else {
                0.1
            };

        let horizontal_collision = self.travel(ctx, tick, speed);
        if self.mount.can_climb() && is_climbing(&self.state, ctx, tick) {
            self.state.motion = climbing_speed(self.state.motion, horizontal_collision);
        }

        let levitation = tick.effects.levitation();
        if levitation > 0 {
            self.state.motion.y += (0.05 * levitation as f32 - self.state.motion.y) * 0.2;
        } else {
            self.state.motion.y -= gravity;
        }

        self.state.motion.x *= drag;
        self.state.motion.y *= 0.98;
        self.state.motion.z *= drag;
    }

    /// Shared per-tick move: decay and cutoff, rider input, contact movement
    /// multipliers, border and collision clipping, landing blocks, and the
    /// movement report. Returns whether a horizontal axis was clipped.
    fn travel(&mut self, ctx: &mut VehicleContext, tick: &mut VehicleTick<'_>, speed: f32) -> bool {
        let mut motion = self.state.motion * 0.98;
        if motion.x.abs() < MIN_VELOCITY {
            motion.x = 0.0;
        }
        if motion.y.abs() < MIN_VELOCITY {
            motion.y = 0.0;
        }
        if motion.z.abs() < MIN_VELOCITY {
            motion.z = 0.0;
        }

        motion += input_velocity(self.mount.as_ref(), &self.state, tick.rider, speed);

        let multiplier = block_movement_multiplier(&self.state.bounding_box, ctx, tick);
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
                self.mount.walks_on_lava(),
            );

        let move_diff = proposed - corrected;
        self.state.bounding_box.translate(corrected);
        ctx.refresh(tick.world, &self.state.bounding_box);
        let new_pos = self.state.bounding_box.bottom_center();

        let on_ground = move_diff.y != 0.0 && motion.y < 0.0;
        let horizontal_collision = move_diff.x != 0.0 || move_diff.z != 0.0;

        let mut bounced = false;
        if on_ground {
            let landing_pos = BlockPos::containing(new_pos - DVec3::new(0.0, 0.2, 0.0));
            let landing = ctx.block_at(tick.world, landing_pos);
            bounced = apply_landing_block(&mut motion, landing, tick.palette);
        }

        if multiplier.is_some() {
            motion = Vec3::ZERO;
        } else {
            if move_diff.x != 0.0 {
                motion.x = 0.0;
            }
            if move_diff.y != 0.0 && !bounced {
                motion.y = 0.0;
            }
            if move_diff.z != 0.0 {
                motion.z = 0.0;
            }
        }

        report_movement(&mut self.state, tick, new_pos, on_ground);
        self.state.motion = motion;

        apply_block_effects(&mut self.state, ctx, tick);

        let velocity_multiplier =
            velocity_multiplier(&self.state, ctx, tick, self.mount.walks_on_lava());
        self.state.motion.x *= velocity_multiplier;
        self.state.motion.z *= velocity_multiplier;

        horizontal_collision
    }

    fn jump_velocity_multiplier(&self, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> f32 {
        let standing_on = ctx.block_at(
            tick.world,
            BlockPos::containing(self.state.bounding_box.bottom_center()),
        );
        if tick.palette.is_honey_block(standing_on) {
            return 0.5;
        }
        let affecting = ctx.block_at(
            tick.world,
            velocity_affecting_pos(&self.state, ctx, tick, self.mount.walks_on_lava()),
        );
        if tick.palette.is_honey_block(affecting) {
            return 0.5;
        }
        1.0
    }
}

/// Vehicles the proxy can simulate. Construction picks the species profile;
/// the shared state is reachable either way.
pub enum Vehicle {
    Mounted(MountedVehicle),
    Boat(BoatVehicle),
}

impl Vehicle {
    pub fn horse(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Mounted(MountedVehicle::new(
            VehicleState::new(runtime_id, position, mounts::HORSE_PROFILE),
            Box::new(Horse),
        ))
    }

    pub fn camel(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Mounted(MountedVehicle::new(
            VehicleState::new(runtime_id, position, mounts::CAMEL_PROFILE),
            Box::new(Camel),
        ))
    }

    pub fn pig(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Mounted(MountedVehicle::new(
            VehicleState::new(runtime_id, position, mounts::PIG_PROFILE),
            Box::new(Pig::default()),
        ))
    }

    pub fn strider(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Mounted(MountedVehicle::new(
            VehicleState::new(runtime_id, position, mounts::STRIDER_PROFILE),
            Box::new(Strider::default()),
        ))
    }

    pub fn nautilus(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Mounted(MountedVehicle::new(
            VehicleState::new(runtime_id, position, mounts::NAUTILUS_PROFILE),
            Box::new(Nautilus::default()),
        ))
    }

    pub fn happy_ghast(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Mounted(MountedVehicle::new(
            VehicleState::new(runtime_id, position, mounts::HAPPY_GHAST_PROFILE),
            Box::new(HappyGhast),
        ))
    }

    pub fn boat(runtime_id: u64, position: DVec3) -> Vehicle {
        Vehicle::Boat(BoatVehicle::new(VehicleState::new(
            runtime_id,
            position,
            boat::BOAT_PROFILE,
        )))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Vehicle::Mounted(mounted) => mounted.name(),
            Vehicle::Boat(_) => "boat",
        }
    }

    pub fn state(&self) -> &VehicleState {
        match self {
            Vehicle::Mounted(mounted) => mounted.state(),
            Vehicle::Boat(boat) => boat.state(),
        }
    }

    pub fn state_mut(&mut self) -> &mut VehicleState {
        match self {
            Vehicle::Mounted(mounted) => mounted.state_mut(),
            Vehicle::Boat(boat) => boat.state_mut(),
        }
    }

    pub fn tick(&mut self, mut tick: VehicleTick<'_>) {
        match self {
            Vehicle::Mounted(mounted) => mounted.tick(&mut tick),
            Vehicle::Boat(boat) => boat.tick(&mut tick),
        }
    }

    pub fn start_boost(&mut self, duration: i32) {
        if let Vehicle::Mounted(mounted) = self {
            mounted.start_boost(duration);
        }
    }
}

/// Rider stick input turned into a world-space velocity: decay, the mount's
/// shaping, vanilla normalization, speed, then rotation by the rider's yaw.
fn input_velocity(mount: &dyn Mount, state: &VehicleState, rider: &RiderState, speed: f32) -> Vec3 {
    let input = rider.input * 0.98;
    let direction = normalize_input(mount.adjust_input(state, rider, input)) * speed;

    let yaw = rider.yaw.to_radians();
    let (sin, cos) = yaw.sin_cos();
    Vec3::new(
        direction.x * cos - direction.z * sin,
        direction.y,
        direction.z * cos + direction.x * sin,
    )
}

fn normalize_input(input: Vec3) -> Vec3 {
    let length_squared = input.length_squared();
    if length_squared < 1.0e-7 {
        Vec3::ZERO
    } else if length_squared > 1.0 {
        input.normalize()
    } else {
        input
    }
}

/// Per-tick downward acceleration after status effects.
fn gravity_for(state: &VehicleState, flies: bool, effects: &EffectCache) -> f32 {
    if flies {
        return 0.0;
    }
    if state.motion.y <= 0.0 && effects.slow_falling() {
        return 0.01;
    }
    0.08
}

/// Sinking in a fluid settles into a slow terminal fall instead of letting
/// the low-velocity cutoff freeze the vehicle mid-water.
fn apply_fluid_gravity(state: &mut VehicleState, gravity: f32, falling: bool) {
    if gravity == 0.0 {
        return;
    }
    let new_y = state.motion.y - gravity / 16.0;
    state.motion.y = if falling
        && (state.motion.y - 0.005).abs() >= MIN_VELOCITY
        && new_y.abs() < MIN_VELOCITY
    {
        -MIN_VELOCITY
    } else {
        new_y
    };
}

/// Whether the vehicle would fit above the fluid surface after a hop. Fluids
/// count as solid so the check fails while still surrounded by them.
fn jumps_out_of_fluid(state: &VehicleState, tick: &VehicleTick<'_>, original_y: f64) -> bool {
    let mut probe = state.bounding_box.clone();
    probe.translate(
        state.motion.as_dvec3()
            + DVec3::new(
                0.0,
                0.6 - state.bounding_box.bottom_center().y + original_y,
                0.0,
            ),
    );
    probe.expand(-1.0e-7);
    !CollisionWorld::new(tick.palette, tick.world).intersects_anything(&probe, true)
}

fn is_climbing(state: &VehicleState, ctx: &VehicleContext, tick: &VehicleTick<'_>) -> bool {
    let pos = BlockPos::containing(state.bounding_box.bottom_center());
    let id = ctx.block_at(tick.world, pos);
    if tick.palette.is_climbable(id) {
        return true;
    }
    // An open trapdoor continues the ladder below it.
    if let Some(open_toward) = tick.palette.open_trapdoor_direction(id) {
        return tick.palette.ladder_direction(ctx.block_at(tick.world, pos.down()))
            == Some(open_toward);
    }
    false
}

fn climbing_speed(motion: Vec3, horizontal_collision: bool) -> Vec3 {
    Vec3::new(
        motion.x.clamp(-CLIMB_SPEED, CLIMB_SPEED),
        if horizontal_collision {
            0.2
        } else {
            motion.y.max(-CLIMB_SPEED)
        },
        motion.z.clamp(-CLIMB_SPEED, CLIMB_SPEED),
    )
}

/// Movement multiplier from contact blocks like cobwebs. The scan runs over
/// every block the box overlaps and the last match wins, like the reference
/// client. Weaving exempts cobwebs only.
fn block_movement_multiplier(
    bounding_box: &BoundingBox,
    ctx: &VehicleContext,
    tick: &VehicleTick<'_>,
) -> Option<DVec3> {
    let mut shrunk = bounding_box.clone();
    shrunk.expand(-1.0e-7);
    let region = BlockIter::from_min_max(
        BlockPos::containing(shrunk.min()),
        BlockPos::containing(shrunk.max()),
    );

    let mut multiplier = None;
    for pos in region {
        let id = ctx.block_at(tick.world, pos);
        if tick.palette.is_cobweb(id) && tick.effects.weaving() {
            continue;
        }
        if let Some(m) = tick.palette.movement_multiplier(id) {
            multiplier = Some(m);
        }
    }
    multiplier
}

/// Reflects vertical motion off slime and beds. Returns whether it bounced.
fn apply_landing_block(motion: &mut Vec3, landing: BlockId, palette: &BlockPalette) -> bool {
    if palette.is_slime_block(landing) {
        motion.y = -motion.y;
        if motion.y.abs() < 0.1 {
            let squish = 0.4 + motion.y.abs() * 0.2;
            motion.x *= squish;
            motion.z *= squish;
        }
        return true;
    }
    if palette.is_bed(landing) {
        motion.y = -motion.y * 0.66;
        return true;
    }
    false
}

/// Honey slide and bubble column effects for every block the box overlaps.
fn apply_block_effects(state: &mut VehicleState, ctx: &VehicleContext, tick: &VehicleTick<'_>) {
    let mut shrunk = state.bounding_box.clone();
    shrunk.expand(-1.0e-7);
    let region = BlockIter::from_min_max(
        BlockPos::containing(shrunk.min()),
        BlockPos::containing(shrunk.max()),
    );

    for pos in region {
        let id = ctx.block_at(tick.world, pos);
        if tick.palette.is_honey_block(id) {
            slide_down_honey(state);
        } else if tick.palette.is_bubble_column(id) {
            bubble_column_drag(state, tick.palette.get(id).drag);
        }
    }
}

/// Sliding down the side of a honey block caps the fall speed.
fn slide_down_honey(state: &mut VehicleState) {
    if state.on_ground || state.motion.y >= -0.08 {
        return;
    }
    let slow = if state.motion.y < -0.13 {
        -0.05 / state.motion.y
    } else {
        1.0
    };
    state.motion = Vec3::new(state.motion.x * slow, -0.05, state.motion.z * slow);
}

fn bubble_column_drag(state: &mut VehicleState, drag_down: bool) {
    state.motion.y = if drag_down {
        (state.motion.y - 0.03).max(-0.3)
    } else {
        (state.motion.y + 0.06).min(0.7)
    };
}

/// The block the vehicle stands on, memoized per move. Ties resolve toward
/// the block center closest to the vehicle's bottom center.
fn supporting_block(
    state: &VehicleState,
    ctx: &VehicleContext,
    tick: &VehicleTick<'_>,
    walks_on_lava: bool,
) -> Option<BlockPos> {
    ctx.supporting_block(|| {
        if !state.on_ground {
            return None;
        }
        let bottom_center = state.bounding_box.bottom_center();
        let mut probe = state.bounding_box.clone();
        probe.extend(DVec3::new(0.0, -1.0e-6, 0.0));
        let min = probe.min();
        let max = probe.max();
        let floor_layer = BlockIter::from_min_max(
            BlockPos::new(min.x.floor() as i32, min.y.floor() as i32, min.z.floor() as i32),
            BlockPos::new(max.x.floor() as i32, min.y.floor() as i32, max.z.floor() as i32),
        );

        let scene = CollisionWorld::new(tick.palette, tick.world);
        let mut closest = None;
        let mut closest_distance = f64::MAX;
        let mut boxes = Vec::new();
        for pos in floor_layer {
            boxes.clear();
            scene.append_block_boxes(
                ctx.block_at(tick.world, pos),
                pos,
                &state.bounding_box,
                walks_on_lava,
                &mut boxes,
            );
            if boxes.iter().any(|b| probe.intersects(b)) {
                let distance = bottom_center.distance_squared(pos.center());
                if distance <= closest_distance {
                    closest_distance = distance;
                    closest = Some(pos);
                }
            }
        }
        closest
    })
}

/// Where friction and speed modifiers are sampled from: under the supporting
/// block when grounded, straight below the wire position otherwise.
fn velocity_affecting_pos(
    state: &VehicleState,
    ctx: &VehicleContext,
    tick: &VehicleTick<'_>,
    walks_on_lava: bool,
) -> BlockPos {
    match supporting_block(state, ctx, tick, walks_on_lava) {
        Some(pos) => BlockPos::new(
            pos.x,
            (state.bounding_box.bottom_center().y - 0.500001).floor() as i32,
            pos.z,
        ),
        None => BlockPos::containing(
            state.wire_position.as_dvec3() - DVec3::new(0.0, 0.500001, 0.0),
        ),
    }
}

fn velocity_multiplier(
    state: &VehicleState,
    ctx: &VehicleContext,
    tick: &VehicleTick<'_>,
    walks_on_lava: bool,
) -> f32 {
    let standing_on = ctx.block_at(
        tick.world,
        BlockPos::containing(state.bounding_box.bottom_center()),
    );
    if tick.palette.water_level(standing_on).is_some() || tick.palette.is_bubble_column(standing_on)
    {
        return 1.0;
    }
    if tick.palette.is_soul_sand(standing_on) || tick.palette.is_honey_block(standing_on) {
        return 0.4;
    }
    let affecting = ctx.block_at(
        tick.world,
        velocity_affecting_pos(state, ctx, tick, walks_on_lava),
    );
    if tick.palette.is_soul_sand(affecting) || tick.palette.is_honey_block(affecting) {
        return 0.4;
    }
    1.0
}

/// Send the post-move position both directions. The Bedrock delta carries
/// only fields that changed since the last report; the Java report always
/// goes out. Rotations follow the rider, with pitch halved for mounts.
fn report_movement(
    state: &mut VehicleState,
    tick: &VehicleTick<'_>,
    position: DVec3,
    on_ground: bool,
) {
    let wire = position.as_vec3();
    let yaw = tick.rider.yaw;
    let pitch = tick.rider.pitch * 0.5;

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
        delta.y = Some(wire.y);
    }
    if state.wire_position.z != wire.z {
        delta.z = Some(wire.z);
    }
    state.wire_position = wire;

    if state.pitch != pitch {
        delta.pitch = Some(pitch);
        state.pitch = pitch;
    }
    if state.yaw != yaw {
        delta.yaw = Some(yaw);
        state.yaw = yaw;
    }
    if state.head_yaw != yaw {
        delta.head_yaw = Some(yaw);
        state.head_yaw = yaw;
    }

    if !delta.is_empty() {
        tick.sinks.send_upstream(UpstreamPacket::MoveDelta(delta));
    }

    tick.sinks
        .send_downstream(DownstreamPacket::MoveVehicle(MoveVehicle {
            position,
            yaw,
            pitch,
            on_ground,
        }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piston::PistonCache;
    use crossbeam::channel::Receiver;
    use ob_protocol::bedrock::DELTA_ON_GROUND;
    use ob_world::palette::BlockState;
    use ob_world::provider::MapWorld;

    struct Fixture {
        rider: RiderState,
        effects: EffectCache,
        border: WorldBorder,
        palette: BlockPalette,
        world: MapWorld,
        pistons: PistonCache,
        sinks: PacketSinks,
        upstream: Receiver<UpstreamPacket>,
        downstream: Receiver<DownstreamPacket>,
    }

    impl Fixture {
        fn new(palette: BlockPalette, world: MapWorld) -> Fixture {
            let (sinks, upstream, downstream) = PacketSinks::unbounded();
            Fixture {
                rider: RiderState::new(1, DVec3::new(0.5, 0.0, 0.5)),
                effects: EffectCache::default(),
                border: WorldBorder::default(),
                palette,
                world,
                pistons: PistonCache::default(),
                sinks,
                upstream,
                downstream,
            }
        }

        fn run_tick(&mut self, vehicle: &mut Vehicle) {
            let pistons = self.pistons.lock();
            vehicle.tick(VehicleTick {
                rider: &mut self.rider,
                effects: &self.effects,
                border: &self.border,
                palette: &self.palette,
                world: &self.world,
                pistons: &pistons,
                sinks: &self.sinks,
            });
        }
    }

    fn palette() -> BlockPalette {
        BlockPalette::new(vec![
            BlockState::default(),
            BlockState::solid("minecraft:stone"),
            BlockState::solid("minecraft:slime_block"),
            BlockState::named("minecraft:cobweb"),
            BlockState::water(0),
            BlockState::lava(0),
        ])
    }

    fn stone_floor() -> MapWorld {
        let mut world = MapWorld::new();
        world.fill(BlockPos::new(-8, -1, -8), BlockPos::new(8, -1, 8), 1);
        world
    }

    #[test]
    fn hovering_vehicle_sends_no_delta_but_still_reports_downstream() {
        let mut fixture = Fixture::new(palette(), MapWorld::new());
        let mut vehicle = Vehicle::happy_ghast(7, DVec3::new(0.5, 20.0, 0.5));

        fixture.run_tick(&mut vehicle);
        fixture.run_tick(&mut vehicle);

        assert!(fixture.upstream.try_recv().is_err());
        assert_eq!(fixture.downstream.try_iter().count(), 2);
        assert_eq!(vehicle.state().motion, Vec3::ZERO);
    }

    #[test]
    fn resting_vehicle_reports_only_the_ground_flag() {
        let mut fixture = Fixture::new(palette(), stone_floor());
        let mut vehicle = Vehicle::pig(2, DVec3::new(0.5, 0.0, 0.5));

        // First tick only accrues gravity; the second collides with the
        // floor and lands.
        fixture.run_tick(&mut vehicle);
        fixture.run_tick(&mut vehicle);

        assert!(vehicle.state().on_ground);
        let mut ground_flag_seen = false;
        for packet in fixture.upstream.try_iter() {
            if let UpstreamPacket::MoveDelta(delta) = packet {
                ground_flag_seen |= delta.flags() == DELTA_ON_GROUND;
            }
        }
        assert!(ground_flag_seen);
    }

    #[test]
    fn slime_landing_bounces_the_vehicle() {
        let mut world = MapWorld::new();
        world.fill(BlockPos::new(-4, -1, -4), BlockPos::new(4, -1, 4), 2);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::pig(2, DVec3::new(0.5, 0.2, 0.5));
        vehicle.state_mut().motion = Vec3::new(0.0, -0.5, 0.0);
        fixture.run_tick(&mut vehicle);

        assert!(vehicle.state().on_ground);
        assert!(vehicle.state().motion.y > 0.3);
    }

    #[test]
    fn landing_reflection_preserves_magnitude() {
        let palette = palette();
        let mut motion = Vec3::new(0.1, -0.5, 0.0);
        let slime = palette.id_of("minecraft:slime_block").unwrap();
        assert!(apply_landing_block(&mut motion, slime, &palette));
        assert_eq!(motion.y, 0.5);
        assert_eq!(motion.x, 0.1);
    }

    #[test]
    fn cobweb_scales_then_zeroes_motion() {
        let mut world = stone_floor();
        world.set(BlockPos::new(0, 0, 0), 3);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::pig(2, DVec3::new(0.5, 0.0, 0.5));
        vehicle.state_mut().motion = Vec3::new(0.2, 0.0, 0.2);
        fixture.run_tick(&mut vehicle);

        // Scaled movement happened, then the residual was discarded.
        let moved = vehicle.state().position().x - 0.5;
        assert!((moved - 0.2 * 0.98 * 0.25).abs() < 1e-6);
        assert_eq!(vehicle.state().motion.x, 0.0);
        assert_eq!(vehicle.state().motion.z, 0.0);
    }

    #[test]
    fn weaving_rider_ignores_cobwebs() {
        let mut world = stone_floor();
        world.set(BlockPos::new(0, 0, 0), 3);
        let mut fixture = Fixture::new(palette(), world);
        fixture.effects.set_effect(crate::session::Effect::Weaving, 0);

        let mut vehicle = Vehicle::pig(2, DVec3::new(0.5, 0.0, 0.5));
        vehicle.state_mut().motion = Vec3::new(0.2, 0.0, 0.0);
        fixture.run_tick(&mut vehicle);

        let moved = vehicle.state().position().x - 0.5;
        assert!((moved - 0.2 * 0.98).abs() < 1e-6);
        assert!(vehicle.state().motion.x > 0.0);
    }

    #[test]
    fn water_applies_drag_after_the_move() {
        let mut world = MapWorld::new();
        world.fill(BlockPos::new(-3, -1, -3), BlockPos::new(3, -1, 3), 1);
        world.fill(BlockPos::new(-3, 0, -3), BlockPos::new(3, 2, 3), 4);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::pig(2, DVec3::new(0.5, 0.0, 0.5));
        vehicle.state_mut().motion = Vec3::new(0.5, 0.0, 0.0);
        fixture.run_tick(&mut vehicle);

        let expected = 0.5 * 0.98 * 0.8;
        assert!((vehicle.state().motion.x - expected).abs() < 1e-6);
        assert!(vehicle.state().motion.y < 0.0);
    }

    #[test]
    fn horse_steps_up_a_full_block() {
        let mut world = stone_floor();
        world.fill(BlockPos::new(-2, 0, 2), BlockPos::new(2, 0, 2), 1);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::horse(3, DVec3::new(0.5, 0.0, 0.5));
        vehicle.state_mut().on_ground = true;
        vehicle.state_mut().motion = Vec3::new(0.0, -0.1, 1.2);
        fixture.run_tick(&mut vehicle);

        assert!((vehicle.state().position().y - 1.0).abs() < 1e-9);
        assert!(vehicle.state().position().z > 1.5);
        assert!(vehicle.state().on_ground);
    }

    #[test]
    fn low_step_height_cannot_clear_a_full_block() {
        let mut world = stone_floor();
        world.fill(BlockPos::new(-2, 0, 2), BlockPos::new(2, 0, 2), 1);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::pig(2, DVec3::new(0.5, 0.0, 0.5));
        vehicle.state_mut().on_ground = true;
        vehicle.state_mut().motion = Vec3::new(0.0, 0.0, 1.2);
        fixture.run_tick(&mut vehicle);

        assert_eq!(vehicle.state().position().y, 0.0);
        assert!((vehicle.state().position().z - (0.5 + 2.0 - 0.45 - 0.5)).abs() < 1e-9);
        assert_eq!(vehicle.state().motion.z, 0.0);
    }

    #[test]
    fn honey_slide_caps_the_fall() {
        let mut state = VehicleState::new(9, DVec3::ZERO, mounts::PIG_PROFILE);
        state.motion = Vec3::new(0.2, -0.2, 0.1);
        slide_down_honey(&mut state);
        assert_eq!(state.motion, Vec3::new(0.05, -0.05, 0.025));

        // Grounded vehicles and slow falls are unaffected.
        state.motion = Vec3::new(0.2, -0.05, 0.0);
        slide_down_honey(&mut state);
        assert_eq!(state.motion, Vec3::new(0.2, -0.05, 0.0));
    }

    #[test]
    fn bubble_columns_push_and_pull() {
        let mut state = VehicleState::new(9, DVec3::ZERO, mounts::PIG_PROFILE);
        bubble_column_drag(&mut state, false);
        assert_eq!(state.motion.y, 0.06);
        for _ in 0..20 {
            bubble_column_drag(&mut state, false);
        }
        assert_eq!(state.motion.y, 0.7);

        state.motion.y = 0.0;
        for _ in 0..20 {
            bubble_column_drag(&mut state, true);
        }
        assert_eq!(state.motion.y, -0.3);
    }

    #[test]
    fn climbing_clamps_horizontal_speed() {
        let clamped = climbing_speed(Vec3::new(0.4, -0.5, -0.4), false);
        assert_eq!(clamped, Vec3::new(0.15, -0.15, -0.15));
        let against_wall = climbing_speed(Vec3::new(0.0, -0.5, 0.0), true);
        assert_eq!(against_wall.y, 0.2);
    }

    #[test]
    fn strider_bobs_when_submerged_in_lava() {
        let mut world = MapWorld::new();
        world.fill(BlockPos::new(-3, -1, -3), BlockPos::new(3, -1, 3), 1);
        world.fill(BlockPos::new(-3, 0, -3), BlockPos::new(3, 0, 3), 5);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::strider(4, DVec3::new(0.5, 0.2, 0.5));
        fixture.run_tick(&mut vehicle);

        assert!(vehicle.state().position().y > 0.2);
    }

    #[test]
    fn strider_stands_on_the_lava_surface() {
        let mut world = MapWorld::new();
        world.fill(BlockPos::new(-3, -1, -3), BlockPos::new(3, -1, 3), 1);
        world.fill(BlockPos::new(-3, 0, -3), BlockPos::new(3, 0, 3), 5);
        let mut fixture = Fixture::new(palette(), world);

        let mut vehicle = Vehicle::strider(4, DVec3::new(0.5, 0.5, 0.5));
        // The first tick only accrues gravity; the second settles onto the
        // substituted lava surface.
        fixture.run_tick(&mut vehicle);
        fixture.run_tick(&mut vehicle);

        assert!(vehicle.state().on_ground);
        assert!((vehicle.state().position().y - 0.5).abs() < 1e-9);
    }
}
