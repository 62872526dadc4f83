//! Per-session facade: one rider, at most one simulated vehicle, the piston
//! cache, and the world border, advanced together once per game tick.

use crossbeam::channel::{self, Receiver, Sender};
use glam::{DVec3, Vec2};
use ob_protocol::bedrock::UpstreamPacket;
use ob_protocol::java::DownstreamPacket;
use ob_protocol::shared::{BlockPos, Direction};
use ob_world::palette::{BlockId, BlockPalette};
use ob_world::provider::{WorldView, WorldWrite};
use tracing::info;

use crate::border::WorldBorder;
use crate::bounding_box::BoundingBox;
use crate::piston::{PistonAction, PistonCache};
use crate::vehicle::{Vehicle, VehicleTick};

pub const PLAYER_WIDTH: f64 = 0.6;
pub const PLAYER_HEIGHT: f64 = 1.8;

/// Rider state the engine reads and corrects. The position lives in the
/// bounding box; its bottom center is the reported wire position.
#[derive(Clone, Debug)]
pub struct RiderState {
    pub runtime_id: u64,
    pub bounding_box: BoundingBox,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
    pub on_ground: bool,
    /// Stick input, x strafe and y forward, each in [-1, 1].
    pub input: Vec2,
    pub jumping: bool,
    /// Held mount-jump charge, 0 to 90.
    pub jump_charge: i32,
    pub left_paddle: bool,
    pub right_paddle: bool,
}

impl RiderState {
    pub fn new(runtime_id: u64, position: DVec3) -> RiderState {
        RiderState {
            runtime_id,
            bounding_box: BoundingBox::from_bottom_center(position, PLAYER_WIDTH, PLAYER_HEIGHT),
            yaw: 0.0,
            pitch: 0.0,
            head_yaw: 0.0,
            on_ground: false,
            input: Vec2::ZERO,
            jumping: false,
            jump_charge: 0,
            left_paddle: false,
            right_paddle: false,
        }
    }

    pub fn position(&self) -> DVec3 {
        self.bounding_box.bottom_center()
    }
}

/// Status effects that feed into vehicle physics. Leveled effects store
/// amplifier + 1, so the formulas can use the raw value and 0 means absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Levitation,
    SlowFalling,
    JumpBoost,
    Weaving,
}

#[derive(Clone, Debug, Default)]
pub struct EffectCache {
    levitation: u32,
    jump_boost: u32,
    slow_falling: bool,
    weaving: bool,
}

impl EffectCache {
    pub fn set_effect(&mut self, effect: Effect, amplifier: u32) {
        match effect {
            Effect::Levitation => self.levitation = amplifier + 1,
            Effect::JumpBoost => self.jump_boost = amplifier + 1,
            Effect::SlowFalling => self.slow_falling = true,
            Effect::Weaving => self.weaving = true,
        }
    }

    pub fn remove_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Levitation => self.levitation = 0,
            Effect::JumpBoost => self.jump_boost = 0,
            Effect::SlowFalling => self.slow_falling = false,
            Effect::Weaving => self.weaving = false,
        }
    }

    /// Levitation level, amplifier + 1, or 0 without the effect.
    pub fn levitation(&self) -> u32 {
        self.levitation
    }

    /// Jump boost level, amplifier + 1, or 0 without the effect.
    pub fn jump_boost(&self) -> u32 {
        self.jump_boost
    }

    pub fn slow_falling(&self) -> bool {
        self.slow_falling
    }

    pub fn weaving(&self) -> bool {
        self.weaving
    }
}

/// Channel senders toward both protocol sides. Sending never blocks; a
/// closed receiver means the connection is shutting down and the packet is
/// dropped.
#[derive(Clone, Debug)]
pub struct PacketSinks {
    upstream: Sender<UpstreamPacket>,
    downstream: Sender<DownstreamPacket>,
}

impl PacketSinks {
    pub fn new(
        upstream: Sender<UpstreamPacket>,
        downstream: Sender<DownstreamPacket>,
    ) -> PacketSinks {
        PacketSinks {
            upstream,
            downstream,
        }
    }

    /// Fresh unbounded channel pair, mainly for tests and the offline driver.
    pub fn unbounded() -> (
        PacketSinks,
        Receiver<UpstreamPacket>,
        Receiver<DownstreamPacket>,
    ) {
        let (up_tx, up_rx) = channel::unbounded();
        let (down_tx, down_rx) = channel::unbounded();
        (PacketSinks::new(up_tx, down_tx), up_rx, down_rx)
    }

    pub fn send_upstream(&self, packet: UpstreamPacket) {
        self.upstream.send(packet).ok();
    }

    pub fn send_downstream(&self, packet: DownstreamPacket) {
        self.downstream.send(packet).ok();
    }
}

/// One session's physics engine. The connection layer owns it, feeds it
/// packets and input, and calls [`tick`](PhysicsSession::tick) once per game
/// tick.
pub struct PhysicsSession<W> {
    palette: BlockPalette,
    world: W,
    rider: RiderState,
    vehicle: Option<Vehicle>,
    border: WorldBorder,
    pistons: PistonCache,
    effects: EffectCache,
    sinks: PacketSinks,
}

impl<W: WorldView + WorldWrite> PhysicsSession<W> {
    pub fn new(
        palette: BlockPalette,
        world: W,
        runtime_id: u64,
        position: DVec3,
        sinks: PacketSinks,
    ) -> PhysicsSession<W> {
        PhysicsSession {
            palette,
            world,
            rider: RiderState::new(runtime_id, position),
            vehicle: None,
            border: WorldBorder::default(),
            pistons: PistonCache::new(),
            effects: EffectCache::default(),
            sinks,
        }
    }

    pub fn rider(&self) -> &RiderState {
        &self.rider
    }

    pub fn rider_mut(&mut self) -> &mut RiderState {
        &mut self.rider
    }

    pub fn vehicle(&self) -> Option<&Vehicle> {
        self.vehicle.as_ref()
    }

    pub fn vehicle_mut(&mut self) -> Option<&mut Vehicle> {
        self.vehicle.as_mut()
    }

    pub fn border(&self) -> &WorldBorder {
        &self.border
    }

    pub fn border_mut(&mut self) -> &mut WorldBorder {
        &mut self.border
    }

    pub fn palette(&self) -> &BlockPalette {
        &self.palette
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn pistons(&self) -> &PistonCache {
        &self.pistons
    }

    /// Refresh stick input ahead of the tick. Components are clamped; the
    /// client is not trusted to stay in range.
    pub fn set_input(&mut self, input: Vec2) {
        self.rider.input = input.clamp(Vec2::splat(-1.0), Vec2::splat(1.0));
    }

    pub fn set_jumping(&mut self, jumping: bool) {
        self.rider.jumping = jumping;
    }

    pub fn set_jump_charge(&mut self, charge: i32) {
        self.rider.jump_charge = charge.clamp(0, 90);
    }

    pub fn set_paddles(&mut self, left: bool, right: bool) {
        self.rider.left_paddle = left;
        self.rider.right_paddle = right;
    }

    pub fn set_effect(&mut self, effect: Effect, amplifier: u32) {
        self.effects.set_effect(effect, amplifier);
    }

    pub fn remove_effect(&mut self, effect: Effect) {
        self.effects.remove_effect(effect);
    }

    /// Take over simulation of a vehicle. The connection layer calls this
    /// only for vehicles the client steers.
    pub fn mount(&mut self, vehicle: Vehicle) {
        info!(
            "riding {} (runtime id {})",
            vehicle.name(),
            vehicle.state().runtime_id
        );
        self.vehicle = Some(vehicle);
    }

    pub fn dismount(&mut self) {
        if let Some(vehicle) = self.vehicle.take() {
            info!(
                "dismounted {} (runtime id {})",
                vehicle.name(),
                vehicle.state().runtime_id
            );
        }
    }

    /// Boost event for the current mount (pig and strider style). Ignored by
    /// mounts that cannot boost.
    pub fn start_boost(&mut self, duration: i32) {
        if let Some(vehicle) = self.vehicle.as_mut() {
            vehicle.start_boost(duration);
        }
    }

    /// Java-side piston event. Safe to call from the packet path while the
    /// tick runs elsewhere.
    pub fn piston_event(&mut self, position: BlockPos, facing: Direction, action: PistonAction) {
        self.pistons.lock().apply_event(
            position,
            facing,
            action,
            &self.rider,
            &self.palette,
            &mut self.world,
            &self.sinks,
        );
    }

    /// Piston event with the moved blocks already resolved by the server
    /// platform.
    pub fn piston_event_with_blocks(
        &mut self,
        position: BlockPos,
        facing: Direction,
        action: PistonAction,
        attached: Vec<(BlockPos, BlockId)>,
    ) {
        self.pistons.lock().apply_event_with_blocks(
            position,
            facing,
            action,
            attached,
            &self.rider,
            &self.palette,
            &mut self.world,
            &self.sinks,
        );
    }

    /// One game tick: border resize and wall, piston strokes, then the
    /// vehicle. Always completes; lookup failures degrade per block.
    pub fn tick(&mut self) {
        self.border
            .tick(self.rider.bounding_box.bottom_center(), &self.sinks);
        self.pistons
            .lock()
            .tick(&mut self.rider, &self.palette, &mut self.world, &self.sinks);
        if let Some(vehicle) = self.vehicle.as_mut() {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_clamped_to_the_stick_range() {
        let (sinks, _up, _down) = PacketSinks::unbounded();
        let mut session = PhysicsSession::new(
            BlockPalette::default(),
            ob_world::provider::MapWorld::new(),
            1,
            DVec3::ZERO,
            sinks,
        );
        session.set_input(Vec2::new(4.0, -2.5));
        assert_eq!(session.rider().input, Vec2::new(1.0, -1.0));
        session.set_jump_charge(500);
        assert_eq!(session.rider().jump_charge, 90);
    }

    #[test]
    fn leveled_effects_store_amplifier_plus_one() {
        let mut effects = EffectCache::default();
        assert_eq!(effects.levitation(), 0);
        effects.set_effect(Effect::Levitation, 1);
        assert_eq!(effects.levitation(), 2);
        effects.set_effect(Effect::Weaving, 0);
        assert!(effects.weaving());
        effects.remove_effect(Effect::Levitation);
        effects.remove_effect(Effect::Weaving);
        assert_eq!(effects.levitation(), 0);
        assert!(!effects.weaving());
    }
}
