//! Piston strokes and the blocks they carry.
//!
//! The Java server only announces that a piston fired; the arm sweep, the
//! moving-block placeholders, and the rider shoves all have to be replayed
//! here so the client sees the same motion the server resolved.

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::{DVec3, Vec3};
use ob_protocol::bedrock::{
    MoveMode, MovePlayer, MovingBlockUpdate, PistonArmState, PistonArmUpdate, SetEntityMotion,
    UpdateBlock, UpstreamPacket, UPDATE_BLOCK_NEIGHBORS, UPDATE_BLOCK_NETWORK,
};
use ob_protocol::java::{DownstreamPacket, PlayerPosition};
use ob_protocol::shared::{Axis, BlockPos, Direction};
use ob_world::palette::{AIR, BlockId, BlockPalette};
use ob_world::provider::{WorldView, WorldWrite};
use ob_world::shapes::{self, Aabb};
use tracing::error;

use crate::bounding_box::BoundingBox;
use crate::collision::{COLLISION_TOLERANCE, CollisionWorld, PLAYER_STEP_UP};
use crate::session::{PacketSinks, RiderState};

/// Ticks a finished stroke keeps its placeholders so rider collisions settle.
const REMOVAL_DELAY: u32 = 5;

/// A stroke moves at most this many blocks; one more and nothing moves.
const ATTACHED_BLOCK_LIMIT: usize = 12;

/// Net rider displacement is capped to half a block (and change) per axis per
/// tick.
const MAX_DISPLACEMENT: f64 = 0.51;

/// Region above a honey block where a grounded rider sticks to it.
const HONEY_ATTACH: Aabb = Aabb::new(
    DVec3::new(0.0625, shapes::HONEY_HEIGHT, 0.0625),
    DVec3::new(0.9375, 1.5, 0.9375),
);

/// Owner marker on a moving-block tag that tells the client the block has
/// detached from its piston.
const DETACHED: BlockPos = BlockPos { x: 0, y: -1, z: 0 };

/// What a piston event asked the arm to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PistonAction {
    Pushing,
    Pulling,
    /// An extension interrupted before completing; the arm snaps back.
    CancelledMidPush,
}

/// One piston arm mid-stroke, with the blocks it carries.
#[derive(Clone, Debug)]
pub struct PistonBlockEntity {
    position: BlockPos,
    orientation: Direction,
    sticky: bool,
    action: PistonAction,
    /// Carried blocks keyed by the position they started from.
    attached: HashMap<BlockPos, BlockId>,
    placed_final_blocks: bool,
    progress: f32,
    last_progress: f32,
    time_since_completion: u32,
}

impl PistonBlockEntity {
    fn new(
        position: BlockPos,
        orientation: Direction,
        sticky: bool,
        extended: bool,
    ) -> PistonBlockEntity {
        let (action, progress) = if extended {
            (PistonAction::Pushing, 1.0)
        } else {
            (PistonAction::Pulling, 0.0)
        };
        PistonBlockEntity {
            position,
            orientation,
            sticky,
            action,
            attached: HashMap::new(),
            placed_final_blocks: true,
            progress,
            last_progress: progress,
            time_since_completion: 0,
        }
    }

    pub fn position(&self) -> BlockPos {
        self.position
    }

    pub fn action(&self) -> PistonAction {
        self.action
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Direction the carried blocks travel. Pulling drags them back toward
    /// the base.
    fn movement_direction(&self) -> Direction {
        if self.action == PistonAction::Pulling {
            self.orientation.opposite()
        } else {
            self.orientation
        }
    }

    fn movement(&self) -> DVec3 {
        self.movement_direction().unit_vector()
    }

    /// Where the arm head starts its sweep.
    fn head_pos(&self) -> BlockPos {
        if self.action == PistonAction::Pushing {
            self.position
        } else {
            self.position.shift(self.orientation)
        }
    }

    pub fn is_done(&self) -> bool {
        match self.action {
            PistonAction::Pushing => self.progress == 1.0 && self.last_progress == 1.0,
            PistonAction::Pulling | PistonAction::CancelledMidPush => {
                self.progress == 0.0 && self.last_progress == 0.0
            }
        }
    }

    fn can_be_removed(&self) -> bool {
        self.is_done() && self.time_since_completion > REMOVAL_DELAY
    }

    fn update_progress(&mut self) {
        self.last_progress = self.progress;
        match self.action {
            PistonAction::Pushing => self.progress = (self.progress + 0.5).min(1.0),
            PistonAction::Pulling | PistonAction::CancelledMidPush => {
                self.progress = (self.progress - 0.5).max(0.0);
            }
        }
    }

    fn state(&self) -> PistonArmState {
        match self.action {
            PistonAction::Pushing => {
                if self.is_done() {
                    PistonArmState::Extended
                } else {
                    PistonArmState::Extending
                }
            }
            PistonAction::Pulling => {
                if self.is_done() {
                    PistonArmState::Retracted
                } else {
                    PistonArmState::Retracting
                }
            }
            PistonAction::CancelledMidPush => {
                if self.progress == 1.0 {
                    PistonArmState::Extended
                } else if self.is_done() {
                    PistonArmState::Retracted
                } else {
                    PistonArmState::Extended
                }
            }
        }
    }

    pub fn arm_update(&self) -> PistonArmUpdate {
        PistonArmUpdate {
            position: self.position,
            progress: self.progress,
            last_progress: self.last_progress,
            state: self.state(),
            sticky: self.sticky,
            attached: self.attached.keys().copied().collect(),
        }
    }

    /// Block id carried at `pos`; the head position carries the arm head.
    fn attached_block_id(&self, pos: BlockPos, palette: &BlockPalette) -> BlockId {
        if pos == self.head_pos() {
            palette.piston_head(self.orientation)
        } else {
            self.attached.get(&pos).copied().unwrap_or(AIR)
        }
    }

    /// World position of the carried block at the arm's current sweep point.
    fn instantaneous_position(&self, pos: BlockPos) -> DVec3 {
        let movement_progress = match self.action {
            PistonAction::Pushing => self.progress,
            PistonAction::Pulling | PistonAction::CancelledMidPush => 1.0 - self.progress,
        };
        pos.min_corner() + self.movement() * movement_progress as f64
    }

    /// Clip `movement` against the carried block's shape at its instantaneous
    /// position.
    fn moving_block_offset(
        &self,
        pos: BlockPos,
        bounding_box: &BoundingBox,
        axis: Axis,
        movement: f64,
        palette: &BlockPalette,
    ) -> f64 {
        let state = palette.get(self.attached_block_id(pos, palette));
        let mut boxes = Vec::new();
        shapes::local_collision_boxes(state.shape, state.facing(), &mut boxes);
        if boxes.is_empty() {
            return movement;
        }
        let origin = self.instantaneous_position(pos);
        let mut offset = movement;
        for b in &boxes {
            offset = bounding_box.max_offset(&b.offset(origin), axis, offset);
            if offset.abs() < COLLISION_TOLERANCE {
                return 0.0;
            }
        }
        offset
    }

    fn moving_block_intersects(
        &self,
        pos: BlockPos,
        bounding_box: &BoundingBox,
        palette: &BlockPalette,
    ) -> bool {
        let state = palette.get(self.attached_block_id(pos, palette));
        let mut boxes = Vec::new();
        shapes::local_collision_boxes(state.shape, state.facing(), &mut boxes);
        let origin = self.instantaneous_position(pos);
        boxes.iter().any(|b| bounding_box.intersects(&b.offset(origin)))
    }

    /// Breadth-first walk from the face of the piston, following sticky
    /// attachments, to find every block this stroke moves.
    fn find_affected_blocks<W>(&mut self, palette: &BlockPalette, world: &mut W, sinks: &PacketSinks)
    where
        W: WorldView + WorldWrite,
    {
        let mut checked: HashSet<BlockPos> = HashSet::new();
        let mut queue: VecDeque<BlockPos> = VecDeque::new();

        checked.insert(self.position);
        match self.action {
            PistonAction::Pulling => {
                checked.insert(self.head_pos());
                queue.push_back(self.position.shift_by(self.orientation, 2));
            }
            PistonAction::Pushing => {
                // Clear lingering heads before they join the search.
                self.remove_piston_head(palette, world, sinks);
                queue.push_back(self.position.shift(self.orientation));
            }
            PistonAction::CancelledMidPush => {}
        }

        let movement = self.movement_direction();
        let mut move_blocks = true;
        while self.attached.len() <= ATTACHED_BLOCK_LIMIT {
            let Some(pos) = queue.pop_front() else {
                break;
            };
            if !checked.insert(pos) {
                continue;
            }
            let id = world.block_at(pos);
            if id == AIR {
                continue;
            }
            if palette.can_piston_move_block(id, self.action == PistonAction::Pushing) {
                self.attached.insert(pos, id);
                if palette.is_block_sticky(id) {
                    // Slime and honey drag their neighbors along.
                    for direction in Direction::all() {
                        if direction == movement {
                            continue;
                        }
                        let adjacent_pos = pos.shift(direction);
                        if adjacent_pos == self.position {
                            continue;
                        }
                        if self.action == PistonAction::Pulling
                            && adjacent_pos == self.position.shift(self.orientation)
                        {
                            continue;
                        }
                        let adjacent_id = world.block_at(adjacent_pos);
                        if adjacent_id != AIR
                            && palette.is_block_attached(id, adjacent_id)
                            && palette.can_piston_move_block(adjacent_id, false)
                        {
                            if palette.is_block_sticky(adjacent_id) {
                                queue.push_back(adjacent_pos);
                            } else {
                                self.attached.insert(adjacent_pos, adjacent_id);
                                checked.insert(adjacent_pos);
                                queue.push_back(adjacent_pos.shift(movement));
                            }
                        }
                    }
                }
                queue.push_back(pos.shift(movement));
            } else if !palette.can_piston_destroy_block(id) {
                // An immovable block stops the whole stroke.
                move_blocks = false;
                break;
            }
        }
        if !move_blocks || self.attached.len() > ATTACHED_BLOCK_LIMIT {
            self.attached.clear();
        }
    }

    fn remove_piston_head<W>(&self, palette: &BlockPalette, world: &mut W, sinks: &PacketSinks)
    where
        W: WorldView + WorldWrite,
    {
        let in_front = self.position.shift(self.orientation);
        if palette.is_piston_head(world.block_at(in_front)) {
            update_world_block(world, sinks, in_front, AIR);
        }
    }

    /// Swap every carried block out of the world for the duration of the
    /// stroke.
    fn remove_blocks<W>(&self, palette: &BlockPalette, world: &mut W, sinks: &PacketSinks)
    where
        W: WorldView + WorldWrite,
    {
        for &pos in self.attached.keys() {
            update_world_block(world, sinks, pos, AIR);
        }
        if self.action != PistonAction::Pushing {
            self.remove_piston_head(palette, world, sinks);
        }
    }

    /// Settle carried blocks into their final positions. Blocks overlapping
    /// the rider are left to the server's own updates so the rider does not
    /// clip into them.
    fn place_final_blocks<W>(
        &mut self,
        rider_box: &BoundingBox,
        palette: &BlockPalette,
        world: &mut W,
        sinks: &PacketSinks,
    ) where
        W: WorldView + WorldWrite,
    {
        if self.placed_final_blocks {
            return;
        }
        self.placed_final_blocks = true;

        let movement = self.movement_direction();
        for (&pos, &id) in self.attached.iter() {
            let final_pos = pos.shift(movement);
            sinks.send_upstream(UpstreamPacket::MovingBlock(MovingBlockUpdate {
                position: final_pos,
                moved_block: id,
                piston: DETACHED,
            }));
            if !rider_box.intersects(&Aabb::unit_cube(final_pos.min_corner())) {
                update_world_block(world, sinks, final_pos, id);
            }
        }
        if self.action == PistonAction::Pushing {
            let head_pos = self.head_pos().shift(movement);
            if !rider_box.intersects(&Aabb::unit_cube(head_pos.min_corner())) {
                update_world_block(world, sinks, head_pos, palette.piston_head(self.orientation));
            }
        }
    }
}

/// Active piston strokes for one session, plus the rider displacement they
/// accumulated this tick.
#[derive(Debug, Default)]
pub struct Pistons {
    pistons: HashMap<BlockPos, PistonBlockEntity>,
    /// Original position of each block in transit, mapped to its piston.
    moving_blocks: HashMap<BlockPos, BlockPos>,
    displacement: DVec3,
    motion: Vec3,
    collided: bool,
    /// Set from shared collision queries when a sweep clips a slime block.
    slime_collision: Cell<bool>,
    attached_to_honey: bool,
}

impl Pistons {
    pub fn is_empty(&self) -> bool {
        self.pistons.is_empty()
    }

    pub fn has_moving_blocks(&self) -> bool {
        !self.moving_blocks.is_empty()
    }

    pub fn get(&self, pos: BlockPos) -> Option<&PistonBlockEntity> {
        self.pistons.get(&pos)
    }

    /// Net rider displacement accumulated this tick.
    pub fn displacement(&self) -> DVec3 {
        self.displacement
    }

    /// Rider launch velocity from slime contact this tick.
    pub fn motion(&self) -> Vec3 {
        self.motion
    }

    pub fn rider_collided(&self) -> bool {
        self.collided
    }

    pub fn slime_collision(&self) -> bool {
        self.slime_collision.get()
    }

    pub fn attached_to_honey(&self) -> bool {
        self.attached_to_honey
    }

    /// Java-side piston event: start or redirect the stroke at `pos`. The
    /// carried blocks are discovered by searching the world.
    pub fn apply_event<W>(
        &mut self,
        pos: BlockPos,
        orientation: Direction,
        action: PistonAction,
        rider: &RiderState,
        palette: &BlockPalette,
        world: &mut W,
        sinks: &PacketSinks,
    ) where
        W: WorldView + WorldWrite,
    {
        self.ensure_piston(pos, orientation, action, palette, world);
        // Repeated events for the action already in flight are echoes.
        if self.pistons.get(&pos).is_some_and(|piston| piston.action == action) {
            return;
        }
        self.start_stroke(pos, action, None, rider, palette, world, sinks);
    }

    /// Piston event with the moved blocks already known; platforms with
    /// direct world access skip the search. Some servers fire the event
    /// several times, so no echo check here.
    pub fn apply_event_with_blocks<W>(
        &mut self,
        pos: BlockPos,
        orientation: Direction,
        action: PistonAction,
        attached: Vec<(BlockPos, BlockId)>,
        rider: &RiderState,
        palette: &BlockPalette,
        world: &mut W,
        sinks: &PacketSinks,
    ) where
        W: WorldView + WorldWrite,
    {
        self.ensure_piston(pos, orientation, action, palette, world);
        self.start_stroke(pos, action, Some(attached), rider, palette, world, sinks);
    }

    fn ensure_piston<W>(
        &mut self,
        pos: BlockPos,
        orientation: Direction,
        action: PistonAction,
        palette: &BlockPalette,
        world: &W,
    ) where
        W: WorldView + WorldWrite,
    {
        if !self.pistons.contains_key(&pos) {
            let sticky = palette.is_sticky_piston(world.block_at(pos));
            let extended = action != PistonAction::Pushing;
            self.pistons
                .insert(pos, PistonBlockEntity::new(pos, orientation, sticky, extended));
        }
    }

    fn start_stroke<W>(
        &mut self,
        pos: BlockPos,
        action: PistonAction,
        adopted: Option<Vec<(BlockPos, BlockId)>>,
        rider: &RiderState,
        palette: &BlockPalette,
        world: &mut W,
        sinks: &PacketSinks,
    ) where
        W: WorldView + WorldWrite,
    {
        // Finish whatever the arm was doing before redirecting it.
        if let Some(piston) = self.pistons.get_mut(&pos) {
            piston.place_final_blocks(&rider.bounding_box, palette, world, sinks);
        }
        self.unmap_moving_blocks(pos);

        let Some(piston) = self.pistons.get_mut(&pos) else {
            return;
        };
        piston.action = action;
        if action == PistonAction::Pushing || (action == PistonAction::Pulling && piston.sticky) {
            match adopted {
                Some(blocks) => {
                    if blocks.len() <= ATTACHED_BLOCK_LIMIT {
                        piston.attached.extend(blocks);
                    }
                }
                None => piston.find_affected_blocks(palette, world, sinks),
            }
            piston.remove_blocks(palette, world, sinks);

            // Register the carried blocks and hand out client placeholders.
            for &moved in piston.attached.keys() {
                self.moving_blocks.insert(moved, pos);
            }
            self.moving_blocks.insert(piston.head_pos(), pos);

            let mut window = rider.bounding_box.clone();
            if piston.orientation == Direction::Up {
                // Catch riders falling onto the rising blocks.
                window.extend(DVec3::new(0.0, -256.0, 0.0));
                window.resize(DVec3::new(0.5, 0.0, 0.5));
            }
            let movement = piston.movement_direction();
            for (&moved, &id) in piston.attached.iter() {
                let new_pos = moved.shift(movement);
                if window.intersects(&Aabb::unit_cube(moved.min_corner()))
                    || window.intersects(&Aabb::unit_cube(new_pos.min_corner()))
                {
                    self.collided = true;
                    if palette.is_slime_block(id) {
                        self.slime_collision.set(true);
                    }
                    // Placeholders overlapping the rider glitch the client
                    // camera, MCPE-96035.
                    continue;
                }
                sinks.send_upstream(UpstreamPacket::MovingBlock(MovingBlockUpdate {
                    position: new_pos,
                    moved_block: id,
                    piston: pos,
                }));
            }
        } else {
            piston.remove_piston_head(palette, world, sinks);
        }
        piston.placed_final_blocks = false;

        // Rewind so zero-tick strokes still animate.
        piston.progress = if action == PistonAction::Pushing { 0.0 } else { 1.0 };
        piston.last_progress = piston.progress;

        sinks.send_upstream(UpstreamPacket::PistonArm(piston.arm_update()));
    }

    fn unmap_moving_blocks(&mut self, pos: BlockPos) {
        let Some(piston) = self.pistons.get_mut(&pos) else {
            return;
        };
        for moved in piston.attached.keys() {
            self.moving_blocks.remove(moved);
        }
        self.moving_blocks.remove(&piston.head_pos());
        piston.attached.clear();
    }

    /// Advance every stroke by half a block, shove the rider clear, then
    /// settle finished strokes.
    pub fn tick<W>(
        &mut self,
        rider: &mut RiderState,
        palette: &BlockPalette,
        world: &mut W,
        sinks: &PacketSinks,
    ) where
        W: WorldView + WorldWrite,
    {
        self.displacement = DVec3::ZERO;
        self.motion = Vec3::ZERO;
        self.collided = false;
        self.slime_collision.set(false);
        self.attached_to_honey = false;

        if self.pistons.is_empty() {
            return;
        }

        let positions: Vec<BlockPos> = self.pistons.keys().copied().collect();
        for &pos in &positions {
            let stroke = {
                let Some(piston) = self.pistons.get_mut(&pos) else {
                    continue;
                };
                if piston.is_done() {
                    piston.time_since_completion += 1;
                    continue;
                }
                piston.time_since_completion = 0;
                piston.update_progress();
                piston.clone()
            };
            self.push_rider(&stroke, rider, palette, &*world);
            sinks.send_upstream(UpstreamPacket::PistonArm(stroke.arm_update()));
        }

        self.send_rider_movement(rider, sinks);
        self.send_rider_motion(rider, sinks);

        // Blocks settle after the rider moved, never before, so the rider is
        // not stuck inside them.
        for &pos in &positions {
            let Some(piston) = self.pistons.get_mut(&pos) else {
                continue;
            };
            if !piston.is_done() {
                continue;
            }
            if piston.time_since_completion == 0 {
                piston.place_final_blocks(&rider.bounding_box, palette, world, sinks);
            }
            if piston.time_since_completion >= REMOVAL_DELAY {
                for moved in piston.attached.keys() {
                    self.moving_blocks.remove(moved);
                }
                self.moving_blocks.remove(&piston.head_pos());
                piston.attached.clear();
            }
        }

        self.pistons.retain(|_, piston| !piston.can_be_removed());

        if self.pistons.is_empty() && !self.moving_blocks.is_empty() {
            error!("moving block map has de-synced");
            for (moved, owner) in &self.moving_blocks {
                error!(
                    "moving block at {:?} was previously owned by the piston at {:?}",
                    moved, owner
                );
            }
            self.moving_blocks.clear();
        }
    }

    /// Shove the rider clear of the arm head and every carried block.
    fn push_rider(
        &mut self,
        piston: &PistonBlockEntity,
        rider: &mut RiderState,
        palette: &BlockPalette,
        world: &dyn WorldView,
    ) {
        let block_movement = match piston.action {
            PistonAction::Pushing => piston.last_progress as f64,
            PistonAction::Pulling | PistonAction::CancelledMidPush => {
                1.0 - piston.last_progress as f64
            }
        };

        // Shrink the box across the push axis so blocks the rider is pressed
        // against do not read as contacts.
        let shrink =
            (DVec3::ONE - piston.orientation.unit_vector().abs()) * (2.0 * COLLISION_TOLERANCE);
        rider.bounding_box.resize(-shrink);

        let head_id = palette.piston_head(piston.orientation);
        self.push_rider_block(
            piston,
            head_id,
            piston.head_pos().min_corner(),
            block_movement,
            rider,
            palette,
            world,
        );

        // Slime goes last so a slime block covered by other blocks cannot
        // launch the rider.
        for (&pos, &id) in piston.attached.iter() {
            if !palette.is_slime_block(id) {
                self.push_rider_block(
                    piston,
                    id,
                    pos.min_corner(),
                    block_movement,
                    rider,
                    palette,
                    world,
                );
            }
        }
        for (&pos, &id) in piston.attached.iter() {
            if palette.is_slime_block(id) {
                self.push_rider_block(
                    piston,
                    id,
                    pos.min_corner(),
                    block_movement,
                    rider,
                    palette,
                    world,
                );
            }
        }

        rider.bounding_box.resize(shrink);
    }

    fn push_rider_block(
        &mut self,
        piston: &PistonBlockEntity,
        id: BlockId,
        start: DVec3,
        block_movement: f64,
        rider: &mut RiderState,
        palette: &BlockPalette,
        world: &dyn WorldView,
    ) {
        let movement = piston.movement();

        // The rider overlaps where the block will land.
        let final_pos = start + movement;
        if rider.bounding_box.intersects(&Aabb::unit_cube(final_pos)) {
            self.collided = true;
            if palette.is_slime_block(id) {
                self.slime_collision.set(true);
                self.apply_slime_motion(piston, final_pos, rider.bounding_box.middle());
            }
        }

        let block_pos = start + movement * block_movement;
        if palette.is_honey_block(id) && rider_attached_to_honey(piston, rider, block_pos) {
            self.collided = true;
            self.attached_to_honey = true;
            let delta = (piston.progress - piston.last_progress).abs() as f64;
            self.displace_rider(movement * delta, rider, palette, world);
        } else {
            let state = palette.get(id);
            let mut boxes = Vec::new();
            shapes::local_collision_boxes(state.shape, state.facing(), &mut boxes);
            if boxes.is_empty() {
                return;
            }
            let extend = movement * (1.0 - block_movement).min(0.5);
            let intersection = block_intersection(
                &boxes,
                block_pos,
                extend,
                &rider.bounding_box,
                piston.movement_direction(),
            );
            if intersection > 0.0 {
                self.collided = true;
                self.displace_rider(movement * (intersection + 0.01), rider, palette, world);

                if palette.is_slime_block(id) {
                    self.slime_collision.set(true);
                    self.apply_slime_motion(piston, block_pos, rider.bounding_box.middle());
                }
            }
        }
    }

    /// Launch velocity for a rider on the pushing side of a slime block.
    fn apply_slime_motion(
        &mut self,
        piston: &PistonBlockEntity,
        block_pos: DVec3,
        rider_middle: DVec3,
    ) {
        let direction = piston.movement_direction();
        let movement = piston.movement().as_vec3();
        let center = block_pos + DVec3::splat(0.5);

        let mut motion = self.motion;
        match direction {
            Direction::Down if rider_middle.y < center.y => motion.y = movement.y,
            Direction::Up if rider_middle.y > center.y => motion.y = movement.y,
            Direction::North if rider_middle.z < center.z => motion.z = movement.z,
            Direction::South if rider_middle.z > center.z => motion.z = movement.z,
            Direction::West if rider_middle.x < center.x => motion.x = movement.x,
            Direction::East if rider_middle.x > center.x => motion.x = movement.x,
            _ => {}
        }
        self.motion = motion;
    }

    /// Accumulate displacement on the rider, clamped per axis per tick,
    /// moving the box only as far as collision allows.
    fn displace_rider(
        &mut self,
        displacement: DVec3,
        rider: &mut RiderState,
        palette: &BlockPalette,
        world: &dyn WorldView,
    ) {
        let total = (self.displacement + displacement).clamp(
            DVec3::splat(-MAX_DISPLACEMENT),
            DVec3::splat(MAX_DISPLACEMENT),
        );
        let delta = total - self.displacement;

        // The push may be driving the rider into other collision.
        let scene = CollisionWorld::with_pistons(palette, world, self);
        let corrected =
            scene.correct_movement(delta, &rider.bounding_box, rider.on_ground, PLAYER_STEP_UP, true, false);
        rider.bounding_box.translate(corrected);

        self.displacement = total;
    }

    fn send_rider_movement(&self, rider: &mut RiderState, sinks: &PacketSinks) {
        // A slime launch reports through motion instead.
        if self.displacement == DVec3::ZERO || self.motion != Vec3::ZERO {
            return;
        }
        let on_ground = self.displacement.y > 0.0 || rider.on_ground;
        rider.on_ground = on_ground;
        let position = rider.bounding_box.bottom_center();

        sinks.send_upstream(UpstreamPacket::MovePlayer(MovePlayer {
            runtime_id: rider.runtime_id,
            position: position.as_vec3(),
            pitch: rider.pitch,
            yaw: rider.yaw,
            head_yaw: rider.head_yaw,
            mode: MoveMode::Teleport,
            on_ground,
        }));
        sinks.send_downstream(DownstreamPacket::PlayerPosition(PlayerPosition {
            position,
            yaw: rider.yaw,
            pitch: rider.pitch,
            on_ground,
        }));
    }

    fn send_rider_motion(&self, rider: &RiderState, sinks: &PacketSinks) {
        if self.motion == Vec3::ZERO {
            return;
        }
        sinks.send_upstream(UpstreamPacket::SetMotion(SetEntityMotion {
            runtime_id: rider.runtime_id,
            motion: self.motion,
        }));
    }

    /// Clip `offset` against the block in transit at `pos`, if any.
    pub fn collision_offset(
        &self,
        pos: BlockPos,
        bounding_box: &BoundingBox,
        axis: Axis,
        offset: f64,
        palette: &BlockPalette,
    ) -> f64 {
        let Some(owner) = self.moving_blocks.get(&pos) else {
            return offset;
        };
        let Some(piston) = self.pistons.get(owner) else {
            return offset;
        };
        let adjusted = piston.moving_block_offset(pos, bounding_box, axis, offset, palette);
        if adjusted != offset && palette.is_slime_block(piston.attached_block_id(pos, palette)) {
            self.slime_collision.set(true);
        }
        adjusted
    }

    /// Whether the block in transit at `pos`, if any, overlaps the box.
    pub fn check_collision(
        &self,
        pos: BlockPos,
        bounding_box: &BoundingBox,
        palette: &BlockPalette,
    ) -> bool {
        let Some(owner) = self.moving_blocks.get(&pos) else {
            return false;
        };
        let Some(piston) = self.pistons.get(owner) else {
            return false;
        };
        piston.moving_block_intersects(pos, bounding_box, palette)
    }
}

/// Piston state shared between the tick driver and the packet path; events
/// can land while another thread is mid-tick.
#[derive(Debug, Default)]
pub struct PistonCache {
    inner: Mutex<Pistons>,
}

impl PistonCache {
    pub fn new() -> PistonCache {
        PistonCache::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Pistons> {
        // A poisoned lock still holds consistent stroke state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deepest rider overlap with the block's swept boxes, measured along the
/// push direction. Overlaps deeper from the far side do not count, so riders
/// ahead of the block are pushed and riders behind it are left alone.
fn block_intersection(
    boxes: &[Aabb],
    block_pos: DVec3,
    extend: DVec3,
    bounding_box: &BoundingBox,
    direction: Direction,
) -> f64 {
    let opposite = direction.opposite();
    let mut max_intersection: f64 = 0.0;
    for b in boxes {
        let swept = b.extend(extend).offset(block_pos);
        if bounding_box.intersects(&swept) {
            let intersection = bounding_box.intersection_size(&swept, direction);
            let opposite_intersection = bounding_box.intersection_size(&swept, opposite);
            if intersection < opposite_intersection {
                max_intersection = max_intersection.max(intersection);
            }
        }
    }
    max_intersection
}

fn rider_attached_to_honey(
    piston: &PistonBlockEntity,
    rider: &RiderState,
    block_pos: DVec3,
) -> bool {
    if !piston.orientation.is_horizontal() {
        return false;
    }
    rider.on_ground && rider.bounding_box.intersects(&HONEY_ATTACH.offset(block_pos))
}

fn update_world_block<W>(world: &mut W, sinks: &PacketSinks, pos: BlockPos, id: BlockId)
where
    W: WorldWrite,
{
    world.set_block(pos, id);
    sinks.send_upstream(UpstreamPacket::UpdateBlock(UpdateBlock {
        position: pos,
        block: id,
        layer: 0,
        flags: UPDATE_BLOCK_NEIGHBORS | UPDATE_BLOCK_NETWORK,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_world::palette::BlockState;
    use ob_world::provider::MapWorld;
    use ob_world::shapes::Shape;

    fn palette() -> BlockPalette {
        BlockPalette::new(vec![
            BlockState::default(),
            BlockState::solid("minecraft:stone"),
            BlockState {
                shape: Shape::PistonBase,
                facing: Some("east".to_owned()),
                ..BlockState::named("minecraft:piston")
            },
            BlockState {
                shape: Shape::PistonHead,
                facing: Some("east".to_owned()),
                ..BlockState::named("minecraft:piston_head")
            },
            BlockState {
                shape: Shape::PistonBase,
                facing: Some("up".to_owned()),
                ..BlockState::named("minecraft:sticky_piston")
            },
            BlockState {
                shape: Shape::PistonHead,
                facing: Some("up".to_owned()),
                ..BlockState::named("minecraft:piston_head")
            },
            BlockState::solid("minecraft:slime_block"),
            BlockState {
                shape: Shape::Honey,
                ..BlockState::named("minecraft:honey_block")
            },
            BlockState {
                unbreakable: true,
                ..BlockState::solid("minecraft:obsidian")
            },
        ])
    }

    const STONE: BlockId = 1;
    const PISTON_EAST: BlockId = 2;
    const STICKY_PISTON_UP: BlockId = 4;
    const SLIME: BlockId = 6;
    const HONEY: BlockId = 7;
    const OBSIDIAN: BlockId = 8;

    fn floor(world: &mut MapWorld) {
        world.fill(BlockPos::new(-8, -1, -8), BlockPos::new(8, -1, 8), STONE);
    }

    fn rider_at(x: f64, y: f64, z: f64) -> RiderState {
        RiderState::new(1, DVec3::new(x, y, z))
    }

    fn drain_upstream(rx: &crossbeam::channel::Receiver<UpstreamPacket>) -> Vec<UpstreamPacket> {
        rx.try_iter().collect()
    }

    #[test]
    fn extending_piston_pushes_a_standing_rider() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        let (sinks, up_rx, down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let mut rider = rider_at(1.3, 0.0, 0.5);
        rider.on_ground = true;
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::East,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );
        drain_upstream(&up_rx);

        pistons.tick(&mut rider, &palette, &mut world, &sinks);

        // The arm plate sweeps half a block; the rider ends up just past it.
        assert!((pistons.displacement().x - 0.51).abs() < 1e-9);
        assert_eq!(pistons.displacement().y, 0.0);
        assert!(pistons.rider_collided());
        assert!((rider.bounding_box.bottom_center().x - 1.81).abs() < 1e-9);

        let packets = drain_upstream(&up_rx);
        let moved = packets.iter().any(|p| {
            matches!(p, UpstreamPacket::MovePlayer(m)
                if m.mode == MoveMode::Teleport && m.on_ground)
        });
        assert!(moved, "expected a corrected-position report, got {packets:?}");
        let reported = down_rx
            .try_iter()
            .any(|p| matches!(p, DownstreamPacket::PlayerPosition(_)));
        assert!(reported);
    }

    #[test]
    fn stroke_lifecycle_cleans_up_both_maps() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        world.set(BlockPos::new(1, 0, 0), STONE);
        let (sinks, _up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let mut rider = rider_at(4.5, 0.0, 4.5);
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::East,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );
        assert!(pistons.has_moving_blocks());
        // The carried block leaves the world for the duration of the stroke.
        assert_eq!(world.block_at(BlockPos::new(1, 0, 0)), AIR);

        for _ in 0..16 {
            pistons.tick(&mut rider, &palette, &mut world, &sinks);
            assert!(
                !(pistons.is_empty() && pistons.has_moving_blocks()),
                "orphaned moving blocks"
            );
        }

        assert!(pistons.is_empty());
        assert!(!pistons.has_moving_blocks());
        // The stone settled one block further east, with the head behind it.
        assert_eq!(world.block_at(BlockPos::new(2, 0, 0)), STONE);
        assert_eq!(
            world.block_at(BlockPos::new(1, 0, 0)),
            palette.piston_head(Direction::East)
        );
    }

    #[test]
    fn slime_block_launches_the_rider_upward() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), STICKY_PISTON_UP);
        world.set(BlockPos::new(0, 1, 0), SLIME);
        let (sinks, up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        // Standing on top of the slime block.
        let mut rider = rider_at(0.5, 2.0, 0.5);
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::Up,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );
        drain_upstream(&up_rx);

        pistons.tick(&mut rider, &palette, &mut world, &sinks);

        assert!(pistons.slime_collision());
        assert_eq!(pistons.motion(), Vec3::new(0.0, 1.0, 0.0));
        let launched = drain_upstream(&up_rx).iter().any(|p| {
            matches!(p, UpstreamPacket::SetMotion(m) if m.motion.y == 1.0)
        });
        assert!(launched);
    }

    #[test]
    fn honey_block_drags_a_grounded_rider_sideways() {
        let palette = palette();
        let mut world = MapWorld::new();
        // Unbreakable floor so the honey block cannot stick to it.
        world.fill(BlockPos::new(-8, -1, -8), BlockPos::new(8, -1, 8), OBSIDIAN);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        world.set(BlockPos::new(1, 0, 0), HONEY);
        let (sinks, _up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        // On top of the honey block, far enough east that the arm plate
        // sweep cannot reach the rider on its own.
        let mut rider = rider_at(1.9, 0.9375, 0.5);
        rider.on_ground = true;
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::East,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );

        pistons.tick(&mut rider, &palette, &mut world, &sinks);

        assert!(pistons.attached_to_honey());
        assert!((pistons.displacement().x - 0.5).abs() < 1e-9);
        assert!((rider.bounding_box.bottom_center().x - 2.4).abs() < 1e-9);
    }

    #[test]
    fn immovable_block_stops_the_stroke() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        world.set(BlockPos::new(1, 0, 0), STONE);
        world.set(BlockPos::new(2, 0, 0), OBSIDIAN);
        let (sinks, _up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let rider = rider_at(4.5, 0.0, 4.5);
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::East,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );

        // Nothing moves; only the head position is tracked for the sweep.
        assert_eq!(world.block_at(BlockPos::new(1, 0, 0)), STONE);
        assert_eq!(world.block_at(BlockPos::new(2, 0, 0)), OBSIDIAN);
        let piston = pistons.get(BlockPos::new(0, 0, 0)).unwrap();
        assert!(piston.arm_update().attached.is_empty());
    }

    #[test]
    fn attachment_searches_stop_at_the_stroke_limit() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        for x in 1..=12 {
            world.set(BlockPos::new(x, 0, 0), STONE);
        }
        let (sinks, _up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let rider = rider_at(0.5, 4.0, 4.5);
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::East,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );
        let piston = pistons.get(BlockPos::new(0, 0, 0)).unwrap();
        assert_eq!(piston.arm_update().attached.len(), 12);

        // One more block and nothing moves at all.
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        for x in 1..=13 {
            world.set(BlockPos::new(x, 0, 0), STONE);
        }
        let mut pistons = Pistons::default();
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::East,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );
        let piston = pistons.get(BlockPos::new(0, 0, 0)).unwrap();
        assert!(piston.arm_update().attached.is_empty());
        assert_eq!(world.block_at(BlockPos::new(13, 0, 0)), STONE);
    }

    #[test]
    fn falling_rider_lands_on_a_block_in_transit() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), STICKY_PISTON_UP);
        world.set(BlockPos::new(0, 1, 0), STONE);
        let (sinks, _up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let mut rider = rider_at(0.5, 6.0, 0.5);
        pistons.apply_event(
            BlockPos::new(0, 0, 0),
            Direction::Up,
            PistonAction::Pushing,
            &rider,
            &palette,
            &mut world,
            &sinks,
        );
        pistons.tick(&mut rider, &palette, &mut world, &sinks);

        // Stone is half-way between y=1 and y=2; a fall onto it stops at
        // its instantaneous top, not at the world block below.
        let scene = CollisionWorld::with_pistons(&palette, &world, &pistons);
        let falling = rider.bounding_box.clone();
        let out = scene.correct_movement(
            DVec3::new(0.0, -8.0, 0.0),
            &falling,
            false,
            0.0,
            false,
            false,
        );
        assert!((out.y - (2.5 - 6.0)).abs() < 1e-9);
    }

    #[test]
    fn cancelled_stroke_snaps_back_and_retracts() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        let (sinks, _up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let mut rider = rider_at(4.5, 0.0, 4.5);
        let pos = BlockPos::new(0, 0, 0);
        pistons.apply_event(pos, Direction::East, PistonAction::Pushing, &rider, &palette, &mut world, &sinks);
        pistons.tick(&mut rider, &palette, &mut world, &sinks);
        assert_eq!(pistons.get(pos).unwrap().progress(), 0.5);

        pistons.apply_event(pos, Direction::East, PistonAction::CancelledMidPush, &rider, &palette, &mut world, &sinks);
        let piston = pistons.get(pos).unwrap();
        assert_eq!(piston.action(), PistonAction::CancelledMidPush);
        assert_eq!(piston.progress(), 1.0);
        assert_eq!(piston.arm_update().state, PistonArmState::Extended);

        for _ in 0..16 {
            pistons.tick(&mut rider, &palette, &mut world, &sinks);
        }
        assert!(pistons.is_empty());
    }

    #[test]
    fn repeated_events_for_the_same_action_are_ignored() {
        let palette = palette();
        let mut world = MapWorld::new();
        floor(&mut world);
        world.set(BlockPos::new(0, 0, 0), PISTON_EAST);
        let (sinks, up_rx, _down_rx) = PacketSinks::unbounded();

        let mut pistons = Pistons::default();
        let mut rider = rider_at(4.5, 0.0, 4.5);
        let pos = BlockPos::new(0, 0, 0);
        pistons.apply_event(pos, Direction::East, PistonAction::Pushing, &rider, &palette, &mut world, &sinks);
        pistons.tick(&mut rider, &palette, &mut world, &sinks);
        drain_upstream(&up_rx);

        pistons.apply_event(pos, Direction::East, PistonAction::Pushing, &rider, &palette, &mut world, &sinks);
        // No restart: progress keeps advancing from where it was.
        assert_eq!(pistons.get(pos).unwrap().progress(), 0.5);
        assert!(drain_upstream(&up_rx).is_empty());
    }
}
