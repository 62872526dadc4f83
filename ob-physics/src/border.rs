//! Session world border: resize interpolation, containment, movement
//! clamping, and the deny-particle wall drawn when the rider gets close.

use glam::{DVec3, Vec3};
use ob_protocol::bedrock::{LevelEvent, LevelEventKind, UpstreamPacket};
use tracing::info;

use crate::bounding_box::BoundingBox;
use crate::collision::COLLISION_TOLERANCE;
use crate::session::PacketSinks;

/// Vanilla default diameter, effectively unbounded.
const DEFAULT_SIZE: f64 = 5.999_996_8e7;
/// Absolute coordinate limit for the center and the walls.
const MAX_BOUND: f64 = 2.999_998_4e7;
/// Ticks between wall redraws.
const WALL_INTERVAL: u32 = 20;
/// The wall always shows within this many blocks of an edge, even when the
/// warning distance is smaller.
const WALL_DISTANCE: f64 = 5.0;

const fn rgb(r: i32, g: i32, b: i32) -> i32 {
    (r << 16) | (g << 8) | b
}

const WALL_STATIC: i32 = rgb(32, 160, 255);
const WALL_SHRINKING: i32 = rgb(255, 48, 48);
const WALL_GROWING: i32 = rgb(64, 255, 128);

/// Square border around a center, with walls parallel to the axes. Vertical
/// movement is never restricted.
pub struct WorldBorder {
    center_x: f64,
    center_z: f64,
    old_size: f64,
    new_size: f64,
    current_size: f64,
    /// Resize ticks left; 0 while static.
    lerp_remaining: u64,
    lerp_total: u64,
    warning_blocks: i32,
    warning_delay: i32,
    min_x: f64,
    min_z: f64,
    max_x: f64,
    max_z: f64,
    warning_min_x: f64,
    warning_min_z: f64,
    warning_max_x: f64,
    warning_max_z: f64,
    wall_tick: u32,
}

impl Default for WorldBorder {
    fn default() -> WorldBorder {
        let mut border = WorldBorder {
            center_x: 0.0,
            center_z: 0.0,
            old_size: DEFAULT_SIZE,
            new_size: DEFAULT_SIZE,
            current_size: DEFAULT_SIZE,
            lerp_remaining: 0,
            lerp_total: 0,
            warning_blocks: 5,
            warning_delay: 15,
            min_x: 0.0,
            min_z: 0.0,
            max_x: 0.0,
            max_z: 0.0,
            warning_min_x: 0.0,
            warning_min_z: 0.0,
            warning_max_x: 0.0,
            warning_max_z: 0.0,
            wall_tick: 0,
        };
        border.update();
        border
    }
}

impl WorldBorder {
    pub fn set_center(&mut self, x: f64, z: f64) {
        self.center_x = x;
        self.center_z = z;
        self.update();
    }

    /// Snap to a size immediately, cancelling any running resize.
    pub fn set_size(&mut self, size: f64) {
        self.old_size = size;
        self.new_size = size;
        self.current_size = size;
        self.lerp_remaining = 0;
        self.lerp_total = 0;
        self.update();
    }

    /// Interpolate from the current size to a new one over a tick count.
    pub fn lerp_size(&mut self, new_size: f64, ticks: u64) {
        if ticks == 0 {
            self.set_size(new_size);
            return;
        }
        info!(
            "world border resizing {} -> {} over {} ticks",
            self.current_size, new_size, ticks
        );
        self.old_size = self.current_size;
        self.new_size = new_size;
        self.lerp_remaining = ticks;
        self.lerp_total = ticks;
        self.update();
    }

    pub fn set_warning_blocks(&mut self, blocks: i32) {
        self.warning_blocks = blocks;
        self.update();
    }

    pub fn set_warning_delay(&mut self, delay: i32) {
        self.warning_delay = delay;
    }

    pub fn warning_delay(&self) -> i32 {
        self.warning_delay
    }

    pub fn size(&self) -> f64 {
        self.current_size
    }

    fn update(&mut self) {
        self.center_x = self.center_x.clamp(-MAX_BOUND, MAX_BOUND);
        self.center_z = self.center_z.clamp(-MAX_BOUND, MAX_BOUND);
        let radius = self.current_size / 2.0;
        self.min_x = (self.center_x - radius).max(-MAX_BOUND);
        self.min_z = (self.center_z - radius).max(-MAX_BOUND);
        self.max_x = (self.center_x + radius).min(MAX_BOUND);
        self.max_z = (self.center_z + radius).min(MAX_BOUND);
        let warning = f64::from(self.warning_blocks);
        self.warning_min_x = self.min_x + warning;
        self.warning_min_z = self.min_z + warning;
        self.warning_max_x = self.max_x - warning;
        self.warning_max_z = self.max_z - warning;
    }

    /// Advance one game tick: step a running resize and redraw the wall
    /// every 20th tick while the rider is near an edge.
    pub fn tick(&mut self, position: DVec3, sinks: &PacketSinks) {
        if self.lerp_remaining > 0 {
            self.lerp_remaining -= 1;
            if self.lerp_remaining == 0 {
                info!("world border resize finished at {}", self.new_size);
                self.old_size = self.new_size;
                self.current_size = self.new_size;
            } else {
                let left = self.lerp_remaining as f64 / self.lerp_total as f64;
                self.current_size = self.new_size + (self.old_size - self.new_size) * left;
            }
            self.update();
        }

        self.wall_tick += 1;
        if self.wall_tick >= WALL_INTERVAL {
            self.wall_tick = 0;
            self.draw_wall(position, sinks);
        }
    }

    pub fn is_inside(&self, position: DVec3) -> bool {
        position.x > self.min_x
            && position.x < self.max_x
            && position.z > self.min_z
            && position.z < self.max_z
    }

    /// Whether the position is still in the safe area inside the warning
    /// distance.
    pub fn is_within_warning(&self, position: DVec3) -> bool {
        position.x > self.warning_min_x
            && position.x < self.warning_max_x
            && position.z > self.warning_min_z
            && position.z < self.warning_max_z
    }

    /// Clamp a movement so the box cannot cross a wall. A box already
    /// outside passes through, so a stranded rider can come back in.
    pub fn correct_movement(&self, bounding_box: &BoundingBox, movement: DVec3) -> DVec3 {
        if movement == DVec3::ZERO {
            return movement;
        }
        let min = bounding_box.min();
        let max = bounding_box.max();
        let contained =
            min.x >= self.min_x && max.x <= self.max_x && min.z >= self.min_z && max.z <= self.max_z;
        if !contained {
            return movement;
        }

        let mut corrected = movement;
        if movement.x < 0.0 {
            corrected.x = movement.x.max(self.min_x - min.x);
        } else if movement.x > 0.0 {
            corrected.x = movement.x.min(self.max_x - max.x);
        }
        if movement.z < 0.0 {
            corrected.z = movement.z.max(self.min_z - min.z);
        } else if movement.z > 0.0 {
            corrected.z = movement.z.min(self.max_z - max.z);
        }
        if corrected.x.abs() < COLLISION_TOLERANCE {
            corrected.x = 0.0;
        }
        if corrected.z.abs() < COLLISION_TOLERANCE {
            corrected.z = 0.0;
        }
        corrected
    }

    fn draw_wall(&self, position: DVec3, sinks: &PacketSinks) {
        let color = if self.lerp_remaining > 0 {
            if self.new_size < self.old_size {
                WALL_SHRINKING
            } else {
                WALL_GROWING
            }
        } else {
            WALL_STATIC
        };

        if position.x > self.warning_max_x.min(self.max_x - WALL_DISTANCE) {
            self.draw_wall_x(self.max_x, position, color, sinks);
        }
        if position.x < self.warning_min_x.max(self.min_x + WALL_DISTANCE) {
            self.draw_wall_x(self.min_x, position, color, sinks);
        }
        if position.z > self.warning_max_z.min(self.max_z - WALL_DISTANCE) {
            self.draw_wall_z(self.max_z, position, color, sinks);
        }
        if position.z < self.warning_min_z.max(self.min_z + WALL_DISTANCE) {
            self.draw_wall_z(self.min_z, position, color, sinks);
        }
    }

    /// A 5x6 patch of deny particles on a wall at fixed x, centered on the
    /// rider and clipped to the border corners.
    fn draw_wall_x(&self, wall: f64, position: DVec3, color: i32, sinks: &PacketSinks) {
        let initial_y = (position.y - 1.0) as i32;
        let center_z = position.z as i32;
        for y in initial_y..initial_y + 5 {
            for z in center_z - 3..center_z + 3 {
                if f64::from(z) < self.min_z {
                    continue;
                }
                if f64::from(z) > self.max_z {
                    break;
                }
                sinks.send_upstream(UpstreamPacket::LevelEvent(LevelEvent {
                    kind: LevelEventKind::ParticleDenyBlock,
                    position: Vec3::new(wall as f32, y as f32, z as f32),
                    data: color,
                }));
            }
        }
    }

    fn draw_wall_z(&self, wall: f64, position: DVec3, color: i32, sinks: &PacketSinks) {
        let initial_y = (position.y - 1.0) as i32;
        let center_x = position.x as i32;
        for y in initial_y..initial_y + 5 {
            for x in center_x - 3..center_x + 3 {
                if f64::from(x) < self.min_x {
                    continue;
                }
                if f64::from(x) > self.max_x {
                    break;
                }
                sinks.send_upstream(UpstreamPacket::LevelEvent(LevelEvent {
                    kind: LevelEventKind::ParticleDenyBlock,
                    position: Vec3::new(x as f32, y as f32, wall as f32),
                    data: color,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_interpolates_by_remaining_ticks() {
        let (sinks, upstream, _down) = PacketSinks::unbounded();
        let mut border = WorldBorder::default();
        border.set_size(100.0);
        border.lerp_size(60.0, 1000);

        for _ in 0..500 {
            border.tick(DVec3::new(0.0, 64.0, 0.0), &sinks);
        }
        assert_eq!(border.size(), 80.0);

        for _ in 0..500 {
            border.tick(DVec3::new(0.0, 64.0, 0.0), &sinks);
        }
        assert_eq!(border.size(), 60.0);
        // The center is nowhere near an edge, so no wall was drawn.
        assert!(upstream.try_recv().is_err());
    }

    #[test]
    fn containment_is_strict_at_the_edge() {
        let mut border = WorldBorder::default();
        border.set_size(20.0);

        assert!(border.is_inside(DVec3::new(9.9, 64.0, 0.0)));
        assert!(!border.is_inside(DVec3::new(10.0, 64.0, 0.0)));

        assert!(border.is_within_warning(DVec3::new(4.5, 64.0, 0.0)));
        assert!(!border.is_within_warning(DVec3::new(5.5, 64.0, 0.0)));
    }

    #[test]
    fn movement_clamps_against_the_wall() {
        let mut border = WorldBorder::default();
        border.set_size(20.0);

        let rider = BoundingBox::from_bottom_center(DVec3::new(9.5, 64.0, 0.0), 0.6, 1.8);
        let corrected = border.correct_movement(&rider, DVec3::new(1.0, -2.0, 0.0));
        assert!((corrected.x - 0.2).abs() < 1e-9);
        assert_eq!(corrected.y, -2.0);
        assert_eq!(corrected.z, 0.0);
    }

    #[test]
    fn a_box_outside_passes_through() {
        let mut border = WorldBorder::default();
        border.set_size(20.0);

        let stranded = BoundingBox::from_bottom_center(DVec3::new(15.0, 64.0, 0.0), 0.6, 1.8);
        let movement = DVec3::new(-1.0, 0.0, 0.0);
        assert_eq!(border.correct_movement(&stranded, movement), movement);
    }

    #[test]
    fn tiny_corrections_snap_to_zero() {
        let mut border = WorldBorder::default();
        border.set_size(20.0);

        let rider = BoundingBox::from_bottom_center(DVec3::new(0.0, 64.0, 0.0), 0.6, 1.8);
        let corrected = border.correct_movement(&rider, DVec3::new(1.0e-6, 0.0, 1.0));
        assert_eq!(corrected, DVec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn wall_particles_appear_near_the_edge() {
        let (sinks, upstream, _down) = PacketSinks::unbounded();
        let mut border = WorldBorder::default();
        border.set_size(20.0);

        let near_edge = DVec3::new(9.0, 64.5, 0.0);
        for _ in 0..19 {
            border.tick(near_edge, &sinks);
        }
        assert!(upstream.try_recv().is_err());

        border.tick(near_edge, &sinks);
        let particles: Vec<_> = upstream.try_iter().collect();
        // 5 rows by 6 columns on the east wall.
        assert_eq!(particles.len(), 30);
        for packet in particles {
            match packet {
                UpstreamPacket::LevelEvent(event) => {
                    assert_eq!(event.kind, LevelEventKind::ParticleDenyBlock);
                    assert_eq!(event.position.x, 10.0);
                    assert_eq!(event.data, (32 << 16) | (160 << 8) | 255);
                }
                other => panic!("expected a level event, got {:?}", other),
            }
        }
    }
}
