//! Per-species mount behavior: input shaping, speeds, jumping, and the
//! carrot/fungus boost timer.

use glam::{Vec2, Vec3};

use crate::session::{EffectCache, RiderState};

use super::{Mount, MountProfile, MovementMode, VehicleState};

pub const HORSE_PROFILE: MountProfile = MountProfile {
    width: 1.3964844,
    height: 1.6,
    step_height: 1.0,
    move_speed: 0.225,
    jump_strength: 0.7,
};

pub const CAMEL_PROFILE: MountProfile = MountProfile {
    width: 1.7,
    height: 2.375,
    step_height: 1.5,
    move_speed: 0.09,
    jump_strength: 0.42,
};

pub const PIG_PROFILE: MountProfile = MountProfile {
    width: 0.9,
    height: 0.9,
    step_height: 0.6,
    move_speed: 0.25,
    jump_strength: 0.0,
};

pub const STRIDER_PROFILE: MountProfile = MountProfile {
    width: 0.9,
    height: 1.7,
    step_height: 1.0,
    move_speed: 0.175,
    jump_strength: 0.0,
};

pub const NAUTILUS_PROFILE: MountProfile = MountProfile {
    width: 1.4,
    height: 0.8,
    step_height: 0.6,
    move_speed: 0.1,
    jump_strength: 0.0,
};

pub const HAPPY_GHAST_PROFILE: MountProfile = MountProfile {
    width: 4.0,
    height: 4.0,
    step_height: 0.6,
    move_speed: 0.05,
    jump_strength: 0.0,
};

/// Boost timer for steerable mounts. The speed bonus follows a half sine
/// over the boost duration, peaking at 2.15x midway.
#[derive(Clone, Copy, Debug, Default)]
pub struct Boost {
    duration: i32,
    counter: i32,
}

impl Boost {
    pub fn start(&mut self, duration: i32) {
        if duration <= 0 {
            *self = Boost::default();
        } else {
            self.duration = duration;
            self.counter = 1;
        }
    }

    /// Advance one tick; the boost ends once the counter passes the duration.
    pub fn tick(&mut self) {
        if self.duration > 0 {
            self.counter += 1;
            if self.counter > self.duration {
                *self = Boost::default();
            }
        }
    }

    pub fn multiplier(&self) -> f32 {
        if self.duration > 0 {
            1.0 + 1.15 * (std::f32::consts::PI * self.counter as f32 / self.duration as f32).sin()
        } else {
            1.0
        }
    }
}

/// Vertical launch from a held jump charge, plus a forward kick when the
/// rider is pushing forward.
pub(super) fn jump_impulse(
    jump_strength: f32,
    charge: i32,
    jump_multiplier: f32,
    jump_boost: u32,
    yaw: f32,
    forward: bool,
) -> Vec3 {
    let scale = charge.min(90) as f32 / 90.0;
    let vertical = jump_strength * scale * jump_multiplier + 0.1 * jump_boost as f32;
    let mut impulse = Vec3::new(0.0, vertical, 0.0);
    if forward {
        let yaw = yaw.to_radians();
        impulse.x -= 0.4 * yaw.sin() * scale;
        impulse.z += 0.4 * yaw.cos() * scale;
    }
    impulse
}

/// Executes a pending mount jump. The charge only fires on the ground and is
/// consumed either way; airborne charges persist until landing.
fn consume_jump_charge(
    state: &mut VehicleState,
    rider: &mut RiderState,
    effects: &EffectCache,
    jump_multiplier: f32,
) {
    if !state.on_ground {
        return;
    }
    if rider.jump_charge > 0 {
        let impulse = jump_impulse(
            state.profile.jump_strength,
            rider.jump_charge,
            jump_multiplier,
            effects.jump_boost(),
            rider.yaw,
            rider.input.y > 0.0,
        );
        state.motion = Vec3::new(
            state.motion.x + impulse.x,
            impulse.y,
            state.motion.z + impulse.z,
        );
    }
    rider.jump_charge = 0;
}

/// Saddled land input: strafe is halved and reversing is quartered.
fn land_rider_input(input: Vec2) -> Vec3 {
    let strafe = input.x * 0.5;
    let mut forward = input.y;
    if forward <= 0.0 {
        forward *= 0.25;
    }
    Vec3::new(strafe, 0.0, forward)
}

/// Vertical steering from the rider's pitch. Reversing backs up at half
/// speed, and the held jump key adds climb.
fn pitch_steered_input(rider: &RiderState, input: Vec2) -> Vec3 {
    let x = input.x;
    let mut y = 0.0;
    let mut z = 0.0;
    if input.y != 0.0 {
        let pitch = rider.pitch.to_radians();
        z = pitch.cos();
        y = -pitch.sin();
        if input.y < 0.0 {
            z *= -0.5;
            y *= -0.5;
        }
    }
    if rider.jumping {
        y += 0.5;
    }
    Vec3::new(x, y, z)
}

pub struct Horse;

impl Mount for Horse {
    fn name(&self) -> &'static str {
        "horse"
    }

    fn adjust_input(&self, state: &VehicleState, rider: &RiderState, input: Vec2) -> Vec3 {
        // A rearing horse refuses ground input unless sliding is allowed.
        if state.on_ground && rider.jump_charge == 0 && state.standing && !state.allow_stand_sliding
        {
            return Vec3::ZERO;
        }
        land_rider_input(input)
    }

    fn before_travel(
        &mut self,
        state: &mut VehicleState,
        rider: &mut RiderState,
        effects: &EffectCache,
        jump_multiplier: f32,
    ) {
        consume_jump_charge(state, rider, effects, jump_multiplier);
    }
}

pub struct Camel;

impl Mount for Camel {
    fn name(&self) -> &'static str {
        "camel"
    }

    fn adjust_input(&self, _state: &VehicleState, _rider: &RiderState, input: Vec2) -> Vec3 {
        land_rider_input(input)
    }

    fn before_travel(
        &mut self,
        state: &mut VehicleState,
        rider: &mut RiderState,
        effects: &EffectCache,
        jump_multiplier: f32,
    ) {
        consume_jump_charge(state, rider, effects, jump_multiplier);
    }
}

#[derive(Default)]
pub struct Pig {
    boost: Boost,
}

impl Mount for Pig {
    fn name(&self) -> &'static str {
        "pig"
    }

    fn vehicle_speed(&self, state: &VehicleState, mode: MovementMode) -> f32 {
        match mode {
            MovementMode::Land => state.profile.move_speed * self.boost.multiplier(),
            _ => 0.02,
        }
    }

    fn start_boost(&mut self, duration: i32) {
        self.boost.start(duration);
    }

    fn end_tick(&mut self) {
        self.boost.tick();
    }
}

#[derive(Default)]
pub struct Strider {
    boost: Boost,
}

impl Mount for Strider {
    fn name(&self) -> &'static str {
        "strider"
    }

    fn vehicle_speed(&self, state: &VehicleState, mode: MovementMode) -> f32 {
        match mode {
            MovementMode::Land => {
                // A cold strider (out of lava) shivers along at 2/3 speed.
                let base = if state.cold {
                    state.profile.move_speed * 2.0 / 3.0
                } else {
                    state.profile.move_speed
                };
                base * self.boost.multiplier()
            }
            _ => 0.02,
        }
    }

    fn walks_on_lava(&self) -> bool {
        true
    }

    fn start_boost(&mut self, duration: i32) {
        self.boost.start(duration);
    }

    fn end_tick(&mut self) {
        self.boost.tick();
    }
}

#[derive(Default)]
pub struct Nautilus {
    boost: Boost,
}

impl Mount for Nautilus {
    fn name(&self) -> &'static str {
        "nautilus"
    }

    fn adjust_input(&self, _state: &VehicleState, rider: &RiderState, input: Vec2) -> Vec3 {
        pitch_steered_input(rider, input)
    }

    fn vehicle_speed(&self, state: &VehicleState, mode: MovementMode) -> f32 {
        match mode {
            MovementMode::Water => 3.9 * state.profile.move_speed * self.boost.multiplier(),
            MovementMode::Lava => 0.02,
            // Beached nautiluses flop along at walking speed.
            MovementMode::Land => state.profile.move_speed,
        }
    }

    fn can_climb(&self) -> bool {
        false
    }

    fn start_boost(&mut self, duration: i32) {
        self.boost.start(duration);
    }

    fn end_tick(&mut self) {
        self.boost.tick();
    }
}

pub struct HappyGhast;

impl Mount for HappyGhast {
    fn name(&self) -> &'static str {
        "happy_ghast"
    }

    fn adjust_input(&self, _state: &VehicleState, rider: &RiderState, input: Vec2) -> Vec3 {
        pitch_steered_input(rider, input)
    }

    fn vehicle_speed(&self, state: &VehicleState, _mode: MovementMode) -> f32 {
        3.9 * state.profile.move_speed
    }

    fn can_climb(&self) -> bool {
        false
    }

    fn flies(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    #[test]
    fn boost_peaks_midway_and_expires() {
        let mut boost = Boost::default();
        assert_eq!(boost.multiplier(), 1.0);

        boost.start(10);
        for _ in 0..4 {
            boost.tick();
        }
        assert!((boost.multiplier() - 2.15).abs() < 1e-4);

        for _ in 0..6 {
            boost.tick();
        }
        assert_eq!(boost.multiplier(), 1.0);
    }

    #[test]
    fn jump_height_grows_with_charge() {
        let none = jump_impulse(0.7, 0, 1.0, 0, 0.0, false);
        assert_eq!(none.y, 0.0);

        let low = jump_impulse(0.7, 30, 1.0, 0, 0.0, false);
        let mid = jump_impulse(0.7, 60, 1.0, 0, 0.0, false);
        let full = jump_impulse(0.7, 90, 1.0, 0, 0.0, false);
        assert!(low.y < mid.y && mid.y < full.y);
        assert!((full.y - 0.7).abs() < 1e-6);

        // Overlong charges clamp to the full jump.
        let over = jump_impulse(0.7, 200, 1.0, 0, 0.0, false);
        assert_eq!(over.y, full.y);
    }

    #[test]
    fn forward_jumps_kick_along_the_yaw() {
        let impulse = jump_impulse(0.7, 90, 1.0, 0, 0.0, true);
        assert!(impulse.x.abs() < 1e-6);
        assert!((impulse.z - 0.4).abs() < 1e-6);
    }

    #[test]
    fn jump_boost_adds_flat_height() {
        let plain = jump_impulse(0.7, 90, 1.0, 0, 0.0, false);
        let boosted = jump_impulse(0.7, 90, 1.0, 2, 0.0, false);
        assert!((boosted.y - plain.y - 0.2).abs() < 1e-6);
    }

    #[test]
    fn rearing_horse_refuses_ground_input() {
        let mut state = VehicleState::new(1, DVec3::ZERO, HORSE_PROFILE);
        state.on_ground = true;
        state.standing = true;
        let rider = RiderState::new(2, DVec3::ZERO);

        assert_eq!(Horse.adjust_input(&state, &rider, Vec2::new(0.0, 1.0)), Vec3::ZERO);

        state.allow_stand_sliding = true;
        let moving = Horse.adjust_input(&state, &rider, Vec2::new(0.0, 1.0));
        assert!(moving.z > 0.0);
    }

    #[test]
    fn reverse_input_is_quartered_and_strafe_halved() {
        let reverse = land_rider_input(Vec2::new(1.0, -1.0));
        assert_eq!(reverse, Vec3::new(0.5, 0.0, -0.25));
    }

    #[test]
    fn pitch_steering_follows_the_look_direction() {
        let mut rider = RiderState::new(2, DVec3::ZERO);
        rider.pitch = -90.0;
        let up = pitch_steered_input(&rider, Vec2::new(0.0, 1.0));
        assert!((up.y - 1.0).abs() < 1e-6);
        assert!(up.z.abs() < 1e-6);

        let back = pitch_steered_input(&rider, Vec2::new(0.0, -1.0));
        assert!((back.y + 0.5).abs() < 1e-6);
    }

    #[test]
    fn held_jump_key_climbs() {
        let mut rider = RiderState::new(2, DVec3::ZERO);
        rider.jumping = true;
        let input = pitch_steered_input(&rider, Vec2::ZERO);
        assert_eq!(input, Vec3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn cold_strider_runs_at_two_thirds_speed() {
        let strider = Strider::default();
        let mut state = VehicleState::new(1, DVec3::ZERO, STRIDER_PROFILE);
        let warm = strider.vehicle_speed(&state, MovementMode::Land);
        state.cold = true;
        let cold = strider.vehicle_speed(&state, MovementMode::Land);
        assert!(cold < warm);
        assert!((cold / warm - 2.0 / 3.0).abs() < 1e-6);
    }
}
