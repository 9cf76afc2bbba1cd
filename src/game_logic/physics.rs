use crate::game_logic::{
    CarTuning, HOVER_GRAVITY, LIMIT_MAX_SPEED, MAX_SPEED_BONUS_DRAFTING, MAX_SPEED_BONUS_PASSING,
};
use bevy::prelude::*;
use std::ops::BitOr;

/// Contact flags reported by the motor for the last tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionFlags(u8);

impl CollisionFlags {
    pub const NONE: Self = Self(0);
    pub const SIDES: Self = Self(1);
    pub const ABOVE: Self = Self(1 << 1);
    pub const BELOW: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Side or overhead contact, the kind that can pin a car.
    pub fn blocked(self) -> bool {
        self.intersects(Self::SIDES | Self::ABOVE)
    }
}

impl BitOr for CollisionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpeedType {
    Slow,
    #[default]
    Norm,
    Boost,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorLimits {
    pub max_forward_speed: f32,
    pub max_sideways_speed: f32,
    pub max_backwards_speed: f32,
    pub max_ground_acceleration: f32,
}

impl MotorLimits {
    pub const fn new(forward: f32, sideways: f32, backwards: f32, acceleration: f32) -> Self {
        Self {
            max_forward_speed: forward,
            max_sideways_speed: sideways,
            max_backwards_speed: backwards,
            max_ground_acceleration: acceleration,
        }
    }
}

impl Default for MotorLimits {
    fn default() -> Self {
        Self::new(200.0, 50.0, 20.0, 100.0)
    }
}

/// Kinematic state owned by the motor. The AI only writes `input_move`.
#[derive(Component, Clone, Debug, Default)]
pub struct Motor {
    pub velocity: Vec3,
    pub grounded: bool,
    pub collision_flags: CollisionFlags,
    /// Shaped control vector in world space.
    pub input_move: Vec3,
    /// Scripted displacement velocity from a passing maneuver.
    pub external_move: Vec3,
    /// Scripted displacement velocity from a boost pickup.
    pub boost_move: Vec3,
    pub limits: MotorLimits,
    pub hover_height: f32,
}

impl Motor {
    pub fn at_height(hover_height: f32) -> Self {
        Self {
            grounded: true,
            collision_flags: CollisionFlags::BELOW,
            hover_height,
            ..default()
        }
    }

    /// Hard stop used by recoveries.
    pub fn halt(&mut self) {
        self.velocity = Vec3::ZERO;
        self.input_move = Vec3::ZERO;
        self.external_move = Vec3::ZERO;
        self.boost_move = Vec3::ZERO;
    }
}

/// Speed modifiers shared by navigation, arbitration and power-ups.
#[derive(Component, Clone, Debug, Default)]
pub struct SpeedState {
    pub speed_type: SpeedType,
    pub drafting: bool,
    pub passing: bool,
    pub boosting: bool,
    pub jumping: bool,
    pub bouncing: bool,
    pub speed: f32,
    pub speed_ratio: f32,
}

impl SpeedState {
    pub fn effective_limits(&self, tuning: &CarTuning) -> MotorLimits {
        let mut limits = tuning.limits_for(self.speed_type);
        if self.drafting {
            limits.max_forward_speed += MAX_SPEED_BONUS_DRAFTING;
        }
        if self.passing {
            limits.max_forward_speed += MAX_SPEED_BONUS_PASSING;
        }
        limits
    }

    /// Refreshes the sampled speed. Boosting and passing report the speed
    /// limit so that the sensor never treats a boosting car as slow.
    pub fn sample(&mut self, velocity: Vec3, max_speed: f32) {
        self.speed = if self.boosting || self.passing {
            LIMIT_MAX_SPEED
        } else {
            velocity.length()
        };
        self.speed_ratio = if max_speed > 0.0 {
            self.speed / max_speed
        } else {
            0.0
        };
    }

    pub fn reset_modifiers(&mut self) {
        self.speed_type = SpeedType::Norm;
        self.drafting = false;
        self.passing = false;
        self.boosting = false;
        self.jumping = false;
        self.bouncing = false;
    }
}

// Car frame: x to the right, z forward. Bevy looks down -Z, so forward is -Z
// of the local transform.

/// World point expressed in the car frame.
pub fn to_car_frame(transform: &Transform, world: Vec3) -> Vec3 {
    let local = transform.rotation.inverse() * (world - transform.translation);
    Vec3::new(local.x, local.y, -local.z)
}

/// Car frame direction rotated into world space.
pub fn from_car_frame(rotation: Quat, v: Vec3) -> Vec3 {
    rotation * Vec3::new(v.x, v.y, -v.z)
}

/// Turns a raw `(strafe, 0, throttle)` vector into the world space move
/// vector: clamp the length to 1 and square it for a softer response near
/// zero, then rotate by the car heading.
pub fn shape_control_vector(raw: Vec3, rotation: Quat) -> Vec3 {
    let length = raw.length();
    if length <= f32::EPSILON {
        return Vec3::ZERO;
    }
    let shaped_length = length.min(1.0).powi(2);
    from_car_frame(rotation, raw / length * shaped_length)
}

/// Advances one car by `delta` seconds.
pub fn integrate_motor(transform: &mut Transform, motor: &mut Motor, delta: f32) {
    let local = {
        let l = transform.rotation.inverse() * motor.input_move;
        Vec3::new(l.x, 0.0, -l.z)
    };
    let limits = motor.limits;
    let forward_cap = if local.z >= 0.0 {
        limits.max_forward_speed
    } else {
        limits.max_backwards_speed
    };
    let desired_local = Vec3::new(local.x * limits.max_sideways_speed, 0.0, local.z * forward_cap);
    let desired = from_car_frame(transform.rotation, desired_local);

    // Accelerate the horizontal velocity toward the desired one.
    let horizontal = Vec3::new(motor.velocity.x, 0.0, motor.velocity.z);
    let change = desired - horizontal;
    let max_step = limits.max_ground_acceleration * delta;
    let horizontal = if change.length() <= max_step {
        desired
    } else {
        horizontal + change.normalize() * max_step
    };
    motor.velocity.x = horizontal.x;
    motor.velocity.z = horizontal.z;

    if !motor.grounded {
        motor.velocity.y -= HOVER_GRAVITY * delta;
    }

    transform.translation += (motor.velocity + motor.external_move + motor.boost_move) * delta;

    motor.collision_flags = CollisionFlags::NONE;
    if transform.translation.y <= motor.hover_height {
        transform.translation.y = motor.hover_height;
        motor.velocity.y = motor.velocity.y.max(0.0);
        motor.grounded = true;
        motor.collision_flags.insert(CollisionFlags::BELOW);
    } else {
        motor.grounded = false;
    }
}

pub fn apply_motor(
    time: Res<Time>,
    mut cars: Query<(&mut Transform, &mut Motor, &mut SpeedState, &CarTuning)>,
) {
    let delta = time.delta_secs();
    for (mut transform, mut motor, mut speed, tuning) in cars.iter_mut() {
        motor.limits = speed.effective_limits(tuning);
        integrate_motor(&mut transform, &mut motor, delta);
        speed.jumping = !motor.grounded;
        speed.sample(motor.velocity, tuning.max_speed);
    }
}
