use bevy::prelude::*;
use rand::Rng;

use crate::game_logic::{CpuDifficulty, DEFAULT_MAX_SPEED, MotorLimits, SpeedType};

#[derive(Component)]
pub struct Car;

#[derive(Component)]
pub struct PlayerControlled;

#[derive(Component)]
pub struct AIControlled;

/// Stable per-race car number. Used wherever an order between cars has to be
/// deterministic (ranking ties, sensor iteration).
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CarId(pub u32);

/// Per-car speed tuning, chosen when the car is spawned.
#[derive(Component, Clone, Debug)]
pub struct CarTuning {
    pub max_speed: f32,
    pub slow: MotorLimits,
    pub norm: MotorLimits,
    pub boost: MotorLimits,
}

impl Default for CarTuning {
    fn default() -> Self {
        Self {
            max_speed: DEFAULT_MAX_SPEED,
            slow: MotorLimits::new(50.0, 12.0, 5.0, 25.0),
            norm: MotorLimits::new(200.0, 50.0, 20.0, 100.0),
            boost: MotorLimits::new(250.0, 60.0, 30.0, 120.0),
        }
    }
}

impl CarTuning {
    /// Tuning for a computer driven car at the given difficulty.
    pub fn for_cpu(difficulty: CpuDifficulty) -> Self {
        let mut tuning = Self::default();
        match difficulty {
            CpuDifficulty::Low => {
                tuning.norm.max_ground_acceleration += 5.0;
            }
            CpuDifficulty::Med => {
                tuning.max_speed += 5.0;
                tuning.norm.max_forward_speed += 10.0;
                tuning.norm.max_ground_acceleration += 10.0;
            }
            CpuDifficulty::High => {
                tuning.max_speed += 10.0;
                tuning.norm.max_forward_speed += 15.0;
                tuning.norm.max_ground_acceleration += 40.0;
                tuning.boost.max_forward_speed += 15.0;
                tuning.boost.max_ground_acceleration += 15.0;
            }
        }
        tuning
    }

    /// Tuning for the tracked car, with a small random spread.
    pub fn for_tracked<R: Rng>(rng: &mut R) -> Self {
        let mut tuning = Self::default();
        tuning.max_speed += rng.random_range(0..12) as f32;
        tuning.norm.max_forward_speed += rng.random_range(0..6) as f32;
        tuning.norm.max_ground_acceleration += rng.random_range(0..6) as f32;
        tuning.boost.max_forward_speed += rng.random_range(0..6) as f32;
        tuning.boost.max_ground_acceleration += rng.random_range(0..6) as f32;
        tuning
    }

    pub fn limits_for(&self, speed_type: SpeedType) -> MotorLimits {
        match speed_type {
            SpeedType::Slow => self.slow,
            SpeedType::Norm => self.norm,
            SpeedType::Boost => self.boost,
        }
    }
}
