use crate::game_logic::{
    AMMO_INC, BOOST_DURATION, BoostVectors, Car, CarHealth, CarSensor, MARKER_REFRESH_MAX,
    MARKER_REFRESH_MIN, MAX_AMMO, Motor, PICKUP_DISTANCE, RaceRng, SpeedState, SpeedType,
    TargetingState, TrackPickups,
};
use bevy::prelude::*;
use rand::Rng;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum PowerUpKind {
    Boost,
    Gun,
    Armor,
    Invincibility,
    Health,
}

// Component for a pickup placed on the track
#[derive(Component, Debug)]
pub struct PowerUp {
    pub kind: PowerUpKind,
    pub available: bool,
    pub respawn: Timer,
}

impl PowerUp {
    pub fn new(kind: PowerUpKind) -> Self {
        Self {
            kind,
            available: true,
            respawn: Timer::from_seconds(0.0, TimerMode::Once),
        }
    }
}

/// A boost pickup in progress.
#[derive(Component, Debug)]
pub struct ActiveBoost {
    pub timer: Timer,
    pub vector: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickupEffect {
    Applied,
    StartBoost,
    Ignored,
}

/// Applies a pickup to the car's loadout. Boosts only report `StartBoost`;
/// the caller attaches the timed displacement.
pub fn apply_pickup(
    kind: PowerUpKind,
    speed: &mut SpeedState,
    targeting: &mut TargetingState,
    health: &mut CarHealth,
) -> PickupEffect {
    match kind {
        PowerUpKind::Gun => {
            if targeting.ammo <= MAX_AMMO {
                targeting.ammo += AMMO_INC;
            }
            targeting.gun_on = true;
        }
        PowerUpKind::Armor => health.armor = true,
        PowerUpKind::Invincibility => health.grant_invincibility(),
        PowerUpKind::Health => health.heal(),
        PowerUpKind::Boost => {
            if speed.passing && !speed.boosting {
                return PickupEffect::Ignored;
            }
            speed.boosting = true;
            speed.speed_type = SpeedType::Boost;
            return PickupEffect::StartBoost;
        }
    }
    PickupEffect::Applied
}

pub fn spawn_powerups(mut commands: Commands, pickups: Res<TrackPickups>) {
    for pickup in &pickups.0 {
        commands.spawn((
            PowerUp::new(pickup.kind),
            Transform::from_translation(Vec3::from_array(pickup.position)),
        ));
    }
}

// System to handle powerup collection
pub fn collect_powerups(
    mut commands: Commands,
    mut rng: ResMut<RaceRng>,
    mut cars: Query<
        (Entity, &Transform, &Motor, &mut SpeedState, &mut CarSensor, &mut CarHealth),
        With<Car>,
    >,
    mut powerups: Query<(&Transform, &mut PowerUp)>,
) {
    for (powerup_transform, mut powerup) in powerups.iter_mut() {
        if !powerup.available {
            continue;
        }
        let powerup_pos = powerup_transform.translation;

        for (entity, transform, motor, mut speed, mut sensor, mut health) in cars.iter_mut() {
            if transform.translation.distance(powerup_pos) >= PICKUP_DISTANCE {
                continue;
            }

            let effect = apply_pickup(powerup.kind, &mut speed, &mut sensor.targeting, &mut health);
            if effect == PickupEffect::StartBoost {
                commands.entity(entity).insert(ActiveBoost {
                    timer: Timer::from_seconds(BOOST_DURATION, TimerMode::Once),
                    vector: BoostVectors::from_velocity(motor.velocity).go,
                });
            }
            debug!("car {entity} picked up {:?} ({:?})", powerup.kind, effect);

            let respawn = rng.0.random_range(MARKER_REFRESH_MIN..=MARKER_REFRESH_MAX);
            powerup.available = false;
            powerup.respawn = Timer::from_seconds(respawn, TimerMode::Once);
            break;
        }
    }
}

// System to handle boost expiration
pub fn update_active_boosts(
    mut commands: Commands,
    time: Res<Time>,
    mut query: Query<(Entity, &mut ActiveBoost, &mut Motor, &mut SpeedState)>,
) {
    for (entity, mut boost, mut motor, mut speed) in query.iter_mut() {
        boost.timer.tick(time.delta());

        if boost.timer.finished() {
            motor.boost_move = Vec3::ZERO;
            speed.boosting = false;
            if !speed.passing {
                speed.speed_type = SpeedType::Norm;
            }
            commands.entity(entity).remove::<ActiveBoost>();
        } else {
            motor.boost_move = boost.vector;
        }
    }
}

pub fn respawn_powerups(time: Res<Time>, mut powerups: Query<&mut PowerUp>) {
    for mut powerup in powerups.iter_mut() {
        if powerup.available {
            continue;
        }
        powerup.respawn.tick(time.delta());
        if powerup.respawn.finished() {
            powerup.available = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loadout() -> (SpeedState, TargetingState, CarHealth) {
        (
            SpeedState::default(),
            TargetingState::default(),
            CarHealth::default(),
        )
    }

    #[test]
    fn test_gun_adds_ammo_up_to_cap() {
        let (mut speed, mut targeting, mut health) = loadout();

        apply_pickup(PowerUpKind::Gun, &mut speed, &mut targeting, &mut health);
        assert!(targeting.gun_on);
        assert_eq!(targeting.ammo, 3);

        targeting.ammo = 7;
        apply_pickup(PowerUpKind::Gun, &mut speed, &mut targeting, &mut health);
        assert_eq!(targeting.ammo, 7);
    }

    #[test]
    fn test_boost_is_ignored_mid_pass() {
        let (mut speed, mut targeting, mut health) = loadout();
        speed.passing = true;

        let effect = apply_pickup(PowerUpKind::Boost, &mut speed, &mut targeting, &mut health);
        assert_eq!(effect, PickupEffect::Ignored);
        assert!(!speed.boosting);

        speed.boosting = true;
        let effect = apply_pickup(PowerUpKind::Boost, &mut speed, &mut targeting, &mut health);
        assert_eq!(effect, PickupEffect::StartBoost);
    }

    #[test]
    fn test_boost_switches_speed_type() {
        let (mut speed, mut targeting, mut health) = loadout();

        let effect = apply_pickup(PowerUpKind::Boost, &mut speed, &mut targeting, &mut health);

        assert_eq!(effect, PickupEffect::StartBoost);
        assert_eq!(speed.speed_type, SpeedType::Boost);
    }

    #[test]
    fn test_defensive_pickups() {
        let (mut speed, mut targeting, mut health) = loadout();
        health.damage = 2;

        apply_pickup(PowerUpKind::Armor, &mut speed, &mut targeting, &mut health);
        apply_pickup(PowerUpKind::Health, &mut speed, &mut targeting, &mut health);
        apply_pickup(PowerUpKind::Invincibility, &mut speed, &mut targeting, &mut health);

        assert!(health.armor);
        assert_eq!(health.damage, 1);
        assert!(health.invincible.on);
    }
}
