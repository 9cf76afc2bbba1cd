use crate::game_logic::{BOUNCE_STRENGTH, CAR_RADIUS, Car, CollisionFlags, Motor, SpeedState};
use bevy::prelude::*;

// Generic contact handler over any iterator of (position, velocity) pairs.
// Returns true when the car touched another one.
pub fn handle_car_contact<I>(position: Vec3, velocity: &mut Vec3, other_cars: I) -> bool
where
    I: IntoIterator<Item = (Vec3, Vec3)>,
{
    let mut touched = false;
    for (other_position, other_velocity) in other_cars {
        let offset = (position - other_position).with_y(0.0);
        if offset.length() >= CAR_RADIUS * 2.0 {
            continue;
        }
        touched = true;

        let bounce_direction = offset.normalize_or_zero();
        let relative_speed = (*velocity - other_velocity).dot(bounce_direction);
        if relative_speed < 0.0 {
            *velocity += bounce_direction * relative_speed * -BOUNCE_STRENGTH;
        }
    }
    touched
}

pub fn resolve_car_contacts(
    mut cars: Query<(Entity, &Transform, &mut Motor, &mut SpeedState), With<Car>>,
) {
    let snapshot: Vec<(Entity, Vec3, Vec3)> = cars
        .iter()
        .map(|(entity, transform, motor, _)| (entity, transform.translation, motor.velocity))
        .collect();

    for (entity, transform, mut motor, mut speed) in cars.iter_mut() {
        let others = snapshot
            .iter()
            .filter(|(other, _, _)| *other != entity)
            .map(|(_, position, velocity)| (*position, *velocity));
        let mut velocity = motor.velocity;
        let touched = handle_car_contact(transform.translation, &mut velocity, others);
        speed.bouncing = touched;
        if touched {
            motor.velocity = velocity;
            motor.collision_flags.insert(CollisionFlags::SIDES);
        }
    }
}
