use crate::game_logic::{
    CarHealth, CarNavState, CarSensor, Motor, RECOVERY_LOOKBACK, RaceProgress, RouteId,
    SpeedState, TrackGraph,
};
use bevy::prelude::*;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryReason {
    Stuck,
    OffTrack,
    WrongDirection,
    Destroyed,
}

/// Asks for a car to be put back on the route a few waypoints behind its
/// target. Every reset path goes through this event.
#[derive(Event, Clone, Copy, Debug)]
pub struct RecoveryRequest {
    pub car: Entity,
    pub reason: RecoveryReason,
}

/// Waypoint a recovering car is moved back to.
pub fn past_waypoint_index(index: usize) -> usize {
    index.saturating_sub(RECOVERY_LOOKBACK)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoverySnap {
    pub index: usize,
    pub position: Vec3,
    pub look_at: Vec3,
}

/// Where a car targeting `target_index` ends up after a recovery, or `None`
/// when the route has no waypoint there.
pub fn plan_recovery(graph: &TrackGraph, route: RouteId, target_index: usize) -> Option<RecoverySnap> {
    let index = past_waypoint_index(target_index);
    let waypoint = graph.waypoint(route, index)?;
    let position = waypoint.position.with_y(waypoint.start_height);
    let facing = graph.waypoint(route, index + 1).unwrap_or(waypoint);

    Some(RecoverySnap {
        index,
        position,
        look_at: facing.position.with_y(position.y),
    })
}

pub fn apply_recoveries(
    graph: Res<TrackGraph>,
    mut requests: EventReader<RecoveryRequest>,
    mut cars: Query<(
        &mut Transform,
        &mut Motor,
        &mut SpeedState,
        &mut CarNavState,
        &mut CarSensor,
        &mut CarHealth,
        &mut RaceProgress,
    )>,
) {
    let mut handled = HashSet::new();

    for request in requests.read() {
        if !handled.insert(request.car) {
            continue;
        }
        let Ok((mut transform, mut motor, mut speed, mut nav, mut sensor, mut health, mut progress)) =
            cars.get_mut(request.car)
        else {
            continue;
        };

        let Some(snap) = plan_recovery(&graph, nav.route_id, nav.target_waypoint_index) else {
            warn_once!(
                "no recovery waypoint for car {} on route {}, retrying next tick",
                request.car, nav.route_id
            );
            continue;
        };

        transform.translation = snap.position;
        if snap.look_at != snap.position {
            transform.look_at(snap.look_at, Vec3::Y);
        }
        motor.halt();
        speed.reset_modifiers();

        nav.target_waypoint_index = snap.index;
        nav.reset_stuck();
        nav.turn = default();
        sensor.clear_maneuvers();
        health.grant_invincibility();
        progress.on_recovered();

        info!(
            "car {} recovered to waypoint {} ({:?})",
            request.car, snap.index, request.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{
        ApplyHit, PassInput, SlowDown, SpeedType, StuckPhase, WaypointMarker, apply_hits,
    };

    fn line_track(len: usize) -> TrackGraph {
        let markers: Vec<WaypointMarker> = (0..len)
            .map(|i| WaypointMarker {
                route_id: 0,
                index: i as i32,
                position: [0.0, 0.0, -(i as f32) * 50.0],
                start_height: 6.0,
                slow_down: SlowDown::default(),
                active: true,
            })
            .collect();
        TrackGraph::build(&markers)
    }

    #[test]
    fn test_past_index_never_goes_negative() {
        assert_eq!(past_waypoint_index(0), 0);
        assert_eq!(past_waypoint_index(3), 0);
        assert_eq!(past_waypoint_index(5), 0);
        assert_eq!(past_waypoint_index(9), 4);
    }

    #[test]
    fn test_plan_snaps_to_start_height_and_faces_next() {
        let graph = line_track(10);
        let snap = plan_recovery(&graph, 0, 8).unwrap();

        assert_eq!(snap.index, 3);
        assert_eq!(snap.position, Vec3::new(0.0, 6.0, -150.0));
        assert_eq!(snap.look_at, Vec3::new(0.0, 6.0, -200.0));
    }

    #[test]
    fn test_plan_on_last_waypoint_faces_itself() {
        let graph = line_track(1);
        let snap = plan_recovery(&graph, 0, 0).unwrap();

        assert_eq!(snap.look_at, snap.position);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let graph = line_track(10);

        assert_eq!(plan_recovery(&graph, 0, 7), plan_recovery(&graph, 0, 7));
    }

    #[test]
    fn test_plan_on_missing_route_is_skipped() {
        let graph = line_track(4);

        assert!(plan_recovery(&graph, 2, 1).is_none());
    }

    fn recovery_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(line_track(10))
            .add_event::<ApplyHit>()
            .add_event::<RecoveryRequest>()
            .add_systems(Update, (apply_hits, apply_recoveries).chain());
        app
    }

    /// A car far off the route, stuck, mid-pass and locked on a rival.
    fn spawn_stranded_car(app: &mut App) -> Entity {
        let mut nav = CarNavState::new(0);
        nav.target_waypoint_index = 8;
        nav.stuck_phase = StuckPhase::Correcting;
        nav.time_in_phase1 = 2.0;
        nav.time_in_phase2 = 0.4;

        let mut sensor = CarSensor::default();
        sensor.passing.update(&PassInput {
            delta: 3.0,
            candidate: Some(true),
            velocity: Vec3::new(0.0, 0.0, -190.0),
        });
        sensor.targeting.lock(Entity::from_raw(99));

        app.world_mut()
            .spawn((
                Transform::from_xyz(30.0, 4.0, -420.0),
                Motor {
                    velocity: Vec3::new(0.0, 0.0, -190.0),
                    external_move: Vec3::new(0.0, 0.0, -50.0),
                    ..default()
                },
                SpeedState {
                    passing: true,
                    speed_type: SpeedType::Boost,
                    ..default()
                },
                nav,
                sensor,
                CarHealth::default(),
                RaceProgress::new(3),
            ))
            .id()
    }

    #[test]
    fn test_recovery_resets_every_machine_in_one_tick() {
        let mut app = recovery_app();
        let car = spawn_stranded_car(&mut app);
        assert!(app.world().get::<CarSensor>(car).unwrap().passing.is_passing());

        app.world_mut().send_event(RecoveryRequest {
            car,
            reason: RecoveryReason::Stuck,
        });
        app.update();

        let world = app.world();
        let transform = world.get::<Transform>(car).unwrap();
        assert_eq!(transform.translation, Vec3::new(0.0, 6.0, -150.0));

        let nav = world.get::<CarNavState>(car).unwrap();
        assert_eq!(nav.target_waypoint_index, 3);
        assert_eq!(nav.stuck_phase, StuckPhase::Idle);
        assert_eq!(nav.time_in_phase1, 0.0);
        assert_eq!(nav.time_in_phase2, 0.0);

        let sensor = world.get::<CarSensor>(car).unwrap();
        assert!(!sensor.passing.is_passing());
        assert_eq!(sensor.targeting.target, None);

        let speed = world.get::<SpeedState>(car).unwrap();
        assert!(!speed.passing);
        assert_eq!(speed.speed_type, SpeedType::Norm);
        let motor = world.get::<Motor>(car).unwrap();
        assert_eq!(motor.velocity, Vec3::ZERO);
        assert_eq!(motor.external_move, Vec3::ZERO);

        assert!(world.get::<CarHealth>(car).unwrap().invincible.on);
        assert_eq!(world.get::<RaceProgress>(car).unwrap().jump_count, 1);
    }

    #[test]
    fn test_duplicate_requests_recover_once() {
        let mut app = recovery_app();
        let car = spawn_stranded_car(&mut app);

        for reason in [RecoveryReason::OffTrack, RecoveryReason::WrongDirection] {
            app.world_mut().send_event(RecoveryRequest { car, reason });
        }
        app.update();

        assert_eq!(app.world().get::<RaceProgress>(car).unwrap().jump_count, 1);
    }

    #[test]
    fn test_destroyed_car_recovers_same_tick() {
        let mut app = recovery_app();
        let car = spawn_stranded_car(&mut app);
        app.world_mut().get_mut::<CarHealth>(car).unwrap().damage = 2;

        app.world_mut().send_event(ApplyHit {
            shooter: Entity::from_raw(99),
            target: car,
        });
        app.update();

        let world = app.world();
        assert_eq!(
            world.get::<Transform>(car).unwrap().translation,
            Vec3::new(0.0, 6.0, -150.0)
        );
        let health = world.get::<CarHealth>(car).unwrap();
        assert_eq!(health.damage, 0);
        assert!(health.invincible.on);
    }
}
