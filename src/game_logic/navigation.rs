use crate::game_logic::{
    AIControlled, Car, CollisionFlags, HEADING_SLERP_RATE, MIN_STUCK_DISTANCE, MIN_STUCK_TIME,
    MIN_WAYPOINT_DISTANCE, Motor, RecoveryReason, RecoveryRequest, RouteId, SLOW_DOWN_MIN_SPEED_RATIO,
    STUCK_MAX_SPEED, STUCK_RELEASE_TIME, SlowDown, SpeedState, TURN_CHECK_MIN_SPEED_RATIO,
    TrackGraph, shape_control_vector, strafe_strength, to_car_frame, turn_speed_cap,
};
use bevy::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StuckPhase {
    #[default]
    Idle,
    Suspect,
    Correcting,
}

/// What the stuck machine wants from this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StuckStep {
    Drive,
    Correct,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TurnAnticipation {
    pub is_large_turn: bool,
    pub speed_cap_factor: f32,
    /// Degrees between the heading and the current, next and next+1 waypoint.
    pub target_angle: f32,
    pub next_angle: f32,
    pub after_next_angle: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlowdownModifier {
    pub active: bool,
    pub factor: f32,
    pub elapsed: f32,
    pub duration: f32,
}

impl Default for SlowdownModifier {
    fn default() -> Self {
        Self {
            active: false,
            factor: 1.0,
            elapsed: 0.0,
            duration: 0.0,
        }
    }
}

impl SlowdownModifier {
    pub fn start(&mut self, marker: &SlowDown) {
        self.active = true;
        self.factor = marker.factor;
        self.elapsed = 0.0;
        self.duration = marker.duration;
    }

    /// Throttle this modifier allows for the tick. A partial slowdown only
    /// kicks in once the car is moving; it expires after its duration.
    pub fn throttle(&mut self, speed_ratio: f32, delta: f32) -> f32 {
        let applies = (self.active && self.factor < 1.0 && speed_ratio > SLOW_DOWN_MIN_SPEED_RATIO)
            || self.factor >= 1.0;
        if !applies {
            return 1.0;
        }
        self.elapsed += delta;
        if self.elapsed > self.duration {
            self.active = false;
            self.elapsed = 0.0;
        }
        self.factor
    }
}

/// Per-car navigation state. Owned by the car; the lap system drives
/// `target_waypoint_index`, this module only reads it.
#[derive(Component, Clone, Debug, Default)]
pub struct CarNavState {
    pub route_id: RouteId,
    pub target_waypoint_index: usize,
    pub last_advanced_waypoint_index: Option<usize>,
    pub distance_to_target: f32,
    pub previous_distance_to_target: f32,
    pub stuck_phase: StuckPhase,
    pub time_in_phase1: f32,
    pub time_in_phase2: f32,
    pub stuck_baseline: f32,
    pub turn: TurnAnticipation,
    pub slowdown: SlowdownModifier,
    /// Raw `(strafe, 0, throttle)` from the last tick.
    pub control: Vec3,
}

impl CarNavState {
    pub fn new(route_id: RouteId) -> Self {
        Self {
            route_id,
            ..default()
        }
    }

    /// Samples the flat distance to the target waypoint.
    pub fn sample_distance(&mut self, car_position: Vec3, graph: &TrackGraph) {
        let Some(target) = graph.waypoint(self.route_id, self.target_waypoint_index) else {
            return;
        };
        let flat = target.position.with_y(car_position.y);
        self.previous_distance_to_target = self.distance_to_target;
        self.distance_to_target = flat.distance(car_position);
    }

    pub fn reset_stuck(&mut self) {
        self.stuck_phase = StuckPhase::Idle;
        self.time_in_phase1 = 0.0;
        self.time_in_phase2 = 0.0;
    }

    fn stalled(&self) -> bool {
        (self.distance_to_target - self.stuck_baseline).abs() <= MIN_STUCK_DISTANCE
    }

    /// Advances the stuck machine by one tick.
    pub fn tick_stuck(&mut self, flags: CollisionFlags, speed: f32, delta: f32) -> StuckStep {
        if self.time_in_phase2 > STUCK_RELEASE_TIME && flags.is_empty() {
            self.reset_stuck();
        } else if self.time_in_phase2 > STUCK_RELEASE_TIME && !self.stalled() && !flags.blocked() {
            self.reset_stuck();
        } else if flags.blocked() {
            self.stuck_phase = StuckPhase::Suspect;
            self.time_in_phase2 = 0.0;
            self.stuck_baseline = self.distance_to_target;
        }

        if self.stuck_phase == StuckPhase::Suspect {
            if self.time_in_phase1 >= MIN_STUCK_TIME && speed <= STUCK_MAX_SPEED && self.stalled() {
                self.stuck_phase = StuckPhase::Correcting;
                self.time_in_phase1 = 0.0;
                self.time_in_phase2 = 0.0;
            } else if self.time_in_phase1 > MIN_STUCK_TIME {
                self.reset_stuck();
            }
        }

        match self.stuck_phase {
            StuckPhase::Idle => StuckStep::Drive,
            StuckPhase::Suspect => {
                self.time_in_phase1 += delta;
                self.time_in_phase2 += delta;
                StuckStep::Drive
            }
            StuckPhase::Correcting => {
                self.time_in_phase2 += delta;
                StuckStep::Correct
            }
        }
    }

    /// Recomputes the turn anticipation and returns the flattened look target.
    /// Close to the target nothing is steered and the previous cap is kept.
    pub fn anticipate_turn(
        &mut self,
        transform: &Transform,
        graph: &TrackGraph,
        speed_ratio: f32,
    ) -> Option<Vec3> {
        let route = self.route_id;
        let target = graph.waypoint(route, self.target_waypoint_index)?;

        if self.distance_to_target < MIN_WAYPOINT_DISTANCE {
            self.turn.target_angle = 0.0;
            self.turn.next_angle = 0.0;
            self.turn.after_next_angle = 0.0;
            return None;
        }

        let next = graph.next_index_wrapping(route, self.target_waypoint_index);
        let after_next = graph.next_index_wrapping(route, next);
        let angle_to = |index: usize| {
            graph
                .waypoint(route, index)
                .map(|w| heading_angle(transform, w.position))
                .unwrap_or(0.0)
        };

        self.turn.target_angle = heading_angle(transform, target.position);
        self.turn.next_angle = angle_to(next);
        self.turn.after_next_angle = angle_to(after_next);

        match turn_speed_cap(self.turn.next_angle, speed_ratio) {
            Some(cap) if speed_ratio > TURN_CHECK_MIN_SPEED_RATIO => {
                self.turn.is_large_turn = true;
                self.turn.speed_cap_factor = cap;
            }
            _ => self.turn.is_large_turn = false,
        }

        Some(target.position.with_y(transform.translation.y))
    }

    /// Raw `(strafe, 0, throttle)` toward the target waypoint.
    pub fn control_vector(
        &mut self,
        transform: &Transform,
        graph: &TrackGraph,
        speed_ratio: f32,
        delta: f32,
    ) -> Vec3 {
        let Some(target) = graph.waypoint(self.route_id, self.target_waypoint_index) else {
            return Vec3::ZERO;
        };

        let local = to_car_frame(transform, target.position);
        let strafe = strafe_strength(local.x);

        let mut throttle = self.slowdown.throttle(speed_ratio, delta);
        if self.turn.is_large_turn {
            throttle = throttle.min(self.turn.speed_cap_factor);
        }

        self.control = Vec3::new(strafe, 0.0, throttle);
        self.control
    }
}

/// Unsigned angle in degrees between the car heading and a flattened point.
pub fn heading_angle(transform: &Transform, point: Vec3) -> f32 {
    let to_point = (point - transform.translation).with_y(0.0);
    let forward = transform.forward().as_vec3().with_y(0.0);
    if to_point.length_squared() <= f32::EPSILON || forward.length_squared() <= f32::EPSILON {
        return 0.0;
    }
    forward.angle_between(to_point).to_degrees()
}

/// Rotates toward `look_target` at a fixed rate, never snapping.
pub fn turn_toward(transform: &mut Transform, look_target: Vec3, delta: f32) {
    if (look_target - transform.translation).length_squared() <= f32::EPSILON {
        return;
    }
    let look = transform.looking_at(look_target, Vec3::Y).rotation;
    let t = (delta * HEADING_SLERP_RATE).min(1.0);
    transform.rotation = transform.rotation.slerp(look, t);
}

pub fn sample_waypoint_distances(
    graph: Res<TrackGraph>,
    mut cars: Query<(&Transform, &mut CarNavState), With<Car>>,
) {
    for (transform, mut nav) in cars.iter_mut() {
        nav.sample_distance(transform.translation, &graph);
    }
}

pub fn drive_ai_cars(
    time: Res<Time>,
    graph: Res<TrackGraph>,
    mut cars: Query<
        (Entity, &mut Transform, &mut CarNavState, &mut Motor, &SpeedState),
        (With<Car>, With<AIControlled>),
    >,
    mut recoveries: EventWriter<RecoveryRequest>,
) {
    let delta = time.delta_secs();

    for (entity, mut transform, mut nav, mut motor, speed) in cars.iter_mut() {
        if graph.route(nav.route_id).is_empty() {
            warn_once!("route {} has no waypoints, AI cars on it stay idle", nav.route_id);
            motor.input_move = Vec3::ZERO;
            continue;
        }

        if let Some(look_target) = nav.anticipate_turn(&transform, &graph, speed.speed_ratio) {
            turn_toward(&mut transform, look_target, delta);
        }

        let velocity = motor.velocity.length();
        match nav.tick_stuck(motor.collision_flags, velocity, delta) {
            StuckStep::Correct => {
                debug!("car {entity} stuck near waypoint {}", nav.target_waypoint_index);
                recoveries.write(RecoveryRequest {
                    car: entity,
                    reason: RecoveryReason::Stuck,
                });
                motor.input_move = Vec3::ZERO;
            }
            StuckStep::Drive => {
                let raw = nav.control_vector(&transform, &graph, speed.speed_ratio, delta);
                motor.input_move = shape_control_vector(raw, transform.rotation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::WaypointMarker;

    fn square_track() -> TrackGraph {
        let corners = [
            [0.0, 0.0, -200.0],
            [300.0, 0.0, -200.0],
            [300.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ];
        let markers: Vec<WaypointMarker> = corners
            .iter()
            .enumerate()
            .map(|(i, p)| WaypointMarker {
                route_id: 0,
                index: i as i32,
                position: *p,
                start_height: 4.0,
                slow_down: SlowDown::default(),
                active: true,
            })
            .collect();
        TrackGraph::build(&markers)
    }

    fn nav_at(graph: &TrackGraph, transform: &Transform, target: usize) -> CarNavState {
        let mut nav = CarNavState::new(0);
        nav.target_waypoint_index = target;
        nav.sample_distance(transform.translation, graph);
        nav
    }

    #[test]
    fn test_control_vector_strafes_toward_target() {
        let graph = square_track();
        // Facing -Z, target 0 is straight ahead, target 1 is ahead and to the right.
        let transform = Transform::from_xyz(0.0, 0.0, 0.0);

        let mut nav = nav_at(&graph, &transform, 0);
        let straight = nav.control_vector(&transform, &graph, 0.5, 0.1);
        assert_eq!(straight, Vec3::new(0.0, 0.0, 1.0));

        nav.target_waypoint_index = 1;
        let right = nav.control_vector(&transform, &graph, 0.5, 0.1);
        assert_eq!(right.x, 0.30);
    }

    #[test]
    fn test_slowdown_reduces_throttle_until_expired() {
        let mut slowdown = SlowdownModifier::default();
        slowdown.start(&SlowDown {
            active: true,
            factor: 0.4,
            duration: 1.0,
        });

        // Too slow for a partial slowdown to bite.
        assert_eq!(slowdown.throttle(0.2, 0.5), 1.0);
        assert_eq!(slowdown.throttle(0.8, 0.5), 0.4);
        assert_eq!(slowdown.throttle(0.8, 0.6), 0.4);
        assert!(!slowdown.active);
        assert_eq!(slowdown.throttle(0.8, 0.1), 1.0);
    }

    #[test]
    fn test_large_turn_caps_throttle() {
        let graph = square_track();
        let transform = Transform::from_xyz(0.0, 0.0, 0.0);
        let mut nav = nav_at(&graph, &transform, 0);

        // Next waypoint (1) sits about 56 degrees off the heading.
        nav.anticipate_turn(&transform, &graph, 0.9);
        assert!(nav.turn.is_large_turn);
        assert!((nav.turn.next_angle - 56.31).abs() < 0.01);
        assert_eq!(nav.turn.speed_cap_factor, 0.25);

        let control = nav.control_vector(&transform, &graph, 0.9, 0.1);
        assert_eq!(control.z, 0.25);
    }

    #[test]
    fn test_slow_cars_skip_turn_caps() {
        let graph = square_track();
        let transform = Transform::from_xyz(0.0, 0.0, 0.0);
        let mut nav = nav_at(&graph, &transform, 0);

        nav.anticipate_turn(&transform, &graph, 0.1);
        assert!(!nav.turn.is_large_turn);
    }

    #[test]
    fn test_close_to_target_keeps_previous_cap() {
        let graph = square_track();
        let transform = Transform::from_xyz(0.0, 0.0, -190.0);
        let mut nav = nav_at(&graph, &transform, 0);
        nav.turn.is_large_turn = true;
        nav.turn.speed_cap_factor = 0.4;
        nav.turn.next_angle = 50.0;

        assert!(nav.anticipate_turn(&transform, &graph, 0.9).is_none());
        assert_eq!(nav.turn.next_angle, 0.0);
        assert!(nav.turn.is_large_turn);
        assert_eq!(nav.turn.speed_cap_factor, 0.4);
    }

    #[test]
    fn test_heading_turns_gradually() {
        let mut transform = Transform::from_xyz(0.0, 0.0, 0.0);
        let target = Vec3::new(100.0, 0.0, 0.0);

        turn_toward(&mut transform, target, 1.0 / 60.0);
        let after_one_tick = heading_angle(&transform, target);
        assert!(after_one_tick > 1.0 && after_one_tick < 90.0);

        for _ in 0..300 {
            turn_toward(&mut transform, target, 1.0 / 60.0);
        }
        assert!(heading_angle(&transform, target) < 0.5);
    }

    #[test]
    fn test_stuck_car_is_corrected() {
        let mut nav = CarNavState::new(0);
        nav.distance_to_target = 100.0;
        let step = nav.tick_stuck(CollisionFlags::SIDES | CollisionFlags::BELOW, 0.0, 0.1);
        assert_eq!(step, StuckStep::Drive);
        assert_eq!(nav.stuck_phase, StuckPhase::Suspect);
        assert_eq!(nav.stuck_baseline, 100.0);

        nav.distance_to_target = 95.0;
        let mut corrected = false;
        for _ in 0..35 {
            if nav.tick_stuck(CollisionFlags::BELOW, 10.0, 0.1) == StuckStep::Correct {
                corrected = true;
                break;
            }
        }
        assert!(corrected);
        assert_eq!(nav.stuck_phase, StuckPhase::Correcting);
    }

    #[test]
    fn test_suspect_clears_when_car_keeps_moving() {
        let mut nav = CarNavState::new(0);
        nav.distance_to_target = 100.0;
        nav.tick_stuck(CollisionFlags::SIDES, 0.0, 0.1);

        for _ in 0..40 {
            nav.tick_stuck(CollisionFlags::BELOW, 120.0, 0.1);
        }

        assert_eq!(nav.stuck_phase, StuckPhase::Idle);
        assert_eq!(nav.time_in_phase1, 0.0);
    }

    #[test]
    fn test_progress_away_from_baseline_resets_to_idle() {
        let mut nav = CarNavState::new(0);
        nav.distance_to_target = 100.0;
        nav.tick_stuck(CollisionFlags::SIDES, 0.0, 0.1);
        for _ in 0..12 {
            nav.tick_stuck(CollisionFlags::BELOW, 10.0, 0.1);
        }

        nav.distance_to_target = 40.0;
        nav.tick_stuck(CollisionFlags::BELOW, 10.0, 0.1);

        assert_eq!(nav.stuck_phase, StuckPhase::Idle);
    }

    #[test]
    fn test_empty_route_is_ignored() {
        let graph = TrackGraph::default();
        let transform = Transform::default();
        let mut nav = CarNavState::new(4);

        nav.sample_distance(transform.translation, &graph);
        assert!(nav.anticipate_turn(&transform, &graph, 1.0).is_none());
        assert_eq!(nav.control_vector(&transform, &graph, 1.0, 0.1), Vec3::ZERO);
    }
}
