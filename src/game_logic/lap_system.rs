use crate::game_logic::{
    AIControlled, Car, CarId, CarNavState, LapTime, LapTimeStore, MAX_BACKWARD_GAP,
    MAX_FORWARD_GAP, MAX_IS_LAP_COMPLETE_TIME, Motor, PlayerControlled, ROAD_EXIT_DELAY,
    RaceContext, RaceState, RecoveryReason, RecoveryRequest, RouteId, SpeedState, SpeedType,
    TimedFlag, TrackGraph, format_lap_time,
};
use bevy::prelude::*;
use std::cmp::Ordering;

/// A car came within trigger range of a waypoint it was not inside before.
#[derive(Event, Clone, Copy, Debug)]
pub struct WaypointEntered {
    pub car: Entity,
    pub route: RouteId,
    pub index: usize,
}

#[derive(Event, Clone, Copy, Debug)]
pub struct RaceWon {
    pub car: Entity,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LapRecord {
    pub label: String,
    pub seconds: f32,
}

#[derive(Component, Clone, Debug, Default)]
pub struct RaceProgress {
    pub current_lap: u32,
    pub total_laps: u32,
    /// 1-based rank.
    pub position: usize,
    /// Seconds since the current lap started.
    pub lap_time: f32,
    pub lap_time_history: Vec<LapRecord>,
    pub pass_count: u32,
    pub jump_count: u32,
    /// Race clock at the last forward advance.
    pub waypoint_stamp: f32,
    /// Waypoint whose trigger caused the last advance.
    pub last_passed_index: Option<usize>,
    /// Waypoint trigger the car is currently inside.
    pub inside_waypoint: Option<usize>,
    pub wrong_direction: bool,
    pub wrong_direction_time: f32,
    pub skipped_waypoint: bool,
    pub lap_complete: TimedFlag,
    pub off_road: bool,
    pub road_exit_time: f32,
    pub off_track: bool,
    pub off_track_time: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WaypointOutcome {
    Advanced,
    LapCompleted { seconds: f32 },
    WrongDirection,
    Reentered,
    Skipped,
}

impl RaceProgress {
    pub fn new(total_laps: u32) -> Self {
        Self {
            total_laps,
            position: 1,
            ..default()
        }
    }

    /// 1-based lap for display.
    pub fn display_lap(&self) -> u32 {
        (self.current_lap + 1).min(self.total_laps.max(1))
    }

    pub fn on_recovered(&mut self) {
        self.jump_count += 1;
        self.inside_waypoint = None;
        self.wrong_direction = false;
        self.wrong_direction_time = 0.0;
        self.off_road = false;
        self.road_exit_time = 0.0;
        self.off_track = false;
        self.off_track_time = 0.0;
    }

    /// Applies a waypoint trigger to the car's progress.
    pub fn process_waypoint(
        &mut self,
        nav: &mut CarNavState,
        index: usize,
        route_len: usize,
        clock: f32,
    ) -> WaypointOutcome {
        let target = nav.target_waypoint_index;
        let next = if index + 1 < route_len { index + 1 } else { 0 };
        let reentry = self.last_passed_index == Some(index) && target == next;
        let gap = (index as i64 + 1) - target as i64;

        self.wrong_direction = index < route_len && (-MAX_BACKWARD_GAP..=-1).contains(&gap);
        self.skipped_waypoint = false;

        if index >= route_len {
            self.skipped_waypoint = true;
            return WaypointOutcome::Skipped;
        }
        if reentry || gap == 0 {
            return WaypointOutcome::Reentered;
        }
        if self.wrong_direction {
            return WaypointOutcome::WrongDirection;
        }
        if !(1..=MAX_FORWARD_GAP).contains(&gap) {
            self.skipped_waypoint = true;
            return WaypointOutcome::Skipped;
        }

        if nav.last_advanced_waypoint_index != Some(target) {
            self.pass_count += 1;
        }
        nav.last_advanced_waypoint_index = Some(target);
        self.last_passed_index = Some(index);
        self.waypoint_stamp = clock;

        if index + 1 < route_len {
            nav.target_waypoint_index = index + 1;
            return WaypointOutcome::Advanced;
        }

        let seconds = self.lap_time;
        let (label, _) = format_lap_time(seconds);
        self.lap_time_history.push(LapRecord { label, seconds });
        self.lap_complete.set();
        self.jump_count = 0;
        self.pass_count = 0;
        nav.target_waypoint_index = 0;
        if self.current_lap < self.total_laps {
            self.current_lap += 1;
        }
        self.lap_time = 0.0;
        WaypointOutcome::LapCompleted { seconds }
    }

    /// Off-road, off-track and wrong-way bookkeeping for one tick. Returns
    /// the speed type to switch to and a recovery to request, if any.
    pub fn tick_track_status(
        &mut self,
        on_road: bool,
        grounded: bool,
        delta: f32,
        off_track_grace: f32,
        wrong_direction_grace: f32,
    ) -> (Option<SpeedType>, Option<RecoveryReason>) {
        let mut speed_change = None;
        let mut recovery = None;

        if on_road {
            if self.off_track {
                speed_change = Some(SpeedType::Norm);
            }
            self.off_road = false;
            self.road_exit_time = 0.0;
            self.off_track = false;
            self.off_track_time = 0.0;
        } else if self.off_track {
            self.off_track_time += delta;
            if self.off_track_time > off_track_grace {
                recovery = Some(RecoveryReason::OffTrack);
            }
        } else {
            self.off_road = true;
            self.road_exit_time += delta;
            if grounded && self.road_exit_time >= ROAD_EXIT_DELAY {
                self.off_track = true;
                self.off_track_time = 0.0;
                speed_change = Some(SpeedType::Slow);
            }
        }

        if self.wrong_direction {
            self.wrong_direction_time += delta;
            if self.wrong_direction_time > wrong_direction_grace {
                recovery = recovery.or(Some(RecoveryReason::WrongDirection));
            }
        } else {
            self.wrong_direction_time = 0.0;
        }

        (speed_change, recovery)
    }
}

/// Flat distance from `point` to the segment `a`-`b`.
pub fn distance_to_segment(point: Vec3, a: Vec3, b: Vec3) -> f32 {
    let p = point.xz();
    let a = a.xz();
    let b = b.xz();
    let ab = b - a;
    let t = if ab.length_squared() > f32::EPSILON {
        ((p - a).dot(ab) / ab.length_squared()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    p.distance(a + ab * t)
}

/// The stretch of road leading to the target waypoint.
fn road_segment(graph: &TrackGraph, nav: &CarNavState) -> Option<(Vec3, Vec3)> {
    let route = graph.route(nav.route_id);
    let target = route.get(nav.target_waypoint_index)?;
    let previous_index = nav
        .target_waypoint_index
        .checked_sub(1)
        .unwrap_or(route.len() - 1);
    let previous = route.get(previous_index)?;
    Some((previous.position, target.position))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Standing {
    pub car: CarId,
    pub lap: u32,
    pub target: usize,
    pub stamp: f32,
}

/// Total order of the race: lap, then waypoint, then who got there first.
pub fn compare_standing(a: &Standing, b: &Standing) -> Ordering {
    b.lap
        .cmp(&a.lap)
        .then(b.target.cmp(&a.target))
        .then(a.stamp.total_cmp(&b.stamp))
        .then(a.car.cmp(&b.car))
}

pub fn detect_waypoint_entries(
    graph: Res<TrackGraph>,
    mut cars: Query<(Entity, &Transform, &CarNavState, &mut RaceProgress), With<Car>>,
    mut entered: EventWriter<WaypointEntered>,
) {
    let radius = graph.trigger_radius;
    for (entity, transform, nav, mut progress) in cars.iter_mut() {
        let position = transform.translation;
        let inside = graph
            .route(nav.route_id)
            .iter()
            .map(|w| (w.index, w.position.with_y(position.y).distance(position)))
            .filter(|(_, distance)| *distance <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index);

        if let Some(index) = inside {
            if progress.inside_waypoint != Some(index) {
                entered.write(WaypointEntered {
                    car: entity,
                    route: nav.route_id,
                    index,
                });
            }
        }
        progress.inside_waypoint = inside;
    }
}

pub fn process_waypoint_entries(
    graph: Res<TrackGraph>,
    mut race: ResMut<RaceContext>,
    mut lap_times: ResMut<LapTimeStore>,
    mut entered: EventReader<WaypointEntered>,
    mut cars: Query<(&mut CarNavState, &mut RaceProgress, Has<AIControlled>)>,
    mut won: EventWriter<RaceWon>,
    mut next_state: ResMut<NextState<RaceState>>,
) {
    for event in entered.read() {
        let Ok((mut nav, mut progress, is_ai)) = cars.get_mut(event.car) else {
            continue;
        };
        if nav.route_id != event.route {
            continue;
        }
        let route_len = graph.route_len(event.route);
        let is_tracked = race.tracked_car == Some(event.car);

        let outcome = progress.process_waypoint(&mut nav, event.index, route_len, race.race_clock);
        match &outcome {
            WaypointOutcome::LapCompleted { seconds } => {
                info!(
                    "car {} completed a lap in {}",
                    event.car,
                    format_lap_time(*seconds).0
                );
                if is_tracked && !race.game_won {
                    lap_times.record(LapTime::new(
                        *seconds,
                        race.track_id,
                        race.race_type.id(),
                        race.difficulty.id(),
                        progress.current_lap,
                    ));
                }
            }
            WaypointOutcome::Skipped => {
                debug!("car {} skipped to waypoint {}", event.car, event.index);
            }
            WaypointOutcome::WrongDirection => {
                debug!("car {} heading the wrong way at {}", event.car, event.index);
            }
            WaypointOutcome::Advanced | WaypointOutcome::Reentered => {}
        }

        let advanced = matches!(
            outcome,
            WaypointOutcome::Advanced | WaypointOutcome::LapCompleted { .. }
        );
        if advanced
            && is_tracked
            && !race.game_won
            && nav.target_waypoint_index == 1
            && progress.current_lap == race.total_laps
        {
            info!("car {} won the race", event.car);
            race.game_won = true;
            won.write(RaceWon { car: event.car });
            next_state.set(RaceState::Finished);
        }

        if is_ai {
            if let Some(slow_down) = graph
                .waypoint(event.route, event.index)
                .map(|w| w.slow_down)
                .filter(|s| s.active)
            {
                nav.slowdown.start(&slow_down);
            }
        }
    }
}

pub fn update_track_status(
    time: Res<Time>,
    graph: Res<TrackGraph>,
    race: Res<RaceContext>,
    mut cars: Query<
        (
            Entity,
            &Transform,
            &CarNavState,
            &Motor,
            &mut RaceProgress,
            &mut SpeedState,
            Has<PlayerControlled>,
        ),
        With<Car>,
    >,
    mut recoveries: EventWriter<RecoveryRequest>,
) {
    let delta = time.delta_secs();
    for (entity, transform, nav, motor, mut progress, mut speed, is_human) in cars.iter_mut() {
        let on_road = road_segment(&graph, nav)
            .map(|(a, b)| distance_to_segment(transform.translation, a, b) <= graph.road_half_width)
            .unwrap_or(true);
        let grace = if is_human {
            race.off_track_grace_human
        } else {
            race.off_track_grace_ai
        };

        let (speed_change, recovery) = progress.tick_track_status(
            on_road,
            motor.grounded,
            delta,
            grace,
            race.wrong_direction_grace,
        );
        if let Some(speed_type) = speed_change {
            speed.speed_type = speed_type;
        }
        if let Some(reason) = recovery {
            recoveries.write(RecoveryRequest { car: entity, reason });
        }
    }
}

pub fn tick_lap_timers(time: Res<Time>, mut cars: Query<&mut RaceProgress>) {
    let delta = time.delta_secs();
    for mut progress in cars.iter_mut() {
        progress.lap_time += delta;
        progress.lap_complete.tick(delta, MAX_IS_LAP_COMPLETE_TIME);
    }
}

pub fn update_positions(
    race: Res<RaceContext>,
    mut won: EventReader<RaceWon>,
    mut cars: Query<(&CarId, &CarNavState, &mut RaceProgress)>,
) {
    let just_won = won.read().count() > 0;
    if race.game_won && !just_won {
        return;
    }

    let mut standings: Vec<Standing> = cars
        .iter()
        .map(|(id, nav, progress)| Standing {
            car: *id,
            lap: progress.current_lap,
            target: nav.target_waypoint_index,
            stamp: progress.waypoint_stamp,
        })
        .collect();
    standings.sort_by(compare_standing);

    for (id, _, mut progress) in cars.iter_mut() {
        if let Some(rank) = standings.iter().position(|s| s.car == *id) {
            progress.position = rank + 1;
        }
    }
}
