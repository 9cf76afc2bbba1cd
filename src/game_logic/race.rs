use crate::config::RaceConfig;
use crate::game_logic::{
    AIControlled, ApplyHit, Car, CarHealth, CarId, CarNavState, CarSensor, CarTuning,
    CpuDifficulty, LapTimeStore, Motor, PlayerControlled, RaceHud, RaceProgress, RaceType,
    RaceWon, RecoveryRequest, RouteId, SpeedState, StartPosition, TrackFile, TrackGraph,
    TrackPickups, WaypointEntered, apply_hits, apply_motor, apply_recoveries,
    arbitrate_passing_and_targeting, collect_powerups, detect_waypoint_entries, drive_ai_cars,
    process_waypoint_entries, resolve_car_contacts, respawn_powerups, sample_waypoint_distances,
    sense_rivals, spawn_powerups, tick_car_condition, tick_lap_timers, update_active_boosts,
    update_hud, update_positions, update_track_status,
};
use bevy::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Race-wide flags and settings shared by every system.
#[derive(Resource, Clone, Debug)]
pub struct RaceContext {
    pub paused: bool,
    pub game_won: bool,
    /// The car whose laps are logged and whose finish ends the race.
    pub tracked_car: Option<Entity>,
    pub total_laps: u32,
    pub race_type: RaceType,
    pub difficulty: CpuDifficulty,
    pub track_id: u32,
    pub route_id: RouteId,
    /// Seconds since the start signal.
    pub race_clock: f32,
    pub off_track_grace_ai: f32,
    pub off_track_grace_human: f32,
    pub wrong_direction_grace: f32,
}

impl RaceContext {
    pub fn from_config(config: &RaceConfig) -> Self {
        Self {
            paused: false,
            game_won: false,
            tracked_car: None,
            total_laps: config.total_laps,
            race_type: config.race_type,
            difficulty: config.difficulty,
            track_id: config.track_id,
            route_id: config.route_id,
            race_clock: 0.0,
            off_track_grace_ai: config.off_track_seconds_ai,
            off_track_grace_human: config.off_track_seconds_human,
            wrong_direction_grace: config.wrong_direction_seconds,
        }
    }
}

impl Default for RaceContext {
    fn default() -> Self {
        Self::from_config(&RaceConfig::default())
    }
}

/// Single random source for the race so that seeded runs repeat.
#[derive(Resource)]
pub struct RaceRng(pub StdRng);

impl RaceRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(StdRng::seed_from_u64(seed)),
            None => Self(StdRng::from_os_rng()),
        }
    }
}

#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RaceState {
    #[default]
    Countdown,
    Racing,
    Finished,
}

/// Per-tick ordering of the race systems.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceSet {
    Motor,
    Sense,
    Navigate,
    Arbitrate,
    Resolve,
    Progress,
}

#[derive(Resource)]
pub struct RaceCountdown(pub Timer);

/// Grid slots taken from the track file.
#[derive(Resource, Clone, Debug, Default)]
pub struct StartGrid(pub Vec<StartPosition>);

/// Cars to put on the grid. Car 0 is the tracked car.
#[derive(Resource, Clone, Copy, Debug)]
pub struct GridSetup {
    pub cars: u32,
    pub hover_height: f32,
}

pub struct RacePlugin {
    pub config: RaceConfig,
    pub track: TrackFile,
}

impl Plugin for RacePlugin {
    fn build(&self, app: &mut App) {
        let lap_times = match &self.config.lap_times_file {
            Some(path) => LapTimeStore::open(path).unwrap_or_else(|err| {
                warn!("lap times unavailable, keeping them in memory: {err:#}");
                LapTimeStore::in_memory()
            }),
            None => LapTimeStore::in_memory(),
        };

        let graph = TrackGraph::from_track_file(&self.track);
        if !graph.route_ids().any(|id| id == self.config.route_id) {
            warn!(
                "track {:?} has no route {}, cars will stay on the grid",
                self.track.name, self.config.route_id
            );
        }

        app.insert_resource(graph)
            .insert_resource(TrackPickups(self.track.pickups.clone()))
            .insert_resource(StartGrid(self.track.start_positions.clone()))
            .insert_resource(GridSetup {
                cars: self.config.ai_cars.max(1),
                hover_height: self.config.hover_height,
            })
            .insert_resource(RaceContext::from_config(&self.config))
            .insert_resource(RaceRng::new(self.config.rng_seed))
            .insert_resource(RaceCountdown(Timer::from_seconds(
                self.config.countdown_seconds.max(0.0),
                TimerMode::Once,
            )))
            .insert_resource(lap_times)
            .init_resource::<RaceHud>()
            .init_state::<RaceState>()
            .add_event::<WaypointEntered>()
            .add_event::<RaceWon>()
            .add_event::<RecoveryRequest>()
            .add_event::<ApplyHit>()
            .configure_sets(
                Update,
                (
                    RaceSet::Motor,
                    RaceSet::Sense,
                    RaceSet::Navigate,
                    RaceSet::Arbitrate,
                    RaceSet::Resolve,
                    RaceSet::Progress,
                )
                    .chain()
                    .run_if(in_state(RaceState::Racing).and(race_running)),
            )
            .add_systems(Startup, (spawn_racers, spawn_powerups))
            .add_systems(Update, tick_countdown.run_if(in_state(RaceState::Countdown)))
            .add_systems(
                Update,
                (
                    (tick_race_clock, apply_motor, update_active_boosts)
                        .chain()
                        .in_set(RaceSet::Motor),
                    (resolve_car_contacts, sense_rivals, sample_waypoint_distances)
                        .chain()
                        .in_set(RaceSet::Sense),
                    drive_ai_cars.in_set(RaceSet::Navigate),
                    (
                        arbitrate_passing_and_targeting,
                        collect_powerups,
                        respawn_powerups,
                    )
                        .chain()
                        .in_set(RaceSet::Arbitrate),
                    (apply_hits, apply_recoveries, tick_car_condition)
                        .chain()
                        .in_set(RaceSet::Resolve),
                    (
                        detect_waypoint_entries,
                        process_waypoint_entries,
                        update_track_status,
                        tick_lap_timers,
                        update_positions,
                        update_hud,
                    )
                        .chain()
                        .in_set(RaceSet::Progress),
                ),
            )
            .add_systems(OnEnter(RaceState::Finished), log_final_standings);
    }
}

fn race_running(race: Res<RaceContext>) -> bool {
    !race.paused
}

/// Grid slot for car `slot`. Cars beyond the listed slots line up behind the
/// last one.
pub fn grid_transform(grid: &[StartPosition], slot: usize, hover_height: f32) -> Transform {
    let (start, extra_rows) = match grid.get(slot) {
        Some(start) => (start.clone(), 0),
        None => match grid.last() {
            Some(last) => (last.clone(), slot + 1 - grid.len()),
            None => (
                StartPosition {
                    position: [0.0, hover_height, 0.0],
                    yaw_deg: 0.0,
                },
                slot,
            ),
        },
    };

    let rotation = Quat::from_rotation_y(start.yaw_deg.to_radians());
    let behind = rotation * Vec3::Z * 30.0 * extra_rows as f32;
    let position = Vec3::from_array(start.position) + behind;
    Transform::from_translation(position.with_y(hover_height)).with_rotation(rotation)
}

pub fn spawn_racers(
    mut commands: Commands,
    grid: Res<StartGrid>,
    setup: Res<GridSetup>,
    mut race: ResMut<RaceContext>,
    mut rng: ResMut<RaceRng>,
) {
    for slot in 0..setup.cars {
        let tracked = slot == 0;
        let tuning = if tracked {
            CarTuning::for_tracked(&mut rng.0)
        } else {
            CarTuning::for_cpu(race.difficulty)
        };

        let mut car = commands.spawn((
            Car,
            CarId(slot),
            AIControlled,
            grid_transform(&grid.0, slot as usize, setup.hover_height),
            Motor::at_height(setup.hover_height),
            SpeedState::default(),
            tuning,
            CarNavState::new(race.route_id),
            RaceProgress::new(race.total_laps),
            CarSensor::default(),
            CarHealth::default(),
        ));
        if tracked {
            car.insert(PlayerControlled);
            race.tracked_car = Some(car.id());
        }
    }
    info!(
        "{} cars on the grid, cpu difficulty {}",
        setup.cars,
        race.difficulty.as_str()
    );
}

pub fn tick_countdown(
    time: Res<Time>,
    mut countdown: ResMut<RaceCountdown>,
    mut next_state: ResMut<NextState<RaceState>>,
) {
    countdown.0.tick(time.delta());
    if countdown.0.finished() {
        info!("go!");
        next_state.set(RaceState::Racing);
    }
}

pub fn tick_race_clock(time: Res<Time>, mut race: ResMut<RaceContext>) {
    race.race_clock += time.delta_secs();
}

pub fn log_final_standings(
    race: Res<RaceContext>,
    lap_times: Res<LapTimeStore>,
    cars: Query<(&CarId, &RaceProgress)>,
) {
    let mut standings: Vec<(&CarId, &RaceProgress)> = cars.iter().collect();
    standings.sort_by_key(|(_, progress)| progress.position);
    for (id, progress) in standings {
        info!(
            "P{} car {} lap {}/{}",
            progress.position,
            id.0,
            progress.display_lap(),
            progress.total_laps
        );
    }
    if let Some(best) = lap_times.log.best(race.track_id, race.race_type.id(), race.difficulty.id()) {
        info!("best lap on track {}: {}", race.track_id, best.time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::WaypointMarker;
    use bevy::state::app::StatesPlugin;
    use bevy::time::TimeUpdateStrategy;
    use std::time::Duration;

    fn loop_track() -> TrackFile {
        let corners = [
            [0.0, 0.0, -150.0],
            [150.0, 0.0, -150.0],
            [150.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ];
        TrackFile {
            name: "loop".into(),
            markers: corners
                .iter()
                .enumerate()
                .map(|(i, p)| WaypointMarker {
                    route_id: 0,
                    index: i as i32,
                    position: *p,
                    start_height: 4.0,
                    slow_down: default(),
                    active: true,
                })
                .collect(),
            start_positions: vec![StartPosition {
                position: [0.0, 4.0, -20.0],
                yaw_deg: 0.0,
            }],
            pickups: Vec::new(),
            trigger_radius: 40.0,
            road_half_width: 60.0,
        }
    }

    fn race_app(cars: u32) -> App {
        race_app_with(RaceConfig {
            ai_cars: cars,
            countdown_seconds: 0.0,
            rng_seed: Some(3),
            lap_times_file: None,
            ..default()
        })
    }

    fn race_app_with(config: RaceConfig) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin))
            .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(16)))
            .add_plugins(RacePlugin {
                config,
                track: loop_track(),
            });
        app
    }

    #[test]
    fn test_grid_slots_beyond_track_line_up_behind() {
        let grid = vec![StartPosition {
            position: [10.0, 0.0, 0.0],
            yaw_deg: 0.0,
        }];

        let first = grid_transform(&grid, 0, 4.0);
        let third = grid_transform(&grid, 2, 4.0);

        assert_eq!(first.translation, Vec3::new(10.0, 4.0, 0.0));
        assert_eq!(third.translation, Vec3::new(10.0, 4.0, 60.0));
    }

    #[test]
    fn test_spawn_tracks_first_car() {
        let mut app = race_app(3);
        app.update();

        let race = app.world().resource::<RaceContext>();
        let tracked = race.tracked_car.expect("tracked car");
        assert!(app.world().get::<PlayerControlled>(tracked).is_some());
        assert_eq!(app.world().get::<CarId>(tracked), Some(&CarId(0)));

        let mut cars = app.world_mut().query_filtered::<Entity, With<Car>>();
        assert_eq!(cars.iter(app.world()).count(), 3);
    }

    #[test]
    fn test_cars_move_once_racing() {
        let mut app = race_app(2);
        for _ in 0..120 {
            app.update();
        }

        let state = app.world().resource::<State<RaceState>>();
        assert_eq!(*state.get(), RaceState::Racing);
        assert!(app.world().resource::<RaceContext>().race_clock > 0.0);

        let tracked = app
            .world()
            .resource::<RaceContext>()
            .tracked_car
            .expect("tracked car");
        let transform = app.world().get::<Transform>(tracked).expect("transform");
        assert!(transform.translation.distance(Vec3::new(0.0, 4.0, -20.0)) > 1.0);
    }

    #[test]
    fn test_negative_countdown_starts_at_once() {
        let mut app = race_app_with(RaceConfig {
            ai_cars: 1,
            countdown_seconds: -2.0,
            lap_times_file: None,
            ..default()
        });
        for _ in 0..3 {
            app.update();
        }

        let state = app.world().resource::<State<RaceState>>();
        assert_eq!(*state.get(), RaceState::Racing);
    }

    #[test]
    fn test_paused_race_holds_clock() {
        let mut app = race_app(1);
        for _ in 0..5 {
            app.update();
        }
        app.world_mut().resource_mut::<RaceContext>().paused = true;
        let clock = app.world().resource::<RaceContext>().race_clock;

        for _ in 0..10 {
            app.update();
        }

        assert_eq!(app.world().resource::<RaceContext>().race_clock, clock);
    }
}
