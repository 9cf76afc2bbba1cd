use crate::game_logic::{
    AIControlled, ApplyHit, BASE_BOOST, BASE_NON_BOOST, Car, CarId, CarTuning, GUN_RELOAD_TIME,
    GUN_SHOT_DIST, HIT_ROLL_MAX, MAX_EXPLOSION_TIME, MIN_TARGET_TO_FIRE_TIME, Motor,
    PASS_GO_TIME, PASS_MERGE_TIME, RaceContext, RaceRng, SAFE_FOLLOW_DIST, SENSOR_RADIUS,
    SpeedState, SpeedType, TRIGGER_SPEED_PASSING, TRIGGER_TIME_PASSING, TimedFlag, to_car_frame,
};
use bevy::prelude::*;
use rand::Rng;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PassingMode {
    #[default]
    None,
    MergingLeft,
    Accelerating,
}

/// Displacement velocities of a passing maneuver. The dominant velocity axis
/// gets the boost, the other axis a small sideways nudge.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoostVectors {
    pub merge: Vec3,
    pub go: Vec3,
}

impl BoostVectors {
    pub fn from_velocity(velocity: Vec3) -> Self {
        let sign = |v: f32| if v < 0.0 { -1.0 } else { 1.0 };
        if velocity.x.abs() > velocity.z.abs() {
            Self {
                go: Vec3::new(BASE_BOOST * sign(velocity.x), 0.0, 0.0),
                merge: Vec3::new(0.0, 0.0, BASE_NON_BOOST * sign(velocity.z)),
            }
        } else {
            Self {
                go: Vec3::new(0.0, 0.0, BASE_BOOST * sign(velocity.z)),
                merge: Vec3::new(BASE_NON_BOOST * sign(velocity.x), 0.0, 0.0),
            }
        }
    }
}

// transitions between the passing states
enum Transition {
    None,
    ToMerging(BoostVectors),
    ToAccelerating,
    ToCruising,
}

pub struct PassInput {
    pub delta: f32,
    /// `None` while a maneuver runs and rivals are not evaluated.
    pub candidate: Option<bool>,
    pub velocity: Vec3,
}

/// What changed in the passing machine this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassEvent {
    None,
    Started,
    Finished,
    Cancelled,
}

// state defines the behavior shared by the passing states
trait PassState: Send + Sync {
    fn mode(&self) -> PassingMode;
    fn to_cruising(self: Box<Self>) -> Box<dyn PassState>;
    fn to_merging(self: Box<Self>, vectors: BoostVectors) -> Box<dyn PassState>;
    fn to_accelerating(self: Box<Self>) -> Box<dyn PassState>;

    fn execute(&mut self, input: &PassInput) -> Transition;
    /// Scripted displacement velocity for this tick.
    fn displacement(&self) -> Vec3;
    fn dwell(&self) -> f32 {
        0.0
    }
}

/// Following traffic, accumulating time behind a slower rival.
struct Cruising {
    candidate_time: f32,
}

impl PassState for Cruising {
    fn mode(&self) -> PassingMode {
        PassingMode::None
    }
    fn to_cruising(self: Box<Self>) -> Box<dyn PassState> {
        self
    }
    fn to_merging(self: Box<Self>, vectors: BoostVectors) -> Box<dyn PassState> {
        Box::new(Merging {
            vectors,
            elapsed: 0.0,
        })
    }
    fn to_accelerating(self: Box<Self>) -> Box<dyn PassState> {
        self
    }

    fn execute(&mut self, input: &PassInput) -> Transition {
        match input.candidate {
            Some(true) => {
                self.candidate_time += input.delta;
                if self.candidate_time > TRIGGER_TIME_PASSING {
                    return Transition::ToMerging(BoostVectors::from_velocity(input.velocity));
                }
            }
            Some(false) => self.candidate_time = 0.0,
            None => {}
        }
        Transition::None
    }

    fn displacement(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn dwell(&self) -> f32 {
        self.candidate_time
    }
}

/// Sliding out from behind the rival.
struct Merging {
    vectors: BoostVectors,
    elapsed: f32,
}

impl PassState for Merging {
    fn mode(&self) -> PassingMode {
        PassingMode::MergingLeft
    }
    fn to_cruising(self: Box<Self>) -> Box<dyn PassState> {
        Box::new(Cruising {
            candidate_time: 0.0,
        })
    }
    fn to_merging(self: Box<Self>, _vectors: BoostVectors) -> Box<dyn PassState> {
        self
    }
    fn to_accelerating(self: Box<Self>) -> Box<dyn PassState> {
        Box::new(Accelerating {
            vectors: self.vectors,
            elapsed: 0.0,
        })
    }

    fn execute(&mut self, input: &PassInput) -> Transition {
        self.elapsed += input.delta;
        if self.elapsed >= PASS_MERGE_TIME {
            Transition::ToAccelerating
        } else {
            Transition::None
        }
    }

    fn displacement(&self) -> Vec3 {
        self.vectors.merge
    }
}

/// Going past the rival.
struct Accelerating {
    vectors: BoostVectors,
    elapsed: f32,
}

impl PassState for Accelerating {
    fn mode(&self) -> PassingMode {
        PassingMode::Accelerating
    }
    fn to_cruising(self: Box<Self>) -> Box<dyn PassState> {
        Box::new(Cruising {
            candidate_time: 0.0,
        })
    }
    fn to_merging(self: Box<Self>, _vectors: BoostVectors) -> Box<dyn PassState> {
        self
    }
    fn to_accelerating(self: Box<Self>) -> Box<dyn PassState> {
        self
    }

    fn execute(&mut self, input: &PassInput) -> Transition {
        self.elapsed += input.delta;
        if self.elapsed >= PASS_GO_TIME {
            Transition::ToCruising
        } else {
            Transition::None
        }
    }

    fn displacement(&self) -> Vec3 {
        self.vectors.go
    }
}

pub struct PassingMachine {
    // the state is boxed so each phase can carry its own timers
    state: Option<Box<dyn PassState>>,
}

impl Default for PassingMachine {
    fn default() -> Self {
        Self {
            state: Some(Box::new(Cruising {
                candidate_time: 0.0,
            })),
        }
    }
}

impl PassingMachine {
    pub fn mode(&self) -> PassingMode {
        self.state
            .as_ref()
            .map(|s| s.mode())
            .unwrap_or_default()
    }

    pub fn is_passing(&self) -> bool {
        self.mode() != PassingMode::None
    }

    /// Seconds the pass condition has held while cruising.
    pub fn dwell(&self) -> f32 {
        self.state.as_ref().map(|s| s.dwell()).unwrap_or(0.0)
    }

    pub fn displacement(&self) -> Vec3 {
        self.state
            .as_ref()
            .map(|s| s.displacement())
            .unwrap_or(Vec3::ZERO)
    }

    pub fn update(&mut self, input: &PassInput) -> PassEvent {
        let Some(mut s) = self.state.take() else {
            return PassEvent::None;
        };
        let transition = s.execute(input);
        let (next, event) = match transition {
            Transition::None => (s, PassEvent::None),
            Transition::ToMerging(vectors) => (s.to_merging(vectors), PassEvent::Started),
            Transition::ToAccelerating => (s.to_accelerating(), PassEvent::None),
            Transition::ToCruising => (s.to_cruising(), PassEvent::Finished),
        };
        self.state = Some(next);
        event
    }

    /// Drops any maneuver in progress. Returns true if one was running.
    pub fn cancel(&mut self) -> bool {
        let was_passing = self.is_passing();
        self.state = Some(Box::new(Cruising {
            candidate_time: 0.0,
        }));
        was_passing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shot {
    pub target: Entity,
    pub hit: bool,
}

/// A 1..=5 roll; only a 3 misses.
pub fn is_hit_roll(roll: u8) -> bool {
    matches!(roll, 1 | 2 | 4 | 5)
}

#[derive(Clone, Debug, Default)]
pub struct TargetingState {
    pub gun_on: bool,
    pub ammo: u32,
    pub target: Option<Entity>,
    pub time_held: f32,
    pub can_fire: bool,
    pub is_reloading: bool,
    pub reload_elapsed: f32,
    pub explosion: TimedFlag,
    pub last_shot: Option<Shot>,
}

impl TargetingState {
    fn armed(&self) -> bool {
        self.gun_on && self.ammo > 0 && !self.is_reloading
    }

    pub fn lock(&mut self, target: Entity) {
        self.target = Some(target);
        self.time_held = 0.0;
        self.can_fire = false;
    }

    pub fn cancel(&mut self) {
        self.target = None;
        self.time_held = 0.0;
        self.can_fire = false;
    }

    /// Spends one round on the locked target and starts the reload.
    pub fn fire(&mut self, roll: u8) -> Option<Shot> {
        let target = self.target?;
        self.cancel();
        self.ammo = self.ammo.saturating_sub(1);
        if self.ammo == 0 {
            self.gun_on = false;
        }
        let shot = Shot {
            target,
            hit: is_hit_roll(roll),
        };
        self.last_shot = Some(shot);
        self.explosion.set();
        self.is_reloading = true;
        self.reload_elapsed = 0.0;
        Some(shot)
    }

    pub fn tick(&mut self, delta: f32) {
        if self.target.is_some() && !self.is_reloading {
            self.time_held += delta;
            if self.time_held >= MIN_TARGET_TO_FIRE_TIME {
                self.time_held = 0.0;
                self.can_fire = true;
            }
        } else if self.is_reloading {
            self.reload_elapsed += delta;
            if self.reload_elapsed >= GUN_RELOAD_TIME {
                self.is_reloading = false;
                self.reload_elapsed = 0.0;
            }
        }

        self.explosion.tick(delta, MAX_EXPLOSION_TIME);
        if !self.explosion.on {
            self.last_shot = None;
        }
    }
}

/// The car being evaluated by the arbitration.
pub struct OwnCar {
    pub velocity: Vec3,
    pub speed: f32,
    pub max_speed: f32,
    pub jumping: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbitrationOutcome {
    pub pass_event: PassEvent,
    pub shot: Option<Shot>,
}

/// Proximity sensor plus the passing and targeting machines of one car.
#[derive(Component, Default)]
pub struct CarSensor {
    /// Rivals within sensor range as `(entity, position)`, ordered by car id.
    pub in_range: Vec<(Entity, Vec3)>,
    pub passing: PassingMachine,
    pub targeting: TargetingState,
}

impl CarSensor {
    /// Rebuilds the in-range set from every other car. Returns true when the
    /// set is non-empty.
    pub fn refresh<'a, I>(&mut self, own: Entity, own_position: Vec3, cars: I) -> bool
    where
        I: IntoIterator<Item = &'a (Entity, CarId, Vec3)>,
    {
        let mut in_range: Vec<(CarId, Entity, Vec3)> = cars
            .into_iter()
            .filter(|(entity, _, position)| {
                *entity != own && position.distance(own_position) <= SENSOR_RADIUS
            })
            .map(|(entity, id, position)| (*id, *entity, *position))
            .collect();
        in_range.sort_by_key(|(id, _, _)| *id);
        self.in_range = in_range.into_iter().map(|(_, e, p)| (e, p)).collect();

        if let Some(target) = self.targeting.target {
            if !self.in_range.iter().any(|(e, _)| *e == target) {
                self.targeting.cancel();
            }
        }
        !self.in_range.is_empty()
    }

    /// Runs one tick of passing and targeting for this car.
    pub fn arbitrate<R: FnMut() -> u8>(
        &mut self,
        own_transform: &Transform,
        own: &OwnCar,
        guns_enabled: bool,
        delta: f32,
        mut roll: R,
    ) -> ArbitrationOutcome {
        let mut shot = None;
        let mut candidate = None;

        if !self.passing.is_passing() {
            let mut found = false;
            for (rival, position) in &self.in_range {
                let locked_on_rival = self.targeting.target == Some(*rival);
                // Only rivals ahead can be passed or shot at.
                if to_car_frame(own_transform, *position).z <= 0.0 {
                    if locked_on_rival {
                        self.targeting.cancel();
                    }
                    continue;
                }
                let distance = position.distance(own_transform.translation);

                if distance <= SAFE_FOLLOW_DIST && own.speed >= TRIGGER_SPEED_PASSING * own.max_speed {
                    found = true;
                    break;
                }
                if !guns_enabled {
                    continue;
                }

                let targeting = &mut self.targeting;
                if distance <= GUN_SHOT_DIST && targeting.armed() && targeting.target.is_none() {
                    targeting.lock(*rival);
                } else if distance <= GUN_SHOT_DIST
                    && locked_on_rival
                    && targeting.armed()
                    && targeting.can_fire
                {
                    shot = targeting.fire(roll());
                } else if distance > GUN_SHOT_DIST && locked_on_rival {
                    targeting.cancel();
                }
            }
            candidate = Some(found);
        }

        let mut pass_event = self.passing.update(&PassInput {
            delta,
            candidate,
            velocity: own.velocity,
        });

        if own.jumping && self.passing.cancel() {
            pass_event = PassEvent::Cancelled;
        }

        self.targeting.tick(delta);

        ArbitrationOutcome { pass_event, shot }
    }

    /// Clears any maneuver and target lock, used when the car is reset.
    pub fn clear_maneuvers(&mut self) {
        self.passing.cancel();
        self.targeting.cancel();
    }
}

/// Drafting follows the sensor set for every car.
pub fn sense_rivals(
    mut cars: Query<(Entity, &CarId, &Transform, &mut CarSensor, &mut SpeedState), With<Car>>,
) {
    let snapshot: Vec<(Entity, CarId, Vec3)> = cars
        .iter()
        .map(|(entity, id, transform, _, _)| (entity, *id, transform.translation))
        .collect();

    for (entity, _, transform, mut sensor, mut speed) in cars.iter_mut() {
        speed.drafting = sensor.refresh(entity, transform.translation, &snapshot);
    }
}

pub fn arbitrate_passing_and_targeting(
    time: Res<Time>,
    race: Res<RaceContext>,
    mut rng: ResMut<RaceRng>,
    mut cars: Query<
        (Entity, &Transform, &mut CarSensor, &mut SpeedState, &mut Motor, &CarTuning),
        (With<Car>, With<AIControlled>),
    >,
    mut hits: EventWriter<ApplyHit>,
) {
    let delta = time.delta_secs();
    let guns_enabled = race.race_type.guns_enabled();

    for (entity, transform, mut sensor, mut speed, mut motor, tuning) in cars.iter_mut() {
        let own = OwnCar {
            velocity: motor.velocity,
            speed: speed.speed,
            max_speed: tuning.max_speed,
            jumping: speed.jumping,
        };
        let outcome = sensor.arbitrate(transform, &own, guns_enabled, delta, || {
            rng.0.random_range(1..=HIT_ROLL_MAX)
        });

        match outcome.pass_event {
            PassEvent::Started => {
                debug!("car {entity} starts passing");
                speed.passing = true;
                speed.speed_type = SpeedType::Boost;
            }
            PassEvent::Finished | PassEvent::Cancelled => {
                speed.passing = false;
                speed.speed_type = SpeedType::Norm;
            }
            PassEvent::None => {}
        }
        motor.external_move = sensor.passing.displacement();

        if let Some(shot) = outcome.shot {
            debug!(
                "car {entity} fires at {} ({})",
                shot.target,
                if shot.hit { "hit" } else { "miss" }
            );
            if shot.hit {
                hits.write(ApplyHit {
                    shooter: entity,
                    target: shot.target,
                });
            }
        }
    }
}
