use crate::game_logic::{
    DEFAULT_LIFE_AMOUNT, INVINC_SECONDS, MAX_GAINED_LIFE_TIME, MAX_IS_SHOT_TIME, MAX_SMOKE_TIME,
    RecoveryReason, RecoveryRequest,
};
use bevy::prelude::*;

/// A landed shot. The target applies it to itself so that damage and the
/// follow-up reset happen in one step.
#[derive(Event, Clone, Copy, Debug)]
pub struct ApplyHit {
    pub shooter: Entity,
    pub target: Entity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitOutcome {
    Absorbed,
    Ignored,
    Damaged,
    Destroyed,
}

/// A flag that clears itself after a fixed time.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimedFlag {
    pub on: bool,
    pub elapsed: f32,
}

impl TimedFlag {
    pub fn set(&mut self) {
        self.on = true;
        self.elapsed = 0.0;
    }

    pub fn tick(&mut self, delta: f32, limit: f32) {
        if !self.on {
            self.elapsed = 0.0;
            return;
        }
        self.elapsed += delta;
        if self.elapsed >= limit {
            self.on = false;
        }
    }
}

#[derive(Component, Clone, Debug)]
pub struct CarHealth {
    pub life_total: i32,
    pub damage: i32,
    pub armor: bool,
    pub invincible: TimedFlag,
    pub is_shot: TimedFlag,
    pub gained_life: TimedFlag,
    pub smoke: TimedFlag,
}

impl Default for CarHealth {
    fn default() -> Self {
        Self {
            life_total: DEFAULT_LIFE_AMOUNT,
            damage: 0,
            armor: false,
            invincible: TimedFlag::default(),
            is_shot: TimedFlag::default(),
            gained_life: TimedFlag::default(),
            smoke: TimedFlag::default(),
        }
    }
}

impl CarHealth {
    pub fn life(&self) -> i32 {
        self.life_total - self.damage
    }

    pub fn grant_invincibility(&mut self) {
        self.invincible.set();
    }

    pub fn heal(&mut self) {
        self.damage = (self.damage - 1).max(0);
        self.gained_life.set();
    }

    pub fn apply_hit(&mut self) -> HitOutcome {
        if self.armor {
            self.armor = false;
            self.is_shot.set();
            self.smoke.set();
            return HitOutcome::Absorbed;
        }
        if self.invincible.on {
            return HitOutcome::Ignored;
        }

        self.damage += 1;
        self.is_shot.set();
        self.smoke.set();
        if self.life() <= 0 {
            self.damage = 0;
            HitOutcome::Destroyed
        } else {
            HitOutcome::Damaged
        }
    }

    pub fn tick(&mut self, delta: f32) {
        self.invincible.tick(delta, INVINC_SECONDS);
        self.is_shot.tick(delta, MAX_IS_SHOT_TIME);
        self.gained_life.tick(delta, MAX_GAINED_LIFE_TIME);
        self.smoke.tick(delta, MAX_SMOKE_TIME);
    }
}

pub fn apply_hits(
    mut hits: EventReader<ApplyHit>,
    mut targets: Query<&mut CarHealth>,
    mut recoveries: EventWriter<RecoveryRequest>,
) {
    for hit in hits.read() {
        let Ok(mut health) = targets.get_mut(hit.target) else {
            continue;
        };
        let outcome = health.apply_hit();
        debug!("car {} shot car {}: {:?}", hit.shooter, hit.target, outcome);
        if outcome == HitOutcome::Destroyed {
            recoveries.write(RecoveryRequest {
                car: hit.target,
                reason: RecoveryReason::Destroyed,
            });
        }
    }
}

pub fn tick_car_condition(time: Res<Time>, mut cars: Query<&mut CarHealth>) {
    let delta = time.delta_secs();
    for mut health in cars.iter_mut() {
        health.tick(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_armor_absorbs_one_hit() {
        let mut health = CarHealth {
            armor: true,
            ..default()
        };

        assert_eq!(health.apply_hit(), HitOutcome::Absorbed);
        assert!(!health.armor);
        assert_eq!(health.damage, 0);
        assert_eq!(health.apply_hit(), HitOutcome::Damaged);
    }

    #[test]
    fn test_invincible_cars_ignore_hits() {
        let mut health = CarHealth::default();
        health.grant_invincibility();

        assert_eq!(health.apply_hit(), HitOutcome::Ignored);
        assert!(!health.is_shot.on);
    }

    #[test]
    fn test_last_life_destroys_and_resets_damage() {
        let mut health = CarHealth::default();

        assert_eq!(health.apply_hit(), HitOutcome::Damaged);
        assert_eq!(health.apply_hit(), HitOutcome::Damaged);
        assert_eq!(health.apply_hit(), HitOutcome::Destroyed);
        assert_eq!(health.damage, 0);
        assert_eq!(health.life(), DEFAULT_LIFE_AMOUNT);
    }

    #[test]
    fn test_invincibility_wears_off() {
        let mut health = CarHealth::default();
        health.grant_invincibility();

        health.tick(INVINC_SECONDS - 1.0);
        assert!(health.invincible.on);
        health.tick(1.0);
        assert!(!health.invincible.on);
    }

    #[test]
    fn test_heal_never_goes_below_zero_damage() {
        let mut health = CarHealth::default();
        health.heal();

        assert_eq!(health.damage, 0);
        assert!(health.gained_life.on);
    }

    fn hit_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_event::<ApplyHit>()
            .add_event::<RecoveryRequest>()
            .add_systems(Update, apply_hits);
        app
    }

    fn requested_recoveries(app: &App) -> Vec<(Entity, RecoveryReason)> {
        let events = app.world().resource::<Events<RecoveryRequest>>();
        events
            .get_cursor()
            .read(events)
            .map(|request| (request.car, request.reason))
            .collect()
    }

    #[test]
    fn test_destroying_hit_requests_recovery_same_tick() {
        let mut app = hit_app();
        let shooter = app.world_mut().spawn(CarHealth::default()).id();
        let target = app
            .world_mut()
            .spawn(CarHealth {
                damage: DEFAULT_LIFE_AMOUNT - 1,
                ..default()
            })
            .id();

        app.world_mut().send_event(ApplyHit { shooter, target });
        app.update();

        assert_eq!(
            requested_recoveries(&app),
            vec![(target, RecoveryReason::Destroyed)]
        );
        assert_eq!(app.world().get::<CarHealth>(target).unwrap().damage, 0);
        assert_eq!(app.world().get::<CarHealth>(shooter).unwrap().damage, 0);
    }

    #[test]
    fn test_survivable_hit_requests_nothing() {
        let mut app = hit_app();
        let shooter = app.world_mut().spawn(CarHealth::default()).id();
        let target = app.world_mut().spawn(CarHealth::default()).id();

        app.world_mut().send_event(ApplyHit { shooter, target });
        app.update();

        assert!(requested_recoveries(&app).is_empty());
        assert_eq!(app.world().get::<CarHealth>(target).unwrap().damage, 1);
    }
}
