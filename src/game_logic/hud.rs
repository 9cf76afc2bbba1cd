use crate::game_logic::{
    ActiveBoost, CarHealth, CarSensor, RaceContext, RaceProgress, SpeedState, format_lap_time,
};
use bevy::prelude::*;

/// What a race HUD would show for the tracked car. Nothing in the simulation
/// reads it back.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct RaceHud {
    pub speed: u32,
    pub position: usize,
    pub car_count: usize,
    pub lap: u32,
    pub total_laps: u32,
    pub lap_time: String,
    pub ammo: u32,
    pub gun_on: bool,
    pub life: i32,
    pub boosting: bool,
    pub drafting: bool,
    pub passing: bool,
    pub targeting: bool,
    pub wrong_way: bool,
    pub off_track: bool,
    pub lap_complete: bool,
    pub invincible: bool,
    pub armor: bool,
}

impl RaceHud {
    pub fn refresh(
        &mut self,
        progress: &RaceProgress,
        speed: &SpeedState,
        sensor: &CarSensor,
        health: &CarHealth,
        boosting: bool,
    ) {
        self.speed = speed.speed.max(0.0).round() as u32;
        self.position = progress.position;
        self.lap = progress.display_lap();
        self.total_laps = progress.total_laps;
        self.lap_time = format_lap_time(progress.lap_time).0;
        self.ammo = sensor.targeting.ammo;
        self.gun_on = sensor.targeting.gun_on;
        self.life = health.life();
        self.boosting = boosting;
        self.drafting = speed.drafting;
        self.passing = sensor.passing.is_passing();
        self.targeting = sensor.targeting.target.is_some();
        self.wrong_way = progress.wrong_direction;
        self.off_track = progress.off_track;
        self.lap_complete = progress.lap_complete.on;
        self.invincible = health.invincible.on;
        self.armor = health.armor;
    }
}

pub fn update_hud(
    race: Res<RaceContext>,
    mut hud: ResMut<RaceHud>,
    cars: Query<(
        &RaceProgress,
        &SpeedState,
        &CarSensor,
        &CarHealth,
        Has<ActiveBoost>,
    )>,
) {
    let Some(tracked) = race.tracked_car else {
        return;
    };
    let Ok((progress, speed, sensor, health, boosting)) = cars.get(tracked) else {
        return;
    };
    hud.refresh(progress, speed, sensor, health, boosting || speed.passing);
    hud.car_count = cars.iter().count();
}
