use anyhow::{Context, Result};
use bevy::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::game_logic::{CpuDifficulty, DEFAULT_TICK_HZ, RaceType, RouteId};

/// Settings for one headless race.
#[derive(Resource, Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub track_file: PathBuf,
    /// Id stored with lap times.
    pub track_id: u32,
    pub route_id: RouteId,
    pub total_laps: u32,
    pub difficulty: CpuDifficulty,
    pub race_type: RaceType,
    pub ai_cars: u32,
    pub hover_height: f32,
    pub countdown_seconds: f32,
    pub off_track_seconds_ai: f32,
    pub off_track_seconds_human: f32,
    pub wrong_direction_seconds: f32,
    pub lap_times_file: Option<PathBuf>,
    pub rng_seed: Option<u64>,
    pub tick_hz: f64,
    /// Stop after this many frames even if nobody has won. 0 runs until the
    /// race is won.
    pub max_frames: u64,
    pub log_filter: String,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            track_file: PathBuf::from("assets/tracks/oval.json"),
            track_id: 0,
            route_id: 0,
            total_laps: 3,
            difficulty: CpuDifficulty::Med,
            race_type: RaceType::Easy,
            ai_cars: 4,
            hover_height: 4.0,
            countdown_seconds: 3.0,
            off_track_seconds_ai: 5.0,
            off_track_seconds_human: 10.0,
            wrong_direction_seconds: 6.0,
            lap_times_file: Some(PathBuf::from("lap_times.txt")),
            rng_seed: None,
            tick_hz: DEFAULT_TICK_HZ,
            max_frames: 0,
            log_filter: "info,hover_racers=debug".to_string(),
        }
    }
}

impl RaceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read race config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse race config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: RaceConfig =
            serde_json::from_str(r#"{ "total_laps": 5, "difficulty": "High", "rng_seed": 9 }"#)
                .unwrap();

        assert_eq!(config.total_laps, 5);
        assert_eq!(config.difficulty, CpuDifficulty::High);
        assert_eq!(config.rng_seed, Some(9));
        assert_eq!(config.ai_cars, 4);
        assert_eq!(config.off_track_seconds_human, 10.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = RaceConfig::load("does/not/exist.json").unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.json"));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = RaceConfig::load("assets/race.json").unwrap();
        assert!(config.track_file.ends_with("oval.json"));
        assert_eq!(config.race_type, RaceType::Battle);
    }
}
