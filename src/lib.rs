//! AI core of a hover racing game: waypoint tracks, AI drivers, race
//! progress and the passing/targeting sensor, run on the Bevy ECS.

pub mod config;
pub mod game_logic;

pub use config::RaceConfig;
