pub mod constants;
pub mod components;
pub mod difficulty;
pub mod thresholds;
pub mod track;
pub mod physics;
pub mod collisions;
pub mod navigation;
pub mod recovery;
pub mod lap_system;
pub mod lap_times;
pub mod car_sensor;
pub mod combat;
pub mod powerups;
pub mod hud;
pub mod race;

pub use constants::*;
pub use components::*;
pub use difficulty::*;
pub use thresholds::*;
pub use track::*;
pub use physics::*;
pub use collisions::*;
pub use navigation::*;
pub use recovery::*;
pub use lap_system::*;
pub use lap_times::*;
pub use car_sensor::*;
pub use combat::*;
pub use powerups::*;
pub use hud::*;
pub use race::*;
