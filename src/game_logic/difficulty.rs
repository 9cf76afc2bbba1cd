// src/game_logic/difficulty.rs
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum CpuDifficulty {
    Low,
    #[default]
    Med,
    High,
}

impl CpuDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            CpuDifficulty::Low => "Low",
            CpuDifficulty::Med => "Med",
            CpuDifficulty::High => "High",
        }
    }

    /// Numeric id stored with lap times.
    pub fn id(&self) -> u32 {
        match self {
            CpuDifficulty::Low => 0,
            CpuDifficulty::Med => 1,
            CpuDifficulty::High => 2,
        }
    }
}

/// Race rule set. Classic races have no gun play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum RaceType {
    #[default]
    Easy,
    Battle,
    Classic,
}

impl RaceType {
    pub fn id(&self) -> u32 {
        match self {
            RaceType::Easy => 0,
            RaceType::Battle => 1,
            RaceType::Classic => 2,
        }
    }

    pub fn guns_enabled(&self) -> bool {
        !matches!(self, RaceType::Classic)
    }
}
