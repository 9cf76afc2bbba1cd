use anyhow::{Context, Result, bail};
use bevy::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::game_logic::MAX_LAP_TIME_ENTRIES;

const FIELD_SEPARATOR: &str = "~";
const RECORD_SEPARATOR: &str = "^";

/// Lap duration as shown on the HUD (`mm:ss:mmm`) and as a sortable number
/// (`hhmmssmmm`).
pub fn format_lap_time(seconds: f32) -> (String, u64) {
    let total_ms = (seconds.max(0.0) as f64 * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    let label = format!("{mins:02}:{secs:02}:{ms:03}");
    let numeric = hours * 10_000_000 + mins * 100_000 + secs * 1_000 + ms;
    (label, numeric)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LapTime {
    pub time: String,
    pub time_num: u64,
    pub track: u32,
    pub race_type: u32,
    pub difficulty: u32,
    pub lap: u32,
}

impl LapTime {
    pub fn new(seconds: f32, track: u32, race_type: u32, difficulty: u32, lap: u32) -> Self {
        let (time, time_num) = format_lap_time(seconds);
        Self {
            time,
            time_num,
            track,
            race_type,
            difficulty,
            lap,
        }
    }

    fn same_event(&self, track: u32, race_type: u32, difficulty: u32) -> bool {
        self.track == track && self.race_type == race_type && self.difficulty == difficulty
    }
}

impl fmt::Display for LapTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = FIELD_SEPARATOR;
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.time, self.time_num, self.track, self.race_type, self.difficulty, self.lap
        )
    }
}

impl FromStr for LapTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        if fields.len() != 6 {
            bail!("expected 6 fields in lap time record, found {}", fields.len());
        }
        Ok(Self {
            time: fields[0].to_string(),
            time_num: fields[1].parse().context("bad numeric time")?,
            track: fields[2].parse().context("bad track id")?,
            race_type: fields[3].parse().context("bad race type")?,
            difficulty: fields[4].parse().context("bad difficulty")?,
            lap: fields[5].parse().context("bad lap number")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LapTimeLog {
    entries: Vec<LapTime>,
}

impl LapTimeLog {
    pub fn entries(&self) -> &[LapTime] {
        &self.entries
    }

    /// Appends a lap and drops the oldest ones past the retention limit.
    pub fn add(&mut self, lap: LapTime) {
        self.entries.push(lap);
        if self.entries.len() > MAX_LAP_TIME_ENTRIES {
            let excess = self.entries.len() - MAX_LAP_TIME_ENTRIES;
            self.entries.drain(..excess);
        }
    }

    pub fn best(&self, track: u32, race_type: u32, difficulty: u32) -> Option<&LapTime> {
        self.entries
            .iter()
            .filter(|e| e.same_event(track, race_type, difficulty))
            .min_by_key(|e| e.time_num)
    }

    pub fn serialize(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(RECORD_SEPARATOR)
    }

    /// Parses a stored log, skipping records that do not parse.
    pub fn parse(data: &str) -> Self {
        let mut log = Self::default();
        for record in data.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty()) {
            match record.trim().parse::<LapTime>() {
                Ok(lap) => log.add(lap),
                Err(err) => warn!("skipping lap time record {record:?}: {err:#}"),
            }
        }
        log
    }
}

/// Lap log backed by a file.
#[derive(Resource, Clone, Debug, Default)]
pub struct LapTimeStore {
    pub path: Option<PathBuf>,
    pub log: LapTimeLog,
}

impl LapTimeStore {
    /// Keeps laps in memory only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let log = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("failed to read lap times from {}", path.display()))?;
            LapTimeLog::parse(&data)
        } else {
            LapTimeLog::default()
        };
        Ok(Self {
            path: Some(path),
            log,
        })
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        fs::write(path, self.log.serialize())
            .with_context(|| format!("failed to write lap times to {}", path.display()))
    }

    /// Logs a lap and persists the log. Write failures never stop the race.
    pub fn record(&mut self, lap: LapTime) {
        self.log.add(lap);
        if let Err(err) = self.save() {
            warn!("{err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lap_time() {
        assert_eq!(format_lap_time(0.0), ("00:00:000".to_string(), 0));
        assert_eq!(format_lap_time(83.456), ("01:23:456".to_string(), 123_456));
        assert_eq!(format_lap_time(3725.5), ("02:05:500".to_string(), 10_205_500));
    }

    #[test]
    fn test_record_format() {
        let lap = LapTime::new(61.25, 3, 1, 2, 1);
        let text = lap.to_string();

        assert_eq!(text, "01:01:250~101250~3~1~2~1");
        assert_eq!(text.parse::<LapTime>().unwrap(), lap);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let log = LapTimeLog::parse("01:00:000~100000~1~0~1~0^garbage^00:59:000~59000~1~0~1~1");

        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.entries()[1].lap, 1);
    }

    #[test]
    fn test_log_keeps_most_recent_entries() {
        let mut log = LapTimeLog::default();
        for lap in 0..40 {
            log.add(LapTime::new(60.0, 0, 0, 0, lap));
        }

        assert_eq!(log.entries().len(), MAX_LAP_TIME_ENTRIES);
        assert_eq!(log.entries()[0].lap, 8);
        assert_eq!(log.entries().last().map(|e| e.lap), Some(39));
    }

    #[test]
    fn test_best_lap_filters_by_event() {
        let mut log = LapTimeLog::default();
        log.add(LapTime::new(70.0, 1, 0, 1, 0));
        log.add(LapTime::new(65.0, 1, 0, 1, 1));
        log.add(LapTime::new(50.0, 2, 0, 1, 0));
        log.add(LapTime::new(40.0, 1, 2, 1, 0));

        let best = log.best(1, 0, 1).unwrap();
        assert_eq!(best.time, "01:05:000");
        assert!(log.best(9, 0, 0).is_none());
    }

    #[test]
    fn test_store_round_trips_through_file() {
        let path = std::env::temp_dir().join(format!("hover_racers_laps_{}.txt", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut store = LapTimeStore::open(&path).unwrap();
        assert!(store.log.entries().is_empty());
        store.record(LapTime::new(42.0, 0, 0, 0, 0));

        let reopened = LapTimeStore::open(&path).unwrap();
        assert_eq!(reopened.log, store.log);
        let _ = fs::remove_file(&path);
    }
}
