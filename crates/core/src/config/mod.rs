use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    tempo::{DEFAULT_BEAT_DIVISIONS, DEFAULT_BPM},
    ClockError, LoopSlots, Result, Tempo,
};

/// Margin subtracted from the division so the tick finishes before the beat.
pub const DEFAULT_LEAD_TIME_US: u64 = 500;

/// Top-level configuration for the clock and the loopers it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub bpm: f64,
    pub beat_divisions: u32,
    pub lead_time_us: u64,
    /// Loop slot name to loop length in beats.
    pub loops: BTreeMap<String, f64>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beat_divisions: DEFAULT_BEAT_DIVISIONS,
            lead_time_us: DEFAULT_LEAD_TIME_US,
            loops: BTreeMap::new(),
        }
    }
}

impl ClockConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let tempo = self.tempo()?;
        if self.lead_time() >= tempo.division_duration() {
            return Err(ClockError::msg(format!(
                "lead time of {}us does not fit in a {:?} division",
                self.lead_time_us,
                tempo.division_duration()
            )));
        }
        for (name, beats) in &self.loops {
            if !beats.is_finite() || *beats <= 0.0 {
                return Err(ClockError::msg(format!(
                    "loop `{name}` must last a positive number of beats (got {beats})"
                )));
            }
        }
        Ok(())
    }

    pub fn tempo(&self) -> Result<Tempo> {
        Tempo::new(self.bpm, self.beat_divisions)
    }

    pub fn lead_time(&self) -> Duration {
        Duration::from_micros(self.lead_time_us)
    }

    pub fn loop_slots(&self) -> LoopSlots {
        LoopSlots::from_lengths(self.loops.iter().map(|(name, beats)| (name.clone(), *beats)))
    }
}
