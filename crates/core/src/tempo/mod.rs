//! Tempo arithmetic shared by the clock, the loopers and the command line host.

use std::time::Duration;

use crate::{ClockError, Result};

pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_BEAT_DIVISIONS: u32 = 8;

fn is_valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// BPM plus the number of divisions each beat is split into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
    beat_divisions: u32,
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beat_divisions: DEFAULT_BEAT_DIVISIONS,
        }
    }
}

impl Tempo {
    /// Builds a tempo, rejecting values that cannot yield a positive division.
    pub fn new(bpm: f64, beat_divisions: u32) -> Result<Self> {
        if !is_valid_bpm(bpm) || beat_divisions == 0 {
            return Err(ClockError::InvalidTempo {
                bpm,
                beat_divisions,
            });
        }
        Ok(Self {
            bpm,
            beat_divisions,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beat_divisions(&self) -> u32 {
        self.beat_divisions
    }

    /// Replaces the BPM. Non-positive or non-finite values are ignored and the
    /// previous BPM is kept; the return value reports whether it changed.
    pub fn set_bpm(&mut self, bpm: f64) -> bool {
        if !is_valid_bpm(bpm) {
            return false;
        }
        self.bpm = bpm;
        true
    }

    /// Length of one beat.
    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm)
    }

    /// `(60 / bpm) / beat_divisions`, the smallest schedulable unit.
    pub fn division_duration(&self) -> Duration {
        Duration::from_secs_f64((60.0 / self.bpm) / f64::from(self.beat_divisions))
    }

    /// Converts a length expressed in beats to wall-clock time.
    pub fn beats_to_duration(&self, beats: f64) -> Option<Duration> {
        if !beats.is_finite() || beats <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(60.0 / self.bpm * beats))
    }
}
