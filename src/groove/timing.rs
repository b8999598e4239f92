// Musical Timing - Tempo to step / beat / measure durations
// Sixteenth-note steps, four beats per measure

use serde::{Deserialize, Serialize};

use crate::project::DEFAULT_BPM;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

/// Steps per beat (sixteenth notes)
pub const STEPS_PER_BEAT: u32 = 4;

/// Beats per song section
pub const BEATS_PER_MEASURE: u32 = 4;

/// Clamp a tempo into the supported range (non-finite → default)
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}

/// Project tempo with derived durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub bpm: f64,
}

impl Tempo {
    pub fn new(bpm: f64) -> Self {
        Tempo { bpm: clamp_bpm(bpm) }
    }

    pub fn beat_duration(&self) -> f64 {
        60.0 / self.bpm
    }

    /// One sixteenth note
    pub fn step_duration(&self) -> f64 {
        self.beat_duration() / STEPS_PER_BEAT as f64
    }

    /// One section (4 beats)
    pub fn measure_duration(&self) -> f64 {
        self.beat_duration() * BEATS_PER_MEASURE as f64
    }

    pub fn steps_to_seconds(&self, steps: f64) -> f64 {
        steps * self.step_duration()
    }

    pub fn seconds_to_steps(&self, seconds: f64) -> f64 {
        seconds / self.step_duration()
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo::new(DEFAULT_BPM)
    }
}
