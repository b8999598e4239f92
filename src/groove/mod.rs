// Groove Engine - Tempo and pattern scheduling
// Turns chunks into timed trigger calls for the voice layer

pub mod scheduler;
pub mod timing;

pub use scheduler::{hold_steps, schedule_pattern, PatternWindow, TriggerEvent, GLIDE_OVERLAP};
pub use timing::{clamp_bpm, Tempo, BEATS_PER_MEASURE, MAX_BPM, MIN_BPM, STEPS_PER_BEAT};
