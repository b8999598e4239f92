// Macro Mapper - Normalized musical knobs to concrete synthesis parameters
// Kick designer (punch/clean/tight) and pulse designer (depth/rate/shape/resonance)

pub mod kick;
pub mod pulse;

pub use kick::{map_kick_params, map_kick_params_with, KickCurves, KickMacroPatch, KickMacros, KickParams};
pub use pulse::{
    map_pulse_params, resolve_pulse_settings, PulseMode, PulseOverrides, PulseParams,
    PulseSettings, PulseShape, PulseTarget,
};
