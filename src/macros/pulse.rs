// Pulse Macros - LFO / pattern / random gate settings for the pulse designer
// Layered field resolution (override → character → fallback) and parameter mapping

use serde::{Deserialize, Serialize};

/// How the pulse voice modulates its target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PulseMode {
    /// Continuous LFO modulation
    #[default]
    #[serde(rename = "LFO", alias = "lfo")]
    Lfo,

    /// Step-sequenced gate
    #[serde(alias = "pattern")]
    Pattern,

    /// Probabilistic gate
    #[serde(alias = "random")]
    Random,
}

/// LFO waveform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseShape {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

/// What the modulation drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseTarget {
    #[default]
    Filter,
    Amplitude,
}

/// Partial pulse settings as they appear in chunks and character defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PulseMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<PulseShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resonance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PulseTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
}

/// Fully resolved pulse settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseSettings {
    pub mode: PulseMode,
    pub depth: f32,
    pub rate: f32,
    pub shape: PulseShape,
    pub resonance: f32,
    pub target: PulseTarget,
    pub filter_enabled: bool,
    /// Base filter cutoff in Hz
    pub cutoff: f32,
    pub pattern: Vec<bool>,
    pub probability: f32,
}

pub const FALLBACK_DEPTH: f32 = 0.6;
pub const FALLBACK_RATE: f32 = 0.5;
pub const FALLBACK_RESONANCE: f32 = 0.2;
pub const FALLBACK_CUTOFF: f32 = 1200.0;
pub const FALLBACK_PROBABILITY: f32 = 0.5;
pub const CUTOFF_RANGE: (f32, f32) = (40.0, 18_000.0);

/// Default gate pattern: eighth-note pulse over 8 steps
pub fn fallback_pattern() -> Vec<bool> {
    vec![true, false, true, false, true, false, true, false]
}

impl Default for PulseSettings {
    fn default() -> Self {
        PulseSettings {
            mode: PulseMode::Lfo,
            depth: FALLBACK_DEPTH,
            rate: FALLBACK_RATE,
            shape: PulseShape::Sine,
            resonance: FALLBACK_RESONANCE,
            target: PulseTarget::Filter,
            filter_enabled: true,
            cutoff: FALLBACK_CUTOFF,
            pattern: fallback_pattern(),
            probability: FALLBACK_PROBABILITY,
        }
    }
}

/// Resolve a normalized knob: explicit → character → fallback
///
/// Non-finite layers are skipped; the chosen value is clamped to [0, 1].
pub fn resolve_unit(explicit: Option<f32>, character: Option<f32>, fallback: f32) -> f32 {
    explicit
        .filter(|v| v.is_finite())
        .or(character.filter(|v| v.is_finite()))
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(fallback)
}

/// Resolve the base cutoff in Hz (must be positive), clamped to the audible range
pub fn resolve_cutoff(explicit: Option<f32>, character: Option<f32>) -> f32 {
    let valid = |v: &f32| v.is_finite() && *v > 0.0;
    explicit
        .filter(valid)
        .or(character.filter(valid))
        .map(|v| v.clamp(CUTOFF_RANGE.0, CUTOFF_RANGE.1))
        .unwrap_or(FALLBACK_CUTOFF)
}

/// Resolve the gate pattern; empty patterns count as absent
pub fn resolve_pattern(explicit: Option<&[bool]>, character: Option<&[bool]>) -> Vec<bool> {
    explicit
        .filter(|p| !p.is_empty())
        .or(character.filter(|p| !p.is_empty()))
        .map(|p| p.to_vec())
        .unwrap_or_else(fallback_pattern)
}

/// Resolve any enum-like field
pub fn resolve_choice<T: Copy + Default>(explicit: Option<T>, character: Option<T>) -> T {
    explicit.or(character).unwrap_or_default()
}

/// Build full pulse settings from chunk overrides and the character's defaults
pub fn resolve_pulse_settings(
    overrides: &PulseOverrides,
    character: Option<&PulseOverrides>,
) -> PulseSettings {
    let empty = PulseOverrides::default();
    let character = character.unwrap_or(&empty);

    PulseSettings {
        mode: resolve_choice(overrides.mode, character.mode),
        depth: resolve_unit(overrides.depth, character.depth, FALLBACK_DEPTH),
        rate: resolve_unit(overrides.rate, character.rate, FALLBACK_RATE),
        shape: resolve_choice(overrides.shape, character.shape),
        resonance: resolve_unit(overrides.resonance, character.resonance, FALLBACK_RESONANCE),
        target: resolve_choice(overrides.target, character.target),
        filter_enabled: overrides
            .filter_enabled
            .or(character.filter_enabled)
            .unwrap_or(true),
        cutoff: resolve_cutoff(overrides.cutoff, character.cutoff),
        pattern: resolve_pattern(overrides.pattern.as_deref(), character.pattern.as_deref()),
        probability: resolve_unit(
            overrides.probability,
            character.probability,
            FALLBACK_PROBABILITY,
        ),
    }
}

/// Concrete modulation parameters for a pulse voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseParams {
    /// Modulation / gate rate in Hz
    pub rate_hz: f32,

    /// Length of one gate step in seconds (`1 / rate_hz`)
    pub step_seconds: f64,

    /// Modulated value when the gate is closed (Hz for filter, gain for amplitude)
    pub mod_min: f32,

    /// Modulated value when the gate is open
    pub mod_max: f32,

    /// Filter resonance (Q)
    pub q: f32,

    pub shape: PulseShape,
}

/// Rate knob → Hz (0.5 Hz .. 32 Hz, exponential)
pub fn rate_to_hz(rate: f32) -> f32 {
    0.5 * 64f32.powf(rate.clamp(0.0, 1.0))
}

/// Resonance knob → filter Q
pub fn resonance_to_q(resonance: f32) -> f32 {
    let r = resonance.clamp(0.0, 1.0);
    0.7 + 11.3 * r * r
}

/// Map resolved pulse settings to modulation parameters
pub fn map_pulse_params(settings: &PulseSettings) -> PulseParams {
    let rate_hz = rate_to_hz(settings.rate);
    let depth = settings.depth.clamp(0.0, 1.0);

    let (mod_min, mod_max) = match settings.target {
        PulseTarget::Filter => (settings.cutoff * (1.0 - 0.95 * depth), settings.cutoff),
        PulseTarget::Amplitude => (1.0 - depth, 1.0),
    };

    PulseParams {
        rate_hz,
        step_seconds: 1.0 / rate_hz as f64,
        mod_min,
        mod_max,
        q: resonance_to_q(settings.resonance),
        shape: settings.shape,
    }
}
