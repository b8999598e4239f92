// Kick Macros - Punch / clean / tight knobs mapped onto kick synthesis parameters
// Pure curve functions, no state

use serde::{Deserialize, Serialize};

/// Default position for every kick knob
pub const KICK_MACRO_DEFAULT: f32 = 0.5;

/// Normalized kick designer state
///
/// Each knob lives in [0, 1]. Out-of-range values are clamped and
/// non-finite values fall back to [`KICK_MACRO_DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KickMacros {
    /// Attack character: more punch means less noise click, tighter body
    #[serde(default = "default_knob")]
    pub punch: f32,

    /// Saturation control: more clean means less distortion, more headroom
    #[serde(default = "default_knob")]
    pub clean: f32,

    /// Low-end definition: more tight means longer, more defined body
    #[serde(default = "default_knob")]
    pub tight: f32,
}

fn default_knob() -> f32 {
    KICK_MACRO_DEFAULT
}

impl Default for KickMacros {
    fn default() -> Self {
        KickMacros {
            punch: KICK_MACRO_DEFAULT,
            clean: KICK_MACRO_DEFAULT,
            tight: KICK_MACRO_DEFAULT,
        }
    }
}

impl KickMacros {
    /// Create a macro state, sanitizing every knob
    pub fn new(punch: f32, clean: f32, tight: f32) -> Self {
        KickMacros {
            punch: sanitize_knob(punch),
            clean: sanitize_knob(clean),
            tight: sanitize_knob(tight),
        }
    }

    /// Copy with every knob clamped to [0, 1] (non-finite → default)
    pub fn sanitized(&self) -> Self {
        KickMacros::new(self.punch, self.clean, self.tight)
    }

    /// Apply a partial update, returning the merged state
    pub fn merged(&self, patch: &KickMacroPatch) -> Self {
        KickMacros::new(
            patch.punch.unwrap_or(self.punch),
            patch.clean.unwrap_or(self.clean),
            patch.tight.unwrap_or(self.tight),
        )
    }

    /// Patch setting every knob to this state
    pub fn as_patch(&self) -> KickMacroPatch {
        KickMacroPatch {
            punch: Some(self.punch),
            clean: Some(self.clean),
            tight: Some(self.tight),
        }
    }
}

/// Partial kick macro update used by live setters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KickMacroPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tight: Option<f32>,
}

fn sanitize_knob(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        KICK_MACRO_DEFAULT
    }
}

/// Concrete synthesis parameters for one kick voice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KickParams {
    /// Noise click level (linear gain)
    pub transient_level: f32,

    /// Sine body level (linear gain)
    pub body_level: f32,

    /// Body amplitude decay (seconds)
    pub body_decay: f32,

    /// Body release after note-off (seconds)
    pub body_release: f32,

    /// Time for the pitch sweep to reach the fundamental (seconds)
    pub pitch_decay: f32,

    /// Sweep start, in octaves above the fundamental
    pub octaves: f32,

    /// Click amplitude decay (seconds)
    pub click_decay: f32,

    /// Click highpass cutoff (Hz)
    pub click_cutoff: f32,

    /// Saturation drive [0, 1]
    pub distortion_amount: f32,

    /// Saturation wet mix [0, 1]
    pub distortion_wet: f32,

    /// Final output gain (linear)
    pub output_gain: f32,

    /// EQ trims in dB
    pub eq_low_db: f32,
    pub eq_mid_db: f32,
    pub eq_high_db: f32,
}

/// Curve constants for the kick mapping
///
/// Built once and passed by reference; [`KickCurves::STANDARD`] is the
/// tuning used by the built-in pack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KickCurves {
    pub click_max: f32,
    pub body_max: f32,
    pub body_punch_trim: f32,
    pub decay_min: f32,
    pub decay_span: f32,
    pub release_min: f32,
    pub release_span: f32,
    pub pitch_decay_max: f32,
    pub pitch_decay_span: f32,
    pub octaves_max: f32,
    pub octaves_span: f32,
    pub click_decay_min: f32,
    pub click_decay_span: f32,
    pub click_cutoff_min: f32,
    pub click_cutoff_span: f32,
    pub distortion_wet_max: f32,
    pub distortion_amount_min: f32,
    pub distortion_amount_span: f32,
    pub gain_min: f32,
    pub gain_span: f32,
}

impl KickCurves {
    pub const STANDARD: KickCurves = KickCurves {
        click_max: 0.8,
        body_max: 0.9,
        body_punch_trim: 0.1,
        decay_min: 0.18,
        decay_span: 0.42,
        release_min: 0.06,
        release_span: 0.3,
        pitch_decay_max: 0.09,
        pitch_decay_span: 0.06,
        octaves_max: 6.0,
        octaves_span: 3.0,
        click_decay_min: 0.01,
        click_decay_span: 0.025,
        click_cutoff_min: 1200.0,
        click_cutoff_span: 4800.0,
        distortion_wet_max: 0.6,
        distortion_amount_min: 0.1,
        distortion_amount_span: 0.5,
        gain_min: 0.7,
        gain_span: 0.3,
    };
}

impl Default for KickCurves {
    fn default() -> Self {
        KickCurves::STANDARD
    }
}

/// Map kick macros with the standard curves
pub fn map_kick_params(macros: &KickMacros) -> KickParams {
    map_kick_params_with(macros, &KickCurves::STANDARD)
}

/// Map kick macros to synthesis parameters
///
/// - punch lowers the click (`sqrt(1 - punch)`) and trims the body slightly
/// - tight lengthens decay/release, shortens the pitch sweep and narrows it
/// - clean lowers saturation and raises output gain
/// - EQ trims are fixed linear combinations of punch and clean
pub fn map_kick_params_with(macros: &KickMacros, curves: &KickCurves) -> KickParams {
    let KickMacros { punch, clean, tight } = macros.sanitized();
    let dirt = 1.0 - clean;

    KickParams {
        transient_level: curves.click_max * (1.0 - punch).sqrt(),
        body_level: curves.body_max - curves.body_punch_trim * punch,
        body_decay: curves.decay_min + curves.decay_span * tight,
        body_release: curves.release_min + curves.release_span * tight,
        pitch_decay: curves.pitch_decay_max - curves.pitch_decay_span * tight,
        octaves: curves.octaves_max - curves.octaves_span * tight,
        click_decay: curves.click_decay_min + curves.click_decay_span * (1.0 - punch),
        click_cutoff: curves.click_cutoff_min + curves.click_cutoff_span * (1.0 - tight),
        distortion_amount: curves.distortion_amount_min + curves.distortion_amount_span * dirt,
        distortion_wet: curves.distortion_wet_max * dirt * dirt,
        output_gain: curves.gain_min + curves.gain_span * clean,
        eq_low_db: -1.0 + 4.0 * punch + 1.0 * clean,
        eq_mid_db: 0.5 - 1.0 * punch - 2.0 * clean,
        eq_high_db: -1.0 - 2.0 * punch + 3.0 * clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(steps: usize) -> Vec<f32> {
        (0..=steps).map(|i| i as f32 / steps as f32).collect()
    }

    #[test]
    fn test_default_macros_are_centered() {
        let macros = KickMacros::default();
        assert_eq!(macros.punch, 0.5);
        assert_eq!(macros.clean, 0.5);
        assert_eq!(macros.tight, 0.5);
    }

    #[test]
    fn test_out_of_range_and_nan_are_sanitized() {
        let macros = KickMacros::new(1.7, -0.3, f32::NAN);
        assert_eq!(macros.punch, 1.0);
        assert_eq!(macros.clean, 0.0);
        assert_eq!(macros.tight, KICK_MACRO_DEFAULT);

        let raw = KickMacros { punch: f32::INFINITY, clean: 0.2, tight: 0.9 };
        let params = map_kick_params(&raw);
        assert_eq!(params, map_kick_params(&KickMacros::new(0.5, 0.2, 0.9)));
    }

    #[test]
    fn test_punch_strictly_lowers_transient() {
        let mut previous = f32::MAX;
        for punch in sweep(20) {
            let params = map_kick_params(&KickMacros::new(punch, 0.4, 0.6));
            assert!(params.transient_level < previous, "punch {} did not lower click", punch);
            previous = params.transient_level;
        }
        let full = map_kick_params(&KickMacros::new(1.0, 0.4, 0.6));
        assert_eq!(full.transient_level, 0.0);
    }

    #[test]
    fn test_punch_keeps_body_and_output_gain_bounded() {
        let curves = KickCurves::STANDARD;
        let reference = map_kick_params(&KickMacros::new(0.0, 0.3, 0.3));
        for punch in sweep(20) {
            let params = map_kick_params(&KickMacros::new(punch, 0.3, 0.3));
            assert_eq!(params.output_gain, reference.output_gain);
            assert!(params.body_level <= curves.body_max);
            assert!(params.body_level >= curves.body_max - curves.body_punch_trim);
        }
    }

    #[test]
    fn test_tight_lengthens_body_and_narrows_sweep() {
        let loose = map_kick_params(&KickMacros::new(0.5, 0.5, 0.0));
        let tight = map_kick_params(&KickMacros::new(0.5, 0.5, 1.0));
        assert!(tight.body_decay > loose.body_decay);
        assert!(tight.body_release > loose.body_release);
        assert!(tight.pitch_decay < loose.pitch_decay);
        assert!(tight.octaves < loose.octaves);
    }

    #[test]
    fn test_clean_reduces_distortion_and_raises_gain() {
        let dirty = map_kick_params(&KickMacros::new(0.5, 0.0, 0.5));
        let clean = map_kick_params(&KickMacros::new(0.5, 1.0, 0.5));
        assert!(clean.distortion_wet < dirty.distortion_wet);
        assert_eq!(clean.distortion_wet, 0.0);
        assert!(clean.distortion_amount < dirty.distortion_amount);
        assert!(clean.output_gain > dirty.output_gain);
    }

    #[test]
    fn test_eq_trims_are_linear_in_punch_and_clean() {
        let a = map_kick_params(&KickMacros::new(0.0, 0.0, 0.5));
        let b = map_kick_params(&KickMacros::new(1.0, 0.0, 0.5));
        let c = map_kick_params(&KickMacros::new(0.5, 0.0, 0.5));
        assert!((c.eq_low_db - (a.eq_low_db + b.eq_low_db) / 2.0).abs() < 1e-5);
        assert!((c.eq_high_db - (a.eq_high_db + b.eq_high_db) / 2.0).abs() < 1e-5);

        // Tightness does not touch the EQ
        let d = map_kick_params(&KickMacros::new(0.5, 0.0, 0.0));
        assert_eq!(c.eq_mid_db, d.eq_mid_db);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let macros = KickMacros::new(0.31, 0.77, 0.12);
        assert_eq!(map_kick_params(&macros), map_kick_params(&macros));
    }

    #[test]
    fn test_patch_merges_only_given_fields() {
        let base = KickMacros::new(0.2, 0.4, 0.6);
        let merged = base.merged(&KickMacroPatch { punch: Some(0.9), ..Default::default() });
        assert_eq!(merged, KickMacros::new(0.9, 0.4, 0.6));
    }
}
