// Master Bus - Final gain and soft limiting of the rendered mix

use serde::{Deserialize, Serialize};

/// Master bus settings applied after every voice is summed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterSettings {
    pub volume: f32,
    pub limiter_threshold: f32,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            volume: 0.85,
            limiter_threshold: 0.9,
        }
    }
}

impl MasterSettings {
    /// Create master settings, clamping both values into range
    pub fn new(volume: f32, limiter_threshold: f32) -> Self {
        let defaults = MasterSettings::default();
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { defaults.volume };
        let limiter_threshold = if limiter_threshold.is_finite() {
            limiter_threshold.clamp(0.1, 1.0)
        } else {
            defaults.limiter_threshold
        };
        Self {
            volume,
            limiter_threshold,
        }
    }
}

/// Soft limiting: linear below the threshold, tanh knee above
pub fn soft_limit(sample: f32, threshold: f32) -> f32 {
    if sample.abs() <= threshold {
        sample
    } else {
        let sign = sample.signum();
        sign * (threshold + (sample.abs() - threshold).tanh() * (1.0 - threshold))
    }
}

/// Apply master volume and the limiter in place
///
/// Non-finite samples are replaced by silence. Returns the peak before limiting.
pub fn apply_master(samples: &mut [f32], settings: &MasterSettings) -> f32 {
    let mut peak = 0.0f32;
    for sample in samples.iter_mut() {
        let scaled = if sample.is_finite() { *sample * settings.volume } else { 0.0 };
        peak = peak.max(scaled.abs());
        *sample = soft_limit(scaled, settings.limiter_threshold);
    }
    if peak > settings.limiter_threshold {
        log::debug!("Master limiter engaged (peak {:.2})", peak);
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_settings_default() {
        let settings = MasterSettings::default();
        assert_eq!(settings.volume, 0.85);
        assert_eq!(settings.limiter_threshold, 0.9);
    }

    #[test]
    fn test_master_settings_clamps() {
        let settings = MasterSettings::new(1.5, 0.0);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.limiter_threshold, 0.1);
        assert_eq!(MasterSettings::new(f32::NAN, 0.5).volume, 0.85);
    }

    #[test]
    fn test_soft_limit() {
        // Below threshold: pass through
        assert_eq!(soft_limit(0.5, 0.8), 0.5);

        // At threshold: pass through
        assert_eq!(soft_limit(0.8, 0.8), 0.8);

        // Above threshold: limited but still above the threshold
        let limited = soft_limit(1.5, 0.8);
        assert!(limited < 1.0);
        assert!(limited > 0.8);

        let limited_neg = soft_limit(-1.5, 0.8);
        assert!(limited_neg > -1.0);
        assert!(limited_neg < -0.8);
    }

    #[test]
    fn test_apply_master() {
        let mut samples = vec![0.5, -4.0, f32::NAN, 0.0];
        let peak = apply_master(&mut samples, &MasterSettings::new(1.0, 0.9));
        assert_eq!(peak, 4.0);
        assert_eq!(samples[0], 0.5);
        assert!(samples[1] > -1.0 && samples[1] < -0.9);
        assert_eq!(samples[2], 0.0);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
    }
}
