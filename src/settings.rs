// Engine Settings - Render, voice and export tuning
// Loaded from JSON with per-field defaults; every value clamped on load

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::render::MasterSettings;
use crate::voice::VoiceConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Offline render sample rate (Hz)
    pub sample_rate: u32,

    /// Output channels (mono master copied to each)
    pub channels: usize,

    /// Seconds rendered past the song end for release and reverb tails
    pub render_tail: f64,

    /// Ramp time for live parameter changes (seconds)
    pub ramp_time: f64,

    /// Simultaneous notes per voice
    pub max_polyphony: usize,

    /// MP3 bitrate (kbps)
    pub mp3_bitrate: u32,

    /// Seed for humanize jitter and random pulse gates
    pub humanize_seed: u64,

    /// How far ahead the live transport fires callbacks (seconds)
    pub lookahead: f64,

    pub master_volume: f32,

    pub limiter_threshold: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            sample_rate: 44_100,
            channels: 2,
            render_tail: 2.0,
            ramp_time: 0.03,
            max_polyphony: 16,
            mp3_bitrate: 192,
            humanize_seed: 0,
            lookahead: 0.1,
            master_volume: 0.85,
            limiter_threshold: 0.9,
        }
    }
}

fn clamp_f64(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

impl EngineSettings {
    /// Read settings from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings: EngineSettings = serde_json::from_str(&json)?;
        log::info!("Loaded engine settings from {}", path.display());
        Ok(settings.normalized())
    }

    /// Copy with every value clamped into its supported range
    pub fn normalized(&self) -> Self {
        let defaults = EngineSettings::default();
        let master = self.master();
        EngineSettings {
            sample_rate: self.sample_rate.clamp(8_000, 192_000),
            channels: self.channels.clamp(1, 2),
            render_tail: clamp_f64(self.render_tail, 0.0, 30.0, defaults.render_tail),
            ramp_time: clamp_f64(self.ramp_time, 0.001, 1.0, defaults.ramp_time),
            max_polyphony: self.max_polyphony.clamp(1, 64),
            mp3_bitrate: self.mp3_bitrate.clamp(64, 320),
            humanize_seed: self.humanize_seed,
            lookahead: clamp_f64(self.lookahead, 0.01, 2.0, defaults.lookahead),
            master_volume: master.volume,
            limiter_threshold: master.limiter_threshold,
        }
    }

    pub fn voice_config(&self) -> VoiceConfig {
        VoiceConfig {
            ramp_time: self.ramp_time,
            max_polyphony: self.max_polyphony,
            seed: self.humanize_seed,
        }
    }

    pub fn master(&self) -> MasterSettings {
        MasterSettings::new(self.master_volume, self.limiter_threshold)
    }
}
