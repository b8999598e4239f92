// Playback Schedules - Resolved, timed note lists per track
// Output of the arrangement resolver, input of the render driver and MIDI export

use serde::{Deserialize, Serialize};

use crate::groove::TriggerEvent;
use crate::macros::{KickMacros, PulseOverrides};
use crate::project::{note_frequency, SoundSource};
use crate::state::calculate_sha256;

/// Where a schedule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Step or free chunk from a track or pattern group
    Pattern,
    /// Recorded performance track looped over the song
    Performance,
}

/// Which part of the project is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Full arrangement (falls back to the flat track list without sections)
    #[default]
    Song,
    /// Flat track list only
    Loop,
}

/// One note ready to hand to a voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNote {
    pub time: f64,
    pub velocity: f32,
    pub note: String,
    pub pitch: i32,
    pub sustain: f64,
    /// Frequency of `note` shifted by `pitch` semitones (Hz)
    pub frequency: f64,
}

impl ScheduledNote {
    pub fn from_trigger(event: &TriggerEvent<'_>) -> Self {
        ScheduledNote {
            time: event.time,
            velocity: event.velocity,
            note: event.note.to_string(),
            pitch: event.pitch,
            sustain: event.sustain,
            frequency: note_frequency(event.note, event.pitch),
        }
    }

    pub fn end(&self) -> f64 {
        self.time + self.sustain
    }
}

/// A track's notes over one window, bound to a resolved character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSchedule {
    pub kind: ScheduleKind,
    pub track_id: String,
    pub track_name: String,
    pub source: SoundSource,
    pub instrument_id: String,
    pub character_id: String,
    pub start: f64,
    pub length: f64,
    pub velocity_scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick: Option<KickMacros>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<PulseOverrides>,
    pub notes: Vec<ScheduledNote>,
}

impl PlaybackSchedule {
    /// Voice cache key: `instrumentId:characterId`
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.instrument_id, self.character_id)
    }

    /// Render voice key: the cache key, plus a digest of the chunk's macro
    /// state when it carries one, so differently shaped rows never share a voice
    pub fn voice_key(&self) -> String {
        if self.kick.is_none() && self.pulse.is_none() {
            return self.cache_key();
        }
        let macros = serde_json::to_string(&(&self.kick, &self.pulse)).unwrap_or_default();
        let digest = calculate_sha256(macros.as_bytes());
        format!("{}#{}", self.cache_key(), &digest[..8])
    }

    pub fn is_audible(&self) -> bool {
        !self.notes.is_empty()
    }
}

/// Everything needed to play or render a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPlayback {
    pub schedules: Vec<PlaybackSchedule>,
    /// Song length in seconds (always > 0)
    pub duration: f64,
    pub bpm: f64,
}

impl ResolvedPlayback {
    pub fn of_kind(&self, kind: ScheduleKind) -> impl Iterator<Item = &PlaybackSchedule> {
        self.schedules.iter().filter(move |s| s.kind == kind)
    }

    pub fn count(&self, kind: ScheduleKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn note_count(&self) -> usize {
        self.schedules.iter().map(|s| s.notes.len()).sum()
    }

    /// Latest note end over every schedule
    pub fn last_note_end(&self) -> f64 {
        self.schedules
            .iter()
            .flat_map(|s| s.notes.iter())
            .map(ScheduledNote::end)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Chunk;

    #[test]
    fn test_note_from_trigger() {
        let chunk = Chunk::default();
        let event = TriggerEvent {
            time: 1.5,
            velocity: 0.5,
            pitch: 12,
            note: "A3",
            sustain: 0.25,
            chunk: &chunk,
            character_id: None,
        };
        let note = ScheduledNote::from_trigger(&event);
        assert!((note.frequency - 440.0).abs() < 1e-6);
        assert_eq!(note.end(), 1.75);
        assert_eq!(note.note, "A3");
    }

    fn schedule(kick: Option<KickMacros>) -> PlaybackSchedule {
        PlaybackSchedule {
            kind: ScheduleKind::Pattern,
            track_id: "t".to_string(),
            track_name: "Kick".to_string(),
            source: SoundSource::new("core", "kick"),
            instrument_id: "kick".to_string(),
            character_id: "punchy".to_string(),
            start: 0.0,
            length: 1.0,
            velocity_scale: 1.0,
            kick,
            pulse: None,
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_voice_key_separates_macro_states() {
        let plain = schedule(None);
        assert_eq!(plain.voice_key(), "kick:punchy");

        let soft = schedule(Some(KickMacros::new(0.1, 0.5, 0.5)));
        let hard = schedule(Some(KickMacros::new(0.9, 0.5, 0.5)));
        assert!(soft.voice_key().starts_with("kick:punchy#"));
        assert_ne!(soft.voice_key(), hard.voice_key());
        assert_eq!(hard.voice_key(), schedule(Some(KickMacros::new(0.9, 0.5, 0.5))).voice_key());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ScheduleKind::Performance).unwrap(), "\"performance\"");
        assert_eq!(serde_json::to_string(&PlaybackMode::Song).unwrap(), "\"song\"");
    }
}
