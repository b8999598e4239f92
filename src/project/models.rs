// Project Models - Chunks, tracks, pattern groups, song rows and performance tracks
// The symbolic song representation read by the scheduler and the arrangement resolver

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::macros::{KickMacros, PulseOverrides};

/// Step count used when a chunk has no step array
pub const DEFAULT_STEP_COUNT: usize = 16;

/// Tempo used when a project does not specify one
pub const DEFAULT_BPM: f64 = 120.0;

/// Base note for chunks that do not name one
pub const DEFAULT_NOTE: &str = "C4";

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

fn default_note() -> String {
    DEFAULT_NOTE.to_string()
}

fn default_unit() -> f32 {
    1.0
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// How a chunk places its notes in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Grid-quantized steps
    #[default]
    Sync,

    /// Absolute-time note events with explicit duration
    Free,
}

/// A free-timed note inside a chunk (times in seconds from loop start)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub time: f64,
    pub duration: f64,
    #[serde(default = "default_unit")]
    pub velocity: f32,
    #[serde(default)]
    pub pitch: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl NoteEvent {
    pub fn new(time: f64, duration: f64, velocity: f32) -> Self {
        NoteEvent {
            time,
            duration,
            velocity,
            pitch: 0,
            note: None,
        }
    }

    /// End of the note in seconds
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// Accept `true`/`false` or numeric 0/1 activity flags
fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StepValue {
        Flag(bool),
        Level(f64),
    }

    let values = Option::<Vec<StepValue>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .map(|value| match value {
            StepValue::Flag(active) => active,
            StepValue::Level(level) => level > 0.0,
        })
        .collect())
}

/// A pattern: one instrument's musical content for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    #[serde(default = "new_id")]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Step activity grid
    #[serde(default, deserialize_with = "deserialize_steps")]
    pub steps: Vec<bool>,

    /// Per-step velocity; read through `step_velocity`, which pads and truncates to `steps`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocities: Option<Vec<f32>>,

    /// Per-step pitch offset in semitones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitches: Option<Vec<i32>>,

    #[serde(default)]
    pub timing_mode: TimingMode,

    /// Free-mode note events
    #[serde(default)]
    pub note_events: Vec<NoteEvent>,

    /// Explicit free-mode loop length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_loop_length: Option<f64>,

    /// Base note for step triggers
    #[serde(default = "default_note")]
    pub note: String,

    /// Off-beat delay [0, 1]
    #[serde(default)]
    pub swing: f32,

    /// Random timing jitter [0, 1]
    #[serde(default)]
    pub humanize: f32,

    #[serde(default = "default_unit")]
    pub velocity_factor: f32,

    /// Pattern-wide transposition in semitones
    #[serde(default)]
    pub pitch_offset: i32,

    /// Explicit sustain in seconds (clamped to the hold duration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sustain: Option<f64>,

    /// Attack time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<f64>,

    /// Glide (portamento) time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glide: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick: Option<KickMacros>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<PulseOverrides>,
}

impl Default for Chunk {
    fn default() -> Self {
        Chunk {
            id: new_id(),
            name: String::new(),
            steps: Vec::new(),
            velocities: None,
            pitches: None,
            timing_mode: TimingMode::Sync,
            note_events: Vec::new(),
            note_loop_length: None,
            note: default_note(),
            swing: 0.0,
            humanize: 0.0,
            velocity_factor: 1.0,
            pitch_offset: 0,
            sustain: None,
            attack: None,
            glide: None,
            kick: None,
            pulse: None,
        }
    }
}

impl Chunk {
    /// Create a step chunk from an activity grid
    pub fn with_steps(name: impl Into<String>, steps: Vec<bool>) -> Self {
        Chunk {
            name: name.into(),
            steps,
            ..Default::default()
        }
    }

    /// Create a free-mode chunk from note events
    pub fn with_note_events(name: impl Into<String>, note_events: Vec<NoteEvent>) -> Self {
        Chunk {
            name: name.into(),
            timing_mode: TimingMode::Free,
            note_events,
            ..Default::default()
        }
    }

    /// Number of steps in the grid (empty grids count as the default 16)
    pub fn step_count(&self) -> usize {
        if self.steps.is_empty() {
            DEFAULT_STEP_COUNT
        } else {
            self.steps.len()
        }
    }

    /// Step grid with the empty case expanded to 16 inactive steps
    pub fn effective_steps(&self) -> Vec<bool> {
        if self.steps.is_empty() {
            vec![false; DEFAULT_STEP_COUNT]
        } else {
            self.steps.clone()
        }
    }

    /// Velocity for a step (missing entries default to full velocity)
    pub fn step_velocity(&self, step: usize) -> f32 {
        self.velocities
            .as_ref()
            .and_then(|v| v.get(step).copied())
            .filter(|v| v.is_finite())
            .unwrap_or(1.0)
    }

    /// Pitch offset for a step (missing entries default to 0)
    pub fn step_pitch(&self, step: usize) -> i32 {
        self.pitches
            .as_ref()
            .and_then(|p| p.get(step).copied())
            .unwrap_or(0)
    }

    /// Note events ordered by start time
    pub fn sorted_note_events(&self) -> Vec<NoteEvent> {
        let mut events = self.note_events.clone();
        events.sort_by(|a, b| {
            a.time
                .partial_cmp(&b.time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        events
    }

    /// Whether the chunk has anything to play
    pub fn is_patterned(&self) -> bool {
        match self.timing_mode {
            TimingMode::Sync => self.steps.iter().any(|&s| s),
            TimingMode::Free => !self.note_events.is_empty(),
        }
    }

    /// Loop length in seconds for a given step duration
    ///
    /// Sync chunks loop over their step grid; free chunks use the explicit
    /// loop length when positive, otherwise the end of the last event.
    pub fn loop_length(&self, step_duration: f64) -> f64 {
        match self.timing_mode {
            TimingMode::Sync => self.step_count() as f64 * step_duration,
            TimingMode::Free => free_loop_length(&self.sorted_note_events(), self.note_loop_length),
        }
    }
}

/// Loop length for time-sorted free events
pub fn free_loop_length(sorted_events: &[NoteEvent], explicit: Option<f64>) -> f64 {
    match explicit {
        Some(length) if length > 0.0 && length.is_finite() => length,
        _ => sorted_events.last().map(NoteEvent::end).unwrap_or(0.0),
    }
}

/// Where a track's sound comes from in the pack catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundSource {
    pub pack_id: String,
    pub instrument_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
}

impl SoundSource {
    pub fn new(pack_id: impl Into<String>, instrument_id: impl Into<String>) -> Self {
        SoundSource {
            pack_id: pack_id.into(),
            instrument_id: instrument_id.into(),
            character_id: None,
        }
    }

    pub fn with_character(mut self, character_id: impl Into<String>) -> Self {
        self.character_id = Some(character_id.into());
        self
    }
}

/// One chunk bound to one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub instrument_id: String,
    pub source: SoundSource,
    #[serde(default)]
    pub chunk: Chunk,
    #[serde(default)]
    pub muted: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, source: SoundSource, chunk: Chunk) -> Self {
        Track {
            id: new_id(),
            name: name.into(),
            instrument_id: source.instrument_id.clone(),
            source,
            chunk,
            muted: false,
        }
    }
}

/// Named collection of tracks forming one arrangeable scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl PatternGroup {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        PatternGroup {
            id: new_id(),
            name: name.into(),
            tracks,
        }
    }
}

/// One arrangement lane
///
/// A row is either a loop lane (slots reference pattern groups, slot index =
/// section index) or a performance lane bound to a performance track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRow {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub slots: Vec<Option<String>>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_unit")]
    pub velocity: f32,
    #[serde(default)]
    pub solo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_track_id: Option<String>,
}

impl SongRow {
    /// A loop lane with the given slots
    pub fn with_slots(slots: Vec<Option<String>>) -> Self {
        SongRow {
            id: new_id(),
            slots,
            muted: false,
            velocity: 1.0,
            solo: false,
            performance_track_id: None,
        }
    }

    /// A performance lane bound to a recording
    pub fn for_performance(performance_track_id: impl Into<String>) -> Self {
        SongRow {
            performance_track_id: Some(performance_track_id.into()),
            ..SongRow::with_slots(Vec::new())
        }
    }

    /// Highest slot index holding a group, if any
    pub fn highest_populated_slot(&self) -> Option<usize> {
        self.slots.iter().rposition(|slot| slot.is_some())
    }

    /// Group id in a section's slot
    pub fn group_at(&self, section: usize) -> Option<&str> {
        self.slots.get(section).and_then(|slot| slot.as_deref())
    }
}

/// A recorded note (seconds from song start)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceNote {
    pub time: f64,
    pub duration: f64,
    #[serde(default = "default_unit")]
    pub velocity: f32,
    #[serde(default = "default_note")]
    pub note: String,
    #[serde(default)]
    pub pitch: i32,
}

impl PerformanceNote {
    pub fn new(time: f64, duration: f64, note: impl Into<String>) -> Self {
        PerformanceNote {
            time,
            duration,
            velocity: 1.0,
            note: note.into(),
            pitch: 0,
        }
    }
}

/// A free-form recorded note stream, looped across the whole song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTrack {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub instrument_id: String,
    pub source: SoundSource,
    #[serde(default)]
    pub notes: Vec<PerformanceNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_length: Option<f64>,
}

impl PerformanceTrack {
    pub fn new(name: impl Into<String>, source: SoundSource, notes: Vec<PerformanceNote>) -> Self {
        PerformanceTrack {
            id: new_id(),
            name: name.into(),
            instrument_id: source.instrument_id.clone(),
            source,
            notes,
            loop_length: None,
        }
    }

    /// The recording as a free-mode chunk so it can share the free scheduler
    pub fn as_chunk(&self) -> Chunk {
        let note_events = self
            .notes
            .iter()
            .map(|n| NoteEvent {
                time: n.time,
                duration: n.duration,
                velocity: n.velocity,
                pitch: n.pitch,
                note: Some(n.note.clone()),
            })
            .collect();

        Chunk {
            id: self.id.clone(),
            name: self.name.clone(),
            note_loop_length: self.loop_length,
            ..Chunk::with_note_events(self.name.clone(), note_events)
        }
    }

    /// Natural length of the recording in seconds
    pub fn natural_length(&self) -> f64 {
        self.as_chunk().loop_length(0.0)
    }
}

/// The whole song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Flat track list used when there is no arrangement
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub pattern_groups: Vec<PatternGroup>,
    #[serde(default)]
    pub song_rows: Vec<SongRow>,
    #[serde(default)]
    pub performance_tracks: Vec<PerformanceTrack>,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            name: String::new(),
            bpm: DEFAULT_BPM,
            tracks: Vec::new(),
            pattern_groups: Vec::new(),
            song_rows: Vec::new(),
            performance_tracks: Vec::new(),
        }
    }
}

impl Project {
    pub fn new(name: impl Into<String>, bpm: f64) -> Self {
        Project {
            name: name.into(),
            bpm,
            ..Default::default()
        }
    }

    pub fn group(&self, id: &str) -> Option<&PatternGroup> {
        self.pattern_groups.iter().find(|g| g.id == id)
    }

    pub fn performance_track(&self, id: &str) -> Option<&PerformanceTrack> {
        self.performance_tracks.iter().find(|p| p.id == id)
    }

    /// Number of song sections: 1 + highest populated slot over all rows
    pub fn section_count(&self) -> usize {
        self.song_rows
            .iter()
            .filter_map(SongRow::highest_populated_slot)
            .max()
            .map(|highest| highest + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_accept_bools_and_numbers() {
        let chunk: Chunk = serde_json::from_str(r#"{"steps": [1, 0, true, false, 0.5]}"#).unwrap();
        assert_eq!(chunk.steps, vec![true, false, true, false, true]);
        assert_eq!(chunk.velocity_factor, 1.0);
        assert_eq!(chunk.note, DEFAULT_NOTE);
    }

    #[test]
    fn test_null_steps_default_to_empty() {
        let chunk: Chunk = serde_json::from_str(r#"{"steps": null}"#).unwrap();
        assert!(chunk.steps.is_empty());
        assert_eq!(chunk.step_count(), DEFAULT_STEP_COUNT);
        assert_eq!(chunk.effective_steps(), vec![false; DEFAULT_STEP_COUNT]);
        assert!(!chunk.is_patterned());
    }

    #[test]
    fn test_short_step_arrays_read_padded() {
        let mut chunk = Chunk::with_steps("k", vec![true, false, true, false]);
        chunk.velocities = Some(vec![0.5]);
        chunk.pitches = Some(vec![1, 2, 3, 4, 5, 6]);
        let velocities: Vec<f32> = (0..chunk.steps.len()).map(|i| chunk.step_velocity(i)).collect();
        let pitches: Vec<i32> = (0..chunk.steps.len()).map(|i| chunk.step_pitch(i)).collect();
        assert_eq!(velocities, vec![0.5, 1.0, 1.0, 1.0]);
        assert_eq!(pitches, vec![1, 2, 3, 4]);
        // The stored arrays themselves are left as authored
        assert_eq!(chunk.velocities, Some(vec![0.5]));
    }

    #[test]
    fn test_free_loop_length() {
        let mut chunk = Chunk::with_note_events(
            "lead",
            vec![NoteEvent::new(1.0, 0.5, 1.0), NoteEvent::new(0.0, 0.25, 1.0)],
        );
        assert_eq!(chunk.loop_length(0.125), 1.5);

        chunk.note_loop_length = Some(4.0);
        assert_eq!(chunk.loop_length(0.125), 4.0);

        chunk.note_loop_length = Some(0.0);
        assert_eq!(chunk.loop_length(0.125), 1.5);
    }

    #[test]
    fn test_section_count() {
        let mut project = Project::default();
        assert_eq!(project.section_count(), 0);

        project.song_rows.push(SongRow::with_slots(vec![None, Some("a".into()), None]));
        project.song_rows.push(SongRow::with_slots(vec![None, None, None, Some("b".into())]));
        project.song_rows.push(SongRow::for_performance("p"));
        assert_eq!(project.section_count(), 4);
    }

    #[test]
    fn test_performance_track_as_chunk() {
        let source = SoundSource::new("core", "lead");
        let track = PerformanceTrack::new(
            "take 1",
            source,
            vec![PerformanceNote::new(0.0, 0.5, "C4"), PerformanceNote::new(0.5, 0.5, "E4")],
        );
        let chunk = track.as_chunk();
        assert_eq!(chunk.timing_mode, TimingMode::Free);
        assert_eq!(chunk.note_events[1].note.as_deref(), Some("E4"));
        assert_eq!(track.natural_length(), 1.0);
    }

    #[test]
    fn test_project_defaults_from_empty_json() {
        let project: Project = serde_json::from_str("{}").unwrap();
        assert_eq!(project, Project::default());
        assert_eq!(project.bpm, DEFAULT_BPM);
    }
}
