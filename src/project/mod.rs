// Project - Song data model and note helpers

pub mod models;
pub mod notes;

pub use models::{
    Chunk, NoteEvent, PatternGroup, PerformanceNote, PerformanceTrack, Project, SongRow,
    SoundSource, TimingMode, Track, DEFAULT_BPM, DEFAULT_NOTE, DEFAULT_STEP_COUNT,
};
pub use notes::{db_to_gain, midi_to_freq, note_frequency, note_to_midi, NoteError};
