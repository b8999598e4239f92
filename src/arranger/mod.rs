// Arranger - Song structure to playback schedules
// Resolves rows, sections and performance tracks; exports the result as MIDI

pub mod midi;
pub mod resolver;
pub mod schedule;

pub use midi::{export_midi, MidiError, MidiExportOptions, MidiResult};
pub use resolver::{resolve_playback_schedules, row_velocity_scale};
pub use schedule::{PlaybackMode, PlaybackSchedule, ResolvedPlayback, ScheduleKind, ScheduledNote};
