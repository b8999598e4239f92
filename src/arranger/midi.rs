// MIDI Export - Resolved playback schedules to a Standard MIDI File using midly
// One track per schedule plus a tempo / time-signature meta track

use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::note_to_midi;
use crate::project::notes::FALLBACK_MIDI;

use super::schedule::{PlaybackSchedule, ResolvedPlayback, ScheduledNote};

/// General MIDI percussion channel (channel 10)
const DRUM_CHANNEL: u8 = 9;

/// Instruments written to the percussion channel
const PERCUSSION_INSTRUMENTS: [&str; 3] = ["kick", "snare", "hihat"];

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to write MIDI: {0}")]
    Write(String),
}

pub type MidiResult<T> = Result<T, MidiError>;

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiExportOptions {
    /// Pulses per quarter note (PPQ) - typically 480 or 960
    pub ppq: u16,

    /// Include tempo metadata
    pub include_tempo: bool,

    /// Include time signature metadata
    pub include_time_signature: bool,

    /// Include track names
    pub track_names: bool,

    /// Skip schedules without notes (muted rows)
    pub skip_silent: bool,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            ppq: 480,
            include_tempo: true,
            include_time_signature: true,
            track_names: true,
            skip_silent: true,
        }
    }
}

/// Export resolved schedules to MIDI file bytes
pub fn export_midi(playback: &ResolvedPlayback, options: &MidiExportOptions) -> MidiResult<Vec<u8>> {
    let header = Header {
        format: midly::Format::Parallel,
        timing: Timing::Metrical(options.ppq.into()),
    };
    let ticks_per_second = ticks_per_second(playback.bpm, options.ppq);

    let mut tracks = Vec::new();

    // Track 0: tempo and time signature
    let mut meta_track = Track::new();
    if options.track_names {
        add_track_name(&mut meta_track, "META");
    }
    if options.include_tempo {
        add_tempo(&mut meta_track, playback.bpm);
    }
    if options.include_time_signature {
        add_time_signature(&mut meta_track);
    }
    meta_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    tracks.push(meta_track);

    let end_tick = seconds_to_ticks(playback.duration, ticks_per_second);
    for schedule in &playback.schedules {
        if options.skip_silent && !schedule.is_audible() {
            continue;
        }
        tracks.push(schedule_track(schedule, ticks_per_second, end_tick, options));
    }

    let smf = Smf { header, tracks };
    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| MidiError::Write(e.to_string()))?;

    log::info!(
        "Exported MIDI: {} tracks, {} notes, {} bytes",
        smf.tracks.len(),
        playback.note_count(),
        bytes.len()
    );
    Ok(bytes)
}

fn channel_for(schedule: &PlaybackSchedule) -> u8 {
    if PERCUSSION_INSTRUMENTS.contains(&schedule.instrument_id.as_str()) {
        DRUM_CHANNEL
    } else {
        0
    }
}

/// MIDI key for a scheduled note (unparsable names fall back to C4)
pub fn note_key(note: &ScheduledNote) -> u8 {
    let midi = note_to_midi(&note.note).unwrap_or(FALLBACK_MIDI) + note.pitch;
    midi.clamp(0, 127) as u8
}

/// MIDI velocity for a 0..1 note velocity
pub fn note_velocity(velocity: f32) -> u8 {
    (velocity * 127.0).round().clamp(1.0, 127.0) as u8
}

fn schedule_track<'a>(
    schedule: &'a PlaybackSchedule,
    ticks_per_second: f64,
    end_tick: u32,
    options: &MidiExportOptions,
) -> Track<'a> {
    let channel = channel_for(schedule);
    let mut events: Vec<(u32, TrackEventKind<'a>)> = Vec::new();

    for note in &schedule.notes {
        let key = note_key(note);
        let tick_on = seconds_to_ticks(note.time, ticks_per_second);
        let tick_off = seconds_to_ticks(note.end(), ticks_per_second).max(tick_on + 1);

        events.push((
            tick_on,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: note_velocity(note.velocity).into(),
                },
            },
        ));
        events.push((
            tick_off,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    // Note-offs sort before note-ons at the same tick so repeated keys retrigger
    events.sort_by_key(|(tick, kind)| {
        let on = matches!(kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. });
        (*tick, on)
    });

    let mut track = Track::new();
    if options.track_names {
        add_track_name(&mut track, &schedule.track_name);
    }

    let mut last_tick = 0;
    for (tick, kind) in events {
        track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind,
        });
        last_tick = tick;
    }

    track.push(TrackEvent {
        delta: end_tick.saturating_sub(last_tick).into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn ticks_per_second(bpm: f64, ppq: u16) -> f64 {
    ppq as f64 * bpm / 60.0
}

fn seconds_to_ticks(seconds: f64, ticks_per_second: f64) -> u32 {
    (seconds.max(0.0) * ticks_per_second).round() as u32
}

fn add_track_name<'a>(track: &mut Track<'a>, name: &'a str) {
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    });
}

fn add_tempo(track: &mut Track<'_>, bpm: f64) {
    // Microseconds per quarter note (24-bit)
    let us_per_quarter = ((60_000_000.0 / bpm) as u32).min(0x00FF_FFFF);
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
    });
}

fn add_time_signature(track: &mut Track<'_>) {
    // 4/4, 24 MIDI clocks per click, 8 32nds per quarter
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger::{resolve_playback_schedules, PlaybackMode};
    use crate::packs::PackCatalog;
    use crate::project::{Chunk, Project, SoundSource, Track as ProjectTrack};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn playback() -> ResolvedPlayback {
        let mut project = Project::new("midi", 120.0);
        project.tracks.push(ProjectTrack::new(
            "Kick",
            SoundSource::new("core", "kick"),
            Chunk::with_steps("kick", vec![true, false, false, false]),
        ));
        let mut bass = Chunk::with_steps("bass", vec![true, true]);
        bass.note = "E2".to_string();
        bass.pitches = Some(vec![0, 12]);
        project
            .tracks
            .push(ProjectTrack::new("Bass", SoundSource::new("core", "bass"), bass));
        let mut rng = StdRng::seed_from_u64(0);
        resolve_playback_schedules(&project, PackCatalog::builtin(), PlaybackMode::Song, &mut rng)
    }

    #[test]
    fn test_ticks_per_second() {
        // 120 BPM, 480 PPQ → 960 ticks per second
        assert_eq!(ticks_per_second(120.0, 480), 960.0);
        assert_eq!(seconds_to_ticks(0.5, 960.0), 480);
    }

    #[test]
    fn test_export_parses_back() {
        let bytes = export_midi(&playback(), &MidiExportOptions::default()).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, midly::Format::Parallel);
        // meta + kick + bass
        assert_eq!(smf.tracks.len(), 3);
    }

    #[test]
    fn test_channels_and_keys() {
        let playback = playback();
        let kick = &playback.schedules[0];
        let bass = &playback.schedules[1];
        assert_eq!(channel_for(kick), DRUM_CHANNEL);
        assert_eq!(channel_for(bass), 0);

        let keys: Vec<u8> = bass.notes.iter().map(note_key).collect();
        assert_eq!(keys, vec![40, 52]);
    }

    #[test]
    fn test_tempo_event() {
        let mut track = Track::new();
        add_tempo(&mut track, 120.0);
        if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = &track[0].kind {
            assert_eq!(u32::from(*tempo), 500_000);
        } else {
            panic!("Expected Tempo event");
        }
    }

    #[test]
    fn test_note_velocity_range() {
        assert_eq!(note_velocity(1.0), 127);
        assert_eq!(note_velocity(0.0), 1);
        assert_eq!(note_velocity(0.5), 64);
    }

    #[test]
    fn test_silent_schedules_are_skipped() {
        let mut playback = playback();
        playback.schedules[1].notes.clear();
        let bytes = export_midi(&playback, &MidiExportOptions::default()).unwrap();
        assert_eq!(Smf::parse(&bytes).unwrap().tracks.len(), 2);

        let keep = MidiExportOptions {
            skip_silent: false,
            ..Default::default()
        };
        let bytes = export_midi(&playback, &keep).unwrap();
        assert_eq!(Smf::parse(&bytes).unwrap().tracks.len(), 3);
    }
}
