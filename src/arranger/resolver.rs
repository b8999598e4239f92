// Arrangement Resolver - Project structure → playback schedules
// Walks song rows and sections (or the flat track list) and merges performance tracks

use rand::Rng;

use crate::groove::{schedule_pattern, PatternWindow, Tempo};
use crate::packs::{PackCatalog, ResolvedCharacter};
use crate::project::{Chunk, PerformanceTrack, Project, SongRow, SoundSource, Track};

use super::schedule::{PlaybackMode, PlaybackSchedule, ResolvedPlayback, ScheduleKind, ScheduledNote};

/// Resolve a project into timed schedules plus the total song duration
///
/// Tracks whose instrument cannot be found in the catalog are skipped with a
/// warning. Humanize jitter draws from `rng` only.
pub fn resolve_playback_schedules<R: Rng + ?Sized>(
    project: &Project,
    catalog: &PackCatalog,
    mode: PlaybackMode,
    rng: &mut R,
) -> ResolvedPlayback {
    let tempo = Tempo::new(project.bpm);
    let measure = tempo.measure_duration();
    let sections = match mode {
        PlaybackMode::Song => project.section_count(),
        PlaybackMode::Loop => 0,
    };

    let performances: Vec<(&SongRow, &PerformanceTrack)> = match mode {
        PlaybackMode::Song => performance_rows(project).collect(),
        PlaybackMode::Loop => Vec::new(),
    };
    let any_solo = project.song_rows.iter().any(|row| row.solo);

    let mut schedules = Vec::new();
    let mut duration = measure;

    if sections == 0 {
        for track in &project.tracks {
            if track.muted || !track.chunk.is_patterned() {
                continue;
            }
            let length = track.chunk.loop_length(tempo.step_duration());
            let window = PatternWindow::new(0.0, length, tempo.step_duration());
            if let Some(schedule) = schedule_track(track, catalog, &window, rng) {
                duration = duration.max(length);
                schedules.push(schedule);
            }
        }
        for (_, performance) in &performances {
            duration = duration.max(performance.natural_length());
        }
    } else {
        duration = duration.max(sections as f64 * measure);

        for section in 0..sections {
            for row in &project.song_rows {
                let Some(group_id) = row.group_at(section) else {
                    continue;
                };
                let Some(group) = project.group(group_id) else {
                    log::warn!("Song row {} references missing group {}", row.id, group_id);
                    continue;
                };

                let window = PatternWindow::new(section as f64 * measure, measure, tempo.step_duration())
                    .with_velocity_scale(row_velocity_scale(row, any_solo));
                for track in group.tracks.iter().filter(|t| !t.muted) {
                    if let Some(schedule) = schedule_track(track, catalog, &window, rng) {
                        schedules.push(schedule);
                    }
                }
            }
        }
    }

    for (row, performance) in performances {
        let Some(resolved) = resolve_source(catalog, &performance.source, &performance.name) else {
            continue;
        };
        let window = PatternWindow::new(0.0, duration, tempo.step_duration())
            .with_velocity_scale(row_velocity_scale(row, any_solo));
        schedules.push(build_schedule(
            ScheduleKind::Performance,
            &performance.id,
            &performance.name,
            &performance.source,
            &performance.as_chunk(),
            resolved,
            &window,
            rng,
        ));
    }

    log::debug!(
        "Resolved {} schedules ({} sections, {:.2}s)",
        schedules.len(),
        sections,
        duration
    );

    ResolvedPlayback {
        schedules,
        duration,
        bpm: tempo.bpm,
    }
}

/// Row velocity as a scheduler multiplier (0 when muted or soloed out)
pub fn row_velocity_scale(row: &SongRow, any_solo: bool) -> f32 {
    if row.muted || (any_solo && !row.solo) {
        return 0.0;
    }
    if row.velocity.is_finite() {
        row.velocity.max(0.0)
    } else {
        1.0
    }
}

/// Rows bound to an existing, non-empty performance track
fn performance_rows(project: &Project) -> impl Iterator<Item = (&SongRow, &PerformanceTrack)> {
    project.song_rows.iter().filter_map(|row| {
        let id = row.performance_track_id.as_deref()?;
        match project.performance_track(id) {
            Some(performance) if !performance.notes.is_empty() => Some((row, performance)),
            Some(_) => None,
            None => {
                log::warn!("Song row {} references missing performance track {}", row.id, id);
                None
            }
        }
    })
}

fn resolve_source<'a>(
    catalog: &'a PackCatalog,
    source: &SoundSource,
    name: &str,
) -> Option<ResolvedCharacter<'a>> {
    let resolved = catalog.resolve(source);
    if resolved.is_none() {
        log::warn!(
            "Skipping {}: instrument {}/{} not found",
            name,
            source.pack_id,
            source.instrument_id
        );
    }
    resolved
}

fn schedule_track<R: Rng + ?Sized>(
    track: &Track,
    catalog: &PackCatalog,
    window: &PatternWindow,
    rng: &mut R,
) -> Option<PlaybackSchedule> {
    let resolved = resolve_source(catalog, &track.source, &track.name)?;
    Some(build_schedule(
        ScheduleKind::Pattern,
        &track.id,
        &track.name,
        &track.source,
        &track.chunk,
        resolved,
        window,
        rng,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_schedule<R: Rng + ?Sized>(
    kind: ScheduleKind,
    track_id: &str,
    track_name: &str,
    source: &SoundSource,
    chunk: &Chunk,
    resolved: ResolvedCharacter<'_>,
    window: &PatternWindow,
    rng: &mut R,
) -> PlaybackSchedule {
    let mut notes = Vec::new();
    schedule_pattern(chunk, window, Some(resolved.character.id.as_str()), rng, |event| {
        notes.push(ScheduledNote::from_trigger(&event));
    });

    PlaybackSchedule {
        kind,
        track_id: track_id.to_string(),
        track_name: track_name.to_string(),
        source: source.clone(),
        instrument_id: resolved.instrument.id.clone(),
        character_id: resolved.character.id.clone(),
        start: window.start,
        length: window.length,
        velocity_scale: window.velocity_scale,
        kick: chunk.kick,
        pulse: chunk.pulse.clone(),
        notes,
    }
}
