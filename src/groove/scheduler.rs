// Pattern Scheduler - Chunk + time window → ordered trigger calls
// Step mode: swing, humanize, velocity scaling, hold/sustain, loop repetition
// Free mode: sorted note events replayed per loop repetition

use rand::Rng;

use crate::project::{Chunk, NoteEvent, TimingMode};
use crate::project::models::free_loop_length;

/// Minimum overlap a gliding note keeps into the next one (seconds)
pub const GLIDE_OVERLAP: f64 = 0.02;

/// Where and how loudly a chunk is scheduled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternWindow {
    /// Window start (seconds)
    pub start: f64,

    /// Window length (seconds); the chunk repeats ceil(length / loop) times, at least once
    pub length: f64,

    /// One step (sixteenth) in seconds
    pub step_duration: f64,

    /// Extra velocity multiplier (row velocity, 0 for muted rows)
    pub velocity_scale: f32,
}

impl PatternWindow {
    pub fn new(start: f64, length: f64, step_duration: f64) -> Self {
        PatternWindow {
            start,
            length,
            step_duration,
            velocity_scale: 1.0,
        }
    }

    pub fn with_velocity_scale(mut self, velocity_scale: f32) -> Self {
        self.velocity_scale = velocity_scale;
        self
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

/// One trigger instruction handed to the instrument layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent<'a> {
    pub time: f64,
    pub velocity: f32,
    /// Semitone offset from `note`
    pub pitch: i32,
    pub note: &'a str,
    pub sustain: f64,
    pub chunk: &'a Chunk,
    pub character_id: Option<&'a str>,
}

fn scaled_velocity(velocity: f32, chunk: &Chunk, window: &PatternWindow) -> f32 {
    let v = velocity * chunk.velocity_factor * window.velocity_scale;
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn repetitions(window_length: f64, loop_length: f64) -> usize {
    let reps = (window_length / loop_length).ceil();
    if reps.is_finite() && reps > 1.0 {
        reps as usize
    } else {
        1
    }
}

/// Inactive steps following each step before the next active one (circular)
pub fn hold_steps(steps: &[bool]) -> Vec<usize> {
    let n = steps.len();
    (0..n)
        .map(|i| {
            (1..n)
                .take_while(|offset| !steps[(i + offset) % n])
                .count()
        })
        .collect()
}

/// Schedule one chunk over a window; returns the number of triggers emitted
///
/// Randomness (humanize) comes only from `rng`.
pub fn schedule_pattern<R, F>(
    chunk: &Chunk,
    window: &PatternWindow,
    character_id: Option<&str>,
    rng: &mut R,
    mut trigger: F,
) -> usize
where
    R: Rng + ?Sized,
    F: FnMut(TriggerEvent<'_>),
{
    match chunk.timing_mode {
        TimingMode::Sync => schedule_steps(chunk, window, character_id, rng, &mut trigger),
        TimingMode::Free => schedule_free(chunk, window, character_id, &mut trigger),
    }
}

fn schedule_steps<R, F>(
    chunk: &Chunk,
    window: &PatternWindow,
    character_id: Option<&str>,
    rng: &mut R,
    trigger: &mut F,
) -> usize
where
    R: Rng + ?Sized,
    F: FnMut(TriggerEvent<'_>),
{
    let steps = chunk.effective_steps();
    let step = window.step_duration;
    let loop_length = steps.len() as f64 * step;
    if !(loop_length > 0.0) {
        return 0;
    }

    let holds = hold_steps(&steps);
    let swing = chunk.swing.clamp(0.0, 1.0) as f64;
    let humanize = chunk.humanize.clamp(0.0, 1.0) as f64;
    let glide = chunk.glide.filter(|g| g.is_finite() && *g > 0.0).is_some();
    let mut count = 0;

    for rep in 0..repetitions(window.length, loop_length) {
        let loop_start = window.start + rep as f64 * loop_length;

        for (i, _) in steps.iter().enumerate().filter(|(_, active)| **active) {
            let grid_time = loop_start + i as f64 * step;
            let velocity = scaled_velocity(chunk.step_velocity(i), chunk, window);
            if velocity <= 0.0 {
                continue;
            }

            let mut time = grid_time;
            if swing > 0.0 && i % 2 == 1 {
                time += step * 0.5 * swing;
            }
            if humanize > 0.0 {
                let spread = step / 2.0 * humanize;
                time = (time + rng.gen_range(-spread..=spread)).max(window.start);
            }

            let hold = (holds[i] + 1) as f64 * step;
            let mut sustain = match chunk.sustain {
                Some(explicit) if explicit.is_finite() => explicit.clamp(0.0, hold),
                _ => hold,
            };
            if glide {
                sustain = sustain.max(hold + GLIDE_OVERLAP);
            }

            trigger(TriggerEvent {
                time,
                velocity,
                pitch: chunk.step_pitch(i) + chunk.pitch_offset,
                note: &chunk.note,
                sustain,
                chunk,
                character_id,
            });
            count += 1;
        }
    }

    log::debug!("Scheduled {} step triggers for chunk {}", count, chunk.id);
    count
}

fn schedule_free<F>(
    chunk: &Chunk,
    window: &PatternWindow,
    character_id: Option<&str>,
    trigger: &mut F,
) -> usize
where
    F: FnMut(TriggerEvent<'_>),
{
    let events: Vec<NoteEvent> = chunk.sorted_note_events();
    let loop_length = free_loop_length(&events, chunk.note_loop_length);
    if events.is_empty() || !(loop_length > 0.0) {
        return 0;
    }

    let mut count = 0;
    for rep in 0..repetitions(window.length, loop_length) {
        let loop_start = window.start + rep as f64 * loop_length;

        for event in &events {
            let time = loop_start + event.time;
            let velocity = scaled_velocity(event.velocity, chunk, window);
            if velocity <= 0.0 {
                continue;
            }

            trigger(TriggerEvent {
                time,
                velocity,
                pitch: event.pitch + chunk.pitch_offset,
                note: event.note.as_deref().unwrap_or(&chunk.note),
                sustain: event.duration.max(0.0),
                chunk,
                character_id,
            });
            count += 1;
        }
    }

    log::debug!("Scheduled {} free triggers for chunk {}", count, chunk.id);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Debug, Clone, PartialEq)]
    struct Captured {
        time: f64,
        velocity: f32,
        pitch: i32,
        note: String,
        sustain: f64,
    }

    fn run(chunk: &Chunk, window: PatternWindow) -> Vec<Captured> {
        let mut rng = StdRng::seed_from_u64(1);
        let mut captured = Vec::new();
        let count = schedule_pattern(chunk, &window, Some("punchy"), &mut rng, |event| {
            assert_eq!(event.character_id, Some("punchy"));
            captured.push(Captured {
                time: event.time,
                velocity: event.velocity,
                pitch: event.pitch,
                note: event.note.to_string(),
                sustain: event.sustain,
            });
        });
        assert_eq!(count, captured.len());
        captured
    }

    fn single_hit(len: usize) -> Chunk {
        let mut steps = vec![false; len];
        steps[0] = true;
        let mut chunk = Chunk::with_steps("hit", steps);
        chunk.velocities = Some(vec![1.0; len]);
        chunk
    }

    #[test]
    fn test_eight_step_boundary() {
        let s = 0.125;
        let chunk = single_hit(8);
        let loop_length = 8.0 * s;
        let events = run(&chunk, PatternWindow::new(0.0, 3.0 * loop_length, s));

        assert_eq!(events.len(), 3);
        for (i, event) in events.iter().enumerate() {
            assert!((event.time - i as f64 * 8.0 * s).abs() < 1e-9);
            assert!((event.sustain - 8.0 * s).abs() < 1e-9);
        }
    }

    #[test]
    fn test_velocity_gating() {
        let mut chunk = Chunk::with_steps("gate", vec![true, true, true, true]);
        chunk.velocities = Some(vec![0.0, 1.0, -0.5, 1.0]);
        assert_eq!(run(&chunk, PatternWindow::new(0.0, 0.5, 0.125)).len(), 2);

        chunk.velocity_factor = 0.0;
        assert!(run(&chunk, PatternWindow::new(0.0, 0.5, 0.125)).is_empty());

        chunk.velocity_factor = 1.0;
        let muted = PatternWindow::new(0.0, 0.5, 0.125).with_velocity_scale(0.0);
        assert!(run(&chunk, muted).is_empty());
    }

    #[test]
    fn test_velocity_is_clamped() {
        let mut chunk = single_hit(4);
        chunk.velocity_factor = 3.0;
        let events = run(&chunk, PatternWindow::new(0.0, 0.5, 0.125));
        assert_eq!(events[0].velocity, 1.0);
    }

    #[test]
    fn test_swing_delays_odd_steps() {
        let mut chunk = Chunk::with_steps("swing", vec![true, true, true, true]);
        chunk.swing = 0.5;
        let events = run(&chunk, PatternWindow::new(1.0, 0.5, 0.125));
        let times: Vec<f64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 1.125 + 0.03125, 1.25, 1.375 + 0.03125]);
    }

    #[test]
    fn test_humanize_stays_in_range() {
        let mut chunk = Chunk::with_steps("loose", vec![true; 16]);
        chunk.humanize = 1.0;
        let events = run(&chunk, PatternWindow::new(2.0, 2.0, 0.125));
        assert_eq!(events.len(), 16);
        for (i, event) in events.iter().enumerate() {
            let grid = 2.0 + i as f64 * 0.125;
            assert!(event.time >= 2.0);
            assert!((event.time - grid).abs() <= 0.0625 + 1e-9);
        }
        // Same seed, same result
        assert_eq!(events, run(&chunk, PatternWindow::new(2.0, 2.0, 0.125)));
    }

    #[test]
    fn test_hold_steps_circular() {
        assert_eq!(hold_steps(&[true, false, true, false]), vec![1, 0, 1, 0]);
        assert_eq!(hold_steps(&[false, true, false, false]), vec![0, 3, 1, 0]);
        assert_eq!(hold_steps(&[true, false, false, false])[0], 3);
    }

    #[test]
    fn test_explicit_sustain_is_clamped_to_hold() {
        let mut chunk = Chunk::with_steps("sus", vec![true, false, true, false]);
        chunk.sustain = Some(10.0);
        let events = run(&chunk, PatternWindow::new(0.0, 0.5, 0.125));
        assert!(events.iter().all(|e| (e.sustain - 0.25).abs() < 1e-9));

        chunk.sustain = Some(0.05);
        let events = run(&chunk, PatternWindow::new(0.0, 0.5, 0.125));
        assert!(events.iter().all(|e| (e.sustain - 0.05).abs() < 1e-9));
    }

    #[test]
    fn test_glide_keeps_overlap() {
        let mut chunk = Chunk::with_steps("glide", vec![true, true]);
        chunk.sustain = Some(0.01);
        chunk.glide = Some(0.5);
        let events = run(&chunk, PatternWindow::new(0.0, 0.25, 0.125));
        assert!(events.iter().all(|e| (e.sustain - (0.125 + GLIDE_OVERLAP)).abs() < 1e-9));
    }

    #[test]
    fn test_pitch_offsets_add() {
        let mut chunk = Chunk::with_steps("pitch", vec![true, true]);
        chunk.pitches = Some(vec![0, 7]);
        chunk.pitch_offset = -12;
        chunk.note = "E2".to_string();
        let events = run(&chunk, PatternWindow::new(0.0, 0.25, 0.125));
        assert_eq!(events.iter().map(|e| e.pitch).collect::<Vec<_>>(), vec![-12, -5]);
        assert!(events.iter().all(|e| e.note == "E2"));
    }

    #[test]
    fn test_empty_steps_and_zero_step_duration() {
        let chunk = Chunk::with_steps("empty", Vec::new());
        assert!(run(&chunk, PatternWindow::new(0.0, 4.0, 0.125)).is_empty());
        assert_eq!(chunk.loop_length(0.125), 2.0);

        let hit = single_hit(4);
        assert!(run(&hit, PatternWindow::new(0.0, 4.0, 0.0)).is_empty());
    }

    #[test]
    fn test_long_chunk_plays_every_step() {
        // 32 steps in a 16-step window: one full repetition, nothing dropped
        let chunk = Chunk::with_steps("long", vec![true; 32]);
        let events = run(&chunk, PatternWindow::new(0.0, 2.0, 0.125));
        assert_eq!(events.len(), 32);
        assert!((events[31].time - 31.0 * 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_partial_window_rounds_repetitions_up() {
        let chunk = Chunk::with_steps("half", vec![true, false, true, false]);
        // 1.5 loops → 2 complete repetitions
        let events = run(&chunk, PatternWindow::new(0.0, 0.75, 0.125));
        let times: Vec<f64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_free_mode_plays_whole_final_repetition() {
        let chunk = Chunk::with_note_events(
            "free",
            vec![NoteEvent::new(0.0, 0.1, 1.0), NoteEvent::new(0.8, 0.1, 1.0)],
        );
        // Loop = 0.9 s, window = 1.0 s → 2 repetitions including the event at 1.7 s
        let events = run(&chunk, PatternWindow::new(0.0, 1.0, 0.125));
        let times: Vec<f64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times.len(), 4);
        assert!((times[3] - 1.7).abs() < 1e-9);
    }

    #[test]
    fn test_free_mode_repeats_sorted_events() {
        let mut chunk = Chunk::with_note_events(
            "free",
            vec![
                NoteEvent { note: Some("E4".to_string()), ..NoteEvent::new(0.5, 0.25, 0.8) },
                NoteEvent::new(0.0, 0.5, 1.0),
            ],
        );
        chunk.note = "C4".to_string();
        // Loop = 0.75 s, window = 1.5 s → 2 repetitions
        let events = run(&chunk, PatternWindow::new(1.0, 1.5, 0.125));
        let summary: Vec<(f64, &str)> = events.iter().map(|e| (e.time, e.note.as_str())).collect();
        assert_eq!(summary, vec![(1.0, "C4"), (1.5, "E4"), (1.75, "C4"), (2.25, "E4")]);
        assert_eq!(events[1].sustain, 0.25);
        assert_eq!(events[1].velocity, 0.8);
    }

    #[test]
    fn test_free_mode_applies_chunk_pitch_offset() {
        let mut chunk = Chunk::with_note_events(
            "free",
            vec![NoteEvent { pitch: 2, ..NoteEvent::new(0.0, 0.5, 1.0) }],
        );
        chunk.pitch_offset = -12;
        let events = run(&chunk, PatternWindow::new(0.0, 0.5, 0.125));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pitch, -10);
    }

    #[test]
    fn test_free_mode_explicit_loop_and_gating() {
        let mut chunk = Chunk::with_note_events(
            "free",
            vec![NoteEvent::new(0.0, 0.1, 1.0), NoteEvent::new(0.2, 0.1, 0.0)],
        );
        chunk.note_loop_length = Some(1.0);
        let events = run(&chunk, PatternWindow::new(0.0, 3.0, 0.125));
        let times: Vec<f64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
    }
}
