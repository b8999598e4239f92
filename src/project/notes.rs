// Note Names - Scientific pitch notation, MIDI numbers and frequencies
// "C4" = MIDI 60, "A4" = 440 Hz

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteError {
    #[error("Invalid note name: {0}")]
    InvalidName(String),
}

/// MIDI number used when a note name cannot be parsed (C4)
pub const FALLBACK_MIDI: i32 = 60;

const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Parse a note name such as `C4`, `F#2`, `Bb3` or `C-1` into a MIDI number
pub fn note_to_midi(name: &str) -> Result<i32, NoteError> {
    let invalid = || NoteError::InvalidName(name.to_string());
    let trimmed = name.trim();
    let mut chars = trimmed.chars();

    let letter = chars.next().ok_or_else(invalid)?;
    let mut pitch_class: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };

    let rest = chars.as_str();
    let accidentals = rest
        .chars()
        .take_while(|c| *c == '#' || *c == 'b')
        .count();
    for c in rest.chars().take(accidentals) {
        pitch_class += if c == '#' { 1 } else { -1 };
    }

    let octave: i32 = rest[accidentals..].parse().map_err(|_| invalid())?;
    Ok((octave + 1) * 12 + pitch_class)
}

/// Convert a MIDI number back to a sharp-spelled note name
pub fn midi_to_note(midi: i32) -> String {
    let octave = midi.div_euclid(12) - 1;
    let name = NAMES[midi.rem_euclid(12) as usize];
    format!("{}{}", name, octave)
}

/// Convert a (possibly fractional) MIDI note number to frequency in Hz
pub fn midi_to_freq(midi_note: f64) -> f64 {
    // A4 = 440 Hz = MIDI note 69
    440.0 * 2.0_f64.powf((midi_note - 69.0) / 12.0)
}

/// Frequency of a note name transposed by `semitones`
///
/// Unparsable names fall back to C4 with a warning.
pub fn note_frequency(name: &str, semitones: i32) -> f64 {
    let midi = note_to_midi(name).unwrap_or_else(|e| {
        log::warn!("{}, using {}", e, midi_to_note(FALLBACK_MIDI));
        FALLBACK_MIDI
    });
    midi_to_freq((midi + semitones) as f64)
}

/// Linear gain for a level in dB
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Level in dB for a linear gain
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-9).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_midi() {
        assert_eq!(note_to_midi("C4"), Ok(60));
        assert_eq!(note_to_midi("A4"), Ok(69));
        assert_eq!(note_to_midi("F#2"), Ok(42));
        assert_eq!(note_to_midi("Bb3"), Ok(58));
        assert_eq!(note_to_midi("c-1"), Ok(0));
        assert_eq!(note_to_midi(" E4 "), Ok(64));
    }

    #[test]
    fn test_invalid_note_names() {
        assert!(note_to_midi("").is_err());
        assert!(note_to_midi("H2").is_err());
        assert!(note_to_midi("C").is_err());
        assert!(note_to_midi("C#x").is_err());
    }

    #[test]
    fn test_midi_to_note_round_trip() {
        for midi in [0, 36, 42, 60, 69, 127] {
            assert_eq!(note_to_midi(&midi_to_note(midi)), Ok(midi));
        }
        assert_eq!(midi_to_note(61), "C#4");
    }

    #[test]
    fn test_midi_to_freq() {
        // A4 = 440 Hz
        assert!((midi_to_freq(69.0) - 440.0).abs() < 0.01);

        // A3 = 220 Hz (one octave down)
        assert!((midi_to_freq(57.0) - 220.0).abs() < 0.01);
    }

    #[test]
    fn test_note_frequency_transposes_and_falls_back() {
        assert!((note_frequency("A4", 12) - 880.0).abs() < 0.01);
        assert!((note_frequency("not a note", 0) - midi_to_freq(60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_db_conversions() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0206) - 0.5).abs() < 1e-3);
        assert!((gain_to_db(0.5) + 6.0206).abs() < 1e-3);
    }
}
