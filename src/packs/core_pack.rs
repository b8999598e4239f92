// Core Pack
// Built-in instruments: kick, snare, hihat, bass, pulse, lead

use super::types::*;
use crate::graph::{EnvelopeShape, FilterKind, NoiseColor, Waveform};
use crate::macros::{KickMacros, PulseMode, PulseOverrides, PulseShape, PulseTarget};

pub const CORE_PACK_ID: &str = "core";

fn instrument(id: &str, name: &str, default: &str, characters: Vec<InstrumentCharacter>) -> InstrumentDefinition {
    InstrumentDefinition {
        id: id.to_string(),
        name: name.to_string(),
        default_character_id: Some(default.to_string()),
        characters,
    }
}

fn kick_defaults(punch: f32, clean: f32, tight: f32) -> CharacterDefaults {
    CharacterDefaults {
        kick: Some(KickMacros::new(punch, clean, tight)),
        note: Some("C1".to_string()),
        ..CharacterDefaults::default()
    }
}

/// Kick characters
///
/// - punchy: designer kick, short click, tight body
/// - deep: long, clean sub kick with a touch of room
/// - layered: membrane body + noise click + tonal top
/// - membrane: plain pitch-swept membrane
fn kick() -> InstrumentDefinition {
    instrument(
        "kick",
        "Kick",
        "punchy",
        vec![
            InstrumentCharacter::new("punchy", "Punchy", "KickDesigner")
                .with_defaults(kick_defaults(0.75, 0.55, 0.45)),
            InstrumentCharacter::new("deep", "Deep", "KickDesigner")
                .with_defaults(kick_defaults(0.3, 0.85, 0.8))
                .with_effect(EffectSpec::new("Reverb", &[("decay", 0.8), ("wet", 0.12)])),
            InstrumentCharacter::new("layered", "Layered", "LayeredKick")
                .with_options(CharacterOptions {
                    layers: vec![
                        LayerSpec::new(LayerSource::Membrane, 0.0),
                        LayerSpec {
                            velocity_scale: 0.6,
                            duration: Some(0.03),
                            ..LayerSpec::new(LayerSource::Noise, -10.0)
                        },
                        LayerSpec {
                            transpose: 12,
                            duration: Some(0.08),
                            ..LayerSpec::new(LayerSource::Tone, -8.0)
                        },
                    ],
                    pitch_decay: Some(0.05),
                    octaves: Some(5.0),
                    ..CharacterOptions::default()
                })
                .with_defaults(CharacterDefaults {
                    note: Some("C1".to_string()),
                    ..CharacterDefaults::default()
                }),
            InstrumentCharacter::new("membrane", "Membrane", "MembraneSynth")
                .with_options(CharacterOptions {
                    envelope: Some(EnvelopeShape::percussive(0.001, 0.4, 0.2)),
                    pitch_decay: Some(0.05),
                    octaves: Some(6.0),
                    ..CharacterOptions::default()
                })
                .with_defaults(CharacterDefaults {
                    note: Some("C1".to_string()),
                    ..CharacterDefaults::default()
                }),
        ],
    )
}

fn noise_options(color: NoiseColor, cutoff: f32, envelope: EnvelopeShape) -> CharacterOptions {
    CharacterOptions {
        noise: Some(color),
        filter_type: Some(FilterKind::Highpass),
        filter_frequency: Some(cutoff),
        filter_q: Some(0.8),
        envelope: Some(envelope),
        ..CharacterOptions::default()
    }
}

fn snare() -> InstrumentDefinition {
    instrument(
        "snare",
        "Snare",
        "crack",
        vec![
            InstrumentCharacter::new("crack", "Crack", "NoiseSynth")
                .with_options(noise_options(
                    NoiseColor::White,
                    1800.0,
                    EnvelopeShape::percussive(0.001, 0.16, 0.08),
                ))
                .with_effect(EffectSpec::new("Reverb", &[("decay", 1.2), ("wet", 0.2)])),
            InstrumentCharacter::new("brush", "Brush", "NoiseSynth").with_options(noise_options(
                NoiseColor::Pink,
                900.0,
                EnvelopeShape::percussive(0.01, 0.25, 0.15),
            )),
        ],
    )
}

fn hihat() -> InstrumentDefinition {
    instrument(
        "hihat",
        "Hi-Hat",
        "closed",
        vec![
            InstrumentCharacter::new("closed", "Closed", "NoiseSynth").with_options(noise_options(
                NoiseColor::White,
                7000.0,
                EnvelopeShape::percussive(0.001, 0.05, 0.03),
            )),
            InstrumentCharacter::new("open", "Open", "NoiseSynth").with_options(noise_options(
                NoiseColor::White,
                6000.0,
                EnvelopeShape::new(0.001, 0.3, 0.2, 0.25),
            )),
        ],
    )
}

fn bass() -> InstrumentDefinition {
    instrument(
        "bass",
        "Bass",
        "sub",
        vec![
            InstrumentCharacter::new("sub", "Sub", "MonoSynth")
                .with_options(CharacterOptions {
                    oscillator: Some(Waveform::Sawtooth),
                    envelope: Some(EnvelopeShape::new(0.005, 0.2, 0.6, 0.15)),
                    filter_type: Some(FilterKind::Lowpass),
                    filter_frequency: Some(600.0),
                    filter_q: Some(1.2),
                    portamento: Some(0.03),
                    ..CharacterOptions::default()
                })
                .with_defaults(CharacterDefaults {
                    note: Some("C2".to_string()),
                    ..CharacterDefaults::default()
                }),
            InstrumentCharacter::new("acid", "Acid", "MonoSynth")
                .with_options(CharacterOptions {
                    oscillator: Some(Waveform::Square),
                    envelope: Some(EnvelopeShape::new(0.002, 0.15, 0.3, 0.1)),
                    filter_type: Some(FilterKind::Lowpass),
                    filter_frequency: Some(1400.0),
                    filter_q: Some(6.0),
                    ..CharacterOptions::default()
                })
                .with_effect(EffectSpec::new("Distortion", &[("distortion", 0.35), ("wet", 0.5)]))
                .with_defaults(CharacterDefaults {
                    note: Some("C2".to_string()),
                    volume_db: Some(-4.0),
                    ..CharacterDefaults::default()
                }),
        ],
    )
}

fn pulse_defaults(mode: PulseMode, shape: PulseShape, target: PulseTarget, depth: f32, rate: f32) -> CharacterDefaults {
    CharacterDefaults {
        pulse: Some(PulseOverrides {
            mode: Some(mode),
            shape: Some(shape),
            target: Some(target),
            depth: Some(depth),
            rate: Some(rate),
            ..PulseOverrides::default()
        }),
        note: Some("C3".to_string()),
        ..CharacterDefaults::default()
    }
}

/// Pulse characters: sustained pad-like tone shaped by the pulse designer
fn pulse() -> InstrumentDefinition {
    let pad = |waveform: Waveform| CharacterOptions {
        oscillator: Some(waveform),
        envelope: Some(EnvelopeShape::new(0.02, 0.1, 0.9, 0.3)),
        ..CharacterOptions::default()
    };

    instrument(
        "pulse",
        "Pulse",
        "throb",
        vec![
            InstrumentCharacter::new("throb", "Throb", "PulseDesigner")
                .with_options(pad(Waveform::Sawtooth))
                .with_defaults(pulse_defaults(PulseMode::Lfo, PulseShape::Sine, PulseTarget::Filter, 0.7, 0.45)),
            InstrumentCharacter::new("gate", "Gate", "PulseDesigner")
                .with_options(pad(Waveform::Square))
                .with_defaults(pulse_defaults(
                    PulseMode::Pattern,
                    PulseShape::Square,
                    PulseTarget::Amplitude,
                    0.9,
                    0.6,
                )),
            InstrumentCharacter::new("chaos", "Chaos", "PulseDesigner")
                .with_options(pad(Waveform::Sawtooth))
                .with_effect(EffectSpec::new(
                    "FeedbackDelay",
                    &[("delayTime", 0.18), ("feedback", 0.35), ("wet", 0.2)],
                ))
                .with_defaults(pulse_defaults(
                    PulseMode::Random,
                    PulseShape::Square,
                    PulseTarget::Filter,
                    0.8,
                    0.55,
                )),
        ],
    )
}

fn lead() -> InstrumentDefinition {
    instrument(
        "lead",
        "Lead",
        "pluck",
        vec![
            InstrumentCharacter::new("pluck", "Pluck", "PluckSynth")
                .with_options(CharacterOptions {
                    filter_frequency: Some(3200.0),
                    ..CharacterOptions::default()
                })
                .with_effect(EffectSpec::new("Reverb", &[("decay", 2.0), ("wet", 0.25)])),
            InstrumentCharacter::new("square", "Square", "Synth")
                .with_options(CharacterOptions {
                    oscillator: Some(Waveform::Square),
                    envelope: Some(EnvelopeShape::new(0.01, 0.2, 0.5, 0.3)),
                    ..CharacterOptions::default()
                })
                .with_effect(EffectSpec::new(
                    "FeedbackDelay",
                    &[("delayTime", 0.375), ("feedback", 0.4), ("wet", 0.25)],
                ))
                .with_effect(EffectSpec::new("Compressor", &[("threshold", -18.0), ("ratio", 3.0)])),
        ],
    )
}

/// Create the built-in core pack
pub fn core_pack() -> SoundPack {
    SoundPack {
        id: CORE_PACK_ID.to_string(),
        name: "Core".to_string(),
        instruments: vec![kick(), snare(), hihat(), bass(), pulse(), lead()],
    }
}
