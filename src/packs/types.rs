// Pack Type Definitions
// Sound packs are read-only instrument catalogs: engine tag, options, effects, default macros

use serde::{Deserialize, Serialize};

use crate::graph::{EffectOptions, EnvelopeShape, FilterKind, NoiseColor, Waveform};
use crate::macros::{KickMacros, PulseOverrides};

/// Signal source of one layered-kick layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerSource {
    /// Pitch-swept sine body
    #[default]
    Membrane,
    /// Filtered noise burst
    Noise,
    /// Plain triangle tone at the played pitch
    Tone,
}

fn unit_scale() -> f32 {
    1.0
}

/// One layer of a layered kick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    #[serde(default)]
    pub source: LayerSource,

    #[serde(default)]
    pub volume_db: f32,

    #[serde(default = "unit_scale")]
    pub velocity_scale: f32,

    /// Semitones relative to the played note
    #[serde(default)]
    pub transpose: i32,

    /// Fixed note length overriding the scheduled sustain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl LayerSpec {
    pub fn new(source: LayerSource, volume_db: f32) -> Self {
        LayerSpec {
            source,
            volume_db,
            velocity_scale: 1.0,
            transpose: 0,
            duration: None,
        }
    }
}

/// Engine options; every field is optional and engines pick what they use
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oscillator: Option<Waveform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeShape>,

    /// Membrane pitch-sweep time (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_decay: Option<f32>,

    /// Membrane pitch-sweep span (octaves)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub octaves: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<NoiseColor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<FilterKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_frequency: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_q: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<LayerSpec>,

    /// Glide time between consecutive mono notes (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portamento: Option<f32>,
}

/// Entry of a character's effect chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub options: EffectOptions,
}

impl EffectSpec {
    pub fn new(kind: &str, options: &[(&str, f32)]) -> Self {
        EffectSpec {
            kind: kind.to_string(),
            options: options
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect(),
        }
    }
}

/// Default macro values a character hands to its voice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick: Option<KickMacros>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<PulseOverrides>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_db: Option<f32>,

    /// Note played when a chunk does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A named preset: engine type + options + effects + default macros
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentCharacter {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Engine tag resolved through the voice engine registry
    #[serde(rename = "type")]
    pub engine: String,

    #[serde(default)]
    pub options: CharacterOptions,

    #[serde(default)]
    pub effects: Vec<EffectSpec>,

    #[serde(default)]
    pub defaults: CharacterDefaults,
}

impl InstrumentCharacter {
    pub fn new(id: &str, name: &str, engine: &str) -> Self {
        InstrumentCharacter {
            id: id.to_string(),
            name: name.to_string(),
            engine: engine.to_string(),
            options: CharacterOptions::default(),
            effects: Vec::new(),
            defaults: CharacterDefaults::default(),
        }
    }

    pub fn with_options(mut self, options: CharacterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_effect(mut self, effect: EffectSpec) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_defaults(mut self, defaults: CharacterDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

/// An instrument and its selectable characters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_character_id: Option<String>,

    #[serde(default)]
    pub characters: Vec<InstrumentCharacter>,
}

impl InstrumentDefinition {
    /// Resolve a character: requested id → instrument default → first available
    pub fn resolve_character(&self, requested: Option<&str>) -> Option<&InstrumentCharacter> {
        let by_id = |id: &str| self.characters.iter().find(|c| c.id == id);

        requested
            .and_then(by_id)
            .or_else(|| self.default_character_id.as_deref().and_then(by_id))
            .or_else(|| self.characters.first())
    }
}

/// A named collection of instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundPack {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

impl SoundPack {
    pub fn instrument(&self, id: &str) -> Option<&InstrumentDefinition> {
        self.instruments.iter().find(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument() -> InstrumentDefinition {
        InstrumentDefinition {
            id: "kick".to_string(),
            name: "Kick".to_string(),
            default_character_id: Some("deep".to_string()),
            characters: vec![
                InstrumentCharacter::new("punchy", "Punchy", "KickDesigner"),
                InstrumentCharacter::new("deep", "Deep", "KickDesigner"),
            ],
        }
    }

    #[test]
    fn test_resolve_character_fallback_chain() {
        let inst = instrument();
        assert_eq!(inst.resolve_character(Some("punchy")).unwrap().id, "punchy");
        assert_eq!(inst.resolve_character(Some("missing")).unwrap().id, "deep");
        assert_eq!(inst.resolve_character(None).unwrap().id, "deep");

        let no_default = InstrumentDefinition {
            default_character_id: None,
            ..instrument()
        };
        assert_eq!(no_default.resolve_character(None).unwrap().id, "punchy");

        let empty = InstrumentDefinition {
            characters: Vec::new(),
            ..instrument()
        };
        assert!(empty.resolve_character(None).is_none());
    }

    #[test]
    fn test_character_json_shape() {
        let json = r#"{
            "id": "gate",
            "type": "PulseDesigner",
            "options": { "oscillator": "sawtooth", "filterFrequency": 900 },
            "effects": [{ "type": "Reverb", "options": { "wet": 0.4 } }],
            "defaults": { "pulse": { "mode": "Pattern", "depth": 0.8 } }
        }"#;
        let character: InstrumentCharacter = serde_json::from_str(json).unwrap();
        assert_eq!(character.engine, "PulseDesigner");
        assert_eq!(character.options.oscillator, Some(Waveform::Sawtooth));
        assert_eq!(character.options.filter_frequency, Some(900.0));
        assert_eq!(character.effects[0].kind, "Reverb");
        assert_eq!(character.effects[0].options.get("wet"), Some(&0.4));
        let pulse = character.defaults.pulse.unwrap();
        assert_eq!(pulse.depth, Some(0.8));
    }

    #[test]
    fn test_layer_spec_defaults() {
        let layer: LayerSpec = serde_json::from_str(r#"{ "source": "noise" }"#).unwrap();
        assert_eq!(layer.source, LayerSource::Noise);
        assert_eq!(layer.velocity_scale, 1.0);
        assert_eq!(layer.volume_db, 0.0);
        assert!(layer.duration.is_none());
    }
}
