// Voice Engines - Registry of engine tags and the voice builder
// Character → engine voice → effect chain → graph output, wrapped in a GatedVoice

use std::collections::HashMap;

use crate::graph::{AudioGraph, EffectRegistry, GraphResult};
use crate::packs::InstrumentCharacter;

use super::synth::{SynthEngine, SynthVoice};
use super::{
    GatedVoice, KickVoice, LayeredKickVoice, PulseVoice, Voice, VoiceConfig, VoiceError,
    VoiceResult,
};

pub type EngineFactory =
    fn(&mut dyn AudioGraph, &InstrumentCharacter, &VoiceConfig) -> GraphResult<Box<dyn Voice>>;

fn kick_designer(
    graph: &mut dyn AudioGraph,
    character: &InstrumentCharacter,
    config: &VoiceConfig,
) -> GraphResult<Box<dyn Voice>> {
    Ok(Box::new(KickVoice::new(graph, character, config)?))
}

fn layered_kick(
    graph: &mut dyn AudioGraph,
    character: &InstrumentCharacter,
    config: &VoiceConfig,
) -> GraphResult<Box<dyn Voice>> {
    Ok(Box::new(LayeredKickVoice::new(graph, character, config)?))
}

fn pulse_designer(
    graph: &mut dyn AudioGraph,
    character: &InstrumentCharacter,
    config: &VoiceConfig,
) -> GraphResult<Box<dyn Voice>> {
    Ok(Box::new(PulseVoice::new(graph, character, config)?))
}

macro_rules! synth_factory {
    ($name:ident, $engine:expr) => {
        fn $name(
            graph: &mut dyn AudioGraph,
            character: &InstrumentCharacter,
            config: &VoiceConfig,
        ) -> GraphResult<Box<dyn Voice>> {
            Ok(Box::new(SynthVoice::new(graph, character, $engine, config)?))
        }
    };
}

synth_factory!(poly_synth, SynthEngine::Poly);
synth_factory!(mono_synth, SynthEngine::Mono);
synth_factory!(membrane_synth, SynthEngine::Membrane);
synth_factory!(noise_synth, SynthEngine::Noise);
synth_factory!(pluck_synth, SynthEngine::Pluck);

/// Voice constructors keyed by the character's `type` tag
pub struct EngineRegistry {
    engines: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn empty() -> Self {
        EngineRegistry {
            engines: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut registry = EngineRegistry::empty();
        registry.register("KickDesigner", kick_designer);
        registry.register("LayeredKick", layered_kick);
        registry.register("PulseDesigner", pulse_designer);
        registry.register("Synth", poly_synth);
        registry.register("MonoSynth", mono_synth);
        registry.register("MembraneSynth", membrane_synth);
        registry.register("NoiseSynth", noise_synth);
        registry.register("PluckSynth", pluck_synth);
        registry
    }

    pub fn register(&mut self, tag: &str, factory: EngineFactory) {
        self.engines.insert(tag.to_string(), factory);
    }

    pub fn get(&self, tag: &str) -> Option<EngineFactory> {
        self.engines.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.engines.contains_key(tag)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        EngineRegistry::standard()
    }
}

/// Build a complete voice for a character and route it to the graph output
///
/// Unknown effect tags are skipped with a warning. On a graph error every
/// node created so far is released before the error is returned.
pub fn build_voice(
    graph: &mut dyn AudioGraph,
    character: &InstrumentCharacter,
    config: &VoiceConfig,
    engines: &EngineRegistry,
    effects: &EffectRegistry,
) -> VoiceResult<Box<dyn Voice>> {
    let factory = engines
        .get(&character.engine)
        .ok_or_else(|| VoiceError::UnknownEngine(character.engine.clone()))?;

    let mut voice = factory(graph, character, config)?;
    if let Err(e) = attach_effects(graph, voice.as_mut(), character, effects) {
        voice.dispose(graph);
        return Err(e.into());
    }

    log::debug!(
        "Built {} voice {} ({} nodes)",
        character.engine,
        character.id,
        voice.nodes().len()
    );
    Ok(Box::new(GatedVoice::new(voice, config.max_polyphony)))
}

fn attach_effects(
    graph: &mut dyn AudioGraph,
    voice: &mut dyn Voice,
    character: &InstrumentCharacter,
    effects: &EffectRegistry,
) -> GraphResult<()> {
    let mut tail = voice.output();
    for spec in &character.effects {
        let kind = match effects.build(&spec.kind, &spec.options) {
            Ok(kind) => kind,
            Err(e) => {
                log::warn!("Skipping effect on {}: {}", character.id, e);
                continue;
            }
        };
        let node = voice.nodes_mut().create(graph, kind);
        graph.connect(tail, node)?;
        tail = node;
    }
    graph.connect_to_output(tail)
}
