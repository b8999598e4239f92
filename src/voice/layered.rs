// Layered Kick Voice - Several kick layers summed into one output
// Each layer is trimmed by 20·log10(1/layerCount) dB so loudness ignores layer count

use crate::graph::{
    AudioGraph, EnvelopeShape, FilterKind, GraphResult, NodeId, NodeKind, NoiseColor, Param,
    RampCurve, Waveform,
};
use crate::packs::{InstrumentCharacter, LayerSource, LayerSpec};
use crate::project::db_to_gain;

use super::{swept_start, NodeBag, Voice, VoiceConfig};

const DEFAULT_PITCH_DECAY: f32 = 0.05;
const DEFAULT_OCTAVES: f32 = 5.0;
const NOISE_CUTOFF: f32 = 3000.0;

/// Level trim applied to every layer of an `n`-layer kick
pub fn layer_trim_db(layer_count: usize) -> f32 {
    20.0 * (1.0 / layer_count.max(1) as f32).log10()
}

struct Layer {
    spec: LayerSpec,
    oscillator: Option<NodeId>,
    envelope: NodeId,
}

pub struct LayeredKickVoice {
    character_id: String,
    layers: Vec<Layer>,
    pitch_decay: f32,
    octaves: f32,
    bag: NodeBag,
    out: NodeId,
}

impl LayeredKickVoice {
    pub fn new(
        graph: &mut dyn AudioGraph,
        character: &InstrumentCharacter,
        _config: &VoiceConfig,
    ) -> GraphResult<Self> {
        let options = &character.options;
        let specs = if options.layers.is_empty() {
            vec![LayerSpec::new(LayerSource::Membrane, 0.0)]
        } else {
            options.layers.clone()
        };
        let trim = layer_trim_db(specs.len());
        let envelope = options
            .envelope
            .unwrap_or_else(|| EnvelopeShape::percussive(0.001, 0.4, 0.1));

        let mut bag = NodeBag::new();
        let out = bag.create(graph, NodeKind::Gain {
            gain: db_to_gain(character.defaults.volume_db.unwrap_or(0.0)),
        });

        let mut layers = Vec::with_capacity(specs.len());
        for spec in specs {
            let (source, oscillator) = match spec.source {
                LayerSource::Membrane => {
                    let osc = bag.create(graph, NodeKind::Oscillator {
                        waveform: Waveform::Sine,
                        frequency: 50.0,
                    });
                    (osc, Some(osc))
                }
                LayerSource::Tone => {
                    let osc = bag.create(graph, NodeKind::Oscillator {
                        waveform: Waveform::Triangle,
                        frequency: 100.0,
                    });
                    (osc, Some(osc))
                }
                LayerSource::Noise => {
                    let noise = bag.create(graph, NodeKind::Noise { color: NoiseColor::White });
                    let filter = bag.create(graph, NodeKind::Filter {
                        kind: FilterKind::Highpass,
                        frequency: NOISE_CUTOFF,
                        q: 0.7,
                    });
                    graph.connect(noise, filter)?;
                    (filter, None)
                }
            };

            let env = bag.create(graph, NodeKind::Envelope { shape: envelope });
            let gain = bag.create(graph, NodeKind::Gain {
                gain: db_to_gain(spec.volume_db + trim),
            });
            graph.connect(source, env)?;
            graph.connect(env, gain)?;
            graph.connect(gain, out)?;

            layers.push(Layer {
                spec,
                oscillator,
                envelope: env,
            });
        }

        Ok(LayeredKickVoice {
            character_id: character.id.clone(),
            layers,
            pitch_decay: options.pitch_decay.unwrap_or(DEFAULT_PITCH_DECAY),
            octaves: options.octaves.unwrap_or(DEFAULT_OCTAVES),
            bag,
            out,
        })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

impl Voice for LayeredKickVoice {
    fn character_id(&self) -> &str {
        &self.character_id
    }

    fn output(&self) -> NodeId {
        self.out
    }

    fn nodes(&self) -> &NodeBag {
        &self.bag
    }

    fn nodes_mut(&mut self) -> &mut NodeBag {
        &mut self.bag
    }

    fn trigger_attack_release(
        &mut self,
        graph: &mut dyn AudioGraph,
        frequency: f32,
        duration: f64,
        time: f64,
        velocity: f32,
    ) -> GraphResult<()> {
        for layer in &self.layers {
            let spec = &layer.spec;
            let layer_frequency = frequency * 2f32.powf(spec.transpose as f32 / 12.0);
            let length = spec.duration.unwrap_or(duration).max(0.0);

            if let Some(osc) = layer.oscillator {
                graph.reset_phase(osc, time)?;
                if spec.source == LayerSource::Membrane {
                    graph.set_param(osc, Param::Frequency, swept_start(layer_frequency, self.octaves), time)?;
                    graph.ramp_param(
                        osc,
                        Param::Frequency,
                        layer_frequency,
                        time,
                        self.pitch_decay as f64,
                        RampCurve::Exponential,
                    )?;
                } else {
                    graph.set_param(osc, Param::Frequency, layer_frequency, time)?;
                }
            }

            let layer_velocity = (velocity * spec.velocity_scale).clamp(0.0, 1.0);
            graph.trigger_attack(layer.envelope, time, layer_velocity)?;
            graph.trigger_release(layer.envelope, time + length)?;
        }
        Ok(())
    }
}
