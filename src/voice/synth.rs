// Generic Synth Voices - Character-driven engines for non-designer instruments
// Synth, MonoSynth, MembraneSynth, NoiseSynth, PluckSynth

use crate::graph::{
    AudioGraph, EnvelopeShape, FilterKind, GraphResult, NodeId, NodeKind, NoiseColor, Param,
    RampCurve, Waveform,
};
use crate::packs::InstrumentCharacter;
use crate::project::db_to_gain;

use super::{swept_start, NodeBag, Voice, VoiceConfig};

/// Round-robin parts per polyphonic engine
pub const POOL_SIZE: usize = 4;

const PLUCK_DECAY: f32 = 0.3;

/// Which generic engine a [`SynthVoice`] runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthEngine {
    /// Polyphonic oscillator + envelope
    Poly,
    /// Single oscillator → filter → envelope with optional portamento
    Mono,
    /// Pitch-swept sine, percussive
    Membrane,
    /// Filtered noise burst, pitch ignored
    Noise,
    /// Sawtooth through a closing low-pass
    Pluck,
}

/// One sounding part; oscillator-less parts are noise driven
#[derive(Debug, Clone, Copy)]
struct Part {
    oscillator: Option<NodeId>,
    filter: Option<NodeId>,
    envelope: NodeId,
    busy_until: f64,
}

pub struct SynthVoice {
    character_id: String,
    engine: SynthEngine,
    parts: Vec<Part>,
    next_part: usize,
    pitch_decay: f32,
    octaves: f32,
    cutoff: f32,
    portamento: f32,
    last_frequency: Option<f32>,
    bag: NodeBag,
    out: NodeId,
}

impl SynthVoice {
    pub fn new(
        graph: &mut dyn AudioGraph,
        character: &InstrumentCharacter,
        engine: SynthEngine,
        _config: &VoiceConfig,
    ) -> GraphResult<Self> {
        let options = &character.options;
        let mut bag = NodeBag::new();
        let out = bag.create(graph, NodeKind::Gain {
            gain: db_to_gain(character.defaults.volume_db.unwrap_or(0.0)),
        });

        let envelope = options.envelope.unwrap_or(match engine {
            SynthEngine::Poly | SynthEngine::Mono => EnvelopeShape::default(),
            SynthEngine::Membrane => EnvelopeShape::percussive(0.001, 0.4, 0.2),
            SynthEngine::Noise => EnvelopeShape::percussive(0.001, 0.1, 0.05),
            SynthEngine::Pluck => EnvelopeShape::percussive(0.001, 0.6, 0.3),
        });
        let cutoff = options.filter_frequency.unwrap_or(match engine {
            SynthEngine::Noise => 2000.0,
            _ => 3200.0,
        });
        let part_count = if engine == SynthEngine::Mono { 1 } else { POOL_SIZE };

        let mut parts = Vec::with_capacity(part_count);
        for _ in 0..part_count {
            let (source, oscillator) = match engine {
                SynthEngine::Noise => {
                    let noise = bag.create(graph, NodeKind::Noise {
                        color: options.noise.unwrap_or(NoiseColor::White),
                    });
                    (noise, None)
                }
                _ => {
                    let waveform = match engine {
                        SynthEngine::Membrane => Waveform::Sine,
                        SynthEngine::Pluck => Waveform::Sawtooth,
                        _ => options.oscillator.unwrap_or(Waveform::Triangle),
                    };
                    let osc = bag.create(graph, NodeKind::Oscillator {
                        waveform,
                        frequency: 261.63,
                    });
                    (osc, Some(osc))
                }
            };

            let filter = match engine {
                SynthEngine::Mono | SynthEngine::Noise | SynthEngine::Pluck => {
                    let default_kind = if engine == SynthEngine::Noise {
                        FilterKind::Highpass
                    } else {
                        FilterKind::Lowpass
                    };
                    Some(bag.create(graph, NodeKind::Filter {
                        kind: options.filter_type.unwrap_or(default_kind),
                        frequency: cutoff,
                        q: options.filter_q.unwrap_or(1.0),
                    }))
                }
                SynthEngine::Poly | SynthEngine::Membrane => None,
            };

            let env = bag.create(graph, NodeKind::Envelope { shape: envelope });
            match filter {
                Some(filter) => {
                    graph.connect(source, filter)?;
                    graph.connect(filter, env)?;
                }
                None => graph.connect(source, env)?,
            }
            graph.connect(env, out)?;

            parts.push(Part {
                oscillator,
                filter,
                envelope: env,
                busy_until: f64::NEG_INFINITY,
            });
        }

        Ok(SynthVoice {
            character_id: character.id.clone(),
            engine,
            parts,
            next_part: 0,
            pitch_decay: options.pitch_decay.unwrap_or(0.05),
            octaves: options.octaves.unwrap_or(6.0),
            cutoff,
            portamento: options.portamento.unwrap_or(0.0),
            last_frequency: None,
            bag,
            out,
        })
    }

    pub fn engine(&self) -> SynthEngine {
        self.engine
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Prefer a free part, otherwise steal round-robin
    fn pick_part(&mut self, time: f64) -> usize {
        let index = (0..self.parts.len())
            .map(|offset| (self.next_part + offset) % self.parts.len())
            .find(|&i| self.parts[i].busy_until <= time)
            .unwrap_or(self.next_part % self.parts.len());
        self.next_part = (index + 1) % self.parts.len();
        index
    }
}

impl Voice for SynthVoice {
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
        let duration = duration.max(0.0);
        let index = self.pick_part(time);
        let part = self.parts[index];

        if let Some(osc) = part.oscillator {
            match self.engine {
                SynthEngine::Membrane => {
                    graph.reset_phase(osc, time)?;
                    graph.set_param(osc, Param::Frequency, swept_start(frequency, self.octaves), time)?;
                    graph.ramp_param(
                        osc,
                        Param::Frequency,
                        frequency,
                        time,
                        self.pitch_decay as f64,
                        RampCurve::Exponential,
                    )?;
                }
                SynthEngine::Mono if self.portamento > 0.0 && part.busy_until > time => {
                    // Legato: glide from the sounding pitch, no phase reset
                    let from = self.last_frequency.unwrap_or(frequency);
                    graph.set_param(osc, Param::Frequency, from, time)?;
                    graph.ramp_param(
                        osc,
                        Param::Frequency,
                        frequency,
                        time,
                        self.portamento as f64,
                        RampCurve::Exponential,
                    )?;
                }
                _ => {
                    graph.reset_phase(osc, time)?;
                    graph.set_param(osc, Param::Frequency, frequency, time)?;
                }
            }
        }

        if let (SynthEngine::Pluck, Some(filter)) = (self.engine, part.filter) {
            let floor = (frequency * 2.0).min(self.cutoff);
            graph.set_param(filter, Param::Frequency, self.cutoff, time)?;
            graph.ramp_param(filter, Param::Frequency, floor, time, PLUCK_DECAY as f64, RampCurve::Exponential)?;
        }

        graph.trigger_attack(part.envelope, time, velocity)?;
        graph.trigger_release(part.envelope, time + duration)?;

        self.parts[index].busy_until = time + duration;
        self.last_frequency = Some(frequency);
        Ok(())
    }
}
