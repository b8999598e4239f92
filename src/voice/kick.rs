// Kick Designer Voice - Sine body with pitch sweep plus filtered noise click
// Body and click → distortion → 3-band EQ → output gain, driven by punch/clean/tight

use crate::graph::{
    AudioGraph, EnvelopeShape, FilterKind, GraphResult, NodeId, NodeKind, NoiseColor, Param,
    RampCurve, Waveform,
};
use crate::macros::{map_kick_params, KickMacros, KickParams};
use crate::packs::InstrumentCharacter;
use crate::project::db_to_gain;

use super::{ramp_to, swept_start, MacroPatch, NodeBag, Voice, VoiceConfig};

const CLICK_ATTACK: f32 = 0.0005;
const CLICK_RELEASE: f32 = 0.01;
const CLICK_Q: f32 = 0.7;
const BODY_ATTACK: f32 = 0.001;

struct KickNodes {
    body_osc: NodeId,
    body_env: NodeId,
    body_gain: NodeId,
    click_filter: NodeId,
    click_env: NodeId,
    click_gain: NodeId,
    distortion: NodeId,
    eq: NodeId,
    out: NodeId,
}

pub struct KickVoice {
    character_id: String,
    macros: KickMacros,
    params: KickParams,
    volume: f32,
    ramp_time: f64,
    bag: NodeBag,
    nodes: KickNodes,
}

impl KickVoice {
    pub fn new(
        graph: &mut dyn AudioGraph,
        character: &InstrumentCharacter,
        config: &VoiceConfig,
    ) -> GraphResult<Self> {
        let macros = character.defaults.kick.unwrap_or_default().sanitized();
        let params = map_kick_params(&macros);
        let volume = db_to_gain(character.defaults.volume_db.unwrap_or(0.0));
        let mut bag = NodeBag::new();

        let body_osc = bag.create(graph, NodeKind::Oscillator {
            waveform: Waveform::Sine,
            frequency: 50.0,
        });
        let body_env = bag.create(graph, NodeKind::Envelope {
            shape: EnvelopeShape::percussive(BODY_ATTACK, params.body_decay, params.body_release),
        });
        let body_gain = bag.create(graph, NodeKind::Gain { gain: params.body_level });

        let click_noise = bag.create(graph, NodeKind::Noise { color: NoiseColor::White });
        let click_filter = bag.create(graph, NodeKind::Filter {
            kind: FilterKind::Highpass,
            frequency: params.click_cutoff,
            q: CLICK_Q,
        });
        let click_env = bag.create(graph, NodeKind::Envelope {
            shape: EnvelopeShape::percussive(CLICK_ATTACK, params.click_decay, CLICK_RELEASE),
        });
        let click_gain = bag.create(graph, NodeKind::Gain { gain: params.transient_level });

        let distortion = bag.create(graph, NodeKind::Distortion {
            amount: params.distortion_amount,
            wet: params.distortion_wet,
        });
        let eq = bag.create(graph, NodeKind::Eq3 {
            low_db: params.eq_low_db,
            mid_db: params.eq_mid_db,
            high_db: params.eq_high_db,
        });
        let out = bag.create(graph, NodeKind::Gain { gain: params.output_gain * volume });

        graph.connect(body_osc, body_env)?;
        graph.connect(body_env, body_gain)?;
        graph.connect(body_gain, distortion)?;
        graph.connect(click_noise, click_filter)?;
        graph.connect(click_filter, click_env)?;
        graph.connect(click_env, click_gain)?;
        graph.connect(click_gain, distortion)?;
        graph.connect(distortion, eq)?;
        graph.connect(eq, out)?;

        log::debug!("Built kick voice {} with {:?}", character.id, macros);

        Ok(KickVoice {
            character_id: character.id.clone(),
            macros,
            params,
            volume,
            ramp_time: config.ramp_time,
            bag,
            nodes: KickNodes {
                body_osc,
                body_env,
                body_gain,
                click_filter,
                click_env,
                click_gain,
                distortion,
                eq,
                out,
            },
        })
    }

    pub fn macros(&self) -> KickMacros {
        self.macros
    }

    pub fn params(&self) -> &KickParams {
        &self.params
    }

    /// Apply a full macro state, ramping only parameters that moved
    pub fn set_macros(&mut self, graph: &mut dyn AudioGraph, macros: KickMacros) -> GraphResult<bool> {
        let macros = macros.sanitized();
        if macros == self.macros {
            return Ok(false);
        }
        let params = map_kick_params(&macros);
        let n = &self.nodes;
        let ramp = self.ramp_time;

        let targets = [
            (n.body_gain, Param::Gain, params.body_level),
            (n.body_env, Param::Decay, params.body_decay),
            (n.body_env, Param::Release, params.body_release),
            (n.click_gain, Param::Gain, params.transient_level),
            (n.click_env, Param::Decay, params.click_decay),
            (n.click_filter, Param::Frequency, params.click_cutoff),
            (n.distortion, Param::Amount, params.distortion_amount),
            (n.distortion, Param::Wet, params.distortion_wet),
            (n.eq, Param::Low, params.eq_low_db),
            (n.eq, Param::Mid, params.eq_mid_db),
            (n.eq, Param::High, params.eq_high_db),
            (n.out, Param::Gain, params.output_gain * self.volume),
        ];
        for (node, param, value) in targets {
            ramp_to(graph, node, param, value, ramp)?;
        }

        self.macros = macros;
        self.params = params;
        Ok(true)
    }
}

impl Voice for KickVoice {
    fn character_id(&self) -> &str {
        &self.character_id
    }

    fn output(&self) -> NodeId {
        self.nodes.out
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
        let n = &self.nodes;
        let release_at = time + duration.max(0.0);

        graph.reset_phase(n.body_osc, time)?;
        graph.set_param(n.body_osc, Param::Frequency, swept_start(frequency, self.params.octaves), time)?;
        graph.ramp_param(
            n.body_osc,
            Param::Frequency,
            frequency,
            time,
            self.params.pitch_decay as f64,
            RampCurve::Exponential,
        )?;

        graph.trigger_attack(n.body_env, time, velocity)?;
        graph.trigger_attack(n.click_env, time, velocity)?;
        graph.trigger_release(n.body_env, release_at)?;
        graph.trigger_release(n.click_env, release_at)?;
        Ok(())
    }

    fn set_macro_state(&mut self, graph: &mut dyn AudioGraph, patch: &MacroPatch) -> GraphResult<bool> {
        match patch {
            MacroPatch::Kick(patch) => {
                let merged = self.macros.merged(patch);
                self.set_macros(graph, merged)
            }
            MacroPatch::Pulse(_) => Ok(false),
        }
    }
}
