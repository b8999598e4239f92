// Voice Module - Instrument voice graph builder
// Builds per-character node graphs on an AudioGraph and owns their lifecycle

pub mod engine;
pub mod gate;
pub mod kick;
pub mod layered;
pub mod nodes;
pub mod pulse;
pub mod synth;

use thiserror::Error;

use crate::graph::{AudioGraph, GraphError, GraphResult, NodeId, Param, RampCurve};
use crate::macros::{KickMacroPatch, PulseOverrides};

pub use engine::{build_voice, EngineFactory, EngineRegistry};
pub use gate::GatedVoice;
pub use kick::KickVoice;
pub use layered::LayeredKickVoice;
pub use nodes::NodeBag;
pub use pulse::{PulseEvent, PulseVoice};

#[derive(Debug, Error, PartialEq)]
pub enum VoiceError {
    #[error("Unknown voice engine: {0}")]
    UnknownEngine(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type VoiceResult<T> = Result<T, VoiceError>;

/// Per-voice tuning shared by every engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceConfig {
    /// Ramp time for live parameter changes (seconds)
    pub ramp_time: f64,

    /// Simultaneous notes allowed by the gate decorator
    pub max_polyphony: usize,

    /// Seed for voices with randomness (random pulse gate)
    pub seed: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        VoiceConfig {
            ramp_time: 0.03,
            max_polyphony: 16,
            seed: 0,
        }
    }
}

/// Partial macro update routed to whichever voice understands it
#[derive(Debug, Clone, PartialEq)]
pub enum MacroPatch {
    Kick(KickMacroPatch),
    Pulse(PulseOverrides),
}

/// A playable instrument voice
///
/// Every node a voice creates lives in its [`NodeBag`]; `dispose` releases
/// them all and is safe to call more than once.
pub trait Voice {
    fn character_id(&self) -> &str;

    /// Last node of the voice before the effect chain
    fn output(&self) -> NodeId;

    fn nodes(&self) -> &NodeBag;

    fn nodes_mut(&mut self) -> &mut NodeBag;

    /// Play one note starting at `time` for `duration` seconds
    fn trigger_attack_release(
        &mut self,
        graph: &mut dyn AudioGraph,
        frequency: f32,
        duration: f64,
        time: f64,
        velocity: f32,
    ) -> GraphResult<()>;

    /// Live macro update: ramps running parameters, never rebuilds
    ///
    /// Returns whether anything changed.
    fn set_macro_state(&mut self, _graph: &mut dyn AudioGraph, _patch: &MacroPatch) -> GraphResult<bool> {
        Ok(false)
    }

    /// Structural update; may disconnect and rewire nodes
    fn set_style(&mut self, graph: &mut dyn AudioGraph, patch: &MacroPatch) -> GraphResult<bool> {
        self.set_macro_state(graph, patch)
    }

    /// Generate self-driven events (gates, modulation) up to `until`
    fn schedule_until(&mut self, _graph: &mut dyn AudioGraph, _until: f64) -> GraphResult<()> {
        Ok(())
    }

    /// Release every owned node; returns how many were released
    fn dispose(&mut self, graph: &mut dyn AudioGraph) -> usize {
        let released = self.nodes_mut().dispose(graph);
        if released > 0 {
            log::debug!("Disposed voice {} ({} nodes)", self.character_id(), released);
        }
        released
    }

    fn as_pulse_mut(&mut self) -> Option<&mut PulseVoice> {
        None
    }
}

/// Ramp a parameter to `value` unless it is already there
///
/// Returns whether a ramp was scheduled.
pub fn ramp_to(
    graph: &mut dyn AudioGraph,
    node: NodeId,
    param: Param,
    value: f32,
    ramp_time: f64,
) -> GraphResult<bool> {
    if let Some(current) = graph.param(node, param) {
        if (current - value).abs() <= f32::EPSILON {
            return Ok(false);
        }
    }
    let now = graph.current_time();
    graph.ramp_param(node, param, value, now, ramp_time, RampCurve::Linear)?;
    Ok(true)
}

/// Frequency after a pitch sweep of `octaves` above `frequency`
pub fn swept_start(frequency: f32, octaves: f32) -> f32 {
    frequency * 2f32.powf(octaves.max(0.0))
}
