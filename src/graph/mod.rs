// Audio Graph - Abstract signal-processing graph consumed by the voice builders
// Sources → shaping stages → effects → output, with timed parameter automation

pub mod automation;
pub mod dsp;
pub mod offline;
pub mod registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use automation::{Automation, ParamTimeline, RampCurve};
pub use offline::{AudioBuffer, OfflineGraph};
pub use registry::{EffectOptions, EffectRegistry};

/// Handle to a node owned by a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("{node} has no parameter {param:?}")]
    UnsupportedParam { node: NodeId, param: Param },

    #[error("{0} cannot be triggered")]
    NotTriggerable(NodeId),

    #[error("{0} has no phase to reset")]
    NotPeriodic(NodeId),

    #[error("Unknown effect type: {0}")]
    UnknownEffect(String),

    #[error("Graph contains a cycle")]
    Cycle,
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Periodic waveform shapes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    #[default]
    White,
    Pink,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

/// ADSR envelope times (seconds) and sustain level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeShape {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl EnvelopeShape {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        EnvelopeShape {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
        }
    }

    /// Percussive envelope: no sustain stage
    pub fn percussive(attack: f32, decay: f32, release: f32) -> Self {
        EnvelopeShape::new(attack, decay, 0.0, release)
    }
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        EnvelopeShape::new(0.005, 0.1, 0.3, 0.5)
    }
}

/// Node types a graph can host
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Oscillator { waveform: Waveform, frequency: f32 },
    Noise { color: NoiseColor },
    /// Amplitude envelope applied to its input (a VCA)
    Envelope { shape: EnvelopeShape },
    Gain { gain: f32 },
    Filter { kind: FilterKind, frequency: f32, q: f32 },
    Distortion { amount: f32, wet: f32 },
    Eq3 { low_db: f32, mid_db: f32, high_db: f32 },
    Compressor { threshold_db: f32, ratio: f32 },
    Delay { time: f32, feedback: f32, wet: f32 },
    Reverb { decay: f32, wet: f32 },
    /// Control-rate oscillator scaled into [min, max], drives another node's parameter
    Lfo { waveform: Waveform, frequency: f32, min: f32, max: f32 },
}

impl NodeKind {
    /// Parameters this node exposes with their initial values
    pub fn params(&self) -> Vec<(Param, f32)> {
        match *self {
            NodeKind::Oscillator { frequency, .. } => vec![(Param::Frequency, frequency)],
            NodeKind::Noise { .. } => Vec::new(),
            NodeKind::Envelope { shape } => vec![
                (Param::Attack, shape.attack),
                (Param::Decay, shape.decay),
                (Param::Sustain, shape.sustain),
                (Param::Release, shape.release),
            ],
            NodeKind::Gain { gain } => vec![(Param::Gain, gain)],
            NodeKind::Filter { frequency, q, .. } => {
                vec![(Param::Frequency, frequency), (Param::Q, q)]
            }
            NodeKind::Distortion { amount, wet } => {
                vec![(Param::Amount, amount), (Param::Wet, wet)]
            }
            NodeKind::Eq3 { low_db, mid_db, high_db } => vec![
                (Param::Low, low_db),
                (Param::Mid, mid_db),
                (Param::High, high_db),
            ],
            NodeKind::Compressor { threshold_db, ratio } => {
                vec![(Param::Threshold, threshold_db), (Param::Ratio, ratio)]
            }
            NodeKind::Delay { time, feedback, wet } => vec![
                (Param::Time, time),
                (Param::Feedback, feedback),
                (Param::Wet, wet),
            ],
            NodeKind::Reverb { decay, wet } => vec![(Param::Decay, decay), (Param::Wet, wet)],
            NodeKind::Lfo { frequency, min, max, .. } => vec![
                (Param::Frequency, frequency),
                (Param::Min, min),
                (Param::Max, max),
            ],
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, NodeKind::Oscillator { .. } | NodeKind::Lfo { .. })
    }

    pub fn is_envelope(&self) -> bool {
        matches!(self, NodeKind::Envelope { .. })
    }
}

/// Automatable node parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    Frequency,
    Q,
    Gain,
    Amount,
    Wet,
    Low,
    Mid,
    High,
    Threshold,
    Ratio,
    Time,
    Feedback,
    Decay,
    Attack,
    Sustain,
    Release,
    Min,
    Max,
}

/// The audio-graph capability voices are built on
///
/// Times are absolute seconds on the graph's clock. Scheduling calls with a
/// time at or before [`AudioGraph::current_time`] take effect immediately.
pub trait AudioGraph {
    /// Create a node; the caller owns it until [`AudioGraph::dispose_node`]
    fn create_node(&mut self, kind: NodeKind) -> NodeId;

    fn connect(&mut self, from: NodeId, to: NodeId) -> GraphResult<()>;

    fn connect_to_output(&mut self, from: NodeId) -> GraphResult<()>;

    /// Route a node's output into another node's parameter (replaces its value)
    fn connect_param(&mut self, from: NodeId, to: NodeId, param: Param) -> GraphResult<()>;

    /// Remove every outgoing connection of a node
    fn disconnect(&mut self, node: NodeId) -> GraphResult<()>;

    fn set_param(&mut self, node: NodeId, param: Param, value: f32, time: f64) -> GraphResult<()>;

    fn ramp_param(
        &mut self,
        node: NodeId,
        param: Param,
        value: f32,
        start: f64,
        duration: f64,
        curve: RampCurve,
    ) -> GraphResult<()>;

    /// Parameter value once all scheduled automation has run
    fn param(&self, node: NodeId, param: Param) -> Option<f32>;

    /// Number of automation events scheduled on a node's parameters
    fn automation_count(&self, node: NodeId) -> usize;

    fn trigger_attack(&mut self, node: NodeId, time: f64, velocity: f32) -> GraphResult<()>;

    fn trigger_release(&mut self, node: NodeId, time: f64) -> GraphResult<()>;

    fn reset_phase(&mut self, node: NodeId, time: f64) -> GraphResult<()>;

    /// Release a node and its connections; returns false if it was already gone
    fn dispose_node(&mut self, node: NodeId) -> bool;

    fn contains(&self, node: NodeId) -> bool;

    fn node_count(&self) -> usize;

    fn current_time(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape_clamps() {
        let shape = EnvelopeShape::new(-1.0, 0.2, 3.0, 0.1);
        assert_eq!(shape.attack, 0.0);
        assert_eq!(shape.sustain, 1.0);
    }

    #[test]
    fn test_node_kind_params() {
        let kind = NodeKind::Filter { kind: FilterKind::Lowpass, frequency: 800.0, q: 1.0 };
        assert_eq!(kind.params(), vec![(Param::Frequency, 800.0), (Param::Q, 1.0)]);
        assert!(NodeKind::Noise { color: NoiseColor::White }.params().is_empty());
        assert!(NodeKind::Lfo { waveform: Waveform::Sine, frequency: 2.0, min: 0.0, max: 1.0 }.is_periodic());
    }

    #[test]
    fn test_waveform_serde() {
        let wave: Waveform = serde_json::from_str("\"sawtooth\"").unwrap();
        assert_eq!(wave, Waveform::Sawtooth);
    }
}
