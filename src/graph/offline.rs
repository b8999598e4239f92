// Offline Graph - Sample-accurate, non-realtime implementation of AudioGraph
// Evaluates nodes in topological order once per sample, mono master bus

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::automation::{Automation, ParamTimeline, RampCurve};
use super::dsp::{param_index, ParamValues, Processor, PARAM_COUNT};
use super::{AudioGraph, GraphError, GraphResult, NodeId, NodeKind, Param};

/// Rendered audio, one Vec per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        AudioBuffer {
            sample_rate,
            channels,
        }
    }

    /// Copy a mono signal into `channel_count` identical channels
    pub fn from_mono(sample_rate: u32, mono: Vec<f32>, channel_count: usize) -> Self {
        let channel_count = channel_count.max(1);
        AudioBuffer::new(sample_rate, vec![mono; channel_count])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved samples (L R L R ...)
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channel_count());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    pub fn is_silent(&self) -> bool {
        self.peak() == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    Attack(f32),
    Release,
    ResetPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Input(NodeId),
    Param(NodeId, Param),
    Output,
}

struct GraphNode {
    kind: NodeKind,
    processor: Processor,
    timelines: BTreeMap<Param, ParamTimeline>,
    triggers: Vec<(f64, Trigger)>,
    trigger_cursor: usize,
    automation_events: usize,
}

impl GraphNode {
    fn new(kind: NodeKind, sample_rate: f32) -> Self {
        GraphNode {
            kind,
            processor: Processor::new(&kind, sample_rate),
            timelines: kind
                .params()
                .into_iter()
                .map(|(param, value)| (param, ParamTimeline::new(value)))
                .collect(),
            triggers: Vec::new(),
            trigger_cursor: 0,
            automation_events: 0,
        }
    }

    fn schedule_trigger(&mut self, time: f64, trigger: Trigger) {
        let position = self.triggers[self.trigger_cursor..]
            .partition_point(|(t, _)| *t <= time)
            + self.trigger_cursor;
        self.triggers.insert(position, (time, trigger));
    }

    fn apply_triggers(&mut self, time: f64) {
        while let Some(&(at, trigger)) = self.triggers.get(self.trigger_cursor) {
            if at > time {
                break;
            }
            match trigger {
                Trigger::Attack(velocity) => self.processor.trigger_attack(velocity),
                Trigger::Release => self.processor.trigger_release(),
                Trigger::ResetPhase => self.processor.reset_phase(),
            };
            self.trigger_cursor += 1;
        }
    }

    fn advance_params(&mut self, time: f64, values: &mut ParamValues) {
        for (param, timeline) in self.timelines.iter_mut() {
            values[param_index(*param)] = timeline.advance(time);
        }
    }
}

/// Render plan: node indices in evaluation order plus resolved routing
struct Plan {
    order: Vec<usize>,
    inputs: Vec<Vec<usize>>,
    modulators: Vec<Vec<(usize, usize)>>,
    outputs: Vec<usize>,
}

/// Non-realtime audio graph
pub struct OfflineGraph {
    sample_rate: u32,
    frames_rendered: u64,
    next_id: u32,
    nodes: BTreeMap<NodeId, GraphNode>,
    edges: Vec<(NodeId, Target)>,
}

impl OfflineGraph {
    pub fn new(sample_rate: u32) -> Self {
        OfflineGraph {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            next_id: 0,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node).map(|n| n.kind)
    }

    /// Nodes feeding `node`'s input
    pub fn inputs_of(&self, node: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|(_, target)| *target == Target::Input(node))
            .map(|(from, _)| *from)
            .collect()
    }

    pub fn is_connected_to_output(&self, node: NodeId) -> bool {
        self.edges.contains(&(node, Target::Output))
    }

    fn node_mut(&mut self, node: NodeId) -> GraphResult<&mut GraphNode> {
        self.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))
    }

    fn require(&self, node: NodeId) -> GraphResult<()> {
        if self.nodes.contains_key(&node) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(node))
        }
    }

    fn add_edge(&mut self, from: NodeId, target: Target) -> GraphResult<()> {
        if self.edges.contains(&(from, target)) {
            return Ok(());
        }
        self.edges.push((from, target));
        if let Err(e) = self.plan() {
            self.edges.pop();
            return Err(e);
        }
        Ok(())
    }

    fn timeline(&mut self, node: NodeId, param: Param) -> GraphResult<&mut ParamTimeline> {
        let entry = self.node_mut(node)?;
        let timeline = entry
            .timelines
            .get_mut(&param)
            .ok_or(GraphError::UnsupportedParam { node, param })?;
        entry.automation_events += 1;
        Ok(timeline)
    }

    fn clamp_time(&self, time: f64) -> f64 {
        time.max(self.current_time())
    }

    /// Kahn's algorithm over node→node and node→param edges
    fn plan(&self) -> GraphResult<Plan> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        let index: HashMap<NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut inputs = vec![Vec::new(); ids.len()];
        let mut modulators = vec![Vec::new(); ids.len()];
        let mut outputs = Vec::new();
        let mut dependents = vec![Vec::new(); ids.len()];
        let mut in_degree = vec![0usize; ids.len()];

        for (from, target) in &self.edges {
            let Some(&src) = index.get(from) else { continue };
            match *target {
                Target::Input(to) => {
                    if let Some(&dst) = index.get(&to) {
                        inputs[dst].push(src);
                        dependents[src].push(dst);
                        in_degree[dst] += 1;
                    }
                }
                Target::Param(to, param) => {
                    if let Some(&dst) = index.get(&to) {
                        modulators[dst].push((param_index(param), src));
                        dependents[src].push(dst);
                        in_degree[dst] += 1;
                    }
                }
                Target::Output => outputs.push(src),
            }
        }

        let mut queue: VecDeque<usize> = (0..ids.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(ids.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &dst in &dependents[i] {
                in_degree[dst] -= 1;
                if in_degree[dst] == 0 {
                    queue.push_back(dst);
                }
            }
        }

        if order.len() != ids.len() {
            return Err(GraphError::Cycle);
        }

        Ok(Plan {
            order,
            inputs,
            modulators,
            outputs,
        })
    }

    /// Render `frames` mono samples of the master bus and advance the clock
    pub fn render_frames(&mut self, frames: usize) -> GraphResult<Vec<f32>> {
        let plan = self.plan()?;
        let sample_rate = self.sample_rate as f64;
        let start_frame = self.frames_rendered;

        let mut nodes: Vec<&mut GraphNode> = self.nodes.values_mut().collect();
        let mut values: Vec<ParamValues> = vec![[0.0; PARAM_COUNT]; nodes.len()];
        let mut outputs = vec![0.0f32; nodes.len()];
        let mut master = Vec::with_capacity(frames);

        for frame in 0..frames {
            let time = (start_frame + frame as u64) as f64 / sample_rate;

            for &i in &plan.order {
                let node = &mut nodes[i];
                node.apply_triggers(time);
                node.advance_params(time, &mut values[i]);

                for &(param, src) in &plan.modulators[i] {
                    values[i][param] = outputs[src];
                }
                let input: f32 = plan.inputs[i].iter().map(|&src| outputs[src]).sum();
                outputs[i] = node.processor.process(input, &values[i]);
            }

            master.push(plan.outputs.iter().map(|&i| outputs[i]).sum());
        }

        self.frames_rendered += frames as u64;
        Ok(master)
    }

    /// Render `duration` seconds into `channels` identical channels
    pub fn render(&mut self, duration: f64, channels: usize) -> GraphResult<AudioBuffer> {
        let frames = (duration.max(0.0) * self.sample_rate as f64).ceil() as usize;
        let mono = self.render_frames(frames)?;
        Ok(AudioBuffer::from_mono(self.sample_rate, mono, channels))
    }
}

impl AudioGraph for OfflineGraph {
    fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, GraphNode::new(kind, self.sample_rate as f32));
        id
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> GraphResult<()> {
        self.require(from)?;
        self.require(to)?;
        self.add_edge(from, Target::Input(to))
    }

    fn connect_to_output(&mut self, from: NodeId) -> GraphResult<()> {
        self.require(from)?;
        self.add_edge(from, Target::Output)
    }

    fn connect_param(&mut self, from: NodeId, to: NodeId, param: Param) -> GraphResult<()> {
        self.require(from)?;
        let target = self.nodes.get(&to).ok_or(GraphError::UnknownNode(to))?;
        if !target.timelines.contains_key(&param) {
            return Err(GraphError::UnsupportedParam { node: to, param });
        }
        self.add_edge(from, Target::Param(to, param))
    }

    fn disconnect(&mut self, node: NodeId) -> GraphResult<()> {
        self.require(node)?;
        self.edges.retain(|(from, _)| *from != node);
        Ok(())
    }

    fn set_param(&mut self, node: NodeId, param: Param, value: f32, time: f64) -> GraphResult<()> {
        let time = self.clamp_time(time);
        self.timeline(node, param)?
            .schedule(Automation::Set { time, value });
        Ok(())
    }

    fn ramp_param(
        &mut self,
        node: NodeId,
        param: Param,
        value: f32,
        start: f64,
        duration: f64,
        curve: RampCurve,
    ) -> GraphResult<()> {
        let start = self.clamp_time(start);
        self.timeline(node, param)?.schedule(Automation::Ramp {
            start,
            duration,
            value,
            curve,
        });
        Ok(())
    }

    fn param(&self, node: NodeId, param: Param) -> Option<f32> {
        self.nodes
            .get(&node)
            .and_then(|n| n.timelines.get(&param))
            .map(ParamTimeline::target)
    }

    fn automation_count(&self, node: NodeId) -> usize {
        self.nodes
            .get(&node)
            .map(|n| n.automation_events)
            .unwrap_or(0)
    }

    fn trigger_attack(&mut self, node: NodeId, time: f64, velocity: f32) -> GraphResult<()> {
        let time = self.clamp_time(time);
        let entry = self.node_mut(node)?;
        if !entry.kind.is_envelope() {
            return Err(GraphError::NotTriggerable(node));
        }
        entry.schedule_trigger(time, Trigger::Attack(velocity));
        Ok(())
    }

    fn trigger_release(&mut self, node: NodeId, time: f64) -> GraphResult<()> {
        let time = self.clamp_time(time);
        let entry = self.node_mut(node)?;
        if !entry.kind.is_envelope() {
            return Err(GraphError::NotTriggerable(node));
        }
        entry.schedule_trigger(time, Trigger::Release);
        Ok(())
    }

    fn reset_phase(&mut self, node: NodeId, time: f64) -> GraphResult<()> {
        let time = self.clamp_time(time);
        let entry = self.node_mut(node)?;
        if !entry.kind.is_periodic() {
            return Err(GraphError::NotPeriodic(node));
        }
        entry.schedule_trigger(time, Trigger::ResetPhase);
        Ok(())
    }

    fn dispose_node(&mut self, node: NodeId) -> bool {
        if self.nodes.remove(&node).is_none() {
            return false;
        }
        self.edges.retain(|(from, target)| {
            *from != node
                && match *target {
                    Target::Input(to) | Target::Param(to, _) => to != node,
                    Target::Output => true,
                }
        });
        true
    }

    fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EnvelopeShape, Waveform};

    fn sine(graph: &mut OfflineGraph, frequency: f32) -> NodeId {
        graph.create_node(NodeKind::Oscillator {
            waveform: Waveform::Sine,
            frequency,
        })
    }

    #[test]
    fn test_unconnected_graph_is_silent() {
        let mut graph = OfflineGraph::new(8000);
        sine(&mut graph, 440.0);
        let buffer = graph.render(0.1, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 800);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_oscillator_to_output() {
        let mut graph = OfflineGraph::new(8000);
        let osc = sine(&mut graph, 440.0);
        graph.connect_to_output(osc).unwrap();
        let buffer = graph.render(0.1, 1).unwrap();
        assert!(buffer.peak() > 0.9);
        assert!((graph.current_time() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_envelope_gates_signal() {
        let mut graph = OfflineGraph::new(8000);
        let osc = sine(&mut graph, 200.0);
        let env = graph.create_node(NodeKind::Envelope {
            shape: EnvelopeShape::percussive(0.001, 0.05, 0.01),
        });
        graph.connect(osc, env).unwrap();
        graph.connect_to_output(env).unwrap();

        // Silent until the attack at 0.1 s
        let before = graph.render_frames(800).unwrap();
        assert!(before.iter().all(|s| *s == 0.0));

        graph.trigger_attack(env, 0.1, 1.0).unwrap();
        let after = graph.render_frames(800).unwrap();
        assert!(after.iter().any(|s| s.abs() > 0.5));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = OfflineGraph::new(8000);
        let a = graph.create_node(NodeKind::Gain { gain: 1.0 });
        let b = graph.create_node(NodeKind::Gain { gain: 1.0 });
        graph.connect(a, b).unwrap();
        assert_eq!(graph.connect(b, a), Err(GraphError::Cycle));
        // The rejected edge was rolled back
        assert!(graph.render_frames(1).is_ok());
    }

    #[test]
    fn test_param_validation() {
        let mut graph = OfflineGraph::new(8000);
        let gain = graph.create_node(NodeKind::Gain { gain: 0.5 });
        assert_eq!(
            graph.set_param(gain, Param::Frequency, 1.0, 0.0),
            Err(GraphError::UnsupportedParam { node: gain, param: Param::Frequency })
        );
        assert_eq!(graph.trigger_attack(gain, 0.0, 1.0), Err(GraphError::NotTriggerable(gain)));
        assert_eq!(graph.reset_phase(gain, 0.0), Err(GraphError::NotPeriodic(gain)));
    }

    #[test]
    fn test_param_target_and_automation_count() {
        let mut graph = OfflineGraph::new(8000);
        let gain = graph.create_node(NodeKind::Gain { gain: 0.5 });
        assert_eq!(graph.param(gain, Param::Gain), Some(0.5));
        graph
            .ramp_param(gain, Param::Gain, 0.2, 0.0, 0.1, RampCurve::Linear)
            .unwrap();
        assert_eq!(graph.param(gain, Param::Gain), Some(0.2));
        assert_eq!(graph.automation_count(gain), 1);
    }

    #[test]
    fn test_lfo_modulates_parameter() {
        let mut graph = OfflineGraph::new(8000);
        let osc = sine(&mut graph, 100.0);
        let vca = graph.create_node(NodeKind::Gain { gain: 1.0 });
        let lfo = graph.create_node(NodeKind::Lfo {
            waveform: Waveform::Square,
            frequency: 0.0,
            min: 0.0,
            max: 0.0,
        });
        graph.connect(osc, vca).unwrap();
        graph.connect_param(lfo, vca, Param::Gain).unwrap();
        graph.connect_to_output(vca).unwrap();
        let out = graph.render_frames(400).unwrap();
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_dispose_node_is_idempotent() {
        let mut graph = OfflineGraph::new(8000);
        let osc = sine(&mut graph, 100.0);
        graph.connect_to_output(osc).unwrap();
        assert!(graph.dispose_node(osc));
        assert!(!graph.dispose_node(osc));
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.is_connected_to_output(osc));
    }

    #[test]
    fn test_interleaved_layout() {
        let buffer = AudioBuffer::new(10, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
        assert_eq!(buffer.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
        assert!((buffer.duration() - 0.2).abs() < 1e-9);
    }
}
