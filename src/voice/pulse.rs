// Pulse Designer Voice - Sustained tone shaped by an LFO, step pattern or random gate
// osc → env → [filter] → vca → out; modulation drives filter cutoff or vca gain

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::graph::{
    AudioGraph, EnvelopeShape, FilterKind, GraphResult, NodeId, NodeKind, Param, RampCurve,
    Waveform,
};
use crate::macros::pulse::{
    resolve_cutoff, resolve_pattern, resolve_unit, FALLBACK_DEPTH, FALLBACK_PROBABILITY,
    FALLBACK_RATE, FALLBACK_RESONANCE,
};
use crate::macros::{
    map_pulse_params, resolve_pulse_settings, PulseMode, PulseOverrides, PulseParams,
    PulseSettings, PulseShape, PulseTarget,
};
use crate::packs::InstrumentCharacter;
use crate::project::db_to_gain;

use super::{ramp_to, MacroPatch, NodeBag, Voice, VoiceConfig};

/// One gate transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseEvent {
    pub active: bool,
    pub velocity: f32,
    pub time: f64,
    pub source: PulseMode,
    pub step_index: u64,
}

pub type PulseListener = Box<dyn FnMut(&PulseEvent)>;

fn shape_waveform(shape: PulseShape) -> Waveform {
    match shape {
        PulseShape::Sine => Waveform::Sine,
        PulseShape::Triangle => Waveform::Triangle,
        PulseShape::Square => Waveform::Square,
        PulseShape::Sawtooth => Waveform::Sawtooth,
    }
}

struct PulseNodes {
    osc: NodeId,
    env: NodeId,
    filter: NodeId,
    vca: NodeId,
    out: NodeId,
}

pub struct PulseVoice {
    character_id: String,
    settings: PulseSettings,
    params: PulseParams,
    ramp_time: f64,
    bag: NodeBag,
    nodes: PulseNodes,
    lfo: Option<NodeId>,
    rng: StdRng,
    listeners: Vec<(usize, PulseListener)>,
    next_listener: usize,
    step_index: u64,
    next_step_time: f64,
    gate_open: Option<bool>,
}

impl PulseVoice {
    pub fn new(
        graph: &mut dyn AudioGraph,
        character: &InstrumentCharacter,
        config: &VoiceConfig,
    ) -> GraphResult<Self> {
        let options = &character.options;
        let settings = resolve_pulse_settings(&PulseOverrides::default(), character.defaults.pulse.as_ref());
        let mut bag = NodeBag::new();

        let osc = bag.create(graph, NodeKind::Oscillator {
            waveform: options.oscillator.unwrap_or(Waveform::Sawtooth),
            frequency: 130.0,
        });
        let env = bag.create(graph, NodeKind::Envelope {
            shape: options
                .envelope
                .unwrap_or_else(|| EnvelopeShape::new(0.02, 0.1, 0.9, 0.3)),
        });
        let filter = bag.create(graph, NodeKind::Filter {
            kind: options.filter_type.unwrap_or(FilterKind::Lowpass),
            frequency: settings.cutoff,
            q: map_pulse_params(&settings).q,
        });
        let vca = bag.create(graph, NodeKind::Gain { gain: 1.0 });
        let out = bag.create(graph, NodeKind::Gain {
            gain: db_to_gain(character.defaults.volume_db.unwrap_or(0.0)),
        });

        let mut voice = PulseVoice {
            character_id: character.id.clone(),
            params: map_pulse_params(&settings),
            settings,
            ramp_time: config.ramp_time,
            bag,
            nodes: PulseNodes {
                osc,
                env,
                filter,
                vca,
                out,
            },
            lfo: None,
            rng: StdRng::seed_from_u64(config.seed),
            listeners: Vec::new(),
            next_listener: 0,
            step_index: 0,
            next_step_time: graph.current_time(),
            gate_open: None,
        };
        voice.refresh_params();
        voice.rewire(graph)?;
        Ok(voice)
    }

    pub fn settings(&self) -> &PulseSettings {
        &self.settings
    }

    pub fn params(&self) -> &PulseParams {
        &self.params
    }

    pub fn lfo(&self) -> Option<NodeId> {
        self.lfo
    }

    pub fn filter(&self) -> NodeId {
        self.nodes.filter
    }

    pub fn vca(&self) -> NodeId {
        self.nodes.vca
    }

    /// Register a gate-transition listener; returns an id for removal
    pub fn add_pulse_listener<F>(&mut self, listener: F) -> usize
    where
        F: FnMut(&PulseEvent) + 'static,
    {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_pulse_listener(&mut self, id: usize) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Filter target falls back to amplitude while the filter is bypassed
    fn effective_target(&self) -> PulseTarget {
        if self.settings.filter_enabled {
            self.settings.target
        } else {
            PulseTarget::Amplitude
        }
    }

    fn refresh_params(&mut self) {
        let mut effective = self.settings.clone();
        effective.target = self.effective_target();
        self.params = map_pulse_params(&effective);
    }

    fn modulation_target(&self) -> (NodeId, Param) {
        match self.effective_target() {
            PulseTarget::Filter => (self.nodes.filter, Param::Frequency),
            PulseTarget::Amplitude => (self.nodes.vca, Param::Gain),
        }
    }

    fn gate_level(&self, open: bool) -> f32 {
        if open {
            self.params.mod_max
        } else {
            self.params.mod_min
        }
    }

    fn step_length(&self) -> f64 {
        let step = self.params.step_seconds.max(1e-3);
        match self.settings.mode {
            // Two transitions per LFO cycle
            PulseMode::Lfo => step / 2.0,
            PulseMode::Pattern | PulseMode::Random => step,
        }
    }

    /// Step sequence restarts from step 0 at the current time
    fn restart_steps(&mut self, graph: &dyn AudioGraph) {
        self.step_index = 0;
        self.next_step_time = graph.current_time();
        self.gate_open = None;
    }

    fn create_lfo(&mut self, graph: &mut dyn AudioGraph) -> GraphResult<()> {
        let (node, param) = self.modulation_target();
        let lfo = self.bag.create(graph, NodeKind::Lfo {
            waveform: shape_waveform(self.params.shape),
            frequency: self.params.rate_hz,
            min: self.params.mod_min,
            max: self.params.mod_max,
        });
        graph.connect_param(lfo, node, param)?;
        self.lfo = Some(lfo);
        Ok(())
    }

    /// Disconnect everything and wire again through or around the filter
    fn rewire(&mut self, graph: &mut dyn AudioGraph) -> GraphResult<()> {
        if let Some(lfo) = self.lfo.take() {
            self.bag.release(graph, lfo);
        }
        let PulseNodes { osc, env, filter, vca, out } = self.nodes;
        for node in [osc, env, filter, vca] {
            graph.disconnect(node)?;
        }

        graph.connect(osc, env)?;
        if self.settings.filter_enabled {
            graph.connect(env, filter)?;
            graph.connect(filter, vca)?;
        } else {
            graph.connect(env, vca)?;
        }
        graph.connect(vca, out)?;

        let now = graph.current_time();
        graph.set_param(filter, Param::Frequency, self.settings.cutoff, now)?;
        graph.set_param(filter, Param::Q, self.params.q, now)?;
        graph.set_param(vca, Param::Gain, 1.0, now)?;

        if self.settings.mode == PulseMode::Lfo {
            self.create_lfo(graph)?;
        }
        self.gate_open = None;

        log::debug!(
            "Pulse {} wired: mode {:?}, target {:?}, filter {}",
            self.character_id,
            self.settings.mode,
            self.effective_target(),
            if self.settings.filter_enabled { "on" } else { "bypassed" }
        );
        Ok(())
    }

    /// Push the current modulation span to the running graph
    fn apply_range(&mut self, graph: &mut dyn AudioGraph) -> GraphResult<()> {
        if let Some(lfo) = self.lfo {
            ramp_to(graph, lfo, Param::Min, self.params.mod_min, self.ramp_time)?;
            ramp_to(graph, lfo, Param::Max, self.params.mod_max, self.ramp_time)?;
        } else if let Some(open) = self.gate_open {
            let (node, param) = self.modulation_target();
            ramp_to(graph, node, param, self.gate_level(open), self.ramp_time)?;
        }
        Ok(())
    }

    pub fn set_depth(&mut self, graph: &mut dyn AudioGraph, depth: f32) -> GraphResult<bool> {
        let depth = resolve_unit(Some(depth), None, FALLBACK_DEPTH);
        if depth == self.settings.depth {
            return Ok(false);
        }
        self.settings.depth = depth;
        self.refresh_params();
        self.apply_range(graph)?;
        Ok(true)
    }

    pub fn set_rate(&mut self, graph: &mut dyn AudioGraph, rate: f32) -> GraphResult<bool> {
        let rate = resolve_unit(Some(rate), None, FALLBACK_RATE);
        if rate == self.settings.rate {
            return Ok(false);
        }
        self.settings.rate = rate;
        self.refresh_params();
        if let Some(lfo) = self.lfo {
            ramp_to(graph, lfo, Param::Frequency, self.params.rate_hz, self.ramp_time)?;
        }
        self.restart_steps(graph);
        Ok(true)
    }

    pub fn set_resonance(&mut self, graph: &mut dyn AudioGraph, resonance: f32) -> GraphResult<bool> {
        let resonance = resolve_unit(Some(resonance), None, FALLBACK_RESONANCE);
        if resonance == self.settings.resonance {
            return Ok(false);
        }
        self.settings.resonance = resonance;
        self.refresh_params();
        ramp_to(graph, self.nodes.filter, Param::Q, self.params.q, self.ramp_time)?;
        Ok(true)
    }

    pub fn set_cutoff(&mut self, graph: &mut dyn AudioGraph, cutoff: f32) -> GraphResult<bool> {
        let cutoff = resolve_cutoff(Some(cutoff), None);
        if cutoff == self.settings.cutoff {
            return Ok(false);
        }
        self.settings.cutoff = cutoff;
        self.refresh_params();
        if self.effective_target() == PulseTarget::Filter {
            self.apply_range(graph)?;
        } else {
            ramp_to(graph, self.nodes.filter, Param::Frequency, cutoff, self.ramp_time)?;
        }
        Ok(true)
    }

    pub fn set_probability(&mut self, probability: f32) -> bool {
        let probability = resolve_unit(Some(probability), None, FALLBACK_PROBABILITY);
        if probability == self.settings.probability {
            return false;
        }
        self.settings.probability = probability;
        true
    }

    pub fn set_pattern(&mut self, graph: &mut dyn AudioGraph, pattern: &[bool]) -> bool {
        let pattern = resolve_pattern(Some(pattern), None);
        if pattern == self.settings.pattern {
            return false;
        }
        self.settings.pattern = pattern;
        if self.settings.mode == PulseMode::Pattern {
            self.restart_steps(graph);
        }
        true
    }

    /// Changing the LFO waveform replaces the LFO node
    pub fn set_shape(&mut self, graph: &mut dyn AudioGraph, shape: PulseShape) -> GraphResult<bool> {
        if shape == self.settings.shape {
            return Ok(false);
        }
        self.settings.shape = shape;
        self.refresh_params();
        if let Some(lfo) = self.lfo.take() {
            self.bag.release(graph, lfo);
            self.create_lfo(graph)?;
        }
        Ok(true)
    }

    pub fn set_mode(&mut self, graph: &mut dyn AudioGraph, mode: PulseMode) -> GraphResult<bool> {
        if mode == self.settings.mode {
            return Ok(false);
        }
        self.settings.mode = mode;
        self.refresh_params();
        self.rewire(graph)?;
        self.restart_steps(graph);
        Ok(true)
    }

    pub fn set_target(&mut self, graph: &mut dyn AudioGraph, target: PulseTarget) -> GraphResult<bool> {
        if target == self.settings.target {
            return Ok(false);
        }
        self.settings.target = target;
        self.refresh_params();
        self.rewire(graph)?;
        Ok(true)
    }

    /// Bypass or insert the filter by rewiring
    pub fn set_filter_enabled(&mut self, graph: &mut dyn AudioGraph, enabled: bool) -> GraphResult<bool> {
        if enabled == self.settings.filter_enabled {
            return Ok(false);
        }
        self.settings.filter_enabled = enabled;
        self.refresh_params();
        self.rewire(graph)?;
        Ok(true)
    }

    fn apply_continuous(&mut self, graph: &mut dyn AudioGraph, patch: &PulseOverrides) -> GraphResult<bool> {
        let mut changed = false;
        if let Some(depth) = patch.depth {
            changed |= self.set_depth(graph, depth)?;
        }
        if let Some(rate) = patch.rate {
            changed |= self.set_rate(graph, rate)?;
        }
        if let Some(resonance) = patch.resonance {
            changed |= self.set_resonance(graph, resonance)?;
        }
        if let Some(cutoff) = patch.cutoff {
            changed |= self.set_cutoff(graph, cutoff)?;
        }
        if let Some(shape) = patch.shape {
            changed |= self.set_shape(graph, shape)?;
        }
        if let Some(probability) = patch.probability {
            changed |= self.set_probability(probability);
        }
        if let Some(pattern) = &patch.pattern {
            changed |= self.set_pattern(graph, pattern);
        }
        Ok(changed)
    }

    fn emit(&mut self, event: PulseEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

impl Voice for PulseVoice {
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
        let PulseNodes { osc, env, .. } = self.nodes;
        graph.reset_phase(osc, time)?;
        graph.set_param(osc, Param::Frequency, frequency, time)?;
        graph.trigger_attack(env, time, velocity)?;
        graph.trigger_release(env, time + duration.max(0.0))?;
        Ok(())
    }

    fn set_macro_state(&mut self, graph: &mut dyn AudioGraph, patch: &MacroPatch) -> GraphResult<bool> {
        match patch {
            MacroPatch::Pulse(patch) => self.apply_continuous(graph, patch),
            MacroPatch::Kick(_) => Ok(false),
        }
    }

    fn set_style(&mut self, graph: &mut dyn AudioGraph, patch: &MacroPatch) -> GraphResult<bool> {
        let MacroPatch::Pulse(patch) = patch else {
            return Ok(false);
        };
        let mut changed = false;
        if let Some(mode) = patch.mode {
            changed |= self.set_mode(graph, mode)?;
        }
        if let Some(target) = patch.target {
            changed |= self.set_target(graph, target)?;
        }
        if let Some(enabled) = patch.filter_enabled {
            changed |= self.set_filter_enabled(graph, enabled)?;
        }
        changed |= self.apply_continuous(graph, patch)?;
        Ok(changed)
    }

    fn schedule_until(&mut self, graph: &mut dyn AudioGraph, until: f64) -> GraphResult<()> {
        let step_length = self.step_length();
        let gate_ramp = self.ramp_time.min(step_length / 4.0);
        let mode = self.settings.mode;

        while self.next_step_time < until {
            let time = self.next_step_time;
            let active = match mode {
                PulseMode::Lfo => self.step_index % 2 == 0,
                PulseMode::Pattern => {
                    let pattern = &self.settings.pattern;
                    pattern[(self.step_index % pattern.len() as u64) as usize]
                }
                PulseMode::Random => self.rng.gen::<f32>() < self.settings.probability,
            };

            if self.gate_open != Some(active) {
                if mode != PulseMode::Lfo {
                    let (node, param) = self.modulation_target();
                    let level = self.gate_level(active);
                    graph.ramp_param(node, param, level, time, gate_ramp, RampCurve::Linear)?;
                }
                self.gate_open = Some(active);
                self.emit(PulseEvent {
                    active,
                    velocity: if active { self.settings.depth } else { 0.0 },
                    time,
                    source: mode,
                    step_index: self.step_index,
                });
            }

            self.step_index += 1;
            self.next_step_time += step_length;
        }
        Ok(())
    }

    fn as_pulse_mut(&mut self) -> Option<&mut PulseVoice> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OfflineGraph;
    use crate::packs::CharacterDefaults;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn character(pulse: PulseOverrides) -> InstrumentCharacter {
        InstrumentCharacter::new("throb", "Throb", "PulseDesigner").with_defaults(CharacterDefaults {
            pulse: Some(pulse),
            ..CharacterDefaults::default()
        })
    }

    fn lfo_voice(graph: &mut OfflineGraph) -> PulseVoice {
        PulseVoice::new(graph, &character(PulseOverrides::default()), &VoiceConfig::default()).unwrap()
    }

    fn pattern_voice(graph: &mut OfflineGraph, pattern: Vec<bool>) -> PulseVoice {
        let overrides = PulseOverrides {
            mode: Some(PulseMode::Pattern),
            rate: Some(0.0),
            pattern: Some(pattern),
            ..PulseOverrides::default()
        };
        PulseVoice::new(graph, &character(overrides), &VoiceConfig::default()).unwrap()
    }

    fn collect(voice: &mut PulseVoice) -> Rc<RefCell<Vec<PulseEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        voice.add_pulse_listener(move |event| sink.borrow_mut().push(*event));
        events
    }

    fn automation_snapshot(graph: &OfflineGraph, voice: &PulseVoice) -> Vec<usize> {
        voice.nodes().ids().iter().map(|n| graph.automation_count(*n)).collect()
    }

    #[test]
    fn test_lfo_mode_modulates_filter() {
        let mut graph = OfflineGraph::new(8000);
        let voice = lfo_voice(&mut graph);
        let lfo = voice.lfo().unwrap();
        assert_eq!(graph.param(lfo, Param::Max), Some(voice.settings().cutoff));
        assert_eq!(graph.inputs_of(voice.vca()), vec![voice.filter()]);
    }

    #[test]
    fn test_noop_setters_leave_graph_untouched() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = lfo_voice(&mut graph);
        let before = automation_snapshot(&graph, &voice);
        let settings = voice.settings().clone();
        let lfo_max = graph.param(voice.lfo().unwrap(), Param::Max);

        assert!(!voice.set_depth(&mut graph, settings.depth).unwrap());
        assert!(!voice.set_rate(&mut graph, settings.rate).unwrap());
        assert!(!voice.set_resonance(&mut graph, settings.resonance).unwrap());
        assert!(!voice.set_cutoff(&mut graph, settings.cutoff).unwrap());
        assert!(!voice.set_shape(&mut graph, settings.shape).unwrap());
        assert!(!voice.set_mode(&mut graph, settings.mode).unwrap());
        assert!(!voice.set_target(&mut graph, settings.target).unwrap());
        assert!(!voice.set_filter_enabled(&mut graph, settings.filter_enabled).unwrap());
        assert!(!voice.set_probability(settings.probability));
        assert!(!voice.set_pattern(&mut graph, &settings.pattern));

        assert_eq!(automation_snapshot(&graph, &voice), before);
        assert_eq!(voice.settings(), &settings);
        assert_eq!(graph.param(voice.lfo().unwrap(), Param::Max), lfo_max);
    }

    #[test]
    fn test_depth_change_ramps_lfo_range() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = lfo_voice(&mut graph);
        assert!(voice.set_depth(&mut graph, 1.0).unwrap());
        let lfo = voice.lfo().unwrap();
        let expected = voice.settings().cutoff * 0.05;
        assert!((graph.param(lfo, Param::Min).unwrap() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_nan_depth_falls_back() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = lfo_voice(&mut graph);
        voice.set_depth(&mut graph, 0.1).unwrap();
        voice.set_depth(&mut graph, f32::NAN).unwrap();
        assert_eq!(voice.settings().depth, FALLBACK_DEPTH);
    }

    #[test]
    fn test_filter_bypass_rewires() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = lfo_voice(&mut graph);
        let owned = voice.nodes().len();

        assert!(voice.set_filter_enabled(&mut graph, false).unwrap());
        assert_eq!(graph.inputs_of(voice.vca()).len(), 1);
        assert_ne!(graph.inputs_of(voice.vca()), vec![voice.filter()]);
        assert!(graph.inputs_of(voice.filter()).is_empty());
        // Filter stays owned, the LFO was replaced and now drives the vca
        assert!(voice.nodes().contains(voice.filter()));
        assert_eq!(voice.nodes().len(), owned);
        assert_eq!(graph.param(voice.lfo().unwrap(), Param::Max), Some(1.0));

        assert!(voice.set_filter_enabled(&mut graph, true).unwrap());
        assert_eq!(graph.inputs_of(voice.vca()), vec![voice.filter()]);
    }

    #[test]
    fn test_pattern_listener_fires_on_transitions() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = pattern_voice(&mut graph, vec![true, false, false, true]);
        let events = collect(&mut voice);
        assert!(voice.lfo().is_none());

        // rate 0 → 0.5 Hz → 2 s per step
        voice.schedule_until(&mut graph, 8.0).unwrap();
        let events = events.borrow();
        let summary: Vec<(bool, u64, f64)> = events.iter().map(|e| (e.active, e.step_index, e.time)).collect();
        assert_eq!(summary, vec![(true, 0, 0.0), (false, 1, 2.0), (true, 3, 6.0)]);
        assert!(events.iter().all(|e| e.source == PulseMode::Pattern));
    }

    #[test]
    fn test_rate_change_restarts_step_counter() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = pattern_voice(&mut graph, vec![true, false]);
        let events = collect(&mut voice);
        voice.schedule_until(&mut graph, 5.0).unwrap();
        assert!(events.borrow().last().unwrap().step_index > 0);

        assert!(voice.set_rate(&mut graph, 1.0).unwrap());
        voice.schedule_until(&mut graph, 0.01).unwrap();
        assert_eq!(events.borrow().last().unwrap().step_index, 0);
    }

    #[test]
    fn test_random_mode_is_seeded() {
        let run = || {
            let mut graph = OfflineGraph::new(8000);
            let overrides = PulseOverrides {
                mode: Some(PulseMode::Random),
                rate: Some(1.0),
                ..PulseOverrides::default()
            };
            let config = VoiceConfig { seed: 7, ..VoiceConfig::default() };
            let mut voice = PulseVoice::new(&mut graph, &character(overrides), &config).unwrap();
            let events = collect(&mut voice);
            voice.schedule_until(&mut graph, 2.0).unwrap();
            let result: Vec<PulseEvent> = events.borrow().clone();
            result
        };
        let first = run();
        assert!(!first.is_empty());
        assert_eq!(first, run());
    }

    #[test]
    fn test_remove_listener() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = pattern_voice(&mut graph, vec![true, false]);
        let id = voice.add_pulse_listener(|_| {});
        assert!(voice.remove_pulse_listener(id));
        assert!(!voice.remove_pulse_listener(id));
    }

    #[test]
    fn test_dispose_releases_lfo() {
        let mut graph = OfflineGraph::new(8000);
        let mut voice = lfo_voice(&mut graph);
        voice.set_shape(&mut graph, PulseShape::Square).unwrap();
        assert_eq!(voice.dispose(&mut graph), 6);
        assert_eq!(graph.node_count(), 0);
    }
}
