// Gated Voice - Decorator adding trigger gating around any voice
// Polyphony limit, same-instant de-duplication and silent-trigger filtering

use crate::graph::{AudioGraph, GraphResult, NodeId};

use super::{MacroPatch, NodeBag, PulseVoice, Voice};

/// Two triggers closer than this count as the same instant
const SAME_INSTANT: f64 = 1e-6;

pub struct GatedVoice {
    inner: Box<dyn Voice>,
    max_polyphony: usize,
    active_until: Vec<f64>,
    last_trigger: Option<(f64, f32)>,
    dropped: usize,
}

impl GatedVoice {
    pub fn new(inner: Box<dyn Voice>, max_polyphony: usize) -> Self {
        GatedVoice {
            inner,
            max_polyphony: max_polyphony.max(1),
            active_until: Vec::new(),
            last_trigger: None,
            dropped: 0,
        }
    }

    /// Triggers swallowed by the gate so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn admit(&mut self, frequency: f32, time: f64, velocity: f32) -> bool {
        if !(velocity > 0.0) {
            return false;
        }
        if let Some((last_time, last_frequency)) = self.last_trigger {
            if (time - last_time).abs() < SAME_INSTANT && last_frequency == frequency {
                return false;
            }
        }
        self.active_until.retain(|end| *end > time);
        self.active_until.len() < self.max_polyphony
    }
}

impl Voice for GatedVoice {
    fn character_id(&self) -> &str {
        self.inner.character_id()
    }

    fn output(&self) -> NodeId {
        self.inner.output()
    }

    fn nodes(&self) -> &NodeBag {
        self.inner.nodes()
    }

    fn nodes_mut(&mut self) -> &mut NodeBag {
        self.inner.nodes_mut()
    }

    fn trigger_attack_release(
        &mut self,
        graph: &mut dyn AudioGraph,
        frequency: f32,
        duration: f64,
        time: f64,
        velocity: f32,
    ) -> GraphResult<()> {
        if !self.admit(frequency, time, velocity) {
            self.dropped += 1;
            log::debug!(
                "Gated trigger on {} at {:.3}s (velocity {:.2})",
                self.inner.character_id(),
                time,
                velocity
            );
            return Ok(());
        }
        self.inner
            .trigger_attack_release(graph, frequency, duration, time, velocity.min(1.0))?;
        self.active_until.push(time + duration.max(0.0));
        self.last_trigger = Some((time, frequency));
        Ok(())
    }

    fn set_macro_state(&mut self, graph: &mut dyn AudioGraph, patch: &MacroPatch) -> GraphResult<bool> {
        self.inner.set_macro_state(graph, patch)
    }

    fn set_style(&mut self, graph: &mut dyn AudioGraph, patch: &MacroPatch) -> GraphResult<bool> {
        self.inner.set_style(graph, patch)
    }

    fn schedule_until(&mut self, graph: &mut dyn AudioGraph, until: f64) -> GraphResult<()> {
        self.inner.schedule_until(graph, until)
    }

    fn dispose(&mut self, graph: &mut dyn AudioGraph) -> usize {
        self.inner.dispose(graph)
    }

    fn as_pulse_mut(&mut self) -> Option<&mut PulseVoice> {
        self.inner.as_pulse_mut()
    }
}
