// Effect Registry - Maps effect type tags from sound packs to graph nodes

use std::collections::{BTreeMap, HashMap};

use super::{FilterKind, GraphError, GraphResult, NodeKind};

/// Free-form numeric options of an effect entry
pub type EffectOptions = BTreeMap<String, f32>;

type EffectFactory = fn(&EffectOptions) -> NodeKind;

fn option(options: &EffectOptions, key: &str, default: f32) -> f32 {
    options.get(key).copied().unwrap_or(default)
}

fn reverb(options: &EffectOptions) -> NodeKind {
    NodeKind::Reverb {
        decay: option(options, "decay", 1.5),
        wet: option(options, "wet", 0.3),
    }
}

fn feedback_delay(options: &EffectOptions) -> NodeKind {
    NodeKind::Delay {
        time: option(options, "delayTime", 0.25),
        feedback: option(options, "feedback", 0.3),
        wet: option(options, "wet", 0.25),
    }
}

fn distortion(options: &EffectOptions) -> NodeKind {
    NodeKind::Distortion {
        amount: option(options, "distortion", 0.4),
        wet: option(options, "wet", 1.0),
    }
}

fn filter(options: &EffectOptions) -> NodeKind {
    let kind = match option(options, "type", 0.0) as i32 {
        1 => FilterKind::Highpass,
        2 => FilterKind::Bandpass,
        _ => FilterKind::Lowpass,
    };
    NodeKind::Filter {
        kind,
        frequency: option(options, "frequency", 1200.0),
        q: option(options, "Q", 1.0),
    }
}

fn compressor(options: &EffectOptions) -> NodeKind {
    NodeKind::Compressor {
        threshold_db: option(options, "threshold", -24.0),
        ratio: option(options, "ratio", 4.0),
    }
}

fn eq3(options: &EffectOptions) -> NodeKind {
    NodeKind::Eq3 {
        low_db: option(options, "low", 0.0),
        mid_db: option(options, "mid", 0.0),
        high_db: option(options, "high", 0.0),
    }
}

/// Effect constructors keyed by type tag
pub struct EffectRegistry {
    factories: HashMap<String, EffectFactory>,
}

impl EffectRegistry {
    pub fn empty() -> Self {
        EffectRegistry {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in effect tags
    pub fn standard() -> Self {
        let mut registry = EffectRegistry::empty();
        registry.register("Reverb", reverb);
        registry.register("FeedbackDelay", feedback_delay);
        registry.register("Distortion", distortion);
        registry.register("Filter", filter);
        registry.register("Compressor", compressor);
        registry.register("EQ3", eq3);
        registry
    }

    pub fn register(&mut self, tag: &str, factory: EffectFactory) {
        self.factories.insert(tag.to_string(), factory);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Build the node description for an effect tag
    pub fn build(&self, tag: &str, options: &EffectOptions) -> GraphResult<NodeKind> {
        self.factories
            .get(tag)
            .map(|factory| factory(options))
            .ok_or_else(|| GraphError::UnknownEffect(tag.to_string()))
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        EffectRegistry::standard()
    }
}
