// Render Driver - Voices + schedules + transport → rendered audio
// Voices are built once per character and macro state, released when the session drops

use std::collections::BTreeMap;

use crate::arranger::{PlaybackSchedule, ResolvedPlayback, ScheduledNote};
use crate::graph::{AudioBuffer, AudioGraph, EffectRegistry, GraphResult, OfflineGraph};
use crate::packs::PackCatalog;
use crate::settings::EngineSettings;
use crate::voice::{build_voice, EngineRegistry, MacroPatch, Voice, VoiceConfig};

use super::mixer::apply_master;
use super::transport::{OfflineTransport, Transport};

/// Built voices keyed by [`PlaybackSchedule::voice_key`]
#[derive(Default)]
pub struct VoiceCache {
    voices: BTreeMap<String, Box<dyn Voice>>,
}

impl VoiceCache {
    pub fn new() -> Self {
        VoiceCache::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.voices.contains_key(key)
    }

    pub fn insert(&mut self, key: String, voice: Box<dyn Voice>) {
        self.voices.insert(key, voice);
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Box<dyn Voice>> {
        self.voices.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.voices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Dispose and drop every voice; returns the number of nodes released
    pub fn dispose_all(&mut self, graph: &mut dyn AudioGraph) -> usize {
        let mut released = 0;
        for (_, mut voice) in std::mem::take(&mut self.voices) {
            released += voice.dispose(graph);
        }
        released
    }
}

/// One render or playback pass owning its graph and voice cache
pub struct RenderSession<G: AudioGraph> {
    graph: G,
    voices: VoiceCache,
    config: VoiceConfig,
    engines: EngineRegistry,
    effects: EffectRegistry,
    triggered: usize,
}

impl<G: AudioGraph> RenderSession<G> {
    pub fn new(graph: G, config: VoiceConfig) -> Self {
        RenderSession::with_registries(graph, config, EngineRegistry::standard(), EffectRegistry::standard())
    }

    pub fn with_registries(
        graph: G,
        config: VoiceConfig,
        engines: EngineRegistry,
        effects: EffectRegistry,
    ) -> Self {
        RenderSession {
            graph,
            voices: VoiceCache::new(),
            config,
            engines,
            effects,
            triggered: 0,
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn voices(&self) -> &VoiceCache {
        &self.voices
    }

    /// Notes handed to voices so far
    pub fn triggered(&self) -> usize {
        self.triggered
    }

    /// Build a voice for every schedule's character and macro state not yet in the cache
    ///
    /// Returns the number of voices built. Characters that fail to build are
    /// skipped with a warning.
    pub fn prepare(&mut self, playback: &ResolvedPlayback, catalog: &PackCatalog) -> usize {
        let mut built = 0;
        for schedule in &playback.schedules {
            let key = schedule.voice_key();
            if self.voices.contains(&key) {
                continue;
            }
            let Some(resolved) = catalog.resolve(&schedule.source) else {
                log::warn!("No character for {} ({})", schedule.track_name, key);
                continue;
            };
            match build_voice(
                &mut self.graph,
                resolved.character,
                &self.config,
                &self.engines,
                &self.effects,
            ) {
                Ok(voice) => {
                    self.voices.insert(key, voice);
                    built += 1;
                }
                Err(e) => log::warn!("Skipping voice {}: {}", key, e),
            }
        }
        log::debug!("Prepared {} voices ({} cached)", built, self.voices.len());
        built
    }

    /// Play one note on a cached voice
    pub fn trigger(&mut self, key: &str, note: &ScheduledNote, time: f64) -> bool {
        let Some(voice) = self.voices.get_mut(key) else {
            return false;
        };
        match voice.trigger_attack_release(
            &mut self.graph,
            note.frequency as f32,
            note.sustain,
            time,
            note.velocity,
        ) {
            Ok(()) => {
                self.triggered += 1;
                true
            }
            Err(e) => {
                log::warn!("Trigger failed on {}: {}", key, e);
                false
            }
        }
    }

    /// Structural update of a cached voice (rewires when needed)
    pub fn apply_style(&mut self, key: &str, patch: &MacroPatch) -> bool {
        let Some(voice) = self.voices.get_mut(key) else {
            return false;
        };
        voice.set_style(&mut self.graph, patch).unwrap_or_else(|e| {
            log::warn!("Style update failed on {}: {}", key, e);
            false
        })
    }

    /// Live macro update of a cached voice (ramps, never rebuilds)
    pub fn set_macro_state(&mut self, key: &str, patch: &MacroPatch) -> bool {
        let Some(voice) = self.voices.get_mut(key) else {
            return false;
        };
        voice.set_macro_state(&mut self.graph, patch).unwrap_or_else(|e| {
            log::warn!("Macro update failed on {}: {}", key, e);
            false
        })
    }

    /// Let every voice generate its self-driven events up to `until`
    pub fn advance_voices(&mut self, until: f64) {
        for (key, voice) in self.voices.voices.iter_mut() {
            if let Err(e) = voice.schedule_until(&mut self.graph, until) {
                log::warn!("Voice {} failed to schedule: {}", key, e);
            }
        }
    }

    /// Release every voice; safe to call more than once
    pub fn dispose(&mut self) -> usize {
        let released = self.voices.dispose_all(&mut self.graph);
        if released > 0 {
            log::debug!("Render session released {} nodes", released);
        }
        released
    }
}

impl<G: AudioGraph + 'static> RenderSession<G> {
    /// Register macro updates and note triggers for every cached voice
    ///
    /// Times are shifted by `offset`. Returns the number of callbacks scheduled.
    pub fn schedule_playback<T>(&self, playback: &ResolvedPlayback, transport: &mut T, offset: f64) -> usize
    where
        T: Transport<Self>,
    {
        let mut scheduled = 0;
        for schedule in &playback.schedules {
            let key = schedule.voice_key();
            if !self.voices.contains(&key) {
                continue;
            }

            if let Some(patch) = style_patch(schedule) {
                let key = key.clone();
                transport.schedule(
                    offset + schedule.start,
                    Box::new(move |session: &mut Self, _| {
                        session.apply_style(&key, &patch);
                    }),
                );
                scheduled += 1;
            }

            for note in &schedule.notes {
                let key = key.clone();
                let note = note.clone();
                transport.schedule(
                    offset + note.time,
                    Box::new(move |session: &mut Self, time| {
                        session.trigger(&key, &note, time);
                    }),
                );
                scheduled += 1;
            }
        }
        scheduled
    }
}

impl<G: AudioGraph> Drop for RenderSession<G> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Per-schedule macro state as a voice patch
fn style_patch(schedule: &PlaybackSchedule) -> Option<MacroPatch> {
    if let Some(kick) = schedule.kick {
        return Some(MacroPatch::Kick(kick.as_patch()));
    }
    schedule.pulse.clone().map(MacroPatch::Pulse)
}

fn frames_for(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f64) as usize
}

impl RenderSession<OfflineGraph> {
    /// Render `length` seconds of the master bus, firing callbacks in time order
    pub fn render(&mut self, transport: &mut OfflineTransport<Self>, length: f64) -> GraphResult<Vec<f32>> {
        let sample_rate = self.graph.sample_rate();
        let total = frames_for(length, sample_rate);
        let mut mono = Vec::with_capacity(total);

        while let Some((time, callback)) = transport.pop_next(length) {
            self.render_to(&mut mono, frames_for(time, sample_rate).min(total))?;
            callback(self, time);
        }
        self.render_to(&mut mono, total)?;
        Ok(mono)
    }

    fn render_to(&mut self, mono: &mut Vec<f32>, target: usize) -> GraphResult<()> {
        if target <= mono.len() {
            return Ok(());
        }
        let until = target as f64 / self.graph.sample_rate() as f64;
        self.advance_voices(until);
        let frames = self.graph.render_frames(target - mono.len())?;
        mono.extend(frames);
        Ok(())
    }
}

/// Offline render split into the export stages
///
/// Voices built by `prepare` stay alive until `finish` (or drop), so the
/// caller can encode the rendered buffer before they are released.
pub struct OfflineRender<'a> {
    session: RenderSession<OfflineGraph>,
    transport: OfflineTransport<RenderSession<OfflineGraph>>,
    playback: &'a ResolvedPlayback,
    settings: &'a EngineSettings,
}

impl<'a> OfflineRender<'a> {
    pub fn new(playback: &'a ResolvedPlayback, settings: &'a EngineSettings) -> Self {
        OfflineRender {
            session: RenderSession::new(OfflineGraph::new(settings.sample_rate), settings.voice_config()),
            transport: OfflineTransport::new(),
            playback,
            settings,
        }
    }

    /// Build every voice the playback needs; returns the number built
    pub fn prepare(&mut self, catalog: &PackCatalog) -> usize {
        self.session.prepare(self.playback, catalog)
    }

    /// Queue macro updates and note triggers; returns the number of callbacks
    pub fn schedule(&mut self) -> usize {
        self.session
            .schedule_playback(self.playback, &mut self.transport, 0.0)
    }

    /// Render duration + tail with the master bus applied
    pub fn render(&mut self) -> GraphResult<AudioBuffer> {
        let length = self.playback.duration + self.settings.render_tail;
        log::info!(
            "Rendering {:.2}s with {} voices, {} callbacks @ {} Hz",
            length,
            self.session.voices().len(),
            self.transport.pending(),
            self.settings.sample_rate
        );

        let mut mono = self.session.render(&mut self.transport, length)?;
        let peak = apply_master(&mut mono, &self.settings.master());
        log::info!("Rendered {} notes (peak {:.2})", self.session.triggered(), peak);

        Ok(AudioBuffer::from_mono(self.settings.sample_rate, mono, self.settings.channels))
    }

    pub fn session(&self) -> &RenderSession<OfflineGraph> {
        &self.session
    }

    /// Release every voice; returns the number of nodes released
    pub fn finish(mut self) -> usize {
        self.session.dispose()
    }
}

/// Render a resolved playback offline: duration + tail, master bus applied
pub fn render_offline(
    playback: &ResolvedPlayback,
    catalog: &PackCatalog,
    settings: &EngineSettings,
) -> GraphResult<AudioBuffer> {
    let mut render = OfflineRender::new(playback, settings);
    render.prepare(catalog);
    render.schedule();
    let buffer = render.render()?;
    render.finish();
    Ok(buffer)
}
