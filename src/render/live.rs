// Live Playback - Clock-driven playback of a resolved arrangement
// Callbacks fire as the clock reaches them (plus lookahead); looping queues the next pass ahead of time

use crate::arranger::ResolvedPlayback;
use crate::graph::AudioGraph;
use crate::packs::PackCatalog;
use crate::voice::VoiceConfig;

use super::driver::RenderSession;
use super::transport::{Clock, LiveTransport, Transport};

pub struct LivePlayer<G: AudioGraph + 'static, K: Clock> {
    session: RenderSession<G>,
    transport: LiveTransport<RenderSession<G>, K>,
    playback: Option<ResolvedPlayback>,
    looping: bool,
    pass_start: f64,
    passes: usize,
}

impl<G: AudioGraph + 'static, K: Clock> LivePlayer<G, K> {
    pub fn new(graph: G, config: VoiceConfig, clock: K, lookahead: f64) -> Self {
        LivePlayer {
            session: RenderSession::new(graph, config),
            transport: LiveTransport::new(clock, lookahead),
            playback: None,
            looping: false,
            pass_start: 0.0,
            passes: 0,
        }
    }

    /// Start playing from the clock's current time, replacing anything already queued
    ///
    /// Returns the number of callbacks queued for the first pass.
    pub fn start(&mut self, playback: ResolvedPlayback, catalog: &PackCatalog, looping: bool) -> usize {
        self.transport.stop();
        self.session.prepare(&playback, catalog);

        let offset = self.transport.now();
        let queued = self.session.schedule_playback(&playback, &mut self.transport, offset);
        log::info!(
            "Live playback started at {:.3}s ({} callbacks, {:.2}s{})",
            offset,
            queued,
            playback.duration,
            if looping { ", looping" } else { "" }
        );

        self.pass_start = offset;
        self.passes = 1;
        self.looping = looping;
        self.playback = Some(playback);
        queued
    }

    /// Fire due callbacks and let voices schedule up to the lookahead horizon
    ///
    /// Returns the number of callbacks fired.
    pub fn poll(&mut self) -> usize {
        let horizon = self.transport.horizon();

        if self.looping {
            if let Some(playback) = self.playback.as_ref() {
                if playback.duration > 0.0 {
                    while self.pass_start + playback.duration <= horizon {
                        self.pass_start += playback.duration;
                        self.passes += 1;
                        self.session
                            .schedule_playback(playback, &mut self.transport, self.pass_start);
                        log::debug!("Queued loop pass {} at {:.3}s", self.passes, self.pass_start);
                    }
                }
            }
        }

        let fired = self.transport.poll(&mut self.session);
        self.session.advance_voices(horizon);
        fired
    }

    /// Drop every pending callback; voices stay cached for the next start
    pub fn stop(&mut self) {
        self.transport.stop();
        self.playback = None;
        self.looping = false;
        log::info!("Live playback stopped");
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Loop passes queued since the last start
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn pending(&self) -> usize {
        self.transport.pending()
    }

    pub fn session(&self) -> &RenderSession<G> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RenderSession<G> {
        &mut self.session
    }
}
