// DSP Processors - Per-node sample processing for the offline graph
// Oscillators, envelopes and biquad filters; noise, dynamics and time effects wrap fundsp units

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use fundsp::hacker::{afollow, pink, reverb_stereo, tap_linear, white, AudioUnit};

use super::{FilterKind, NodeKind, NoiseColor, Param, Waveform};

/// Number of [`Param`] variants
pub const PARAM_COUNT: usize = 18;

/// Current parameter values of a node, indexed by `Param as usize`
pub type ParamValues = [f32; PARAM_COUNT];

pub fn param_index(param: Param) -> usize {
    param as usize
}

/// One sample of a periodic waveform at `phase` in [0, 1)
pub fn waveform_sample(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
    }
}

/// Phase-accumulating oscillator with explicit phase reset
pub struct Oscillator {
    waveform: Waveform,
    phase: f32,
    sample_rate: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f32) -> Self {
        Oscillator {
            waveform,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn reset_phase(&mut self) {
        self.phase = 0.0;
    }

    pub fn next(&mut self, frequency: f32) -> f32 {
        let sample = waveform_sample(self.waveform, self.phase);
        self.phase += frequency.max(0.0) / self.sample_rate;
        self.phase -= self.phase.floor();
        sample
    }
}

/// Boxed fundsp unit with its sample rate applied
fn at_rate(mut unit: Box<dyn AudioUnit>, sample_rate: f32) -> Box<dyn AudioUnit> {
    unit.set_sample_rate(sample_rate as f64);
    unit.reset();
    unit
}

/// White or pink noise generator
pub struct NoiseSource {
    unit: Box<dyn AudioUnit>,
}

impl NoiseSource {
    pub fn new(color: NoiseColor, sample_rate: f32) -> Self {
        let generator: Box<dyn AudioUnit> = match color {
            NoiseColor::White => Box::new(white()),
            NoiseColor::Pink => Box::new(pink()),
        };
        NoiseSource {
            unit: at_rate(generator, sample_rate),
        }
    }

    pub fn next(&mut self) -> f32 {
        let mut out = [0.0f32];
        self.unit.tick(&[], &mut out);
        out[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear-segment ADSR
pub struct Envelope {
    stage: EnvelopeStage,
    level: f32,
    velocity: f32,
    release_from: f32,
    sample_rate: f32,
}

impl Envelope {
    pub fn new(sample_rate: f32) -> Self {
        Envelope {
            stage: EnvelopeStage::Idle,
            level: 0.0,
            velocity: 0.0,
            release_from: 0.0,
            sample_rate,
        }
    }

    /// Start the attack from the current level (retriggers without a jump)
    pub fn attack(&mut self, velocity: f32) {
        self.stage = EnvelopeStage::Attack;
        self.velocity = velocity.clamp(0.0, 1.0);
    }

    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
            self.release_from = self.level;
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Advance one sample and return the gain
    pub fn next(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) -> f32 {
        let sustain = sustain.clamp(0.0, 1.0);
        match self.stage {
            EnvelopeStage::Idle => self.level = 0.0,
            EnvelopeStage::Attack => {
                if attack <= 0.0 {
                    self.level = 1.0;
                } else {
                    self.level += 1.0 / (attack * self.sample_rate);
                }
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                if decay <= 0.0 {
                    self.level = sustain;
                } else {
                    self.level -= (1.0 - sustain) / (decay * self.sample_rate);
                }
                if self.level <= sustain {
                    self.level = sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => self.level = sustain,
            EnvelopeStage::Release => {
                if release <= 0.0 {
                    self.level = 0.0;
                } else {
                    self.level -= self.release_from / (release * self.sample_rate);
                }
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }
        self.level * self.velocity
    }
}

fn identity_coefficients() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Biquad coefficients with the frequency clamped below Nyquist
fn coefficients(filter: Type<f32>, sample_rate: f32, frequency: f32, q: f32) -> Coefficients<f32> {
    let frequency = frequency.clamp(10.0, sample_rate * 0.45);
    Coefficients::<f32>::from_params(filter, sample_rate.hz(), frequency.hz(), q.max(0.01))
        .unwrap_or_else(|_| identity_coefficients())
}

fn filter_type(kind: FilterKind) -> Type<f32> {
    match kind {
        FilterKind::Lowpass => Type::LowPass,
        FilterKind::Highpass => Type::HighPass,
        FilterKind::Bandpass => Type::BandPass,
    }
}

/// Resonant filter with coefficient refresh on parameter change
pub struct FilterStage {
    filter: DirectForm2Transposed<f32>,
    kind: FilterKind,
    last_frequency: f32,
    last_q: f32,
    sample_rate: f32,
}

impl FilterStage {
    pub fn new(kind: FilterKind, frequency: f32, q: f32, sample_rate: f32) -> Self {
        FilterStage {
            filter: DirectForm2Transposed::<f32>::new(coefficients(
                filter_type(kind),
                sample_rate,
                frequency,
                q,
            )),
            kind,
            last_frequency: frequency,
            last_q: q,
            sample_rate,
        }
    }

    pub fn process(&mut self, input: f32, frequency: f32, q: f32) -> f32 {
        if (frequency - self.last_frequency).abs() > 0.1 || (q - self.last_q).abs() > 0.01 {
            self.filter.update_coefficients(coefficients(
                filter_type(self.kind),
                self.sample_rate,
                frequency,
                q,
            ));
            self.last_frequency = frequency;
            self.last_q = q;
        }
        self.filter.run(input)
    }
}

const EQ_LOW_HZ: f32 = 400.0;
const EQ_MID_HZ: f32 = 1000.0;
const EQ_HIGH_HZ: f32 = 2500.0;

/// Three-band EQ: low shelf, mid peak, high shelf
pub struct Eq3Stage {
    bands: [DirectForm2Transposed<f32>; 3],
    gains: [f32; 3],
    sample_rate: f32,
}

impl Eq3Stage {
    pub fn new(low_db: f32, mid_db: f32, high_db: f32, sample_rate: f32) -> Self {
        let gains = [low_db, mid_db, high_db];
        Eq3Stage {
            bands: [0, 1, 2].map(|band| {
                DirectForm2Transposed::<f32>::new(Self::band_coefficients(band, gains[band], sample_rate))
            }),
            gains,
            sample_rate,
        }
    }

    fn band_coefficients(band: usize, gain_db: f32, sample_rate: f32) -> Coefficients<f32> {
        match band {
            0 => coefficients(Type::LowShelf(gain_db), sample_rate, EQ_LOW_HZ, Q_BUTTERWORTH_F32),
            1 => coefficients(Type::PeakingEQ(gain_db), sample_rate, EQ_MID_HZ, 0.7),
            _ => coefficients(Type::HighShelf(gain_db), sample_rate, EQ_HIGH_HZ, Q_BUTTERWORTH_F32),
        }
    }

    pub fn process(&mut self, input: f32, low_db: f32, mid_db: f32, high_db: f32) -> f32 {
        let requested = [low_db, mid_db, high_db];
        let mut sample = input;
        for band in 0..3 {
            if (requested[band] - self.gains[band]).abs() > 0.01 {
                self.gains[band] = requested[band];
                self.bands[band].update_coefficients(Self::band_coefficients(
                    band,
                    requested[band],
                    self.sample_rate,
                ));
            }
            sample = self.bands[band].run(sample);
        }
        sample
    }
}

const COMPRESSOR_ATTACK: f32 = 0.003;
const COMPRESSOR_RELEASE: f32 = 0.25;

/// Feed-forward compressor: fundsp attack/release follower on the rectified
/// signal, gain reduction above the threshold
pub struct Compressor {
    follower: Box<dyn AudioUnit>,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Compressor {
            follower: at_rate(Box::new(afollow(COMPRESSOR_ATTACK, COMPRESSOR_RELEASE)), sample_rate),
        }
    }

    pub fn process(&mut self, input: f32, threshold_db: f32, ratio: f32) -> f32 {
        let mut envelope = [0.0f32];
        self.follower.tick(&[input.abs()], &mut envelope);

        let envelope_db = 20.0 * envelope[0].max(1e-9).log10();
        if envelope_db <= threshold_db {
            return input;
        }
        let reduction_db = (threshold_db - envelope_db) * (1.0 - 1.0 / ratio.max(1.0));
        input * 10f32.powf(reduction_db / 20.0)
    }
}

/// Saturation by normalized tanh, mixed with the dry signal
pub fn distort(input: f32, amount: f32, wet: f32) -> f32 {
    let drive = 1.0 + amount.clamp(0.0, 1.0) * 30.0;
    let shaped = (input * drive).tanh() / drive.tanh();
    let wet = wet.clamp(0.0, 1.0);
    input * (1.0 - wet) + shaped * wet
}

const MAX_DELAY_SECONDS: f32 = 2.0;

/// Feedback delay on a fundsp tap line; the delay time is read every sample
///
/// The echo is fed back one sample late, as with fundsp's `feedback`.
pub struct DelayLine {
    tap: Box<dyn AudioUnit>,
    echo: f32,
}

impl DelayLine {
    pub fn new(sample_rate: f32) -> Self {
        DelayLine {
            tap: at_rate(Box::new(tap_linear(1.0 / sample_rate, MAX_DELAY_SECONDS)), sample_rate),
            echo: 0.0,
        }
    }

    pub fn process(&mut self, input: f32, time: f32, feedback: f32, wet: f32) -> f32 {
        let write = input + self.echo * feedback.clamp(0.0, 0.95);
        let mut delayed = [0.0f32];
        self.tap.tick(&[write, time.max(0.0)], &mut delayed);
        self.echo = delayed[0];

        let wet = wet.clamp(0.0, 1.0);
        input * (1.0 - wet) + delayed[0] * wet
    }
}

const REVERB_ROOM_SIZE: f32 = 12.0;
const REVERB_DAMPING: f32 = 0.5;

/// fundsp stereo FDN reverb driven in mono
///
/// The reverb time is fixed per unit, so the unit is rebuilt when the decay
/// parameter moves by more than 10%.
pub struct Reverb {
    unit: Box<dyn AudioUnit>,
    decay: f32,
    sample_rate: f32,
}

impl Reverb {
    pub fn new(decay: f32, sample_rate: f32) -> Self {
        let decay = decay.clamp(0.1, 20.0);
        Reverb {
            unit: Self::build(decay, sample_rate),
            decay,
            sample_rate,
        }
    }

    fn build(decay: f32, sample_rate: f32) -> Box<dyn AudioUnit> {
        at_rate(
            Box::new(reverb_stereo(REVERB_ROOM_SIZE, decay, REVERB_DAMPING)),
            sample_rate,
        )
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// `decay` is the RT60 time in seconds
    pub fn process(&mut self, input: f32, decay: f32, wet: f32) -> f32 {
        let decay = decay.clamp(0.1, 20.0);
        if (decay - self.decay).abs() > self.decay * 0.1 {
            self.unit = Self::build(decay, self.sample_rate);
            self.decay = decay;
        }

        let mut out = [0.0f32; 2];
        self.unit.tick(&[input, input], &mut out);
        let wet = wet.clamp(0.0, 1.0);
        input * (1.0 - wet) + (out[0] + out[1]) * 0.5 * wet
    }
}

/// Sample processor for one node
pub enum Processor {
    Oscillator(Oscillator),
    Noise(NoiseSource),
    Envelope(Envelope),
    Gain,
    Filter(FilterStage),
    Distortion,
    Eq3(Eq3Stage),
    Compressor(Compressor),
    Delay(DelayLine),
    Reverb(Reverb),
    Lfo(Oscillator),
}

impl Processor {
    pub fn new(kind: &NodeKind, sample_rate: f32) -> Self {
        match *kind {
            NodeKind::Oscillator { waveform, .. } => {
                Processor::Oscillator(Oscillator::new(waveform, sample_rate))
            }
            NodeKind::Noise { color } => Processor::Noise(NoiseSource::new(color, sample_rate)),
            NodeKind::Envelope { .. } => Processor::Envelope(Envelope::new(sample_rate)),
            NodeKind::Gain { .. } => Processor::Gain,
            NodeKind::Filter { kind, frequency, q } => {
                Processor::Filter(FilterStage::new(kind, frequency, q, sample_rate))
            }
            NodeKind::Distortion { .. } => Processor::Distortion,
            NodeKind::Eq3 { low_db, mid_db, high_db } => {
                Processor::Eq3(Eq3Stage::new(low_db, mid_db, high_db, sample_rate))
            }
            NodeKind::Compressor { .. } => Processor::Compressor(Compressor::new(sample_rate)),
            NodeKind::Delay { .. } => Processor::Delay(DelayLine::new(sample_rate)),
            NodeKind::Reverb { decay, .. } => Processor::Reverb(Reverb::new(decay, sample_rate)),
            NodeKind::Lfo { waveform, .. } => Processor::Lfo(Oscillator::new(waveform, sample_rate)),
        }
    }

    pub fn process(&mut self, input: f32, p: &ParamValues) -> f32 {
        let v = |param: Param| p[param_index(param)];
        match self {
            Processor::Oscillator(osc) => osc.next(v(Param::Frequency)),
            Processor::Noise(noise) => noise.next(),
            Processor::Envelope(env) => {
                input * env.next(v(Param::Attack), v(Param::Decay), v(Param::Sustain), v(Param::Release))
            }
            Processor::Gain => input * v(Param::Gain),
            Processor::Filter(filter) => filter.process(input, v(Param::Frequency), v(Param::Q)),
            Processor::Distortion => distort(input, v(Param::Amount), v(Param::Wet)),
            Processor::Eq3(eq) => eq.process(input, v(Param::Low), v(Param::Mid), v(Param::High)),
            Processor::Compressor(comp) => comp.process(input, v(Param::Threshold), v(Param::Ratio)),
            Processor::Delay(delay) => {
                delay.process(input, v(Param::Time), v(Param::Feedback), v(Param::Wet))
            }
            Processor::Reverb(reverb) => reverb.process(input, v(Param::Decay), v(Param::Wet)),
            Processor::Lfo(osc) => {
                let unit = (osc.next(v(Param::Frequency)) + 1.0) * 0.5;
                v(Param::Min) + (v(Param::Max) - v(Param::Min)) * unit
            }
        }
    }

    pub fn trigger_attack(&mut self, velocity: f32) -> bool {
        match self {
            Processor::Envelope(env) => {
                env.attack(velocity);
                true
            }
            _ => false,
        }
    }

    pub fn trigger_release(&mut self) -> bool {
        match self {
            Processor::Envelope(env) => {
                env.release();
                true
            }
            _ => false,
        }
    }

    pub fn reset_phase(&mut self) -> bool {
        match self {
            Processor::Oscillator(osc) | Processor::Lfo(osc) => {
                osc.reset_phase();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn test_param_count_matches_enum() {
        assert_eq!(param_index(Param::Max), PARAM_COUNT - 1);
    }

    #[test]
    fn test_waveforms_start_at_phase_zero() {
        assert_eq!(waveform_sample(Waveform::Sine, 0.0), 0.0);
        assert_eq!(waveform_sample(Waveform::Square, 0.0), 1.0);
        assert_eq!(waveform_sample(Waveform::Sawtooth, 0.0), -1.0);
        assert_eq!(waveform_sample(Waveform::Triangle, 0.5), 1.0);
    }

    #[test]
    fn test_oscillator_phase_reset() {
        let mut osc = Oscillator::new(Waveform::Sine, SR);
        for _ in 0..37 {
            osc.next(440.0);
        }
        osc.reset_phase();
        assert_eq!(osc.next(440.0), 0.0);
    }

    #[test]
    fn test_envelope_attack_decay_release() {
        let mut env = Envelope::new(1000.0);
        env.attack(1.0);
        // 10 ms attack at 1 kHz = 10 samples
        let mut peak: f32 = 0.0;
        for _ in 0..10 {
            peak = peak.max(env.next(0.01, 0.01, 0.5, 0.01));
        }
        assert!((peak - 1.0).abs() < 1e-4);
        for _ in 0..20 {
            env.next(0.01, 0.01, 0.5, 0.01);
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        env.release();
        for _ in 0..20 {
            env.next(0.01, 0.01, 0.5, 0.01);
        }
        assert_eq!(env.stage(), EnvelopeStage::Idle);
        assert_eq!(env.next(0.01, 0.01, 0.5, 0.01), 0.0);
    }

    #[test]
    fn test_idle_envelope_is_silent() {
        let mut env = Envelope::new(SR);
        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Idle);
        assert_eq!(env.next(0.0, 0.1, 1.0, 0.1), 0.0);
    }

    #[test]
    fn test_distortion_dry_passthrough() {
        assert_eq!(distort(0.3, 1.0, 0.0), 0.3);
        let shaped = distort(0.9, 1.0, 1.0);
        assert!(shaped <= 1.0 && shaped > 0.9);
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        let mut filter = FilterStage::new(FilterKind::Lowpass, 200.0, 0.707, SR);
        let mut osc = Oscillator::new(Waveform::Sine, SR);
        let mut peak: f32 = 0.0;
        for i in 0..4800 {
            let out = filter.process(osc.next(8000.0), 200.0, 0.707);
            if i > 2400 {
                peak = peak.max(out.abs());
            }
        }
        assert!(peak < 0.05, "peak {}", peak);
    }

    #[test]
    fn test_delay_echoes_after_delay_time() {
        let mut delay = DelayLine::new(1000.0);
        let first = delay.process(1.0, 0.01, 0.0, 1.0);
        assert_eq!(first, 0.0);
        let mut echoed = 0.0;
        for _ in 0..10 {
            echoed = delay.process(0.0, 0.01, 0.0, 1.0);
        }
        assert_eq!(echoed, 1.0);
    }

    #[test]
    fn test_compressor_reduces_loud_signal() {
        let mut comp = Compressor::new(SR);
        let mut out = 0.0;
        for _ in 0..4800 {
            out = comp.process(1.0, -20.0, 4.0);
        }
        assert!(out < 0.5);
    }

    #[test]
    fn test_noise_is_bounded() {
        for color in [NoiseColor::White, NoiseColor::Pink] {
            let mut noise = NoiseSource::new(color, SR);
            let samples: Vec<f32> = (0..4800).map(|_| noise.next()).collect();
            assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 4.0));
            assert!(samples.iter().any(|s| s.abs() > 0.01));
        }
    }

    #[test]
    fn test_delay_feedback_repeats_echo() {
        let mut delay = DelayLine::new(1000.0);
        let mut out = vec![delay.process(1.0, 0.01, 0.5, 1.0)];
        for _ in 0..40 {
            out.push(delay.process(0.0, 0.01, 0.5, 1.0));
        }
        assert_eq!(out[10], 1.0);
        // Fed back one sample late at half level
        assert!((out[21] - 0.5).abs() < 1e-6, "second echo {}", out[21]);
    }

    #[test]
    fn test_reverb_tail_and_dry_passthrough() {
        let mut reverb = Reverb::new(1.0, SR);
        assert_eq!(reverb.process(0.4, 1.0, 0.0), 0.4);

        let mut reverb = Reverb::new(1.0, SR);
        reverb.process(1.0, 1.5, 1.0);
        let tail: f32 = (0..24_000).map(|_| reverb.process(0.0, 1.5, 1.0).abs()).sum();
        assert!(tail > 0.0);
        assert_eq!(reverb.decay(), 1.5);
    }

    #[test]
    fn test_compressor_leaves_quiet_signal() {
        let mut comp = Compressor::new(SR);
        let mut out = 0.0;
        for _ in 0..4800 {
            out = comp.process(0.01, -20.0, 4.0);
        }
        assert!((out - 0.01).abs() < 1e-6);
    }
}
