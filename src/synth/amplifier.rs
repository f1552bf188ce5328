//! Amplifier module
//!
//! The loudness contour of a voice. The LFO tremolo is summed onto a unit
//! gain and then scaled by the envelope, so the envelope gates it. The note
//! velocity is applied on top and the result is limited.

use super::dynamics::Limiter;
use super::envelope::Envelope;
use super::module::{clamp_depth, Enveloped, LfoInput, Modulator};
use crate::params::AmplifierParams;

const LIMITER_ATTACK: f64 = 0.01;
const LIMITER_RELEASE: f64 = 0.05;

/// Output gain stage
#[derive(Debug, Clone)]
pub struct AmplifierModule {
    envelope: Envelope,
    limiter: Limiter,
    lfo_depth: f64,
    velocity: f64,
    /// Gain applied on the last processed frame
    gain: f64,
}

impl AmplifierModule {
    pub fn new(sample_rate: f64) -> Self {
        let mut envelope = Envelope::new(1.0);
        envelope.set_amount(0.5);
        envelope.set_sustain(1.0, 0.0);
        Self {
            envelope,
            limiter: Limiter::new(sample_rate, LIMITER_ATTACK, LIMITER_RELEASE),
            lfo_depth: 0.0,
            velocity: 1.0,
            gain: 0.0,
        }
    }

    /// Note velocity scale (0.0-1.0)
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: f64) {
        self.velocity = if velocity.is_finite() {
            velocity.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Gain applied on the last processed frame
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Normalized envelope contour at the last tick, used to decide when a
    /// released voice has gone quiet
    pub fn level(&self) -> f64 {
        self.envelope.level()
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
        self.gain = 0.0;
    }

    /// Snapshot of every setting
    pub fn params(&self) -> AmplifierParams {
        AmplifierParams {
            envelope: Some(self.envelope.params()),
            lfo_depth: Some(self.lfo_depth),
        }
    }

    /// Apply the fields present in `params` that differ from the current
    /// settings
    pub fn apply(&mut self, params: &AmplifierParams, now: f64) {
        if let Some(envelope) = &params.envelope {
            self.envelope.apply(envelope, now);
        }
        if let Some(depth) = params.lfo_depth.filter(|&d| d != self.lfo_depth) {
            self.set_lfo_depth(depth);
        }
    }

    /// Take on every setting of `template` with cleared state
    pub fn prepare_from(&mut self, template: &AmplifierModule, velocity: f64) {
        self.envelope.reset();
        self.apply(&template.params(), 0.0);
        self.set_velocity(velocity);
        self.reset();
    }

    /// Process one stereo frame at `time`, with `lfo` in -1.0..1.0
    pub fn process(&mut self, frame: [f64; 2], time: f64, lfo: f64) -> [f64; 2] {
        let env = self.envelope.tick(time);
        self.gain = env * (1.0 + lfo * self.lfo_depth).max(0.0) * self.velocity;
        self.limiter
            .process([frame[0] * self.gain, frame[1] * self.gain])
    }

    /// Scale a control signal by the envelope, bypassing the limiter
    pub fn scale(&mut self, value: f64, time: f64) -> f64 {
        let env = self.envelope.tick(time);
        self.gain = env * self.velocity;
        value * self.gain
    }
}

impl Enveloped for AmplifierModule {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

impl LfoInput for AmplifierModule {
    fn lfo_depth(&self) -> f64 {
        self.lfo_depth
    }

    fn set_lfo_depth(&mut self, depth: f64) {
        self.lfo_depth = clamp_depth(depth);
    }
}

impl Modulator for AmplifierModule {
    fn start(&mut self, now: f64) {
        self.envelope.start(now);
    }

    fn stop(&mut self, now: f64) {
        self.envelope.stop(now);
    }

    fn tick(&mut self, time: f64) -> f64 {
        self.envelope.tick(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EnvelopeParams;

    const SR: f64 = 48000.0;

    #[test]
    fn test_silent_before_start() {
        let mut amp = AmplifierModule::new(SR);
        let out = amp.process([1.0, 1.0], 0.0, 0.0);
        assert!(out[0].abs() < 1e-4);
    }

    #[test]
    fn test_sustain_level_and_velocity() {
        let mut amp = AmplifierModule::new(SR);
        amp.envelope_mut().configure(0.001, 0.001, 1.0, 0.1, 0.0);
        amp.set_velocity(0.5);
        amp.start(0.0);

        let mut out = [0.0; 2];
        for n in 0..480 {
            out = amp.process([0.8, -0.8], n as f64 / SR, 0.0);
        }
        // amount 0.5 x sustain 1.0 x velocity 0.5
        assert!((out[0] - 0.2).abs() < 1e-9);
        assert!((out[1] + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_tremolo_scaled_by_envelope() {
        let mut amp = AmplifierModule::new(SR);
        amp.envelope_mut().configure(0.001, 0.001, 1.0, 0.1, 0.0);
        amp.set_lfo_depth(0.25);
        amp.start(0.0);
        for n in 0..480 {
            amp.process([0.0, 0.0], n as f64 / SR, 0.0);
        }
        // envelope 0.5 x (1 +/- 0.25)
        amp.process([0.0, 0.0], 0.01, 1.0);
        assert!((amp.gain() - 0.625).abs() < 1e-9);
        amp.process([0.0, 0.0], 0.0101, -1.0);
        assert!((amp.gain() - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_tremolo_silent_after_release() {
        let mut amp = AmplifierModule::new(SR);
        amp.envelope_mut().configure(0.001, 0.001, 1.0, 0.02, 0.0);
        amp.set_lfo_depth(1.0);
        amp.start(0.0);
        for n in 0..4800 {
            amp.process([1.0, 1.0], n as f64 / SR, 1.0);
        }
        amp.stop(0.1);
        let mut out = [1.0; 2];
        for n in 4800..9600 {
            out = amp.process([1.0, 1.0], n as f64 / SR, 1.0);
        }
        assert!(amp.level() < 0.003);
        assert!(out[0].abs() < 0.003, "got {}", out[0]);
    }

    #[test]
    fn test_limiter_contains_overshoot() {
        let mut amp = AmplifierModule::new(SR);
        amp.envelope_mut().set_amount(1.0);
        amp.envelope_mut().configure(0.001, 0.001, 1.0, 0.1, 0.0);
        amp.set_lfo_depth(1.0);
        amp.start(0.0);

        let mut out = [0.0; 2];
        for n in 0..(SR as usize / 2) {
            out = amp.process([1.0, 1.0], n as f64 / SR, 1.0);
        }
        // gain of 2 (+6 dB) limited at 20:1
        assert!(out[0] < 1.1, "got {}", out[0]);
    }

    #[test]
    fn test_release_lowers_level() {
        let mut amp = AmplifierModule::new(SR);
        amp.apply(
            &AmplifierParams {
                envelope: Some(EnvelopeParams::adsr(0.5, 0.001, 0.001, 1.0, 0.05)),
                lfo_depth: None,
            },
            0.0,
        );
        amp.start(0.0);
        for n in 0..480 {
            amp.process([0.0, 0.0], n as f64 / SR, 0.0);
        }
        amp.stop(0.01);
        for n in 480..4800 {
            amp.process([0.0, 0.0], n as f64 / SR, 0.0);
        }
        assert!(amp.level() < 0.003);
    }

    #[test]
    fn test_prepare_from_template() {
        let mut template = AmplifierModule::new(SR);
        template.set_lfo_depth(0.4);
        template.envelope_mut().set_attack(0.2);

        let mut voice = AmplifierModule::new(SR);
        voice.prepare_from(&template, 0.75);
        assert_eq!(voice.lfo_depth(), 0.4);
        assert_eq!(voice.envelope().attack(), 0.2);
        assert_eq!(voice.velocity(), 0.75);
    }
}
