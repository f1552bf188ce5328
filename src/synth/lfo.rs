//! Low Frequency Oscillator for modulation
//!
//! A slow oscillator followed by an amplifier. The rate envelope pushes the
//! oscillator's frequency up from its base rate and the amplifier envelope
//! shapes the output level, so a single LFO can produce one-shot sweeps as
//! well as steady vibrato.

use super::amplifier::AmplifierModule;
use super::automation::MIN_VALUE;
use super::envelope::Envelope;
use super::module::{Enveloped, Modulator};
use super::oscillator::{Oscillator, Waveform};
use crate::params::LfoParams;

/// Highest base rate, in Hz
pub const MAX_LFO_RATE: f64 = 50.0;

/// Full-scale output of the rate envelope, in Hz
pub const RATE_ENVELOPE_RANGE: f64 = 20.0;

const DEFAULT_RATE: f64 = 5.0;

/// Low Frequency Oscillator
#[derive(Debug, Clone)]
pub struct LfoModule {
    osc: Oscillator,
    rate: f64,
    rate_envelope: Envelope,
    amp: AmplifierModule,
    /// Last output value
    value: f64,
}

impl LfoModule {
    /// Create a new LFO
    pub fn new(sample_rate: f64) -> Self {
        let mut rate_envelope = Envelope::new(RATE_ENVELOPE_RANGE);
        rate_envelope.set_amount(0.0);
        rate_envelope.set_sustain(1.0, 0.0);
        Self {
            osc: Oscillator::new(Waveform::Sine, sample_rate),
            rate: DEFAULT_RATE,
            rate_envelope,
            amp: AmplifierModule::new(sample_rate),
            value: 0.0,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.osc.waveform()
    }

    /// Set LFO shape
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.osc.set_waveform(waveform);
    }

    /// Base rate in Hz
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Set base rate in Hz
    pub fn set_rate(&mut self, hz: f64) {
        self.rate = if hz.is_finite() {
            hz.clamp(MIN_VALUE, MAX_LFO_RATE)
        } else {
            DEFAULT_RATE
        };
    }

    pub fn rate_envelope(&self) -> &Envelope {
        &self.rate_envelope
    }

    pub fn rate_envelope_mut(&mut self) -> &mut Envelope {
        &mut self.rate_envelope
    }

    /// Envelope shaping the output level
    pub fn amp_envelope(&self) -> &Envelope {
        self.amp.envelope()
    }

    pub fn amp_envelope_mut(&mut self) -> &mut Envelope {
        self.amp.envelope_mut()
    }

    /// Last output value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Reset phase
    pub fn reset(&mut self) {
        self.osc.reset();
        self.amp.reset();
        self.value = 0.0;
    }

    /// Snapshot of every setting
    pub fn params(&self) -> LfoParams {
        LfoParams {
            waveform: Some(self.waveform()),
            rate: Some(self.rate),
            rate_envelope: Some(self.rate_envelope.params()),
            amp_envelope: Some(self.amp_envelope().params()),
        }
    }

    /// Apply the fields present in `params` that differ from the current
    /// settings
    pub fn apply(&mut self, params: &LfoParams, now: f64) {
        if let Some(waveform) = params.waveform.filter(|&w| w != self.waveform()) {
            self.set_waveform(waveform);
        }
        if let Some(rate) = params.rate.filter(|&r| r != self.rate) {
            self.set_rate(rate);
        }
        if let Some(envelope) = &params.rate_envelope {
            self.rate_envelope.apply(envelope, now);
        }
        if let Some(envelope) = &params.amp_envelope {
            self.amp_envelope_mut().apply(envelope, now);
        }
    }

    /// Take on every setting of `template` with a fresh phase
    pub fn prepare_from(&mut self, template: &LfoModule) {
        self.rate_envelope.reset();
        self.amp_envelope_mut().reset();
        self.apply(&template.params(), 0.0);
        self.reset();
    }
}

impl Modulator for LfoModule {
    /// Starts the rate and level envelopes together
    fn start(&mut self, now: f64) {
        self.rate_envelope.start(now);
        self.amp.start(now);
    }

    /// Releases the rate and level envelopes together
    fn stop(&mut self, now: f64) {
        self.rate_envelope.stop(now);
        self.amp.stop(now);
    }

    /// Next modulation value, -1.0..1.0 scaled by the level envelope
    fn tick(&mut self, time: f64) -> f64 {
        let hz = self.rate + self.rate_envelope.tick(time);
        let raw = self.osc.generate(hz);
        self.value = self.amp.scale(raw, time);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EnvelopeParams;

    const SR: f64 = 48000.0;

    fn run(lfo: &mut LfoModule, seconds: f64) -> (f64, f64) {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for n in 0..(seconds * SR) as usize {
            let v = lfo.tick(n as f64 / SR);
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }

    #[test]
    fn test_lfo_creation() {
        let lfo = LfoModule::new(SR);
        assert_eq!(lfo.rate(), 5.0);
        assert_eq!(lfo.waveform(), Waveform::Sine);
        assert_eq!(lfo.amp_envelope().amount(), 0.5);
    }

    #[test]
    fn test_output_scaled_by_level_envelope() {
        let mut lfo = LfoModule::new(SR);
        lfo.amp_envelope_mut().configure(0.001, 0.001, 1.0, 0.1, 0.0);
        lfo.start(0.0);
        let (min, max) = run(&mut lfo, 1.0);
        assert!(max <= 0.5 + 1e-9 && max > 0.49);
        assert!(min >= -0.5 - 1e-9 && min < -0.49);
    }

    #[test]
    fn test_silent_until_started() {
        let mut lfo = LfoModule::new(SR);
        let (min, max) = run(&mut lfo, 0.5);
        assert!(max.abs() < 1e-4 && min.abs() < 1e-4);
    }

    #[test]
    fn test_rate_envelope_speeds_up() {
        // count zero crossings of a square LFO with and without the rate envelope
        let crossings = |amount: f64| {
            let mut lfo = LfoModule::new(SR);
            lfo.set_waveform(Waveform::Square);
            lfo.set_rate(2.0);
            lfo.apply(
                &LfoParams {
                    rate_envelope: Some(EnvelopeParams::adsr(amount, 0.001, 0.001, 1.0, 0.1)),
                    amp_envelope: Some(EnvelopeParams::adsr(1.0, 0.001, 0.001, 1.0, 0.1)),
                    ..Default::default()
                },
                0.0,
            );
            lfo.start(0.0);
            let mut last = 0.0f64;
            let mut count = 0;
            for n in 0..SR as usize {
                let v = lfo.tick(n as f64 / SR);
                if v.signum() != last.signum() && last != 0.0 {
                    count += 1;
                }
                last = v;
            }
            count
        };
        // 2 Hz gives about 4 crossings a second, 2 + 10 Hz about 24
        assert!(crossings(0.0) <= 5);
        assert!(crossings(0.5) >= 20);
    }

    #[test]
    fn test_rate_clamped() {
        let mut lfo = LfoModule::new(SR);
        lfo.set_rate(500.0);
        assert_eq!(lfo.rate(), MAX_LFO_RATE);
        lfo.set_rate(-1.0);
        assert_eq!(lfo.rate(), MIN_VALUE);
    }

    #[test]
    fn test_prepare_from_copies_params() {
        let mut template = LfoModule::new(SR);
        template.set_waveform(Waveform::Triangle);
        template.set_rate(0.5);
        template.rate_envelope_mut().set_amount(0.3);

        let mut clone = LfoModule::new(SR);
        clone.prepare_from(&template);
        assert_eq!(clone.params(), template.params());
    }
}
