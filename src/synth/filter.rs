//! Biquad filter implementation
//!
//! Two cascadable biquad stages behind a drive waveshaper, with the cutoff
//! modulated by the filter's envelope and the LFO, and a limiter on the
//! output.

use super::automation::MIN_VALUE;
use super::drive::Drive;
use super::dynamics::Limiter;
use super::envelope::Envelope;
use super::module::{clamp_depth, Enveloped, LfoInput, Modulator};
use crate::params::FilterParams;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Lowest cutoff the filter accepts, in Hz
pub const MIN_CUTOFF: f64 = 60.0;

/// Highest cutoff, in Hz (further limited to 0.45 of the sample rate)
pub const MAX_CUTOFF: f64 = 20000.0;

/// Butterworth Q, used when bypassed
pub const NEUTRAL_Q: f64 = 0.707;

/// Full-scale output of the cutoff envelope, in Hz
pub const CUTOFF_ENVELOPE_RANGE: f64 = 1000.0;

/// Cutoff swing of the LFO at full depth, in Hz
pub const LFO_CUTOFF_RANGE: f64 = 400.0;

const LIMITER_ATTACK: f64 = 0.2;
const LIMITER_RELEASE: f64 = 0.01;

/// Filter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
    Peaking,
    /// Cutoff forced to the maximum and Q to neutral
    Bypass,
}

impl FilterType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lowpass" | "lp" => Some(FilterType::LowPass),
            "highpass" | "hp" => Some(FilterType::HighPass),
            "bandpass" | "bp" => Some(FilterType::BandPass),
            "peaking" | "peak" => Some(FilterType::Peaking),
            "bypass" | "off" => Some(FilterType::Bypass),
            _ => None,
        }
    }
}

/// Number of stages between the drive and the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Slope {
    #[default]
    #[serde(rename = "-12dB")]
    Db12,
    #[serde(rename = "-24dB")]
    Db24,
}

/// Biquad filter coefficients
#[derive(Debug, Clone, Copy)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl Coefficients {
    fn calculate(filter_type: FilterType, cutoff: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * cutoff / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::LowPass | FilterType::Bypass => {
                let b0 = (1.0 - cos_omega) / 2.0;
                let b1 = 1.0 - cos_omega;
                let b2 = (1.0 - cos_omega) / 2.0;
                (b0, b1, b2, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
            }
            FilterType::HighPass => {
                let b0 = (1.0 + cos_omega) / 2.0;
                let b1 = -(1.0 + cos_omega);
                let b2 = (1.0 + cos_omega) / 2.0;
                (b0, b1, b2, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha)
            }
            FilterType::BandPass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_omega, 1.0 - alpha),
            FilterType::Peaking => {
                let a = 10f64.powf(gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_omega,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_omega,
                    1.0 - alpha / a,
                )
            }
        };

        // Normalize by a0
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// One stereo biquad stage (Direct Form II transposed)
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coeffs: Coefficients,
    z1: [f64; 2],
    z2: [f64; 2],
}

impl Biquad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, filter_type: FilterType, cutoff: f64, q: f64, gain_db: f64, sample_rate: f64) {
        self.coeffs = Coefficients::calculate(filter_type, cutoff, q, gain_db, sample_rate);
    }

    /// Reset filter state (clear history)
    pub fn reset(&mut self) {
        self.z1 = [0.0; 2];
        self.z2 = [0.0; 2];
    }

    /// Process a single stereo frame
    pub fn process(&mut self, frame: [f64; 2]) -> [f64; 2] {
        let c = self.coeffs;
        let mut out = [0.0; 2];
        for ch in 0..2 {
            let input = frame[ch];
            let output = c.b0 * input + self.z1[ch];
            self.z1[ch] = c.b1 * input - c.a1 * output + self.z2[ch];
            self.z2[ch] = c.b2 * input - c.a2 * output;
            out[ch] = output;
        }
        out
    }
}

/// Filter module: drive, one or two biquad stages, limiter
#[derive(Debug, Clone)]
pub struct FilterModule {
    sample_rate: f64,
    filter_type: FilterType,
    slope: Slope,
    cutoff: f64,
    resonance: f64,
    gain_db: f64,
    lfo_depth: f64,

    drive: Drive,
    stage_a: Biquad,
    stage_b: Biquad,
    limiter: Limiter,
    envelope: Envelope,

    /// Cutoff/Q the coefficients were last computed for
    applied: (f64, f64),
}

impl FilterModule {
    pub fn new(sample_rate: f64) -> Self {
        let mut envelope = Envelope::new(CUTOFF_ENVELOPE_RANGE);
        envelope.set_amount(0.0);
        envelope.set_sustain(MIN_VALUE, 0.0);
        let mut filter = Self {
            sample_rate,
            filter_type: FilterType::LowPass,
            slope: Slope::Db12,
            cutoff: MAX_CUTOFF.min(sample_rate * 0.45),
            resonance: NEUTRAL_Q,
            gain_db: 0.0,
            lfo_depth: 0.0,
            drive: Drive::new(),
            stage_a: Biquad::new(),
            stage_b: Biquad::new(),
            limiter: Limiter::new(sample_rate, LIMITER_ATTACK, LIMITER_RELEASE),
            envelope,
            applied: (f64::NAN, f64::NAN),
        };
        filter.update_coefficients(filter.cutoff, filter.resonance);
        filter
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Cutoff frequency as set by the user, in Hz
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Resonance (Q)
    pub fn resonance(&self) -> f64 {
        self.resonance
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn slope(&self) -> Slope {
        self.slope
    }

    pub fn drive(&self) -> f64 {
        self.drive.amount()
    }

    /// Stages between the drive and the output: 1 at -12dB, 2 at -24dB
    pub fn active_stages(&self) -> usize {
        match self.slope {
            Slope::Db12 => 1,
            Slope::Db24 => 2,
        }
    }

    /// Highest usable cutoff at this sample rate
    pub fn max_cutoff(&self) -> f64 {
        MAX_CUTOFF.min(self.sample_rate * 0.45)
    }

    /// Cutoff and Q the stages currently run at
    pub fn effective(&self) -> (f64, f64) {
        self.applied
    }

    pub fn set_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
        self.force_update();
    }

    /// Set cutoff frequency in Hz
    pub fn set_cutoff(&mut self, hz: f64) {
        self.cutoff = if hz.is_finite() {
            hz.clamp(MIN_CUTOFF, self.max_cutoff())
        } else {
            self.max_cutoff()
        };
        self.force_update();
    }

    /// Set resonance (Q factor)
    /// Higher values = more resonance at cutoff
    /// 0.707 = Butterworth (flat response)
    pub fn set_resonance(&mut self, q: f64) {
        // Clamp Q to prevent instability
        self.resonance = if q.is_finite() {
            q.clamp(0.1, 20.0)
        } else {
            NEUTRAL_Q
        };
        self.force_update();
    }

    /// Peaking gain in dB
    pub fn set_gain_db(&mut self, db: f64) {
        self.gain_db = if db.is_finite() { db.clamp(-40.0, 40.0) } else { 0.0 };
        self.force_update();
    }

    /// Chain the second stage (-24dB) or take it out of the path (-12dB)
    pub fn set_slope(&mut self, slope: Slope) {
        if slope == Slope::Db24 && self.slope != Slope::Db24 {
            self.stage_b.reset();
        }
        self.slope = slope;
    }

    pub fn set_drive(&mut self, amount: f64) {
        self.drive.set_amount(amount);
    }

    /// Reset filter state (clear history)
    pub fn reset(&mut self) {
        self.stage_a.reset();
        self.stage_b.reset();
        self.limiter.reset();
    }

    /// Snapshot of every setting
    pub fn params(&self) -> FilterParams {
        FilterParams {
            filter_type: Some(self.filter_type),
            cutoff: Some(self.cutoff),
            resonance: Some(self.resonance),
            gain_db: Some(self.gain_db),
            slope: Some(self.slope),
            drive: Some(self.drive.amount()),
            lfo_depth: Some(self.lfo_depth),
            envelope: Some(self.envelope.params()),
        }
    }

    /// Apply the fields present in `params` that differ from the current
    /// settings
    pub fn apply(&mut self, params: &FilterParams, now: f64) {
        if let Some(t) = params.filter_type.filter(|&t| t != self.filter_type) {
            self.set_type(t);
        }
        if let Some(hz) = params.cutoff.filter(|&hz| hz != self.cutoff) {
            self.set_cutoff(hz);
        }
        if let Some(q) = params.resonance.filter(|&q| q != self.resonance) {
            self.set_resonance(q);
        }
        if let Some(db) = params.gain_db.filter(|&db| db != self.gain_db) {
            self.set_gain_db(db);
        }
        if let Some(slope) = params.slope.filter(|&s| s != self.slope) {
            self.set_slope(slope);
        }
        if let Some(drive) = params.drive {
            self.set_drive(drive);
        }
        if let Some(depth) = params.lfo_depth.filter(|&d| d != self.lfo_depth) {
            self.set_lfo_depth(depth);
        }
        if let Some(envelope) = &params.envelope {
            self.envelope.apply(envelope, now);
        }
    }

    /// Take on every setting of `template` with cleared state
    pub fn prepare_from(&mut self, template: &FilterModule) {
        self.envelope.reset();
        self.apply(&template.params(), 0.0);
        self.reset();
    }

    /// Process one stereo frame at `time`, with `lfo` in -1.0..1.0
    pub fn process(&mut self, frame: [f64; 2], time: f64, lfo: f64) -> [f64; 2] {
        let env = self.envelope.tick(time);
        if self.filter_type == FilterType::Bypass {
            self.update_coefficients(self.max_cutoff(), NEUTRAL_Q);
        } else {
            let hz = self.cutoff + env + lfo * self.lfo_depth * LFO_CUTOFF_RANGE;
            let hz = hz.clamp(MIN_CUTOFF, self.max_cutoff());
            self.update_coefficients(hz, self.resonance);
        }

        let driven = [self.drive.process(frame[0]), self.drive.process(frame[1])];
        let mut out = self.stage_a.process(driven);
        if self.slope == Slope::Db24 {
            out = self.stage_b.process(out);
        }
        self.limiter.process(out)
    }

    fn force_update(&mut self) {
        self.applied = (f64::NAN, f64::NAN);
        let (hz, q) = match self.filter_type {
            FilterType::Bypass => (self.max_cutoff(), NEUTRAL_Q),
            _ => (self.cutoff, self.resonance),
        };
        self.update_coefficients(hz, q);
    }

    fn update_coefficients(&mut self, hz: f64, q: f64) {
        if self.applied == (hz, q) {
            return;
        }
        self.applied = (hz, q);
        let filter_type = self.filter_type;
        let (gain_db, sr) = (self.gain_db, self.sample_rate);
        self.stage_a.set(filter_type, hz, q, gain_db, sr);
        self.stage_b.set(filter_type, hz, q, gain_db, sr);
    }
}

impl Enveloped for FilterModule {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

impl LfoInput for FilterModule {
    fn lfo_depth(&self) -> f64 {
        self.lfo_depth
    }

    fn set_lfo_depth(&mut self, depth: f64) {
        self.lfo_depth = clamp_depth(depth);
    }
}

impl Modulator for FilterModule {
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

    const SR: f64 = 44100.0;

    fn peak_after_settling(filter: &mut FilterModule, freq: f64) -> f64 {
        let mut max_output = 0.0f64;
        for i in 0..4410 {
            let t = i as f64 / SR;
            let input = 0.5 * (2.0 * PI * freq * t).sin();
            let out = filter.process([input, input], t, 0.0);
            if i > 1000 {
                max_output = max_output.max(out[0].abs());
            }
        }
        max_output
    }

    #[test]
    fn test_filter_creation() {
        let filter = FilterModule::new(SR);
        assert_eq!(filter.cutoff(), MAX_CUTOFF.min(SR * 0.45));
        assert!((filter.resonance() - 0.707).abs() < 0.001);
        assert_eq!(filter.active_stages(), 1);
    }

    #[test]
    fn test_filter_cutoff_clamping() {
        let mut filter = FilterModule::new(SR);

        // Too low
        filter.set_cutoff(5.0);
        assert_eq!(filter.cutoff(), MIN_CUTOFF);

        // Too high (above Nyquist)
        filter.set_cutoff(25000.0);
        assert!(filter.cutoff() < SR * 0.5);
    }

    #[test]
    fn test_filter_resonance_clamping() {
        let mut filter = FilterModule::new(SR);

        filter.set_resonance(0.01);
        assert_eq!(filter.resonance(), 0.1);

        filter.set_resonance(100.0);
        assert_eq!(filter.resonance(), 20.0);
    }

    #[test]
    fn test_lowpass_attenuates_high_frequencies() {
        let mut filter = FilterModule::new(SR);
        filter.set_cutoff(100.0);
        let peak = peak_after_settling(&mut filter, 5000.0);
        assert!(peak < 0.05, "Expected attenuation, got {}", peak);
    }

    #[test]
    fn test_lowpass_passes_low_frequencies() {
        let mut filter = FilterModule::new(SR);
        filter.set_cutoff(5000.0);
        let peak = peak_after_settling(&mut filter, 100.0);
        assert!(peak > 0.45, "Expected passthrough, got {}", peak);
    }

    #[test]
    fn test_highpass_filter() {
        let mut filter = FilterModule::new(SR);
        filter.set_type(FilterType::HighPass);
        filter.set_cutoff(1000.0);
        let peak = peak_after_settling(&mut filter, 100.0);
        assert!(peak < 0.25, "Expected attenuation, got {}", peak);
    }

    #[test]
    fn test_steeper_slope_attenuates_more() {
        let mut two_pole = FilterModule::new(SR);
        two_pole.set_cutoff(500.0);
        let mut four_pole = FilterModule::new(SR);
        four_pole.set_cutoff(500.0);
        four_pole.set_slope(Slope::Db24);

        let a = peak_after_settling(&mut two_pole, 4000.0);
        let b = peak_after_settling(&mut four_pole, 4000.0);
        assert!(b < a * 0.2, "two-pole {} four-pole {}", a, b);
    }

    #[test]
    fn test_slope_toggle_leaves_single_stage() {
        let mut toggled = FilterModule::new(SR);
        toggled.set_cutoff(800.0);
        toggled.set_slope(Slope::Db24);
        toggled.set_slope(Slope::Db12);
        assert_eq!(toggled.active_stages(), 1);

        let mut plain = FilterModule::new(SR);
        plain.set_cutoff(800.0);
        for i in 0..512 {
            let t = i as f64 / SR;
            let x = (2.0 * PI * 300.0 * t).sin();
            assert_eq!(toggled.process([x, x], t, 0.0), plain.process([x, x], t, 0.0));
        }
    }

    #[test]
    fn test_bypass_forces_max_cutoff_and_neutral_q() {
        let mut filter = FilterModule::new(SR);
        filter.set_cutoff(200.0);
        filter.set_resonance(10.0);
        filter.set_type(FilterType::Bypass);

        assert_eq!(filter.effective(), (filter.max_cutoff(), NEUTRAL_Q));
        // the user's settings survive for when bypass is lifted
        assert_eq!(filter.cutoff(), 200.0);
        filter.set_type(FilterType::LowPass);
        assert_eq!(filter.effective(), (200.0, 10.0));
    }

    #[test]
    fn test_envelope_opens_cutoff() {
        let mut filter = FilterModule::new(SR);
        filter.set_cutoff(200.0);
        filter.envelope_mut().set_amount(1.0);
        filter.envelope_mut().configure(0.001, 0.001, 1.0, 0.1, 0.0);
        filter.start(0.0);
        for i in 0..441 {
            filter.process([0.0, 0.0], i as f64 / SR, 0.0);
        }
        let (hz, _) = filter.effective();
        assert!((hz - 1200.0).abs() < 1e-6, "got {}", hz);
    }

    #[test]
    fn test_lfo_moves_cutoff() {
        let mut filter = FilterModule::new(SR);
        filter.set_cutoff(1000.0);
        filter.set_lfo_depth(0.5);
        filter.process([0.0, 0.0], 0.0, -1.0);
        assert_eq!(filter.effective().0, 800.0);
    }

    #[test]
    fn test_apply_partial() {
        let mut filter = FilterModule::new(SR);
        filter.set_resonance(4.0);
        filter.apply(
            &FilterParams {
                cutoff: Some(1500.0),
                ..Default::default()
            },
            0.0,
        );
        assert_eq!(filter.cutoff(), 1500.0);
        assert_eq!(filter.resonance(), 4.0);
    }

    #[test]
    fn test_filter_reset() {
        let mut filter = FilterModule::new(SR);
        filter.set_cutoff(500.0);
        for i in 0..100 {
            filter.process([1.0, 1.0], i as f64 / SR, 0.0);
        }
        filter.reset();
        let out = filter.process([0.0, 0.0], 0.01, 0.0);
        assert!(out[0].abs() < 0.001, "Expected near-zero after reset, got {}", out[0]);
    }
}
