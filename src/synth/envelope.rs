//! ADSR envelope generator
//!
//! Attack-Decay-Sustain-Release contour scheduled on an [`AutomationCurve`].
//! The curve itself runs between the floor and 1.0; the output is scaled by
//! `amount` and by the envelope's fixed `range` (1000 Hz for a pitch
//! envelope, 1.0 for a loudness envelope).

use super::automation::{AutomationCurve, CurveShape, MIN_VALUE};
use super::module::Modulator;
use crate::params::EnvelopeParams;

/// Glide used when sustain changes after the decay has finished
const SUSTAIN_GLIDE: f64 = 0.02;

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Never started
    Idle,
    /// Between `start` and `stop`
    Held,
    /// After `stop`
    Released,
}

/// ADSR envelope generator
#[derive(Debug, Clone)]
pub struct Envelope {
    curve: AutomationCurve,
    range: f64,

    amount: f64,
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,

    stage: EnvelopeStage,
    attack_end: f64,
    decay_end: f64,
    release_end: f64,
}

impl Envelope {
    /// Create an envelope whose full-scale output is `range`
    pub fn new(range: f64) -> Self {
        Self {
            curve: AutomationCurve::new(MIN_VALUE),
            range: range.max(MIN_VALUE),
            amount: 1.0,
            attack: MIN_VALUE,
            decay: MIN_VALUE,
            sustain: 1.0,
            release: MIN_VALUE,
            stage: EnvelopeStage::Idle,
            attack_end: 0.0,
            decay_end: 0.0,
            release_end: 0.0,
        }
    }

    /// Peak multiplier (0.0-1.0 of the range)
    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn attack(&self) -> f64 {
        self.attack
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn sustain(&self) -> f64 {
        self.sustain
    }

    pub fn release(&self) -> f64 {
        self.release
    }

    /// Full-scale output
    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Absolute time the release ramp reaches the floor (after `stop`)
    pub fn release_end(&self) -> Option<f64> {
        (self.stage == EnvelopeStage::Released).then_some(self.release_end)
    }

    pub fn set_amount(&mut self, amount: f64) {
        self.amount = if amount.is_finite() {
            amount.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Set attack time in seconds
    pub fn set_attack(&mut self, seconds: f64) {
        self.attack = floor_time(seconds);
    }

    /// Set decay time in seconds
    pub fn set_decay(&mut self, seconds: f64) {
        self.decay = floor_time(seconds);
    }

    /// Set release time in seconds
    pub fn set_release(&mut self, seconds: f64) {
        self.release = floor_time(seconds);
    }

    /// Set sustain level (floor-1.0).
    ///
    /// While attack or decay is in flight the decay ramp is re-issued towards
    /// the new level, keeping its original end time. Once decay has finished
    /// the level glides over a short fixed time.
    pub fn set_sustain(&mut self, level: f64, now: f64) {
        let level = if level.is_finite() {
            level.clamp(MIN_VALUE, 1.0)
        } else {
            MIN_VALUE
        };
        self.sustain = level;

        if self.stage != EnvelopeStage::Held {
            return;
        }

        if self.attack_end > now {
            self.curve.cancel_from(now);
            self.curve
                .ramp_until(1.0, self.attack_end, CurveShape::Linear, now);
            self.curve
                .ramp_until(level, self.decay_end, CurveShape::Exponential, now);
        } else if self.decay_end > now {
            self.curve.cancel_from(now);
            self.curve
                .ramp_until(level, self.decay_end, CurveShape::Exponential, now);
        } else {
            self.curve.cancel_from(now);
            self.curve
                .ramp_to(level, SUSTAIN_GLIDE, CurveShape::Exponential, now);
        }
    }

    /// Set all five parameters at once
    pub fn configure(&mut self, attack: f64, decay: f64, sustain: f64, release: f64, now: f64) {
        self.set_attack(attack);
        self.set_decay(decay);
        self.set_sustain(sustain, now);
        self.set_release(release);
    }

    /// Snapshot of every setting
    pub fn params(&self) -> EnvelopeParams {
        EnvelopeParams::adsr(self.amount, self.attack, self.decay, self.sustain, self.release)
    }

    /// Apply the fields present in `params` that differ from the current
    /// settings
    pub fn apply(&mut self, params: &EnvelopeParams, now: f64) {
        if let Some(amount) = params.amount.filter(|&v| v != self.amount) {
            self.set_amount(amount);
        }
        if let Some(attack) = params.attack.filter(|&v| v != self.attack) {
            self.set_attack(attack);
        }
        if let Some(decay) = params.decay.filter(|&v| v != self.decay) {
            self.set_decay(decay);
        }
        if let Some(sustain) = params.sustain.filter(|&v| v != self.sustain) {
            self.set_sustain(sustain, now);
        }
        if let Some(release) = params.release.filter(|&v| v != self.release) {
            self.set_release(release);
        }
    }

    /// Normalized contour (floor-1.0) at the last tick
    pub fn level(&self) -> f64 {
        self.curve.value()
    }

    /// Normalized contour at `time` without advancing
    pub fn level_at(&self, time: f64) -> f64 {
        self.curve.value_at(time)
    }

    /// Scaled output at the last tick
    pub fn output(&self) -> f64 {
        self.curve.value() * self.amount * self.range
    }

    /// Return to the idle floor without a ramp
    pub fn reset(&mut self) {
        self.curve.set_immediate(MIN_VALUE);
        self.stage = EnvelopeStage::Idle;
        self.attack_end = 0.0;
        self.decay_end = 0.0;
        self.release_end = 0.0;
    }
}

impl Modulator for Envelope {
    fn start(&mut self, now: f64) {
        self.curve.cancel_from(now);
        self.curve.set_immediate(MIN_VALUE);
        self.attack_end = now + self.attack;
        self.decay_end = self.attack_end + self.decay;
        self.curve.ramp_until(1.0, self.attack_end, CurveShape::Linear, now);
        self.curve
            .ramp_until(self.sustain, self.decay_end, CurveShape::Exponential, now);
        self.stage = EnvelopeStage::Held;
    }

    fn stop(&mut self, now: f64) {
        if self.stage != EnvelopeStage::Held {
            return;
        }
        self.curve.cancel_from(now);
        self.release_end = now + self.release;
        self.curve
            .ramp_until(MIN_VALUE, self.release_end, CurveShape::Exponential, now);
        self.stage = EnvelopeStage::Released;
    }

    fn tick(&mut self, time: f64) -> f64 {
        self.curve.tick(time) * self.amount * self.range
    }
}

fn floor_time(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(MIN_VALUE)
    } else {
        MIN_VALUE
    }
}
