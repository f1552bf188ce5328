//! Basic oscillator implementation
//!
//! A phase accumulator whose frequency may change every sample, so pitch
//! modulation and portamento are applied by the caller.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Waveform types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Parse a waveform name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Some(Waveform::Sine),
            "square" | "sqr" => Some(Waveform::Square),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "triangle" | "tri" => Some(Waveform::Triangle),
            _ => None,
        }
    }
}

/// A basic oscillator that generates waveforms
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    /// Create a new oscillator
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Self {
            waveform,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Set the waveform
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Reset the phase
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Start at a given phase (0.0-1.0)
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
    }

    /// Generate the next sample at `frequency` Hz
    pub fn generate(&mut self, frequency: f64) -> f64 {
        let sample = match self.waveform {
            Waveform::Sine => (self.phase * 2.0 * PI).sin(),
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Triangle => {
                let p = self.phase;
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
        };

        // Negative frequencies (deep pitch modulation) run the phase backwards
        let step = if frequency.is_finite() {
            frequency / self.sample_rate
        } else {
            0.0
        };
        self.phase = (self.phase + step).rem_euclid(1.0);

        sample
    }
}
