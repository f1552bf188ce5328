//! Synthesis modules
//!
//! Automation curves, envelopes, oscillators with unison, filter, amplifier
//! and LFO. Each module holds its own parameters and renders one frame at a
//! time against the audio clock.

mod amplifier;
mod automation;
mod drive;
mod dynamics;
mod envelope;
mod filter;
mod lfo;
mod module;
mod osc_module;
mod oscillator;
mod unison;

pub use amplifier::AmplifierModule;
pub use automation::{AutomationCurve, CurveShape, MIN_VALUE};
pub use drive::{drive_curve, Drive, DRIVE_TABLE_SIZE};
pub use dynamics::{Limiter, LIMITER_RATIO, LIMITER_THRESHOLD_DB};
pub use envelope::{Envelope, EnvelopeStage};
pub use filter::{Biquad, FilterModule, FilterType, Slope, MAX_CUTOFF, MIN_CUTOFF, NEUTRAL_Q};
pub use lfo::{LfoModule, MAX_LFO_RATE, RATE_ENVELOPE_RANGE};
pub use module::{Enveloped, LfoInput, Modulator};
pub use osc_module::{OscillatorModule, LFO_FREQUENCY_RANGE, MAX_PITCH_OFFSET, PITCH_ENVELOPE_RANGE};
pub use oscillator::{Oscillator, Waveform};
pub use unison::{
    layout_member, normalize_size, unison_layout, UnisonMember, UnisonSet, MAX_UNISON,
    MAX_UNISON_DETUNE_CENTS, UNISON_FADE,
};
