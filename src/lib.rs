//! Modulo - a polyphonic subtractive synthesizer
//!
//! Each note gets a voice built from an oscillator with unison, a filter,
//! an amplifier and an LFO, all driven by sample-accurate automation
//! curves. Voices come from a fixed pool and go back to it once their
//! release has died away.

pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod preset;
pub mod synth;
pub mod viz;

pub use config::ModuloConfig;
pub use engine::{Engine, SynthHandle};
pub use error::{SynthError, SynthResult};
pub use params::{Discriminator, ParamContainer, Patch};
pub use preset::PresetManager;
