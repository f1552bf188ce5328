//! Configuration schema definitions

use crate::engine::TeardownPolicy;
use crate::params::Patch;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for Modulo
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuloConfig {
    /// Audio output settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Master settings
    #[serde(default)]
    pub master: MasterConfig,

    /// Polyphony and voice teardown
    #[serde(default)]
    pub voices: VoicesConfig,

    /// MIDI input
    #[serde(default)]
    pub midi: MidiConfig,

    /// Computer keyboard input
    #[serde(default)]
    pub keyboard: KeyboardConfig,

    /// Initial patch; absent fields take the default patch values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

impl ModuloConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 192000 {
            bail!("Sample rate must be between 8000 and 192000");
        }
        if self.audio.block_size < 16 || self.audio.block_size > 4096 {
            bail!("Block size must be between 16 and 4096");
        }

        // Validate master settings
        if !(0.0..=1.0).contains(&self.master.volume) {
            bail!("Master volume must be between 0.0 and 1.0");
        }

        // Validate voice settings
        if self.voices.max_voices < 1 || self.voices.max_voices > 128 {
            bail!("max_voices must be between 1 and 128");
        }
        if !(self.voices.teardown_threshold > 0.0 && self.voices.teardown_threshold < 1.0) {
            bail!("teardown_threshold must be between 0.0 and 1.0 (exclusive)");
        }
        if !(self.voices.teardown_grace >= 0.0) {
            bail!("teardown_grace must not be negative");
        }
        if !(self.voices.teardown_timeout > 0.0) {
            bail!("teardown_timeout must be positive");
        }

        if self.keyboard.base_note > 127 - 29 {
            bail!("keyboard base_note must leave room for 30 keys (at most 98)");
        }
        if self.keyboard.velocity > 127 {
            bail!("keyboard velocity must be between 0 and 127");
        }

        Ok(())
    }

    /// The configured patch with every field filled in
    pub fn patch(&self) -> Patch {
        self.patch.unwrap_or_default().complete()
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 48000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frames per control block (default: 128). Commands and voice teardown
    /// are handled at block boundaries.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Output device name (None = default device)
    #[serde(default)]
    pub device: Option<String>,
}

fn default_sample_rate() -> u32 {
    48000
}
fn default_block_size() -> usize {
    128
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            device: None,
        }
    }
}

/// Master settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Master volume 0.0-1.0 (default: 0.8)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    0.8
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
        }
    }
}

/// Voice pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicesConfig {
    /// Size of the preallocated voice pool (default: 32)
    #[serde(default = "default_max_voices")]
    pub max_voices: usize,

    /// Envelope level below which a released voice is freed (default: 0.003)
    #[serde(default = "default_teardown_threshold")]
    pub teardown_threshold: f64,

    /// Seconds allowed past the release end before forcing teardown
    #[serde(default = "default_teardown_grace")]
    pub teardown_grace: f64,

    /// Longest a released voice may keep sounding, in seconds
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout: f64,
}

fn default_max_voices() -> usize {
    32
}
fn default_teardown_threshold() -> f64 {
    0.003
}
fn default_teardown_grace() -> f64 {
    0.25
}
fn default_teardown_timeout() -> f64 {
    30.0
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            max_voices: default_max_voices(),
            teardown_threshold: default_teardown_threshold(),
            teardown_grace: default_teardown_grace(),
            teardown_timeout: default_teardown_timeout(),
        }
    }
}

impl VoicesConfig {
    pub fn teardown_policy(&self) -> TeardownPolicy {
        TeardownPolicy {
            threshold: self.teardown_threshold,
            grace: self.teardown_grace,
            timeout: self.teardown_timeout,
        }
    }
}

/// MIDI input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Connect to a MIDI input port when available (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Substring of the port name to connect to (None = first port)
    #[serde(default)]
    pub port: Option<String>,

    /// Honour the sustain pedal, CC 64 (default: true)
    #[serde(default = "default_enabled")]
    pub sustain_pedal: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            sustain_pedal: true,
        }
    }
}

/// Computer keyboard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyboardConfig {
    /// MIDI note of the first key (default: 48)
    #[serde(default = "default_base_note")]
    pub base_note: u8,

    /// Velocity of keyboard notes (default: 127)
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_base_note() -> u8 {
    48
}
fn default_velocity() -> u8 {
    127
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            base_note: default_base_note(),
            velocity: default_velocity(),
        }
    }
}
