//! Patch parameter containers
//!
//! Plain value objects exchanged with the UI panels and the preset manager.
//! Every field is optional: a container only carries the values the user
//! changed, and absent fields leave the receiving module untouched.

use crate::synth::{FilterType, Slope, Waveform};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope settings (times in seconds, levels 0.0-1.0)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sustain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<f64>,
}

impl EnvelopeParams {
    /// A fully populated envelope
    pub fn adsr(amount: f64, attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            amount: Some(amount),
            attack: Some(attack),
            decay: Some(decay),
            sustain: Some(sustain),
            release: Some(release),
        }
    }

    /// Fill absent fields from `defaults`
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            amount: self.amount.or(defaults.amount),
            attack: self.attack.or(defaults.attack),
            decay: self.decay.or(defaults.decay),
            sustain: self.sustain.or(defaults.sustain),
            release: self.release.or(defaults.release),
        }
    }
}

/// Unison settings (detune and spread in percent)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnisonParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detune: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

impl UnisonParams {
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            size: self.size.or(defaults.size),
            detune: self.detune.or(defaults.detune),
            spread: self.spread.or(defaults.spread),
        }
    }
}

/// Oscillator panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscillatorParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Waveform>,
    /// Cents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detune: Option<f64>,
    /// Semitones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfo_depth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unison: Option<UnisonParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portamento_on: Option<bool>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portamento_time: Option<f64>,
}

impl OscillatorParams {
    pub fn defaults() -> Self {
        Self {
            waveform: Some(Waveform::Sine),
            detune: Some(0.0),
            pitch_offset: Some(0.0),
            lfo_depth: Some(0.0),
            unison: Some(UnisonParams {
                size: Some(0),
                detune: Some(0.0),
                spread: Some(0.0),
            }),
            envelope: Some(EnvelopeParams::adsr(0.5, 0.0, 0.0, 0.0, 0.0)),
            portamento_on: Some(false),
            portamento_time: Some(0.0),
        }
    }

    pub fn or(self, defaults: &Self) -> Self {
        Self {
            waveform: self.waveform.or(defaults.waveform),
            detune: self.detune.or(defaults.detune),
            pitch_offset: self.pitch_offset.or(defaults.pitch_offset),
            lfo_depth: self.lfo_depth.or(defaults.lfo_depth),
            unison: merge(self.unison, defaults.unison, UnisonParams::or),
            envelope: merge(self.envelope, defaults.envelope, EnvelopeParams::or),
            portamento_on: self.portamento_on.or(defaults.portamento_on),
            portamento_time: self.portamento_time.or(defaults.portamento_time),
        }
    }
}

/// Filter panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<FilterType>,
    /// Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<f64>,
    /// Q
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resonance: Option<f64>,
    /// Peaking gain in dB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<Slope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfo_depth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeParams>,
}

impl FilterParams {
    pub fn defaults() -> Self {
        Self {
            filter_type: Some(FilterType::LowPass),
            cutoff: Some(20000.0),
            resonance: Some(0.707),
            gain_db: Some(0.0),
            slope: Some(Slope::Db12),
            drive: Some(0.0),
            lfo_depth: Some(0.0),
            envelope: Some(EnvelopeParams::adsr(0.0, 0.0, 0.0, 0.0, 0.0)),
        }
    }

    pub fn or(self, defaults: &Self) -> Self {
        Self {
            filter_type: self.filter_type.or(defaults.filter_type),
            cutoff: self.cutoff.or(defaults.cutoff),
            resonance: self.resonance.or(defaults.resonance),
            gain_db: self.gain_db.or(defaults.gain_db),
            slope: self.slope.or(defaults.slope),
            drive: self.drive.or(defaults.drive),
            lfo_depth: self.lfo_depth.or(defaults.lfo_depth),
            envelope: merge(self.envelope, defaults.envelope, EnvelopeParams::or),
        }
    }
}

/// Amplifier panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplifierParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<EnvelopeParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfo_depth: Option<f64>,
}

impl AmplifierParams {
    pub fn defaults() -> Self {
        Self {
            envelope: Some(EnvelopeParams::adsr(0.5, 0.0, 0.0, 1.0, 0.0)),
            lfo_depth: Some(0.0),
        }
    }

    pub fn or(self, defaults: &Self) -> Self {
        Self {
            envelope: merge(self.envelope, defaults.envelope, EnvelopeParams::or),
            lfo_depth: self.lfo_depth.or(defaults.lfo_depth),
        }
    }
}

/// LFO panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LfoParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Waveform>,
    /// Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_envelope: Option<EnvelopeParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amp_envelope: Option<EnvelopeParams>,
}

impl LfoParams {
    pub fn defaults() -> Self {
        Self {
            waveform: Some(Waveform::Sine),
            rate: Some(5.0),
            rate_envelope: Some(EnvelopeParams::adsr(0.0, 0.0, 0.0, 1.0, 0.0)),
            amp_envelope: Some(EnvelopeParams::adsr(0.5, 0.0, 0.0, 1.0, 0.0)),
        }
    }

    pub fn or(self, defaults: &Self) -> Self {
        Self {
            waveform: self.waveform.or(defaults.waveform),
            rate: self.rate.or(defaults.rate),
            rate_envelope: merge(self.rate_envelope, defaults.rate_envelope, EnvelopeParams::or),
            amp_envelope: merge(self.amp_envelope, defaults.amp_envelope, EnvelopeParams::or),
        }
    }
}

fn merge<T: Copy>(value: Option<T>, defaults: Option<T>, f: impl Fn(T, &T) -> T) -> Option<T> {
    match (value, defaults) {
        (Some(v), Some(d)) => Some(f(v, &d)),
        (v, d) => v.or(d),
    }
}

/// Discriminator naming a container kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Discriminator {
    OscillatorParams,
    FilterParams,
    AmplifierParams,
    #[serde(rename = "LFOParams")]
    LfoParams,
}

impl Discriminator {
    pub const ALL: [Discriminator; 4] = [
        Discriminator::OscillatorParams,
        Discriminator::FilterParams,
        Discriminator::AmplifierParams,
        Discriminator::LfoParams,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Discriminator::OscillatorParams => "OscillatorParams",
            Discriminator::FilterParams => "FilterParams",
            Discriminator::AmplifierParams => "AmplifierParams",
            Discriminator::LfoParams => "LFOParams",
        }
    }

    /// Human readable panel name, e.g. "oscillator parameters"
    pub fn label(&self) -> &'static str {
        match self {
            Discriminator::OscillatorParams => "oscillator parameters",
            Discriminator::FilterParams => "filter parameters",
            Discriminator::AmplifierParams => "amplifier parameters",
            Discriminator::LfoParams => "lfo parameters",
        }
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parameter container tagged with its discriminator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "discriminator")]
pub enum ParamContainer {
    #[serde(rename = "OscillatorParams")]
    Oscillator(OscillatorParams),
    #[serde(rename = "FilterParams")]
    Filter(FilterParams),
    #[serde(rename = "AmplifierParams")]
    Amplifier(AmplifierParams),
    #[serde(rename = "LFOParams")]
    Lfo(LfoParams),
}

impl ParamContainer {
    pub fn discriminator(&self) -> Discriminator {
        match self {
            ParamContainer::Oscillator(_) => Discriminator::OscillatorParams,
            ParamContainer::Filter(_) => Discriminator::FilterParams,
            ParamContainer::Amplifier(_) => Discriminator::AmplifierParams,
            ParamContainer::Lfo(_) => Discriminator::LfoParams,
        }
    }

    /// Fill absent fields from `defaults` when both carry the same kind
    pub fn or(self, defaults: &ParamContainer) -> Self {
        match (self, defaults) {
            (ParamContainer::Oscillator(p), ParamContainer::Oscillator(d)) => {
                ParamContainer::Oscillator(p.or(d))
            }
            (ParamContainer::Filter(p), ParamContainer::Filter(d)) => ParamContainer::Filter(p.or(d)),
            (ParamContainer::Amplifier(p), ParamContainer::Amplifier(d)) => {
                ParamContainer::Amplifier(p.or(d))
            }
            (ParamContainer::Lfo(p), ParamContainer::Lfo(d)) => ParamContainer::Lfo(p.or(d)),
            (p, _) => p,
        }
    }
}

/// A complete patch: one container per module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Patch {
    pub oscillator: OscillatorParams,
    pub filter: FilterParams,
    pub amplifier: AmplifierParams,
    pub lfo: LfoParams,
}

impl Default for Patch {
    fn default() -> Self {
        Self {
            oscillator: OscillatorParams::defaults(),
            filter: FilterParams::defaults(),
            amplifier: AmplifierParams::defaults(),
            lfo: LfoParams::defaults(),
        }
    }
}

impl Patch {
    /// Fill every absent field from the default patch
    pub fn complete(self) -> Self {
        let defaults = Patch::default();
        Self {
            oscillator: self.oscillator.or(&defaults.oscillator),
            filter: self.filter.or(&defaults.filter),
            amplifier: self.amplifier.or(&defaults.amplifier),
            lfo: self.lfo.or(&defaults.lfo),
        }
    }

    /// The patch as four tagged containers
    pub fn containers(&self) -> [ParamContainer; 4] {
        [
            ParamContainer::Oscillator(self.oscillator),
            ParamContainer::Filter(self.filter),
            ParamContainer::Amplifier(self.amplifier),
            ParamContainer::Lfo(self.lfo),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_uses_discriminator_tag() {
        let container = ParamContainer::Lfo(LfoParams {
            rate: Some(2.0),
            ..Default::default()
        });
        let json = serde_json::to_string(&container).unwrap();
        assert_eq!(json, r#"{"discriminator":"LFOParams","rate":2.0}"#);
    }

    #[test]
    fn test_partial_container_parses() {
        let json = r#"{"discriminator":"OscillatorParams","unison":{"size":6}}"#;
        let container: ParamContainer = serde_json::from_str(json).unwrap();
        match container {
            ParamContainer::Oscillator(p) => {
                assert_eq!(p.unison.and_then(|u| u.size), Some(6));
                assert_eq!(p.waveform, None);
            }
            other => panic!("unexpected container {:?}", other),
        }
    }

    #[test]
    fn test_unknown_discriminator_is_rejected() {
        let json = r#"{"discriminator":"ReverbParams"}"#;
        assert!(serde_json::from_str::<ParamContainer>(json).is_err());
    }

    #[test]
    fn test_filter_type_field_name() {
        let yaml = "type: highpass\nslope: -24dB\n";
        let params: FilterParams = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.filter_type, Some(FilterType::HighPass));
        assert_eq!(params.slope, Some(Slope::Db24));
    }

    #[test]
    fn test_or_fills_only_absent_fields() {
        let partial = OscillatorParams {
            detune: Some(12.0),
            envelope: Some(EnvelopeParams {
                attack: Some(0.3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let full = partial.or(&OscillatorParams::defaults());

        assert_eq!(full.detune, Some(12.0));
        assert_eq!(full.waveform, Some(Waveform::Sine));
        let env = full.envelope.unwrap_or_default();
        assert_eq!(env.attack, Some(0.3));
        assert_eq!(env.amount, Some(0.5));
    }

    #[test]
    fn test_patch_complete_from_yaml() {
        let yaml = "oscillator:\n  waveform: sawtooth\n";
        let patch: Patch = serde_yaml::from_str(yaml).unwrap();
        let patch = patch.complete();
        assert_eq!(patch.oscillator.waveform, Some(Waveform::Sawtooth));
        assert_eq!(patch.filter.cutoff, Some(20000.0));
    }

    #[test]
    fn test_discriminator_display() {
        assert_eq!(Discriminator::LfoParams.to_string(), "LFOParams");
        assert_eq!(Discriminator::FilterParams.label(), "filter parameters");
    }
}
