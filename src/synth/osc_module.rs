//! Oscillator module
//!
//! The main oscillator plus its unison set, driven by a frequency curve that
//! carries portamento glides. A pitch envelope and the LFO add to the
//! frequency in Hz before the detune ratio is applied.

use super::automation::{AutomationCurve, CurveShape, MIN_VALUE};
use super::envelope::Envelope;
use super::module::{clamp_depth, Enveloped, LfoInput, Modulator};
use super::oscillator::{Oscillator, Waveform};
use super::unison::UnisonSet;
use crate::params::{OscillatorParams, UnisonParams};

/// Full-scale output of the pitch envelope, in Hz
pub const PITCH_ENVELOPE_RANGE: f64 = 1000.0;

/// Frequency swing of the LFO at full depth, in Hz
pub const LFO_FREQUENCY_RANGE: f64 = 400.0;

/// Largest pitch offset, in semitones
pub const MAX_PITCH_OFFSET: f64 = 48.0;

const MAX_DETUNE_CENTS: f64 = 1200.0;

/// Oscillator with unison, pitch envelope and portamento
#[derive(Debug, Clone)]
pub struct OscillatorModule {
    osc: Oscillator,
    unison: UnisonSet,
    frequency: AutomationCurve,
    envelope: Envelope,

    /// Frequency before the pitch offset
    note_frequency: f64,
    detune: f64,
    detune_ratio: f64,
    pitch_offset: f64,
    lfo_depth: f64,
    portamento_on: bool,
    portamento_time: f64,
}

impl OscillatorModule {
    pub fn new(sample_rate: f64) -> Self {
        let mut envelope = Envelope::new(PITCH_ENVELOPE_RANGE);
        envelope.set_amount(0.5);
        envelope.set_sustain(MIN_VALUE, 0.0);
        Self {
            osc: Oscillator::new(Waveform::Sine, sample_rate),
            unison: UnisonSet::new(sample_rate),
            frequency: AutomationCurve::new(440.0),
            envelope,
            note_frequency: 440.0,
            detune: 0.0,
            detune_ratio: 1.0,
            pitch_offset: 0.0,
            lfo_depth: 0.0,
            portamento_on: false,
            portamento_time: 0.0,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.osc.waveform()
    }

    /// Note frequency most recently requested, before the pitch offset
    pub fn frequency(&self) -> f64 {
        self.note_frequency
    }

    /// Base frequency (pitch offset included) at `time`
    pub fn frequency_at(&self, time: f64) -> f64 {
        self.frequency.value_at(time)
    }

    /// Detune in cents
    pub fn detune(&self) -> f64 {
        self.detune
    }

    /// Pitch offset in whole semitones
    pub fn pitch_offset(&self) -> f64 {
        self.pitch_offset
    }

    pub fn portamento_on(&self) -> bool {
        self.portamento_on
    }

    pub fn portamento_time(&self) -> f64 {
        self.portamento_time
    }

    pub fn unison(&self) -> &UnisonSet {
        &self.unison
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.osc.set_waveform(waveform);
        self.unison.set_waveform(waveform);
    }

    pub fn set_detune(&mut self, cents: f64) {
        self.detune = if cents.is_finite() {
            cents.clamp(-MAX_DETUNE_CENTS, MAX_DETUNE_CENTS)
        } else {
            0.0
        };
        self.detune_ratio = 2f64.powf(self.detune / 1200.0);
    }

    /// Set the pitch offset; fractional semitones are rounded
    pub fn set_pitch_offset(&mut self, semitones: f64, now: f64) {
        self.pitch_offset = if semitones.is_finite() {
            semitones.round().clamp(-MAX_PITCH_OFFSET, MAX_PITCH_OFFSET)
        } else {
            0.0
        };
        let target = self.offset_frequency(self.note_frequency);
        self.frequency.cancel_from(now);
        self.frequency.set_immediate(target);
    }

    pub fn set_portamento(&mut self, on: bool, seconds: f64) {
        self.portamento_on = on;
        self.portamento_time = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
    }

    /// Move to a new note frequency, gliding when portamento is on
    pub fn set_frequency(&mut self, hz: f64, now: f64) {
        self.note_frequency = sanitize_frequency(hz);
        let target = self.offset_frequency(self.note_frequency);
        if self.portamento_on {
            self.frequency.cancel_from(now);
            self.frequency
                .ramp_to(target, self.portamento_time, CurveShape::Exponential, now);
        } else {
            self.frequency.set_immediate(target);
        }
    }

    /// Jump to a frequency regardless of portamento
    pub fn jump_to_frequency(&mut self, hz: f64) {
        self.note_frequency = sanitize_frequency(hz);
        let target = self.offset_frequency(self.note_frequency);
        self.frequency.set_immediate(target);
    }

    pub fn set_unison_size(&mut self, size: usize, now: f64) {
        self.unison.set_size(size, now);
    }

    pub fn set_unison_detune(&mut self, percent: f64) {
        self.unison.set_detune(percent);
    }

    pub fn set_unison_spread(&mut self, percent: f64) {
        self.unison.set_spread(percent);
    }

    /// Snapshot of every setting
    pub fn params(&self) -> OscillatorParams {
        OscillatorParams {
            waveform: Some(self.waveform()),
            detune: Some(self.detune),
            pitch_offset: Some(self.pitch_offset),
            lfo_depth: Some(self.lfo_depth),
            unison: Some(UnisonParams {
                size: Some(self.unison.size()),
                detune: Some(self.unison.detune()),
                spread: Some(self.unison.spread()),
            }),
            envelope: Some(self.envelope.params()),
            portamento_on: Some(self.portamento_on),
            portamento_time: Some(self.portamento_time),
        }
    }

    /// Apply the fields present in `params` that differ from the current
    /// settings
    pub fn apply(&mut self, params: &OscillatorParams, now: f64) {
        if let Some(waveform) = params.waveform.filter(|&w| w != self.waveform()) {
            self.set_waveform(waveform);
        }
        if let Some(detune) = params.detune.filter(|&d| d != self.detune) {
            self.set_detune(detune);
        }
        if let Some(offset) = params.pitch_offset.filter(|&o| o != self.pitch_offset) {
            self.set_pitch_offset(offset, now);
        }
        if let Some(depth) = params.lfo_depth.filter(|&d| d != self.lfo_depth) {
            self.set_lfo_depth(depth);
        }
        if let Some(unison) = &params.unison {
            if let Some(detune) = unison.detune.filter(|&d| d != self.unison.detune()) {
                self.set_unison_detune(detune);
            }
            if let Some(spread) = unison.spread.filter(|&s| s != self.unison.spread()) {
                self.set_unison_spread(spread);
            }
            if let Some(size) = unison.size.filter(|&s| s != self.unison.size()) {
                self.set_unison_size(size, now);
            }
        }
        if let Some(envelope) = &params.envelope {
            self.envelope.apply(envelope, now);
        }
        let on = params.portamento_on.unwrap_or(self.portamento_on);
        let time = params.portamento_time.unwrap_or(self.portamento_time);
        if on != self.portamento_on || time != self.portamento_time {
            self.set_portamento(on, time);
        }
    }

    /// Take on every setting of `template` and start from `frequency` with
    /// fresh phases. Used to prepare a voice for a new note.
    pub fn prepare_from(&mut self, template: &OscillatorModule, frequency: f64) {
        self.set_waveform(template.waveform());
        self.set_detune(template.detune);
        self.pitch_offset = template.pitch_offset;
        self.lfo_depth = template.lfo_depth;
        self.set_portamento(template.portamento_on, template.portamento_time);
        self.unison.reset(
            template.unison.size(),
            template.unison.detune(),
            template.unison.spread(),
        );
        self.envelope.reset();
        self.envelope.apply(&template.envelope.params(), 0.0);
        self.osc.reset();
        self.jump_to_frequency(frequency);
    }

    /// Render one stereo frame at `time`, with `lfo` in -1.0..1.0
    pub fn render(&mut self, time: f64, lfo: f64) -> [f64; 2] {
        let pitch = self.envelope.tick(time);
        let base = self.frequency.tick(time);
        let hz = (base + pitch + lfo * self.lfo_depth * LFO_FREQUENCY_RANGE) * self.detune_ratio;

        let main = self.osc.generate(hz);
        let [left, right] = self.unison.render(hz, time);
        [main + left, main + right]
    }

    fn offset_frequency(&self, hz: f64) -> f64 {
        hz * 2f64.powf(self.pitch_offset / 12.0)
    }
}

fn sanitize_frequency(hz: f64) -> f64 {
    if hz.is_finite() && hz > 0.0 {
        hz
    } else {
        MIN_VALUE
    }
}

impl Enveloped for OscillatorModule {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }
}

impl LfoInput for OscillatorModule {
    fn lfo_depth(&self) -> f64 {
        self.lfo_depth
    }

    fn set_lfo_depth(&mut self, depth: f64) {
        self.lfo_depth = clamp_depth(depth);
    }
}

impl Modulator for OscillatorModule {
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

    const SR: f64 = 48000.0;

    #[test]
    fn test_frequency_jumps_without_portamento() {
        let mut module = OscillatorModule::new(SR);
        module.set_frequency(220.0, 0.0);
        assert_eq!(module.frequency_at(0.0), 220.0);
    }

    #[test]
    fn test_portamento_glides_exponentially() {
        let mut module = OscillatorModule::new(SR);
        module.jump_to_frequency(220.0);
        module.set_portamento(true, 0.1);
        module.set_frequency(440.0, 1.0);

        assert!((module.frequency_at(1.0) - 220.0).abs() < 1e-9);
        // halfway through an octave glide is the geometric mean
        let mid = module.frequency_at(1.05);
        assert!((mid - 220.0 * 2f64.sqrt()).abs() < 1e-6, "got {}", mid);
        assert!((module.frequency_at(1.1) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_note_mid_glide_starts_from_current_pitch() {
        let mut module = OscillatorModule::new(SR);
        module.jump_to_frequency(220.0);
        module.set_portamento(true, 0.2);
        module.set_frequency(880.0, 0.0);
        let at = module.frequency_at(0.1);

        module.set_frequency(440.0, 0.1);
        assert!((module.frequency_at(0.1) - at).abs() < 1e-9);
        assert!((module.frequency_at(0.3) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_offset_rounds_and_clamps() {
        let mut module = OscillatorModule::new(SR);
        module.set_frequency(440.0, 0.0);

        module.set_pitch_offset(11.6, 0.0);
        assert_eq!(module.pitch_offset(), 12.0);
        assert!((module.frequency_at(0.0) - 880.0).abs() < 1e-9);

        module.set_pitch_offset(-100.0, 0.0);
        assert_eq!(module.pitch_offset(), -48.0);
    }

    #[test]
    fn test_apply_changes_only_present_fields() {
        let mut module = OscillatorModule::new(SR);
        module.set_detune(7.0);
        module.apply(
            &OscillatorParams {
                waveform: Some(Waveform::Square),
                ..Default::default()
            },
            0.0,
        );
        assert_eq!(module.waveform(), Waveform::Square);
        assert_eq!(module.detune(), 7.0);
    }

    #[test]
    fn test_params_round_trip_through_apply() {
        let mut source = OscillatorModule::new(SR);
        source.apply(
            &OscillatorParams {
                waveform: Some(Waveform::Sawtooth),
                detune: Some(-5.0),
                unison: Some(UnisonParams {
                    size: Some(4),
                    detune: Some(30.0),
                    spread: Some(80.0),
                }),
                portamento_on: Some(true),
                portamento_time: Some(0.25),
                ..Default::default()
            },
            0.0,
        );

        let mut target = OscillatorModule::new(SR);
        target.apply(&source.params(), 0.0);
        assert_eq!(target.params(), source.params());
    }

    #[test]
    fn test_prepare_from_copies_template() {
        let mut template = OscillatorModule::new(SR);
        template.set_waveform(Waveform::Triangle);
        template.set_unison_detune(40.0);
        template.set_unison_size(6, 0.0);
        template.set_portamento(true, 0.3);

        let mut voice = OscillatorModule::new(SR);
        voice.prepare_from(&template, 330.0);
        assert_eq!(voice.waveform(), Waveform::Triangle);
        assert_eq!(voice.unison().size(), 6);
        assert_eq!(voice.unison().retiring_slots(), 0);
        assert!(voice.portamento_on());
        assert_eq!(voice.frequency_at(0.0), 330.0);
    }

    #[test]
    fn test_lfo_depth_clamped() {
        let mut module = OscillatorModule::new(SR);
        module.set_lfo_depth(3.0);
        assert_eq!(module.lfo_depth(), 1.0);
    }

    #[test]
    fn test_render_is_finite() {
        let mut module = OscillatorModule::new(SR);
        module.set_unison_size(4, 0.0);
        module.set_lfo_depth(1.0);
        module.start(0.0);
        for n in 0..1024 {
            let t = n as f64 / SR;
            let [l, r] = module.render(t, (t * 30.0).sin());
            assert!(l.is_finite() && r.is_finite());
        }
    }
}
