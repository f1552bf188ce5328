//! Per-note voice
//!
//! One complete oscillator, filter, amplifier chain with its own LFO. Voices
//! live in a preallocated pool and are re-prepared from the template modules
//! for every note.

use crate::params::ParamContainer;
use crate::synth::{
    AmplifierModule, Enveloped, FilterModule, LfoModule, Modulator, OscillatorModule,
};

/// Seconds over which the last output of a recycled voice fades out under
/// the new note
pub const HANDOVER_FADE: f64 = 0.005;

/// Lifecycle of a pooled voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// In the pool, not rendered
    Idle,
    /// Note held
    Sounding,
    /// Note released, tail still audible
    Releasing,
}

/// One instance of each module. Used both for the live-edited template
/// patch and inside every voice.
#[derive(Debug, Clone)]
pub struct ModuleSet {
    pub oscillator: OscillatorModule,
    pub filter: FilterModule,
    pub amplifier: AmplifierModule,
    pub lfo: LfoModule,
}

impl ModuleSet {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            oscillator: OscillatorModule::new(sample_rate),
            filter: FilterModule::new(sample_rate),
            amplifier: AmplifierModule::new(sample_rate),
            lfo: LfoModule::new(sample_rate),
        }
    }

    /// Apply a partial container to the matching module
    pub fn apply(&mut self, container: &ParamContainer, now: f64) {
        match container {
            ParamContainer::Oscillator(p) => self.oscillator.apply(p, now),
            ParamContainer::Filter(p) => self.filter.apply(p, now),
            ParamContainer::Amplifier(p) => self.amplifier.apply(p, now),
            ParamContainer::Lfo(p) => self.lfo.apply(p, now),
        }
    }
}

/// A voice in the pool
#[derive(Debug, Clone)]
pub struct Voice {
    modules: ModuleSet,
    state: VoiceState,
    note: u8,
    /// Allocation order, for stealing the oldest voice
    serial: u64,
    started_at: f64,
    released_at: f64,
    last_out: [f64; 2],
    /// Output of the previous note at takeover, faded out linearly
    handover: [f64; 2],
    handover_frames: u32,
    handover_left: u32,
}

impl Voice {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            modules: ModuleSet::new(sample_rate),
            state: VoiceState::Idle,
            note: 0,
            serial: 0,
            started_at: 0.0,
            released_at: 0.0,
            last_out: [0.0; 2],
            handover: [0.0; 2],
            handover_frames: (HANDOVER_FADE * sample_rate).round().max(1.0) as u32,
            handover_left: 0,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    /// Time of the note-off, once released
    pub fn released_at(&self) -> Option<f64> {
        (self.state == VoiceState::Releasing).then_some(self.released_at)
    }

    pub fn modules(&self) -> &ModuleSet {
        &self.modules
    }

    pub fn oscillator(&self) -> &OscillatorModule {
        &self.modules.oscillator
    }

    pub fn filter(&self) -> &FilterModule {
        &self.modules.filter
    }

    pub fn amplifier(&self) -> &AmplifierModule {
        &self.modules.amplifier
    }

    pub fn lfo(&self) -> &LfoModule {
        &self.modules.lfo
    }

    /// Amplifier envelope contour at the last rendered frame
    pub fn level(&self) -> f64 {
        self.modules.amplifier.level()
    }

    /// When the amplifier's release ramp reaches the floor
    pub fn release_end(&self) -> Option<f64> {
        self.modules.amplifier.envelope().release_end()
    }

    /// Copy the template patch into this voice, starting the oscillator at
    /// `start_frequency`
    pub fn prepare(
        &mut self,
        templates: &ModuleSet,
        note: u8,
        velocity: f64,
        start_frequency: f64,
        serial: u64,
    ) {
        self.modules
            .oscillator
            .prepare_from(&templates.oscillator, start_frequency);
        self.modules.filter.prepare_from(&templates.filter);
        self.modules
            .amplifier
            .prepare_from(&templates.amplifier, velocity);
        self.modules.lfo.prepare_from(&templates.lfo);
        self.note = note;
        self.serial = serial;
    }

    /// Glide or jump to the note frequency
    pub fn set_frequency(&mut self, hz: f64, now: f64) {
        self.modules.oscillator.set_frequency(hz, now);
    }

    /// Start every envelope and the LFO
    pub fn start(&mut self, now: f64) {
        self.modules.oscillator.start(now);
        self.modules.filter.start(now);
        self.modules.amplifier.start(now);
        self.modules.lfo.start(now);
        self.state = VoiceState::Sounding;
        self.started_at = now;
    }

    /// Release every envelope and the LFO. Only the first call has an effect.
    pub fn release(&mut self, now: f64) {
        if self.state != VoiceState::Sounding {
            return;
        }
        self.modules.oscillator.stop(now);
        self.modules.filter.stop(now);
        self.modules.amplifier.stop(now);
        self.modules.lfo.stop(now);
        self.state = VoiceState::Releasing;
        self.released_at = now;
    }

    /// Return to the pool
    pub fn free(&mut self) {
        self.state = VoiceState::Idle;
        self.last_out = [0.0; 2];
        self.handover_left = 0;
    }

    /// Return to the pool for immediate reuse. The output at the cut is
    /// carried into the next note and faded out over [`HANDOVER_FADE`].
    pub fn take_over(&mut self) {
        let out = self.last_out;
        self.free();
        if out != [0.0; 2] {
            self.handover = out;
            self.handover_left = self.handover_frames;
        }
    }

    /// Frames left of a takeover fade
    pub fn handover_left(&self) -> u32 {
        self.handover_left
    }

    pub fn apply(&mut self, container: &ParamContainer, now: f64) {
        self.modules.apply(container, now);
    }

    /// Render one stereo frame at `time`
    pub fn render(&mut self, time: f64) -> [f64; 2] {
        if self.state == VoiceState::Idle {
            return [0.0; 2];
        }
        let m = &mut self.modules;
        let lfo = m.lfo.tick(time);
        let tone = m.oscillator.render(time, lfo);
        let shaped = m.filter.process(tone, time, lfo);
        let mut out = m.amplifier.process(shaped, time, lfo);
        self.last_out = out;

        if self.handover_left > 0 {
            let gain = self.handover_left as f64 / self.handover_frames as f64;
            out[0] += self.handover[0] * gain;
            out[1] += self.handover[1] * gain;
            self.handover_left -= 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{AmplifierParams, EnvelopeParams};

    const SR: f64 = 48000.0;

    fn render_until(voice: &mut Voice, from: f64, to: f64) -> f64 {
        let mut peak = 0.0f64;
        let mut n = (from * SR).round() as u64;
        while (n as f64) / SR < to {
            let [l, r] = voice.render(n as f64 / SR);
            peak = peak.max(l.abs()).max(r.abs());
            n += 1;
        }
        peak
    }

    #[test]
    fn test_idle_voice_is_silent() {
        let mut voice = Voice::new(SR);
        assert_eq!(voice.render(0.0), [0.0, 0.0]);
    }

    #[test]
    fn test_sounding_voice_produces_audio() {
        let templates = ModuleSet::new(SR);
        let mut voice = Voice::new(SR);
        voice.prepare(&templates, 69, 1.0, 440.0, 1);
        voice.start(0.0);
        assert_eq!(voice.state(), VoiceState::Sounding);
        assert!(render_until(&mut voice, 0.0, 0.05) > 0.1);
    }

    #[test]
    fn test_release_then_tail_decays() {
        let mut templates = ModuleSet::new(SR);
        templates.apply(
            &ParamContainer::Amplifier(AmplifierParams {
                envelope: Some(EnvelopeParams::adsr(0.5, 0.001, 0.001, 1.0, 0.05)),
                lfo_depth: None,
            }),
            0.0,
        );
        let mut voice = Voice::new(SR);
        voice.prepare(&templates, 60, 1.0, 261.6, 1);
        voice.start(0.0);
        render_until(&mut voice, 0.0, 0.02);

        voice.release(0.02);
        assert_eq!(voice.state(), VoiceState::Releasing);
        assert_eq!(voice.released_at(), Some(0.02));
        assert!(voice.level() > 0.5);

        render_until(&mut voice, 0.02, 0.2);
        assert!(voice.level() < 0.003);
    }

    #[test]
    fn test_take_over_fades_previous_output() {
        let templates = ModuleSet::new(SR);
        let mut voice = Voice::new(SR);
        voice.prepare(&templates, 69, 1.0, 440.0, 1);
        voice.start(0.0);
        render_until(&mut voice, 0.0, 0.05);

        voice.take_over();
        assert_eq!(voice.state(), VoiceState::Idle);
        assert_eq!(voice.handover_left(), (HANDOVER_FADE * SR) as u32);

        voice.prepare(&templates, 72, 1.0, 523.3, 2);
        voice.start(0.06);
        render_until(&mut voice, 0.06, 0.06 + HANDOVER_FADE * 2.0);
        assert_eq!(voice.handover_left(), 0);
    }

    #[test]
    fn test_free_drops_handover() {
        let templates = ModuleSet::new(SR);
        let mut voice = Voice::new(SR);
        voice.prepare(&templates, 69, 1.0, 440.0, 1);
        voice.start(0.0);
        render_until(&mut voice, 0.0, 0.05);
        voice.free();
        voice.take_over();
        assert_eq!(voice.handover_left(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let templates = ModuleSet::new(SR);
        let mut voice = Voice::new(SR);
        voice.prepare(&templates, 60, 1.0, 261.6, 1);
        voice.start(0.0);
        voice.release(0.1);
        let end = voice.release_end();
        voice.release(0.2);
        assert_eq!(voice.released_at(), Some(0.1));
        assert_eq!(voice.release_end(), end);
    }
}
