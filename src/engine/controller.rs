//! Voice controller
//!
//! Owns the template modules that reflect the live-edited patch and a fixed
//! pool of voices. Note-on prepares a pooled voice from the templates, note-off
//! releases it, and [`VoiceController::collect`] returns released voices to
//! the pool once their tail has died away. Only called from the render thread,
//! between blocks.

use super::voice::{ModuleSet, Voice, VoiceState};
use crate::params::{Discriminator, ParamContainer};
use tracing::{trace, warn};

/// Notes addressable by MIDI
pub const NOTE_COUNT: usize = 128;

/// Equal-tempered frequency of a MIDI note (A4 = note 69 = 440 Hz)
pub fn note_to_frequency(note: u8) -> f64 {
    440.0 * 2f64.powf((note as f64 - 69.0) / 12.0)
}

/// Glide settings carried by a note event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Portamento {
    pub on: bool,
    /// Seconds
    pub time: f64,
}

/// A note-on event from the keyboard or MIDI input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub note: u8,
    /// 0-127
    pub velocity: u8,
    pub portamento: Option<Portamento>,
}

impl NoteEvent {
    pub fn new(note: u8, velocity: u8) -> Self {
        Self {
            note,
            velocity,
            portamento: None,
        }
    }
}

/// When a released voice may be returned to the pool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeardownPolicy {
    /// Amplifier envelope level below which the tail is inaudible
    pub threshold: f64,
    /// Extra time allowed after the release ramp should have ended
    pub grace: f64,
    /// Longest a released voice may keep its slot
    pub timeout: f64,
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.003,
            grace: 0.25,
            timeout: 30.0,
        }
    }
}

/// Polyphonic voice allocator
pub struct VoiceController {
    templates: ModuleSet,
    voices: Vec<Voice>,
    notes: [Option<usize>; NOTE_COUNT],
    releasing: Vec<usize>,
    policy: TeardownPolicy,
    last_frequency: Option<f64>,
    serial: u64,
}

impl VoiceController {
    /// Create a controller with `max_voices` preallocated voices
    pub fn new(sample_rate: f64, max_voices: usize, policy: TeardownPolicy) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            templates: ModuleSet::new(sample_rate),
            voices: (0..max_voices).map(|_| Voice::new(sample_rate)).collect(),
            notes: [None; NOTE_COUNT],
            releasing: Vec::with_capacity(max_voices),
            policy,
            last_frequency: None,
            serial: 0,
        }
    }

    /// The live-edited patch
    pub fn templates(&self) -> &ModuleSet {
        &self.templates
    }

    pub fn policy(&self) -> TeardownPolicy {
        self.policy
    }

    pub fn max_voices(&self) -> usize {
        self.voices.len()
    }

    /// Voices currently held by a note
    pub fn sounding_count(&self) -> usize {
        self.notes.iter().filter(|n| n.is_some()).count()
    }

    /// Released voices whose tail is still playing
    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    /// Voices not in the pool
    pub fn active_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.state() != VoiceState::Idle)
            .count()
    }

    pub fn has_voice(&self, note: u8) -> bool {
        self.slot_for(note).is_some()
    }

    /// The voice mapped to `note`
    pub fn voice(&self, note: u8) -> Option<&Voice> {
        self.slot_for(note).map(|i| &self.voices[i])
    }

    /// Notes with a mapped voice, in ascending order
    pub fn held_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.notes
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .map(|(n, _)| n as u8)
    }

    /// Voices in the releasing phase
    pub fn releasing_voices(&self) -> impl Iterator<Item = &Voice> + '_ {
        self.releasing.iter().map(move |&i| &self.voices[i])
    }

    /// Start a note. A note that already has a voice is left alone.
    pub fn note_on(&mut self, event: NoteEvent, now: f64) -> bool {
        let note = event.note.min((NOTE_COUNT - 1) as u8);
        if self.notes[note as usize].is_some() {
            trace!(note, "note already sounding");
            return false;
        }
        if let Some(p) = event.portamento {
            self.set_portamento(p.on, p.time);
        }

        let index = self.allocate(now);
        let frequency = note_to_frequency(note);
        let glide = self.templates.oscillator.portamento_on();
        let start = match self.last_frequency {
            Some(previous) if glide => previous,
            _ => frequency,
        };
        let velocity = event.velocity.min(127) as f64 / 127.0;

        self.serial += 1;
        let voice = &mut self.voices[index];
        voice.prepare(&self.templates, note, velocity, start, self.serial);
        voice.set_frequency(frequency, now);
        voice.start(now);

        self.notes[note as usize] = Some(index);
        self.last_frequency = Some(frequency);
        trace!(note, voice = index, "note on");
        true
    }

    /// Release a note. Its voice leaves the note map at once and keeps
    /// sounding until [`collect`](Self::collect) frees it.
    pub fn note_off(&mut self, note: u8, now: f64) -> bool {
        let Some(index) = self.notes.get_mut(note as usize).and_then(Option::take) else {
            return false;
        };
        self.voices[index].release(now);
        self.releasing.push(index);
        trace!(note, voice = index, "note off");
        true
    }

    /// Release every held note
    pub fn all_notes_off(&mut self, now: f64) {
        for note in 0..NOTE_COUNT {
            self.note_off(note as u8, now);
        }
    }

    /// Forwarded to the template oscillator; new voices pick it up
    pub fn set_portamento(&mut self, on: bool, time: f64) {
        self.templates.oscillator.set_portamento(on, time);
    }

    /// Apply a partial container to the template and to every held voice
    pub fn set_params(&mut self, container: &ParamContainer, now: f64) {
        self.templates.apply(container, now);
        for index in self.notes.iter().flatten() {
            self.voices[*index].apply(container, now);
        }
    }

    /// Snapshot of the template module named by `discriminator`
    pub fn params(&self, discriminator: Discriminator) -> ParamContainer {
        match discriminator {
            Discriminator::OscillatorParams => {
                ParamContainer::Oscillator(self.templates.oscillator.params())
            }
            Discriminator::FilterParams => ParamContainer::Filter(self.templates.filter.params()),
            Discriminator::AmplifierParams => {
                ParamContainer::Amplifier(self.templates.amplifier.params())
            }
            Discriminator::LfoParams => ParamContainer::Lfo(self.templates.lfo.params()),
        }
    }

    /// Render one stereo frame, mixing every active voice
    pub fn render(&mut self, time: f64) -> [f64; 2] {
        let mut out = [0.0; 2];
        for voice in &mut self.voices {
            if voice.state() == VoiceState::Idle {
                continue;
            }
            let [l, r] = voice.render(time);
            out[0] += l;
            out[1] += r;
        }
        out
    }

    /// Return released voices to the pool once they are quiet or past their
    /// deadline. Call at block boundaries only. Returns how many were freed.
    pub fn collect(&mut self, now: f64) -> usize {
        let policy = self.policy;
        let voices = &mut self.voices;
        let before = self.releasing.len();
        self.releasing.retain(|&index| {
            let voice = &mut voices[index];
            let released = voice.released_at().unwrap_or(now);
            let hard_limit = released + policy.timeout;
            let deadline = voice
                .release_end()
                .map_or(hard_limit, |end| (end + policy.grace).min(hard_limit));

            if voice.level() < policy.threshold {
                trace!(note = voice.note(), voice = index, "voice freed");
            } else if now >= deadline {
                warn!(
                    note = voice.note(),
                    voice = index,
                    level = voice.level(),
                    "voice still audible at its deadline, forcing teardown"
                );
            } else {
                return true;
            }
            voice.free();
            false
        });
        before - self.releasing.len()
    }

    fn slot_for(&self, note: u8) -> Option<usize> {
        self.notes.get(note as usize).copied().flatten()
    }

    /// Pick a voice for a new note: an idle one, else the oldest releasing
    /// one, else steal the oldest held note
    fn allocate(&mut self, now: f64) -> usize {
        if let Some(index) = self
            .voices
            .iter()
            .position(|v| v.state() == VoiceState::Idle)
        {
            return index;
        }

        if let Some(pos) = self
            .releasing
            .iter()
            .enumerate()
            .min_by_key(|&(_, &i)| self.voices[i].serial())
            .map(|(pos, _)| pos)
        {
            let index = self.releasing.swap_remove(pos);
            trace!(voice = index, "recycling released voice");
            self.voices[index].take_over();
            return index;
        }

        let index = (0..self.voices.len())
            .min_by_key(|&i| self.voices[i].serial())
            .unwrap_or(0);
        let note = self.voices[index].note();
        warn!(note, voice = index, "voice pool exhausted, stealing oldest note");
        self.notes[note as usize] = None;
        self.voices[index].release(now);
        self.voices[index].take_over();
        index
    }
}
