//! Unison voices
//!
//! A `UnisonSet` is a fixed arena of oscillator slots. Changing the set size
//! never allocates: the previous members fade out over [`UNISON_FADE`] and
//! free their slots when the fade ends, while the new members claim other
//! slots and fade in once the old ones are silent.

use super::automation::{AutomationCurve, CurveShape};
use super::oscillator::{Oscillator, Waveform};
use std::f64::consts::FRAC_PI_4;

/// Largest unison size
pub const MAX_UNISON: usize = 14;

/// Fade applied to members leaving or joining the set
pub const UNISON_FADE: f64 = 0.04;

/// Detune of the outermost pair at 100%
pub const MAX_UNISON_DETUNE_CENTS: f64 = 50.0;

/// Gain shared by all members of a set
const UNISON_GAIN: f64 = 0.35;

/// Retiring members may coexist with a full new set
const SLOT_COUNT: usize = MAX_UNISON * 2;

/// Deterministic per-member start phase, spread by the golden ratio
const PHASE_STEP: f64 = 0.618_033_988_749_895;

/// Detune and pan of one member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnisonMember {
    pub detune_cents: f64,
    pub pan: f64,
}

/// Clamp to 0..=14 and round down to an even count
pub fn normalize_size(size: usize) -> usize {
    size.min(MAX_UNISON) & !1
}

/// Detune/pan of member `index` in a set of `size` at `detune`% and `spread`%.
///
/// Members come in symmetric pairs: member `2i` sits at `+offset`, member
/// `2i + 1` at `-offset`, with `offset = 1 - i / (size / 2)`.
pub fn layout_member(index: usize, size: usize, detune: f64, spread: f64) -> UnisonMember {
    let pairs = (size / 2).max(1) as f64;
    let pair = (index / 2) as f64;
    let sign = if index % 2 == 0 { 1.0 } else { -1.0 };
    let offset = sign * (1.0 - pair / pairs);
    UnisonMember {
        detune_cents: offset * (detune / 100.0) * MAX_UNISON_DETUNE_CENTS,
        pan: offset * (spread / 100.0),
    }
}

/// Full layout for a set, in member order
pub fn unison_layout(size: usize, detune: f64, spread: f64) -> Vec<UnisonMember> {
    let size = normalize_size(size);
    (0..size)
        .map(|i| layout_member(i, size, detune, spread))
        .collect()
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SlotState {
    Free,
    Active,
    Retiring { until: f64 },
}

#[derive(Debug, Clone)]
struct Slot {
    osc: Oscillator,
    member: UnisonMember,
    ratio: f64,
    left: f64,
    right: f64,
    gain: AutomationCurve,
    state: SlotState,
}

impl Slot {
    fn new(sample_rate: f64) -> Self {
        Self {
            osc: Oscillator::new(Waveform::Sine, sample_rate),
            member: UnisonMember {
                detune_cents: 0.0,
                pan: 0.0,
            },
            ratio: 1.0,
            left: 1.0,
            right: 1.0,
            gain: AutomationCurve::new(0.0),
            state: SlotState::Free,
        }
    }

    fn assign(&mut self, member: UnisonMember) {
        self.member = member;
        self.ratio = 2f64.powf(member.detune_cents / 1200.0);
        let theta = (member.pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
        self.left = theta.cos() * std::f64::consts::SQRT_2;
        self.right = theta.sin() * std::f64::consts::SQRT_2;
    }
}

/// Arena of detuned, panned copies of an oscillator
#[derive(Debug, Clone)]
pub struct UnisonSet {
    slots: Vec<Slot>,
    current: Vec<usize>,
    size: usize,
    detune: f64,
    spread: f64,
    waveform: Waveform,
}

impl UnisonSet {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| Slot::new(sample_rate)).collect(),
            current: Vec::with_capacity(MAX_UNISON),
            size: 0,
            detune: 0.0,
            spread: 0.0,
            waveform: Waveform::Sine,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Detune in percent
    pub fn detune(&self) -> f64 {
        self.detune
    }

    /// Stereo spread in percent
    pub fn spread(&self) -> f64 {
        self.spread
    }

    /// Members of the current set, in layout order
    pub fn members(&self) -> impl Iterator<Item = UnisonMember> + '_ {
        self.current.iter().map(move |&i| self.slots[i].member)
    }

    /// Slots still producing sound (current set plus members fading out)
    pub fn sounding_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state != SlotState::Free)
            .count()
    }

    /// Members fading out after a size change
    pub fn retiring_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Retiring { .. }))
            .count()
    }

    /// Gain of member `index` at `time` (for inspection)
    pub fn member_gain_at(&self, index: usize, time: f64) -> Option<f64> {
        self.current
            .get(index)
            .map(|&i| self.slots[i].gain.value_at(time))
    }

    /// Frequency ratio applied to member `index`
    pub fn member_ratio(&self, index: usize) -> Option<f64> {
        self.current.get(index).map(|&i| self.slots[i].ratio)
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
        for slot in &mut self.slots {
            slot.osc.set_waveform(waveform);
        }
    }

    /// Change the number of members, crossfading from the previous set
    pub fn set_size(&mut self, size: usize, now: f64) {
        let size = normalize_size(size);
        if size == self.size {
            return;
        }

        for &i in &self.current {
            let slot = &mut self.slots[i];
            slot.gain.cancel_from(now);
            slot.gain.ramp_to(0.0, UNISON_FADE, CurveShape::Linear, now);
            slot.state = SlotState::Retiring {
                until: now + UNISON_FADE,
            };
        }
        self.current.clear();
        self.size = size;

        let gain = self.member_gain();
        for index in 0..size {
            let slot_index = self.claim_slot();
            let member = layout_member(index, size, self.detune, self.spread);
            let slot = &mut self.slots[slot_index];
            slot.assign(member);
            slot.osc.set_waveform(self.waveform);
            slot.osc.set_phase(index as f64 * PHASE_STEP);
            // silent until the outgoing set has faded, then fade in
            slot.gain.set_immediate(0.0);
            slot.gain
                .ramp_until(0.0, now + UNISON_FADE, CurveShape::Linear, now);
            slot.gain.ramp_to(gain, UNISON_FADE, CurveShape::Linear, now);
            slot.state = SlotState::Active;
            self.current.push(slot_index);
        }
    }

    /// Replace the whole set at once, without fades. Used when a voice is
    /// prepared for a new note.
    pub fn reset(&mut self, size: usize, detune: f64, spread: f64) {
        for slot in &mut self.slots {
            slot.state = SlotState::Free;
            slot.gain.set_immediate(0.0);
        }
        self.current.clear();
        self.size = normalize_size(size);
        self.detune = clamp_percent(detune);
        self.spread = clamp_percent(spread);

        let gain = self.member_gain();
        for index in 0..self.size {
            let member = layout_member(index, self.size, self.detune, self.spread);
            let slot = &mut self.slots[index];
            slot.assign(member);
            slot.osc.set_waveform(self.waveform);
            slot.osc.set_phase(index as f64 * PHASE_STEP);
            slot.gain.set_immediate(gain);
            slot.state = SlotState::Active;
            self.current.push(index);
        }
    }

    /// Detune amount in percent (0-100)
    pub fn set_detune(&mut self, detune: f64) {
        self.detune = clamp_percent(detune);
        self.relayout();
    }

    /// Stereo spread in percent (0-100)
    pub fn set_spread(&mut self, spread: f64) {
        self.spread = clamp_percent(spread);
        self.relayout();
    }

    /// Render one stereo frame around `frequency`
    pub fn render(&mut self, frequency: f64, time: f64) -> [f64; 2] {
        let mut out = [0.0; 2];
        for slot in &mut self.slots {
            match slot.state {
                SlotState::Free => continue,
                SlotState::Retiring { until } if time >= until => {
                    slot.state = SlotState::Free;
                    slot.gain.set_immediate(0.0);
                    continue;
                }
                _ => {}
            }
            let gain = slot.gain.tick(time);
            let sample = slot.osc.generate(frequency * slot.ratio) * gain;
            out[0] += sample * slot.left;
            out[1] += sample * slot.right;
        }
        out
    }

    fn member_gain(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            UNISON_GAIN / (self.size / 2) as f64
        }
    }

    fn relayout(&mut self) {
        for (index, &slot_index) in self.current.iter().enumerate() {
            let member = layout_member(index, self.size, self.detune, self.spread);
            self.slots[slot_index].assign(member);
        }
    }

    fn claim_slot(&mut self) -> usize {
        if let Some(i) = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Free)
        {
            return i;
        }

        // every non-current slot is retiring: take the one closest to silence
        let mut best = 0;
        let mut best_until = f64::INFINITY;
        for (i, slot) in self.slots.iter().enumerate() {
            if let SlotState::Retiring { until } = slot.state {
                if until < best_until {
                    best = i;
                    best_until = until;
                }
            }
        }
        best
    }
}
