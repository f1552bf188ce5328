//! Capability traits shared by the synth modules
//!
//! Modules are composed, not inherited: each concrete module implements the
//! behaviours it actually has.

use super::envelope::Envelope;

/// A modulation source that can be started and stopped with a note
pub trait Modulator: Send {
    /// Begin the contour at `now` (seconds on the audio clock)
    fn start(&mut self, now: f64);

    /// Enter the release phase at `now`. Safe to call more than once.
    fn stop(&mut self, now: f64);

    /// Advance to `time` and return the modulation value
    fn tick(&mut self, time: f64) -> f64;
}

/// A module owning its own envelope
pub trait Enveloped {
    fn envelope(&self) -> &Envelope;

    fn envelope_mut(&mut self) -> &mut Envelope;
}

/// A module with an LFO input whose depth is user-controlled
pub trait LfoInput {
    /// Depth 0.0-1.0
    fn lfo_depth(&self) -> f64;

    fn set_lfo_depth(&mut self, depth: f64);
}

/// Clamp a user depth into 0.0-1.0, treating non-finite input as zero
pub(crate) fn clamp_depth(depth: f64) -> f64 {
    if depth.is_finite() {
        depth.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
