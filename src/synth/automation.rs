//! Sample-accurate parameter automation
//!
//! An `AutomationCurve` holds a queue of time-stamped ramp segments for a
//! single parameter. The control side appends or cancels segments; the render
//! side calls [`AutomationCurve::tick`] once per sample with monotonically
//! increasing time. Every envelope, portamento glide and teardown fade in the
//! synth is built on this type.

use std::collections::VecDeque;

/// Smallest value an exponential segment may start from or target.
pub const MIN_VALUE: f64 = 1e-5;

/// Segments kept in flight before the queue has to grow.
const SEGMENT_CAPACITY: usize = 8;

/// Interpolation shape of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveShape {
    /// Hold the start value, jump to the target at the end time
    Step,
    /// Straight line between start and target
    Linear,
    /// Constant ratio per unit of time (both ends strictly positive)
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    start: f64,
    from: f64,
    end: f64,
    to: f64,
    shape: CurveShape,
}

impl Segment {
    fn value_at(&self, time: f64) -> f64 {
        if time >= self.end {
            return self.to;
        }
        if time <= self.start {
            return self.from;
        }
        let pos = (time - self.start) / (self.end - self.start);
        match self.shape {
            CurveShape::Step => self.from,
            CurveShape::Linear => self.from + (self.to - self.from) * pos,
            CurveShape::Exponential => self.from * (self.to / self.from).powf(pos),
        }
    }
}

/// Time-scheduled value generator for one parameter
#[derive(Debug, Clone)]
pub struct AutomationCurve {
    /// Value before the first pending segment starts
    held: f64,
    segments: VecDeque<Segment>,
    /// Last value produced by `tick`
    value: f64,
}

impl AutomationCurve {
    /// Create a curve resting at `value`
    pub fn new(value: f64) -> Self {
        Self {
            held: value,
            segments: VecDeque::with_capacity(SEGMENT_CAPACITY),
            value,
        }
    }

    /// Value produced by the most recent `tick`
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Number of segments not yet completed
    pub fn pending(&self) -> usize {
        self.segments.len()
    }

    /// End time of the last scheduled segment, if any
    pub fn end_time(&self) -> Option<f64> {
        self.segments.back().map(|s| s.end)
    }

    /// Whether a segment is still running or scheduled at `time`
    pub fn is_ramping(&self, time: f64) -> bool {
        self.segments.back().is_some_and(|s| s.end > time)
    }

    /// Evaluate the curve at `time` without advancing it
    pub fn value_at(&self, time: f64) -> f64 {
        let mut held = self.held;
        for segment in &self.segments {
            if time < segment.start {
                return held;
            }
            if time < segment.end {
                return segment.value_at(time);
            }
            held = segment.to;
        }
        held
    }

    /// Advance to `time` and return the value there. Called once per sample.
    pub fn tick(&mut self, time: f64) -> f64 {
        while let Some(front) = self.segments.front() {
            if front.end > time {
                break;
            }
            self.held = front.to;
            self.segments.pop_front();
        }
        self.value = match self.segments.front() {
            Some(segment) if time >= segment.start => segment.value_at(time),
            _ => self.held,
        };
        self.value
    }

    /// Cancel everything pending and jump to `value`
    pub fn set_immediate(&mut self, value: f64) {
        self.segments.clear();
        self.held = value;
        self.value = value;
    }

    /// Append a ramp lasting `duration` seconds, starting where the curve
    /// would otherwise come to rest (end of the last segment, or `now`)
    pub fn ramp_to(&mut self, value: f64, duration: f64, shape: CurveShape, now: f64) {
        let (start, _) = self.append_point(now);
        self.ramp_until(value, start + duration.max(0.0), shape, now);
    }

    /// Append a ramp that reaches `value` at the absolute time `end`
    pub fn ramp_until(&mut self, value: f64, end: f64, shape: CurveShape, now: f64) {
        let (start, mut from) = self.append_point(now);
        let mut to = value;
        if shape == CurveShape::Exponential {
            from = clamp_positive(from);
            to = clamp_positive(to);
        }
        self.segments.push_back(Segment {
            start,
            from,
            end: end.max(start),
            to,
            shape,
        });
    }

    /// Discard every segment at or after `time`. A segment running across
    /// `time` is cut there, so the curve holds its value at `time` afterwards.
    pub fn cancel_from(&mut self, time: f64) {
        let cut = self.value_at(time);
        while let Some(back) = self.segments.back_mut() {
            if back.start >= time {
                self.segments.pop_back();
                continue;
            }
            if back.end > time {
                back.end = time;
                back.to = cut;
            }
            break;
        }
        if self.segments.is_empty() {
            self.held = cut;
        }
    }

    fn append_point(&self, now: f64) -> (f64, f64) {
        match self.segments.back() {
            Some(last) if last.end >= now => (last.end, last.to),
            _ => (now, self.value_at(now)),
        }
    }
}

fn clamp_positive(value: f64) -> f64 {
    if value.is_finite() {
        value.max(MIN_VALUE)
    } else {
        MIN_VALUE
    }
}
