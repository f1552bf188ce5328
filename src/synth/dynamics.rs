//! Output limiter
//!
//! A hard-knee, high-ratio compressor with an attack/release follower on the
//! gain reduction. Both channels share one detector so the stereo image does
//! not shift under limiting.
//!
//! ```text
//! level_db  = 20 * log10(max(|l|, |r|))
//! over      = level_db - threshold_db
//! target_db = -(over * (1 - 1/ratio))     when over > 0, else 0
//! reduction follows target_db with the attack (falling) or release (rising)
//! coefficient, and output = input * 10^(reduction / 20)
//! ```

/// Ratio applied above the threshold
pub const LIMITER_RATIO: f64 = 20.0;

/// Threshold in dBFS
pub const LIMITER_THRESHOLD_DB: f64 = 0.0;

/// Silence floor for the level detector
const DETECTOR_FLOOR_DB: f64 = -120.0;

/// Stereo-linked limiter
#[derive(Debug, Clone)]
pub struct Limiter {
    threshold_db: f64,
    ratio: f64,
    attack_coeff: f64,
    release_coeff: f64,
    /// Current gain reduction in dB (zero or negative)
    reduction_db: f64,
}

impl Limiter {
    /// Create a limiter at 0 dBFS, ratio 20:1, with the given attack and
    /// release times in seconds
    pub fn new(sample_rate: f64, attack: f64, release: f64) -> Self {
        Self {
            threshold_db: LIMITER_THRESHOLD_DB,
            ratio: LIMITER_RATIO,
            attack_coeff: coefficient(attack, sample_rate),
            release_coeff: coefficient(release, sample_rate),
            reduction_db: 0.0,
        }
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Current gain reduction in dB
    pub fn reduction_db(&self) -> f64 {
        self.reduction_db
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
    }

    /// Process one stereo frame
    pub fn process(&mut self, frame: [f64; 2]) -> [f64; 2] {
        let peak = frame[0].abs().max(frame[1].abs());
        let level_db = if peak > 0.0 {
            (20.0 * peak.log10()).max(DETECTOR_FLOOR_DB)
        } else {
            DETECTOR_FLOOR_DB
        };

        let over = level_db - self.threshold_db;
        let target = if over > 0.0 {
            -over * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };

        let coeff = if target < self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;

        let gain = 10f64.powf(self.reduction_db / 20.0);
        [frame[0] * gain, frame[1] * gain]
    }
}

fn coefficient(seconds: f64, sample_rate: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        (-1.0 / (seconds * sample_rate)).exp()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    #[test]
    fn test_quiet_signal_untouched() {
        let mut limiter = Limiter::new(SR, 0.01, 0.1);
        for _ in 0..1000 {
            let out = limiter.process([0.5, -0.25]);
            assert_eq!(out, [0.5, -0.25]);
        }
    }

    #[test]
    fn test_loud_signal_pulled_toward_threshold() {
        let mut limiter = Limiter::new(SR, 0.01, 0.1);
        let mut out = [0.0; 2];
        // half a second of +12 dB
        for _ in 0..(SR as usize / 2) {
            out = limiter.process([4.0, 4.0]);
        }
        // 12 dB over at 20:1 leaves 0.6 dB above threshold
        let expected = 10f64.powf(0.6 / 20.0);
        assert!((out[0] - expected).abs() < 1e-3, "got {}", out[0]);
        assert!(limiter.reduction_db() < -11.0);
    }

    #[test]
    fn test_zero_attack_limits_immediately() {
        let mut limiter = Limiter::new(SR, 0.0, 0.1);
        let out = limiter.process([2.0, 0.0]);
        assert!(out[0] < 1.1);
    }

    #[test]
    fn test_channels_share_gain() {
        let mut limiter = Limiter::new(SR, 0.0, 0.1);
        let out = limiter.process([4.0, 1.0]);
        assert!((out[0] / out[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_reduction() {
        let mut limiter = Limiter::new(SR, 0.0, 0.1);
        limiter.process([4.0, 4.0]);
        limiter.reset();
        assert_eq!(limiter.reduction_db(), 0.0);
    }
}
