//! Drive waveshaper
//!
//! Soft-clip transfer curve sampled into a lookup table. The table is only
//! rebuilt when the amount changes, never per sample.

use std::f64::consts::PI;

/// Points in the transfer table
pub const DRIVE_TABLE_SIZE: usize = 4096;

/// Output scale of the curve
const DRIVE_MAKEUP: f64 = 2.89;

/// Soft-clip waveshaper
#[derive(Debug, Clone)]
pub struct Drive {
    amount: f64,
    table: Vec<f64>,
}

impl Drive {
    /// A drive stage at amount 0 (transparent)
    pub fn new() -> Self {
        Self {
            amount: 0.0,
            table: vec![0.0; DRIVE_TABLE_SIZE],
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Set the drive amount (0.0-1.0) and rebuild the table if it changed
    pub fn set_amount(&mut self, amount: f64) {
        let amount = if amount.is_finite() {
            amount.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if amount == self.amount {
            return;
        }
        self.amount = amount;
        if amount > 0.0 {
            let last = (DRIVE_TABLE_SIZE - 1) as f64;
            for (i, point) in self.table.iter_mut().enumerate() {
                let x = i as f64 * 2.0 / last - 1.0;
                *point = drive_curve(x, amount);
            }
        }
    }

    /// Shape one sample. Input is clamped to -1.0..1.0 while drive is on.
    pub fn process(&self, input: f64) -> f64 {
        if self.amount == 0.0 {
            return input;
        }
        let x = if input.is_finite() {
            input.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let last = DRIVE_TABLE_SIZE - 1;
        let pos = (x + 1.0) * 0.5 * last as f64;
        let index = (pos.floor() as usize).min(last - 1);
        let frac = pos - index as f64;
        self.table[index] + (self.table[index + 1] - self.table[index]) * frac
    }
}

impl Default for Drive {
    fn default() -> Self {
        Self::new()
    }
}

/// The transfer function sampled by the table
pub fn drive_curve(x: f64, amount: f64) -> f64 {
    let k = amount * 10.0;
    DRIVE_MAKEUP * (3.0 + k) * x * (PI / 9.0) / (PI + k * x.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_amount_is_transparent() {
        let drive = Drive::new();
        assert_eq!(drive.process(0.3), 0.3);
        assert_eq!(drive.process(1.7), 1.7);
    }

    #[test]
    fn test_table_matches_curve() {
        let mut drive = Drive::new();
        drive.set_amount(0.5);
        for &x in &[-1.0, -0.5, 0.0, 0.25, 1.0] {
            let diff = (drive.process(x) - drive_curve(x, 0.5)).abs();
            assert!(diff < 1e-4, "x={} diff={}", x, diff);
        }
    }

    #[test]
    fn test_curve_is_odd_and_bounded() {
        let mut drive = Drive::new();
        drive.set_amount(1.0);
        assert!((drive.process(0.5) + drive.process(-0.5)).abs() < 1e-9);
        // input beyond full scale is clamped first
        assert_eq!(drive.process(5.0), drive.process(1.0));
    }

    #[test]
    fn test_more_drive_compresses_peaks() {
        // ratio of output at full scale to output near zero
        let ratio = |amount: f64| drive_curve(1.0, amount) / (drive_curve(0.01, amount) * 100.0);
        assert!(ratio(1.0) < ratio(0.1));
    }

    #[test]
    fn test_amount_clamped() {
        let mut drive = Drive::new();
        drive.set_amount(4.0);
        assert_eq!(drive.amount(), 1.0);
        drive.set_amount(f64::NAN);
        assert_eq!(drive.amount(), 0.0);
    }
}
