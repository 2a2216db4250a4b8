use std::f64::consts::PI;

use anyhow::{anyhow, Result};

/// Exponential smoothing low-pass filter.
#[derive(Clone, Debug, Default)]
struct LowPassFilter {
    initialized: bool,
    raw_value: f64,
    stored_value: f64,
}

impl LowPassFilter {
    fn filter(&mut self, value: f64, alpha: f64) -> f64 {
        self.raw_value = value;
        if self.initialized {
            self.stored_value = alpha * value + (1.0 - alpha) * self.stored_value;
        } else {
            self.stored_value = value;
            self.initialized = true;
        }
        self.stored_value
    }

    fn last_raw_value(&self) -> f64 {
        self.raw_value
    }

    fn stored_value(&self) -> f64 {
        self.stored_value
    }
}

/// One Euro filter: a speed-adaptive low-pass filter (Casiez, Roussel,
/// Vogel, CHI 2012).
///
/// The cutoff frequency rises with the filtered signal speed, so slow
/// (noisy) input is smoothed hard while fast input passes with low
/// latency: `cutoff = min_cutoff + beta * |dx|`, with the derivative
/// itself low-passed at the fixed `d_cutoff`.
#[derive(Clone, Debug)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    last_timestamp: Option<f64>,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Result<Self> {
        if min_cutoff <= 0.0 {
            return Err(anyhow!("min_cutoff must be positive"));
        }
        if d_cutoff <= 0.0 {
            return Err(anyhow!("d_cutoff must be positive"));
        }
        Ok(Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: LowPassFilter::default(),
            dx_filter: LowPassFilter::default(),
            last_timestamp: None,
        })
    }

    fn smoothing_factor(te: f64, cutoff: f64) -> f64 {
        let tau = 1.0 / (2.0 * PI * cutoff);
        1.0 / (1.0 + tau / te)
    }

    /// Filter one sample. The first sample passes through unchanged; a
    /// sample at the same or an earlier timestamp returns the previously
    /// filtered value.
    pub fn filter(&mut self, value: f64, timestamp: f64) -> f64 {
        let last = match self.last_timestamp {
            None => {
                self.last_timestamp = Some(timestamp);
                self.dx_filter.filter(0.0, 1.0);
                return self.x_filter.filter(value, 1.0);
            }
            Some(last) => last,
        };

        let te = timestamp - last;
        if te <= 0.0 {
            // Out-of-order sample: hold the previously filtered value.
            return self.x_filter.stored_value();
        }
        self.last_timestamp = Some(timestamp);

        let dx = (value - self.x_filter.last_raw_value()) / te;
        let alpha_d = Self::smoothing_factor(te, self.d_cutoff);
        let dx_hat = self.dx_filter.filter(dx, alpha_d);

        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let alpha = Self::smoothing_factor(te, cutoff);
        self.x_filter.filter(value, alpha)
    }

    /// Reset filter state for a new tracking session.
    pub fn reset(&mut self) {
        self.x_filter = LowPassFilter::default();
        self.dx_filter = LowPassFilter::default();
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_cutoffs() {
        assert!(OneEuroFilter::new(0.0, 0.007, 1.0).is_err());
        assert!(OneEuroFilter::new(-1.0, 0.007, 1.0).is_err());
        assert!(OneEuroFilter::new(1.0, 0.007, 0.0).is_err());
        assert!(OneEuroFilter::new(1.0, 0.007, 1.0).is_ok());
    }

    #[test]
    fn first_sample_passes_through() {
        let mut f = OneEuroFilter::new(1.0, 0.007, 1.0).unwrap();
        assert_eq!(f.filter(320.5, 0.0), 320.5);
    }

    #[test]
    fn stationary_input_is_idempotent() {
        let mut f = OneEuroFilter::new(1.0, 0.007, 1.0).unwrap();
        let mut t = 0.0;
        f.filter(100.0, t);
        for _ in 0..30 {
            t += 1.0 / 30.0;
            let out = f.filter(100.0, t);
            assert!((out - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn same_timestamp_returns_previous_value() {
        let mut f = OneEuroFilter::new(1.0, 0.007, 1.0).unwrap();
        f.filter(10.0, 1.0);
        assert_eq!(f.filter(999.0, 1.0), 10.0);
        assert_eq!(f.filter(5.0, 0.5), 10.0);
    }

    #[test]
    fn smooths_noise_toward_signal() {
        let mut f = OneEuroFilter::new(1.0, 0.0, 1.0).unwrap();
        let mut t = 0.0;
        f.filter(0.0, t);
        let mut out = 0.0;
        for i in 0..100 {
            t += 1.0 / 30.0;
            let noise = if i % 2 == 0 { 1.0 } else { -1.0 };
            out = f.filter(noise, t);
        }
        // Zero-mean noise stays near zero after filtering.
        assert!(out.abs() < 0.6);
    }

    #[test]
    fn reset_clears_history() {
        let mut f = OneEuroFilter::new(1.0, 0.007, 1.0).unwrap();
        f.filter(50.0, 0.0);
        f.filter(60.0, 0.1);
        f.reset();
        assert_eq!(f.filter(500.0, 0.0), 500.0);
    }
}
