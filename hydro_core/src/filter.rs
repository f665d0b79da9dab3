//! Sample conditioning ahead of the dosing decision.
//!
//! Each sensor stream gets a bounded moving-average window. Partial windows
//! are valid: the average covers whatever samples are present, and the
//! oldest sample is evicted once the window is full.

use std::collections::VecDeque;

use crate::config::FilterCfg;
use crate::util::{mean, population_std_dev};

/// Why a sample never reached the moving-average buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NonFinite,
    Negative,
    Outlier,
}

/// Fixed-capacity moving average.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    buf: VecDeque<f64>,
}

impl MovingAverage {
    /// Create a window of `window` samples (clamped to at least 1).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buf: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.window
    }

    /// Push a sample and return the updated average.
    pub fn push(&mut self, value: f64) -> f64 {
        if self.buf.len() == self.window {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
        debug_assert!(self.buf.len() <= self.window, "moving-average window overflow");
        self.average()
    }

    /// Mean of the current contents; NaN when empty.
    pub fn average(&self) -> f64 {
        mean(self.buf.iter().copied()).unwrap_or(f64::NAN)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Decide whether `value` may enter the buffer under `cfg`.
    pub fn admit(&self, value: f64, cfg: &FilterCfg) -> Result<(), RejectReason> {
        if !value.is_finite() {
            return Err(RejectReason::NonFinite);
        }
        if cfg.reject_negative && value < 0.0 {
            return Err(RejectReason::Negative);
        }
        if cfg.outlier_sigma > 0.0 && self.buf.len() >= 3 {
            let m = self.average();
            if let Some(std) = population_std_dev(self.buf.iter().copied())
                && std > 0.0
                && (value - m).abs() > cfg.outlier_sigma * std
            {
                return Err(RejectReason::Outlier);
            }
        }
        Ok(())
    }
}
