//! Weighted statistics for sweep aggregation
//!
//! Provides the two value types the aggregator reduces stage results into:
//! - [`WeightedFloat`]: an associative, commutative accumulator of
//!   `(value, weight)` samples
//! - [`Estimate`]: the collapsed `mean ± uncertainty` form
//!
//! # Example
//!
//! ```rust
//! use dynasweep_stats::WeightedFloat;
//!
//! let total = WeightedFloat::new(2.0, 10.0) + WeightedFloat::new(4.0, 30.0);
//! assert_eq!(total.mean(), Some(3.5));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Running weighted sums of a scalar sample stream
///
/// Accumulation is a plain component-wise sum, so partial accumulators for
/// different stages or restarts can be merged in any order. Samples with a
/// zero (or negative, or non-finite) weight are ignored entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedFloat {
    sum_weights: f64,
    sum_sq_weights: f64,
    sum_weighted: f64,
    sum_weighted_sq: f64,
    samples: u64,
}

impl WeightedFloat {
    /// Accumulator holding a single sample
    #[inline]
    #[must_use]
    pub fn new(value: f64, weight: f64) -> Self {
        let mut acc = Self::default();
        acc.push(value, weight);
        acc
    }

    /// Empty accumulator (the additive identity)
    #[inline]
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Add one sample
    pub fn push(&mut self, value: f64, weight: f64) {
        if !(weight.is_finite() && weight > 0.0) {
            return;
        }
        self.sum_weights += weight;
        self.sum_sq_weights += weight * weight;
        self.sum_weighted += value * weight;
        self.sum_weighted_sq += value * value * weight;
        self.samples += 1;
    }

    /// Number of samples that carried weight
    #[inline]
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Total accumulated weight
    #[inline]
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.sum_weights
    }

    /// `true` if no weighted sample has been added
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Weighted mean `Σ(v·w) / Σw`, `None` when empty
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.sum_weighted / self.sum_weights)
        }
    }

    /// Kish effective sample size `(Σw)² / Σw²`
    #[must_use]
    pub fn effective_samples(&self) -> f64 {
        if self.sum_sq_weights > 0.0 {
            self.sum_weights * self.sum_weights / self.sum_sq_weights
        } else {
            0.0
        }
    }

    /// Biased weighted variance `Σ(w·v²)/Σw − mean²`
    #[must_use]
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self.sum_weighted_sq / self.sum_weights - mean * mean;
        // Cancellation can leave a tiny negative residue.
        Some(var.max(0.0))
    }

    /// Standard error of the weighted mean
    ///
    /// Uses the reliability-weight correction, so it is only defined once
    /// the effective sample size exceeds one.
    #[must_use]
    pub fn standard_error(&self) -> Option<f64> {
        let n_eff = self.effective_samples();
        if n_eff <= 1.0 {
            return None;
        }
        self.variance().map(|var| (var / (n_eff - 1.0)).sqrt())
    }

    /// Collapse into an [`Estimate`], `None` when empty
    #[must_use]
    pub fn estimate(&self) -> Option<Estimate> {
        self.mean().map(|value| Estimate {
            value,
            uncertainty: self.standard_error(),
        })
    }
}

impl AddAssign for WeightedFloat {
    fn add_assign(&mut self, rhs: Self) {
        self.sum_weights += rhs.sum_weights;
        self.sum_sq_weights += rhs.sum_sq_weights;
        self.sum_weighted += rhs.sum_weighted;
        self.sum_weighted_sq += rhs.sum_weighted_sq;
        self.samples += rhs.samples;
    }
}

impl Add for WeightedFloat {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl Sum for WeightedFloat {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Add::add)
    }
}

/// A final `value ± uncertainty` estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Weighted mean
    pub value: f64,
    /// Standard error, absent for a single effective sample
    pub uncertainty: Option<f64>,
}

impl Estimate {
    /// Estimate with a known uncertainty
    #[inline]
    #[must_use]
    pub fn new(value: f64, uncertainty: f64) -> Self {
        Self {
            value,
            uncertainty: Some(uncertainty),
        }
    }

    /// Estimate without uncertainty information
    #[inline]
    #[must_use]
    pub fn exact(value: f64) -> Self {
        Self {
            value,
            uncertainty: None,
        }
    }
}

impl Display for Estimate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.uncertainty {
            Some(err) => write!(f, "{}+/-{}", self.value, err),
            None => write!(f, "{}", self.value),
        }
    }
}
