//! Interval and amount statistics for a merchant group
//!
//! Two call sites intentionally use different strictness and both sets are
//! kept as named constants: the bulk detector scans every group and can
//! afford looser bounds, while the single-merchant analyzer backs a direct
//! user question and answers more conservatively. Do not unify them.

use chrono::NaiveDate;

use crate::models::{Confidence, Frequency};

/// Consistency bounds for one call site
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyThresholds {
    /// Maximum amount coefficient of variation (stddev / mean)
    pub max_amount_cv: f64,
    /// Maximum interval standard deviation, in days
    pub max_interval_std_dev: f64,
}

/// Bounds for the bulk unsupervised detector
pub const DETECTOR_THRESHOLDS: ConsistencyThresholds = ConsistencyThresholds {
    max_amount_cv: 0.2,
    max_interval_std_dev: 10.0,
};

/// Bounds for the single-merchant analyzer
pub const ANALYZER_THRESHOLDS: ConsistencyThresholds = ConsistencyThresholds {
    max_amount_cv: 0.15,
    max_interval_std_dev: 7.0,
};

/// Gap and amount statistics for a date-sorted group of observations
#[derive(Debug, Clone)]
pub struct GroupStats {
    pub occurrences: usize,
    pub avg_interval: f64,
    pub interval_std_dev: f64,
    pub avg_amount: f64,
    pub amount_std_dev: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    /// Absolute amount of the most recent observation
    pub last_amount: f64,
}

impl GroupStats {
    /// Compute statistics from `(date, amount)` pairs sorted ascending by date.
    ///
    /// Returns None for fewer than two observations; no interval exists to
    /// measure.
    pub fn from_sorted(observations: &[(NaiveDate, f64)]) -> Option<Self> {
        if observations.len() < 2 {
            return None;
        }

        let intervals: Vec<f64> = observations
            .windows(2)
            .map(|w| (w[1].0 - w[0].0).num_days() as f64)
            .collect();
        let amounts: Vec<f64> = observations.iter().map(|(_, a)| a.abs()).collect();

        let (avg_interval, interval_std_dev) = mean_and_std_dev(&intervals);
        let (avg_amount, amount_std_dev) = mean_and_std_dev(&amounts);

        Some(Self {
            occurrences: observations.len(),
            avg_interval,
            interval_std_dev,
            avg_amount,
            amount_std_dev,
            first_date: observations.first()?.0,
            last_date: observations.last()?.0,
            last_amount: observations.last()?.1.abs(),
        })
    }

    pub fn amount_consistent(&self, thresholds: &ConsistencyThresholds) -> bool {
        self.avg_amount > 0.0 && self.amount_std_dev / self.avg_amount < thresholds.max_amount_cv
    }

    pub fn interval_consistent(&self, thresholds: &ConsistencyThresholds) -> bool {
        self.interval_std_dev < thresholds.max_interval_std_dev
    }

    /// Frequency bucket for the average gap, or None when the cadence is too
    /// long to be a recurring charge.
    pub fn frequency(&self) -> Option<Frequency> {
        frequency_for_interval(self.avg_interval)
    }

    /// Confidence tier for this group, evaluated in priority order.
    ///
    /// Low-confidence candidates are dropped from the unsupervised path by
    /// the caller; the tiers themselves are shared with the analyzer.
    pub fn confidence(&self, thresholds: &ConsistencyThresholds) -> Confidence {
        let amount_ok = self.amount_consistent(thresholds);
        let interval_ok = self.interval_consistent(thresholds);

        if amount_ok && interval_ok && self.occurrences >= 4 {
            Confidence::High
        } else if (amount_ok || interval_ok) && self.occurrences >= 4 {
            Confidence::Medium
        } else if amount_ok && interval_ok && self.occurrences >= 3 {
            Confidence::Medium
        } else if self.occurrences >= 5 {
            // Weak fallback for high-volume, low-consistency merchants
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Map an average gap in days to a frequency bucket.
///
/// Inclusive upper bounds, first match wins.
pub fn frequency_for_interval(avg_interval: f64) -> Option<Frequency> {
    if avg_interval <= 0.0 {
        None
    } else if avg_interval <= 10.0 {
        Some(Frequency::Weekly)
    } else if avg_interval <= 20.0 {
        Some(Frequency::BiWeekly)
    } else if avg_interval <= 40.0 {
        Some(Frequency::Monthly)
    } else if avg_interval <= 100.0 {
        Some(Frequency::Quarterly)
    } else if avg_interval <= 400.0 {
        Some(Frequency::Yearly)
    } else {
        None
    }
}

fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}
