//! Confidence-band outlier rejection
//!
//! For each offset column of a [`TimingMatrix`] the filter builds a two-sided
//! Student's t confidence interval around the column mean:
//!
//! ```text
//! lower = mean + t(alpha/2,   n-1) * sd / sqrt(n)
//! upper = mean + t(1-alpha/2, n-1) * sd / sqrt(n)
//! ```
//!
//! and averages only the samples inside `[lower, upper]`. The band is scaled
//! by the standard error, so it tightens as the trial count grows.
//!
//! A column whose band retains nothing yields `NaN` for that offset.

use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

use crate::matrix::TimingMatrix;

/// Default two-sided significance level (95% interval)
pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Need at least 2 trials to build a confidence band, got {0}")]
    InsufficientTrials(usize),

    #[error("Significance level must be in (0, 1), got {0}")]
    InvalidSignificance(f64),

    #[error("Student's t distribution unavailable: {0}")]
    Distribution(String),
}

/// Interval a sample must fall in to be kept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBand {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceBand {
    /// Inclusive on both ends
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Per-offset robust means for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredResult {
    values: Vec<f64>,
    retained: Vec<usize>,
}

impl FilteredResult {
    pub fn new(values: Vec<f64>, retained: Vec<usize>) -> Self {
        Self { values, retained }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// How many trials survived the band at each offset
    pub fn retained(&self) -> &[usize] {
        &self.retained
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, offset: usize) -> Option<f64> {
        self.values.get(offset).copied()
    }

    /// Offsets where every sample was rejected
    pub fn degenerate_offsets(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_nan())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Two-sided Student's t outlier filter
#[derive(Debug, Clone, Copy)]
pub struct OutlierFilter {
    significance: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
        }
    }
}

impl OutlierFilter {
    pub fn new(significance: f64) -> Result<Self, FilterError> {
        if !(significance > 0.0 && significance < 1.0) {
            return Err(FilterError::InvalidSignificance(significance));
        }
        Ok(Self { significance })
    }

    pub fn significance(&self) -> f64 {
        self.significance
    }

    /// Lower and upper t quantiles for `trials - 1` degrees of freedom
    pub fn critical_values(&self, trials: usize) -> Result<(f64, f64), FilterError> {
        if trials < 2 {
            return Err(FilterError::InsufficientTrials(trials));
        }
        let dist = StudentsT::new(0.0, 1.0, (trials - 1) as f64)
            .map_err(|e| FilterError::Distribution(e.to_string()))?;
        let half = self.significance / 2.0;
        Ok((dist.inverse_cdf(half), dist.inverse_cdf(1.0 - half)))
    }

    /// Confidence band of one column
    pub fn band(&self, column: &[f64]) -> Result<ConfidenceBand, FilterError> {
        let (t_lo, t_hi) = self.critical_values(column.len())?;
        Ok(band_with(column, t_lo, t_hi))
    }

    /// Mean of the samples inside the column's band, with the kept count
    pub fn filtered_mean(&self, column: &[f64]) -> Result<(f64, usize), FilterError> {
        let band = self.band(column)?;
        Ok(mean_within(column, band))
    }

    /// Filter every offset of `matrix` independently
    pub fn apply(&self, matrix: &TimingMatrix) -> Result<FilteredResult, FilterError> {
        // Every column has the same length, so the quantiles are shared.
        let (t_lo, t_hi) = self.critical_values(matrix.trials())?;

        let mut values = Vec::with_capacity(matrix.offsets());
        let mut retained = Vec::with_capacity(matrix.offsets());
        for offset in 0..matrix.offsets() {
            let column = matrix.column(offset).unwrap_or_default();
            let band = band_with(&column, t_lo, t_hi);
            let (mean, kept) = mean_within(&column, band);
            values.push(mean);
            retained.push(kept);
        }

        Ok(FilteredResult::new(values, retained))
    }
}

fn band_with(column: &[f64], t_lo: f64, t_hi: f64) -> ConfidenceBand {
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    let var = column
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0);
    let se = var.sqrt() / n.sqrt();

    ConfidenceBand {
        lower: mean + t_lo * se,
        upper: mean + t_hi * se,
    }
}

fn mean_within(column: &[f64], band: ConfidenceBand) -> (f64, usize) {
    let (sum, kept) = column
        .iter()
        .filter(|v| band.contains(**v))
        .fold((0.0, 0usize), |(sum, kept), v| (sum + v, kept + 1));

    if kept == 0 {
        (f64::NAN, 0)
    } else {
        (sum / kept as f64, kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_values_df4() {
        let (lo, hi) = OutlierFilter::default().critical_values(5).unwrap();
        assert!((hi - 2.776).abs() < 1e-3, "t_hi = {}", hi);
        assert!((lo + hi).abs() < 1e-9);
    }

    #[test]
    fn test_critical_values_df1() {
        let (_, hi) = OutlierFilter::default().critical_values(2).unwrap();
        assert!((hi - 12.706).abs() < 1e-2, "t_hi = {}", hi);
    }

    #[test]
    fn test_critical_values_need_two_trials() {
        assert_eq!(
            OutlierFilter::default().critical_values(1),
            Err(FilterError::InsufficientTrials(1))
        );
    }

    #[test]
    fn test_invalid_significance() {
        assert!(OutlierFilter::new(0.0).is_err());
        assert!(OutlierFilter::new(1.0).is_err());
        assert!(OutlierFilter::new(f64::NAN).is_err());
        assert!(OutlierFilter::new(0.01).is_ok());
    }

    #[test]
    fn test_band_is_symmetric_around_mean() {
        let band = OutlierFilter::default()
            .band(&[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        assert!(((band.lower + band.upper) / 2.0 - 3.0).abs() < 1e-9);
        // sd = sqrt(2.5), se = sd / sqrt(5)
        let half = 2.776 * (2.5f64).sqrt() / 5f64.sqrt();
        assert!((band.upper - 3.0 - half).abs() < 1e-2);
    }

    #[test]
    fn test_single_outlier_rejected() {
        let filter = OutlierFilter::default();
        let column = [10.0, 10.0, 10.0, 10.0, 1000.0];
        let band = filter.band(&column).unwrap();
        assert!(!band.contains(1000.0));
        assert!(band.contains(10.0));

        let (mean, kept) = filter.filtered_mean(&column).unwrap();
        assert!((mean - 10.0).abs() < 1e-9);
        assert_eq!(kept, 4);
    }

    #[test]
    fn test_constant_column_kept() {
        let (mean, kept) = OutlierFilter::default()
            .filtered_mean(&[42.0; 7])
            .unwrap();
        assert_eq!(mean, 42.0);
        assert_eq!(kept, 7);
    }

    #[test]
    fn test_empty_band_is_nan() {
        // Two distant points: the mean's interval sits between them and
        // excludes both once alpha is large enough.
        let filter = OutlierFilter::new(0.9).unwrap();
        let (mean, kept) = filter.filtered_mean(&[0.0, 100.0]).unwrap();
        assert!(mean.is_nan());
        assert_eq!(kept, 0);
    }

    #[test]
    fn test_apply_matrix() {
        let m = TimingMatrix::from_rows(
            2,
            &[
                [10.0, 5.0],
                [10.0, 5.0],
                [10.0, 5.0],
                [10.0, 5.0],
                [1000.0, 5.0],
            ],
        )
        .unwrap();
        let result = OutlierFilter::default().apply(&m).unwrap();
        assert_eq!(result.len(), 2);
        assert!((result.values()[0] - 10.0).abs() < 1e-9);
        assert_eq!(result.values()[1], 5.0);
        assert_eq!(result.retained(), &[4, 5]);
        assert!(result.degenerate_offsets().is_empty());
    }

    #[test]
    fn test_apply_does_not_mutate_input() {
        let m = TimingMatrix::from_rows(1, &[[1.0], [2.0], [30.0]]).unwrap();
        let before = m.clone();
        let _ = OutlierFilter::default().apply(&m).unwrap();
        assert_eq!(m, before);
    }

    #[test]
    fn test_apply_single_trial_rejected() {
        let m = TimingMatrix::from_rows(2, &[[1.0, 2.0]]).unwrap();
        assert_eq!(
            OutlierFilter::default().apply(&m),
            Err(FilterError::InsufficientTrials(1))
        );
    }

    #[test]
    fn test_degenerate_offsets_reported() {
        let result = FilteredResult::new(vec![1.0, f64::NAN, 3.0, f64::NAN], vec![2, 0, 2, 0]);
        assert_eq!(result.degenerate_offsets(), vec![1, 3]);
    }
}
