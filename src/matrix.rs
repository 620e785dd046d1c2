//! Trial × offset timing tables
//!
//! A [`TimingMatrix`] holds one metric (user or kernel time) for every trial
//! of a run. Rows are trials, columns are offsets. Rows are only ever added
//! whole, so a matrix never contains a partially filled trial.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("Trial row has {found} values, matrix has {expected} offsets")]
    RowWidth { expected: usize, found: usize },

    #[error("Matrix shapes differ: {left_trials}x{left_offsets} vs {right_trials}x{right_offsets}")]
    ShapeMismatch {
        left_trials: usize,
        left_offsets: usize,
        right_trials: usize,
        right_offsets: usize,
    },
}

/// Dense row-major table of durations in nanoseconds
#[derive(Debug, Clone, PartialEq)]
pub struct TimingMatrix {
    offsets: usize,
    data: Vec<f64>,
}

impl TimingMatrix {
    /// Create an empty matrix with `offsets` columns
    pub fn new(offsets: usize) -> Self {
        Self {
            offsets,
            data: Vec::new(),
        }
    }

    /// Create an empty matrix sized for `trials` rows
    pub fn with_capacity(trials: usize, offsets: usize) -> Self {
        Self {
            offsets,
            data: Vec::with_capacity(trials * offsets),
        }
    }

    /// Build a matrix from complete rows
    pub fn from_rows<R: AsRef<[f64]>>(offsets: usize, rows: &[R]) -> Result<Self, MatrixError> {
        let mut matrix = Self::with_capacity(rows.len(), offsets);
        for row in rows {
            matrix.push_trial(row.as_ref())?;
        }
        Ok(matrix)
    }

    /// Append one trial. The row must cover every offset.
    pub fn push_trial(&mut self, row: &[f64]) -> Result<(), MatrixError> {
        if row.len() != self.offsets {
            return Err(MatrixError::RowWidth {
                expected: self.offsets,
                found: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn trials(&self) -> usize {
        if self.offsets == 0 {
            0
        } else {
            self.data.len() / self.offsets
        }
    }

    pub fn offsets(&self) -> usize {
        self.offsets
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Values of one trial, in offset order
    pub fn row(&self, trial: usize) -> Option<&[f64]> {
        if trial >= self.trials() {
            return None;
        }
        let start = trial * self.offsets;
        Some(&self.data[start..start + self.offsets])
    }

    /// All trials measured at one offset
    pub fn column(&self, offset: usize) -> Option<Vec<f64>> {
        if offset >= self.offsets {
            return None;
        }
        Some(
            self.data
                .iter()
                .skip(offset)
                .step_by(self.offsets)
                .copied()
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.offsets.max(1))
    }

    /// Element-wise `self - other`
    pub fn difference(&self, other: &TimingMatrix) -> Result<TimingMatrix, MatrixError> {
        if self.offsets != other.offsets || self.trials() != other.trials() {
            return Err(MatrixError::ShapeMismatch {
                left_trials: self.trials(),
                left_offsets: self.offsets,
                right_trials: other.trials(),
                right_offsets: other.offsets,
            });
        }

        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(TimingMatrix {
            offsets: self.offsets,
            data,
        })
    }
}
