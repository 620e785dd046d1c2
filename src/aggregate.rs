//! Assembling filtered results into labeled tables
//!
//! Two layouts are produced:
//!
//! - breakdown: `user`, `kernel` and `kernel to user` from a single run, where
//!   `kernel to user` filters the per-sample difference matrix on its own
//! - mode comparison: the `user` series of one run per driver mode, labeled
//!   by mode name

use thiserror::Error;
use tracing::{info, warn};

use crate::matrix::{MatrixError, TimingMatrix};
use crate::mode::{Mode, ModeSwitch};
use crate::outlier::{FilterError, FilteredResult, OutlierFilter};
use crate::runner::{TrialError, TrialPlan, TrialRunner, TrialSet};
use crate::sample::SampleSource;

pub const X_LABEL: &str = "n-th fibonacci";
pub const Y_LABEL: &str = "time (ns)";

pub const USER: &str = "user";
pub const KERNEL: &str = "kernel";
pub const KERNEL_TO_USER: &str = "kernel to user";

pub const BREAKDOWN_TITLE: &str = "runtime";
pub const COMPARISON_TITLE: &str = "runtime by mode";

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error(transparent)]
    Trial(#[from] TrialError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("Filtering '{label}' failed: {source}")]
    Filter {
        label: String,
        #[source]
        source: FilterError,
    },

    #[error("Series '{label}' has {found} offsets, table has {expected}")]
    LengthMismatch {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate series label '{0}'")]
    DuplicateLabel(String),

    #[error("Trial set has no mode to label it with")]
    MissingMode,

    #[error("No modes to compare")]
    NoModes,
}

/// One labeled line of the final chart
#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub result: FilteredResult,
}

/// Ordered label → per-offset mean mapping
#[derive(Debug, Clone)]
pub struct ComparisonTable {
    title: String,
    offsets: usize,
    series: Vec<Series>,
}

impl ComparisonTable {
    pub fn new(title: impl Into<String>, offsets: usize) -> Self {
        Self {
            title: title.into(),
            offsets,
            series: Vec::new(),
        }
    }

    /// Add a series; its length must match the table's offset count
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        result: FilteredResult,
    ) -> Result<(), AggregateError> {
        let label = label.into();
        if result.len() != self.offsets {
            return Err(AggregateError::LengthMismatch {
                label,
                expected: self.offsets,
                found: result.len(),
            });
        }
        if self.get(&label).is_some() {
            return Err(AggregateError::DuplicateLabel(label));
        }
        self.series.push(Series { label, result });
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&FilteredResult> {
        self.series
            .iter()
            .find(|s| s.label == label)
            .map(|s| &s.result)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn offsets(&self) -> usize {
        self.offsets
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.label.as_str())
    }

    /// Labels that contain at least one NaN offset, with those offsets
    pub fn degenerate(&self) -> Vec<(&str, Vec<usize>)> {
        self.series
            .iter()
            .filter_map(|s| {
                let offsets = s.result.degenerate_offsets();
                (!offsets.is_empty()).then_some((s.label.as_str(), offsets))
            })
            .collect()
    }
}

fn filter_labeled(
    label: &str,
    matrix: &TimingMatrix,
    filter: &OutlierFilter,
) -> Result<FilteredResult, AggregateError> {
    let result = filter
        .apply(matrix)
        .map_err(|source| AggregateError::Filter {
            label: label.to_string(),
            source,
        })?;

    let degenerate = result.degenerate_offsets();
    if !degenerate.is_empty() {
        warn!(
            series = label,
            offsets = ?degenerate,
            "confidence band rejected every sample; reporting NaN"
        );
    }
    Ok(result)
}

/// User, kernel and kernel-to-user series from a single run
pub fn breakdown(set: &TrialSet, filter: &OutlierFilter) -> Result<ComparisonTable, AggregateError> {
    let mut table = ComparisonTable::new(BREAKDOWN_TITLE, set.user.offsets());
    table.insert(USER, filter_labeled(USER, &set.user, filter)?)?;
    table.insert(KERNEL, filter_labeled(KERNEL, &set.kernel, filter)?)?;

    // Filtered on its own: outliers in the difference need not line up with
    // outliers in either operand.
    let difference = set.difference()?;
    table.insert(
        KERNEL_TO_USER,
        filter_labeled(KERNEL_TO_USER, &difference, filter)?,
    )?;
    Ok(table)
}

/// User series of several runs, one per mode
pub fn compare_modes(
    sets: &[TrialSet],
    filter: &OutlierFilter,
) -> Result<ComparisonTable, AggregateError> {
    let first = sets.first().ok_or(AggregateError::NoModes)?;
    let mut table = ComparisonTable::new(COMPARISON_TITLE, first.user.offsets());
    for set in sets {
        let mode = set.mode.ok_or(AggregateError::MissingMode)?;
        let result = filter_labeled(mode.label(), &set.user, filter)?;
        table.insert(mode.label(), result)?;
    }
    Ok(table)
}

/// Run one plan and build its breakdown table
pub fn run_breakdown<S: SampleSource + ?Sized>(
    plan: TrialPlan,
    source: &mut S,
    switch: Option<&mut dyn ModeSwitch>,
    filter: &OutlierFilter,
    show_progress: bool,
) -> Result<ComparisonTable, AggregateError> {
    let set = TrialRunner::new(plan)
        .with_progress(show_progress)
        .run(source, switch)?;
    breakdown(&set, filter)
}

/// Run `plan` once per mode, in order, and compare their user series
pub fn run_comparison<S: SampleSource + ?Sized>(
    plan: TrialPlan,
    modes: &[Mode],
    source: &mut S,
    switch: &mut dyn ModeSwitch,
    filter: &OutlierFilter,
    show_progress: bool,
) -> Result<ComparisonTable, AggregateError> {
    if modes.is_empty() {
        return Err(AggregateError::NoModes);
    }

    let mut sets = Vec::with_capacity(modes.len());
    for &mode in modes {
        info!(mode = %mode, "starting mode");
        let set = TrialRunner::new(plan.with_mode(Some(mode)))
            .with_progress(show_progress)
            .run(source, Some(&mut *switch))?;
        sets.push(set);
    }
    compare_modes(&sets, filter)
}
