//! Sequential trial execution
//!
//! A [`TrialRunner`] selects the driver mode (if any) once, then runs the
//! sample source `trials` times back to back. Trials never overlap: the
//! client's output file is a single slot that each run overwrites.
//!
//! A client that exits unsuccessfully is retried up to `max_retries` times
//! for the same trial. After that the whole run fails. Malformed or short
//! output is never retried.

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::matrix::{MatrixError, TimingMatrix};
use crate::mode::{Mode, ModeError, ModeSwitch};
use crate::sample::{RawSample, SampleError, SampleSource};

/// Default number of extra attempts for a failed client launch
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Invalid trial plan: {0}")]
    InvalidPlan(String),

    #[error("Mode '{0}' requested but no mode switch is available")]
    NoModeSwitch(Mode),

    #[error(transparent)]
    ModeSwitch(#[from] ModeError),

    #[error("Trial {trial}: client failed after {attempts} attempts: {source}")]
    InvocationFailed {
        trial: usize,
        attempts: u32,
        #[source]
        source: SampleError,
    },

    #[error("Trial {trial}: {source}")]
    Sample {
        trial: usize,
        #[source]
        source: SampleError,
    },

    #[error("Trial {trial}: {source}")]
    Matrix {
        trial: usize,
        #[source]
        source: MatrixError,
    },
}

/// What to measure in one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialPlan {
    pub trials: usize,
    pub offsets: usize,
    pub mode: Option<Mode>,
    pub max_retries: u32,
}

impl TrialPlan {
    pub fn new(trials: usize, offsets: usize) -> Self {
        Self {
            trials,
            offsets,
            mode: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_mode(mut self, mode: Option<Mode>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn validate(&self) -> Result<(), TrialError> {
        if self.trials == 0 {
            return Err(TrialError::InvalidPlan("trials must be positive".into()));
        }
        if self.offsets == 0 {
            return Err(TrialError::InvalidPlan("offsets must be positive".into()));
        }
        Ok(())
    }
}

/// Raw timings of one completed run
#[derive(Debug, Clone)]
pub struct TrialSet {
    pub user: TimingMatrix,
    pub kernel: TimingMatrix,
    pub mode: Option<Mode>,
    /// Client relaunches needed across all trials
    pub retries: usize,
}

impl TrialSet {
    /// Per-sample `user - kernel` matrix
    pub fn difference(&self) -> Result<TimingMatrix, MatrixError> {
        self.user.difference(&self.kernel)
    }
}

pub struct TrialRunner {
    plan: TrialPlan,
    show_progress: bool,
}

impl TrialRunner {
    pub fn new(plan: TrialPlan) -> Self {
        Self {
            plan,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while trials run
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn plan(&self) -> &TrialPlan {
        &self.plan
    }

    /// Execute the plan against `source`
    ///
    /// `switch` is only consulted when the plan names a mode; it is written
    /// exactly once, before the first trial.
    pub fn run<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        switch: Option<&mut dyn ModeSwitch>,
    ) -> Result<TrialSet, TrialError> {
        self.plan.validate()?;
        let TrialPlan {
            trials, offsets, ..
        } = self.plan;

        let span = info_span!("run", trials, offsets, mode = ?self.plan.mode);
        let _enter = span.enter();

        if let Some(mode) = self.plan.mode {
            let switch = switch.ok_or(TrialError::NoModeSwitch(mode))?;
            switch.select(mode)?;
        }

        let progress = self.progress_bar();
        let mut user = TimingMatrix::with_capacity(trials, offsets);
        let mut kernel = TimingMatrix::with_capacity(trials, offsets);
        let mut retries = 0;

        for trial in 0..trials {
            let rows = self.collect_trial(source, trial, &mut retries)?;
            let (user_row, kernel_row) = split_row(&rows, offsets);

            user.push_trial(&user_row)
                .map_err(|source| TrialError::Matrix { trial, source })?;
            kernel
                .push_trial(&kernel_row)
                .map_err(|source| TrialError::Matrix { trial, source })?;

            debug!(trial, "trial complete");
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(retries, "all trials collected");
        Ok(TrialSet {
            user,
            kernel,
            mode: self.plan.mode,
            retries,
        })
    }

    fn collect_trial<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        trial: usize,
        retries: &mut usize,
    ) -> Result<Vec<RawSample>, TrialError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match source.collect(self.plan.offsets) {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_invocation_failure() && attempt <= self.plan.max_retries => {
                    warn!(trial, attempt, error = %e, "client failed, retrying trial");
                    *retries += 1;
                }
                Err(e) if e.is_invocation_failure() => {
                    return Err(TrialError::InvocationFailed {
                        trial,
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(TrialError::Sample { trial, source: e }),
            }
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.plan.trials as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:30}] {pos}/{len} ({eta})")
        {
            bar.set_style(style);
        }
        bar.set_message(
            self.plan
                .mode
                .map_or_else(|| "trials".to_string(), |m| m.to_string()),
        );
        bar
    }
}

/// Leading `offsets` rows as (user, kernel) columns
fn split_row(rows: &[RawSample], offsets: usize) -> (Vec<f64>, Vec<f64>) {
    rows.iter()
        .take(offsets)
        .map(|r| (r.user_ns as f64, r.kernel_ns as f64))
        .unzip()
}
