//! Benchmark configuration
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional TOML file, then command-line flags.
//!
//! ```toml
//! trials = 500
//! offsets = 100
//! cpu = 7
//! client = ["sudo", "./client"]
//! mode_path = "/sys/kernel/fibdrv/mode"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu;
use crate::mode::{Mode, DEFAULT_MODE_PATH};
use crate::outlier::{FilterError, OutlierFilter, DEFAULT_SIGNIFICANCE};
use crate::runner::{TrialPlan, DEFAULT_MAX_RETRIES};
use crate::sample::{ClientSource, SampleError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Everything a benchmark run needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Number of client runs per mode
    pub trials: usize,

    /// Offsets (0..offsets) read from every run
    pub offsets: usize,

    /// CPU the client is pinned to; defaults to the last online CPU
    pub cpu: Option<usize>,

    /// Whether to pin the client at all
    pub pin: bool,

    /// Client program followed by its arguments
    pub client: Vec<String>,

    /// Directory the client runs in
    pub workdir: PathBuf,

    /// Side-channel file written by the client, relative to `workdir`
    pub data_file: PathBuf,

    /// Driver mode control file
    pub mode_path: PathBuf,

    /// Extra attempts for a trial whose client exits unsuccessfully
    pub max_retries: u32,

    /// Two-sided significance level of the outlier band
    pub significance: f64,

    /// SVG chart destination
    pub plot: PathBuf,

    /// Optional CSV table destination
    pub csv: Option<PathBuf>,

    /// Optional JSON report destination
    pub json: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            trials: 1000,
            offsets: 100,
            cpu: None,
            pin: true,
            client: vec!["./client".to_string()],
            workdir: PathBuf::from("."),
            data_file: PathBuf::from("data.txt"),
            mode_path: PathBuf::from(DEFAULT_MODE_PATH),
            max_retries: DEFAULT_MAX_RETRIES,
            significance: DEFAULT_SIGNIFICANCE,
            plot: PathBuf::from("runtime.svg"),
            csv: None,
            json: None,
        }
    }
}

impl BenchConfig {
    /// Load a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.trials < 2 {
            return Err(format!(
                "trials must be >= 2 to build a confidence band, got {}",
                self.trials
            ));
        }

        if self.offsets == 0 {
            return Err("offsets must be positive".to_string());
        }

        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(format!(
                "significance must be in (0, 1), got {}",
                self.significance
            ));
        }

        if self.client.is_empty() {
            return Err("client command must not be empty".to_string());
        }

        if let (true, Some(cpu)) = (self.pin, self.cpu) {
            let online = cpu::online_cpus();
            if !online.contains(&cpu) {
                return Err(format!(
                    "cpu {} is not online (highest online cpu is {})",
                    cpu,
                    online.last().copied().unwrap_or(0)
                ));
            }
        }

        Ok(())
    }

    /// CPU to pin the client to, or None when pinning is disabled
    pub fn target_cpu(&self) -> Option<usize> {
        if !self.pin {
            return None;
        }
        Some(self.cpu.unwrap_or_else(cpu::last_online_cpu))
    }

    pub fn plan(&self, mode: Option<Mode>) -> TrialPlan {
        TrialPlan::new(self.trials, self.offsets)
            .with_mode(mode)
            .with_max_retries(self.max_retries)
    }

    pub fn filter(&self) -> Result<OutlierFilter, FilterError> {
        OutlierFilter::new(self.significance)
    }

    pub fn client_source(&self) -> Result<ClientSource, SampleError> {
        Ok(ClientSource::new(&self.client, &self.workdir, &self.data_file)?
            .pinned_to(self.target_cpu()))
    }
}
