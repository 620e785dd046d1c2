//! CLI argument parsing for fibbench

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::BenchConfig;
use crate::mode::Mode;

#[derive(Parser, Debug)]
#[command(name = "fibbench")]
#[command(version)]
#[command(about = "Pinned-CPU latency benchmark for the fibdrv kernel module", long_about = None)]
pub struct Cli {
    /// Load settings from a TOML file (flags still override it)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable trace-level logging on stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// Hide the progress bar and the summary table
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// User, kernel and kernel-to-user time of a single mode
    Breakdown {
        /// Driver mode to select before measuring (leave unset to keep the current one)
        #[arg(long = "mode", value_enum)]
        mode: Option<Mode>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// User time of the original and fast doubling modes side by side
    Compare {
        #[command(flatten)]
        run: RunArgs,
    },
}

impl Command {
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Command::Breakdown { run, .. } | Command::Compare { run } => run,
        }
    }
}

/// Flags shared by every subcommand; each overrides the config file
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Number of client runs per mode
    #[arg(short = 'n', long = "trials", value_name = "N")]
    pub trials: Option<usize>,

    /// Offsets read from every run
    #[arg(short = 'k', long = "offsets", value_name = "K")]
    pub offsets: Option<usize>,

    /// CPU to pin the client to (default: last online CPU)
    #[arg(long = "cpu", value_name = "CPU")]
    pub cpu: Option<usize>,

    /// Do not pin the client to a CPU
    #[arg(long = "no-pin")]
    pub no_pin: bool,

    /// Directory the client runs in
    #[arg(long = "workdir", value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Sample file written by the client
    #[arg(long = "data-file", value_name = "FILE")]
    pub data_file: Option<PathBuf>,

    /// Driver mode control file
    #[arg(long = "mode-path", value_name = "FILE")]
    pub mode_path: Option<PathBuf>,

    /// Extra attempts for a trial whose client exits unsuccessfully
    #[arg(long = "max-retries", value_name = "N")]
    pub max_retries: Option<u32>,

    /// Two-sided significance level of the outlier band
    #[arg(long = "significance", value_name = "ALPHA")]
    pub significance: Option<f64>,

    /// Chart output path
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also write the table as CSV
    #[arg(long = "csv", value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Also write a JSON report
    #[arg(long = "json", value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Client command (everything after --)
    #[arg(last = true)]
    pub client: Vec<String>,
}

impl RunArgs {
    /// Layer these flags on top of `config`
    pub fn apply_to(&self, config: &mut BenchConfig) {
        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        if let Some(offsets) = self.offsets {
            config.offsets = offsets;
        }
        if let Some(cpu) = self.cpu {
            config.cpu = Some(cpu);
        }
        if self.no_pin {
            config.pin = false;
        }
        if let Some(workdir) = &self.workdir {
            config.workdir = workdir.clone();
        }
        if let Some(data_file) = &self.data_file {
            config.data_file = data_file.clone();
        }
        if let Some(mode_path) = &self.mode_path {
            config.mode_path = mode_path.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(significance) = self.significance {
            config.significance = significance;
        }
        if let Some(output) = &self.output {
            config.plot = output.clone();
        }
        if self.csv.is_some() {
            config.csv = self.csv.clone();
        }
        if self.json.is_some() {
            config.json = self.json.clone();
        }
        if !self.client.is_empty() {
            config.client = self.client.clone();
        }
    }
}
