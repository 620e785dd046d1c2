//! Kernel-side computation mode selection
//!
//! The driver exposes a control file that accepts a single integer. The value
//! stays in effect for every later read until it is changed again.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Default sysfs attribute controlling the driver's algorithm
pub const DEFAULT_MODE_PATH: &str = "/sys/kernel/fibdrv/mode";

/// Fibonacci strategy used by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Iterative big-number addition
    Original,
    /// Fast doubling with big-number multiplication
    FastDoubling,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Original, Mode::FastDoubling];

    /// Value written to the control file
    pub fn selector(self) -> u32 {
        match self {
            Mode::Original => 0,
            Mode::FastDoubling => 1,
        }
    }

    /// Series label used in comparison output
    pub fn label(self) -> &'static str {
        match self {
            Mode::Original => "original",
            Mode::FastDoubling => "fast doubling",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug)]
pub enum ModeError {
    #[error("Failed to select mode '{mode}' via {path:?}: {source}")]
    Write {
        mode: Mode,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Mode '{mode}' rejected: {reason}")]
    Rejected { mode: Mode, reason: String },
}

/// Applies a mode before a batch of trials
pub trait ModeSwitch {
    fn select(&mut self, mode: Mode) -> Result<(), ModeError>;
}

/// Writes the mode selector to a sysfs attribute
#[derive(Debug, Clone)]
pub struct SysfsModeSwitch {
    path: PathBuf,
}

impl SysfsModeSwitch {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for SysfsModeSwitch {
    fn default() -> Self {
        Self::new(DEFAULT_MODE_PATH)
    }
}

impl ModeSwitch for SysfsModeSwitch {
    fn select(&mut self, mode: Mode) -> Result<(), ModeError> {
        fs::write(&self.path, format!("{}\n", mode.selector()))
            .map_err(|source| write_error(mode, &self.path, source))?;
        info!(mode = %mode, path = %self.path.display(), "selected driver mode");
        Ok(())
    }
}

/// The attribute's store handler answers an unsupported selector with EINVAL
fn write_error(mode: Mode, path: &Path, source: io::Error) -> ModeError {
    if source.raw_os_error() == Some(Errno::EINVAL as i32) {
        return ModeError::Rejected {
            mode,
            reason: format!("{} does not accept selector {}", path.display(), mode.selector()),
        };
    }
    ModeError::Write {
        mode,
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(Mode::Original.selector(), 0);
        assert_eq!(Mode::FastDoubling.selector(), 1);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Mode::Original.to_string(), "original");
        assert_eq!(Mode::FastDoubling.to_string(), "fast doubling");
    }

    #[test]
    fn test_sysfs_switch_writes_selector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mode");
        let mut switch = SysfsModeSwitch::new(&path);
        switch.select(Mode::FastDoubling).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\n");
        switch.select(Mode::Original).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\n");
    }

    #[test]
    fn test_sysfs_switch_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut switch = SysfsModeSwitch::new(dir.path().join("missing").join("mode"));
        let err = switch.select(Mode::Original).unwrap_err();
        assert!(matches!(err, ModeError::Write { .. }));
        assert!(err.to_string().contains("original"));
    }

    #[test]
    fn test_einval_from_attribute_is_rejection() {
        let path = Path::new(DEFAULT_MODE_PATH);
        let err = write_error(
            Mode::FastDoubling,
            path,
            io::Error::from_raw_os_error(Errno::EINVAL as i32),
        );
        match err {
            ModeError::Rejected { mode, reason } => {
                assert_eq!(mode, Mode::FastDoubling);
                assert!(reason.contains("selector 1"), "{}", reason);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_other_write_errors_stay_write_errors() {
        let err = write_error(
            Mode::Original,
            Path::new(DEFAULT_MODE_PATH),
            io::Error::from_raw_os_error(Errno::EACCES as i32),
        );
        assert!(matches!(err, ModeError::Write { .. }));
    }

    #[test]
    fn test_mode_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: Mode,
        }
        let w: Wrapper = toml::from_str("mode = \"fast-doubling\"").unwrap();
        assert_eq!(w.mode, Mode::FastDoubling);
    }
}
