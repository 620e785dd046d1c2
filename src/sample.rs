//! Raw timing samples produced by the fibdrv client
//!
//! Every client run overwrites one side-channel file with a row per offset:
//!
//! ```text
//! index user_ns kernel_ns
//! ```
//!
//! [`ClientSource`] launches the client pinned to a single CPU and reads that
//! file back. Anything else implementing [`SampleSource`] (including a plain
//! closure) can stand in for it.

use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::errno::Errno;
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, trace};

/// One row of the side-channel file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    /// Offset (the n of F(n)) this row was measured at
    pub index: u64,
    /// Round-trip time of the read() as seen from user space
    pub user_ns: u64,
    /// Time spent computing inside the driver
    pub kernel_ns: u64,
}

impl RawSample {
    pub fn new(index: u64, user_ns: u64, kernel_ns: u64) -> Self {
        Self {
            index,
            user_ns,
            kernel_ns,
        }
    }
}

/// Errors raised while producing one trial's samples
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Client command is empty")]
    EmptyCommand,

    #[error("Failed to launch client {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Client exited unsuccessfully ({reason})")]
    InvocationFailed { reason: String },

    #[error("Failed to pin client to CPU {cpu}: {source}")]
    Affinity {
        cpu: usize,
        #[source]
        source: nix::Error,
    },

    #[error("Failed to access sample file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Sample file has {found} rows, expected at least {expected}")]
    Truncated { expected: usize, found: usize },

    #[error("Malformed sample at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl SampleError {
    /// Whether another attempt at the same trial could succeed
    pub fn is_invocation_failure(&self) -> bool {
        matches!(self, SampleError::InvocationFailed { .. })
    }
}

/// Something that performs one measurement and returns its rows
pub trait SampleSource {
    /// Run one trial and return at least `offsets` rows, ordered by offset
    fn collect(&mut self, offsets: usize) -> Result<Vec<RawSample>, SampleError>;
}

impl<F> SampleSource for F
where
    F: FnMut(usize) -> Result<Vec<RawSample>, SampleError>,
{
    fn collect(&mut self, offsets: usize) -> Result<Vec<RawSample>, SampleError> {
        self(offsets)
    }
}

/// Parse the first `offsets` rows of a side-channel file
///
/// Blank lines are skipped. Rows after the first `offsets` are ignored
/// without being validated. Each row's index must equal its position.
pub fn parse_samples(text: &str, offsets: usize) -> Result<Vec<RawSample>, SampleError> {
    let mut rows = Vec::with_capacity(offsets);

    for (line_no, line) in text.lines().enumerate() {
        if rows.len() == offsets {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line_no = line_no + 1;
        let mut fields = line.split_whitespace();
        let index = parse_field(fields.next(), line_no, "index")?;
        let user_ns = parse_field(fields.next(), line_no, "user time")?;
        let kernel_ns = parse_field(fields.next(), line_no, "kernel time")?;

        if let Some(extra) = fields.next() {
            return Err(SampleError::Malformed {
                line: line_no,
                reason: format!("unexpected trailing field '{}'", extra),
            });
        }

        let expected = rows.len() as u64;
        if index != expected {
            return Err(SampleError::Malformed {
                line: line_no,
                reason: format!("index {} out of sequence, expected {}", index, expected),
            });
        }

        rows.push(RawSample::new(index, user_ns, kernel_ns));
    }

    if rows.len() < offsets {
        return Err(SampleError::Truncated {
            expected: offsets,
            found: rows.len(),
        });
    }

    Ok(rows)
}

fn parse_field(field: Option<&str>, line: usize, name: &str) -> Result<u64, SampleError> {
    let raw = field.ok_or_else(|| SampleError::Malformed {
        line,
        reason: format!("missing {}", name),
    })?;
    raw.parse::<u64>().map_err(|_| SampleError::Malformed {
        line,
        reason: format!("{} '{}' is not a non-negative integer", name, raw),
    })
}

/// Launches the external client once per trial and reads its output
#[derive(Debug, Clone)]
pub struct ClientSource {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    data_file: PathBuf,
    cpu: Option<usize>,
}

impl ClientSource {
    /// `command[0]` is the program, the rest are its arguments.
    ///
    /// The client runs inside `workdir`; a relative `data_file` is resolved
    /// against it.
    pub fn new(
        command: &[String],
        workdir: impl AsRef<Path>,
        data_file: impl AsRef<Path>,
    ) -> Result<Self, SampleError> {
        let (program, args) = command.split_first().ok_or(SampleError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            workdir: workdir.as_ref().to_path_buf(),
            data_file: data_file.as_ref().to_path_buf(),
            cpu: None,
        })
    }

    /// Pin every launched client to `cpu` (None leaves scheduling alone)
    pub fn pinned_to(mut self, cpu: Option<usize>) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn cpu(&self) -> Option<usize> {
        self.cpu
    }

    /// Absolute or workdir-relative location of the side-channel file
    pub fn data_path(&self) -> PathBuf {
        self.workdir.join(&self.data_file)
    }

    fn clear_previous(&self, path: &Path) -> Result<(), SampleError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SampleError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn launch(&self) -> Result<(), SampleError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(cpu) = self.cpu {
            let mut cpu_set = CpuSet::new();
            cpu_set
                .set(cpu)
                .map_err(|source| SampleError::Affinity { cpu, source })?;
            // SAFETY: the hook only issues sched_setaffinity(2), which is
            // async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(move || {
                    sched_setaffinity(Pid::from_raw(0), &cpu_set).map_err(io::Error::from)
                });
            }
        }

        trace!(program = %self.program, cpu = ?self.cpu, "launching client");
        let status = cmd.status().map_err(|source| match self.cpu {
            // The pre_exec hook fails with EINVAL when the CPU is offline or absent.
            Some(cpu) if source.raw_os_error() == Some(Errno::EINVAL as i32) => {
                SampleError::Affinity {
                    cpu,
                    source: Errno::EINVAL,
                }
            }
            _ => SampleError::Launch {
                program: self.program.clone(),
                source,
            },
        })?;

        if !status.success() {
            return Err(SampleError::InvocationFailed {
                reason: status.to_string(),
            });
        }
        Ok(())
    }
}

impl SampleSource for ClientSource {
    fn collect(&mut self, offsets: usize) -> Result<Vec<RawSample>, SampleError> {
        let path = self.data_path();

        // The file is a single shared slot; a stale copy must never pass for
        // this trial's output.
        self.clear_previous(&path)?;
        self.launch()?;

        let text = fs::read_to_string(&path).map_err(|source| SampleError::Io {
            path: path.clone(),
            source,
        })?;
        let rows = parse_samples(&text, offsets)?;
        debug!(path = %path.display(), rows = rows.len(), "read client samples");
        Ok(rows)
    }
}
