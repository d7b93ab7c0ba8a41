//! Subprocess plumbing shared by the external engines.

use std::env;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Longest stderr excerpt carried into an engine failure.
const STDERR_EXCERPT_CHARS: usize = 400;

#[derive(Debug, Error)]
pub(crate) enum ProcessError {
    #[error("executable not found: {0}")]
    NotFound(io::Error),
    #[error("process I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Kills and reaps the child when dropped, unless it already exited.
///
/// The child leads its own process group. Killing it also kills the group,
/// so renderer and GPU helpers spawned by a browser go down with it.
pub(crate) struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub(crate) fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => {
                let status = child.try_wait()?;
                if status.is_some() {
                    // Helpers may outlive a leader that exited on its own.
                    kill_process_group(child.id());
                    self.child = None;
                }
                Ok(status)
            }
            None => Ok(None),
        }
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_process_group(child.id());
            if let Err(e) = child.kill() {
                log::debug!("kill of pid {} failed: {e}", child.id());
            }
            let _ = child.wait();
        }
    }
}

/// Put the spawned process at the head of a new process group.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    // A negative pid addresses the group; ESRCH for an empty group is fine.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Exit status plus captured stderr of a finished process.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ProcessOutput {
    /// Trimmed, bounded stderr for error messages.
    pub(crate) fn stderr_excerpt(&self) -> String {
        let trimmed = self.stderr.trim();
        let mut excerpt: String = trimmed.chars().take(STDERR_EXCERPT_CHARS).collect();
        if trimmed.chars().count() > STDERR_EXCERPT_CHARS {
            excerpt.push_str("...");
        }
        excerpt
    }
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Stderr goes to an anonymous temp file rather than a pipe, so a browser
/// whose helper processes keep the descriptor open cannot stall the read.
pub(crate) fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut stderr_file = tempfile::tempfile()?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file.try_clone()?));
    own_process_group(&mut command);

    let child = command.spawn().map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            ProcessError::NotFound(err)
        } else {
            ProcessError::Io(err)
        }
    })?;
    let mut guard = ChildGuard::new(child);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = guard.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            guard.kill();
            return Err(ProcessError::TimedOut(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(ProcessOutput {
        status,
        stderr: read_log(&mut stderr_file)?,
    })
}

fn read_log(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// First of `candidates` that resolves to a file on `path_var`.
///
/// A candidate containing a path separator is checked as given.
pub(crate) fn find_executable<S: AsRef<OsStr>>(
    candidates: &[&str],
    path_var: Option<S>,
) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = path_var
        .map(|p| env::split_paths(p.as_ref()).collect())
        .unwrap_or_default();
    candidates.iter().find_map(|name| {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|full| full.is_file())
    })
}
