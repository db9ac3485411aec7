//! Subprocess execution with guaranteed cleanup
//!
//! Every analyzer and LLM backend invocation goes through [`run_command`].
//! On timeout the child gets SIGTERM, a short grace period, then SIGKILL;
//! the handle is always awaited so no zombie remains.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use eyre::{Result, eyre};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Captured result of a subprocess run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; None when the process was killed
    pub exit_code: Option<i32>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Whether the deadline fired
    pub timed_out: bool,

    /// Wall-clock run time
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Exited normally with code zero
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `argv` with an optional stdin payload and a hard deadline
///
/// Stdout and stderr are drained concurrently so a chatty child cannot
/// block on a full pipe. A timed-out run returns `Ok` with
/// `timed_out = true` rather than an error; spawn failures are errors.
pub async fn run_command(
    argv: &[String],
    stdin_data: Option<&str>,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<ProcessOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| eyre!("empty command"))?;
    debug!(%program, args = ?args, timeout_ms = timeout.as_millis() as u64, "run_command: called");

    let start = Instant::now();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin_data.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;

    if let Some(data) = stdin_data
        && let Some(mut stdin) = child.stdin.take()
    {
        // Feed stdin off the main path so a child that never reads
        // cannot stall us past the pipe buffer; write errors just mean
        // the child exited early
        let data = data.to_string();
        tokio::spawn(async move {
            let _ = stdin.write_all(data.as_bytes()).await;
        });
    }

    let stdout_pipe = child.stdout.take().ok_or_else(|| eyre!("failed to capture stdout"))?;
    let stderr_pipe = child.stderr.take().ok_or_else(|| eyre!("failed to capture stderr"))?;

    let stdout_task = tokio::spawn(read_to_string(stdout_pipe));
    let stderr_task = tokio::spawn(read_to_string(stderr_pipe));

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(e)) => {
            debug!(error = %e, "run_command: wait failed");
            return Err(e.into());
        }
        Err(_) => {
            warn!(%program, timeout_ms = timeout.as_millis() as u64, "run_command: deadline exceeded, terminating");
            terminate(&mut child).await;
            (None, true)
        }
    };

    // The pipes close once the child is gone, so these always finish
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(?exit_code, timed_out, duration_ms, "run_command: finished");

    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration_ms,
    })
}

/// SIGTERM, grace period, SIGKILL; always reaps the child
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            debug!(pid, "terminate: child exited on SIGTERM");
            return;
        }
        debug!(pid, "terminate: escalating to SIGKILL");
    }
    // kill() sends SIGKILL and awaits the handle
    if let Err(e) = child.kill().await {
        warn!(error = %e, "terminate: kill failed");
    }
    let _ = child.wait().await;
}

async fn read_to_string(mut pipe: impl AsyncReadExt + Unpin) -> String {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}

/// Locate an executable on the process PATH
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// File exists and has an execute bit set
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
