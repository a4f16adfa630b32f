//! Bounded subprocess execution.
//!
//! Every command runs in its own process group with stdin closed and
//! stdout/stderr captured. Output beyond the byte ceiling is read and
//! discarded so the child never blocks on a full pipe. When the timeout
//! expires the whole group is killed, which also takes down any helpers the
//! command forked.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Default per-command timeout.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(8);

/// Default cap on captured stdout + stderr.
pub const MAX_OUTPUT_BYTES: usize = 262_144;

/// Directories searched before `PATH`. System tools live in `sbin` on the
/// devices this runs on, which is often missing from a service's `PATH`.
const SEARCH_DIRS: &[&str] = &["/usr/sbin", "/sbin", "/usr/bin", "/bin"];

const FAILURE_OUTPUT_CHARS: usize = 180;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Exited(i32),
    Signaled(i32),
    TimedOut,
}

impl From<ExitStatus> for CommandStatus {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => CommandStatus::Exited(code),
            (None, Some(signal)) => CommandStatus::Signaled(signal),
            (None, None) => CommandStatus::Exited(-1),
        }
    }
}

/// Captured output and final status of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// stdout followed by stderr, lossily decoded, capped.
    pub output: String,
    pub status: CommandStatus,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Exited(0)
    }
}

/// Locate `program` in the system directories, then leave it to `PATH`.
pub fn resolve_executable(program: &str) -> PathBuf {
    if program.contains('/') {
        return PathBuf::from(program);
    }
    SEARCH_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(program))
}

/// Run `program` with `args`, waiting at most `timeout`.
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
    max_output: usize,
) -> Result<CommandResult, CommandError> {
    let executable = resolve_executable(program);
    debug!(program = %executable.display(), ?args, "running command");

    let mut child = Command::new(&executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let outcome = tokio::time::timeout(timeout, async {
        let (out, err) = tokio::join!(read_capped(stdout, max_output), read_capped(stderr, max_output));
        let status = child.wait().await;
        (out, err, status)
    })
    .await;

    match outcome {
        Ok((mut out, err, status)) => {
            let status = status.map_err(|source| CommandError::Wait {
                program: program.to_string(),
                source,
            })?;
            out.extend_from_slice(&err);
            out.truncate(max_output);
            Ok(CommandResult {
                output: String::from_utf8_lossy(&out).into_owned(),
                status: status.into(),
            })
        }
        Err(_) => {
            warn!(program, timeout_ms = timeout.as_millis() as u64, "command timed out");
            if let Some(pid) = pid {
                if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                    debug!(program, error = %e, "killpg failed");
                }
            }
            let _ = child.wait().await;
            Ok(CommandResult {
                output: String::new(),
                status: CommandStatus::TimedOut,
            })
        }
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> Vec<u8> {
    let mut captured = Vec::new();
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.len());
                captured.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    captured
}

/// Collapse output onto one trimmed line of at most `max_chars` characters.
pub fn one_line(output: &str, max_chars: usize) -> String {
    let flat: String = output
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// `"<label> failed (timed out|exit=N): <output>"`.
pub fn describe_failure(label: &str, result: &CommandResult) -> String {
    let mut details = format!("{} failed", label);
    match result.status {
        CommandStatus::TimedOut => details.push_str(" (timed out)"),
        CommandStatus::Exited(code) if code >= 0 => details.push_str(&format!(" (exit={})", code)),
        _ => {}
    }
    let output = one_line(&result.output, FAILURE_OUTPUT_CHARS);
    if !output.is_empty() {
        details.push_str(": ");
        details.push_str(&output);
    } else if result.status == CommandStatus::TimedOut {
        details.push_str(": command timed out");
    }
    details
}
