//! External process execution.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

/// Everything needed to spawn one process.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub env: &'a BTreeMap<String, String>,
    pub cwd: Option<&'a Path>,
    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,
}

/// Result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub program: String,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl ProcessOutput {
    /// Whether the process exited with status 0.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last `lines` lines of stderr, for error messages.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        all[all.len().saturating_sub(lines)..].join("\n")
    }
}

/// Spawn `invocation`, wait for it, and capture its output.
///
/// A timed-out process is killed and reported as an error.
pub async fn execute(invocation: &Invocation<'_>) -> anyhow::Result<ProcessOutput> {
    let start = Instant::now();

    let mut command = Command::new(invocation.program);
    command
        .args(invocation.args)
        .envs(invocation.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = invocation.cwd {
        command.current_dir(cwd);
    }
    debug!(program = invocation.program, args = ?invocation.args, "spawning");

    let child = command
        .spawn()
        .map_err(|e| anyhow::anyhow!("failed to spawn {}: {}", invocation.program, e))?;

    let output = if invocation.timeout_secs > 0 {
        tokio::time::timeout(
            Duration::from_secs(invocation.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "{} timed out after {} seconds",
                invocation.program,
                invocation.timeout_secs
            )
        })??
    } else {
        child.wait_with_output().await?
    };

    Ok(ProcessOutput {
        program: invocation.program.to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: output.status.success(),
    })
}
