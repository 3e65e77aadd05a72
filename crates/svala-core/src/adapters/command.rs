//! External command execution shared by the process-backed adapters.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::error::{Result, SvalaError};

/// Result of one command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl CommandOutput {
    /// Last non-empty stderr line, or the exit code when stderr is silent.
    pub fn failure_summary(&self) -> String {
        match self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => format!("exit code {}: {}", self.exit_code, line.trim()),
            None => format!("exit code {}", self.exit_code),
        }
    }
}

/// Replace `{name}` placeholders in every argument.
pub fn substitute(argv: &[String], vars: &[(&str, String)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{}}}", name), value)
            })
        })
        .collect()
}

/// Display form of a path for use as a command argument.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Run `argv`, optionally feeding `stdin`, bounded by `timeout_secs`
/// (0 disables the bound). The child is killed when the bound is hit.
pub async fn run_command(
    operation: &str,
    argv: &[String],
    stdin: Option<&str>,
    timeout_secs: u64,
) -> Result<CommandOutput> {
    let start = Instant::now();

    let (exe, args) = argv.split_first().ok_or_else(|| {
        SvalaError::InvalidConfig(format!("{} has an empty command", operation))
    })?;

    debug!(operation = %operation, command = %argv.join(" "), "spawning command");
    let mut child = Command::new(exe)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(text.as_bytes()).await?;
        pipe.shutdown().await?;
    }

    let output = if timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| SvalaError::Timeout {
                operation: operation.to_string(),
                secs: timeout_secs,
            })??
    } else {
        child.wait_with_output().await?
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: output.status.success(),
    })
}
