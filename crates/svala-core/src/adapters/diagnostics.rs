//! Visual diagnostics backed by an external command.

use async_trait::async_trait;

use super::command::{path_arg, run_command, substitute};
use crate::collaborators::{DiagnosticsRequest, VisualDiagnostics};
use crate::domain::error::{Result, SvalaError};

/// Runs a vision command for one screenshot; its stdout is the report.
///
/// Placeholders: `{frame}` (screenshot index), `{screenshots}`, `{scenario}`,
/// `{task}`, `{iteration}`.
#[derive(Debug, Clone)]
pub struct CommandDiagnostics {
    command: Vec<String>,
    timeout_secs: u64,
}

impl CommandDiagnostics {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout_secs: 300,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl VisualDiagnostics for CommandDiagnostics {
    async fn describe(&self, request: &DiagnosticsRequest<'_>) -> Result<String> {
        let screenshots = request
            .screenshots_dir
            .as_deref()
            .ok_or_else(|| SvalaError::Diagnostics("no screenshots were captured".into()))?;

        let argv = substitute(
            &self.command,
            &[
                ("frame", request.screenshot_index.to_string()),
                ("screenshots", path_arg(screenshots)),
                ("scenario", request.scenario_id.to_string()),
                ("task", request.task.to_string()),
                ("iteration", request.iteration.to_string()),
            ],
        );

        let output = run_command("visual diagnostics", &argv, None, self.timeout_secs)
            .await
            .map_err(|e| SvalaError::Diagnostics(e.to_string()))?;
        if !output.success {
            return Err(SvalaError::Diagnostics(output.failure_summary()));
        }
        let report = output.stdout.trim();
        if report.is_empty() {
            return Err(SvalaError::Diagnostics("diagnostics command printed nothing".into()));
        }
        Ok(report.to_string())
    }
}
