//! Built-in static analyzer: source line metrics plus an optional linter.

use std::collections::BTreeMap;
use std::fmt::Write;

use async_trait::async_trait;
use regex::Regex;

use super::command::{path_arg, run_command, substitute};
use crate::collaborators::{StaticAnalyzer, StaticReport};
use crate::domain::artifact::ControllerArtifact;
use crate::domain::error::{Result, SvalaError};

/// Line-level metrics of a controller source file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceMetrics {
    pub lines_of_code: u32,
    pub logical_lines: u32,
    pub comment_lines: u32,
    pub blank_lines: u32,
    pub function_count: u32,
}

impl SourceMetrics {
    pub fn measure(source: &str) -> Self {
        let mut m = Self::default();
        for line in source.lines() {
            m.lines_of_code += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                m.blank_lines += 1;
            } else if trimmed.starts_with('#') {
                m.comment_lines += 1;
            } else {
                m.logical_lines += 1;
                if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
                    m.function_count += 1;
                }
            }
        }
        m
    }

    /// Logical lines over total lines; zero for an empty file.
    pub fn code_density(&self) -> f64 {
        if self.lines_of_code == 0 {
            0.0
        } else {
            f64::from(self.logical_lines) / f64::from(self.lines_of_code)
        }
    }
}

/// Linter findings split into errors and warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintFindings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Classify linter output lines: codes starting with `E` are errors,
/// everything else is a warning.
pub fn classify_lint_output(output: &str) -> LintFindings {
    let code_re = Regex::new(r"(?:^|\s)([A-Z]+)\d+\b").ok();
    let mut findings = LintFindings::default();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let code = code_re
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(line);
        if code.starts_with('E') {
            findings.errors.push(line.to_string());
        } else {
            findings.warnings.push(line.to_string());
        }
    }
    findings
}

/// Static analyzer reporting [`SourceMetrics`] and, when a lint command is
/// configured (placeholder `{file}`), its findings.
#[derive(Debug, Clone)]
pub struct SourceMetricsAnalyzer {
    lint_command: Option<Vec<String>>,
    timeout_secs: u64,
}

impl SourceMetricsAnalyzer {
    pub fn new() -> Self {
        Self {
            lint_command: None,
            timeout_secs: 120,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_lint_command(mut self, command: Vec<String>) -> Self {
        self.lint_command = Some(command);
        self
    }

    async fn lint(&self, command: &[String], artifact: &ControllerArtifact) -> Result<LintFindings> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join(&artifact.file_name);
        std::fs::write(&file, &artifact.source)?;

        let argv = substitute(command, &[("file", path_arg(&file))]);
        let output = run_command("lint", &argv, None, self.timeout_secs)
            .await
            .map_err(|e| SvalaError::StaticAnalysis(e.to_string()))?;
        Ok(classify_lint_output(&output.stdout))
    }
}

impl Default for SourceMetricsAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StaticAnalyzer for SourceMetricsAnalyzer {
    async fn analyze(&self, artifact: &ControllerArtifact) -> Result<StaticReport> {
        let m = SourceMetrics::measure(&artifact.source);
        let mut metrics = BTreeMap::new();
        metrics.insert("lines_of_code".to_string(), f64::from(m.lines_of_code));
        metrics.insert("logical_lines".to_string(), f64::from(m.logical_lines));
        metrics.insert("comment_lines".to_string(), f64::from(m.comment_lines));
        metrics.insert("blank_lines".to_string(), f64::from(m.blank_lines));
        metrics.insert("function_count".to_string(), f64::from(m.function_count));
        metrics.insert("code_density".to_string(), m.code_density());

        let mut text = String::new();
        let _ = writeln!(text, "Static Code analysis for iteration {}:", artifact.iteration);
        let _ = writeln!(
            text,
            "code_analysis: lines_of_code: {}, logical_lines: {}, comment_lines: {}, blank_lines: {}, function_count: {}, code_density: {:.2}",
            m.lines_of_code,
            m.logical_lines,
            m.comment_lines,
            m.blank_lines,
            m.function_count,
            m.code_density()
        );

        if let Some(command) = &self.lint_command {
            let findings = self.lint(command, artifact).await?;
            metrics.insert("lint_errors".to_string(), findings.errors.len() as f64);
            metrics.insert("lint_warnings".to_string(), findings.warnings.len() as f64);
            let _ = writeln!(
                text,
                "lint: {} errors, {} warnings",
                findings.errors.len(),
                findings.warnings.len()
            );
            for issue in findings.errors.iter().chain(&findings.warnings) {
                let _ = writeln!(text, "  {}", issue);
            }
        }

        Ok(StaticReport { text, metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "# version 1\nimport math\n\nclass CustomController:\n    def step(self, s):\n        return s  # keep\n";

    #[test]
    fn test_measure() {
        let m = SourceMetrics::measure(SOURCE);
        assert_eq!(m.lines_of_code, 6);
        assert_eq!(m.blank_lines, 1);
        assert_eq!(m.comment_lines, 1);
        assert_eq!(m.logical_lines, 4);
        assert_eq!(m.function_count, 1);
        assert!((m.code_density() - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(SourceMetrics::measure("").code_density(), 0.0);
    }

    #[test]
    fn test_classify_flake8_output() {
        let out = "c.py:1:1: E302 expected 2 blank lines\nc.py:4:80: W291 trailing whitespace\nc.py:2:1: F401 'math' imported but unused\n";
        let findings = classify_lint_output(out);
        assert_eq!(findings.errors.len(), 1);
        assert_eq!(findings.warnings.len(), 2);
        assert!(findings.errors[0].contains("E302"));
    }

    #[tokio::test]
    async fn test_analyze_without_linter() {
        let artifact = ControllerArtifact::new(3, "custom_controller.py", SOURCE);
        let report = SourceMetricsAnalyzer::new()
            .analyze(&artifact)
            .await
            .expect("analyze");
        assert!(report.text.starts_with("Static Code analysis for iteration 3:"));
        assert_eq!(report.metrics["lines_of_code"], 6.0);
        assert!(!report.metrics.contains_key("lint_errors"));
    }

    #[tokio::test]
    async fn test_analyze_with_linter() {
        let artifact = ControllerArtifact::new(0, "custom_controller.py", SOURCE);
        let report = SourceMetricsAnalyzer::new()
            .with_lint_command(vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo \"$0:1:1: E302 expected 2 blank lines\"".to_string(),
                "{file}".to_string(),
            ])
            .analyze(&artifact)
            .await
            .expect("analyze");
        assert_eq!(report.metrics["lint_errors"], 1.0);
        assert_eq!(report.metrics["lint_warnings"], 0.0);
        assert!(report.text.contains("lint: 1 errors, 0 warnings"));
    }
}
