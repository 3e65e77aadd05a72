//! Controller synthesizers: an external generator command and an HTTP job API.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::command::{path_arg, run_command, substitute};
use crate::collaborators::{ControllerSynthesizer, SynthesisOutcome, SynthesisRequest};
use crate::domain::artifact::ControllerArtifact;
use crate::domain::error::{Result, SvalaError};

pub const DEFAULT_CONTROLLER_FILE: &str = "custom_controller.py";

/// Poll `status` every `interval` until `is_terminal` accepts its value.
///
/// Returns [`SvalaError::Timeout`] once `timeout` has elapsed and
/// [`SvalaError::Cancelled`] as soon as `cancel` is set.
pub async fn poll_until_terminal<T, F, Fut>(
    operation: &str,
    mut status: F,
    is_terminal: impl Fn(&T) -> bool,
    interval: Duration,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(SvalaError::Cancelled(operation.to_string()));
        }
        let value = status().await?;
        if is_terminal(&value) {
            return Ok(value);
        }
        if Instant::now() + interval > deadline {
            return Err(SvalaError::Timeout {
                operation: operation.to_string(),
                secs: timeout.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

// ---------------------------------------------------------------------------
// CommandSynthesizer
// ---------------------------------------------------------------------------

/// Runs a generator command with the prompt on stdin.
///
/// Placeholders: `{iteration}` and `{output}`, the path the command must
/// write the controller to. Each request gets a fresh output directory, so a
/// command that writes nothing can never hand back an older controller.
/// Whatever the command prints on stdout is kept as the transcript.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    command: Vec<String>,
    timeout_secs: u64,
    file_name: String,
}

impl CommandSynthesizer {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout_secs: 900,
            file_name: DEFAULT_CONTROLLER_FILE.to_string(),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }
}

#[async_trait]
impl ControllerSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        let fail = |reason: String| SvalaError::Synthesis {
            iteration: request.iteration,
            reason,
        };

        let workdir = tempfile::tempdir()?;
        let output = workdir.path().join(&self.file_name);
        let argv = substitute(
            &self.command,
            &[
                ("iteration", request.iteration.to_string()),
                ("output", path_arg(&output)),
            ],
        );

        let result = run_command("synthesis", &argv, Some(&request.prompt), self.timeout_secs)
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !result.success {
            return Err(fail(format!("generator failed: {}", result.failure_summary())));
        }

        let source = std::fs::read_to_string(&output)
            .map_err(|e| fail(format!("generator did not write a controller: {}", e)))?;
        let artifact = ControllerArtifact::new(request.iteration, &self.file_name, source);
        Ok(SynthesisOutcome::new(artifact).with_transcript(result.stdout.trim_end()))
    }
}

// ---------------------------------------------------------------------------
// UnconfiguredSynthesizer
// ---------------------------------------------------------------------------

/// Stand-in used when no synthesizer is configured; every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSynthesizer;

#[async_trait]
impl ControllerSynthesizer for UnconfiguredSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        Err(SvalaError::Synthesis {
            iteration: request.iteration,
            reason: "no synthesizer is configured".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// HttpSynthesizer
// ---------------------------------------------------------------------------

/// Status of a remote synthesis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    RequiresAction,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobStatus::Queued | JobStatus::InProgress | JobStatus::Cancelling
        )
    }
}

#[derive(Debug, Serialize)]
struct CreateJob<'a> {
    prompt: &'a str,
    iteration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    id: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

/// A file attached to a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobFile {
    pub name: String,
    pub content: String,
}

/// One message of the job's conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JobState {
    status: JobStatus,
    #[serde(default)]
    files: Vec<JobFile>,
    #[serde(default)]
    messages: Vec<JobMessage>,
    #[serde(default)]
    error: Option<String>,
}

/// Synthesizer talking to an LLM job service.
///
/// `POST {endpoint}/jobs` submits `{prompt, iteration, conversation_id}` and
/// returns `{id, conversation_id}`; `GET {endpoint}/jobs/{id}` reports
/// `{status, files: [{name, content}], messages: [{role, content}], error}`.
/// The conversation id of the
/// first job is reused for every later request so corrections stay in one
/// thread.
#[derive(Debug)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    poll_interval: Duration,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
    conversation: Mutex<Option<String>>,
}

impl HttpSynthesizer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: None,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(900),
            cancel: Arc::new(AtomicBool::new(false)),
            conversation: Mutex::new(None),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Poll against an externally owned cancel flag.
    pub fn with_cancel_handle(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag that aborts any in-flight poll when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.conversation.lock().ok().and_then(|c| c.clone())
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn submit(&self, request: &SynthesisRequest) -> Result<JobCreated> {
        let body = CreateJob {
            prompt: &request.prompt,
            iteration: request.iteration,
            conversation_id: self.conversation_id(),
        };
        let created: JobCreated = self
            .authorize(self.client.post(format!("{}/jobs", self.endpoint)))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created)
    }

    async fn job_state(&self, id: &str) -> Result<JobState> {
        let state: JobState = self
            .authorize(self.client.get(format!("{}/jobs/{}", self.endpoint, id)))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(state)
    }
}

/// Render a conversation as numbered blocks separated by dashed rules.
pub fn render_transcript(messages: &[JobMessage]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }
    let mut out = String::new();
    for (i, message) in messages.iter().enumerate() {
        out.push_str(&format!(
            "Message number: {}\n{}: {}\n{}\n",
            i,
            message.role,
            message.content.trim_end(),
            "-".repeat(20)
        ));
    }
    Some(out)
}

/// The single controller file of a completed job.
pub fn single_controller(files: Vec<JobFile>) -> std::result::Result<JobFile, String> {
    let count = files.len();
    let mut files = files.into_iter();
    match (files.next(), count) {
        (Some(file), 1) => Ok(file),
        _ => Err(format!("expected exactly one controller file, got {}", count)),
    }
}

#[async_trait]
impl ControllerSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        let fail = |reason: String| SvalaError::Synthesis {
            iteration: request.iteration,
            reason,
        };

        let created = self.submit(request).await.map_err(|e| fail(e.to_string()))?;
        if let Some(conversation) = created.conversation_id {
            if let Ok(mut slot) = self.conversation.lock() {
                slot.get_or_insert(conversation);
            }
        }
        info!(iteration = request.iteration, job = %created.id, "synthesis job submitted");

        let state = poll_until_terminal(
            "synthesis job",
            || self.job_state(&created.id),
            |s: &JobState| s.status.is_terminal(),
            self.poll_interval,
            self.timeout,
            &self.cancel,
        )
        .await
        .map_err(|e| fail(e.to_string()))?;

        debug!(job = %created.id, status = ?state.status, files = state.files.len(), "synthesis job finished");
        if state.status != JobStatus::Completed {
            return Err(fail(format!(
                "job ended with status {:?}{}",
                state.status,
                state.error.map(|e| format!(": {}", e)).unwrap_or_default()
            )));
        }

        let transcript = render_transcript(&state.messages);
        let file = single_controller(state.files).map_err(fail)?;
        let outcome = SynthesisOutcome::new(ControllerArtifact::new(
            request.iteration,
            file.name,
            file.content,
        ));
        Ok(match transcript {
            Some(text) => outcome.with_transcript(text),
            None => outcome,
        })
    }
}
