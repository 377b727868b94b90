//! # Summary Workflow
//!
//! Turns one uploaded recording into meeting minutes.
//!
//! ## Workflow Lifecycle:
//! 1. **Idle**: Nothing done yet
//! 2. **SavedLocally**: Recording written to a temp file with the upload's extension
//! 3. **UploadingRemote**: Temp file sent to the remote API, handle received
//! 4. **ProcessingRemote**: Handle polled until the remote file is active
//! 5. **Generating**: One generation call with the meeting-minutes prompt
//! 6. **Done**: Text returned to the caller
//! 7. **Error**: Any step failed; the stage it failed in is reported
//!
//! ## Cleanup:
//! Once the stages finish, successfully or not, the remote handle (if one was
//! obtained) is deleted and the temp file is removed. This happens exactly once
//! per run and its failures are only logged.

pub mod poller;
pub mod prompt;
pub mod upload;

pub use poller::PollPolicy;
pub use upload::{AudioFormat, AudioUpload};

use crate::config::AppConfig;
use crate::error::{AppError, SummaryError};
use crate::gemini::GenerativeService;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Stages of a workflow run. A stage is entered when its step starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Idle,
    SavedLocally,
    UploadingRemote,
    ProcessingRemote,
    Generating,
    Done,
    Error,
}

impl WorkflowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStage::Idle => "idle",
            WorkflowStage::SavedLocally => "saved_locally",
            WorkflowStage::UploadingRemote => "uploading_remote",
            WorkflowStage::ProcessingRemote => "processing_remote",
            WorkflowStage::Generating => "generating",
            WorkflowStage::Done => "done",
            WorkflowStage::Error => "error",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When a stage was entered, relative to the start of the run.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: WorkflowStage,
    pub elapsed_ms: u64,
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub model: String,
    pub file_name: String,
    /// Generated text, exactly as the model returned it
    pub summary: String,
    pub stages: Vec<StageRecord>,
    pub elapsed_ms: u64,
}

/// Result of a failed run.
#[derive(Debug)]
pub struct WorkflowFailure {
    /// Stage that was in progress when the failure happened
    pub stage: WorkflowStage,
    pub error: SummaryError,
    pub stages: Vec<StageRecord>,
}

impl From<WorkflowFailure> for AppError {
    fn from(failure: WorkflowFailure) -> Self {
        AppError::Workflow {
            stage: failure.stage.as_str(),
            error: failure.error,
        }
    }
}

struct StageTracker {
    started: Instant,
    current: WorkflowStage,
    history: Vec<StageRecord>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            current: WorkflowStage::Idle,
            history: vec![StageRecord {
                stage: WorkflowStage::Idle,
                elapsed_ms: 0,
            }],
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn enter(&mut self, stage: WorkflowStage) {
        let elapsed_ms = self.elapsed_ms();
        self.current = stage;
        self.history.push(StageRecord { stage, elapsed_ms });
        info!(stage = %stage, elapsed_ms, "Workflow stage");
    }
}

/// Local and remote copies owned by one run.
#[derive(Default)]
struct Artifacts {
    local: Option<NamedTempFile>,
    remote: Option<String>,
}

impl Artifacts {
    /// Release everything still held. `take()` makes a second call a no-op.
    async fn release(&mut self, service: &dyn GenerativeService) {
        if let Some(name) = self.remote.take() {
            match service.delete_file(&name).await {
                Ok(()) => debug!(file = %name, "Remote file deleted"),
                Err(e) => warn!(file = %name, error = %e, "Failed to delete remote file"),
            }
        }

        if let Some(local) = self.local.take() {
            let path = local.path().display().to_string();
            match local.close() {
                Ok(()) => debug!(path = %path, "Temp file removed"),
                Err(e) => warn!(path = %path, error = %e, "Failed to remove temp file"),
            }
        }
    }
}

/// One configured summary pipeline: service, model, prompt and polling schedule.
pub struct SummaryWorkflow {
    service: Arc<dyn GenerativeService>,
    model: String,
    prompt: String,
    poll: PollPolicy,
    allowed_extensions: Vec<String>,
    temp_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl SummaryWorkflow {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        model: impl Into<String>,
        config: &AppConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            prompt: prompt::build_prompt(&config.summary.language),
            poll: PollPolicy::from(&config.polling),
            allowed_extensions: config.upload.allowed_extensions.clone(),
            temp_dir: None,
            cancel,
        }
    }

    /// Put temp files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Run every stage, then clean up.
    pub async fn run(&self, upload: AudioUpload) -> Result<SummaryReport, WorkflowFailure> {
        let mut tracker = StageTracker::new();
        let mut artifacts = Artifacts::default();

        info!(
            file = %upload.file_name,
            bytes = upload.size_bytes(),
            model = %self.model,
            "Summary workflow started"
        );

        let span = info_span!("summary", file = %upload.file_name, model = %self.model);
        let outcome = self
            .run_stages(&upload, &mut tracker, &mut artifacts)
            .instrument(span)
            .await;
        artifacts.release(self.service.as_ref()).await;

        match outcome {
            Ok(summary) => {
                tracker.enter(WorkflowStage::Done);
                let elapsed_ms = tracker.elapsed_ms();
                info!(file = %upload.file_name, chars = summary.chars().count(), elapsed_ms, "Summary generated");

                Ok(SummaryReport {
                    model: self.model.clone(),
                    file_name: upload.file_name,
                    summary,
                    stages: tracker.history,
                    elapsed_ms,
                })
            }
            Err(err) => {
                let stage = tracker.current;
                error!(
                    file = %upload.file_name,
                    stage = %stage,
                    kind = err.kind(),
                    error = %err,
                    "Summary workflow failed"
                );
                tracker.enter(WorkflowStage::Error);

                Err(WorkflowFailure {
                    stage,
                    error: err,
                    stages: tracker.history,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        upload: &AudioUpload,
        tracker: &mut StageTracker,
        artifacts: &mut Artifacts,
    ) -> Result<String, SummaryError> {
        tracker.enter(WorkflowStage::SavedLocally);
        let format = upload.format(&self.allowed_extensions)?;
        let local = self.create_temp_file(format)?;
        let path = local.path().to_path_buf();
        artifacts.local = Some(local);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(SummaryError::LocalFile)?;

        tracker.enter(WorkflowStage::UploadingRemote);
        let remote = self
            .service
            .upload_file(&path, format.mime_type(), &upload.file_name)
            .await
            .map_err(SummaryError::Upload)?;
        artifacts.remote = Some(remote.name.clone());
        info!(file = %remote.name, state = %remote.state, "Recording uploaded");

        tracker.enter(WorkflowStage::ProcessingRemote);
        let ready =
            poller::wait_until_ready(self.service.as_ref(), remote, &self.poll, &self.cancel).await?;

        tracker.enter(WorkflowStage::Generating);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SummaryError::Cancelled),
            result = self.service.generate_content(&self.model, &ready, &self.prompt) => {
                result.map_err(|e| SummaryError::Generation(e.to_string()))
            }
        }
    }

    fn create_temp_file(&self, format: AudioFormat) -> Result<NamedTempFile, SummaryError> {
        let suffix = format!(".{}", format.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("meeting-").suffix(&suffix);

        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(SummaryError::LocalFile)
    }
}
