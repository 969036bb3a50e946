//! Synchronization job bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::media::MediaInput;
use crate::preview::PreviewHandle;

/// Message shown when a processor fails without saying why
pub const UNKNOWN_FAILURE_MESSAGE: &str = "An unknown error occurred during synchronization";

/// Message shown when synchronization is requested without both inputs
pub const MISSING_INPUTS_MESSAGE: &str = "Please upload both an audio file and an image file.";

/// Tag identifying one processing invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0.simple())
    }
}

/// Job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Whether the job holds an outcome (success or failure)
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// The single current (or most recent) synchronization attempt
///
/// Fields are only changed through the transition methods below, which keep
/// `result` set exactly when `Succeeded` and `error` set exactly when `Failed`.
#[derive(Debug, Clone, Default)]
pub struct SyncJob {
    id: Option<JobId>,
    status: JobStatus,
    result: Option<PreviewHandle>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn id(&self) -> Option<JobId> {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result(&self) -> Option<PreviewHandle> {
        self.result
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Id of the invocation whose settlement is still awaited
    pub fn in_flight(&self) -> Option<JobId> {
        if self.is_running() {
            self.id
        } else {
            None
        }
    }

    /// Enter `Running` under a fresh id. Returns the previous result handle
    /// so the caller can release it.
    pub(super) fn start(&mut self) -> (JobId, Option<PreviewHandle>) {
        let id = JobId::new();
        let previous = self.result.take();
        self.id = Some(id);
        self.status = JobStatus::Running;
        self.error = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        (id, previous)
    }

    pub(super) fn succeed(&mut self, result: PreviewHandle) {
        self.status = JobStatus::Succeeded;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub(super) fn fail(&mut self, message: String) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(message);
        self.finished_at = Some(Utc::now());
    }

    /// Back to `Idle`. Returns the result handle that must be released.
    pub(super) fn reset(&mut self) -> Option<PreviewHandle> {
        let result = self.result.take();
        *self = SyncJob::default();
        result
    }
}

/// Inputs handed to the processor for an accepted start
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: JobId,
    pub audio: MediaInput,
    pub image: MediaInput,
}

/// Reasons a start request is refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("Please upload both an audio file and an image file.")]
    MissingInputs,

    #[error("A synchronization is already in progress")]
    AlreadyRunning,
}

/// What happened to a settlement delivered to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The settlement matched the in-flight job and moved it to this status
    Applied(JobStatus),
    /// The settlement belonged to a superseded job and was dropped
    Discarded,
}
