//! Read model handed to views

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AppState, JobId, JobStatus};
use crate::media::MediaInput;
use crate::preview::{PreviewHandle, PreviewStats};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSnapshot {
    pub name: String,
    pub size_bytes: usize,
    pub preview: PreviewHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub id: Option<JobId>,
    pub status: JobStatus,
    pub result: Option<PreviewHandle>,
    /// Size of the rendered video behind `result`
    pub result_bytes: Option<usize>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Point-in-time copy of everything a view renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSnapshot {
    pub audio: Option<InputSnapshot>,
    pub image: Option<InputSnapshot>,
    pub job: JobSnapshot,
    pub form_error: Option<String>,
    pub processing: bool,
    pub stale_settlements: u64,
    #[serde(skip)]
    pub previews: PreviewStats,
}

fn input_snapshot(input: Option<&MediaInput>, preview: Option<PreviewHandle>) -> Option<InputSnapshot> {
    match (input, preview) {
        (Some(input), Some(preview)) => Some(InputSnapshot {
            name: input.display_name().to_string(),
            size_bytes: input.len(),
            preview,
        }),
        _ => None,
    }
}

impl AppState {
    pub fn snapshot(&self) -> AppSnapshot {
        let job = self.job();
        AppSnapshot {
            audio: input_snapshot(self.audio(), self.audio_preview()),
            image: input_snapshot(self.image(), self.image_preview()),
            job: JobSnapshot {
                id: job.id(),
                status: job.status(),
                result: job.result(),
                result_bytes: job
                    .result()
                    .and_then(|handle| self.previews().resolve(&handle))
                    .map(|data| data.len()),
                error: job.error().map(str::to_string),
                started_at: job.started_at(),
                finished_at: job.finished_at(),
            },
            form_error: self.form_error().map(str::to_string),
            processing: self.is_processing(),
            stale_settlements: self.stale_settlements(),
            previews: self.preview_stats(),
        }
    }
}
