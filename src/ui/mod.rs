//! Console view over engine status updates

mod console;

pub use console::watch_status;

use serde::Serialize;

use crate::state::{AppSnapshot, JobStatus};

/// Mutually exclusive UI modes derived from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Idle,
    Previewing,
    Processing,
    Success,
    Error,
}

impl From<&AppSnapshot> for ViewMode {
    fn from(snapshot: &AppSnapshot) -> Self {
        if snapshot.processing {
            return ViewMode::Processing;
        }
        match snapshot.job.status {
            JobStatus::Succeeded => ViewMode::Success,
            JobStatus::Failed => ViewMode::Error,
            _ if snapshot.form_error.is_some() => ViewMode::Error,
            _ if snapshot.audio.is_some() || snapshot.image.is_some() => ViewMode::Previewing,
            _ => ViewMode::Idle,
        }
    }
}

impl ViewMode {
    pub fn label(self) -> &'static str {
        match self {
            ViewMode::Idle => "idle",
            ViewMode::Previewing => "previewing",
            ViewMode::Processing => "processing",
            ViewMode::Success => "success",
            ViewMode::Error => "error",
        }
    }
}
