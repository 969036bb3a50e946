//! Synchronization engine - owns the app state and drives processing jobs

mod engine;

pub use engine::{create_engine_channels, SyncEngine};

use tokio::sync::oneshot;

use crate::media::MediaInput;
use crate::state::AppSnapshot;

/// Commands that can be sent to the sync engine
#[derive(Debug)]
pub enum EngineCommand {
    /// Replace the audio input
    SelectAudio(MediaInput),
    /// Replace the image input
    SelectImage(MediaInput),
    /// Start synchronizing the current inputs
    StartSync,
    /// Release all previews and results (repeatable)
    Dispose,
    /// Request the current state
    Snapshot(oneshot::Sender<AppSnapshot>),
    /// Dispose and stop the engine
    Shutdown,
}

/// Status updates from the sync engine
#[derive(Debug, Clone)]
pub enum EngineStatus {
    /// State changed
    Updated(AppSnapshot),
    /// A start request was refused
    Rejected(String),
    /// Engine has stopped
    Stopped,
}
