//! Audio/image synchronization capability
//!
//! The engine treats processing as a black box: it hands over one audio
//! input and one image input and eventually gets back a video artifact or
//! an error. Each call settles exactly once.

mod mock;

pub use mock::MockProcessor;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::ProcessingConfig;
use crate::media::{MediaData, MediaInput};
use crate::preview::PreviewHandle;

/// Result of a successful synchronization
#[derive(Debug, Clone)]
pub enum VideoArtifact {
    /// Raw video bytes that still need a preview handle
    Raw(MediaData),
    /// An already previewable handle, stored as is
    Handle(PreviewHandle),
}

/// Failure reported by a processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .message.as_deref().unwrap_or("synchronization failed"))]
pub struct ProcessingError {
    pub message: Option<String>,
}

impl ProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// A failure with no human readable detail
    pub fn unspecified() -> Self {
        Self { message: None }
    }
}

pub type ProcessingResult = Result<VideoArtifact, ProcessingError>;

/// Trait for synchronization backends
pub trait Processor: Send + Sync {
    /// Combine an audio track and an image into a video
    ///
    /// The returned future must not borrow from `self`; it is driven on a
    /// separate task while the engine keeps serving commands.
    fn process(&self, audio: MediaInput, image: MediaInput) -> BoxFuture<'static, ProcessingResult>;
}

/// Bounds the latency of another processor
pub struct TimeoutProcessor<P> {
    inner: P,
    timeout: Duration,
}

impl<P: Processor> TimeoutProcessor<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<P: Processor> Processor for TimeoutProcessor<P> {
    fn process(&self, audio: MediaInput, image: MediaInput) -> BoxFuture<'static, ProcessingResult> {
        let call = self.inner.process(audio, image);
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Synchronization exceeded {:?}", timeout);
                    Err(ProcessingError::new(format!(
                        "Synchronization timed out after {} seconds",
                        timeout.as_secs()
                    )))
                }
            }
        })
    }
}

/// Build the processor described by the configuration
pub fn create_processor(config: &ProcessingConfig) -> Arc<dyn Processor> {
    let mock = MockProcessor::from_config(config);
    match config.timeout_secs {
        Some(secs) => Arc::new(TimeoutProcessor::new(mock, Duration::from_secs(secs))),
        None => Arc::new(mock),
    }
}
