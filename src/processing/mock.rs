//! Stand-in processor that simulates a slow synchronization job

use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, info};

use super::{ProcessingError, ProcessingResult, Processor, VideoArtifact};
use crate::config::ProcessingConfig;
use crate::media::{MediaData, MediaInput};

/// Processor that waits a fixed latency, then succeeds or fails on demand
#[derive(Debug, Clone)]
pub struct MockProcessor {
    latency: Duration,
    fail_with: Option<String>,
}

impl MockProcessor {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail_with: None,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        let mock = Self::new(Duration::from_millis(config.simulated_latency_ms));
        match &config.fail_with {
            Some(message) => mock.failing(message.clone()),
            None => mock,
        }
    }

    /// Make every call fail with the given message
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }
}

impl Processor for MockProcessor {
    fn process(&self, audio: MediaInput, image: MediaInput) -> BoxFuture<'static, ProcessingResult> {
        let latency = self.latency;
        let fail_with = self.fail_with.clone();

        Box::pin(async move {
            info!(
                "Synchronizing {} ({} bytes) with {} ({} bytes)",
                audio.display_name(),
                audio.len(),
                image.display_name(),
                image.len()
            );
            tokio::time::sleep(latency).await;

            if let Some(message) = fail_with {
                debug!("Mock processor failing: {}", message);
                return Err(ProcessingError::new(message));
            }

            // Placeholder container: a short manifest naming both sources
            let manifest = format!(
                "sync-studio mock video\naudio={}\nimage={}\n",
                audio.display_name(),
                image.display_name()
            );
            Ok(VideoArtifact::Raw(MediaData::from(manifest.into_bytes())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> (MediaInput, MediaInput) {
        (
            MediaInput::audio(b"audio".to_vec(), "a.mp3"),
            MediaInput::image(b"image".to_vec(), "b.png"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_returns_raw_artifact() {
        let (audio, image) = inputs();
        let result = MockProcessor::new(Duration::from_secs(3)).process(audio, image).await;
        match result {
            Ok(VideoArtifact::Raw(bytes)) => {
                let text = String::from_utf8(bytes.to_vec()).unwrap();
                assert!(text.contains("audio=a.mp3"));
                assert!(text.contains("image=b.png"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_failure_message() {
        let (audio, image) = inputs();
        let err = MockProcessor::new(Duration::from_millis(10))
            .failing("network timeout")
            .process(audio, image)
            .await
            .unwrap_err();
        assert_eq!(err, ProcessingError::new("network timeout"));
    }

    #[test]
    fn test_from_config() {
        let config = ProcessingConfig {
            simulated_latency_ms: 250,
            fail_with: Some("boom".to_string()),
            timeout_secs: None,
        };
        let mock = MockProcessor::from_config(&config);
        assert_eq!(mock.latency, Duration::from_millis(250));
        assert_eq!(mock.fail_with.as_deref(), Some("boom"));
    }
}
