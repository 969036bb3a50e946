//! Synchronization engine
//!
//! Runs every state transition on a single task. Processing calls are the
//! only suspension point: an accepted start spawns the call on its own task,
//! which reports back through the settlement channel tagged with its job id.
//! Settlements for superseded jobs are dropped by `AppState::complete`.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::processing::{ProcessingError, ProcessingResult, Processor};
use crate::state::{AppState, JobId, JobTicket, Settlement};

use super::{EngineCommand, EngineStatus};

/// Settlement of one processing call
#[derive(Debug)]
struct JobSettlement {
    id: JobId,
    result: ProcessingResult,
}

/// Guarantees a settlement is reported for a job on every exit path,
/// including a processor that panics or a task that is aborted.
struct SettlementGuard {
    id: JobId,
    tx: Option<mpsc::UnboundedSender<JobSettlement>>,
}

impl SettlementGuard {
    fn new(id: JobId, tx: mpsc::UnboundedSender<JobSettlement>) -> Self {
        Self { id, tx: Some(tx) }
    }

    fn settle(mut self, result: ProcessingResult) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(JobSettlement {
                id: self.id,
                result,
            });
        }
    }
}

impl Drop for SettlementGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("{} ended without a result", self.id);
            let _ = tx.send(JobSettlement {
                id: self.id,
                result: Err(ProcessingError::unspecified()),
            });
        }
    }
}

/// The synchronization engine owns `AppState` and serves engine commands
pub struct SyncEngine {
    /// Upload, preview and job state
    state: AppState,
    /// Synchronization backend
    processor: Arc<dyn Processor>,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Status broadcaster
    status_tx: broadcast::Sender<EngineStatus>,
    /// Settlement sender, cloned into each processing task
    settle_tx: mpsc::UnboundedSender<JobSettlement>,
    /// Settlement receiver
    settle_rx: mpsc::UnboundedReceiver<JobSettlement>,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        processor: Arc<dyn Processor>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        status_tx: broadcast::Sender<EngineStatus>,
    ) -> Self {
        let (settle_tx, settle_rx) = mpsc::unbounded_channel();

        Self {
            state: AppState::new(),
            processor,
            cmd_rx,
            status_tx,
            settle_tx,
            settle_rx,
        }
    }

    /// Run the engine main loop
    pub async fn run(&mut self) -> Result<()> {
        info!("Sync engine starting");
        self.publish();

        loop {
            tokio::select! {
                // Settlements already delivered are applied before later commands
                biased;

                // Handle processing settlements
                Some(settlement) = self.settle_rx.recv() => {
                    self.handle_settlement(settlement);
                }

                // Handle commands
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("Command channel closed");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
            }
        }

        self.state.dispose();
        let live = self.state.previews().live_count();
        if live > 0 {
            error!("{} preview handles still live after dispose", live);
        }
        let _ = self.status_tx.send(EngineStatus::Stopped);

        info!("Sync engine stopped");
        Ok(())
    }

    /// Apply a command. Returns false when the engine should stop.
    fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::SelectAudio(input) => {
                self.state.select_audio(input);
                self.publish();
            }
            EngineCommand::SelectImage(input) => {
                self.state.select_image(input);
                self.publish();
            }
            EngineCommand::StartSync => self.start_sync(),
            EngineCommand::Dispose => {
                self.state.dispose();
                self.publish();
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot());
            }
            EngineCommand::Shutdown => {
                info!("Shutdown command received");
                return false;
            }
        }
        true
    }

    /// Validate and launch a synchronization job
    fn start_sync(&mut self) {
        match self.state.begin_sync() {
            Ok(ticket) => {
                // Running is visible before the processor is even called
                self.publish();
                self.spawn_job(ticket);
            }
            Err(e) => {
                info!("Synchronization refused: {}", e);
                let _ = self.status_tx.send(EngineStatus::Rejected(e.to_string()));
                self.publish();
            }
        }
    }

    /// Drive one processing call on its own task
    fn spawn_job(&self, ticket: JobTicket) {
        let processor = self.processor.clone();
        let guard = SettlementGuard::new(ticket.id, self.settle_tx.clone());

        tokio::spawn(async move {
            debug!("{} handed to processor", ticket.id);
            let result = processor.process(ticket.audio, ticket.image).await;
            guard.settle(result);
        });
    }

    fn handle_settlement(&mut self, settlement: JobSettlement) {
        let JobSettlement { id, result } = settlement;
        match self.state.complete(id, result) {
            Settlement::Applied(status) => {
                debug!("{} settled as {:?}", id, status);
                self.publish();
            }
            Settlement::Discarded => {
                debug!("Ignored settlement for superseded {}", id);
            }
        }
    }

    fn publish(&self) {
        let _ = self.status_tx.send(EngineStatus::Updated(self.state.snapshot()));
    }
}

/// Create command and status channels for the engine
pub fn create_engine_channels(
    config: &EngineConfig,
) -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<EngineStatus>,
    broadcast::Receiver<EngineStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
    let (status_tx, status_rx) = broadcast::channel(config.status_buffer.max(1));
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaData, MediaInput};
    use crate::processing::VideoArtifact;
    use crate::state::{AppSnapshot, JobStatus, MISSING_INPUTS_MESSAGE, UNKNOWN_FAILURE_MESSAGE};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    /// A call waiting for its result, keyed by image name
    struct PendingCall {
        image_name: String,
        result_tx: oneshot::Sender<ProcessingResult>,
        delivered_rx: oneshot::Receiver<()>,
    }

    /// Processor whose calls settle only when the test says so
    #[derive(Default)]
    struct ScriptedProcessor {
        pending: Mutex<Vec<PendingCall>>,
        calls: AtomicUsize,
    }

    impl ScriptedProcessor {
        /// Settle the call made with the given image name. Waits for the job
        /// task to reach the processor first, and returns once the job task
        /// has handed the settlement to the engine.
        async fn settle(&self, image_name: &str, result: ProcessingResult) {
            loop {
                let call = {
                    let mut pending = self.pending.lock().unwrap();
                    pending
                        .iter()
                        .position(|call| call.image_name == image_name)
                        .map(|index| pending.remove(index))
                };
                if let Some(call) = call {
                    call.result_tx.send(result).unwrap();
                    call.delivered_rx.await.unwrap();
                    return;
                }
                tokio::task::yield_now().await;
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Processor for ScriptedProcessor {
        fn process(&self, _audio: MediaInput, image: MediaInput) -> BoxFuture<'static, ProcessingResult> {
            let (result_tx, result_rx) = oneshot::channel();
            let (delivered_tx, delivered_rx) = oneshot::channel();
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().unwrap().push(PendingCall {
                image_name: image.display_name().to_string(),
                result_tx,
                delivered_rx,
            });
            Box::pin(async move {
                let result = result_rx.await.unwrap_or(Err(ProcessingError::unspecified()));
                // The job task sends the settlement in the same poll that
                // resolves this future, before the test task runs again
                let _ = delivered_tx.send(());
                result
            })
        }
    }

    struct Panicking;

    impl Processor for Panicking {
        fn process(&self, _audio: MediaInput, _image: MediaInput) -> BoxFuture<'static, ProcessingResult> {
            panic!("processor exploded");
        }
    }

    struct Harness {
        cmd_tx: mpsc::Sender<EngineCommand>,
        status_rx: broadcast::Receiver<EngineStatus>,
        handle: JoinHandle<Result<()>>,
    }

    impl Harness {
        fn start(processor: Arc<dyn Processor>) -> Self {
            let config = EngineConfig {
                command_buffer: 8,
                status_buffer: 64,
            };
            let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels(&config);
            let mut engine = SyncEngine::new(processor, cmd_rx, status_tx);
            let handle = tokio::spawn(async move { engine.run().await });
            Self {
                cmd_tx,
                status_rx,
                handle,
            }
        }

        async fn send(&self, cmd: EngineCommand) {
            self.cmd_tx.send(cmd).await.unwrap();
        }

        async fn select(&self, audio: Option<&str>, image: Option<&str>) {
            if let Some(name) = audio {
                self.send(EngineCommand::SelectAudio(MediaInput::audio(name.as_bytes().to_vec(), name)))
                    .await;
            }
            if let Some(name) = image {
                self.send(EngineCommand::SelectImage(MediaInput::image(name.as_bytes().to_vec(), name)))
                    .await;
            }
        }

        async fn snapshot(&self) -> AppSnapshot {
            let (tx, rx) = oneshot::channel();
            self.send(EngineCommand::Snapshot(tx)).await;
            rx.await.unwrap()
        }

        /// Wait for the next published snapshot matching a predicate
        async fn wait_for(&mut self, predicate: impl Fn(&AppSnapshot) -> bool) -> AppSnapshot {
            let wait = async {
                loop {
                    match self.status_rx.recv().await.unwrap() {
                        EngineStatus::Updated(snapshot) if predicate(&snapshot) => return snapshot,
                        _ => {}
                    }
                }
            };
            tokio::time::timeout(Duration::from_secs(5), wait)
                .await
                .expect("timed out waiting for engine status")
        }

        /// Wait for the next refusal
        async fn wait_for_rejection(&mut self) -> String {
            loop {
                if let EngineStatus::Rejected(reason) = self.status_rx.recv().await.unwrap() {
                    return reason;
                }
            }
        }

        async fn shutdown(self) {
            self.send(EngineCommand::Shutdown).await;
            self.handle.await.unwrap().unwrap();
        }
    }

    fn raw_video() -> ProcessingResult {
        Ok(VideoArtifact::Raw(MediaData::from(&b"video"[..])))
    }

    #[tokio::test]
    async fn test_successful_synchronization() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        let running = harness.wait_for(|s| s.processing).await;
        assert_eq!(running.job.status, JobStatus::Running);

        processor.settle("b.png", raw_video()).await;
        let done = harness.wait_for(|s| s.job.status == JobStatus::Succeeded).await;
        assert!(done.job.result.is_some());
        assert!(done.job.error.is_none());
        assert!(!done.processing);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_with_only_image_is_rejected() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(None, Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;

        assert_eq!(harness.wait_for_rejection().await, MISSING_INPUTS_MESSAGE);
        let snapshot = harness.snapshot().await;
        assert_eq!(snapshot.job.status, JobStatus::Idle);
        assert_eq!(snapshot.form_error.as_deref(), Some(MISSING_INPUTS_MESSAGE));
        assert_eq!(processor.calls(), 0);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_with_only_audio_is_rejected() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), None).await;
        harness.send(EngineCommand::StartSync).await;

        assert_eq!(harness.wait_for_rejection().await, MISSING_INPUTS_MESSAGE);
        let snapshot = harness.snapshot().await;
        assert_eq!(snapshot.job.status, JobStatus::Idle);
        assert!(!snapshot.processing);
        assert_eq!(processor.calls(), 0);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_processor_failure_message_is_surfaced() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        harness.wait_for(|s| s.processing).await;

        processor.settle("b.png", Err(ProcessingError::new("network timeout"))).await;
        let failed = harness.wait_for(|s| s.job.status == JobStatus::Failed).await;
        assert_eq!(failed.job.error.as_deref(), Some("network timeout"));
        assert!(failed.job.result.is_none());

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_start_while_running_is_rejected() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        harness.send(EngineCommand::StartSync).await;
        let before = harness.wait_for(|s| s.processing).await;

        assert!(harness.wait_for_rejection().await.contains("already in progress"));
        processor.settle("b.png", raw_video()).await;
        let done = harness.wait_for(|s| s.job.status == JobStatus::Succeeded).await;
        assert_eq!(done.job.id, before.job.id);
        assert_eq!(processor.calls(), 1);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_settlement_does_not_overwrite_newer_job() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        let job_a = harness.wait_for(|s| s.processing).await.job.id;

        harness.select(None, Some("c.png")).await;
        harness.send(EngineCommand::StartSync).await;
        let job_b = harness
            .wait_for(|s| s.processing && s.job.id != job_a)
            .await
            .job
            .id;

        processor.settle("b.png", raw_video()).await;
        let snapshot = harness.snapshot().await;
        assert_eq!(snapshot.stale_settlements, 1);
        assert_eq!(snapshot.job.id, job_b);
        assert_eq!(snapshot.job.status, JobStatus::Running);
        assert!(snapshot.job.result.is_none());

        processor.settle("c.png", Err(ProcessingError::new("second failed"))).await;
        let failed = harness.wait_for(|s| s.job.status == JobStatus::Failed).await;
        assert_eq!(failed.job.id, job_b);
        assert_eq!(failed.job.error.as_deref(), Some("second failed"));

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_image_after_success_resets_job() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        harness.wait_for(|s| s.processing).await;
        processor.settle("b.png", raw_video()).await;
        let done = harness.wait_for(|s| s.job.status == JobStatus::Succeeded).await;
        let live_before = done.previews.live;

        harness.select(None, Some("c.png")).await;
        let reset = harness
            .wait_for(|s| s.image.as_ref().is_some_and(|i| i.name == "c.png"))
            .await;
        assert_eq!(reset.job.status, JobStatus::Idle);
        assert!(reset.job.result.is_none());
        // Old image preview and old result released, new image preview acquired
        assert_eq!(reset.previews.live, live_before - 1);

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispose_twice_releases_everything_once() {
        let processor = Arc::new(ScriptedProcessor::default());
        let mut harness = Harness::start(processor.clone());

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        harness.wait_for(|s| s.processing).await;
        processor.settle("b.png", raw_video()).await;
        harness.wait_for(|s| s.job.status == JobStatus::Succeeded).await;

        harness.send(EngineCommand::Dispose).await;
        harness.send(EngineCommand::Dispose).await;
        let snapshot = harness.snapshot().await;
        assert_eq!(snapshot.previews.acquired, 3);
        assert_eq!(snapshot.previews.released, 3);
        assert_eq!(snapshot.previews.live, 0);
        assert!(snapshot.audio.is_none() && snapshot.image.is_none());

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_processor_still_settles() {
        let mut harness = Harness::start(Arc::new(Panicking));

        harness.select(Some("a.mp3"), Some("b.png")).await;
        harness.send(EngineCommand::StartSync).await;
        let failed = harness.wait_for(|s| s.job.status == JobStatus::Failed).await;
        assert_eq!(failed.job.error.as_deref(), Some(UNKNOWN_FAILURE_MESSAGE));
        assert!(!failed.processing);

        // The engine accepts new work afterwards
        harness.send(EngineCommand::StartSync).await;
        harness.wait_for(|s| s.processing).await;

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_closing_command_channel_stops_engine() {
        let harness = Harness::start(Arc::new(ScriptedProcessor::default()));
        let Harness {
            cmd_tx,
            mut status_rx,
            handle,
        } = harness;

        drop(cmd_tx);
        handle.await.unwrap().unwrap();
        loop {
            if let EngineStatus::Stopped = status_rx.recv().await.unwrap() {
                break;
            }
        }
    }
}
