//! Application state aggregate
//!
//! `AppState` owns the selected inputs, their preview handles and the
//! synchronization job. It is mutated only through `select_audio`,
//! `select_image`, `begin_sync`/`complete` and `dispose`, which keep every
//! preview handle paired with exactly one release.

mod job;
mod snapshot;

pub use job::{
    JobId, JobStatus, JobTicket, Settlement, SyncError, SyncJob, MISSING_INPUTS_MESSAGE,
    UNKNOWN_FAILURE_MESSAGE,
};
pub use snapshot::{AppSnapshot, InputSnapshot};

use tracing::{debug, info, warn};

use crate::media::{MediaInput, MediaKind};
use crate::preview::{PreviewHandle, PreviewStats, PreviewTable};
use crate::processing::{ProcessingResult, VideoArtifact};

/// One input slot: the selected file and its preview
#[derive(Debug, Default)]
struct Slot {
    input: Option<MediaInput>,
    preview: Option<PreviewHandle>,
}

/// Aggregate root for the upload, preview and synchronize flow
#[derive(Debug, Default)]
pub struct AppState {
    previews: PreviewTable,
    audio: Slot,
    image: Slot,
    job: SyncJob,
    /// Form level message, e.g. a refused start
    form_error: Option<String>,
    /// Settlements dropped because their job was superseded
    stale_settlements: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the audio input, replacing any previous one
    pub fn select_audio(&mut self, input: MediaInput) -> PreviewHandle {
        self.select(MediaKind::Audio, input)
    }

    /// Select the image input, replacing any previous one
    pub fn select_image(&mut self, input: MediaInput) -> PreviewHandle {
        self.select(MediaKind::Image, input)
    }

    fn select(&mut self, kind: MediaKind, input: MediaInput) -> PreviewHandle {
        if input.kind() != kind {
            warn!("{} selected into the {} slot", input.kind(), kind);
        }

        let slot = match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Image => &mut self.image,
        };

        self.previews.release_opt(slot.preview.take());
        let preview = self.previews.acquire(input.data().clone());
        info!("Selected {} {} as {}", kind, input.display_name(), preview);
        slot.input = Some(input);
        slot.preview = Some(preview);

        // The previous outcome no longer matches the inputs. A Running job is
        // reset too: its call keeps going, but its settlement will be discarded
        // even if no new job is started before it arrives.
        if self.job.status() != JobStatus::Idle {
            debug!("Inputs changed, resetting {:?} job", self.job.status());
            let result = self.job.reset();
            self.previews.release_opt(result);
        }
        self.form_error = None;

        preview
    }

    /// Validate inputs and move the job to `Running`
    ///
    /// On success the returned ticket carries the id the eventual settlement
    /// must present to `complete`.
    pub fn begin_sync(&mut self) -> Result<JobTicket, SyncError> {
        if self.job.is_running() {
            return Err(SyncError::AlreadyRunning);
        }

        let (Some(audio), Some(image)) = (self.audio.input.clone(), self.image.input.clone())
        else {
            warn!("Synchronization requested without both inputs");
            self.form_error = Some(MISSING_INPUTS_MESSAGE.to_string());
            return Err(SyncError::MissingInputs);
        };

        let (id, previous) = self.job.start();
        self.previews.release_opt(previous);
        self.form_error = None;
        info!("Starting {} for {} + {}", id, audio.display_name(), image.display_name());

        Ok(JobTicket { id, audio, image })
    }

    /// Apply the settlement of a processing call
    pub fn complete(&mut self, id: JobId, outcome: ProcessingResult) -> Settlement {
        if self.job.in_flight() != Some(id) {
            debug!("Discarding stale settlement for {}", id);
            self.stale_settlements += 1;
            if let Ok(VideoArtifact::Handle(handle)) = outcome {
                self.previews.release(&handle);
            }
            return Settlement::Discarded;
        }

        match outcome {
            Ok(artifact) => {
                let handle = match artifact {
                    VideoArtifact::Raw(bytes) => self.previews.acquire(bytes),
                    VideoArtifact::Handle(handle) => handle,
                };
                info!("{} succeeded with {}", id, handle);
                self.job.succeed(handle);
            }
            Err(err) => {
                let message = err
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_FAILURE_MESSAGE.to_string());
                warn!("{} failed: {}", id, message);
                self.job.fail(message);
            }
        }

        Settlement::Applied(self.job.status())
    }

    /// Release every handle and return to the initial state. Safe to repeat.
    pub fn dispose(&mut self) {
        let audio = std::mem::take(&mut self.audio);
        let image = std::mem::take(&mut self.image);
        let result = self.job.reset();

        let released = [audio.preview, image.preview, result]
            .into_iter()
            .filter(|handle| self.previews.release_opt(*handle))
            .count();
        self.form_error = None;

        if released > 0 {
            info!("Disposed state, released {} preview handles", released);
        }
    }

    pub fn audio(&self) -> Option<&MediaInput> {
        self.audio.input.as_ref()
    }

    pub fn image(&self) -> Option<&MediaInput> {
        self.image.input.as_ref()
    }

    pub fn audio_preview(&self) -> Option<PreviewHandle> {
        self.audio.preview
    }

    pub fn image_preview(&self) -> Option<PreviewHandle> {
        self.image.preview
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    pub fn form_error(&self) -> Option<&str> {
        self.form_error.as_deref()
    }

    /// Whether a processing call is outstanding
    pub fn is_processing(&self) -> bool {
        self.job.is_running()
    }

    pub fn previews(&self) -> &PreviewTable {
        &self.previews
    }

    pub fn preview_stats(&self) -> PreviewStats {
        self.previews.stats()
    }

    pub fn stale_settlements(&self) -> u64 {
        self.stale_settlements
    }
}
