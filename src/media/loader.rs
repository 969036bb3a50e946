//! Loading media inputs from disk
//!
//! Mirrors the `accept` filter of a file picker: an audio slot only takes
//! audio files, an image slot only takes images.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::{MediaInput, MediaKind};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "oga", "flac", "m4a", "aac", "opus", "weba"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "ico"];

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} is empty")]
    Empty { path: PathBuf },

    #[error("{path:?} is not an {expected} file")]
    KindMismatch { path: PathBuf, expected: MediaKind },
}

impl MediaInput {
    /// Read a file from disk into an input for the given slot
    pub async fn from_file(kind: MediaKind, path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| MediaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if bytes.is_empty() {
            return Err(MediaError::Empty {
                path: path.to_path_buf(),
            });
        }

        if !accepts(kind, path, &bytes) {
            return Err(MediaError::KindMismatch {
                path: path.to_path_buf(),
                expected: kind,
            });
        }

        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!("Loaded {} input {} ({} bytes)", kind, display_name, bytes.len());

        Ok(MediaInput::new(kind, bytes, display_name))
    }
}

/// Check whether a file is acceptable for a slot
fn accepts(kind: MediaKind, path: &Path, bytes: &[u8]) -> bool {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match kind {
        MediaKind::Audio => extension
            .as_deref()
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext)),
        MediaKind::Image => {
            extension
                .as_deref()
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
                || image::guess_format(bytes).is_ok()
        }
    }
}
