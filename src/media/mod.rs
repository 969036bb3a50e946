//! User-selected media inputs
//!
//! A `MediaInput` is the audio or image file picked for one of the two
//! input slots. Inputs are immutable: re-selecting replaces the whole value.

mod loader;

pub use loader::MediaError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared, immutable file contents
pub type MediaData = Arc<[u8]>;

/// Which input slot a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Image => write!(f, "image"),
        }
    }
}

/// A selected file: its slot, its bytes and the name shown to the user
#[derive(Debug, Clone)]
pub struct MediaInput {
    kind: MediaKind,
    data: MediaData,
    display_name: String,
}

impl MediaInput {
    pub fn new(kind: MediaKind, data: impl Into<MediaData>, display_name: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            display_name: display_name.into(),
        }
    }

    #[cfg(test)]
    pub fn audio(data: impl Into<MediaData>, display_name: impl Into<String>) -> Self {
        Self::new(MediaKind::Audio, data, display_name)
    }

    #[cfg(test)]
    pub fn image(data: impl Into<MediaData>, display_name: impl Into<String>) -> Self {
        Self::new(MediaKind::Image, data, display_name)
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn data(&self) -> &MediaData {
        &self.data
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}
