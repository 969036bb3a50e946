//! Preview handles for selected media and rendered results
//!
//! A preview handle is a short-lived, process-local reference to bytes that
//! a player or image view can render. Handles live in a `PreviewTable` and
//! must be released when superseded or when the owning state is torn down.

mod table;

pub use table::{PreviewStats, PreviewTable};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Revocable reference to previewable bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewHandle(Uuid);

impl PreviewHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview:{}", self.0)
    }
}
