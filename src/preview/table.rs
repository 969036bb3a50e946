//! Resource table backing preview handles

use std::collections::HashMap;
use tracing::{debug, trace};

use super::PreviewHandle;
use crate::media::MediaData;

/// Counters for leak accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    pub acquired: u64,
    pub released: u64,
    pub live: usize,
}

/// Table of live preview handles
///
/// `acquire` always mints a new handle. `release` is idempotent: releasing
/// a handle that is unknown or already released does nothing.
#[derive(Debug, Default)]
pub struct PreviewTable {
    entries: HashMap<PreviewHandle, MediaData>,
    acquired: u64,
    released: u64,
}

impl PreviewTable {
    /// Register bytes and return a fresh handle for them
    pub fn acquire(&mut self, data: MediaData) -> PreviewHandle {
        let handle = PreviewHandle::new();
        trace!("Acquiring {} ({} bytes)", handle, data.len());
        self.entries.insert(handle, data);
        self.acquired += 1;
        handle
    }

    /// Revoke a handle. Returns true if a live entry was removed.
    pub fn release(&mut self, handle: &PreviewHandle) -> bool {
        if self.entries.remove(handle).is_some() {
            self.released += 1;
            trace!("Released {}", handle);
            true
        } else {
            debug!("Ignoring release of inactive {}", handle);
            false
        }
    }

    /// Release an optional handle, taking it out of its slot
    pub fn release_opt(&mut self, handle: Option<PreviewHandle>) -> bool {
        match handle {
            Some(handle) => self.release(&handle),
            None => false,
        }
    }

    /// Look up the bytes behind a live handle
    pub fn resolve(&self, handle: &PreviewHandle) -> Option<&MediaData> {
        self.entries.get(handle)
    }

    #[cfg(test)]
    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> PreviewStats {
        PreviewStats {
            acquired: self.acquired,
            released: self.released,
            live: self.entries.len(),
        }
    }
}
