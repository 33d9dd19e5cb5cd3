// chunkzip-common/src/status.rs

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};
use parking_lot::Mutex;

use crate::error::{ChunkzipError, Result};

/// Shared success flag for one compress/decompress run.
///
/// Starts healthy and flips to failed at most once. The first failure is kept
/// so the orchestrator can report its kind and chunk index; later ones are
/// only logged.
#[derive(Debug)]
pub struct RunStatus {
    ok: AtomicBool,
    first_failure: Mutex<Option<ChunkzipError>>,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatus {
    pub fn new() -> Self {
        Self {
            ok: AtomicBool::new(true),
            first_failure: Mutex::new(None),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        !self.is_ok()
    }

    /// Records a failure. Returns `true` if this call flipped the flag.
    pub fn fail(&self, err: ChunkzipError) -> bool {
        let mut slot = self.first_failure.lock();
        if slot.is_none() && self.ok.swap(false, Ordering::AcqRel) {
            error!("[status] run failed ({}): {}", err.kind_name(), err);
            *slot = Some(err);
            true
        } else {
            debug!("[status] ignoring follow-up failure ({}): {}", err.kind_name(), err);
            false
        }
    }

    /// Removes and returns the recorded failure, if any.
    pub fn take_failure(&self) -> Option<ChunkzipError> {
        self.first_failure.lock().take()
    }

    /// `Ok(())` while healthy, otherwise the first failure (or `Cancelled` if
    /// it was already taken).
    pub fn check(&self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self.take_failure().unwrap_or(ChunkzipError::Cancelled))
        }
    }
}
