// chunkzip-common/src/chunk_store.rs

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::status::RunStatus;

struct StoreInner {
    entries: HashMap<u32, Vec<u8>>,
    /// Every index below this has been removed.
    watermark: u64,
    /// Removed indices above the watermark; drained as the gap below them closes.
    retired_above: HashSet<u32>,
}

impl StoreInner {
    fn is_retired(&self, index: u32) -> bool {
        (index as u64) < self.watermark || self.retired_above.contains(&index)
    }

    fn retire(&mut self, index: u32) -> Option<Vec<u8>> {
        let bytes = self.entries.remove(&index)?;
        if index as u64 == self.watermark {
            self.watermark += 1;
            while let Ok(next) = u32::try_from(self.watermark) {
                if !self.retired_above.remove(&next) {
                    break;
                }
                self.watermark += 1;
            }
        } else {
            self.retired_above.insert(index);
        }
        Some(bytes)
    }
}

/// Thread-safe map from chunk index to finished chunk bytes.
///
/// One lock guards the whole map. Every insert and remove signals the
/// condition variable, so blocked consumers wake as soon as the entry they
/// wait for shows up. A key is accepted at most once: once removed it is
/// retired and later inserts of it are ignored. Retired keys are tracked as a
/// watermark over the dense prefix `0..n` plus the few removed out of order.
pub struct ChunkStore {
    name: &'static str,
    inner: Mutex<StoreInner>,
    changed: Condvar,
}

impl ChunkStore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(StoreInner {
                entries: HashMap::new(),
                watermark: 0,
                retired_above: HashSet::new(),
            }),
            changed: Condvar::new(),
        }
    }

    /// Inserts `bytes` under `index` unless the key is present or retired.
    /// Returns `true` if the value was stored.
    pub fn insert_if_absent(&self, index: u32, bytes: Vec<u8>) -> bool {
        let mut inner = self.inner.lock();
        if inner.is_retired(index) || inner.entries.contains_key(&index) {
            debug!("[{}] ignoring duplicate insert for chunk {}", self.name, index);
            return false;
        }
        debug!("[{}] stored chunk {} ({} bytes)", self.name, index, bytes.len());
        inner.entries.insert(index, bytes);
        drop(inner);
        self.changed.notify_all();
        true
    }

    pub fn remove_if_present(&self, index: u32) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let bytes = inner.retire(index)?;
        drop(inner);
        self.changed.notify_all();
        Some(bytes)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.inner.lock().entries.contains_key(&index)
    }

    /// Returns a copy of an arbitrary pending entry without removing it.
    pub fn peek_any(&self) -> Option<(u32, Vec<u8>)> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .next()
            .map(|(index, bytes)| (*index, bytes.clone()))
    }

    /// Removes an arbitrary pending entry; peek and remove happen under one lock.
    pub fn take_any(&self) -> Option<(u32, Vec<u8>)> {
        let mut inner = self.inner.lock();
        let index = *inner.entries.keys().next()?;
        let bytes = inner.retire(index)?;
        drop(inner);
        self.changed.notify_all();
        Some((index, bytes))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until `index` is present and removes it.
    ///
    /// Returns `None` once `status` has failed. `poll` bounds each wait so a
    /// failure raised elsewhere is noticed even if nothing touches the store.
    pub fn wait_remove(&self, index: u32, status: &RunStatus, poll: Duration) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(bytes) = inner.retire(index) {
                drop(inner);
                self.changed.notify_all();
                return Some(bytes);
            }
            if status.is_failed() {
                return None;
            }
            self.changed.wait_for(&mut inner, poll);
        }
    }

    /// Blocks until any entry is pending and removes it.
    pub fn wait_take_any(&self, status: &RunStatus, poll: Duration) -> Option<(u32, Vec<u8>)> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(index) = inner.entries.keys().next().copied() {
                if let Some(bytes) = inner.retire(index) {
                    drop(inner);
                    self.changed.notify_all();
                    return Some((index, bytes));
                }
            }
            if status.is_failed() {
                return None;
            }
            self.changed.wait_for(&mut inner, poll);
        }
    }

    /// Number of leading indices `0..n` that have all been removed.
    pub fn watermark(&self) -> u64 {
        self.inner.lock().watermark
    }

    /// Blocks until the watermark reaches `target`.
    /// Returns `false` if `status` failed while waiting.
    pub fn wait_watermark(&self, target: u64, status: &RunStatus, poll: Duration) -> bool {
        let mut inner = self.inner.lock();
        loop {
            if inner.watermark >= target {
                return true;
            }
            if status.is_failed() {
                return false;
            }
            self.changed.wait_for(&mut inner, poll);
        }
    }
}
