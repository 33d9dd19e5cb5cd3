// chunkzip-common/src/ordered_writer.rs

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use crate::chunk_store::ChunkStore;
use crate::error::{ChunkzipError, Result};
use crate::frame::{write_frame, write_header, Framing};
use crate::status::RunStatus;
use crate::worker_pool::panic_message;

type Observer = Box<dyn FnMut(u32, usize) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub chunks_written: u32,
    pub bytes_written: u64,
}

/// Single consumer that drains a [`ChunkStore`] in ascending index order.
///
/// The cursor starts at 0 and only moves forward by one after a chunk has
/// been written and flushed, so the sink sees chunks `0..chunk_count` exactly
/// once each regardless of the order producers finish in.
pub struct OrderedWriter<W: Write + Send> {
    sink: W,
    chunk_count: u32,
    store: Arc<ChunkStore>,
    framing: Framing,
    status: Arc<RunStatus>,
    poll: Duration,
    write_header: bool,
    observer: Option<Observer>,
}

impl<W: Write + Send + 'static> OrderedWriter<W> {
    pub fn new(
        sink: W,
        chunk_count: u32,
        store: Arc<ChunkStore>,
        framing: Framing,
        status: Arc<RunStatus>,
        poll: Duration,
    ) -> Self {
        Self {
            sink,
            chunk_count,
            store,
            framing,
            status,
            poll,
            write_header: false,
            observer: None,
        }
    }

    /// Emit the archive header (chunk count) before the first chunk.
    pub fn with_header(mut self) -> Self {
        self.write_header = true;
        self
    }

    /// Called with `(index, payload_len)` after each chunk is on disk.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(u32, usize) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn run(mut self) -> Result<WriterStats> {
        let mut stats = WriterStats::default();

        if self.write_header {
            write_header(&mut self.sink, self.chunk_count)?;
            stats.bytes_written += crate::frame::HEADER_LEN;
        }
        self.sink
            .flush()
            .map_err(ChunkzipError::io("flush output"))?;

        let mut cursor: u32 = 0;
        while cursor < self.chunk_count {
            let Some(payload) = self.store.wait_remove(cursor, &self.status, self.poll) else {
                debug!("[writer] stopping at chunk {} after failure elsewhere", cursor);
                return Err(ChunkzipError::Cancelled);
            };

            match self.framing {
                Framing::LengthPrefixed => write_frame(&mut self.sink, &payload)?,
                Framing::Raw => self
                    .sink
                    .write_all(&payload)
                    .map_err(ChunkzipError::io("write output chunk"))?,
            }
            self.sink
                .flush()
                .map_err(ChunkzipError::io("flush output"))?;

            stats.chunks_written += 1;
            stats.bytes_written += self.framing.encoded_len(&payload);
            debug!("[writer] wrote chunk {} ({} bytes)", cursor, payload.len());

            if let Some(observer) = self.observer.as_mut() {
                observer(cursor, payload.len());
            }
            cursor += 1;
        }

        info!(
            "[writer] done: {} chunks, {} bytes",
            stats.chunks_written, stats.bytes_written
        );
        Ok(stats)
    }

    /// Runs the writer on its own thread. Failures, panics included, go to the
    /// shared run status and the thread yields `None`.
    pub fn spawn(self) -> Result<JoinHandle<Option<WriterStats>>> {
        let status = Arc::clone(&self.status);
        thread::Builder::new()
            .name("chunkzip-writer".into())
            .spawn(move || match catch_unwind(AssertUnwindSafe(move || self.run())) {
                Ok(Ok(stats)) => Some(stats),
                Ok(Err(err)) => {
                    status.fail(err);
                    None
                }
                Err(payload) => {
                    status.fail(ChunkzipError::WorkerPanicked(panic_message(&*payload)));
                    None
                }
            })
            .map_err(ChunkzipError::io("spawn writer thread"))
    }
}
