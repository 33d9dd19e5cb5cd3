// decompress/src/unpacker.rs

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info};

use chunkzip_common::{
    create_output, discard_partial_output, panic_message, ChunkStore, ChunkzipError, Codec,
    DecompressionReport, Framing, OrderedWriter, Result, RunStatus, StrategicConfig, WorkerPool,
};

use crate::archive::ArchiveReader;

/// Restores the original file from a framed archive.
///
/// A reader thread parses frames into a pending store, pool workers claim
/// pending records in any order and decode them into a second store, and the
/// ordered writer appends the decoded chunks by ascending index.
pub struct Decompressor {
    config: StrategicConfig,
    codec: Arc<dyn Codec>,
}

impl Decompressor {
    pub fn new(config: StrategicConfig, codec: Arc<dyn Codec>) -> Self {
        Self { config, codec }
    }

    /// Boolean form of [`Decompressor::decompress_file`]; the failure is logged.
    pub fn decompress(&self, input: &Path, output: &Path) -> bool {
        match self.decompress_file(input, output) {
            Ok(_) => true,
            Err(err) => {
                error!("[decompress] {} -> {} failed: {}", input.display(), output.display(), err);
                false
            }
        }
    }

    pub fn decompress_file(&self, input: &Path, output: &Path) -> Result<DecompressionReport> {
        let archive = ArchiveReader::open(input)?;
        let sink = create_output(output)?;
        match self.run(archive, sink) {
            Ok(report) => {
                info!(
                    "[decompress] restored {} ({} bytes) in {:?}",
                    output.display(),
                    report.bytes_out,
                    report.elapsed
                );
                Ok(report)
            }
            Err(err) => {
                discard_partial_output(output, self.config.keep_partial_output);
                Err(err)
            }
        }
    }

    /// Decompresses `input` into an arbitrary sink.
    pub fn decompress_to_writer<W>(&self, input: &Path, sink: W) -> Result<DecompressionReport>
    where
        W: Write + Send + 'static,
    {
        let archive = ArchiveReader::open(input)?;
        self.run(archive, sink)
    }

    fn run<W>(&self, archive: ArchiveReader, sink: W) -> Result<DecompressionReport>
    where
        W: Write + Send + 'static,
    {
        let started = Instant::now();
        let chunk_count = archive.chunk_count();
        let bytes_in = archive.archive_len();
        let workers = self.config.decompress_workers();
        let poll = self.config.poll_interval;
        info!(
            "[decompress] {} chunks, {} workers, codec {}",
            chunk_count,
            workers,
            self.codec.name()
        );

        let status = Arc::new(RunStatus::new());
        let pending = Arc::new(ChunkStore::new("pending"));
        let decoded = Arc::new(ChunkStore::new("decompressed"));

        let writer = OrderedWriter::new(
            sink,
            chunk_count,
            Arc::clone(&decoded),
            Framing::Raw,
            Arc::clone(&status),
            poll,
        )
        .spawn()?;

        let reader = match archive.spawn_into(
            Arc::clone(&pending),
            Arc::clone(&decoded),
            Arc::clone(&status),
            self.config.max_chunks_in_memory,
            poll,
        ) {
            Ok(handle) => Some(handle),
            Err(err) => {
                status.fail(err);
                None
            }
        };

        if status.is_ok() {
            self.dispatch(chunk_count, workers, &pending, &decoded, &status);
        }

        // Join both helpers before surfacing anything; a failure flips the status
        // so the other one stops waiting.
        if let Some(Err(payload)) = reader.map(|reader| reader.join()) {
            status.fail(ChunkzipError::WorkerPanicked(panic_message(&*payload)));
        }
        let stats = match writer.join() {
            Ok(stats) => stats,
            Err(payload) => {
                status.fail(ChunkzipError::WorkerPanicked(panic_message(&*payload)));
                None
            }
        };
        status.check()?;
        let stats = stats.ok_or(ChunkzipError::Cancelled)?;

        Ok(DecompressionReport {
            chunks: stats.chunks_written,
            bytes_in,
            bytes_out: stats.bytes_written,
            workers,
            elapsed: started.elapsed(),
        })
    }

    /// Submits one decode task per declared chunk. Each task claims whichever
    /// record is pending, so tasks and records pair up one to one.
    fn dispatch(
        &self,
        chunk_count: u32,
        workers: usize,
        pending: &Arc<ChunkStore>,
        decoded: &Arc<ChunkStore>,
        status: &Arc<RunStatus>,
    ) {
        let pool = match WorkerPool::new(workers, self.config.queue_depth(workers)) {
            Ok(pool) => pool,
            Err(err) => {
                status.fail(err);
                return;
            }
        };
        let poll = self.config.poll_interval;

        for task in 0..chunk_count {
            if status.is_failed() {
                debug!("[decompress] stop dispatching after {} tasks", task);
                break;
            }
            let pending = Arc::clone(pending);
            let decoded = Arc::clone(decoded);
            let codec = Arc::clone(&self.codec);
            let task_status = Arc::clone(status);
            let submitted = pool.submit(move || {
                decompress_next(&pending, &decoded, codec.as_ref(), &task_status, poll)
            });
            if let Err(err) = submitted {
                status.fail(err);
                break;
            }
        }

        if status.is_failed() {
            pool.abort();
        } else {
            pool.shutdown();
        }
        if pool.panicked_count() > 0 {
            status.fail(ChunkzipError::WorkerPanicked(format!(
                "{} decompression task(s) panicked",
                pool.panicked_count()
            )));
        }
    }
}

fn decompress_next(
    pending: &ChunkStore,
    decoded: &ChunkStore,
    codec: &dyn Codec,
    status: &RunStatus,
    poll: Duration,
) {
    let Some((index, payload)) = pending.wait_take_any(status, poll) else {
        debug!("[decompressor] no record claimed; run already failed");
        return;
    };

    match codec.decompress(&payload) {
        Ok(raw) => {
            debug!("[decompressor] chunk {}: {} -> {} bytes", index, payload.len(), raw.len());
            decoded.insert_if_absent(index, raw);
        }
        Err(err) => {
            status.fail(err.at_chunk(index));
        }
    }
}
