// compress/src/packer.rs

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use chunkzip_common::{
    create_output, discard_partial_output, panic_message, ChunkStore, ChunkzipError, Codec,
    CompressionReport, Framing, OrderedWriter, Result, RunStatus, StrategicConfig, WorkerPool,
    WriterStats,
};

use crate::source::{ChunkSource, FileChunkSource};

/// Splits one file into fixed-size chunks, compresses them on a worker pool
/// and writes the framed archive in chunk order.
pub struct Compressor {
    config: StrategicConfig,
    codec: Arc<dyn Codec>,
}

impl Compressor {
    pub fn new(config: StrategicConfig, codec: Arc<dyn Codec>) -> Self {
        Self { config, codec }
    }

    pub fn config(&self) -> &StrategicConfig {
        &self.config
    }

    /// Boolean form of [`Compressor::compress_file`]; the failure is logged.
    pub fn compress(&self, input: &Path, output: &Path) -> bool {
        match self.compress_file(input, output) {
            Ok(_) => true,
            Err(err) => {
                error!("[compress] {} -> {} failed: {}", input.display(), output.display(), err);
                false
            }
        }
    }

    pub fn compress_file(&self, input: &Path, output: &Path) -> Result<CompressionReport> {
        self.config.validate()?;
        let source = FileChunkSource::open(input, self.config.chunk_size)?;
        self.compress_source(Arc::new(source), output)
    }

    /// Compresses whatever `source` yields into an archive at `output`.
    /// A partial archive is removed on failure unless the config keeps it.
    pub fn compress_source(&self, source: Arc<dyn ChunkSource>, output: &Path) -> Result<CompressionReport> {
        let started = Instant::now();
        let chunk_count = source.chunk_count();
        let workers = self.config.compress_workers();
        info!(
            "[compress] {} bytes -> {} chunks, {} workers, codec {}",
            source.total_len(),
            chunk_count,
            workers,
            self.codec.name()
        );

        let sink = create_output(output)?;
        match self.run_pipeline(Arc::clone(&source), chunk_count, workers, sink) {
            Ok(stats) => {
                let report = CompressionReport {
                    chunks: stats.chunks_written,
                    bytes_in: source.total_len(),
                    bytes_out: stats.bytes_written,
                    workers,
                    elapsed: started.elapsed(),
                };
                info!(
                    "[compress] wrote {} ({} bytes, {:.2}%) in {:?}",
                    output.display(),
                    report.bytes_out,
                    report.ratio(),
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

    fn run_pipeline(
        &self,
        source: Arc<dyn ChunkSource>,
        chunk_count: u32,
        workers: usize,
        sink: BufWriter<File>,
    ) -> Result<WriterStats> {
        let status = Arc::new(RunStatus::new());
        let store = Arc::new(ChunkStore::new("compressed"));

        let writer = OrderedWriter::new(
            sink,
            chunk_count,
            Arc::clone(&store),
            Framing::LengthPrefixed,
            Arc::clone(&status),
            self.config.poll_interval,
        )
        .with_header()
        .spawn()?;

        let limit = self.config.max_chunks_in_memory.max(1) as u64;
        let poll = self.config.poll_interval;
        match WorkerPool::new(workers, self.config.queue_depth(workers)) {
            Ok(pool) => {
                // The k-th submitted task owns chunk k; the index is moved into the closure.
                for index in 0..chunk_count {
                    // At most `limit` chunks are in flight between dispatch and the sink.
                    let target = (index as u64 + 1).saturating_sub(limit);
                    if status.is_failed() || !store.wait_watermark(target, &status, poll) {
                        debug!("[compress] stop dispatching at chunk {}", index);
                        break;
                    }
                    let source = Arc::clone(&source);
                    let codec = Arc::clone(&self.codec);
                    let store = Arc::clone(&store);
                    let task_status = Arc::clone(&status);
                    let submitted = pool.submit(move || {
                        compress_chunk(index, source.as_ref(), codec.as_ref(), &store, &task_status)
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
                        "{} compression task(s) panicked",
                        pool.panicked_count()
                    )));
                }
            }
            Err(err) => {
                status.fail(err);
            }
        }

        let stats = match writer.join() {
            Ok(stats) => stats,
            Err(payload) => {
                status.fail(ChunkzipError::WorkerPanicked(panic_message(&*payload)));
                None
            }
        };
        status.check()?;
        stats.ok_or(ChunkzipError::Cancelled)
    }
}

fn compress_chunk(
    index: u32,
    source: &dyn ChunkSource,
    codec: &dyn Codec,
    store: &ChunkStore,
    status: &RunStatus,
) {
    if status.is_failed() {
        debug!("[compressor] skipping chunk {} after earlier failure", index);
        return;
    }

    let packed = source
        .read_chunk(index)
        .and_then(|raw| codec.compress(&raw).map(|packed| (raw.len(), packed)));

    match packed {
        Ok((raw_len, packed)) => {
            debug!("[compressor] chunk {}: {} -> {} bytes", index, raw_len, packed.len());
            store.insert_if_absent(index, packed);
        }
        Err(err) => {
            status.fail(err.at_chunk(index));
        }
    }
}
