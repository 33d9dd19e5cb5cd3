// decompress/src/archive.rs

use std::fs::File;
use std::io::BufReader;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use chunkzip_common::frame::{frame_len, read_frame, read_frame_len, read_header, FRAME_PREFIX_LEN, HEADER_LEN};
use chunkzip_common::{panic_message, ChunkStore, ChunkzipError, Result, RunStatus};

/// Location of one frame inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub index: u32,
    pub offset: u64,
    pub compressed_len: u32,
}

/// Sequential reader over a framed archive.
pub struct ArchiveReader {
    reader: BufReader<File>,
    archive_len: u64,
    position: u64,
    chunk_count: u32,
    next_index: u32,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(ChunkzipError::io(format!("open {}", path.display())))?;
        let archive_len = file
            .metadata()
            .map_err(ChunkzipError::io(format!("stat {}", path.display())))?
            .len();
        let mut reader = BufReader::new(file);
        let chunk_count = read_header(&mut reader)?;

        // Every frame needs at least its length prefix.
        let body_len = archive_len.saturating_sub(HEADER_LEN);
        if chunk_count as u64 * FRAME_PREFIX_LEN > body_len {
            return Err(ChunkzipError::InvalidArchive(format!(
                "header declares {chunk_count} chunks but only {body_len} bytes follow"
            )));
        }
        debug!("[archive] {}: {} chunks, {} bytes", path.display(), chunk_count, archive_len);

        Ok(Self {
            reader,
            archive_len,
            position: HEADER_LEN,
            chunk_count,
            next_index: 0,
        })
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    pub fn archive_len(&self) -> u64 {
        self.archive_len
    }

    fn remaining(&self) -> u64 {
        self.archive_len.saturating_sub(self.position)
    }

    /// Next `(index, payload)` record, or `None` once all declared frames are read.
    pub fn next_frame(&mut self) -> Result<Option<(u32, Vec<u8>)>> {
        if self.next_index >= self.chunk_count {
            return Ok(None);
        }
        let index = self.next_index;
        let remaining = self.remaining();
        let payload = read_frame(&mut self.reader, remaining)?;
        self.position += frame_len(&payload);
        self.next_index += 1;
        Ok(Some((index, payload)))
    }

    /// Like [`ArchiveReader::next_frame`] but skips over the payload.
    pub fn next_frame_info(&mut self) -> Result<Option<FrameInfo>> {
        if self.next_index >= self.chunk_count {
            return Ok(None);
        }
        let offset = self.position;
        let remaining = self.remaining();
        let compressed_len = read_frame_len(&mut self.reader, remaining)?;
        self.reader
            .seek_relative(compressed_len as i64)
            .map_err(ChunkzipError::io("skip frame payload"))?;
        self.position += FRAME_PREFIX_LEN + compressed_len as u64;
        let info = FrameInfo {
            index: self.next_index,
            offset,
            compressed_len,
        };
        self.next_index += 1;
        Ok(Some(info))
    }

    /// Checks that the declared frames account for the whole archive.
    pub fn finish(&self) -> Result<()> {
        if self.next_index < self.chunk_count {
            return Err(ChunkzipError::InvalidArchive(format!(
                "read {} of {} declared frames",
                self.next_index, self.chunk_count
            )));
        }
        if self.position != self.archive_len {
            return Err(ChunkzipError::InvalidArchive(format!(
                "{} trailing bytes after {} declared frames",
                self.archive_len - self.position,
                self.chunk_count
            )));
        }
        Ok(())
    }

    /// Feeds every frame into `pending` from a dedicated thread.
    ///
    /// Frame `k` is only read once `written` has retired every index below
    /// `k + 1 - limit`, so at most `limit` chunks are between the reader and
    /// the sink at any time. Errors are reported through `status`.
    pub fn spawn_into(
        mut self,
        pending: Arc<ChunkStore>,
        written: Arc<ChunkStore>,
        status: Arc<RunStatus>,
        limit: usize,
        poll: Duration,
    ) -> Result<JoinHandle<()>> {
        let limit = limit.max(1) as u64;
        thread::Builder::new()
            .name("chunkzip-reader".into())
            .spawn(move || {
                let reader_status = Arc::clone(&status);
                let outcome = catch_unwind(AssertUnwindSafe(move || loop {
                    let target = (self.next_index as u64 + 1).saturating_sub(limit);
                    if !written.wait_watermark(target, &status, poll) {
                        debug!("[reader] stopping at frame {} after failure elsewhere", self.next_index);
                        return;
                    }
                    match self.next_frame() {
                        Ok(Some((index, payload))) => {
                            debug!("[reader] frame {} ({} bytes)", index, payload.len());
                            pending.insert_if_absent(index, payload);
                        }
                        Ok(None) => {
                            if let Err(err) = self.finish() {
                                status.fail(err);
                            }
                            return;
                        }
                        Err(err) => {
                            status.fail(err.at_chunk(self.next_index));
                            return;
                        }
                    }
                }));
                if let Err(payload) = outcome {
                    reader_status.fail(ChunkzipError::WorkerPanicked(panic_message(&*payload)));
                }
            })
            .map_err(ChunkzipError::io("spawn reader thread"))
    }
}
