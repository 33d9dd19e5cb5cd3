// compress/src/source.rs

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use chunkzip_common::{chunk_count_for, ChunkzipError, Result};

/// Produces raw chunks of the input by index.
///
/// Implementations must tolerate concurrent calls for different indices.
pub trait ChunkSource: Send + Sync {
    fn chunk_count(&self) -> u32;
    fn chunk_size(&self) -> usize;
    fn total_len(&self) -> u64;
    fn read_chunk(&self, index: u32) -> Result<Vec<u8>>;
}

/// Reads chunks straight from a file, opening a fresh handle per chunk so no
/// seek cursor is shared between workers.
#[derive(Debug, Clone)]
pub struct FileChunkSource {
    path: PathBuf,
    chunk_size: usize,
    len: u64,
    chunk_count: u32,
}

impl FileChunkSource {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let meta = fs::metadata(path).map_err(ChunkzipError::io(format!("stat {}", path.display())))?;
        if !meta.is_file() {
            return Err(ChunkzipError::Io {
                context: format!("open {}", path.display()),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        let len = meta.len();
        let chunk_count = chunk_count_for(len, chunk_size)?;
        debug!(
            "[source] {}: {} bytes -> {} chunks of {} bytes",
            path.display(),
            len,
            chunk_count,
            chunk_size
        );
        Ok(Self {
            path: path.to_path_buf(),
            chunk_size,
            len,
            chunk_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSource for FileChunkSource {
    fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn total_len(&self) -> u64 {
        self.len
    }

    fn read_chunk(&self, index: u32) -> Result<Vec<u8>> {
        if index >= self.chunk_count {
            return Err(ChunkzipError::Io {
                context: format!("read chunk {index}"),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("input only has {} chunks", self.chunk_count),
                ),
            });
        }

        let offset = index as u64 * self.chunk_size as u64;
        let mut file = File::open(&self.path)
            .map_err(ChunkzipError::io(format!("open {}", self.path.display())))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(ChunkzipError::io(format!("seek to chunk {index}")))?;

        let mut buf = Vec::with_capacity(self.chunk_size);
        file.take(self.chunk_size as u64)
            .read_to_end(&mut buf)
            .map_err(ChunkzipError::io(format!("read chunk {index}")))?;

        // The chunk count was fixed up front; an empty read means the file shrank.
        if buf.is_empty() {
            return Err(ChunkzipError::Io {
                context: format!("read chunk {index}"),
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "input file shrank during compression"),
            });
        }

        debug!("[source] read chunk {} ({} bytes at offset {})", index, buf.len(), offset);
        Ok(buf)
    }
}
