// decompress/src/inspect.rs

use std::io;
use std::path::Path;
use std::sync::Arc;

use chunkzip_common::{Codec, DecompressionReport, Result, StrategicConfig};

use crate::archive::{ArchiveReader, FrameInfo};
use crate::unpacker::Decompressor;

#[derive(Debug, Clone)]
pub struct ArchiveListing {
    pub chunk_count: u32,
    pub archive_len: u64,
    pub frames: Vec<FrameInfo>,
}

impl ArchiveListing {
    pub fn compressed_bytes(&self) -> u64 {
        self.frames.iter().map(|f| f.compressed_len as u64).sum()
    }
}

/// Walks the frame table without decoding any payload.
pub fn list_archive(path: &Path) -> Result<ArchiveListing> {
    let mut reader = ArchiveReader::open(path)?;
    let mut frames = Vec::with_capacity(reader.chunk_count() as usize);
    while let Some(info) = reader.next_frame_info()? {
        frames.push(info);
    }
    reader.finish()?;

    Ok(ArchiveListing {
        chunk_count: reader.chunk_count(),
        archive_len: reader.archive_len(),
        frames,
    })
}

/// Runs the full decompression pipeline into a sink that discards output.
pub fn verify_archive(path: &Path, config: StrategicConfig, codec: Arc<dyn Codec>) -> Result<DecompressionReport> {
    Decompressor::new(config, codec).decompress_to_writer(path, io::sink())
}
