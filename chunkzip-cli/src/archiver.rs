// chunkzip-cli/src/archiver.rs

use std::path::Path;
use std::sync::Arc;

use chunkzip_common::{Codec, StrategicConfig};
use chunkzip_compress::Compressor;
use chunkzip_decompress::Decompressor;

pub trait Archiver {
    fn compress(&self, input: &Path, output: &Path) -> bool;
    fn decompress(&self, input: &Path, output: &Path) -> bool;
}

/// Chunked parallel archiver: both directions share one config and codec.
pub struct ChunkArchiver {
    compressor: Compressor,
    decompressor: Decompressor,
}

impl ChunkArchiver {
    pub fn new(config: StrategicConfig, codec: Arc<dyn Codec>) -> Self {
        Self {
            compressor: Compressor::new(config.clone(), Arc::clone(&codec)),
            decompressor: Decompressor::new(config, codec),
        }
    }
}

impl Archiver for ChunkArchiver {
    fn compress(&self, input: &Path, output: &Path) -> bool {
        self.compressor.compress(input, output)
    }

    fn decompress(&self, input: &Path, output: &Path) -> bool {
        self.decompressor.decompress(input, output)
    }
}
