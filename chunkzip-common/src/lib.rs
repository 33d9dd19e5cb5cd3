pub mod chunk_store;
pub mod codec;
pub mod common_config;
pub mod error;
pub mod frame;
pub mod ordered_writer;
pub mod output;
pub mod status;
pub mod worker_pool;

use std::time::Duration;

pub use chunk_store::ChunkStore;
pub use codec::{Codec, CodecKind, GzipCodec, ZstdCodec};
pub use common_config::{StrategicConfig, CONFIG};
pub use error::{ChunkzipError, Result};
pub use frame::{chunk_count_for, frame_len, Framing, DEFAULT_CHUNK_SIZE};
pub use ordered_writer::{OrderedWriter, WriterStats};
pub use output::{create_output, discard_partial_output};
pub use status::RunStatus;
pub use worker_pool::{panic_message, PoolState, WorkerPool};

#[derive(Debug, Clone, Default)]
pub struct CompressionReport {
    pub chunks: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub workers: usize,
    pub elapsed: Duration,
}

impl CompressionReport {
    /// Archive size as a percentage of the input size.
    pub fn ratio(&self) -> f32 {
        if self.bytes_in == 0 {
            0.0
        } else {
            (self.bytes_out as f64 / self.bytes_in as f64 * 100.0) as f32
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecompressionReport {
    pub chunks: u32,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub workers: usize,
    pub elapsed: Duration,
}
