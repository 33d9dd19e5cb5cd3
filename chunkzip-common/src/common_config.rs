use std::time::Duration;

use log::debug;
use once_cell::sync::Lazy;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::error::{ChunkzipError, Result};
use crate::frame::DEFAULT_CHUNK_SIZE;

const MIN_FREE_MEMORY_RATIO: f32 = 0.25;
const MIN_CHUNKS_IN_MEMORY: usize = 4;
const MAX_CHUNKS_IN_MEMORY: usize = 4096;

#[derive(Debug, Clone)]
pub struct StrategicConfig {
    pub chunk_size: usize,
    pub available_cores: usize,
    pub worker_override: Option<usize>,
    pub queue_depth_factor: usize,
    pub max_chunks_in_memory: usize,
    pub compression_level: i32,
    pub poll_interval: Duration,
    pub keep_partial_output: bool,
}

pub static CONFIG: Lazy<StrategicConfig> = Lazy::new(StrategicConfig::detect);

impl Default for StrategicConfig {
    fn default() -> Self {
        CONFIG.clone()
    }
}

impl StrategicConfig {
    /// Probes the machine once and derives pool and memory limits from it.
    pub fn detect() -> Self {
        let refresh = RefreshKind::everything().with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh);
        sys.refresh_memory();

        let total_memory = sys.total_memory();
        let logical = num_cpus::get().max(1);
        let cores = System::physical_core_count().unwrap_or(logical).max(1);

        let chunk_size = DEFAULT_CHUNK_SIZE;
        let queue_depth_factor = 4;
        let compression_level = 6;
        let max_mem_allowed = ((total_memory as f64) * (1.0 - MIN_FREE_MEMORY_RATIO as f64)) as u64;
        let max_chunks_in_memory = ((max_mem_allowed / chunk_size as u64) as usize)
            .clamp(MIN_CHUNKS_IN_MEMORY, MAX_CHUNKS_IN_MEMORY);

        debug!(
            "[strategic_config] detected {} physical / {} logical cores and {} MiB memory",
            cores,
            logical,
            total_memory / (1024 * 1024)
        );
        debug!("[strategic_config] compress workers: {} (cores - 2)", cores.saturating_sub(2).max(1));
        debug!("[strategic_config] decompress workers: {} (cores - 3)", cores.saturating_sub(3).max(1));
        debug!("[strategic_config] queue_depth_factor: {}", queue_depth_factor);
        debug!(
            "[strategic_config] min_free_memory_ratio: {:.0}%",
            MIN_FREE_MEMORY_RATIO * 100.0
        );
        debug!("[strategic_config] chunk_size: {}", chunk_size);
        debug!("[strategic_config] max_chunks_in_memory: {}", max_chunks_in_memory);
        debug!("[strategic_config] compression_level: {}", compression_level);

        StrategicConfig {
            chunk_size,
            available_cores: cores,
            worker_override: None,
            queue_depth_factor,
            max_chunks_in_memory,
            compression_level,
            poll_interval: Duration::from_millis(100),
            keep_partial_output: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_override = Some(workers);
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_keep_partial_output(mut self, keep: bool) -> Self {
        self.keep_partial_output = keep;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_chunks_in_memory(mut self, limit: usize) -> Self {
        self.max_chunks_in_memory = limit.max(1);
        self
    }

    /// Pool size for compression: one core each for the writer and the dispatcher.
    pub fn compress_workers(&self) -> usize {
        self.worker_override
            .unwrap_or_else(|| self.available_cores.saturating_sub(2).max(1))
    }

    /// Pool size for decompression: reader, writer and dispatcher each take a core.
    pub fn decompress_workers(&self) -> usize {
        self.worker_override
            .unwrap_or_else(|| self.available_cores.saturating_sub(3).max(1))
    }

    /// Bounded task queue capacity for a pool of `workers`.
    pub fn queue_depth(&self, workers: usize) -> usize {
        (workers.max(1) * self.queue_depth_factor.max(1)).max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkzipError::InvalidConfig("chunk size must be > 0".into()));
        }
        if self.chunk_size as u64 > u32::MAX as u64 {
            return Err(ChunkzipError::InvalidConfig(format!(
                "chunk size {} does not fit a u32 frame length",
                self.chunk_size
            )));
        }
        Ok(())
    }
}
