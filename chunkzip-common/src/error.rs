use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkzipError {
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("codec error{}: {message}", fmt_index(.index))]
    Codec { index: Option<u32>, message: String },
    #[error("worker pool has been shut down; no new work accepted")]
    PoolClosed,
    #[error("worker pool is shutting down; no new work accepted")]
    PoolClosing,
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("input of {len} bytes needs more than u32::MAX chunks of {chunk_size} bytes")]
    TooManyChunks { len: u64, chunk_size: usize },
    #[error("operation cancelled after an earlier failure")]
    Cancelled,
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("chunk {index} failed: {source}")]
    ChunkFailed {
        index: u32,
        #[source]
        source: Box<ChunkzipError>,
    },
}

fn fmt_index(index: &Option<u32>) -> String {
    match index {
        Some(i) => format!(" in chunk {i}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ChunkzipError>;

impl ChunkzipError {
    /// Returns a closure for `map_err` that wraps an `io::Error` with context.
    pub fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> ChunkzipError {
        let context = context.into();
        move |source| ChunkzipError::Io { context, source }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        ChunkzipError::Codec {
            index: None,
            message: message.into(),
        }
    }

    /// Attaches a chunk index, keeping the innermost kind intact.
    pub fn at_chunk(self, index: u32) -> Self {
        match self {
            ChunkzipError::Codec { message, .. } => ChunkzipError::ChunkFailed {
                index,
                source: Box::new(ChunkzipError::Codec {
                    index: Some(index),
                    message,
                }),
            },
            already @ ChunkzipError::ChunkFailed { .. } => already,
            other => ChunkzipError::ChunkFailed {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Chunk index this failure is attributed to, if any.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            ChunkzipError::ChunkFailed { index, .. } => Some(*index),
            ChunkzipError::Codec { index, .. } => *index,
            _ => None,
        }
    }

    /// Short label for the failure kind, used in log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChunkzipError::Io { .. } => "IOError",
            ChunkzipError::Codec { .. } => "CodecError",
            ChunkzipError::PoolClosed => "PoolClosed",
            ChunkzipError::PoolClosing => "PoolClosing",
            ChunkzipError::InvalidArchive(_) => "InvalidArchive",
            ChunkzipError::InvalidConfig(_) => "InvalidConfig",
            ChunkzipError::TooManyChunks { .. } => "TooManyChunks",
            ChunkzipError::Cancelled => "Cancelled",
            ChunkzipError::WorkerPanicked(_) => "WorkerPanicked",
            ChunkzipError::ChunkFailed { source, .. } => source.kind_name(),
        }
    }
}
