//! Per-chunk codecs. Every payload is a self-contained stream so any worker
//! can decode any chunk in isolation.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{ChunkzipError, Result};

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>>;
}

/// DEFLATE wrapped in one gzip member per chunk.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    pub fn new(level: i32) -> Self {
        Self {
            level: level.clamp(0, 9) as u32,
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(input.len() / 2 + 64),
            Compression::new(self.level),
        );
        encoder
            .write_all(input)
            .map_err(|e| ChunkzipError::codec(format!("gzip encode: {e}")))?;
        encoder
            .finish()
            .map_err(|e| ChunkzipError::codec(format!("gzip finish: {e}")))
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(input);
        let mut output = Vec::with_capacity(input.len() * 2);
        decoder
            .read_to_end(&mut output)
            .map_err(|e| ChunkzipError::codec(format!("gzip decode: {e}")))?;
        // GzDecoder stops after one member; anything left over is not ours.
        let leftover = decoder.into_inner();
        if !leftover.is_empty() {
            return Err(ChunkzipError::codec(format!(
                "{} trailing bytes after gzip member",
                leftover.len()
            )));
        }
        Ok(output)
    }
}

/// One zstd frame per chunk.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::encode_all(input, self.level)
            .map_err(|e| ChunkzipError::codec(format!("zstd encode: {e}")))
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        zstd::stream::decode_all(input)
            .map_err(|e| ChunkzipError::codec(format!("zstd decode: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecKind {
    #[default]
    Gzip,
    Zstd,
}

impl CodecKind {
    pub fn default_level(self) -> i32 {
        match self {
            CodecKind::Gzip => 6,
            CodecKind::Zstd => 3,
        }
    }

    pub fn build(self, level: i32) -> Arc<dyn Codec> {
        match self {
            CodecKind::Gzip => Arc::new(GzipCodec::new(level)),
            CodecKind::Zstd => Arc::new(ZstdCodec::new(level)),
        }
    }
}

impl FromStr for CodecKind {
    type Err = ChunkzipError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" | "deflate" => Ok(CodecKind::Gzip),
            "zstd" | "zst" => Ok(CodecKind::Zstd),
            other => Err(ChunkzipError::InvalidConfig(format!("unknown codec '{other}'"))),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Gzip => f.write_str("gzip"),
            CodecKind::Zstd => f.write_str("zstd"),
        }
    }
}
