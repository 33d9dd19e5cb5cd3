//! On-disk archive layout.
//!
//! ```text
//! [0..4)  chunk_count : u32 LE
//! repeat chunk_count times:
//!         compressed_length : u32 LE
//!         compressed_payload : [u8; compressed_length]
//! ```

use std::io::{self, Read, Write};

use crate::error::{ChunkzipError, Result};

pub const HEADER_LEN: u64 = 4;
pub const FRAME_PREFIX_LEN: u64 = 4;
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// How the ordered writer emits each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `u32` little-endian length followed by the payload (archive side).
    LengthPrefixed,
    /// Payload bytes only (restored file side).
    Raw,
}

/// On-disk size of one length-prefixed frame carrying `payload`.
pub fn frame_len(payload: &[u8]) -> u64 {
    FRAME_PREFIX_LEN + payload.len() as u64
}

impl Framing {
    pub fn encoded_len(self, payload: &[u8]) -> u64 {
        match self {
            Framing::LengthPrefixed => frame_len(payload),
            Framing::Raw => payload.len() as u64,
        }
    }
}

pub fn write_header<W: Write>(w: &mut W, chunk_count: u32) -> Result<()> {
    w.write_all(&chunk_count.to_le_bytes())
        .map_err(ChunkzipError::io("write archive header"))
}

pub fn read_header<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            ChunkzipError::InvalidArchive("archive shorter than its 4-byte header".into())
        }
        _ => ChunkzipError::io("read archive header")(e),
    })?;
    Ok(u32::from_le_bytes(buf))
}

pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        ChunkzipError::InvalidArchive(format!(
            "frame payload of {} bytes exceeds u32 length prefix",
            payload.len()
        ))
    })?;
    w.write_all(&len.to_le_bytes())
        .map_err(ChunkzipError::io("write frame length"))?;
    w.write_all(payload)
        .map_err(ChunkzipError::io("write frame payload"))
}

/// Reads one frame. `remaining` is the number of archive bytes left after the
/// current position, used to reject corrupt lengths before allocating.
pub fn read_frame<R: Read>(r: &mut R, remaining: u64) -> Result<Vec<u8>> {
    let len = read_frame_len(r, remaining)?;
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            ChunkzipError::InvalidArchive("frame payload truncated".into())
        }
        _ => ChunkzipError::io("read frame payload")(e),
    })?;
    Ok(payload)
}

/// Reads a frame's length prefix and checks it against `remaining`.
pub fn read_frame_len<R: Read>(r: &mut R, remaining: u64) -> Result<u32> {
    if remaining < FRAME_PREFIX_LEN {
        return Err(ChunkzipError::InvalidArchive(format!(
            "expected a frame but only {remaining} bytes remain"
        )));
    }
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(ChunkzipError::io("read frame length"))?;
    let len = u32::from_le_bytes(buf);
    if len as u64 > remaining - FRAME_PREFIX_LEN {
        return Err(ChunkzipError::InvalidArchive(format!(
            "frame declares {} bytes but only {} remain",
            len,
            remaining - FRAME_PREFIX_LEN
        )));
    }
    Ok(len)
}

pub fn chunk_count_for(len: u64, chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 {
        return Err(ChunkzipError::InvalidConfig("chunk size must be > 0".into()));
    }
    let count = len.div_ceil(chunk_size as u64);
    u32::try_from(count).map_err(|_| ChunkzipError::TooManyChunks { len, chunk_size })
}
