use std::fs;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tempfile::{tempdir, NamedTempFile};

use chunkzip_common::{chunk_count_for, ChunkzipError, Codec, GzipCodec, Result, StrategicConfig};
use chunkzip_compress::{ChunkSource, Compressor, FileChunkSource};

const KIB: usize = 1024;
const CHUNK: usize = 128 * KIB;

fn fixture(len: usize) -> Vec<u8> {
    let line = b"the quick brown fox jumps over the lazy dog 0123456789\n";
    let mut data = Vec::with_capacity(len);
    let mut n = 0u32;
    while data.len() < len {
        data.extend_from_slice(&n.to_le_bytes());
        data.extend_from_slice(line);
        n += 1;
    }
    data.truncate(len);
    data
}

fn write_fixture(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn config(workers: usize) -> StrategicConfig {
    StrategicConfig::detect()
        .with_workers(workers)
        .with_poll_interval(Duration::from_millis(10))
}

/// Splits an archive into its declared count and frame payloads.
fn parse_archive(bytes: &[u8]) -> (u32, Vec<Vec<u8>>) {
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let mut pos = 4;
    let mut frames = Vec::new();
    while pos < bytes.len() {
        let len = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        frames.push(bytes[pos + 4..pos + 4 + len].to_vec());
        pos += 4 + len;
    }
    (count, frames)
}

struct MemorySource {
    data: Vec<u8>,
    chunk_size: usize,
    fail_at: Option<u32>,
    jitter_ms: u64,
    stall_first_ms: u64,
    stalled: AtomicBool,
    reads_during_stall: AtomicUsize,
    reads: AtomicUsize,
}

impl MemorySource {
    fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size,
            fail_at: None,
            jitter_ms: 0,
            stall_first_ms: 0,
            stalled: AtomicBool::new(false),
            reads_during_stall: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }
}

impl ChunkSource for MemorySource {
    fn chunk_count(&self) -> u32 {
        chunk_count_for(self.data.len() as u64, self.chunk_size).unwrap()
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn total_len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_chunk(&self, index: u32) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if index == 0 && self.stall_first_ms > 0 {
            self.stalled.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(self.stall_first_ms));
            self.stalled.store(false, Ordering::SeqCst);
        } else if self.stalled.load(Ordering::SeqCst) {
            self.reads_during_stall.fetch_add(1, Ordering::SeqCst);
        }
        if self.jitter_ms > 0 {
            let delay = rand::rng().random_range(0..self.jitter_ms);
            thread::sleep(Duration::from_millis(delay));
        }
        if Some(index) == self.fail_at {
            return Err(ChunkzipError::io("read chunk")(io::Error::other("injected read failure")));
        }
        let start = index as usize * self.chunk_size;
        let end = (start + self.chunk_size).min(self.data.len());
        Ok(self.data[start..end].to_vec())
    }
}

#[test]
fn test_chunk_count_matches_ceil_division() {
    for (len, expected) in [(0, 0), (1, 1), (CHUNK - 1, 1), (CHUNK, 1), (CHUNK + 1, 2), (5 * CHUNK + 7, 6)] {
        let file = write_fixture(&fixture(len));
        let source = FileChunkSource::open(file.path(), CHUNK).unwrap();
        assert_eq!(source.chunk_count(), expected, "len {len}");
        assert_eq!(source.total_len(), len as u64);
    }
}

#[test]
fn test_last_chunk_is_trimmed_not_padded() {
    let data = fixture(300 * KIB);
    let file = write_fixture(&data);
    let source = FileChunkSource::open(file.path(), CHUNK).unwrap();

    let sizes: Vec<usize> = (0..source.chunk_count())
        .map(|i| source.read_chunk(i).unwrap().len())
        .collect();
    assert_eq!(sizes, vec![CHUNK, CHUNK, 44 * KIB]);
    assert_eq!(source.read_chunk(2).unwrap(), &data[2 * CHUNK..]);
    assert!(source.read_chunk(3).is_err());
}

#[test]
fn test_300k_input_yields_three_ordered_frames() {
    let data = fixture(300 * KIB);
    let input = write_fixture(&data);
    let dir = tempdir().unwrap();
    let archive = dir.path().join("out.cz");

    let compressor = Compressor::new(config(4), Arc::new(GzipCodec::default()));
    let report = compressor.compress_file(input.path(), &archive).unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.bytes_in, 300 * KIB as u64);

    let bytes = fs::read(&archive).unwrap();
    assert_eq!(&bytes[..4], &[0x03, 0x00, 0x00, 0x00]);
    assert_eq!(report.bytes_out, bytes.len() as u64);

    let (count, frames) = parse_archive(&bytes);
    assert_eq!(count, 3);
    assert_eq!(frames.len(), 3);

    let codec = GzipCodec::default();
    let chunks: Vec<Vec<u8>> = frames.iter().map(|f| codec.decompress(f).unwrap()).collect();
    assert_eq!(chunks[0].len(), CHUNK);
    assert_eq!(chunks[1].len(), CHUNK);
    assert_eq!(chunks[2].len(), 44 * KIB);
    assert_eq!(chunks.concat(), data);
}

#[test]
fn test_empty_input_writes_header_only() {
    let input = write_fixture(&[]);
    let dir = tempdir().unwrap();
    let archive = dir.path().join("empty.cz");

    let compressor = Compressor::new(config(2), Arc::new(GzipCodec::default()));
    assert!(compressor.compress(input.path(), &archive));
    assert_eq!(fs::read(&archive).unwrap(), vec![0, 0, 0, 0]);
}

#[test]
fn test_frames_stay_in_index_order_under_random_latency() {
    let data = fixture(40 * 4 * KIB);
    let mut source = MemorySource::new(data.clone(), 4 * KIB);
    source.jitter_ms = 6;
    let dir = tempdir().unwrap();
    let archive = dir.path().join("jitter.cz");

    let compressor = Compressor::new(config(8), Arc::new(GzipCodec::default()));
    let report = compressor.compress_source(Arc::new(source), &archive).unwrap();
    assert_eq!(report.chunks, 40);

    let (count, frames) = parse_archive(&fs::read(&archive).unwrap());
    assert_eq!(count, 40);
    let codec = GzipCodec::default();
    for (index, frame) in frames.iter().enumerate() {
        let start = index * 4 * KIB;
        assert_eq!(codec.decompress(frame).unwrap(), &data[start..start + 4 * KIB], "frame {index}");
    }
}

#[test]
fn test_read_failure_on_chunk_one_stops_further_work() {
    let mut source = MemorySource::new(fixture(100 * 1024), 1024);
    source.fail_at = Some(1);
    let source = Arc::new(source);
    let dir = tempdir().unwrap();
    let archive = dir.path().join("failed.cz");

    // One worker runs tasks in submission order, so after chunk 1 fails every
    // remaining task must be skipped without touching the source.
    let compressor = Compressor::new(config(1), Arc::new(GzipCodec::default()));
    let err = compressor
        .compress_source(Arc::clone(&source) as Arc<dyn ChunkSource>, &archive)
        .unwrap_err();

    assert_eq!(err.chunk_index(), Some(1));
    assert_eq!(err.kind_name(), "IOError");
    assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    assert!(!archive.exists(), "partial archive should be removed");
}

#[test]
fn test_keep_partial_output_leaves_archive_behind() {
    let mut source = MemorySource::new(fixture(8 * 1024), 1024);
    source.fail_at = Some(1);
    let dir = tempdir().unwrap();
    let archive = dir.path().join("partial.cz");

    let compressor = Compressor::new(
        config(1).with_keep_partial_output(true),
        Arc::new(GzipCodec::default()),
    );
    assert!(compressor.compress_source(Arc::new(source), &archive).is_err());

    let bytes = fs::read(&archive).unwrap();
    assert_eq!(&bytes[..4], &8u32.to_le_bytes());
}

#[test]
fn test_missing_input_fails_without_creating_output() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("never.cz");
    let compressor = Compressor::new(config(1), Arc::new(GzipCodec::default()));
    assert!(!compressor.compress(&dir.path().join("missing.bin"), &archive));
    assert!(!archive.exists());
}

#[test]
fn test_slow_head_chunk_caps_chunks_in_flight() {
    let chunk_size = 8 * KIB;
    let data = fixture(16 * chunk_size);
    let source = Arc::new(MemorySource {
        stall_first_ms: 200,
        ..MemorySource::new(data.clone(), chunk_size)
    });
    let dir = tempdir().unwrap();
    let output = dir.path().join("stalled.cz");

    // Four idle workers, but only two chunks may sit between dispatch and the writer.
    let compressor = Compressor::new(
        config(4).with_chunk_size(chunk_size).with_max_chunks_in_memory(2),
        Arc::new(GzipCodec::default()),
    );
    let report = compressor
        .compress_source(Arc::clone(&source) as Arc<dyn ChunkSource>, &output)
        .unwrap();

    assert_eq!(report.chunks, 16);
    assert!(
        source.reads_during_stall.load(Ordering::SeqCst) <= 1,
        "read {} chunks while chunk 0 was stalled",
        source.reads_during_stall.load(Ordering::SeqCst)
    );

    let (_, frames) = parse_archive(&fs::read(&output).unwrap());
    let codec = GzipCodec::default();
    let restored: Vec<u8> = frames.iter().flat_map(|f| codec.decompress(f).unwrap()).collect();
    assert_eq!(restored, data);
}
