// compress/src/lib.rs

pub mod packer;
pub mod source;

pub use packer::Compressor;
pub use source::{ChunkSource, FileChunkSource};
