// decompress/src/lib.rs

pub mod archive;
pub mod inspect;
pub mod unpacker;

pub use archive::{ArchiveReader, FrameInfo};
pub use inspect::{list_archive, verify_archive, ArchiveListing};
pub use unpacker::Decompressor;
