use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use log::{info, warn};

use crate::error::{ChunkzipError, Result};

/// Creates (or truncates) the output file.
pub fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .map_err(ChunkzipError::io(format!("create {}", path.display())))?;
    Ok(BufWriter::new(file))
}

/// Removes a partially written output after a failed run, unless asked to keep it.
/// A failed removal is only logged so it never masks the original error.
pub fn discard_partial_output(path: &Path, keep: bool) {
    if keep {
        warn!("[output] keeping partial output {}", path.display());
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => info!("[output] removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("[output] could not remove partial output {}: {}", path.display(), e),
    }
}
