// chunkzip-cli/src/main.rs

mod archiver;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use log::info;

use chunkzip_common::{CodecKind, StrategicConfig};
use chunkzip_decompress::{list_archive, verify_archive};

use crate::archiver::{Archiver, ChunkArchiver};

const USAGE: &str = "usage: chunkzip <compress|decompress> <input> <output> [options]
       chunkzip <list|verify> <archive> [options]

options:
  --codec <gzip|zstd>     per-chunk codec (default gzip)
  --level <N>             compression level
  --workers <N>           worker threads (default: derived from core count)
  --chunk-size <BYTES>    raw chunk size for compression (default 131072)
  --keep-partial          keep a partially written output file on failure";

#[derive(Parser)]
#[command(name = "chunkzip")]
#[command(version, about = "chunkzip: parallel chunked file compression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a chunked archive
    Compress {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        opts: RunOptions,
    },

    /// Restore the original file from a chunked archive
    Decompress {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        opts: RunOptions,
    },

    /// Print the frame table of an archive
    List { input: PathBuf },

    /// Decode every chunk of an archive without writing output
    Verify {
        input: PathBuf,
        #[command(flatten)]
        opts: RunOptions,
    },
}

#[derive(Args, Debug, Clone)]
struct RunOptions {
    #[arg(long, default_value = "gzip")]
    codec: String,

    #[arg(long)]
    level: Option<i32>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    keep_partial: bool,
}

impl RunOptions {
    fn codec_kind(&self) -> Result<CodecKind> {
        Ok(self.codec.parse::<CodecKind>()?)
    }

    fn level(&self, kind: CodecKind) -> i32 {
        self.level.unwrap_or_else(|| kind.default_level())
    }

    fn config(&self, kind: CodecKind) -> StrategicConfig {
        let mut config = StrategicConfig::default()
            .with_compression_level(self.level(kind))
            .with_keep_partial_output(self.keep_partial);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        config
    }

    fn archiver(&self) -> Result<ChunkArchiver> {
        let kind = self.codec_kind()?;
        let config = self.config(kind);
        Ok(ChunkArchiver::new(config, kind.build(self.level(kind))))
    }
}

/// Verbs are matched case-insensitively; everything else is left alone.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();
    if let Some(verb) = args.get_mut(1) {
        if let Some(text) = verb.to_str() {
            if !text.starts_with('-') {
                *verb = OsString::from(text.to_ascii_lowercase());
            }
        }
    }
    args
}

fn list(input: &Path) -> Result<bool> {
    let listing = list_archive(input).with_context(|| format!("listing {}", input.display()))?;
    println!("{}: {} chunks, {} bytes", input.display(), listing.chunk_count, listing.archive_len);
    for frame in &listing.frames {
        println!("  #{:<6} offset {:>12}  {:>10} bytes", frame.index, frame.offset, frame.compressed_len);
    }
    println!("payload bytes: {}", listing.compressed_bytes());
    Ok(true)
}

fn verify(input: &Path, opts: &RunOptions) -> Result<bool> {
    let kind = opts.codec_kind()?;
    let report = verify_archive(input, opts.config(kind), kind.build(opts.level(kind)))
        .with_context(|| format!("verifying {}", input.display()))?;
    println!(
        "{}: OK, {} chunks decode to {} bytes ({:?})",
        input.display(),
        report.chunks,
        report.bytes_out,
        report.elapsed
    );
    Ok(true)
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Compress { input, output, opts } => {
            Ok(opts.archiver()?.compress(&input, &output))
        }
        Commands::Decompress { input, output, opts } => {
            Ok(opts.archiver()?.decompress(&input, &output))
        }
        Commands::List { input } => list(&input),
        Commands::Verify { input, opts } => verify(&input, &opts),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => err.exit(),
        Err(_) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
    };

    match run(cli) {
        Ok(true) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(normalize_args(args.iter().map(OsString::from)))
    }

    #[test]
    fn verb_is_case_insensitive() {
        let cli = parse(&["chunkzip", "CoMpReSs", "in.bin", "out.cz"]).unwrap();
        assert!(matches!(cli.command, Commands::Compress { .. }));
    }

    #[test]
    fn wrong_argument_count_is_a_parse_error() {
        assert!(parse(&["chunkzip", "compress", "in.bin"]).is_err());
        assert!(parse(&["chunkzip", "explode", "a", "b"]).is_err());
        assert!(parse(&["chunkzip"]).is_err());
    }

    #[test]
    fn options_flow_into_config() {
        let cli = parse(&[
            "chunkzip", "compress", "in", "out", "--codec", "zstd", "--workers", "3", "--chunk-size", "4096",
            "--keep-partial",
        ])
        .unwrap();
        let Commands::Compress { opts, .. } = cli.command else {
            panic!("expected compress");
        };
        let kind = opts.codec_kind().unwrap();
        assert_eq!(kind, CodecKind::Zstd);
        let config = opts.config(kind);
        assert_eq!(config.compression_level, 3);
        assert_eq!(config.compress_workers(), 3);
        assert_eq!(config.chunk_size, 4096);
        assert!(config.keep_partial_output);
    }

    #[test]
    fn unknown_codec_is_rejected() {
        let cli = parse(&["chunkzip", "decompress", "a", "b", "--codec", "lz4"]).unwrap();
        let Commands::Decompress { opts, .. } = cli.command else {
            panic!("expected decompress");
        };
        assert!(opts.archiver().is_err());
    }
}
