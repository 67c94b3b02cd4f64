//! mp3view - Main entry point
//!
//! Materializes the MP3 rendition of a lossless audio file by driving a
//! transcode session with sequential byte-range reads, the same way a
//! file-serving layer would.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mp3view::{TranscodeConfig, TranscodeSession, VirtualFile};

/// Command-line arguments for mp3view
#[derive(Parser, Debug)]
#[command(name = "mp3view")]
#[command(about = "Transcode a lossless audio file through a virtual MP3 file session")]
#[command(version)]
struct Args {
    /// Virtual .mp3 path; the matching lossless source must exist beside it
    input: PathBuf,

    /// Output file (defaults to the virtual path itself)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target bitrate in kbps
    #[arg(short, long, env = "MP3VIEW_BITRATE")]
    bitrate: Option<u32>,

    /// LAME quality, 0 (best) to 9 (worst)
    #[arg(short, long, env = "MP3VIEW_QUALITY")]
    quality: Option<u8>,

    /// Lossless source file extension
    #[arg(short, long, env = "MP3VIEW_SOURCE_EXT")]
    source_ext: Option<String>,

    /// TOML configuration file
    #[arg(short, long, env = "MP3VIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Read chunk size in bytes
    #[arg(long, default_value = "131072")]
    chunk: usize,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mp3view=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = TranscodeConfig::load(
        args.config.as_deref(),
        args.bitrate,
        args.quality,
        args.source_ext.as_deref(),
    )
    .context("Failed to resolve configuration")?;

    info!(
        "Transcoding {} at {} kbps, quality {}",
        args.input.display(),
        config.bitrate,
        config.quality
    );

    let mut session =
        TranscodeSession::open(&args.input, &config).context("Failed to open transcode session")?;

    info!(
        "Source: {} ({} Hz, {} ch), predicted output size {} bytes",
        session.source_path().display(),
        session.info().sample_rate,
        session.info().channels,
        session.size()
    );

    let out_path = args.output.unwrap_or_else(|| args.input.clone());
    let mut out = File::create(&out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;

    let mut chunk = vec![0u8; args.chunk.max(1)];
    let mut offset = 0u64;
    while offset < session.size() {
        let n = session
            .read_at(offset, &mut chunk)
            .context("Transcode read failed")?;
        if n == 0 {
            break;
        }
        out.write_all(&chunk[..n])
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        offset += n as u64;
    }

    info!("Wrote {} bytes to {}", offset, out_path.display());
    Ok(())
}
