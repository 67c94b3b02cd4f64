//! Error types for mp3view
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Session construction is all-or-nothing: any error returned from
//! [`crate::session::TranscodeSession::open`] means no session exists and every
//! partially-acquired codec handle has already been released. Mid-stream
//! transcode errors leave already-produced bytes readable.

use thiserror::Error;

/// Main error type for mp3view
#[derive(Error, Debug)]
pub enum Error {
    /// The derived source path could not be opened or recognized
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Source header metadata is structurally invalid (e.g. zero sample rate)
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    /// Decoder or encoder could not be initialized or configured
    #[error("Codec initialization error: {0}")]
    CodecInit(String),

    /// Decode or encode failure mid-stream
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Output buffer allocation failure
    #[error("Buffer allocation error: {0}")]
    BufferAlloc(String),

    /// ID3 tag rendering errors
    #[error("Tag render error: {0}")]
    TagRender(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using mp3view Error
pub type Result<T> = std::result::Result<T, Error>;
