//! # mp3view
//!
//! Presents a lossless audio file as a virtual MP3 file whose bytes are
//! produced on demand, so a file-serving layer can offer byte-range reads
//! over a file that does not physically exist in that format.
//!
//! **Purpose:** Predict the exact byte length of the transcoded output
//! before encoding starts, drive an incremental decode→encode pipeline only
//! as far as each requested range demands, bridge source metadata into ID3
//! tags, and reconcile the predicted length against reality once encoding
//! finishes.
//!
//! **Architecture:** Single-flow pipeline per session using symphonia for
//! lossless decoding and LAME for MP3 encoding.

pub mod buffer;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod id3v1;
pub mod metadata;
pub mod session;

pub use config::TranscodeConfig;
pub use error::{Error, Result};
pub use session::{TranscodeSession, VirtualFile};
