//! Transcode session
//!
//! One session per open virtual file. Construction performs the header phase:
//! probe the lossless source, bridge its metadata into ID3 structures, write
//! the rendered header tag into the output buffer, and predict the exact
//! final byte length of the output before any audio is encoded. Reads then
//! drive the decode→encode pipeline incrementally, only as far as the
//! requested byte range demands; source exhaustion triggers the finisher,
//! which reconciles the prediction against what was actually produced and
//! appends the fixed trailing tag.
//!
//! # Access pattern
//!
//! Sessions are single-flow: decode and encode run strictly sequentially on
//! the calling thread, and a read may block while the pipeline advances.
//! Distinct sessions are fully independent. A caller that shares one session
//! across threads must serialize access itself (the owning file handle
//! normally does).

use crate::buffer::StreamBuffer;
use crate::config::TranscodeConfig;
use crate::decode::{SourceDecoder, StreamInfo};
use crate::encode::Mp3Encoder;
use crate::error::{Error, Result};
use crate::{id3v1, metadata};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Samples per MPEG-1 Layer III frame
const SAMPLES_PER_FRAME: u64 = 1152;

/// Frame slot scale: samples per frame over eight bits per byte
const FRAME_SLOT_BYTES: u64 = 144;

/// Length of the fixed trailing tag
pub const TRAILER_LEN: u64 = id3v1::TAG_LEN as u64;

/// Byte-range view over a file that is produced on demand.
///
/// The file-serving layer consumes this seam; [`TranscodeSession`] is its
/// one implementation today, and alternate codec pipelines can slot in
/// behind it without touching callers.
pub trait VirtualFile {
    /// Total size of the logical file, available immediately after open
    fn size(&self) -> u64;

    /// Read up to `buf.len()` bytes at `offset`, producing data as needed
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

/// Pipeline progress for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// Source audio still available; the pump may advance
    Streaming,

    /// Encoder flushed, trailing tag appended, codec handles released
    Flushed,
}

/// One transcoding session presenting a lossless source as a virtual MP3 file.
pub struct TranscodeSession {
    source_path: PathBuf,
    info: StreamInfo,
    buffer: StreamBuffer,

    /// Fixed at construction; never revised
    total_size: u64,

    /// Precomputed trailing tag, the last [`TRAILER_LEN`] bytes of the file
    trailer: [u8; id3v1::TAG_LEN],

    state: PipelineState,

    /// Latched on the first mid-stream codec failure; buffered ranges stay
    /// readable but the pipeline cannot progress further
    failed: bool,

    // Released in reverse order of acquisition: encoder first, then decoder
    encoder: Option<Mp3Encoder>,
    decoder: Option<SourceDecoder>,
}

impl TranscodeSession {
    /// Open a session for a virtual path.
    ///
    /// The lossless source path is derived from `virtual_path` by extension
    /// substitution. Construction is all-or-nothing: on any error the
    /// partially acquired codec handles are released and no session exists.
    ///
    /// # Errors
    ///
    /// - [`Error::SourceUnavailable`] - derived source cannot be opened
    /// - [`Error::MalformedSource`] - source header metadata is invalid
    /// - [`Error::CodecInit`] - decoder or encoder setup failed
    /// - [`Error::TagRender`] - the header tag could not be rendered
    pub fn open(virtual_path: &Path, config: &TranscodeConfig) -> Result<Self> {
        let source_path = derive_source_path(virtual_path, &config.source_ext);
        debug!(
            "opening session: {} -> {}",
            virtual_path.display(),
            source_path.display()
        );

        let mut decoder = SourceDecoder::open(&source_path)?;
        let info = decoder.info();

        // The tag set is consumed exactly once, for the header and trailer,
        // and discarded when this scope ends.
        let (tags, visuals) = decoder.take_metadata();
        let (header_tag, scale) = metadata::build_tag(&tags, &visuals, &info);
        let trailer = id3v1::render(&tags);

        let encoder = Mp3Encoder::new(
            info.sample_rate,
            decoder.output_channels(),
            config.bitrate,
            config.quality,
            scale,
        )?;

        // Render the header once; the rendered length is the size query and
        // the identical bytes are what lands in the buffer, so the header
        // portion of the prediction is exact by construction.
        let mut header = Cursor::new(Vec::new());
        header_tag
            .write_to(&mut header, id3::Version::Id3v24)
            .map_err(|e| Error::TagRender(format!("failed to render header tag: {}", e)))?;
        let header = header.into_inner();

        let mut buffer = StreamBuffer::new();
        if buffer.write(&header) != header.len() {
            return Err(Error::BufferAlloc("failed to buffer header tag".to_string()));
        }

        let audio_estimate = estimate_audio_bytes(info.total_samples, info.sample_rate, config.bitrate);
        let total_size = header.len() as u64 + audio_estimate + TRAILER_LEN;

        debug!(
            "session open: header {} bytes, predicted total {} bytes",
            header.len(),
            total_size
        );

        Ok(Self {
            source_path,
            info,
            buffer,
            total_size,
            trailer,
            state: PipelineState::Streaming,
            failed: false,
            encoder: Some(encoder),
            decoder: Some(decoder),
        })
    }

    /// Stream properties of the lossless source
    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Path of the lossless source backing this session
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Bytes of output produced so far
    pub fn buffered_bytes(&self) -> u64 {
        self.buffer.pos() as u64
    }

    /// Whether the pipeline has been flushed
    pub fn is_flushed(&self) -> bool {
        self.state == PipelineState::Flushed
    }

    /// Advance the pipeline until the buffer covers `target_end` bytes or
    /// the source is exhausted.
    ///
    /// Append-only: a target already covered performs no codec work. A codec
    /// failure latches the failed flag; bytes written before the failure
    /// remain valid.
    fn pump(&mut self, target_end: u64) -> Result<()> {
        while self.state == PipelineState::Streaming && (self.buffer.pos() as u64) < target_end {
            let unit = {
                let decoder = match self.decoder.as_mut() {
                    Some(decoder) => decoder,
                    None => break,
                };
                decoder.next_unit()
            };

            match unit {
                Ok(Some(samples)) => {
                    let encoded = match self.encoder.as_mut() {
                        Some(encoder) => encoder.encode(&samples),
                        None => break,
                    };
                    let bytes = match encoded {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            self.failed = true;
                            return Err(e);
                        }
                    };
                    if self.buffer.write(&bytes) != bytes.len() {
                        self.failed = true;
                        return Err(Error::BufferAlloc(
                            "failed to buffer encoded audio".to_string(),
                        ));
                    }
                }
                Ok(None) => self.finish()?,
                Err(e) => {
                    self.failed = true;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Flush the encoder, reconcile the size prediction, append the trailing
    /// tag, and release the codec handles. Runs exactly once.
    fn finish(&mut self) -> Result<()> {
        if self.state == PipelineState::Flushed {
            return Ok(());
        }

        if let Some(encoder) = self.encoder.as_mut() {
            match encoder.flush() {
                Ok(bytes) => {
                    if self.buffer.write(&bytes) != bytes.len() {
                        return Err(Error::BufferAlloc(
                            "failed to buffer encoder flush".to_string(),
                        ));
                    }
                }
                Err(e) => warn!("encoder flush failed, continuing to finalize: {}", e),
            }
        }

        // The prediction is an estimate; drift here is expected and the
        // position is corrected to honor the published file size.
        let produced = self.buffer.pos() as u64 + TRAILER_LEN;
        if produced != self.total_size {
            debug!(
                "size prediction off by {} bytes for {}",
                produced as i64 - self.total_size as i64,
                self.source_path.display()
            );
            self.buffer.set_pos((self.total_size - TRAILER_LEN) as usize);
        }

        if self.buffer.write(&self.trailer) != self.trailer.len() {
            return Err(Error::BufferAlloc("failed to buffer trailing tag".to_string()));
        }

        // Release in reverse order of acquisition
        self.encoder = None;
        self.decoder = None;
        self.state = PipelineState::Flushed;

        debug!(
            "session flushed: {} bytes total for {}",
            self.buffer.pos(),
            self.source_path.display()
        );

        Ok(())
    }
}

impl VirtualFile for TranscodeSession {
    fn size(&self) -> u64 {
        self.total_size
    }

    /// Read a byte range of the virtual file.
    ///
    /// The length is clamped so the range never extends past the predicted
    /// file size. A request entirely beyond what has been transcoded that
    /// overlaps the final [`TRAILER_LEN`] bytes is answered straight from
    /// the precomputed trailing tag, with the gap zero-filled, so tail
    /// probes never pay for a full transcode. All other requests drive the
    /// pipeline as far as needed and copy out of the buffer; when the
    /// source ends short of the request, the shorter actual length is
    /// returned.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.total_size || buf.is_empty() {
            return Ok(0);
        }
        let len = (buf.len() as u64).min(self.total_size - offset) as usize;
        let buf = &mut buf[..len];

        let trailer_start = self.total_size - TRAILER_LEN;
        if offset > self.buffer.pos() as u64 && offset + len as u64 > trailer_start {
            buf.fill(0);
            if trailer_start >= offset {
                let dst = (trailer_start - offset) as usize;
                let n = len - dst;
                buf[dst..].copy_from_slice(&self.trailer[..n]);
            } else {
                let src = (offset - trailer_start) as usize;
                buf.copy_from_slice(&self.trailer[src..src + len]);
            }
            return Ok(len);
        }

        let target_end = offset + len as u64;
        if (self.buffer.pos() as u64) < target_end {
            if self.failed {
                if offset >= self.buffer.pos() as u64 {
                    return Err(Error::Transcode(format!(
                        "transcoding of {} previously failed; no data at offset {}",
                        self.source_path.display(),
                        offset
                    )));
                }
            } else {
                self.pump(target_end)?;
            }
        }

        // Truncate when the source ended short of the request
        let available = self.buffer.pos() as u64;
        if offset >= available {
            return Ok(0);
        }
        let n = len.min((available - offset) as usize);
        buf[..n].copy_from_slice(&self.buffer.as_slice()[offset as usize..offset as usize + n]);
        Ok(n)
    }
}

/// Derive the lossless source path from a virtual path by extension
/// substitution. Paths without the `.mp3` extension pass through untouched.
pub fn derive_source_path(virtual_path: &Path, source_ext: &str) -> PathBuf {
    match virtual_path.extension().and_then(|e| e.to_str()) {
        Some("mp3") => virtual_path.with_extension(source_ext),
        _ => virtual_path.to_path_buf(),
    }
}

/// Estimate the encoded audio size from the constant-bitrate relation.
///
/// The arithmetic is deliberately integer and deliberately in this exact
/// shape: players cache the predicted size before the transcode completes,
/// so the result must be reproducible bit for bit.
fn estimate_audio_bytes(total_samples: u64, sample_rate: u32, bitrate: u32) -> u64 {
    let frames = divide_round(total_samples, SAMPLES_PER_FRAME) + 2;
    divide_round(
        frames * FRAME_SLOT_BYTES * u64::from(bitrate) * 10,
        u64::from(sample_rate / 100),
    )
}

/// Integer division with a round-half-up tie-break.
fn divide_round(one: u64, another: u64) -> u64 {
    let mut result = one / another;
    if one % another >= another / 2 {
        result += 1;
    }
    result
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divide_round_tie_break() {
        assert_eq!(divide_round(15, 10), 2);
        assert_eq!(divide_round(14, 10), 1);
        assert_eq!(divide_round(10, 10), 1);
        assert_eq!(divide_round(0, 10), 0);
    }

    #[test]
    fn test_frame_count_includes_margin() {
        // 441000 samples at 1152 per frame, plus the two-frame safety margin
        assert_eq!(divide_round(441_000, SAMPLES_PER_FRAME) + 2, 385);
    }

    #[test]
    fn test_audio_estimate_tracks_nominal_bitrate() {
        // 10 seconds of stereo 44.1 kHz at 128 kbps comes out near the
        // nominal 160000 bytes, plus the margin frames
        let estimate = estimate_audio_bytes(441_000, 44100, 128);
        assert_eq!(estimate, divide_round(385 * 144 * 128 * 10, 441));
        assert!(estimate > 160_000 && estimate < 162_000);
    }

    #[test]
    fn test_derive_source_path() {
        assert_eq!(
            derive_source_path(Path::new("/music/song.mp3"), "flac"),
            PathBuf::from("/music/song.flac")
        );
        // non-mp3 paths pass through
        assert_eq!(
            derive_source_path(Path::new("/music/song.ogg"), "flac"),
            PathBuf::from("/music/song.ogg")
        );
        assert_eq!(
            derive_source_path(Path::new("/music/noext"), "flac"),
            PathBuf::from("/music/noext")
        );
    }
}
