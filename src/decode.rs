//! Lossless source decoding using symphonia
//!
//! Wraps symphonia behind the two-phase contract the session needs: opening a
//! source performs the header phase (format probe, stream info, tag and
//! picture capture), after which [`SourceDecoder::next_unit`] produces one
//! decode unit per call until end of stream.
//!
//! # Sample Format
//!
//! Units are interleaved i16 samples at the source channel count. Sources
//! with more than two channels are downmixed to stereo, since the MP3 target
//! carries at most two.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, Tag, Visual};
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Source stream properties captured during the header phase.
///
/// Populated once at open, immutable afterward.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    /// Sample rate in Hz; never zero for a successfully opened source
    pub sample_rate: u32,

    /// Channel count of the source stream
    pub channels: u16,

    /// Bits per sample as declared by the source
    pub bits_per_sample: u32,

    /// Total samples per channel in the source
    pub total_samples: u64,
}

/// Incremental decoder for one lossless source file.
pub struct SourceDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    tags: Vec<Tag>,
    visuals: Vec<Visual>,
    exhausted: bool,
    path: PathBuf,
}

impl SourceDecoder {
    /// Open a source file and complete the header phase.
    ///
    /// # Errors
    ///
    /// - [`Error::SourceUnavailable`] - file cannot be opened or its format
    ///   cannot be recognized
    /// - [`Error::MalformedSource`] - header metadata is structurally invalid
    ///   (zero sample rate, no channels, unknown total sample count)
    /// - [`Error::CodecInit`] - no decoder could be created for the track
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::SourceUnavailable(format!("failed to open {}: {}", path.display(), e))
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create hint from file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        // Probe format
        let mut probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                Error::SourceUnavailable(format!("failed to probe {}: {}", path.display(), e))
            })?;

        // Capture tags and pictures. Formats like FLAC surface them through
        // the format reader; containers probed from side data surface them
        // through the probe result instead.
        let mut tags = Vec::new();
        let mut visuals = Vec::new();
        if let Some(revision) = probed.format.metadata().current() {
            tags.extend(revision.tags().iter().cloned());
            visuals.extend(revision.visuals().iter().cloned());
        } else if let Some(revision) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            tags.extend(revision.tags().iter().cloned());
            visuals.extend(revision.visuals().iter().cloned());
        }

        let format = probed.format;

        // Get the default audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::MalformedSource(format!("no audio track in {}", path.display()))
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params.sample_rate.unwrap_or(0);
        if sample_rate == 0 {
            return Err(Error::MalformedSource(format!(
                "zero sample rate in {}",
                path.display()
            )));
        }

        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
        if channels == 0 {
            return Err(Error::MalformedSource(format!(
                "no channels in {}",
                path.display()
            )));
        }

        let total_samples = codec_params.n_frames.ok_or_else(|| {
            Error::MalformedSource(format!(
                "total sample count unknown in {}",
                path.display()
            ))
        })?;

        let bits_per_sample = codec_params.bits_per_sample.unwrap_or(16);

        let info = StreamInfo {
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
        };

        debug!(
            "opened {}: {} Hz, {} ch, {} bits, {} samples, {} tags, {} pictures",
            path.display(),
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            tags.len(),
            visuals.len()
        );

        // Create decoder
        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| {
                Error::CodecInit(format!("failed to create decoder for {}: {}", path.display(), e))
            })?;

        Ok(Self {
            format,
            decoder,
            track_id,
            info,
            tags,
            visuals,
            exhausted: false,
            path: path.to_path_buf(),
        })
    }

    /// Stream properties captured during the header phase
    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Take the captured tags and pictures out of the decoder.
    ///
    /// The metadata bridge consumes these exactly once at session
    /// construction; taking them frees the scratch copies afterwards.
    pub fn take_metadata(&mut self) -> (Vec<Tag>, Vec<Visual>) {
        (
            std::mem::take(&mut self.tags),
            std::mem::take(&mut self.visuals),
        )
    }

    /// Decode the next unit of source audio.
    ///
    /// Returns `Ok(None)` once the source is exhausted. Units are interleaved
    /// i16 samples at the channel count reported by
    /// [`SourceDecoder::output_channels`].
    pub fn next_unit(&mut self) -> Result<Option<Vec<i16>>> {
        if self.exhausted {
            return Ok(None);
        }

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("end of stream: {}", self.path.display());
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::Transcode(format!(
                        "failed to read packet from {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is skippable; the stream may recover
                    warn!("skipping corrupt packet in {}: {}", self.path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Transcode(format!(
                        "decode failed in {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;

            let mut sample_buf = SampleBuffer::<i16>::new(duration, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let channels = spec.channels.count();
            let samples = if channels > 2 {
                downmix_to_stereo(sample_buf.samples(), channels)
            } else {
                sample_buf.samples().to_vec()
            };

            return Ok(Some(samples));
        }
    }

    /// Channel count of the units produced by [`SourceDecoder::next_unit`]
    pub fn output_channels(&self) -> u16 {
        self.info.channels.min(2)
    }
}

/// Downmix interleaved multi-channel samples to stereo by averaging the
/// even-indexed channels into the left and the odd-indexed into the right.
fn downmix_to_stereo(samples: &[i16], channels: usize) -> Vec<i16> {
    let frames = samples.len() / channels;
    let mut out = Vec::with_capacity(frames * 2);

    for frame in samples.chunks_exact(channels) {
        let (mut left, mut right) = (0i32, 0i32);
        let (mut left_n, mut right_n) = (0i32, 0i32);
        for (ch, &sample) in frame.iter().enumerate() {
            if ch % 2 == 0 {
                left += i32::from(sample);
                left_n += 1;
            } else {
                right += i32::from(sample);
                right_n += 1;
            }
        }
        out.push((left / left_n.max(1)) as i16);
        out.push((right / right_n.max(1)) as i16);
    }

    out
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_file() {
        let result = SourceDecoder::open(Path::new("/nonexistent/file.flac"));
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
    }

    #[test]
    fn test_downmix_averages_pairs() {
        // two frames of four channels
        let samples = [100, 200, 300, 400, -100, -200, -300, -400];
        let stereo = downmix_to_stereo(&samples, 4);
        assert_eq!(stereo, vec![200, 300, -200, -300]);
    }

    #[test]
    fn test_downmix_three_channels() {
        // odd channel counts leave a lone right channel
        let samples = [10, 20, 30];
        let stereo = downmix_to_stereo(&samples, 3);
        assert_eq!(stereo, vec![20, 20]);
    }

    // Decoding real audio is covered by the session integration tests, which
    // generate WAV fixtures with hound.
}
