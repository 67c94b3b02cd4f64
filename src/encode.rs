//! MP3 encoding using LAME
//!
//! Wraps mp3lame-encoder behind the configure/encode/flush contract the
//! transcode pump drives. One encoder instance lives for the whole session
//! and is flushed exactly once by the session finisher.

use crate::error::{Error, Result};
use mp3lame_encoder::{Bitrate, Builder, Encoder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};
use tracing::warn;

/// Per-call flush reserve recommended by LAME
const FLUSH_RESERVE: usize = 7200;

/// MP3 encoder handle for one transcode session.
pub struct Mp3Encoder {
    encoder: Encoder,
    channels: u16,

    /// Linear output scale from replay gain; `None` keeps the encoder default
    scale: Option<f32>,
}

impl Mp3Encoder {
    /// Create and configure an encoder.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - input sample rate in Hz
    /// * `channels` - input channel count, 1 or 2
    /// * `bitrate` - target constant bitrate in kbps
    /// * `quality` - LAME quality, 0 (best) to 9 (worst)
    /// * `scale` - optional linear volume multiplier derived from replay gain
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodecInit`] when LAME rejects the configuration.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bitrate: u32,
        quality: u8,
        scale: Option<f32>,
    ) -> Result<Self> {
        let mut builder = Builder::new()
            .ok_or_else(|| Error::CodecInit("failed to allocate LAME encoder".to_string()))?;

        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| Error::CodecInit(format!("set_sample_rate({}): {:?}", sample_rate, e)))?;
        builder
            .set_num_channels(channels as u8)
            .map_err(|e| Error::CodecInit(format!("set_num_channels({}): {:?}", channels, e)))?;
        builder
            .set_brate(map_bitrate(bitrate))
            .map_err(|e| Error::CodecInit(format!("set_brate({}): {:?}", bitrate, e)))?;
        builder
            .set_quality(map_quality(quality))
            .map_err(|e| Error::CodecInit(format!("set_quality({}): {:?}", quality, e)))?;

        let encoder = builder
            .build()
            .map_err(|e| Error::CodecInit(format!("failed to build LAME encoder: {:?}", e)))?;

        Ok(Self {
            encoder,
            channels,
            scale,
        })
    }

    /// Encode one unit of interleaved i16 samples and return the MP3 bytes.
    ///
    /// May return an empty vector while LAME accumulates its internal frame.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        let scaled;
        let pcm: &[i16] = match self.scale {
            Some(scale) => {
                scaled = apply_scale(samples, scale);
                &scaled
            }
            None => samples,
        };

        // LAME worst case: 1.25 * samples + 7200 bytes
        let mut out: Vec<u8> = Vec::with_capacity(pcm.len() * 5 / 4 + FLUSH_RESERVE);

        let written = if self.channels == 1 {
            self.encoder.encode(MonoPcm(pcm), out.spare_capacity_mut())
        } else {
            self.encoder
                .encode(InterleavedPcm(pcm), out.spare_capacity_mut())
        }
        .map_err(|e| Error::Transcode(format!("LAME encode failed: {:?}", e)))?;

        // SAFETY: LAME wrote exactly `written` bytes into the spare capacity
        unsafe {
            out.set_len(written);
        }

        Ok(out)
    }

    /// Flush buffered encoder state and return the final MP3 bytes.
    pub fn flush(&mut self) -> Result<Vec<u8>> {
        let mut out: Vec<u8> = Vec::with_capacity(FLUSH_RESERVE);

        let written = self
            .encoder
            .flush::<FlushNoGap>(out.spare_capacity_mut())
            .map_err(|e| Error::Transcode(format!("LAME flush failed: {:?}", e)))?;

        // SAFETY: LAME wrote exactly `written` bytes into the spare capacity
        unsafe {
            out.set_len(written);
        }

        Ok(out)
    }
}

/// Apply a linear volume multiplier, saturating at the i16 range.
fn apply_scale(samples: &[i16], scale: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            (f32::from(s) * scale)
                .round()
                .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
        })
        .collect()
}

/// Map a kbps value onto the nearest supported constant bitrate.
fn map_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        64 => Bitrate::Kbps64,
        96 => Bitrate::Kbps96,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => {
            warn!("unsupported bitrate {} kbps, using 128", other);
            Bitrate::Kbps128
        }
    }
}

/// Map the 0-9 quality scale onto LAME's quality presets.
fn map_quality(quality: u8) -> Quality {
    match quality {
        0 => Quality::Best,
        1 => Quality::SecondBest,
        2 => Quality::NearBest,
        3 => Quality::VeryNice,
        4 => Quality::Nice,
        5 => Quality::Good,
        6 => Quality::Decent,
        7 => Quality::Ok,
        8 => Quality::SecondWorst,
        _ => Quality::Worst,
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_scale_attenuates() {
        let out = apply_scale(&[1000, -1000, 0], 0.5);
        assert_eq!(out, vec![500, -500, 0]);
    }

    #[test]
    fn test_apply_scale_saturates() {
        let out = apply_scale(&[i16::MAX, i16::MIN], 2.0);
        assert_eq!(out, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_encoder_init() {
        let encoder = Mp3Encoder::new(44100, 2, 128, 5, None);
        assert!(encoder.is_ok());
    }

    #[test]
    fn test_encode_and_flush_produce_frames() {
        let mut encoder = Mp3Encoder::new(44100, 2, 128, 7, None).unwrap();
        // feed half a second of silence
        let silence = vec![0i16; 44100];
        let mut total = encoder.encode(&silence).unwrap().len();
        total += encoder.flush().unwrap().len();
        assert!(total > 0);
    }
}
