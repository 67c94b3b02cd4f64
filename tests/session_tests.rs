//! Integration tests for the transcode session
//!
//! Exercises the full pipeline over generated WAV fixtures:
//! - size prediction and reconciliation at flush
//! - incremental pumping driven by byte-range reads
//! - the reversed-access trailing-tag optimization
//! - read idempotence and degradation at end of source

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

use mp3view::session::TRAILER_LEN;
use mp3view::{TranscodeConfig, TranscodeSession, VirtualFile};
use tempfile::TempDir;

/// Configuration pointing sessions at WAV sources
fn test_config() -> TranscodeConfig {
    TranscodeConfig {
        bitrate: 128,
        quality: 7,
        source_ext: "wav".to_string(),
    }
}

/// Write a sine-tone WAV fixture and return its path
fn write_tone(dir: &Path, name: &str, seconds: f32, channels: u16) -> PathBuf {
    let spec = hound::WavSpec {
        channels,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let path = dir.join(name);
    let mut writer = hound::WavWriter::create(&path, spec).expect("create fixture");
    let frames = (44100.0 * seconds) as u32;
    for i in 0..frames {
        let value = (i as f32 * 440.0 * TAU / 44100.0).sin();
        let sample = (value * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).expect("write sample");
        }
    }
    writer.finalize().expect("finalize fixture");
    path
}

/// Open a session over a freshly generated fixture
fn tone_session(dir: &TempDir, seconds: f32, channels: u16) -> TranscodeSession {
    write_tone(dir.path(), "tone.wav", seconds, channels);
    TranscodeSession::open(&dir.path().join("tone.mp3"), &test_config()).expect("open session")
}

/// Read the whole virtual file sequentially in fixed-size chunks
fn drain(session: &mut TranscodeSession) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut offset = 0u64;
    while offset < session.size() {
        let n = session.read_at(offset, &mut chunk).expect("read");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
        offset += n as u64;
    }
    out
}

#[test]
fn test_full_drain_returns_exactly_predicted_size() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    let predicted = session.size();
    let bytes = drain(&mut session);

    assert_eq!(bytes.len() as u64, predicted);
    assert!(session.is_flushed());
    assert_eq!(session.buffered_bytes(), predicted);
    // header tag leads the stream
    assert_eq!(&bytes[0..3], b"ID3");
    // trailing tag closes it
    let trailer = &bytes[bytes.len() - TRAILER_LEN as usize..];
    assert_eq!(&trailer[0..3], b"TAG");
}

#[test]
fn test_trailing_probe_performs_no_codec_work() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    let buffered_before = session.buffered_bytes();
    let size = session.size();

    // probe the last 128 bytes first, the way tag scanners do
    let mut probe = [0u8; TRAILER_LEN as usize];
    let n = session.read_at(size - TRAILER_LEN, &mut probe).unwrap();

    assert_eq!(n, TRAILER_LEN as usize);
    assert_eq!(&probe[0..3], b"TAG");
    // nothing was decoded or encoded to answer the probe
    assert_eq!(session.buffered_bytes(), buffered_before);
    assert!(!session.is_flushed());

    // the probe matches the bytes a full drain later places there
    let bytes = drain(&mut session);
    assert_eq!(&bytes[bytes.len() - TRAILER_LEN as usize..], &probe[..]);
}

#[test]
fn test_tail_probe_overlapping_unproduced_audio_zero_fills() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    // request a block straddling unproduced audio and the trailer region
    let size = session.size();
    let offset = size - 200;
    let mut probe = [0xFFu8; 200];
    let n = session.read_at(offset, &mut probe).unwrap();

    assert_eq!(n, 200);
    // the gap before the trailer is zero-filled, not stale
    assert!(probe[..72].iter().all(|&b| b == 0));
    assert_eq!(&probe[72..75], b"TAG");
}

#[test]
fn test_reads_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    let mut first = [0u8; 512];
    let mut second = [0u8; 512];
    let n1 = session.read_at(1000, &mut first).unwrap();
    let n2 = session.read_at(1000, &mut second).unwrap();

    assert_eq!(n1, n2);
    assert_eq!(first, second);
}

#[test]
fn test_buffer_position_is_monotonic_across_reads() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    let mut chunk = [0u8; 2048];
    let mut last = session.buffered_bytes();
    let mut offset = 0u64;
    while offset < session.size() {
        let n = session.read_at(offset, &mut chunk).unwrap();
        if n == 0 {
            break;
        }
        offset += n as u64;
        let now = session.buffered_bytes();
        assert!(now >= last, "buffer position went backwards");
        last = now;
    }
    assert_eq!(session.buffered_bytes(), session.size());
}

#[test]
fn test_late_offset_read_pumps_earlier_output() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    // a mid-file read forces the pipeline to produce everything before it
    let mut chunk = [0u8; 256];
    let offset = session.size() / 2;
    let n = session.read_at(offset, &mut chunk).unwrap();

    assert_eq!(n, 256);
    assert!(session.buffered_bytes() >= offset + 256);

    // the range before it is now a pure buffer copy
    let mut early = [0u8; 256];
    assert_eq!(session.read_at(0, &mut early).unwrap(), 256);
    assert_eq!(&early[0..3], b"ID3");
}

#[test]
fn test_mono_source_transcodes() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 0.5, 1);

    let predicted = session.size();
    let bytes = drain(&mut session);
    assert_eq!(bytes.len() as u64, predicted);
    assert_eq!(&bytes[bytes.len() - TRAILER_LEN as usize..][0..3], b"TAG");
}

#[test]
fn test_size_fixed_at_construction() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 1.0, 2);

    let before = session.size();
    let mut chunk = [0u8; 8192];
    session.read_at(0, &mut chunk).unwrap();
    assert_eq!(session.size(), before);
    drain(&mut session);
    assert_eq!(session.size(), before);
}

#[test]
fn test_read_past_end_returns_zero() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 0.5, 2);

    let mut chunk = [0u8; 64];
    assert_eq!(session.read_at(session.size(), &mut chunk).unwrap(), 0);
    assert_eq!(session.read_at(session.size() + 1000, &mut chunk).unwrap(), 0);
}

#[test]
fn test_read_clamps_to_file_size() {
    let dir = TempDir::new().unwrap();
    let mut session = tone_session(&dir, 0.5, 2);

    // a request extending past the end is clamped, not an error
    let size = session.size();
    let mut chunk = vec![0u8; 4096];
    let n = session.read_at(size - 100, &mut chunk).unwrap();
    assert_eq!(n, 100);
}

#[test]
fn test_open_missing_source_fails() {
    let dir = TempDir::new().unwrap();
    let result = TranscodeSession::open(&dir.path().join("absent.mp3"), &test_config());
    assert!(result.is_err());
}

#[test]
fn test_virtual_and_materialized_reads_agree() {
    let dir = TempDir::new().unwrap();

    // drain one session fully, then spot-check random-access reads of a
    // second session over the same source against it
    let mut sequential = tone_session(&dir, 1.0, 2);
    let reference = drain(&mut sequential);

    let mut random = TranscodeSession::open(&dir.path().join("tone.mp3"), &test_config()).unwrap();
    for &(offset, len) in &[(0u64, 512usize), (4096, 1024), (100_000 % reference.len() as u64, 64)] {
        let mut chunk = vec![0u8; len];
        let n = random.read_at(offset, &mut chunk).unwrap();
        assert_eq!(&chunk[..n], &reference[offset as usize..offset as usize + n]);
    }
}
