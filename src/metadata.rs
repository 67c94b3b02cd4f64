//! Metadata bridge: source tags to ID3 frames
//!
//! Maps the source's vorbis-comment style fields and picture blocks onto an
//! [`id3::Tag`] at session construction time, before any audio is produced.
//! Several frames, and the header size itself, must be known up front because
//! the byte-length prediction depends on the rendered header.
//!
//! Replay gain is not a frame: it becomes a linear volume multiplier handed
//! to the encoder, with album gain taking priority over track gain.

use crate::decode::StreamInfo;
use id3::frame::{Comment, Content, ExtendedLink, Frame, Picture, PictureType};
use id3::TagLike;
use symphonia::core::meta::{StandardVisualKey, Tag as SourceTag, Visual};
use tracing::debug;

/// Value of the TSSE encoder-identification frame
const ENCODER_NAME: &str = "mp3view";

/// Build the destination tag and the optional encoder output scale.
///
/// Fields absent from the source produce no frame; there are no empty frames.
pub fn build_tag(
    tags: &[SourceTag],
    visuals: &[Visual],
    info: &StreamInfo,
) -> (id3::Tag, Option<f32>) {
    let mut tag = id3::Tag::new();

    // Identify this software
    tag.add_frame(Frame::text("TSSE", ENCODER_NAME));

    // Track duration in integer milliseconds
    let duration_ms = info.total_samples * 1000 / u64::from(info.sample_rate);
    tag.add_frame(Frame::text("TLEN", duration_ms.to_string()));

    // The common fields
    copy_text(&mut tag, tags, "TIT2", "TITLE");
    copy_text(&mut tag, tags, "TPE1", "ARTIST");
    copy_text(&mut tag, tags, "TALB", "ALBUM");
    copy_text(&mut tag, tags, "TCON", "GENRE");
    copy_text(&mut tag, tags, "TDRC", "DATE");

    // Less common, but often present
    if let Some(description) = lookup(tags, "DESCRIPTION") {
        tag.add_frame(Frame::with_content(
            "COMM",
            Content::Comment(Comment {
                lang: "eng".to_string(),
                description: String::new(),
                text: description,
            }),
        ));
    }
    copy_text(&mut tag, tags, "TCOM", "COMPOSER");
    copy_text(&mut tag, tags, "TOPE", "PERFORMER");
    copy_text(&mut tag, tags, "TCOP", "COPYRIGHT");
    if let Some(license) = lookup(tags, "LICENSE") {
        tag.add_frame(Frame::with_content(
            "WXXX",
            Content::ExtendedLink(ExtendedLink {
                description: String::new(),
                link: license,
            }),
        ));
    }
    copy_text(&mut tag, tags, "TENC", "ENCODED_BY");
    copy_text(&mut tag, tags, "TPUB", "ORGANIZATION");
    copy_text(&mut tag, tags, "TPE3", "CONDUCTOR");

    // Album artist can be stored in different fields
    if let Some(album_artist) = lookup(tags, "ALBUMARTIST").or_else(|| lookup(tags, "ALBUM ARTIST"))
    {
        tag.add_frame(Frame::text("TPE2", album_artist));
    }

    // Track and disc numbers compose with their totals when present
    if let Some(track) = compose_numbering(tags, "TRACKNUMBER", "TRACKTOTAL") {
        tag.add_frame(Frame::text("TRCK", track));
    }
    if let Some(disc) = compose_numbering(tags, "DISCNUMBER", "DISCTOTAL") {
        tag.add_frame(Frame::text("TPOS", disc));
    }

    // One APIC frame per picture block
    for visual in visuals {
        tag.add_frame(Frame::with_content(
            "APIC",
            Content::Picture(Picture {
                mime_type: visual.media_type.clone(),
                picture_type: map_picture_type(visual.usage.clone()),
                description: picture_description(visual),
                data: visual.data.to_vec(),
            }),
        ));
    }

    let scale = replay_gain_scale(tags);
    if let Some(scale) = scale {
        debug!("applying replay gain scale {:.4}", scale);
    }

    (tag, scale)
}

/// Find a source field by name, case-insensitively.
pub fn lookup(tags: &[SourceTag], name: &str) -> Option<String> {
    tags.iter()
        .find(|t| t.key.eq_ignore_ascii_case(name))
        .map(|t| t.value.to_string())
}

/// Attach a text frame when the source field exists.
fn copy_text(tag: &mut id3::Tag, tags: &[SourceTag], frame_id: &str, field: &str) {
    if let Some(value) = lookup(tags, field) {
        tag.add_frame(Frame::text(frame_id, value));
    }
}

/// Compose `"<number>/<total>"` from a pair of independent source fields.
///
/// No value at all when the number is absent, even if the total is present.
fn compose_numbering(tags: &[SourceTag], number: &str, total: &str) -> Option<String> {
    let number = lookup(tags, number)?;
    match lookup(tags, total) {
        Some(total) => Some(format!("{}/{}", number, total)),
        None => Some(number),
    }
}

/// Derive the encoder output scale from replay gain metadata.
///
/// Album gain is checked first and, when the field is present, shadows the
/// track gain entirely. A gain of exactly zero decibels keeps the encoder's
/// default scale.
fn replay_gain_scale(tags: &[SourceTag]) -> Option<f32> {
    let gain = if let Some(album) = lookup(tags, "REPLAYGAIN_ALBUM_GAIN") {
        parse_db(&album)
    } else if let Some(track) = lookup(tags, "REPLAYGAIN_TRACK_GAIN") {
        parse_db(&track)
    } else {
        return None;
    };

    match gain {
        Some(db) if db != 0.0 => Some(10f32.powf(db / 20.0)),
        _ => None,
    }
}

/// Parse the leading decibel value from a field like `"-3.50 dB"`.
fn parse_db(value: &str) -> Option<f32> {
    let trimmed = value.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '+' && c != '-' && c != '.')
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<f32>().ok()
}

/// Description attached to a picture block, empty when the source has none.
fn picture_description(visual: &Visual) -> String {
    visual
        .tags
        .iter()
        .find(|t| t.key.eq_ignore_ascii_case("DESCRIPTION"))
        .map(|t| t.value.to_string())
        .unwrap_or_default()
}

/// Map the source's picture usage onto the ID3 picture-type enumerator.
fn map_picture_type(usage: Option<StandardVisualKey>) -> PictureType {
    match usage {
        Some(StandardVisualKey::FileIcon) => PictureType::Icon,
        Some(StandardVisualKey::OtherIcon) => PictureType::OtherIcon,
        Some(StandardVisualKey::FrontCover) => PictureType::CoverFront,
        Some(StandardVisualKey::BackCover) => PictureType::CoverBack,
        Some(StandardVisualKey::Leaflet) => PictureType::Leaflet,
        Some(StandardVisualKey::Media) => PictureType::Media,
        Some(StandardVisualKey::LeadArtistPerformerSoloist) => PictureType::LeadArtist,
        Some(StandardVisualKey::ArtistPerformer) => PictureType::Artist,
        Some(StandardVisualKey::Conductor) => PictureType::Conductor,
        Some(StandardVisualKey::BandOrchestra) => PictureType::Band,
        Some(StandardVisualKey::Composer) => PictureType::Composer,
        Some(StandardVisualKey::Lyricist) => PictureType::Lyricist,
        Some(StandardVisualKey::RecordingLocation) => PictureType::RecordingLocation,
        Some(StandardVisualKey::RecordingSession) => PictureType::DuringRecording,
        Some(StandardVisualKey::Performance) => PictureType::DuringPerformance,
        Some(StandardVisualKey::ScreenCapture) => PictureType::ScreenCapture,
        Some(StandardVisualKey::Illustration) => PictureType::Illustration,
        Some(StandardVisualKey::BandArtistLogo) => PictureType::BandLogo,
        Some(StandardVisualKey::PublisherStudioLogo) => PictureType::PublisherLogo,
        None => PictureType::Other,
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::meta::Value;

    fn source_tag(key: &str, value: &str) -> SourceTag {
        SourceTag::new(None, key, Value::String(value.to_string()))
    }

    fn test_info() -> StreamInfo {
        StreamInfo {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 441_000,
        }
    }

    fn frame_text<'a>(tag: &'a id3::Tag, id: &str) -> Option<&'a str> {
        tag.get(id).and_then(|f| f.content().text())
    }

    #[test]
    fn test_encoder_and_duration_always_attached() {
        let (tag, _) = build_tag(&[], &[], &test_info());
        assert_eq!(frame_text(&tag, "TSSE"), Some(ENCODER_NAME));
        // 441000 samples at 44100 Hz = 10000 ms
        assert_eq!(frame_text(&tag, "TLEN"), Some("10000"));
    }

    #[test]
    fn test_basic_fields_copied_absent_fields_skipped() {
        let tags = vec![source_tag("TITLE", "Song"), source_tag("ARTIST", "Band")];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert_eq!(frame_text(&tag, "TIT2"), Some("Song"));
        assert_eq!(frame_text(&tag, "TPE1"), Some("Band"));
        assert!(tag.get("TALB").is_none());
        assert!(tag.get("TPE2").is_none());
    }

    #[test]
    fn test_album_artist_prefers_unspaced_field() {
        let tags = vec![
            source_tag("ALBUM ARTIST", "Spaced"),
            source_tag("ALBUMARTIST", "Unspaced"),
        ];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert_eq!(frame_text(&tag, "TPE2"), Some("Unspaced"));

        let tags = vec![source_tag("ALBUM ARTIST", "Spaced")];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert_eq!(frame_text(&tag, "TPE2"), Some("Spaced"));
    }

    #[test]
    fn test_track_number_composition() {
        let tags = vec![
            source_tag("TRACKNUMBER", "3"),
            source_tag("TRACKTOTAL", "12"),
        ];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert_eq!(frame_text(&tag, "TRCK"), Some("3/12"));

        let tags = vec![source_tag("TRACKNUMBER", "3")];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert_eq!(frame_text(&tag, "TRCK"), Some("3"));

        // a lone total attaches nothing
        let tags = vec![source_tag("TRACKTOTAL", "12")];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert!(tag.get("TRCK").is_none());
    }

    #[test]
    fn test_disc_number_composition_is_independent() {
        let tags = vec![
            source_tag("DISCNUMBER", "1"),
            source_tag("DISCTOTAL", "2"),
            source_tag("TRACKTOTAL", "12"),
        ];
        let (tag, _) = build_tag(&tags, &[], &test_info());
        assert_eq!(frame_text(&tag, "TPOS"), Some("1/2"));
        assert!(tag.get("TRCK").is_none());
    }

    #[test]
    fn test_album_gain_shadows_track_gain() {
        let tags = vec![
            source_tag("REPLAYGAIN_ALBUM_GAIN", "-3 dB"),
            source_tag("REPLAYGAIN_TRACK_GAIN", "-5 dB"),
        ];
        let (_, scale) = build_tag(&tags, &[], &test_info());
        let expected = 10f32.powf(-3.0 / 20.0);
        assert!((scale.unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_gain_not_applied() {
        let tags = vec![source_tag("REPLAYGAIN_ALBUM_GAIN", "0.00 dB")];
        let (_, scale) = build_tag(&tags, &[], &test_info());
        assert!(scale.is_none());
    }

    #[test]
    fn test_no_gain_fields_no_scale() {
        let (_, scale) = build_tag(&[], &[], &test_info());
        assert!(scale.is_none());
    }

    #[test]
    fn test_parse_db_variants() {
        assert_eq!(parse_db("-3.50 dB"), Some(-3.5));
        assert_eq!(parse_db("+2"), Some(2.0));
        assert_eq!(parse_db("4dB"), Some(4.0));
        assert_eq!(parse_db("dB"), None);
    }
}
