//! Fixed 128-byte ID3v1.1 trailing tag
//!
//! The trailing tag is computed once at session construction and appended
//! verbatim as the last bytes of the virtual file. Readers that probe the
//! file tail before sequential playback are answered straight from this
//! block.
//!
//! Layout (ID3v1.1): `"TAG"` magic, 30-byte title, 30-byte artist, 30-byte
//! album, 4-byte year, 28-byte comment, a zero byte, the track number, and
//! the genre index.

use crate::metadata::lookup;
use symphonia::core::meta::Tag as SourceTag;

/// Size of the trailing tag in bytes
pub const TAG_LEN: usize = 128;

/// The standard ID3v1 genre table; the genre byte indexes into this list.
const GENRES: [&str; 80] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop", "Jazz",
    "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap", "Reggae", "Rock", "Techno",
    "Industrial", "Alternative", "Ska", "Death Metal", "Pranks", "Soundtrack", "Euro-Techno",
    "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance", "Classical", "Instrumental",
    "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise", "AlternRock", "Bass", "Soul",
    "Punk", "Space", "Meditative", "Instrumental Pop", "Instrumental Rock", "Ethnic", "Gothic",
    "Darkwave", "Techno-Industrial", "Electronic", "Pop-Folk", "Eurodance", "Dream",
    "Southern Rock", "Comedy", "Cult", "Gangsta", "Top 40", "Christian Rap", "Pop/Funk",
    "Jungle", "Native American", "Cabaret", "New Wave", "Psychadelic", "Rave", "Showtunes",
    "Trailer", "Lo-Fi", "Tribal", "Acid Punk", "Acid Jazz", "Polka", "Retro", "Musical",
    "Rock & Roll", "Hard Rock",
];

/// Genre byte for fields that match no table entry
const GENRE_UNKNOWN: u8 = 255;

/// Render the fixed trailing tag from the source fields.
pub fn render(tags: &[SourceTag]) -> [u8; TAG_LEN] {
    let mut out = [0u8; TAG_LEN];
    out[0..3].copy_from_slice(b"TAG");

    write_field(&mut out[3..33], lookup(tags, "TITLE").as_deref());
    write_field(&mut out[33..63], lookup(tags, "ARTIST").as_deref());
    write_field(&mut out[63..93], lookup(tags, "ALBUM").as_deref());
    write_field(&mut out[93..97], lookup(tags, "DATE").as_deref());
    write_field(&mut out[97..125], lookup(tags, "DESCRIPTION").as_deref());

    // byte 125 stays zero to mark the v1.1 track field
    out[126] = lookup(tags, "TRACKNUMBER")
        .and_then(|t| t.trim().parse::<u8>().ok())
        .unwrap_or(0);
    out[127] = lookup(tags, "GENRE")
        .map(|g| genre_index(&g))
        .unwrap_or(GENRE_UNKNOWN);

    out
}

/// Copy a field into its fixed-width slot, truncating long values.
fn write_field(slot: &mut [u8], value: Option<&str>) {
    if let Some(value) = value {
        let bytes = value.as_bytes();
        let len = bytes.len().min(slot.len());
        slot[..len].copy_from_slice(&bytes[..len]);
    }
}

/// Look a genre name up in the v1 genre table.
fn genre_index(genre: &str) -> u8 {
    GENRES
        .iter()
        .position(|g| g.eq_ignore_ascii_case(genre))
        .map(|i| i as u8)
        .unwrap_or(GENRE_UNKNOWN)
}

// ========================================
// Tests
// ========================================
