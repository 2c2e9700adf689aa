// FILE: src/format/mp3.rs
//! ID3v2-tagged MP3.
//!
//! The payload starts right after the leading ID3v2 tag (or at 0 when the
//! file opens directly on an MPEG frame sync). The replacement header is a
//! brand new ID3v2.4 tag holding only the mapped library fields, written
//! without padding.

use std::io::Read;
use std::path::Path;
use id3::frame::{Content, ExtendedText, UniqueFileIdentifier};
use id3::{Encoder, Tag, TagLike, Version};
use crate::error::{BeetfsError, Result};
use crate::library::{Item, TagValue};
use super::EmbeddedPicture;

const ID3_HEADER_LEN: u64 = 10;
const ID3_FOOTER_FLAG: u8 = 0x10;
const MUSICBRAINZ_UFID_OWNER: &str = "http://musicbrainz.org";

/// Where a library field ends up in the ID3 tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Id3Target {
    /// A plain text frame (T***)
    Text(&'static str),
    /// A TXXX frame with this description
    UserText(&'static str),
    /// A UFID frame with this owner
    UniqueFileId(&'static str),
    /// TLEN, converted from seconds to milliseconds
    LengthMs,
}

/// Library field -> ID3 destination. Fields not listed are dropped.
const FIELD_MAP: &[(&str, Id3Target)] = &[
    ("album", Id3Target::Text("TALB")),
    ("bpm", Id3Target::Text("TBPM")),
    ("composer", Id3Target::Text("TCOM")),
    ("encoder", Id3Target::Text("TENC")),
    ("lyricist", Id3Target::Text("TEXT")),
    ("length", Id3Target::LengthMs),
    ("media", Id3Target::Text("TMED")),
    ("title", Id3Target::Text("TIT2")),
    ("artist", Id3Target::Text("TPE1")),
    ("albumartist", Id3Target::Text("TPE2")),
    ("arranger", Id3Target::Text("TPE4")),
    ("disc", Id3Target::Text("TPOS")),
    ("track", Id3Target::Text("TRCK")),
    ("albumartist_sort", Id3Target::Text("TSO2")),
    ("composer_sort", Id3Target::Text("TSOC")),
    ("artist_sort", Id3Target::Text("TSOP")),
    ("language", Id3Target::Text("TLAN")),
    ("genre", Id3Target::Text("TCON")),
    ("mb_trackid", Id3Target::UniqueFileId(MUSICBRAINZ_UFID_OWNER)),
    ("rg_track_gain", Id3Target::UserText("REPLAYGAIN_TRACK_GAIN")),
    ("rg_track_peak", Id3Target::UserText("REPLAYGAIN_TRACK_PEAK")),
    ("mb_artistid", Id3Target::UserText("MusicBrainz Artist Id")),
    ("mb_albumid", Id3Target::UserText("MusicBrainz Album Id")),
    ("mb_albumartistid", Id3Target::UserText("MusicBrainz Album Artist Id")),
    ("albumstatus", Id3Target::UserText("MusicBrainz Album Status")),
    ("albumtype", Id3Target::UserText("MusicBrainz Album Type")),
    ("country", Id3Target::UserText("MusicBrainz Album Release Country")),
    ("asin", Id3Target::UserText("ASIN")),
    ("catalognum", Id3Target::UserText("CATALOGNUMBER")),
    ("mb_releasetrackid", Id3Target::UserText("MusicBrainz Release Track Id")),
    ("mb_releasegroupid", Id3Target::UserText("MusicBrainz Release Group Id")),
    ("mb_workid", Id3Target::UserText("MusicBrainz Work Id")),
    ("acoustid_fingerprint", Id3Target::UserText("Acoustid Fingerprint")),
    ("acoustid_id", Id3Target::UserText("Acoustid Id")),
];

fn target_for(field: &str) -> Option<Id3Target> {
    FIELD_MAP.iter().find(|(f, _)| *f == field).map(|(_, t)| *t)
}

/// Decode a 28-bit synchsafe integer.
pub fn synchsafe(bytes: [u8; 4]) -> u32 {
    (bytes[0] as u32 & 0x7F) << 21
        | (bytes[1] as u32 & 0x7F) << 14
        | (bytes[2] as u32 & 0x7F) << 7
        | (bytes[3] as u32 & 0x7F)
}

/// Offset where MPEG frames begin.
pub fn locate_payload<R: Read>(reader: &mut R) -> Result<u64> {
    let mut head = [0u8; ID3_HEADER_LEN as usize];
    let n = read_up_to(reader, &mut head)?;

    if n >= 3 && &head[..3] == b"ID3" {
        if n < head.len() {
            return Err(BeetfsError::Format("Truncated ID3 header".into()));
        }
        let size = synchsafe([head[6], head[7], head[8], head[9]]) as u64;
        let footer = if head[5] & ID3_FOOTER_FLAG != 0 { ID3_HEADER_LEN } else { 0 };
        return Ok(size + ID3_HEADER_LEN + footer);
    }

    if n >= 2 && head[0] == 0xFF && head[1] & 0xE0 == 0xE0 {
        return Ok(0);
    }

    Err(BeetfsError::Format(format!(
        "Not an MP3 stream, starts with {:02x?}",
        &head[..n.min(3)]
    )))
}

/// A fresh ID3v2.4 tag from the item's mapped fields, zero padding.
pub fn build_header(item: &Item) -> Result<Vec<u8>> {
    let mut tag = Tag::new();

    for (field, value) in item.present_tags() {
        let Some(target) = target_for(field) else {
            continue;
        };
        match target {
            Id3Target::Text(id) => tag.set_text(id, value.to_string()),
            Id3Target::UserText(description) => {
                let _ = tag.add_frame(ExtendedText {
                    description: description.to_string(),
                    value: value.to_string(),
                });
            }
            Id3Target::UniqueFileId(owner) => {
                let _ = tag.add_frame(UniqueFileIdentifier {
                    owner_identifier: owner.to_string(),
                    identifier: value.to_string().into_bytes(),
                });
            }
            Id3Target::LengthMs => {
                if let Some(ms) = length_ms(value) {
                    tag.set_text("TLEN", ms.to_string());
                }
            }
        }
    }

    let mut header = Vec::new();
    Encoder::new()
        .version(Version::Id3v24)
        .padding(0)
        .encode(&tag, &mut header)?;
    Ok(header)
}

fn length_ms(value: &TagValue) -> Option<u64> {
    let seconds = match value {
        TagValue::Integer(n) => *n as f64,
        TagValue::Real(f) => *f,
        TagValue::Text(s) => s.trim().parse().ok()?,
    };
    (seconds.is_finite() && seconds > 0.0).then(|| (seconds * 1000.0).round() as u64)
}

/// First attached picture (APIC) in the file's ID3 tag, if any.
pub fn embedded_picture(path: &Path) -> Result<Option<EmbeddedPicture>> {
    let tag = match Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    for frame in tag.frames() {
        if let Content::Picture(picture) = frame.content() {
            return Ok(Some(EmbeddedPicture {
                mime: picture.mime_type.clone(),
                data: picture.data.clone(),
            }));
        }
    }
    Ok(None)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
