// FILE: src/format/flac.rs
//! FLAC metadata blocks.
//!
//! Layout: `fLaC`, then metadata blocks each led by a 4-byte descriptor
//! (bit 7 = last block, bits 0-6 = type, then a 24-bit big-endian length),
//! then audio frames. The replacement header keeps every original block
//! except VORBIS_COMMENT and PADDING, in order, and appends a fresh comment
//! block as the last one.

use std::io::Read;
use crate::error::{BeetfsError, Result};
use crate::library::Item;
use super::EmbeddedPicture;

pub const FLAC_MAGIC: &[u8; 4] = b"fLaC";
pub const VENDOR: &str = "beets";

const LAST_BLOCK_FLAG: u8 = 0x80;
const MAX_BLOCK_LEN: usize = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Reserved(u8),
}

impl BlockType {
    pub fn from_code(code: u8) -> Self {
        match code & 0x7F {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            other => BlockType::Reserved(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBlock {
    pub block_type: BlockType,
    pub data: Vec<u8>,
}

/// Result of walking the metadata blocks of a FLAC stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlacMetadata {
    pub blocks: Vec<MetadataBlock>,
    /// Offset of the first audio frame
    pub audio_offset: u64,
}

/// Walk the metadata blocks up to and including the one flagged last.
pub fn scan<R: Read>(reader: &mut R) -> Result<FlacMetadata> {
    let mut magic = [0u8; 4];
    read_exact_or(reader, &mut magic, "stream too short for FLAC magic")?;
    if &magic != FLAC_MAGIC {
        return Err(BeetfsError::Format(format!(
            "Not a FLAC stream, starts with {:02x?}",
            magic
        )));
    }

    let mut blocks = Vec::new();
    let mut cursor = FLAC_MAGIC.len() as u64;

    loop {
        let mut descriptor = [0u8; 4];
        read_exact_or(reader, &mut descriptor, "truncated metadata block descriptor")?;

        let is_last = descriptor[0] & LAST_BLOCK_FLAG != 0;
        let code = descriptor[0] & !LAST_BLOCK_FLAG;
        if code == 127 {
            return Err(BeetfsError::Format(format!("Invalid metadata block type at offset {}", cursor)));
        }
        let length = u32::from_be_bytes([0, descriptor[1], descriptor[2], descriptor[3]]) as usize;

        let mut data = vec![0u8; length];
        read_exact_or(reader, &mut data, "truncated metadata block")?;

        blocks.push(MetadataBlock { block_type: BlockType::from_code(code), data });
        cursor += 4 + length as u64;

        if is_last {
            break;
        }
    }

    Ok(FlacMetadata { blocks, audio_offset: cursor })
}

/// Vorbis comment field name for a library field.
pub fn comment_field_name(field: &str) -> String {
    match field {
        "track" => "TRACKNUMBER".to_string(),
        "disc" => "DISCNUMBER".to_string(),
        other => other.to_uppercase(),
    }
}

/// VORBIS_COMMENT body: vendor string, field count, then `NAME=value` fields,
/// every length little-endian.
pub fn vorbis_comment(item: &Item) -> Vec<u8> {
    let fields: Vec<String> = item
        .present_tags()
        .map(|(field, value)| format!("{}={}", comment_field_name(field), value))
        .collect();

    let mut body = Vec::new();
    body.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
    body.extend_from_slice(VENDOR.as_bytes());
    body.extend_from_slice(&(fields.len() as u32).to_le_bytes());
    for field in &fields {
        body.extend_from_slice(&(field.len() as u32).to_le_bytes());
        body.extend_from_slice(field.as_bytes());
    }
    body
}

/// The replacement header: magic, retained original blocks, new comment last.
pub fn build_header(blocks: &[MetadataBlock], item: &Item) -> Result<Vec<u8>> {
    let comment = vorbis_comment(item);

    let mut emitted: Vec<(u8, &[u8])> = blocks
        .iter()
        .filter(|b| !matches!(b.block_type, BlockType::VorbisComment | BlockType::Padding))
        .map(|b| (b.block_type.code(), b.data.as_slice()))
        .collect();
    emitted.push((BlockType::VorbisComment.code(), comment.as_slice()));

    let total: usize = emitted.iter().map(|(_, d)| 4 + d.len()).sum();
    let mut header = Vec::with_capacity(FLAC_MAGIC.len() + total);
    header.extend_from_slice(FLAC_MAGIC);

    let last = emitted.len() - 1;
    for (i, (code, data)) in emitted.into_iter().enumerate() {
        if data.len() > MAX_BLOCK_LEN {
            return Err(BeetfsError::Format(format!(
                "Metadata block of {} bytes exceeds the 24-bit length field",
                data.len()
            )));
        }
        let flag = if i == last { LAST_BLOCK_FLAG } else { 0 };
        let len = (data.len() as u32).to_be_bytes();
        header.extend_from_slice(&[code | flag, len[1], len[2], len[3]]);
        header.extend_from_slice(data);
    }

    Ok(header)
}

/// Decode the first PICTURE block, if the stream has one.
pub fn first_picture(blocks: &[MetadataBlock]) -> Option<Result<EmbeddedPicture>> {
    blocks
        .iter()
        .find(|b| b.block_type == BlockType::Picture)
        .map(|b| parse_picture(&b.data))
}

/// PICTURE body: type, MIME, description, four dimension fields, then data.
/// All integers are 32-bit big-endian.
pub fn parse_picture(mut body: &[u8]) -> Result<EmbeddedPicture> {
    let _picture_type = take_u32(&mut body)?;
    let mime_len = take_u32(&mut body)? as usize;
    let mime = String::from_utf8_lossy(take(&mut body, mime_len)?).into_owned();
    let desc_len = take_u32(&mut body)? as usize;
    take(&mut body, desc_len)?;
    // width, height, depth, colors
    take(&mut body, 16)?;
    let data_len = take_u32(&mut body)? as usize;
    let data = take(&mut body, data_len)?.to_vec();
    Ok(EmbeddedPicture { mime, data })
}

fn take<'a>(body: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if body.len() < n {
        return Err(BeetfsError::Format("Truncated PICTURE block".into()));
    }
    let (head, rest) = body.split_at(n);
    *body = rest;
    Ok(head)
}

fn take_u32(body: &mut &[u8]) -> Result<u32> {
    let bytes = take(body, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_exact_or<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => BeetfsError::Format(format!("FLAC: {}", what)),
        _ => BeetfsError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::testutil;

    /// Split a serialized header back into (descriptor byte, body) pairs.
    fn blocks_of(header: &[u8]) -> Vec<(u8, Vec<u8>)> {
        assert_eq!(&header[..4], FLAC_MAGIC);
        let mut out = Vec::new();
        let mut pos = 4;
        while pos < header.len() {
            let len = u32::from_be_bytes([0, header[pos + 1], header[pos + 2], header[pos + 3]]) as usize;
            out.push((header[pos], header[pos + 4..pos + 4 + len].to_vec()));
            pos += 4 + len;
        }
        assert_eq!(pos, header.len());
        out
    }

    #[test]
    fn test_scan_single_streaminfo() {
        let mut bytes = FLAC_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
        bytes.extend_from_slice(&[0x11; 34]);
        bytes.extend_from_slice(&[0xFF, 0xF8, 0x00]);

        let meta = scan(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(meta.audio_offset, 42);
        assert_eq!(meta.blocks.len(), 1);
        assert_eq!(meta.blocks[0].block_type, BlockType::StreamInfo);
        assert_eq!(meta.blocks[0].data, vec![0x11; 34]);
    }

    #[test]
    fn test_scan_multiple_blocks() {
        let bytes = testutil::flac_bytes(&[(BlockType::SeekTable, vec![7; 18])], &[0u8; 8]);
        let meta = scan(&mut Cursor::new(&bytes)).unwrap();
        let types: Vec<_> = meta.blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(
            types,
            vec![BlockType::StreamInfo, BlockType::SeekTable, BlockType::VorbisComment, BlockType::Padding]
        );
        assert_eq!(meta.audio_offset as usize, bytes.len() - 8);
    }

    #[test]
    fn test_scan_rejects_bad_input() {
        assert!(matches!(
            scan(&mut Cursor::new(b"OggS\0\0\0\0".to_vec())),
            Err(BeetfsError::Format(_))
        ));

        let mut truncated = FLAC_MAGIC.to_vec();
        truncated.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
        truncated.extend_from_slice(&[0u8; 10]);
        assert!(matches!(scan(&mut Cursor::new(truncated)), Err(BeetfsError::Format(_))));

        // no block ever flagged last
        let mut unterminated = FLAC_MAGIC.to_vec();
        unterminated.extend_from_slice(&[0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB]);
        assert!(matches!(scan(&mut Cursor::new(unterminated)), Err(BeetfsError::Format(_))));
    }

    #[test]
    fn test_comment_block_contents() {
        let item = Item::new(1, "/m/a.flac").with_tag("title", "A").with_tag("track", 3i64);
        let streaminfo = MetadataBlock { block_type: BlockType::StreamInfo, data: vec![0; 34] };

        let header = build_header(&[streaminfo], &item).unwrap();
        let blocks = blocks_of(&header);
        assert_eq!(blocks.len(), 2);

        // STREAMINFO first and not flagged last
        assert_eq!(blocks[0].0, 0x00);
        // comment block last and flagged last
        assert_eq!(blocks[1].0, 0x84);

        let mut expected = Vec::new();
        expected.extend_from_slice(&5u32.to_le_bytes());
        expected.extend_from_slice(b"beets");
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(b"TITLE=A");
        expected.extend_from_slice(&13u32.to_le_bytes());
        expected.extend_from_slice(b"TRACKNUMBER=3");
        assert_eq!(blocks[1].1, expected);
    }

    #[test]
    fn test_header_drops_comment_and_padding_keeps_order() {
        let original = vec![
            MetadataBlock { block_type: BlockType::StreamInfo, data: vec![1; 34] },
            MetadataBlock { block_type: BlockType::VorbisComment, data: vec![2; 20] },
            MetadataBlock { block_type: BlockType::Picture, data: vec![3; 12] },
            MetadataBlock { block_type: BlockType::Padding, data: vec![0; 64] },
            MetadataBlock { block_type: BlockType::SeekTable, data: vec![4; 18] },
        ];
        let item = Item::new(1, "/m/a.flac").with_tag("disc", 1i64).with_tag("genre", "Rock");

        let header = build_header(&original, &item).unwrap();
        let blocks = blocks_of(&header);
        let descriptors: Vec<u8> = blocks.iter().map(|(d, _)| *d).collect();
        assert_eq!(descriptors, vec![0x00, 0x06, 0x03, 0x84]);
        assert_eq!(blocks[1].1, vec![3; 12]);

        let comment = String::from_utf8_lossy(&blocks[3].1).into_owned();
        assert!(comment.contains("DISCNUMBER=1"));
        assert!(comment.contains("GENRE=Rock"));
    }

    #[test]
    fn test_header_round_trips_through_scan() {
        let bytes = testutil::flac_bytes(&[], &[0x55; 100]);
        let meta = scan(&mut Cursor::new(&bytes)).unwrap();
        let item = Item::new(1, "/m/a.flac").with_tag("artist", "X");

        let header = build_header(&meta.blocks, &item).unwrap();
        let rescanned = scan(&mut Cursor::new(&header)).unwrap();
        assert_eq!(rescanned.audio_offset as usize, header.len());
        assert_eq!(rescanned.blocks.last().unwrap().block_type, BlockType::VorbisComment);
    }

    #[test]
    fn test_parse_picture() {
        let body = testutil::picture_block("image/png", &[9, 8, 7]);
        let blocks = vec![
            MetadataBlock { block_type: BlockType::StreamInfo, data: vec![0; 34] },
            MetadataBlock { block_type: BlockType::Picture, data: body },
        ];
        let picture = first_picture(&blocks).unwrap().unwrap();
        assert_eq!(picture.mime, "image/png");
        assert_eq!(picture.data, vec![9, 8, 7]);

        assert!(parse_picture(&[0, 0, 0, 3, 0, 0]).is_err());
        assert!(first_picture(&blocks[..1]).is_none());
    }
}
