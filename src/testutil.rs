// FILE: src/testutil.rs
//! Fixture builders shared by the unit tests.

use std::path::{Path, PathBuf};
use crate::format::flac::{BlockType, FLAC_MAGIC};

/// An MP3 with an ID3v2.3 tag whose body is `tag_body_len` bytes of padding,
/// followed by `audio`.
pub fn mp3_bytes(tag_body_len: u32, audio: &[u8]) -> Vec<u8> {
    let mut bytes = b"ID3\x03\x00\x00".to_vec();
    bytes.extend_from_slice(&[
        ((tag_body_len >> 21) & 0x7F) as u8,
        ((tag_body_len >> 14) & 0x7F) as u8,
        ((tag_body_len >> 7) & 0x7F) as u8,
        (tag_body_len & 0x7F) as u8,
    ]);
    bytes.extend(std::iter::repeat(0u8).take(tag_body_len as usize));
    bytes.extend_from_slice(audio);
    bytes
}

pub fn write_mp3(dir: &Path, name: &str, tag_body_len: u32, audio: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, mp3_bytes(tag_body_len, audio)).unwrap();
    path
}

/// A FLAC stream: STREAMINFO, the `extra` blocks, an old VORBIS_COMMENT,
/// a final PADDING block, then `audio`.
pub fn flac_bytes(extra: &[(BlockType, Vec<u8>)], audio: &[u8]) -> Vec<u8> {
    let mut blocks: Vec<(BlockType, Vec<u8>)> = vec![(BlockType::StreamInfo, vec![0x10; 34])];
    blocks.extend(extra.iter().cloned());
    blocks.push((BlockType::VorbisComment, old_comment()));
    blocks.push((BlockType::Padding, vec![0; 128]));

    let mut bytes = FLAC_MAGIC.to_vec();
    let last = blocks.len() - 1;
    for (i, (kind, data)) in blocks.iter().enumerate() {
        let flag = if i == last { 0x80 } else { 0x00 };
        let len = (data.len() as u32).to_be_bytes();
        bytes.extend_from_slice(&[kind.code() | flag, len[1], len[2], len[3]]);
        bytes.extend_from_slice(data);
    }
    bytes.extend_from_slice(audio);
    bytes
}

pub fn write_flac(dir: &Path, name: &str, extra: &[(BlockType, Vec<u8>)], audio: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, flac_bytes(extra, audio)).unwrap();
    path
}

/// A PICTURE block body holding `data`.
pub fn picture_block(mime: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&3u32.to_be_bytes());
    body.extend_from_slice(&(mime.len() as u32).to_be_bytes());
    body.extend_from_slice(mime.as_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&[0u8; 16]);
    body.extend_from_slice(&(data.len() as u32).to_be_bytes());
    body.extend_from_slice(data);
    body
}

fn old_comment() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&3u32.to_le_bytes());
    body.extend_from_slice(b"old");
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&9u32.to_le_bytes());
    body.extend_from_slice(b"TITLE=Old");
    body
}
