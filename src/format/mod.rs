// FILE: src/format/mod.rs
//! Header synthesis for the supported audio containers.
//!
//! For every audio file the filesystem needs two things: where the encoded
//! audio starts in the original file, and a replacement metadata header built
//! from the library's tags. The virtual file is `header ++ original[data_start..]`.

pub mod flac;
pub mod mp3;

use std::fs::File;
use std::io::{BufReader, Read};
use crate::error::Result;
use crate::library::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Unknown,
}

impl AudioFormat {
    pub fn from_mime(mime: Option<&str>) -> Self {
        match mime {
            Some("audio/mpeg") => AudioFormat::Mp3,
            Some("audio/flac") | Some("audio/x-flac") => AudioFormat::Flac,
            _ => AudioFormat::Unknown,
        }
    }

    /// Formats whose header we rebuild (and which may carry cover art).
    pub fn is_tagged(self) -> bool {
        matches!(self, AudioFormat::Mp3 | AudioFormat::Flac)
    }

    /// Offset of the first audio byte in the original file.
    pub fn locate_payload<R: Read>(self, reader: &mut R) -> Result<u64> {
        match self {
            AudioFormat::Mp3 => mp3::locate_payload(reader),
            AudioFormat::Flac => Ok(flac::scan(reader)?.audio_offset),
            AudioFormat::Unknown => Ok(0),
        }
    }

    /// Build the replacement header for `item` and find where its audio starts.
    /// Unknown formats pass through untouched: empty header, offset 0.
    pub fn synthesize(self, item: &Item) -> Result<Synthesized> {
        match self {
            AudioFormat::Mp3 => {
                let mut reader = BufReader::new(File::open(item.path())?);
                let data_start = mp3::locate_payload(&mut reader)?;
                let header = mp3::build_header(item)?;
                Ok(Synthesized { data_start, header })
            }
            AudioFormat::Flac => {
                let mut reader = BufReader::new(File::open(item.path())?);
                let metadata = flac::scan(&mut reader)?;
                let header = flac::build_header(&metadata.blocks, item)?;
                Ok(Synthesized { data_start: metadata.audio_offset, header })
            }
            AudioFormat::Unknown => Ok(Synthesized { data_start: 0, header: Vec::new() }),
        }
    }
}

/// A freshly built header and the payload offset it replaces up to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub data_start: u64,
    pub header: Vec<u8>,
}

/// A picture embedded in an audio file's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPicture {
    pub mime: String,
    pub data: Vec<u8>,
}
