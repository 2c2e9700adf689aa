// FILE: src/cover.rs
//! Cover art for album directories.
//!
//! Resolution order:
//! 1. A conventional image file next to the first audio file
//!    (`cover`, `folder`, `front`, `album` with `.jpg`, `.jpeg`, `.png`)
//! 2. The first embedded picture found in the audio files, in order

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use crate::core::mime::{guess_mime, image_extension};
use crate::error::Result;
use crate::format::{flac, mp3, AudioFormat, EmbeddedPicture};

const COVER_STEMS: &[&str] = &["cover", "folder", "front", "album"];
const COVER_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// A resolved cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub bytes: Vec<u8>,
    pub mime: String,
    /// Extension including the dot, used to name the virtual file
    pub extension: String,
}

/// An audio file in the directory being resolved.
#[derive(Debug, Clone, Copy)]
pub struct AudioSource<'a> {
    pub path: &'a Path,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct CoverArtResolver {
    guess_mime: fn(&Path) -> Option<&'static str>,
}

impl Default for CoverArtResolver {
    fn default() -> Self {
        Self { guess_mime }
    }
}

impl CoverArtResolver {
    pub fn new(guess_mime: fn(&Path) -> Option<&'static str>) -> Self {
        Self { guess_mime }
    }

    pub fn resolve(&self, audio: &[AudioSource<'_>]) -> Option<CoverArt> {
        let source_dir = audio.first().and_then(|a| a.path.parent());
        if let Some(art) = source_dir.and_then(|dir| self.find_cover_file(dir)) {
            return Some(art);
        }

        for source in audio.iter().filter(|a| a.format.is_tagged()) {
            match extract_embedded(source) {
                Ok(Some(picture)) => {
                    tracing::debug!("[CoverArt] Embedded picture in {}", source.path.display());
                    let extension = image_extension(&picture.mime).to_string();
                    return Some(CoverArt { bytes: picture.data, mime: picture.mime, extension });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("[CoverArt] Could not read art from {}: {}", source.path.display(), e);
                }
            }
        }

        None
    }

    fn find_cover_file(&self, dir: &Path) -> Option<CoverArt> {
        for stem in COVER_STEMS {
            for ext in COVER_EXTENSIONS {
                let candidate = dir.join(format!("{}{}", stem, ext));
                if !candidate.is_file() {
                    continue;
                }
                match std::fs::read(&candidate) {
                    Ok(bytes) => {
                        tracing::debug!("[CoverArt] Found cover file {}", candidate.display());
                        let mime = (self.guess_mime)(&candidate).unwrap_or(match *ext {
                            ".png" => "image/png",
                            _ => "image/jpeg",
                        });
                        return Some(CoverArt {
                            bytes,
                            mime: mime.to_string(),
                            extension: ext.to_string(),
                        });
                    }
                    Err(e) => {
                        tracing::debug!("[CoverArt] Error reading {}: {}", candidate.display(), e);
                    }
                }
            }
        }
        None
    }
}

fn extract_embedded(source: &AudioSource<'_>) -> Result<Option<EmbeddedPicture>> {
    match source.format {
        AudioFormat::Mp3 => mp3::embedded_picture(source.path),
        AudioFormat::Flac => {
            let mut reader = BufReader::new(File::open(source.path)?);
            let metadata = flac::scan(&mut reader)?;
            flac::first_picture(&metadata.blocks).transpose()
        }
        AudioFormat::Unknown => Ok(None),
    }
}
