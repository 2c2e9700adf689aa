// FILE: src/config.rs
//! Mount configuration: an optional JSON file, overlaid by command line flags.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{BeetfsError, Result};
use crate::template::{parse_path_format, Template};

/// The beets default path format.
pub const DEFAULT_PATH_FORMAT: &str = "$albumartist/$album%aunique{}/$track $title";
pub const DEFAULT_FSNAME: &str = "beetfs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The beets SQLite database.
    pub library: PathBuf,
    /// `/`-separated path template, one segment per directory level.
    pub path_format: String,
    /// Where the path -> inode map is kept between mounts.
    pub inode_map: Option<PathBuf>,
    pub allow_other: bool,
    pub fsname: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: default_library(),
            path_format: DEFAULT_PATH_FORMAT.to_string(),
            inode_map: None,
            allow_other: false,
            fsname: DEFAULT_FSNAME.to_string(),
        }
    }
}

/// Values given on the command line. `None` keeps the file's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub library: Option<PathBuf>,
    pub path_format: Option<String>,
    pub inode_map: Option<PathBuf>,
    pub allow_other: bool,
}

fn default_library() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beets")
        .join("library.db")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BeetfsError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text)?;
        tracing::debug!("[Config] Loaded {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise start from the defaults.
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(overrides))
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(library) = overrides.library {
            self.library = library;
        }
        if let Some(format) = overrides.path_format {
            self.path_format = format;
        }
        if overrides.inode_map.is_some() {
            self.inode_map = overrides.inode_map;
        }
        self.allow_other |= overrides.allow_other;
        self
    }

    pub fn path_template(&self) -> Result<Vec<Template>> {
        parse_path_format(&self.path_format)
    }
}
