//! Error types for beetfs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeetfsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Tag error: {0}")]
    Tag(#[from] id3::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BeetfsError>;

/// Errors surfaced to the FUSE layer. Each maps onto one errno.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("no such node")]
    NotFound,

    #[error("is a directory")]
    IsADirectory,

    #[error("permission denied")]
    PermissionDenied,

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("no extended attribute")]
    NoData,
}

impl FsError {
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::IsADirectory => libc::EISDIR,
            FsError::PermissionDenied => libc::EACCES,
            FsError::Io(_) => libc::EIO,
            FsError::NoData => libc::ENODATA,
        }
    }
}

// A vanished or unreadable backing file is an I/O failure of the virtual file,
// not a missing node.
impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(e.to_string())
    }
}

impl From<BeetfsError> for FsError {
    fn from(e: BeetfsError) -> Self {
        FsError::Io(e.to_string())
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;
