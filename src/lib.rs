//! beetfs: a read-only FUSE view of a beets music library
//!
//! The pieces, in the order a mount uses them:
//! - Library (beets SQLite backend, or an in-memory list)
//! - TreeBuilder (path templates -> arena of nodes, sized by header synthesis)
//! - BeetFs (the filesystem operations over the finished tree)
//! - BeetDrive (the synchronous FUSE loop)

pub mod config;
pub mod core;
pub mod cover;
pub mod drive;
pub mod error;
pub mod format;
pub mod library;
pub mod service;
pub mod template;
pub mod tree;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use drive::BeetDrive;
pub use error::{BeetfsError, FsError, FsResult, Result};
pub use library::{BeetsLibrary, Item, Library, MemoryLibrary, TagValue};
pub use service::BeetFs;
pub use tree::{Tree, TreeBuilder};
