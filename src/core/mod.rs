// FILE: src/core/mod.rs
//! Small building blocks shared by the tree builder and the drive.

pub mod inode_store;
pub mod mime;
pub mod permissions;
pub mod sanitize;

pub use inode_store::{InodeStore, ROOT_INODE};
pub use permissions::Identity;
