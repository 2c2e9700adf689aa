// FILE: src/tree/mod.rs
//! The virtual directory tree.
//!
//! Nodes live in an arena keyed by inode. Each node knows its parent's id
//! and the ordered ids of its children; names are unique within a directory.

pub mod builder;

pub use builder::TreeBuilder;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use crate::core::inode_store::{InodeStore, ROOT_INODE};
use crate::format::AudioFormat;

pub type NodeId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Directory,
    AudioFile {
        item_id: i64,
        /// The original audio file
        source: PathBuf,
        format: AudioFormat,
        data_start: u64,
        header_len: u64,
        total_size: u64,
    },
    AlbumArt {
        bytes: Arc<[u8]>,
        mime: String,
    },
}

impl NodeKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    /// Size of the entry as seen through the mount.
    pub fn size(&self) -> u64 {
        match self {
            NodeKind::Directory => 0,
            NodeKind::AudioFile { total_size, .. } => *total_size,
            NodeKind::AlbumArt { bytes, .. } => bytes.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Root-relative path, e.g. "/Artist/Album/01 Title.mp3"
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INODE, Node {
            id: ROOT_INODE,
            name: String::new(),
            path: String::new(),
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Directory,
        });
        Self { nodes }
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&ROOT_INODE]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present.
        self.nodes.len() == 1
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |c| self.nodes.get(c))
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<&Node> {
        self.children(parent).find(|n| n.name == name)
    }

    /// Node at a root-relative path such as "/Artist/Album".
    pub fn find_path(&self, path: &str) -> Option<&Node> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.root(), |node, name| self.child(node.id, name))
    }

    /// Insert `name` under `parent`, or return the existing child of that name
    /// unchanged. Returns `None` when `parent` is missing or not a directory.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
        inodes: &InodeStore,
    ) -> Option<NodeId> {
        if let Some(existing) = self.child(parent, name) {
            return Some(existing.id);
        }

        let parent_node = self.nodes.get(&parent)?;
        if !parent_node.kind.is_dir() {
            return None;
        }

        let path = format!("{}/{}", parent_node.path, name);
        let id = inodes.get_or_create_inode(&path);
        if self.nodes.contains_key(&id) {
            tracing::warn!("[Tree] Inode {} already in use, not inserting {}", id, path);
            return None;
        }

        self.nodes.insert(id, Node {
            id,
            name: name.to_string(),
            path,
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        Some(id)
    }

    /// Every directory id, parents before children.
    pub fn directories(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT_INODE];
        while let Some(id) = stack.pop() {
            out.push(id);
            let subdirs: Vec<NodeId> = self
                .children(id)
                .filter(|n| n.kind.is_dir())
                .map(|n| n.id)
                .collect();
            stack.extend(subdirs.into_iter().rev());
        }
        out
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}
