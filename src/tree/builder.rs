// FILE: src/tree/builder.rs
//! Builds the virtual tree from a library snapshot.
//!
//! Every item is placed by rendering the path template one segment per
//! depth. The last segment is the file name (plus the original extension);
//! the ones before it are directories. Header synthesis runs once per item
//! to size the virtual file. A failing item is kept as an empty file and
//! logged, never fatal.

use std::path::Path;
use std::sync::Arc;
use crate::core::inode_store::{InodeStore, ROOT_INODE};
use crate::core::mime::guess_mime;
use crate::core::sanitize::{sanitize, with_extension};
use crate::cover::{AudioSource, CoverArtResolver};
use crate::error::Result;
use crate::format::AudioFormat;
use crate::library::{Item, Library};
use crate::template::Template;
use super::{NodeKind, Tree};

pub struct TreeBuilder {
    template: Vec<Template>,
    inodes: Arc<InodeStore>,
    sanitize: fn(&str) -> String,
    guess_mime: fn(&Path) -> Option<&'static str>,
    covers: CoverArtResolver,
}

impl TreeBuilder {
    pub fn new(template: Vec<Template>, inodes: Arc<InodeStore>) -> Self {
        Self {
            template,
            inodes,
            sanitize,
            guess_mime,
            covers: CoverArtResolver::new(guess_mime),
        }
    }

    pub fn with_sanitizer(mut self, sanitize: fn(&str) -> String) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn with_mime_probe(mut self, guess_mime: fn(&Path) -> Option<&'static str>) -> Self {
        self.guess_mime = guess_mime;
        self.covers = CoverArtResolver::new(guess_mime);
        self
    }

    pub fn inodes(&self) -> &Arc<InodeStore> {
        &self.inodes
    }

    /// Snapshot the library and build from it.
    pub fn build_from(&self, library: &dyn Library) -> Result<Tree> {
        let items = library.items()?;
        Ok(self.build(&items))
    }

    pub fn build(&self, items: &[Item]) -> Tree {
        let mut tree = Tree::new();
        if self.template.is_empty() {
            tracing::warn!("[TreeBuilder] Empty path template, tree has only the root");
            return tree;
        }

        for item in items {
            self.add_item(&mut tree, item);
        }
        self.attach_covers(&mut tree);

        tracing::info!(
            "[TreeBuilder] Built tree: {} items -> {} nodes",
            items.len(),
            tree.len()
        );
        tree
    }

    fn add_item(&self, tree: &mut Tree, item: &Item) {
        let last = self.template.len() - 1;
        let mut cursor = ROOT_INODE;

        for (depth, segment) in self.template.iter().enumerate() {
            let name = (self.sanitize)(&item.render_template(segment));

            if depth < last {
                match tree.insert_child(cursor, &name, NodeKind::Directory, &self.inodes) {
                    Some(id) => cursor = id,
                    None => {
                        tracing::warn!("[TreeBuilder] Item {}: cannot create directory '{}'", item.id, name);
                        return;
                    }
                }
                continue;
            }

            let name = with_extension(&name, &item.extension());
            if let Some(existing) = tree.child(cursor, &name) {
                tracing::debug!(
                    "[TreeBuilder] Item {}: '{}' already taken by inode {}",
                    item.id, existing.path, existing.id
                );
                return;
            }

            let kind = self.audio_node(item);
            if tree.insert_child(cursor, &name, kind, &self.inodes).is_none() {
                tracing::warn!("[TreeBuilder] Item {}: cannot create file '{}'", item.id, name);
            }
        }
    }

    fn audio_node(&self, item: &Item) -> NodeKind {
        let format = AudioFormat::from_mime((self.guess_mime)(item.path()));
        let degraded = NodeKind::AudioFile {
            item_id: item.id,
            source: item.path.clone(),
            format: AudioFormat::Unknown,
            data_start: 0,
            header_len: 0,
            total_size: 0,
        };

        let physical = match std::fs::metadata(item.path()) {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!("[TreeBuilder] Item {}: cannot stat {}: {}", item.id, item.path.display(), e);
                return degraded;
            }
        };

        let synthesized = match format.synthesize(item) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("[TreeBuilder] Item {}: {} ({})", item.id, e, item.path.display());
                return degraded;
            }
        };

        if synthesized.data_start > physical {
            tracing::warn!(
                "[TreeBuilder] Item {}: payload offset {} beyond file size {}",
                item.id, synthesized.data_start, physical
            );
            return degraded;
        }

        let header_len = synthesized.header.len() as u64;
        NodeKind::AudioFile {
            item_id: item.id,
            source: item.path.clone(),
            format,
            data_start: synthesized.data_start,
            header_len,
            total_size: header_len + (physical - synthesized.data_start),
        }
    }

    fn attach_covers(&self, tree: &mut Tree) {
        for dir in tree.directories() {
            let art = {
                let sources: Vec<AudioSource<'_>> = tree
                    .children(dir)
                    .filter_map(|n| match &n.kind {
                        NodeKind::AudioFile { source, format, .. } => {
                            Some(AudioSource { path: source.as_path(), format: *format })
                        }
                        _ => None,
                    })
                    .collect();

                if !sources.iter().any(|s| s.format.is_tagged()) {
                    continue;
                }
                self.covers.resolve(&sources)
            };

            let Some(art) = art else {
                continue;
            };
            let name = format!("cover{}", art.extension);
            let kind = NodeKind::AlbumArt { bytes: Arc::from(art.bytes), mime: art.mime };
            if tree.insert_child(dir, &name, kind, &self.inodes).is_none() {
                tracing::warn!("[TreeBuilder] Could not add {} to directory {}", name, dir);
            }
        }
    }
}
