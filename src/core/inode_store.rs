// FILE: src/core/inode_store.rs
//! The path -> inode authority.
//!
//! An inode is issued the first time a virtual path is seen and never
//! reissued for a different path. The map can be saved to and loaded from a
//! JSON file so ids survive a rebuild or a remount.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use serde::{Deserialize, Serialize};
use crate::error::{BeetfsError, Result};

pub const ROOT_INODE: u64 = 1;
const FIRST_INODE: u64 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    next_inode: u64,
    paths: BTreeMap<String, u64>,
}

#[derive(Debug)]
pub struct InodeStore {
    paths: RwLock<HashMap<String, u64>>,
    next_inode: RwLock<u64>,
}

impl Default for InodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeStore {
    pub fn new() -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
            next_inode: RwLock::new(FIRST_INODE),
        }
    }

    /// Inode for a virtual path, issuing the next free one for unseen paths.
    /// The root ("" or "/") is always [`ROOT_INODE`].
    pub fn get_or_create_inode(&self, path: &str) -> u64 {
        if path.is_empty() || path == "/" {
            return ROOT_INODE;
        }

        {
            let map = self.paths.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(&id) = map.get(path) {
                return id;
            }
        }

        let mut map = self.paths.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = self.next_inode.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(&id) = map.get(path) {
            return id;
        }

        let id = *next;
        *next += 1;
        map.insert(path.to_string(), id);
        id
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        if path.is_empty() || path == "/" {
            return Some(ROOT_INODE);
        }
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.paths.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a saved map. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("[InodeStore] No saved map at {}, starting fresh", path.display());
            return Ok(Self::new());
        }

        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;

        let max_id = snapshot.paths.values().copied().max().unwrap_or(ROOT_INODE);
        if snapshot.paths.values().any(|&id| id == ROOT_INODE) {
            return Err(BeetfsError::Config(format!(
                "Inode map {} assigns the root inode to a path",
                path.display()
            )));
        }
        let next_inode = snapshot.next_inode.max(max_id + 1).max(FIRST_INODE);

        tracing::info!(
            "[InodeStore] Loaded {} paths from {}",
            snapshot.paths.len(),
            path.display()
        );

        Ok(Self {
            paths: RwLock::new(snapshot.paths.into_iter().collect()),
            next_inode: RwLock::new(next_inode),
        })
    }

    /// Save the map atomically (write to a sibling temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            next_inode: *self.next_inode.read().unwrap_or_else(PoisonError::into_inner),
            paths: self
                .paths
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::debug!("[InodeStore] Saved {} paths to {}", snapshot.paths.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable_per_path() {
        let store = InodeStore::new();
        let a = store.get_or_create_inode("/Artist");
        let b = store.get_or_create_inode("/Artist/Album");
        assert_eq!(a, FIRST_INODE);
        assert_eq!(b, FIRST_INODE + 1);
        assert_eq!(store.get_or_create_inode("/Artist"), a);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_root_is_reserved() {
        let store = InodeStore::new();
        assert_eq!(store.get_or_create_inode(""), ROOT_INODE);
        assert_eq!(store.get_inode("/"), Some(ROOT_INODE));
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state").join("inodes.json");

        let store = InodeStore::new();
        let a = store.get_or_create_inode("/A");
        let b = store.get_or_create_inode("/A/b.mp3");
        store.save(&file).unwrap();

        let loaded = InodeStore::load(&file).unwrap();
        assert_eq!(loaded.get_inode("/A"), Some(a));
        assert_eq!(loaded.get_inode("/A/b.mp3"), Some(b));
        // New paths continue after the highest saved id.
        assert_eq!(loaded.get_or_create_inode("/C"), b + 1);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InodeStore::load(&dir.path().join("none.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_rejects_root_collision() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, r#"{"next_inode": 5, "paths": {"/x": 1}}"#).unwrap();
        assert!(InodeStore::load(&file).is_err());
    }
}
