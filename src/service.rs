// FILE: src/service.rs
//! BeetFs: the filesystem operations, independent of the FUSE plumbing.
//!
//! The tree is immutable once built. The only mutable state is the header
//! cache: `open` synthesizes a header and publishes it, fully built, behind an
//! `Arc`; `read` clones that `Arc`; the last `release` drops it.

use std::fs::File;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use dashmap::DashMap;
use crate::core::permissions::Identity;
use crate::error::{FsError, FsResult};
use crate::format::AudioFormat;
use crate::library::Library;
use crate::tree::{Node, NodeId, NodeKind, Tree};

pub const BLOCK_SIZE: u32 = 4096;
const DIR_SIZE: u64 = 4096;
const MAX_NAME_LEN: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    AudioFile,
    AlbumArt,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub id: NodeId,
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileAttributes {
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub id: NodeId,
    pub name: String,
    pub kind: EntryKind,
    pub attr: FileAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

struct OpenHeader {
    header: Arc<Vec<u8>>,
    opens: usize,
}

pub struct BeetFs {
    tree: Arc<Tree>,
    library: Arc<dyn Library>,
    identity: Identity,
    headers: DashMap<NodeId, OpenHeader>,
}

impl BeetFs {
    pub fn new(tree: Arc<Tree>, library: Arc<dyn Library>, identity: Identity) -> Self {
        Self {
            tree,
            library,
            identity,
            headers: DashMap::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    fn node(&self, id: NodeId) -> FsResult<&Node> {
        self.tree.get(id).ok_or(FsError::NotFound)
    }

    pub fn attributes(&self, id: NodeId) -> FsResult<FileAttributes> {
        Ok(self.node_attributes(self.node(id)?))
    }

    fn node_attributes(&self, node: &Node) -> FileAttributes {
        let mut attr = FileAttributes {
            id: node.id,
            kind: EntryKind::Directory,
            size: DIR_SIZE,
            perm: 0o555,
            nlink: 2,
            uid: self.identity.uid,
            gid: self.identity.gid,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
        };

        match &node.kind {
            NodeKind::Directory => {}
            NodeKind::AudioFile { source, total_size, .. } => {
                attr.kind = EntryKind::AudioFile;
                attr.size = *total_size;
                attr.perm = 0o444;
                attr.nlink = 1;
                if let Some((atime, mtime, ctime)) = source_times(source) {
                    attr.atime = atime;
                    attr.mtime = mtime;
                    attr.ctime = ctime;
                }
            }
            NodeKind::AlbumArt { bytes, .. } => {
                let now = SystemTime::now();
                attr.kind = EntryKind::AlbumArt;
                attr.size = bytes.len() as u64;
                attr.perm = 0o444;
                attr.nlink = 1;
                attr.atime = now;
                attr.mtime = now;
                attr.ctime = now;
            }
        }
        attr
    }

    pub fn lookup(&self, parent: NodeId, name: &str) -> FsResult<FileAttributes> {
        self.node(parent)?;
        let child = self.tree.child(parent, name).ok_or(FsError::NotFound)?;
        Ok(self.node_attributes(child))
    }

    /// Every child of `id` with its attributes, in insertion order.
    pub fn list_directory(&self, id: NodeId) -> FsResult<Vec<DirEntry>> {
        let node = self.node(id)?;
        if !node.kind.is_dir() {
            return Err(FsError::NotFound);
        }

        Ok(self
            .tree
            .children(id)
            .map(|child| {
                let attr = self.node_attributes(child);
                DirEntry {
                    id: child.id,
                    name: child.name.clone(),
                    kind: attr.kind,
                    attr,
                }
            })
            .collect())
    }

    /// Open `id` for reading. Returns the handle, which is the node id.
    pub fn open(&self, id: NodeId, write: bool) -> FsResult<u64> {
        if write {
            return Err(FsError::PermissionDenied);
        }

        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Directory => Err(FsError::IsADirectory),
            NodeKind::AlbumArt { .. } => Ok(id),
            NodeKind::AudioFile { item_id, format, header_len, .. } => {
                let header = Arc::new(self.synthesize_header(*item_id, *format)?);
                if header.len() as u64 != *header_len {
                    tracing::warn!(
                        "[BeetFs] Header for inode {} is {} bytes, built as {}",
                        id, header.len(), header_len
                    );
                }

                self.headers
                    .entry(id)
                    .and_modify(|open| {
                        open.header = Arc::clone(&header);
                        open.opens += 1;
                    })
                    .or_insert_with(|| OpenHeader { header: Arc::clone(&header), opens: 1 });
                tracing::debug!("[BeetFs] Opened inode {} ({} header bytes)", id, header.len());
                Ok(id)
            }
        }
    }

    fn synthesize_header(&self, item_id: i64, format: AudioFormat) -> FsResult<Vec<u8>> {
        let item = self.library.get_item(item_id)?.ok_or(FsError::NotFound)?;
        let synthesized = format.synthesize(&item).map_err(|e| {
            tracing::warn!("[BeetFs] Header synthesis failed for item {}: {}", item_id, e);
            FsError::from(e)
        })?;
        Ok(synthesized.header)
    }

    pub fn read(&self, id: NodeId, offset: u64, len: u32) -> FsResult<Vec<u8>> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Directory => Err(FsError::IsADirectory),
            NodeKind::AlbumArt { bytes, .. } => Ok(slice(bytes, offset, len as u64).to_vec()),
            NodeKind::AudioFile { item_id, source, format, data_start, header_len, total_size } => {
                let cached = self.headers.get(&id).map(|open| Arc::clone(&open.header));
                let header = match cached {
                    Some(header) => header,
                    None => {
                        tracing::warn!("[BeetFs] Read on unopened inode {}, building a transient header", id);
                        Arc::new(self.synthesize_header(*item_id, *format)?)
                    }
                };

                let payload_len = total_size.saturating_sub(*header_len);
                let cached_len = header.len() as u64;
                let end = offset.saturating_add(len as u64).min(cached_len + payload_len);
                if offset >= end {
                    return Ok(Vec::new());
                }

                let mut out = Vec::with_capacity((end - offset) as usize);
                if offset < cached_len {
                    out.extend_from_slice(slice(&header, offset, end.min(cached_len) - offset));
                }
                if end > cached_len {
                    let start = offset.max(cached_len);
                    let file_offset = start - cached_len + data_start;
                    out.extend(read_source(source, file_offset, end - start)?);
                }
                Ok(out)
            }
        }
    }

    /// Drop the header cached for `id` once every open has been released.
    pub fn release(&self, id: NodeId) {
        let closed = match self.headers.get_mut(&id) {
            Some(mut open) => {
                open.opens = open.opens.saturating_sub(1);
                open.opens == 0
            }
            None => false,
        };
        if closed {
            self.headers.remove_if(&id, |_, open| open.opens == 0);
            tracing::debug!("[BeetFs] Released inode {}", id);
        }
    }

    pub fn is_open(&self, id: NodeId) -> bool {
        self.headers.contains_key(&id)
    }

    pub fn access(&self, id: NodeId, mask: i32) -> FsResult<()> {
        self.node(id)?;
        if mask & libc::W_OK != 0 {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    pub fn statfs(&self) -> StatFs {
        let bytes: u64 = self.tree.nodes().map(|n| n.kind.size()).sum();
        StatFs {
            blocks: bytes.div_ceil(BLOCK_SIZE as u64),
            bfree: 0,
            bavail: 0,
            files: self.tree.len() as u64,
            ffree: 0,
            bsize: BLOCK_SIZE,
            namelen: MAX_NAME_LEN,
            frsize: BLOCK_SIZE,
        }
    }

    pub fn getxattr(&self, id: NodeId, _name: &str) -> FsResult<Vec<u8>> {
        self.node(id)?;
        Err(FsError::NoData)
    }

    pub fn listxattr(&self, id: NodeId) -> FsResult<Vec<u8>> {
        self.node(id)?;
        Ok(Vec::new())
    }
}

fn slice(bytes: &[u8], offset: u64, len: u64) -> &[u8] {
    let start = offset.min(bytes.len() as u64) as usize;
    let end = offset.saturating_add(len).min(bytes.len() as u64) as usize;
    &bytes[start..end]
}

/// Positional read of up to `len` bytes; short only at end of file.
fn read_source(path: &Path, offset: u64, len: u64) -> FsResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut buf = vec![0u8; len as usize];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

fn source_times(path: &Path) -> Option<(SystemTime, SystemTime, SystemTime)> {
    let meta = std::fs::metadata(path).ok()?;
    let ctime = if meta.ctime() >= 0 {
        UNIX_EPOCH + Duration::new(meta.ctime() as u64, meta.ctime_nsec() as u32)
    } else {
        UNIX_EPOCH
    };
    Some((
        meta.accessed().unwrap_or(UNIX_EPOCH),
        meta.modified().unwrap_or(UNIX_EPOCH),
        ctime,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inode_store::{InodeStore, ROOT_INODE};
    use crate::library::{Item, MemoryLibrary};
    use crate::template::parse_path_format;
    use crate::testutil;
    use crate::tree::TreeBuilder;

    const IDENTITY: Identity = Identity { uid: 1000, gid: 1000, is_root: false };

    fn service(tree: Tree, items: Vec<Item>) -> BeetFs {
        BeetFs::new(Arc::new(tree), Arc::new(MemoryLibrary::new(items)), IDENTITY)
    }

    const HEADER: [u8; 100] = [0xEE; 100];

    /// An audio node with a 100 byte header already cached and its payload
    /// starting at byte 30 of the original file.
    fn fixture(dir: &Path) -> (BeetFs, NodeId, Vec<u8>) {
        let audio: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let path = testutil::write_mp3(dir, "a.mp3", 20, &audio);
        let physical = std::fs::metadata(&path).unwrap().len();

        let inodes = InodeStore::new();
        let mut tree = Tree::new();
        let id = tree
            .insert_child(ROOT_INODE, "a.mp3", NodeKind::AudioFile {
                item_id: 7,
                source: path.clone(),
                format: AudioFormat::Unknown,
                data_start: 30,
                header_len: 100,
                total_size: 100 + physical - 30,
            }, &inodes)
            .unwrap();

        let fs = service(tree, vec![Item::new(7, &path)]);
        fs.headers.insert(id, OpenHeader { header: Arc::new(HEADER.to_vec()), opens: 1 });
        (fs, id, std::fs::read(&path).unwrap())
    }

    fn built(dir: &Path, with_cover: bool) -> BeetFs {
        let a = testutil::write_mp3(dir, "a.mp3", 10, &[0xAA; 64]);
        let b = testutil::write_flac(dir, "b.flac", &[], &[0xBB; 64]);
        if with_cover {
            std::fs::write(dir.join("cover.png"), [0x89, b'P', b'N', b'G']).unwrap();
        }
        let items = vec![
            Item::new(1, &a).with_tag("album", "Album").with_tag("track", 1i64).with_tag("title", "One"),
            Item::new(2, &b).with_tag("album", "Album").with_tag("track", 2i64).with_tag("title", "Two"),
        ];
        let template = parse_path_format("$album/$track $title").unwrap();
        let tree = TreeBuilder::new(template, Arc::new(InodeStore::new())).build(&items);
        service(tree, items)
    }

    #[test]
    fn test_read_spans_header_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, id, original) = fixture(dir.path());

        let data = fs.read(id, 90, 50).unwrap();
        assert_eq!(data.len(), 50);
        assert_eq!(&data[..10], &HEADER[90..]);
        assert_eq!(&data[10..], &original[30..70]);
        assert_eq!(fs.attributes(id).unwrap().size, 100 + original.len() as u64 - 30);
    }

    #[test]
    fn test_read_past_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, id, _) = fixture(dir.path());
        let size = fs.attributes(id).unwrap().size;

        assert!(fs.read(id, size, 10).unwrap().is_empty());
        assert!(fs.read(id, size + 1000, 10).unwrap().is_empty());
        assert_eq!(fs.read(id, size - 4, 10).unwrap().len(), 4);
    }

    #[test]
    fn test_whole_file_read() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, id, original) = fixture(dir.path());
        let size = fs.attributes(id).unwrap().size;

        let data = fs.read(id, 0, size as u32 + 100).unwrap();
        assert_eq!(data.len() as u64, size);
        assert_eq!(&data[..100], &HEADER[..]);
        assert_eq!(&data[100..], &original[30..]);
    }

    #[test]
    fn test_write_intent_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        let album = fs.tree().find_path("/Album").unwrap().id;
        let song = fs.tree().find_path("/Album/01 One.mp3").unwrap().id;

        assert_eq!(fs.open(album, true), Err(FsError::PermissionDenied));
        assert_eq!(fs.open(song, true), Err(FsError::PermissionDenied));
        assert_eq!(fs.access(song, libc::W_OK), Err(FsError::PermissionDenied));
        assert_eq!(fs.access(song, libc::R_OK), Ok(()));
        assert!(!fs.is_open(song));
    }

    #[test]
    fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        assert_eq!(fs.open(ROOT_INODE, false), Err(FsError::IsADirectory));
        assert_eq!(fs.open(9999, false), Err(FsError::NotFound));
        assert_eq!(fs.attributes(9999), Err(FsError::NotFound));
        assert_eq!(fs.lookup(ROOT_INODE, "Nope"), Err(FsError::NotFound));
        assert_eq!(fs.lookup(9999, "Album"), Err(FsError::NotFound));
    }

    #[test]
    fn test_listing_with_cover() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), true);
        let album = fs.tree().find_path("/Album").unwrap().id;

        let entries = fs.list_directory(album).unwrap();
        assert_eq!(entries.len(), 3);
        let art: Vec<_> = entries.iter().filter(|e| e.kind == EntryKind::AlbumArt).collect();
        assert_eq!(art.len(), 1);
        assert_eq!(art[0].name, "cover.png");
        assert_eq!(art[0].attr.size, 4);

        let cover = fs.lookup(album, "cover.png").unwrap();
        assert_eq!(fs.open(cover.id, false), Ok(cover.id));
        assert_eq!(fs.read(cover.id, 1, 2).unwrap(), vec![b'P', b'N']);
        assert!(fs.read(cover.id, 4, 2).unwrap().is_empty());
    }

    #[test]
    fn test_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);

        let root = fs.attributes(ROOT_INODE).unwrap();
        assert_eq!(root.kind, EntryKind::Directory);
        assert_eq!((root.size, root.perm, root.mtime), (4096, 0o555, UNIX_EPOCH));

        let song = fs.lookup(fs.tree().find_path("/Album").unwrap().id, "02 Two.flac").unwrap();
        assert_eq!(song.kind, EntryKind::AudioFile);
        assert_eq!(song.perm, 0o444);
        assert_eq!((song.uid, song.gid), (1000, 1000));
        assert_ne!(song.mtime, UNIX_EPOCH);
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        let song = fs.tree().find_path("/Album/02 Two.flac").unwrap().id;

        fs.open(song, false).unwrap();
        fs.open(song, false).unwrap();
        fs.release(song);
        assert!(fs.is_open(song));
        fs.release(song);
        assert!(!fs.is_open(song));
        fs.release(song);
        fs.release(ROOT_INODE);
        assert!(!fs.is_open(song));
    }

    #[test]
    fn test_flac_read_has_new_comment() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        let id = fs.tree().find_path("/Album/02 Two.flac").unwrap().id;
        let size = fs.attributes(id).unwrap().size;

        fs.open(id, false).unwrap();
        let data = fs.read(id, 0, size as u32).unwrap();
        assert!(data.starts_with(b"fLaC"));
        assert!(data.windows(9).any(|w| w == b"TITLE=Two"));
        assert!(!data.windows(9).any(|w| w == b"TITLE=Old"));
        assert!(data.ends_with(&[0xBB; 64]));
    }

    #[test]
    fn test_missing_item_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, id, _) = fixture(dir.path());
        let orphan = BeetFs::new(Arc::clone(&fs.tree), Arc::new(MemoryLibrary::default()), IDENTITY);
        assert_eq!(orphan.open(id, false), Err(FsError::NotFound));
        assert_eq!(orphan.read(id, 0, 10), Err(FsError::NotFound));
    }

    #[test]
    fn test_vanished_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let (fs, id, _) = fixture(dir.path());
        std::fs::remove_file(dir.path().join("a.mp3")).unwrap();
        assert!(matches!(fs.read(id, 0, 4096), Err(FsError::Io(_))));
        // the cached header alone still reads
        assert_eq!(fs.read(id, 0, 3).unwrap(), vec![0xEE; 3]);
    }

    #[test]
    fn test_xattrs_and_statfs() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        assert_eq!(fs.getxattr(ROOT_INODE, "user.x"), Err(FsError::NoData));
        assert_eq!(fs.listxattr(ROOT_INODE), Ok(Vec::new()));

        let stats = fs.statfs();
        assert_eq!(stats.files, fs.tree().len() as u64);
        assert_eq!((stats.bsize, stats.namelen, stats.bfree), (4096, 255, 0));
        assert!(stats.blocks >= 1);
    }

    #[test]
    fn test_read_without_open_uses_transient_header() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        let id = fs.tree().find_path("/Album/02 Two.flac").unwrap().id;
        let size = fs.attributes(id).unwrap().size;

        let unopened = fs.read(id, 0, size as u32).unwrap();
        assert!(!fs.is_open(id));

        fs.open(id, false).unwrap();
        assert_eq!(fs.read(id, 0, size as u32).unwrap(), unopened);
        fs.release(id);
        assert!(!fs.is_open(id));
    }

    #[test]
    fn test_open_corrupt_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        let id = fs.tree().find_path("/Album/02 Two.flac").unwrap().id;

        std::fs::write(dir.path().join("b.flac"), b"garbage bytes").unwrap();
        assert!(matches!(fs.open(id, false), Err(FsError::Io(_))));
        assert!(!fs.is_open(id));
        assert!(matches!(fs.read(id, 0, 16), Err(FsError::Io(_))));
    }

    #[test]
    fn test_concurrent_open_read_release() {
        let dir = tempfile::tempdir().unwrap();
        let fs = built(dir.path(), false);
        let id = fs.tree().find_path("/Album/02 Two.flac").unwrap().id;
        let size = fs.attributes(id).unwrap().size as u32;

        fs.open(id, false).unwrap();
        let expected = fs.read(id, 0, size).unwrap();
        fs.release(id);
        assert!(!fs.is_open(id));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        fs.open(id, false).unwrap();
                        assert_eq!(fs.read(id, 0, size).unwrap(), expected);
                        fs.release(id);
                    }
                });
            }
        });

        assert!(!fs.is_open(id));
        assert_eq!(fs.read(id, 0, size).unwrap(), expected);
    }
}
