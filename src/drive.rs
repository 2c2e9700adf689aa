// FILE: src/drive.rs
//! BeetDrive: the synchronous FUSE loop over [`BeetFs`].
//!
//! Every callback converts its arguments, calls the service and maps
//! [`FsError`](crate::error::FsError) onto an errno.

use std::ffi::OsStr;
use std::time::Duration;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyXattr, Request,
};
use crate::service::{BeetFs, EntryKind, FileAttributes, BLOCK_SIZE};

const TTL: Duration = Duration::from_secs(1);

pub struct BeetDrive {
    fs: BeetFs,
}

impl BeetDrive {
    pub fn new(fs: BeetFs) -> Self {
        Self { fs }
    }

    pub fn service(&self) -> &BeetFs {
        &self.fs
    }
}

fn file_type(kind: EntryKind) -> FileType {
    if kind.is_dir() {
        FileType::Directory
    } else {
        FileType::RegularFile
    }
}

fn to_file_attr(attr: &FileAttributes) -> FileAttr {
    FileAttr {
        ino: attr.id,
        size: attr.size,
        blocks: attr.blocks(),
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: attr.ctime,
        kind: file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn wants_write(flags: i32) -> bool {
    flags & libc::O_ACCMODE != libc::O_RDONLY
}

impl Filesystem for BeetDrive {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> std::result::Result<(), i32> {
        tracing::info!("[BeetDrive] FUSE initialized ({} nodes)", self.fs.tree().len());
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!("[BeetDrive] FUSE unmounted");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.fs.lookup(parent, name) {
            Ok(attr) => reply.entry(&TTL, &to_file_attr(&attr), 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &Request, _ino: u64, _nlookup: u64) {}

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.fs.attributes(ino) {
            Ok(attr) => reply.attr(&TTL, &to_file_attr(&attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        if wants_write(flags) {
            reply.error(libc::EACCES);
            return;
        }
        match self.fs.attributes(ino) {
            Ok(attr) if attr.kind.is_dir() => reply.opened(ino, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let children = match self.fs.list_directory(ino) {
            Ok(children) => children,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        let parent = self.fs.tree().get(ino).and_then(|n| n.parent).unwrap_or(ino);

        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent, FileType::Directory, "..".to_string()),
        ];
        entries.extend(children.into_iter().map(|c| (c.id, file_type(c.kind), c.name)));

        tracing::debug!("[BeetDrive] readdir inode {} from {} ({} entries)", ino, offset, entries.len());
        for (i, (id, kind, name)) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(*id, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.fs.open(ino, wants_write(flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => {
                tracing::debug!("[BeetDrive] open inode {} failed: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.read(ino, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                tracing::debug!("[BeetDrive] read inode {} @{}+{} failed: {}", ino, offset, size, e);
                reply.error(e.errno());
            }
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.fs.release(ino);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let s = self.fs.statfs();
        reply.statfs(s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize);
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.fs.access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, _size: u32, reply: ReplyXattr) {
        match self.fs.getxattr(ino, &name.to_string_lossy()) {
            Ok(value) => reply.data(&value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        match self.fs.listxattr(ino) {
            Ok(names) if size == 0 => reply.size(names.len() as u32),
            Ok(names) => reply.data(&names),
            Err(e) => reply.error(e.errno()),
        }
    }
}
