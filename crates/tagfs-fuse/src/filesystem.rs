//! FUSE filesystem implementation.

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use libc::ENOENT;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::inode::{InodeTable, ROOT_INO, UNKNOWN_INO};
use crate::vfs::DirEntry;
use crate::vfs::{Attr, EntryKind, Vfs};

const TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u64 = 512;

/// Tag FUSE filesystem.
pub struct TagFs {
    /// Path-level driver
    vfs: Arc<Vfs>,
    /// Inode table
    inodes: Arc<RwLock<InodeTable>>,
    /// Tokio runtime handle for async operations
    runtime: Handle,
}

impl TagFs {
    /// Create a filesystem driving `vfs` on `runtime`.
    #[must_use]
    pub fn new(vfs: Arc<Vfs>, runtime: Handle) -> Self {
        Self {
            vfs,
            inodes: Arc::new(RwLock::new(InodeTable::new())),
            runtime,
        }
    }

    #[allow(unsafe_code)]
    fn make_attr(&self, ino: u64, attr: &Attr) -> FileAttr {
        let now = SystemTime::now();
        let mtime = attr.mtime.map_or(now, SystemTime::from);
        let kind = file_type(attr.kind);
        // SAFETY: getuid() and getgid() are always safe to call
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(BLOCK_SIZE),
            atime: now,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm: attr.perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid,
            gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        let inodes = self.runtime.block_on(self.inodes.read());
        inodes.path(ino).map(str::to_string)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let name = name.to_str()?;
        let inodes = self.runtime.block_on(self.inodes.read());
        inodes.child_path(parent, name)
    }

    /// Listing rows for directory `ino`, including `.` and `..`.
    ///
    /// Children keep the inode they already have; the rest are reported as
    /// [`UNKNOWN_INO`] and get a real one on `lookup`.
    fn dir_entries(&self, ino: u64, children: Vec<DirEntry>) -> Vec<(u64, FileType, String)> {
        let inodes = self.runtime.block_on(self.inodes.read());
        let parent = inodes.get(ino).map_or(ROOT_INO, |entry| entry.parent);
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent, FileType::Directory, "..".to_string()),
        ];
        for child in children {
            let child_ino = inodes
                .child_path(ino, &child.name)
                .and_then(|path| inodes.get_by_path(&path))
                .unwrap_or(UNKNOWN_INO);
            entries.push((child_ino, file_type(child.kind), child.name));
        }
        entries
    }

    /// Look up `path` and hand the kernel an entry for it.
    fn reply_entry(&self, parent: u64, path: &str, reply: ReplyEntry) {
        match self.runtime.block_on(self.vfs.get_attr(path)) {
            Ok(attr) => {
                let mut inodes = self.runtime.block_on(self.inodes.write());
                let ino = inodes.get_or_create(path, parent);
                inodes.lookup(ino);
                drop(inodes);
                reply.entry(&TTL, &self.make_attr(ino, &attr), 0);
            }
            Err(e) => reply.error(e.errno()),
        }
    }
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::Symlink => FileType::Symlink,
        EntryKind::File => FileType::RegularFile,
    }
}

impl Filesystem for TagFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        debug!("FUSE init at {:?}", self.vfs.mount_point());
        Ok(())
    }

    fn destroy(&mut self) {
        debug!("FUSE destroy");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name.to_string_lossy();
        debug!("lookup: parent={}, name={}", parent, name_str);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        self.reply_entry(parent, &path, reply);
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!("forget: ino={}, nlookup={}", ino, nlookup);
        let mut inodes = self.runtime.block_on(self.inodes.write());
        inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr: ino={}", ino);

        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.get_attr(&path)) {
            Ok(attr) => reply.attr(&TTL, &self.make_attr(ino, &attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!("readlink: ino={}", ino);

        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.read_link(&path)) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open: ino={}, flags={}", ino, flags);
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={}, offset={}, size={}", ino, offset, size);

        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.read_file(&path)) {
            Ok(content) => {
                let offset = usize::try_from(offset).unwrap_or(0);
                if offset >= content.len() {
                    reply.data(&[]);
                } else {
                    let end = (offset + size as usize).min(content.len());
                    reply.data(&content[offset..end]);
                }
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("opendir: ino={}, flags={}", ino, flags);
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={}, offset={}", ino, offset);

        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let children = match self.runtime.block_on(self.vfs.read_dir(&path)) {
            Ok(children) => children,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };

        let entries = self.dir_entries(ino, children);
        for (i, (ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name_str = name.to_string_lossy();
        debug!("mkdir: parent={}, name={}, mode={:o}", parent, name_str, mode);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.mkdir(&path)) {
            Ok(()) => {
                info!("Created directory {}", path);
                self.reply_entry(parent, &path, reply);
            }
            Err(e) => {
                warn!("mkdir {} failed: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name.to_string_lossy();
        debug!("unlink: parent={}, name={}", parent, name_str);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.unlink(&path)) {
            Ok(()) => {
                let mut inodes = self.runtime.block_on(self.inodes.write());
                inodes.remove(&path);
                reply.ok();
            }
            Err(e) => {
                warn!("unlink {} failed: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name.to_string_lossy();
        debug!("rmdir: parent={}, name={}", parent, name_str);

        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.rmdir(&path)) {
            Ok(()) => {
                let mut inodes = self.runtime.block_on(self.inodes.write());
                inodes.remove(&path);
                reply.ok();
            }
            Err(e) => {
                warn!("rmdir {} failed: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename: parent={}, name={}, newparent={}, newname={}",
            parent,
            name.to_string_lossy(),
            newparent,
            newname.to_string_lossy()
        );

        let (Some(from), Some(to)) = (
            self.child_path(parent, name),
            self.child_path(newparent, newname),
        ) else {
            reply.error(ENOENT);
            return;
        };
        match self.runtime.block_on(self.vfs.rename(&from, &to)) {
            Ok(()) => {
                let mut inodes = self.runtime.block_on(self.inodes.write());
                inodes.rename(&from, &to, newparent);
                reply.ok();
            }
            Err(e) => {
                warn!("rename {} -> {} failed: {}", from, to, e);
                reply.error(e.errno());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::TAGS_DIR_INO;
    use chrono::{TimeZone, Utc};
    use tagfs_imply::Storage;
    use tagfs_store::MemoryStore;

    fn tagfs(runtime: &tokio::runtime::Runtime) -> TagFs {
        let storage = Storage::with_root(Arc::new(MemoryStore::new()), "/");
        TagFs::new(Arc::new(Vfs::new(storage, "/mnt")), runtime.handle().clone())
    }

    // ========== make_attr() Tests ==========

    #[test]
    fn test_make_attr_directory() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fs = tagfs(&runtime);
        let attr = Attr {
            kind: EntryKind::Directory,
            size: 3,
            perm: 0o755,
            mtime: None,
        };

        let file_attr = fs.make_attr(ROOT_INO, &attr);
        assert_eq!(file_attr.ino, ROOT_INO);
        assert_eq!(file_attr.kind, FileType::Directory);
        assert_eq!(file_attr.perm, 0o755);
        assert_eq!(file_attr.nlink, 2);
        assert_eq!(file_attr.size, 3);
    }

    #[test]
    fn test_make_attr_link_uses_mtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fs = tagfs(&runtime);
        let mtime = Utc.with_ymd_and_hms(2020, 5, 17, 12, 0, 0).unwrap();
        let attr = Attr {
            kind: EntryKind::Symlink,
            size: 1025,
            perm: 0o444,
            mtime: Some(mtime),
        };

        let file_attr = fs.make_attr(1000, &attr);
        assert_eq!(file_attr.kind, FileType::Symlink);
        assert_eq!(file_attr.nlink, 1);
        assert_eq!(file_attr.blocks, 3);
        assert_eq!(file_attr.mtime, SystemTime::from(mtime));
    }

    // ========== Path Tests ==========

    #[test]
    fn test_child_path_rejects_unknown_parent() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fs = tagfs(&runtime);

        assert_eq!(
            fs.child_path(ROOT_INO, OsStr::new("tags")),
            Some("tags".to_string())
        );
        assert_eq!(fs.child_path(4242, OsStr::new("tags")), None);
    }

    // ========== Listing Tests ==========

    #[test]
    fn test_listing_does_not_allocate_inodes() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fs = tagfs(&runtime);
        runtime.block_on(fs.vfs.mkdir("tags/photo")).unwrap();
        runtime.block_on(fs.vfs.mkdir("tags/music")).unwrap();

        let before = runtime.block_on(fs.inodes.read()).len();
        for _ in 0..3 {
            let children = runtime.block_on(fs.vfs.read_dir("tags")).unwrap();
            let entries = fs.dir_entries(TAGS_DIR_INO, children);
            assert!(entries.iter().any(|(ino, _, name)| name == "photo" && *ino == UNKNOWN_INO));
        }
        assert_eq!(runtime.block_on(fs.inodes.read()).len(), before);
    }

    #[test]
    fn test_listing_reuses_looked_up_inode() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fs = tagfs(&runtime);
        runtime.block_on(fs.vfs.mkdir("tags/photo")).unwrap();
        let photo = runtime
            .block_on(fs.inodes.write())
            .get_or_create("tags/photo", TAGS_DIR_INO);

        let children = runtime.block_on(fs.vfs.read_dir("tags")).unwrap();
        let entries = fs.dir_entries(TAGS_DIR_INO, children);

        assert_eq!(entries[0], (TAGS_DIR_INO, FileType::Directory, ".".to_string()));
        assert_eq!(entries[1], (ROOT_INO, FileType::Directory, "..".to_string()));
        assert!(entries.contains(&(photo, FileType::Directory, "photo".to_string())));
    }

    #[test]
    fn test_file_type_mapping() {
        assert_eq!(file_type(EntryKind::Directory), FileType::Directory);
        assert_eq!(file_type(EntryKind::Symlink), FileType::Symlink);
        assert_eq!(file_type(EntryKind::File), FileType::RegularFile);
    }
}
