//! Inode numbers for driver paths.
//!
//! The table only names paths. Everything else about an entry is asked of
//! the [`Vfs`](crate::Vfs) each time.

use std::collections::HashMap;

use crate::vfs::{DATABASE_NAME, QUERIES_DIR, TAGS_DIR};

/// Reserved inode numbers.
pub const ROOT_INO: u64 = 1;
pub const TAGS_DIR_INO: u64 = 2;
pub const QUERIES_DIR_INO: u64 = 3;
pub const DATABASE_INO: u64 = 4;
pub const FIRST_DYNAMIC_INO: u64 = 1000;

/// Inode reported in listings for entries not looked up yet.
pub const UNKNOWN_INO: u64 = 0xffff_ffff;

/// Entry in the inode table.
#[derive(Debug, Clone)]
pub struct InodeEntry {
    /// Inode number
    pub ino: u64,
    /// Driver path, `""` for the root
    pub path: String,
    /// Parent inode
    pub parent: u64,
    /// Lookup count (for FUSE reference counting)
    pub lookup_count: u64,
}

/// Bidirectional map between inode numbers and driver paths.
pub struct InodeTable {
    /// Inode number -> entry
    inodes: HashMap<u64, InodeEntry>,
    /// Path -> inode
    path_to_ino: HashMap<String, u64>,
    /// Next available inode
    next_ino: u64,
}

impl InodeTable {
    /// Create a table holding the reserved inodes.
    pub fn new() -> Self {
        let mut table = Self {
            inodes: HashMap::new(),
            path_to_ino: HashMap::new(),
            next_ino: FIRST_DYNAMIC_INO,
        };
        table.insert(ROOT_INO, String::new(), ROOT_INO);
        table.insert(TAGS_DIR_INO, TAGS_DIR.to_string(), ROOT_INO);
        table.insert(QUERIES_DIR_INO, QUERIES_DIR.to_string(), ROOT_INO);
        table.insert(DATABASE_INO, DATABASE_NAME.to_string(), ROOT_INO);
        table
    }

    fn insert(&mut self, ino: u64, path: String, parent: u64) {
        self.path_to_ino.insert(path.clone(), ino);
        self.inodes.insert(
            ino,
            InodeEntry {
                ino,
                path,
                parent,
                lookup_count: 0,
            },
        );
    }

    /// Get an entry by inode number.
    pub fn get(&self, ino: u64) -> Option<&InodeEntry> {
        self.inodes.get(&ino)
    }

    /// Path of an inode.
    pub fn path(&self, ino: u64) -> Option<&str> {
        self.inodes.get(&ino).map(|entry| entry.path.as_str())
    }

    /// Inode of a path, if one has been handed out.
    pub fn get_by_path(&self, path: &str) -> Option<u64> {
        self.path_to_ino.get(path).copied()
    }

    /// Path of `name` inside the directory `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let dir = self.path(parent)?;
        Some(if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        })
    }

    /// Get or allocate the inode for `path`.
    pub fn get_or_create(&mut self, path: &str, parent: u64) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        self.insert(ino, path.to_string(), parent);
        ino
    }

    /// Increment lookup count.
    pub fn lookup(&mut self, ino: u64) {
        if let Some(entry) = self.inodes.get_mut(&ino) {
            entry.lookup_count += 1;
        }
    }

    /// Decrement lookup count; dynamic inodes go once nothing references them.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        let Some(entry) = self.inodes.get_mut(&ino) else {
            return;
        };
        entry.lookup_count = entry.lookup_count.saturating_sub(nlookup);

        if entry.lookup_count == 0 && ino >= FIRST_DYNAMIC_INO {
            let path = entry.path.clone();
            self.inodes.remove(&ino);
            if self.path_to_ino.get(&path) == Some(&ino) {
                self.path_to_ino.remove(&path);
            }
        }
    }

    /// Drop the path mapping of a removed entry.
    ///
    /// The inode itself stays valid until the kernel forgets it.
    pub fn remove(&mut self, path: &str) {
        self.path_to_ino.remove(path);
    }

    /// Move `from` and everything beneath it to `to`.
    pub fn rename(&mut self, from: &str, to: &str, new_parent: u64) {
        let prefix = format!("{from}/");
        let moved: Vec<u64> = self
            .inodes
            .values()
            .filter(|entry| entry.path == from || entry.path.starts_with(&prefix))
            .map(|entry| entry.ino)
            .collect();

        for ino in moved {
            let Some(entry) = self.inodes.get_mut(&ino) else {
                continue;
            };
            let new_path = format!("{to}{}", &entry.path[from.len()..]);
            if entry.path == from {
                entry.parent = new_parent;
            }
            self.path_to_ino.remove(&entry.path);
            self.path_to_ino.insert(new_path.clone(), ino);
            entry.path = new_path;
        }
    }

    /// Number of live inodes, reserved ones included.
    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    /// Always false: the reserved inodes are never removed.
    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    /// Check if an inode is one of the reserved ones.
    pub fn is_reserved(ino: u64) -> bool {
        ino < FIRST_DYNAMIC_INO
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
