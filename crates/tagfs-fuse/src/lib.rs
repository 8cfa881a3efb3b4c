//! FUSE filesystem implementation for tagfs.
//!
//! This crate exposes a tag repository as a directory tree: tags become
//! directories, files become symbolic links, and queries become directories
//! named after the query text.
//!
//! # Features
//!
//! - **Tag browsing**: every tag is a directory; descending intersects tags
//! - **Values**: `=value` directories restrict the preceding tag
//! - **Implications**: a file tagged `cat` shows up under `animal` when `cat => animal`
//! - **Queries**: `queries/<text>` lists the files matching any query
//! - **Editing**: `mkdir`, `mv`, `rmdir` and `rm` create, rename, delete and untag
//!
//! # Virtual Directory Structure
//!
//! ```text
//! /mountpoint/
//! ├── .database                  # Link to the repository file
//! ├── tags/
//! │   ├── README.md              # Help, until a few tags exist
//! │   └── photo/
//! │       ├── holiday/           # photo and holiday
//! │       ├── year/
//! │       │   └── =2019/         # photo and year = 2019
//! │       └── files/
//! │           └── beach.12.jpg   # -> ../../../../home/me/beach.jpg
//! └── queries/
//!     ├── README.md              # Help, until a query is saved
//!     └── photo and not holiday/
//!         └── cat.3.jpg
//! ```
//!
//! # Basic Usage
//!
//! ```bash
//! # Mount the filesystem
//! tagfs mount ~/tags -f
//!
//! # Browse
//! ls ~/tags/tags/photo/holiday/files
//! ls "~/tags/queries/photo and year > 2018"
//!
//! # Untag a file
//! rm ~/tags/tags/photo/files/beach.12.jpg
//! ```
//!
//! # Rust API Example
//!
//! ```rust,ignore
//! use tagfs_fuse::{TagFs, Vfs};
//!
//! let vfs = Arc::new(Vfs::new(storage, &mountpoint));
//! let fs = TagFs::new(vfs, runtime.handle().clone());
//! fuser::mount2(fs, mountpoint, &options)?;
//! ```

pub mod error;
pub mod escape;
pub mod filesystem;
pub mod inode;
pub mod link;
pub mod vfs;

pub use error::{VfsError, VfsResult};
pub use escape::{escape, unescape};
pub use filesystem::TagFs;
pub use inode::{InodeEntry, InodeTable};
pub use link::{make_link_name, parse_file_id};
pub use vfs::{Attr, DirEntry, EntryKind, Vfs};
