//! # tagfs-store
//!
//! Transactional tag repository for tagfs.
//!
//! [`MemoryStore`] holds tags, values, files, taggings, implications, saved
//! queries and settings in memory. When opened from a path it rewrites a
//! pretty-printed JSON file on every commit.
//!
//! Query evaluation over the stored taggings lives here too; implication
//! expansion happens one layer up in `tagfs-imply`.

mod eval;
pub mod memory;
mod state;

pub use memory::{MEMORY_LOCATION, MemoryStore, MemoryTransaction};
