//! # tagfs-imply
//!
//! Implication closure and the tag-aware storage layer.
//!
//! An implication `cat => animal` means a file tagged `cat` also counts as
//! tagged `animal`. This crate computes closures over those rules, rewrites
//! queries so implied tags match, and wraps a raw repository in [`Storage`],
//! whose [`Tx`] enforces validation, cascades and cycle checks.
//!
//! ## Example
//!
//! ```rust,ignore
//! let storage = Storage::new(Arc::new(MemoryStore::new()));
//! let mut tx = storage.begin().await?;
//! let cat = tx.add_tag("cat").await?;
//! let animal = tx.add_tag("animal").await?;
//! tx.add_implication(TagValuePair::tag(cat.id), TagValuePair::tag(animal.id)).await?;
//! tx.commit().await?;
//! ```

pub mod closure;
pub mod expand;
pub mod storage;

pub use closure::{add_implied_file_tags, implications_for, implications_implying, implies, would_cycle};
pub use expand::{expand_implications, rewrite};
pub use storage::{REPOSITORY_DIR, Storage, Tx};
