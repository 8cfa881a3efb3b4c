//! # tagfs-core
//!
//! Core types and traits shared by every tagfs crate.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Tag`], [`Value`] | Named labels and their qualifiers |
//! | [`File`] | A tracked file |
//! | [`FileTag`] | One application of a tag to a file |
//! | [`Implication`] | A rule deriving one tag application from another |
//! | [`Settings`] | Repository settings resolved over defaults |
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`TagStore`] | Open transactions against a repository |
//! | [`Transaction`] | Row-level reads and writes |
//!
//! ## Related Crates
//!
//! - `tagfs-query`: query language
//! - `tagfs-imply`: implication closure and the tag-aware storage layer
//! - `tagfs-store`: in-memory repository with JSON persistence
//! - `tagfs-fuse`: the virtual filesystem

pub mod error;
pub mod settings;
pub mod traits;
pub mod types;
pub mod validate;

pub use error::{Error, NameKind, Result, StoreError, ValidationError};
pub use settings::Settings;
pub use traits::{TagStore, Transaction};
pub use types::*;
pub use validate::{validate_tag_name, validate_value_name};
