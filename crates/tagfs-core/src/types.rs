//! Core entities.
//!
//! ## Rows
//! - [`Tag`], [`Value`]: named labels and their optional qualifiers
//! - [`File`]: a tracked file or directory
//! - [`FileTag`]: one application of a tag (and value) to a file
//! - [`Implication`]: a rule deriving one tag application from another
//! - [`SavedQuery`], [`Setting`]
//!
//! ## Query plumbing
//! - [`TagValuePair`]: the `(tag, value)` identity closures are computed over
//! - [`QueryOptions`], [`FileSort`]: evaluation options for repository queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Tag identifier.
    TagId
);
id_type!(
    /// Value identifier; `0` means "no value" on a file-tag and "any value" on an implication.
    ValueId
);
id_type!(
    /// File identifier, embedded in link names.
    FileId
);

impl ValueId {
    /// The absent / wildcard value.
    pub const NONE: ValueId = ValueId(0);

    #[must_use]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

// ============================================================================
// Tags and values
// ============================================================================

/// A named label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// A named qualifier attached to a particular application of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub id: ValueId,
    pub name: String,
}

// ============================================================================
// Files
// ============================================================================

/// Fields of a file that is about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFile {
    /// Containing directory, relative to the repository root when beneath it
    pub directory: String,
    /// Final path component
    pub name: String,
    /// Content fingerprint (empty when not computed)
    pub fingerprint: String,
    /// Last modification time
    pub mod_time: DateTime<Utc>,
    /// Size in bytes
    pub size: u64,
    /// Whether the path is a directory
    pub is_dir: bool,
}

/// A tracked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub directory: String,
    pub name: String,
    pub fingerprint: String,
    pub mod_time: DateTime<Utc>,
    pub size: u64,
    pub is_dir: bool,
}

impl File {
    #[must_use]
    pub fn from_new(id: FileId, file: NewFile) -> Self {
        Self {
            id,
            directory: file.directory,
            name: file.name,
            fingerprint: file.fingerprint,
            mod_time: file.mod_time,
            size: file.size,
            is_dir: file.is_dir,
        }
    }

    /// `directory/name`.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        Path::new(&self.directory).join(&self.name)
    }
}

// ============================================================================
// Taggings
// ============================================================================

/// The `(tag, value)` identity of a tag application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagValuePair {
    pub tag_id: TagId,
    pub value_id: ValueId,
}

impl TagValuePair {
    #[must_use]
    pub fn new(tag_id: TagId, value_id: ValueId) -> Self {
        Self { tag_id, value_id }
    }

    /// A pair with no value.
    #[must_use]
    pub fn tag(tag_id: TagId) -> Self {
        Self::new(tag_id, ValueId::NONE)
    }
}

/// One application of a tag to a file.
///
/// `explicit` marks a stored, user-applied row. `implicit` marks a row that
/// is also reachable through implications. A row synthesized purely from
/// implications is `explicit == false, implicit == true` and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTag {
    pub file_id: FileId,
    pub tag_id: TagId,
    pub value_id: ValueId,
    pub explicit: bool,
    pub implicit: bool,
}

impl FileTag {
    /// A stored, user-applied tagging.
    #[must_use]
    pub fn explicit(file_id: FileId, tag_id: TagId, value_id: ValueId) -> Self {
        Self {
            file_id,
            tag_id,
            value_id,
            explicit: true,
            implicit: false,
        }
    }

    #[must_use]
    pub fn pair(&self) -> TagValuePair {
        TagValuePair::new(self.tag_id, self.value_id)
    }
}

/// A rule: applying the implying pair also counts as applying the implied pair.
///
/// A `None` value on the implying side matches any value (or none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implication {
    pub implying_tag: Tag,
    pub implying_value: Option<Value>,
    pub implied_tag: Tag,
    pub implied_value: Option<Value>,
}

impl Implication {
    #[must_use]
    pub fn implying_pair(&self) -> TagValuePair {
        TagValuePair::new(self.implying_tag.id, value_id_of(self.implying_value.as_ref()))
    }

    #[must_use]
    pub fn implied_pair(&self) -> TagValuePair {
        TagValuePair::new(self.implied_tag.id, value_id_of(self.implied_value.as_ref()))
    }
}

fn value_id_of(value: Option<&Value>) -> ValueId {
    value.map_or(ValueId::NONE, |v| v.id)
}

impl fmt::Display for Implication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.implying_tag.name)?;
        if let Some(value) = &self.implying_value {
            write!(f, "={}", value.name)?;
        }
        write!(f, " => {}", self.implied_tag.name)?;
        if let Some(value) = &self.implied_value {
            write!(f, "={}", value.name)?;
        }
        Ok(())
    }
}

// ============================================================================
// Queries and settings
// ============================================================================

/// Query text that has been materialized as a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SavedQuery {
    pub text: String,
}

/// A stored override of a repository setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

/// Result ordering for file queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSort {
    #[default]
    None,
    Id,
    Name,
    Time,
    Size,
}

/// Options for evaluating a query expression against the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Restrict results to this stored path or files beneath it
    pub path: Option<String>,
    /// Compare tag and value names case-insensitively
    pub ignore_case: bool,
    /// Result ordering
    pub sort: FileSort,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: u32, name: &str) -> Tag {
        Tag {
            id: TagId(id),
            name: name.to_string(),
        }
    }

    // ========== Id Tests ==========

    #[test]
    fn test_value_id_none() {
        assert!(ValueId::NONE.is_none());
        assert!(!ValueId(3).is_none());
        assert_eq!(ValueId::default(), ValueId::NONE);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&TagId(42)).unwrap();
        assert_eq!(json, "42");
    }

    // ========== File Tests ==========

    #[test]
    fn test_file_path_joins_directory_and_name() {
        let file = File::from_new(
            FileId(1),
            NewFile {
                directory: "photos/2020".to_string(),
                name: "beach.jpg".to_string(),
                fingerprint: String::new(),
                mod_time: Utc::now(),
                size: 10,
                is_dir: false,
            },
        );
        assert_eq!(file.path(), PathBuf::from("photos/2020/beach.jpg"));
    }

    // ========== Implication Tests ==========

    #[test]
    fn test_implication_pairs_use_none_for_any() {
        let implication = Implication {
            implying_tag: tag(1, "cat"),
            implying_value: None,
            implied_tag: tag(2, "animal"),
            implied_value: Some(Value {
                id: ValueId(7),
                name: "mammal".to_string(),
            }),
        };
        assert_eq!(implication.implying_pair(), TagValuePair::tag(TagId(1)));
        assert_eq!(
            implication.implied_pair(),
            TagValuePair::new(TagId(2), ValueId(7))
        );
        assert_eq!(implication.to_string(), "cat => animal=mammal");
    }

    #[test]
    fn test_file_tag_explicit_constructor() {
        let file_tag = FileTag::explicit(FileId(1), TagId(2), ValueId::NONE);
        assert!(file_tag.explicit);
        assert!(!file_tag.implicit);
        assert_eq!(file_tag.pair(), TagValuePair::tag(TagId(2)));
    }
}
