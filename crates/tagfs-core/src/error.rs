//! Error types for tagfs.

use std::fmt;
use thiserror::Error;

use crate::types::{FileId, TagId, ValueId};

/// Main error type for tagfs operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A tag or value name was rejected
    #[error("invalid name: {0}")]
    Validation(#[from] ValidationError),

    /// Query text could not be parsed
    #[error("query error: {0}")]
    Query(#[from] tagfs_query::QueryError),

    /// Repository operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A named entity does not exist
    #[error("no such {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    /// Adding the implication would make the implication graph cyclic
    #[error("implication would create a cycle")]
    ImplicationCycle,

    /// The file does not carry the tagging explicitly
    #[error("file {file_id} is not explicitly tagged with tag {tag_id} (value {value_id})")]
    FileTagNotFound {
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Not-found error for a named entity.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Which kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Tag,
    Value,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Tag => f.write_str("tag name"),
            NameKind::Value => f.write_str("tag value"),
        }
    }
}

/// Tag and value name validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(NameKind),

    #[error("{0} cannot be '.' or '..'")]
    Dot(NameKind),

    #[error("{0} cannot be a logical operator: 'and', 'or' or 'not'")]
    LogicalOperator(NameKind),

    #[error("{0} cannot be a comparison operator: 'eq', 'ne', 'lt', 'gt', 'le' or 'ge'")]
    ComparisonOperator(NameKind),

    #[error("{kind} cannot contain '{character}'")]
    InvalidCharacter { kind: NameKind, character: char },

    #[error("{kind} cannot contain U+{code_point:04X}")]
    NonPrintable { kind: NameKind, code_point: u32 },
}

/// Repository errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("transaction is read-only")]
    ReadOnly,

    #[error("{kind} '{name}' already exists")]
    Duplicate { kind: &'static str, name: String },

    #[error("no such {kind}: {key}")]
    Missing { kind: &'static str, key: String },

    #[error("persistence failed: {0}")]
    Persist(String),

    #[error("invalid setting: {0}")]
    Setting(String),
}

/// Result type alias for tagfs operations.
pub type Result<T> = std::result::Result<T, Error>;
