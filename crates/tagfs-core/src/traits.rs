//! Repository traits.
//!
//! - [`TagStore`]: opens transactions against a backing store
//! - [`Transaction`]: row-level reads and writes within one transaction
//!
//! Transactions are the only way to touch tag state. Callers open one per
//! unit of work and either [`Transaction::commit`] it or let it go; a
//! transaction dropped without commit is rolled back.

use async_trait::async_trait;
use std::path::Path;
use tagfs_query::Expression;

use crate::error::StoreError;
use crate::types::{
    File, FileId, FileSort, FileTag, Implication, NewFile, QueryOptions, SavedQuery, Setting, Tag,
    TagId, TagValuePair, Value, ValueId,
};

// ============================================================================
// Store
// ============================================================================

/// A transactional tag repository.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Where the repository lives (a file path, or a pseudo path such as `:memory:`).
    fn location(&self) -> &Path;

    /// Begin a read-write transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// Begin a read-only transaction.
    async fn begin_read(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// Flush and release resources.
    async fn close(&self) -> Result<(), StoreError>;
}

// ============================================================================
// Transaction
// ============================================================================

/// Row access within one transaction.
///
/// Lookups return `Ok(None)` for absent rows. Deleting or renaming an absent
/// row is [`StoreError::Missing`]; inserting a duplicate name is
/// [`StoreError::Duplicate`]. Writes on a read-only transaction are
/// [`StoreError::ReadOnly`].
#[async_trait]
pub trait Transaction: Send {
    /// Make this transaction's writes visible.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard this transaction's writes.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;

    // ---- tags ----

    async fn tag_count(&mut self) -> Result<u64, StoreError>;

    /// All tags, ordered by name.
    async fn tags(&mut self) -> Result<Vec<Tag>, StoreError>;

    async fn tag(&mut self, id: TagId) -> Result<Option<Tag>, StoreError>;

    async fn tag_by_name(&mut self, name: &str, ignore_case: bool)
    -> Result<Option<Tag>, StoreError>;

    /// Tags matching any of `names`; unknown names are skipped.
    async fn tags_by_names(
        &mut self,
        names: &[String],
        ignore_case: bool,
    ) -> Result<Vec<Tag>, StoreError>;

    async fn insert_tag(&mut self, name: &str) -> Result<Tag, StoreError>;

    async fn rename_tag(&mut self, id: TagId, name: &str) -> Result<Tag, StoreError>;

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StoreError>;

    // ---- values ----

    async fn value_count(&mut self) -> Result<u64, StoreError>;

    /// All values, ordered by name.
    async fn values(&mut self) -> Result<Vec<Value>, StoreError>;

    async fn value(&mut self, id: ValueId) -> Result<Option<Value>, StoreError>;

    async fn value_by_name(
        &mut self,
        name: &str,
        ignore_case: bool,
    ) -> Result<Option<Value>, StoreError>;

    async fn values_by_names(
        &mut self,
        names: &[String],
        ignore_case: bool,
    ) -> Result<Vec<Value>, StoreError>;

    /// Values applied together with `tag_id` on any file, ordered by name.
    async fn values_by_tag(&mut self, tag_id: TagId) -> Result<Vec<Value>, StoreError>;

    async fn insert_value(&mut self, name: &str) -> Result<Value, StoreError>;

    async fn rename_value(&mut self, id: ValueId, name: &str) -> Result<Value, StoreError>;

    async fn delete_value(&mut self, id: ValueId) -> Result<(), StoreError>;

    // ---- files ----

    async fn file_count(&mut self) -> Result<u64, StoreError>;

    async fn files(&mut self, sort: FileSort) -> Result<Vec<File>, StoreError>;

    async fn file(&mut self, id: FileId) -> Result<Option<File>, StoreError>;

    async fn file_by_path(
        &mut self,
        directory: &str,
        name: &str,
    ) -> Result<Option<File>, StoreError>;

    async fn files_by_fingerprint(&mut self, fingerprint: &str) -> Result<Vec<File>, StoreError>;

    async fn insert_file(&mut self, file: NewFile) -> Result<File, StoreError>;

    async fn update_file(&mut self, file: File) -> Result<File, StoreError>;

    async fn delete_file(&mut self, id: FileId) -> Result<(), StoreError>;

    /// Files whose explicit taggings satisfy `expression`.
    ///
    /// Implications are not consulted here; callers wanting derived tags
    /// expand the expression first.
    async fn files_for_query(
        &mut self,
        expression: &Expression,
        options: &QueryOptions,
    ) -> Result<Vec<File>, StoreError>;

    // ---- file tags ----

    async fn file_tag_count(&mut self) -> Result<u64, StoreError>;

    async fn file_tags(&mut self) -> Result<Vec<FileTag>, StoreError>;

    async fn file_tags_by_file_id(&mut self, file_id: FileId)
    -> Result<Vec<FileTag>, StoreError>;

    async fn file_tags_by_tag_id(&mut self, tag_id: TagId) -> Result<Vec<FileTag>, StoreError>;

    async fn file_tags_by_value_id(
        &mut self,
        value_id: ValueId,
    ) -> Result<Vec<FileTag>, StoreError>;

    async fn file_tag_exists(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<bool, StoreError>;

    async fn insert_file_tag(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<FileTag, StoreError>;

    async fn delete_file_tag(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<(), StoreError>;

    async fn delete_file_tags_by_file_id(&mut self, file_id: FileId) -> Result<(), StoreError>;

    async fn delete_file_tags_by_tag_id(&mut self, tag_id: TagId) -> Result<(), StoreError>;

    async fn delete_file_tags_by_value_id(&mut self, value_id: ValueId)
    -> Result<(), StoreError>;

    // ---- implications ----

    /// All implications, ordered by implying then implied names.
    async fn implications(&mut self) -> Result<Vec<Implication>, StoreError>;

    /// Direct implications whose implying side matches one of `pairs`.
    ///
    /// A rule matches a pair when the tags agree and the rule's implying value
    /// is either "any" or the pair's value.
    async fn implications_for(
        &mut self,
        pairs: &[TagValuePair],
    ) -> Result<Vec<Implication>, StoreError>;

    /// Direct implications whose implied side matches one of `pairs`.
    ///
    /// A rule matches a pair when the tags agree and the pair's value is
    /// either "any" or the rule's implied value.
    async fn implications_implying(
        &mut self,
        pairs: &[TagValuePair],
    ) -> Result<Vec<Implication>, StoreError>;

    async fn insert_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<(), StoreError>;

    async fn delete_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<(), StoreError>;

    /// Remove every implication mentioning the tag on either side.
    async fn delete_implications_by_tag_id(&mut self, tag_id: TagId) -> Result<(), StoreError>;

    /// Remove every implication mentioning the value on either side.
    async fn delete_implications_by_value_id(
        &mut self,
        value_id: ValueId,
    ) -> Result<(), StoreError>;

    // ---- queries ----

    /// Saved queries, ordered by text.
    async fn queries(&mut self) -> Result<Vec<SavedQuery>, StoreError>;

    async fn query(&mut self, text: &str) -> Result<Option<SavedQuery>, StoreError>;

    async fn insert_query(&mut self, text: &str) -> Result<SavedQuery, StoreError>;

    async fn delete_query(&mut self, text: &str) -> Result<(), StoreError>;

    // ---- settings ----

    /// Stored setting overrides.
    async fn settings(&mut self) -> Result<Vec<Setting>, StoreError>;

    async fn update_setting(&mut self, name: &str, value: &str) -> Result<(), StoreError>;
}
