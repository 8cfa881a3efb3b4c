//! Tag-aware storage layer.
//!
//! [`Storage`] wraps any [`TagStore`] and hands out [`Tx`] handles that apply
//! the rules the raw repository knows nothing about: name validation,
//! implication closure, cascading deletes, cycle checks and the mapping
//! between stored relative paths and absolute ones.

use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tagfs_core::{
    Error, File, FileId, FileSort, FileTag, Implication, NewFile, QueryOptions, Result,
    SavedQuery, Settings, Tag, TagId, TagStore, TagValuePair, Transaction, Value, ValueId,
    validate_tag_name, validate_value_name,
};
use tagfs_query::Expression;
use tracing::{debug, info};

use crate::closure;
use crate::expand::expand_implications;

/// Name of the directory that marks a repository root.
pub const REPOSITORY_DIR: &str = ".tagfs";

/// A repository plus the root its relative paths are resolved against.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn TagStore>,
    root: PathBuf,
}

impl Storage {
    /// Wrap `store`, deriving the root from its location.
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        let root = determine_root(store.location());
        debug!("Storage root for {:?} is {:?}", store.location(), root);
        Self { store, root }
    }

    /// Wrap `store` with an explicit root.
    pub fn with_root(store: Arc<dyn TagStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Location of the backing repository.
    pub fn location(&self) -> &Path {
        self.store.location()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Begin a read-write transaction.
    pub async fn begin(&self) -> Result<Tx> {
        Ok(Tx {
            inner: self.store.begin().await?,
            root: self.root.clone(),
        })
    }

    /// Begin a read-only transaction.
    pub async fn begin_read(&self) -> Result<Tx> {
        Ok(Tx {
            inner: self.store.begin_read().await?,
            root: self.root.clone(),
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }
}

/// The parent of a `.tagfs` directory holding the database, else `/`.
fn determine_root(location: &Path) -> PathBuf {
    let absolute = std::path::absolute(location).unwrap_or_else(|_| location.to_path_buf());
    match absolute.parent() {
        Some(dir) if dir.file_name().is_some_and(|name| name == REPOSITORY_DIR) => dir
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf),
        _ => PathBuf::from("/"),
    }
}

/// Lexically normalize `path`, resolving `.` and `..` without touching disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// An open transaction with tag semantics.
///
/// Dropping a `Tx` without calling [`Tx::commit`] discards its changes.
pub struct Tx {
    inner: Box<dyn Transaction>,
    root: PathBuf,
}

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await?;
        Ok(())
    }

    /// Raw access to the underlying repository transaction.
    pub fn raw(&mut self) -> &mut dyn Transaction {
        self.inner.as_mut()
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub async fn tag_count(&mut self) -> Result<u64> {
        Ok(self.inner.tag_count().await?)
    }

    /// All tags, ordered by name.
    pub async fn tags(&mut self) -> Result<Vec<Tag>> {
        Ok(self.inner.tags().await?)
    }

    pub async fn tag(&mut self, id: TagId) -> Result<Option<Tag>> {
        Ok(self.inner.tag(id).await?)
    }

    pub async fn tag_by_name(&mut self, name: &str) -> Result<Option<Tag>> {
        Ok(self.inner.tag_by_name(name, false).await?)
    }

    pub async fn tags_by_names(&mut self, names: &[String]) -> Result<Vec<Tag>> {
        Ok(self.inner.tags_by_names(names, false).await?)
    }

    /// Create a tag after validating its name.
    pub async fn add_tag(&mut self, name: &str) -> Result<Tag> {
        validate_tag_name(name)?;
        let tag = self.inner.insert_tag(name).await?;
        info!("Created tag '{}'", tag.name);
        Ok(tag)
    }

    pub async fn rename_tag(&mut self, id: TagId, name: &str) -> Result<Tag> {
        validate_tag_name(name)?;
        let tag = self.inner.rename_tag(id, name).await?;
        info!("Renamed tag {} to '{}'", id, tag.name);
        Ok(tag)
    }

    /// Delete a tag with its taggings and implications.
    ///
    /// Files left without any tagging are deleted as well.
    pub async fn delete_tag(&mut self, id: TagId) -> Result<()> {
        let file_ids = file_ids(&self.inner.file_tags_by_tag_id(id).await?);
        self.inner.delete_file_tags_by_tag_id(id).await?;
        self.delete_untagged_files(&file_ids).await?;
        self.inner.delete_implications_by_tag_id(id).await?;
        self.inner.delete_tag(id).await?;
        info!("Deleted tag {}", id);
        Ok(())
    }

    // ========================================================================
    // Values
    // ========================================================================

    pub async fn value_count(&mut self) -> Result<u64> {
        Ok(self.inner.value_count().await?)
    }

    pub async fn values(&mut self) -> Result<Vec<Value>> {
        Ok(self.inner.values().await?)
    }

    pub async fn value(&mut self, id: ValueId) -> Result<Option<Value>> {
        Ok(self.inner.value(id).await?)
    }

    pub async fn value_by_name(&mut self, name: &str) -> Result<Option<Value>> {
        Ok(self.inner.value_by_name(name, false).await?)
    }

    /// Values applied to `tag_id` on any file, ordered by name.
    pub async fn values_by_tag(&mut self, tag_id: TagId) -> Result<Vec<Value>> {
        Ok(self.inner.values_by_tag(tag_id).await?)
    }

    pub async fn add_value(&mut self, name: &str) -> Result<Value> {
        validate_value_name(name)?;
        let value = self.inner.insert_value(name).await?;
        info!("Created value '{}'", value.name);
        Ok(value)
    }

    pub async fn rename_value(&mut self, id: ValueId, name: &str) -> Result<Value> {
        validate_value_name(name)?;
        Ok(self.inner.rename_value(id, name).await?)
    }

    /// Delete a value with its taggings and implications.
    pub async fn delete_value(&mut self, id: ValueId) -> Result<()> {
        let file_ids = file_ids(&self.inner.file_tags_by_value_id(id).await?);
        self.inner.delete_file_tags_by_value_id(id).await?;
        self.delete_untagged_files(&file_ids).await?;
        self.inner.delete_implications_by_value_id(id).await?;
        self.inner.delete_value(id).await?;
        info!("Deleted value {}", id);
        Ok(())
    }

    /// Resolve `tag[=value]` names to ids, creating them when `settings` allow.
    pub async fn resolve_pair(
        &mut self,
        tag_name: &str,
        value_name: Option<&str>,
        settings: &Settings,
    ) -> Result<TagValuePair> {
        let tag = match self.tag_by_name(tag_name).await? {
            Some(tag) => tag,
            None if settings.auto_create_tags => self.add_tag(tag_name).await?,
            None => return Err(Error::not_found("tag", tag_name)),
        };

        let value_id = match value_name {
            None => ValueId::NONE,
            Some(name) => match self.value_by_name(name).await? {
                Some(value) => value.id,
                None if settings.auto_create_values => self.add_value(name).await?.id,
                None => return Err(Error::not_found("value", name)),
            },
        };

        Ok(TagValuePair::new(tag.id, value_id))
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub async fn file_count(&mut self) -> Result<u64> {
        Ok(self.inner.file_count().await?)
    }

    pub async fn files(&mut self, sort: FileSort) -> Result<Vec<File>> {
        let files = self.inner.files(sort).await?;
        Ok(self.absolute_files(files))
    }

    pub async fn file(&mut self, id: FileId) -> Result<Option<File>> {
        let file = self.inner.file(id).await?;
        Ok(file.map(|f| self.absolute(f)))
    }

    pub async fn file_by_path(&mut self, path: &Path) -> Result<Option<File>> {
        let (directory, name) = self.relative(path);
        let file = self.inner.file_by_path(&directory, &name).await?;
        Ok(file.map(|f| self.absolute(f)))
    }

    /// Record a file; content fingerprints are not computed.
    pub async fn add_file(
        &mut self,
        path: &Path,
        mod_time: DateTime<Utc>,
        size: u64,
        is_dir: bool,
    ) -> Result<File> {
        let (directory, name) = self.relative(path);
        let file = self
            .inner
            .insert_file(NewFile {
                directory,
                name,
                fingerprint: String::new(),
                mod_time,
                size,
                is_dir,
            })
            .await?;
        info!("Added file {} {:?}", file.id, path);
        Ok(self.absolute(file))
    }

    /// Delete the file if it no longer carries any explicit tagging.
    pub async fn delete_file_if_untagged(&mut self, id: FileId) -> Result<()> {
        if self.inner.file_tags_by_file_id(id).await?.is_empty()
            && self.inner.file(id).await?.is_some()
        {
            self.inner.delete_file(id).await?;
            debug!("Deleted untagged file {}", id);
        }
        Ok(())
    }

    async fn delete_untagged_files(&mut self, ids: &[FileId]) -> Result<()> {
        for id in ids {
            self.delete_file_if_untagged(*id).await?;
        }
        Ok(())
    }

    /// Files matching `expression`, optionally beneath `path`.
    ///
    /// Unless `explicit_only` is set, bare tag constraints also match files
    /// carrying any tag that implies them.
    pub async fn files_for_query(
        &mut self,
        expression: &Expression,
        path: Option<&Path>,
        explicit_only: bool,
        ignore_case: bool,
        sort: FileSort,
    ) -> Result<Vec<File>> {
        let expression = if explicit_only {
            expression.clone()
        } else {
            expand_implications(self.inner.as_mut(), expression, ignore_case).await?
        };

        // a filter above the root also covers every relative path
        let path = path.map(normalize);
        let covers_root = path.as_ref().is_some_and(|p| self.root.starts_with(p));
        let options = QueryOptions {
            path: match &path {
                Some(p) if !covers_root => Some(self.relative_path(p)),
                _ => None,
            },
            ignore_case,
            sort,
        };

        let files = self.inner.files_for_query(&expression, &options).await?;
        let mut files = self.absolute_files(files);
        if let Some(p) = path.as_ref().filter(|_| covers_root) {
            files.retain(|f| f.path().starts_with(p));
        }
        Ok(files)
    }

    fn relative_path(&self, path: &Path) -> String {
        if self.root != Path::new("/") {
            if let Ok(rest) = path.strip_prefix(&self.root) {
                return if rest.as_os_str().is_empty() {
                    ".".to_string()
                } else {
                    rest.to_string_lossy().into_owned()
                };
            }
        }
        path.to_string_lossy().into_owned()
    }

    /// Split `path` into the stored `(directory, name)` form.
    fn relative(&self, path: &Path) -> (String, String) {
        let path = normalize(path);
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        let directory = path
            .parent()
            .map_or_else(|| "/".to_string(), |dir| self.relative_path(dir));
        (directory, name)
    }

    fn absolute(&self, mut file: File) -> File {
        if !file.directory.starts_with('/') {
            file.directory = normalize(&self.root.join(&file.directory))
                .to_string_lossy()
                .into_owned();
        }
        file
    }

    fn absolute_files(&self, files: Vec<File>) -> Vec<File> {
        files.into_iter().map(|f| self.absolute(f)).collect()
    }

    // ========================================================================
    // File tags
    // ========================================================================

    /// Tags applied to a file, including implied ones unless `explicit_only`.
    pub async fn file_tags_by_file_id(
        &mut self,
        file_id: FileId,
        explicit_only: bool,
    ) -> Result<Vec<FileTag>> {
        let stored = self.inner.file_tags_by_file_id(file_id).await?;
        if explicit_only {
            return Ok(stored);
        }
        Ok(closure::add_implied_file_tags(self.inner.as_mut(), stored).await?)
    }

    /// Number of files carrying the tag, directly or through an implication.
    pub async fn file_count_by_tag_id(&mut self, tag_id: TagId, explicit_only: bool) -> Result<u64> {
        let mut ids = file_ids(&self.inner.file_tags_by_tag_id(tag_id).await?);

        if !explicit_only {
            let implying =
                closure::implications_implying(self.inner.as_mut(), &[TagValuePair::tag(tag_id)])
                    .await?;
            for implication in implying {
                let pair = implication.implying_pair();
                for file_tag in self.inner.file_tags_by_tag_id(pair.tag_id).await? {
                    if pair.value_id.is_none() || file_tag.value_id == pair.value_id {
                        ids.push(file_tag.file_id);
                    }
                }
            }
            ids.sort();
            ids.dedup();
        }

        Ok(ids.len() as u64)
    }

    pub async fn file_tag_exists(
        &mut self,
        file_id: FileId,
        pair: TagValuePair,
        explicit_only: bool,
    ) -> Result<bool> {
        if explicit_only {
            return Ok(self
                .inner
                .file_tag_exists(file_id, pair.tag_id, pair.value_id)
                .await?);
        }
        let tags = self.file_tags_by_file_id(file_id, false).await?;
        Ok(tags.iter().any(|ft| ft.pair() == pair))
    }

    pub async fn add_file_tag(&mut self, file_id: FileId, pair: TagValuePair) -> Result<FileTag> {
        Ok(self
            .inner
            .insert_file_tag(file_id, pair.tag_id, pair.value_id)
            .await?)
    }

    /// Remove an explicit tagging; the file goes too once it is untagged.
    pub async fn delete_file_tag(&mut self, file_id: FileId, pair: TagValuePair) -> Result<()> {
        if !self
            .inner
            .file_tag_exists(file_id, pair.tag_id, pair.value_id)
            .await?
        {
            return Err(Error::FileTagNotFound {
                file_id,
                tag_id: pair.tag_id,
                value_id: pair.value_id,
            });
        }

        self.inner
            .delete_file_tag(file_id, pair.tag_id, pair.value_id)
            .await?;
        self.delete_file_if_untagged(file_id).await?;
        info!("Untagged file {} ({}:{})", file_id, pair.tag_id, pair.value_id);
        Ok(())
    }

    /// Apply `pairs` to a file, skipping any that would be redundant.
    ///
    /// A pair is skipped when the file already carries it, explicitly or by
    /// implication, or when another pair in `pairs` implies it. Returns the
    /// pairs actually stored.
    pub async fn apply_tags(
        &mut self,
        file_id: FileId,
        pairs: &[TagValuePair],
    ) -> Result<Vec<TagValuePair>> {
        let existing = self.file_tags_by_file_id(file_id, false).await?;
        let implied = closure::implications_for(self.inner.as_mut(), pairs).await?;

        let mut applied = Vec::new();
        for pair in pairs {
            if existing.iter().any(|ft| ft.pair() == *pair)
                || closure::implies(&implied, *pair)
                || applied.contains(pair)
            {
                debug!("Skipping redundant tagging {}:{}", pair.tag_id, pair.value_id);
                continue;
            }
            self.add_file_tag(file_id, *pair).await?;
            applied.push(*pair);
        }

        Ok(applied)
    }

    // ========================================================================
    // Implications
    // ========================================================================

    pub async fn implications(&mut self) -> Result<Vec<Implication>> {
        Ok(self.inner.implications().await?)
    }

    /// Transitive closure of what `pairs` imply.
    pub async fn implications_for(&mut self, pairs: &[TagValuePair]) -> Result<Vec<Implication>> {
        Ok(closure::implications_for(self.inner.as_mut(), pairs).await?)
    }

    /// Transitive closure of what implies `pairs`.
    pub async fn implications_implying(
        &mut self,
        pairs: &[TagValuePair],
    ) -> Result<Vec<Implication>> {
        Ok(closure::implications_implying(self.inner.as_mut(), pairs).await?)
    }

    /// Add `implying => implied`, refusing anything that closes a cycle.
    pub async fn add_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<()> {
        if closure::would_cycle(self.inner.as_mut(), implying, implied).await? {
            return Err(Error::ImplicationCycle);
        }
        self.inner.insert_implication(implying, implied).await?;
        info!(
            "Added implication {}:{} => {}:{}",
            implying.tag_id, implying.value_id, implied.tag_id, implied.value_id
        );
        Ok(())
    }

    pub async fn delete_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<()> {
        self.inner.delete_implication(implying, implied).await?;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn queries(&mut self) -> Result<Vec<SavedQuery>> {
        Ok(self.inner.queries().await?)
    }

    pub async fn query(&mut self, text: &str) -> Result<Option<SavedQuery>> {
        Ok(self.inner.query(text).await?)
    }

    /// Save query text, returning the existing record if already saved.
    pub async fn add_query(&mut self, text: &str) -> Result<SavedQuery> {
        if let Some(existing) = self.inner.query(text).await? {
            return Ok(existing);
        }
        let query = self.inner.insert_query(text).await?;
        info!("Saved query '{}'", text);
        Ok(query)
    }

    pub async fn delete_query(&mut self, text: &str) -> Result<()> {
        self.inner.delete_query(text).await?;
        info!("Deleted query '{}'", text);
        Ok(())
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Stored overrides resolved over the defaults.
    pub async fn settings(&mut self) -> Result<Settings> {
        let rows = self.inner.settings().await?;
        Ok(Settings::resolve(&rows)?)
    }

    pub async fn update_setting(&mut self, name: &str, value: &str) -> Result<()> {
        Settings::check(name, value)?;
        self.inner.update_setting(name, value).await?;
        Ok(())
    }
}

fn file_ids(file_tags: &[FileTag]) -> Vec<FileId> {
    let mut ids: Vec<FileId> = file_tags.iter().map(|ft| ft.file_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagfs_core::StoreError;
    use tagfs_query::parse;
    use tagfs_store::MemoryStore;

    fn storage() -> Storage {
        Storage::new(Arc::new(MemoryStore::new()))
    }

    async fn file(tx: &mut Tx, path: &str) -> File {
        tx.add_file(Path::new(path), Utc::now(), 0, false)
            .await
            .unwrap()
    }

    // ========== Root Tests ==========

    #[test]
    fn test_determine_root() {
        assert_eq!(
            determine_root(Path::new("/home/me/music/.tagfs/db.json")),
            PathBuf::from("/home/me/music")
        );
        assert_eq!(
            determine_root(Path::new("/var/lib/tagfs/db.json")),
            PathBuf::from("/")
        );
        assert_eq!(determine_root(Path::new(":memory:")), PathBuf::from("/"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/b/")), PathBuf::from("/a/b"));
    }

    #[tokio::test]
    async fn test_paths_are_stored_relative_to_root() {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::with_root(store, "/home/me/music");
        let mut tx = storage.begin().await.unwrap();

        let inside = file(&mut tx, "/home/me/music/rock/song.mp3").await;
        let top = file(&mut tx, "/home/me/music/intro.mp3").await;
        let outside = file(&mut tx, "/tmp/other.mp3").await;

        assert_eq!(inside.path(), PathBuf::from("/home/me/music/rock/song.mp3"));
        assert_eq!(top.path(), PathBuf::from("/home/me/music/intro.mp3"));
        assert_eq!(outside.path(), PathBuf::from("/tmp/other.mp3"));

        let raw = tx.raw().file(inside.id).await.unwrap().unwrap();
        assert_eq!(raw.directory, "rock");
        let raw = tx.raw().file(top.id).await.unwrap().unwrap();
        assert_eq!(raw.directory, ".");
        let raw = tx.raw().file(outside.id).await.unwrap().unwrap();
        assert_eq!(raw.directory, "/tmp");

        let found = tx
            .file_by_path(Path::new("/home/me/music/rock/song.mp3"))
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.id), Some(inside.id));
    }

    #[tokio::test]
    async fn test_query_path_filter() {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::with_root(store, "/home/me/music");
        let mut tx = storage.begin().await.unwrap();
        let rock = tx.add_tag("rock").await.unwrap();

        for path in [
            "/home/me/music/a/one.mp3",
            "/home/me/music/b/two.mp3",
            "/tmp/three.mp3",
        ] {
            let f = file(&mut tx, path).await;
            tx.add_file_tag(f.id, TagValuePair::tag(rock.id))
                .await
                .unwrap();
        }

        let expression = parse("rock").unwrap();
        let names = |files: Vec<File>| files.into_iter().map(|f| f.name).collect::<Vec<_>>();

        let files = tx
            .files_for_query(
                &expression,
                Some(Path::new("/home/me/music/a")),
                false,
                false,
                FileSort::Name,
            )
            .await
            .unwrap();
        assert_eq!(names(files), vec!["one.mp3"]);

        let files = tx
            .files_for_query(&expression, Some(Path::new("/home")), false, false, FileSort::Name)
            .await
            .unwrap();
        assert_eq!(names(files), vec!["one.mp3", "two.mp3"]);

        let files = tx
            .files_for_query(&expression, None, false, false, FileSort::Id)
            .await
            .unwrap();
        assert_eq!(files.len(), 3);
    }

    // ========== Tag Tests ==========

    #[tokio::test]
    async fn test_add_tag_validates_name() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();

        assert!(matches!(
            tx.add_tag("and").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            tx.add_tag("a/b").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(tx.tag_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_duplicate_tag_fails() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();

        tx.add_tag("photo").await.unwrap();
        assert!(matches!(
            tx.add_tag("photo").await,
            Err(Error::Store(StoreError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn test_delete_tag_cascades() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let cat = tx.add_tag("cat").await.unwrap();
        let animal = tx.add_tag("animal").await.unwrap();
        let photo = tx.add_tag("photo").await.unwrap();
        tx.add_implication(TagValuePair::tag(cat.id), TagValuePair::tag(animal.id))
            .await
            .unwrap();

        let only_cat = file(&mut tx, "/pets/tom.jpg").await;
        let both = file(&mut tx, "/pets/felix.jpg").await;
        tx.add_file_tag(only_cat.id, TagValuePair::tag(cat.id))
            .await
            .unwrap();
        tx.add_file_tag(both.id, TagValuePair::tag(cat.id))
            .await
            .unwrap();
        tx.add_file_tag(both.id, TagValuePair::tag(photo.id))
            .await
            .unwrap();

        tx.delete_tag(cat.id).await.unwrap();

        assert!(tx.tag(cat.id).await.unwrap().is_none());
        assert!(tx.implications().await.unwrap().is_empty());
        assert!(tx.file(only_cat.id).await.unwrap().is_none());
        assert!(tx.file(both.id).await.unwrap().is_some());
        assert_eq!(tx.file_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_value_cascades() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let year = tx.add_tag("year").await.unwrap();
        let old = tx.add_value("2001").await.unwrap();
        let f = file(&mut tx, "/docs/report.pdf").await;
        tx.add_file_tag(f.id, TagValuePair::new(year.id, old.id))
            .await
            .unwrap();

        tx.delete_value(old.id).await.unwrap();

        assert!(tx.value(old.id).await.unwrap().is_none());
        assert_eq!(tx.file_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resolve_pair_respects_settings() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();

        let settings = tx.settings().await.unwrap();
        let pair = tx
            .resolve_pair("year", Some("2020"), &settings)
            .await
            .unwrap();
        assert!(!pair.value_id.is_none());
        assert_eq!(tx.tag_count().await.unwrap(), 1);

        tx.update_setting("autoCreateTags", "no").await.unwrap();
        let settings = tx.settings().await.unwrap();
        assert!(matches!(
            tx.resolve_pair("genre", None, &settings).await,
            Err(Error::NotFound { kind: "tag", .. })
        ));
    }

    #[tokio::test]
    async fn test_update_setting_rejects_unknown_and_invalid() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();

        assert!(tx.update_setting("colour", "blue").await.is_err());
        assert!(tx.update_setting("autoCreateTags", "maybe").await.is_err());
        assert_eq!(tx.settings().await.unwrap(), Settings::default());
    }

    // ========== File Tag Tests ==========

    #[tokio::test]
    async fn test_implied_file_tags_are_marked() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let cat = tx.add_tag("cat").await.unwrap();
        let animal = tx.add_tag("animal").await.unwrap();
        tx.add_implication(TagValuePair::tag(cat.id), TagValuePair::tag(animal.id))
            .await
            .unwrap();
        let f = file(&mut tx, "/pets/tom.jpg").await;
        tx.add_file_tag(f.id, TagValuePair::tag(cat.id))
            .await
            .unwrap();

        let explicit = tx.file_tags_by_file_id(f.id, true).await.unwrap();
        assert_eq!(explicit.len(), 1);

        let all = tx.file_tags_by_file_id(f.id, false).await.unwrap();
        let implied = all.iter().find(|ft| ft.tag_id == animal.id).unwrap();
        assert!(implied.implicit);
        assert!(!implied.explicit);

        // synthesized rows are not written back
        assert_eq!(tx.raw().file_tag_count().await.unwrap(), 1);

        assert!(
            tx.file_tag_exists(f.id, TagValuePair::tag(animal.id), false)
                .await
                .unwrap()
        );
        assert!(
            !tx.file_tag_exists(f.id, TagValuePair::tag(animal.id), true)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_file_count_by_tag_id_includes_implied() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let cat = tx.add_tag("cat").await.unwrap();
        let animal = tx.add_tag("animal").await.unwrap();
        tx.add_implication(TagValuePair::tag(cat.id), TagValuePair::tag(animal.id))
            .await
            .unwrap();
        let f = file(&mut tx, "/pets/tom.jpg").await;
        tx.add_file_tag(f.id, TagValuePair::tag(cat.id))
            .await
            .unwrap();

        assert_eq!(tx.file_count_by_tag_id(animal.id, true).await.unwrap(), 0);
        assert_eq!(tx.file_count_by_tag_id(animal.id, false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_file_tag() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let photo = tx.add_tag("photo").await.unwrap();
        let holiday = tx.add_tag("holiday").await.unwrap();
        let f = file(&mut tx, "/photos/beach.jpg").await;
        tx.add_file_tag(f.id, TagValuePair::tag(photo.id))
            .await
            .unwrap();
        tx.add_file_tag(f.id, TagValuePair::tag(holiday.id))
            .await
            .unwrap();

        tx.delete_file_tag(f.id, TagValuePair::tag(photo.id))
            .await
            .unwrap();
        assert!(tx.file(f.id).await.unwrap().is_some());

        assert!(matches!(
            tx.delete_file_tag(f.id, TagValuePair::tag(photo.id)).await,
            Err(Error::FileTagNotFound { .. })
        ));

        tx.delete_file_tag(f.id, TagValuePair::tag(holiday.id))
            .await
            .unwrap();
        assert!(tx.file(f.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_tags_skips_redundant_pairs() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let cat = tx.add_tag("cat").await.unwrap();
        let animal = tx.add_tag("animal").await.unwrap();
        let photo = tx.add_tag("photo").await.unwrap();
        tx.add_implication(TagValuePair::tag(cat.id), TagValuePair::tag(animal.id))
            .await
            .unwrap();
        let f = file(&mut tx, "/pets/tom.jpg").await;
        tx.add_file_tag(f.id, TagValuePair::tag(photo.id))
            .await
            .unwrap();

        let applied = tx
            .apply_tags(
                f.id,
                &[
                    TagValuePair::tag(cat.id),
                    TagValuePair::tag(animal.id),
                    TagValuePair::tag(photo.id),
                ],
            )
            .await
            .unwrap();

        assert_eq!(applied, vec![TagValuePair::tag(cat.id)]);
        let explicit = tx.file_tags_by_file_id(f.id, true).await.unwrap();
        assert_eq!(explicit.len(), 2);
    }

    // ========== Implication Tests ==========

    #[tokio::test]
    async fn test_cycle_rejection_leaves_implications_unchanged() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let a = tx.add_tag("a").await.unwrap();
        let b = tx.add_tag("b").await.unwrap();
        tx.add_implication(TagValuePair::tag(a.id), TagValuePair::tag(b.id))
            .await
            .unwrap();
        let before = tx.implications().await.unwrap();

        let result = tx
            .add_implication(TagValuePair::tag(b.id), TagValuePair::tag(a.id))
            .await;

        assert!(matches!(result, Err(Error::ImplicationCycle)));
        assert_eq!(tx.implications().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_query_expansion_matches_implying_files() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();
        let cat = tx.add_tag("cat").await.unwrap();
        let animal = tx.add_tag("animal").await.unwrap();
        tx.add_implication(TagValuePair::tag(cat.id), TagValuePair::tag(animal.id))
            .await
            .unwrap();
        let f = file(&mut tx, "/pets/tom.jpg").await;
        tx.add_file_tag(f.id, TagValuePair::tag(cat.id))
            .await
            .unwrap();

        let expression = parse("animal").unwrap();
        let expanded = tx
            .files_for_query(&expression, None, false, false, FileSort::Id)
            .await
            .unwrap();
        assert_eq!(expanded.len(), 1);

        let explicit = tx
            .files_for_query(&expression, None, true, false, FileSort::Id)
            .await
            .unwrap();
        assert!(explicit.is_empty());
    }

    // ========== Query Tests ==========

    #[tokio::test]
    async fn test_add_query_is_idempotent() {
        let storage = storage();
        let mut tx = storage.begin().await.unwrap();

        tx.add_query("cat and animal").await.unwrap();
        tx.add_query("cat and animal").await.unwrap();
        assert_eq!(tx.queries().await.unwrap().len(), 1);

        tx.delete_query("cat and animal").await.unwrap();
        assert!(tx.queries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_tx_is_discarded() {
        let storage = storage();
        {
            let mut tx = storage.begin().await.unwrap();
            tx.add_tag("photo").await.unwrap();
            tx.rollback().await.unwrap();
        }
        let mut tx = storage.begin_read().await.unwrap();
        assert_eq!(tx.tag_count().await.unwrap(), 0);
    }
}
