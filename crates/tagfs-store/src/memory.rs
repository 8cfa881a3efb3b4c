//! Transactional in-memory tag store.
//!
//! [`MemoryStore`] keeps every row in memory. Stores created with
//! [`MemoryStore::create`] or [`MemoryStore::open`] are backed by a JSON
//! file instead: every transaction loads the file when it begins, and a
//! commit replaces it atomically. Nothing is cached between transactions,
//! so several processes can share one database.
//!
//! Read-write transactions are serialized: each one holds the writer lock
//! from `begin` until it is committed or dropped, and works on a private
//! copy of the state. Read transactions take a snapshot and never block.
//! A commit fails with [`StoreError::Transaction`] if the file changed
//! since the transaction loaded it.
//!
//! # Example
//!
//! ```rust
//! use tagfs_core::TagStore;
//! use tagfs_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let mut tx = store.begin().await?;
//! tx.insert_tag("photo").await?;
//! tx.commit().await?;
//!
//! let mut tx = store.begin_read().await?;
//! assert_eq!(tx.tag_count().await?, 1);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagfs_core::{
    File, FileId, FileSort, FileTag, Implication, NewFile, QueryOptions, SavedQuery, Setting,
    StoreError, Tag, TagId, TagStore, TagValuePair, Transaction, Value, ValueId,
};
use tagfs_query::Expression;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::eval;
use crate::state::{State, names_equal};

/// Location reported by stores that are never persisted.
pub const MEMORY_LOCATION: &str = ":memory:";

/// In-memory tag store with optional JSON persistence.
pub struct MemoryStore {
    location: PathBuf,
    persist: bool,
    state: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    /// Create a store that lives only in memory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(PathBuf::from(MEMORY_LOCATION), false, State::default())
    }

    fn with_state(location: PathBuf, persist: bool, state: State) -> Self {
        Self {
            location,
            persist,
            state: Arc::new(RwLock::new(state)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Create a new, empty database file at `path`.
    ///
    /// Fails if the file already exists. Missing parent directories are created.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(StoreError::Init(format!(
                "database already exists: {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Init(format!("{}: {e}", parent.display())))?;
        }

        let state = State::default();
        write_state(path, &state).await?;
        debug!("Created database at {:?}", path);
        Ok(Self::with_state(path.to_path_buf(), true, state))
    }

    /// Open an existing database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let (state, _) = read_state(path).await?;
        debug!(
            "Opened database at {:?} ({} tags, {} files)",
            path,
            state.tags.len(),
            state.files.len()
        );
        Ok(Self::with_state(path.to_path_buf(), true, state))
    }

    async fn transaction(&self, writable: bool) -> Result<MemoryTransaction, StoreError> {
        let guard = if writable {
            Some(self.writer.clone().lock_owned().await)
        } else {
            None
        };

        // load after taking the writer lock so we see the last commit
        let (state, baseline) = if self.persist {
            let (state, bytes) = read_state(&self.location).await?;
            (state, Some(bytes))
        } else {
            (self.state.read().await.clone(), None)
        };

        Ok(MemoryTransaction {
            state,
            shared: self.state.clone(),
            guard,
            persist_to: self.persist.then(|| self.location.clone()),
            baseline,
            dirty: false,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the state file, returning the raw bytes alongside.
async fn read_state(path: &Path) -> Result<(State, Vec<u8>), StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::Init(format!("{}: {e}", path.display())))?;
    let state = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Init(format!("{}: {e}", path.display())))?;
    Ok((state, bytes))
}

async fn write_state(path: &Path, state: &State) -> Result<(), StoreError> {
    let json =
        serde_json::to_vec_pretty(state).map_err(|e| StoreError::Persist(e.to_string()))?;
    let temp = path.with_extension("tmp");
    tokio::fs::write(&temp, json)
        .await
        .map_err(|e| StoreError::Persist(format!("{}: {e}", temp.display())))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| StoreError::Persist(format!("{}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl TagStore for MemoryStore {
    fn location(&self) -> &Path {
        &self.location
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(self.transaction(true).await?))
    }

    async fn begin_read(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(self.transaction(false).await?))
    }

    async fn close(&self) -> Result<(), StoreError> {
        // commits are already on disk; wait for an open writer to finish
        let _guard = self.writer.lock().await;
        debug!("Closed database at {:?}", self.location);
        Ok(())
    }
}

/// A transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    state: State,
    shared: Arc<RwLock<State>>,
    /// Writer lock; `None` for read-only transactions
    guard: Option<OwnedMutexGuard<()>>,
    persist_to: Option<PathBuf>,
    /// File contents when the transaction began
    baseline: Option<Vec<u8>>,
    dirty: bool,
}

impl MemoryTransaction {
    fn writable(&mut self) -> Result<&mut State, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::ReadOnly);
        }
        self.dirty = true;
        Ok(&mut self.state)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            state,
            shared,
            guard,
            persist_to,
            baseline,
            dirty,
        } = *self;

        if guard.is_none() || !dirty {
            return Ok(());
        }

        if let Some(path) = persist_to {
            let current = tokio::fs::read(&path)
                .await
                .map_err(|e| StoreError::Persist(format!("{}: {e}", path.display())))?;
            if baseline.is_some_and(|bytes| bytes != current) {
                return Err(StoreError::Transaction(format!(
                    "{} was changed by another writer",
                    path.display()
                )));
            }
            write_state(&path, &state).await?;
        }
        *shared.write().await = state;
        drop(guard);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        if self.dirty {
            debug!("Rolling back transaction");
        }
        Ok(())
    }

    // ---- tags ----

    async fn tag_count(&mut self) -> Result<u64, StoreError> {
        Ok(self.state.tags.len() as u64)
    }

    async fn tags(&mut self) -> Result<Vec<Tag>, StoreError> {
        Ok(self.state.tags_sorted())
    }

    async fn tag(&mut self, id: TagId) -> Result<Option<Tag>, StoreError> {
        Ok(self.state.tag(id).cloned())
    }

    async fn tag_by_name(
        &mut self,
        name: &str,
        ignore_case: bool,
    ) -> Result<Option<Tag>, StoreError> {
        Ok(self.state.tag_by_name(name, ignore_case).cloned())
    }

    async fn tags_by_names(
        &mut self,
        names: &[String],
        ignore_case: bool,
    ) -> Result<Vec<Tag>, StoreError> {
        let mut tags: Vec<Tag> = self
            .state
            .tags_sorted()
            .into_iter()
            .filter(|t| names.iter().any(|n| names_equal(&t.name, n, ignore_case)))
            .collect();
        tags.dedup_by_key(|t| t.id);
        Ok(tags)
    }

    async fn insert_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        let tag = self.writable()?.insert_tag(name)?;
        debug!("Inserted tag {} '{}'", tag.id, tag.name);
        Ok(tag)
    }

    async fn rename_tag(&mut self, id: TagId, name: &str) -> Result<Tag, StoreError> {
        self.writable()?.rename_tag(id, name)
    }

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StoreError> {
        self.writable()?.delete_tag(id)
    }

    // ---- values ----

    async fn value_count(&mut self) -> Result<u64, StoreError> {
        Ok(self.state.values.len() as u64)
    }

    async fn values(&mut self) -> Result<Vec<Value>, StoreError> {
        Ok(self.state.values_sorted())
    }

    async fn value(&mut self, id: ValueId) -> Result<Option<Value>, StoreError> {
        Ok(self.state.value(id).cloned())
    }

    async fn value_by_name(
        &mut self,
        name: &str,
        ignore_case: bool,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.state.value_by_name(name, ignore_case).cloned())
    }

    async fn values_by_names(
        &mut self,
        names: &[String],
        ignore_case: bool,
    ) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .state
            .values_sorted()
            .into_iter()
            .filter(|v| names.iter().any(|n| names_equal(&v.name, n, ignore_case)))
            .collect())
    }

    async fn values_by_tag(&mut self, tag_id: TagId) -> Result<Vec<Value>, StoreError> {
        Ok(self.state.values_by_tag(tag_id))
    }

    async fn insert_value(&mut self, name: &str) -> Result<Value, StoreError> {
        let value = self.writable()?.insert_value(name)?;
        debug!("Inserted value {} '{}'", value.id, value.name);
        Ok(value)
    }

    async fn rename_value(&mut self, id: ValueId, name: &str) -> Result<Value, StoreError> {
        self.writable()?.rename_value(id, name)
    }

    async fn delete_value(&mut self, id: ValueId) -> Result<(), StoreError> {
        self.writable()?.delete_value(id)
    }

    // ---- files ----

    async fn file_count(&mut self) -> Result<u64, StoreError> {
        Ok(self.state.files.len() as u64)
    }

    async fn files(&mut self, sort: FileSort) -> Result<Vec<File>, StoreError> {
        Ok(self.state.files_sorted(sort))
    }

    async fn file(&mut self, id: FileId) -> Result<Option<File>, StoreError> {
        Ok(self.state.file(id).cloned())
    }

    async fn file_by_path(
        &mut self,
        directory: &str,
        name: &str,
    ) -> Result<Option<File>, StoreError> {
        Ok(self.state.file_by_path(directory, name).cloned())
    }

    async fn files_by_fingerprint(&mut self, fingerprint: &str) -> Result<Vec<File>, StoreError> {
        Ok(self
            .state
            .files
            .iter()
            .filter(|f| f.fingerprint == fingerprint)
            .cloned()
            .collect())
    }

    async fn insert_file(&mut self, file: NewFile) -> Result<File, StoreError> {
        let file = self.writable()?.insert_file(file)?;
        debug!("Inserted file {} {:?}", file.id, file.path());
        Ok(file)
    }

    async fn update_file(&mut self, file: File) -> Result<File, StoreError> {
        self.writable()?.update_file(file)
    }

    async fn delete_file(&mut self, id: FileId) -> Result<(), StoreError> {
        self.writable()?.delete_file(id)?;
        debug!("Deleted file {}", id);
        Ok(())
    }

    async fn files_for_query(
        &mut self,
        expression: &Expression,
        options: &QueryOptions,
    ) -> Result<Vec<File>, StoreError> {
        let files = eval::files_for_query(&self.state, expression, options);
        debug!("Query '{}' matched {} files", expression, files.len());
        Ok(files)
    }

    // ---- file tags ----

    async fn file_tag_count(&mut self) -> Result<u64, StoreError> {
        Ok(self.state.file_tags.len() as u64)
    }

    async fn file_tags(&mut self) -> Result<Vec<FileTag>, StoreError> {
        Ok(self.state.file_tags_where(|_| true))
    }

    async fn file_tags_by_file_id(
        &mut self,
        file_id: FileId,
    ) -> Result<Vec<FileTag>, StoreError> {
        Ok(self.state.file_tags_where(|ft| ft.file_id == file_id))
    }

    async fn file_tags_by_tag_id(&mut self, tag_id: TagId) -> Result<Vec<FileTag>, StoreError> {
        Ok(self.state.file_tags_where(|ft| ft.tag_id == tag_id))
    }

    async fn file_tags_by_value_id(
        &mut self,
        value_id: ValueId,
    ) -> Result<Vec<FileTag>, StoreError> {
        Ok(self.state.file_tags_where(|ft| ft.value_id == value_id))
    }

    async fn file_tag_exists(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<bool, StoreError> {
        Ok(self.state.file_tag_exists(file_id, tag_id, value_id))
    }

    async fn insert_file_tag(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<FileTag, StoreError> {
        self.writable()?.insert_file_tag(file_id, tag_id, value_id)
    }

    async fn delete_file_tag(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<(), StoreError> {
        self.writable()?.delete_file_tag(file_id, tag_id, value_id)
    }

    async fn delete_file_tags_by_file_id(&mut self, file_id: FileId) -> Result<(), StoreError> {
        self.writable()?.file_tags.retain(|ft| ft.file_id != file_id);
        Ok(())
    }

    async fn delete_file_tags_by_tag_id(&mut self, tag_id: TagId) -> Result<(), StoreError> {
        self.writable()?.file_tags.retain(|ft| ft.tag_id != tag_id);
        Ok(())
    }

    async fn delete_file_tags_by_value_id(
        &mut self,
        value_id: ValueId,
    ) -> Result<(), StoreError> {
        self.writable()?.file_tags.retain(|ft| ft.value_id != value_id);
        Ok(())
    }

    // ---- implications ----

    async fn implications(&mut self) -> Result<Vec<Implication>, StoreError> {
        Ok(self.state.implications_where(|_| true))
    }

    async fn implications_for(
        &mut self,
        pairs: &[TagValuePair],
    ) -> Result<Vec<Implication>, StoreError> {
        Ok(self.state.implications_where(|row| {
            pairs.iter().any(|pair| {
                row.implying.tag_id == pair.tag_id
                    && (row.implying.value_id.is_none() || row.implying.value_id == pair.value_id)
            })
        }))
    }

    async fn implications_implying(
        &mut self,
        pairs: &[TagValuePair],
    ) -> Result<Vec<Implication>, StoreError> {
        Ok(self.state.implications_where(|row| {
            pairs.iter().any(|pair| {
                row.implied.tag_id == pair.tag_id
                    && (pair.value_id.is_none() || row.implied.value_id == pair.value_id)
            })
        }))
    }

    async fn insert_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<(), StoreError> {
        self.writable()?.insert_implication(implying, implied)
    }

    async fn delete_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<(), StoreError> {
        self.writable()?.delete_implication(implying, implied)
    }

    async fn delete_implications_by_tag_id(&mut self, tag_id: TagId) -> Result<(), StoreError> {
        self.writable()?
            .implications
            .retain(|row| row.implying.tag_id != tag_id && row.implied.tag_id != tag_id);
        Ok(())
    }

    async fn delete_implications_by_value_id(
        &mut self,
        value_id: ValueId,
    ) -> Result<(), StoreError> {
        self.writable()?
            .implications
            .retain(|row| row.implying.value_id != value_id && row.implied.value_id != value_id);
        Ok(())
    }

    // ---- queries ----

    async fn queries(&mut self) -> Result<Vec<SavedQuery>, StoreError> {
        let mut texts = self.state.queries.clone();
        texts.sort();
        Ok(texts.into_iter().map(|text| SavedQuery { text }).collect())
    }

    async fn query(&mut self, text: &str) -> Result<Option<SavedQuery>, StoreError> {
        Ok(self
            .state
            .queries
            .iter()
            .find(|q| q.as_str() == text)
            .map(|q| SavedQuery { text: q.clone() }))
    }

    async fn insert_query(&mut self, text: &str) -> Result<SavedQuery, StoreError> {
        self.writable()?.insert_query(text)
    }

    async fn delete_query(&mut self, text: &str) -> Result<(), StoreError> {
        self.writable()?.delete_query(text)
    }

    // ---- settings ----

    async fn settings(&mut self) -> Result<Vec<Setting>, StoreError> {
        Ok(self.state.settings.clone())
    }

    async fn update_setting(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        self.writable()?.update_setting(name, value);
        Ok(())
    }
}
