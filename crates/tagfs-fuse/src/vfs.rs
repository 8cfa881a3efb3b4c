//! Path-level filesystem driver.
//!
//! [`Vfs`] answers every filesystem question in terms of `/`-separated paths
//! relative to the mount point. It owns no state besides the repository
//! handle: each call opens one transaction, commits it on success and rolls
//! it back on failure.
//!
//! ```text
//! ""                          top level
//! ".database"                 link to the repository location
//! "tags"                      every tag
//! "tags/<tag>[/=<value>]..."  constraint directories
//! ".../files"                 links to the matching files
//! "queries"                   saved queries
//! "queries/<query>"           links to the files matching <query>
//! ```

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use tagfs_core::{File, FileId, FileSort, TagValuePair, ValueId};
use tagfs_imply::{Storage, Tx};
use tagfs_query::{ComparisonOperator, Expression, parse};
use tracing::{debug, info, warn};

use crate::error::{VfsError, VfsResult};
use crate::escape::{escape, unescape};
use crate::link::{make_link_name, parse_file_id};

/// Link to the backing repository.
pub const DATABASE_NAME: &str = ".database";
pub const TAGS_DIR: &str = "tags";
pub const QUERIES_DIR: &str = "queries";
/// Reserved segment that switches a tag path to its file listing.
pub const FILES_DIR: &str = "files";
pub const HELP_NAME: &str = "README.md";

/// The tags help file shows while there are fewer tags than this.
const TAGS_HELP_LIMIT: u64 = 3;

const TAGS_HELP: &str = "\
Tag Directories
---------------

Every tag appears here as a directory. Inside a tag directory you find the
files carrying that tag, along with the other tags those files carry.

Descend through tag directories to narrow the selection:

    $ ls tags
    holiday  music  photo
    $ ls tags/photo
    files  holiday  =2019
    $ ls tags/photo/holiday/files
    beach.12.jpg  hut.14.jpg

A directory named `=value` restricts the tag before it to that value.

The tags directory also accepts a few changes:

  * mkdir creates a tag
  * mv renames a tag
  * rm on a file link removes that tag from the file
  * rmdir deletes a tag once no file carries it

(This file disappears once a few tags exist.)
";

const QUERIES_HELP: &str = "\
Query Directories
-----------------

Change into any directory whose name is a valid query to see the files
that match it. The directory does not have to exist beforehand:

    $ ls \"queries/photo and not holiday\"
    cat.3.jpg  tree.9.jpg

Queries you have visited are remembered and listed here. Remove one you no
longer need with rmdir. Avoid rm -r, which would untag the files inside.

(This file disappears once a query has been saved.)
";

/// What a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Symlink,
    File,
}

/// One name in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    fn link(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Symlink,
        }
    }
}

/// Attributes of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    /// `None` means "now".
    pub mtime: Option<DateTime<Utc>>,
}

impl Attr {
    fn dir(size: u64) -> Self {
        Self {
            kind: EntryKind::Directory,
            size,
            perm: 0o755,
            mtime: None,
        }
    }

    fn help(text: &str) -> Self {
        Self {
            kind: EntryKind::File,
            size: text.len() as u64,
            perm: 0o444,
            mtime: None,
        }
    }

    fn link(size: u64, mtime: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: EntryKind::Symlink,
            size,
            perm: 0o444,
            mtime,
        }
    }
}

/// A path below `tags`, checked and turned into a query.
#[derive(Debug)]
struct Constraints<'a> {
    segments: &'a [&'a str],
    expression: Expression,
}

impl<'a> Constraints<'a> {
    fn new(segments: &'a [&'a str]) -> VfsResult<Self> {
        let mut terms = Vec::with_capacity(segments.len());
        let mut previous_tag: Option<&str> = None;

        for segment in segments {
            if let Some(value) = segment.strip_prefix('=') {
                let tag = previous_tag.take().ok_or(VfsError::NotFound)?;
                terms.push(Expression::comparison(
                    unescape(tag),
                    ComparisonOperator::Equal,
                    unescape(value),
                ));
            } else if *segment == FILES_DIR {
                return Err(VfsError::NotFound);
            } else {
                terms.push(Expression::tag(unescape(segment)));
                previous_tag = Some(*segment);
            }
        }

        Ok(Self {
            segments,
            expression: Expression::conjunction(terms),
        })
    }

    /// Tag names used as bare constraints.
    fn tag_names(&self) -> HashSet<String> {
        self.segments
            .iter()
            .filter(|s| !s.starts_with('='))
            .map(|s| unescape(s))
            .collect()
    }
}

#[derive(Debug)]
enum Node<'a> {
    Root,
    Database,
    TagsDir,
    TagsHelp,
    Tagged(Constraints<'a>),
    TaggedFiles(Constraints<'a>),
    TaggedLink(Constraints<'a>, FileId),
    QueriesDir,
    QueriesHelp,
    Query(&'a str),
    QueryLink(&'a str, FileId),
}

fn resolve<'a>(segments: &'a [&'a str]) -> VfsResult<Node<'a>> {
    match segments {
        [] => Ok(Node::Root),
        [DATABASE_NAME] => Ok(Node::Database),
        [TAGS_DIR] => Ok(Node::TagsDir),
        [TAGS_DIR, HELP_NAME] => Ok(Node::TagsHelp),
        [TAGS_DIR, rest @ ..] => resolve_tagged(rest),
        [QUERIES_DIR] => Ok(Node::QueriesDir),
        [QUERIES_DIR, HELP_NAME] => Ok(Node::QueriesHelp),
        [QUERIES_DIR, query] => Ok(Node::Query(*query)),
        [QUERIES_DIR, query, link] => parse_file_id(link)
            .map(|id| Node::QueryLink(*query, id))
            .ok_or(VfsError::NotFound),
        _ => Err(VfsError::NotFound),
    }
}

fn resolve_tagged<'a>(rest: &'a [&'a str]) -> VfsResult<Node<'a>> {
    if let [constraints @ .., FILES_DIR, link] = rest
        && let Some(id) = parse_file_id(link)
    {
        return Ok(Node::TaggedLink(Constraints::new(constraints)?, id));
    }

    match rest {
        [constraints @ .., FILES_DIR] => Ok(Node::TaggedFiles(Constraints::new(constraints)?)),
        constraints => Ok(Node::Tagged(Constraints::new(constraints)?)),
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Tx, result: VfsResult<T>) -> VfsResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                warn!("Rollback failed after '{}': {}", err, e);
            }
            Err(err)
        }
    }
}

/// The tag filesystem, addressed by path.
pub struct Vfs {
    storage: Storage,
    mount_point: PathBuf,
}

impl Vfs {
    /// Serve `storage` at `mount_point`.
    pub fn new(storage: Storage, mount_point: impl Into<PathBuf>) -> Self {
        let mount_point = mount_point.into();
        let mount_point = std::path::absolute(&mount_point).unwrap_or(mount_point);
        Self {
            storage,
            mount_point,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// List the entries of the directory at `path`.
    pub async fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        debug!("read_dir: {:?}", path);
        let segments = split(path);
        let node = resolve(&segments)?;

        let mut tx = self.storage.begin_read().await?;
        let result = self.list(&mut tx, &node).await;
        finish(tx, result).await
    }

    async fn list(&self, tx: &mut Tx, node: &Node<'_>) -> VfsResult<Vec<DirEntry>> {
        match node {
            Node::Root => Ok(vec![
                DirEntry::link(DATABASE_NAME),
                DirEntry::dir(QUERIES_DIR),
                DirEntry::dir(TAGS_DIR),
            ]),
            Node::TagsDir => {
                let mut entries: Vec<DirEntry> = tx
                    .tags()
                    .await?
                    .into_iter()
                    .map(|tag| escape(&tag.name))
                    .filter(|name| name != FILES_DIR)
                    .map(DirEntry::dir)
                    .collect();
                if tags_help_visible(tx).await? {
                    entries.push(DirEntry {
                        name: HELP_NAME.to_string(),
                        kind: EntryKind::File,
                    });
                }
                Ok(entries)
            }
            Node::TagsHelp => {
                if tags_help_visible(tx).await? {
                    return Err(VfsError::Invalid("not a directory".to_string()));
                }
                let constraints = Constraints::new(&[HELP_NAME])?;
                self.list_tagged(tx, &constraints).await
            }
            Node::Tagged(constraints) => self.list_tagged(tx, constraints).await,
            Node::TaggedFiles(constraints) => {
                let files = self.matching(tx, &constraints.expression).await?;
                Ok(links(&files))
            }
            Node::QueriesDir => {
                let queries = tx.queries().await?;
                let mut entries: Vec<DirEntry> =
                    queries.iter().map(|q| DirEntry::dir(&q.text)).collect();
                if queries.is_empty() {
                    entries.push(DirEntry {
                        name: HELP_NAME.to_string(),
                        kind: EntryKind::File,
                    });
                }
                Ok(entries)
            }
            Node::QueriesHelp => {
                if tx.queries().await?.is_empty() {
                    return Err(VfsError::Invalid("not a directory".to_string()));
                }
                let expression = query_expression(tx, HELP_NAME).await?;
                let files = self.matching(tx, &expression).await?;
                Ok(links(&files))
            }
            Node::Query(text) => {
                let expression = query_expression(tx, text).await?;
                let files = self.matching(tx, &expression).await?;
                Ok(links(&files))
            }
            Node::Database
            | Node::TaggedLink(..)
            | Node::QueryLink(..) => Err(VfsError::Invalid("not a directory".to_string())),
        }
    }

    /// Further tags, values of the last tag, and the `files` entry.
    async fn list_tagged(
        &self,
        tx: &mut Tx,
        constraints: &Constraints<'_>,
    ) -> VfsResult<Vec<DirEntry>> {
        let files = self.matching(tx, &constraints.expression).await?;

        let last_tag = match constraints.segments.last() {
            Some(segment) if !segment.starts_with('=') => {
                tx.tag_by_name(&unescape(segment)).await?.map(|t| t.id)
            }
            _ => None,
        };

        let mut tag_ids = BTreeSet::new();
        let mut value_ids = BTreeSet::new();
        for file in &files {
            for file_tag in tx.file_tags_by_file_id(file.id, false).await? {
                tag_ids.insert(file_tag.tag_id);
                if Some(file_tag.tag_id) == last_tag && !file_tag.value_id.is_none() {
                    value_ids.insert(file_tag.value_id);
                }
            }
        }

        let in_path = constraints.tag_names();
        let mut tag_names = Vec::new();
        for id in tag_ids {
            let Some(tag) = tx.tag(id).await? else {
                continue;
            };
            if tag.name == FILES_DIR {
                continue;
            }
            // a valueless tag already in the path would only repeat itself
            if in_path.contains(&tag.name) && tx.values_by_tag(id).await?.is_empty() {
                continue;
            }
            tag_names.push(escape(&tag.name));
        }
        tag_names.sort();

        let mut value_names = Vec::new();
        for id in value_ids {
            if let Some(value) = tx.value(id).await? {
                value_names.push(format!("={}", escape(&value.name)));
            }
        }
        value_names.sort();

        let mut entries: Vec<DirEntry> = tag_names.into_iter().map(DirEntry::dir).collect();
        entries.extend(value_names.into_iter().map(DirEntry::dir));
        entries.push(DirEntry::dir(FILES_DIR));
        Ok(entries)
    }

    async fn matching(&self, tx: &mut Tx, expression: &Expression) -> VfsResult<Vec<File>> {
        Ok(tx
            .files_for_query(expression, None, false, false, FileSort::Name)
            .await?)
    }

    /// Attributes of `path`.
    ///
    /// Looking up a valid query directory saves the query.
    pub async fn get_attr(&self, path: &str) -> VfsResult<Attr> {
        debug!("get_attr: {:?}", path);
        let segments = split(path);
        let node = resolve(&segments)?;

        let mut tx = self.storage.begin().await?;
        let result = self.attr(&mut tx, &node).await;
        finish(tx, result).await
    }

    async fn attr(&self, tx: &mut Tx, node: &Node<'_>) -> VfsResult<Attr> {
        match node {
            Node::Root => Ok(Attr::dir(0)),
            Node::TagsDir => Ok(Attr::dir(tx.tag_count().await?)),
            Node::QueriesDir => Ok(Attr::dir(tx.queries().await?.len() as u64)),
            Node::Database => {
                let (size, mtime) = match tokio::fs::metadata(self.storage.location()).await {
                    Ok(meta) => (meta.len(), meta.modified().ok().map(DateTime::from)),
                    Err(_) => (0, None),
                };
                Ok(Attr::link(size, mtime))
            }
            Node::TagsHelp => {
                if tags_help_visible(tx).await? {
                    Ok(Attr::help(TAGS_HELP))
                } else {
                    let constraints = Constraints::new(&[HELP_NAME])?;
                    check_constraints(tx, &constraints).await?;
                    Ok(Attr::dir(0))
                }
            }
            Node::QueriesHelp => {
                if tx.queries().await?.is_empty() {
                    Ok(Attr::help(QUERIES_HELP))
                } else {
                    query_expression(tx, HELP_NAME).await?;
                    tx.add_query(HELP_NAME).await?;
                    Ok(Attr::dir(0))
                }
            }
            Node::Tagged(constraints) | Node::TaggedFiles(constraints) => {
                check_constraints(tx, constraints).await?;
                Ok(Attr::dir(0))
            }
            Node::TaggedLink(_, id) | Node::QueryLink(_, id) => {
                let file = tx.file(*id).await?.ok_or(VfsError::NotFound)?;
                Ok(Attr::link(file.size, Some(file.mod_time)))
            }
            Node::Query(text) => {
                query_expression(tx, text).await?;
                tx.add_query(text).await?;
                Ok(Attr::dir(0))
            }
        }
    }

    /// Target of the link at `path`.
    pub async fn read_link(&self, path: &str) -> VfsResult<PathBuf> {
        debug!("read_link: {:?}", path);
        let segments = split(path);
        let node = resolve(&segments)?;

        let id = match node {
            Node::Database => {
                let location = self.storage.location();
                return Ok(std::path::absolute(location).unwrap_or_else(|_| location.to_path_buf()));
            }
            Node::TaggedLink(_, id) | Node::QueryLink(_, id) => id,
            _ => return Err(VfsError::Invalid("not a link".to_string())),
        };

        let mut tx = self.storage.begin_read().await?;
        let result = tx.file(id).await.map_err(VfsError::from);
        let file = finish(tx, result).await?.ok_or(VfsError::NotFound)?;

        let (_, parents) = segments.split_last().ok_or(VfsError::NotFound)?;
        let link_dir = parents
            .iter()
            .fold(self.mount_point.clone(), |dir, segment| dir.join(segment));
        Ok(relative_to(&file.path(), &link_dir))
    }

    /// Contents of the regular file at `path`.
    pub async fn read_file(&self, path: &str) -> VfsResult<&'static [u8]> {
        debug!("read_file: {:?}", path);
        let segments = split(path);
        match resolve(&segments)? {
            Node::TagsHelp => Ok(TAGS_HELP.as_bytes()),
            Node::QueriesHelp => Ok(QUERIES_HELP.as_bytes()),
            _ => Err(VfsError::Invalid("not a regular file".to_string())),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a tag from `tags/<name>`.
    pub async fn mkdir(&self, path: &str) -> VfsResult<()> {
        debug!("mkdir: {:?}", path);
        let segments = split(path);
        let [TAGS_DIR, name] = segments.as_slice() else {
            return Err(VfsError::Permission);
        };

        let mut tx = self.storage.begin().await?;
        let result = tx
            .add_tag(&unescape(name))
            .await
            .map(|_| ())
            .map_err(VfsError::from);
        finish(tx, result).await
    }

    /// Delete an unused tag or a saved query.
    pub async fn rmdir(&self, path: &str) -> VfsResult<()> {
        debug!("rmdir: {:?}", path);
        let segments = split(path);

        let mut tx = self.storage.begin().await?;
        let result = match segments.as_slice() {
            [TAGS_DIR, name] => remove_tag(&mut tx, &unescape(name)).await,
            [QUERIES_DIR, text] => remove_query(&mut tx, text).await,
            _ => Err(VfsError::Permission),
        };
        finish(tx, result).await
    }

    /// Rename `tags/<old>` to `tags/<new>`.
    pub async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        debug!("rename: {:?} -> {:?}", from, to);
        let from_segments = split(from);
        let to_segments = split(to);
        let ([TAGS_DIR, old], [TAGS_DIR, new]) = (from_segments.as_slice(), to_segments.as_slice())
        else {
            return Err(VfsError::Permission);
        };
        let (old, new) = (unescape(old), unescape(new));

        let mut tx = self.storage.begin().await?;
        let result = rename_tag(&mut tx, &old, &new).await;
        finish(tx, result).await
    }

    /// Remove the tagging a file link stands for.
    pub async fn unlink(&self, path: &str) -> VfsResult<()> {
        debug!("unlink: {:?}", path);
        let segments = split(path);
        let (constraints, id) = match resolve(&segments)? {
            Node::TaggedLink(constraints, id) => (constraints, id),
            _ => return Err(VfsError::Permission),
        };

        let mut tx = self.storage.begin().await?;
        let result = untag(&mut tx, &constraints, id).await;
        finish(tx, result).await
    }
}

async fn tags_help_visible(tx: &mut Tx) -> VfsResult<bool> {
    Ok(tx.tag_count().await? < TAGS_HELP_LIMIT)
}

/// Every tag and value named by the path must exist.
async fn check_constraints(tx: &mut Tx, constraints: &Constraints<'_>) -> VfsResult<()> {
    for segment in constraints.segments {
        let found = match segment.strip_prefix('=') {
            Some(value) => tx.value_by_name(&unescape(value)).await?.is_some(),
            None => tx.tag_by_name(&unescape(segment)).await?.is_some(),
        };
        if !found {
            return Err(VfsError::NotFound);
        }
    }
    Ok(())
}

/// Parse a query directory name, requiring every tag it names to exist.
async fn query_expression(tx: &mut Tx, text: &str) -> VfsResult<Expression> {
    // shell completion appends a space; hide the duplicate
    if text.ends_with(' ') {
        return Err(VfsError::NotFound);
    }

    let expression = parse(&unescape(text)).map_err(|_| VfsError::NotFound)?;
    for name in expression.tag_names() {
        if tx.tag_by_name(&name).await?.is_none() {
            return Err(VfsError::NotFound);
        }
    }
    Ok(expression)
}

async fn remove_tag(tx: &mut Tx, name: &str) -> VfsResult<()> {
    let tag = tx.tag_by_name(name).await?.ok_or(VfsError::NotFound)?;
    if tx.file_count_by_tag_id(tag.id, false).await? > 0 {
        return Err(VfsError::NotEmpty);
    }
    tx.delete_tag(tag.id).await?;
    info!("Removed tag '{}'", name);
    Ok(())
}

async fn remove_query(tx: &mut Tx, text: &str) -> VfsResult<()> {
    if tx.query(text).await?.is_none() {
        return Err(VfsError::NotFound);
    }
    tx.delete_query(text).await?;
    info!("Removed query '{}'", text);
    Ok(())
}

async fn rename_tag(tx: &mut Tx, old: &str, new: &str) -> VfsResult<()> {
    let tag = tx.tag_by_name(old).await?.ok_or(VfsError::NotFound)?;
    if old == new {
        return Ok(());
    }
    if tx.tag_by_name(new).await?.is_some() {
        return Err(VfsError::Exists);
    }
    tx.rename_tag(tag.id, new).await?;
    info!("Renamed tag '{}' to '{}'", old, new);
    Ok(())
}

/// Remove the tag (and value) the link's directory stands for from the file.
///
/// Without a value segment only the valueless tagging goes.
async fn untag(tx: &mut Tx, constraints: &Constraints<'_>, id: FileId) -> VfsResult<()> {
    let (tag_segment, value_segment) = match constraints.segments {
        [.., tag, value] if value.starts_with('=') => (*tag, value.strip_prefix('=')),
        [.., tag] => (*tag, None),
        [] => return Err(VfsError::Permission),
    };

    if tx.file(id).await?.is_none() {
        debug!("File {} already gone", id);
        return Ok(());
    }

    let tag = tx
        .tag_by_name(&unescape(tag_segment))
        .await?
        .ok_or(VfsError::NotFound)?;
    let value_id = match value_segment {
        Some(name) => {
            tx.value_by_name(&unescape(name))
                .await?
                .ok_or(VfsError::NotFound)?
                .id
        }
        None => ValueId::NONE,
    };
    let pair = TagValuePair::new(tag.id, value_id);

    if !tx.file_tag_exists(id, pair, true).await? {
        // only implied: removing the implying tag is the way to drop it
        return Err(if tx.file_tag_exists(id, pair, false).await? {
            VfsError::Permission
        } else {
            VfsError::NotFound
        });
    }

    tx.delete_file_tag(id, pair).await?;
    info!("Untagged file {} from '{}'", id, tag.name);
    Ok(())
}

fn links(files: &[File]) -> Vec<DirEntry> {
    let mut names: Vec<String> = files
        .iter()
        .map(|file| make_link_name(&file.name, file.id))
        .collect();
    names.sort();
    names.dedup();
    names.into_iter().map(DirEntry::link).collect()
}

/// `target` expressed relative to the directory `base`.
fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component<'_>> = target.components().collect();
    let base: Vec<Component<'_>> = base.components().collect();
    let common = target
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tagfs_store::MemoryStore;

    fn vfs() -> Vfs {
        let storage = Storage::with_root(Arc::new(MemoryStore::new()), "/");
        Vfs::new(storage, "/mnt/tags")
    }

    async fn tag_file(vfs: &Vfs, path: &str, tags: &[&str]) -> FileId {
        let mut tx = vfs.storage().begin().await.unwrap();
        let file = match tx.file_by_path(Path::new(path)).await.unwrap() {
            Some(file) => file,
            None => tx
                .add_file(Path::new(path), Utc::now(), 10, false)
                .await
                .unwrap(),
        };
        let settings = tx.settings().await.unwrap();
        let mut pairs = Vec::new();
        for spec in tags {
            let (tag, value) = match spec.split_once('=') {
                Some((t, v)) => (t, Some(v)),
                None => (*spec, None),
            };
            pairs.push(tx.resolve_pair(tag, value, &settings).await.unwrap());
        }
        tx.apply_tags(file.id, &pairs).await.unwrap();
        tx.commit().await.unwrap();
        file.id
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    // ========== Resolution Tests ==========

    #[test]
    fn test_resolve_layout() {
        assert!(matches!(resolve(&[]), Ok(Node::Root)));
        assert!(matches!(resolve(&[".database"]), Ok(Node::Database)));
        assert!(matches!(resolve(&["tags", "README.md"]), Ok(Node::TagsHelp)));
        assert!(matches!(resolve(&["queries", "a and b"]), Ok(Node::Query(_))));
        assert!(matches!(resolve(&["other"]), Err(VfsError::NotFound)));
    }

    #[test]
    fn test_resolve_tag_paths() {
        assert!(matches!(resolve(&["tags", "photo"]), Ok(Node::Tagged(_))));
        assert!(matches!(
            resolve(&["tags", "photo", "files"]),
            Ok(Node::TaggedFiles(_))
        ));
        assert!(matches!(
            resolve(&["tags", "photo", "files", "beach.12.jpg"]),
            Ok(Node::TaggedLink(_, FileId(12)))
        ));
        // a link name outside a files directory is a tag name
        assert!(matches!(resolve(&["tags", "v1.2"]), Ok(Node::Tagged(_))));
    }

    #[test]
    fn test_resolve_rejects_misplaced_segments() {
        assert!(resolve(&["tags", "=2019"]).is_err());
        assert!(resolve(&["tags", "year", "=2019", "=2020"]).is_err());
        assert!(resolve(&["tags", "files", "photo"]).is_err());
        assert!(resolve(&["queries", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_constraint_expression() {
        let segments = ["photo", "year", "=2019"];
        let constraints = Constraints::new(&segments).unwrap();
        assert_eq!(
            constraints.expression,
            parse("photo and year and year = 2019").unwrap()
        );
    }

    #[test]
    fn test_constraint_expression_unescapes() {
        let escaped = escape("AC/DC");
        let segments = [escaped.as_str()];
        let constraints = Constraints::new(&segments).unwrap();
        assert_eq!(constraints.expression, Expression::tag("AC/DC"));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(
                Path::new("/home/me/pics/beach.jpg"),
                Path::new("/mnt/tags/tags/photo/files")
            ),
            PathBuf::from("../../../../../home/me/pics/beach.jpg")
        );
        assert_eq!(
            relative_to(Path::new("/mnt/data/a.txt"), Path::new("/mnt/tags")),
            PathBuf::from("../data/a.txt")
        );
    }

    // ========== Listing Tests ==========

    #[tokio::test]
    async fn test_top_level() {
        let vfs = vfs();
        let entries = vfs.read_dir("").await.unwrap();
        assert_eq!(names(&entries), vec![".database", "queries", "tags"]);
    }

    #[tokio::test]
    async fn test_tags_help_hides_at_three_tags() {
        let vfs = vfs();
        vfs.mkdir("tags/a").await.unwrap();
        vfs.mkdir("tags/b").await.unwrap();
        assert!(names(&vfs.read_dir("tags").await.unwrap()).contains(&HELP_NAME));
        assert_eq!(
            vfs.get_attr("tags/README.md").await.unwrap().kind,
            EntryKind::File
        );

        vfs.mkdir("tags/c").await.unwrap();
        let entries = vfs.read_dir("tags").await.unwrap();
        assert_eq!(names(&entries), vec!["a", "b", "c"]);
        assert!(vfs.get_attr("tags/README.md").await.is_err());
    }

    #[tokio::test]
    async fn test_tag_directory_lists_related_tags_and_values() {
        let vfs = vfs();
        tag_file(&vfs, "/pics/beach.jpg", &["photo", "holiday", "year=2019"]).await;
        tag_file(&vfs, "/pics/cat.jpg", &["photo", "year=2020"]).await;

        let entries = vfs.read_dir("tags/photo").await.unwrap();
        assert_eq!(names(&entries), vec!["holiday", "year", "files"]);

        let entries = vfs.read_dir("tags/photo/year").await.unwrap();
        assert_eq!(
            names(&entries),
            vec!["holiday", "year", "=2019", "=2020", "files"]
        );

        let entries = vfs.read_dir("tags/photo/year/=2019/files").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].name.starts_with("beach."));
    }

    #[tokio::test]
    async fn test_files_directory_lists_links() {
        let vfs = vfs();
        let id = tag_file(&vfs, "/pics/beach.jpg", &["photo"]).await;

        let entries = vfs.read_dir("tags/photo/files").await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::link(make_link_name("beach.jpg", id))]
        );
    }

    #[tokio::test]
    async fn test_tag_named_files_is_hidden() {
        let vfs = vfs();
        tag_file(&vfs, "/a.txt", &["files", "doc"]).await;

        assert!(!names(&vfs.read_dir("tags").await.unwrap()).contains(&"files"));
        let entries = vfs.read_dir("tags/doc").await.unwrap();
        assert_eq!(names(&entries), vec!["files"]);
    }

    // ========== Attribute Tests ==========

    #[tokio::test]
    async fn test_unknown_tag_not_found() {
        let vfs = vfs();
        assert!(matches!(
            vfs.get_attr("tags/nothing").await,
            Err(VfsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_link_attr_uses_file_record() {
        let vfs = vfs();
        let id = tag_file(&vfs, "/pics/beach.jpg", &["photo"]).await;

        let attr = vfs
            .get_attr(&format!("tags/photo/files/{}", make_link_name("beach.jpg", id)))
            .await
            .unwrap();
        assert_eq!(attr.kind, EntryKind::Symlink);
        assert_eq!(attr.size, 10);
    }

    #[tokio::test]
    async fn test_query_attr_rules() {
        let vfs = vfs();
        tag_file(&vfs, "/a.txt", &["photo"]).await;

        assert!(vfs.get_attr("queries/photo").await.is_ok());
        assert!(matches!(
            vfs.get_attr("queries/photo ").await,
            Err(VfsError::NotFound)
        ));
        assert!(matches!(
            vfs.get_attr("queries/photo and (").await,
            Err(VfsError::NotFound)
        ));
        assert!(matches!(
            vfs.get_attr("queries/unknown").await,
            Err(VfsError::NotFound)
        ));
        assert_eq!(names(&vfs.read_dir("queries").await.unwrap()), vec!["photo"]);
    }

    // ========== Read Tests ==========

    #[tokio::test]
    async fn test_read_link_is_relative() {
        let vfs = vfs();
        let id = tag_file(&vfs, "/pics/beach.jpg", &["photo"]).await;
        let link = make_link_name("beach.jpg", id);

        let target = vfs
            .read_link(&format!("tags/photo/files/{link}"))
            .await
            .unwrap();
        assert_eq!(target, PathBuf::from("../../../../../pics/beach.jpg"));

        let target = vfs.read_link(&format!("queries/photo/{link}")).await.unwrap();
        assert_eq!(target, PathBuf::from("../../../../pics/beach.jpg"));
    }

    #[tokio::test]
    async fn test_read_help_file() {
        let vfs = vfs();
        let text = vfs.read_file("queries/README.md").await.unwrap();
        assert!(text.starts_with(b"Query Directories"));
        assert!(vfs.read_file("tags").await.is_err());
    }

    // ========== Mutation Tests ==========

    #[tokio::test]
    async fn test_mkdir_rules() {
        let vfs = vfs();
        vfs.mkdir("tags/photo").await.unwrap();

        assert!(matches!(vfs.mkdir("tags/photo").await, Err(VfsError::Exists)));
        assert!(matches!(vfs.mkdir("tags/and").await, Err(VfsError::Invalid(_))));
        assert!(matches!(
            vfs.mkdir("tags/photo/holiday").await,
            Err(VfsError::Permission)
        ));
        assert!(matches!(
            vfs.mkdir("queries/photo").await,
            Err(VfsError::Permission)
        ));
    }

    #[tokio::test]
    async fn test_mkdir_validates_unescaped_name() {
        let vfs = vfs();
        assert!(matches!(
            vfs.mkdir(&format!("tags/{}", escape("AC/DC"))).await,
            Err(VfsError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_rules() {
        let vfs = vfs();
        vfs.mkdir("tags/photo").await.unwrap();
        vfs.mkdir("tags/music").await.unwrap();

        assert!(matches!(
            vfs.rename("tags/photo", "tags/music").await,
            Err(VfsError::Exists)
        ));
        assert!(matches!(
            vfs.rename("tags/missing", "tags/other").await,
            Err(VfsError::NotFound)
        ));
        assert!(matches!(
            vfs.rename("tags/photo", "queries/photo").await,
            Err(VfsError::Permission)
        ));

        assert!(matches!(
            vfs.rename("tags/missing", "tags/missing").await,
            Err(VfsError::NotFound)
        ));
        vfs.rename("tags/photo", "tags/photo").await.unwrap();

        vfs.rename("tags/photo", "tags/picture").await.unwrap();
        assert!(vfs.get_attr("tags/picture").await.is_ok());
        assert!(vfs.get_attr("tags/photo").await.is_err());
    }

    #[tokio::test]
    async fn test_rmdir_query() {
        let vfs = vfs();
        tag_file(&vfs, "/a.txt", &["photo"]).await;
        vfs.get_attr("queries/photo").await.unwrap();

        vfs.rmdir("queries/photo").await.unwrap();
        assert!(matches!(
            vfs.rmdir("queries/photo").await,
            Err(VfsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_unlink_value_link() {
        let vfs = vfs();
        let id = tag_file(&vfs, "/pics/beach.jpg", &["photo", "year=2019"]).await;
        let link = make_link_name("beach.jpg", id);

        vfs.unlink(&format!("tags/year/=2019/files/{link}"))
            .await
            .unwrap();

        assert!(vfs.read_dir("tags/year/=2019/files").await.unwrap().is_empty());
        assert_eq!(vfs.read_dir("tags/photo/files").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unlink_keeps_valued_tagging() {
        let vfs = vfs();
        let id = tag_file(&vfs, "/pics/beach.jpg", &["photo", "photo=2019"]).await;
        let link = make_link_name("beach.jpg", id);

        vfs.unlink(&format!("tags/photo/files/{link}"))
            .await
            .unwrap();

        let mut tx = vfs.storage().begin_read().await.unwrap();
        let year = tx.value_by_name("2019").await.unwrap().unwrap();
        let remaining: Vec<ValueId> = tx
            .file_tags_by_file_id(id, true)
            .await
            .unwrap()
            .iter()
            .map(|ft| ft.value_id)
            .collect();
        assert_eq!(remaining, vec![year.id]);
        drop(tx);

        assert_eq!(
            names(&vfs.read_dir("tags/photo/=2019/files").await.unwrap()),
            vec![link.as_str()]
        );
        assert!(matches!(
            vfs.unlink(&format!("tags/photo/files/{link}")).await,
            Err(VfsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_unlink_refusals() {
        let vfs = vfs();
        let id = tag_file(&vfs, "/pics/beach.jpg", &["photo"]).await;
        let link = make_link_name("beach.jpg", id);
        vfs.get_attr("queries/photo").await.unwrap();

        assert!(matches!(
            vfs.unlink(&format!("queries/photo/{link}")).await,
            Err(VfsError::Permission)
        ));
        assert!(matches!(
            vfs.unlink("tags/photo").await,
            Err(VfsError::Permission)
        ));
    }

    #[tokio::test]
    async fn test_unlink_missing_file_succeeds() {
        let vfs = vfs();
        vfs.mkdir("tags/photo").await.unwrap();
        vfs.unlink("tags/photo/files/gone.99.jpg").await.unwrap();
    }
}
