//! Repository rows and their synchronous operations.
//!
//! [`State`] is the unit of copy-on-write: a read-write transaction works on
//! its own clone and the store swaps it in on commit.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tagfs_core::{
    File, FileId, FileSort, FileTag, Implication, NewFile, SavedQuery, Setting, StoreError, Tag,
    TagId, TagValuePair, Value, ValueId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FileTagRow {
    pub file_id: FileId,
    pub tag_id: TagId,
    pub value_id: ValueId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ImplicationRow {
    pub implying: TagValuePair,
    pub implied: TagValuePair,
}

/// Every row in the repository plus id counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct State {
    #[serde(default)]
    next_tag_id: u32,
    #[serde(default)]
    next_value_id: u32,
    #[serde(default)]
    next_file_id: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub files: Vec<File>,
    #[serde(default)]
    pub file_tags: Vec<FileTagRow>,
    #[serde(default)]
    pub implications: Vec<ImplicationRow>,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub settings: Vec<Setting>,
}

pub(crate) fn names_equal(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

fn missing(kind: &'static str, key: impl ToString) -> StoreError {
    StoreError::Missing {
        kind,
        key: key.to_string(),
    }
}

fn duplicate(kind: &'static str, name: &str) -> StoreError {
    StoreError::Duplicate {
        kind,
        name: name.to_string(),
    }
}

impl State {
    // ---- tags ----

    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn tags_sorted(&self) -> Vec<Tag> {
        let mut tags = self.tags.clone();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    pub fn tag_by_name(&self, name: &str, ignore_case: bool) -> Option<&Tag> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .or_else(|| {
                ignore_case
                    .then(|| self.tags.iter().find(|t| names_equal(&t.name, name, true)))
                    .flatten()
            })
    }

    pub fn insert_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        if self.tags.iter().any(|t| t.name == name) {
            return Err(duplicate("tag", name));
        }
        self.next_tag_id += 1;
        let tag = Tag {
            id: TagId(self.next_tag_id),
            name: name.to_string(),
        };
        self.tags.push(tag.clone());
        Ok(tag)
    }

    pub fn rename_tag(&mut self, id: TagId, name: &str) -> Result<Tag, StoreError> {
        if self.tags.iter().any(|t| t.name == name && t.id != id) {
            return Err(duplicate("tag", name));
        }
        let tag = self
            .tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| missing("tag", id))?;
        tag.name = name.to_string();
        Ok(tag.clone())
    }

    pub fn delete_tag(&mut self, id: TagId) -> Result<(), StoreError> {
        let before = self.tags.len();
        self.tags.retain(|t| t.id != id);
        if self.tags.len() == before {
            return Err(missing("tag", id));
        }
        Ok(())
    }

    // ---- values ----

    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.iter().find(|v| v.id == id)
    }

    pub fn values_sorted(&self) -> Vec<Value> {
        let mut values = self.values.clone();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        values
    }

    pub fn value_by_name(&self, name: &str, ignore_case: bool) -> Option<&Value> {
        self.values
            .iter()
            .find(|v| v.name == name)
            .or_else(|| {
                ignore_case
                    .then(|| self.values.iter().find(|v| names_equal(&v.name, name, true)))
                    .flatten()
            })
    }

    pub fn values_by_tag(&self, tag_id: TagId) -> Vec<Value> {
        let mut values: Vec<Value> = self
            .values
            .iter()
            .filter(|v| {
                self.file_tags
                    .iter()
                    .any(|ft| ft.tag_id == tag_id && ft.value_id == v.id)
            })
            .cloned()
            .collect();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        values
    }

    pub fn insert_value(&mut self, name: &str) -> Result<Value, StoreError> {
        if self.values.iter().any(|v| v.name == name) {
            return Err(duplicate("value", name));
        }
        self.next_value_id += 1;
        let value = Value {
            id: ValueId(self.next_value_id),
            name: name.to_string(),
        };
        self.values.push(value.clone());
        Ok(value)
    }

    pub fn rename_value(&mut self, id: ValueId, name: &str) -> Result<Value, StoreError> {
        if self.values.iter().any(|v| v.name == name && v.id != id) {
            return Err(duplicate("value", name));
        }
        let value = self
            .values
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| missing("value", id))?;
        value.name = name.to_string();
        Ok(value.clone())
    }

    pub fn delete_value(&mut self, id: ValueId) -> Result<(), StoreError> {
        let before = self.values.len();
        self.values.retain(|v| v.id != id);
        if self.values.len() == before {
            return Err(missing("value", id));
        }
        Ok(())
    }

    // ---- files ----

    pub fn file(&self, id: FileId) -> Option<&File> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn files_sorted(&self, sort: FileSort) -> Vec<File> {
        let mut files = self.files.clone();
        sort_files(&mut files, sort);
        files
    }

    pub fn file_by_path(&self, directory: &str, name: &str) -> Option<&File> {
        self.files
            .iter()
            .find(|f| f.directory == directory && f.name == name)
    }

    pub fn insert_file(&mut self, file: NewFile) -> Result<File, StoreError> {
        if self.file_by_path(&file.directory, &file.name).is_some() {
            let path = format!("{}/{}", file.directory, file.name);
            return Err(duplicate("file", &path));
        }
        self.next_file_id += 1;
        let file = File::from_new(FileId(self.next_file_id), file);
        self.files.push(file.clone());
        Ok(file)
    }

    pub fn update_file(&mut self, file: File) -> Result<File, StoreError> {
        let slot = self
            .files
            .iter_mut()
            .find(|f| f.id == file.id)
            .ok_or_else(|| missing("file", file.id))?;
        *slot = file.clone();
        Ok(file)
    }

    /// Removes the file and any taggings still referring to it.
    pub fn delete_file(&mut self, id: FileId) -> Result<(), StoreError> {
        let before = self.files.len();
        self.files.retain(|f| f.id != id);
        if self.files.len() == before {
            return Err(missing("file", id));
        }
        self.file_tags.retain(|ft| ft.file_id != id);
        Ok(())
    }

    // ---- file tags ----

    pub fn file_tags_where(&self, predicate: impl Fn(&FileTagRow) -> bool) -> Vec<FileTag> {
        self.file_tags
            .iter()
            .filter(|row| predicate(row))
            .map(|row| FileTag::explicit(row.file_id, row.tag_id, row.value_id))
            .collect()
    }

    pub fn file_tag_exists(&self, file_id: FileId, tag_id: TagId, value_id: ValueId) -> bool {
        self.file_tags
            .iter()
            .any(|ft| ft.file_id == file_id && ft.tag_id == tag_id && ft.value_id == value_id)
    }

    pub fn insert_file_tag(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<FileTag, StoreError> {
        if self.file(file_id).is_none() {
            return Err(missing("file", file_id));
        }
        if self.tag(tag_id).is_none() {
            return Err(missing("tag", tag_id));
        }
        if !value_id.is_none() && self.value(value_id).is_none() {
            return Err(missing("value", value_id));
        }
        if !self.file_tag_exists(file_id, tag_id, value_id) {
            self.file_tags.push(FileTagRow {
                file_id,
                tag_id,
                value_id,
            });
        }
        Ok(FileTag::explicit(file_id, tag_id, value_id))
    }

    pub fn delete_file_tag(
        &mut self,
        file_id: FileId,
        tag_id: TagId,
        value_id: ValueId,
    ) -> Result<(), StoreError> {
        let before = self.file_tags.len();
        self.file_tags.retain(|ft| {
            !(ft.file_id == file_id && ft.tag_id == tag_id && ft.value_id == value_id)
        });
        if self.file_tags.len() == before {
            return Err(missing("file tag", format!("{file_id}:{tag_id}:{value_id}")));
        }
        Ok(())
    }

    // ---- implications ----

    fn resolve_implication(&self, row: &ImplicationRow) -> Option<Implication> {
        let optional_value = |id: ValueId| -> Option<Option<Value>> {
            if id.is_none() {
                Some(None)
            } else {
                self.value(id).cloned().map(Some)
            }
        };

        Some(Implication {
            implying_tag: self.tag(row.implying.tag_id)?.clone(),
            implying_value: optional_value(row.implying.value_id)?,
            implied_tag: self.tag(row.implied.tag_id)?.clone(),
            implied_value: optional_value(row.implied.value_id)?,
        })
    }

    pub fn implications_where(
        &self,
        predicate: impl Fn(&ImplicationRow) -> bool,
    ) -> Vec<Implication> {
        let mut implications: Vec<Implication> = self
            .implications
            .iter()
            .filter(|row| predicate(row))
            .filter_map(|row| self.resolve_implication(row))
            .collect();
        implications.sort_by(compare_implications);
        implications
    }

    pub fn insert_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<(), StoreError> {
        for pair in [implying, implied] {
            if self.tag(pair.tag_id).is_none() {
                return Err(missing("tag", pair.tag_id));
            }
            if !pair.value_id.is_none() && self.value(pair.value_id).is_none() {
                return Err(missing("value", pair.value_id));
            }
        }
        let row = ImplicationRow { implying, implied };
        if !self.implications.contains(&row) {
            self.implications.push(row);
        }
        Ok(())
    }

    pub fn delete_implication(
        &mut self,
        implying: TagValuePair,
        implied: TagValuePair,
    ) -> Result<(), StoreError> {
        let row = ImplicationRow { implying, implied };
        let before = self.implications.len();
        self.implications.retain(|r| *r != row);
        if self.implications.len() == before {
            return Err(missing(
                "implication",
                format!("{}:{} => {}:{}", implying.tag_id, implying.value_id, implied.tag_id, implied.value_id),
            ));
        }
        Ok(())
    }

    // ---- queries ----

    pub fn insert_query(&mut self, text: &str) -> Result<SavedQuery, StoreError> {
        if self.queries.iter().any(|q| q == text) {
            return Err(duplicate("query", text));
        }
        self.queries.push(text.to_string());
        Ok(SavedQuery {
            text: text.to_string(),
        })
    }

    pub fn delete_query(&mut self, text: &str) -> Result<(), StoreError> {
        let before = self.queries.len();
        self.queries.retain(|q| q != text);
        if self.queries.len() == before {
            return Err(missing("query", text));
        }
        Ok(())
    }

    // ---- settings ----

    pub fn update_setting(&mut self, name: &str, value: &str) {
        match self.settings.iter_mut().find(|s| s.name == name) {
            Some(setting) => setting.value = value.to_string(),
            None => self.settings.push(Setting {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

pub(crate) fn sort_files(files: &mut [File], sort: FileSort) {
    match sort {
        FileSort::None | FileSort::Id => files.sort_by_key(|f| f.id),
        FileSort::Name => files.sort_by(|a, b| a.path().cmp(&b.path())),
        FileSort::Time => files.sort_by(|a, b| a.mod_time.cmp(&b.mod_time).then(a.id.cmp(&b.id))),
        FileSort::Size => files.sort_by(|a, b| a.size.cmp(&b.size).then(a.id.cmp(&b.id))),
    }
}

fn compare_implications(a: &Implication, b: &Implication) -> Ordering {
    let value_name = |v: &Option<Value>| v.as_ref().map(|v| v.name.clone()).unwrap_or_default();
    a.implying_tag
        .name
        .cmp(&b.implying_tag.name)
        .then_with(|| value_name(&a.implying_value).cmp(&value_name(&b.implying_value)))
        .then_with(|| a.implied_tag.name.cmp(&b.implied_tag.name))
        .then_with(|| value_name(&a.implied_value).cmp(&value_name(&b.implied_value)))
}
