//! Query evaluation over explicit taggings.

use std::cmp::Ordering;
use tagfs_core::{File, QueryOptions};
use tagfs_query::{Comparison, ComparisonOperator, Expression};

use crate::state::{State, names_equal, sort_files};

/// The `(tag name, value name)` taggings of one file.
struct Taggings<'a> {
    entries: Vec<(&'a str, Option<&'a str>)>,
    ignore_case: bool,
}

impl Taggings<'_> {
    fn matches(&self, expression: &Expression) -> bool {
        match expression {
            Expression::Empty => true,
            Expression::Tag(name) => self
                .entries
                .iter()
                .any(|(tag, _)| names_equal(tag, name, self.ignore_case)),
            Expression::Value(name) => self.entries.iter().any(|(_, value)| {
                value.is_some_and(|value| names_equal(value, name, self.ignore_case))
            }),
            Expression::Not(operand) => !self.matches(operand),
            Expression::And(left, right) => self.matches(left) && self.matches(right),
            Expression::Or(left, right) => self.matches(left) || self.matches(right),
            Expression::Comparison(comparison) => self.compares(comparison),
        }
    }

    fn compares(&self, comparison: &Comparison) -> bool {
        if comparison.operator == ComparisonOperator::NotEqual {
            let equal = Comparison {
                operator: ComparisonOperator::Equal,
                ..comparison.clone()
            };
            return !self.compares(&equal);
        }

        self.entries.iter().any(|(tag, value)| {
            names_equal(tag, &comparison.tag, self.ignore_case)
                && value.is_some_and(|value| {
                    satisfies(value, comparison.operator, &comparison.value, self.ignore_case)
                })
        })
    }
}

/// Numeric when both sides are numbers, lexicographic otherwise.
fn satisfies(stored: &str, operator: ComparisonOperator, operand: &str, ignore_case: bool) -> bool {
    let ordering = match (stored.parse::<f64>(), operand.parse::<f64>()) {
        (Ok(stored), Ok(number)) => stored.partial_cmp(&number),
        _ if ignore_case => Some(stored.to_lowercase().cmp(&operand.to_lowercase())),
        _ => Some(stored.cmp(operand)),
    };

    let Some(ordering) = ordering else {
        return false;
    };

    match operator {
        ComparisonOperator::Equal => ordering == Ordering::Equal,
        ComparisonOperator::NotEqual => ordering != Ordering::Equal,
        ComparisonOperator::LessThan => ordering == Ordering::Less,
        ComparisonOperator::GreaterThan => ordering == Ordering::Greater,
        ComparisonOperator::LessOrEqual => ordering != Ordering::Greater,
        ComparisonOperator::GreaterOrEqual => ordering != Ordering::Less,
    }
}

fn within_path(file: &File, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    if path == "." {
        return !file.directory.starts_with('/');
    }
    if path.is_empty() {
        return file.directory.starts_with('/');
    }
    file.directory == path
        || file
            .directory
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'))
        || file.path().to_str() == Some(path)
}

/// Files whose explicit taggings satisfy `expression`.
pub(crate) fn files_for_query(
    state: &State,
    expression: &Expression,
    options: &QueryOptions,
) -> Vec<File> {
    let mut files: Vec<File> = state
        .files
        .iter()
        .filter(|file| {
            options
                .path
                .as_deref()
                .is_none_or(|path| within_path(file, path))
        })
        .filter(|file| {
            let entries = state
                .file_tags
                .iter()
                .filter(|row| row.file_id == file.id)
                .filter_map(|row| {
                    let tag = state.tag(row.tag_id)?;
                    let value = if row.value_id.is_none() {
                        None
                    } else {
                        Some(state.value(row.value_id)?.name.as_str())
                    };
                    Some((tag.name.as_str(), value))
                })
                .collect();
            Taggings {
                entries,
                ignore_case: options.ignore_case,
            }
            .matches(expression)
        })
        .cloned()
        .collect();

    sort_files(&mut files, options.sort);
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tagfs_core::{FileSort, NewFile, ValueId};
    use tagfs_query::parse;

    struct Fixture {
        state: State,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                state: State::default(),
            }
        }

        fn file(&mut self, directory: &str, name: &str, tags: &[&str]) -> File {
            let file = self
                .state
                .insert_file(NewFile {
                    directory: directory.to_string(),
                    name: name.to_string(),
                    fingerprint: String::new(),
                    mod_time: Utc::now(),
                    size: 0,
                    is_dir: false,
                })
                .unwrap();
            for spec in tags {
                let (tag_name, value_name) = match spec.split_once('=') {
                    Some((t, v)) => (t, Some(v)),
                    None => (*spec, None),
                };
                let tag = match self.state.tag_by_name(tag_name, false) {
                    Some(tag) => tag.clone(),
                    None => self.state.insert_tag(tag_name).unwrap(),
                };
                let value_id = match value_name {
                    Some(v) => match self.state.value_by_name(v, false) {
                        Some(value) => value.id,
                        None => self.state.insert_value(v).unwrap().id,
                    },
                    None => ValueId::NONE,
                };
                self.state.insert_file_tag(file.id, tag.id, value_id).unwrap();
            }
            file
        }

        fn names(&self, query: &str) -> Vec<String> {
            self.names_with(query, &QueryOptions::default())
        }

        fn names_with(&self, query: &str, options: &QueryOptions) -> Vec<String> {
            files_for_query(&self.state, &parse(query).unwrap(), options)
                .into_iter()
                .map(|f| f.name)
                .collect()
        }
    }

    fn fixture() -> Fixture {
        let mut fx = Fixture::new();
        fx.file("/photos", "beach.jpg", &["photo", "holiday", "year=2019"]);
        fx.file("/photos", "cat.jpg", &["photo", "cat", "year=2021"]);
        fx.file("/docs", "report.pdf", &["document", "year=2021", "size=big"]);
        fx.file("/docs/old", "notes.txt", &["document", "year=old"]);
        fx
    }

    // ========== Boolean Tests ==========

    #[test]
    fn test_empty_matches_everything() {
        assert_eq!(fixture().names("").len(), 4);
    }

    #[test]
    fn test_tag_and_not() {
        let fx = fixture();
        assert_eq!(fx.names("photo"), vec!["beach.jpg", "cat.jpg"]);
        assert_eq!(fx.names("photo not holiday"), vec!["cat.jpg"]);
        assert_eq!(fx.names("holiday or document"), vec!["beach.jpg", "report.pdf", "notes.txt"]);
    }

    #[test]
    fn test_tag_matches_valued_tagging() {
        assert_eq!(fixture().names("size"), vec!["report.pdf"]);
    }

    #[test]
    fn test_standalone_value_matches_any_tag() {
        let fx = fixture();
        let expr = Expression::value("big");
        let files = files_for_query(&fx.state, &expr, &QueryOptions::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "report.pdf");
    }

    // ========== Comparison Tests ==========

    #[test]
    fn test_numeric_comparison() {
        let fx = fixture();
        assert_eq!(fx.names("year > 2020"), vec!["cat.jpg", "report.pdf"]);
        assert_eq!(fx.names("year <= 2019"), vec!["beach.jpg"]);
        assert_eq!(fx.names("year = 2021.0"), vec!["cat.jpg", "report.pdf"]);
    }

    #[test]
    fn test_mixed_comparison_falls_back_to_text() {
        let fx = fixture();
        // "old" sorts after "3000"
        assert_eq!(fx.names("year > 3000"), vec!["notes.txt"]);
        assert!(!fx.names("year < 3000").contains(&"notes.txt".to_string()));
    }

    #[test]
    fn test_string_comparison() {
        let fx = fixture();
        assert_eq!(fx.names("year = old"), vec!["notes.txt"]);
        assert_eq!(fx.names("size >= b"), vec!["report.pdf"]);
    }

    #[test]
    fn test_not_equal_is_negated_equal() {
        // files without the tag at all satisfy !=
        let fx = fixture();
        assert_eq!(fx.names("size != big"), vec!["beach.jpg", "cat.jpg", "notes.txt"]);
    }

    #[test]
    fn test_ignore_case() {
        let fx = fixture();
        let options = QueryOptions {
            ignore_case: true,
            ..QueryOptions::default()
        };
        assert_eq!(fx.names_with("PHOTO and Cat", &options), vec!["cat.jpg"]);
        assert!(fx.names("PHOTO").is_empty());
    }

    // ========== Path and Sort Tests ==========

    #[test]
    fn test_path_filter_includes_subdirectories() {
        let fx = fixture();
        let options = QueryOptions {
            path: Some("/docs".to_string()),
            ..QueryOptions::default()
        };
        assert_eq!(fx.names_with("document", &options), vec!["report.pdf", "notes.txt"]);
    }

    #[test]
    fn test_path_filter_does_not_match_prefix_siblings() {
        let mut fx = fixture();
        fx.file("/docsextra", "x.txt", &["document"]);
        let options = QueryOptions {
            path: Some("/docs".to_string()),
            ..QueryOptions::default()
        };
        assert!(!fx.names_with("document", &options).contains(&"x.txt".to_string()));
    }

    #[test]
    fn test_sort_by_name() {
        let fx = fixture();
        let options = QueryOptions {
            sort: FileSort::Name,
            ..QueryOptions::default()
        };
        assert_eq!(
            fx.names_with("", &options),
            vec!["notes.txt", "report.pdf", "beach.jpg", "cat.jpg"]
        );
    }
}
