//! File link naming.
//!
//! A matched file appears as `<stem>.<id><extension>`, so the id survives
//! into the name and the extension stays last for tools that sniff it.

use tagfs_core::FileId;

/// Longest name most filesystems accept for a single entry.
pub const MAX_NAME_LEN: usize = 255;

/// Build the link name for `file_name` with id `id`.
///
/// The stem is shortened at a character boundary when the whole name would
/// exceed [`MAX_NAME_LEN`] bytes; the id and extension are kept intact.
#[must_use]
pub fn make_link_name(file_name: &str, id: FileId) -> String {
    let (stem, extension) = split_extension(file_name);
    let id_part = format!(".{id}");

    // an extension that cannot fit is treated as part of the stem
    let (stem, extension) = if id_part.len() + extension.len() > MAX_NAME_LEN {
        (file_name, "")
    } else {
        (stem, extension)
    };

    let budget = MAX_NAME_LEN.saturating_sub(id_part.len() + extension.len());
    let stem = truncate_at_char_boundary(stem, budget);
    format!("{stem}{id_part}{extension}")
}

/// The file id embedded in a link name, if it is one.
#[must_use]
pub fn parse_file_id(name: &str) -> Option<FileId> {
    let parts: Vec<&str> = name.split('.').collect();
    let (preferred, fallback) = match parts.as_slice() {
        [] | [_] => return None,
        [_, last] => (*last, None),
        [.., second_to_last, last] => (*second_to_last, Some(*last)),
    };

    let id = preferred
        .parse::<u32>()
        .ok()
        .or_else(|| fallback.and_then(|part| part.parse().ok()))?;
    (id != 0).then_some(FileId(id))
}

/// Split at the final `.`; a name without one has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) => name.split_at(index),
        None => (name, ""),
    }
}

fn truncate_at_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== make_link_name() Tests ==========

    #[test]
    fn test_link_name_keeps_extension_last() {
        assert_eq!(make_link_name("beach.jpg", FileId(12)), "beach.12.jpg");
        assert_eq!(
            make_link_name("archive.tar.gz", FileId(5)),
            "archive.tar.5.gz"
        );
    }

    #[test]
    fn test_link_name_without_extension() {
        assert_eq!(make_link_name("README", FileId(7)), "README.7");
    }

    #[test]
    fn test_link_name_dotfile() {
        assert_eq!(make_link_name(".bashrc", FileId(3)), ".3.bashrc");
    }

    #[test]
    fn test_link_name_truncates_stem() {
        let stem = "x".repeat(300);
        let name = make_link_name(&format!("{stem}.txt"), FileId(123_456));

        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(name.ends_with(".123456.txt"));
    }

    #[test]
    fn test_link_name_truncates_on_char_boundary() {
        let stem = "é".repeat(200);
        let name = make_link_name(&format!("{stem}.png"), FileId(9));

        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.ends_with(".9.png"));
        assert_eq!(parse_file_id(&name), Some(FileId(9)));
    }

    // ========== parse_file_id() Tests ==========

    #[test]
    fn test_parse_not_a_link() {
        assert_eq!(parse_file_id("holiday"), None);
        assert_eq!(parse_file_id("photo.jpg"), None);
        assert_eq!(parse_file_id("a.b.c"), None);
        assert_eq!(parse_file_id("file.0"), None);
    }

    #[test]
    fn test_parse_two_parts_uses_last() {
        assert_eq!(parse_file_id("2019.5"), Some(FileId(5)));
        assert_eq!(parse_file_id("README.7"), Some(FileId(7)));
    }

    #[test]
    fn test_parse_prefers_second_to_last() {
        assert_eq!(parse_file_id("beach.12.jpg"), Some(FileId(12)));
        assert_eq!(parse_file_id("v1.2.7.tar"), Some(FileId(7)));
    }

    #[test]
    fn test_parse_falls_back_to_last() {
        assert_eq!(parse_file_id("notes.draft.42"), Some(FileId(42)));
    }

    #[test]
    fn test_link_name_round_trip() {
        let names = [
            "beach.jpg",
            "README",
            ".bashrc",
            "archive.tar.gz",
            "2019",
            "notes.2019",
            "v1.2.tar",
            "日本語.txt",
        ];
        for name in names {
            for id in [1, 42, 1_000_000, u32::MAX] {
                let link = make_link_name(name, FileId(id));
                assert!(link.len() <= MAX_NAME_LEN);
                assert_eq!(parse_file_id(&link), Some(FileId(id)), "{link}");
            }
        }
    }
}
