//! Repository settings.
//!
//! Settings are resolved once per transaction: stored overrides are read and
//! any unset field falls back to the compile-time default.

use crate::error::StoreError;
use crate::types::Setting;

pub const AUTO_CREATE_TAGS: &str = "autoCreateTags";
pub const AUTO_CREATE_VALUES: &str = "autoCreateValues";
pub const DIRECTORY_FINGERPRINT_ALGORITHM: &str = "directoryFingerprintAlgorithm";
pub const FILE_FINGERPRINT_ALGORITHM: &str = "fileFingerprintAlgorithm";
pub const REPORT_DUPLICATES: &str = "reportDuplicates";
pub const SYMLINK_FINGERPRINT_ALGORITHM: &str = "symlinkFingerprintAlgorithm";

/// Every recognised setting name, in display order.
pub const SETTING_NAMES: [&str; 6] = [
    AUTO_CREATE_TAGS,
    AUTO_CREATE_VALUES,
    DIRECTORY_FINGERPRINT_ALGORITHM,
    FILE_FINGERPRINT_ALGORITHM,
    REPORT_DUPLICATES,
    SYMLINK_FINGERPRINT_ALGORITHM,
];

/// Resolved repository settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Create unknown tags when tagging
    pub auto_create_tags: bool,
    /// Create unknown values when tagging
    pub auto_create_values: bool,
    pub directory_fingerprint_algorithm: String,
    pub file_fingerprint_algorithm: String,
    /// Report files sharing a fingerprint when tagging
    pub report_duplicates: bool,
    pub symlink_fingerprint_algorithm: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_create_tags: true,
            auto_create_values: true,
            directory_fingerprint_algorithm: "none".to_string(),
            file_fingerprint_algorithm: "dynamic:SHA256".to_string(),
            report_duplicates: true,
            symlink_fingerprint_algorithm: "follow".to_string(),
        }
    }
}

impl Settings {
    /// Overlay stored rows on the defaults.
    pub fn resolve(rows: &[Setting]) -> Result<Self, StoreError> {
        let mut settings = Self::default();
        for row in rows {
            settings.apply(&row.name, &row.value)?;
        }
        Ok(settings)
    }

    /// Whether `name` is a recognised setting.
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        SETTING_NAMES.contains(&name)
    }

    /// Check that `value` is acceptable for `name` without storing it.
    pub fn check(name: &str, value: &str) -> Result<(), StoreError> {
        Self::default().apply(name, value)
    }

    fn apply(&mut self, name: &str, value: &str) -> Result<(), StoreError> {
        match name {
            AUTO_CREATE_TAGS => self.auto_create_tags = parse_bool(name, value)?,
            AUTO_CREATE_VALUES => self.auto_create_values = parse_bool(name, value)?,
            DIRECTORY_FINGERPRINT_ALGORITHM => {
                self.directory_fingerprint_algorithm = value.to_string();
            }
            FILE_FINGERPRINT_ALGORITHM => self.file_fingerprint_algorithm = value.to_string(),
            REPORT_DUPLICATES => self.report_duplicates = parse_bool(name, value)?,
            SYMLINK_FINGERPRINT_ALGORITHM => {
                self.symlink_fingerprint_algorithm = value.to_string();
            }
            _ => return Err(StoreError::Setting(format!("unknown setting '{name}'"))),
        }
        Ok(())
    }

    /// Name/value pairs for display.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (AUTO_CREATE_TAGS, format_bool(self.auto_create_tags)),
            (AUTO_CREATE_VALUES, format_bool(self.auto_create_values)),
            (
                DIRECTORY_FINGERPRINT_ALGORITHM,
                self.directory_fingerprint_algorithm.clone(),
            ),
            (
                FILE_FINGERPRINT_ALGORITHM,
                self.file_fingerprint_algorithm.clone(),
            ),
            (REPORT_DUPLICATES, format_bool(self.report_duplicates)),
            (
                SYMLINK_FINGERPRINT_ALGORITHM,
                self.symlink_fingerprint_algorithm.clone(),
            ),
        ]
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, StoreError> {
    match value {
        "yes" | "Yes" | "YES" | "true" | "True" | "TRUE" => Ok(true),
        "no" | "No" | "NO" | "false" | "False" | "FALSE" => Ok(false),
        _ => Err(StoreError::Setting(format!(
            "'{name}' must be yes or no, not '{value}'"
        ))),
    }
}

fn format_bool(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
