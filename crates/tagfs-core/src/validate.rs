//! Tag and value name validation.
//!
//! Names appear as path segments in the virtual filesystem and as symbols in
//! the query language, so they must survive both.

use tagfs_query::{ComparisonOperator, is_symbol_char};

use crate::error::{NameKind, ValidationError};

/// Validate a tag name.
pub fn validate_tag_name(name: &str) -> Result<(), ValidationError> {
    validate(name, NameKind::Tag)
}

/// Validate a value name.
pub fn validate_value_name(name: &str) -> Result<(), ValidationError> {
    validate(name, NameKind::Value)
}

fn validate(name: &str, kind: NameKind) -> Result<(), ValidationError> {
    match name {
        "" => return Err(ValidationError::Empty(kind)),
        "." | ".." => return Err(ValidationError::Dot(kind)),
        "and" | "AND" | "or" | "OR" | "not" | "NOT" => {
            return Err(ValidationError::LogicalOperator(kind));
        }
        _ => {}
    }

    if ComparisonOperator::from_mnemonic(name).is_some() {
        return Err(ValidationError::ComparisonOperator(kind));
    }

    for character in name.chars() {
        if character == ' ' {
            continue;
        }
        if character == '/' || character == '\\' {
            return Err(ValidationError::InvalidCharacter { kind, character });
        }
        if !is_symbol_char(character) {
            return Err(ValidationError::NonPrintable {
                kind,
                code_point: u32::from(character),
            });
        }
    }

    Ok(())
}
