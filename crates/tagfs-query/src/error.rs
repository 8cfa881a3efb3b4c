//! Errors raised while scanning or parsing query text.

use thiserror::Error;

/// Lexical and parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A character that can never be part of a token.
    #[error("unexpected character {character:?} at position {position}")]
    UnexpectedCharacter { character: char, position: usize },

    /// A token of the wrong class for its position.
    #[error("unexpected {class} '{text}', expecting {expected}")]
    UnexpectedToken {
        class: &'static str,
        text: String,
        expected: &'static str,
    },

    /// Input ended while more tokens were required.
    #[error("unexpected end of input, expecting {expected}")]
    UnexpectedEnd { expected: &'static str },
}
