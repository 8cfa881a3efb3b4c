//! Boolean query language over tags and values.
//!
//! ```text
//! photo and not holiday
//! (cat or dog) year >= 2020
//! size = big
//! ```
//!
//! Text is tokenized by [`Scanner`], parsed by [`parse`] into an
//! [`Expression`] tree, and then handed to a repository for evaluation.

pub mod error;
pub mod expression;
pub mod parser;
pub mod scanner;

pub use error::QueryError;
pub use expression::{Comparison, ComparisonOperator, Expression};
pub use parser::{Parser, parse};
pub use scanner::{Scanner, Token, is_symbol_char};
