//! Query expression tree.
//!
//! Expressions are immutable values: rewriting passes (such as implication
//! expansion) build new trees rather than editing nodes in place.

use std::fmt;

/// Relational operator of a [`Comparison`].
///
/// `=`, `==` and the `eq` mnemonic all scan to [`ComparisonOperator::Equal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
}

impl ComparisonOperator {
    /// Symbolic spelling of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Look up a two-letter mnemonic (`eq`, `ne`, `lt`, `gt`, `le`, `ge`), ignoring case.
    #[must_use]
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Equal),
            "ne" => Some(Self::NotEqual),
            "lt" => Some(Self::LessThan),
            "gt" => Some(Self::GreaterThan),
            "le" => Some(Self::LessOrEqual),
            "ge" => Some(Self::GreaterOrEqual),
            _ => None,
        }
    }

    /// Whether this operator tests exact (in)equality rather than ordering.
    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Equal | Self::NotEqual)
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value-qualified tag constraint such as `year >= 2020`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub tag: String,
    pub operator: ComparisonOperator,
    pub value: String,
}

/// A node of the query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Matches everything.
    Empty,
    /// A file carrying the tag, with or without a value.
    Tag(String),
    /// A file carrying the value under any tag.
    Value(String),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Comparison(Comparison),
}

impl Expression {
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        Self::Tag(name.into())
    }

    #[must_use]
    pub fn value(name: impl Into<String>) -> Self {
        Self::Value(name.into())
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: Expression) -> Self {
        Self::Not(Box::new(operand))
    }

    #[must_use]
    pub fn and(left: Expression, right: Expression) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or(left: Expression, right: Expression) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn comparison(
        tag: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<String>,
    ) -> Self {
        Self::Comparison(Comparison {
            tag: tag.into(),
            operator,
            value: value.into(),
        })
    }

    /// Left-fold `terms` into a conjunction; no terms gives [`Expression::Empty`].
    #[must_use]
    pub fn conjunction(terms: impl IntoIterator<Item = Expression>) -> Self {
        terms
            .into_iter()
            .reduce(Expression::and)
            .unwrap_or(Expression::Empty)
    }

    /// Left-fold `terms` into a disjunction; no terms gives [`Expression::Empty`].
    #[must_use]
    pub fn disjunction(terms: impl IntoIterator<Item = Expression>) -> Self {
        terms
            .into_iter()
            .reduce(Expression::or)
            .unwrap_or(Expression::Empty)
    }

    /// Tag names referenced by `Tag` and `Comparison` nodes, first-seen order.
    #[must_use]
    pub fn tag_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_tag_names(&mut names);
        names
    }

    fn collect_tag_names(&self, names: &mut Vec<String>) {
        match self {
            Expression::Empty | Expression::Value(_) => {}
            Expression::Tag(name) => push_unique(names, name),
            Expression::Comparison(comparison) => push_unique(names, &comparison.tag),
            Expression::Not(operand) => operand.collect_tag_names(names),
            Expression::And(left, right) | Expression::Or(left, right) => {
                left.collect_tag_names(names);
                right.collect_tag_names(names);
            }
        }
    }

    /// Value names compared with `=` or `!=`.
    ///
    /// Ordering comparisons are evaluated by the repository directly and do
    /// not contribute.
    #[must_use]
    pub fn exact_value_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_exact_value_names(&mut names);
        names
    }

    fn collect_exact_value_names(&self, names: &mut Vec<String>) {
        match self {
            Expression::Empty | Expression::Tag(_) | Expression::Value(_) => {}
            Expression::Comparison(comparison) => {
                if comparison.operator.is_equality() {
                    push_unique(names, &comparison.value);
                }
            }
            Expression::Not(operand) => operand.collect_exact_value_names(names),
            Expression::And(left, right) | Expression::Or(left, right) => {
                left.collect_exact_value_names(names);
                right.collect_exact_value_names(names);
            }
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

/// Writes a symbol with the characters the scanner treats specially escaped.
fn write_symbol(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        if c.is_whitespace() || matches!(c, '(' | ')' | '=' | '!' | '<' | '>' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    /// Canonical, fully parenthesised rendering that parses back to an equal tree.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Empty => Ok(()),
            Expression::Tag(name) | Expression::Value(name) => write_symbol(f, name),
            Expression::Not(operand) => write!(f, "not {operand}"),
            Expression::And(left, right) => write!(f, "({left} and {right})"),
            Expression::Or(left, right) => write!(f, "({left} or {right})"),
            Expression::Comparison(comparison) => {
                write_symbol(f, &comparison.tag)?;
                write!(f, " {} ", comparison.operator)?;
                write_symbol(f, &comparison.value)
            }
        }
    }
}
