//! Recursive-descent parser.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparison, primary.
//! Operands written side by side are joined with an implicit `and`.

use crate::error::QueryError;
use crate::expression::Expression;
use crate::scanner::{Scanner, Token};

/// Parse query text into an expression tree.
///
/// Blank text yields [`Expression::Empty`].
pub fn parse(text: &str) -> Result<Expression, QueryError> {
    Parser::new(text).parse()
}

/// Parser over a [`Scanner`].
pub struct Parser<'a> {
    scanner: Scanner<'a>,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            scanner: Scanner::new(text),
        }
    }

    /// Parse the whole input.
    pub fn parse(mut self) -> Result<Expression, QueryError> {
        if self.scanner.peek()? == &Token::End {
            return Ok(Expression::Empty);
        }

        let expression = self.or()?;

        match self.scanner.next_token()? {
            Token::End => Ok(expression),
            token => Err(unexpected(token, "end of input")),
        }
    }

    fn or(&mut self) -> Result<Expression, QueryError> {
        let mut left = self.and()?;

        while self.scanner.peek()? == &Token::Or {
            self.scanner.next_token()?;
            let right = self.and()?;
            left = Expression::or(left, right);
        }

        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, QueryError> {
        let mut left = self.not()?;

        loop {
            match self.scanner.peek()? {
                Token::And => {
                    self.scanner.next_token()?;
                }
                Token::Symbol(_) | Token::Not | Token::OpenParen => {}
                _ => return Ok(left),
            }

            let right = self.not()?;
            left = Expression::and(left, right);
        }
    }

    fn not(&mut self) -> Result<Expression, QueryError> {
        if self.scanner.peek()? == &Token::Not {
            self.scanner.next_token()?;
            let operand = self.not()?;
            return Ok(Expression::not(operand));
        }

        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expression, QueryError> {
        match self.scanner.next_token()? {
            Token::OpenParen => {
                let inner = self.or()?;
                match self.scanner.next_token()? {
                    Token::CloseParen => Ok(inner),
                    token => Err(unexpected(token, "')'")),
                }
            }
            Token::Symbol(name) => {
                if let &Token::Comparison(operator) = self.scanner.peek()? {
                    self.scanner.next_token()?;
                    let value = self.value()?;
                    Ok(Expression::comparison(name, operator, value))
                } else {
                    Ok(Expression::Tag(name))
                }
            }
            token => Err(unexpected(token, "symbol or '('")),
        }
    }

    fn value(&mut self) -> Result<String, QueryError> {
        match self.scanner.next_token()? {
            Token::Symbol(value) => Ok(value),
            token => Err(unexpected(token, "value")),
        }
    }
}

fn unexpected(token: Token, expected: &'static str) -> QueryError {
    match token {
        Token::End => QueryError::UnexpectedEnd { expected },
        token => QueryError::UnexpectedToken {
            class: token.class(),
            text: token.to_string(),
            expected,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ComparisonOperator;

    fn tag(name: &str) -> Expression {
        Expression::tag(name)
    }

    // ========== Basic Parse Tests ==========

    #[test]
    fn test_parse_blank_is_empty() {
        assert_eq!(parse("").unwrap(), Expression::Empty);
        assert_eq!(parse("   ").unwrap(), Expression::Empty);
    }

    #[test]
    fn test_parse_single_tag() {
        assert_eq!(parse("photo").unwrap(), tag("photo"));
    }

    #[test]
    fn test_parse_explicit_and() {
        assert_eq!(
            parse("photo and holiday").unwrap(),
            Expression::and(tag("photo"), tag("holiday"))
        );
    }

    #[test]
    fn test_parse_implicit_and() {
        assert_eq!(parse("photo holiday").unwrap(), parse("photo and holiday").unwrap());
        assert_eq!(parse("a not b").unwrap(), parse("a and not b").unwrap());
        assert_eq!(parse("a (b or c)").unwrap(), parse("a and (b or c)").unwrap());
    }

    // ========== Precedence Tests ==========

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(parse("a or b and c").unwrap(), parse("a or (b and c)").unwrap());
        assert_eq!(
            parse("a or b and c").unwrap(),
            Expression::or(tag("a"), Expression::and(tag("b"), tag("c")))
        );
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        assert_eq!(parse("not a and b").unwrap(), parse("(not a) and b").unwrap());
        assert_eq!(
            parse("not a and b").unwrap(),
            Expression::and(Expression::not(tag("a")), tag("b"))
        );
    }

    #[test]
    fn test_double_negation() {
        assert_eq!(
            parse("not not a").unwrap(),
            Expression::not(Expression::not(tag("a")))
        );
    }

    #[test]
    fn test_or_is_left_associative() {
        assert_eq!(
            parse("a or b or c").unwrap(),
            Expression::or(Expression::or(tag("a"), tag("b")), tag("c"))
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        assert_eq!(
            parse("(a or b) and c").unwrap(),
            Expression::and(Expression::or(tag("a"), tag("b")), tag("c"))
        );
    }

    // ========== Comparison Tests ==========

    #[test]
    fn test_parse_comparison() {
        assert_eq!(
            parse("year >= 2020").unwrap(),
            Expression::comparison("year", ComparisonOperator::GreaterOrEqual, "2020")
        );
    }

    #[test]
    fn test_equals_spellings_agree() {
        let expected = Expression::comparison("size", ComparisonOperator::Equal, "big");
        assert_eq!(parse("size=big").unwrap(), expected);
        assert_eq!(parse("size == big").unwrap(), expected);
        assert_eq!(parse("size eq big").unwrap(), expected);
    }

    #[test]
    fn test_comparison_binds_tighter_than_not() {
        assert_eq!(
            parse("not size = big").unwrap(),
            Expression::not(Expression::comparison(
                "size",
                ComparisonOperator::Equal,
                "big"
            ))
        );
    }

    #[test]
    fn test_display_round_trip() {
        let expr = parse("a or not b and year < 2000").unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    // ========== Error Tests ==========

    #[test]
    fn test_missing_close_paren() {
        assert_eq!(
            parse("(a or b"),
            Err(QueryError::UnexpectedEnd { expected: "')'" })
        );
    }

    #[test]
    fn test_dangling_operator() {
        assert_eq!(
            parse("a and"),
            Err(QueryError::UnexpectedEnd {
                expected: "symbol or '('"
            })
        );
    }

    #[test]
    fn test_leading_close_paren() {
        assert_eq!(
            parse(")"),
            Err(QueryError::UnexpectedToken {
                class: "')'",
                text: ")".to_string(),
                expected: "symbol or '('",
            })
        );
    }

    #[test]
    fn test_comparison_without_value() {
        assert_eq!(
            parse("year >="),
            Err(QueryError::UnexpectedEnd { expected: "value" })
        );
    }

    #[test]
    fn test_comparison_after_parenthesis_rejected() {
        let err = parse("(a) = b").unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnexpectedToken {
                class: "operator",
                expected: "end of input",
                ..
            }
        ));
    }

    #[test]
    fn test_stray_close_paren_after_expression() {
        let err = parse("a b)").unwrap_err();
        assert!(err.to_string().contains("expecting end of input"));
    }
}
