//! Tokenizer with one-token lookahead.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::QueryError;
use crate::expression::ComparisonOperator;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    End,
    OpenParen,
    CloseParen,
    Symbol(String),
    Not,
    And,
    Or,
    Comparison(ComparisonOperator),
}

impl Token {
    /// Textual class used in parse error messages.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Token::End => "end of input",
            Token::OpenParen => "'('",
            Token::CloseParen => "')'",
            Token::Symbol(_) => "symbol",
            Token::Not | Token::And | Token::Or | Token::Comparison(_) => "operator",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::End => Ok(()),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Symbol(text) => f.write_str(text),
            Token::Not => f.write_str("not"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Comparison(operator) => write!(f, "{operator}"),
        }
    }
}

/// Whether `c` may appear unescaped inside a symbol.
///
/// Letters, numbers, punctuation and symbols qualify. Whitespace, control
/// characters, invisible format characters and private-use code points do not.
#[must_use]
pub fn is_symbol_char(c: char) -> bool {
    !c.is_control() && !c.is_whitespace() && !is_invisible(c)
}

fn is_invisible(c: char) -> bool {
    matches!(c,
        '\u{00AD}'
        | '\u{061C}'
        | '\u{180E}'
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{206F}'
        | '\u{FEFF}'
        | '\u{FFF9}'..='\u{FFFB}'
        | '\u{FFFE}'..='\u{FFFF}'
        | '\u{E000}'..='\u{F8FF}'
        | '\u{E0000}'..='\u{E007F}'
        | '\u{F0000}'..='\u{10FFFF}'
    )
}

fn terminates_symbol(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '=' | '!' | '<' | '>')
}

/// Lazily turns query text into [`Token`]s.
pub struct Scanner<'a> {
    chars: Peekable<CharIndices<'a>>,
    lookahead: Option<Token>,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            lookahead: None,
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> Result<&Token, QueryError> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.read_token()?,
        };
        let token: &Token = self.lookahead.insert(token);
        Ok(token)
    }

    /// Consume the next token.
    pub fn next_token(&mut self) -> Result<Token, QueryError> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.read_token(),
        }
    }

    fn read_token(&mut self) -> Result<Token, QueryError> {
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}

        let Some(&(position, c)) = self.chars.peek() else {
            return Ok(Token::End);
        };

        match c {
            '(' => {
                self.chars.next();
                Ok(Token::OpenParen)
            }
            ')' => {
                self.chars.next();
                Ok(Token::CloseParen)
            }
            '=' | '!' | '<' | '>' => self.read_operator(position, c),
            _ => self.read_symbol(),
        }
    }

    fn read_operator(&mut self, position: usize, first: char) -> Result<Token, QueryError> {
        self.chars.next();
        let or_equal = self.chars.next_if(|&(_, c)| c == '=').is_some();

        let operator = match (first, or_equal) {
            ('=', _) => ComparisonOperator::Equal,
            ('!', true) => ComparisonOperator::NotEqual,
            ('<', false) => ComparisonOperator::LessThan,
            ('<', true) => ComparisonOperator::LessOrEqual,
            ('>', false) => ComparisonOperator::GreaterThan,
            ('>', true) => ComparisonOperator::GreaterOrEqual,
            _ => {
                return Err(QueryError::UnexpectedCharacter {
                    character: first,
                    position,
                });
            }
        };

        Ok(Token::Comparison(operator))
    }

    fn read_symbol(&mut self) -> Result<Token, QueryError> {
        let mut text = String::new();
        let mut escaped = false;

        while let Some(&(position, c)) = self.chars.peek() {
            if c == '\\' {
                self.chars.next();
                escaped = true;
                // a trailing backslash escapes nothing and is dropped
                if let Some((_, literal)) = self.chars.next() {
                    text.push(literal);
                }
                continue;
            }

            if terminates_symbol(c) {
                break;
            }

            if !is_symbol_char(c) {
                return Err(QueryError::UnexpectedCharacter {
                    character: c,
                    position,
                });
            }

            text.push(c);
            self.chars.next();
        }

        if text.is_empty() {
            return Ok(Token::End);
        }

        if !escaped {
            match text.as_str() {
                "not" | "NOT" => return Ok(Token::Not),
                "and" | "AND" => return Ok(Token::And),
                "or" | "OR" => return Ok(Token::Or),
                _ => {}
            }
            if let Some(operator) = ComparisonOperator::from_mnemonic(&text) {
                return Ok(Token::Comparison(operator));
            }
        }

        Ok(Token::Symbol(text))
    }
}
