//! SQL shape scanner.
//!
//! Tokenizes a statement far enough to locate clause boundaries and
//! identifier positions without building a full parse tree. Strings,
//! quoted identifiers, comments, and placeholders are recognized as
//! units so that later keyword matching never fires inside a literal.

use crate::token::{Span, SqlToken, TokenKind};
use std::iter::Peekable;
use std::str::CharIndices;

pub struct SqlScanner<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    pos: usize,
}

impl<'a> SqlScanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            pos: 0,
        }
    }

    /// Tokenize the entire statement.
    pub fn tokenize(mut self) -> Vec<SqlToken> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                break;
            };

            let kind = match c {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                '.' => {
                    self.advance();
                    TokenKind::Dot
                }
                ';' => {
                    self.advance();
                    TokenKind::Semicolon
                }
                '\'' => self.scan_string_literal(),
                '"' => self.scan_quoted_identifier(),
                '$' => self.scan_dollar(),
                '-' => {
                    self.advance();
                    if self.peek_char() == Some('-') {
                        self.scan_line_comment()
                    } else {
                        TokenKind::Operator("-".to_string())
                    }
                }
                '/' => {
                    self.advance();
                    if self.peek_char() == Some('*') {
                        self.scan_block_comment()
                    } else {
                        TokenKind::Operator("/".to_string())
                    }
                }
                c if c.is_ascii_digit() => self.scan_number(),
                c if c.is_ascii_alphabetic() || c == '_' => self.scan_identifier(),
                _ => {
                    self.advance();
                    TokenKind::Operator(c.to_string())
                }
            };

            tokens.push(SqlToken {
                kind,
                span: Span {
                    start,
                    end: self.pos,
                },
            });
        }
        tokens
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let (i, c) = self.chars.next()?;
        self.pos = i + c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    /// Single-quoted literal with `''` escapes. The content is discarded.
    fn scan_string_literal(&mut self) -> TokenKind {
        self.advance(); // opening quote
        loop {
            match self.advance() {
                Some('\'') => {
                    // Doubled quote is an escaped quote, not a terminator.
                    if self.peek_char() == Some('\'') {
                        self.advance();
                    } else {
                        return TokenKind::StringLit;
                    }
                }
                Some(_) => {}
                None => return TokenKind::Malformed("unterminated string literal".to_string()),
            }
        }
    }

    fn scan_quoted_identifier(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let start = self.pos;
        loop {
            match self.advance() {
                Some('"') => {
                    if self.peek_char() == Some('"') {
                        self.advance();
                    } else {
                        let end = self.pos - 1;
                        return TokenKind::QuotedIdent(
                            self.source[start..end].replace("\"\"", "\""),
                        );
                    }
                }
                Some(_) => {}
                None => return TokenKind::Malformed("unterminated quoted identifier".to_string()),
            }
        }
    }

    /// `$N` placeholder or `$tag$...$tag$` dollar-quoted string.
    fn scan_dollar(&mut self) -> TokenKind {
        self.advance(); // '$'
        let start = self.pos;

        if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            let digits = &self.source[start..self.pos];
            return match digits.parse() {
                Ok(n) => TokenKind::Placeholder(n),
                Err(_) => TokenKind::Malformed(format!("placeholder out of range: ${}", digits)),
            };
        }

        // Dollar-quoted string: $tag$ ... $tag$
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        if self.peek_char() != Some('$') {
            return TokenKind::Malformed("bare '$' outside placeholder".to_string());
        }
        self.advance();
        let closer = format!("${}$", &self.source[start..self.pos - 1]);
        match self.source[self.pos..].find(&closer) {
            Some(offset) => {
                let target = self.pos + offset + closer.len();
                while self.pos < target {
                    self.advance();
                }
                TokenKind::StringLit
            }
            None => TokenKind::Malformed("unterminated dollar-quoted string".to_string()),
        }
    }

    fn scan_line_comment(&mut self) -> TokenKind {
        while let Some(c) = self.peek_char() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        TokenKind::LineComment
    }

    fn scan_block_comment(&mut self) -> TokenKind {
        self.advance(); // '*'
        let mut depth = 1u32;
        while depth > 0 {
            match self.advance() {
                Some('*') if self.peek_char() == Some('/') => {
                    self.advance();
                    depth -= 1;
                }
                Some('/') if self.peek_char() == Some('*') => {
                    self.advance();
                    depth += 1;
                }
                Some(_) => {}
                None => return TokenKind::Malformed("unterminated block comment".to_string()),
            }
        }
        TokenKind::BlockComment
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.')
        {
            self.advance();
        }
        TokenKind::Number(self.source[start..self.pos].to_string())
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        TokenKind::Ident(self.source[start..self.pos].to_string())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// The scanner never panics on arbitrary input.
        #[test]
        fn prop_scanner_total(input in ".{0,200}") {
            let _ = SqlScanner::new(&input).tokenize();
        }

        /// Token spans are monotone and within bounds.
        #[test]
        fn prop_spans_ordered(input in "[ -~]{0,200}") {
            let tokens = SqlScanner::new(&input).tokenize();
            let mut last_end = 0;
            for token in &tokens {
                prop_assert!(token.span.start >= last_end);
                prop_assert!(token.span.end <= input.len());
                last_end = token.span.end;
            }
        }
    }
}
