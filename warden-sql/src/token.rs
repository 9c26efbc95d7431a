//! SQL token types.

/// Byte range of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Token kinds the shape scanner distinguishes.
///
/// This is a shape-level vocabulary, not a full SQL grammar: the
/// augmenter only needs to know where clauses begin and end, which
/// identifiers name tables and columns, and where string and comment
/// regions are so keyword matches inside them never count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword; keywords are recognized at use sites
    /// with case-insensitive comparison.
    Ident(String),
    /// Double-quoted identifier, quotes stripped.
    QuotedIdent(String),
    /// Single-quoted or dollar-quoted string literal. Contents are
    /// deliberately not retained.
    StringLit,
    Number(String),
    /// Positional placeholder `$N`.
    Placeholder(u32),
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    /// Any other operator or punctuation character run.
    Operator(String),
    /// `--` line comment.
    LineComment,
    /// `/* ... */` block comment.
    BlockComment,
    /// A byte sequence the scanner could not classify, such as an
    /// unterminated string. Presence of this token fails the pre-check.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlToken {
    pub kind: TokenKind,
    pub span: Span,
}

impl SqlToken {
    /// Case-insensitive keyword test for bare identifiers. Quoted
    /// identifiers never match keywords.
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(word))
    }

    /// Identifier text, for either quoting style.
    pub fn ident_text(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) | TokenKind::QuotedIdent(s) => Some(s.as_str()),
            _ => None,
        }
    }
}
