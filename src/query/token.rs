//! Lexer for the query dialect.
//!
//! Tokens are produced by a [`logos`]-derived enum; keywords are
//! case-insensitive, and every token carries its byte span so parse
//! errors can point at an offset.

use std::ops::Range;

use logos::{Lexer, Logos};

/// Token kinds of the query dialect.
#[allow(missing_docs)]
#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// End-of-input sentinel appended by the tokenizer.
    Eoi,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,

    #[regex(r"--[^\n]*", logos::skip)]
    Comment,

    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*")]
    Ident,

    #[regex(r"'([^'\\]|\\.|'')*'")]
    QuotedString,

    // UUIDs appear bare in TRAVERSE FROM; the hyphenated form cannot lex
    // as an identifier or number.
    #[regex(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}"
    )]
    LiteralUuid,

    #[regex(r"[0-9]+")]
    LiteralInteger,

    #[regex(r"([0-9]*\.[0-9]+)|([0-9]+\.[0-9]*)")]
    LiteralFloat,

    // Symbols
    #[token("=")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Lte,
    #[token(">=")]
    Gte,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(".")]
    Period,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("/")]
    Slash,
    #[token(";")]
    SemiColon,

    // Keywords
    #[token("AND", ignore(ascii_case))]
    AND,
    #[token("ASC", ignore(ascii_case))]
    ASC,
    #[token("AVG", ignore(ascii_case))]
    AVG,
    #[token("BY", ignore(ascii_case))]
    BY,
    #[token("CONTAINS", ignore(ascii_case))]
    CONTAINS,
    #[token("COUNT", ignore(ascii_case))]
    COUNT,
    #[token("DEPTH", ignore(ascii_case))]
    DEPTH,
    #[token("DESC", ignore(ascii_case))]
    DESC,
    #[token("DIRECTION", ignore(ascii_case))]
    DIRECTION,
    #[token("FALSE", ignore(ascii_case))]
    FALSE,
    #[token("FROM", ignore(ascii_case))]
    FROM,
    #[token("IN", ignore(ascii_case))]
    IN,
    #[token("JOIN", ignore(ascii_case))]
    JOIN,
    #[token("LIMIT", ignore(ascii_case))]
    LIMIT,
    #[token("LOOKUP", ignore(ascii_case))]
    LOOKUP,
    #[token("NULL", ignore(ascii_case))]
    NULL,
    #[token("OFFSET", ignore(ascii_case))]
    OFFSET,
    #[token("OR", ignore(ascii_case))]
    OR,
    #[token("ORDER", ignore(ascii_case))]
    ORDER,
    #[token("SEARCH", ignore(ascii_case))]
    SEARCH,
    #[token("SELECT", ignore(ascii_case))]
    SELECT,
    #[token("SUM", ignore(ascii_case))]
    SUM,
    #[token("TRAVERSE", ignore(ascii_case))]
    TRAVERSE,
    #[token("TRUE", ignore(ascii_case))]
    TRUE,
    #[token("TYPE", ignore(ascii_case))]
    TYPE,
    #[token("WHERE", ignore(ascii_case))]
    WHERE,
}

/// A lexed token with its source slice and byte span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    /// Token kind.
    pub kind: TokenKind,
    /// Exact source text.
    pub text: &'a str,
    /// Byte range in the statement.
    pub span: Range<usize>,
}

impl<'a> Token<'a> {
    fn eoi(source: &'a str) -> Self {
        Token {
            kind: TokenKind::Eoi,
            text: "",
            span: source.len()..source.len(),
        }
    }
}

/// Iterator adapter over the logos lexer, appending an EOI sentinel.
pub struct Tokenizer<'a> {
    source: &'a str,
    lexer: Lexer<'a, TokenKind>,
    eoi: bool,
}

impl<'a> Tokenizer<'a> {
    /// Creates a tokenizer over a statement.
    pub fn new(source: &'a str) -> Self {
        Tokenizer {
            source,
            lexer: TokenKind::lexer(source),
            eoi: false,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, usize>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lexer.next() {
            // The error payload is the byte offset of the unrecognized input.
            Some(Err(())) => Some(Err(self.lexer.span().start)),
            Some(Ok(kind)) => Some(Ok(Token {
                kind,
                text: self.lexer.slice(),
                span: self.lexer.span(),
            })),
            None if !self.eoi => {
                self.eoi = true;
                Some(Ok(Token::eoi(self.source)))
            }
            None => None,
        }
    }
}

/// Lexes a full statement, failing with the byte offset of the first
/// unrecognizable input.
pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, usize> {
    Tokenizer::new(sql).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            kinds("select Select SELECT"),
            vec![TokenKind::SELECT, TokenKind::SELECT, TokenKind::SELECT, TokenKind::Eoi]
        );
    }

    #[test]
    fn test_basic_select() {
        assert_eq!(
            kinds("SELECT name FROM resources WHERE category = 'tutorial'"),
            vec![
                TokenKind::SELECT,
                TokenKind::Ident,
                TokenKind::FROM,
                TokenKind::Ident,
                TokenKind::WHERE,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::QuotedString,
                TokenKind::Eoi,
            ]
        );
    }

    #[test]
    fn test_uuid_literal() {
        let tokens = tokenize("TRAVERSE FROM 0193807e-9e52-7ddc-b1d3-4bbefa9e15c1").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::LiteralUuid);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("10 3.5 .25"),
            vec![
                TokenKind::LiteralInteger,
                TokenKind::LiteralFloat,
                TokenKind::LiteralFloat,
                TokenKind::Eoi
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= != <> < > <= >="),
            vec![
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Lte,
                TokenKind::Gte,
                TokenKind::Eoi
            ]
        );
    }

    #[test]
    fn test_quoted_string_with_escapes() {
        let tokens = tokenize("'it''s fine'").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::QuotedString);
        assert_eq!(tokens[0].text, "'it''s fine'");
    }

    #[test]
    fn test_spans_track_offsets() {
        let tokens = tokenize("SELECT x").unwrap();
        assert_eq!(tokens[0].span, 0..6);
        assert_eq!(tokens[1].span, 7..8);
    }

    #[test]
    fn test_unrecognized_input_reports_offset() {
        let err = tokenize("SELECT ~ FROM x").unwrap_err();
        assert_eq!(err, 7);
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            kinds("SELECT -- trailing\n name"),
            vec![TokenKind::SELECT, TokenKind::Ident, TokenKind::Eoi]
        );
    }
}
