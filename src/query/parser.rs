//! Recursive-descent parser for the query dialect.
//!
//! Grammar (keywords case-insensitive):
//!
//! ```text
//! statement  := select | search | traverse | lookup
//! select     := SELECT fields FROM ident [WHERE pred]
//!               [ORDER BY field [ASC|DESC]] [LIMIT int] [OFFSET int]
//! search     := SEARCH string IN ident [WHERE pred] [LIMIT int]
//! traverse   := TRAVERSE FROM uuid [DEPTH int]
//!               [DIRECTION in|out|both] [TYPE string]
//! lookup     := LOOKUP string (',' string)*
//! pred       := and_expr (OR and_expr)*
//! and_expr   := factor (AND factor)*
//! factor     := '(' pred ')' | CONTAINS '(' field ',' string ')'
//!             | field IN '(' scalar (',' scalar)* ')'
//!             | vector_slot '.' fn '(' string ')' [('>'|'>=') number]
//!             | field op scalar
//! ```
//!
//! Parse failures are `QuerySyntaxError` with the byte offset of the
//! offending token. Recognized-but-refused constructs (aggregates, JOIN,
//! arithmetic, subqueries) are `QueryUnsupported`.

use super::ast::{
    CompareOp, Predicate, Projection, Scalar, SimilarityFn, SortOrder, Statement,
};
use super::token::{tokenize, Token, TokenKind};
use crate::entity::Direction;
use crate::error::{QueryError, Result};
use crate::types::EntityId;
use crate::vector::VectorSlot;

/// Default traversal depth when `DEPTH` is omitted.
const DEFAULT_TRAVERSE_DEPTH: usize = 1;

/// Parses one statement.
pub fn parse(sql: &str) -> Result<Statement> {
    let tokens = tokenize(sql)
        .map_err(|offset| QueryError::syntax(offset, "unrecognized input"))?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    parser.expect_end()?;
    Ok(statement)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token<'a> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token<'a>> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> crate::error::RemError {
        QueryError::syntax(self.peek().span.start, message).into()
    }

    fn unsupported(&self, what: &str) -> crate::error::RemError {
        QueryError::unsupported(what).into()
    }

    fn expect_end(&mut self) -> Result<()> {
        // A single trailing semicolon is tolerated.
        self.eat(TokenKind::SemiColon);
        if self.peek().kind == TokenKind::Eoi {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self) -> Result<Statement> {
        match self.peek().kind {
            TokenKind::SELECT => self.select(),
            TokenKind::SEARCH => self.search(),
            TokenKind::TRAVERSE => self.traverse(),
            TokenKind::LOOKUP => self.lookup(),
            TokenKind::JOIN => Err(self.unsupported("JOIN statements")),
            _ => Err(self.error("expected SELECT, SEARCH, TRAVERSE, or LOOKUP")),
        }
    }

    fn select(&mut self) -> Result<Statement> {
        self.expect(TokenKind::SELECT, "SELECT")?;
        let projection = self.projection()?;
        self.expect(TokenKind::FROM, "FROM")?;
        if self.peek().kind == TokenKind::LParen {
            return Err(self.unsupported("subqueries"));
        }
        let entity_type = self.type_name()?;

        let predicate = if self.eat(TokenKind::WHERE) {
            Some(self.predicate()?)
        } else {
            None
        };

        let order_by = if self.eat(TokenKind::ORDER) {
            self.expect(TokenKind::BY, "BY after ORDER")?;
            let field = self.field_path()?;
            let order = if self.eat(TokenKind::ASC) {
                SortOrder::Asc
            } else if self.eat(TokenKind::DESC) {
                SortOrder::Desc
            } else {
                SortOrder::Asc
            };
            Some((field, order))
        } else {
            None
        };

        let limit = self.limit_clause()?;
        let offset = if self.eat(TokenKind::OFFSET) {
            Some(self.unsigned_int("OFFSET")?)
        } else {
            None
        };

        Ok(Statement::Select {
            projection,
            entity_type,
            predicate,
            order_by,
            limit,
            offset,
        })
    }

    fn search(&mut self) -> Result<Statement> {
        self.expect(TokenKind::SEARCH, "SEARCH")?;
        let text = self.string_literal("search text")?;
        self.expect(TokenKind::IN, "IN")?;
        let entity_type = self.type_name()?;

        let predicate = if self.eat(TokenKind::WHERE) {
            Some(self.predicate()?)
        } else {
            None
        };
        let limit = self.limit_clause()?;

        Ok(Statement::Search {
            text,
            entity_type,
            predicate,
            limit,
        })
    }

    fn traverse(&mut self) -> Result<Statement> {
        self.expect(TokenKind::TRAVERSE, "TRAVERSE")?;
        self.expect(TokenKind::FROM, "FROM")?;

        let start = match self.peek().kind {
            TokenKind::LiteralUuid => {
                let token = self.advance();
                EntityId::parse(token.text)
                    .ok_or_else(|| self.error("invalid uuid"))?
            }
            TokenKind::QuotedString => {
                let token = self.advance();
                let text = unquote(token.text);
                EntityId::parse(&text).ok_or_else(|| self.error("invalid uuid"))?
            }
            _ => return Err(self.error("expected a uuid after FROM")),
        };

        let mut depth = DEFAULT_TRAVERSE_DEPTH;
        let mut direction = Direction::Out;
        let mut edge_type = None;

        loop {
            if self.eat(TokenKind::DEPTH) {
                depth = self.unsigned_int("DEPTH")?;
            } else if self.eat(TokenKind::DIRECTION) {
                direction = match self.peek().kind {
                    TokenKind::IN => {
                        self.advance();
                        Direction::In
                    }
                    TokenKind::Ident => {
                        let token = self.advance();
                        match token.text.to_ascii_lowercase().as_str() {
                            "out" => Direction::Out,
                            "both" => Direction::Both,
                            _ => return Err(self.error("expected in, out, or both")),
                        }
                    }
                    _ => return Err(self.error("expected in, out, or both")),
                };
            } else if self.eat(TokenKind::TYPE) {
                edge_type = Some(self.string_literal("edge type")?);
            } else {
                break;
            }
        }

        Ok(Statement::Traverse {
            start,
            depth,
            direction,
            edge_type,
        })
    }

    fn lookup(&mut self) -> Result<Statement> {
        self.expect(TokenKind::LOOKUP, "LOOKUP")?;
        let mut values = vec![self.string_literal("lookup value")?];
        while self.eat(TokenKind::Comma) {
            values.push(self.string_literal("lookup value")?);
        }
        Ok(Statement::Lookup { values })
    }

    // ========================================================================
    // Clauses
    // ========================================================================

    fn projection(&mut self) -> Result<Projection> {
        if self.eat(TokenKind::Star) {
            return Ok(Projection::All);
        }
        let mut fields = vec![self.projected_field()?];
        while self.eat(TokenKind::Comma) {
            fields.push(self.projected_field()?);
        }
        Ok(Projection::Fields(fields))
    }

    fn projected_field(&mut self) -> Result<String> {
        match self.peek().kind {
            TokenKind::COUNT | TokenKind::SUM | TokenKind::AVG => {
                let token = self.advance();
                Err(self.unsupported(&format!(
                    "aggregate {}",
                    token.text.to_ascii_uppercase()
                )))
            }
            _ => self.field_path(),
        }
    }

    fn type_name(&mut self) -> Result<String> {
        let token = self.expect(TokenKind::Ident, "a type name")?;
        Ok(token.text.to_string())
    }

    fn limit_clause(&mut self) -> Result<Option<usize>> {
        if !self.eat(TokenKind::LIMIT) {
            return Ok(None);
        }
        if self.peek().kind == TokenKind::Minus {
            // Negative limits are a syntax error, not an unsupported feature.
            return Err(self.error("LIMIT must be non-negative"));
        }
        Ok(Some(self.unsigned_int("LIMIT")?))
    }

    fn unsigned_int(&mut self, what: &str) -> Result<usize> {
        if self.peek().kind == TokenKind::Minus {
            return Err(self.error(format!("{} must be non-negative", what)));
        }
        let token = self.expect(TokenKind::LiteralInteger, &format!("an integer after {}", what))?;
        token
            .text
            .parse::<usize>()
            .map_err(|_| self.error(format!("{} out of range", what)))
    }

    /// A dotted field path (`category`, `author.name`).
    fn field_path(&mut self) -> Result<String> {
        let first = self.expect(TokenKind::Ident, "a field name")?;
        let mut path = first.text.to_string();
        while self.peek().kind == TokenKind::Period {
            // Don't consume the dot of `embedding.cosine(...)`; the
            // predicate parser owns that form.
            if self.similarity_fn_ahead() {
                break;
            }
            self.advance();
            let segment = self.expect(TokenKind::Ident, "a field name after '.'")?;
            path.push('.');
            path.push_str(segment.text);
        }
        Ok(path)
    }

    /// True when the upcoming `.ident(` is a similarity call.
    fn similarity_fn_ahead(&self) -> bool {
        let Some(name) = self.tokens.get(self.pos + 1) else {
            return false;
        };
        let Some(paren) = self.tokens.get(self.pos + 2) else {
            return false;
        };
        name.kind == TokenKind::Ident
            && matches!(
                name.text.to_ascii_lowercase().as_str(),
                "cosine" | "inner_product"
            )
            && paren.kind == TokenKind::LParen
    }

    fn string_literal(&mut self, what: &str) -> Result<String> {
        let token = self.expect(TokenKind::QuotedString, &format!("a quoted {}", what))?;
        Ok(unquote(token.text))
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    fn predicate(&mut self) -> Result<Predicate> {
        let mut left = self.and_expr()?;
        while self.eat(TokenKind::OR) {
            let right = self.and_expr()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Predicate> {
        let mut left = self.factor()?;
        while self.eat(TokenKind::AND) {
            let right = self.factor()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Predicate> {
        match self.peek().kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.predicate()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::CONTAINS => {
                self.advance();
                self.expect(TokenKind::LParen, "'(' after CONTAINS")?;
                let field = self.field_path()?;
                self.expect(TokenKind::Comma, "',' in CONTAINS")?;
                let needle = self.string_literal("substring")?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Predicate::Contains { field, needle })
            }
            TokenKind::COUNT | TokenKind::SUM | TokenKind::AVG => {
                let token = self.advance();
                Err(self.unsupported(&format!(
                    "aggregate {}",
                    token.text.to_ascii_uppercase()
                )))
            }
            TokenKind::Ident => self.comparison(),
            _ => Err(self.error("expected a predicate")),
        }
    }

    fn comparison(&mut self) -> Result<Predicate> {
        let field = self.field_path()?;

        // Similarity call: the path stopped right before `.fn(`.
        if self.peek().kind == TokenKind::Period && self.similarity_fn_ahead() {
            return self.similarity(&field);
        }

        if self.eat(TokenKind::IN) {
            self.expect(TokenKind::LParen, "'(' after IN")?;
            let mut values = vec![self.scalar()?];
            while self.eat(TokenKind::Comma) {
                values.push(self.scalar()?);
            }
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(Predicate::InList { field, values });
        }

        let op = match self.peek().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::NotEq,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::Plus | TokenKind::Minus | TokenKind::Slash | TokenKind::Star => {
                return Err(self.unsupported("arithmetic in predicates"))
            }
            _ => return Err(self.error("expected a comparison operator")),
        };
        self.advance();
        let value = self.scalar()?;
        Ok(Predicate::Compare { field, op, value })
    }

    fn similarity(&mut self, field: &str) -> Result<Predicate> {
        let Some(slot) = VectorSlot::from_field_name(field) else {
            return Err(self.error("similarity calls apply to 'embedding' or 'embedding_alt'"));
        };
        self.expect(TokenKind::Period, "'.'")?;
        let name = self.expect(TokenKind::Ident, "a similarity function")?;
        let function = match name.text.to_ascii_lowercase().as_str() {
            "cosine" => SimilarityFn::Cosine,
            "inner_product" => SimilarityFn::InnerProduct,
            _ => return Err(self.error("expected cosine or inner_product")),
        };
        self.expect(TokenKind::LParen, "'('")?;
        let text = self.string_literal("similarity text")?;
        self.expect(TokenKind::RParen, "')'")?;

        // Optional score guard: `embedding.cosine('x') >= 0.7`.
        let min_score = if self.peek().kind == TokenKind::Gte || self.peek().kind == TokenKind::Gt
        {
            self.advance();
            Some(f64::from(self.number()?) as f32)
        } else if matches!(
            self.peek().kind,
            TokenKind::Lt | TokenKind::Lte | TokenKind::Eq | TokenKind::NotEq
        ) {
            return Err(self.unsupported("similarity scores only support > and >= guards"));
        } else {
            None
        };

        Ok(Predicate::Similarity {
            slot,
            function,
            text,
            min_score,
        })
    }

    fn scalar(&mut self) -> Result<Scalar> {
        match self.peek().kind {
            TokenKind::NULL => {
                self.advance();
                Ok(Scalar::Null)
            }
            TokenKind::TRUE => {
                self.advance();
                Ok(Scalar::Bool(true))
            }
            TokenKind::FALSE => {
                self.advance();
                Ok(Scalar::Bool(false))
            }
            TokenKind::QuotedString => {
                let token = self.advance();
                Ok(Scalar::Str(unquote(token.text)))
            }
            TokenKind::Minus => {
                self.advance();
                match self.number()? {
                    Number::Int(i) => Ok(Scalar::Int(-i)),
                    Number::Float(f) => Ok(Scalar::Float(-f)),
                }
            }
            TokenKind::LiteralInteger | TokenKind::LiteralFloat => match self.number()? {
                Number::Int(i) => Ok(Scalar::Int(i)),
                Number::Float(f) => Ok(Scalar::Float(f)),
            },
            _ => Err(self.error("expected a literal value")),
        }
    }

    fn number(&mut self) -> Result<Number> {
        match self.peek().kind {
            TokenKind::LiteralInteger => {
                let token = self.advance();
                token
                    .text
                    .parse::<i64>()
                    .map(Number::Int)
                    .map_err(|_| self.error("integer out of range"))
            }
            TokenKind::LiteralFloat => {
                let token = self.advance();
                token
                    .text
                    .parse::<f64>()
                    .map(Number::Float)
                    .map_err(|_| self.error("malformed number"))
            }
            _ => Err(self.error("expected a number")),
        }
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

impl From<Number> for f64 {
    fn from(n: Number) -> f64 {
        match n {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Strips quotes and resolves `''` and backslash escapes.
fn unquote(text: &str) -> String {
    let inner = &text[1..text.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '\'' => {
                // Doubled quote inside a quoted string
                if chars.peek() == Some(&'\'') {
                    chars.next();
                }
                out.push('\'');
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemError;

    fn parse_ok(sql: &str) -> Statement {
        parse(sql).unwrap()
    }

    #[test]
    fn test_select_star() {
        let stmt = parse_ok("SELECT * FROM resources");
        match stmt {
            Statement::Select {
                projection,
                entity_type,
                predicate,
                ..
            } => {
                assert_eq!(projection, Projection::All);
                assert_eq!(entity_type, "resources");
                assert!(predicate.is_none());
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_select_fields_where_order_limit_offset() {
        let stmt = parse_ok(
            "select name, author.email from resources \
             where category = 'tutorial' and depth >= 2 \
             order by name desc limit 10 offset 5",
        );
        match stmt {
            Statement::Select {
                projection,
                predicate,
                order_by,
                limit,
                offset,
                ..
            } => {
                assert_eq!(
                    projection,
                    Projection::Fields(vec!["name".into(), "author.email".into()])
                );
                assert_eq!(predicate.unwrap().conjuncts().len(), 2);
                assert_eq!(order_by, Some(("name".into(), SortOrder::Desc)));
                assert_eq!(limit, Some(10));
                assert_eq!(offset, Some(5));
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_where_in_and_contains() {
        let stmt = parse_ok(
            "SELECT * FROM resources WHERE category IN ('a', 'b') OR CONTAINS(name, 'gui')",
        );
        match stmt {
            Statement::Select { predicate, .. } => {
                assert!(matches!(predicate.unwrap(), Predicate::Or(_, _)));
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_predicate() {
        let stmt =
            parse_ok("SELECT * FROM r WHERE (a = 1 OR b = 2) AND c != 'x'");
        match stmt {
            Statement::Select { predicate, .. } => {
                let pred = predicate.unwrap();
                assert_eq!(pred.conjuncts().len(), 2);
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_similarity_predicate() {
        let stmt = parse_ok(
            "SELECT name FROM resources WHERE embedding.cosine('authentication') AND category = 'tutorial' LIMIT 10",
        );
        match stmt {
            Statement::Select { predicate, .. } => {
                let pred = predicate.unwrap();
                let sim = pred.similarity().cloned().unwrap();
                match sim {
                    Predicate::Similarity {
                        slot,
                        function,
                        text,
                        min_score,
                    } => {
                        assert_eq!(slot, VectorSlot::Default);
                        assert_eq!(function, SimilarityFn::Cosine);
                        assert_eq!(text, "authentication");
                        assert!(min_score.is_none());
                    }
                    other => panic!("expected Similarity, got {:?}", other),
                }
            }
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_similarity_with_threshold_and_alt_slot() {
        let stmt = parse_ok("SELECT * FROM r WHERE embedding_alt.inner_product('x') >= 0.7");
        match stmt {
            Statement::Select { predicate, .. } => match predicate.unwrap() {
                Predicate::Similarity {
                    slot,
                    function,
                    min_score,
                    ..
                } => {
                    assert_eq!(slot, VectorSlot::Alt);
                    assert_eq!(function, SimilarityFn::InnerProduct);
                    assert!((min_score.unwrap() - 0.7).abs() < 1e-6);
                }
                other => panic!("expected Similarity, got {:?}", other),
            },
            other => panic!("expected Select, got {:?}", other),
        }
    }

    #[test]
    fn test_search_statement() {
        let stmt = parse_ok("SEARCH 'python basics' IN resources WHERE category = 'tutorial' LIMIT 5");
        match stmt {
            Statement::Search {
                text,
                entity_type,
                predicate,
                limit,
            } => {
                assert_eq!(text, "python basics");
                assert_eq!(entity_type, "resources");
                assert!(predicate.is_some());
                assert_eq!(limit, Some(5));
            }
            other => panic!("expected Search, got {:?}", other),
        }
    }

    #[test]
    fn test_traverse_statement() {
        let id = EntityId::new();
        let stmt = parse_ok(&format!(
            "TRAVERSE FROM {} DEPTH 2 DIRECTION out TYPE 'knows'",
            id
        ));
        match stmt {
            Statement::Traverse {
                start,
                depth,
                direction,
                edge_type,
            } => {
                assert_eq!(start, id);
                assert_eq!(depth, 2);
                assert_eq!(direction, Direction::Out);
                assert_eq!(edge_type.as_deref(), Some("knows"));
            }
            other => panic!("expected Traverse, got {:?}", other),
        }
    }

    #[test]
    fn test_traverse_direction_in_and_quoted_uuid() {
        let id = EntityId::new();
        let stmt = parse_ok(&format!("TRAVERSE FROM '{}' DIRECTION in", id));
        match stmt {
            Statement::Traverse {
                start, direction, depth, ..
            } => {
                assert_eq!(start, id);
                assert_eq!(direction, Direction::In);
                assert_eq!(depth, 1);
            }
            other => panic!("expected Traverse, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_statement() {
        let stmt = parse_ok("LOOKUP 'alice', 'bob'");
        assert_eq!(
            stmt,
            Statement::Lookup {
                values: vec!["alice".into(), "bob".into()]
            }
        );
    }

    #[test]
    fn test_negative_limit_is_syntax_error() {
        let err = parse("SELECT * FROM r LIMIT -1").unwrap_err();
        assert!(matches!(
            err,
            RemError::Query(QueryError::Syntax { .. })
        ));
    }

    #[test]
    fn test_aggregates_unsupported() {
        for sql in [
            "SELECT COUNT FROM r",
            "SELECT SUM FROM r",
            "SELECT AVG FROM r",
        ] {
            let err = parse(sql).unwrap_err();
            assert!(
                matches!(err, RemError::Query(QueryError::Unsupported(_))),
                "{} should be unsupported",
                sql
            );
        }
    }

    #[test]
    fn test_arithmetic_unsupported() {
        let err = parse("SELECT * FROM r WHERE a / 2 = 1").unwrap_err();
        assert!(matches!(err, RemError::Query(QueryError::Unsupported(_))));
    }

    #[test]
    fn test_subquery_unsupported() {
        let err = parse("SELECT * FROM (SELECT * FROM r)").unwrap_err();
        assert!(matches!(err, RemError::Query(QueryError::Unsupported(_))));
    }

    #[test]
    fn test_syntax_error_carries_offset() {
        let err = parse("SELECT name FRM resources").unwrap_err();
        match err {
            RemError::Query(QueryError::Syntax { offset, .. }) => {
                assert_eq!(offset, 12);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_escaped_quotes() {
        let stmt = parse_ok("LOOKUP 'it''s'");
        assert_eq!(
            stmt,
            Statement::Lookup {
                values: vec!["it's".into()]
            }
        );
    }

    #[test]
    fn test_trailing_semicolon_ok() {
        assert!(parse("SELECT * FROM r;").is_ok());
        assert!(parse("SELECT * FROM r; garbage").is_err());
    }

    #[test]
    fn test_negative_scalar_in_predicate() {
        let stmt = parse_ok("SELECT * FROM r WHERE delta = -3");
        match stmt {
            Statement::Select { predicate, .. } => match predicate.unwrap() {
                Predicate::Compare { value, .. } => assert_eq!(value, Scalar::Int(-3)),
                other => panic!("expected Compare, got {:?}", other),
            },
            other => panic!("expected Select, got {:?}", other),
        }
    }
}
