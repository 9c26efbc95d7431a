//! Statement shape analysis.
//!
//! Walks the token stream once and records everything the security
//! pre-check and the augmenter need: statement kind, the tables it
//! targets, clause boundaries as byte offsets, placeholder numbering,
//! and the suspicious shapes the deny pass looks for.

use crate::scanner::SqlScanner;
use crate::token::{SqlToken, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Anything else (BEGIN, SET, EXPLAIN, ...). Passed through after
    /// the security pre-check, never augmented.
    Other,
}

/// A table referenced at the top level of the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Unqualified table name (last dotted segment).
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// The prefix to qualify an injected predicate with.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Everything learned from one pass over the tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub kind: StatementKind,
    /// Tables targeted at paren depth zero (FROM list, JOINs, the
    /// UPDATE/DELETE/INSERT target).
    pub tables: Vec<TableRef>,
    /// Tables referenced inside parenthesized subqueries.
    pub subquery_tables: Vec<String>,
    pub has_where: bool,
    /// Byte offset just past the WHERE keyword, when present.
    pub where_end: Option<usize>,
    /// Byte offset of the first trailing clause keyword (GROUP BY,
    /// ORDER BY, LIMIT, ...) at depth zero, when present.
    pub clause_tail: Option<usize>,
    /// Byte offset where the statement body ends (before any trailing
    /// semicolon and whitespace).
    pub statement_end: usize,
    pub max_placeholder: u32,
    /// Column list of an INSERT, lowercased. Empty when the statement
    /// has no explicit column list.
    pub insert_columns: Vec<String>,
    /// Columns compared with `=` in the depth-zero WHERE clause, in
    /// lowercased dotted form exactly as written (`tenant_id`,
    /// `u.tenant_id`).
    pub where_eq_columns: Vec<String>,
    pub has_comment: bool,
    /// A second statement follows a semicolon.
    pub stacked: bool,
    /// UNION / INTERSECT / EXCEPT at depth zero.
    pub has_set_operation: bool,
    /// `OR <literal> = <same literal>` or `OR true` at any depth.
    pub has_tautology: bool,
    /// First denied DDL keyword seen anywhere outside strings/comments.
    pub ddl_keyword: Option<String>,
    /// First unscannable byte sequence, if any.
    pub malformed: Option<String>,
}

/// Keywords that terminate a table alias position.
const ALIAS_STOPWORDS: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "cross", "outer", "on", "using", "group",
    "order", "limit", "offset", "having", "set", "values", "returning", "union", "intersect",
    "except", "for", "fetch", "window", "natural",
];

/// Keywords that begin the trailing clauses of a statement.
const TAIL_KEYWORDS: &[&str] = &[
    "group", "order", "limit", "offset", "having", "returning", "for", "fetch", "window",
];

pub fn analyze(sql: &str) -> QueryPlan {
    let tokens = SqlScanner::new(sql).tokenize();
    Analyzer::new(sql, &tokens).run()
}

struct Analyzer<'a> {
    sql: &'a str,
    tokens: &'a [SqlToken],
    idx: usize,
    depth: u32,
    plan: QueryPlan,
}

impl<'a> Analyzer<'a> {
    fn new(sql: &'a str, tokens: &'a [SqlToken]) -> Self {
        Self {
            sql,
            tokens,
            idx: 0,
            depth: 0,
            plan: QueryPlan {
                kind: StatementKind::Other,
                tables: Vec::new(),
                subquery_tables: Vec::new(),
                has_where: false,
                where_end: None,
                clause_tail: None,
                statement_end: sql.trim_end().len(),
                max_placeholder: 0,
                insert_columns: Vec::new(),
                where_eq_columns: Vec::new(),
                has_comment: false,
                stacked: false,
                has_set_operation: false,
                has_tautology: false,
                ddl_keyword: None,
                malformed: None,
            },
        }
    }

    fn peek(&self) -> Option<&'a SqlToken> {
        self.tokens[self.idx..]
            .iter()
            .find(|t| !matches!(t.kind, TokenKind::LineComment | TokenKind::BlockComment))
    }

    fn next(&mut self) -> Option<&'a SqlToken> {
        while let Some(token) = self.tokens.get(self.idx) {
            self.idx += 1;
            match &token.kind {
                TokenKind::LineComment | TokenKind::BlockComment => continue,
                TokenKind::LParen => self.depth += 1,
                TokenKind::RParen => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
            return Some(token);
        }
        None
    }

    fn run(mut self) -> QueryPlan {
        self.scan_global_shapes();
        self.plan.kind = self.statement_kind();

        let mut after_where = false;
        let mut saw_statement_body = false;
        while let Some(token) = self.next() {
            if let TokenKind::Malformed(reason) = &token.kind {
                if self.plan.malformed.is_none() {
                    self.plan.malformed = Some(reason.clone());
                }
                continue;
            }
            if matches!(token.kind, TokenKind::Semicolon) && self.depth == 0 {
                if self.peek().is_some() {
                    self.plan.stacked = true;
                }
                self.plan.statement_end = self.plan.statement_end.min(token.span.start);
                continue;
            }

            if self.depth == 0 {
                if token.is_keyword("where") {
                    self.plan.has_where = true;
                    self.plan.where_end = Some(token.span.end);
                    after_where = true;
                } else if token.is_keyword("union")
                    || token.is_keyword("intersect")
                    || token.is_keyword("except")
                {
                    self.plan.has_set_operation = true;
                } else if saw_statement_body
                    && TAIL_KEYWORDS.iter().any(|k| token.is_keyword(k))
                    && self.plan.clause_tail.is_none()
                {
                    self.plan.clause_tail = Some(token.span.start);
                }
            }

            // Table positions.
            if token.is_keyword("from") || token.is_keyword("join") {
                let depth = self.depth;
                let from_list = token.is_keyword("from");
                self.collect_tables(depth, from_list, depth == 0);
                saw_statement_body = true;
            } else if self.depth == 0
                && token.is_keyword("update")
                && self.plan.kind == StatementKind::Update
                && self.plan.tables.is_empty()
            {
                self.read_target_table(true);
                saw_statement_body = true;
            } else if self.depth == 0
                && token.is_keyword("into")
                && self.plan.kind == StatementKind::Insert
                && self.plan.tables.is_empty()
            {
                self.read_target_table(false);
                self.collect_insert_columns();
                saw_statement_body = true;
            }

            if after_where && self.depth == 0 {
                self.record_where_equality(token);
            }
        }

        self.scan_tautology();
        self.plan
    }

    /// One cheap pass for shapes that do not depend on position.
    fn scan_global_shapes(&mut self) {
        const DDL: &[&str] = &["drop", "truncate", "alter", "grant", "revoke"];
        for token in self.tokens {
            match &token.kind {
                TokenKind::LineComment | TokenKind::BlockComment => self.plan.has_comment = true,
                TokenKind::Placeholder(n) => {
                    self.plan.max_placeholder = self.plan.max_placeholder.max(*n)
                }
                TokenKind::Ident(s) => {
                    let lower = s.to_lowercase();
                    if self.plan.ddl_keyword.is_none() && DDL.contains(&lower.as_str()) {
                        self.plan.ddl_keyword = Some(lower);
                    }
                }
                _ => {}
            }
        }
    }

    fn statement_kind(&self) -> StatementKind {
        let Some(first) = self.peek() else {
            return StatementKind::Other;
        };
        if first.is_keyword("select") {
            StatementKind::Select
        } else if first.is_keyword("insert") {
            StatementKind::Insert
        } else if first.is_keyword("update") {
            StatementKind::Update
        } else if first.is_keyword("delete") {
            StatementKind::Delete
        } else {
            StatementKind::Other
        }
    }

    /// Read one or more table references starting at the current token.
    ///
    /// `from_list` allows comma-separated continuation; `top_level`
    /// routes the result into `tables` rather than `subquery_tables`.
    fn collect_tables(&mut self, at_depth: u32, from_list: bool, top_level: bool) {
        loop {
            // A parenthesized FROM source is a subquery; its own FROM
            // keyword is picked up by the main loop at a deeper depth.
            match self.peek() {
                Some(t) if t.ident_text().is_some() => {}
                _ => return,
            }

            let Some(name) = self.read_dotted_name() else {
                return;
            };

            // A name followed immediately by '(' is a function source,
            // not a table.
            let is_function = matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen));
            if !is_function {
                let alias = self.read_alias();
                if top_level {
                    self.plan.tables.push(TableRef { name, alias });
                } else {
                    self.plan.subquery_tables.push(name);
                }
            }

            if !from_list
                || self.depth != at_depth
                || !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma))
            {
                return;
            }
            self.next(); // consume comma
        }
    }

    /// The single target table of an UPDATE or INSERT. A following `(`
    /// is the INSERT column list here, never a function call.
    fn read_target_table(&mut self, allow_alias: bool) {
        let Some(name) = self.read_dotted_name() else {
            return;
        };
        let alias = if allow_alias { self.read_alias() } else { None };
        self.plan.tables.push(TableRef { name, alias });
    }

    /// `schema.table` -> `table`, lowercased for bare identifiers.
    fn read_dotted_name(&mut self) -> Option<String> {
        let token = self.next()?;
        let mut name = normalize_ident(token)?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
            self.next(); // dot
            let segment = self.next()?;
            name = normalize_ident(segment)?;
        }
        Some(name)
    }

    fn read_alias(&mut self) -> Option<String> {
        let candidate = self.peek()?;
        if candidate.is_keyword("as") {
            self.next();
            let alias = self.next()?;
            return normalize_ident(alias);
        }
        let text = candidate.ident_text()?;
        if ALIAS_STOPWORDS.contains(&text.to_lowercase().as_str()) {
            return None;
        }
        self.next();
        Some(text.to_lowercase())
    }

    fn collect_insert_columns(&mut self) {
        if !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            return;
        }
        let open_depth = self.depth;
        self.next(); // '('
        while let Some(token) = self.next() {
            if self.depth == open_depth {
                break; // matching ')'
            }
            if self.depth == open_depth + 1 {
                if let Some(text) = token.ident_text() {
                    self.plan.insert_columns.push(text.to_lowercase());
                }
            }
        }
    }

    /// Record `col =` / `alias.col =` shapes in the WHERE clause so the
    /// augmenter can detect predicates that are already present.
    fn record_where_equality(&mut self, token: &SqlToken) {
        let Some(text) = token.ident_text() else {
            return;
        };
        let mut path = text.to_lowercase();
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
            self.next();
            let Some(segment) = self.next() else { return };
            let Some(text) = segment.ident_text() else {
                return;
            };
            path.push('.');
            path.push_str(&text.to_lowercase());
        }
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Operator(op)) if op == "=") {
            self.plan.where_eq_columns.push(path);
        }
    }

    /// `OR true` or `OR <literal> = <identical literal>` at any depth.
    fn scan_tautology(&mut self) {
        let meaningful: Vec<&SqlToken> = self
            .tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::LineComment | TokenKind::BlockComment))
            .collect();

        for (i, token) in meaningful.iter().enumerate() {
            if !token.is_keyword("or") {
                continue;
            }
            match (meaningful.get(i + 1), meaningful.get(i + 2), meaningful.get(i + 3)) {
                (Some(next), _, _) if next.is_keyword("true") => {
                    self.plan.has_tautology = true;
                    return;
                }
                (Some(lhs), Some(op), Some(rhs)) => {
                    let literal = |t: &SqlToken| {
                        matches!(t.kind, TokenKind::Number(_) | TokenKind::StringLit)
                    };
                    let eq = matches!(&op.kind, TokenKind::Operator(o) if o == "=");
                    if literal(lhs)
                        && eq
                        && literal(rhs)
                        && self.sql[lhs.span.start..lhs.span.end]
                            == self.sql[rhs.span.start..rhs.span.end]
                    {
                        self.plan.has_tautology = true;
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

fn normalize_ident(token: &SqlToken) -> Option<String> {
    match &token.kind {
        TokenKind::Ident(s) => Some(s.to_lowercase()),
        TokenKind::QuotedIdent(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_shape() {
        let plan = analyze("SELECT id, name FROM users WHERE id = $1 ORDER BY name LIMIT 10");
        assert_eq!(plan.kind, StatementKind::Select);
        assert_eq!(plan.tables, vec![TableRef { name: "users".to_string(), alias: None }]);
        assert!(plan.has_where);
        assert!(plan.clause_tail.is_some());
        assert_eq!(plan.max_placeholder, 1);
    }

    #[test]
    fn test_join_tables_with_aliases() {
        let plan = analyze(
            "SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id WHERE u.id = $1",
        );
        let names: Vec<&str> = plan.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "orders"]);
        assert_eq!(plan.tables[0].qualifier(), "u");
        assert_eq!(plan.tables[1].qualifier(), "o");
    }

    #[test]
    fn test_schema_qualified_table() {
        let plan = analyze("SELECT * FROM public.users");
        assert_eq!(plan.tables[0].name, "users");
    }

    #[test]
    fn test_update_target() {
        let plan = analyze("UPDATE assets SET name = $1 WHERE id = $2");
        assert_eq!(plan.kind, StatementKind::Update);
        assert_eq!(plan.tables[0].name, "assets");
        assert!(plan.has_where);
    }

    #[test]
    fn test_delete_without_where() {
        let plan = analyze("DELETE FROM sessions");
        assert_eq!(plan.kind, StatementKind::Delete);
        assert_eq!(plan.tables[0].name, "sessions");
        assert!(!plan.has_where);
    }

    #[test]
    fn test_insert_columns() {
        let plan = analyze("INSERT INTO assets (id, tenant_id, name) VALUES ($1, $2, $3)");
        assert_eq!(plan.kind, StatementKind::Insert);
        assert_eq!(plan.tables[0].name, "assets");
        assert_eq!(plan.insert_columns, vec!["id", "tenant_id", "name"]);
        assert_eq!(plan.max_placeholder, 3);
    }

    #[test]
    fn test_insert_without_column_list() {
        let plan = analyze("INSERT INTO assets VALUES ($1, $2)");
        assert!(plan.insert_columns.is_empty());
    }

    #[test]
    fn test_subquery_tables_tracked_separately() {
        let plan = analyze(
            "SELECT id FROM orders WHERE user_id IN (SELECT id FROM users WHERE active)",
        );
        assert_eq!(plan.tables[0].name, "orders");
        assert_eq!(plan.subquery_tables, vec!["users".to_string()]);
    }

    #[test]
    fn test_stacked_statements_detected() {
        let plan = analyze("SELECT 1; DROP TABLE users");
        assert!(plan.stacked);
    }

    #[test]
    fn test_trailing_semicolon_not_stacked() {
        let plan = analyze("SELECT 1;");
        assert!(!plan.stacked);
        assert_eq!(plan.statement_end, "SELECT 1".len());
    }

    #[test]
    fn test_comment_detected() {
        let plan = analyze("SELECT 1 -- sneak");
        assert!(plan.has_comment);
    }

    #[test]
    fn test_set_operation_detected() {
        let plan = analyze("SELECT id FROM a UNION SELECT id FROM b");
        assert!(plan.has_set_operation);
    }

    #[test]
    fn test_tautology_detected() {
        assert!(analyze("SELECT * FROM users WHERE name = $1 OR 1 = 1").has_tautology);
        assert!(analyze("SELECT * FROM users WHERE name = $1 OR 'a' = 'a'").has_tautology);
        assert!(analyze("SELECT * FROM users WHERE a OR true").has_tautology);
        assert!(!analyze("SELECT * FROM users WHERE a = 1 OR b = 2").has_tautology);
    }

    #[test]
    fn test_where_eq_columns() {
        let plan = analyze("SELECT * FROM users u WHERE u.tenant_id = $1 AND name = $2");
        assert!(plan.where_eq_columns.contains(&"u.tenant_id".to_string()));
        assert!(plan.where_eq_columns.contains(&"name".to_string()));
    }

    #[test]
    fn test_non_dml_is_other() {
        assert_eq!(analyze("BEGIN").kind, StatementKind::Other);
        assert_eq!(analyze("SET search_path TO public").kind, StatementKind::Other);
    }
}
