//! Tenant predicate augmentation.
//!
//! Rewrites a statement so every tenant-scoped table it touches is
//! filtered by the tenant column, with the tenant id supplied as an
//! appended positional parameter rather than interpolated text. The
//! rewrite is idempotent: a statement that already filters a scoped
//! table by its tenant column is left alone for that table.

use crate::deny;
use crate::plan::{analyze, QueryPlan, StatementKind};
use tracing::debug;
use warden_core::{GatewayError, GatewayResult, ResourceRegistry};

/// Result of augmenting one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedQuery {
    pub sql: String,
    /// 1-based index of the appended tenant parameter. `None` when the
    /// statement needed no rewrite; the caller then passes its original
    /// parameter list through unchanged.
    pub tenant_param: Option<u32>,
    /// Scoped tables that received a predicate.
    pub augmented_tables: Vec<String>,
}

impl AugmentedQuery {
    fn passthrough(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            tenant_param: None,
            augmented_tables: Vec::new(),
        }
    }
}

/// Run the security pre-check and inject tenant predicates.
///
/// Statements touching no tenant-scoped table pass through verbatim.
/// Subqueries over scoped tables are rejected outright: predicate
/// placement inside arbitrary nesting cannot be verified structurally,
/// and an unverifiable rewrite is treated as an attack shape.
pub fn augment(sql: &str, registry: &ResourceRegistry) -> GatewayResult<AugmentedQuery> {
    let plan = analyze(sql);
    deny::check(&plan)?;

    for table in &plan.subquery_tables {
        if registry.is_tenant_scoped(table) {
            return Err(GatewayError::QuerySecurity {
                pattern: format!("subquery over tenant-scoped table '{}'", table),
            });
        }
    }

    let scoped: Vec<(String, String, String)> = plan
        .tables
        .iter()
        .filter(|t| registry.is_tenant_scoped(&t.name))
        .filter_map(|t| {
            registry
                .tenant_column(&t.name)
                .map(|col| (t.name.clone(), t.qualifier().to_string(), col.to_string()))
        })
        .collect();

    if scoped.is_empty() {
        return Ok(AugmentedQuery::passthrough(sql));
    }

    match plan.kind {
        StatementKind::Insert => check_insert(sql, &plan, &scoped),
        StatementKind::Select | StatementKind::Update | StatementKind::Delete => {
            rewrite(sql, &plan, &scoped)
        }
        StatementKind::Other => Ok(AugmentedQuery::passthrough(sql)),
    }
}

/// INSERTs are not rewritten; they must already carry the tenant column
/// in an explicit column list so the store can bind the caller's tenant.
fn check_insert(
    sql: &str,
    plan: &QueryPlan,
    scoped: &[(String, String, String)],
) -> GatewayResult<AugmentedQuery> {
    let (table, _, tenant_column) = &scoped[0];
    if plan.insert_columns.is_empty() {
        return Err(GatewayError::QuerySecurity {
            pattern: format!("INSERT into '{}' without explicit column list", table),
        });
    }
    if !plan.insert_columns.contains(tenant_column) {
        return Err(GatewayError::QuerySecurity {
            pattern: format!("INSERT into '{}' missing column '{}'", table, tenant_column),
        });
    }
    Ok(AugmentedQuery {
        sql: sql.to_string(),
        tenant_param: None,
        augmented_tables: vec![table.clone()],
    })
}

fn rewrite(
    sql: &str,
    plan: &QueryPlan,
    scoped: &[(String, String, String)],
) -> GatewayResult<AugmentedQuery> {
    let single_table = plan.tables.len() == 1;
    let param = plan.max_placeholder + 1;

    let mut predicates = Vec::new();
    let mut augmented_tables = Vec::new();
    for (table, qualifier, tenant_column) in scoped {
        let qualified = format!("{}.{}", qualifier, tenant_column);
        let already_filtered = plan
            .where_eq_columns
            .iter()
            .any(|c| c == &qualified || (single_table && c == tenant_column));
        if already_filtered {
            debug!(table, "tenant predicate already present, skipping");
            continue;
        }
        if single_table {
            predicates.push(format!("{} = ${}", tenant_column, param));
        } else {
            predicates.push(format!("{} = ${}", qualified, param));
        }
        augmented_tables.push(table.clone());
    }

    if predicates.is_empty() {
        return Ok(AugmentedQuery::passthrough(sql));
    }
    let predicate = predicates.join(" AND ");

    let mut tail = plan.clause_tail.unwrap_or(plan.statement_end);
    // Malformed orderings like a WHERE after LIMIT must not produce an
    // inverted slice; fall back to appending at the end.
    if let Some(where_end) = plan.where_end {
        tail = tail.max(where_end);
    }
    let suffix = &sql[tail..];
    let spacer = if suffix.is_empty()
        || suffix.starts_with(char::is_whitespace)
        || suffix.starts_with(';')
    {
        ""
    } else {
        " "
    };

    let rewritten = if let Some(where_end) = plan.where_end {
        // Parenthesize the existing condition so an OR inside it cannot
        // widen past the tenant filter.
        let body = sql[where_end..tail].trim();
        format!(
            "{} ({}) AND {}{}{}",
            &sql[..where_end],
            body,
            predicate,
            spacer,
            suffix
        )
    } else {
        format!(
            "{} WHERE {}{}{}",
            sql[..tail].trim_end(),
            predicate,
            spacer,
            suffix
        )
    };

    Ok(AugmentedQuery {
        sql: rewritten,
        tenant_param: Some(param),
        augmented_tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::with_defaults()
    }

    #[test]
    fn test_select_without_where_gains_one() {
        let out = augment("SELECT id, name FROM users", &registry()).expect("augment");
        assert_eq!(out.sql, "SELECT id, name FROM users WHERE tenant_id = $1");
        assert_eq!(out.tenant_param, Some(1));
        assert_eq!(out.augmented_tables, vec!["users".to_string()]);
    }

    #[test]
    fn test_existing_where_is_wrapped() {
        let out = augment(
            "SELECT id FROM users WHERE email = $1 OR name = $2",
            &registry(),
        )
        .expect("augment");
        assert_eq!(
            out.sql,
            "SELECT id FROM users WHERE (email = $1 OR name = $2) AND tenant_id = $3"
        );
        assert_eq!(out.tenant_param, Some(3));
    }

    #[test]
    fn test_predicate_lands_before_trailing_clauses() {
        let out = augment(
            "SELECT id FROM assets ORDER BY created_at LIMIT 5",
            &registry(),
        )
        .expect("augment");
        assert_eq!(
            out.sql,
            "SELECT id FROM assets WHERE tenant_id = $1 ORDER BY created_at LIMIT 5"
        );

        let out = augment(
            "SELECT id FROM assets WHERE name = $1 ORDER BY created_at",
            &registry(),
        )
        .expect("augment");
        assert_eq!(
            out.sql,
            "SELECT id FROM assets WHERE (name = $1) AND tenant_id = $2 ORDER BY created_at"
        );
    }

    #[test]
    fn test_join_qualifies_every_scoped_table() {
        let out = augment(
            "SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id WHERE u.email = $1",
            &registry(),
        )
        .expect("augment");
        assert_eq!(
            out.sql,
            "SELECT u.id FROM users u JOIN orders o ON o.user_id = u.id \
             WHERE (u.email = $1) AND u.tenant_id = $2 AND o.tenant_id = $2"
        );
        assert_eq!(out.tenant_param, Some(2));
        assert_eq!(
            out.augmented_tables,
            vec!["users".to_string(), "orders".to_string()]
        );
    }

    #[test]
    fn test_unscoped_table_passes_through() {
        let out = augment("SELECT version FROM schema_migrations", &registry()).expect("augment");
        assert_eq!(out.sql, "SELECT version FROM schema_migrations");
        assert_eq!(out.tenant_param, None);
    }

    #[test]
    fn test_idempotent_when_filter_present() {
        let sql = "SELECT id FROM users WHERE tenant_id = $1";
        let out = augment(sql, &registry()).expect("augment");
        assert_eq!(out.sql, sql);
        assert_eq!(out.tenant_param, None);
    }

    #[test]
    fn test_augment_is_idempotent() {
        let first = augment("SELECT id FROM users WHERE email = $1", &registry()).expect("first");
        let second = augment(&first.sql, &registry()).expect("second");
        assert_eq!(second.sql, first.sql);
        assert_eq!(second.tenant_param, None);
    }

    #[test]
    fn test_update_gets_predicate() {
        let out = augment("UPDATE assets SET name = $1 WHERE id = $2", &registry())
            .expect("augment");
        assert_eq!(
            out.sql,
            "UPDATE assets SET name = $1 WHERE (id = $2) AND tenant_id = $3"
        );
    }

    #[test]
    fn test_delete_without_where_denied() {
        let err = augment("DELETE FROM sessions", &registry()).expect_err("deny");
        assert!(matches!(err, GatewayError::QuerySecurity { .. }));
    }

    #[test]
    fn test_delete_with_where_gets_predicate() {
        let out = augment("DELETE FROM sessions WHERE id = $1", &registry()).expect("augment");
        assert_eq!(
            out.sql,
            "DELETE FROM sessions WHERE (id = $1) AND tenant_id = $2"
        );
    }

    #[test]
    fn test_insert_requires_tenant_column() {
        let err = augment(
            "INSERT INTO assets (id, name) VALUES ($1, $2)",
            &registry(),
        )
        .expect_err("deny");
        assert!(matches!(err, GatewayError::QuerySecurity { .. }));

        let out = augment(
            "INSERT INTO assets (id, tenant_id, name) VALUES ($1, $2, $3)",
            &registry(),
        )
        .expect("pass");
        assert_eq!(out.tenant_param, None);
        assert_eq!(out.augmented_tables, vec!["assets".to_string()]);
    }

    #[test]
    fn test_insert_without_column_list_denied() {
        let err = augment("INSERT INTO assets VALUES ($1, $2)", &registry()).expect_err("deny");
        assert!(matches!(err, GatewayError::QuerySecurity { .. }));
    }

    #[test]
    fn test_subquery_over_scoped_table_denied() {
        let err = augment(
            "SELECT id FROM schema_migrations WHERE v IN (SELECT id FROM users)",
            &registry(),
        )
        .expect_err("deny");
        assert!(matches!(err, GatewayError::QuerySecurity { .. }));
    }

    #[test]
    fn test_subquery_over_unscoped_table_allowed() {
        let out = augment(
            "SELECT id FROM users WHERE v IN (SELECT v FROM feature_flags)",
            &registry(),
        )
        .expect("augment");
        assert_eq!(out.tenant_param, Some(1));
    }

    #[test]
    fn test_denied_statement_never_rewritten() {
        let err = augment("SELECT id FROM users; DROP TABLE users", &registry())
            .expect_err("deny");
        assert!(matches!(err, GatewayError::QuerySecurity { .. }));
    }

    #[test]
    fn test_param_numbering_continues_from_existing() {
        let out = augment(
            "SELECT id FROM users WHERE a = $1 AND b = $2 AND c = $7",
            &registry(),
        )
        .expect("augment");
        assert_eq!(out.tenant_param, Some(8));
        assert!(out.sql.ends_with("tenant_id = $8"));
    }

    #[test]
    fn test_trailing_semicolon_preserved() {
        let out = augment("SELECT id FROM users;", &registry()).expect("augment");
        assert_eq!(out.sql, "SELECT id FROM users WHERE tenant_id = $1;");
    }

    #[test]
    fn test_trailing_semicolon_after_existing_where() {
        let out = augment("SELECT id FROM users WHERE a = $1;", &registry()).expect("augment");
        assert_eq!(
            out.sql,
            "SELECT id FROM users WHERE (a = $1) AND tenant_id = $2;"
        );
    }

    #[test]
    fn test_non_dml_passes_through() {
        let out = augment("SET search_path TO public", &registry()).expect("augment");
        assert_eq!(out.sql, "SET search_path TO public");
        assert_eq!(out.tenant_param, None);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        /// Augmentation never panics, whatever the input.
        #[test]
        fn prop_augment_total(input in ".{0,200}") {
            let _ = augment(&input, &ResourceRegistry::with_defaults());
        }

        /// A second augmentation pass is always a no-op.
        #[test]
        fn prop_idempotent(col in "[a-z]{1,8}", val in 1u32..20) {
            let sql = format!("SELECT id FROM users WHERE {} = ${}", col, val);
            if let Ok(first) = augment(&sql, &ResourceRegistry::with_defaults()) {
                let second = augment(&first.sql, &ResourceRegistry::with_defaults())
                    .expect("augmented statements must stay valid");
                prop_assert_eq!(&second.sql, &first.sql);
            }
        }
    }
}
