//! Tenant-scoped resource registry
//!
//! Single declarative mapping from resource type to the tenant-scoped
//! table(s) that may contain it. Shared by the query augmenter (which asks
//! "is this table tenant-scoped, and what is its tenant column?") and the
//! ownership validator (which asks "which tables may hold this resource
//! type?"). Registering a resource here is the one step needed to bring a
//! new tenant-scoped resource under enforcement.

use std::collections::HashMap;

/// One table that may own resources of a registered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    /// Table name as it appears in queries (lowercase).
    pub table: String,
    /// Column holding the resource identifier.
    pub id_column: String,
    /// Column holding the owning tenant handle.
    pub tenant_column: String,
}

impl TableBinding {
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
        tenant_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            id_column: id_column.into(),
            tenant_column: tenant_column.into(),
        }
    }
}

/// Declarative registry of tenant-scoped resources and tables.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    /// resource type -> candidate owning tables, probed in order.
    by_type: HashMap<String, Vec<TableBinding>>,
    /// table name -> tenant column, for the augmenter's scoping check.
    by_table: HashMap<String, String>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type as owned by the given table.
    ///
    /// A type may be registered against several tables; ownership probes
    /// run in registration order and stop at the first match.
    pub fn register(&mut self, resource_type: impl Into<String>, binding: TableBinding) {
        self.by_table
            .insert(binding.table.clone(), binding.tenant_column.clone());
        self.by_type
            .entry(resource_type.into())
            .or_default()
            .push(binding);
    }

    /// Register a tenant-scoped table with no resource-type mapping.
    ///
    /// The augmenter still injects predicates for it, but no ownership
    /// probe will ever consult it.
    pub fn register_table(&mut self, table: impl Into<String>, tenant_column: impl Into<String>) {
        self.by_table.insert(table.into(), tenant_column.into());
    }

    /// Whether a table holds tenant-scoped rows.
    pub fn is_tenant_scoped(&self, table: &str) -> bool {
        self.by_table.contains_key(&table.to_ascii_lowercase())
    }

    /// The tenant column for a scoped table, if registered.
    pub fn tenant_column(&self, table: &str) -> Option<&str> {
        self.by_table
            .get(&table.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Candidate owning tables for a resource type.
    ///
    /// Returns `None` for unregistered types; callers must treat that as a
    /// hard deny, never a skip.
    pub fn tables_for(&self, resource_type: &str) -> Option<&[TableBinding]> {
        self.by_type
            .get(&resource_type.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Registered resource types, for diagnostics.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    /// The default registry shipped with the gateway.
    ///
    /// Covers the resource identifiers the middleware recognizes in query
    /// parameters plus the remaining tenant-scoped tables the augmenter
    /// must guard.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("user", TableBinding::new("users", "user_id", "tenant_id"));
        registry.register("asset", TableBinding::new("assets", "asset_id", "tenant_id"));
        registry.register(
            "entity",
            TableBinding::new("entities", "entity_id", "tenant_id"),
        );
        registry.register(
            "session",
            TableBinding::new("sessions", "session_id", "tenant_id"),
        );
        registry.register("order", TableBinding::new("orders", "order_id", "tenant_id"));
        registry.register_table("api_keys", "tenant_id");
        registry.register_table("audit_log", "tenant_id");
        registry
    }
}
