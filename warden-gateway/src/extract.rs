//! Resource reference extraction.
//!
//! Scans the request path for `/{collection}/{id}` pairs whose
//! collection maps to a registered resource type, and the query string
//! for the fixed set of recognized `{type}_id` parameters. Every
//! extracted reference must pass ownership validation; a `tenant_id`
//! parameter is not a resource and is instead cross-checked against the
//! resolved tenant by the middleware.

use warden_core::{ResourceReference, ResourceRegistry};

/// Query parameters that name a resource to confirm.
const RECOGNIZED_QUERY_PARAMS: [&str; 4] = ["user_id", "asset_id", "entity_id", "session_id"];

/// Query parameter claiming a tenant; cross-checked, never probed.
const TENANT_QUERY_PARAM: &str = "tenant_id";

/// Extract every resource reference from a request path and query
/// string, path segments first, without duplicates.
pub fn resources_from_request(
    registry: &ResourceRegistry,
    path: &str,
    query: Option<&str>,
) -> Vec<ResourceReference> {
    let mut found = resources_from_path(registry, path);
    if let Some(query) = query {
        for reference in resources_from_query(registry, query) {
            if !found.contains(&reference) {
                found.push(reference);
            }
        }
    }
    found
}

/// Value of an explicit `tenant_id` query parameter, if present.
pub fn claimed_tenant_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == TENANT_QUERY_PARAM && !value.is_empty()).then(|| value.to_string())
    })
}

fn resources_from_path(registry: &ResourceRegistry, path: &str) -> Vec<ResourceReference> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut found = Vec::new();
    for window in segments.windows(2) {
        let (collection, id) = (window[0], window[1]);
        let singular = singularize(collection);
        if registry.tables_for(&singular).is_some() {
            let reference = ResourceReference::new(singular, id);
            if !found.contains(&reference) {
                found.push(reference);
            }
        }
    }
    found
}

fn resources_from_query(registry: &ResourceRegistry, query: &str) -> Vec<ResourceReference> {
    let mut found = Vec::new();
    for pair in query.split('&') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        if value.is_empty() || !RECOGNIZED_QUERY_PARAMS.contains(&name) {
            continue;
        }
        let Some(resource_type) = name.strip_suffix("_id") else {
            continue;
        };
        if registry.tables_for(resource_type).is_some() {
            found.push(ResourceReference::new(resource_type, value));
        }
    }
    found
}

/// Collection segment to resource type: `assets` -> `asset`,
/// `entities` -> `entity`.
fn singularize(collection: &str) -> String {
    let lower = collection.to_ascii_lowercase();
    if let Some(stem) = lower.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = lower.strip_suffix('s') {
        stem.to_string()
    } else {
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::with_defaults()
    }

    #[test]
    fn test_path_segment_pair() {
        let found = resources_from_request(&registry(), "/api/v1/assets/a-42", None);
        assert_eq!(found, vec![ResourceReference::new("asset", "a-42")]);
    }

    #[test]
    fn test_ies_plural() {
        let found = resources_from_request(&registry(), "/api/entities/e-1/history", None);
        assert_eq!(found, vec![ResourceReference::new("entity", "e-1")]);
    }

    #[test]
    fn test_query_param_recognized() {
        let found = resources_from_request(&registry(), "/api/search", Some("q=abc&user_id=u-7"));
        assert_eq!(found, vec![ResourceReference::new("user", "u-7")]);
    }

    #[test]
    fn test_path_and_query_both_extracted() {
        let found = resources_from_request(
            &registry(),
            "/api/orders/o-1",
            Some("asset_id=a-9&user_id=u-2"),
        );
        assert_eq!(
            found,
            vec![
                ResourceReference::new("order", "o-1"),
                ResourceReference::new("asset", "a-9"),
                ResourceReference::new("user", "u-2"),
            ]
        );
    }

    #[test]
    fn test_unrecognized_query_param_ignored() {
        // Registered type, but not in the recognized parameter set.
        assert!(resources_from_request(&registry(), "/api/search", Some("order_id=o-1"))
            .is_empty());
    }

    #[test]
    fn test_tenant_id_param_is_a_claim_not_a_resource() {
        let tenant = "0192aa00-0000-7000-8000-000000000001";
        let query = format!("tenant_id={tenant}");
        assert!(resources_from_request(&registry(), "/api/search", Some(&query)).is_empty());
        assert_eq!(claimed_tenant_from_query(&query).as_deref(), Some(tenant));
        assert_eq!(claimed_tenant_from_query("q=abc"), None);
    }

    #[test]
    fn test_unregistered_collection_ignored() {
        assert!(resources_from_request(&registry(), "/api/widgets/w-1", None).is_empty());
        assert!(
            resources_from_request(&registry(), "/api/health", Some("widget_id=w-1")).is_empty()
        );
    }

    #[test]
    fn test_duplicate_reference_extracted_once() {
        let found = resources_from_request(&registry(), "/api/users/u-1", Some("user_id=u-1"));
        assert_eq!(found, vec![ResourceReference::new("user", "u-1")]);
    }

    #[test]
    fn test_collection_without_id_ignored() {
        assert!(resources_from_request(&registry(), "/api/assets", None).is_empty());
    }
}
