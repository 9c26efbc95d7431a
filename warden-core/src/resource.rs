//! Resource references extracted from a request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A (resource type, resource id) pair pulled from the request's path
/// segments or recognized query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceReference {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}
