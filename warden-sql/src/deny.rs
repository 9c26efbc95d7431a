//! Security pre-check.
//!
//! Structural deny rules applied before any augmentation. Matching is
//! token-based, so a denied keyword inside a string literal never
//! triggers, and one smuggled in through casing or whitespace always
//! does.

use crate::plan::{QueryPlan, StatementKind};
use warden_core::{GatewayError, GatewayResult};

fn denied(pattern: impl Into<String>) -> GatewayError {
    GatewayError::QuerySecurity {
        pattern: pattern.into(),
    }
}

/// Reject statements with shapes the gateway never forwards.
pub fn check(plan: &QueryPlan) -> GatewayResult<()> {
    if let Some(reason) = &plan.malformed {
        return Err(denied(format!("unscannable statement: {}", reason)));
    }
    if let Some(keyword) = &plan.ddl_keyword {
        return Err(denied(format!("{} statement", keyword)));
    }
    if plan.has_comment {
        return Err(denied("comment marker"));
    }
    if plan.stacked {
        return Err(denied("stacked statements"));
    }
    if plan.has_set_operation {
        return Err(denied("set operation"));
    }
    if plan.has_tautology {
        return Err(denied("tautological OR condition"));
    }
    if matches!(plan.kind, StatementKind::Update | StatementKind::Delete) && !plan.has_where {
        return Err(denied(format!(
            "{} without WHERE clause",
            match plan.kind {
                StatementKind::Update => "UPDATE",
                _ => "DELETE",
            }
        )));
    }
    Ok(())
}
