//! WARDEN SQL - Query Security Layer
//!
//! Structural SQL handling for the gateway: a shape scanner, a
//! statement analyzer, a token-based security pre-check, and the tenant
//! predicate augmenter. Classification is done on tokens, never on
//! substring or pattern matching, so literals and casing cannot fool
//! the deny rules.

pub mod augment;
pub mod deny;
pub mod plan;
pub mod scanner;
pub mod token;

pub use augment::{augment, AugmentedQuery};
pub use deny::check;
pub use plan::{analyze, QueryPlan, StatementKind, TableRef};
pub use scanner::SqlScanner;
pub use token::{Span, SqlToken, TokenKind};
