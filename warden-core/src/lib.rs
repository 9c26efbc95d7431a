//! WARDEN Core - Data Model
//!
//! Pure data types for the tenant isolation gateway: identity handles,
//! credentials, audit records, the tenant-scoped resource registry, the
//! error taxonomy and the validated gateway configuration. All other
//! crates depend on this one; it contains no I/O.

pub mod attempt;
pub mod config;
pub mod credential;
pub mod error;
pub mod identity;
pub mod registry;
pub mod resource;

pub use attempt::{PathOutcome, ValidationAttempt};
pub use config::{
    AuthMechanisms, CacheSettings, ErrorTranslationConfig, GatewayConfig, NamespaceSettings,
    PerformanceTargets, ShadowConfig, StoreConfig,
};
pub use credential::{Credential, CredentialKind, CredentialRecord};
pub use error::{CredentialFailure, GatewayError, GatewayResult};
pub use identity::{RequestId, TenantContext, TenantId, UserContext, UserId};
pub use registry::{ResourceRegistry, TableBinding};
pub use resource::ResourceReference;
