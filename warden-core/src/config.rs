//! Gateway configuration
//!
//! One validated, typed configuration structure built at startup. Store
//! connection parameters are required and fail fast when missing; every
//! other knob has a default but is still validated before the gateway
//! serves traffic.

use crate::error::{GatewayError, GatewayResult};
use std::time::Duration;

// ============================================================================
// STORE
// ============================================================================

/// Relational store connection parameters. All fields are required.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size; acquisition blocks with `connect_timeout` rather
    /// than growing unbounded.
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

// ============================================================================
// SHADOW VALIDATION
// ============================================================================

/// Dual-path (shadow) validation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    /// When false the two paths run one after the other instead of
    /// concurrently.
    pub parallel_enabled: bool,
    /// Fail-safe mode: the legacy result is always authoritative and the
    /// enhanced path is observational only.
    pub fail_safe_mode: bool,
    /// Per-path timeout; a path exceeding it fails alone.
    pub timeout_ms: u64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            parallel_enabled: true,
            fail_safe_mode: true,
            timeout_ms: 500,
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Per-namespace cache settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NamespaceSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

/// Cache settings for the three namespaces plus the TTL tuner bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSettings {
    pub validation: NamespaceSettings,
    pub tenant_info: NamespaceSettings,
    pub permission: NamespaceSettings,
    /// Self-tuning floor; the tuner never lowers a TTL below this.
    pub min_ttl_secs: u64,
    /// Self-tuning ceiling; the tuner never raises a TTL above this.
    pub max_ttl_secs: u64,
    pub tune_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            validation: NamespaceSettings::default(),
            tenant_info: NamespaceSettings {
                ttl_secs: 600,
                ..Default::default()
            },
            permission: NamespaceSettings {
                ttl_secs: 120,
                ..Default::default()
            },
            min_ttl_secs: 30,
            max_ttl_secs: 3600,
            tune_interval_secs: 60,
        }
    }
}

// ============================================================================
// TARGETS, TRANSLATION, AUTH MECHANISMS
// ============================================================================

/// Performance targets consumed by reconciliation and promotion reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceTargets {
    pub total_middleware_ms: u64,
    pub cache_hit_target_pct: f64,
    pub improvement_target_pct: f64,
}

impl Default for PerformanceTargets {
    fn default() -> Self {
        Self {
            total_middleware_ms: 50,
            cache_hit_target_pct: 80.0,
            improvement_target_pct: 95.0,
        }
    }
}

/// Error translation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorTranslationConfig {
    pub enabled: bool,
    /// When set, translated messages never include table, column, or query
    /// detail. Leave on outside of local development.
    pub hide_technical_details: bool,
}

impl Default for ErrorTranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hide_technical_details: true,
        }
    }
}

/// Which authentication mechanisms the middleware recognizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthMechanisms {
    pub bearer: bool,
    pub api_key: bool,
    pub cookie: bool,
    pub query_param: bool,
}

impl Default for AuthMechanisms {
    fn default() -> Self {
        Self {
            bearer: true,
            api_key: true,
            cookie: true,
            query_param: false,
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub store: StoreConfig,
    pub shadow: ShadowConfig,
    pub cache: CacheSettings,
    pub performance: PerformanceTargets,
    pub errors: ErrorTranslationConfig,
    pub auth: AuthMechanisms,
}

fn required_env(field: &str) -> GatewayResult<String> {
    match std::env::var(field) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(GatewayError::ConfigMissing {
            field: field.to_string(),
        }),
    }
}

fn parsed_env<T: std::str::FromStr>(field: &str, default: T) -> GatewayResult<T> {
    match std::env::var(field) {
        Ok(raw) => raw.parse().map_err(|_| GatewayError::ConfigInvalid {
            field: field.to_string(),
            reason: format!("could not parse '{}'", raw),
        }),
        Err(_) => Ok(default),
    }
}

fn bool_env(field: &str, default: bool) -> bool {
    std::env::var(field)
        .ok()
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(default)
}

fn namespace_env(prefix: &str, default: NamespaceSettings) -> GatewayResult<NamespaceSettings> {
    Ok(NamespaceSettings {
        enabled: bool_env(&format!("{}_ENABLED", prefix), default.enabled),
        ttl_secs: parsed_env(&format!("{}_TTL_SECS", prefix), default.ttl_secs)?,
        max_entries: parsed_env(&format!("{}_MAX_ENTRIES", prefix), default.max_entries)?,
    })
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `WARDEN_DB_HOST` / `WARDEN_DB_PORT` / `WARDEN_DB_NAME` /
    ///   `WARDEN_DB_USER` / `WARDEN_DB_PASSWORD`: required store parameters
    /// - `WARDEN_DB_POOL_SIZE`: max store connections (default: 16)
    /// - `WARDEN_DB_TIMEOUT_SECS`: pool acquisition timeout (default: 30)
    /// - `WARDEN_PARALLEL_VALIDATION`: run the enhanced path (default: true)
    /// - `WARDEN_SHADOW_FAIL_SAFE`: legacy result authoritative (default: true)
    /// - `WARDEN_SHADOW_TIMEOUT_MS`: per-path timeout (default: 500)
    /// - `WARDEN_CACHE_<NS>_{ENABLED,TTL_SECS,MAX_ENTRIES}` for
    ///   `VALIDATION`, `TENANT_INFO`, `PERMISSION`
    /// - `WARDEN_CACHE_MIN_TTL_SECS` / `WARDEN_CACHE_MAX_TTL_SECS` /
    ///   `WARDEN_CACHE_TUNE_INTERVAL_SECS`: tuner bounds
    /// - `WARDEN_TARGET_TOTAL_MS` / `WARDEN_TARGET_CACHE_HIT_PCT` /
    ///   `WARDEN_TARGET_IMPROVEMENT_PCT`: performance targets
    /// - `WARDEN_ERROR_TRANSLATION` / `WARDEN_HIDE_TECHNICAL_DETAILS`
    /// - `WARDEN_AUTH_{BEARER,API_KEY,COOKIE,QUERY_PARAM}`: mechanism toggles
    pub fn from_env() -> GatewayResult<Self> {
        let store = StoreConfig {
            host: required_env("WARDEN_DB_HOST")?,
            port: parsed_env("WARDEN_DB_PORT", 5432)?,
            dbname: required_env("WARDEN_DB_NAME")?,
            user: required_env("WARDEN_DB_USER")?,
            password: required_env("WARDEN_DB_PASSWORD")?,
            pool_size: parsed_env("WARDEN_DB_POOL_SIZE", 16)?,
            connect_timeout: Duration::from_secs(parsed_env("WARDEN_DB_TIMEOUT_SECS", 30u64)?),
        };

        let shadow = ShadowConfig {
            parallel_enabled: bool_env("WARDEN_PARALLEL_VALIDATION", true),
            fail_safe_mode: bool_env("WARDEN_SHADOW_FAIL_SAFE", true),
            timeout_ms: parsed_env("WARDEN_SHADOW_TIMEOUT_MS", 500)?,
        };

        let defaults = CacheSettings::default();
        let cache = CacheSettings {
            validation: namespace_env("WARDEN_CACHE_VALIDATION", defaults.validation)?,
            tenant_info: namespace_env("WARDEN_CACHE_TENANT_INFO", defaults.tenant_info)?,
            permission: namespace_env("WARDEN_CACHE_PERMISSION", defaults.permission)?,
            min_ttl_secs: parsed_env("WARDEN_CACHE_MIN_TTL_SECS", defaults.min_ttl_secs)?,
            max_ttl_secs: parsed_env("WARDEN_CACHE_MAX_TTL_SECS", defaults.max_ttl_secs)?,
            tune_interval_secs: parsed_env(
                "WARDEN_CACHE_TUNE_INTERVAL_SECS",
                defaults.tune_interval_secs,
            )?,
        };

        let performance = PerformanceTargets {
            total_middleware_ms: parsed_env("WARDEN_TARGET_TOTAL_MS", 50)?,
            cache_hit_target_pct: parsed_env("WARDEN_TARGET_CACHE_HIT_PCT", 80.0)?,
            improvement_target_pct: parsed_env("WARDEN_TARGET_IMPROVEMENT_PCT", 95.0)?,
        };

        let errors = ErrorTranslationConfig {
            enabled: bool_env("WARDEN_ERROR_TRANSLATION", true),
            hide_technical_details: bool_env("WARDEN_HIDE_TECHNICAL_DETAILS", true),
        };

        let auth = AuthMechanisms {
            bearer: bool_env("WARDEN_AUTH_BEARER", true),
            api_key: bool_env("WARDEN_AUTH_API_KEY", true),
            cookie: bool_env("WARDEN_AUTH_COOKIE", true),
            query_param: bool_env("WARDEN_AUTH_QUERY_PARAM", false),
        };

        let config = Self {
            store,
            shadow,
            cache,
            performance,
            errors,
            auth,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration before serving traffic.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.store.pool_size == 0 {
            return Err(GatewayError::ConfigInvalid {
                field: "WARDEN_DB_POOL_SIZE".into(),
                reason: "pool size must be at least 1".into(),
            });
        }
        if self.shadow.timeout_ms == 0 {
            return Err(GatewayError::ConfigInvalid {
                field: "WARDEN_SHADOW_TIMEOUT_MS".into(),
                reason: "timeout must be positive".into(),
            });
        }
        if self.cache.min_ttl_secs > self.cache.max_ttl_secs {
            return Err(GatewayError::ConfigInvalid {
                field: "WARDEN_CACHE_MIN_TTL_SECS".into(),
                reason: "min TTL exceeds max TTL".into(),
            });
        }
        for (name, ns) in [
            ("WARDEN_CACHE_VALIDATION", &self.cache.validation),
            ("WARDEN_CACHE_TENANT_INFO", &self.cache.tenant_info),
            ("WARDEN_CACHE_PERMISSION", &self.cache.permission),
        ] {
            if ns.enabled && ns.max_entries == 0 {
                return Err(GatewayError::ConfigInvalid {
                    field: format!("{}_MAX_ENTRIES", name),
                    reason: "enabled namespace must allow at least one entry".into(),
                });
            }
            if ns.enabled && ns.ttl_secs == 0 {
                return Err(GatewayError::ConfigInvalid {
                    field: format!("{}_TTL_SECS", name),
                    reason: "enabled namespace must have a positive TTL".into(),
                });
            }
        }
        if !(0.0..=100.0).contains(&self.performance.cache_hit_target_pct)
            || !(0.0..=100.0).contains(&self.performance.improvement_target_pct)
        {
            return Err(GatewayError::ConfigInvalid {
                field: "WARDEN_TARGET_CACHE_HIT_PCT".into(),
                reason: "percentage targets must be within 0..=100".into(),
            });
        }
        if !self.auth.bearer && !self.auth.api_key && !self.auth.cookie && !self.auth.query_param {
            return Err(GatewayError::ConfigInvalid {
                field: "WARDEN_AUTH_BEARER".into(),
                reason: "at least one authentication mechanism must be enabled".into(),
            });
        }
        Ok(())
    }

    /// A complete configuration for tests, with an in-memory-friendly store
    /// section that is never actually dialed.
    pub fn for_tests() -> Self {
        Self {
            store: StoreConfig {
                host: "localhost".into(),
                port: 5432,
                dbname: "warden_test".into(),
                user: "warden".into(),
                password: "warden".into(),
                pool_size: 4,
                connect_timeout: Duration::from_secs(5),
            },
            shadow: ShadowConfig::default(),
            cache: CacheSettings::default(),
            performance: PerformanceTargets::default(),
            errors: ErrorTranslationConfig::default(),
            auth: AuthMechanisms::default(),
        }
    }
}
