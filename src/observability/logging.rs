//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.

use crate::config::ObservabilityConfig;
use crate::errors::{AuthStoreError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            AuthStoreError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| {
        AuthStoreError::config_with_source("Failed to install tracing subscriber", Box::new(e))
    })
}

/// Create a tracing span for database operations.
///
/// ```rust,ignore
/// let span = db_span!("delete_source_tree", tenant_id = 7);
/// ```
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            tenant_id = tracing::field::Empty
        )
    };
    ($operation:expr, tenant_id = $tenant:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            tenant_id = $tenant
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            tenant_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for calls to an external secret service
#[macro_export]
macro_rules! secret_span {
    ($service:expr, $operation:expr) => {
        tracing::info_span!(
            "secret_operation",
            service = %$service,
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($service:expr, $operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "secret_operation",
            service = %$service,
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        database_url = %crate::storage::pool::sanitize_url(&config.database.url),
        secret_store = %config.secret_store.backend,
        vault_configured = config.secret_store.vault.is_some(),
        secrets_manager_configured = config.secret_store.secrets_manager.is_some(),
        metrics_enabled = %config.observability.enable_metrics,
        "Authentication store configuration"
    );
}
