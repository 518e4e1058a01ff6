//! # Application Settings
//!
//! Configuration structures with validation. Every section loads from the
//! process environment through `from_env`, which delegates to `from_lookup` so
//! tests can supply variables without touching global state.

use crate::errors::{AuthStoreError, Result};
use crate::secrets::{SecretStoreKind, SecretValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Reads a single variable by name
pub trait EnvLookup: Fn(&str) -> Option<String> {}

impl<F: Fn(&str) -> Option<String>> EnvLookup for F {}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn first_of(lookup: &impl EnvLookup, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| lookup(key))
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub secret_store: SecretStoreConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(process_env)
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl EnvLookup) -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_lookup(&lookup),
            secret_store: SecretStoreConfig::from_lookup(&lookup)?,
            observability: ObservabilityConfig::from_lookup(&lookup),
        })
    }

    /// Run field validation followed by the backend-specific requirements
    pub fn validate_all(&self) -> Result<()> {
        self.validate()?;
        self.secret_store.validate_selected()
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Apply pending migrations when the pool is created
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/authstore.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// In-memory database with a single connection, used by tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite://:memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout_seconds: 0,
            ..Self::default()
        }
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &impl EnvLookup) -> Self {
        let defaults = Self::default();

        Self {
            url: lookup("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(defaults.max_connections),
            min_connections: lookup("DATABASE_MIN_CONNECTIONS")
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(defaults.min_connections),
            connect_timeout_seconds: lookup("DATABASE_CONNECT_TIMEOUT_SECONDS")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(defaults.connect_timeout_seconds),
            idle_timeout_seconds: lookup("DATABASE_IDLE_TIMEOUT_SECONDS")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(defaults.idle_timeout_seconds),
            auto_migrate: lookup("DATABASE_AUTO_MIGRATE")
                .map(|s| parse_bool(&s))
                .unwrap_or(defaults.auto_migrate),
        }
    }
}

/// Key-value secret store (Vault KV v2) connection settings
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct VaultConfig {
    #[validate(url(message = "Vault address must be a valid URL"))]
    pub address: String,

    pub token: Option<SecretValue>,

    pub namespace: Option<String>,

    #[validate(length(min = 1, message = "KV mount cannot be empty"))]
    pub mount: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("namespace", &self.namespace)
            .field("mount", &self.mount)
            .finish()
    }
}

impl VaultConfig {
    /// Vault settings, present only when an address is configured.
    ///
    /// Supports both `AUTHSTORE_VAULT_*` and the standard `VAULT_*` variables.
    pub fn from_lookup(lookup: &impl EnvLookup) -> Option<Self> {
        let address = first_of(lookup, &["AUTHSTORE_VAULT_ADDR", "VAULT_ADDR"])?;

        Some(Self {
            address,
            token: first_of(lookup, &["AUTHSTORE_VAULT_TOKEN", "VAULT_TOKEN"]).map(SecretValue::new),
            namespace: first_of(lookup, &["AUTHSTORE_VAULT_NAMESPACE", "VAULT_NAMESPACE"]),
            mount: lookup("AUTHSTORE_VAULT_KV_MOUNT").unwrap_or_else(|| "secret".to_string()),
        })
    }
}

/// External secrets-management service settings for the hybrid backend
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecretsManagerConfig {
    #[validate(length(min = 1, message = "Secrets manager region cannot be empty"))]
    pub region: String,

    /// Endpoint override, e.g. a local emulator
    pub endpoint_url: Option<String>,

    /// Prefix prepended to every generated secret name
    #[validate(length(min = 1, message = "Secret name prefix cannot be empty"))]
    pub name_prefix: String,

    /// Values starting with this marker are treated as references, not plaintext
    #[validate(length(min = 1, message = "Reference marker cannot be empty"))]
    pub reference_marker: String,
}

impl SecretsManagerConfig {
    pub const DEFAULT_REFERENCE_MARKER: &'static str = "arn:aws:secretsmanager:";

    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_url: None,
            name_prefix: "authstore".to_string(),
            reference_marker: Self::DEFAULT_REFERENCE_MARKER.to_string(),
        }
    }

    pub fn from_lookup(lookup: &impl EnvLookup) -> Option<Self> {
        let region = first_of(lookup, &["AUTHSTORE_SECRETS_MANAGER_REGION", "AWS_REGION"])?;
        let mut config = Self::new(region);
        config.endpoint_url = lookup("AUTHSTORE_SECRETS_MANAGER_ENDPOINT");
        if let Some(prefix) = lookup("AUTHSTORE_SECRETS_MANAGER_PREFIX") {
            config.name_prefix = prefix;
        }
        if let Some(marker) = lookup("AUTHSTORE_SECRETS_MANAGER_REFERENCE_MARKER") {
            config.reference_marker = marker;
        }
        Some(config)
    }
}

/// Secret store selection and backend settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecretStoreConfig {
    pub backend: SecretStoreKind,

    /// Base64-encoded 32-byte key for the relational password column
    pub encryption_key: Option<SecretValue>,

    #[validate(nested)]
    pub vault: Option<VaultConfig>,

    #[validate(nested)]
    pub secrets_manager: Option<SecretsManagerConfig>,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            backend: SecretStoreKind::Database,
            encryption_key: None,
            vault: None,
            secrets_manager: None,
        }
    }
}

impl SecretStoreConfig {
    pub fn from_lookup(lookup: &impl EnvLookup) -> Result<Self> {
        let backend = match lookup("AUTHSTORE_SECRET_STORE") {
            Some(value) => value.parse::<SecretStoreKind>().map_err(|e| {
                AuthStoreError::config(format!("Invalid AUTHSTORE_SECRET_STORE: {}", e))
            })?,
            None => SecretStoreKind::Database,
        };

        Ok(Self {
            backend,
            encryption_key: lookup("AUTHSTORE_ENCRYPTION_KEY").map(SecretValue::new),
            vault: VaultConfig::from_lookup(lookup),
            secrets_manager: SecretsManagerConfig::from_lookup(lookup),
        })
    }

    /// Check that the settings the selected backend depends on are present
    pub fn validate_selected(&self) -> Result<()> {
        match self.backend {
            SecretStoreKind::Database if self.encryption_key.is_none() => {
                Err(AuthStoreError::config(
                    "AUTHSTORE_ENCRYPTION_KEY is required for the database secret store",
                ))
            }
            SecretStoreKind::Vault if self.vault.is_none() => Err(AuthStoreError::config(
                "AUTHSTORE_VAULT_ADDR or VAULT_ADDR is required for the vault secret store",
            )),
            SecretStoreKind::SecretsManager if self.secrets_manager.is_none() => {
                Err(AuthStoreError::config(
                    "AUTHSTORE_SECRETS_MANAGER_REGION is required for the secrets-manager secret store",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 0,
            service_name: "authstore".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }

    pub fn from_lookup(lookup: &impl EnvLookup) -> Self {
        let defaults = Self::default();
        let metrics_port = lookup("AUTHSTORE_METRICS_PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.metrics_port);

        Self {
            enable_metrics: metrics_port != 0,
            metrics_port,
            service_name: lookup("AUTHSTORE_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("AUTHSTORE_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: lookup("AUTHSTORE_LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logging),
        }
    }
}
