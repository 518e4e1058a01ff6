//! # Configuration Management
//!
//! Environment-driven configuration for the authentication store. The secret
//! store backend is chosen once here and never switched per request.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, ObservabilityConfig, SecretStoreConfig, SecretsManagerConfig,
    VaultConfig,
};
