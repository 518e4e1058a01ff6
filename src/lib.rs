//! # authstore
//!
//! Tenant-scoped storage for the credentials ("authentications") that
//! sources, endpoints and applications use to reach external systems.
//!
//! ## Architecture
//!
//! ```text
//! caller ── SecretStore::scoped(tenant, user) ──> AuthenticationStore
//!                                                   ├─ database         (encrypted column)
//!                                                   ├─ vault            (KV v2, one secret per record)
//!                                                   ├─ secrets-manager  (row + external reference)
//!                                                   └─ none             (rejects every call)
//! ```
//!
//! The owning resources (sources, endpoints, applications) live in relational
//! tables regardless of the secret store; [`services::CascadeDeleter`] removes a
//! source with everything it owns.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use authstore::config::AppConfig;
//! use authstore::domain::{NewAuthentication, ResourceType};
//! use authstore::secrets::{SecretStore, TenantScope};
//! use authstore::storage::create_pool;
//!
//! # async fn run() -> authstore::Result<()> {
//! let config = AppConfig::from_env()?;
//! let pool = create_pool(&config.database).await?;
//! let store = SecretStore::from_config(&config.secret_store, pool).await?;
//!
//! let auths = store.scoped(TenantScope::user(1, 42));
//! let created = auths
//!     .create(NewAuthentication::new(ResourceType::Application, 7, "basic").with_password("s3cret"))
//!     .await?;
//! println!("created {}", created.id);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod services;
pub mod storage;

pub use config::AppConfig;
pub use errors::{AuthStoreError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "authstore");
    }
}
