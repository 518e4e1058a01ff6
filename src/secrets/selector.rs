//! Backend selection.
//!
//! A [`SecretStore`] is built once at startup from configuration and injected
//! into every caller. [`SecretStore::scoped`] binds it to a tenant and returns
//! the instrumented [`AuthenticationStore`] for that caller.

use crate::config::{SecretStoreConfig, SecretsManagerConfig, VaultConfig};
use crate::errors::{AuthStoreError, Result};
use crate::secrets::backends::{
    DatabaseStore, ExternalSecretClient, KvSecretClient, SecretsManagerStore, UnconfiguredStore,
    VaultKvClient, VaultStore,
};
use crate::secrets::instrumented::InstrumentedStore;
use crate::secrets::store::{AuthenticationStore, TenantScope};
use crate::secrets::{PasswordCipher, SecretStoreKind};
use crate::storage::{DbPool, ResourceRepository, ResourceResolver};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub enum SecretStore {
    Database {
        pool: DbPool,
        resources: Arc<dyn ResourceResolver>,
        cipher: Arc<PasswordCipher>,
    },
    Vault {
        client: Arc<dyn KvSecretClient>,
        mount: String,
        resources: Arc<dyn ResourceResolver>,
    },
    SecretsManager {
        pool: DbPool,
        resources: Arc<dyn ResourceResolver>,
        client: Arc<dyn ExternalSecretClient>,
        name_prefix: String,
        reference_marker: String,
    },
    Unconfigured,
}

impl SecretStore {
    pub fn database(pool: DbPool, cipher: PasswordCipher) -> Self {
        let resources = Arc::new(ResourceRepository::new(pool.clone()));
        Self::Database { pool, resources, cipher: Arc::new(cipher) }
    }

    /// Owning resources are still resolved through the relational tables
    pub fn vault(pool: DbPool, client: Arc<dyn KvSecretClient>, mount: impl Into<String>) -> Self {
        Self::Vault {
            client,
            mount: mount.into(),
            resources: Arc::new(ResourceRepository::new(pool)),
        }
    }

    pub fn secrets_manager(
        pool: DbPool,
        client: Arc<dyn ExternalSecretClient>,
        config: &SecretsManagerConfig,
    ) -> Self {
        let resources = Arc::new(ResourceRepository::new(pool.clone()));
        Self::SecretsManager {
            pool,
            resources,
            client,
            name_prefix: config.name_prefix.clone(),
            reference_marker: config.reference_marker.clone(),
        }
    }

    pub fn unconfigured() -> Self {
        Self::Unconfigured
    }

    /// Build the backend named by `config.backend`
    pub async fn from_config(config: &SecretStoreConfig, pool: DbPool) -> Result<Self> {
        config.validate_selected()?;

        let store = match config.backend {
            SecretStoreKind::Database => {
                let key = config.encryption_key.as_ref().ok_or_else(|| {
                    AuthStoreError::config("AUTHSTORE_ENCRYPTION_KEY is not set")
                })?;
                Self::database(pool, PasswordCipher::from_base64_key(key)?)
            }
            SecretStoreKind::Vault => {
                let vault: &VaultConfig = config
                    .vault
                    .as_ref()
                    .ok_or_else(|| AuthStoreError::config("Vault settings are missing"))?;
                let client = VaultKvClient::new(vault)?;
                Self::vault(pool, Arc::new(client), vault.mount.clone())
            }
            SecretStoreKind::SecretsManager => {
                let settings = config.secrets_manager.as_ref().ok_or_else(|| {
                    AuthStoreError::config("Secrets manager settings are missing")
                })?;
                Self::secrets_manager(pool, external_client(settings).await?, settings)
            }
            SecretStoreKind::None => Self::unconfigured(),
        };

        info!(backend = %store.kind(), "Secret store selected");
        Ok(store)
    }

    pub fn kind(&self) -> SecretStoreKind {
        match self {
            Self::Database { .. } => SecretStoreKind::Database,
            Self::Vault { .. } => SecretStoreKind::Vault,
            Self::SecretsManager { .. } => SecretStoreKind::SecretsManager,
            Self::Unconfigured => SecretStoreKind::None,
        }
    }

    /// Store bound to `scope`, with metrics and tracing
    pub fn scoped(&self, scope: TenantScope) -> Arc<dyn AuthenticationStore> {
        Arc::new(InstrumentedStore::new(self.backend(scope)))
    }

    fn backend(&self, scope: TenantScope) -> Arc<dyn AuthenticationStore> {
        match self {
            Self::Database { pool, resources, cipher } => Arc::new(DatabaseStore::new(
                pool.clone(),
                scope,
                resources.clone(),
                cipher.clone(),
            )),
            Self::Vault { client, mount, resources } => {
                Arc::new(VaultStore::new(client.clone(), mount.clone(), scope, resources.clone()))
            }
            Self::SecretsManager { pool, resources, client, name_prefix, reference_marker } => {
                let records =
                    DatabaseStore::with_reference_column(pool.clone(), scope, resources.clone());
                Arc::new(SecretsManagerStore::new(
                    records,
                    client.clone(),
                    name_prefix.clone(),
                    reference_marker.clone(),
                ))
            }
            Self::Unconfigured => Arc::new(UnconfiguredStore::new(scope)),
        }
    }
}

#[cfg(feature = "aws")]
async fn external_client(config: &SecretsManagerConfig) -> Result<Arc<dyn ExternalSecretClient>> {
    let client = crate::secrets::backends::AwsSecretsManagerClient::from_config(config).await?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "aws"))]
async fn external_client(_: &SecretsManagerConfig) -> Result<Arc<dyn ExternalSecretClient>> {
    Err(AuthStoreError::config(
        "the secrets-manager secret store requires building with the `aws` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::secrets::SecretValue;
    use crate::storage::create_pool;

    #[tokio::test]
    async fn test_from_config_selects_database() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        let config = SecretStoreConfig {
            encryption_key: Some(SecretValue::new(
                "QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=",
            )),
            ..Default::default()
        };

        let store = SecretStore::from_config(&config, pool).await.unwrap();
        assert_eq!(store.kind(), SecretStoreKind::Database);

        let scoped = store.scoped(TenantScope::tenant(1));
        assert_eq!(scoped.kind(), SecretStoreKind::Database);
        assert_eq!(scoped.scope(), TenantScope::tenant(1));
        scoped.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_from_config_requires_key_for_database() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        let err = SecretStore::from_config(&SecretStoreConfig::default(), pool).await.unwrap_err();
        assert!(matches!(err, AuthStoreError::Config { .. }));
    }

    #[tokio::test]
    async fn test_none_selects_unconfigured_store() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        let config = SecretStoreConfig { backend: SecretStoreKind::None, ..Default::default() };

        let store = SecretStore::from_config(&config, pool).await.unwrap();
        let scoped = store.scoped(TenantScope::user(1, 2));
        assert_eq!(scoped.kind(), SecretStoreKind::None);

        let err = scoped.get_by_id(&crate::domain::AuthenticationId::new("1")).await.unwrap_err();
        assert_eq!(err.to_string(), AuthStoreError::no_secret_store().to_string());
    }
}
