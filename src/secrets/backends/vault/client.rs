//! Key-value secret client over Vault's KV v2 engine

use crate::config::VaultConfig;
use crate::errors::{AuthStoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};
use vaultrs::api::kv2::requests::ReadSecretRequest;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

const SERVICE: &str = "vault";

/// Version metadata returned by a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvVersion {
    pub version: u64,
    pub created_time: Option<DateTime<Utc>>,
}

/// Minimal KV contract the key-value store needs.
///
/// Paths are full, mount included: `read`/`write` take `{mount}/data/...`,
/// `list`/`delete` take `{mount}/metadata/...`. No call is retried.
#[async_trait]
pub trait KvSecretClient: Send + Sync + std::fmt::Debug {
    /// Keys directly under `prefix`; an absent prefix yields no keys
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// `{"data", "metadata"}` envelope, `None` when nothing is stored
    async fn read(&self, path: &str) -> Result<Option<Value>>;

    async fn write(&self, path: &str, data: &Value) -> Result<KvVersion>;

    /// Remove every version of the secret
    async fn delete(&self, path: &str) -> Result<()>;

    async fn health(&self) -> Result<()>;
}

pub struct VaultKvClient {
    client: VaultClient,
    mount: String,
}

impl std::fmt::Debug for VaultKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKvClient")
            .field("mount", &self.mount)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultKvClient {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(token) = &config.token {
            settings_builder.token(token.expose());
        }

        if let Some(namespace) = &config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder.build().map_err(|e| {
            AuthStoreError::config(format!("Invalid Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings)
            .map_err(|e| AuthStoreError::config(format!("Failed to create Vault client: {}", e)))?;

        info!(address = %config.address, mount = %config.mount, "Initialized Vault KV client");

        Ok(Self { client, mount: config.mount.clone() })
    }

    /// Path relative to the mount for the given API section
    fn relative<'a>(&self, path: &'a str, section: &str) -> Result<&'a str> {
        path.strip_prefix(self.mount.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.strip_prefix(section))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                AuthStoreError::internal(format!(
                    "path '{}' is outside {}/{}",
                    path, self.mount, section
                ))
            })
    }
}

fn is_not_found(error: &ClientError) -> bool {
    matches!(error, ClientError::APIError { code: 404, .. })
}

fn upstream(action: &str, path: &str, error: ClientError) -> AuthStoreError {
    AuthStoreError::upstream_with_source(
        SERVICE,
        format!("Failed to {} '{}'", action, path),
        error,
    )
}

#[async_trait]
impl KvSecretClient for VaultKvClient {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let relative = self.relative(prefix, "metadata")?;
        debug!(prefix = %prefix, "Listing Vault keys");

        match kv2::list(&self.client, &self.mount, relative).await {
            Ok(keys) => Ok(keys),
            Err(e) if is_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(upstream("list", prefix, e)),
        }
    }

    async fn read(&self, path: &str) -> Result<Option<Value>> {
        let relative = self.relative(path, "data")?;

        let endpoint = ReadSecretRequest::builder()
            .mount(self.mount.as_str())
            .path(relative)
            .build()
            .map_err(|e| AuthStoreError::internal(format!("Invalid Vault read request: {}", e)))?;

        match vaultrs::api::exec_with_result(&self.client, endpoint).await {
            Ok(response) => Ok(Some(json!({
                "data": response.data,
                "metadata": {
                    "created_time": response.metadata.created_time,
                    "version": response.metadata.version,
                },
            }))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(upstream("read", path, e)),
        }
    }

    async fn write(&self, path: &str, data: &Value) -> Result<KvVersion> {
        let relative = self.relative(path, "data")?;

        let metadata = kv2::set(&self.client, &self.mount, relative, data)
            .await
            .map_err(|e| upstream("write", path, e))?;

        Ok(KvVersion {
            version: metadata.version,
            created_time: DateTime::parse_from_rfc3339(&metadata.created_time)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let relative = self.relative(path, "metadata")?;

        kv2::delete_metadata(&self.client, &self.mount, relative)
            .await
            .map_err(|e| upstream("delete", path, e))
    }

    async fn health(&self) -> Result<()> {
        vaultrs::sys::health(&self.client)
            .await
            .map(|_| ())
            .map_err(|e| AuthStoreError::upstream_with_source(SERVICE, "Vault health check failed", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(mount: &str) -> VaultKvClient {
        VaultKvClient::new(&VaultConfig {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            mount: mount.to_string(),
        })
        .expect("client")
    }

    #[test]
    fn test_relative_paths() {
        let kv = client("secret");
        assert_eq!(kv.relative("secret/data/4/Source_1_x", "data").unwrap(), "4/Source_1_x");
        assert_eq!(kv.relative("secret/metadata/4/", "metadata").unwrap(), "4/");
        assert!(kv.relative("secret/metadata/4/", "data").is_err());
        assert!(kv.relative("other/data/4/Source_1_x", "data").is_err());
    }

    #[test]
    fn test_debug_hides_client() {
        let output = format!("{:?}", client("kv"));
        assert!(output.contains("[VaultClient]"));
        assert!(output.contains("kv"));
    }
}
