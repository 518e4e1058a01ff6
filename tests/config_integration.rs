//! Integration tests for configuration management
//!
//! These tests validate that the configuration system reads environment
//! variables and that the selected secret store is built from them.

mod common;

use authstore::config::AppConfig;
use authstore::secrets::{SecretStore, SecretStoreKind};
use authstore::Result;
use std::env;
use std::sync::Mutex;
use tracing_test::traced_test;

// Use a mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const STORE_VARS: &[&str] = &[
    "AUTHSTORE_SECRET_STORE",
    "AUTHSTORE_ENCRYPTION_KEY",
    "AUTHSTORE_VAULT_ADDR",
    "AUTHSTORE_VAULT_KV_MOUNT",
    "VAULT_ADDR",
];

/// Restores the saved variables when dropped
struct EnvSnapshot(Vec<(&'static str, Option<String>)>);

impl EnvSnapshot {
    fn take() -> Self {
        let saved = STORE_VARS.iter().map(|k| (*k, env::var(k).ok())).collect();
        for key in STORE_VARS {
            env::remove_var(key);
        }
        Self(saved)
    }
}

impl Drop for EnvSnapshot {
    fn drop(&mut self) {
        for (key, value) in &self.0 {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

#[test]
fn test_config_environment_integration() -> Result<()> {
    let _guard = ENV_MUTEX.lock().unwrap();
    let _snapshot = EnvSnapshot::take();

    env::set_var("AUTHSTORE_SECRET_STORE", "vault");
    env::set_var("VAULT_ADDR", "http://127.0.0.1:8200");
    env::set_var("AUTHSTORE_VAULT_KV_MOUNT", "kv");

    let config = AppConfig::from_env()?;
    assert_eq!(config.secret_store.backend, SecretStoreKind::Vault);
    let vault = config.secret_store.vault.as_ref().unwrap();
    assert_eq!(vault.address, "http://127.0.0.1:8200");
    assert_eq!(vault.mount, "kv");
    config.validate_all()?;

    env::set_var("AUTHSTORE_SECRET_STORE", "filesystem");
    assert!(AppConfig::from_env().is_err());

    Ok(())
}

#[test]
fn test_selected_backend_requires_its_settings() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let _snapshot = EnvSnapshot::take();

    env::set_var("AUTHSTORE_SECRET_STORE", "vault");
    let config = AppConfig::from_env().unwrap();
    assert!(config.validate_all().is_err());

    env::set_var("AUTHSTORE_SECRET_STORE", "none");
    let config = AppConfig::from_env().unwrap();
    assert!(config.validate_all().is_ok());
}

#[tokio::test]
#[traced_test]
async fn test_store_built_from_environment() {
    let config = {
        let _guard = ENV_MUTEX.lock().unwrap();
        let _snapshot = EnvSnapshot::take();
        env::set_var("AUTHSTORE_SECRET_STORE", "vault");
        env::set_var("AUTHSTORE_VAULT_ADDR", "http://127.0.0.1:8200");
        AppConfig::from_env().unwrap()
    };

    let pool = common::test_pool().await;
    let store = SecretStore::from_config(&config.secret_store, pool).await.unwrap();

    assert_eq!(store.kind(), SecretStoreKind::Vault);
    assert!(logs_contain("Secret store selected"));
}
