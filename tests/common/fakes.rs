//! In-process stand-ins for Vault KV v2 and AWS Secrets Manager.

use async_trait::async_trait;
use authstore::errors::{AuthStoreError, Result};
use authstore::secrets::backends::{ExternalSecretClient, KvSecretClient, KvVersion, SecretTags};
use authstore::secrets::SecretValue;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// KV v2 engine keyed by full data path
#[derive(Debug, Default)]
pub struct FakeKvClient {
    entries: Mutex<BTreeMap<String, Value>>,
    failing_deletes: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeKvClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw envelope, bypassing the codec
    pub fn put_raw(&self, data_path: &str, envelope: Value) {
        self.entries.lock().unwrap().insert(data_path.to_string(), envelope);
    }

    pub fn get_raw(&self, data_path: &str) -> Option<Value> {
        self.entries.lock().unwrap().get(data_path).cloned()
    }

    /// Every stored data path
    pub fn paths(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    /// Make deletes of any path containing `needle` fail
    pub fn fail_deletes_matching(&self, needle: impl Into<String>) {
        self.failing_deletes.lock().unwrap().insert(needle.into());
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn data_path(metadata_path: &str) -> String {
        metadata_path.replacen("/metadata/", "/data/", 1)
    }
}

#[async_trait]
impl KvSecretClient for FakeKvClient {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = Self::data_path(prefix);
        let entries = self.entries.lock().unwrap();
        let mut keys: Vec<String> = Vec::new();
        for path in entries.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            let key = match rest.split_once('/') {
                Some((dir, _)) => format!("{}/", dir),
                None => rest.to_string(),
            };
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn read(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().unwrap().get(path).cloned())
    }

    async fn write(&self, path: &str, data: &Value) -> Result<KvVersion> {
        let mut entries = self.entries.lock().unwrap();
        let version = entries
            .get(path)
            .and_then(|e| e["metadata"]["version"].as_u64())
            .unwrap_or(0)
            + 1;
        let created_time = Utc::now();
        entries.insert(
            path.to_string(),
            json!({
                "data": data,
                "metadata": { "created_time": created_time.to_rfc3339(), "version": version },
            }),
        );
        Ok(KvVersion { version, created_time: Some(created_time) })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let failing = self.failing_deletes.lock().unwrap();
        if failing.iter().any(|needle| path.contains(needle.as_str())) {
            return Err(AuthStoreError::upstream("vault", format!("permission denied on {}", path)));
        }
        drop(failing);

        self.entries.lock().unwrap().remove(&Self::data_path(path));
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Secrets Manager stand-in counting every call
#[derive(Debug, Default)]
pub struct CountingExternalClient {
    secrets: Mutex<HashMap<String, String>>,
    tags: Mutex<Vec<SecretTags>>,
    pub creates: AtomicUsize,
    pub reads: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    fail_creates: AtomicBool,
    fail_deletes: AtomicBool,
}

impl CountingExternalClient {
    pub const ARN_PREFIX: &'static str = "arn:aws:secretsmanager:us-east-1:000000000000:secret:";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn stored(&self, reference: &str) -> Option<String> {
        self.secrets.lock().unwrap().get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }

    pub fn last_tags(&self) -> Option<SecretTags> {
        self.tags.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ExternalSecretClient for CountingExternalClient {
    async fn create(&self, name: &str, value: &SecretValue, tags: &SecretTags) -> Result<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(AuthStoreError::upstream("secrets-manager", "service unavailable"));
        }
        let reference = format!("{}{}", Self::ARN_PREFIX, name);
        self.secrets.lock().unwrap().insert(reference.clone(), value.expose().to_string());
        self.tags.lock().unwrap().push(tags.clone());
        Ok(reference)
    }

    async fn read(&self, reference: &str) -> Result<SecretValue> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .unwrap()
            .get(reference)
            .map(|v| SecretValue::new(v.clone()))
            .ok_or_else(|| AuthStoreError::not_found("secret", reference))
    }

    async fn update(&self, reference: &str, value: &SecretValue) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut secrets = self.secrets.lock().unwrap();
        match secrets.get_mut(reference) {
            Some(stored) => {
                *stored = value.expose().to_string();
                Ok(())
            }
            None => Err(AuthStoreError::not_found("secret", reference)),
        }
    }

    async fn delete(&self, reference: &str, _force: bool) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AuthStoreError::upstream("secrets-manager", "access denied"));
        }
        self.secrets.lock().unwrap().remove(reference);
        Ok(())
    }
}
