//! Key-value authentication store.
//!
//! KV v2 offers no index beyond raw prefix listing, so every operation starts
//! by listing all keys of the tenant and filtering client-side. Cost is O(n)
//! in the number of secrets the tenant holds; there is no cheaper lookup.

use super::client::KvSecretClient;
use super::codec;
use super::path::SecretPath;
use crate::domain::{
    Authentication, AuthenticationId, AuthenticationPatch, FilterSet, NewAuthentication, Page,
    ResourceType,
};
use crate::errors::{AuthStoreError, Result};
use crate::secrets::store::{
    ensure_resource_exists, resolve_owner_source, AuthenticationStore, BulkDeleteOutcome,
    TenantScope,
};
use crate::secrets::{SecretStoreKind, SecretValue};
use crate::storage::ResourceResolver;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct VaultStore {
    client: Arc<dyn KvSecretClient>,
    mount: String,
    scope: TenantScope,
    resolver: Arc<dyn ResourceResolver>,
}

impl VaultStore {
    pub fn new(
        client: Arc<dyn KvSecretClient>,
        mount: impl Into<String>,
        scope: TenantScope,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self { client, mount: mount.into(), scope, resolver }
    }

    /// Every parseable key under the tenant
    async fn tenant_keys(&self) -> Result<Vec<SecretPath>> {
        let prefix = SecretPath::tenant_prefix(&self.mount, self.scope.tenant_id);
        let keys = self.client.list(&prefix).await?;

        let mut paths = Vec::with_capacity(keys.len());
        for key in keys {
            if key.ends_with('/') {
                continue;
            }
            match SecretPath::parse_key(self.scope.tenant_id, &key) {
                Ok(path) => paths.push(path),
                Err(e) => warn!(key = %key, error = %e, "Skipping foreign key under tenant prefix"),
            }
        }
        debug!(tenant_id = self.scope.tenant_id, count = paths.len(), "Listed tenant secrets");
        Ok(paths)
    }

    async fn load(&self, path: &SecretPath) -> Result<Option<Authentication>> {
        let data_path = path.data_path(&self.mount);
        match self.client.read(&data_path).await? {
            Some(envelope) => codec::decode(path, &envelope)
                .map(Some)
                .map_err(|e| AuthStoreError::malformed_secret(data_path, e)),
            None => Ok(None),
        }
    }

    /// Read `paths` concurrently, dropping keys deleted since the listing
    async fn load_all(&self, paths: &[SecretPath]) -> Result<Vec<Authentication>> {
        let records = try_join_all(paths.iter().map(|path| self.load(path))).await?;
        Ok(records.into_iter().flatten().collect())
    }

    fn page_visible(
        &self,
        records: Vec<Authentication>,
        page: Page,
        filters: &FilterSet,
    ) -> (Vec<Authentication>, i64) {
        let mut visible: Vec<Authentication> = records
            .into_iter()
            .filter(|r| r.is_visible_to(self.scope.user_id) && filters.matches(r))
            .collect();
        filters.sort(&mut visible);
        let total = visible.len() as i64;
        (page.apply(visible), total)
    }

    /// Keys of an application: its own prefix plus linked paths from the
    /// relational join
    async fn application_keys(&self, application_id: i64) -> Result<Vec<SecretPath>> {
        let mut seen = HashSet::new();
        let mut paths: Vec<SecretPath> = self
            .tenant_keys()
            .await?
            .into_iter()
            .filter(|p| p.belongs_to(ResourceType::Application, application_id))
            .collect();
        seen.extend(paths.iter().map(|p| p.uuid));

        for linked in self.resolver.application_vault_paths(self.scope.tenant_id, application_id).await? {
            match SecretPath::parse_full(&linked) {
                Ok(path) if path.tenant_id == self.scope.tenant_id => {
                    if seen.insert(path.uuid) {
                        paths.push(path);
                    }
                }
                Ok(path) => {
                    warn!(path = %path, application_id, "Ignoring linked secret of another tenant")
                }
                Err(e) => warn!(path = %linked, error = %e, "Ignoring malformed linked secret path"),
            }
        }
        Ok(paths)
    }

    async fn find(&self, id: &AuthenticationId) -> Result<Authentication> {
        let uuid = id.as_uuid()?;
        let not_found = || AuthStoreError::not_found("authentication", id.as_str());

        let path = self
            .tenant_keys()
            .await?
            .into_iter()
            .find(|p| p.uuid == uuid)
            .ok_or_else(not_found)?;

        match self.load(&path).await? {
            Some(record) if record.is_visible_to(self.scope.user_id) => Ok(record),
            _ => Err(not_found()),
        }
    }

    async fn write(&self, path: &SecretPath, record: &mut Authentication) -> Result<()> {
        let written = self.client.write(&path.data_path(&self.mount), &codec::encode(record)).await?;
        record.version = Some(written.version);
        Ok(())
    }

    #[instrument(skip(self, new), fields(tenant_id = self.scope.tenant_id, resource_type = %new.resource_type), name = "vault_create_authentication")]
    async fn insert(&self, new: NewAuthentication, source_id: i64) -> Result<Authentication> {
        let path = SecretPath::generate(self.scope.tenant_id, new.resource_type, new.resource_id);
        let mut record = new.into_record(
            AuthenticationId::from(path.uuid),
            self.scope.tenant_id,
            self.scope.user_id,
            source_id,
            Utc::now(),
        );
        self.write(&path, &mut record).await?;
        Ok(record)
    }
}

#[async_trait]
impl AuthenticationStore for VaultStore {
    fn kind(&self) -> SecretStoreKind {
        SecretStoreKind::Vault
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    #[instrument(skip(self, filters), fields(tenant_id = self.scope.tenant_id), name = "vault_list_authentications")]
    async fn list(&self, page: Page, filters: &FilterSet) -> Result<(Vec<Authentication>, i64)> {
        let paths = self.tenant_keys().await?;
        let records = self.load_all(&paths).await?;
        Ok(self.page_visible(records, page, filters))
    }

    #[instrument(skip(self, filters), fields(tenant_id = self.scope.tenant_id), name = "vault_list_resource_authentications")]
    async fn list_for_resource(
        &self,
        resource_type: ResourceType,
        resource_id: i64,
        page: Page,
        filters: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)> {
        ensure_resource_exists(self.resolver.as_ref(), self.scope.tenant_id, resource_type, resource_id)
            .await?;

        let paths = match resource_type {
            ResourceType::Application => self.application_keys(resource_id).await?,
            other => self
                .tenant_keys()
                .await?
                .into_iter()
                .filter(|p| p.belongs_to(other, resource_id))
                .collect(),
        };
        let records = self.load_all(&paths).await?;
        Ok(self.page_visible(records, page, filters))
    }

    #[instrument(skip(self), fields(tenant_id = self.scope.tenant_id, auth_id = %id), name = "vault_get_authentication")]
    async fn get_by_id(&self, id: &AuthenticationId) -> Result<Authentication> {
        self.find(id).await
    }

    async fn create(&self, new: NewAuthentication) -> Result<Authentication> {
        let source_id =
            resolve_owner_source(self.resolver.as_ref(), self.scope.tenant_id, &new, true).await?;
        self.insert(new, source_id).await
    }

    async fn bulk_create(&self, new: NewAuthentication) -> Result<Authentication> {
        let source_id =
            resolve_owner_source(self.resolver.as_ref(), self.scope.tenant_id, &new, false).await?;
        self.insert(new, source_id).await
    }

    /// Read-modify-write; the write always wins regardless of the version read
    #[instrument(skip(self, patch), fields(tenant_id = self.scope.tenant_id, auth_id = %id), name = "vault_update_authentication")]
    async fn update(
        &self,
        id: &AuthenticationId,
        patch: AuthenticationPatch,
    ) -> Result<Authentication> {
        let mut record = self.find(id).await?;
        let path = SecretPath::for_record(&record)
            .map_err(|e| AuthStoreError::malformed_secret(id.as_str(), e))?;

        record.apply(patch);
        record.updated_at = Some(Utc::now());
        self.write(&path, &mut record).await?;
        Ok(record)
    }

    #[instrument(skip(self), fields(tenant_id = self.scope.tenant_id, auth_id = %id), name = "vault_delete_authentication")]
    async fn delete(&self, id: &AuthenticationId) -> Result<Authentication> {
        let record = self.find(id).await?;
        let path = SecretPath::for_record(&record)
            .map_err(|e| AuthStoreError::malformed_secret(id.as_str(), e))?;

        self.client.delete(&path.metadata_path(&self.mount)).await?;
        Ok(record)
    }

    #[instrument(skip(self, records), fields(tenant_id = self.scope.tenant_id, count = records.len()), name = "vault_bulk_delete_authentications")]
    async fn bulk_delete(&self, records: Vec<Authentication>) -> BulkDeleteOutcome {
        let mut outcome = BulkDeleteOutcome::default();

        for record in records {
            if record.tenant_id != self.scope.tenant_id {
                let error = AuthStoreError::not_found("authentication", record.id.as_str());
                outcome.fail(record, error);
                continue;
            }
            let path = match SecretPath::for_record(&record) {
                Ok(path) => path,
                Err(e) => {
                    let error = AuthStoreError::malformed_secret(record.id.as_str(), e);
                    outcome.fail(record, error);
                    continue;
                }
            };

            match self.client.delete(&path.metadata_path(&self.mount)).await {
                Ok(()) => outcome.deleted.push(record),
                Err(e) => {
                    warn!(auth_id = %record.id, error = %e, "Failed to delete secret in bulk");
                    outcome.fail(record, e);
                }
            }
        }

        outcome
    }

    #[instrument(skip(self, resource_ids), fields(tenant_id = self.scope.tenant_id, resource_type = %resource_type), name = "vault_authentications_by_resources")]
    async fn authentications_by_resources(
        &self,
        resource_type: ResourceType,
        resource_ids: &[i64],
    ) -> Result<Vec<Authentication>> {
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: HashSet<i64> = resource_ids.iter().copied().collect();
        let paths: Vec<SecretPath> = self
            .tenant_keys()
            .await?
            .into_iter()
            .filter(|p| p.resource_type == resource_type && wanted.contains(&p.resource_id))
            .collect();

        // One unreadable secret must not hide its healthy neighbours from a
        // cascade; deletion only needs the key
        let loaded = join_all(paths.iter().map(|path| self.load(path))).await;
        let mut records = Vec::with_capacity(paths.len());
        for (path, result) in paths.iter().zip(loaded) {
            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path, error = %e, "Collecting unreadable secret by key only");
                    records.push(codec::key_only(path));
                }
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn reveal_password(&self, record: &Authentication) -> Result<Option<SecretValue>> {
        Ok(record.password.clone())
    }

    async fn health_check(&self) -> Result<()> {
        self.client.health().await
    }
}
