//! Hybrid authentication store.
//!
//! Records live in the relational table; passwords live in an external
//! secrets-management service and the row keeps only its reference. The
//! external call and the relational write are not transactional: a crash in
//! between can orphan an external secret.

use super::client::{ExternalSecretClient, SecretTags};
use crate::domain::{
    Authentication, AuthenticationId, AuthenticationPatch, FilterSet, NewAuthentication, Page,
    ResourceType,
};
use crate::errors::Result;
use crate::secrets::backends::DatabaseStore;
use crate::secrets::store::{AuthenticationStore, BulkDeleteFailure, BulkDeleteOutcome, TenantScope};
use crate::secrets::{SecretStoreKind, SecretValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SecretsManagerStore {
    records: DatabaseStore,
    client: Arc<dyn ExternalSecretClient>,
    name_prefix: String,
    reference_marker: String,
}

impl SecretsManagerStore {
    /// `records` must keep its password column verbatim
    /// (see [`DatabaseStore::with_reference_column`])
    pub fn new(
        records: DatabaseStore,
        client: Arc<dyn ExternalSecretClient>,
        name_prefix: impl Into<String>,
        reference_marker: impl Into<String>,
    ) -> Self {
        Self {
            records,
            client,
            name_prefix: name_prefix.into(),
            reference_marker: reference_marker.into(),
        }
    }

    fn is_reference(&self, value: &SecretValue) -> bool {
        value.starts_with(&self.reference_marker)
    }

    fn reference_of<'a>(&self, record: &'a Authentication) -> Option<&'a str> {
        record.password.as_ref().filter(|p| self.is_reference(p)).map(SecretValue::expose)
    }

    /// `{prefix}/{tenant}/{ResourceType}_{ResourceID}_{uuid}`
    fn secret_name(&self, resource_type: ResourceType, resource_id: i64) -> String {
        format!(
            "{}/{}/{}_{}_{}",
            self.name_prefix,
            self.records.scope().tenant_id,
            resource_type,
            resource_id,
            Uuid::new_v4()
        )
    }

    fn secret_tags(&self, resource_type: ResourceType, resource_id: i64) -> SecretTags {
        vec![
            ("tenant_id".to_string(), self.records.scope().tenant_id.to_string()),
            ("resource_type".to_string(), resource_type.to_string()),
            ("resource_id".to_string(), resource_id.to_string()),
        ]
    }

    /// Substitute the live value for a stored reference
    async fn dereference(&self, mut record: Authentication) -> Result<Authentication> {
        if let Some(reference) = self.reference_of(&record) {
            let value = self.client.read(reference).await?;
            record.password = Some(value);
        }
        Ok(record)
    }

    #[instrument(skip(self, new), fields(tenant_id = self.records.scope().tenant_id, resource_type = %new.resource_type), name = "hybrid_create_authentication")]
    async fn create_with(&self, mut new: NewAuthentication, check_exists: bool) -> Result<Authentication> {
        let source_id = self.records.resolve_source(&new, check_exists).await?;

        // Every supplied password goes to the external service, whatever it looks like
        let created_reference = match new.password.take() {
            Some(password) => {
                let name = self.secret_name(new.resource_type, new.resource_id);
                let tags = self.secret_tags(new.resource_type, new.resource_id);
                let reference = self.client.create(&name, &password, &tags).await?;
                debug!(secret_name = %name, "Created external secret");
                new.password = Some(SecretValue::new(reference.clone()));
                Some(reference)
            }
            None => None,
        };

        match self.records.insert(new, source_id).await {
            Ok(record) => Ok(record),
            Err(e) => {
                if let Some(reference) = created_reference {
                    self.discard_secret(&reference, "insert").await;
                }
                Err(e)
            }
        }
    }

    /// Best-effort removal of a secret whose row write failed
    async fn discard_secret(&self, reference: &str, operation: &str) {
        match self.client.delete(reference, true).await {
            Ok(()) => debug!(operation, "Removed external secret after failed write"),
            Err(cleanup) => warn!(
                operation,
                error = %cleanup,
                "Orphaned external secret after failed write"
            ),
        }
    }
}

#[async_trait]
impl AuthenticationStore for SecretsManagerStore {
    fn kind(&self) -> SecretStoreKind {
        SecretStoreKind::SecretsManager
    }

    fn scope(&self) -> TenantScope {
        self.records.scope()
    }

    /// References are left in place; use `reveal_password` for the value
    async fn list(&self, page: Page, filters: &FilterSet) -> Result<(Vec<Authentication>, i64)> {
        self.records.list(page, filters).await
    }

    async fn list_for_resource(
        &self,
        resource_type: ResourceType,
        resource_id: i64,
        page: Page,
        filters: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)> {
        self.records.list_for_resource(resource_type, resource_id, page, filters).await
    }

    async fn get_by_id(&self, id: &AuthenticationId) -> Result<Authentication> {
        let record = self.records.get_by_id(id).await?;
        self.dereference(record).await
    }

    async fn create(&self, new: NewAuthentication) -> Result<Authentication> {
        self.create_with(new, true).await
    }

    async fn bulk_create(&self, new: NewAuthentication) -> Result<Authentication> {
        self.create_with(new, false).await
    }

    #[instrument(skip(self, patch), fields(tenant_id = self.records.scope().tenant_id, auth_id = %id), name = "hybrid_update_authentication")]
    async fn update(
        &self,
        id: &AuthenticationId,
        mut patch: AuthenticationPatch,
    ) -> Result<Authentication> {
        let mut created_reference = None;
        if let Some(password) = patch.password.take() {
            let current = self.records.get_by_id(id).await?;
            match self.reference_of(&current) {
                // Echo of this row's own reference, nothing to push
                Some(reference) if reference == password.expose() => {}
                Some(reference) => {
                    self.client.update(reference, &password).await?;
                }
                None => {
                    let name = self.secret_name(current.resource_type, current.resource_id);
                    let tags = self.secret_tags(current.resource_type, current.resource_id);
                    let reference = self.client.create(&name, &password, &tags).await?;
                    patch.password = Some(SecretValue::new(reference.clone()));
                    created_reference = Some(reference);
                }
            }
        }

        match self.records.update(id, patch).await {
            Ok(record) => Ok(record),
            Err(e) => {
                if let Some(reference) = created_reference {
                    self.discard_secret(&reference, "update").await;
                }
                Err(e)
            }
        }
    }

    /// The external delete is best effort; the row is removed regardless
    #[instrument(skip(self), fields(tenant_id = self.records.scope().tenant_id, auth_id = %id), name = "hybrid_delete_authentication")]
    async fn delete(&self, id: &AuthenticationId) -> Result<Authentication> {
        let current = self.records.get_by_id(id).await?;
        if let Some(reference) = self.reference_of(&current) {
            if let Err(e) = self.client.delete(reference, true).await {
                warn!(auth_id = %id, error = %e, "Failed to delete external secret");
            }
        }
        self.records.delete(id).await
    }

    /// Rows go first; external secrets are removed only for rows actually
    /// deleted, using the reference each row held rather than the caller's copy
    async fn bulk_delete(&self, records: Vec<Authentication>) -> BulkDeleteOutcome {
        let mut outcome = self.records.bulk_delete(records).await;

        let mut cleanup_errors = Vec::new();
        for record in &outcome.deleted {
            if let Some(reference) = self.reference_of(record) {
                if let Err(error) = self.client.delete(reference, true).await {
                    warn!(auth_id = %record.id, error = %error, "Failed to delete external secret in bulk");
                    cleanup_errors.push(BulkDeleteFailure { record: record.clone(), error });
                }
            }
        }
        outcome.secret_cleanup_errors.extend(cleanup_errors);
        outcome
    }

    async fn authentications_by_resources(
        &self,
        resource_type: ResourceType,
        resource_ids: &[i64],
    ) -> Result<Vec<Authentication>> {
        self.records.authentications_by_resources(resource_type, resource_ids).await
    }

    /// Only the reference stored on the tenant's own row is ever read
    async fn reveal_password(&self, record: &Authentication) -> Result<Option<SecretValue>> {
        if self.reference_of(record).is_none() {
            return Ok(record.password.clone());
        }
        let stored = self.records.get_by_id(&record.id).await?;
        match self.reference_of(&stored) {
            Some(reference) => self.client.read(reference).await.map(Some),
            None => Ok(stored.password),
        }
    }

    async fn health_check(&self) -> Result<()> {
        self.records.health_check().await
    }
}
