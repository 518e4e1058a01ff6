//! Placeholder used when no secret store is configured.
//!
//! Every operation fails with the same `Unsupported` error so callers get one
//! uniform signal instead of empty results.

use crate::domain::{
    Authentication, AuthenticationId, AuthenticationPatch, FilterSet, NewAuthentication, Page,
    ResourceType,
};
use crate::errors::{AuthStoreError, Result};
use crate::secrets::store::{AuthenticationStore, BulkDeleteOutcome, TenantScope};
use crate::secrets::{SecretStoreKind, SecretValue};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredStore {
    scope: TenantScope,
}

impl UnconfiguredStore {
    pub fn new(scope: TenantScope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl AuthenticationStore for UnconfiguredStore {
    fn kind(&self) -> SecretStoreKind {
        SecretStoreKind::None
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    async fn list(&self, _: Page, _: &FilterSet) -> Result<(Vec<Authentication>, i64)> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn list_for_resource(
        &self,
        _: ResourceType,
        _: i64,
        _: Page,
        _: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn get_by_id(&self, _: &AuthenticationId) -> Result<Authentication> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn create(&self, _: NewAuthentication) -> Result<Authentication> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn bulk_create(&self, _: NewAuthentication) -> Result<Authentication> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn update(&self, _: &AuthenticationId, _: AuthenticationPatch) -> Result<Authentication> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn delete(&self, _: &AuthenticationId) -> Result<Authentication> {
        Err(AuthStoreError::no_secret_store())
    }

    /// Nothing is removed; every record is reported back as a failure
    async fn bulk_delete(&self, records: Vec<Authentication>) -> BulkDeleteOutcome {
        let mut outcome = BulkDeleteOutcome::default();
        for record in records {
            outcome.fail(record, AuthStoreError::no_secret_store());
        }
        outcome
    }

    async fn authentications_by_resources(
        &self,
        _: ResourceType,
        _: &[i64],
    ) -> Result<Vec<Authentication>> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn reveal_password(&self, _: &Authentication) -> Result<Option<SecretValue>> {
        Err(AuthStoreError::no_secret_store())
    }

    async fn health_check(&self) -> Result<()> {
        Err(AuthStoreError::no_secret_store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_no_store(err: &AuthStoreError) -> bool {
        matches!(err, AuthStoreError::Unsupported { message } if message == AuthStoreError::NO_SECRET_STORE)
    }

    #[tokio::test]
    async fn test_every_operation_reports_missing_store() {
        let store = UnconfiguredStore::new(TenantScope::tenant(1));
        let id = AuthenticationId::new("1");

        assert!(is_no_store(&store.list(Page::default(), &FilterSet::new()).await.unwrap_err()));
        assert!(is_no_store(
            &store
                .list_for_resource(ResourceType::Source, 1, Page::default(), &FilterSet::new())
                .await
                .unwrap_err()
        ));
        assert!(is_no_store(&store.get_by_id(&id).await.unwrap_err()));
        assert!(is_no_store(
            &store
                .create(NewAuthentication::new(ResourceType::Source, 1, "basic"))
                .await
                .unwrap_err()
        ));
        assert!(is_no_store(&store.update(&id, AuthenticationPatch::default()).await.unwrap_err()));
        assert!(is_no_store(&store.delete(&id).await.unwrap_err()));
        assert!(is_no_store(&store.health_check().await.unwrap_err()));
        assert_eq!(AuthStoreError::no_secret_store().status_code(), 501);
    }
}
