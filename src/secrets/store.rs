//! The unified authentication store contract.
//!
//! Every backend (relational, key-value, hybrid and the unconfigured
//! placeholder) implements [`AuthenticationStore`]. A store instance is bound
//! to one [`TenantScope`]; nothing it returns ever belongs to another tenant.

use crate::domain::{
    Authentication, AuthenticationId, AuthenticationPatch, FilterSet, NewAuthentication, Page,
    ResourceType,
};
use crate::errors::{AuthStoreError, Result};
use crate::secrets::{SecretStoreKind, SecretValue};
use crate::storage::ResourceResolver;
use async_trait::async_trait;

/// Tenant and optional user every store operation is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantScope {
    pub tenant_id: i64,
    /// `None` means tenant-wide visibility: only records without an owning user
    pub user_id: Option<i64>,
}

impl TenantScope {
    pub fn tenant(tenant_id: i64) -> Self {
        Self { tenant_id, user_id: None }
    }

    pub fn user(tenant_id: i64, user_id: i64) -> Self {
        Self { tenant_id, user_id: Some(user_id) }
    }
}

/// A record a bulk delete could not remove
#[derive(Debug)]
pub struct BulkDeleteFailure {
    pub record: Authentication,
    pub error: AuthStoreError,
}

/// Partial-success result of [`AuthenticationStore::bulk_delete`]
#[derive(Debug, Default)]
pub struct BulkDeleteOutcome {
    /// Records actually removed; only these should produce change events
    pub deleted: Vec<Authentication>,
    /// Records left in place
    pub failures: Vec<BulkDeleteFailure>,
    /// External secrets that could not be removed after their record was
    pub secret_cleanup_errors: Vec<BulkDeleteFailure>,
}

impl BulkDeleteOutcome {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.secret_cleanup_errors.is_empty()
    }

    pub(crate) fn fail(&mut self, record: Authentication, error: AuthStoreError) {
        self.failures.push(BulkDeleteFailure { record, error });
    }
}

/// Tenant-scoped credential storage.
///
/// # Errors
///
/// All operations report the shared taxonomy: `NotFound` for missing records
/// or owning resources, `BadRequest` for malformed input, `Unsupported` when
/// no secret store is configured, `Upstream` for failures of the external
/// secret services, which are never retried here.
#[async_trait]
pub trait AuthenticationStore: Send + Sync + std::fmt::Debug {
    /// Backend governing every record of this deployment
    fn kind(&self) -> SecretStoreKind;

    fn scope(&self) -> TenantScope;

    /// A page of visible records matching `filters`, plus the unpaginated total.
    ///
    /// Passwords come back as stored: ciphertext for the relational store and
    /// the external reference for the secrets-manager store, which
    /// dereferences only in [`get_by_id`](Self::get_by_id). Call
    /// [`reveal_password`](Self::reveal_password) per record for plaintext.
    async fn list(&self, page: Page, filters: &FilterSet) -> Result<(Vec<Authentication>, i64)>;

    /// Like [`list`](Self::list), restricted to one owning resource.
    ///
    /// Fails with `NotFound` when the resource itself does not exist under the
    /// tenant; an existing resource without credentials yields an empty page.
    async fn list_for_resource(
        &self,
        resource_type: ResourceType,
        resource_id: i64,
        page: Page,
        filters: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)>;

    async fn get_by_id(&self, id: &AuthenticationId) -> Result<Authentication>;

    /// Resolve the owning source, persist, and return the stored record with
    /// its backend-assigned identity and version
    async fn create(&self, new: NewAuthentication) -> Result<Authentication>;

    /// Create without the resource-existence check; `source_id` must be supplied
    /// unless the owner is a source
    async fn bulk_create(&self, new: NewAuthentication) -> Result<Authentication>;

    /// Partial update; the password goes through the same protection as on create
    async fn update(&self, id: &AuthenticationId, patch: AuthenticationPatch)
        -> Result<Authentication>;

    /// Remove a record and return it for event publication
    async fn delete(&self, id: &AuthenticationId) -> Result<Authentication>;

    /// Best-effort batch delete; never fails as a whole
    async fn bulk_delete(&self, records: Vec<Authentication>) -> BulkDeleteOutcome;

    /// Every credential of the tenant owned by one of `resource_ids`, regardless
    /// of user ownership. Used when the owning resources are being deleted, so
    /// an unreadable entry is still returned, carrying only its identity.
    async fn authentications_by_resources(
        &self,
        resource_type: ResourceType,
        resource_ids: &[i64],
    ) -> Result<Vec<Authentication>>;

    /// Plaintext password of a record returned by this store
    async fn reveal_password(&self, record: &Authentication) -> Result<Option<SecretValue>>;

    async fn health_check(&self) -> Result<()>;
}

/// Source that will own a new credential.
///
/// With `check_exists` the owning resource is probed under the tenant;
/// without it the caller-supplied `source_id` is trusted.
pub(crate) async fn resolve_owner_source(
    resolver: &dyn ResourceResolver,
    tenant_id: i64,
    new: &NewAuthentication,
    check_exists: bool,
) -> Result<i64> {
    let missing_source = || {
        AuthStoreError::bad_request_field(
            format!("source_id is required for {} resources", new.resource_type),
            "source_id",
        )
    };

    if !check_exists {
        return match new.resource_type {
            ResourceType::Source => Ok(new.resource_id),
            _ => new.source_id.ok_or_else(missing_source),
        };
    }

    match new.resource_type {
        ResourceType::ApplicationAuthentication => {
            let source_id = new.source_id.ok_or_else(missing_source)?;
            ensure_resource_exists(resolver, tenant_id, new.resource_type, new.resource_id).await?;
            Ok(source_id)
        }
        resource_type => resolver.resolve_source_id(tenant_id, resource_type, new.resource_id).await,
    }
}

/// `NotFound` unless the resource exists under the tenant
pub(crate) async fn ensure_resource_exists(
    resolver: &dyn ResourceResolver,
    tenant_id: i64,
    resource_type: ResourceType,
    resource_id: i64,
) -> Result<()> {
    if resolver.exists(tenant_id, resource_type, resource_id).await? {
        Ok(())
    } else {
        Err(AuthStoreError::not_found(resource_type.as_str(), resource_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StaticResolver;

    #[async_trait]
    impl ResourceResolver for StaticResolver {
        async fn exists(&self, _: i64, _: ResourceType, resource_id: i64) -> Result<bool> {
            Ok(resource_id == 1)
        }

        async fn resolve_source_id(&self, _: i64, rt: ResourceType, id: i64) -> Result<i64> {
            if id == 1 {
                Ok(3)
            } else {
                Err(AuthStoreError::not_found(rt.as_str(), id.to_string()))
            }
        }

        async fn application_vault_paths(&self, _: i64, _: i64) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_resolve_owner_source_checked() {
        let app = NewAuthentication::new(ResourceType::Application, 1, "basic");
        assert_eq!(resolve_owner_source(&StaticResolver, 1, &app, true).await.unwrap(), 3);

        let missing = NewAuthentication::new(ResourceType::Endpoint, 2, "basic");
        let err = resolve_owner_source(&StaticResolver, 1, &missing, true).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_application_authentication_needs_explicit_source() {
        let new = NewAuthentication::new(ResourceType::ApplicationAuthentication, 1, "basic");
        let err = resolve_owner_source(&StaticResolver, 1, &new, true).await.unwrap_err();
        assert!(matches!(err, AuthStoreError::BadRequest { .. }));

        let new = new.with_source_id(8);
        assert_eq!(resolve_owner_source(&StaticResolver, 1, &new, true).await.unwrap(), 8);

        let absent = NewAuthentication::new(ResourceType::ApplicationAuthentication, 2, "basic")
            .with_source_id(8);
        assert!(resolve_owner_source(&StaticResolver, 1, &absent, true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unchecked_resolution_trusts_caller() {
        let source = NewAuthentication::new(ResourceType::Source, 42, "basic");
        assert_eq!(resolve_owner_source(&StaticResolver, 1, &source, false).await.unwrap(), 42);

        let endpoint = NewAuthentication::new(ResourceType::Endpoint, 99, "basic");
        assert!(resolve_owner_source(&StaticResolver, 1, &endpoint, false).await.is_err());
        let endpoint = endpoint.with_source_id(5);
        assert_eq!(resolve_owner_source(&StaticResolver, 1, &endpoint, false).await.unwrap(), 5);
    }
}
