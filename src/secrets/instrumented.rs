//! Metrics and tracing decorator around any [`AuthenticationStore`].
//!
//! Records one `authstore_operations_total` sample and one latency sample per
//! call, labelled with the backend and operation. Never logs secret values.

use crate::domain::{
    Authentication, AuthenticationId, AuthenticationPatch, FilterSet, NewAuthentication, Page,
    ResourceType,
};
use crate::errors::Result;
use crate::observability::MetricsRecorder;
use crate::secrets::store::{AuthenticationStore, BulkDeleteOutcome, TenantScope};
use crate::secrets::{SecretStoreKind, SecretValue};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct InstrumentedStore {
    inner: Arc<dyn AuthenticationStore>,
    metrics: MetricsRecorder,
}

impl InstrumentedStore {
    pub fn new(inner: Arc<dyn AuthenticationStore>) -> Self {
        Self { inner, metrics: MetricsRecorder::new() }
    }

    async fn observe<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let backend = self.inner.kind();
        let span = crate::secret_span!(backend, operation, tenant_id = self.inner.scope().tenant_id);
        let start = Instant::now();

        let result = call.instrument(span).await;

        if let Err(e) = &result {
            tracing::debug!(backend = %backend, operation, error = %e, "Secret store operation failed");
        }
        self.metrics.record_store_operation(
            backend.as_str(),
            operation,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }
}

#[async_trait]
impl AuthenticationStore for InstrumentedStore {
    fn kind(&self) -> SecretStoreKind {
        self.inner.kind()
    }

    fn scope(&self) -> TenantScope {
        self.inner.scope()
    }

    async fn list(&self, page: Page, filters: &FilterSet) -> Result<(Vec<Authentication>, i64)> {
        self.observe("list", self.inner.list(page, filters)).await
    }

    async fn list_for_resource(
        &self,
        resource_type: ResourceType,
        resource_id: i64,
        page: Page,
        filters: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)> {
        self.observe(
            "list_for_resource",
            self.inner.list_for_resource(resource_type, resource_id, page, filters),
        )
        .await
    }

    async fn get_by_id(&self, id: &AuthenticationId) -> Result<Authentication> {
        self.observe("get", self.inner.get_by_id(id)).await
    }

    async fn create(&self, new: NewAuthentication) -> Result<Authentication> {
        self.observe("create", self.inner.create(new)).await
    }

    async fn bulk_create(&self, new: NewAuthentication) -> Result<Authentication> {
        self.observe("bulk_create", self.inner.bulk_create(new)).await
    }

    async fn update(
        &self,
        id: &AuthenticationId,
        patch: AuthenticationPatch,
    ) -> Result<Authentication> {
        self.observe("update", self.inner.update(id, patch)).await
    }

    async fn delete(&self, id: &AuthenticationId) -> Result<Authentication> {
        self.observe("delete", self.inner.delete(id)).await
    }

    async fn bulk_delete(&self, records: Vec<Authentication>) -> BulkDeleteOutcome {
        let backend = self.inner.kind();
        let start = Instant::now();
        let span = crate::secret_span!(backend, "bulk_delete", count = records.len());

        let outcome = self.inner.bulk_delete(records).instrument(span).await;

        self.metrics.record_store_operation(
            backend.as_str(),
            "bulk_delete",
            outcome.failures.is_empty(),
            start.elapsed().as_secs_f64(),
        );
        self.metrics.record_bulk_delete(
            backend.as_str(),
            outcome.deleted_count(),
            outcome.failures.len() + outcome.secret_cleanup_errors.len(),
        );
        outcome
    }

    async fn authentications_by_resources(
        &self,
        resource_type: ResourceType,
        resource_ids: &[i64],
    ) -> Result<Vec<Authentication>> {
        self.observe(
            "authentications_by_resources",
            self.inner.authentications_by_resources(resource_type, resource_ids),
        )
        .await
    }

    async fn reveal_password(&self, record: &Authentication) -> Result<Option<SecretValue>> {
        self.observe("reveal_password", self.inner.reveal_password(record)).await
    }

    async fn health_check(&self) -> Result<()> {
        self.observe("health_check", self.inner.health_check()).await
    }
}
