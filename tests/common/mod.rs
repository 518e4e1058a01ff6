//! Common test utilities for all integration tests.
//!
//! Provides an in-memory database, resource seeding and in-process fakes for
//! the external secret services.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod fakes;

use authstore::config::DatabaseConfig;
use authstore::storage::{create_pool, DbPool, ResourceRepository};

pub use fakes::{CountingExternalClient, FakeKvClient};

/// Fresh migrated in-memory database
pub async fn test_pool() -> DbPool {
    create_pool(&DatabaseConfig::in_memory()).await.expect("create in-memory pool")
}

/// Ids of a source with one endpoint and two applications
#[derive(Debug, Clone, Copy)]
pub struct SeededSource {
    pub tenant_id: i64,
    pub source_id: i64,
    pub endpoint_id: i64,
    pub application_ids: [i64; 2],
}

pub async fn seed_source(resources: &ResourceRepository, tenant_id: i64) -> SeededSource {
    let source_id = resources.create_source(tenant_id, "billing").await.expect("create source");
    let endpoint_id = resources
        .create_endpoint(tenant_id, source_id, "billing.internal")
        .await
        .expect("create endpoint");
    let first = resources
        .create_application(tenant_id, source_id, "cost-management")
        .await
        .expect("create application");
    let second = resources
        .create_application(tenant_id, source_id, "catalog")
        .await
        .expect("create application");

    SeededSource { tenant_id, source_id, endpoint_id, application_ids: [first, second] }
}
