//! Owning-resource lookups.
//!
//! Every backend resolves ownership against the relational resource tables,
//! including the key-value backend, which has no way to express the
//! application to credential graph as a key prefix.

use crate::domain::ResourceType;
use crate::errors::{AuthStoreError, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use tracing::{error, info, instrument};

/// Resource existence and source resolution under a tenant
#[async_trait]
pub trait ResourceResolver: Send + Sync + std::fmt::Debug {
    /// Single-row existence probe
    async fn exists(&self, tenant_id: i64, resource_type: ResourceType, resource_id: i64)
        -> Result<bool>;

    /// Resolve the source that owns a resource.
    ///
    /// # Errors
    /// - `NotFound` when the resource does not exist under the tenant
    /// - `BadRequest` for `ApplicationAuthentication`, which has no direct
    ///   source column; callers supply the source id themselves
    async fn resolve_source_id(
        &self,
        tenant_id: i64,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> Result<i64>;

    /// Key-value paths of credentials linked to an application
    async fn application_vault_paths(&self, tenant_id: i64, application_id: i64)
        -> Result<Vec<String>>;
}

/// Resources hanging off one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceChildren {
    pub endpoint_ids: Vec<i64>,
    pub application_ids: Vec<i64>,
    pub application_authentication_ids: Vec<i64>,
}

/// Row counts removed by [`ResourceRepository::delete_source_tree`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletedResources {
    pub sources: u64,
    pub endpoints: u64,
    pub applications: u64,
    pub application_authentications: u64,
}

/// SQL access to the owning-resource tables
#[derive(Debug, Clone)]
pub struct ResourceRepository {
    pool: DbPool,
}

impl ResourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, name), name = "db_create_source")]
    pub async fn create_source(&self, tenant_id: i64, name: &str) -> Result<i64> {
        sqlx::query_scalar("INSERT INTO sources (tenant_id, name) VALUES (?, ?) RETURNING id")
            .bind(tenant_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AuthStoreError::database(e, "Failed to create source"))
    }

    #[instrument(skip(self, host), name = "db_create_endpoint")]
    pub async fn create_endpoint(&self, tenant_id: i64, source_id: i64, host: &str) -> Result<i64> {
        sqlx::query_scalar(
            "INSERT INTO endpoints (tenant_id, source_id, host) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(tenant_id)
        .bind(source_id)
        .bind(host)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to create endpoint"))
    }

    #[instrument(skip(self, application_type), name = "db_create_application")]
    pub async fn create_application(
        &self,
        tenant_id: i64,
        source_id: i64,
        application_type: &str,
    ) -> Result<i64> {
        sqlx::query_scalar(
            "INSERT INTO applications (tenant_id, source_id, application_type) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(tenant_id)
        .bind(source_id)
        .bind(application_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to create application"))
    }

    /// Link a credential to an application
    #[instrument(skip(self, vault_path), name = "db_link_application_authentication")]
    pub async fn link_application_authentication(
        &self,
        tenant_id: i64,
        application_id: i64,
        authentication_uid: &str,
        vault_path: Option<&str>,
    ) -> Result<i64> {
        sqlx::query_scalar(
            "INSERT INTO application_authentications (tenant_id, application_id, authentication_uid, vault_path) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(tenant_id)
        .bind(application_id)
        .bind(authentication_uid)
        .bind(vault_path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to link application authentication"))
    }

    #[instrument(skip(self), name = "db_source_children")]
    pub async fn source_children(&self, tenant_id: i64, source_id: i64) -> Result<SourceChildren> {
        let endpoint_ids = sqlx::query_scalar(
            "SELECT id FROM endpoints WHERE source_id = ? AND tenant_id = ? ORDER BY id",
        )
        .bind(source_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to list source endpoints"))?;

        let application_ids = sqlx::query_scalar(
            "SELECT id FROM applications WHERE source_id = ? AND tenant_id = ? ORDER BY id",
        )
        .bind(source_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to list source applications"))?;

        let application_authentication_ids = sqlx::query_scalar(
            "SELECT aa.id FROM application_authentications aa \
             JOIN applications a ON a.id = aa.application_id \
             WHERE a.source_id = ? AND aa.tenant_id = ? ORDER BY aa.id",
        )
        .bind(source_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to list application authentications"))?;

        Ok(SourceChildren { endpoint_ids, application_ids, application_authentication_ids })
    }

    /// Delete a source and every resource beneath it in one transaction.
    ///
    /// Credentials are not touched here; they belong to the secret store.
    #[instrument(skip(self), name = "db_delete_source_tree")]
    pub async fn delete_source_tree(&self, tenant_id: i64, source_id: i64) -> Result<DeletedResources> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthStoreError::database(e, "Failed to begin source delete transaction"))?;

        let application_authentications = sqlx::query(
            "DELETE FROM application_authentications WHERE tenant_id = ? AND application_id IN \
             (SELECT id FROM applications WHERE source_id = ? AND tenant_id = ?)",
        )
        .bind(tenant_id)
        .bind(source_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to delete application authentications"))?
        .rows_affected();

        let applications =
            sqlx::query("DELETE FROM applications WHERE source_id = ? AND tenant_id = ?")
                .bind(source_id)
                .bind(tenant_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| AuthStoreError::database(e, "Failed to delete applications"))?
                .rows_affected();

        let endpoints = sqlx::query("DELETE FROM endpoints WHERE source_id = ? AND tenant_id = ?")
            .bind(source_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AuthStoreError::database(e, "Failed to delete endpoints"))?
            .rows_affected();

        let sources = sqlx::query("DELETE FROM sources WHERE id = ? AND tenant_id = ?")
            .bind(source_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AuthStoreError::database(e, "Failed to delete source"))?
            .rows_affected();

        if sources == 0 {
            return Err(AuthStoreError::not_found(ResourceType::Source.as_str(), source_id.to_string()));
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, tenant_id, source_id, "Failed to commit source delete");
            AuthStoreError::database(e, "Failed to commit source delete transaction")
        })?;

        let deleted = DeletedResources { sources, endpoints, applications, application_authentications };
        info!(tenant_id, source_id, ?deleted, "Deleted source resource tree");
        Ok(deleted)
    }
}

#[async_trait]
impl ResourceResolver for ResourceRepository {
    #[instrument(skip(self), name = "db_resource_exists")]
    async fn exists(&self, tenant_id: i64, resource_type: ResourceType, resource_id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ? AND tenant_id = ?)",
            resource_type.table_name()
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(resource_id)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AuthStoreError::database(e, format!("Failed to check {} existence", resource_type))
            })
    }

    #[instrument(skip(self), name = "db_resolve_source_id")]
    async fn resolve_source_id(
        &self,
        tenant_id: i64,
        resource_type: ResourceType,
        resource_id: i64,
    ) -> Result<i64> {
        let sql = match resource_type {
            ResourceType::Source => "SELECT id FROM sources WHERE id = ? AND tenant_id = ?",
            ResourceType::Endpoint => "SELECT source_id FROM endpoints WHERE id = ? AND tenant_id = ?",
            ResourceType::Application => {
                "SELECT source_id FROM applications WHERE id = ? AND tenant_id = ?"
            }
            ResourceType::ApplicationAuthentication => {
                return Err(AuthStoreError::bad_request_field(
                    "source_id must be supplied for ApplicationAuthentication resources",
                    "source_id",
                ))
            }
        };

        sqlx::query_scalar::<_, i64>(sql)
            .bind(resource_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthStoreError::database(e, format!("Failed to resolve {}", resource_type)))?
            .ok_or_else(|| AuthStoreError::not_found(resource_type.as_str(), resource_id.to_string()))
    }

    #[instrument(skip(self), name = "db_application_vault_paths")]
    async fn application_vault_paths(&self, tenant_id: i64, application_id: i64) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT vault_path FROM application_authentications \
             WHERE application_id = ? AND tenant_id = ? AND vault_path IS NOT NULL ORDER BY id",
        )
        .bind(application_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuthStoreError::database(e, "Failed to list application vault paths"))
    }
}
