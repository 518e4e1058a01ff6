//! Relational authentication store
//!
//! Records live in the `authentications` table. Passwords are sealed with
//! [`PasswordCipher`] before they reach the column; the hybrid backend reuses
//! this store with the column holding an external secret reference instead.

use crate::domain::{
    Authentication, AuthenticationId, AuthenticationPatch, AvailabilityStatus, FilterSet,
    NewAuthentication, Page, ResourceType,
};
use crate::errors::{AuthStoreError, Result};
use crate::secrets::store::{
    ensure_resource_exists, resolve_owner_source, AuthenticationStore, BulkDeleteOutcome,
    TenantScope,
};
use crate::secrets::{PasswordCipher, SecretStoreKind, SecretValue};
use crate::storage::{DbPool, ResourceResolver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::sync::Arc;
use tracing::{error, instrument, warn};

const COLUMNS: &str = "id, tenant_id, user_id, resource_type, resource_id, source_id, authtype, \
     name, username, password, extra, availability_status, availability_status_error, \
     last_checked_at, last_available_at, created_at, updated_at";

/// Database row structure for authentications
#[derive(FromRow)]
struct AuthenticationRow {
    id: i64,
    tenant_id: i64,
    user_id: Option<i64>,
    resource_type: String,
    resource_id: i64,
    source_id: i64,
    authtype: String,
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    extra: Json<Map<String, Value>>,
    availability_status: Option<String>,
    availability_status_error: Option<String>,
    last_checked_at: Option<DateTime<Utc>>,
    last_available_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<AuthenticationRow> for Authentication {
    type Error = AuthStoreError;

    fn try_from(row: AuthenticationRow) -> Result<Self> {
        let resource_type = row.resource_type.parse::<ResourceType>().map_err(|_| {
            AuthStoreError::internal(format!(
                "authentication {} has unknown resource type '{}'",
                row.id, row.resource_type
            ))
        })?;
        let availability_status = row
            .availability_status
            .as_deref()
            .map(str::parse::<AvailabilityStatus>)
            .transpose()
            .map_err(|_| {
                AuthStoreError::internal(format!(
                    "authentication {} has unknown availability status",
                    row.id
                ))
            })?;

        Ok(Authentication {
            id: AuthenticationId::from(row.id),
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            resource_type,
            resource_id: row.resource_id,
            source_id: row.source_id,
            auth_type: row.authtype,
            name: row.name,
            username: row.username,
            password: row.password.map(SecretValue::new),
            extra: row.extra.0,
            availability_status,
            availability_status_error: row.availability_status_error,
            last_checked_at: row.last_checked_at,
            last_available_at: row.last_available_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: None,
        })
    }
}

/// What the password column holds
#[derive(Debug, Clone)]
enum PasswordColumn {
    /// AES-256-GCM ciphertext of the plaintext password
    Encrypted(Arc<PasswordCipher>),
    /// Opaque value stored as given, e.g. an external secret reference
    Reference,
}

/// Ownership restriction applied on top of the tenant/user scope
enum OwnerClause {
    Any,
    Resource(ResourceType, i64),
    /// Direct application credentials plus those linked through
    /// `application_authentications`
    Application(i64),
}

#[derive(Debug, Clone)]
pub struct DatabaseStore {
    pool: DbPool,
    scope: TenantScope,
    resolver: Arc<dyn ResourceResolver>,
    password_column: PasswordColumn,
}

impl DatabaseStore {
    pub fn new(
        pool: DbPool,
        scope: TenantScope,
        resolver: Arc<dyn ResourceResolver>,
        cipher: Arc<PasswordCipher>,
    ) -> Self {
        Self { pool, scope, resolver, password_column: PasswordColumn::Encrypted(cipher) }
    }

    /// Store whose password column keeps values verbatim
    pub fn with_reference_column(
        pool: DbPool,
        scope: TenantScope,
        resolver: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self { pool, scope, resolver, password_column: PasswordColumn::Reference }
    }

    fn protect(&self, password: &SecretValue) -> Result<String> {
        match &self.password_column {
            PasswordColumn::Encrypted(cipher) => cipher.encrypt(password.expose()),
            PasswordColumn::Reference => Ok(password.expose().to_string()),
        }
    }

    /// `tenant_id = ? AND <user visibility>`
    fn push_scope(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push("tenant_id = ").push_bind(self.scope.tenant_id);
        match self.scope.user_id {
            Some(user_id) => {
                qb.push(" AND (user_id IS NULL OR user_id = ").push_bind(user_id).push(")");
            }
            None => {
                qb.push(" AND user_id IS NULL");
            }
        }
    }

    fn push_owner(&self, qb: &mut QueryBuilder<'_, Sqlite>, owner: &OwnerClause) {
        match owner {
            OwnerClause::Any => {}
            OwnerClause::Resource(resource_type, resource_id) => {
                qb.push(" AND resource_type = ")
                    .push_bind(resource_type.as_str())
                    .push(" AND resource_id = ")
                    .push_bind(*resource_id);
            }
            OwnerClause::Application(application_id) => {
                qb.push(" AND ((resource_type = ")
                    .push_bind(ResourceType::Application.as_str())
                    .push(" AND resource_id = ")
                    .push_bind(*application_id)
                    .push(") OR CAST(id AS TEXT) IN (SELECT authentication_uid FROM application_authentications WHERE application_id = ")
                    .push_bind(*application_id)
                    .push(" AND tenant_id = ")
                    .push_bind(self.scope.tenant_id)
                    .push("))");
            }
        }
    }

    async fn select_page(
        &self,
        owner: OwnerClause,
        page: Page,
        filters: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM authentications WHERE ");
        self.push_scope(&mut count);
        self.push_owner(&mut count, &owner);
        filters.push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await.map_err(|e| {
            error!(error = %e, tenant_id = self.scope.tenant_id, "Failed to count authentications");
            AuthStoreError::database(e, "Failed to count authentications")
        })?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT ");
        select.push(COLUMNS).push(" FROM authentications WHERE ");
        self.push_scope(&mut select);
        self.push_owner(&mut select, &owner);
        filters.push_where(&mut select);
        filters.push_order_by(&mut select);
        select.push(" LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.offset);

        let rows = select
            .build_query_as::<AuthenticationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, tenant_id = self.scope.tenant_id, "Failed to list authentications");
                AuthStoreError::database(e, "Failed to list authentications")
            })?;

        let records = rows.into_iter().map(Authentication::try_from).collect::<Result<Vec<_>>>()?;
        Ok((records, total))
    }

    /// Source that will own `new`; probes the owning resource when `check_exists`
    pub(crate) async fn resolve_source(
        &self,
        new: &NewAuthentication,
        check_exists: bool,
    ) -> Result<i64> {
        resolve_owner_source(self.resolver.as_ref(), self.scope.tenant_id, new, check_exists).await
    }

    /// Persist `new` under the already-resolved `source_id`
    #[instrument(skip(self, new), fields(tenant_id = self.scope.tenant_id, resource_type = %new.resource_type), name = "db_create_authentication")]
    pub(crate) async fn insert(
        &self,
        mut new: NewAuthentication,
        source_id: i64,
    ) -> Result<Authentication> {
        let stored_password = match new.password.take() {
            Some(password) => Some(self.protect(&password)?),
            None => None,
        };
        let created_at = Utc::now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO authentications (tenant_id, user_id, resource_type, resource_id, source_id, \
             authtype, name, username, password, extra, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(self.scope.tenant_id)
        .bind(self.scope.user_id)
        .bind(new.resource_type.as_str())
        .bind(new.resource_id)
        .bind(source_id)
        .bind(&new.auth_type)
        .bind(&new.name)
        .bind(&new.username)
        .bind(&stored_password)
        .bind(Json(&new.extra))
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert authentication");
            AuthStoreError::database(e, "Failed to create authentication")
        })?;

        let mut record = new.into_record(
            AuthenticationId::from(id),
            self.scope.tenant_id,
            self.scope.user_id,
            source_id,
            created_at,
        );
        record.password = stored_password.map(SecretValue::new);
        Ok(record)
    }
}

#[async_trait]
impl AuthenticationStore for DatabaseStore {
    fn kind(&self) -> SecretStoreKind {
        SecretStoreKind::Database
    }

    fn scope(&self) -> TenantScope {
        self.scope
    }

    #[instrument(skip(self, filters), fields(tenant_id = self.scope.tenant_id), name = "db_list_authentications")]
    async fn list(&self, page: Page, filters: &FilterSet) -> Result<(Vec<Authentication>, i64)> {
        self.select_page(OwnerClause::Any, page, filters).await
    }

    #[instrument(skip(self, filters), fields(tenant_id = self.scope.tenant_id), name = "db_list_resource_authentications")]
    async fn list_for_resource(
        &self,
        resource_type: ResourceType,
        resource_id: i64,
        page: Page,
        filters: &FilterSet,
    ) -> Result<(Vec<Authentication>, i64)> {
        ensure_resource_exists(self.resolver.as_ref(), self.scope.tenant_id, resource_type, resource_id)
            .await?;

        let owner = match resource_type {
            ResourceType::Application => OwnerClause::Application(resource_id),
            other => OwnerClause::Resource(other, resource_id),
        };
        self.select_page(owner, page, filters).await
    }

    #[instrument(skip(self), fields(tenant_id = self.scope.tenant_id, auth_id = %id), name = "db_get_authentication")]
    async fn get_by_id(&self, id: &AuthenticationId) -> Result<Authentication> {
        let db_id = id.as_database_id()?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(COLUMNS).push(" FROM authentications WHERE id = ").push_bind(db_id).push(" AND ");
        self.push_scope(&mut qb);

        let row = qb
            .build_query_as::<AuthenticationRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, auth_id = db_id, "Failed to fetch authentication");
                AuthStoreError::database(e, format!("Failed to fetch authentication '{}'", id))
            })?;

        row.ok_or_else(|| AuthStoreError::not_found("authentication", id.as_str()))?.try_into()
    }

    async fn create(&self, new: NewAuthentication) -> Result<Authentication> {
        let source_id = self.resolve_source(&new, true).await?;
        self.insert(new, source_id).await
    }

    async fn bulk_create(&self, new: NewAuthentication) -> Result<Authentication> {
        let source_id = self.resolve_source(&new, false).await?;
        self.insert(new, source_id).await
    }

    #[instrument(skip(self, patch), fields(tenant_id = self.scope.tenant_id, auth_id = %id), name = "db_update_authentication")]
    async fn update(
        &self,
        id: &AuthenticationId,
        mut patch: AuthenticationPatch,
    ) -> Result<Authentication> {
        let db_id = id.as_database_id()?;
        let stored_password = match patch.password.take() {
            Some(password) => Some(self.protect(&password)?),
            None => None,
        };

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE authentications SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(auth_type) = patch.auth_type {
            qb.push(", authtype = ").push_bind(auth_type);
        }
        if let Some(name) = patch.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(username) = patch.username {
            qb.push(", username = ").push_bind(username);
        }
        if let Some(password) = stored_password {
            qb.push(", password = ").push_bind(password);
        }
        if let Some(extra) = patch.extra {
            qb.push(", extra = ").push_bind(Json(extra));
        }
        if let Some(status) = patch.availability_status {
            qb.push(", availability_status = ").push_bind(status.as_str());
        }
        if let Some(error) = patch.availability_status_error {
            qb.push(", availability_status_error = ").push_bind(error);
        }
        if let Some(at) = patch.last_checked_at {
            qb.push(", last_checked_at = ").push_bind(at);
        }
        if let Some(at) = patch.last_available_at {
            qb.push(", last_available_at = ").push_bind(at);
        }
        qb.push(" WHERE id = ").push_bind(db_id).push(" AND ");
        self.push_scope(&mut qb);
        qb.push(" RETURNING ").push(COLUMNS);

        let row = qb
            .build_query_as::<AuthenticationRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, auth_id = db_id, "Failed to update authentication");
                AuthStoreError::database(e, format!("Failed to update authentication '{}'", id))
            })?;

        row.ok_or_else(|| AuthStoreError::not_found("authentication", id.as_str()))?.try_into()
    }

    #[instrument(skip(self), fields(tenant_id = self.scope.tenant_id, auth_id = %id), name = "db_delete_authentication")]
    async fn delete(&self, id: &AuthenticationId) -> Result<Authentication> {
        let db_id = id.as_database_id()?;

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM authentications WHERE id = ");
        qb.push_bind(db_id).push(" AND ");
        self.push_scope(&mut qb);
        qb.push(" RETURNING ").push(COLUMNS);

        let row = qb
            .build_query_as::<AuthenticationRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, auth_id = db_id, "Failed to delete authentication");
                AuthStoreError::database(e, format!("Failed to delete authentication '{}'", id))
            })?;

        row.ok_or_else(|| AuthStoreError::not_found("authentication", id.as_str()))?.try_into()
    }

    /// Deletes by identity within the tenant in one transaction. Records are
    /// expected to come from this tenant, so user ownership is not re-checked.
    /// `deleted` carries the rows as they were stored.
    #[instrument(skip(self, records), fields(tenant_id = self.scope.tenant_id, count = records.len()), name = "db_bulk_delete_authentications")]
    async fn bulk_delete(&self, records: Vec<Authentication>) -> BulkDeleteOutcome {
        let mut outcome = BulkDeleteOutcome::default();
        if records.is_empty() {
            return outcome;
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "Failed to begin bulk delete transaction");
                for record in records {
                    outcome.fail(
                        record,
                        AuthStoreError::internal(format!("bulk delete not started: {}", e)),
                    );
                }
                return outcome;
            }
        };

        let mut removed = Vec::with_capacity(records.len());
        for record in records {
            let db_id = match record.id.as_database_id() {
                Ok(id) => id,
                Err(e) => {
                    outcome.fail(record, e);
                    continue;
                }
            };

            let result = sqlx::query_as::<_, AuthenticationRow>(&format!(
                "DELETE FROM authentications WHERE id = ? AND tenant_id = ? RETURNING {}",
                COLUMNS
            ))
            .bind(db_id)
            .bind(self.scope.tenant_id)
            .fetch_optional(&mut *tx)
            .await;

            match result {
                // Report the row as stored, not the caller's copy
                Ok(Some(row)) => match Authentication::try_from(row) {
                    Ok(stored) => removed.push(stored),
                    Err(e) => {
                        warn!(error = %e, auth_id = db_id, "Deleted row could not be decoded");
                        removed.push(record);
                    }
                },
                Ok(None) => {
                    let error = AuthStoreError::not_found("authentication", record.id.as_str());
                    outcome.fail(record, error);
                }
                Err(e) => {
                    warn!(error = %e, auth_id = db_id, "Failed to delete authentication in bulk");
                    outcome.fail(record, AuthStoreError::database(e, "Failed to delete authentication"));
                }
            }
        }

        match tx.commit().await {
            Ok(()) => outcome.deleted = removed,
            Err(e) => {
                error!(error = %e, "Failed to commit bulk delete");
                for record in removed {
                    outcome.fail(
                        record,
                        AuthStoreError::internal(format!("bulk delete rolled back: {}", e)),
                    );
                }
            }
        }

        outcome
    }

    #[instrument(skip(self, resource_ids), fields(tenant_id = self.scope.tenant_id, resource_type = %resource_type), name = "db_authentications_by_resources")]
    async fn authentications_by_resources(
        &self,
        resource_type: ResourceType,
        resource_ids: &[i64],
    ) -> Result<Vec<Authentication>> {
        if resource_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(COLUMNS)
            .push(" FROM authentications WHERE tenant_id = ")
            .push_bind(self.scope.tenant_id)
            .push(" AND resource_type = ")
            .push_bind(resource_type.as_str())
            .push(" AND resource_id IN (");
        let mut ids = qb.separated(", ");
        for id in resource_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY id ASC");

        let rows = qb
            .build_query_as::<AuthenticationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to collect authentications by resource");
                AuthStoreError::database(e, "Failed to collect authentications by resource")
            })?;

        rows.into_iter().map(Authentication::try_from).collect()
    }

    async fn reveal_password(&self, record: &Authentication) -> Result<Option<SecretValue>> {
        match (&self.password_column, &record.password) {
            (_, None) => Ok(None),
            (PasswordColumn::Encrypted(cipher), Some(sealed)) => {
                cipher.decrypt(sealed.expose()).map(Some)
            }
            (PasswordColumn::Reference, Some(value)) => Ok(Some(value.clone())),
        }
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AuthStoreError::database(e, "Database health check failed"))?;
        Ok(())
    }
}
