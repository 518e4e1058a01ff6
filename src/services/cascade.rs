//! Cascading source deletion
//!
//! Removing a source removes its endpoints, applications and
//! application-authentications, then every credential they owned. Credential
//! failures never block the resource deletion; they are collected into the
//! returned [`CascadeOutcome`] for the caller to report or sweep later.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

use crate::{
    domain::{Authentication, AuthenticationId, ResourceType},
    errors::{AuthStoreError, Result},
    secrets::AuthenticationStore,
    storage::{DeletedResources, ResourceRepository, ResourceResolver},
};

/// One credential-side problem met during a cascade
#[derive(Debug)]
pub struct CascadeFailure {
    pub resource_type: ResourceType,
    pub resource_ids: Vec<i64>,
    /// Set when a specific credential could not be removed
    pub authentication_id: Option<AuthenticationId>,
    pub error: AuthStoreError,
}

#[derive(Debug, Default)]
pub struct CascadeOutcome {
    pub resources: DeletedResources,
    /// Credentials actually removed; publish change events for these only
    pub deleted_authentications: Vec<Authentication>,
    pub errors: Vec<CascadeFailure>,
}

impl CascadeOutcome {
    pub fn deleted_authentication_count(&self) -> usize {
        self.deleted_authentications.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Service deleting a source and everything it owns
#[derive(Debug, Clone)]
pub struct CascadeDeleter {
    resources: Arc<ResourceRepository>,
}

impl CascadeDeleter {
    pub fn new(resources: Arc<ResourceRepository>) -> Self {
        Self { resources }
    }

    /// Delete `source_id` under the store's tenant.
    ///
    /// Fails only when the source is absent or the relational resource delete
    /// fails; credential errors end up in [`CascadeOutcome::errors`].
    pub async fn delete_source(
        &self,
        store: &dyn AuthenticationStore,
        source_id: i64,
    ) -> Result<CascadeOutcome> {
        let tenant_id = store.scope().tenant_id;

        if !self.resources.exists(tenant_id, ResourceType::Source, source_id).await? {
            return Err(AuthStoreError::not_found(ResourceType::Source.as_str(), source_id.to_string()));
        }

        let children = self.resources.source_children(tenant_id, source_id).await?;
        let owners = [
            (ResourceType::Source, vec![source_id]),
            (ResourceType::Endpoint, children.endpoint_ids),
            (ResourceType::Application, children.application_ids),
            (ResourceType::ApplicationAuthentication, children.application_authentication_ids),
        ];

        let mut outcome = CascadeOutcome::default();
        let mut seen = HashSet::new();
        let mut doomed = Vec::new();
        for (resource_type, resource_ids) in owners {
            if resource_ids.is_empty() {
                continue;
            }
            match store.authentications_by_resources(resource_type, &resource_ids).await {
                Ok(found) => {
                    doomed.extend(found.into_iter().filter(|auth| seen.insert(auth.id.clone())))
                }
                Err(error) => {
                    warn!(
                        tenant_id,
                        resource_type = %resource_type,
                        resource_ids = ?resource_ids,
                        error = %error,
                        "Failed to collect authentications for cascade"
                    );
                    outcome.errors.push(CascadeFailure {
                        resource_type,
                        resource_ids,
                        authentication_id: None,
                        error,
                    });
                }
            }
        }

        outcome.resources = self
            .resources
            .delete_source_tree(tenant_id, source_id)
            .instrument(crate::db_span!("delete_source_tree", tenant_id = tenant_id))
            .await?;

        let deleted = store.bulk_delete(doomed).await;
        let failed = deleted.failures.into_iter().chain(deleted.secret_cleanup_errors);
        for failure in failed {
            error!(
                tenant_id,
                auth_id = %failure.record.id,
                resource_type = %failure.record.resource_type,
                resource_id = failure.record.resource_id,
                error = %failure.error,
                "Failed to delete authentication during cascade"
            );
            outcome.errors.push(CascadeFailure {
                resource_type: failure.record.resource_type,
                resource_ids: vec![failure.record.resource_id],
                authentication_id: Some(failure.record.id),
                error: failure.error,
            });
        }
        outcome.deleted_authentications = deleted.deleted;

        info!(
            tenant_id,
            source_id,
            endpoints = outcome.resources.endpoints,
            applications = outcome.resources.applications,
            authentications = outcome.deleted_authentication_count(),
            errors = outcome.errors.len(),
            "Source deleted"
        );

        Ok(outcome)
    }
}
