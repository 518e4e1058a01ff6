//! Hybrid store: relational rows holding references into an external
//! secrets manager.

mod common;

use authstore::config::SecretsManagerConfig;
use authstore::domain::{AuthenticationPatch, FilterSet, NewAuthentication, Page, ResourceType};
use authstore::secrets::backends::{DatabaseStore, SecretsManagerStore};
use authstore::secrets::{AuthenticationStore, TenantScope};
use authstore::storage::{DbPool, ResourceRepository, ResourceResolver};
use common::{seed_source, test_pool, CountingExternalClient};
use std::sync::Arc;

fn store(pool: &DbPool, client: &Arc<CountingExternalClient>, scope: TenantScope) -> SecretsManagerStore {
    let resolver: Arc<dyn ResourceResolver> = Arc::new(ResourceRepository::new(pool.clone()));
    let records = DatabaseStore::with_reference_column(pool.clone(), scope, resolver);
    let config = SecretsManagerConfig::new("us-east-1");
    SecretsManagerStore::new(records, client.clone(), config.name_prefix, config.reference_marker)
}

async fn stored_password(pool: &DbPool, id: i64) -> Option<String> {
    sqlx::query_scalar("SELECT password FROM authentications WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn calls(counter: &std::sync::atomic::AtomicUsize) -> usize {
    CountingExternalClient::count(counter)
}

#[tokio::test]
async fn create_stores_reference_and_get_dereferences() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(
            NewAuthentication::new(ResourceType::Endpoint, seeded.endpoint_id, "basic")
                .with_password("p1"),
        )
        .await
        .unwrap();
    assert_eq!(calls(&client.creates), 1);

    let column = stored_password(&pool, created.id.as_database_id().unwrap()).await.unwrap();
    assert!(column.starts_with("arn:aws:secretsmanager:"));
    assert!(column.contains(&format!("authstore/3/Endpoint_{}_", seeded.endpoint_id)));
    assert_eq!(client.stored(&column).as_deref(), Some("p1"));

    let tags = client.last_tags().unwrap();
    assert!(tags.contains(&("tenant_id".to_string(), "3".to_string())));

    let fetched = auths.get_by_id(&created.id).await.unwrap();
    assert_eq!(fetched.password.as_ref().map(|p| p.expose()), Some("p1"));

    // Listing leaves references in place
    let (records, _) = auths.list(Page::default(), &FilterSet::new()).await.unwrap();
    let listed = records[0].password.as_ref().unwrap();
    assert!(listed.starts_with("arn:aws:secretsmanager:"));
    let revealed = auths.reveal_password(&records[0]).await.unwrap().unwrap();
    assert_eq!(revealed.expose(), "p1");
}

#[tokio::test]
async fn create_without_password_skips_external_service() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(NewAuthentication::new(ResourceType::Source, seeded.source_id, "token"))
        .await
        .unwrap();

    assert_eq!(calls(&client.creates), 0);
    assert!(created.password.is_none());
    assert!(auths.get_by_id(&created.id).await.unwrap().password.is_none());
}

#[tokio::test]
async fn external_failure_writes_no_row() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    client.fail_creates();
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let err = auths
        .create(
            NewAuthentication::new(ResourceType::Source, seeded.source_id, "basic")
                .with_password("p1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, authstore::AuthStoreError::Upstream { .. }));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authentications")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn failed_insert_removes_created_secret() {
    let pool = test_pool().await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));
    pool.close().await;

    // Bulk creation trusts the source id, so the first database call is the insert
    let result = auths
        .bulk_create(
            NewAuthentication::new(ResourceType::Endpoint, 11, "basic")
                .with_source_id(4)
                .with_password("p1"),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(calls(&client.creates), 1);
    assert_eq!(calls(&client.deletes), 1);
    assert_eq!(client.len(), 0);
}

#[tokio::test]
async fn update_with_reference_makes_no_external_call() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(
            NewAuthentication::new(ResourceType::Source, seeded.source_id, "basic")
                .with_password("p1"),
        )
        .await
        .unwrap();
    let reference = created.password.as_ref().unwrap().expose().to_string();

    let updated = auths
        .update(
            &created.id,
            AuthenticationPatch::default().with_password(reference.clone()).with_name("renamed"),
        )
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("renamed"));
    assert_eq!(calls(&client.updates), 0);
    assert_eq!(calls(&client.creates), 1);

    auths
        .update(&created.id, AuthenticationPatch::default().with_password("p2"))
        .await
        .unwrap();
    assert_eq!(calls(&client.updates), 1);
    assert_eq!(client.stored(&reference).as_deref(), Some("p2"));

    let id = created.id.as_database_id().unwrap();
    assert_eq!(stored_password(&pool, id).await.as_deref(), Some(reference.as_str()));
}

#[tokio::test]
async fn update_creates_secret_for_record_without_one() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(NewAuthentication::new(ResourceType::Source, seeded.source_id, "basic"))
        .await
        .unwrap();
    auths
        .update(&created.id, AuthenticationPatch::default().with_password("fresh"))
        .await
        .unwrap();

    assert_eq!(calls(&client.creates), 1);
    let column = stored_password(&pool, created.id.as_database_id().unwrap()).await.unwrap();
    assert_eq!(client.stored(&column).as_deref(), Some("fresh"));
}

#[tokio::test]
async fn delete_is_best_effort_on_external_secret() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(
            NewAuthentication::new(ResourceType::Source, seeded.source_id, "basic")
                .with_password("p1"),
        )
        .await
        .unwrap();
    client.fail_deletes();

    let deleted = auths.delete(&created.id).await.unwrap();
    assert_eq!(deleted.id, created.id);
    assert_eq!(calls(&client.deletes), 1);
    assert!(auths.get_by_id(&created.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn bulk_delete_reports_cleanup_errors_separately() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let mut records = Vec::new();
    for app_id in seeded.application_ids {
        records.push(
            auths
                .create(
                    NewAuthentication::new(ResourceType::Application, app_id, "basic")
                        .with_password("p"),
                )
                .await
                .unwrap(),
        );
    }
    client.fail_deletes();

    let outcome = auths.bulk_delete(records).await;
    assert_eq!(outcome.deleted_count(), 2);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.secret_cleanup_errors.len(), 2);

    let (remaining, total) = auths.list(Page::default(), &FilterSet::new()).await.unwrap();
    assert!(remaining.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn create_sends_reference_looking_passwords_to_external_service() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let first = seed_source(&resources, 1).await;
    let second = seed_source(&resources, 2).await;
    let client = Arc::new(CountingExternalClient::new());
    let tenant_one = store(&pool, &client, TenantScope::tenant(1));
    let tenant_two = store(&pool, &client, TenantScope::tenant(2));

    let private = tenant_one
        .create(
            NewAuthentication::new(ResourceType::Source, first.source_id, "basic")
                .with_password("tenant-one-pw"),
        )
        .await
        .unwrap();
    let foreign_reference = private.password.as_ref().unwrap().expose().to_string();

    let copied = tenant_two
        .create(
            NewAuthentication::new(ResourceType::Source, second.source_id, "basic")
                .with_password(foreign_reference.clone()),
        )
        .await
        .unwrap();
    assert_eq!(calls(&client.creates), 2);

    let column = stored_password(&pool, copied.id.as_database_id().unwrap()).await.unwrap();
    assert_ne!(column, foreign_reference);
    let fetched = tenant_two.get_by_id(&copied.id).await.unwrap();
    assert_eq!(fetched.password.as_ref().map(|p| p.expose()), Some(foreign_reference.as_str()));

    // A plaintext that happens to carry the marker never reaches the column
    let literal = "arn:aws:secretsmanager:my-literal-plaintext";
    let plain = tenant_two
        .create(
            NewAuthentication::new(ResourceType::Endpoint, second.endpoint_id, "basic")
                .with_password(literal),
        )
        .await
        .unwrap();
    let column = stored_password(&pool, plain.id.as_database_id().unwrap()).await.unwrap();
    assert_ne!(column, literal);
    assert_eq!(client.stored(&column).as_deref(), Some(literal));
}

#[tokio::test]
async fn update_only_skips_echo_of_own_reference() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let first = seed_source(&resources, 1).await;
    let second = seed_source(&resources, 2).await;
    let client = Arc::new(CountingExternalClient::new());
    let tenant_one = store(&pool, &client, TenantScope::tenant(1));
    let tenant_two = store(&pool, &client, TenantScope::tenant(2));

    let private = tenant_one
        .create(
            NewAuthentication::new(ResourceType::Source, first.source_id, "basic")
                .with_password("tenant-one-pw"),
        )
        .await
        .unwrap();
    let foreign_reference = private.password.as_ref().unwrap().expose().to_string();

    let own = tenant_two
        .create(
            NewAuthentication::new(ResourceType::Source, second.source_id, "basic")
                .with_password("tenant-two-pw"),
        )
        .await
        .unwrap();
    let own_reference = own.password.as_ref().unwrap().expose().to_string();

    tenant_two
        .update(&own.id, AuthenticationPatch::default().with_password(foreign_reference.clone()))
        .await
        .unwrap();
    assert_eq!(calls(&client.updates), 1);
    assert_eq!(client.stored(&own_reference).as_deref(), Some(foreign_reference.as_str()));
    assert_eq!(client.stored(&foreign_reference).as_deref(), Some("tenant-one-pw"));

    let id = own.id.as_database_id().unwrap();
    assert_eq!(stored_password(&pool, id).await.as_deref(), Some(own_reference.as_str()));

    // Revealing a record whose password was swapped client-side reads the stored reference
    let mut forged = tenant_two.get_by_id(&own.id).await.unwrap();
    forged.password = Some(authstore::secrets::SecretValue::new(foreign_reference.clone()));
    let revealed = tenant_two.reveal_password(&forged).await.unwrap().unwrap();
    assert_eq!(revealed.expose(), foreign_reference);
}

#[tokio::test]
async fn failed_update_removes_created_secret() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(NewAuthentication::new(ResourceType::Source, seeded.source_id, "basic"))
        .await
        .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_updates BEFORE UPDATE ON authentications \
         BEGIN SELECT RAISE(ABORT, 'read only'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result =
        auths.update(&created.id, AuthenticationPatch::default().with_password("fresh")).await;

    assert!(result.is_err());
    assert_eq!(calls(&client.creates), 1);
    assert_eq!(calls(&client.deletes), 1);
    assert_eq!(client.len(), 0);
}

#[tokio::test]
async fn bulk_delete_cleans_up_dereferenced_records() {
    let pool = test_pool().await;
    let resources = ResourceRepository::new(pool.clone());
    let seeded = seed_source(&resources, 3).await;
    let client = Arc::new(CountingExternalClient::new());
    let auths = store(&pool, &client, TenantScope::tenant(3));

    let created = auths
        .create(
            NewAuthentication::new(ResourceType::Source, seeded.source_id, "basic")
                .with_password("p1"),
        )
        .await
        .unwrap();
    let fetched = auths.get_by_id(&created.id).await.unwrap();
    assert_eq!(fetched.password.as_ref().map(|p| p.expose()), Some("p1"));

    let outcome = auths.bulk_delete(vec![fetched]).await;
    assert_eq!(outcome.deleted_count(), 1);
    assert!(outcome.secret_cleanup_errors.is_empty());
    assert_eq!(calls(&client.deletes), 1);
    assert_eq!(client.len(), 0);
}
