//! External secret client contract and the AWS Secrets Manager implementation

use crate::errors::Result;
use crate::secrets::SecretValue;
use async_trait::async_trait;

/// Tags attached to a newly created external secret
pub type SecretTags = Vec<(String, String)>;

/// External secrets-management service holding the actual passwords.
///
/// The relational row only keeps the reference returned by `create`.
/// Failures are reported as `Upstream` and never retried.
#[async_trait]
pub trait ExternalSecretClient: Send + Sync + std::fmt::Debug {
    /// Store `value` under `name` and return its reference
    async fn create(&self, name: &str, value: &SecretValue, tags: &SecretTags) -> Result<String>;

    async fn read(&self, reference: &str) -> Result<SecretValue>;

    async fn update(&self, reference: &str, value: &SecretValue) -> Result<()>;

    /// `force` skips the service's recovery window
    async fn delete(&self, reference: &str, force: bool) -> Result<()>;
}

#[cfg(feature = "aws")]
pub use aws::AwsSecretsManagerClient;

#[cfg(feature = "aws")]
mod aws {
    use super::{ExternalSecretClient, SecretTags};
    use crate::config::SecretsManagerConfig;
    use crate::errors::{AuthStoreError, Result};
    use crate::secrets::SecretValue;
    use async_trait::async_trait;
    use aws_sdk_secretsmanager::types::Tag;
    use aws_sdk_secretsmanager::Client;
    use tracing::{debug, info, warn};

    const SERVICE: &str = "secrets-manager";

    #[derive(Debug, Clone)]
    pub struct AwsSecretsManagerClient {
        client: Client,
        region: String,
    }

    impl AwsSecretsManagerClient {
        /// Build from the default credential chain
        pub async fn from_config(config: &SecretsManagerConfig) -> Result<Self> {
            let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(config.region.clone()));

            if let Some(endpoint) = &config.endpoint_url {
                builder = builder.endpoint_url(endpoint);
            }

            let sdk_config = builder.load().await;
            info!(region = %config.region, "Initialized AWS Secrets Manager client");

            Ok(Self { client: Client::new(&sdk_config), region: config.region.clone() })
        }
    }

    #[async_trait]
    impl ExternalSecretClient for AwsSecretsManagerClient {
        async fn create(
            &self,
            name: &str,
            value: &SecretValue,
            tags: &SecretTags,
        ) -> Result<String> {
            let tags = tags
                .iter()
                .map(|(key, value)| Tag::builder().key(key).value(value).build())
                .collect::<Vec<_>>();

            let output = self
                .client
                .create_secret()
                .name(name)
                .secret_string(value.expose())
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(|e| {
                    warn!(region = %self.region, secret_name = %name, error = %e, "Failed to create secret");
                    AuthStoreError::upstream_with_source(
                        SERVICE,
                        format!("Failed to create secret '{}'", name),
                        e,
                    )
                })?;

            output.arn().map(str::to_string).ok_or_else(|| {
                AuthStoreError::upstream(SERVICE, format!("No ARN returned for secret '{}'", name))
            })
        }

        async fn read(&self, reference: &str) -> Result<SecretValue> {
            debug!(region = %self.region, "Reading secret value");
            let output = self
                .client
                .get_secret_value()
                .secret_id(reference)
                .send()
                .await
                .map_err(|e| {
                    let not_found = e
                        .as_service_error()
                        .map(|se| se.is_resource_not_found_exception())
                        .unwrap_or(false);
                    if not_found {
                        AuthStoreError::not_found("secret", reference)
                    } else {
                        AuthStoreError::upstream_with_source(
                            SERVICE,
                            format!("Failed to read secret '{}'", reference),
                            e,
                        )
                    }
                })?;

            output.secret_string().map(SecretValue::new).ok_or_else(|| {
                AuthStoreError::upstream(
                    SERVICE,
                    format!("Secret '{}' has no string value", reference),
                )
            })
        }

        async fn update(&self, reference: &str, value: &SecretValue) -> Result<()> {
            self.client
                .put_secret_value()
                .secret_id(reference)
                .secret_string(value.expose())
                .send()
                .await
                .map_err(|e| {
                    AuthStoreError::upstream_with_source(
                        SERVICE,
                        format!("Failed to update secret '{}'", reference),
                        e,
                    )
                })?;
            Ok(())
        }

        async fn delete(&self, reference: &str, force: bool) -> Result<()> {
            self.client
                .delete_secret()
                .secret_id(reference)
                .force_delete_without_recovery(force)
                .send()
                .await
                .map_err(|e| {
                    AuthStoreError::upstream_with_source(
                        SERVICE,
                        format!("Failed to delete secret '{}'", reference),
                        e,
                    )
                })?;
            Ok(())
        }
    }
}
