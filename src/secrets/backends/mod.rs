//! Authentication store backends
//!
//! - **database**: relational table, password sealed with AES-256-GCM
//! - **vault**: Vault KV v2, one secret per record
//! - **secrets_manager**: relational table holding references to an external
//!   secrets service (AWS Secrets Manager with the `aws` feature)
//! - **unconfigured**: rejects everything when no store is configured

pub mod database;
pub mod secrets_manager;
pub mod unconfigured;
pub mod vault;

pub use database::DatabaseStore;
#[cfg(feature = "aws")]
pub use secrets_manager::AwsSecretsManagerClient;
pub use secrets_manager::{ExternalSecretClient, SecretTags, SecretsManagerStore};
pub use unconfigured::UnconfiguredStore;
pub use vault::{KvSecretClient, KvVersion, SecretPath, VaultKvClient, VaultStore};
