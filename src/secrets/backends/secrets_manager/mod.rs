//! Relational records with passwords held by an external secrets service

pub mod client;
pub mod store;

#[cfg(feature = "aws")]
pub use client::AwsSecretsManagerClient;
pub use client::{ExternalSecretClient, SecretTags};
pub use store::SecretsManagerStore;
