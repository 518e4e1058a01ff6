//! Vault KV v2 backed authentication store

pub mod client;
pub mod codec;
pub mod path;
pub mod store;

pub use client::{KvSecretClient, KvVersion, VaultKvClient};
pub use path::SecretPath;
pub use store::VaultStore;
