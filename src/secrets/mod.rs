//! Tenant-scoped credential storage with a pluggable secret store.
//!
//! [`AuthenticationStore`] is the single contract every backend implements.
//! The backend is picked once from configuration by [`SecretStore`] and bound
//! to a caller with [`SecretStore::scoped`]:
//!
//! ```rust,ignore
//! let store = SecretStore::from_config(&config.secret_store, pool).await?;
//! let auths = store.scoped(TenantScope::user(tenant_id, user_id));
//! let created = auths.create(NewAuthentication::new(ResourceType::Application, 7, "basic")).await?;
//! ```
//!
//! Passwords never appear in logs: [`SecretValue`] redacts itself and the
//! relational backend keeps them sealed until `reveal_password` is called.

pub mod backends;
pub mod crypto;
pub mod instrumented;
pub mod kind;
pub mod selector;
pub mod store;
pub mod value;

pub use crypto::PasswordCipher;
pub use instrumented::InstrumentedStore;
pub use kind::SecretStoreKind;
pub use selector::SecretStore;
pub use store::{
    AuthenticationStore, BulkDeleteFailure, BulkDeleteOutcome, TenantScope,
};
pub use value::SecretValue;
