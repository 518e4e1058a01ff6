//! # Storage and Persistence
//!
//! Database connectivity, embedded migrations and the owning-resource tables.

pub mod migrations;
pub mod pool;
pub mod resources;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, run_migrations, validate_migrations,
    MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use resources::{DeletedResources, ResourceRepository, ResourceResolver, SourceChildren};
