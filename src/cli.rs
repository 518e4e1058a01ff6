//! # Command Line Interface
//!
//! Operational commands for the authentication store: migrations, backend
//! health, credential listing and cascading source deletion.

use crate::config::AppConfig;
use crate::domain::filter::DEFAULT_LIMIT;
use crate::domain::{FilterSet, Page, ResourceType};
use crate::observability::{init_observability, log_config_info};
use crate::secrets::{SecretStore, TenantScope};
use crate::services::CascadeDeleter;
use crate::storage::{create_pool, list_applied_migrations, run_migrations, validate_migrations};
use crate::storage::{DbPool, ResourceRepository};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "authstore")]
#[command(about = "Tenant-scoped credential store tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending migrations
    Migrate {
        /// Only report whether the schema is up to date
        #[arg(long)]
        check: bool,
    },

    /// Build the configured secret store and run its health check
    Check,

    /// List credentials visible to a tenant (and optionally a user)
    List {
        #[arg(long)]
        tenant: i64,

        #[arg(long)]
        user: Option<i64>,

        /// Owning resource type: Source, Endpoint, Application or ApplicationAuthentication
        #[arg(long, requires = "resource_id")]
        resource_type: Option<String>,

        #[arg(long, requires = "resource_type")]
        resource_id: Option<i64>,

        /// Query-style filter, e.g. `filter[name][contains]=prod`; repeatable
        #[arg(long = "filter", value_parser = parse_query_pair)]
        filters: Vec<(String, String)>,

        /// `field[:asc|:desc]`; repeatable
        #[arg(long)]
        sort_by: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Delete a source together with its resources and credentials
    DeleteSource {
        #[arg(long)]
        tenant: i64,

        #[arg(long)]
        source: i64,
    },
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    init_observability(&config.observability).await?;
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;

    match cli.command {
        Commands::Migrate { check } => handle_migrate(&pool, check).await?,
        Commands::Check => {
            let store = SecretStore::from_config(&config.secret_store, pool).await?;
            store.scoped(TenantScope::tenant(0)).health_check().await?;
            println!("Secret store '{}' is healthy", store.kind());
        }
        Commands::List {
            tenant,
            user,
            resource_type,
            resource_id,
            filters,
            sort_by,
            limit,
            offset,
        } => {
            let store = SecretStore::from_config(&config.secret_store, pool).await?;
            let scope = TenantScope { tenant_id: tenant, user_id: user };
            let auths = store.scoped(scope);

            let pairs = filters
                .into_iter()
                .chain(sort_by.into_iter().map(|s| ("sort_by".to_string(), s)));
            let filters = FilterSet::from_query(pairs)?;
            let page = Page::new(limit, offset)?;

            let (records, total) = match (resource_type, resource_id) {
                (Some(resource_type), Some(resource_id)) => {
                    let resource_type = resource_type.parse::<ResourceType>()?;
                    auths.list_for_resource(resource_type, resource_id, page, &filters).await?
                }
                _ => auths.list(page, &filters).await?,
            };

            let events: Vec<_> = records.iter().map(|r| r.to_event()).collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "total": total, "data": events }))?);
        }
        Commands::DeleteSource { tenant, source } => {
            let store = SecretStore::from_config(&config.secret_store, pool.clone()).await?;
            let auths = store.scoped(TenantScope::tenant(tenant));
            let deleter = CascadeDeleter::new(Arc::new(ResourceRepository::new(pool)));

            let outcome = deleter.delete_source(auths.as_ref(), source).await?;
            let errors: Vec<_> = outcome
                .errors
                .iter()
                .map(|e| {
                    json!({
                        "resource_type": e.resource_type,
                        "resource_ids": e.resource_ids,
                        "authentication_id": e.authentication_id,
                        "error": e.error.to_string(),
                    })
                })
                .collect();
            let deleted: Vec<_> =
                outcome.deleted_authentications.iter().map(|a| a.to_event()).collect();

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "sources": outcome.resources.sources,
                    "endpoints": outcome.resources.endpoints,
                    "applications": outcome.resources.applications,
                    "application_authentications": outcome.resources.application_authentications,
                    "deleted_authentications": deleted,
                    "errors": errors,
                }))?
            );
        }
    }

    Ok(())
}

async fn handle_migrate(pool: &DbPool, check: bool) -> anyhow::Result<()> {
    if check {
        if validate_migrations(pool).await? {
            println!("Database schema is up to date");
            return Ok(());
        }
        anyhow::bail!("Database schema has pending migrations");
    }

    run_migrations(pool).await?;
    let applied = list_applied_migrations(pool).await?;
    println!("Applied migrations:");
    for migration in &applied {
        println!("  {:<16} {}", migration.version, migration.description);
    }
    Ok(())
}
