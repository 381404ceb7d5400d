//! Forge organizations
//!
//! Organization membership for a code-hosting service:
//! - Membership rows with a cached member count kept equal to the row count
//! - Protection against removing an organization's last owner
//! - Cleanup of watches and access grants when a member leaves
//! - Organization search, listing and per-member repository visibility

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use infrastructure::org::{OrgService, PostgresOrgDatabase};
use infrastructure::storage::run_org_migrations;

/// Connects to PostgreSQL, applies migrations when enabled and returns the
/// organization service
pub async fn connect_postgres(
    config: &AppConfig,
) -> anyhow::Result<OrgService<PostgresOrgDatabase>> {
    let pool = config
        .database
        .to_postgres_config()
        .connect()
        .await
        .context("Failed to open database pool")?;

    if config.database.run_migrations {
        let version = run_org_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!(schema_version = ?version, "Database migrations applied");
    }

    Ok(OrgService::new(Arc::new(PostgresOrgDatabase::new(pool))))
}
