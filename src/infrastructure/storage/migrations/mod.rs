//! Database migrations for the organization schema

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// Applies versioned migrations, tracked in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))
    }

    /// Applies a migration and records it in one transaction
    pub async fn run_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        if self.is_applied(migration.version).await? {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            DomainError::storage(format!("Failed to begin migration transaction: {}", e))
        })?;

        sqlx::raw_sql(&migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            DomainError::storage(format!(
                "Failed to commit migration {}: {}",
                migration.version, e
            ))
        })?;

        info!(version = migration.version, description = %migration.description, "Applied migration");
        Ok(())
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM _migrations WHERE success = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    DomainError::storage(format!("Failed to get migration version: {}", e))
                })?;

        Ok(version)
    }
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    /// SQL to run when applying the migration
    pub up: String,
}

impl Migration {
    pub fn new(version: i64, description: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
        }
    }
}

/// Schema for identities, memberships, teams and the repository tables the
/// membership cascade touches
pub fn org_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create users table",
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                kind SMALLINT NOT NULL DEFAULT 0,
                name VARCHAR(255) NOT NULL,
                lower_name VARCHAR(255) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL DEFAULT '',
                num_members BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_users_kind ON users(kind);
            "#,
        ),
        Migration::new(
            2,
            "Create organization membership and team tables",
            r#"
            CREATE TABLE IF NOT EXISTS org_user (
                id BIGSERIAL PRIMARY KEY,
                uid BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                org_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_public BOOLEAN NOT NULL DEFAULT FALSE,
                is_owner BOOLEAN NOT NULL DEFAULT FALSE,
                num_teams INTEGER NOT NULL DEFAULT 0,
                UNIQUE (uid, org_id)
            );
            CREATE INDEX IF NOT EXISTS idx_org_user_org_id ON org_user(org_id);

            CREATE TABLE IF NOT EXISTS team (
                id BIGSERIAL PRIMARY KEY,
                org_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                lower_name VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL,
                num_members BIGINT NOT NULL DEFAULT 0,
                UNIQUE (org_id, lower_name)
            );

            CREATE TABLE IF NOT EXISTS team_user (
                id BIGSERIAL PRIMARY KEY,
                org_id BIGINT NOT NULL,
                team_id BIGINT NOT NULL REFERENCES team(id) ON DELETE CASCADE,
                uid BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE (team_id, uid)
            );
            CREATE INDEX IF NOT EXISTS idx_team_user_org_uid ON team_user(org_id, uid);
            "#,
        ),
        Migration::new(
            3,
            "Create repository, watch and access tables",
            r#"
            CREATE TABLE IF NOT EXISTS repository (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                lower_name VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL,
                is_private BOOLEAN NOT NULL DEFAULT FALSE,
                is_unlisted BOOLEAN NOT NULL DEFAULT FALSE,
                num_watches BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (owner_id, lower_name)
            );
            CREATE INDEX IF NOT EXISTS idx_repository_owner_updated
                ON repository(owner_id, updated_at DESC);

            CREATE TABLE IF NOT EXISTS team_repo (
                id BIGSERIAL PRIMARY KEY,
                org_id BIGINT NOT NULL,
                team_id BIGINT NOT NULL REFERENCES team(id) ON DELETE CASCADE,
                repo_id BIGINT NOT NULL REFERENCES repository(id) ON DELETE CASCADE,
                UNIQUE (team_id, repo_id)
            );
            CREATE INDEX IF NOT EXISTS idx_team_repo_repo_id ON team_repo(repo_id);

            CREATE TABLE IF NOT EXISTS watch (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                repo_id BIGINT NOT NULL REFERENCES repository(id) ON DELETE CASCADE,
                UNIQUE (user_id, repo_id)
            );

            CREATE TABLE IF NOT EXISTS access (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                repo_id BIGINT NOT NULL REFERENCES repository(id) ON DELETE CASCADE,
                mode SMALLINT NOT NULL,
                UNIQUE (user_id, repo_id)
            );
            "#,
        ),
    ]
}

/// Runs all pending organization schema migrations and returns the
/// resulting schema version
pub async fn run_org_migrations(pool: &PgPool) -> Result<Option<i64>, DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());

    for migration in org_migrations() {
        migrator.run_migration(&migration).await?;
    }

    migrator.current_version().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creation() {
        let migration = Migration::new(1, "Test migration", "CREATE TABLE test");

        assert_eq!(migration.version, 1);
        assert_eq!(migration.description, "Test migration");
        assert_eq!(migration.up, "CREATE TABLE test");
    }

    #[test]
    fn test_org_migrations_order() {
        let migrations = org_migrations();

        assert!(!migrations.is_empty());

        for pair in migrations.windows(2) {
            assert!(
                pair[1].version > pair[0].version,
                "Migrations should be in ascending order"
            );
        }
    }

    #[test]
    fn test_membership_pair_is_unique() {
        let migrations = org_migrations();
        let membership = migrations
            .iter()
            .find(|m| m.up.contains("CREATE TABLE IF NOT EXISTS org_user"))
            .unwrap();

        assert!(membership.up.contains("UNIQUE (uid, org_id)"));
    }

    #[test]
    fn test_org_migrations_content() {
        for migration in org_migrations() {
            assert!(!migration.description.is_empty());
            assert!(!migration.up.trim().is_empty());
        }
    }
}
