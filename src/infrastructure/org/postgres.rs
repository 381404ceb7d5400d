//! PostgreSQL organization store
//!
//! Mutations run at READ COMMITTED. Every transaction locks the organization
//! row first, so membership changes for one organization are serialized while
//! different organizations proceed in parallel.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::domain::org::{
    ListOrgMembersOptions, ListOrgsOptions, MembershipId, OrgDatabase, OrgId, OrgMembership,
    OrgTransaction, Organization, Pagination, RepoId, Repository, SearchOrgsQuery, Team, TeamId,
    User, UserId, UserKind,
};
use crate::domain::DomainError;

const ORGANIZATION_COLUMNS: &str =
    "id, kind, name, full_name, num_members, created_at, updated_at";

/// Repositories of `$1` that `$2` reaches through one of its teams in `$1`
const TEAM_GRANT: &str = r#"
    EXISTS (
        SELECT 1
        FROM team_repo tr
        JOIN team_user tu ON tu.team_id = tr.team_id
        WHERE tr.repo_id = r.id AND tu.org_id = $1 AND tu.uid = $2
    )
"#;

/// PostgreSQL implementation of [`OrgDatabase`]
#[derive(Debug, Clone)]
pub struct PostgresOrgDatabase {
    pool: PgPool,
}

impl PostgresOrgDatabase {
    /// Create a new store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OrgDatabase for PostgresOrgDatabase {
    type Transaction = PostgresOrgTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        Ok(PostgresOrgTransaction { tx })
    }

    async fn get_organization(&self, org_id: OrgId) -> Result<Option<Organization>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE id = $1 AND kind = $2",
            ORGANIZATION_COLUMNS
        ))
        .bind(org_id.get())
        .bind(UserKind::Organization.as_i16())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get organization: {}", e)))?;

        row.as_ref().map(row_to_organization).transpose()
    }

    async fn find_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembership>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, uid, org_id, is_public, is_owner, num_teams
            FROM org_user
            WHERE org_id = $1 AND uid = $2
            "#,
        )
        .bind(org_id.get())
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get organization membership: {}", e)))?;

        row.as_ref().map(row_to_membership).transpose()
    }

    async fn list_members(
        &self,
        org_id: OrgId,
        opts: ListOrgMembersOptions,
    ) -> Result<Vec<User>, DomainError> {
        let mut sql = String::from(
            r#"
            SELECT u.id, u.name, u.full_name, u.created_at, u.updated_at
            FROM org_user ou
            JOIN users u ON u.id = ou.uid
            WHERE ou.org_id = $1
            ORDER BY u.id ASC
            "#,
        );

        if opts.limit > 0 {
            sql.push_str(" LIMIT $2");
        }

        let mut query = sqlx::query(&sql).bind(org_id.get());

        if opts.limit > 0 {
            query = query.bind(sql_limit(opts.limit));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list organization members: {}", e)))?;

        rows.iter().map(row_to_user).collect()
    }

    async fn search_organizations(
        &self,
        query: &SearchOrgsQuery,
    ) -> Result<(Vec<Organization>, i64), DomainError> {
        let condition = r#"
            kind = $1
            AND (lower_name LIKE $2 ESCAPE '\' OR LOWER(full_name) LIKE $2 ESCAPE '\')
        "#;
        let pattern = query.like_pattern();
        let kind = UserKind::Organization.as_i16();

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM users WHERE {}",
            condition
        ))
        .bind(kind)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count organizations: {}", e)))?;

        let mut sql = format!(
            "SELECT {} FROM users WHERE {}",
            ORGANIZATION_COLUMNS, condition
        );

        if let Some(order_by) = query.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by.as_sql());
        }

        let window = query.pagination.limit_offset();

        if window.is_some() {
            sql.push_str(" LIMIT $3 OFFSET $4");
        }

        let mut select = sqlx::query(&sql).bind(kind).bind(&pattern);

        if let Some((limit, offset)) = window {
            select = select.bind(limit).bind(offset);
        }

        let rows = select
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to search organizations: {}", e)))?;

        let orgs = rows
            .iter()
            .map(row_to_organization)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((orgs, total))
    }

    async fn list_organizations(
        &self,
        opts: ListOrgsOptions,
    ) -> Result<Vec<Organization>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.kind, o.name, o.full_name, o.num_members, o.created_at, o.updated_at
            FROM org_user ou
            JOIN users o ON o.id = ou.org_id
            WHERE ou.uid = $1 AND o.kind = $2 AND ($3 OR ou.is_public)
            ORDER BY o.id ASC
            "#,
        )
        .bind(opts.member_id.get())
        .bind(UserKind::Organization.as_i16())
        .bind(opts.include_private_members)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list organizations: {}", e)))?;

        rows.iter().map(row_to_organization).collect()
    }

    async fn count_organizations_by_user(&self, user_id: UserId) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM org_user WHERE uid = $1")
            .bind(user_id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to count organizations: {}", e)))
    }

    async fn get_team_by_name(
        &self,
        org_id: OrgId,
        name: &str,
    ) -> Result<Option<Team>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, name, num_members
            FROM team
            WHERE org_id = $1 AND lower_name = $2
            "#,
        )
        .bind(org_id.get())
        .bind(name.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get team: {}", e)))?;

        row.as_ref().map(row_to_team).transpose()
    }

    async fn accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<Vec<Repository>, DomainError> {
        let mut sql = format!(
            r#"
            SELECT r.id, r.owner_id, r.name, r.is_private, r.is_unlisted, r.num_watches, r.updated_at
            FROM repository r
            WHERE r.owner_id = $1
              AND ((r.is_private = FALSE AND r.is_unlisted = FALSE) OR {})
            ORDER BY r.updated_at DESC, r.id DESC
            "#,
            TEAM_GRANT
        );

        let window = pagination.limit_offset();

        if window.is_some() {
            sql.push_str(" LIMIT $3 OFFSET $4");
        }

        let mut query = sqlx::query(&sql).bind(org_id.get()).bind(user_id.get());

        if let Some((limit, offset)) = window {
            query = query.bind(limit).bind(offset);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            DomainError::storage(format!("Failed to list accessible repositories: {}", e))
        })?;

        rows.iter().map(row_to_repository).collect()
    }

    async fn count_accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<i64, DomainError> {
        sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*)
            FROM repository r
            WHERE r.owner_id = $1
              AND ((r.is_private = FALSE AND r.is_unlisted = FALSE) OR {})
            "#,
            TEAM_GRANT
        ))
        .bind(org_id.get())
        .bind(user_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count accessible repositories: {}", e)))
    }
}

/// Open transaction on a [`PostgresOrgDatabase`]; rolled back when dropped
pub struct PostgresOrgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl Debug for PostgresOrgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresOrgTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl OrgTransaction for PostgresOrgTransaction {
    async fn lock_organization(&mut self, org_id: OrgId) -> Result<(), DomainError> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(org_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to lock organization: {}", e)))?;

        Ok(())
    }

    async fn find_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembership>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, uid, org_id, is_public, is_owner, num_teams
            FROM org_user
            WHERE org_id = $1 AND uid = $2
            FOR UPDATE
            "#,
        )
        .bind(org_id.get())
        .bind(user_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get organization membership: {}", e)))?;

        row.as_ref().map(row_to_membership).transpose()
    }

    async fn insert_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<bool, DomainError> {
        let is_org: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1 AND kind = $2)")
                .bind(org_id.get())
                .bind(UserKind::Organization.as_i16())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| {
                    DomainError::storage(format!("Failed to insert organization membership: {}", e))
                })?;

        if !is_org {
            return Err(DomainError::storage(format!(
                "Failed to insert organization membership: organization {} does not exist",
                org_id
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO org_user (uid, org_id, is_public, is_owner, num_teams)
            VALUES ($1, $2, FALSE, FALSE, 0)
            ON CONFLICT (uid, org_id) DO NOTHING
            "#,
        )
        .bind(user_id.get())
        .bind(org_id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to insert organization membership: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM org_user WHERE org_id = $1 AND uid = $2")
            .bind(org_id.get())
            .bind(user_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to delete organization membership: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn recount_members(&mut self, org_id: OrgId) -> Result<i64, DomainError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET num_members = (SELECT COUNT(*) FROM org_user WHERE org_id = $1)
            WHERE id = $1
            RETURNING num_members
            "#,
        )
        .bind(org_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to recount organization members: {}", e)))?;

        Ok(count.unwrap_or_default())
    }

    async fn get_team_by_name(
        &mut self,
        org_id: OrgId,
        name: &str,
    ) -> Result<Option<Team>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, name, num_members
            FROM team
            WHERE org_id = $1 AND lower_name = $2
            FOR UPDATE
            "#,
        )
        .bind(org_id.get())
        .bind(name.to_lowercase())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get team: {}", e)))?;

        row.as_ref().map(row_to_team).transpose()
    }

    async fn remove_team_member(
        &mut self,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM team_user WHERE team_id = $1 AND uid = $2")
            .bind(team_id.get())
            .bind(user_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to remove team member: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn recount_team_members(&mut self, team_id: TeamId) -> Result<i64, DomainError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE team
            SET num_members = (SELECT COUNT(*) FROM team_user WHERE team_id = $1)
            WHERE id = $1
            RETURNING num_members
            "#,
        )
        .bind(team_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to recount team members: {}", e)))?;

        Ok(count.unwrap_or_default())
    }

    async fn team_only_repository_ids(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<RepoId>, DomainError> {
        let ids: Vec<i64> = sqlx::query_scalar(&format!(
            r#"
            SELECT r.id
            FROM repository r
            WHERE r.owner_id = $1
              AND (r.is_private = TRUE OR r.is_unlisted = TRUE)
              AND {}
            ORDER BY r.id
            "#,
            TEAM_GRANT
        ))
        .bind(org_id.get())
        .bind(user_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list team repositories: {}", e)))?;

        Ok(ids.into_iter().map(RepoId::new).collect())
    }

    async fn delete_watches(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<Vec<RepoId>, DomainError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "DELETE FROM watch WHERE user_id = $1 AND repo_id = ANY($2) RETURNING repo_id",
        )
        .bind(user_id.get())
        .bind(raw_ids(repo_ids))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to delete watches: {}", e)))?;

        Ok(ids.into_iter().map(RepoId::new).collect())
    }

    async fn decrement_watch_counts(&mut self, repo_ids: &[RepoId]) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "UPDATE repository SET num_watches = num_watches - 1 WHERE id = ANY($1)",
        )
        .bind(raw_ids(repo_ids))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update watch counts: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn delete_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM access WHERE user_id = $1 AND repo_id = ANY($2)")
            .bind(user_id.get())
            .bind(raw_ids(repo_ids))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete accesses: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))
    }
}

/// LIMIT value for a member cap; caps past `i64::MAX` mean everything
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn raw_ids(repo_ids: &[RepoId]) -> Vec<i64> {
    repo_ids.iter().map(|id| id.get()).collect()
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::storage(format!("Invalid column '{}' in database: {}", name, e)))
}

fn row_to_user(row: &PgRow) -> Result<User, DomainError> {
    Ok(User {
        id: UserId::new(column(row, "id")?),
        name: column(row, "name")?,
        full_name: column(row, "full_name")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

/// Rejects identity rows that are not organizations
fn organization_kind(id: i64, raw: i16) -> Result<(), DomainError> {
    match UserKind::from_i16(raw) {
        Some(UserKind::Organization) => Ok(()),
        Some(UserKind::Individual) => Err(DomainError::storage(format!(
            "Identity {} is not an organization",
            id
        ))),
        None => Err(DomainError::storage(format!(
            "Invalid column 'kind' in database: unknown identity kind {}",
            raw
        ))),
    }
}

fn row_to_organization(row: &PgRow) -> Result<Organization, DomainError> {
    let id: i64 = column(row, "id")?;
    organization_kind(id, column(row, "kind")?)?;

    Ok(Organization {
        id: OrgId::new(id),
        name: column(row, "name")?,
        full_name: column(row, "full_name")?,
        num_members: column(row, "num_members")?,
        created_at: column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

fn row_to_membership(row: &PgRow) -> Result<OrgMembership, DomainError> {
    Ok(OrgMembership {
        id: MembershipId::new(column(row, "id")?),
        user_id: UserId::new(column(row, "uid")?),
        org_id: OrgId::new(column(row, "org_id")?),
        is_public: column(row, "is_public")?,
        is_owner: column(row, "is_owner")?,
        num_teams: column(row, "num_teams")?,
    })
}

fn row_to_team(row: &PgRow) -> Result<Team, DomainError> {
    Ok(Team {
        id: TeamId::new(column(row, "id")?),
        org_id: OrgId::new(column(row, "org_id")?),
        name: column(row, "name")?,
        num_members: column(row, "num_members")?,
    })
}

fn row_to_repository(row: &PgRow) -> Result<Repository, DomainError> {
    Ok(Repository {
        id: RepoId::new(column(row, "id")?),
        owner_id: UserId::new(column(row, "owner_id")?),
        name: column(row, "name")?,
        is_private: column(row, "is_private")?,
        is_unlisted: column(row, "is_unlisted")?,
        num_watches: column(row, "num_watches")?,
        updated_at: column::<DateTime<Utc>>(row, "updated_at")?,
    })
}

/// The ignored tests need a disposable database:
/// `DATABASE_URL=postgres://... cargo test -- --ignored`
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::org::AccessMode;
    use crate::infrastructure::org::OrgService;
    use crate::infrastructure::storage::{org_migrations, run_org_migrations, PostgresConfig};

    #[test]
    fn test_organization_kind_decoding() {
        assert!(organization_kind(1, UserKind::Organization.as_i16()).is_ok());

        let err = organization_kind(2, UserKind::Individual.as_i16()).unwrap_err();
        assert_eq!(err.to_string(), "Storage error: Identity 2 is not an organization");

        let err = organization_kind(3, 9).unwrap_err();
        assert!(err.to_string().contains("unknown identity kind 9"));
    }

    #[test]
    fn test_sql_limit_never_negative() {
        assert_eq!(sql_limit(25), 25);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    async fn setup() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PostgresConfig::new(url)
            .with_max_connections(4)
            .connect()
            .await
            .unwrap();
        let version = run_org_migrations(&pool).await.unwrap();
        assert_eq!(version, org_migrations().last().map(|m| m.version));
        pool
    }

    fn unique(prefix: &str) -> String {
        format!(
            "{}-{}",
            prefix,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }

    async fn insert_identity(pool: &PgPool, kind: UserKind, name: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO users (kind, name, lower_name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(kind.as_i16())
        .bind(name)
        .bind(name.to_lowercase())
        .fetch_one(pool)
        .await
        .unwrap()
    }

    async fn insert_team(pool: &PgPool, org_id: OrgId, name: &str) -> TeamId {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO team (org_id, lower_name, name) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(org_id.get())
        .bind(name.to_lowercase())
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
        TeamId::new(id)
    }

    async fn add_team_member(pool: &PgPool, org_id: OrgId, team_id: TeamId, user_id: UserId) {
        sqlx::query("INSERT INTO team_user (org_id, team_id, uid) VALUES ($1, $2, $3)")
            .bind(org_id.get())
            .bind(team_id.get())
            .bind(user_id.get())
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "UPDATE team SET num_members = (SELECT COUNT(*) FROM team_user WHERE team_id = $1) WHERE id = $1",
        )
        .bind(team_id.get())
        .execute(pool)
        .await
        .unwrap();
    }

    async fn create_org(pool: &PgPool) -> (OrgId, TeamId) {
        let org = OrgId::new(insert_identity(pool, UserKind::Organization, &unique("org")).await);
        let owners = insert_team(pool, org, Team::OWNERS).await;
        (org, owners)
    }

    async fn create_user(pool: &PgPool, prefix: &str) -> UserId {
        UserId::new(insert_identity(pool, UserKind::Individual, &unique(prefix)).await)
    }

    async fn add_owner(
        service: &OrgService<PostgresOrgDatabase>,
        pool: &PgPool,
        org: OrgId,
        owners: TeamId,
        user: UserId,
    ) {
        service.add_member(org, user).await.unwrap();
        sqlx::query("UPDATE org_user SET is_owner = TRUE WHERE org_id = $1 AND uid = $2")
            .bind(org.get())
            .bind(user.get())
            .execute(pool)
            .await
            .unwrap();
        add_team_member(pool, org, owners, user).await;
    }

    async fn create_repository(pool: &PgPool, owner: OrgId, is_private: bool) -> RepoId {
        let name = unique("repo");
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO repository (owner_id, lower_name, name, is_private, num_watches)
            VALUES ($1, $2, $2, $3, 0)
            RETURNING id
            "#,
        )
        .bind(owner.get())
        .bind(&name)
        .bind(is_private)
        .fetch_one(pool)
        .await
        .unwrap();
        RepoId::new(id)
    }

    async fn num_watches(pool: &PgPool, repo: RepoId) -> i64 {
        sqlx::query_scalar("SELECT num_watches FROM repository WHERE id = $1")
            .bind(repo.get())
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_owner_removal_scenario() {
        let pool = setup().await;
        let service = OrgService::new(Arc::new(PostgresOrgDatabase::new(pool.clone())));
        let (org, owners) = create_org(&pool).await;
        let alice = create_user(&pool, "alice").await;
        let bob = create_user(&pool, "bob").await;
        let carol = create_user(&pool, "carol").await;

        add_owner(&service, &pool, org, owners, alice).await;
        add_owner(&service, &pool, org, owners, bob).await;
        service.add_member(org, carol).await.unwrap();
        service.add_member(org, carol).await.unwrap();

        let org_row = service.get_organization(org).await.unwrap().unwrap();
        assert_eq!(org_row.num_members, 3);

        service.remove_member(org, carol).await.unwrap();
        service.remove_member(org, alice).await.unwrap();

        let err = service.remove_member(org, bob).await.unwrap_err();
        assert!(err.is_last_owner());

        let org_row = service.get_organization(org).await.unwrap().unwrap();
        assert_eq!(org_row.num_members, 1);
        assert!(service.is_owned_by(org, bob).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore]
    async fn test_concurrent_owner_removals() {
        let pool = setup().await;
        let service = OrgService::new(Arc::new(PostgresOrgDatabase::new(pool.clone())));
        let (org, owners) = create_org(&pool).await;
        let alice = create_user(&pool, "alice").await;
        let bob = create_user(&pool, "bob").await;
        add_owner(&service, &pool, org, owners, alice).await;
        add_owner(&service, &pool, org, owners, bob).await;

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.remove_member(org, alice).await })
        };
        let second = {
            let service = service.clone();
            tokio::spawn(async move { service.remove_member(org, bob).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        let org_row = service.get_organization(org).await.unwrap().unwrap();
        assert_eq!(org_row.num_members, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_remove_member_cascade_and_accessible_repositories() {
        let pool = setup().await;
        let service = OrgService::new(Arc::new(PostgresOrgDatabase::new(pool.clone())));
        let (org, _) = create_org(&pool).await;
        let dan = create_user(&pool, "dan").await;
        service.add_member(org, dan).await.unwrap();

        let devs = insert_team(&pool, org, "devs").await;
        add_team_member(&pool, org, devs, dan).await;
        let private = create_repository(&pool, org, true).await;
        let public = create_repository(&pool, org, false).await;

        for repo in [private, public] {
            sqlx::query("INSERT INTO team_repo (org_id, team_id, repo_id) VALUES ($1, $2, $3)")
                .bind(org.get())
                .bind(devs.get())
                .bind(repo.get())
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query("INSERT INTO watch (user_id, repo_id) VALUES ($1, $2)")
                .bind(dan.get())
                .bind(repo.get())
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query("UPDATE repository SET num_watches = 1 WHERE id = $1")
                .bind(repo.get())
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query("INSERT INTO access (user_id, repo_id, mode) VALUES ($1, $2, $3)")
                .bind(dan.get())
                .bind(repo.get())
                .bind(AccessMode::Write.as_i16())
                .execute(&pool)
                .await
                .unwrap();
        }

        let (repos, total) = service
            .accessible_repositories(org, dan, 1, 10, Default::default())
            .await
            .unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(total, 2);

        service.remove_member(org, dan).await.unwrap();

        assert_eq!(num_watches(&pool, private).await, 0);
        assert_eq!(num_watches(&pool, public).await, 1);
        assert!(!service.has_member(org, dan).await);

        let remaining: Vec<i64> =
            sqlx::query_scalar("SELECT repo_id FROM access WHERE user_id = $1")
                .bind(dan.get())
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, vec![public.get()]);
    }
}
