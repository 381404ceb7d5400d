//! Storage seam for the organization engine

use std::fmt::Debug;

use async_trait::async_trait;

use super::entity::{OrgId, OrgMembership, Organization, RepoId, Repository, Team, TeamId, User, UserId};
use super::query::{ListOrgMembersOptions, ListOrgsOptions, Pagination, SearchOrgsQuery};
use crate::domain::DomainError;

/// Relational store backing organizations
///
/// Read methods run outside any transaction and may observe a snapshot that
/// lags a concurrently committing mutation. Mutations go through
/// [`OrgDatabase::begin`].
#[async_trait]
pub trait OrgDatabase: Send + Sync + Debug {
    type Transaction: OrgTransaction;

    /// Opens a transaction; dropping it without commit rolls it back
    async fn begin(&self) -> Result<Self::Transaction, DomainError>;

    /// Organization view of an identity row, `None` if absent or not an organization
    async fn get_organization(&self, org_id: OrgId) -> Result<Option<Organization>, DomainError>;

    async fn find_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembership>, DomainError>;

    /// Members ordered by ascending user ID
    async fn list_members(
        &self,
        org_id: OrgId,
        opts: ListOrgMembersOptions,
    ) -> Result<Vec<User>, DomainError>;

    /// One page of matching organizations and the total match count
    async fn search_organizations(
        &self,
        query: &SearchOrgsQuery,
    ) -> Result<(Vec<Organization>, i64), DomainError>;

    /// Organizations the member belongs to, ordered by ascending ID
    async fn list_organizations(&self, opts: ListOrgsOptions)
        -> Result<Vec<Organization>, DomainError>;

    async fn count_organizations_by_user(&self, user_id: UserId) -> Result<i64, DomainError>;

    /// Case-insensitive team lookup
    async fn get_team_by_name(&self, org_id: OrgId, name: &str)
        -> Result<Option<Team>, DomainError>;

    /// Repositories owned by the organization that the user reaches through
    /// a team grant or organization-wide visibility, newest update first
    async fn accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<Vec<Repository>, DomainError>;

    async fn count_accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<i64, DomainError>;
}

/// Transaction-scoped primitives used by membership mutations
#[async_trait]
pub trait OrgTransaction: Send {
    /// Row lock on the organization; serializes mutations of its membership
    async fn lock_organization(&mut self, org_id: OrgId) -> Result<(), DomainError>;

    /// Membership lookup that locks the row when present
    async fn find_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembership>, DomainError>;

    /// Inserts the membership; `false` when the pair already exists
    async fn insert_membership(&mut self, org_id: OrgId, user_id: UserId)
        -> Result<bool, DomainError>;

    async fn delete_membership(&mut self, org_id: OrgId, user_id: UserId)
        -> Result<bool, DomainError>;

    /// Writes the live membership count into the organization row
    async fn recount_members(&mut self, org_id: OrgId) -> Result<i64, DomainError>;

    /// Team lookup that locks the team row when present
    async fn get_team_by_name(
        &mut self,
        org_id: OrgId,
        name: &str,
    ) -> Result<Option<Team>, DomainError>;

    async fn remove_team_member(&mut self, team_id: TeamId, user_id: UserId)
        -> Result<bool, DomainError>;

    /// Writes the live team membership count into the team row
    async fn recount_team_members(&mut self, team_id: TeamId) -> Result<i64, DomainError>;

    /// Repositories of the organization the user reaches only through a team
    /// grant, i.e. linked to one of the user's teams and not visible
    /// organization-wide
    async fn team_only_repository_ids(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<RepoId>, DomainError>;

    /// Deletes the user's watches and returns the repositories actually unwatched
    async fn delete_watches(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<Vec<RepoId>, DomainError>;

    async fn decrement_watch_counts(&mut self, repo_ids: &[RepoId]) -> Result<u64, DomainError>;

    async fn delete_accesses(&mut self, user_id: UserId, repo_ids: &[RepoId])
        -> Result<u64, DomainError>;

    async fn commit(self) -> Result<(), DomainError>;
}
