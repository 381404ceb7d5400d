//! In-memory organization store
//!
//! Keeps the relational tables in process. A transaction takes the single
//! writer lock, works on a private copy of the tables and publishes the copy
//! on commit; dropping it discards the copy. Reads see the last committed
//! tables. Useful for tests and development; data is lost on exit.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::org::{
    AccessMode, ListOrgMembersOptions, ListOrgsOptions, MembershipId, OrgDatabase, OrgId,
    OrgMembership, OrgOrderBy, OrgTransaction, Organization, Pagination, RepoId, Repository,
    SearchOrgsQuery, Team, TeamId, User, UserId, UserKind, Watch,
};
use crate::domain::DomainError;

/// Storage steps that can be made to fail once, to exercise rollback paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// Non-transactional membership lookup
    FindMembership,
    InsertMembership,
    DeleteWatches,
    DeleteAccesses,
    DeleteMembership,
    RecountMembers,
    Commit,
}

#[derive(Debug, Clone)]
struct IdentityRow {
    id: i64,
    kind: UserKind,
    name: String,
    full_name: String,
    num_members: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn to_user(&self) -> User {
        User {
            id: UserId::new(self.id),
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn to_organization(&self) -> Option<Organization> {
        if self.kind != UserKind::Organization {
            return None;
        }

        Some(Organization {
            id: OrgId::new(self.id),
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            num_members: self.num_members,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    sequence: i64,
    identities: BTreeMap<i64, IdentityRow>,
    memberships: BTreeMap<MembershipId, OrgMembership>,
    teams: BTreeMap<TeamId, Team>,
    team_users: BTreeSet<(TeamId, UserId)>,
    repositories: BTreeMap<RepoId, Repository>,
    team_repos: BTreeSet<(TeamId, RepoId)>,
    watches: BTreeSet<Watch>,
    accesses: BTreeMap<(UserId, RepoId), AccessMode>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    /// Logical clock so update ordering is deterministic
    fn tick(&mut self) -> DateTime<Utc> {
        let seq = self.next_id();
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seq, 0).unwrap_or_default()
    }

    fn insert_identity(&mut self, kind: UserKind, name: &str, full_name: &str) -> i64 {
        let now = self.tick();
        let id = self.next_id();

        self.identities.insert(
            id,
            IdentityRow {
                id,
                kind,
                name: name.to_string(),
                full_name: full_name.to_string(),
                num_members: 0,
                created_at: now,
                updated_at: now,
            },
        );

        id
    }

    fn organization(&self, org_id: OrgId) -> Option<Organization> {
        self.identities
            .get(&org_id.get())
            .and_then(IdentityRow::to_organization)
    }

    fn membership(&self, org_id: OrgId, user_id: UserId) -> Option<&OrgMembership> {
        self.memberships
            .values()
            .find(|m| m.org_id == org_id && m.user_id == user_id)
    }

    fn membership_mut(&mut self, org_id: OrgId, user_id: UserId) -> Option<&mut OrgMembership> {
        self.memberships
            .values_mut()
            .find(|m| m.org_id == org_id && m.user_id == user_id)
    }

    fn insert_membership(&mut self, org_id: OrgId, user_id: UserId) -> Result<bool, DomainError> {
        if self.organization(org_id).is_none() {
            return Err(DomainError::storage(format!(
                "Failed to insert organization membership: organization {} does not exist",
                org_id
            )));
        }

        if !self.identities.contains_key(&user_id.get()) {
            return Err(DomainError::storage(format!(
                "Failed to insert organization membership: user {} does not exist",
                user_id
            )));
        }

        if self.membership(org_id, user_id).is_some() {
            return Ok(false);
        }

        let id = MembershipId::new(self.next_id());
        self.memberships.insert(
            id,
            OrgMembership {
                id,
                user_id,
                org_id,
                is_public: false,
                is_owner: false,
                num_teams: 0,
            },
        );

        Ok(true)
    }

    fn delete_membership(&mut self, org_id: OrgId, user_id: UserId) -> bool {
        let id = self.membership(org_id, user_id).map(|m| m.id);

        match id {
            Some(id) => self.memberships.remove(&id).is_some(),
            None => false,
        }
    }

    fn recount_members(&mut self, org_id: OrgId) -> i64 {
        let count = self
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .count() as i64;

        if let Some(row) = self.identities.get_mut(&org_id.get()) {
            row.num_members = count;
        }

        count
    }

    fn team_by_name(&self, org_id: OrgId, name: &str) -> Option<&Team> {
        let lower = name.to_lowercase();
        self.teams
            .values()
            .find(|t| t.org_id == org_id && t.name.to_lowercase() == lower)
    }

    fn recount_team_members(&mut self, team_id: TeamId) -> i64 {
        let count = self
            .team_users
            .iter()
            .filter(|(team, _)| *team == team_id)
            .count() as i64;

        if let Some(team) = self.teams.get_mut(&team_id) {
            team.num_members = count;
        }

        count
    }

    fn recount_member_teams(&mut self, org_id: OrgId, user_id: UserId) {
        let count = self.user_teams(org_id, user_id).len() as i32;

        if let Some(membership) = self.membership_mut(org_id, user_id) {
            membership.num_teams = count;
        }
    }

    fn user_teams(&self, org_id: OrgId, user_id: UserId) -> BTreeSet<TeamId> {
        self.team_users
            .iter()
            .filter(|(team_id, uid)| {
                *uid == user_id
                    && self
                        .teams
                        .get(team_id)
                        .is_some_and(|team| team.org_id == org_id)
            })
            .map(|(team_id, _)| *team_id)
            .collect()
    }

    fn team_granted(&self, repo_id: RepoId, teams: &BTreeSet<TeamId>) -> bool {
        teams.iter().any(|team_id| self.team_repos.contains(&(*team_id, repo_id)))
    }

    fn accessible_repositories(&self, org_id: OrgId, user_id: UserId) -> Vec<Repository> {
        let teams = self.user_teams(org_id, user_id);

        let mut repos: Vec<Repository> = self
            .repositories
            .values()
            .filter(|repo| repo.owner_id == org_id.as_user_id())
            .filter(|repo| repo.is_org_visible() || self.team_granted(repo.id, &teams))
            .cloned()
            .collect();

        repos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        repos
    }

    fn team_only_repository_ids(&self, org_id: OrgId, user_id: UserId) -> Vec<RepoId> {
        let teams = self.user_teams(org_id, user_id);

        self.repositories
            .values()
            .filter(|repo| repo.owner_id == org_id.as_user_id())
            .filter(|repo| !repo.is_org_visible() && self.team_granted(repo.id, &teams))
            .map(|repo| repo.id)
            .collect()
    }

    fn organizations_of(&self, opts: &ListOrgsOptions) -> Vec<Organization> {
        let mut orgs: Vec<Organization> = self
            .memberships
            .values()
            .filter(|m| m.user_id == opts.member_id)
            .filter(|m| opts.include_private_members || m.is_public)
            .filter_map(|m| self.organization(m.org_id))
            .collect();

        orgs.sort_by_key(|org| org.id);
        orgs
    }
}

#[derive(Debug, Default)]
struct Inner {
    committed: RwLock<Tables>,
    writer: Arc<AsyncMutex<()>>,
    failure: Mutex<Option<FailurePoint>>,
}

impl Inner {
    /// Fails once if `point` was armed
    fn check_failure(&self, point: FailurePoint) -> Result<(), DomainError> {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);

        if *failure == Some(point) {
            *failure = None;
            return Err(DomainError::storage(format!(
                "Injected failure at {:?}",
                point
            )));
        }

        Ok(())
    }
}

/// Transactional in-memory implementation of [`OrgDatabase`]
///
/// The seeding helpers write committed state directly and must not be called
/// while a transaction is open.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrgDatabase {
    inner: Arc<Inner>,
}

impl InMemoryOrgDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner
            .committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next storage call at `point` fail
    pub fn fail_at(&self, point: FailurePoint) {
        *self
            .inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(point);
    }

    pub fn create_user(&self, name: &str) -> UserId {
        UserId::new(self.write().insert_identity(UserKind::Individual, name, ""))
    }

    /// Creates an organization together with its empty Owners team
    pub fn create_organization(&self, name: &str, full_name: &str) -> OrgId {
        let org_id = OrgId::new(
            self.write()
                .insert_identity(UserKind::Organization, name, full_name),
        );
        self.create_team(org_id, Team::OWNERS);
        org_id
    }

    pub fn create_team(&self, org_id: OrgId, name: &str) -> TeamId {
        let mut tables = self.write();
        let id = TeamId::new(tables.next_id());

        tables.teams.insert(
            id,
            Team {
                id,
                org_id,
                name: name.to_string(),
                num_members: 0,
            },
        );

        id
    }

    pub fn delete_team(&self, team_id: TeamId) {
        let mut tables = self.write();
        tables.teams.remove(&team_id);
        tables.team_users.retain(|(team, _)| *team != team_id);
        tables.team_repos.retain(|(team, _)| *team != team_id);
    }

    pub fn add_team_member(&self, team_id: TeamId, user_id: UserId) {
        let mut tables = self.write();
        tables.team_users.insert((team_id, user_id));
        tables.recount_team_members(team_id);

        if let Some(org_id) = tables.teams.get(&team_id).map(|team| team.org_id) {
            tables.recount_member_teams(org_id, user_id);
        }
    }

    /// Makes the user a member of the organization and of its Owners team
    pub fn add_owner(&self, org_id: OrgId, user_id: UserId) -> Result<(), DomainError> {
        let mut tables = self.write();

        let owners = tables
            .team_by_name(org_id, Team::OWNERS)
            .map(|team| team.id)
            .ok_or_else(|| DomainError::team_not_found(org_id, Team::OWNERS))?;

        tables.insert_membership(org_id, user_id)?;

        if let Some(membership) = tables.membership_mut(org_id, user_id) {
            membership.is_owner = true;
        }

        tables.team_users.insert((owners, user_id));
        tables.recount_team_members(owners);
        tables.recount_member_teams(org_id, user_id);
        tables.recount_members(org_id);

        Ok(())
    }

    /// Returns `false` when the user is not a member
    pub fn set_public_membership(&self, org_id: OrgId, user_id: UserId, is_public: bool) -> bool {
        match self.write().membership_mut(org_id, user_id) {
            Some(membership) => {
                membership.is_public = is_public;
                true
            }
            None => false,
        }
    }

    pub fn create_repository(
        &self,
        owner_id: impl Into<UserId>,
        name: &str,
        is_private: bool,
        is_unlisted: bool,
    ) -> RepoId {
        let mut tables = self.write();
        let updated_at = tables.tick();
        let id = RepoId::new(tables.next_id());

        tables.repositories.insert(
            id,
            Repository {
                id,
                owner_id: owner_id.into(),
                name: name.to_string(),
                is_private,
                is_unlisted,
                num_watches: 0,
                updated_at,
            },
        );

        id
    }

    pub fn set_repository_visibility(&self, repo_id: RepoId, is_private: bool, is_unlisted: bool) {
        let mut tables = self.write();
        let updated_at = tables.tick();

        if let Some(repo) = tables.repositories.get_mut(&repo_id) {
            repo.is_private = is_private;
            repo.is_unlisted = is_unlisted;
            repo.updated_at = updated_at;
        }
    }

    /// Marks the repository as the most recently updated one
    pub fn touch_repository(&self, repo_id: RepoId) {
        let mut tables = self.write();
        let updated_at = tables.tick();

        if let Some(repo) = tables.repositories.get_mut(&repo_id) {
            repo.updated_at = updated_at;
        }
    }

    pub fn link_team_repository(&self, team_id: TeamId, repo_id: RepoId) {
        self.write().team_repos.insert((team_id, repo_id));
    }

    pub fn watch_repository(&self, user_id: UserId, repo_id: RepoId) {
        let mut tables = self.write();

        if tables.watches.insert(Watch { user_id, repo_id }) {
            if let Some(repo) = tables.repositories.get_mut(&repo_id) {
                repo.num_watches += 1;
            }
        }
    }

    pub fn grant_access(&self, user_id: UserId, repo_id: RepoId, mode: AccessMode) {
        self.write().accesses.insert((user_id, repo_id), mode);
    }

    pub fn membership_rows(&self, org_id: OrgId) -> usize {
        self.read()
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .count()
    }

    pub fn team(&self, team_id: TeamId) -> Option<Team> {
        self.read().teams.get(&team_id).cloned()
    }

    pub fn repository(&self, repo_id: RepoId) -> Option<Repository> {
        self.read().repositories.get(&repo_id).cloned()
    }

    pub fn watched_repositories(&self, user_id: UserId) -> Vec<RepoId> {
        self.read()
            .watches
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.repo_id)
            .collect()
    }

    pub fn accessible_grants(&self, user_id: UserId) -> Vec<RepoId> {
        self.read()
            .accesses
            .keys()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, repo_id)| *repo_id)
            .collect()
    }
}

#[async_trait]
impl OrgDatabase for InMemoryOrgDatabase {
    type Transaction = InMemoryOrgTransaction;

    async fn begin(&self) -> Result<Self::Transaction, DomainError> {
        let guard = self.inner.writer.clone().lock_owned().await;
        let working = self.read().clone();

        Ok(InMemoryOrgTransaction {
            inner: self.inner.clone(),
            working,
            _guard: guard,
        })
    }

    async fn get_organization(&self, org_id: OrgId) -> Result<Option<Organization>, DomainError> {
        Ok(self.read().organization(org_id))
    }

    async fn find_membership(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembership>, DomainError> {
        self.inner.check_failure(FailurePoint::FindMembership)?;
        Ok(self.read().membership(org_id, user_id).cloned())
    }

    async fn list_members(
        &self,
        org_id: OrgId,
        opts: ListOrgMembersOptions,
    ) -> Result<Vec<User>, DomainError> {
        let tables = self.read();

        let mut members: Vec<User> = tables
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .filter_map(|m| tables.identities.get(&m.user_id.get()))
            .map(IdentityRow::to_user)
            .collect();

        members.sort_by_key(|user| user.id);

        if opts.limit > 0 {
            members.truncate(opts.limit);
        }

        Ok(members)
    }

    async fn search_organizations(
        &self,
        query: &SearchOrgsQuery,
    ) -> Result<(Vec<Organization>, i64), DomainError> {
        let tables = self.read();

        let mut orgs: Vec<Organization> = tables
            .identities
            .values()
            .filter_map(IdentityRow::to_organization)
            .filter(|org| query.matches(&org.name, &org.full_name))
            .collect();

        let total = orgs.len() as i64;

        if let Some(order_by) = query.order_by {
            sort_organizations(&mut orgs, order_by);
        }

        Ok((query.pagination.apply(orgs), total))
    }

    async fn list_organizations(
        &self,
        opts: ListOrgsOptions,
    ) -> Result<Vec<Organization>, DomainError> {
        Ok(self.read().organizations_of(&opts))
    }

    async fn count_organizations_by_user(&self, user_id: UserId) -> Result<i64, DomainError> {
        Ok(self
            .read()
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .count() as i64)
    }

    async fn get_team_by_name(
        &self,
        org_id: OrgId,
        name: &str,
    ) -> Result<Option<Team>, DomainError> {
        Ok(self.read().team_by_name(org_id, name).cloned())
    }

    async fn accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
        pagination: Pagination,
    ) -> Result<Vec<Repository>, DomainError> {
        let repos = self.read().accessible_repositories(org_id, user_id);
        Ok(pagination.apply(repos))
    }

    async fn count_accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<i64, DomainError> {
        Ok(self.read().accessible_repositories(org_id, user_id).len() as i64)
    }
}

fn sort_organizations(orgs: &mut [Organization], order_by: OrgOrderBy) {
    match order_by {
        OrgOrderBy::IdAsc => orgs.sort_by_key(|org| org.id),
        OrgOrderBy::IdDesc => orgs.sort_by(|a, b| b.id.cmp(&a.id)),
        OrgOrderBy::NameAsc => orgs.sort_by_key(|org| org.name.to_lowercase()),
        OrgOrderBy::NameDesc => {
            orgs.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()))
        }
        OrgOrderBy::CreatedAsc => orgs.sort_by_key(|org| (org.created_at, org.id)),
        OrgOrderBy::CreatedDesc => {
            orgs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)))
        }
        OrgOrderBy::UpdatedDesc => {
            orgs.sort_by(|a, b| (b.updated_at, b.id).cmp(&(a.updated_at, a.id)))
        }
    }
}

/// Open transaction on an [`InMemoryOrgDatabase`]
#[derive(Debug)]
pub struct InMemoryOrgTransaction {
    inner: Arc<Inner>,
    working: Tables,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl OrgTransaction for InMemoryOrgTransaction {
    async fn lock_organization(&mut self, _org_id: OrgId) -> Result<(), DomainError> {
        // The writer lock already serializes every transaction.
        Ok(())
    }

    async fn find_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Option<OrgMembership>, DomainError> {
        Ok(self.working.membership(org_id, user_id).cloned())
    }

    async fn insert_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<bool, DomainError> {
        self.inner.check_failure(FailurePoint::InsertMembership)?;
        self.working.insert_membership(org_id, user_id)
    }

    async fn delete_membership(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<bool, DomainError> {
        self.inner.check_failure(FailurePoint::DeleteMembership)?;
        Ok(self.working.delete_membership(org_id, user_id))
    }

    async fn recount_members(&mut self, org_id: OrgId) -> Result<i64, DomainError> {
        self.inner.check_failure(FailurePoint::RecountMembers)?;
        Ok(self.working.recount_members(org_id))
    }

    async fn get_team_by_name(
        &mut self,
        org_id: OrgId,
        name: &str,
    ) -> Result<Option<Team>, DomainError> {
        Ok(self.working.team_by_name(org_id, name).cloned())
    }

    async fn remove_team_member(
        &mut self,
        team_id: TeamId,
        user_id: UserId,
    ) -> Result<bool, DomainError> {
        Ok(self.working.team_users.remove(&(team_id, user_id)))
    }

    async fn recount_team_members(&mut self, team_id: TeamId) -> Result<i64, DomainError> {
        Ok(self.working.recount_team_members(team_id))
    }

    async fn team_only_repository_ids(
        &mut self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<Vec<RepoId>, DomainError> {
        Ok(self.working.team_only_repository_ids(org_id, user_id))
    }

    async fn delete_watches(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<Vec<RepoId>, DomainError> {
        self.inner.check_failure(FailurePoint::DeleteWatches)?;

        let mut unwatched = Vec::new();

        for repo_id in repo_ids {
            let watch = Watch {
                user_id,
                repo_id: *repo_id,
            };

            if self.working.watches.remove(&watch) {
                unwatched.push(*repo_id);
            }
        }

        Ok(unwatched)
    }

    async fn decrement_watch_counts(&mut self, repo_ids: &[RepoId]) -> Result<u64, DomainError> {
        let mut updated = 0;

        for repo_id in repo_ids {
            if let Some(repo) = self.working.repositories.get_mut(repo_id) {
                repo.num_watches -= 1;
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn delete_accesses(
        &mut self,
        user_id: UserId,
        repo_ids: &[RepoId],
    ) -> Result<u64, DomainError> {
        self.inner.check_failure(FailurePoint::DeleteAccesses)?;

        let mut removed = 0;

        for repo_id in repo_ids {
            if self.working.accesses.remove(&(user_id, *repo_id)).is_some() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn commit(self) -> Result<(), DomainError> {
        self.inner.check_failure(FailurePoint::Commit)?;

        *self
            .inner
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = self.working;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (InMemoryOrgDatabase, OrgId, UserId) {
        let db = InMemoryOrgDatabase::new();
        let org = db.create_organization("acme", "Acme Corp");
        let user = db.create_user("alice");
        (db, org, user)
    }

    #[test]
    fn test_create_organization_has_owners_team() {
        let (db, org, _) = seeded();
        let tables = db.read();
        let owners = tables.team_by_name(org, "owners").unwrap();

        assert_eq!(owners.name, Team::OWNERS);
        assert_eq!(owners.num_members, 0);
    }

    #[test]
    fn test_add_owner_updates_counters() {
        let (db, org, user) = seeded();
        db.add_owner(org, user).unwrap();

        let tables = db.read();
        let membership = tables.membership(org, user).unwrap();
        assert!(membership.is_owner);
        assert_eq!(membership.num_teams, 1);
        assert_eq!(tables.organization(org).unwrap().num_members, 1);
        assert_eq!(tables.team_by_name(org, Team::OWNERS).unwrap().num_members, 1);
    }

    #[test]
    fn test_add_owner_without_owners_team() {
        let (db, org, user) = seeded();
        let owners = db.read().team_by_name(org, Team::OWNERS).unwrap().id;
        db.delete_team(owners);

        let err = db.add_owner(org, user).unwrap_err();
        assert!(err.is_team_not_found());
    }

    #[test]
    fn test_watch_repository_counts_once() {
        let (db, org, user) = seeded();
        let repo = db.create_repository(org, "r1", true, false);

        db.watch_repository(user, repo);
        db.watch_repository(user, repo);

        assert_eq!(db.repository(repo).unwrap().num_watches, 1);
        assert_eq!(db.watched_repositories(user), vec![repo]);
    }

    #[tokio::test]
    async fn test_transaction_dropped_without_commit_rolls_back() {
        let (db, org, user) = seeded();

        {
            let mut tx = db.begin().await.unwrap();
            assert!(tx.insert_membership(org, user).await.unwrap());
            tx.recount_members(org).await.unwrap();
        }

        assert_eq!(db.membership_rows(org), 0);
        assert_eq!(db.get_organization(org).await.unwrap().unwrap().num_members, 0);
    }

    #[tokio::test]
    async fn test_transaction_commit_publishes() {
        let (db, org, user) = seeded();

        let mut tx = db.begin().await.unwrap();
        assert!(tx.insert_membership(org, user).await.unwrap());
        assert!(!tx.insert_membership(org, user).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(db.membership_rows(org), 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_see_uncommitted_writes() {
        let (db, org, user) = seeded();

        let mut tx = db.begin().await.unwrap();
        tx.insert_membership(org, user).await.unwrap();

        assert!(db.find_membership(org, user).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(db.find_membership(org, user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_insert_membership_requires_existing_rows() {
        let (db, org, user) = seeded();
        let mut tx = db.begin().await.unwrap();

        let err = tx
            .insert_membership(OrgId::new(9_999), user)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));

        let err = tx
            .insert_membership(org, UserId::new(9_999))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));

        // A user row is not an organization.
        let err = tx
            .insert_membership(OrgId::new(user.get()), user)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_failure_injection_fires_once() {
        let (db, org, user) = seeded();
        db.fail_at(FailurePoint::FindMembership);

        assert!(db.find_membership(org, user).await.is_err());
        assert!(db.find_membership(org, user).await.is_ok());
    }

    #[tokio::test]
    async fn test_pagination_and_order_of_accessible_repositories() {
        let (db, org, user) = seeded();
        let r1 = db.create_repository(org, "r1", false, false);
        let r2 = db.create_repository(org, "r2", false, false);
        let r3 = db.create_repository(org, "r3", false, false);
        db.touch_repository(r1);

        let all = db
            .accessible_repositories(org, user, Pagination::all())
            .await
            .unwrap();
        let ids: Vec<RepoId> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![r1, r3, r2]);

        let page = db
            .accessible_repositories(org, user, Pagination::new(2, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, r2);
    }
}
