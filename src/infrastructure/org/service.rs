//! Organization service: membership mutations and organization reads

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::org::{
    AccessibleRepositoriesOptions, ListOrgMembersOptions, ListOrgsOptions, OrgDatabase, OrgId,
    OrgTransaction, Organization, Pagination, Repository, SearchOrgsQuery, Team, User, UserId,
};
use crate::domain::DomainError;

use super::cascade::purge_member_access;
use super::counter::sync_member_count;
use super::guard::ensure_not_last_owner;

/// Keeps membership rows, the cached member count, the owner invariant and
/// derived repository access consistent
///
/// Stateless between calls. Each mutation runs in one storage transaction;
/// dropping the returned future rolls that transaction back.
#[derive(Debug)]
pub struct OrgService<D: OrgDatabase> {
    database: Arc<D>,
}

impl<D: OrgDatabase> Clone for OrgService<D> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
        }
    }
}

impl<D: OrgDatabase> OrgService<D> {
    /// Create a new organization service
    pub fn new(database: Arc<D>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Arc<D> {
        &self.database
    }

    /// Adds the user to the organization; a no-op if already a member
    pub async fn add_member(&self, org_id: OrgId, user_id: UserId) -> Result<(), DomainError> {
        let mut tx = self.database.begin().await?;
        tx.lock_organization(org_id).await?;

        if !tx.insert_membership(org_id, user_id).await? {
            debug!(org_id = %org_id, user_id = %user_id, "User is already an organization member");
            return Ok(());
        }

        let num_members = sync_member_count(&mut tx, org_id).await?;
        tx.commit().await?;

        info!(org_id = %org_id, user_id = %user_id, num_members, "Added organization member");
        Ok(())
    }

    /// Removes the user from the organization
    ///
    /// A no-op for non-members. Fails with [`DomainError::LastOwner`] when the
    /// user is the only owner left, leaving everything untouched.
    pub async fn remove_member(&self, org_id: OrgId, user_id: UserId) -> Result<(), DomainError> {
        let mut tx = self.database.begin().await?;
        tx.lock_organization(org_id).await?;

        let Some(membership) = tx.find_membership(org_id, user_id).await? else {
            debug!(org_id = %org_id, user_id = %user_id, "User is not an organization member");
            return Ok(());
        };

        let owners = if membership.is_owner {
            Some(ensure_not_last_owner(&mut tx, org_id, user_id).await?)
        } else {
            None
        };

        let cascade = purge_member_access(&mut tx, org_id, user_id).await?;

        if let Some(owners) = owners {
            tx.remove_team_member(owners.id, user_id).await?;
            tx.recount_team_members(owners.id).await?;
        }

        // TODO: drop the user from the organization's other teams as well.
        tx.delete_membership(org_id, user_id).await?;
        let num_members = sync_member_count(&mut tx, org_id).await?;
        tx.commit().await?;

        info!(
            org_id = %org_id,
            user_id = %user_id,
            was_owner = membership.is_owner,
            repositories = cascade.repositories.len(),
            num_members,
            "Removed organization member"
        );
        Ok(())
    }

    /// True iff the user is an owner; lookup failures read as `false`
    pub async fn is_owned_by(&self, org_id: OrgId, user_id: UserId) -> bool {
        match self.database.find_membership(org_id, user_id).await {
            Ok(membership) => membership.is_some_and(|m| m.is_owner),
            Err(e) => {
                warn!(org_id = %org_id, user_id = %user_id, error = %e, "Ownership check failed");
                false
            }
        }
    }

    /// True iff the user is a member; lookup failures read as `false`
    pub async fn has_member(&self, org_id: OrgId, user_id: UserId) -> bool {
        match self.database.find_membership(org_id, user_id).await {
            Ok(membership) => membership.is_some(),
            Err(e) => {
                warn!(org_id = %org_id, user_id = %user_id, error = %e, "Membership check failed");
                false
            }
        }
    }

    /// Members ordered by ascending user ID
    pub async fn list_members(
        &self,
        org_id: OrgId,
        opts: ListOrgMembersOptions,
    ) -> Result<Vec<User>, DomainError> {
        self.database.list_members(org_id, opts).await
    }

    pub async fn get_organization(
        &self,
        org_id: OrgId,
    ) -> Result<Option<Organization>, DomainError> {
        self.database.get_organization(org_id).await
    }

    /// Organizations whose name or full name contains the keyword, with the
    /// total number of matches
    pub async fn search_by_name(
        &self,
        query: &SearchOrgsQuery,
    ) -> Result<(Vec<Organization>, i64), DomainError> {
        if query.keyword.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let (orgs, total) = self.database.search_organizations(query).await?;
        debug!(keyword = %query.keyword, returned = orgs.len(), total, "Searched organizations");
        Ok((orgs, total))
    }

    /// Organizations the given user belongs to
    pub async fn list(&self, opts: ListOrgsOptions) -> Result<Vec<Organization>, DomainError> {
        if opts.member_id.get() <= 0 {
            return Err(DomainError::invalid_argument(
                "Member ID must be greater than 0",
            ));
        }

        self.database.list_organizations(opts).await
    }

    /// Number of organizations the user belongs to, public or not
    pub async fn count_by_user(&self, user_id: UserId) -> Result<i64, DomainError> {
        self.database.count_organizations_by_user(user_id).await
    }

    pub async fn get_team_by_name(&self, org_id: OrgId, name: &str) -> Result<Team, DomainError> {
        self.database
            .get_team_by_name(org_id, name)
            .await?
            .ok_or_else(|| DomainError::team_not_found(org_id, name))
    }

    /// Repositories of the organization visible to the user, newest update
    /// first, and their total count
    ///
    /// `page` is 1-based; a non-positive `page_size` returns everything. With
    /// `skip_count` the total is always 0.
    pub async fn accessible_repositories(
        &self,
        org_id: OrgId,
        user_id: UserId,
        page: i64,
        page_size: i64,
        opts: AccessibleRepositoriesOptions,
    ) -> Result<(Vec<Repository>, i64), DomainError> {
        let repos = self
            .database
            .accessible_repositories(org_id, user_id, Pagination::new(page, page_size))
            .await?;

        if opts.skip_count {
            return Ok((repos, 0));
        }

        let total = self
            .database
            .count_accessible_repositories(org_id, user_id)
            .await?;

        Ok((repos, total))
    }
}
