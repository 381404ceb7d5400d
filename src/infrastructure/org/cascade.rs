//! Cleanup of derived repository state when a member leaves

use tracing::debug;

use crate::domain::org::{OrgId, OrgTransaction, RepoId, UserId};
use crate::domain::DomainError;

/// What the cascade removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    /// Repositories the user loses access to
    pub repositories: Vec<RepoId>,
    /// Repositories whose watch row was deleted and watch count decremented
    pub unwatched: Vec<RepoId>,
    pub accesses_removed: u64,
}

/// Strips watches and access grants for repositories the user only reaches
/// through this organization's teams
///
/// Reachability is computed from the membership, so this has to run before
/// the membership row is deleted.
pub async fn purge_member_access<T: OrgTransaction>(
    tx: &mut T,
    org_id: OrgId,
    user_id: UserId,
) -> Result<CascadeSummary, DomainError> {
    let repositories = tx.team_only_repository_ids(org_id, user_id).await?;

    if repositories.is_empty() {
        return Ok(CascadeSummary::default());
    }

    let unwatched = tx.delete_watches(user_id, &repositories).await?;

    if !unwatched.is_empty() {
        tx.decrement_watch_counts(&unwatched).await?;
    }

    let accesses_removed = tx.delete_accesses(user_id, &repositories).await?;

    debug!(
        org_id = %org_id,
        user_id = %user_id,
        repositories = repositories.len(),
        unwatched = unwatched.len(),
        accesses_removed,
        "Purged member repository state"
    );

    Ok(CascadeSummary {
        repositories,
        unwatched,
        accesses_removed,
    })
}
