//! Last-owner protection

use tracing::warn;

use crate::domain::org::{OrgId, OrgTransaction, Team, UserId};
use crate::domain::DomainError;

/// Checks that removing the owner `user_id` keeps at least one owner
///
/// Locks and returns the Owners team. Must run in the same transaction as the
/// removal so two concurrent removals cannot both pass.
pub async fn ensure_not_last_owner<T: OrgTransaction>(
    tx: &mut T,
    org_id: OrgId,
    user_id: UserId,
) -> Result<Team, DomainError> {
    let owners = tx
        .get_team_by_name(org_id, Team::OWNERS)
        .await?
        .ok_or_else(|| DomainError::team_not_found(org_id, Team::OWNERS))?;

    if owners.num_members <= 1 {
        warn!(org_id = %org_id, user_id = %user_id, "Refusing to remove last organization owner");
        return Err(DomainError::last_owner(org_id, user_id));
    }

    Ok(owners)
}
