//! Organization member counter

use tracing::debug;

use crate::domain::org::{OrgId, OrgTransaction};
use crate::domain::DomainError;

/// Recomputes `num_members` from the membership rows inside `tx`
///
/// Always a full recount, never an increment, so the cached value converges
/// to the row count whatever wrote the rows.
pub async fn sync_member_count<T: OrgTransaction>(
    tx: &mut T,
    org_id: OrgId,
) -> Result<i64, DomainError> {
    let num_members = tx.recount_members(org_id).await?;
    debug!(org_id = %org_id, num_members, "Recounted organization members");
    Ok(num_members)
}
