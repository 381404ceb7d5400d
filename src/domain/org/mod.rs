//! Organization domain module
//!
//! Organizations share the identity table with individual users. Membership
//! rows link the two, and the organization keeps a cached member count that
//! only the engine's recompute step writes.

mod entity;
mod query;
mod repository;

pub use entity::{
    AccessMode, MembershipId, OrgId, OrgMembership, Organization, RepoId, Repository,
    Team, TeamId, User, UserId, UserKind, Watch,
};
pub use query::{
    AccessibleRepositoriesOptions, ListOrgMembersOptions, ListOrgsOptions, OrgOrderBy, Pagination,
    SearchOrgsQuery,
};
pub use repository::{OrgDatabase, OrgTransaction};
