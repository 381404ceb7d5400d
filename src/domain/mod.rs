//! Domain layer - Core business logic and entities

pub mod error;
pub mod org;

pub use error::DomainError;
pub use org::{
    AccessibleRepositoriesOptions, ListOrgMembersOptions, ListOrgsOptions, OrgDatabase, OrgId,
    OrgMembership, OrgOrderBy, OrgTransaction, Organization, Pagination, RepoId, Repository,
    SearchOrgsQuery, Team, TeamId, User, UserId,
};
