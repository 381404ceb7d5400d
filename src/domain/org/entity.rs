//! Organization, membership and repository records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw database value
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a row in the shared identity table
    UserId
);
numeric_id!(
    /// Identifier of an identity row that is typed as an organization
    OrgId
);
numeric_id!(TeamId);
numeric_id!(RepoId);
numeric_id!(MembershipId);

impl OrgId {
    /// The same row seen through the identity view
    pub const fn as_user_id(self) -> UserId {
        UserId(self.0)
    }
}

impl From<OrgId> for UserId {
    fn from(id: OrgId) -> Self {
        id.as_user_id()
    }
}

/// Discriminator stored in the identity table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    #[default]
    Individual,
    Organization,
}

impl UserKind {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Individual => 0,
            Self::Organization => 1,
        }
    }

    /// `None` for a discriminator this version does not know
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Individual),
            1 => Some(Self::Organization),
            _ => None,
        }
    }
}

/// Individual account view over the identity table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Organization view over the identity table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub full_name: String,
    /// Cached count of membership rows, written only by the counter recompute
    pub num_members: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Link between an organization and one of its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMembership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub org_id: OrgId,
    /// Shown on the member's public profile
    pub is_public: bool,
    /// Member of the organization's Owners team
    pub is_owner: bool,
    pub num_teams: i32,
}

/// Team scoped to one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub org_id: OrgId,
    pub name: String,
    pub num_members: i64,
}

impl Team {
    /// Name of the team whose members administer the organization
    pub const OWNERS: &'static str = "Owners";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    pub owner_id: UserId,
    pub name: String,
    pub is_private: bool,
    pub is_unlisted: bool,
    pub num_watches: i64,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Visible to everyone in the owning organization without a team grant
    pub fn is_org_visible(&self) -> bool {
        !self.is_private && !self.is_unlisted
    }
}

/// A user's subscription to a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watch {
    pub user_id: UserId,
    pub repo_id: RepoId,
}

/// Permission level recorded on a cached access grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    Read,
    Write,
    Admin,
    Owner,
}

impl AccessMode {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::Admin => 3,
            Self::Owner => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_org_id_as_user_id() {
        let org = OrgId::new(42);
        assert_eq!(org.as_user_id(), UserId::new(42));
        assert_eq!(UserId::from(org).get(), 42);
    }

    #[test]
    fn test_id_display_and_serde() {
        let id = RepoId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: RepoId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_user_kind_conversion() {
        assert_eq!(UserKind::Individual.as_i16(), 0);
        assert_eq!(UserKind::Organization.as_i16(), 1);
        assert_eq!(UserKind::from_i16(0), Some(UserKind::Individual));
        assert_eq!(UserKind::from_i16(1), Some(UserKind::Organization));
        assert_eq!(UserKind::from_i16(9), None);
    }

    #[test]
    fn test_access_mode_column_values() {
        assert_eq!(AccessMode::Read.as_i16(), 1);
        assert_eq!(AccessMode::Write.as_i16(), 2);
        assert_eq!(AccessMode::Admin.as_i16(), 3);
        assert_eq!(AccessMode::Owner.as_i16(), 4);
    }

    #[test]
    fn test_repository_org_visibility() {
        let mut repo = Repository {
            id: RepoId::new(1),
            owner_id: UserId::new(2),
            name: "r1".to_string(),
            is_private: true,
            is_unlisted: false,
            num_watches: 0,
            updated_at: Utc::now(),
        };
        assert!(!repo.is_org_visible());

        repo.is_private = false;
        assert!(repo.is_org_visible());

        repo.is_unlisted = true;
        assert!(!repo.is_org_visible());
    }
}
