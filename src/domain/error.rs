use thiserror::Error;

use super::org::{OrgId, UserId};

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Removing the user would leave the organization without an owner.
    #[error("User {user_id} is the last owner of organization {org_id}")]
    LastOwner { org_id: OrgId, user_id: UserId },

    /// The organization has no team with the given name.
    #[error("Team '{name}' does not exist in organization {org_id}")]
    TeamNotFound { org_id: OrgId, name: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl DomainError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn last_owner(org_id: OrgId, user_id: UserId) -> Self {
        Self::LastOwner { org_id, user_id }
    }

    pub fn team_not_found(org_id: OrgId, name: impl Into<String>) -> Self {
        Self::TeamNotFound {
            org_id,
            name: name.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// True for the user-facing "last owner" rejection
    pub fn is_last_owner(&self) -> bool {
        matches!(self, Self::LastOwner { .. })
    }

    pub fn is_team_not_found(&self) -> bool {
        matches!(self, Self::TeamNotFound { .. })
    }
}
