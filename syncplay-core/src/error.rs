//! Error types for the SyncPlay coordinator
//!
//! Per the error handling design (spec §7): hard errors (unauthenticated,
//! malformed query) surface as HTTP 4xx; everything else is a semantic
//! refusal delivered out-of-band as a `GroupUpdate` to the requesting
//! session, never as a non-204 response.

use thiserror::Error;
use uuid::Uuid;

use crate::messages::GroupUpdateKind;

/// Coordinator-level errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncPlayError {
    #[error("session is already in a group")]
    AlreadyInGroup,

    #[error("session is not in a group")]
    NotInGroup,

    #[error("group {0} not found")]
    GroupNotFound(Uuid),

    #[error("join denied")]
    JoinDenied,

    #[error("create denied: user lacks SyncPlay access")]
    CreateDenied,

    #[error("library access denied for one or more queue items")]
    LibraryAccessDenied,

    #[error("administrator privileges required")]
    Forbidden,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stale request: {0}")]
    StaleRequest(String),
}

/// Result type alias using `SyncPlayError`
pub type Result<T> = std::result::Result<T, SyncPlayError>;

impl SyncPlayError {
    /// The `GroupUpdate` payload type used to report this error out-of-band
    /// (spec §6's enumerated `GroupUpdate` types)
    pub fn update_kind(&self) -> GroupUpdateKind {
        match self {
            // Not one of the enumerated types; reported via the generic kind.
            SyncPlayError::AlreadyInGroup => GroupUpdateKind::GroupUpdate,
            SyncPlayError::NotInGroup => GroupUpdateKind::NotInGroup,
            SyncPlayError::GroupNotFound(_) => GroupUpdateKind::GroupDoesNotExist,
            SyncPlayError::JoinDenied => GroupUpdateKind::JoinGroupDenied,
            SyncPlayError::CreateDenied => GroupUpdateKind::CreateGroupDenied,
            SyncPlayError::LibraryAccessDenied => GroupUpdateKind::LibraryAccessDenied,
            SyncPlayError::Forbidden => GroupUpdateKind::GroupUpdate,
            SyncPlayError::InvalidRequest(_) | SyncPlayError::StaleRequest(_) => {
                GroupUpdateKind::GroupUpdate
            }
        }
    }

    /// Whether this is a hard error that should surface as an HTTP 4xx
    /// instead of an out-of-band `GroupUpdate`
    pub fn is_hard_error(&self) -> bool {
        matches!(self, SyncPlayError::InvalidRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_in_group_maps_to_the_generic_update_kind() {
        assert_eq!(
            SyncPlayError::AlreadyInGroup.update_kind(),
            GroupUpdateKind::GroupUpdate
        );
    }

    #[test]
    fn group_not_found_maps_to_group_does_not_exist() {
        assert_eq!(
            SyncPlayError::GroupNotFound(Uuid::nil()).update_kind(),
            GroupUpdateKind::GroupDoesNotExist
        );
    }

    #[test]
    fn only_invalid_request_is_a_hard_error() {
        assert!(SyncPlayError::InvalidRequest("bad query".into()).is_hard_error());
        assert!(!SyncPlayError::JoinDenied.is_hard_error());
        assert!(!SyncPlayError::StaleRequest("old pid".into()).is_hard_error());
    }
}
