//! External collaborator interfaces (spec §4.3, Glossary)
//!
//! The coordinator doesn't own user accounts, library contents, or transport
//! sessions — it is handed thin trait objects onto whatever system does. The
//! host process wires a real implementation in; tests wire a fake one.

use async_trait::async_trait;
use uuid::Uuid;

/// Resolves which session belongs to which authenticated user, and the
/// reverse (who's connected) for `ListAvailableUsers`.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn user_for_session(&self, session_id: Uuid) -> Option<Uuid>;

    /// All users with at least one active session, for `ListAvailableUsers`.
    async fn connected_users(&self) -> Vec<Uuid>;

    /// Whether a user is permitted to create/join SyncPlay groups at all
    /// (spec §4.3: distinct from per-group playback/playlist permissions).
    async fn has_syncplay_access(&self, user_id: Uuid) -> bool;
}

/// Checks a user's access to specific library items, used when building or
/// editing a play queue (spec §4.2's `LibraryAccessDenied`).
#[async_trait]
pub trait UserCatalog: Send + Sync {
    async fn can_access(&self, user_id: Uuid, item_id: Uuid) -> bool;

    async fn can_access_all(&self, user_id: Uuid, item_ids: &[Uuid]) -> bool {
        for item_id in item_ids {
            if !self.can_access(user_id, *item_id).await {
                return false;
            }
        }
        true
    }

    /// The item's total duration in ticks, used to refresh a group's
    /// `RunTimeTicks` whenever the playing item changes (SPEC_FULL.md §3).
    async fn runtime_ticks(&self, item_id: Uuid) -> Option<i64>;
}
