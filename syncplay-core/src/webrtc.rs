//! WebRTC signaling relay (spec §4.5)
//!
//! The coordinator never inspects offer/answer/ICE payloads; it only routes
//! them between group members by session id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A signaling payload relayed verbatim between two sessions in the same group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcRelay {
    pub to_session: Uuid,
    pub payload: serde_json::Value,
}

/// Resolves the relay's recipient into a concrete delivery target.
///
/// Returns `None` if the named session is not a member of `group_members` —
/// the caller should treat this as a no-op rather than an error, since a
/// departed peer is a normal race, not a client mistake.
pub fn resolve_recipient(relay: &WebRtcRelay, group_members: &[Uuid]) -> Option<Uuid> {
    group_members
        .iter()
        .copied()
        .find(|&session_id| session_id == relay.to_session)
}
