//! Outbound message vocabulary (spec §6)
//!
//! `GroupUpdate` carries semantic state changes and refusals; `SyncPlayCommand`
//! carries the time-synchronized transport commands clients schedule against
//! their own clock. Both are delivered through a `MessageSink`
//! (see [`crate::dispatch`]) to a `BroadcastAudience`-filtered set of members.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audience filter over a group's members (spec §4.5 / Glossary)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastAudience {
    CurrentSession,
    AllGroup,
    AllExceptCurrentSession,
    /// Non-buffering members only
    AllReady,
}

/// `GroupUpdate{groupId, type, payload}` (spec §6)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub group_id: Uuid,
    #[serde(rename = "type")]
    pub kind: GroupUpdateKind,
    pub payload: serde_json::Value,
}

/// The enumerated `GroupUpdate` types from spec §6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupUpdateKind {
    GroupDoesNotExist,
    CreateGroupDenied,
    JoinGroupDenied,
    LibraryAccessDenied,
    NotInGroup,
    GroupJoined,
    GroupLeft,
    UserJoined,
    UserLeft,
    GroupUpdate,
    StateUpdate,
    PlayQueue,
    WebRTC,
}

impl GroupUpdate {
    pub fn new(group_id: Uuid, kind: GroupUpdateKind, payload: serde_json::Value) -> Self {
        Self {
            group_id,
            kind,
            payload,
        }
    }
}

/// The transport commands a `SyncPlayCommand` can carry (spec §6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    Unpause,
    Pause,
    Stop,
    Seek,
    PlaybackRateChange,
}

/// `SendCommand{groupId, playingItemPid, when, command, position, emittedAt}`
///
/// Clients interpret this by comparing their synchronized clock to `when`
/// (the group's `LastActivity`) to schedule the action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPlayCommand {
    pub group_id: Uuid,
    pub playing_item_playlist_id: Option<String>,
    pub when: chrono::DateTime<chrono::Utc>,
    pub command: CommandKind,
    pub position_ticks: i64,
    pub emitted_at: chrono::DateTime<chrono::Utc>,
}

/// A message addressed to an audience, ready for fan-out
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Update(GroupUpdate),
    Command(SyncPlayCommand),
}

/// An outbound message paired with its audience and the originating session
/// (needed to resolve `CurrentSession`/`AllExceptCurrentSession`)
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from_session: Uuid,
    pub audience: BroadcastAudience,
    pub message: OutboundMessage,
}
