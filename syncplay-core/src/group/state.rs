//! Group state tag and visibility (spec §3, §4.6)
//!
//! The transition table itself lives on `GroupController` as one `handle_request`
//! entry point dispatching to a private per-state method — a tagged variant
//! plus a single operation in place of an interface-per-state hierarchy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    InviteOnly,
    Private,
}

/// A group's current phase. `Waiting` carries the pending decision of whether
/// to resume playing once every non-ignored member reports ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStateKind {
    Idle,
    Waiting { resume_playing: bool },
    Playing,
    Paused,
}

impl GroupStateKind {
    pub fn label(&self) -> &'static str {
        match self {
            GroupStateKind::Idle => "Idle",
            GroupStateKind::Waiting { .. } => "Waiting",
            GroupStateKind::Playing => "Playing",
            GroupStateKind::Paused => "Paused",
        }
    }
}
