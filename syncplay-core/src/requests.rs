//! Inbound request vocabulary (spec §4.4)
//!
//! Every request is dispatched to the current `GroupState`'s handler, which
//! decides the transition. `Ping` is the one exception: it never reaches a
//! state handler, the controller answers it directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::{RepeatMode, ShuffleMode};

/// Permission class a request is authorized against (spec §4.4 table)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPermission {
    Playback,
    Playlist,
    /// `Ping` needs no permission; handled by the controller directly
    None,
}

/// A request submitted by a session to its group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Request {
    Play {
        playing_queue: Vec<Uuid>,
        playing_item_position: usize,
        start_position_ticks: i64,
    },
    Pause,
    Unpause,
    Stop,
    Seek {
        position_ticks: i64,
    },
    Buffering {
        when: chrono::DateTime<chrono::Utc>,
        position_ticks: i64,
        is_playing: bool,
        playlist_item_id: String,
        buffering_done: bool,
    },
    Ready {
        when: chrono::DateTime<chrono::Utc>,
        position_ticks: i64,
        is_playing: bool,
        playlist_item_id: String,
    },
    SetIgnoreWait {
        ignore_wait: bool,
    },
    NextTrack {
        playlist_item_id: String,
    },
    PreviousTrack {
        playlist_item_id: String,
    },
    SetPlaylistItem {
        playlist_item_id: String,
    },
    Queue {
        item_ids: Vec<Uuid>,
        mode: QueueMode,
    },
    RemoveFromPlaylist {
        playlist_item_ids: Vec<String>,
    },
    MovePlaylistItem {
        playlist_item_id: String,
        new_index: usize,
    },
    SetRepeatMode {
        mode: RepeatMode,
    },
    SetShuffleMode {
        mode: ShuffleMode,
    },
    Ping {
        ping_ms: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueMode {
    Queue,
    QueueNext,
}

impl Request {
    /// Required permission class per spec §4.4
    pub fn required_permission(&self) -> RequestPermission {
        use Request::*;
        match self {
            Play { .. }
            | Pause
            | Unpause
            | Stop
            | Seek { .. }
            | Buffering { .. }
            | Ready { .. }
            | SetIgnoreWait { .. }
            | NextTrack { .. }
            | PreviousTrack { .. } => RequestPermission::Playback,

            SetPlaylistItem { .. }
            | Queue { .. }
            | RemoveFromPlaylist { .. }
            | MovePlaylistItem { .. }
            | SetRepeatMode { .. }
            | SetShuffleMode { .. } => RequestPermission::Playlist,

            Ping { .. } => RequestPermission::None,
        }
    }
}
