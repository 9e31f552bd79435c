//! Per-user playback/playlist permission map (spec §4.2)

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::requests::RequestPermission;

/// A resolved {playback, playlist} permission pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub playback: bool,
    pub playlist: bool,
}

/// Per-group permission map (spec §3, §4.2)
#[derive(Debug, Clone)]
pub struct AccessList {
    administrators: HashSet<Uuid>,
    permissions: HashMap<Uuid, Permissions>,
    open_playback_access: bool,
    open_playlist_access: bool,
}

impl AccessList {
    /// `open_playback`/`open_playlist` are the defaults for users with no
    /// explicit entry (SPEC_FULL.md §3: playback=true, playlist=false at
    /// group creation).
    pub fn new(open_playback: bool, open_playlist: bool) -> Self {
        Self {
            administrators: HashSet::new(),
            permissions: HashMap::new(),
            open_playback_access: open_playback,
            open_playlist_access: open_playlist,
        }
    }

    pub fn add_administrator(&mut self, user_id: Uuid) {
        self.administrators.insert(user_id);
    }

    pub fn remove_administrator(&mut self, user_id: Uuid) {
        self.administrators.remove(&user_id);
    }

    pub fn is_administrator(&self, user_id: Uuid) -> bool {
        self.administrators.contains(&user_id)
    }

    pub fn administrator_count(&self) -> usize {
        self.administrators.len()
    }

    pub fn open_playback_access(&self) -> bool {
        self.open_playback_access
    }

    pub fn open_playlist_access(&self) -> bool {
        self.open_playlist_access
    }

    pub fn set_open_access(&mut self, playback: bool, playlist: bool) {
        self.open_playback_access = playback;
        self.open_playlist_access = playlist;
    }

    /// Ensures a map entry exists for a user who has joined at least once,
    /// materializing the current open defaults.
    pub fn touch_permissions(&mut self, user_id: Uuid) {
        self.permissions.entry(user_id).or_insert(Permissions {
            playback: self.open_playback_access,
            playlist: self.open_playlist_access,
        });
    }

    pub fn set_permissions(&mut self, user_id: Uuid, playback: bool, playlist: bool) {
        self.permissions
            .insert(user_id, Permissions { playback, playlist });
    }

    /// Drops the explicit entry; the user reverts to open defaults on next touch.
    pub fn clear_permissions(&mut self, user_id: Uuid) {
        self.permissions.remove(&user_id);
    }

    /// The user's effective permissions: their entry when present, else the
    /// open defaults (spec §4.2).
    pub fn effective_permissions(&self, user_id: Uuid) -> Permissions {
        self.permissions.get(&user_id).copied().unwrap_or(Permissions {
            playback: self.open_playback_access,
            playlist: self.open_playlist_access,
        })
    }

    /// Authorizes `user_id` for a request requiring `permission`.
    /// Administrators always pass (spec §4.2).
    pub fn check_request(&self, user_id: Uuid, permission: RequestPermission) -> bool {
        if self.is_administrator(user_id) {
            return true;
        }
        match permission {
            RequestPermission::None => true,
            RequestPermission::Playback => self.effective_permissions(user_id).playback,
            RequestPermission::Playlist => self.effective_permissions(user_id).playlist,
        }
    }
}
