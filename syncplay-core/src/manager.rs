//! Group registry and top-level session operations (spec §4.3, §5)
//!
//! Grounded on `wkmp-ap::state::SharedState`'s role as the single owner of
//! mutable shared state behind a lock, generalized here to two maps (groups,
//! session membership) guarded independently so that per-group work never
//! blocks unrelated groups.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use syncplay_common::time::Clock;

use crate::dispatch::MessageSink;
use crate::error::SyncPlayError;
use crate::group::state::Visibility;
use crate::group::GroupController;
use crate::messages::{BroadcastAudience, Envelope, GroupUpdateKind};
use crate::requests::Request;
use crate::session::{SessionDirectory, UserCatalog};

struct ManagerState {
    groups: HashMap<Uuid, Arc<Mutex<GroupController>>>,
    session_groups: HashMap<Uuid, Uuid>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            groups: HashMap::new(),
            session_groups: HashMap::new(),
        }
    }
}

/// A snapshot of a group's addressable info, for `ListGroups` (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupInfo {
    pub group_id: Uuid,
    pub name: String,
    pub visibility: Visibility,
    pub member_count: usize,
}

/// Parameters for `NewGroup` (spec §4.3).
pub struct NewGroupRequest {
    pub name: String,
    pub visibility: Visibility,
    pub invited_users: Vec<Uuid>,
    pub open_playback_access: Option<bool>,
    pub open_playlist_access: Option<bool>,
    /// If the session was already playing media, its now-playing queue/position
    /// seeds the new group's Waiting state (spec §4.3).
    pub now_playing: Option<NowPlaying>,
}

pub struct NowPlaying {
    pub queue: Vec<Uuid>,
    pub position_index: usize,
    pub position_ticks: i64,
    pub is_paused: bool,
}

/// The only externally-reachable accessor for a locked `GroupController`
/// (spec §9: "not thread-safe; external lock required" made structural).
/// Owns its `Arc` clone rather than borrowing the manager, so it carries no
/// lifetime tied to the map lock that resolved it.
pub struct GroupHandle {
    guard: tokio::sync::OwnedMutexGuard<GroupController>,
}

impl std::ops::Deref for GroupHandle {
    type Target = GroupController;
    fn deref(&self) -> &GroupController {
        &self.guard
    }
}

impl std::ops::DerefMut for GroupHandle {
    fn deref_mut(&mut self) -> &mut GroupController {
        &mut self.guard
    }
}

/// Registry of groups and the session → group membership index (spec §4.3).
pub struct SyncPlayManager {
    state: RwLock<ManagerState>,
    sink: Arc<dyn MessageSink>,
    catalog: Arc<dyn UserCatalog>,
    directory: Arc<dyn SessionDirectory>,
    clock: Arc<dyn Clock>,
    time_sync_offset_ms: i64,
    max_playback_offset_ms: i64,
    sweep_grace: Duration,
}

impl SyncPlayManager {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        catalog: Arc<dyn UserCatalog>,
        directory: Arc<dyn SessionDirectory>,
        clock: Arc<dyn Clock>,
        time_sync_offset_ms: i64,
        max_playback_offset_ms: i64,
        sweep_grace: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(ManagerState::new()),
            sink,
            catalog,
            directory,
            clock,
            time_sync_offset_ms,
            max_playback_offset_ms,
            sweep_grace,
        }
    }

    async fn group_for_session(&self, session_id: Uuid) -> Option<Arc<Mutex<GroupController>>> {
        let state = self.state.read().await;
        let group_id = *state.session_groups.get(&session_id)?;
        state.groups.get(&group_id).cloned()
    }

    /// Acquires the lock for the group a session belongs to, if any. Resolves
    /// the `Arc` under the manager's map lock (dropped immediately after),
    /// then locks the group itself — manager-lock-then-group-lock, never held
    /// concurrently.
    pub async fn group_handle(&self, session_id: Uuid) -> Option<GroupHandle> {
        let arc = self.group_for_session(session_id).await?;
        let guard = arc.lock_owned().await;
        Some(GroupHandle { guard })
    }

    pub async fn new_group(
        &self,
        session_id: Uuid,
        req: NewGroupRequest,
    ) -> Result<Uuid, SyncPlayError> {
        {
            let state = self.state.read().await;
            if state.session_groups.contains_key(&session_id) {
                return Err(SyncPlayError::AlreadyInGroup);
            }
        }
        let user_id = self
            .directory
            .user_for_session(session_id)
            .await
            .ok_or(SyncPlayError::NotInGroup)?;
        if !self.directory.has_syncplay_access(user_id).await {
            return Err(SyncPlayError::CreateDenied);
        }
        if let Some(now_playing) = &req.now_playing {
            if !self
                .catalog
                .can_access_all(user_id, &now_playing.queue)
                .await
            {
                return Err(SyncPlayError::LibraryAccessDenied);
            }
        }

        let group_id = Uuid::new_v4();
        let mut controller = GroupController::new(
            group_id,
            req.name,
            req.visibility,
            session_id,
            user_id,
            self.catalog.clone(),
            self.clock.clone(),
            self.time_sync_offset_ms,
            self.max_playback_offset_ms,
        );
        controller.invited_users.extend(req.invited_users);
        controller.access_list.set_open_access(
            req.open_playback_access.unwrap_or(true),
            req.open_playlist_access.unwrap_or(false),
        );

        let mut envelopes = Vec::new();
        if let Some(now_playing) = req.now_playing {
            if controller.set_play_queue(now_playing.queue).await.is_ok() {
                let _ = controller
                    .set_playing_item_by_index(now_playing.position_index)
                    .await;
                controller.position_ticks =
                    controller.sanitize_position_ticks(now_playing.position_ticks);
                controller.set_all_buffering(true);
                controller.state = crate::group::state::GroupStateKind::Waiting {
                    resume_playing: !now_playing.is_paused,
                };
            }
        }
        envelopes.push(controller.compose_update(
            session_id,
            BroadcastAudience::CurrentSession,
            GroupUpdateKind::GroupJoined,
            serde_json::json!({ "groupId": group_id }),
        ));
        let members = controller.session_ids();

        {
            let mut state = self.state.write().await;
            state
                .groups
                .insert(group_id, Arc::new(Mutex::new(controller)));
            state.session_groups.insert(session_id, group_id);
        }

        for envelope in envelopes {
            self.sink.dispatch(envelope, &members).await;
        }
        info!(%group_id, %session_id, "group created");
        Ok(group_id)
    }

    pub async fn join_group(&self, session_id: Uuid, group_id: Uuid) -> Result<(), SyncPlayError> {
        {
            let state = self.state.read().await;
            if let Some(&current) = state.session_groups.get(&session_id) {
                if current == group_id {
                    // Session-restore: rebind without re-running join-acceptance
                    // or resetting the state machine (SPEC_FULL.md §9 decision 1).
                    return Ok(());
                }
            }
        }
        self.leave_group(session_id).await;

        let arc = {
            let state = self.state.read().await;
            state.groups.get(&group_id).cloned()
        }
        .ok_or(SyncPlayError::GroupNotFound(group_id))?;

        let user_id = self
            .directory
            .user_for_session(session_id)
            .await
            .ok_or(SyncPlayError::NotInGroup)?;

        let (envelope, members) = {
            let mut controller = arc.lock().await;
            if !self.join_allowed(&controller, user_id) {
                return Err(SyncPlayError::JoinDenied);
            }
            controller.add_session(session_id, user_id);
            let members = controller.session_ids();
            let envelope = controller.compose_update(
                session_id,
                BroadcastAudience::AllGroup,
                GroupUpdateKind::UserJoined,
                serde_json::json!({ "sessionId": session_id, "userId": user_id }),
            );
            (envelope, members)
        };

        {
            let mut state = self.state.write().await;
            state.session_groups.insert(session_id, group_id);
        }
        self.sink.dispatch(envelope, &members).await;
        Ok(())
    }

    fn join_allowed(&self, controller: &GroupController, user_id: Uuid) -> bool {
        match controller.visibility {
            Visibility::Public => true,
            Visibility::InviteOnly => {
                controller.invited_users.contains(&user_id) || controller.access_list.is_administrator(user_id)
            }
            Visibility::Private => controller.access_list.is_administrator(user_id),
        }
    }

    pub async fn leave_group(&self, session_id: Uuid) {
        let group_id = {
            let mut state = self.state.write().await;
            match state.session_groups.remove(&session_id) {
                Some(id) => id,
                None => return,
            }
        };
        let arc = {
            let state = self.state.read().await;
            state.groups.get(&group_id).cloned()
        };
        let Some(arc) = arc else { return };

        let (envelope, members, now_empty) = {
            let mut controller = arc.lock().await;
            controller.remove_session(session_id);
            let members = controller.session_ids();
            let envelope = controller.compose_update(
                session_id,
                BroadcastAudience::AllGroup,
                GroupUpdateKind::UserLeft,
                serde_json::json!({ "sessionId": session_id }),
            );
            (envelope, members, controller.is_empty())
        };
        self.sink.dispatch(envelope, &members).await;

        if now_empty && self.sweep_grace <= Duration::zero() {
            let mut state = self.state.write().await;
            state.groups.remove(&group_id);
        }
    }

    /// `access_list_updates` carries per-user playback/playlist permission
    /// overrides (spec §6 `/SyncPlay/Settings`'s `accessListUserIds[]` /
    /// `accessListPlayback[]` / `accessListPlaylist[]` triple), applied after
    /// the open-access defaults so an explicit entry always wins.
    pub async fn update_group_settings(
        &self,
        session_id: Uuid,
        name: Option<String>,
        visibility: Option<Visibility>,
        open_playback_access: Option<bool>,
        open_playlist_access: Option<bool>,
        access_list_updates: Vec<(Uuid, bool, bool)>,
    ) -> Result<(), SyncPlayError> {
        let arc = self
            .group_for_session(session_id)
            .await
            .ok_or(SyncPlayError::NotInGroup)?;
        let (envelope, members) = {
            let mut controller = arc.lock().await;
            let user_id = self
                .directory
                .user_for_session(session_id)
                .await
                .ok_or(SyncPlayError::NotInGroup)?;
            if !controller.access_list.is_administrator(user_id) {
                return Err(SyncPlayError::Forbidden);
            }
            if let Some(name) = name {
                controller.name = name;
            }
            if let Some(visibility) = visibility {
                controller.visibility = visibility;
            }
            let playback = open_playback_access.unwrap_or(controller.access_list.open_playback_access());
            let playlist = open_playlist_access.unwrap_or(controller.access_list.open_playlist_access());
            controller.access_list.set_open_access(playback, playlist);
            for (target_user, user_playback, user_playlist) in access_list_updates {
                controller
                    .access_list
                    .set_permissions(target_user, user_playback, user_playlist);
            }
            let members = controller.session_ids();
            let envelope = controller.compose_update(
                session_id,
                BroadcastAudience::AllGroup,
                GroupUpdateKind::GroupUpdate,
                serde_json::json!({ "name": controller.name }),
            );
            (envelope, members)
        };
        self.sink.dispatch(envelope, &members).await;
        Ok(())
    }

    /// `ListGroups` (spec §4.3): visible to a session means the session's user
    /// *could* join it, not that they already have — `Private`/un-invited
    /// `InviteOnly` groups never appear for a user who isn't its administrator
    /// or invitee. A session with no resolvable user still sees `Public` groups.
    pub async fn list_groups(&self, session_id: Uuid) -> Vec<GroupInfo> {
        let user_id = self
            .directory
            .user_for_session(session_id)
            .await
            .unwrap_or_else(Uuid::nil);
        let state = self.state.read().await;
        let mut infos = Vec::new();
        for (id, arc) in state.groups.iter() {
            let controller = arc.lock().await;
            if !self.join_allowed(&controller, user_id) {
                continue;
            }
            infos.push(GroupInfo {
                group_id: *id,
                name: controller.name.clone(),
                visibility: controller.visibility,
                member_count: controller.session_ids().len(),
            });
        }
        infos
    }

    pub async fn list_available_users(&self) -> Vec<Uuid> {
        let mut users = Vec::new();
        for user_id in self.directory.connected_users().await {
            if self.directory.has_syncplay_access(user_id).await {
                users.push(user_id);
            }
        }
        users
    }

    pub async fn handle_request(&self, session_id: Uuid, request: Request) {
        let Some(arc) = self.group_for_session(session_id).await else {
            warn!(%session_id, "request dropped: session not in a group");
            return;
        };
        let (envelopes, members) = {
            let mut controller = arc.lock().await;
            let envelopes = controller.handle_request(session_id, request).await;
            (envelopes, controller.session_ids())
        };
        for envelope in envelopes {
            self.sink.dispatch(envelope, &members).await;
        }
    }

    pub async fn handle_webrtc(&self, session_id: Uuid, to: Option<Uuid>, payload: serde_json::Value) {
        let Some(arc) = self.group_for_session(session_id).await else {
            return;
        };
        let (envelopes, members) = {
            let controller = arc.lock().await;
            let envelopes = controller.relay_webrtc(session_id, to, payload);
            (envelopes, controller.session_ids())
        };
        for envelope in envelopes {
            self.sink.dispatch(envelope, &members).await;
        }
    }

    /// Dispatches a pre-composed envelope (used for `Ping`'s lack of a
    /// response and for tests); most call sites go through `handle_request`.
    pub async fn dispatch(&self, envelope: Envelope, group_id: Uuid) {
        let state = self.state.read().await;
        if let Some(arc) = state.groups.get(&group_id) {
            let members = arc.lock().await.session_ids();
            drop(state);
            self.sink.dispatch(envelope, &members).await;
        }
    }

    /// Background sweep removing groups empty for at least `sweep_grace`
    /// (spec §5). Intended to run in a loop via `tokio::time::interval`.
    pub async fn sweep_empty_groups(&self) {
        let mut to_remove = Vec::new();
        {
            let state = self.state.read().await;
            for (id, arc) in state.groups.iter() {
                let controller = arc.lock().await;
                if controller.is_empty() && controller.eligible_for_sweep(self.sweep_grace) {
                    to_remove.push(*id);
                }
            }
        }
        if to_remove.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        for id in to_remove {
            state.groups.remove(&id);
            info!(group_id = %id, "swept empty group");
        }
    }

    pub async fn run_sweeper(self: Arc<Self>, period: std::time::Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            self.sweep_empty_groups().await;
        }
    }
}
