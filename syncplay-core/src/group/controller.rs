//! Owns a single group's members, access list, queue, and state, and executes
//! the transition table of spec §4.6 (grounded on `wkmp-ap::state::SharedState`'s
//! role as the single owner of mutable playback state behind one lock).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use syncplay_common::ticks;
use syncplay_common::time::Clock;

use crate::access::AccessList;
use crate::error::SyncPlayError;
use crate::group::state::{GroupStateKind, Visibility};
use crate::member::GroupMember;
use crate::messages::{
    BroadcastAudience, CommandKind, Envelope, GroupUpdate, GroupUpdateKind, OutboundMessage,
    SyncPlayCommand,
};
use crate::queue::{PlayQueue, RepeatMode, ShuffleMode};
use crate::requests::{QueueMode, Request};
use crate::session::UserCatalog;

/// A group's addressable identity and membership, independent of its playback state.
pub struct GroupController {
    pub group_id: Uuid,
    pub name: String,
    pub visibility: Visibility,
    pub invited_users: std::collections::HashSet<Uuid>,
    pub access_list: AccessList,
    pub queue: PlayQueue,
    pub run_time_ticks: i64,
    pub position_ticks: i64,
    pub last_activity: DateTime<Utc>,
    pub state: GroupStateKind,
    members: Vec<GroupMember>,
    empty_since: Option<DateTime<Utc>>,
    catalog: Arc<dyn UserCatalog>,
    clock: Arc<dyn Clock>,
    time_sync_offset_ms: i64,
    max_playback_offset_ms: i64,
}

impl GroupController {
    pub fn new(
        group_id: Uuid,
        name: String,
        visibility: Visibility,
        creator_session: Uuid,
        creator_user: Uuid,
        catalog: Arc<dyn UserCatalog>,
        clock: Arc<dyn Clock>,
        time_sync_offset_ms: i64,
        max_playback_offset_ms: i64,
    ) -> Self {
        let mut access_list = AccessList::new(true, false);
        access_list.add_administrator(creator_user);
        access_list.touch_permissions(creator_user);
        let now = clock.now();
        Self {
            group_id,
            name,
            visibility,
            invited_users: std::collections::HashSet::new(),
            access_list,
            queue: PlayQueue::new(),
            run_time_ticks: 0,
            position_ticks: 0,
            last_activity: now,
            state: GroupStateKind::Idle,
            members: vec![GroupMember::new(creator_session, creator_user)],
            empty_since: None,
            catalog,
            clock,
            time_sync_offset_ms,
            max_playback_offset_ms,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- membership -----------------------------------------------------

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|m| m.session_id).collect()
    }

    pub fn member(&self, session_id: Uuid) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.session_id == session_id)
    }

    pub fn is_member(&self, session_id: Uuid) -> bool {
        self.member(session_id).is_some()
    }

    pub fn add_session(&mut self, session_id: Uuid, user_id: Uuid) {
        if self.is_member(session_id) {
            return;
        }
        self.access_list.touch_permissions(user_id);
        self.members.push(GroupMember::new(session_id, user_id));
        self.empty_since = None;
    }

    /// Removes a session, returning the departing member's user id if it was present.
    pub fn remove_session(&mut self, session_id: Uuid) -> Option<Uuid> {
        let idx = self.members.iter().position(|m| m.session_id == session_id)?;
        let user_id = self.members.remove(idx).user_id;
        if self.members.is_empty() {
            self.empty_since = Some(self.now());
        }
        Some(user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the group has been empty at least `grace` (spec §5 background sweep).
    pub fn eligible_for_sweep(&self, grace: chrono::Duration) -> bool {
        match self.empty_since {
            Some(since) => self.now() - since >= grace,
            None => false,
        }
    }

    // ---- buffering / ping -------------------------------------------------

    pub fn set_buffering(&mut self, session_id: Uuid, buffering: bool) -> bool {
        if let Some(m) = self.members.iter_mut().find(|m| m.session_id == session_id) {
            m.is_buffering = buffering;
            true
        } else {
            false
        }
    }

    pub fn set_all_buffering(&mut self, buffering: bool) {
        for m in self.members.iter_mut() {
            m.is_buffering = buffering;
        }
    }

    /// True iff any member that doesn't ignore-wait is still buffering.
    pub fn is_buffering(&self) -> bool {
        self.members.iter().any(|m| m.blocks_readiness())
    }

    pub fn set_ignore_wait(&mut self, session_id: Uuid, ignore_wait: bool) {
        if let Some(m) = self.members.iter_mut().find(|m| m.session_id == session_id) {
            m.ignore_wait = ignore_wait;
        }
    }

    pub fn update_ping(&mut self, session_id: Uuid, ping_ms: f64) {
        if let Some(m) = self.members.iter_mut().find(|m| m.session_id == session_id) {
            m.ping_ms = ping_ms;
        }
    }

    pub fn highest_ping(&self) -> f64 {
        self.members.iter().map(|m| m.ping_ms).fold(0.0, f64::max)
    }

    // ---- position / time --------------------------------------------------

    pub fn sanitize_position_ticks(&self, position_ticks: i64) -> i64 {
        ticks::clamp_ticks(position_ticks, self.run_time_ticks)
    }

    /// Clamps a client-reported timestamp to `now` if it deviates from server
    /// time by more than `time_sync_offset_ms` (spec §4.6 tie-breaks).
    pub fn sanitize_reported_time(&self, reported: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.now();
        let offset = chrono::Duration::milliseconds(self.time_sync_offset_ms);
        if reported < now - offset || reported > now + offset {
            now
        } else {
            reported
        }
    }

    /// Clamps a client-reported position to within `max_playback_offset_ms`
    /// of the server's current tracked position, then into the valid range
    /// for the playing item (spec Glossary: "max playback offset"). A report
    /// that drifts further than tolerance is corrective rather than
    /// authoritative — the client is almost certainly stale or mis-seeking.
    pub fn sanitize_reported_position(&self, reported_ticks: i64) -> i64 {
        let tolerance_ticks = ticks::ms_to_ticks(self.max_playback_offset_ms);
        let clamped = reported_ticks.clamp(
            self.position_ticks.saturating_sub(tolerance_ticks),
            self.position_ticks.saturating_add(tolerance_ticks),
        );
        self.sanitize_position_ticks(clamped)
    }

    fn restart_current_item(&mut self) {
        self.position_ticks = 0;
        self.last_activity = self.now();
    }

    async fn refresh_run_time_ticks(&mut self) {
        self.run_time_ticks = match self.queue.playing_item() {
            Some(item) => self.catalog.runtime_ticks(item.item_id).await.unwrap_or(0),
            None => 0,
        };
    }

    async fn queue_access_ok(&self, item_ids: &[Uuid]) -> bool {
        for member in &self.members {
            if !self.catalog.can_access_all(member.user_id, item_ids).await {
                return false;
            }
        }
        true
    }

    // ---- queue mutation (spec §4.5) ---------------------------------------

    pub async fn set_play_queue(&mut self, item_ids: Vec<Uuid>) -> Result<(), SyncPlayError> {
        if !self.queue_access_ok(&item_ids).await {
            return Err(SyncPlayError::LibraryAccessDenied);
        }
        let now = self.now();
        self.queue.set_playlist(item_ids, now);
        self.refresh_run_time_ticks().await;
        self.restart_current_item();
        Ok(())
    }

    async fn set_playing_item_checked(
        &mut self,
        apply: impl FnOnce(&mut PlayQueue) -> bool,
    ) -> Result<(), SyncPlayError> {
        let previous = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
        if !apply(&mut self.queue) {
            return Err(SyncPlayError::InvalidRequest("unknown playlist item".into()));
        }
        if let Some(item) = self.queue.playing_item() {
            if !self.queue_access_ok(&[item.item_id]).await {
                if let Some(pid) = previous {
                    self.queue.set_playing_item_by_playlist_id(&pid);
                }
                return Err(SyncPlayError::LibraryAccessDenied);
            }
        }
        self.refresh_run_time_ticks().await;
        self.restart_current_item();
        Ok(())
    }

    pub async fn set_playing_item_by_index(&mut self, index: usize) -> Result<(), SyncPlayError> {
        self.set_playing_item_checked(|q| q.set_playing_item_by_index(index))
            .await
    }

    pub async fn set_playing_item_by_playlist_id(
        &mut self,
        playlist_item_id: &str,
    ) -> Result<(), SyncPlayError> {
        let pid = playlist_item_id.to_string();
        self.set_playing_item_checked(move |q| q.set_playing_item_by_playlist_id(&pid))
            .await
    }

    pub async fn add_to_play_queue(
        &mut self,
        item_ids: Vec<Uuid>,
        mode: QueueMode,
    ) -> Result<(), SyncPlayError> {
        if !self.queue_access_ok(&item_ids).await {
            return Err(SyncPlayError::LibraryAccessDenied);
        }
        let had_playing = self.queue.playing_item().is_some();
        let now = self.now();
        match mode {
            QueueMode::Queue => self.queue.queue(item_ids, now),
            QueueMode::QueueNext => self.queue.queue_next(item_ids, now),
        };
        if !had_playing && !self.queue.is_empty() {
            self.queue.set_playing_item_by_index(0);
            self.refresh_run_time_ticks().await;
            self.restart_current_item();
        }
        Ok(())
    }

    /// Removes items, returning whether the currently playing item was among them.
    pub async fn remove_from_play_queue(&mut self, playlist_item_ids: &[String]) -> bool {
        let before = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
        let now = self.now();
        self.queue.remove_from_playlist(playlist_item_ids, now);
        let current_removed = before
            .as_deref()
            .map(|pid| playlist_item_ids.iter().any(|p| p == pid))
            .unwrap_or(false);
        if current_removed {
            self.refresh_run_time_ticks().await;
            self.restart_current_item();
        }
        current_removed
    }

    pub fn move_item_in_play_queue(&mut self, playlist_item_id: &str, new_index: usize) -> bool {
        let now = self.now();
        self.queue.move_playlist_item(playlist_item_id, new_index, now)
    }

    /// Advances per repeat mode, returning `Ok(true)` if it moved to a new
    /// item, `Ok(false)` if the queue ended under `RepeatNone`.
    pub async fn next_item_in_queue(&mut self) -> Result<bool, SyncPlayError> {
        let previous = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
        let now = self.now();
        if !self.queue.advance_next(now) {
            return Ok(false);
        }
        if let Some(item) = self.queue.playing_item() {
            if !self.queue_access_ok(&[item.item_id]).await {
                if let Some(pid) = previous {
                    self.queue.set_playing_item_by_playlist_id(&pid);
                }
                return Err(SyncPlayError::LibraryAccessDenied);
            }
        }
        self.refresh_run_time_ticks().await;
        self.restart_current_item();
        Ok(true)
    }

    pub async fn previous_item_in_queue(&mut self) -> Result<bool, SyncPlayError> {
        let previous = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
        let now = self.now();
        if !self.queue.advance_previous(now) {
            return Ok(false);
        }
        if let Some(item) = self.queue.playing_item() {
            if !self.queue_access_ok(&[item.item_id]).await {
                if let Some(pid) = previous {
                    self.queue.set_playing_item_by_playlist_id(&pid);
                }
                return Err(SyncPlayError::LibraryAccessDenied);
            }
        }
        self.refresh_run_time_ticks().await;
        self.restart_current_item();
        Ok(true)
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        let now = self.now();
        self.queue.set_repeat_mode(mode, now);
    }

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        let now = self.now();
        self.queue.set_shuffle_mode(mode, now);
    }

    // ---- outbound message composition (spec §4.5) -------------------------

    pub fn compose_update(
        &self,
        from: Uuid,
        audience: BroadcastAudience,
        kind: GroupUpdateKind,
        payload: serde_json::Value,
    ) -> Envelope {
        Envelope {
            from_session: from,
            audience,
            message: OutboundMessage::Update(GroupUpdate::new(self.group_id, kind, payload)),
        }
    }

    pub fn compose_error(&self, from: Uuid, error: &SyncPlayError) -> Envelope {
        let payload = serde_json::json!({ "error": error.to_string() });
        self.compose_update(from, BroadcastAudience::CurrentSession, error.update_kind(), payload)
    }

    /// `NewSyncPlayCommand` (spec §4.5): carries group-id, current playing
    /// playlist-item-id, `LastActivity`, command type, position, emittedAt.
    pub fn compose_command(
        &self,
        from: Uuid,
        audience: BroadcastAudience,
        command: CommandKind,
    ) -> Envelope {
        let cmd = SyncPlayCommand {
            group_id: self.group_id,
            playing_item_playlist_id: self.queue.playing_item().map(|i| i.playlist_item_id.clone()),
            when: self.last_activity,
            command,
            position_ticks: self.position_ticks,
            emitted_at: self.now(),
        };
        Envelope {
            from_session: from,
            audience,
            message: OutboundMessage::Command(cmd),
        }
    }

    fn playlist_snapshot(&self) -> serde_json::Value {
        let items: Vec<serde_json::Value> = self
            .queue
            .ordered_items()
            .iter()
            .map(|i| serde_json::json!({ "playlistItemId": i.playlist_item_id, "itemId": i.item_id }))
            .collect();
        serde_json::json!({
            "items": items,
            "changeVersion": self.queue.change_version(),
            "lastChange": self.queue.last_change(),
        })
    }

    // ---- request dispatch (spec §4.4, §4.6) -------------------------------

    /// Single entry point dispatching to the current state's handler.
    pub async fn handle_request(&mut self, from: Uuid, request: Request) -> Vec<Envelope> {
        if let Request::Ping { ping_ms } = request {
            self.update_ping(from, ping_ms);
            return Vec::new();
        }
        let Some(user_id) = self.member(from).map(|m| m.user_id) else {
            return vec![self.compose_error(from, &SyncPlayError::NotInGroup)];
        };
        if !self.access_list.check_request(user_id, request.required_permission()) {
            return vec![self.compose_error(from, &SyncPlayError::Forbidden)];
        }
        debug!(group = %self.group_id, state = self.state.label(), "handling request");
        match self.state {
            GroupStateKind::Idle => self.handle_idle(from, request).await,
            GroupStateKind::Waiting { resume_playing } => {
                self.handle_waiting(from, request, resume_playing).await
            }
            GroupStateKind::Playing => self.handle_playing(from, request).await,
            GroupStateKind::Paused => self.handle_paused(from, request).await,
        }
    }

    async fn handle_idle(&mut self, from: Uuid, request: Request) -> Vec<Envelope> {
        match request {
            Request::Play {
                playing_queue,
                playing_item_position,
                start_position_ticks,
            } => match self.set_play_queue(playing_queue).await {
                Ok(()) => {
                    let _ = self.set_playing_item_by_index(playing_item_position).await;
                    self.position_ticks = self.sanitize_position_ticks(start_position_ticks);
                    self.set_all_buffering(true);
                    self.state = GroupStateKind::Waiting { resume_playing: true };
                    vec![self.compose_update(
                        from,
                        BroadcastAudience::AllGroup,
                        GroupUpdateKind::StateUpdate,
                        self.playlist_snapshot(),
                    )]
                }
                Err(err) => vec![self.compose_error(from, &err)],
            },
            other => self.handle_common_queue_edits(from, other).await,
        }
    }

    async fn handle_waiting(
        &mut self,
        from: Uuid,
        request: Request,
        resume_playing: bool,
    ) -> Vec<Envelope> {
        match request {
            Request::Ready {
                when,
                position_ticks,
                is_playing: _,
                playlist_item_id,
            } => {
                let current_pid = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
                if current_pid.as_deref() != Some(playlist_item_id.as_str()) {
                    return vec![self.corrective_set_playlist_item(from)];
                }
                self.set_buffering(from, false);
                let sanitized_when = self.sanitize_reported_time(when);
                self.position_ticks = self.sanitize_reported_position(position_ticks);

                if !self.is_buffering() {
                    let highest_ping_ms = self.highest_ping();
                    let candidate = sanitized_when
                        + chrono::Duration::milliseconds(self.time_sync_offset_ms)
                        + chrono::Duration::milliseconds(highest_ping_ms.round() as i64);
                    let ready_time = candidate.max(self.now());
                    self.last_activity = ready_time;
                    self.state = if resume_playing {
                        GroupStateKind::Playing
                    } else {
                        GroupStateKind::Paused
                    };
                    let command = if resume_playing {
                        CommandKind::Unpause
                    } else {
                        CommandKind::Pause
                    };
                    return vec![self.compose_command(from, BroadcastAudience::AllReady, command)];
                }
                Vec::new()
            }
            Request::Buffering {
                playlist_item_id, ..
            } => {
                self.set_buffering(from, true);
                let current_pid = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
                if current_pid.as_deref() != Some(playlist_item_id.as_str()) {
                    return vec![self.corrective_set_playlist_item(from)];
                }
                vec![self.compose_update(
                    from,
                    BroadcastAudience::CurrentSession,
                    GroupUpdateKind::StateUpdate,
                    self.playlist_snapshot(),
                )]
            }
            Request::Pause => {
                self.state = GroupStateKind::Waiting {
                    resume_playing: false,
                };
                vec![self.compose_command(from, BroadcastAudience::AllGroup, CommandKind::Pause)]
            }
            Request::Stop => self.transition_to_idle(from),
            Request::SetPlaylistItem { playlist_item_id } => {
                match self.set_playing_item_by_playlist_id(&playlist_item_id).await {
                    Ok(()) => {
                        self.set_all_buffering(true);
                        vec![self.compose_update(
                            from,
                            BroadcastAudience::AllGroup,
                            GroupUpdateKind::StateUpdate,
                            self.playlist_snapshot(),
                        )]
                    }
                    Err(err) => vec![self.compose_error(from, &err)],
                }
            }
            Request::Seek { position_ticks } => {
                self.position_ticks = self.sanitize_position_ticks(position_ticks);
                self.set_all_buffering(true);
                vec![self.compose_command(from, BroadcastAudience::AllGroup, CommandKind::Seek)]
            }
            other => self.handle_common_queue_edits(from, other).await,
        }
    }

    async fn handle_playing(&mut self, from: Uuid, request: Request) -> Vec<Envelope> {
        match request {
            Request::Pause => {
                let elapsed_ticks = ticks::ms_to_ticks(
                    (self.now() - self.last_activity).num_milliseconds(),
                );
                self.position_ticks =
                    self.sanitize_position_ticks(self.position_ticks + elapsed_ticks);
                self.last_activity = self.now();
                self.state = GroupStateKind::Paused;
                vec![self.compose_command(from, BroadcastAudience::AllGroup, CommandKind::Pause)]
            }
            Request::Seek { position_ticks } => {
                self.set_all_buffering(true);
                self.position_ticks = self.sanitize_position_ticks(position_ticks);
                self.state = GroupStateKind::Waiting { resume_playing: true };
                vec![self.compose_command(from, BroadcastAudience::AllGroup, CommandKind::Seek)]
            }
            Request::Buffering {
                position_ticks, ..
            } => {
                self.set_buffering(from, true);
                if self.is_buffering() {
                    self.position_ticks = self.sanitize_reported_position(position_ticks);
                    self.state = GroupStateKind::Waiting { resume_playing: true };
                    vec![self.compose_command(from, BroadcastAudience::AllGroup, CommandKind::Pause)]
                } else {
                    Vec::new()
                }
            }
            Request::NextTrack { playlist_item_id } => {
                let current_pid = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
                if current_pid.as_deref() != Some(playlist_item_id.as_str()) {
                    return vec![self.corrective_set_playlist_item(from)];
                }
                match self.next_item_in_queue().await {
                    Ok(true) => {
                        self.set_all_buffering(true);
                        self.state = GroupStateKind::Waiting { resume_playing: true };
                        vec![self.compose_update(
                            from,
                            BroadcastAudience::AllGroup,
                            GroupUpdateKind::StateUpdate,
                            self.playlist_snapshot(),
                        )]
                    }
                    Ok(false) => self.transition_to_idle(from),
                    Err(err) => vec![self.compose_error(from, &err)],
                }
            }
            Request::PreviousTrack { playlist_item_id } => {
                let current_pid = self.queue.playing_item().map(|i| i.playlist_item_id.clone());
                if current_pid.as_deref() != Some(playlist_item_id.as_str()) {
                    return vec![self.corrective_set_playlist_item(from)];
                }
                match self.previous_item_in_queue().await {
                    Ok(true) => {
                        self.set_all_buffering(true);
                        self.state = GroupStateKind::Waiting { resume_playing: true };
                        vec![self.compose_update(
                            from,
                            BroadcastAudience::AllGroup,
                            GroupUpdateKind::StateUpdate,
                            self.playlist_snapshot(),
                        )]
                    }
                    Ok(false) => Vec::new(),
                    Err(err) => vec![self.compose_error(from, &err)],
                }
            }
            Request::Unpause => {
                vec![self.compose_command(from, BroadcastAudience::CurrentSession, CommandKind::Unpause)]
            }
            other => self.handle_common_queue_edits(from, other).await,
        }
    }

    async fn handle_paused(&mut self, from: Uuid, request: Request) -> Vec<Envelope> {
        match request {
            Request::Unpause => {
                for session in self.session_ids() {
                    if self.member(session).map(|m| !m.is_buffering).unwrap_or(false) {
                        self.set_buffering(session, true);
                    }
                }
                self.state = GroupStateKind::Waiting { resume_playing: true };
                vec![self.compose_update(
                    from,
                    BroadcastAudience::AllGroup,
                    GroupUpdateKind::StateUpdate,
                    self.playlist_snapshot(),
                )]
            }
            Request::Seek { position_ticks } => {
                self.position_ticks = self.sanitize_position_ticks(position_ticks);
                self.state = GroupStateKind::Waiting { resume_playing: false };
                vec![self.compose_command(from, BroadcastAudience::AllGroup, CommandKind::Seek)]
            }
            Request::Stop => self.transition_to_idle(from),
            other => self.handle_common_queue_edits(from, other).await,
        }
    }

    /// Playlist edits valid from any state, per spec §4.4's state-handled
    /// request vocabulary (`SetPlaylistItem`/`Queue`/`RemoveFromPlaylist`/
    /// `MovePlaylistItem`/`SetRepeatMode`/`SetShuffleMode`/`SetIgnoreWait`).
    async fn handle_common_queue_edits(&mut self, from: Uuid, request: Request) -> Vec<Envelope> {
        match request {
            Request::Queue { item_ids, mode } => {
                let result = self.add_to_play_queue(item_ids, mode).await;
                self.dispatch_queue_edit(from, result)
            }
            Request::RemoveFromPlaylist { playlist_item_ids } => {
                let current_removed = self.remove_from_play_queue(&playlist_item_ids).await;
                if current_removed && !matches!(self.state, GroupStateKind::Idle) {
                    if self.queue.playing_item().is_some() {
                        self.set_all_buffering(true);
                        self.state = GroupStateKind::Waiting { resume_playing: true };
                    } else {
                        return self.transition_to_idle(from);
                    }
                }
                vec![self.compose_update(
                    from,
                    BroadcastAudience::AllGroup,
                    GroupUpdateKind::PlayQueue,
                    self.playlist_snapshot(),
                )]
            }
            Request::MovePlaylistItem {
                playlist_item_id,
                new_index,
            } => {
                self.move_item_in_play_queue(&playlist_item_id, new_index);
                vec![self.compose_update(
                    from,
                    BroadcastAudience::AllGroup,
                    GroupUpdateKind::PlayQueue,
                    self.playlist_snapshot(),
                )]
            }
            Request::SetRepeatMode { mode } => {
                self.set_repeat_mode(mode);
                vec![self.compose_update(
                    from,
                    BroadcastAudience::AllGroup,
                    GroupUpdateKind::GroupUpdate,
                    serde_json::json!({ "repeatMode": format!("{mode:?}") }),
                )]
            }
            Request::SetShuffleMode { mode } => {
                self.set_shuffle_mode(mode);
                vec![self.compose_update(
                    from,
                    BroadcastAudience::AllGroup,
                    GroupUpdateKind::PlayQueue,
                    self.playlist_snapshot(),
                )]
            }
            Request::SetIgnoreWait { ignore_wait } => {
                self.set_ignore_wait(from, ignore_wait);
                Vec::new()
            }
            Request::SetPlaylistItem { playlist_item_id } => {
                match self.set_playing_item_by_playlist_id(&playlist_item_id).await {
                    Ok(()) => vec![self.compose_update(
                        from,
                        BroadcastAudience::AllGroup,
                        GroupUpdateKind::StateUpdate,
                        self.playlist_snapshot(),
                    )],
                    Err(err) => vec![self.compose_error(from, &err)],
                }
            }
            _ => {
                // A request not valid in the current state is acknowledged with
                // a corrective state command rather than silently dropped.
                vec![self.corrective_set_playlist_item(from)]
            }
        }
    }

    fn dispatch_queue_edit(&self, from: Uuid, result: Result<(), SyncPlayError>) -> Vec<Envelope> {
        match result {
            Ok(()) => vec![self.compose_update(
                from,
                BroadcastAudience::AllGroup,
                GroupUpdateKind::PlayQueue,
                self.playlist_snapshot(),
            )],
            Err(err) => vec![self.compose_error(from, &err)],
        }
    }

    fn transition_to_idle(&mut self, from: Uuid) -> Vec<Envelope> {
        self.state = GroupStateKind::Idle;
        vec![self.compose_update(
            from,
            BroadcastAudience::AllGroup,
            GroupUpdateKind::StateUpdate,
            serde_json::json!({ "state": "Idle" }),
        )]
    }

    /// A duplicate/stale `Ready` or track-change report for a non-waiting
    /// state (or a playlist-item-id mismatch) gets a corrective state
    /// command, never a dropped request (spec §4.6 tie-breaks).
    fn corrective_set_playlist_item(&self, from: Uuid) -> Envelope {
        self.compose_update(
            from,
            BroadcastAudience::CurrentSession,
            GroupUpdateKind::StateUpdate,
            self.playlist_snapshot(),
        )
    }

    // ---- WebRTC relay (spec §4.5, §4.7) -----------------------------------

    pub fn relay_webrtc(&self, from: Uuid, to: Option<Uuid>, payload: serde_json::Value) -> Vec<Envelope> {
        let members = self.session_ids();
        let envelope_payload = serde_json::json!({ "fromSessionId": from, "payload": payload });
        match to {
            None => vec![self.compose_update(
                from,
                BroadcastAudience::AllExceptCurrentSession,
                GroupUpdateKind::WebRTC,
                envelope_payload,
            )],
            Some(to_session) => {
                let relay = crate::webrtc::WebRtcRelay { to_session, payload: envelope_payload };
                match crate::webrtc::resolve_recipient(&relay, &members) {
                    // `CurrentSession` resolves to `envelope.from_session`; here that
                    // slot names the unicast recipient rather than the sender, since
                    // WebRTC's target is neither the sender nor a generic audience class.
                    Some(target) => vec![Envelope {
                        from_session: target,
                        audience: BroadcastAudience::CurrentSession,
                        message: OutboundMessage::Update(GroupUpdate::new(
                            self.group_id,
                            GroupUpdateKind::WebRTC,
                            relay.payload,
                        )),
                    }],
                    None => {
                        warn!(group = %self.group_id, target = %to_session, "webrtc relay target not in group");
                        Vec::new()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use syncplay_common::time::FixedClock;

    struct AllowAllCatalog;

    #[async_trait]
    impl UserCatalog for AllowAllCatalog {
        async fn can_access(&self, _user_id: Uuid, _item_id: Uuid) -> bool {
            true
        }
        async fn runtime_ticks(&self, _item_id: Uuid) -> Option<i64> {
            Some(ticks::ms_to_ticks(180_000))
        }
    }

    fn new_controller() -> GroupController {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        GroupController::new(
            Uuid::new_v4(),
            "test group".into(),
            Visibility::Public,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Arc::new(AllowAllCatalog),
            clock,
            2000,
            500,
        )
    }

    #[tokio::test]
    async fn play_transitions_idle_to_waiting() {
        let mut controller = new_controller();
        let session = controller.session_ids()[0];
        let items: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        controller
            .handle_request(
                session,
                Request::Play {
                    playing_queue: items,
                    playing_item_position: 0,
                    start_position_ticks: 0,
                },
            )
            .await;
        assert_eq!(controller.state, GroupStateKind::Waiting { resume_playing: true });
    }

    #[tokio::test]
    async fn ready_from_all_members_starts_playing() {
        let mut controller = new_controller();
        let session = controller.session_ids()[0];
        let items: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        controller
            .handle_request(
                session,
                Request::Play {
                    playing_queue: items,
                    playing_item_position: 0,
                    start_position_ticks: 0,
                },
            )
            .await;
        let pid = controller.queue.playing_item().unwrap().playlist_item_id.clone();
        let envelopes = controller
            .handle_request(
                session,
                Request::Ready {
                    when: Utc::now(),
                    position_ticks: 0,
                    is_playing: true,
                    playlist_item_id: pid,
                },
            )
            .await;
        assert_eq!(controller.state, GroupStateKind::Playing);
        assert!(!envelopes.is_empty());
    }

    #[tokio::test]
    async fn pause_while_playing_advances_position() {
        let mut controller = new_controller();
        let session = controller.session_ids()[0];
        controller.queue.set_playlist(vec![Uuid::new_v4()], Utc::now());
        controller.queue.set_playing_item_by_index(0);
        controller.run_time_ticks = ticks::ms_to_ticks(180_000);
        controller.state = GroupStateKind::Playing;
        controller.position_ticks = 0;
        controller.last_activity = controller.now() - chrono::Duration::seconds(10);
        controller.handle_request(session, Request::Pause).await;
        assert_eq!(controller.state, GroupStateKind::Paused);
        assert!(controller.position_ticks >= ticks::ms_to_ticks(9_000));
    }

    #[tokio::test]
    async fn remove_current_item_transitions_to_waiting() {
        let mut controller = new_controller();
        let session = controller.session_ids()[0];
        let items: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        controller.set_play_queue(items).await.unwrap();
        controller.set_playing_item_by_index(0).await.unwrap();
        controller.state = GroupStateKind::Playing;
        let pid = controller.queue.playing_item().unwrap().playlist_item_id.clone();
        controller
            .handle_request(
                session,
                Request::RemoveFromPlaylist {
                    playlist_item_ids: vec![pid],
                },
            )
            .await;
        assert_eq!(controller.state, GroupStateKind::Waiting { resume_playing: true });
    }

    #[test]
    fn reported_position_beyond_tolerance_is_clamped() {
        let mut controller = new_controller();
        controller.run_time_ticks = ticks::ms_to_ticks(180_000);
        controller.position_ticks = ticks::ms_to_ticks(10_000);
        let far = controller.sanitize_reported_position(ticks::ms_to_ticks(50_000));
        assert_eq!(far, ticks::ms_to_ticks(10_500));
        let near = controller.sanitize_reported_position(ticks::ms_to_ticks(10_200));
        assert_eq!(near, ticks::ms_to_ticks(10_200));
    }

    #[tokio::test]
    async fn non_admin_without_playlist_permission_is_refused() {
        let mut controller = new_controller();
        let member_session = Uuid::new_v4();
        let member_user = Uuid::new_v4();
        controller.add_session(member_session, member_user);
        // default access list opens playback but not playlist
        let envelopes = controller
            .handle_request(
                member_session,
                Request::SetShuffleMode {
                    mode: crate::queue::ShuffleMode::Shuffle,
                },
            )
            .await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(controller.queue.shuffle_mode(), crate::queue::ShuffleMode::Sorted);
    }

    #[tokio::test]
    async fn unknown_session_is_refused_as_not_in_group() {
        let mut controller = new_controller();
        let envelopes = controller.handle_request(Uuid::new_v4(), Request::Pause).await;
        assert_eq!(envelopes.len(), 1);
    }

    #[tokio::test]
    async fn webrtc_unicast_only_reaches_named_target() {
        let mut controller = new_controller();
        let sender = controller.session_ids()[0];
        let target = Uuid::new_v4();
        controller.add_session(target, Uuid::new_v4());
        let envelopes = controller.relay_webrtc(sender, Some(target), serde_json::json!({}));
        assert_eq!(envelopes.len(), 1);
    }

    #[tokio::test]
    async fn webrtc_relay_to_unknown_target_is_dropped() {
        let controller = new_controller();
        let sender = controller.session_ids()[0];
        let envelopes = controller.relay_webrtc(sender, Some(Uuid::new_v4()), serde_json::json!({}));
        assert!(envelopes.is_empty());
    }
}
