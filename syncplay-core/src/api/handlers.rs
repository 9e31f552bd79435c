//! Per-operation HTTP handlers (spec §6)
//!
//! Two shapes cover almost everything here:
//! - `SyncPlayManager`-level operations (`New`, `Join`, `Leave`, `Settings`)
//! return `Result<_, SyncPlayError>` and may fail before any group exists to
//! carry the refusal, so [`respond`] composes the out-of-band `GroupUpdate`
//! itself.
//! - In-group requests go through `SyncPlayManager::handle_request`, which
//! never fails at the HTTP boundary: the `GroupController` already turns a
//! refusal into an out-of-band envelope, dispatched before the call returns.
//! Both shapes end in the same place: HTTP 204, with any refusal delivered
//! over `/SyncPlay/Events` instead of the response body (spec §7).

use std::convert::Infallible;
use std::time::Duration;

use crate::dispatch::MessageSink;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::SyncPlayError;
use crate::group::state::Visibility;
use crate::manager::{GroupInfo, NewGroupRequest, NowPlaying};
use crate::messages::{BroadcastAudience, Envelope, GroupUpdate, OutboundMessage};
use crate::queue::{RepeatMode, ShuffleMode};
use crate::requests::{QueueMode, Request};

use super::server::AppState;
use super::session::SyncPlaySession;

/// Dispatches the out-of-band refusal for a manager-level op that failed
/// before any group lock was taken, or a no-op for success. Returns the HTTP
/// status: `204` unless the error is one of the handful spec §7 calls "hard"
/// (in practice, only malformed input ever reaches a handler as `Err` with
/// `is_hard_error()` true — everything else is a semantic refusal).
async fn respond(state: &AppState, session_id: Uuid, result: Result<(), SyncPlayError>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(err) if err.is_hard_error() => StatusCode::BAD_REQUEST,
        Err(err) => {
            let envelope = Envelope {
                from_session: session_id,
                audience: BroadcastAudience::CurrentSession,
                message: OutboundMessage::Update(GroupUpdate::new(
                    Uuid::nil(),
                    err.update_kind(),
                    json!({ "error": err.to_string() }),
                )),
            };
            state.sink.dispatch(envelope, &[session_id]).await;
            StatusCode::NO_CONTENT
        }
    }
}

fn parse_uuid_csv(csv: &str) -> Result<Vec<Uuid>, StatusCode> {
    if csv.is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|s| Uuid::parse_str(s.trim()).map_err(|_| StatusCode::BAD_REQUEST))
        .collect()
}

fn parse_string_csv(csv: &str) -> Vec<String> {
    if csv.is_empty() {
        return Vec::new();
    }
    csv.split(',').map(|s| s.trim().to_string()).collect()
}

fn parse_visibility(raw: &str) -> Result<Visibility, StatusCode> {
    match raw {
        "Public" => Ok(Visibility::Public),
        "InviteOnly" => Ok(Visibility::InviteOnly),
        "Private" => Ok(Visibility::Private),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

fn parse_queue_mode(raw: &str) -> Result<QueueMode, StatusCode> {
    match raw {
        "Queue" => Ok(QueueMode::Queue),
        "QueueNext" => Ok(QueueMode::QueueNext),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

fn parse_repeat_mode(raw: &str) -> Result<RepeatMode, StatusCode> {
    match raw {
        "RepeatOne" => Ok(RepeatMode::RepeatOne),
        "RepeatAll" => Ok(RepeatMode::RepeatAll),
        "RepeatNone" => Ok(RepeatMode::RepeatNone),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

fn parse_shuffle_mode(raw: &str) -> Result<ShuffleMode, StatusCode> {
    match raw {
        "Sorted" => Ok(ShuffleMode::Sorted),
        "Shuffle" => Ok(ShuffleMode::Shuffle),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

// ---- SyncPlayManager-level operations ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupParams {
    group_name: String,
    #[serde(default)]
    visibility: Option<String>,
    /// Comma-separated user ids.
    #[serde(default)]
    invited_users: Option<String>,
    #[serde(default)]
    open_playback_access: Option<bool>,
    #[serde(default)]
    open_playlist_access: Option<bool>,
    /// Comma-separated item ids already queued on the caller's player, if any.
    #[serde(default)]
    now_playing_queue: Option<String>,
    #[serde(default)]
    now_playing_position: Option<usize>,
    #[serde(default)]
    now_playing_position_ticks: Option<i64>,
    #[serde(default)]
    now_playing_paused: Option<bool>,
}

pub async fn new_group(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<NewGroupParams>,
) -> Result<StatusCode, StatusCode> {
    let visibility = match params.visibility.as_deref() {
        Some(raw) => parse_visibility(raw)?,
        None => Visibility::Public,
    };
    let invited_users = match params.invited_users.as_deref() {
        Some(csv) => parse_uuid_csv(csv)?,
        None => Vec::new(),
    };
    let now_playing = match params.now_playing_queue.as_deref() {
        Some(csv) if !csv.is_empty() => Some(NowPlaying {
            queue: parse_uuid_csv(csv)?,
            position_index: params.now_playing_position.unwrap_or(0),
            position_ticks: params.now_playing_position_ticks.unwrap_or(0),
            is_paused: params.now_playing_paused.unwrap_or(false),
        }),
        _ => None,
    };

    let req = NewGroupRequest {
        name: params.group_name,
        visibility,
        invited_users,
        open_playback_access: params.open_playback_access,
        open_playlist_access: params.open_playlist_access,
        now_playing,
    };
    let result = state.manager.new_group(session.0, req).await.map(|_| ());
    Ok(respond(&state, session.0, result).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupParams {
    group_id: Uuid,
}

pub async fn join_group(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<JoinGroupParams>,
) -> StatusCode {
    let result = state.manager.join_group(session.0, params.group_id).await;
    respond(&state, session.0, result).await
}

pub async fn leave_group(State(state): State<AppState>, session: SyncPlaySession) -> StatusCode {
    state.manager.leave_group(session.0).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsParams {
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    open_playback_access: Option<bool>,
    #[serde(default)]
    open_playlist_access: Option<bool>,
    /// Comma-separated, positionally aligned with `access_list_playback` and
    /// `access_list_playlist` — the per-user permission override triple.
    #[serde(default)]
    access_list_user_ids: Option<String>,
    #[serde(default)]
    access_list_playback: Option<String>,
    #[serde(default)]
    access_list_playlist: Option<String>,
}

fn parse_bool_csv(csv: &str) -> Result<Vec<bool>, StatusCode> {
    if csv.is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|s| match s.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(StatusCode::BAD_REQUEST),
        })
        .collect()
}

fn parse_access_list_updates(params: &SettingsParams) -> Result<Vec<(Uuid, bool, bool)>, StatusCode> {
    let Some(user_ids) = params.access_list_user_ids.as_deref() else {
        return Ok(Vec::new());
    };
    let user_ids = parse_uuid_csv(user_ids)?;
    let playback = params
        .access_list_playback
        .as_deref()
        .map(parse_bool_csv)
        .transpose()?
        .unwrap_or_default();
    let playlist = params
        .access_list_playlist
        .as_deref()
        .map(parse_bool_csv)
        .transpose()?
        .unwrap_or_default();
    if playback.len() != user_ids.len() || playlist.len() != user_ids.len() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(user_ids
        .into_iter()
        .zip(playback)
        .zip(playlist)
        .map(|((user_id, playback), playlist)| (user_id, playback, playlist))
        .collect())
}

pub async fn update_settings(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<SettingsParams>,
) -> Result<StatusCode, StatusCode> {
    let visibility = params.visibility.as_deref().map(parse_visibility).transpose()?;
    let access_list_updates = parse_access_list_updates(&params)?;
    let result = state
        .manager
        .update_group_settings(
            session.0,
            params.group_name,
            visibility,
            params.open_playback_access,
            params.open_playlist_access,
            access_list_updates,
        )
        .await;
    Ok(respond(&state, session.0, result).await)
}

pub async fn list_groups(State(state): State<AppState>, session: SyncPlaySession) -> impl IntoResponse {
    let groups: Vec<GroupInfo> = state.manager.list_groups(session.0).await;
    axum::Json(groups)
}

pub async fn list_available_users(
    State(state): State<AppState>,
    _session: SyncPlaySession,
) -> impl IntoResponse {
    axum::Json(state.manager.list_available_users().await)
}

// ---- In-group requests ----

async fn submit(state: &AppState, session: Uuid, request: Request) -> StatusCode {
    state.manager.handle_request(session, request).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayParams {
    /// Comma-separated item ids.
    playing_queue: String,
    playing_item_position: usize,
    start_position_ticks: i64,
}

pub async fn play(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<PlayParams>,
) -> Result<StatusCode, StatusCode> {
    let playing_queue = parse_uuid_csv(&params.playing_queue)?;
    Ok(submit(
        &state,
        session.0,
        Request::Play {
            playing_queue,
            playing_item_position: params.playing_item_position,
            start_position_ticks: params.start_position_ticks,
        },
    )
    .await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemParams {
    playlist_item_id: String,
}

pub async fn set_playlist_item(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<PlaylistItemParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::SetPlaylistItem {
            playlist_item_id: params.playlist_item_id,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFromPlaylistParams {
    /// Comma-separated playlist item ids.
    playlist_item_ids: String,
}

pub async fn remove_from_playlist(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<RemoveFromPlaylistParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::RemoveFromPlaylist {
            playlist_item_ids: parse_string_csv(&params.playlist_item_ids),
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePlaylistItemParams {
    playlist_item_id: String,
    new_index: usize,
}

pub async fn move_playlist_item(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<MovePlaylistItemParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::MovePlaylistItem {
            playlist_item_id: params.playlist_item_id,
            new_index: params.new_index,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueParams {
    /// Comma-separated item ids.
    item_ids: String,
    mode: String,
}

pub async fn queue(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<QueueParams>,
) -> Result<StatusCode, StatusCode> {
    let item_ids = parse_uuid_csv(&params.item_ids)?;
    let mode = parse_queue_mode(&params.mode)?;
    Ok(submit(&state, session.0, Request::Queue { item_ids, mode }).await)
}

pub async fn unpause(State(state): State<AppState>, session: SyncPlaySession) -> StatusCode {
    submit(&state, session.0, Request::Unpause).await
}

pub async fn pause(State(state): State<AppState>, session: SyncPlaySession) -> StatusCode {
    submit(&state, session.0, Request::Pause).await
}

pub async fn stop(State(state): State<AppState>, session: SyncPlaySession) -> StatusCode {
    submit(&state, session.0, Request::Stop).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekParams {
    position_ticks: i64,
}

pub async fn seek(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<SeekParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::Seek {
            position_ticks: params.position_ticks,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferingParams {
    when: chrono::DateTime<chrono::Utc>,
    position_ticks: i64,
    is_playing: bool,
    playlist_item_id: String,
    buffering_done: bool,
}

pub async fn buffering(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<BufferingParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::Buffering {
            when: params.when,
            position_ticks: params.position_ticks,
            is_playing: params.is_playing,
            playlist_item_id: params.playlist_item_id,
            buffering_done: params.buffering_done,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyParams {
    when: chrono::DateTime<chrono::Utc>,
    position_ticks: i64,
    is_playing: bool,
    playlist_item_id: String,
}

pub async fn ready(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<ReadyParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::Ready {
            when: params.when,
            position_ticks: params.position_ticks,
            is_playing: params.is_playing,
            playlist_item_id: params.playlist_item_id,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetIgnoreWaitParams {
    ignore_wait: bool,
}

pub async fn set_ignore_wait(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<SetIgnoreWaitParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::SetIgnoreWait {
            ignore_wait: params.ignore_wait,
        },
    )
    .await
}

pub async fn next_track(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<PlaylistItemParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::NextTrack {
            playlist_item_id: params.playlist_item_id,
        },
    )
    .await
}

pub async fn previous_track(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<PlaylistItemParams>,
) -> StatusCode {
    submit(
        &state,
        session.0,
        Request::PreviousTrack {
            playlist_item_id: params.playlist_item_id,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatModeParams {
    mode: String,
}

pub async fn set_repeat_mode(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<RepeatModeParams>,
) -> Result<StatusCode, StatusCode> {
    let mode = parse_repeat_mode(&params.mode)?;
    Ok(submit(&state, session.0, Request::SetRepeatMode { mode }).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShuffleModeParams {
    mode: String,
}

pub async fn set_shuffle_mode(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<ShuffleModeParams>,
) -> Result<StatusCode, StatusCode> {
    let mode = parse_shuffle_mode(&params.mode)?;
    Ok(submit(&state, session.0, Request::SetShuffleMode { mode }).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingParams {
    ping_ms: f64,
}

pub async fn ping(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<PingParams>,
) -> StatusCode {
    submit(&state, session.0, Request::Ping { ping_ms: params.ping_ms }).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcParams {
    #[serde(default)]
    to: Option<Uuid>,
    #[serde(default)]
    offer: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    ice_candidate: Option<String>,
    #[serde(default)]
    new_session: Option<bool>,
    #[serde(default)]
    session_leaving: Option<bool>,
}

pub async fn webrtc(
    State(state): State<AppState>,
    session: SyncPlaySession,
    Query(params): Query<WebRtcParams>,
) -> StatusCode {
    let payload = json!({
        "offer": params.offer,
        "answer": params.answer,
        "iceCandidate": params.ice_candidate,
        "newSession": params.new_session.unwrap_or(false),
        "sessionLeaving": params.session_leaving.unwrap_or(false),
    });
    state.manager.handle_webrtc(session.0, params.to, payload).await;
    StatusCode::NO_CONTENT
}

// ---- Event stream ----

/// Adapts the broadcast channel behind `ChannelMessageSink` into an SSE
/// stream filtered to this session's own deliveries (spec §6's
/// `GET /SyncPlay/Events`).
pub async fn events(
    State(state): State<AppState>,
    session: SyncPlaySession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = session.0;
    let rx = state.sink.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
        Ok(delivery) if delivery.is_for(session_id) => {
            let (event_name, body) = match &delivery.message {
                OutboundMessage::Update(update) => ("GroupUpdate", serde_json::to_value(update)),
                OutboundMessage::Command(command) => ("SyncPlayCommand", serde_json::to_value(command)),
            };
            let body = body.ok()?;
            Some(Ok(Event::default().event(event_name).json_data(body).ok()?))
        }
        // A lagged receiver (slow SSE client) just drops the backlog; the
        // stream keeps going rather than erroring the connection out.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keep-alive"))
}
