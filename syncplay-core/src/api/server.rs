//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with one route per `/SyncPlay/*` operation
//! (spec §6) plus the SSE event stream.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use syncplay_common::{Error, Result};

use crate::dispatch::ChannelMessageSink;
use crate::manager::SyncPlayManager;

use super::handlers;

/// Shared application state passed to every handler.
///
/// `sink` is kept as the concrete `ChannelMessageSink` (rather than only the
/// `Arc<dyn MessageSink>` the manager holds) because the SSE handler needs
/// `subscribe()`, which isn't part of the `MessageSink` trait object.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SyncPlayManager>,
    pub sink: Arc<ChannelMessageSink>,
}

/// Builds the router; does not bind or serve.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/SyncPlay/New", post(handlers::new_group))
        .route("/SyncPlay/Join", post(handlers::join_group))
        .route("/SyncPlay/Leave", post(handlers::leave_group))
        .route("/SyncPlay/Settings", post(handlers::update_settings))
        .route("/SyncPlay/List", get(handlers::list_groups))
        .route(
            "/SyncPlay/ListAvailableUsers",
            get(handlers::list_available_users),
        )
        .route("/SyncPlay/Play", post(handlers::play))
        .route("/SyncPlay/SetPlaylistItem", post(handlers::set_playlist_item))
        .route(
            "/SyncPlay/RemoveFromPlaylist",
            post(handlers::remove_from_playlist),
        )
        .route(
            "/SyncPlay/MovePlaylistItem",
            post(handlers::move_playlist_item),
        )
        .route("/SyncPlay/Queue", post(handlers::queue))
        .route("/SyncPlay/Unpause", post(handlers::unpause))
        .route("/SyncPlay/Pause", post(handlers::pause))
        .route("/SyncPlay/Stop", post(handlers::stop))
        .route("/SyncPlay/Seek", post(handlers::seek))
        .route("/SyncPlay/Buffering", post(handlers::buffering))
        .route("/SyncPlay/Ready", post(handlers::ready))
        .route("/SyncPlay/SetIgnoreWait", post(handlers::set_ignore_wait))
        .route("/SyncPlay/NextTrack", post(handlers::next_track))
        .route("/SyncPlay/PreviousTrack", post(handlers::previous_track))
        .route("/SyncPlay/SetRepeatMode", post(handlers::set_repeat_mode))
        .route("/SyncPlay/SetShuffleMode", post(handlers::set_shuffle_mode))
        .route("/SyncPlay/Ping", post(handlers::ping))
        .route("/SyncPlay/WebRTC", post(handlers::webrtc))
        .route("/SyncPlay/Events", get(handlers::events))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds and serves the router until the process is killed.
pub async fn run(port: u16, state: AppState) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("starting SyncPlay HTTP server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::Io)?;

    axum::serve(listener, app).await.map_err(Error::Io)?;
    Ok(())
}
