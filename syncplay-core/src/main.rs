//! # syncplay-core
//!
//! The SyncPlay group coordinator service: HTTP/SSE surface over the
//! `SyncPlayManager` state machine.
//!
//! **Architecture:** one `axum` router per process, one `SyncPlayManager`
//! guarding per-group state behind `tokio::sync::Mutex`, a background sweep
//! evicting empty groups.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use syncplay_core::api;
use syncplay_core::config::Config;
use syncplay_core::dispatch::ChannelMessageSink;
use syncplay_core::manager::SyncPlayManager;
use syncplay_core::session::{SessionDirectory, UserCatalog};

#[derive(Parser, Debug)]
#[command(name = "syncplay-core")]
#[command(about = "SyncPlay group playback coordinator")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "syncplay-core.toml")]
    config: PathBuf,

    /// HTTP server port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Time-sync tolerance in milliseconds (overrides config file)
    #[arg(long)]
    time_sync_offset_ms: Option<i64>,
}

/// Treats every session id as its own user id and grants SyncPlay access to
/// anyone connected. A real deployment plugs in the host process's actual
/// session registry here (spec §4.3; see DESIGN.md).
struct OpenSessionDirectory;

#[async_trait]
impl SessionDirectory for OpenSessionDirectory {
    async fn user_for_session(&self, session_id: Uuid) -> Option<Uuid> {
        Some(session_id)
    }

    async fn connected_users(&self) -> Vec<Uuid> {
        Vec::new()
    }

    async fn has_syncplay_access(&self, _user_id: Uuid) -> bool {
        true
    }
}

/// Grants every user access to every item and reports a zero-length
/// duration, since no real library catalog is wired in this binary. A real
/// deployment plugs in the host process's library/parental-rating catalog
/// here (spec §4.2, §4.5; see DESIGN.md).
struct OpenUserCatalog;

#[async_trait]
impl UserCatalog for OpenUserCatalog {
    async fn can_access(&self, _user_id: Uuid, _item_id: Uuid) -> bool {
        true
    }

    async fn runtime_ticks(&self, _item_id: Uuid) -> Option<i64> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncplay_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_file(true).with_line_number(true))
        .init();

    info!("starting syncplay-core");

    let args = Args::parse();
    info!(config = ?args.config, "configuration file");

    let config = Config::load(&args.config, args.port, args.time_sync_offset_ms).await?;
    info!(port = config.port, time_sync_offset_ms = config.time_sync_offset_ms, "loaded configuration");

    let sink = Arc::new(ChannelMessageSink::new(256));
    let manager = Arc::new(SyncPlayManager::new(
        sink.clone(),
        Arc::new(OpenUserCatalog),
        Arc::new(OpenSessionDirectory),
        Arc::new(syncplay_common::time::SystemClock),
        config.time_sync_offset_ms,
        config.max_playback_offset_ms,
        chrono::Duration::seconds(config.grace_period_secs as i64),
    ));

    let sweeper_handle = tokio::spawn({
        let manager = manager.clone();
        async move {
            manager.run_sweeper(std::time::Duration::from_secs(5)).await;
        }
    });

    let state = api::AppState { manager, sink };
    let server_handle = tokio::spawn(async move {
        if let Err(e) = api::server::run(config.port, state).await {
            error!("HTTP server error: {e}");
        }
    });

    server_handle.await?;
    sweeper_handle.abort();

    info!("syncplay-core shutting down");
    Ok(())
}
