//! HTTP surface for the SyncPlay coordinator (spec §6)
//!
//! One route per request/command plus a `GET /SyncPlay/Events` SSE stream.
//! Handlers are thin: parse the query, build a domain value, hand it to the
//! `SyncPlayManager`. The manager (and the `GroupController` underneath it)
//! owns every state transition and out-of-band refusal.

pub mod handlers;
pub mod server;
pub mod session;

pub use server::{build_router, AppState};
