//! Caller identity extraction (spec §6: "all authenticated")
//!
//! Real authentication is an out-of-scope external collaborator; this
//! extractor reads a pre-authenticated session id off a header as the stand-in
//! a host process's auth middleware would populate.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "x-syncplay-session";

/// The authenticated caller's session id.
pub struct SyncPlaySession(pub Uuid);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for SyncPlaySession
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(SESSION_HEADER)
            .ok_or((StatusCode::UNAUTHORIZED, "missing session header"))?;
        let value = header
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "session header is not valid UTF-8"))?;
        let session_id =
            Uuid::parse_str(value).map_err(|_| (StatusCode::BAD_REQUEST, "malformed session id"))?;
        Ok(SyncPlaySession(session_id))
    }
}
