//! Router for the admin API

use axum::{Router, extract::State, response::Json};
use chrono::Utc;
use http::{HeaderMap, header};

use super::public;
use crate::api::public::{ApiError, Envelope};
use crate::api::state::SharedState;
use crate::error::ErrorKind;

fn authorize(state: &SharedState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(ApiError::new(ErrorKind::NotFound, "Admin API is disabled"));
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(()),
        _ => {
            tracing::warn!("Rejected admin request with a missing or bad token");
            Err(ApiError::new(ErrorKind::AuthFailed, "Invalid admin token"))
        }
    }
}

/// Session counts and uptime
async fn stats_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Envelope<public::StatsResponse>>, ApiError> {
    authorize(&state, &headers)?;

    let sessions = state.mailbox.sessions();
    let uptime = Utc::now() - state.started_at;

    Ok(Json(Envelope::ok(public::StatsResponse {
        sessions: sessions.len(),
        oldest_session_at: sessions.oldest_created_at(),
        uptime_secs: uptime.num_seconds().max(0) as u64,
    })))
}

/// Create the admin router
pub fn router() -> Router<SharedState> {
    Router::new().route("/stats", axum::routing::get(stats_handler))
}
