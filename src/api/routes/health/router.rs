//! Router for the health API

use axum::{Router, response::Json};
use chrono::Utc;

use super::public;
use crate::api::state::SharedState;

async fn health_handler() -> Json<public::HealthResponse> {
    Json(public::HealthResponse {
        status: "OK".to_string(),
        message: "Temp mail backend is running".to_string(),
        timestamp: Utc::now(),
    })
}

/// Create the health router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", axum::routing::get(health_handler))
}
