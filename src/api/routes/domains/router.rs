//! Router for the domains API

use axum::{Router, extract::State, response::Json};

use super::public;
use crate::api::public::{ApiError, Envelope};
use crate::api::state::SharedState;

/// List the domains Mail.tm currently hands out addresses on
async fn list_domains_handler(
    State(state): State<SharedState>,
) -> Result<Json<Envelope<public::DomainsResponse>>, ApiError> {
    let domains = state.mailbox.list_domains().await?;

    Ok(Json(Envelope::ok(public::DomainsResponse {
        total: domains.total_items,
        domains: domains.members,
    })))
}

/// Create the domains router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", axum::routing::get(list_domains_handler))
}
