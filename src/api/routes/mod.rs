//! API routes module

pub mod admin;
pub mod domains;
pub mod email;
pub mod health;

use axum::{Router, middleware};

use crate::api::rate_limit;
use crate::api::state::SharedState;

/// Create the combined API router
pub fn router(state: &SharedState) -> Router<SharedState> {
    Router::new()
        // Email routes
        .nest("/email", email::router(state))
        // Domain listing
        .nest("/domains", domains::router())
        // Admin routes
        .nest("/admin", admin::router())
        // Everything above shares the general per-IP budget
        .layer(middleware::from_fn_with_state(
            state.limits.general.clone(),
            rate_limit::enforce,
        ))
        // Health checks are never rate limited
        .nest("/health", health::router())
}
