pub mod public;
pub mod rate_limit;
pub mod routes;
mod server;
pub use server::{app, init_tracing, serve};
mod state;
pub use state::{AppState, SharedState};
pub mod validation;
