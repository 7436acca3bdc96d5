//! Client side of the temp mail backend
//!
//! [`TempMailClient`] talks to the HTTP API. [`InboxWatcher`] pairs it
//! with a [`PollingCoordinator`] to follow one mailbox.

pub mod api;
pub mod cache;
mod error;
pub mod inbox;
pub mod polling;

pub use api::{AccountStatus, TempMailClient};
pub use cache::RequestCache;
pub use error::ClientError;
pub use inbox::{InboxEvent, InboxWatcher};
pub use polling::{FetchFn, PollHandle, PollPhase, PollState, PollingCoordinator, fetch_fn};
