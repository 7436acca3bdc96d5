pub mod api;
pub mod cli;
pub mod client;
pub mod core;
pub mod error;
pub mod jobs;
pub mod mailbox;
pub mod mailtm;
pub mod session;
