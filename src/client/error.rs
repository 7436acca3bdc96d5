use serde::Serialize;
use thiserror::Error;

use crate::error::ErrorKind;

/// Failure of a call from the client to the backend.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// A timeout is a network failure like any other, never a missing account.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::new(ErrorKind::from_status(status), err.to_string());
        }
        if err.is_timeout() {
            return Self::new(
                ErrorKind::UpstreamUnreachable,
                "Request timeout - please try again",
            );
        }
        if err.is_decode() {
            return Self::new(ErrorKind::Unknown, format!("Invalid response: {}", err));
        }
        Self::new(
            ErrorKind::UpstreamUnreachable,
            "Network error - please check your connection",
        )
    }
}
