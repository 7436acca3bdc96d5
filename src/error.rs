//! Error taxonomy shared by the backend and the client

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Classification of every failure that can cross a mailbox boundary.
///
/// Callers decide between retrying, giving up and surfacing the error
/// to the user purely from this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    AuthFailed,
    NotFound,
    Conflict,
    RateLimited,
    UpstreamUnreachable,
    UpstreamFailure,
    SessionNotFound,
    Unknown,
}

impl ErrorKind {
    /// Classify an upstream HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ErrorKind::InvalidRequest,
            401 => ErrorKind::AuthFailed,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::UpstreamFailure,
            _ => ErrorKind::Unknown,
        }
    }

    /// Status used when this kind is returned by our own API.
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::AuthFailed => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound | ErrorKind::SessionNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
            ErrorKind::UpstreamUnreachable => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Account is gone: polling must stop and not come back on its own.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::AuthFailed | ErrorKind::SessionNotFound
        )
    }

    /// Default human readable description.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "Bad request - invalid data provided",
            ErrorKind::AuthFailed => "Authentication failed - invalid credentials",
            ErrorKind::NotFound => "Resource not found",
            ErrorKind::Conflict => "Account already exists",
            ErrorKind::RateLimited => "Too many requests - please try again later",
            ErrorKind::UpstreamUnreachable => "Network error - unable to reach Mail.tm API",
            ErrorKind::UpstreamFailure => "Internal server error",
            ErrorKind::SessionNotFound => {
                "Email account not found. Please create an account first."
            }
            ErrorKind::Unknown => "Unknown error occurred",
        }
    }
}
