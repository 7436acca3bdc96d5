//! Public API types

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::mailtm::MailboxError;

// Envelopes

/// Body of every successful JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Body of every failed JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(default)]
    pub code: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

// Errors

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: kind.http_status(),
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Convert `ApiError` into the JSON failure envelope.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} ({:?}): {}", self.status, self.kind, self.message);
        } else {
            tracing::debug!("{} ({:?}): {}", self.status, self.kind, self.message);
        }

        let body = ErrorEnvelope {
            success: false,
            error: self.message,
            code: Some(self.kind),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<MailboxError> for ApiError {
    fn from(err: MailboxError) -> Self {
        Self {
            status: err.kind.http_status(),
            kind: err.kind,
            message: err.message,
            details: err.details,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::Unknown, format!("Something went wrong: {}", err))
    }
}

// Re-export public types from each route

pub mod admin {
    pub use crate::api::routes::admin::public::*;
}

pub mod domains {
    pub use crate::api::routes::domains::public::*;
}

pub mod email {
    pub use crate::api::routes::email::public::*;
}

pub mod health {
    pub use crate::api::routes::health::public::*;
}
