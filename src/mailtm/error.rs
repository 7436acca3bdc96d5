use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

use crate::error::ErrorKind;

/// The only error type that leaves the mailbox adapter.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MailboxError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl MailboxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn session_not_found() -> Self {
        Self::from(ErrorKind::SessionNotFound)
    }

    /// Normalize a non-success provider response.
    ///
    /// Well known statuses get a fixed message. Anything else uses the
    /// message the provider sent, if any.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = ErrorKind::from_status(status);
        let details = serde_json::from_str::<Value>(body)
            .unwrap_or_else(|_| json!({ "message": body }));

        let message = match kind {
            ErrorKind::Unknown => details
                .get("message")
                .or_else(|| details.get("hydra:description"))
                .or_else(|| details.get("detail"))
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP error {}", status.as_u16())),
            _ => kind.describe().to_string(),
        };

        Self::new(kind, message).with_details(details)
    }

    /// Normalize a failure that happened below HTTP.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, "");
        }
        if err.is_decode() {
            return Self::new(
                ErrorKind::Unknown,
                format!("Unexpected response from Mail.tm: {}", err),
            );
        }
        // Timeouts, refused connections and resets all mean no response
        Self::from(ErrorKind::UpstreamUnreachable)
            .with_details(json!({ "message": err.to_string() }))
    }
}

impl From<ErrorKind> for MailboxError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, kind.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_uses_fixed_messages_for_known_statuses() {
        let err = MailboxError::from_status(
            StatusCode::CONFLICT,
            r#"{"hydra:description": "address: This value is already used."}"#,
        );
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, "Account already exists");
        assert_eq!(
            err.details.unwrap()["hydra:description"],
            "address: This value is already used."
        );
    }

    #[test]
    fn it_uses_the_provider_message_for_unknown_statuses() {
        let err = MailboxError::from_status(
            StatusCode::IM_A_TEAPOT,
            r#"{"message": "short and stout"}"#,
        );
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "short and stout");
    }

    #[test]
    fn it_falls_back_to_the_status_code() {
        let err = MailboxError::from_status(StatusCode::PAYMENT_REQUIRED, "nope");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "HTTP error 402");
        assert_eq!(err.details.unwrap()["message"], "nope");
    }
}
