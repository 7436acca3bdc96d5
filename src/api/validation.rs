//! Request validation
//!
//! Inputs are trimmed before they are checked. Addresses are
//! lowercased so lookups match whatever casing the caller used.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::public::ApiError;

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_ID_LENGTH: usize = 64;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

// Mail.tm message ids are Mongo object ids
static MESSAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("message id regex"));

pub fn is_valid_email(address: &str) -> bool {
    EMAIL_RE.is_match(address)
}

pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Validate account creation input, reporting every problem at once.
pub fn account_creation(address: &str, password: &str) -> Result<(String, String), ApiError> {
    let address = normalize_address(address);
    let password = password.trim().to_string();

    let mut errors = Vec::new();
    if !is_valid_email(&address) {
        errors.push("Valid email address is required");
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push("Password must be at least 6 characters long");
    }

    if !errors.is_empty() {
        return Err(ApiError::validation("Validation failed").with_details(json!(errors)));
    }
    Ok((address, password))
}

pub fn address_param(address: &str) -> Result<String, ApiError> {
    let address = normalize_address(address);
    if !is_valid_email(&address) {
        return Err(ApiError::validation(
            "Valid email address parameter is required",
        ));
    }
    Ok(address)
}

pub fn message_id_param(id: &str) -> Result<String, ApiError> {
    let id = id.trim();
    if !MESSAGE_ID_RE.is_match(id) {
        return Err(ApiError::validation("Valid message ID is required"));
    }
    Ok(id.to_string())
}

pub fn attachment_id_param(id: &str) -> Result<String, ApiError> {
    let id = id.trim();
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LENGTH
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::validation("Valid attachment ID is required"));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn it_accepts_valid_credentials() {
        let (address, password) = account_creation("  Foo@Domain.com ", "secret1").unwrap();
        assert_eq!(address, "foo@domain.com");
        assert_eq!(password, "secret1");
    }

    #[test]
    fn it_reports_every_validation_error() {
        let err = account_creation("not-an-email", "12345").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(
            err.details.unwrap(),
            json!([
                "Valid email address is required",
                "Password must be at least 6 characters long"
            ])
        );
    }

    #[test]
    fn it_validates_route_params() {
        assert!(address_param("foo@domain.com").is_ok());
        assert!(address_param("foo").is_err());
        assert!(message_id_param("64b7f0c2a1b2c3d4e5f60718").is_ok());
        assert!(message_id_param("../../accounts").is_err());
        assert!(attachment_id_param("ATTACH000001").is_ok());
        assert!(attachment_id_param("a/b").is_err());
    }
}
