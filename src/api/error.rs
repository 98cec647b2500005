use serde::Deserialize;
use thiserror::Error;

use crate::auth::StoreError;

/// Maximum length for error response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Client-side validation failure; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The server rejected the submitted credentials.
    #[error("{0}")]
    InvalidCredentials(String),

    /// The attached token was missing, invalid, or expired (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error body shape the Miqat API uses for 4xx responses.
/// `details` carries Marshmallow field errors on validation failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl AuthError {
    /// Truncate a response body to avoid carrying excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        // The cut must land on a char boundary or the slice panics on
        // multi-byte text.
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    /// Pull the human-readable message out of a 4xx body, preferring
    /// `details` (field-level validation errors) over the summary
    /// `error` line, falling back to the raw body.
    fn message_from_body(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        if let Some(details) = parsed.details {
            let rendered = match details {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return Some(match parsed.error {
                Some(error) => format!("{}: {}", error, rendered),
                None => rendered,
            });
        }
        parsed.error
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::message_from_body(body)
            .unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            401 => {
                let message = if message.trim().is_empty() {
                    "session is no longer valid".to_string()
                } else {
                    message
                };
                AuthError::Unauthorized(message)
            }
            400..=499 => AuthError::Validation(message),
            500..=599 => AuthError::Server(Self::truncate_body(body)),
            _ => AuthError::InvalidResponse(format!("status {}: {}", status, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn unauthorized_carries_server_message() {
        let err = AuthError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"error": "Invalid email or password"}"#,
        );
        match err {
            AuthError::Unauthorized(msg) => assert_eq!(msg, "Invalid email or password"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unauthorized_without_body_gets_default_message() {
        let err = AuthError::from_status(StatusCode::UNAUTHORIZED, "");
        match err {
            AuthError::Unauthorized(msg) => assert_eq!(msg, "session is no longer valid"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validation_prefers_details_over_error() {
        let body = r#"{"error": "Validation failed", "details": {"email": ["Not a valid email address."]}}"#;
        let err = AuthError::from_status(StatusCode::BAD_REQUEST, body);
        match err {
            AuthError::Validation(msg) => {
                assert!(msg.starts_with("Validation failed: "));
                assert!(msg.contains("Not a valid email address."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn plain_4xx_uses_error_field() {
        let err = AuthError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"error": "Email already registered"}"#,
        );
        match err {
            AuthError::Validation(msg) => assert_eq!(msg, "Email already registered"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncation_backs_off_to_a_char_boundary() {
        // Byte 500 falls inside a two-byte character here; a localized
        // HTML error page must still come back as a Server error.
        let body = format!("a{}", "é".repeat(600));
        let err = AuthError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        match err {
            AuthError::Server(msg) => {
                assert!(msg.contains("truncated"));
                assert!(msg.contains(&format!("{} total bytes", body.len())));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn server_errors_truncate_large_bodies() {
        let body = "x".repeat(2000);
        let err = AuthError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        match err {
            AuthError::Server(msg) => {
                assert!(msg.contains("truncated"));
                assert!(msg.len() < body.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
