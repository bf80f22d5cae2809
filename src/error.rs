//! Request-level error taxonomy for the relay.
//!
//! Every handler funnels failures into [`RelayError`], which carries the
//! HTTP status mapping. Partial delivery failures are deliberately *not*
//! part of this taxonomy: a dispatch that reaches the transport succeeds
//! as a request, and the caller inspects the success/failure counts in the
//! response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced to HTTP callers.
///
/// Transport detail is logged internally at the point of failure; the
/// variants here carry only what is safe to return to a client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed request: missing or empty required fields. Client-fixable.
    #[error("{0}")]
    Validation(String),

    /// A valid dispatch intent resolved to an empty destination set.
    #[error("no registered recipients{}", role_suffix(.0))]
    NoRecipients(Option<String>),

    /// Login attempt quota exceeded for this client address.
    #[error("too many login attempts, retry later")]
    RateLimited,

    /// Unknown user or wrong password.
    #[error("invalid credentials")]
    Unauthorized,

    /// A collaborator call failed. The payload is the whole client-facing
    /// message; full detail is logged before this variant is constructed.
    #[error("{0}")]
    Transport(String),

    /// Anything unexpected at the request boundary.
    #[error("internal error")]
    Internal(String),
}

/// Formats the optional role filter into the NoRecipients message.
fn role_suffix(role: &Option<String>) -> String {
    match role {
        Some(r) => format!(" with role \"{r}\""),
        None => String::new(),
    }
}

impl RelayError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::NoRecipients(_) => StatusCode::NOT_FOUND,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::Transport(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if let RelayError::Internal(detail) = &self {
            // The client gets a generic message; the detail stays in logs.
            log::error!("internal error at request boundary: {detail}");
        }
        let body = json!({ "ok": false, "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RelayError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::NoRecipients(None).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(RelayError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(RelayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            RelayError::Transport("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_no_recipients_message_mentions_role() {
        let err = RelayError::NoRecipients(Some("doctor".to_string()));
        assert!(err.to_string().contains("doctor"));

        let err = RelayError::NoRecipients(None);
        assert_eq!(err.to_string(), "no registered recipients");
    }

    #[test]
    fn test_transport_message_is_the_payload_verbatim() {
        let err = RelayError::Transport("push delivery failed".to_string());
        assert_eq!(err.to_string(), "push delivery failed");
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = RelayError::Internal("connection string leaked".to_string());
        assert_eq!(err.to_string(), "internal error");
    }
}
