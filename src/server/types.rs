//! Request and response data types for the HTTP surface.
//!
//! Wire names are camelCase to match the clients this relay serves.

use serde::{Deserialize, Serialize};

use crate::dispatch::DeliveryReport;

/// `POST /register` request body.
///
/// Fields are optional at the wire level so the handler can answer a
/// missing uid/token with the relay's own 400 body instead of a framework
/// rejection.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// User id the device belongs to.
    pub uid: Option<String>,
    /// Role for filtered dispatch; defaults to "user".
    pub role: Option<String>,
    /// Device push token.
    pub token: Option<String>,
}

/// `POST /register` response body.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Always true on success.
    pub ok: bool,
    /// Echoed uid.
    pub uid: String,
    /// Echoed token.
    pub token: String,
}

/// `GET /` liveness response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always true.
    pub ok: bool,
    /// Distinct registered uids.
    pub registered_users: usize,
    /// Distinct registered tokens.
    pub total_tokens: usize,
}

/// One row of the `GET /tokens` diagnostic listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListing {
    /// Registered uid.
    pub uid: String,
    /// Registered role.
    pub role: String,
    /// Truncated token, safe for display.
    pub token_preview: String,
    /// Registration time (RFC 3339).
    pub registered_at: String,
}

/// `GET /tokens` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResponse {
    /// Always true.
    pub ok: bool,
    /// Distinct registered uids.
    pub total_users: usize,
    /// Distinct registered tokens.
    pub total_tokens: usize,
    /// Per-uid listing.
    pub users: Vec<TokenListing>,
}

/// `GET /send-call` usage-hint response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallUsage {
    /// Always true.
    pub ok: bool,
    /// Human-readable usage hint.
    pub message: String,
    /// Distinct registered tokens available for dispatch.
    pub registered_tokens: usize,
}

/// `POST /send-call` success response: the delivery report plus `ok`.
#[derive(Debug, Serialize)]
pub struct SendCallResponse {
    /// True even when the report shows partial failures.
    pub ok: bool,
    /// Delivery accounting for this dispatch.
    #[serde(flatten)]
    pub report: DeliveryReport,
}

/// `POST /login` request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Legacy username.
    pub username: Option<String>,
    /// Password, hashed or plaintext at rest depending on migration state.
    pub password: Option<String>,
}

/// `POST /login` response body.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Issued bearer session token.
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_wire_names() {
        let response = HealthResponse {
            ok: true,
            registered_users: 2,
            total_tokens: 1,
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["registeredUsers"], 2);
        assert_eq!(value["totalTokens"], 1);
    }

    #[test]
    fn test_send_call_response_flattens_report() {
        let report = DeliveryReport {
            dispatch_id: uuid::Uuid::nil(),
            method: crate::dispatch::Strategy::Tokens,
            success_count: 3,
            failure_count: 0,
            failures: Vec::new(),
        };
        let value = serde_json::to_value(SendCallResponse { ok: true, report }).expect("serialize");
        assert_eq!(value["ok"], true);
        assert_eq!(value["method"], "tokens");
        assert_eq!(value["successCount"], 3);
        // Empty failure lists stay off the wire.
        assert!(value.get("failures").is_none());
    }
}
