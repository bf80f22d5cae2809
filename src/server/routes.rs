//! Handler functions for the HTTP surface.
//!
//! Each handler returns `Result<Json<_>, RelayError>`; the error type
//! carries the status mapping, so handlers only express the happy path
//! and the taxonomy does the rest.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::Json;

use super::types::{
    HealthResponse, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
    SendCallResponse, SendCallUsage, TokenListing, TokensResponse,
};
use super::AppState;
use crate::dispatch::{self, CallRequest};
use crate::error::RelayError;
use crate::registry::{token_preview, DeviceRegistry};

/// Runs a closure over the registry read lock.
fn read_registry<T>(
    state: &AppState,
    f: impl FnOnce(&DeviceRegistry) -> T,
) -> Result<T, RelayError> {
    let guard = state
        .registry
        .read()
        .map_err(|_| RelayError::Internal("registry lock poisoned".to_string()))?;
    Ok(f(&guard))
}

/// `GET /` - liveness plus registry counts.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, RelayError> {
    let (registered_users, total_tokens) =
        read_registry(&state, |registry| (registry.len(), registry.token_count()))?;
    Ok(Json(HealthResponse {
        ok: true,
        registered_users,
        total_tokens,
    }))
}

/// `POST /register` - upsert a device token for a uid.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, RelayError> {
    let uid = body
        .uid
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::Validation("uid is required".to_string()))?;
    let token = body
        .token
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::Validation("token is required".to_string()))?;

    let mut guard = state
        .registry
        .write()
        .map_err(|_| RelayError::Internal("registry lock poisoned".to_string()))?;
    if !guard.register(uid, token, body.role.as_deref()) {
        return Err(RelayError::Validation("uid and token are required".to_string()));
    }

    Ok(Json(RegisterResponse {
        ok: true,
        uid: uid.to_string(),
        token: token.to_string(),
    }))
}

/// `GET /tokens` - diagnostic listing with truncated tokens.
pub async fn list_tokens(
    State(state): State<AppState>,
) -> Result<Json<TokensResponse>, RelayError> {
    let response = read_registry(&state, |registry| {
        let mut users: Vec<TokenListing> = registry
            .iter()
            .map(|(uid, record)| TokenListing {
                uid: uid.to_string(),
                role: record.role.clone(),
                token_preview: token_preview(&record.token),
                registered_at: record.registered_at.to_rfc3339(),
            })
            .collect();
        // Stable output regardless of map iteration order.
        users.sort_by(|a, b| a.uid.cmp(&b.uid));
        TokensResponse {
            ok: true,
            total_users: registry.len(),
            total_tokens: registry.token_count(),
            users,
        }
    })?;
    Ok(Json(response))
}

/// `GET /send-call` - usage hint for the dispatch endpoint.
pub async fn send_call_usage(
    State(state): State<AppState>,
) -> Result<Json<SendCallUsage>, RelayError> {
    let registered_tokens = read_registry(&state, DeviceRegistry::token_count)?;
    Ok(Json(SendCallUsage {
        ok: true,
        message: "POST a call payload (patientName plus channelId or roomId) to dispatch"
            .to_string(),
        registered_tokens,
    }))
}

/// `POST /send-call` - route and deliver one call notification.
pub async fn send_call(
    State(state): State<AppState>,
    Json(request): Json<CallRequest>,
) -> Result<Json<SendCallResponse>, RelayError> {
    let report = dispatch::dispatch(&state.registry, state.transport.as_ref(), &request).await?;
    Ok(Json(SendCallResponse { ok: true, report }))
}

/// `POST /login` - legacy credential login, throttled per client address.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, RelayError> {
    let username = body.username.as_deref().unwrap_or_default();
    let password = body.password.as_deref().unwrap_or_default();
    let token = state.login.login(peer.ip(), username, password).await?;
    Ok(Json(LoginResponse { token }))
}
