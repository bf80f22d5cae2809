//! HTTP surface of the relay.
//!
//! Thin axum adapter over the core: handlers validate and deserialize,
//! then delegate to the registry, the dispatcher, or the login service,
//! and map [`crate::error::RelayError`] onto HTTP statuses.
//!
//! # Endpoints
//!
//! - `GET /` - liveness with registry counts
//! - `POST /register` - upsert a device token
//! - `GET /tokens` - diagnostic listing (token previews only)
//! - `GET /send-call` / `POST /send-call` - usage hint / dispatch a call
//! - `POST /login` - legacy credential login
//!
//! # Modules
//!
//! - [`routes`] - handler functions
//! - [`types`] - request/response data types

pub mod routes;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;

use crate::auth::LoginService;
use crate::config::Config;
use crate::identity::{HttpTokenIssuer, HttpUserDirectory};
use crate::push::{FcmClient, PushTransport};
use crate::registry::{DeviceRegistry, SharedRegistry};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The device registry.
    pub registry: SharedRegistry,
    /// Outbound push transport.
    pub transport: Arc<dyn PushTransport>,
    /// Legacy login flow.
    pub login: Arc<LoginService>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

/// Builds the axum router over the given state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health))
        .route("/register", post(routes::register))
        .route("/tokens", get(routes::list_tokens))
        .route("/send-call", get(routes::send_call_usage).post(routes::send_call))
        .route("/login", post(routes::login))
        .with_state(state)
}

/// Runs the relay until the process is stopped.
///
/// Builds the collaborator clients from config, binds the listener, and
/// serves with per-connection peer addresses so the login throttle can
/// key on client IPs.
pub async fn serve(config: Config) -> Result<()> {
    config.validate_for_serve()?;

    let transport = Arc::new(FcmClient::new(
        config.fcm_api_url.clone(),
        config.fcm_server_key.clone(),
    )?);
    let directory = Arc::new(HttpUserDirectory::new(config.directory_url.clone())?);
    let issuer = Arc::new(HttpTokenIssuer::new(
        config.identity_url.clone(),
        config.identity_api_key.clone(),
    )?);

    let state = AppState {
        registry: DeviceRegistry::shared(),
        transport,
        login: Arc::new(LoginService::new(directory, issuer)),
    };

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address \"{}\"", config.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    log::info!("callrelay listening on {addr}");
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("http server failed")
}
