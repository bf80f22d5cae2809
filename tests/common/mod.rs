//! Shared helpers for integration tests.
//!
//! Spawns the relay on an ephemeral port with its collaborators pointed
//! at wiremock stubs, and returns the address tests talk to with reqwest.

use std::net::SocketAddr;
use std::sync::Arc;

use callrelay::auth::LoginService;
use callrelay::identity::{HttpTokenIssuer, HttpUserDirectory};
use callrelay::push::FcmClient;
use callrelay::{AppState, DeviceRegistry};

/// Server key the FCM stub expects in the Authorization header.
pub const TEST_SERVER_KEY: &str = "test-server-key";

/// Spawns the relay app with collaborator base URLs.
///
/// `fcm_url` is the full send endpoint; `directory_url` and
/// `identity_url` are base URLs.
pub async fn spawn_app(fcm_url: &str, directory_url: &str, identity_url: &str) -> SocketAddr {
    let transport = Arc::new(
        FcmClient::new(fcm_url.to_string(), TEST_SERVER_KEY.to_string()).expect("fcm client"),
    );
    let directory =
        Arc::new(HttpUserDirectory::new(directory_url.to_string()).expect("directory client"));
    let issuer = Arc::new(
        HttpTokenIssuer::new(identity_url.to_string(), "test-idp-key".to_string())
            .expect("issuer client"),
    );

    let state = AppState {
        registry: DeviceRegistry::shared(),
        transport,
        login: Arc::new(LoginService::new(directory, issuer)),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(
            listener,
            callrelay::app(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });

    addr
}

/// Registers a device through the HTTP surface.
pub async fn register_device(
    client: &reqwest::Client,
    addr: SocketAddr,
    uid: &str,
    role: &str,
    token: &str,
) {
    let response = client
        .post(format!("http://{addr}/register"))
        .json(&serde_json::json!({ "uid": uid, "role": role, "token": token }))
        .send()
        .await
        .expect("register request");
    assert!(response.status().is_success());
}
