//! Callrelay - push-notification relay for incoming-call dispatch.
//!
//! Devices register their push tokens keyed by user id and role; a
//! dispatch endpoint fans an "incoming call" notification out to one
//! recipient, a role-filtered set, a broadcast topic, or every registered
//! token, with per-destination delivery accounting. A secondary legacy
//! login path verifies stored credentials and issues session tokens
//! through an identity provider.
//!
//! # Architecture
//!
//! - **Registry** - volatile uid → device store, upsert latest-wins
//! - **Dispatch** - strategy selection, payload build, delivery accounting
//! - **Push** - FCM transport behind the [`push::PushTransport`] seam
//! - **Auth/Identity** - legacy verification over external collaborators
//! - **Server** - axum HTTP adapter
//!
//! # Modules
//!
//! - [`registry`] - device token registry
//! - [`dispatch`] - routing core and accounting
//! - [`push`] - outbound push transport
//! - [`auth`] / [`identity`] / [`ratelimit`] - legacy login path
//! - [`server`] - HTTP surface
//! - [`config`] - configuration loading/saving

// Library modules
pub mod auth;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod push;
pub mod ratelimit;
pub mod registry;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{CallRequest, DeliveryReport, Strategy};
pub use error::RelayError;
pub use registry::{DeviceRecord, DeviceRegistry, SharedRegistry};
pub use server::{app, serve, AppState};
