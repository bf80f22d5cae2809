//! Application-wide constants for callrelay.
//!
//! This module centralizes magic numbers and well-known names so they are
//! discoverable in one place. Constants are grouped by domain with
//! documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timeouts**: Network timeouts for collaborator calls
//! - **Login throttling**: Fixed-window quota for the legacy login path
//! - **Dispatch**: Topic names and display truncation

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for collaborator calls.
///
/// Applies to individual requests to the push transport and the identity
/// provider. These are the only suspension points in a dispatch or login
/// request, so this bound keeps every request finite.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Login throttling
// ============================================================================

/// Maximum login attempts allowed per client address within one window.
pub const LOGIN_MAX_ATTEMPTS: u32 = 5;

/// Fixed decay window for login attempt counting.
///
/// Combined with [`LOGIN_MAX_ATTEMPTS`] this yields the 5-attempts-per-
/// 5-minutes quota. The counter resets when a window expires; there is no
/// sliding behavior.
pub const LOGIN_ATTEMPT_WINDOW: Duration = Duration::from_secs(300);

// ============================================================================
// Dispatch
// ============================================================================

/// Well-known broadcast topic reaching every subscribed doctor device.
///
/// Topic sends go through the push service's own fan-out, so no
/// per-destination accounting is available for this strategy.
pub const DOCTORS_TOPIC: &str = "doctors";

/// Default role assigned to registrations that do not specify one.
pub const DEFAULT_ROLE: &str = "user";

/// Number of leading device-token characters shown in diagnostics.
///
/// Full tokens are delivery credentials and never appear in logs or
/// responses; previews keep failure reports correlatable without leaking
/// them.
pub const TOKEN_PREVIEW_LEN: usize = 12;

/// Default endpoint of the FCM legacy HTTP API.
pub const DEFAULT_FCM_API_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Namespace prefix applied to identities issued through the legacy login
/// path, so they cannot collide with non-legacy identities.
pub const LEGACY_UID_PREFIX: &str = "legacy:";
