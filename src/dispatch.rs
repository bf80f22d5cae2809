//! Call-notification routing and delivery accounting.
//!
//! This is the core of the relay: given an incoming-call request, decide
//! exactly one delivery strategy, build one payload, hand it to the push
//! transport, and account for what came back.
//!
//! # Strategy precedence
//!
//! First match wins, in this order:
//!
//! 1. **single** — the request names a doctor uid with a registered
//!    device. A named-but-unregistered uid is a soft miss: logged, then
//!    routing falls through. A directly-addressed recipient is always
//!    more precise than any broadcast, which is why this outranks the
//!    explicit topic hint.
//! 2. **topic** — the request asked for topic delivery; the fixed
//!    doctors topic is used and fan-out happens inside the push service.
//! 3. **tokens** — role-filtered registry snapshot if a role filter is
//!    present, otherwise every registered token. An empty set here is a
//!    client-visible no-recipients condition, not a server fault.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DOCTORS_TOPIC;
use crate::error::RelayError;
use crate::push::{PushTransport, SendOutcome};
use crate::registry::{token_preview, DeviceRegistry, SharedRegistry};

// ============================================================================
// Request
// ============================================================================

/// An incoming-call dispatch request.
///
/// `patient_name` plus at least one of `channel_id`/`room_id` are
/// required; everything else is routing hints and call metadata passed
/// through to the notification payload.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallRequest {
    /// Patient the call is about. Required.
    pub patient_name: Option<String>,
    /// Call channel identifier.
    pub channel_id: Option<String>,
    /// Alternative name for the channel identifier.
    pub room_id: Option<String>,
    /// Target a specific doctor's registered device.
    pub doctor_uid: Option<String>,
    /// Restrict token fan-out to one role.
    pub target_role: Option<String>,
    /// Request delivery through the doctors broadcast topic.
    pub use_broadcast_topic: bool,
    /// Patient age, free-form.
    pub age: Option<String>,
    /// Patient sex, free-form.
    pub sex: Option<String>,
    /// Reported symptoms.
    pub symptoms: Option<String>,
    /// Patient address.
    pub address: Option<String>,
    /// Client-side submission id for correlation.
    pub submission_id: Option<String>,
    /// Auxiliary media token the callee needs to join the call.
    pub call_token: Option<String>,
}

/// Returns the trimmed value when it is non-empty.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl CallRequest {
    /// Validates the request before any registry read.
    pub fn validate(&self) -> Result<(), RelayError> {
        if non_empty(&self.patient_name).is_none() {
            return Err(RelayError::Validation(
                "patientName is required".to_string(),
            ));
        }
        if self.channel().is_none() {
            return Err(RelayError::Validation(
                "channelId or roomId is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Normalized channel identifier: `channel_id` wins over `room_id`.
    pub fn channel(&self) -> Option<&str> {
        non_empty(&self.channel_id).or_else(|| non_empty(&self.room_id))
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// The delivery strategy chosen for one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// One directly-addressed device token.
    Single,
    /// Broadcast topic; fan-out inside the push service.
    Topic,
    /// Explicit multi-token fan-out with per-token accounting.
    Tokens,
}

impl Strategy {
    /// String form used in responses and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Topic => "topic",
            Strategy::Tokens => "tokens",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Strategy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A resolved strategy plus its destination set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutePlan {
    /// Send to this one token, registered for this uid.
    Single {
        /// The targeted doctor uid.
        uid: String,
        /// That uid's registered token.
        token: String,
    },
    /// Send to the named broadcast topic.
    Topic(String),
    /// Send to this token set, optionally filtered by role.
    Tokens {
        /// Destination tokens, snapshot order.
        tokens: Vec<String>,
        /// Role filter that produced the set, when one was given.
        role: Option<String>,
    },
}

impl RoutePlan {
    /// The strategy this plan executes.
    pub fn strategy(&self) -> Strategy {
        match self {
            RoutePlan::Single { .. } => Strategy::Single,
            RoutePlan::Topic(_) => Strategy::Topic,
            RoutePlan::Tokens { .. } => Strategy::Tokens,
        }
    }
}

/// Resolves the delivery strategy for a validated request against a
/// registry snapshot.
///
/// # Errors
///
/// Returns [`RelayError::NoRecipients`] when the tokens strategy resolves
/// to an empty destination set.
pub fn route(registry: &DeviceRegistry, request: &CallRequest) -> Result<RoutePlan, RelayError> {
    if let Some(uid) = non_empty(&request.doctor_uid) {
        if let Some(record) = registry.lookup(uid) {
            return Ok(RoutePlan::Single {
                uid: uid.to_string(),
                token: record.token.clone(),
            });
        }
        // Soft miss: the caller named a recipient we do not know about.
        // Fall through to broadcast rather than hard-failing the call.
        log::warn!("doctor uid \"{uid}\" has no registered device, falling back to broadcast");
    }

    if request.use_broadcast_topic {
        return Ok(RoutePlan::Topic(DOCTORS_TOPIC.to_string()));
    }

    let (tokens, role) = match non_empty(&request.target_role) {
        Some(role) => {
            let tokens = registry
                .by_role(role)
                .into_iter()
                .map(|record| record.token.clone())
                .collect::<Vec<_>>();
            (tokens, Some(role.to_string()))
        }
        None => (registry.all_tokens(), None),
    };

    if tokens.is_empty() {
        return Err(RelayError::NoRecipients(role));
    }
    Ok(RoutePlan::Tokens { tokens, role })
}

// ============================================================================
// Payload
// ============================================================================

/// Visible notification fields (title/body shown by the device).
#[derive(Clone, Debug, Serialize)]
pub struct NotificationFields {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Sound hint for the receiving device.
    pub sound: String,
}

/// Structured data section carried alongside the visible notification.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    /// Message discriminator for the receiving app.
    pub kind: String,
    /// Patient the call is about.
    pub patient_name: String,
    /// Normalized call channel.
    pub channel_id: String,
    /// Auxiliary media token, when the caller supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_token: Option<String>,
    /// Targeted doctor uid, when the caller named one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_uid: Option<String>,
    /// Client submission id for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    /// Patient age.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    /// Patient sex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    /// Reported symptoms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    /// Patient address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// When the relay sent this notification (RFC 3339).
    pub sent_at: String,
}

/// The one payload built per dispatch, independent of strategy.
#[derive(Clone, Debug, Serialize)]
pub struct CallNotification {
    /// Visible notification fields.
    pub notification: NotificationFields,
    /// Structured call context.
    pub data: CallData,
}

impl CallNotification {
    /// Builds the payload from a validated request.
    ///
    /// Callers must have run [`CallRequest::validate`] first; a missing
    /// patient name or channel would have been rejected there.
    pub fn build(request: &CallRequest) -> Self {
        let patient_name = non_empty(&request.patient_name).unwrap_or("Unknown").to_string();
        let channel_id = request.channel().unwrap_or_default().to_string();
        Self {
            notification: NotificationFields {
                title: "Incoming call".to_string(),
                body: format!("{patient_name} is calling"),
                sound: "default".to_string(),
            },
            data: CallData {
                kind: "incoming_call".to_string(),
                patient_name,
                channel_id,
                call_token: non_empty(&request.call_token).map(str::to_string),
                doctor_uid: non_empty(&request.doctor_uid).map(str::to_string),
                submission_id: non_empty(&request.submission_id).map(str::to_string),
                age: non_empty(&request.age).map(str::to_string),
                sex: non_empty(&request.sex).map(str::to_string),
                symptoms: non_empty(&request.symptoms).map(str::to_string),
                address: non_empty(&request.address).map(str::to_string),
                sent_at: Utc::now().to_rfc3339(),
            },
        }
    }
}

#[cfg(test)]
impl CallNotification {
    /// Minimal payload for transport tests.
    pub(crate) fn sample_for_tests() -> Self {
        let request = CallRequest {
            patient_name: Some("Jane".to_string()),
            channel_id: Some("room7".to_string()),
            ..CallRequest::default()
        };
        Self::build(&request)
    }
}

// ============================================================================
// Accounting
// ============================================================================

/// One failed destination in a tokens dispatch.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    /// Truncated token, safe for display.
    pub token: String,
    /// Push-service error classification, e.g. "NotRegistered".
    pub code: String,
    /// Readable description of the classification.
    pub message: String,
}

/// Readable description for a push-service error classification.
fn describe_failure(code: &str) -> String {
    match code {
        "NotRegistered" => "device token is no longer registered".to_string(),
        "InvalidRegistration" => "device token is malformed".to_string(),
        "MismatchSenderId" => "token belongs to a different sender".to_string(),
        "MessageTooBig" => "payload exceeded the push service limit".to_string(),
        other => format!("push service rejected this destination ({other})"),
    }
}

/// Outcome of one dispatch call.
///
/// For the tokens strategy `failure_count > 0` with a success elsewhere is
/// a *partial* failure: the request still succeeds and callers inspect
/// these counts. Single and topic sends are binary.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    /// Relay-assigned id for this dispatch, for log correlation.
    pub dispatch_id: Uuid,
    /// Strategy that was executed.
    pub method: Strategy,
    /// Destinations the push service accepted.
    pub success_count: usize,
    /// Destinations the push service rejected.
    pub failure_count: usize,
    /// Per-destination failure detail, truncated tokens only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DeliveryFailure>,
}

/// Tallies an index-aligned outcome vector into a report.
fn account_tokens(dispatch_id: Uuid, tokens: &[String], outcomes: &[SendOutcome]) -> DeliveryReport {
    let mut success_count = 0;
    let mut failures = Vec::new();
    for (token, outcome) in tokens.iter().zip(outcomes) {
        match outcome {
            SendOutcome::Delivered { .. } => success_count += 1,
            SendOutcome::Failed { code } => {
                log::warn!(
                    "dispatch {dispatch_id}: delivery to {} failed: {code}",
                    token_preview(token)
                );
                failures.push(DeliveryFailure {
                    token: token_preview(token),
                    code: code.clone(),
                    message: describe_failure(code),
                });
            }
        }
    }
    DeliveryReport {
        dispatch_id,
        method: Strategy::Tokens,
        success_count,
        failure_count: failures.len(),
        failures,
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Routes and delivers one call notification.
///
/// Validates the request, resolves the strategy against a registry
/// snapshot, builds the payload once, invokes the transport, and returns
/// the accounting. Transport errors are logged in full and surfaced as a
/// redacted [`RelayError::Transport`].
pub async fn dispatch(
    registry: &SharedRegistry,
    transport: &dyn PushTransport,
    request: &CallRequest,
) -> Result<DeliveryReport, RelayError> {
    request.validate()?;

    // Snapshot read: registrations arriving after this point are not part
    // of this dispatch's destination set.
    let plan = {
        let guard = registry
            .read()
            .map_err(|_| RelayError::Internal("registry lock poisoned".to_string()))?;
        route(&guard, request)?
    };

    let dispatch_id = Uuid::new_v4();
    let payload = CallNotification::build(request);
    log::info!(
        "dispatch {dispatch_id}: strategy={} patient={}",
        plan.strategy(),
        payload.data.patient_name
    );

    match plan {
        RoutePlan::Single { uid, token } => {
            let outcome = transport
                .send_to_token(&payload, &token)
                .await
                .map_err(|err| transport_error(dispatch_id, &err))?;
            match outcome {
                SendOutcome::Delivered { message_id } => {
                    log::info!(
                        "dispatch {dispatch_id}: delivered to uid={uid} (message_id={message_id:?})"
                    );
                    Ok(DeliveryReport {
                        dispatch_id,
                        method: Strategy::Single,
                        success_count: 1,
                        failure_count: 0,
                        failures: Vec::new(),
                    })
                }
                SendOutcome::Failed { code } => {
                    // A single-target rejection has no partial state to
                    // report, so it fails the whole call.
                    log::error!(
                        "dispatch {dispatch_id}: single send to {} rejected: {code}",
                        token_preview(&token)
                    );
                    Err(RelayError::Transport(format!(
                        "push service rejected the destination ({code})"
                    )))
                }
            }
        }
        RoutePlan::Topic(topic) => {
            transport
                .send_to_topic(&payload, &topic)
                .await
                .map_err(|err| transport_error(dispatch_id, &err))?;
            Ok(DeliveryReport {
                dispatch_id,
                method: Strategy::Topic,
                success_count: 1,
                failure_count: 0,
                failures: Vec::new(),
            })
        }
        RoutePlan::Tokens { tokens, role } => {
            let outcomes = transport
                .send_to_tokens(&payload, &tokens)
                .await
                .map_err(|err| transport_error(dispatch_id, &err))?;
            let report = account_tokens(dispatch_id, &tokens, &outcomes);
            log::info!(
                "dispatch {dispatch_id}: tokens fan-out role={role:?} delivered {}/{}",
                report.success_count,
                tokens.len()
            );
            Ok(report)
        }
    }
}

/// Logs full transport detail and returns the redacted client-facing error.
fn transport_error(dispatch_id: Uuid, err: &anyhow::Error) -> RelayError {
    log::error!("dispatch {dispatch_id}: transport failure: {err:#}");
    RelayError::Transport("push delivery failed".to_string())
}
