//! Push-delivery transport.
//!
//! Defines the [`PushTransport`] seam the dispatcher sends through, plus
//! [`FcmClient`], the production implementation speaking the FCM legacy
//! HTTP API. Multicast sends return one outcome per input token, aligned
//! by index, which is what the delivery accounting relies on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::dispatch::CallNotification;

/// Per-destination result of one send.
#[derive(Clone, Debug)]
pub enum SendOutcome {
    /// The push service accepted the message for this destination.
    Delivered {
        /// Message id assigned by the push service, when one is returned.
        message_id: Option<String>,
    },
    /// The push service rejected this destination.
    Failed {
        /// Service error classification, e.g. "NotRegistered".
        code: String,
    },
}

impl SendOutcome {
    /// Whether this outcome is a delivery.
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

/// Outbound push delivery seam.
///
/// Implementations own their HTTP client and timeout; the dispatcher
/// never imposes an additional timeout layer. Errors returned here mean
/// the *call* failed (network, auth, malformed response); per-destination
/// rejections come back as [`SendOutcome::Failed`] instead.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Sends the notification to a single device token.
    async fn send_to_token(&self, payload: &CallNotification, token: &str) -> Result<SendOutcome>;

    /// Sends the notification to many device tokens in one call.
    ///
    /// The returned vector has exactly one outcome per input token, in
    /// input order.
    async fn send_to_tokens(
        &self,
        payload: &CallNotification,
        tokens: &[String],
    ) -> Result<Vec<SendOutcome>>;

    /// Sends the notification to a broadcast topic.
    ///
    /// Topic fan-out happens inside the push service, so there is no
    /// per-destination breakdown; success is binary.
    async fn send_to_topic(&self, payload: &CallNotification, topic: &str) -> Result<()>;
}

/// FCM legacy HTTP API client.
///
/// One instance is created at startup and shared; reqwest pools
/// connections internally.
#[derive(Debug, Clone)]
pub struct FcmClient {
    client: reqwest::Client,
    api_url: String,
    server_key: String,
}

/// Outbound FCM message envelope.
///
/// Exactly one of `to` / `registration_ids` is set per send.
#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_ids: Option<&'a [String]>,
    notification: &'a crate::dispatch::NotificationFields,
    data: &'a crate::dispatch::CallData,
}

/// FCM response for token and multicast sends.
#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    success: u32,
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    results: Vec<FcmResult>,
}

/// One entry of the FCM `results` array, index-aligned with the request.
#[derive(Debug, Deserialize)]
struct FcmResult {
    message_id: Option<String>,
    error: Option<String>,
}

/// FCM response for topic sends.
#[derive(Debug, Deserialize)]
struct FcmTopicResponse {
    message_id: Option<serde_json::Value>,
    error: Option<String>,
}

impl FcmClient {
    /// Creates a client for the given endpoint and server key.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: String, server_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build FCM HTTP client")?;
        Ok(Self {
            client,
            api_url,
            server_key,
        })
    }

    /// Creates a client with a pre-configured reqwest client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: reqwest::Client, api_url: String, server_key: String) -> Self {
        Self {
            client,
            api_url,
            server_key,
        }
    }

    /// Posts one message envelope and returns the raw response body.
    async fn post(&self, message: &FcmMessage<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("key={}", self.server_key))
            .header("Content-Type", "application/json")
            .json(message)
            .send()
            .await
            .context("FCM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("FCM send rejected: {} - {}", status, body);
            anyhow::bail!("push service returned {}", status);
        }
        Ok(response)
    }
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send_to_token(&self, payload: &CallNotification, token: &str) -> Result<SendOutcome> {
        let message = FcmMessage {
            to: Some(token),
            registration_ids: None,
            notification: &payload.notification,
            data: &payload.data,
        };
        let response: FcmResponse = self
            .post(&message)
            .await?
            .json()
            .await
            .context("Failed to parse FCM response")?;

        match response.results.into_iter().next() {
            Some(result) => Ok(result_to_outcome(result)),
            None => {
                // A single send must come back with exactly one result
                // entry; assuming delivery here would report a success the
                // push service never made.
                anyhow::bail!(
                    "push service returned no result for a single send \
                     (success={}, failure={})",
                    response.success,
                    response.failure
                );
            }
        }
    }

    async fn send_to_tokens(
        &self,
        payload: &CallNotification,
        tokens: &[String],
    ) -> Result<Vec<SendOutcome>> {
        let message = FcmMessage {
            to: None,
            registration_ids: Some(tokens),
            notification: &payload.notification,
            data: &payload.data,
        };
        let response: FcmResponse = self
            .post(&message)
            .await?
            .json()
            .await
            .context("Failed to parse FCM multicast response")?;

        log::debug!(
            "FCM multicast: {} delivered, {} failed of {}",
            response.success,
            response.failure,
            tokens.len()
        );

        if response.results.len() != tokens.len() {
            // A misaligned results array would make the per-token
            // accounting attribute failures to the wrong device.
            anyhow::bail!(
                "push service returned {} results for {} tokens",
                response.results.len(),
                tokens.len()
            );
        }

        Ok(response.results.into_iter().map(result_to_outcome).collect())
    }

    async fn send_to_topic(&self, payload: &CallNotification, topic: &str) -> Result<()> {
        let target = format!("/topics/{topic}");
        let message = FcmMessage {
            to: Some(&target),
            registration_ids: None,
            notification: &payload.notification,
            data: &payload.data,
        };
        let response: FcmTopicResponse = self
            .post(&message)
            .await?
            .json()
            .await
            .context("Failed to parse FCM topic response")?;

        if let Some(error) = response.error {
            anyhow::bail!("topic send rejected: {error}");
        }
        log::info!(
            "sent topic notification to /topics/{topic} (message_id={:?})",
            response.message_id
        );
        Ok(())
    }
}

/// Maps one FCM result entry to a [`SendOutcome`].
fn result_to_outcome(result: FcmResult) -> SendOutcome {
    match result.error {
        Some(code) => SendOutcome::Failed { code },
        None => SendOutcome::Delivered {
            message_id: result.message_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_to_outcome() {
        let delivered = result_to_outcome(FcmResult {
            message_id: Some("0:123".to_string()),
            error: None,
        });
        assert!(delivered.is_delivered());

        let failed = result_to_outcome(FcmResult {
            message_id: None,
            error: Some("NotRegistered".to_string()),
        });
        assert!(!failed.is_delivered());
        match failed {
            SendOutcome::Failed { code } => assert_eq!(code, "NotRegistered"),
            SendOutcome::Delivered { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn test_fcm_client_creation() {
        let client = FcmClient::new(
            "https://fcm.example.com/send".to_string(),
            "server-key".to_string(),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_multicast_envelope_shape() {
        let payload = CallNotification::sample_for_tests();
        let tokens = vec!["tok-A".to_string(), "tok-B".to_string()];
        let message = FcmMessage {
            to: None,
            registration_ids: Some(&tokens),
            notification: &payload.notification,
            data: &payload.data,
        };
        let value = serde_json::to_value(&message).expect("serialize");
        assert!(value.get("to").is_none());
        assert_eq!(
            value["registration_ids"],
            serde_json::json!(["tok-A", "tok-B"])
        );
        assert!(value["notification"]["title"].is_string());
    }
}
