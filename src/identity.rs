//! Identity-provider collaborators for the legacy login path.
//!
//! The relay never stores credentials or mints tokens itself; it talks to
//! two external services through the seams defined here:
//!
//! - [`UserDirectory`] — looks up the stored credential record for a
//!   username.
//! - [`TokenIssuer`] — issues a bearer session token for a verified,
//!   namespaced identity.
//!
//! The HTTP implementations mirror the directory layout of the legacy
//! store: one JSON document per user under `/legacy_users/<username>.json`,
//! with a literal `null` body for unknown users.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Stored credential record for one legacy user.
#[derive(Clone, Debug, Deserialize)]
pub struct StoredUser {
    /// Stored secret: an argon2 PHC string for migrated users, plaintext
    /// for records the migration has not reached yet.
    pub password: String,
}

/// Credential lookup seam.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds the stored record for `username`, if one exists.
    async fn find_user(&self, username: &str) -> Result<Option<StoredUser>>;
}

/// Session-token issuance seam.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issues a bearer token for the (already namespaced) uid, carrying
    /// the `legacy: true` claim.
    async fn issue_legacy_token(&self, uid: &str) -> Result<String>;
}

/// HTTP-backed user directory.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    /// Creates a directory client for the given base URL.
    pub fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build directory HTTP client")?;
        Ok(Self { client, base_url })
    }

    /// Creates a directory client with a pre-configured reqwest client.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_user(&self, username: &str) -> Result<Option<StoredUser>> {
        let url = format!("{}/legacy_users/{}.json", self.base_url, username);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("directory request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("directory returned {}", response.status());
        }

        // The legacy store answers 200 with a literal null for unknown
        // keys, so deserialize into an Option.
        let user: Option<StoredUser> = response
            .json()
            .await
            .context("Failed to parse directory response")?;
        Ok(user)
    }
}

/// HTTP-backed token issuer.
#[derive(Debug, Clone)]
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Request body sent to the identity provider.
#[derive(Debug, Serialize)]
struct IssueTokenRequest<'a> {
    /// Namespaced identity the token is minted for.
    uid: &'a str,
    /// Claims embedded in the issued token.
    claims: TokenClaims,
}

/// Claims attached to tokens issued through the legacy path.
#[derive(Debug, Serialize)]
struct TokenClaims {
    /// Marks the session as coming from the legacy verification path.
    legacy: bool,
}

/// Identity-provider response.
#[derive(Debug, Deserialize)]
struct IssueTokenResponse {
    /// The issued bearer token.
    token: String,
}

impl HttpTokenIssuer {
    /// Creates an issuer client for the given provider.
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build issuer HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Creates an issuer client with a pre-configured reqwest client.
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue_legacy_token(&self, uid: &str) -> Result<String> {
        let url = format!("{}/v1/tokens", self.base_url);
        let request = IssueTokenRequest {
            uid,
            claims: TokenClaims { legacy: true },
        };
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("token issue request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("identity provider returned {}", response.status());
        }

        let body: IssueTokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        log::info!("issued legacy session token for uid={uid}");
        Ok(body.token)
    }
}
