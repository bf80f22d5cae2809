//! Legacy credential verification and session issuance.
//!
//! The legacy store holds a mix of argon2-hashed secrets and plaintext
//! records the migration has not reached yet. Which form a given user has
//! is unknown until read time, so verification resolves a tagged variant
//! from the stored string's format marker and never guesses in advance.
//!
//! The plaintext arm is a deprecated migration shim: it exists so legacy
//! users can still sign in, and it goes away once the store is fully
//! rehashed. Tests pin both arms on purpose.

use std::net::IpAddr;
use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use subtle::ConstantTimeEq;

use crate::constants::LEGACY_UID_PREFIX;
use crate::error::RelayError;
use crate::identity::{TokenIssuer, UserDirectory};
use crate::ratelimit::FixedWindowLimiter;

/// Format marker distinguishing migrated records from plaintext ones.
const PHC_ARGON2_PREFIX: &str = "$argon2";

/// A stored secret, resolved from its on-disk format at read time.
#[derive(Debug)]
pub enum StoredSecret<'a> {
    /// Argon2 PHC string written by the migration.
    Hashed(&'a str),
    /// DEPRECATED: plaintext record awaiting migration.
    Plain(&'a str),
}

impl<'a> StoredSecret<'a> {
    /// Classifies a stored string by its format marker.
    pub fn from_stored(stored: &'a str) -> Self {
        if stored.starts_with(PHC_ARGON2_PREFIX) {
            StoredSecret::Hashed(stored)
        } else {
            StoredSecret::Plain(stored)
        }
    }
}

/// Verifies a candidate password against a stored secret.
///
/// Hashed records go through argon2 verification; plaintext records are
/// compared with a constant-time equality check. Malformed hashes verify
/// as false rather than erroring, so a corrupt record reads as a wrong
/// password instead of a server fault.
pub fn verify_password(candidate: &str, stored: &str) -> bool {
    match StoredSecret::from_stored(stored) {
        StoredSecret::Hashed(phc) => match PasswordHash::new(phc) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                log::error!("stored secret has argon2 marker but failed to parse: {err}");
                false
            }
        },
        StoredSecret::Plain(plain) => {
            if candidate.len() != plain.len() {
                return false;
            }
            candidate.as_bytes().ct_eq(plain.as_bytes()).into()
        }
    }
}

/// The legacy login flow: throttle, look up, verify, issue.
pub struct LoginService {
    directory: Arc<dyn UserDirectory>,
    issuer: Arc<dyn TokenIssuer>,
    limiter: FixedWindowLimiter,
}

impl std::fmt::Debug for LoginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginService").finish_non_exhaustive()
    }
}

impl LoginService {
    /// Creates the login service over its two collaborators.
    pub fn new(directory: Arc<dyn UserDirectory>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            directory,
            issuer,
            limiter: FixedWindowLimiter::default(),
        }
    }

    /// Test constructor with an explicit limiter quota.
    #[cfg(test)]
    pub(crate) fn with_limiter(
        directory: Arc<dyn UserDirectory>,
        issuer: Arc<dyn TokenIssuer>,
        limiter: FixedWindowLimiter,
    ) -> Self {
        Self {
            directory,
            issuer,
            limiter,
        }
    }

    /// Authenticates `username`/`password` for a caller at `addr` and
    /// returns an issued session token.
    ///
    /// The rate limiter is consulted before any directory lookup or
    /// comparison, so a throttled caller learns nothing about the account.
    pub async fn login(
        &self,
        addr: IpAddr,
        username: &str,
        password: &str,
    ) -> Result<String, RelayError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(RelayError::Validation(
                "username and password are required".to_string(),
            ));
        }

        if !self.limiter.check(addr) {
            return Err(RelayError::RateLimited);
        }

        let user = self
            .directory
            .find_user(username)
            .await
            .map_err(|err| RelayError::Internal(format!("directory lookup failed: {err:#}")))?;

        let Some(user) = user else {
            log::info!("login rejected: unknown user \"{username}\"");
            return Err(RelayError::Unauthorized);
        };

        if !verify_password(password, &user.password) {
            log::info!("login rejected: bad password for \"{username}\"");
            return Err(RelayError::Unauthorized);
        }

        // Namespace the externally-facing identity so legacy uids can
        // never collide with non-legacy ones.
        let uid = format!("{LEGACY_UID_PREFIX}{username}");
        self.issuer
            .issue_legacy_token(&uid)
            .await
            .map_err(|err| RelayError::Internal(format!("token issuance failed: {err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StoredUser;
    use anyhow::Result;
    use argon2::password_hash::{PasswordHasher, SaltString};
    use async_trait::async_trait;
    use std::time::Duration;

    fn argon2_hash(password: &str) -> String {
        let salt = SaltString::from_b64("c29tZXNhbHQ").expect("valid salt");
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("hash")
            .to_string()
    }

    #[test]
    fn test_format_marker_selects_variant() {
        assert!(matches!(
            StoredSecret::from_stored("$argon2id$v=19$m=19456,t=2,p=1$abc$def"),
            StoredSecret::Hashed(_)
        ));
        assert!(matches!(
            StoredSecret::from_stored("hunter2"),
            StoredSecret::Plain(_)
        ));
    }

    #[test]
    fn test_verify_hashed_password() {
        let stored = argon2_hash("correct horse");
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
    }

    #[test]
    fn test_verify_plaintext_fallback() {
        // Deprecated migration path: plaintext records still verify.
        assert!(verify_password("hunter2", "hunter2"));
        assert!(!verify_password("hunter3", "hunter2"));
        assert!(!verify_password("hunter22", "hunter2"));
    }

    #[test]
    fn test_malformed_hash_verifies_false() {
        assert!(!verify_password("anything", "$argon2id$garbage"));
    }

    /// Directory double holding a single user.
    struct OneUserDirectory {
        username: String,
        password: String,
    }

    #[async_trait]
    impl UserDirectory for OneUserDirectory {
        async fn find_user(&self, username: &str) -> Result<Option<StoredUser>> {
            Ok((username == self.username).then(|| StoredUser {
                password: self.password.clone(),
            }))
        }
    }

    /// Issuer double echoing the uid back inside the token.
    struct EchoIssuer;

    #[async_trait]
    impl TokenIssuer for EchoIssuer {
        async fn issue_legacy_token(&self, uid: &str) -> Result<String> {
            Ok(format!("session-for-{uid}"))
        }
    }

    fn service(max_attempts: u32) -> LoginService {
        LoginService::with_limiter(
            Arc::new(OneUserDirectory {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
            }),
            Arc::new(EchoIssuer),
            FixedWindowLimiter::new(max_attempts, Duration::from_secs(300)),
        )
    }

    fn addr() -> IpAddr {
        IpAddr::from([127, 0, 0, 1])
    }

    #[tokio::test]
    async fn test_login_issues_namespaced_token() {
        let service = service(5);
        let token = service.login(addr(), "alice", "hunter2").await.expect("token");
        assert_eq!(token, "session-for-legacy:alice");
    }

    #[tokio::test]
    async fn test_login_rejects_unknown_user_and_bad_password() {
        let service = service(10);
        assert!(matches!(
            service.login(addr(), "bob", "hunter2").await,
            Err(RelayError::Unauthorized)
        ));
        assert!(matches!(
            service.login(addr(), "alice", "wrong").await,
            Err(RelayError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_login_missing_fields_is_validation_error() {
        let service = service(5);
        assert!(matches!(
            service.login(addr(), "", "pw").await,
            Err(RelayError::Validation(_))
        ));
        assert!(matches!(
            service.login(addr(), "alice", "").await,
            Err(RelayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_sixth_attempt_is_rate_limited_even_with_good_password() {
        let service = service(5);
        for _ in 0..5 {
            let _ = service.login(addr(), "alice", "wrong").await;
        }
        assert!(matches!(
            service.login(addr(), "alice", "hunter2").await,
            Err(RelayError::RateLimited)
        ));
    }
}
