//! Device token registry.
//!
//! Maps each registered user id to its current push token, role, and
//! registration time. The registry is volatile by design: it lives for the
//! process lifetime and is rebuilt as devices re-register after a restart.
//!
//! Re-registration overwrites: the latest token and role for a uid win.
//! Entries are never expired or deleted; expiry is a deliberate extension
//! point left to a future revision.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::constants::{DEFAULT_ROLE, TOKEN_PREVIEW_LEN};

/// Truncates a device token for display.
///
/// Full tokens are delivery credentials; logs, failure reports, and the
/// diagnostic listing only ever show this preview.
pub fn token_preview(token: &str) -> String {
    if token.chars().count() <= TOKEN_PREVIEW_LEN {
        token.to_string()
    } else {
        let head: String = token.chars().take(TOKEN_PREVIEW_LEN).collect();
        format!("{head}…")
    }
}

/// A registered device for one user.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    /// Opaque push token identifying the device at the push service.
    pub token: String,
    /// Free-form role used for filtered dispatch ("doctor", "user", ...).
    pub role: String,
    /// When this registration (or re-registration) happened.
    pub registered_at: DateTime<Utc>,
}

/// In-memory uid → device registry.
///
/// Plain struct with no interior locking; the HTTP layer shares it as
/// [`SharedRegistry`]. Reads take a snapshot under the read lock, so a
/// registration landing mid-dispatch is simply not part of that dispatch's
/// destination set.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Maps user id → current device record.
    devices: HashMap<String, DeviceRecord>,
}

/// Registry handle shared between the HTTP layer and the dispatcher.
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

impl DeviceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shareable handle around an empty registry.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Registers or re-registers a device for `uid`.
    ///
    /// Upsert semantics: an existing record for the same uid is replaced
    /// wholesale, so the latest registration always wins. A missing role
    /// defaults to [`DEFAULT_ROLE`].
    ///
    /// Returns `false` (and changes nothing) when `uid` or `token` is
    /// empty; those are the only invalid inputs.
    pub fn register(&mut self, uid: &str, token: &str, role: Option<&str>) -> bool {
        if uid.trim().is_empty() || token.trim().is_empty() {
            return false;
        }
        let role = role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE);
        let previous = self.devices.insert(
            uid.to_string(),
            DeviceRecord {
                token: token.to_string(),
                role: role.to_string(),
                registered_at: Utc::now(),
            },
        );
        if previous.is_some() {
            log::debug!("re-registered device for uid={uid} role={role}");
        } else {
            log::info!("registered device for uid={uid} role={role}");
        }
        true
    }

    /// Looks up the device record for a uid.
    pub fn lookup(&self, uid: &str) -> Option<&DeviceRecord> {
        self.devices.get(uid)
    }

    /// Returns the records whose role matches `role`, case-insensitively.
    pub fn by_role(&self, role: &str) -> Vec<&DeviceRecord> {
        self.devices
            .values()
            .filter(|record| record.role.eq_ignore_ascii_case(role))
            .collect()
    }

    /// Snapshot of every distinct token currently registered.
    ///
    /// Two uids sharing one physical device collapse to a single token, so
    /// a broadcast never double-delivers to the same destination.
    pub fn all_tokens(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.devices
            .values()
            .filter(|record| seen.insert(record.token.as_str()))
            .map(|record| record.token.clone())
            .collect()
    }

    /// Number of distinct registered uids.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of distinct tokens (deduplicated across uids).
    pub fn token_count(&self) -> usize {
        self.devices
            .values()
            .map(|record| record.token.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Iterates over all (uid, record) pairs, for diagnostic listings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceRecord)> {
        self.devices.iter().map(|(uid, record)| (uid.as_str(), record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.register("d1", "tok-A", Some("doctor")));
        assert_eq!(registry.len(), 1);

        let record = registry.lookup("d1").expect("registered record");
        assert_eq!(record.token, "tok-A");
        assert_eq!(record.role, "doctor");
    }

    #[test]
    fn test_register_rejects_empty_fields() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.register("", "tok-A", None));
        assert!(!registry.register("d1", "", None));
        assert!(!registry.register("d1", "   ", None));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistration_latest_wins() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", "tok-A", Some("doctor"));
        registry.register("d1", "tok-B", None);

        assert_eq!(registry.len(), 1);
        let record = registry.lookup("d1").expect("registered record");
        assert_eq!(record.token, "tok-B");
        // Role is replaced too, falling back to the default.
        assert_eq!(record.role, DEFAULT_ROLE);
    }

    #[test]
    fn test_missing_role_defaults() {
        let mut registry = DeviceRegistry::new();
        registry.register("u1", "tok-A", None);
        registry.register("u2", "tok-B", Some("  "));
        assert_eq!(registry.lookup("u1").expect("record").role, DEFAULT_ROLE);
        assert_eq!(registry.lookup("u2").expect("record").role, DEFAULT_ROLE);
    }

    #[test]
    fn test_by_role_is_case_insensitive() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", "tok-A", Some("Doctor"));
        registry.register("d2", "tok-B", Some("doctor"));
        registry.register("u1", "tok-C", Some("user"));

        let doctors = registry.by_role("DOCTOR");
        assert_eq!(doctors.len(), 2);
        assert!(registry.by_role("nurse").is_empty());
    }

    #[test]
    fn test_token_preview_truncates_long_tokens() {
        assert_eq!(token_preview("short"), "short");
        let long = "a".repeat(40);
        let preview = token_preview(&long);
        assert_eq!(preview.chars().count(), TOKEN_PREVIEW_LEN + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_all_tokens_deduplicates_shared_devices() {
        let mut registry = DeviceRegistry::new();
        registry.register("d1", "tok-shared", Some("doctor"));
        registry.register("d2", "tok-shared", Some("doctor"));
        registry.register("u1", "tok-other", None);

        let tokens = registry.all_tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(registry.token_count(), 2);
        assert_eq!(registry.len(), 3);
        assert!(tokens.len() <= registry.len());
    }
}
