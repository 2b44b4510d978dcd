//! Agent identity records as returned to callers.
//!
//! None of these types carry the stored key hash. The plaintext key appears only
//! in [`Registration`] and [`RotatedKey`], at the moment it is issued.

use serde::Serialize;

/// An agent row, minus its key hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Agent {
    /// `local-part@host` identity.
    pub id: String,
    pub department: String,
    /// Permission tokens parsed from the comma-separated column.
    pub permissions: Vec<String>,
    /// Set once the agent proves possession of its current key.
    pub verified: bool,
    pub created_at: String,
    pub last_seen_at: String,
    /// First 12 characters of the current key. `None` after revocation.
    pub key_prefix: Option<String>,
    /// Key expiry, epoch seconds.
    pub expires_at: Option<i64>,
    pub failed_attempts: u32,
    /// Lockout end, epoch seconds.
    pub locked_until: Option<i64>,
}

impl Agent {
    pub fn has_permission(&self, perm: &str) -> bool {
        self.permissions.iter().any(|p| p == perm)
    }

    /// Whether a lockout is in force at `now` (epoch seconds).
    pub fn is_locked_at(&self, now: i64) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Outcome of a registration call.
#[derive(Debug, Serialize)]
pub struct Registration {
    pub agent: Agent,
    /// Plaintext key, present only when the agent was newly created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub created: bool,
}

/// Outcome of a key rotation.
#[derive(Debug, Serialize)]
pub struct RotatedKey {
    pub agent: Agent,
    pub api_key: String,
}

/// Split a stored `read,write` column into tokens.
pub(crate) fn parse_permissions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
