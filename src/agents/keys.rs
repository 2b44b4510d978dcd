//! API key material and agent identity validation.
//!
//! A key is `mnm_` + 8 hex chars (the 12-char lookup prefix) followed by 64 hex
//! chars of secret. Only the prefix and the SHA-256 of the whole key are stored.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Length of the indexed, plaintext-stored key prefix.
pub const KEY_PREFIX_LEN: usize = 12;

const KEY_TAG: &str = "mnm_";
const MAX_AGENT_ID_LEN: usize = 255;

/// Freshly generated key material. `plaintext` is handed to the caller once.
pub struct GeneratedKey {
    pub plaintext: String,
    pub prefix: String,
    pub hash: String,
}

/// Generate a new API key with a random lookup prefix and 256-bit secret.
pub fn generate_api_key() -> GeneratedKey {
    let mut rng = rand::rng();

    let mut prefix_bytes = [0u8; 4];
    rng.fill_bytes(&mut prefix_bytes);
    let mut secret_bytes = [0u8; 32];
    rng.fill_bytes(&mut secret_bytes);

    let prefix = format!("{KEY_TAG}{}", hex::encode(prefix_bytes));
    let plaintext = format!("{prefix}{}", hex::encode(secret_bytes));
    let hash = hash_api_key(&plaintext);

    GeneratedKey {
        plaintext,
        prefix,
        hash,
    }
}

/// Hash an API key with SHA-256 for storage comparison.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// The lookup prefix of a presented key, or `None` when it is too short to be one.
pub fn key_prefix(raw_key: &str) -> Option<&str> {
    raw_key.get(..KEY_PREFIX_LEN)
}

/// Validate an agent identity of the form `local-part@host`.
pub fn validate_agent_id(id: &str) -> Result<()> {
    let invalid = |reason: &str| Err(StoreError::InvalidAgentId(format!("{id:?}: {reason}")));

    if id.is_empty() || id.len() > MAX_AGENT_ID_LEN {
        return invalid("length must be 1-255");
    }
    if id.contains(';') || id.contains("--") || id.contains('\'') {
        return invalid("contains forbidden characters");
    }

    let Some((local, host)) = id.split_once('@') else {
        return invalid("expected local-part@host");
    };
    if local.is_empty() || host.is_empty() || host.contains('@') {
        return invalid("expected local-part@host");
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'))
    {
        return invalid("local part may only contain letters, digits and . _ - +");
    }

    let (hostname, port) = match host.split_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (host, None),
    };
    if hostname.is_empty()
        || !hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
    {
        return invalid("host may only contain letters, digits, '.' and '-'");
    }
    if let Some(port) = port {
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return invalid("port must be numeric");
        }
    }

    Ok(())
}
