//! Error kinds raised by the credential store, the write path and the query engine.
//!
//! "Key doesn't work" is not an error: unknown, mismatched and expired keys come
//! back as `Ok(None)`. The variants here are the conditions a boundary has to tell
//! apart without string-matching messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or unsafe agent identity. Rejected before any storage access.
    #[error("invalid agent id: {0}")]
    InvalidAgentId(String),

    /// Too many failed attempts; verification is suspended until `until` (epoch seconds).
    #[error("agent {agent_id} is locked until {until}")]
    Locked { agent_id: String, until: i64 },

    #[error("invalid visibility: {0} (expected private, department, project or public)")]
    InvalidVisibility(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// HTTP status a transport should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidAgentId(_) | Self::InvalidVisibility(_) | Self::InvalidFilter(_) => 400,
            Self::Locked { .. } => 429,
            Self::AgentNotFound(_) => 404,
            Self::Database(_) | Self::Serialization(_) => 500,
        }
    }

    /// Seconds until a locked agent may retry, relative to `now` (epoch seconds).
    pub fn retry_after(&self, now: i64) -> Option<i64> {
        match self {
            Self::Locked { until, .. } => Some((until - now).max(1)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
