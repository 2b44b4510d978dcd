//! Append-only credential audit log.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::Result;

/// Credential-store events recorded in `agent_audit_log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Registered,
    Reregistered,
    VerifySuccess,
    VerifyFailed,
    VerifyExpired,
    VerifyLocked,
    Locked,
    Verified,
    KeyRotated,
    KeyRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Reregistered => "reregistered",
            Self::VerifySuccess => "verify_success",
            Self::VerifyFailed => "verify_failed",
            Self::VerifyExpired => "verify_expired",
            Self::VerifyLocked => "verify_locked",
            Self::Locked => "locked",
            Self::Verified => "verified",
            Self::KeyRotated => "key_rotated",
            Self::KeyRevoked => "key_revoked",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub agent_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: String,
    pub created_at_epoch: i64,
}

/// Append an entry to the audit log.
pub(crate) fn write_audit(
    conn: &Connection,
    agent_id: &str,
    action: AuditAction,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = chrono::Utc::now();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO agent_audit_log (agent_id, action, details, created_at, created_at_epoch) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            agent_id,
            action.as_str(),
            details_json,
            now.to_rfc3339(),
            now.timestamp()
        ],
    )?;
    Ok(())
}

/// Most recent audit entries first, optionally for a single agent.
pub fn list_audit_log(
    conn: &Connection,
    agent_id: Option<&str>,
    limit: usize,
) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, action, details, created_at, created_at_epoch \
         FROM agent_audit_log \
         WHERE (?1 IS NULL OR agent_id = ?1) \
         ORDER BY id DESC LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![agent_id, limit as i64], |row| {
            let details: Option<String> = row.get(3)?;
            Ok(AuditEntry {
                id: row.get(0)?,
                agent_id: row.get(1)?,
                action: row.get(2)?,
                details: details.and_then(|s| serde_json::from_str(&s).ok()),
                created_at: row.get(4)?,
                created_at_epoch: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}
