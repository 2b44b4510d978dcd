//! Agent registration and API-key lifecycle.
//!
//! Keys are looked up by their 12-char prefix (indexed) and then confirmed
//! against the stored SHA-256 of the full key. Repeated mismatches lock the
//! agent for a configurable window. Every state transition and every
//! verification attempt lands in the audit log before the call returns.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use super::audit::{write_audit, AuditAction};
use super::keys::{self, validate_agent_id};
use super::types::{parse_permissions, Agent, Registration, RotatedKey};
use crate::config::AuthConfig;
use crate::error::{Result, StoreError};
use crate::records::access::{self, AccessContext};
use crate::records::types::Visibility;

pub const DEFAULT_DEPARTMENT: &str = "default";
pub const DEFAULT_PERMISSIONS: &[&str] = &["read", "write"];

const AGENT_COLUMNS: &str = "id, department, permissions, verified, created_at, last_seen_at, \
     api_key_prefix, expires_at, failed_attempts, locked_until";

fn agent_from_row(row: &Row) -> rusqlite::Result<Agent> {
    let permissions: String = row.get(2)?;
    Ok(Agent {
        id: row.get(0)?,
        department: row.get(1)?,
        permissions: parse_permissions(&permissions),
        verified: row.get(3)?,
        created_at: row.get(4)?,
        last_seen_at: row.get(5)?,
        key_prefix: row.get(6)?,
        expires_at: row.get(7)?,
        failed_attempts: row.get(8)?,
        locked_until: row.get(9)?,
    })
}

/// Fetch an agent by id.
pub fn get_agent(conn: &Connection, id: &str) -> Result<Option<Agent>> {
    let agent = conn
        .query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            agent_from_row,
        )
        .optional()?;
    Ok(agent)
}

/// All agents, ordered by id.
pub fn list_agents(conn: &Connection) -> Result<Vec<Agent>> {
    let mut stmt = conn.prepare(&format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY id"))?;
    let agents = stmt
        .query_map([], agent_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(agents)
}

/// Register an agent, issuing a key if it is new.
///
/// Re-registering an existing agent only refreshes `last_seen_at`; no key is
/// returned and the stored department and permissions are left alone.
pub fn register(
    conn: &mut Connection,
    id: &str,
    department: Option<&str>,
    permissions: Option<&[&str]>,
    config: &AuthConfig,
) -> Result<Registration> {
    validate_agent_id(id)?;

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = get_agent(&tx, id)? {
        tx.execute(
            "UPDATE agents SET last_seen_at = ?1 WHERE id = ?2",
            params![now_str, id],
        )?;
        write_audit(&tx, id, AuditAction::Reregistered, None)?;
        tx.commit()?;

        if department.is_some_and(|d| d != existing.department) {
            debug!(agent = %id, "re-registration does not change the department");
        }
        debug!(agent = %id, "agent re-registered");
        return Ok(Registration {
            agent: Agent {
                last_seen_at: now_str,
                ..existing
            },
            api_key: None,
            created: false,
        });
    }

    let department = department
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DEPARTMENT);
    let permissions = normalize_permissions(permissions);
    let key = keys::generate_api_key();
    let expires_at = now.timestamp() + i64::from(config.key_expiry_days) * 86_400;

    tx.execute(
        "INSERT INTO agents (id, department, permissions, api_key_prefix, api_key_hash, verified, \
         created_at, last_seen_at, expires_at, failed_attempts) \
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, ?7, 0)",
        params![id, department, permissions, key.prefix, key.hash, now_str, expires_at],
    )?;
    write_audit(
        &tx,
        id,
        AuditAction::Registered,
        Some(&serde_json::json!({
            "department": department,
            "permissions": permissions,
            "expires_at": expires_at,
        })),
    )?;
    let agent = get_agent(&tx, id)?.ok_or_else(|| StoreError::AgentNotFound(id.to_string()))?;
    tx.commit()?;

    info!(agent = %id, department = %department, "agent registered");
    Ok(Registration {
        agent,
        api_key: Some(key.plaintext),
        created: true,
    })
}

fn normalize_permissions(permissions: Option<&[&str]>) -> String {
    let tokens: Vec<&str> = permissions
        .unwrap_or(DEFAULT_PERMISSIONS)
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if tokens.is_empty() {
        DEFAULT_PERMISSIONS.join(",")
    } else {
        tokens.join(",")
    }
}

enum KeyOutcome {
    Match(Agent),
    Miss,
    Locked { agent_id: String, until: i64 },
}

/// Resolve a presented API key to its agent.
///
/// Returns `Ok(None)` for unknown, mismatched or expired keys and
/// [`StoreError::Locked`] while the candidate agent is locked out. The lock is
/// checked before the hash comparison is acted on, so a locked agent answers the
/// same way for right and wrong keys.
pub fn find_by_key(conn: &Connection, raw_key: &str, config: &AuthConfig) -> Result<Option<Agent>> {
    let Some(prefix) = keys::key_prefix(raw_key) else {
        debug!("presented key is shorter than the lookup prefix");
        return Ok(None);
    };
    let presented_hash = keys::hash_api_key(raw_key);
    let now = Utc::now().timestamp();

    // Take the write lock up front: a deferred read cannot upgrade once another
    // connection has written, and the attempt would go uncounted.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let candidates = load_candidates(&tx, prefix)?;
    if candidates.len() > 1 {
        warn!(
            prefix = %prefix,
            count = candidates.len(),
            "api key prefix shared by multiple agents; resolving by full hash"
        );
    }
    let Some((agent, stored_hash)) = candidates
        .iter()
        .find(|(_, hash)| hash.as_deref() == Some(presented_hash.as_str()))
        .or_else(|| candidates.first())
        .cloned()
    else {
        debug!(prefix = %prefix, "no agent for key prefix");
        return Ok(None);
    };

    let outcome = if let Some(until) = agent.locked_until.filter(|until| *until > now) {
        write_audit(
            &tx,
            &agent.id,
            AuditAction::VerifyLocked,
            Some(&serde_json::json!({ "locked_until": until })),
        )?;
        KeyOutcome::Locked {
            agent_id: agent.id.clone(),
            until,
        }
    } else if stored_hash.as_deref() == Some(presented_hash.as_str()) {
        if agent.expires_at.is_some_and(|expires| expires <= now) {
            write_audit(
                &tx,
                &agent.id,
                AuditAction::VerifyExpired,
                Some(&serde_json::json!({ "expires_at": agent.expires_at })),
            )?;
            KeyOutcome::Miss
        } else {
            KeyOutcome::Match(record_success(&tx, agent)?)
        }
    } else {
        record_failure(&tx, &agent.id, now, config)?;
        KeyOutcome::Miss
    };

    tx.commit()?;

    match outcome {
        KeyOutcome::Match(agent) => Ok(Some(agent)),
        KeyOutcome::Miss => Ok(None),
        KeyOutcome::Locked { agent_id, until } => {
            warn!(agent = %agent_id, locked_until = until, "verification attempt on locked agent");
            Err(StoreError::Locked { agent_id, until })
        }
    }
}

fn load_candidates(conn: &Connection, prefix: &str) -> Result<Vec<(Agent, Option<String>)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AGENT_COLUMNS}, api_key_hash FROM agents \
         WHERE api_key_prefix = ?1 ORDER BY created_at, id"
    ))?;
    let candidates = stmt
        .query_map(params![prefix], |row| Ok((agent_from_row(row)?, row.get(10)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(candidates)
}

fn record_success(conn: &Connection, agent: Agent) -> Result<Agent> {
    let now_str = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE agents SET failed_attempts = 0, locked_until = NULL, last_seen_at = ?1 WHERE id = ?2",
        params![now_str, agent.id],
    )?;
    if agent.failed_attempts > 0 {
        debug!(agent = %agent.id, cleared = agent.failed_attempts, "failed attempt counter reset");
    }
    write_audit(conn, &agent.id, AuditAction::VerifySuccess, None)?;
    Ok(Agent {
        failed_attempts: 0,
        locked_until: None,
        last_seen_at: now_str,
        ..agent
    })
}

/// Count a wrong key against `agent_id`, locking it once the threshold is reached.
///
/// The increment and the lock decision are one statement so concurrent wrong
/// attempts cannot under-count. A counter whose previous lock already elapsed
/// starts over at 1.
fn record_failure(conn: &Connection, agent_id: &str, now: i64, config: &AuthConfig) -> Result<()> {
    let lock_until = now.saturating_add(config.lockout_seconds);
    let (failed_attempts, locked_until): (u32, Option<i64>) = conn.query_row(
        "UPDATE agents SET \
             failed_attempts = CASE WHEN locked_until IS NOT NULL AND locked_until <= ?2 \
                 THEN 1 ELSE failed_attempts + 1 END, \
             locked_until = CASE \
                 WHEN (CASE WHEN locked_until IS NOT NULL AND locked_until <= ?2 \
                       THEN 1 ELSE failed_attempts + 1 END) >= ?3 THEN ?4 \
                 WHEN locked_until IS NOT NULL AND locked_until <= ?2 THEN NULL \
                 ELSE locked_until END \
         WHERE id = ?1 \
         RETURNING failed_attempts, locked_until",
        params![agent_id, now, config.max_failed_attempts, lock_until],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    write_audit(
        conn,
        agent_id,
        AuditAction::VerifyFailed,
        Some(&serde_json::json!({ "failed_attempts": failed_attempts })),
    )?;

    if let Some(until) = locked_until.filter(|until| *until > now) {
        write_audit(
            conn,
            agent_id,
            AuditAction::Locked,
            Some(&serde_json::json!({
                "failed_attempts": failed_attempts,
                "locked_until": until,
            })),
        )?;
        warn!(agent = %agent_id, failed_attempts, locked_until = until, "agent locked after repeated failures");
    } else {
        debug!(agent = %agent_id, failed_attempts, "api key mismatch");
    }
    Ok(())
}

/// Confirm that `raw_key` belongs to `id`, marking the agent verified on first success.
pub fn verify(conn: &Connection, id: &str, raw_key: &str, config: &AuthConfig) -> Result<bool> {
    validate_agent_id(id)?;

    let Some(agent) = find_by_key(conn, raw_key, config)? else {
        return Ok(false);
    };

    if agent.id != id {
        warn!(claimed = %id, resolved = %agent.id, "api key does not belong to claimed agent");
        write_audit(
            conn,
            id,
            AuditAction::VerifyFailed,
            Some(&serde_json::json!({ "reason": "identity_mismatch" })),
        )?;
        return Ok(false);
    }

    if !agent.verified {
        conn.execute("UPDATE agents SET verified = 1 WHERE id = ?1", params![id])?;
        write_audit(conn, id, AuditAction::Verified, None)?;
        info!(agent = %id, "agent verified");
    }
    Ok(true)
}

/// Issue a new key, invalidating the previous one on commit.
pub fn rotate(
    conn: &mut Connection,
    id: &str,
    expiry_days: Option<u32>,
    config: &AuthConfig,
) -> Result<RotatedKey> {
    validate_agent_id(id)?;

    let expiry_days = expiry_days
        .filter(|days| *days > 0)
        .unwrap_or(config.key_expiry_days);
    let key = keys::generate_api_key();
    let expires_at = Utc::now().timestamp() + i64::from(expiry_days) * 86_400;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let updated = tx.execute(
        "UPDATE agents SET api_key_prefix = ?1, api_key_hash = ?2, expires_at = ?3, \
         verified = 0, failed_attempts = 0, locked_until = NULL \
         WHERE id = ?4",
        params![key.prefix, key.hash, expires_at, id],
    )?;
    if updated == 0 {
        return Err(StoreError::AgentNotFound(id.to_string()));
    }
    write_audit(
        &tx,
        id,
        AuditAction::KeyRotated,
        Some(&serde_json::json!({ "expires_at": expires_at })),
    )?;
    let agent = get_agent(&tx, id)?.ok_or_else(|| StoreError::AgentNotFound(id.to_string()))?;
    tx.commit()?;

    info!(agent = %id, expiry_days, "api key rotated");
    Ok(RotatedKey {
        agent,
        api_key: key.plaintext,
    })
}

/// Permanently disable the agent's current key.
pub fn revoke(conn: &mut Connection, id: &str) -> Result<Agent> {
    validate_agent_id(id)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let updated = tx.execute(
        "UPDATE agents SET api_key_prefix = NULL, api_key_hash = NULL, verified = 0 WHERE id = ?1",
        params![id],
    )?;
    if updated == 0 {
        return Err(StoreError::AgentNotFound(id.to_string()));
    }
    write_audit(&tx, id, AuditAction::KeyRevoked, None)?;
    let agent = get_agent(&tx, id)?.ok_or_else(|| StoreError::AgentNotFound(id.to_string()))?;
    tx.commit()?;

    info!(agent = %id, "api key revoked");
    Ok(agent)
}

/// Whether `id` holds `perm`. Unknown agents hold nothing.
pub fn has_permission(conn: &Connection, id: &str, perm: &str) -> Result<bool> {
    Ok(get_agent(conn, id)?.is_some_and(|agent| agent.has_permission(perm)))
}

/// Whether `requesting_id` (or an anonymous caller) may read a record with the
/// given owner, department and visibility.
pub fn can_access(
    conn: &Connection,
    requesting_id: Option<&str>,
    owner_agent: &str,
    owner_department: &str,
    visibility: Visibility,
) -> Result<bool> {
    let ctx = AccessContext::resolve(conn, requesting_id)?;
    Ok(access::can_access(&ctx, owner_agent, owner_department, visibility))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::audit::list_audit_log;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn config() -> AuthConfig {
        AuthConfig::default()
    }

    fn actions(conn: &Connection, id: &str) -> Vec<String> {
        list_audit_log(conn, Some(id), 100)
            .unwrap()
            .into_iter()
            .rev()
            .map(|e| e.action)
            .collect()
    }

    #[test]
    fn register_issues_key_once() {
        let mut conn = test_db();
        let first = register(&mut conn, "alice@host", Some("eng"), None, &config()).unwrap();
        assert!(first.created);
        let key = first.api_key.expect("new agent gets a key");
        assert_eq!(first.agent.department, "eng");
        assert_eq!(first.agent.permissions, vec!["read", "write"]);
        assert_eq!(first.agent.key_prefix.as_deref(), keys::key_prefix(&key));
        assert!(!first.agent.verified);

        let again = register(&mut conn, "alice@host", Some("mkt"), None, &config()).unwrap();
        assert!(!again.created);
        assert!(again.api_key.is_none());
        assert_eq!(again.agent.department, "eng");

        // the original key still works
        let found = find_by_key(&conn, &key, &config()).unwrap().unwrap();
        assert_eq!(found.id, "alice@host");
        assert_eq!(actions(&conn, "alice@host"), vec!["registered", "reregistered", "verify_success"]);
    }

    #[test]
    fn register_sets_default_expiry() {
        let mut conn = test_db();
        let reg = register(&mut conn, "alice@host", None, None, &config()).unwrap();
        let expires = reg.agent.expires_at.unwrap();
        let expected = Utc::now().timestamp() + 90 * 86_400;
        assert!((expires - expected).abs() < 5);
        assert_eq!(reg.agent.department, DEFAULT_DEPARTMENT);
    }

    #[test]
    fn register_rejects_bad_ids_without_touching_storage() {
        let mut conn = test_db();
        let err = register(&mut conn, "x'; DROP TABLE agents; --@h", None, None, &config()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidAgentId(_)));
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM agent_audit_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn hash_is_never_exposed() {
        let mut conn = test_db();
        let reg = register(&mut conn, "alice@host", None, None, &config()).unwrap();
        let json = serde_json::to_value(&reg.agent).unwrap();
        assert!(json.get("api_key_hash").is_none());
        let stored: String = conn
            .query_row("SELECT api_key_hash FROM agents", [], |row| row.get(0))
            .unwrap();
        assert!(!json.to_string().contains(&stored));
    }

    #[test]
    fn wrong_key_with_known_prefix_counts_failure() {
        let mut conn = test_db();
        let key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        let forged = format!("{}{}", &key[..keys::KEY_PREFIX_LEN], "0".repeat(64));

        assert!(find_by_key(&conn, &forged, &config()).unwrap().is_none());
        let agent = get_agent(&conn, "alice@host").unwrap().unwrap();
        assert_eq!(agent.failed_attempts, 1);
        assert!(agent.locked_until.is_none());
    }

    #[test]
    fn unknown_prefix_is_a_plain_miss() {
        let conn = test_db();
        assert!(find_by_key(&conn, "mnm_deadbeefcafe", &config()).unwrap().is_none());
        assert!(find_by_key(&conn, "short", &config()).unwrap().is_none());
    }

    #[test]
    fn lockout_after_threshold_then_expiry_resets() {
        let mut conn = test_db();
        let cfg = config();
        let key = register(&mut conn, "alice@host", None, None, &cfg)
            .unwrap()
            .api_key
            .unwrap();
        let wrong = format!("{}{}", &key[..keys::KEY_PREFIX_LEN], "f".repeat(64));

        for _ in 0..5 {
            assert!(find_by_key(&conn, &wrong, &cfg).unwrap().is_none());
        }

        // sixth attempt is refused even with the right key
        let err = find_by_key(&conn, &key, &cfg).unwrap_err();
        let StoreError::Locked { agent_id, until } = err else {
            panic!("expected locked error");
        };
        assert_eq!(agent_id, "alice@host");
        assert!(until > Utc::now().timestamp());

        // let the window elapse
        conn.execute(
            "UPDATE agents SET locked_until = ?1 WHERE id = 'alice@host'",
            params![Utc::now().timestamp() - 1],
        )
        .unwrap();

        let agent = find_by_key(&conn, &key, &cfg).unwrap().unwrap();
        assert_eq!(agent.failed_attempts, 0);
        let stored = get_agent(&conn, "alice@host").unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
        assert!(stored.locked_until.is_none());

        let log = actions(&conn, "alice@host");
        assert_eq!(log.iter().filter(|a| *a == "verify_failed").count(), 5);
        assert_eq!(log.iter().filter(|a| *a == "locked").count(), 1);
        assert_eq!(log.iter().filter(|a| *a == "verify_locked").count(), 1);
    }

    #[test]
    fn failure_after_elapsed_lock_starts_a_fresh_count() {
        let mut conn = test_db();
        let cfg = config();
        let key = register(&mut conn, "alice@host", None, None, &cfg)
            .unwrap()
            .api_key
            .unwrap();
        let wrong = format!("{}{}", &key[..keys::KEY_PREFIX_LEN], "e".repeat(64));
        for _ in 0..5 {
            find_by_key(&conn, &wrong, &cfg).unwrap();
        }
        conn.execute(
            "UPDATE agents SET locked_until = ?1",
            params![Utc::now().timestamp() - 1],
        )
        .unwrap();

        assert!(find_by_key(&conn, &wrong, &cfg).unwrap().is_none());
        let agent = get_agent(&conn, "alice@host").unwrap().unwrap();
        assert_eq!(agent.failed_attempts, 1);
        assert!(agent.locked_until.is_none());
    }

    #[test]
    fn custom_threshold_and_window() {
        let mut conn = test_db();
        let cfg = AuthConfig {
            max_failed_attempts: 2,
            lockout_seconds: 60,
            ..AuthConfig::default()
        };
        let key = register(&mut conn, "alice@host", None, None, &cfg)
            .unwrap()
            .api_key
            .unwrap();
        let wrong = format!("{}{}", &key[..keys::KEY_PREFIX_LEN], "1".repeat(64));
        find_by_key(&conn, &wrong, &cfg).unwrap();
        find_by_key(&conn, &wrong, &cfg).unwrap();

        let agent = get_agent(&conn, "alice@host").unwrap().unwrap();
        let until = agent.locked_until.unwrap();
        let expected = Utc::now().timestamp() + 60;
        assert!((until - expected).abs() < 5);
    }

    #[test]
    fn oversized_lockout_window_still_locks() {
        let mut conn = test_db();
        let cfg = AuthConfig {
            max_failed_attempts: 1,
            lockout_seconds: i64::MAX,
            ..AuthConfig::default()
        };
        let key = register(&mut conn, "alice@host", None, None, &cfg)
            .unwrap()
            .api_key
            .unwrap();
        let wrong = format!("{}{}", &key[..keys::KEY_PREFIX_LEN], "2".repeat(64));
        find_by_key(&conn, &wrong, &cfg).unwrap();

        let agent = get_agent(&conn, "alice@host").unwrap().unwrap();
        assert_eq!(agent.locked_until, Some(i64::MAX));
        assert!(matches!(
            find_by_key(&conn, &key, &cfg),
            Err(StoreError::Locked { .. })
        ));
    }

    #[test]
    fn expired_key_is_a_miss_without_counting_failure() {
        let mut conn = test_db();
        let key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        conn.execute(
            "UPDATE agents SET expires_at = ?1",
            params![Utc::now().timestamp() - 10],
        )
        .unwrap();

        assert!(find_by_key(&conn, &key, &config()).unwrap().is_none());
        let agent = get_agent(&conn, "alice@host").unwrap().unwrap();
        assert_eq!(agent.failed_attempts, 0);
        assert_eq!(actions(&conn, "alice@host").last().unwrap(), "verify_expired");
    }

    #[test]
    fn shared_prefix_never_authenticates_the_wrong_agent() {
        let mut conn = test_db();
        let alice_key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        let bob_key = register(&mut conn, "bob@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();

        // force bob onto alice's prefix while keeping his own hash
        let alice_prefix = &alice_key[..keys::KEY_PREFIX_LEN];
        let bob_colliding = format!("{alice_prefix}{}", &bob_key[keys::KEY_PREFIX_LEN..]);
        conn.execute(
            "UPDATE agents SET api_key_prefix = ?1, api_key_hash = ?2 WHERE id = 'bob@host'",
            params![alice_prefix, keys::hash_api_key(&bob_colliding)],
        )
        .unwrap();

        let a = find_by_key(&conn, &alice_key, &config()).unwrap().unwrap();
        assert_eq!(a.id, "alice@host");
        let b = find_by_key(&conn, &bob_colliding, &config()).unwrap().unwrap();
        assert_eq!(b.id, "bob@host");

        let forged = format!("{alice_prefix}{}", "9".repeat(64));
        assert!(find_by_key(&conn, &forged, &config()).unwrap().is_none());
    }

    #[test]
    fn verify_flips_flag_and_checks_identity() {
        let mut conn = test_db();
        let alice_key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        register(&mut conn, "bob@host", None, None, &config()).unwrap();

        assert!(!verify(&conn, "bob@host", &alice_key, &config()).unwrap());
        assert!(!get_agent(&conn, "bob@host").unwrap().unwrap().verified);

        assert!(verify(&conn, "alice@host", &alice_key, &config()).unwrap());
        assert!(get_agent(&conn, "alice@host").unwrap().unwrap().verified);
        // idempotent
        assert!(verify(&conn, "alice@host", &alice_key, &config()).unwrap());
        let verified_entries = actions(&conn, "alice@host")
            .into_iter()
            .filter(|a| a == "verified")
            .count();
        assert_eq!(verified_entries, 1);
    }

    #[test]
    fn rotate_invalidates_previous_key() {
        let mut conn = test_db();
        let old_key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        assert!(verify(&conn, "alice@host", &old_key, &config()).unwrap());

        let rotated = rotate(&mut conn, "alice@host", Some(7), &config()).unwrap();
        assert_ne!(rotated.api_key, old_key);
        assert!(!rotated.agent.verified);
        assert_eq!(rotated.agent.failed_attempts, 0);
        let expected = Utc::now().timestamp() + 7 * 86_400;
        assert!((rotated.agent.expires_at.unwrap() - expected).abs() < 5);

        assert!(find_by_key(&conn, &old_key, &config()).unwrap().is_none());
        let agent = find_by_key(&conn, &rotated.api_key, &config()).unwrap().unwrap();
        assert_eq!(agent.id, "alice@host");
    }

    #[test]
    fn rotate_clears_lockout() {
        let mut conn = test_db();
        let key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        let wrong = format!("{}{}", &key[..keys::KEY_PREFIX_LEN], "a".repeat(64));
        for _ in 0..5 {
            find_by_key(&conn, &wrong, &config()).unwrap();
        }
        let rotated = rotate(&mut conn, "alice@host", None, &config()).unwrap();
        assert!(rotated.agent.locked_until.is_none());
        assert!(find_by_key(&conn, &rotated.api_key, &config()).unwrap().is_some());
    }

    #[test]
    fn revoke_disables_key_permanently() {
        let mut conn = test_db();
        let key = register(&mut conn, "alice@host", None, None, &config())
            .unwrap()
            .api_key
            .unwrap();
        let agent = revoke(&mut conn, "alice@host").unwrap();
        assert!(agent.key_prefix.is_none());
        assert!(!agent.verified);
        assert!(find_by_key(&conn, &key, &config()).unwrap().is_none());
        assert!(actions(&conn, "alice@host").contains(&"key_revoked".to_string()));
    }

    #[test]
    fn rotate_and_revoke_unknown_agent() {
        let mut conn = test_db();
        assert!(matches!(
            rotate(&mut conn, "ghost@host", None, &config()),
            Err(StoreError::AgentNotFound(_))
        ));
        assert!(matches!(
            revoke(&mut conn, "ghost@host"),
            Err(StoreError::AgentNotFound(_))
        ));
    }

    #[test]
    fn permissions_lookup() {
        let mut conn = test_db();
        register(&mut conn, "reader@host", None, Some(&["read"]), &config()).unwrap();
        assert!(has_permission(&conn, "reader@host", "read").unwrap());
        assert!(!has_permission(&conn, "reader@host", "write").unwrap());
        assert!(!has_permission(&conn, "ghost@host", "read").unwrap());
    }

    #[test]
    fn can_access_resolves_requester_department() {
        let mut conn = test_db();
        register(&mut conn, "alice@host", Some("eng"), None, &config()).unwrap();
        register(&mut conn, "bob@host", Some("eng"), None, &config()).unwrap();
        register(&mut conn, "carol@host", Some("mkt"), None, &config()).unwrap();

        let dept = Visibility::Department;
        assert!(can_access(&conn, Some("bob@host"), "alice@host", "eng", dept).unwrap());
        assert!(!can_access(&conn, Some("carol@host"), "alice@host", "eng", dept).unwrap());
        assert!(!can_access(&conn, None, "alice@host", "eng", dept).unwrap());
        assert!(can_access(&conn, None, "alice@host", "eng", Visibility::Project).unwrap());
        assert!(!can_access(&conn, Some("bob@host"), "alice@host", "eng", Visibility::Private).unwrap());
        assert!(can_access(&conn, Some("alice@host"), "alice@host", "eng", Visibility::Private).unwrap());
    }
}
