//! Project alias resolver.
//!
//! When a project's canonical identifier changes (a folder name becoming a git
//! remote, say), records written under the old name stay reachable: the old name
//! is registered as an alias and queries expand a canonical project into itself
//! plus every registered old name.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// What [`register_alias`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasRegistration {
    /// Old and new names are identical.
    NoOp,
    Created,
    AlreadyExisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectAlias {
    pub old_project: String,
    pub new_project: String,
    pub created_at: String,
}

/// A canonical project plus the old names it answers for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedProject {
    /// Canonical name first, then aliases oldest first.
    pub projects: Vec<String>,
    pub truncated: bool,
    /// Aliases registered for the canonical name, including any dropped by the cap.
    pub total_aliases: usize,
}

impl ExpandedProject {
    /// The name that was expanded. `None` only for a hand-built empty value.
    pub fn canonical(&self) -> Option<&str> {
        self.projects.first().map(String::as_str)
    }
}

/// Record that `old_project` now lives under `new_project`. Idempotent.
pub fn register_alias(
    conn: &Connection,
    old_project: &str,
    new_project: &str,
) -> Result<AliasRegistration> {
    if old_project == new_project {
        return Ok(AliasRegistration::NoOp);
    }
    let now = Utc::now();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO project_aliases (old_project, new_project, created_at, created_at_epoch)
         VALUES (?1, ?2, ?3, ?4)",
        params![old_project, new_project, now.to_rfc3339(), now.timestamp()],
    )?;
    if inserted == 0 {
        return Ok(AliasRegistration::AlreadyExisted);
    }
    info!(old = old_project, new = new_project, "registered project alias");
    Ok(AliasRegistration::Created)
}

/// Expand `canonical` into itself plus its registered old names, at most `max` entries.
///
/// Overflow is logged and reported through `truncated`; it never fails the query.
pub fn expand_project(conn: &Connection, canonical: &str, max: usize) -> Result<ExpandedProject> {
    let max = max.max(1);
    let total_aliases: usize = conn.query_row(
        "SELECT COUNT(*) FROM project_aliases WHERE new_project = ?1 AND old_project != ?1",
        params![canonical],
        |row| row.get::<_, i64>(0),
    )? as usize;

    let mut stmt = conn.prepare(
        "SELECT old_project FROM project_aliases
         WHERE new_project = ?1 AND old_project != ?1
         ORDER BY created_at_epoch ASC, id ASC
         LIMIT ?2",
    )?;
    let aliases = stmt
        .query_map(params![canonical, (max - 1) as i64], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let truncated = total_aliases > aliases.len();
    if truncated {
        warn!(
            project = canonical,
            total_aliases,
            kept = aliases.len(),
            "project alias count exceeds the configured maximum; run `mnemo alias cleanup`"
        );
    }

    let mut projects = Vec::with_capacity(aliases.len() + 1);
    projects.push(canonical.to_string());
    projects.extend(aliases);
    Ok(ExpandedProject {
        projects,
        truncated,
        total_aliases,
    })
}

/// Delete aliases registered more than `older_than_days` days ago. Returns the count removed.
pub fn cleanup_aliases(conn: &Connection, older_than_days: u32) -> Result<usize> {
    let cutoff = Utc::now().timestamp() - i64::from(older_than_days) * 86_400;
    let removed = conn.execute(
        "DELETE FROM project_aliases WHERE created_at_epoch < ?1",
        params![cutoff],
    )?;
    if removed > 0 {
        info!(removed, older_than_days, "removed stale project aliases");
    }
    Ok(removed)
}

/// All aliases, or only those pointing at `project`, oldest first.
pub fn list_aliases(conn: &Connection, project: Option<&str>) -> Result<Vec<ProjectAlias>> {
    let mut stmt = conn.prepare(
        "SELECT old_project, new_project, created_at FROM project_aliases
         WHERE (?1 IS NULL OR new_project = ?1)
         ORDER BY created_at_epoch ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![project], |row| {
            Ok(ProjectAlias {
                old_project: row.get(0)?,
                new_project: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
