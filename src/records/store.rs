//! Write path for content records.
//!
//! Ownership metadata (agent, department, visibility) is optional on input and
//! normalized in exactly one place, [`WriteMetadata::normalize`]. Every insert
//! goes through it, so legacy callers and authenticated agents produce rows with
//! the same shape. The FTS5 indexes are kept in sync by triggers.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Deserialize;
use tracing::debug;

use super::types::{NewObservation, NewPrompt, NewSummary, Visibility};
use crate::agents::keys::validate_agent_id;
use crate::agents::Agent;
use crate::error::Result;

pub const LEGACY_AGENT: &str = "legacy";
pub const DEFAULT_DEPARTMENT: &str = "default";
pub const DEFAULT_VISIBILITY: Visibility = Visibility::Project;

/// Caller-supplied ownership metadata, every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WriteMetadata {
    pub agent: Option<String>,
    pub department: Option<String>,
    pub visibility: Option<String>,
}

/// Ownership after defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOwner {
    pub agent: String,
    pub department: String,
    pub visibility: Visibility,
}

impl WriteMetadata {
    /// Metadata for a write made by an authenticated agent.
    pub fn for_agent(agent: &Agent, visibility: Option<String>) -> Self {
        Self {
            agent: Some(agent.id.clone()),
            department: Some(agent.department.clone()),
            visibility,
        }
    }

    /// Apply the `legacy` / `default` / `project` defaults and validate.
    ///
    /// Blank strings count as absent. An unknown visibility is an error, never
    /// coerced to the default.
    pub fn normalize(&self) -> Result<RecordOwner> {
        let agent = match non_blank(&self.agent) {
            Some(id) => {
                validate_agent_id(id)?;
                id.to_string()
            }
            None => LEGACY_AGENT.to_string(),
        };
        let department = non_blank(&self.department)
            .unwrap_or(DEFAULT_DEPARTMENT)
            .to_string();
        let visibility = match non_blank(&self.visibility) {
            Some(v) => v.parse::<Visibility>()?,
            None => DEFAULT_VISIBILITY,
        };
        Ok(RecordOwner {
            agent,
            department,
            visibility,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Insert an observation. Returns its id.
pub fn store_observation(
    conn: &Connection,
    obs: &NewObservation,
    meta: &WriteMetadata,
) -> Result<i64> {
    let owner = meta.normalize()?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO observations (memory_session_id, project, type, title, subtitle, narrative,
            text, facts, concepts, files_read, files_modified, prompt_number, discovery_tokens,
            agent, department, visibility, created_at, created_at_epoch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            obs.memory_session_id,
            obs.project,
            obs.obs_type.as_str(),
            obs.title,
            obs.subtitle,
            obs.narrative,
            obs.text,
            serde_json::to_string(&obs.facts)?,
            serde_json::to_string(&obs.concepts)?,
            serde_json::to_string(&obs.files_read)?,
            serde_json::to_string(&obs.files_modified)?,
            obs.prompt_number,
            obs.discovery_tokens,
            owner.agent,
            owner.department,
            owner.visibility.as_str(),
            now.to_rfc3339(),
            now.timestamp_millis(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(
        id,
        project = %obs.project,
        agent = %owner.agent,
        visibility = %owner.visibility,
        "stored observation"
    );
    Ok(id)
}

/// Insert a session summary. Returns its id.
pub fn store_summary(conn: &Connection, summary: &NewSummary, meta: &WriteMetadata) -> Result<i64> {
    let owner = meta.normalize()?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO session_summaries (memory_session_id, project, request, investigated, learned,
            completed, next_steps, notes, files_read, files_edited, prompt_number,
            agent, department, visibility, created_at, created_at_epoch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            summary.memory_session_id,
            summary.project,
            summary.request,
            summary.investigated,
            summary.learned,
            summary.completed,
            summary.next_steps,
            summary.notes,
            serde_json::to_string(&summary.files_read)?,
            serde_json::to_string(&summary.files_edited)?,
            summary.prompt_number,
            owner.agent,
            owner.department,
            owner.visibility.as_str(),
            now.to_rfc3339(),
            now.timestamp_millis(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, project = %summary.project, agent = %owner.agent, "stored session summary");
    Ok(id)
}

/// Insert a user prompt. Returns its id.
pub fn store_prompt(conn: &Connection, prompt: &NewPrompt, meta: &WriteMetadata) -> Result<i64> {
    let owner = meta.normalize()?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO user_prompts (content_session_id, project, prompt_number, prompt_text,
            agent, department, visibility, created_at, created_at_epoch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            prompt.content_session_id,
            prompt.project,
            prompt.prompt_number,
            prompt.prompt_text,
            owner.agent,
            owner.department,
            owner.visibility.as_str(),
            now.to_rfc3339(),
            now.timestamp_millis(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
