use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use super::access::AccessContext;
use super::aliases::expand_project;
use super::filters::QueryBuilder;
use super::types::Visibility;
use crate::config::QueryConfig;
use crate::error::Result;

const OBSERVATION_TYPES: [&str; 6] = ["decision", "bugfix", "feature", "refactor", "discovery", "change"];

/// Record counts as seen by one caller.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub observations: u64,
    pub summaries: u64,
    pub prompts: u64,
    pub by_type: HashMap<String, u64>,
    pub by_visibility: HashMap<String, u64>,
    pub agents: u64,
    pub project_aliases: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_observation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_observation: Option<String>,
}

/// Compute statistics over what `ctx` can read, optionally for one project
/// (expanded through its aliases).
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn record_stats(
    conn: &Connection,
    ctx: &AccessContext,
    project: Option<&str>,
    config: &QueryConfig,
    db_path: Option<&Path>,
) -> Result<StatsResponse> {
    let projects = match project {
        Some(p) => expand_project(conn, p, config.max_project_aliases)?.projects,
        None => Vec::new(),
    };
    let scoped = |alias: &'static str| {
        let mut builder = QueryBuilder::new(ctx, alias);
        builder.project_in(&projects);
        builder.into_parts()
    };

    let (obs_where, obs_params) = scoped("o");
    let observations = count(conn, &format!("SELECT COUNT(*) FROM observations o WHERE {obs_where}"), &obs_params)?;
    let (sum_where, sum_params) = scoped("s");
    let summaries = count(conn, &format!("SELECT COUNT(*) FROM session_summaries s WHERE {sum_where}"), &sum_params)?;
    let (prompt_where, prompt_params) = scoped("p");
    let prompts = count(conn, &format!("SELECT COUNT(*) FROM user_prompts p WHERE {prompt_where}"), &prompt_params)?;

    let mut by_type: HashMap<String, u64> =
        OBSERVATION_TYPES.iter().map(|t| (t.to_string(), 0)).collect();
    by_type.extend(grouped(
        conn,
        &format!("SELECT o.type, COUNT(*) FROM observations o WHERE {obs_where} GROUP BY o.type"),
        &obs_params,
    )?);

    let mut by_visibility: HashMap<String, u64> = Visibility::ALL
        .iter()
        .map(|v| (v.as_str().to_string(), 0))
        .collect();
    by_visibility.extend(grouped(
        conn,
        &format!(
            "SELECT o.visibility, COUNT(*) FROM observations o WHERE {obs_where} GROUP BY o.visibility"
        ),
        &obs_params,
    )?);

    let (oldest_observation, newest_observation): (Option<String>, Option<String>) = conn.query_row(
        &format!("SELECT MIN(o.created_at), MAX(o.created_at) FROM observations o WHERE {obs_where}"),
        params_from_iter(obs_params.iter()),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let agents = count(conn, "SELECT COUNT(*) FROM agents", &[])?;
    let project_aliases = count(conn, "SELECT COUNT(*) FROM project_aliases", &[])?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        observations,
        summaries,
        prompts,
        by_type,
        by_visibility,
        agents,
        project_aliases,
        db_size_bytes,
        oldest_observation,
        newest_observation,
    })
}

fn count(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params_from_iter(params.iter()), |row| row.get(0))?;
    Ok(n as u64)
}

fn grouped(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
